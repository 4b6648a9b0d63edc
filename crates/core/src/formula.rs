//! [MODULE E] Condition-to-formula translation (spec.md §4.E, §6, §9).
//!
//! This module owns the external rule-parser contract: [`ConditionNode`]
//! is the tagged-variant accessor vocabulary a real parser's AST exposes,
//! and [`Rule`] is the per-rule surface (`.strings()`, `.condition()`)
//! `evaluate_rule` consumes. [`build_formula`] walks a condition once,
//! allocating a fresh symbol for every atomic sub-expression, and returns
//! a [`BoolExpr`] tree built directly (never by assembling then
//! evaluating a formula string, per the §9 redesign flag). [`to_cnf`] and
//! [`to_dnf`] convert that tree with a plain recursive distribution and
//! no algebraic simplification, preserving the one-to-one symbol↔node
//! map the rule evaluator (module G) relies on.

use sigfilter_runtime::CoreError;

/// Tag naming an original-AST node kind this crate never visits directly
/// (it only ever appears as a child of a shape module F knows how to
/// simplify). Carried as a string rather than broken out into dedicated
/// [`NodeKind`] variants because module F needs to recognise a handful of
/// them by name (e.g. a `StructAccessExpression` as the left operand of
/// an `Eq`) while module E only ever needs to know "this is not a shape I
/// can recurse into".
pub mod unsupported_kind {
    pub const INT_LITERAL: &str = "IntLiteralExpression";
    pub const DOUBLE_LITERAL: &str = "DoubleLiteralExpression";
    pub const INT_FUNCTION: &str = "IntFunctionExpression";
    pub const FILESIZE: &str = "FilesizeExpression";
    pub const ENTRYPOINT: &str = "EntrypointExpression";
    pub const STRUCT_ACCESS: &str = "StructAccessExpression";
    pub const ARRAY_ACCESS: &str = "ArrayAccessExpression";
    pub const RANGE: &str = "RangeExpression";
    pub const ID: &str = "IdExpression";
    pub const STRING_LITERAL: &str = "StringLiteralExpression";
    pub const ALL: &str = "AllExpression";
    pub const ANY: &str = "AnyExpression";
    pub const UNARY_MINUS: &str = "UnaryMinusExpression";
    pub const BITWISE_NOT: &str = "BitwiseNotExpression";
    pub const ARITHMETIC: &str = "ArithmeticExpression";
}

/// The fixed tagged-variant vocabulary a condition AST node exposes
/// (spec.md §4.E/§4.F). Structural kinds (`And`/`Or`/`Not`/`Parentheses`/
/// `ForInt`) are walked recursively by [`build_formula`]; every other
/// kind is atomic and gets its own fresh symbol, except
/// [`NodeKind::BoolLiteral`] (a constant) and [`NodeKind::Unsupported`]
/// (a shape that should never appear directly under boolean structure —
/// fatal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    StringRef,
    StringAt,
    StringInRange,
    StringCount,
    StringOffset,
    StringWildcard,
    RegexLiteral,
    Not,
    And,
    Or,
    Parentheses,
    ForInt,
    ForString,
    Of,
    Set,
    Them,
    Contains,
    Matches,
    FunctionCall,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Minus,
    BoolLiteral,
    /// A shape this crate never recurses into directly; carries the
    /// original node kind's name for diagnostics. See
    /// [`unsupported_kind`] for the fixed set of names module F matches
    /// on by name.
    Unsupported(&'static str),
}

/// Accessor vocabulary for a node in a rule's condition AST (spec.md
/// §6). A real parser's AST type implements this trait; default methods
/// return `None`/empty so an implementation only overrides the
/// accessors its own node shapes actually support.
pub trait ConditionNode {
    fn kind(&self) -> NodeKind;

    fn left_operand(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn right_operand(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn operand(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn enclosed_expr(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn arguments(&self) -> &[Box<dyn ConditionNode>] {
        &[]
    }
    fn function_text(&self) -> Option<&str> {
        None
    }
    fn value(&self) -> Option<&str> {
        None
    }
    fn elements(&self) -> &[Box<dyn ConditionNode>] {
        &[]
    }
    fn iterated_set(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn variable(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn body(&self) -> Option<&dyn ConditionNode> {
        None
    }
    fn id(&self) -> Option<&str> {
        None
    }
    fn text(&self) -> Option<&str> {
        None
    }
}

/// A YARA-style string descriptor (spec.md §3's "YaraString"): the raw
/// pattern text/bytes plus the flags that govern how it expands into
/// byte-string alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct YaraString {
    pub bytes: Vec<u8>,
    pub is_regex: bool,
    pub is_hex: bool,
    pub is_wide: bool,
    pub is_ascii: bool,
    pub is_nocase: bool,
}

impl YaraString {
    /// A plain ASCII literal: not regex, not hex, ascii-only, case-sensitive.
    pub fn ascii(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            is_regex: false,
            is_hex: false,
            is_wide: false,
            is_ascii: true,
            is_nocase: false,
        }
    }
}

/// One entry of a rule's `.strings[]` (spec.md §6): the identifier
/// (without its leading `$`) and the descriptor it resolves to.
#[derive(Debug, Clone)]
pub struct RuleString {
    pub identifier: String,
    pub value: YaraString,
}

/// Per-rule surface `evaluate_rule` consumes (spec.md §6).
pub trait Rule {
    fn strings(&self) -> &[RuleString];
    fn condition(&self) -> &dyn ConditionNode;

    fn string_by_id(&self, id: &str) -> Option<&YaraString> {
        self.strings()
            .iter()
            .find(|s| s.identifier == id)
            .map(|s| &s.value)
    }
}

/// A boolean expression tree over symbols, built directly by the walk —
/// never assembled as text and evaluated (spec.md §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr {
    Const(bool),
    Sym(usize),
    Not(Box<BoolExpr>),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
}

/// A literal in a CNF/DNF clause: symbol index plus negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Literal {
    pub symbol: usize,
    pub negated: bool,
}

/// Maps each symbol allocated during the walk back to the condition
/// node it was allocated for.
pub struct SymbolMap<'a> {
    nodes: Vec<&'a dyn ConditionNode>,
}

impl<'a> SymbolMap<'a> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, symbol: usize) -> &'a dyn ConditionNode {
        self.nodes[symbol]
    }
}

/// Walk `root`, allocating a fresh symbol for every atomic sub-expression
/// and emitting `And`/`Or`/`Not` for logical structure (spec.md §4.E).
pub fn build_formula<'a>(
    root: &'a dyn ConditionNode,
) -> Result<(BoolExpr, SymbolMap<'a>), CoreError> {
    let mut nodes: Vec<&'a dyn ConditionNode> = Vec::new();
    let expr = walk(root, &mut nodes)?;
    Ok((expr, SymbolMap { nodes }))
}

fn walk<'a>(
    node: &'a dyn ConditionNode,
    nodes: &mut Vec<&'a dyn ConditionNode>,
) -> Result<BoolExpr, CoreError> {
    match node.kind() {
        NodeKind::Not => {
            let operand = node
                .operand()
                .ok_or_else(|| CoreError::Internal("Not node has no operand".to_string()))?;
            Ok(BoolExpr::Not(Box::new(walk(operand, nodes)?)))
        }
        NodeKind::And => {
            let left = node
                .left_operand()
                .ok_or_else(|| CoreError::Internal("And node has no left operand".to_string()))?;
            let right = node
                .right_operand()
                .ok_or_else(|| CoreError::Internal("And node has no right operand".to_string()))?;
            Ok(BoolExpr::And(vec![walk(left, nodes)?, walk(right, nodes)?]))
        }
        NodeKind::Or => {
            let left = node
                .left_operand()
                .ok_or_else(|| CoreError::Internal("Or node has no left operand".to_string()))?;
            let right = node
                .right_operand()
                .ok_or_else(|| CoreError::Internal("Or node has no right operand".to_string()))?;
            Ok(BoolExpr::Or(vec![walk(left, nodes)?, walk(right, nodes)?]))
        }
        NodeKind::Parentheses => {
            let inner = node.enclosed_expr().ok_or_else(|| {
                CoreError::Internal("Parentheses node has no enclosed expression".to_string())
            })?;
            walk(inner, nodes)
        }
        NodeKind::ForInt => {
            // The body's own symbols contribute; a for_int node never
            // gets a symbol of its own (spec.md §4.E).
            let body = node
                .body()
                .ok_or_else(|| CoreError::Internal("ForInt node has no body".to_string()))?;
            walk(body, nodes)
        }
        NodeKind::BoolLiteral => Ok(BoolExpr::Const(node.text() == Some("true"))),
        NodeKind::Unsupported(name) => Err(CoreError::UnsupportedCondition(
            node.text().map(str::to_string).unwrap_or_else(|| name.to_string()),
        )),
        _ => {
            let symbol = nodes.len();
            nodes.push(node);
            Ok(BoolExpr::Sym(symbol))
        }
    }
}

fn as_literal(expr: &BoolExpr) -> Option<Literal> {
    match expr {
        BoolExpr::Sym(i) => Some(Literal {
            symbol: *i,
            negated: false,
        }),
        BoolExpr::Not(inner) => match inner.as_ref() {
            BoolExpr::Sym(i) => Some(Literal {
                symbol: *i,
                negated: true,
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Push negation inward (De Morgan) until every `Not` wraps a bare
/// symbol, leaving the formula in negation-normal form.
fn to_nnf(expr: &BoolExpr, negate: bool) -> BoolExpr {
    match expr {
        BoolExpr::Const(b) => BoolExpr::Const(*b ^ negate),
        BoolExpr::Sym(i) => {
            if negate {
                BoolExpr::Not(Box::new(BoolExpr::Sym(*i)))
            } else {
                BoolExpr::Sym(*i)
            }
        }
        BoolExpr::Not(inner) => to_nnf(inner, !negate),
        BoolExpr::And(children) => {
            let converted: Vec<_> = children.iter().map(|c| to_nnf(c, negate)).collect();
            if negate {
                BoolExpr::Or(converted)
            } else {
                BoolExpr::And(converted)
            }
        }
        BoolExpr::Or(children) => {
            let converted: Vec<_> = children.iter().map(|c| to_nnf(c, negate)).collect();
            if negate {
                BoolExpr::And(converted)
            } else {
                BoolExpr::Or(converted)
            }
        }
    }
}

/// Union two clauses, deduplicating identical `(symbol, negated)` pairs.
/// Deliberately does **not** drop a clause containing both `xi` and
/// `~xi` — no algebraic simplification, per spec.md §9.
fn merge_clause(a: &[Literal], b: &[Literal]) -> Vec<Literal> {
    let mut out = a.to_vec();
    for lit in b {
        if !out.contains(lit) {
            out.push(*lit);
        }
    }
    out
}

/// Cross product of several clause-lists: every combination of one
/// clause from each list, merged. Used to distribute `Or` over `And`'s
/// children when building CNF (and `And` over `Or`'s children for DNF).
fn cross_product(lists: Vec<Vec<Vec<Literal>>>) -> Vec<Vec<Literal>> {
    let mut acc = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(acc.len() * list.len().max(1));
        for a in &acc {
            for b in &list {
                next.push(merge_clause(a, b));
            }
        }
        acc = next;
    }
    acc
}

/// `outer_and`: `true` builds an AND-of-ORs (CNF), `false` an OR-of-ANDs
/// (DNF). Concatenation and cross-product swap roles between the two.
fn clauses(expr: &BoolExpr, outer_and: bool) -> Vec<Vec<Literal>> {
    if let Some(lit) = as_literal(expr) {
        return vec![vec![lit]];
    }
    match expr {
        BoolExpr::Const(true) => {
            if outer_and {
                Vec::new()
            } else {
                vec![Vec::new()]
            }
        }
        BoolExpr::Const(false) => {
            if outer_and {
                vec![Vec::new()]
            } else {
                Vec::new()
            }
        }
        BoolExpr::And(children) => {
            let child_clauses: Vec<_> = children.iter().map(|c| clauses(c, outer_and)).collect();
            if outer_and {
                child_clauses.into_iter().flatten().collect()
            } else {
                cross_product(child_clauses)
            }
        }
        BoolExpr::Or(children) => {
            let child_clauses: Vec<_> = children.iter().map(|c| clauses(c, outer_and)).collect();
            if outer_and {
                cross_product(child_clauses)
            } else {
                child_clauses.into_iter().flatten().collect()
            }
        }
        BoolExpr::Sym(_) | BoolExpr::Not(_) => unreachable!("handled by as_literal above"),
    }
}

/// Convert to conjunctive normal form: a list of clauses, each a list of
/// (possibly negated) symbols, implicitly AND-of-OR. No simplification.
pub fn to_cnf(expr: &BoolExpr) -> Vec<Vec<Literal>> {
    clauses(&to_nnf(expr, false), true)
}

/// Convert to disjunctive normal form: a list of clauses, each a list of
/// (possibly negated) symbols, implicitly OR-of-AND. No simplification.
pub fn to_dnf(expr: &BoolExpr) -> Vec<Vec<Literal>> {
    clauses(&to_nnf(expr, false), false)
}

#[cfg(test)]
#[path = "formula_tests.rs"]
mod tests;
