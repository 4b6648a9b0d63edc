//! [MODULE F] Sub-expression simplification: reduce one symbol's
//! condition node to the byte strings a match of it must contain
//! (spec.md §4.F, §6, §9).
//!
//! [`simplify_expression`] is the public entry point; it delegates shape
//! matching to the internal `simplify_` (mirroring `simplify_expression_`
//! in the source this crate's algorithm is grounded on) and then expands
//! every resolved [`YaraString`] into concrete byte strings — running
//! regex patterns through a [`RegexToDfa`] implementation, hex patterns
//! through [`get_hex_streaks`], and adapting width via [`widen`].
//!
//! A symbol's result is `(required, groups, nocase)`: `required` is how
//! many of `groups` must be present for the symbol to hold, each group
//! is itself a set of byte strings that must **all** be present (a
//! regex/hex pattern can decompose into several segments that co-occur
//! on every accepting path), and `nocase` flags which groups should be
//! matched via case-insensitive n-gram expansion rather than an exact
//! intersection.

use hashbrown::HashSet;

use crate::dfa::RegexToDfa;
use crate::fixedstrings::widen;
use crate::formula::{ConditionNode, NodeKind, Rule, YaraString, unsupported_kind};
use crate::hex::get_hex_streaks;
use sigfilter_runtime::CoreError;

/// One symbol's resolved filter: `required` of `groups` (by index) must
/// all be present in a candidate file's n-gram index for the symbol to
/// hold; `nocase[i]` says group `i` should be matched case-insensitively
/// (any case variant of its single member counts) rather than as an
/// exact AND over every byte string it holds.
#[derive(Debug, Clone)]
pub struct SimplifiedExpr {
    pub required: usize,
    pub groups: Vec<Vec<Vec<u8>>>,
    pub nocase: Vec<bool>,
}

/// Intermediate result of the shape-matching pass: how many of the
/// returned [`YaraString`]s must all be present, and the strings
/// themselves (still unexpanded — regex/hex patterns, not yet resolved
/// to fixed byte strings).
type RawResolution = (usize, Vec<YaraString>);

fn struct_field_size(field: &str) -> Option<usize> {
    match field {
        "pe.machine" => Some(2),
        "pe.number_of_sections" => Some(2),
        _ => None,
    }
}

fn struct_field_constant(name: &str) -> Option<i64> {
    match name {
        "pe.MACHINE_I386" => Some(0x14c),
        _ => None,
    }
}

fn is_kind_name(node: &dyn ConditionNode, name: &str) -> bool {
    matches!(node.kind(), NodeKind::Unsupported(n) if n == name)
}

/// Mirrors `simplify_expression_`: match the node's shape and either
/// resolve it to a fixed count of required [`YaraString`]s, recurse
/// through a binary comparison's operands, or give up (`(0, vec![])`,
/// "undecidable here" — not an error, the caller just can't filter on
/// this symbol). Shapes with no case at all are fatal
/// ([`CoreError::UnsupportedCondition`]), matching the source's
/// `raise Exception("Unknown ...")` catch-all.
fn simplify_(rule: &dyn Rule, expr: &dyn ConditionNode) -> Result<RawResolution, CoreError> {
    match expr.kind() {
        NodeKind::Eq => {
            let left = expr
                .left_operand()
                .ok_or_else(|| CoreError::Internal("Eq node has no left operand".to_string()))?;
            let right = expr
                .right_operand()
                .ok_or_else(|| CoreError::Internal("Eq node has no right operand".to_string()))?;
            if is_kind_name(left, unsupported_kind::STRUCT_ACCESS) {
                if let Some(field) = left.text() {
                    if let Some(size) = struct_field_size(field) {
                        if is_kind_name(right, unsupported_kind::STRUCT_ACCESS) {
                            if let Some(value) = right.text().and_then(struct_field_constant) {
                                let bytes = value.to_le_bytes()[..size].to_vec();
                                return Ok((1, vec![YaraString::ascii(bytes)]));
                            }
                        } else if is_kind_name(right, unsupported_kind::INT_LITERAL) {
                            if let Some(value) = right.value().and_then(|v| v.parse::<i64>().ok())
                            {
                                let bytes = value.to_le_bytes()[..size].to_vec();
                                return Ok((1, vec![YaraString::ascii(bytes)]));
                            }
                        }
                    }
                }
            }
            recurse_binary(rule, left, right)
        }
        NodeKind::FunctionCall => {
            if expr.function_text() == Some("pe.exports") {
                if let Some(arg) = expr.arguments().first() {
                    if let Some(name) = arg.value() {
                        return Ok((1, vec![YaraString::ascii(name.as_bytes().to_vec())]));
                    }
                }
            }
            Ok((0, Vec::new()))
        }
        NodeKind::Lt | NodeKind::Le | NodeKind::Ge | NodeKind::Gt | NodeKind::Minus => {
            let left = expr
                .left_operand()
                .ok_or_else(|| CoreError::Internal("binary node has no left operand".to_string()))?;
            let right = expr.right_operand().ok_or_else(|| {
                CoreError::Internal("binary node has no right operand".to_string())
            })?;
            recurse_binary(rule, left, right)
        }
        NodeKind::StringRef
        | NodeKind::StringAt
        | NodeKind::StringCount
        | NodeKind::StringOffset
        | NodeKind::StringInRange => {
            let id = expr
                .id()
                .ok_or_else(|| CoreError::Internal("string reference has no id".to_string()))?;
            let s = rule.string_by_id(id).ok_or_else(|| {
                CoreError::Internal(format!("rule has no string with identifier ${id}"))
            })?;
            Ok((1, vec![s.clone()]))
        }
        NodeKind::Unsupported(name)
            if matches!(
                name,
                unsupported_kind::INT_LITERAL
                    | unsupported_kind::INT_FUNCTION
                    | unsupported_kind::FILESIZE
                    | unsupported_kind::STRUCT_ACCESS
            ) =>
        {
            Ok((0, Vec::new()))
        }
        NodeKind::Unsupported(name) if name == unsupported_kind::STRING_LITERAL => {
            // only meaningful inside `contains`; bare, it's undecidable.
            Ok((0, Vec::new()))
        }
        NodeKind::StringWildcard => {
            let id = expr.id().ok_or_else(|| {
                CoreError::Internal("wildcard string reference has no id".to_string())
            })?;
            let prefix = id.trim_end_matches('*');
            let matches: Vec<YaraString> = rule
                .strings()
                .iter()
                .filter(|s| s.identifier.starts_with(prefix))
                .map(|s| s.value.clone())
                .collect();
            Ok((matches.len(), matches))
        }
        NodeKind::Set => {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for element in expr.elements() {
                let (_, strings) = simplify_(rule, element.as_ref())?;
                for s in strings {
                    if seen.insert(s.clone()) {
                        out.push(s);
                    }
                }
            }
            let n = out.len();
            Ok((n, out))
        }
        NodeKind::Them => {
            let strings: Vec<YaraString> = rule.strings().iter().map(|s| s.value.clone()).collect();
            let n = strings.len();
            Ok((n, strings))
        }
        NodeKind::Of => {
            let variable = expr
                .variable()
                .ok_or_else(|| CoreError::Internal("of-expression has no variable".to_string()))?;
            let iterated = expr.iterated_set().ok_or_else(|| {
                CoreError::Internal("of-expression has no iterated set".to_string())
            })?;
            let (_, ids) = simplify_(rule, iterated)?;
            let n = match variable.kind() {
                NodeKind::Unsupported(name) if name == unsupported_kind::INT_LITERAL => variable
                    .value()
                    .and_then(|v| v.parse::<usize>().ok())
                    .ok_or_else(|| {
                        CoreError::Internal("of-expression count is not an integer".to_string())
                    })?,
                NodeKind::Unsupported(name) if name == unsupported_kind::ALL => ids.len(),
                NodeKind::Unsupported(name) if name == unsupported_kind::ANY => 1,
                other => {
                    return Err(CoreError::UnsupportedCondition(format!(
                        "unrecognized of-expression quantifier: {other:?}"
                    )));
                }
            };
            Ok((n, ids))
        }
        NodeKind::Contains => {
            let right = expr.right_operand().ok_or_else(|| {
                CoreError::Internal("contains-expression has no right operand".to_string())
            })?;
            simplify_contains(rule, right)
        }
        _ => Err(CoreError::UnsupportedCondition(
            expr.text().unwrap_or("<unknown>").to_string(),
        )),
    }
}

fn recurse_binary(
    rule: &dyn Rule,
    left: &dyn ConditionNode,
    right: &dyn ConditionNode,
) -> Result<RawResolution, CoreError> {
    let (nl, mut l) = simplify_(rule, left)?;
    let (nr, r) = simplify_(rule, right)?;
    l.extend(r);
    Ok((nl + nr, l))
}

/// `contains` treats a bare string literal on its right-hand side as a
/// required case-insensitive ascii+wide substring; anything else falls
/// back to ordinary shape matching (spec.md §4.F).
fn simplify_contains(rule: &dyn Rule, right: &dyn ConditionNode) -> Result<RawResolution, CoreError> {
    if is_kind_name(right, unsupported_kind::STRING_LITERAL) {
        let text = right
            .value()
            .ok_or_else(|| CoreError::Internal("string literal has no value".to_string()))?;
        let s = YaraString {
            bytes: text.as_bytes().to_vec(),
            is_regex: false,
            is_hex: false,
            is_wide: true,
            is_ascii: true,
            is_nocase: true,
        };
        return Ok((1, vec![s]));
    }
    simplify_(rule, right)
}

/// Expand one resolved [`YaraString`] into the groups
/// [`simplify_expression`] returns: a regex expands (via `resolver`)
/// into its fixed substrings, a hex pattern into its hex streaks, and a
/// plain literal is used as-is. Each width the string is actually
/// flagged for (`ascii`/`wide`) becomes its own group, since a match in
/// either width independently satisfies the symbol.
fn expand_groups(
    s: &YaraString,
    resolver: &dyn RegexToDfa,
) -> Result<Vec<(Vec<Vec<u8>>, bool)>, CoreError> {
    let mut out = Vec::new();

    let alternatives: Vec<Vec<u8>> = if s.is_regex {
        let mut strings = resolver.fixed_strings(&s.bytes)?;
        strings.sort();
        strings.dedup();
        strings
    } else if s.is_hex {
        get_hex_streaks(&s.bytes)?.into_iter().collect()
    } else {
        vec![s.bytes.clone()]
    };

    if s.is_regex || s.is_hex {
        if s.is_ascii {
            out.push((alternatives.clone(), s.is_nocase));
        }
        if s.is_wide {
            let widened = alternatives.iter().map(|a| widen(a)).collect();
            out.push((widened, s.is_nocase));
        }
    } else {
        if s.is_wide {
            out.push((vec![widen(&s.bytes)], s.is_nocase));
        }
        if s.is_ascii {
            out.push((vec![s.bytes.clone()], s.is_nocase));
        }
    }

    Ok(out)
}

/// Resolve a symbol's condition node to byte strings (spec.md §4.F).
///
/// `lowerbound` is the shortest byte string this index can filter on
/// (the n-gram width); any alternative shorter than that is dropped,
/// and `required` is decremented (floored at zero) for every group that
/// loses every alternative to the cut — matching `simplify_expression`'s
/// `i = max(0, i - (len(l2) - len(l3)))`.
pub fn simplify_expression(
    rule: &dyn Rule,
    expr: &dyn ConditionNode,
    resolver: &dyn RegexToDfa,
    lowerbound: usize,
) -> Result<SimplifiedExpr, CoreError> {
    let (required, strings) = simplify_(rule, expr)?;

    let mut groups = Vec::new();
    let mut nocase = Vec::new();
    for s in &strings {
        for (alternatives, is_nocase) in expand_groups(s, resolver)? {
            groups.push(alternatives);
            nocase.push(is_nocase);
        }
    }

    let total_groups = groups.len();
    let mut kept_groups = Vec::new();
    let mut kept_nocase = Vec::new();
    for (group, is_nocase) in groups.into_iter().zip(nocase) {
        let filtered: Vec<Vec<u8>> = group.into_iter().filter(|a| a.len() >= lowerbound).collect();
        if !filtered.is_empty() {
            kept_groups.push(filtered);
            kept_nocase.push(is_nocase);
        }
    }

    let dropped = total_groups - kept_groups.len();
    let required = required.saturating_sub(dropped);

    Ok(SimplifiedExpr {
        required,
        groups: kept_groups,
        nocase: kept_nocase,
    })
}

#[cfg(test)]
#[path = "simplify_tests.rs"]
mod tests;
