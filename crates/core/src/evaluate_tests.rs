use super::*;
use crate::formula::{RuleString, YaraString, unsupported_kind};
use crate::store::{HEADER_BYTES, PrefixNaming};
use crate::vlq;
use std::fs;
use std::io::Write as _;
use std::time::Duration;
use tempfile::TempDir;

fn write_prefix_file(dir: &std::path::Path, prefix: [u8; 3], last_byte: u8, fids: &[u32]) {
    let path = dir.join(PrefixNaming::Decimal.relative_path(prefix));
    fs::create_dir_all(path.parent().unwrap()).unwrap();

    let mut payload = Vec::new();
    payload.extend_from_slice(&(fids.len() as u64).to_le_bytes());
    payload.extend_from_slice(&fids[0].to_le_bytes());
    let mut prev = fids[0] as u64;
    for &fid in &fids[1..] {
        vlq::encode_into(fid as u64 - prev, &mut payload);
        prev = fid as u64;
    }

    let mut header = [0xFFu8; HEADER_BYTES];
    let slot = last_byte as usize;
    header[slot * 8..slot * 8 + 8].copy_from_slice(&0u64.to_le_bytes());

    let mut file = fs::File::create(&path).unwrap();
    file.write_all(&header).unwrap();
    file.write_all(&payload).unwrap();
}

fn open_store_with(prefix: [u8; 3], last_byte: u8, fids: &[u32]) -> IndexStore {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), prefix, last_byte, fids);
    // leak the TempDir so the backing directory survives for the store's lifetime
    let path = tmp.path().to_path_buf();
    std::mem::forget(tmp);
    IndexStore::open_dir(path, PrefixNaming::Decimal, 0)
}

/// A fake node tree covering just the shapes these tests need.
enum Node {
    StringRef(&'static str),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Of { n: Box<Node>, set: Box<Node> },
    AnyQuantifier,
    Them,
    Gt(Box<Node>, Box<Node>),
    Filesize,
    IntLiteral(&'static str),
}

impl ConditionNode for Node {
    fn kind(&self) -> NodeKind {
        match self {
            Node::StringRef(_) => NodeKind::StringRef,
            Node::Not(_) => NodeKind::Not,
            Node::And(..) => NodeKind::And,
            Node::Of { .. } => NodeKind::Of,
            Node::AnyQuantifier => NodeKind::Unsupported(unsupported_kind::ANY),
            Node::Them => NodeKind::Them,
            Node::Gt(..) => NodeKind::Gt,
            Node::Filesize => NodeKind::Unsupported(unsupported_kind::FILESIZE),
            Node::IntLiteral(_) => NodeKind::Unsupported(unsupported_kind::INT_LITERAL),
        }
    }

    fn id(&self) -> Option<&str> {
        match self {
            Node::StringRef(s) => Some(s),
            _ => None,
        }
    }

    fn value(&self) -> Option<&str> {
        match self {
            Node::IntLiteral(v) => Some(v),
            _ => None,
        }
    }

    fn operand(&self) -> Option<&dyn ConditionNode> {
        match self {
            Node::Not(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }

    fn left_operand(&self) -> Option<&dyn ConditionNode> {
        match self {
            Node::And(l, _) | Node::Gt(l, _) => Some(l.as_ref()),
            _ => None,
        }
    }

    fn right_operand(&self) -> Option<&dyn ConditionNode> {
        match self {
            Node::And(_, r) | Node::Gt(_, r) => Some(r.as_ref()),
            _ => None,
        }
    }

    fn variable(&self) -> Option<&dyn ConditionNode> {
        match self {
            Node::Of { n, .. } => Some(n.as_ref()),
            _ => None,
        }
    }

    fn iterated_set(&self) -> Option<&dyn ConditionNode> {
        match self {
            Node::Of { set, .. } => Some(set.as_ref()),
            _ => None,
        }
    }
}

struct FakeRule {
    strings: Vec<RuleString>,
    condition: Node,
}

impl FakeRule {
    fn new(strings: Vec<(&str, &[u8])>, condition: Node) -> Self {
        Self {
            strings: strings
                .into_iter()
                .map(|(id, bytes)| RuleString {
                    identifier: id.to_string(),
                    value: YaraString::ascii(bytes.to_vec()),
                })
                .collect(),
            condition,
        }
    }
}

impl Rule for FakeRule {
    fn strings(&self) -> &[RuleString] {
        &self.strings
    }
    fn condition(&self) -> &dyn ConditionNode {
        &self.condition
    }
}

struct NoRegex;
impl RegexToDfa for NoRegex {
    fn fixed_strings(&self, _pattern: &[u8]) -> Result<Vec<Vec<u8>>, CoreError> {
        Ok(Vec::new())
    }
}

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn single_literal_resolves_to_its_posting_list() {
    let store = open_store_with([b'a', b'b', b'c'], b'd', &[2, 5]);
    let rule = FakeRule::new(vec![("a", b"abcd")], Node::StringRef("a"));

    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, Some(vec![2, 5]));
}

#[test]
fn and_of_two_literals_intersects_their_posting_lists() {
    let tmp_a = TempDir::new().unwrap();
    write_prefix_file(tmp_a.path(), [b'a', b'b', b'c'], b'd', &[1, 2, 3]);
    write_prefix_file(tmp_a.path(), [b'w', b'x', b'y'], b'z', &[2, 3, 4]);
    let store = IndexStore::open_dir(tmp_a.path().to_path_buf(), PrefixNaming::Decimal, 0);

    let rule = FakeRule::new(
        vec![("a", b"abcd"), ("b", b"wxyz")],
        Node::And(Box::new(Node::StringRef("a")), Box::new(Node::StringRef("b"))),
    );

    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, Some(vec![2, 3]));
}

#[test]
fn one_of_them_unions_across_every_string() {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), [b'a', b'b', b'c'], b'd', &[1, 2]);
    write_prefix_file(tmp.path(), [b'w', b'x', b'y'], b'z', &[3, 4]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 0);

    let rule = FakeRule::new(
        vec![("a", b"abcd"), ("b", b"wxyz")],
        Node::Of {
            n: Box::new(Node::AnyQuantifier),
            set: Box::new(Node::Them),
        },
    );

    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, Some(vec![1, 2, 3, 4]));
}

#[test]
fn filesize_only_condition_is_unfilterable() {
    let store = open_store_with([b'a', b'b', b'c'], b'd', &[1]);
    let rule = FakeRule::new(
        Vec::new(),
        Node::Gt(Box::new(Node::Filesize), Box::new(Node::IntLiteral("1000"))),
    );

    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, None);
}

#[test]
fn negated_string_forces_the_whole_rule_unfilterable() {
    let store = open_store_with([b'a', b'b', b'c'], b'd', &[1, 2]);
    let rule = FakeRule::new(
        vec![("a", b"abcd")],
        Node::Not(Box::new(Node::StringRef("a"))),
    );

    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, None);
}

#[test]
fn and_with_an_undecidable_literal_still_filters_on_the_decidable_one() {
    let store = open_store_with([b'a', b'b', b'c'], b'd', &[2, 5]);
    let rule = FakeRule::new(
        vec![("a", b"abcd")],
        Node::And(
            Box::new(Node::StringRef("a")),
            Box::new(Node::Gt(Box::new(Node::Filesize), Box::new(Node::IntLiteral("1000")))),
        ),
    );

    // $a and filesize > 1000: the filesize comparison is undecidable
    // (x1 -> None), but it must not drop the whole rule to "unfilterable"
    // — only a clause where *every* literal is None does that. Here the
    // CNF clause [x1] alone is universe and gets dropped, leaving $a's
    // own posting list as the result.
    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, Some(vec![2, 5]));
}

#[test]
fn negated_conjunct_does_not_blank_out_the_other_conjunct() {
    let tmp = TempDir::new().unwrap();
    write_prefix_file(tmp.path(), [b'a', b'b', b'c'], b'd', &[1, 2]);
    write_prefix_file(tmp.path(), [b'w', b'x', b'y'], b'z', &[2, 3]);
    let store = IndexStore::open_dir(tmp.path().to_path_buf(), PrefixNaming::Decimal, 0);

    let rule = FakeRule::new(
        vec![("a", b"abcd"), ("b", b"wxyz")],
        Node::And(
            Box::new(Node::Not(Box::new(Node::StringRef("a")))),
            Box::new(Node::StringRef("b")),
        ),
    );

    // `not $a and $b`: $a is forced to None because it appears negated,
    // but that must only drop its own clause, not the whole rule — the
    // result should be exactly $b's posting list.
    let result = evaluate_rule(&store, &rule, &NoRegex, 4, None, None, TIMEOUT).unwrap();
    assert_eq!(result, Some(vec![2, 3]));
}

#[test]
fn merged_index_fans_out_the_n3_fallback_and_rebases_fids() {
    let tmp_a = TempDir::new().unwrap();
    write_prefix_file(tmp_a.path(), [b'x', b'y', b'z'], 0, &[7]);
    let store_a = IndexStore::open_dir(tmp_a.path().to_path_buf(), PrefixNaming::Decimal, 10);

    let tmp_b = TempDir::new().unwrap();
    write_prefix_file(tmp_b.path(), [b'x', b'y', b'z'], 0, &[2]);
    let store_b = IndexStore::open_dir(tmp_b.path().to_path_buf(), PrefixNaming::Decimal, 10);

    let merged = MergedIndex::new(vec![(0, store_a), (100, store_b)]);
    let rule = FakeRule::new(vec![("a", b"xyz")], Node::StringRef("a"));

    let result = evaluate_rule(&merged, &rule, &NoRegex, 3, None, None, TIMEOUT).unwrap();
    assert_eq!(result, Some(vec![7, 102]));
}
