//! [MODULE D, part 1] A minimal DFA graph and the fixed-string walk that
//! extracts guaranteed-present substrings from it (spec.md §4.D, §6).
//!
//! The graph comes from an external regex-to-DFA tool's tab-separated
//! output: `src dst input_byte output_byte` lines, terminated by one line
//! holding the accept state. Building the immediate-dominator tree (to
//! find the states every accepting path must pass through) uses the
//! Cooper/Harvey/Kennedy iterative fixed-point rather than a full
//! Lengauer-Tarjan implementation — these graphs are small, and the
//! teacher's own galloping intersection shows the house style of
//! hand-rolling a simple algorithm over pulling in a crate for it.

use std::path::{Path, PathBuf};
use std::process::Command;

use hashbrown::{HashMap, HashSet};

use sigfilter_runtime::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfaEdge {
    pub src: u32,
    pub dst: u32,
    pub byte: u8,
}

pub struct Dfa {
    edges: Vec<DfaEdge>,
    start: u32,
    end: u32,
}

impl Dfa {
    /// Parse the `src<TAB>dst<TAB>input_byte<TAB>output_byte` + accept-state
    /// format described in spec.md §6.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let mut edges = Vec::new();
        let mut end = None;

        for line in text.lines() {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            let items: Vec<&str> = line.split('\t').collect();
            if items.len() == 4 {
                let src: u32 = items[0]
                    .parse()
                    .map_err(|_| CoreError::InvalidQuery(format!("bad dfa edge line: {line}")))?;
                let dst: u32 = items[1]
                    .parse()
                    .map_err(|_| CoreError::InvalidQuery(format!("bad dfa edge line: {line}")))?;
                let input_byte: u32 = items[2]
                    .parse()
                    .map_err(|_| CoreError::InvalidQuery(format!("bad dfa edge line: {line}")))?;
                edges.push(DfaEdge {
                    src,
                    dst,
                    byte: input_byte as u8,
                });
            } else if items.len() == 1 {
                end = Some(
                    items[0]
                        .parse()
                        .map_err(|_| CoreError::InvalidQuery(format!("bad dfa accept line: {line}")))?,
                );
                break;
            } else {
                return Err(CoreError::InvalidQuery(format!(
                    "malformed dfa line: {line}"
                )));
            }
        }

        let end = end.ok_or_else(|| {
            CoreError::InvalidQuery("dfa text had no accept-state line".to_string())
        })?;

        Ok(Self { edges, start: 0, end })
    }

    fn out_edges(&self, node: u32) -> impl Iterator<Item = &DfaEdge> {
        self.edges.iter().filter(move |e| e.src == node)
    }

    /// Fixed strings every accepting path through this DFA is guaranteed
    /// to contain, longest first, deduplicated.
    pub fn fixed_strings(&self) -> Vec<Vec<u8>> {
        let idom = self.immediate_dominators();

        let mut relevant = vec![self.end];
        let mut node = self.end;
        while node != self.start {
            let Some(&d) = idom.get(&node) else { break };
            node = d;
            relevant.push(node);
        }
        relevant.reverse();

        let mut strings: Vec<Vec<u8>> = Vec::new();
        let mut seen: HashSet<u32> = HashSet::new();

        for &start_node in &relevant {
            let mut collected = Vec::new();
            let mut cur = start_node;
            loop {
                let edges: Vec<&DfaEdge> = self.out_edges(cur).collect();
                if edges.len() != 1 {
                    break;
                }
                let edge = edges[0];
                if seen.contains(&edge.src) || edge.src == self.end {
                    break;
                }
                seen.insert(edge.src);
                collected.push(edge.byte);
                cur = edge.dst;
            }
            if !collected.is_empty() {
                strings.push(collected);
            }
        }

        strings.sort();
        strings.dedup();
        strings
    }

    fn immediate_dominators(&self) -> HashMap<u32, u32> {
        let mut postorder = Vec::new();
        let mut visited = HashSet::new();
        self.dfs_postorder(self.start, &mut visited, &mut postorder);

        // postorder[i] finished at "time" i; higher = finished later.
        // The start node finishes last, so it has the highest number.
        let postnum: HashMap<u32, usize> = postorder
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, i))
            .collect();

        let mut preds: HashMap<u32, Vec<u32>> = HashMap::new();
        for edge in &self.edges {
            if postnum.contains_key(&edge.src) && postnum.contains_key(&edge.dst) {
                preds.entry(edge.dst).or_default().push(edge.src);
            }
        }

        // Process in reverse postorder: descending postorder number.
        let mut rpo = postorder.clone();
        rpo.sort_by_key(|&n| std::cmp::Reverse(postnum[&n]));

        let mut idom: HashMap<u32, u32> = HashMap::new();
        idom.insert(self.start, self.start);

        let mut changed = true;
        while changed {
            changed = false;
            for &node in &rpo {
                if node == self.start {
                    continue;
                }
                let Some(node_preds) = preds.get(&node) else {
                    continue;
                };

                let mut new_idom = None;
                for &p in node_preds {
                    if idom.contains_key(&p) {
                        new_idom = Some(match new_idom {
                            None => p,
                            Some(cur) => intersect(cur, p, &idom, &postnum),
                        });
                    }
                }
                let Some(new_idom) = new_idom else { continue };

                if idom.get(&node) != Some(&new_idom) {
                    idom.insert(node, new_idom);
                    changed = true;
                }
            }
        }

        idom.remove(&self.start);
        idom
    }

    fn dfs_postorder(&self, node: u32, visited: &mut HashSet<u32>, out: &mut Vec<u32>) {
        if !visited.insert(node) {
            return;
        }
        let mut seen_dsts = HashSet::new();
        for edge in self.out_edges(node) {
            if seen_dsts.insert(edge.dst) {
                self.dfs_postorder(edge.dst, visited, out);
            }
        }
        out.push(node);
    }
}

fn intersect(
    mut finger1: u32,
    mut finger2: u32,
    idom: &HashMap<u32, u32>,
    postnum: &HashMap<u32, usize>,
) -> u32 {
    while finger1 != finger2 {
        while postnum[&finger1] < postnum[&finger2] {
            finger1 = idom[&finger1];
        }
        while postnum[&finger2] < postnum[&finger1] {
            finger2 = idom[&finger2];
        }
    }
    finger1
}

/// Resolves a regex pattern to the fixed byte-strings every match of it
/// must contain (spec.md §4.D). The simplifier (module F) depends on this
/// trait rather than on [`Dfa`] directly, so tests can supply a canned
/// DFA without shelling out to the real `regex2dfa`-style tool.
pub trait RegexToDfa {
    fn fixed_strings(&self, pattern: &[u8]) -> Result<Vec<Vec<u8>>, CoreError>;
}

/// The real implementation: invokes an external `regex2dfa`-style binary
/// per spec.md §6 (`<tool> -r <pattern>`, tab-separated edges then one
/// accept-state line on stdout) and runs the dominator walk over the
/// result.
pub struct ExternalRegexToDfa {
    pub tool_path: PathBuf,
}

impl ExternalRegexToDfa {
    pub fn new(tool_path: impl Into<PathBuf>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }
}

impl RegexToDfa for ExternalRegexToDfa {
    fn fixed_strings(&self, pattern: &[u8]) -> Result<Vec<Vec<u8>>, CoreError> {
        let pattern = std::str::from_utf8(pattern).map_err(|_| {
            CoreError::UnsupportedCondition("regex pattern is not valid UTF-8".to_string())
        })?;
        let text = run_regex2dfa(&self.tool_path, pattern)?;
        let dfa = Dfa::parse(&text)?;
        Ok(dfa.fixed_strings())
    }
}

fn run_regex2dfa(tool_path: &Path, pattern: &str) -> Result<String, CoreError> {
    let output = Command::new(tool_path)
        .arg("-r")
        .arg(pattern)
        .output()
        .map_err(CoreError::Io)?;
    if !output.status.success() {
        return Err(CoreError::Io(std::io::Error::other(format!(
            "regex2dfa exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ))));
    }
    String::from_utf8(output.stdout)
        .map_err(|_| CoreError::CorruptIndex("regex2dfa output is not valid UTF-8".to_string()))
}

#[cfg(test)]
#[path = "dfa_tests.rs"]
mod tests;
