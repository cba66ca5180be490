//! Decision tree over the operations of one extension
//!
//! Each internal node switches on the value of one field. The field is picked greedily: among
//! the fields that take at least two distinct values in the current group, the one whose
//! largest child is smallest wins, then the one with the fewest operations summed over all
//! children, then the one declared first. Operations that do not fix the chosen field are
//! copied into every arm and into the default branch. A group that no field splits becomes a
//! leaf, scanned linearly with the most specific encodings first.
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    codegen::{ident, Stmt},
    dispatch::{build_dispatch, build_recognizer_excluding, ResolvedOperation},
    error::{Error, Result},
    expr::Expr,
    field::CompiledField,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Switch {
        field: Arc<CompiledField>,
        arms: BTreeMap<u64, Node>,
        /// Taken when the field value has no arm
        default: Box<Node>,
    },
    /// Indices of candidate operations in scan order
    Leaf(Vec<usize>),
}

impl Node {
    /// Number of switches on the longest path from this node to a leaf
    pub fn depth(&self) -> usize {
        match self {
            Node::Switch { arms, default, .. } => {
                1 + arms.values().chain([default.as_ref()]).map(Node::depth).max().unwrap_or(0)
            }
            Node::Leaf(_) => 0,
        }
    }

    /// Length of the longest leaf scan
    pub fn max_leaf(&self) -> usize {
        match self {
            Node::Switch { arms, default, .. } => {
                arms.values().chain([default.as_ref()]).map(Node::max_leaf).max().unwrap_or(0)
            }
            Node::Leaf(members) => members.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionTree {
    operations: Vec<ResolvedOperation>,
    root: Node,
}

/// How one candidate field would split a group
struct Split<'a> {
    field: &'a Arc<CompiledField>,
    arms: BTreeMap<u64, Vec<usize>>,
    wildcards: Vec<usize>,
}

impl Split<'_> {
    /// (largest child, total size); smaller is better
    fn cost(&self) -> (usize, usize) {
        let wild = self.wildcards.len();
        let worst = self.arms.values().map(|arm| arm.len() + wild).max().unwrap_or(0).max(wild);
        let total = self.arms.values().map(|arm| arm.len() + wild).sum::<usize>() + wild;
        (worst, total)
    }
}

impl DecisionTree {
    pub fn build(operations: Vec<ResolvedOperation>) -> Self {
        let members = (0..operations.len()).collect();
        let root = build_node(&operations, members);
        debug!(
            operations = operations.len(),
            depth = root.depth(),
            max_leaf = root.max_leaf(),
            "built decision tree"
        );
        Self { operations, root }
    }

    pub fn operations(&self) -> &[ResolvedOperation] {
        &self.operations
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Walk the tree for `word`; [`Error::NoMatch`] when no operation recognizes it
    pub fn descend(&self, word: u64) -> Result<&ResolvedOperation> {
        let mut node = &self.root;
        loop {
            match node {
                Node::Switch { field, arms, default } => {
                    node = arms.get(&field.extract(word)).unwrap_or(default.as_ref());
                }
                Node::Leaf(members) => {
                    return members
                        .iter()
                        .map(|&i| &self.operations[i])
                        .find(|op| op.matches(word))
                        .ok_or(Error::NoMatch { word });
                }
            }
        }
    }

    /// Fields the generated body reads: switch fields, leaf recognizer fields and output fields,
    /// in first-use order
    pub fn used_fields(&self) -> Vec<Arc<CompiledField>> {
        let mut used = IndexMap::new();
        collect_switch_fields(&self.root, &mut used);
        for op in &self.operations {
            for field in op.fixed().iter().map(|f| &f.field).chain(op.output()) {
                used.entry(field.name().to_string()).or_insert_with(|| field.clone());
            }
        }
        used.into_values().collect()
    }

    /// Render the tree as statements. Every recognized operation calls its handler and returns;
    /// words reaching an empty leaf or an unmatched scan run `fallback`.
    pub fn to_stmts(&self, fallback: &[Stmt]) -> Vec<Stmt> {
        self.node_stmts(&self.root, &mut Vec::new(), fallback)
    }

    fn node_stmts<'a>(
        &'a self,
        node: &'a Node,
        decided: &mut Vec<&'a str>,
        fallback: &[Stmt],
    ) -> Vec<Stmt> {
        match node {
            Node::Switch { field, arms, default } => {
                decided.push(field.name());
                let arms = arms
                    .iter()
                    .map(|(value, child)| {
                        let key = Expr::lit(*value, field.value_width());
                        (key, self.node_stmts(child, decided, fallback))
                    })
                    .collect();
                decided.pop();
                // the default branch did not learn the field's value
                let default = self.node_stmts(default, decided, fallback);
                vec![Stmt::Switch { scrutinee: Expr::var(ident(field.name())), arms, default }]
            }
            Node::Leaf(members) => {
                let mut branches = Vec::new();
                let mut otherwise = fallback.to_vec();
                for op in members.iter().map(|&i| &self.operations[i]) {
                    let body = vec![Stmt::Expr(build_dispatch(op)), Stmt::Return];
                    match build_recognizer_excluding(op, decided) {
                        Some(test) => branches.push((test, body)),
                        None => {
                            // nothing left to test, later candidates are unreachable
                            otherwise = body;
                            break;
                        }
                    }
                }
                if branches.is_empty() {
                    otherwise
                } else {
                    vec![Stmt::If { branches, otherwise }]
                }
            }
        }
    }
}

/// Shorthand for [`DecisionTree::build`]
pub fn build_decision_tree(operations: Vec<ResolvedOperation>) -> DecisionTree {
    DecisionTree::build(operations)
}

fn collect_switch_fields(node: &Node, used: &mut IndexMap<String, Arc<CompiledField>>) {
    if let Node::Switch { field, arms, default } = node {
        used.entry(field.name().to_string()).or_insert_with(|| field.clone());
        for child in arms.values().chain([default.as_ref()]) {
            collect_switch_fields(child, used);
        }
    }
}

fn build_node(ops: &[ResolvedOperation], members: Vec<usize>) -> Node {
    let best = candidate_splits(ops, &members).into_iter().min_by_key(|split| split.cost());
    let Some(split) = best else {
        let mut members = members;
        members.sort_by_key(|&i| Reverse(ops[i].specificity()));
        return Node::Leaf(members);
    };

    let Split { field, arms, wildcards } = split;
    let arms = arms
        .into_iter()
        .map(|(value, mut group)| {
            group.extend(&wildcards);
            group.sort_unstable();
            (value, build_node(ops, group))
        })
        .collect();
    Node::Switch { field: field.clone(), arms, default: Box::new(build_node(ops, wildcards)) }
}

/// Every field that separates `members` into at least two value groups, in first-seen order
fn candidate_splits<'a>(ops: &'a [ResolvedOperation], members: &[usize]) -> Vec<Split<'a>> {
    let mut seen = BTreeSet::new();
    let mut splits = Vec::new();
    for fixed in members.iter().flat_map(|&i| ops[i].fixed()) {
        let name = fixed.field.name();
        if !seen.insert(name) {
            continue;
        }
        let mut arms: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        let mut wildcards = Vec::new();
        for &i in members {
            match ops[i].fixed_value(name) {
                Some(value) => arms.entry(value).or_default().push(i),
                None => wildcards.push(i),
            }
        }
        if arms.len() >= 2 {
            splits.push(Split { field: &fixed.field, arms, wildcards });
        }
    }
    splits
}
