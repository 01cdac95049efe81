//! Plan Tree Model - engine-agnostic representation of an execution plan
//!
//! A [`PlanTree`] owns every [`PlanNode`] in a flat array. Nodes refer to their
//! children by index, and the tree records which indices are roots. The parent
//! relation is always a forest: every node has at most one parent, every child
//! index is in bounds, and there are no cycles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqltrace_core::{ParseError, ParseErrorKind, PlanPath};

/// A single operation in an execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Operation tag such as "Seq Scan" or "Hash Join"
    pub node_type: String,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    /// Estimated cost before the first row is produced
    #[serde(default)]
    pub startup_cost: Option<f64>,
    /// Estimated cost to produce all rows
    #[serde(default)]
    pub total_cost: Option<f64>,
    /// Measured time to the first row, in milliseconds
    #[serde(default)]
    pub actual_startup_time: Option<f64>,
    /// Measured time to the last row, in milliseconds
    #[serde(default)]
    pub actual_total_time: Option<f64>,
    #[serde(default)]
    pub actual_rows: Option<u64>,
    /// Engine-native properties ("Index Cond", "Filter", "possible_keys", ...), unmodified
    #[serde(default)]
    pub extra: IndexMap<String, Value>,
    /// Indices of child nodes in the owning tree, in plan order
    #[serde(default)]
    pub children: Vec<usize>,
}

impl PlanNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            relation_name: None,
            alias: None,
            startup_cost: None,
            total_cost: None,
            actual_startup_time: None,
            actual_total_time: None,
            actual_rows: None,
            extra: IndexMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation_name = Some(relation.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_cost(mut self, startup: f64, total: f64) -> Self {
        self.startup_cost = Some(startup);
        self.total_cost = Some(total);
        self
    }

    pub fn with_actual_time(mut self, startup: f64, total: f64) -> Self {
        self.actual_startup_time = Some(startup);
        self.actual_total_time = Some(total);
        self
    }

    pub fn with_actual_rows(mut self, rows: u64) -> Self {
        self.actual_rows = Some(rows);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<usize>) -> Self {
        self.children = children;
        self
    }

    /// Coarse classification of `node_type`
    pub fn kind(&self) -> NodeKind {
        NodeKind::classify(&self.node_type)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Cost spent after the first row (total - startup), when both are reported
    pub fn run_cost(&self) -> Option<f64> {
        match (self.startup_cost, self.total_cost) {
            (Some(startup), Some(total)) => Some(total - startup),
            _ => None,
        }
    }

    /// String value of an extra property, if present and a string
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// True when any of `keys` is present in `extra` with a non-null value
    pub fn has_any_extra(&self, keys: &[String]) -> bool {
        keys.iter()
            .any(|key| self.extra.get(key).is_some_and(|v| !v.is_null()))
    }
}

/// Coarse operation category used by the advisor rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Reads every row of a table
    FullScan,
    /// Uses an index to find rows
    IndexScan,
    NestedLoop,
    /// Hash, merge or other non nested-loop join
    Join,
    Sort,
    Aggregate,
    Other,
}

impl NodeKind {
    /// Classifies a node type from the common plan vocabulary
    pub fn classify(node_type: &str) -> Self {
        match node_type.trim() {
            "Seq Scan" | "Parallel Seq Scan" | "Full Scan" => Self::FullScan,
            "Index Scan" | "Index Only Scan" | "Bitmap Index Scan" | "Bitmap Heap Scan"
            | "Tid Scan" | "TID Scan" => Self::IndexScan,
            "Nested Loop" => Self::NestedLoop,
            "Hash Join" | "Merge Join" => Self::Join,
            "Sort" | "Incremental Sort" => Self::Sort,
            "Aggregate" | "GroupAggregate" | "Group Aggregate" | "HashAggregate"
            | "Hash Aggregate" | "WindowAgg" => Self::Aggregate,
            other if other.ends_with(" Join") => Self::Join,
            _ => Self::Other,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::FullScan => "Full table scan",
            Self::IndexScan => "Index-assisted scan",
            Self::NestedLoop => "Nested loop join",
            Self::Join => "Hash or merge join",
            Self::Sort => "Sort",
            Self::Aggregate => "Aggregate",
            Self::Other => "Other operation",
        }
    }
}

/// Flat, index-addressed execution plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanTreeParts")]
pub struct PlanTree {
    nodes: Vec<PlanNode>,
    root_indices: Vec<usize>,
}

/// Unvalidated wire form of a [`PlanTree`]
#[derive(Deserialize)]
struct PlanTreeParts {
    nodes: Vec<PlanNode>,
    root_indices: Vec<usize>,
}

impl TryFrom<PlanTreeParts> for PlanTree {
    type Error = ParseError;

    fn try_from(parts: PlanTreeParts) -> Result<Self, Self::Error> {
        Self::from_parts(parts.nodes, parts.root_indices)
    }
}

impl PlanTree {
    /// A tree with no nodes
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a tree from nodes and roots, checking the forest invariant
    pub fn from_parts(nodes: Vec<PlanNode>, root_indices: Vec<usize>) -> Result<Self, ParseError> {
        let tree = Self {
            nodes,
            root_indices,
        };
        tree.validate()?;
        Ok(tree)
    }

    /// Construction path for the normalizer, whose traversal guarantees the invariant
    pub(crate) fn from_normalized(nodes: Vec<PlanNode>, root_indices: Vec<usize>) -> Self {
        let tree = Self {
            nodes,
            root_indices,
        };
        debug_assert!(tree.validate().is_ok());
        tree
    }

    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn root_indices(&self) -> &[usize] {
        &self.root_indices
    }

    pub fn node(&self, index: usize) -> Option<&PlanNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `index` with their indices, in plan order
    pub fn children(&self, index: usize) -> impl Iterator<Item = (usize, &PlanNode)> + '_ {
        self.nodes
            .get(index)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|&child| self.nodes.get(child).map(|node| (child, node)))
    }

    /// Parent of every node, reconstructed from the children lists
    pub fn parent_indices(&self) -> Vec<Option<usize>> {
        let mut parents = vec![None; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                if let Some(slot) = parents.get_mut(child) {
                    *slot = Some(index);
                }
            }
        }
        parents
    }

    /// Number of nodes on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack: Vec<(usize, usize)> = self.root_indices.iter().map(|&r| (r, 1)).collect();
        while let Some((index, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            for (child, _) in self.children(index) {
                stack.push((child, depth + 1));
            }
        }
        max_depth
    }

    /// Depth-first, parent-before-children traversal from each root in order
    pub fn iter_pre_order(&self) -> PreOrder<'_> {
        PreOrder::new(self)
    }

    /// Node with the largest reported `total_cost`; ties go to the lowest index
    pub fn most_expensive(&self) -> Option<(usize, &PlanNode)> {
        let mut best: Option<(usize, &PlanNode, f64)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(cost) = node.total_cost
                && best.is_none_or(|(_, _, best_cost)| cost > best_cost)
            {
                best = Some((index, node, cost));
            }
        }
        best.map(|(index, node, _)| (index, node))
    }

    /// Checks the forest invariant
    pub fn validate(&self) -> Result<(), ParseError> {
        let len = self.nodes.len();
        let mut parent: Vec<Option<usize>> = vec![None; len];

        for (index, node) in self.nodes.iter().enumerate() {
            let children_path = PlanPath::root().key("nodes").index(index).key("children");
            for (position, &child) in node.children.iter().enumerate() {
                let path = children_path.index(position);
                if child >= len {
                    return Err(ParseError::new(
                        path,
                        ParseErrorKind::ChildOutOfBounds { child, len },
                    ));
                }
                if parent[child].is_some() {
                    return Err(ParseError::new(
                        path,
                        ParseErrorKind::MultipleParents { child },
                    ));
                }
                parent[child] = Some(index);
            }
        }

        let roots_path = PlanPath::root().key("root_indices");
        let mut is_root = vec![false; len];
        for (position, &root) in self.root_indices.iter().enumerate() {
            if root >= len {
                return Err(ParseError::new(
                    roots_path.index(position),
                    ParseErrorKind::ChildOutOfBounds { child: root, len },
                ));
            }
            if is_root[root] || parent[root].is_some() {
                return Err(ParseError::new(roots_path, ParseErrorKind::RootMismatch));
            }
            is_root[root] = true;
        }
        if parent
            .iter()
            .zip(&is_root)
            .any(|(parent, &root)| parent.is_none() && !root)
        {
            return Err(ParseError::new(roots_path, ParseErrorKind::RootMismatch));
        }

        // Every node has at most one parent, so anything unreachable from a root sits on a cycle.
        if self.iter_pre_order().count() != len {
            return Err(ParseError::at_root(ParseErrorKind::Cycle));
        }

        Ok(())
    }
}

/// Pre-order iterator over `(index, node)` pairs
pub struct PreOrder<'a> {
    tree: &'a PlanTree,
    stack: Vec<usize>,
    visited: Vec<bool>,
}

impl<'a> PreOrder<'a> {
    fn new(tree: &'a PlanTree) -> Self {
        Self {
            tree,
            stack: tree.root_indices.iter().rev().copied().collect(),
            visited: vec![false; tree.nodes.len()],
        }
    }
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = (usize, &'a PlanNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.stack.pop()?;
            let Some(node) = self.tree.nodes.get(index) else {
                continue;
            };
            // Guards against revisiting when iterating a tree that failed validation
            if std::mem::replace(&mut self.visited[index], true) {
                continue;
            }
            // Push children in reverse order so we visit them in order
            self.stack.extend(node.children.iter().rev());
            return Some((index, node));
        }
    }
}
