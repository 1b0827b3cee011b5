//! # Nested Set
//!
//! In-memory model of one taxonomy's tree, used to compute nested set bounds.
//!
//! ## Encoding
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1 Categories 10                                                        │
//! │  ├── 2 Bags 7                                                           │
//! │  │   ├── 3 Totes 4                                                      │
//! │  │   └── 5 Backpacks 6                                                  │
//! │  └── 8 Mugs 9                                                           │
//! │                                                                         │
//! │  descendants(X)  = { n : X.lft < n.lft && n.rgt < X.rgt }               │
//! │  ancestors(X)    = { n : n.lft < X.lft && X.rgt < n.rgt }               │
//! │  siblings keep their order through ascending lft                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tree is built from parent pointers (siblings ordered by their stored
//! `lft`), mutated structurally, then renumbered. Only nodes whose bounds or
//! parent changed need to be written back.

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, CoreResult};
use crate::taxon::Taxon;

/// The tree-related columns of a taxon row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TreeNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
}

impl From<&Taxon> for TreeNode {
    fn from(taxon: &Taxon) -> Self {
        TreeNode {
            id: taxon.id.clone(),
            parent_id: taxon.parent_id.clone(),
            lft: taxon.lft,
            rgt: taxon.rgt,
            depth: taxon.depth,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    parent: Option<String>,
    children: Vec<String>,
}

/// A forest of taxons (normally a single root per taxonomy).
#[derive(Debug, Clone, Default)]
pub struct TaxonTree {
    entries: HashMap<String, Entry>,
    roots: Vec<String>,
}

impl TaxonTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the tree from parent pointers.
    ///
    /// Siblings are ordered by their stored `lft` (ties by id), so this also
    /// serves as the rebuild path when stored bounds are broken.
    pub fn from_nodes(nodes: impl IntoIterator<Item = TreeNode>) -> CoreResult<Self> {
        let mut nodes: Vec<TreeNode> = nodes.into_iter().collect();
        nodes.sort_by(|a, b| a.lft.cmp(&b.lft).then_with(|| a.id.cmp(&b.id)));

        let mut tree = TaxonTree::new();
        for node in &nodes {
            if tree.entries.contains_key(&node.id) {
                return Err(CoreError::CorruptTree(format!("duplicate taxon {}", node.id)));
            }
            tree.entries.insert(
                node.id.clone(),
                Entry {
                    parent: node.parent_id.clone(),
                    children: Vec::new(),
                },
            );
        }

        for node in &nodes {
            match &node.parent_id {
                None => tree.roots.push(node.id.clone()),
                Some(parent) => match tree.entries.get_mut(parent) {
                    Some(entry) => entry.children.push(node.id.clone()),
                    None => {
                        return Err(CoreError::CorruptTree(format!(
                            "taxon {} points to missing parent {}",
                            node.id, parent
                        )))
                    }
                },
            }
        }

        // Every node must be reachable from a root, otherwise parent pointers
        // form a cycle.
        let reachable: usize = tree
            .roots
            .iter()
            .map(|root| 1 + tree.descendants(root).len())
            .sum();
        if reachable != tree.entries.len() {
            return Err(CoreError::CorruptTree(
                "parent pointers contain a cycle".to_string(),
            ));
        }

        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// The first root.
    pub fn root(&self) -> Option<&str> {
        self.roots.first().map(String::as_str)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn parent(&self, id: &str) -> Option<&str> {
        self.entries.get(id).and_then(|e| e.parent.as_deref())
    }

    /// Direct children in sibling order.
    pub fn children(&self, id: &str) -> &[String] {
        self.entries
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.children(id).is_empty()
    }

    /// Ancestors from the root down to the direct parent.
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            chain.push(parent.to_string());
            current = self.parent(parent);
        }
        chain.reverse();
        chain
    }

    /// Number of ancestors.
    pub fn level(&self, id: &str) -> usize {
        self.ancestors(id).len()
    }

    /// All descendants in pre-order.
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<&String> = self.children(id).iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next.clone());
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    pub fn is_descendant_of(&self, id: &str, ancestor: &str) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor)
    }

    /// Adds a new root after the existing ones.
    pub fn add_root(&mut self, id: impl Into<String>) -> CoreResult<()> {
        let id = id.into();
        self.ensure_absent(&id)?;
        self.entries.insert(id.clone(), Entry::default());
        self.roots.push(id);
        Ok(())
    }

    /// Appends `id` as the last child of `parent`.
    pub fn add_child(&mut self, parent: &str, id: impl Into<String>) -> CoreResult<()> {
        let id = id.into();
        self.ensure_absent(&id)?;
        let parent_entry = self
            .entries
            .get_mut(parent)
            .ok_or_else(|| CoreError::TaxonNotFound(parent.to_string()))?;
        parent_entry.children.push(id.clone());
        self.entries.insert(
            id,
            Entry {
                parent: Some(parent.to_string()),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Re-inserts `id` (with its subtree) so it becomes the `index`-th child
    /// of `parent`, counted after `id` left its old position. Indexes past the
    /// end append.
    pub fn move_to_child_with_index(
        &mut self,
        id: &str,
        parent: &str,
        index: usize,
    ) -> CoreResult<()> {
        if !self.contains(id) {
            return Err(CoreError::TaxonNotFound(id.to_string()));
        }
        if !self.contains(parent) {
            return Err(CoreError::TaxonNotFound(parent.to_string()));
        }
        if id == parent || self.is_descendant_of(parent, id) {
            return Err(CoreError::InvalidMove {
                id: id.to_string(),
                reason: "target parent is the taxon itself or one of its descendants"
                    .to_string(),
            });
        }

        self.detach(id);

        let siblings = &mut self
            .entries
            .get_mut(parent)
            .ok_or_else(|| CoreError::TaxonNotFound(parent.to_string()))?
            .children;
        let index = index.min(siblings.len());
        siblings.insert(index, id.to_string());

        if let Some(entry) = self.entries.get_mut(id) {
            entry.parent = Some(parent.to_string());
        }
        Ok(())
    }

    /// Removes `id` and its whole subtree; returns the removed ids, `id` first.
    pub fn remove(&mut self, id: &str) -> CoreResult<Vec<String>> {
        if !self.contains(id) {
            return Err(CoreError::TaxonNotFound(id.to_string()));
        }

        let mut removed = vec![id.to_string()];
        removed.extend(self.descendants(id));

        self.detach(id);
        for gone in &removed {
            self.entries.remove(gone);
        }
        Ok(removed)
    }

    /// Computes bounds for every node, in pre-order.
    pub fn renumber(&self) -> Vec<TreeNode> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut counter = 0i64;
        for root in &self.roots {
            self.number_subtree(root, 0, &mut counter, &mut out);
        }
        out
    }

    fn number_subtree(&self, id: &str, depth: i64, counter: &mut i64, out: &mut Vec<TreeNode>) {
        *counter += 1;
        let slot = out.len();
        out.push(TreeNode {
            id: id.to_string(),
            parent_id: self.parent(id).map(str::to_string),
            lft: *counter,
            rgt: 0,
            depth,
        });
        for child in self.children(id) {
            self.number_subtree(child, depth + 1, counter, out);
        }
        *counter += 1;
        out[slot].rgt = *counter;
    }

    /// Renumbered nodes that differ from `stored` (bounds, depth or parent).
    pub fn changes_from(&self, stored: &[TreeNode]) -> Vec<TreeNode> {
        let stored: HashMap<&str, &TreeNode> =
            stored.iter().map(|n| (n.id.as_str(), n)).collect();
        self.renumber()
            .into_iter()
            .filter(|node| stored.get(node.id.as_str()).map_or(true, |old| *old != node))
            .collect()
    }

    fn detach(&mut self, id: &str) {
        let parent = self.entries.get(id).and_then(|e| e.parent.clone());
        match parent {
            Some(parent) => {
                if let Some(entry) = self.entries.get_mut(&parent) {
                    entry.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
    }

    fn ensure_absent(&self, id: &str) -> CoreResult<()> {
        if self.contains(id) {
            return Err(CoreError::CorruptTree(format!("taxon {} already in tree", id)));
        }
        Ok(())
    }
}

/// Checks stored bounds against the bounds implied by parent pointers.
///
/// Returns `false` for any disagreement, including unparseable trees.
pub fn is_valid(stored: &[TreeNode]) -> bool {
    if !bounds_are_nested(stored) {
        return false;
    }
    let Ok(tree) = TaxonTree::from_nodes(stored.iter().cloned()) else {
        return false;
    };
    tree.changes_from(stored).is_empty()
}

/// Pairwise check that no two intervals partially overlap.
fn bounds_are_nested(nodes: &[TreeNode]) -> bool {
    let mut seen = HashSet::new();
    for node in nodes {
        if node.lft >= node.rgt || !seen.insert(node.lft) || !seen.insert(node.rgt) {
            return false;
        }
    }
    nodes.iter().all(|a| {
        nodes.iter().all(|b| {
            let disjoint = a.rgt < b.lft || b.rgt < a.lft;
            let a_in_b = b.lft < a.lft && a.rgt < b.rgt;
            let b_in_a = a.lft < b.lft && b.rgt < a.rgt;
            a.id == b.id || disjoint || a_in_b || b_in_a
        })
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Categories ─┬─ Bags ─┬─ Totes
    ///             │        └─ Backpacks
    ///             └─ Mugs
    fn sample() -> TaxonTree {
        let mut tree = TaxonTree::new();
        tree.add_root("categories").unwrap();
        tree.add_child("categories", "bags").unwrap();
        tree.add_child("bags", "totes").unwrap();
        tree.add_child("bags", "backpacks").unwrap();
        tree.add_child("categories", "mugs").unwrap();
        tree
    }

    fn bounds(tree: &TaxonTree) -> Vec<(String, i64, i64, i64)> {
        tree.renumber()
            .into_iter()
            .map(|n| (n.id, n.lft, n.rgt, n.depth))
            .collect()
    }

    fn row(id: &str, lft: i64, rgt: i64, depth: i64) -> (String, i64, i64, i64) {
        (id.to_string(), lft, rgt, depth)
    }

    #[test]
    fn test_renumber() {
        assert_eq!(
            bounds(&sample()),
            vec![
                row("categories", 1, 10, 0),
                row("bags", 2, 7, 1),
                row("totes", 3, 4, 2),
                row("backpacks", 5, 6, 2),
                row("mugs", 8, 9, 1),
            ]
        );
    }

    #[test]
    fn test_queries() {
        let tree = sample();
        assert_eq!(tree.root(), Some("categories"));
        assert_eq!(tree.ancestors("totes"), vec!["categories", "bags"]);
        assert!(tree.ancestors("categories").is_empty());
        assert_eq!(
            tree.descendants("categories"),
            vec!["bags", "totes", "backpacks", "mugs"]
        );
        assert_eq!(tree.children("bags"), ["totes", "backpacks"]);
        assert_eq!(tree.level("backpacks"), 2);
        assert!(tree.is_leaf("mugs"));
        assert!(tree.is_descendant_of("totes", "categories"));
        assert!(!tree.is_descendant_of("mugs", "bags"));
    }

    #[test]
    fn test_round_trip_through_nodes() {
        let nodes = sample().renumber();
        let rebuilt = TaxonTree::from_nodes(nodes.clone()).unwrap();
        assert!(rebuilt.changes_from(&nodes).is_empty());
        assert!(is_valid(&nodes));
        assert!(bounds_are_nested(&nodes));
    }

    #[test]
    fn test_move_to_child_with_index() {
        let mut tree = sample();
        tree.move_to_child_with_index("mugs", "bags", 0).unwrap();

        assert_eq!(tree.children("bags"), ["mugs", "totes", "backpacks"]);
        assert_eq!(tree.children("categories"), ["bags"]);
        assert_eq!(tree.parent("mugs"), Some("bags"));
        assert_eq!(
            bounds(&tree),
            vec![
                row("categories", 1, 10, 0),
                row("bags", 2, 9, 1),
                row("mugs", 3, 4, 2),
                row("totes", 5, 6, 2),
                row("backpacks", 7, 8, 2),
            ]
        );
    }

    #[test]
    fn test_reorder_within_parent() {
        let mut tree = sample();
        tree.move_to_child_with_index("totes", "bags", 1).unwrap();
        assert_eq!(tree.children("bags"), ["backpacks", "totes"]);

        // Past the end appends.
        tree.move_to_child_with_index("backpacks", "bags", 99).unwrap();
        assert_eq!(tree.children("bags"), ["totes", "backpacks"]);
    }

    #[test]
    fn test_move_subtree_keeps_descendants() {
        let mut tree = sample();
        tree.move_to_child_with_index("bags", "mugs", 0).unwrap();
        assert_eq!(tree.ancestors("totes"), vec!["categories", "mugs", "bags"]);

        let nodes = tree.renumber();
        let totes = nodes.iter().find(|n| n.id == "totes").unwrap();
        assert_eq!(totes.depth, 3);
        assert!(bounds_are_nested(&nodes));
    }

    #[test]
    fn test_invalid_moves() {
        let mut tree = sample();
        assert!(matches!(
            tree.move_to_child_with_index("bags", "totes", 0),
            Err(CoreError::InvalidMove { .. })
        ));
        assert!(matches!(
            tree.move_to_child_with_index("bags", "bags", 0),
            Err(CoreError::InvalidMove { .. })
        ));
        assert!(matches!(
            tree.move_to_child_with_index("ghost", "bags", 0),
            Err(CoreError::TaxonNotFound(_))
        ));
        // Failed moves leave the tree intact.
        assert_eq!(tree.children("bags"), ["totes", "backpacks"]);
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample();
        let removed = tree.remove("bags").unwrap();
        assert_eq!(removed, vec!["bags", "totes", "backpacks"]);
        assert_eq!(tree.len(), 2);
        assert_eq!(
            bounds(&tree),
            vec![row("categories", 1, 4, 0), row("mugs", 2, 3, 1)]
        );
    }

    #[test]
    fn test_changes_from_only_reports_moved_nodes() {
        let stored = sample().renumber();
        let mut tree = TaxonTree::from_nodes(stored.clone()).unwrap();
        tree.move_to_child_with_index("backpacks", "bags", 0).unwrap();

        let changed: Vec<String> = tree
            .changes_from(&stored)
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(changed, vec!["backpacks", "totes"]);
    }

    #[test]
    fn test_rebuild_from_broken_bounds() {
        let mut stored = sample().renumber();
        // Wipe bounds but keep sibling order hints.
        for (i, node) in stored.iter_mut().enumerate() {
            node.lft = i as i64;
            node.rgt = 0;
        }
        assert!(!is_valid(&stored));

        let rebuilt = TaxonTree::from_nodes(stored).unwrap().renumber();
        assert_eq!(rebuilt, sample().renumber());
    }

    #[test]
    fn test_corrupt_parent_pointers() {
        let missing_parent = vec![TreeNode {
            id: "orphan".to_string(),
            parent_id: Some("nobody".to_string()),
            lft: 1,
            rgt: 2,
            depth: 1,
        }];
        assert!(TaxonTree::from_nodes(missing_parent).is_err());

        let cycle = vec![
            TreeNode {
                id: "a".to_string(),
                parent_id: Some("b".to_string()),
                lft: 1,
                rgt: 4,
                depth: 0,
            },
            TreeNode {
                id: "b".to_string(),
                parent_id: Some("a".to_string()),
                lft: 2,
                rgt: 3,
                depth: 1,
            },
        ];
        assert!(matches!(
            TaxonTree::from_nodes(cycle),
            Err(CoreError::CorruptTree(_))
        ));
    }

    #[test]
    fn test_overlapping_bounds_detected() {
        let overlapping = vec![
            TreeNode {
                id: "a".to_string(),
                parent_id: None,
                lft: 1,
                rgt: 3,
                depth: 0,
            },
            TreeNode {
                id: "b".to_string(),
                parent_id: None,
                lft: 2,
                rgt: 4,
                depth: 0,
            },
        ];
        assert!(!bounds_are_nested(&overlapping));
        assert!(!is_valid(&overlapping));
    }
}
