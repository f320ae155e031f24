//! Chapter tree model
//!
//! The work-breakdown outline: chapters nested under chapters, each with a
//! dotted number that always reflects its position under its parent.
//! Operations never fail; an unknown key leaves the tree unchanged.

mod numbering;
mod walk;

pub use numbering::{child_num, compare_nums, next_root_num};
pub use walk::{walk, walk_mut, Flow, Position};

use crate::types::ChapterKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

/// Label given to a freshly added sub-chapter
pub const NEW_CHILD_LABEL: &str = "Nouveau poste";

/// Label given to a freshly added root chapter
pub const NEW_ROOT_LABEL: &str = "Nouveau chapitre";

/// A chapter and its sub-chapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterNode {
    pub key: ChapterKey,
    pub num: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ChapterKey>,
    #[serde(default)]
    pub children: Vec<ChapterNode>,
}

impl ChapterNode {
    /// `"<num> - <label>"`, as shown in headers
    pub fn title(&self) -> String {
        format!("{} - {}", self.num, self.label)
    }

    fn fresh(num: String, label: &str, parent_id: Option<ChapterKey>) -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            num,
            label: label.to_string(),
            parent_id,
            children: Vec::new(),
        }
    }
}

/// A chapter as it arrives from a flat list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatChapter {
    pub key: ChapterKey,
    pub num: String,
    pub label: String,
    #[serde(default)]
    pub parent_id: Option<ChapterKey>,
}

/// Ordered forest of chapters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterTree {
    roots: Vec<ChapterNode>,
}

impl ChapterTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roots(roots: Vec<ChapterNode>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[ChapterNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of chapters at every depth
    pub fn len(&self) -> usize {
        let mut count = 0;
        walk(&self.roots, &mut |_, _| {
            count += 1;
            Flow::Continue
        });
        count
    }

    /// Group a flat list by parent.
    ///
    /// A node whose parent is missing, is itself, or closes a cycle becomes a
    /// root. Duplicate keys keep their first occurrence. Input order is kept
    /// among siblings.
    pub fn build_from_flat(flat: Vec<FlatChapter>) -> Self {
        let mut seen = HashSet::new();
        let nodes: Vec<FlatChapter> = flat
            .into_iter()
            .filter(|node| {
                let fresh = seen.insert(node.key.clone());
                if !fresh {
                    warn!(key = %node.key, "duplicate chapter key ignored");
                }
                fresh
            })
            .collect();

        let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (n.key.as_str(), i)).collect();

        let mut parent: Vec<Option<usize>> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                n.parent_id
                    .as_deref()
                    .and_then(|p| index.get(p).copied())
                    .filter(|&p| p != i)
            })
            .collect();

        for start in 0..nodes.len() {
            let mut path = HashSet::from([start]);
            let mut current = start;
            while let Some(p) = parent[current] {
                if !path.insert(p) {
                    debug!(key = %nodes[current].key, "chapter parent cycle broken");
                    parent[current] = None;
                    break;
                }
                current = p;
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();
        for (i, p) in parent.iter().enumerate() {
            match p {
                Some(p) => children[*p].push(i),
                None => roots.push(i),
            }
        }

        fn assemble(i: usize, nodes: &[FlatChapter], parent: &[Option<usize>], children: &[Vec<usize>]) -> ChapterNode {
            let flat = &nodes[i];
            ChapterNode {
                key: flat.key.clone(),
                num: flat.num.clone(),
                label: flat.label.clone(),
                parent_id: parent[i].map(|p| nodes[p].key.clone()),
                children: children[i]
                    .iter()
                    .map(|&c| assemble(c, nodes, parent, children))
                    .collect(),
            }
        }

        Self {
            roots: roots
                .into_iter()
                .map(|i| assemble(i, &nodes, &parent, &children))
                .collect(),
        }
    }

    /// Pre-order flat list, the inverse of [`ChapterTree::build_from_flat`].
    pub fn flatten(&self) -> Vec<FlatChapter> {
        let mut out = Vec::new();
        walk(&self.roots, &mut |node, position| {
            out.push(FlatChapter {
                key: node.key.clone(),
                num: node.num.clone(),
                label: node.label.clone(),
                parent_id: position.parent_key.map(str::to_string),
            });
            Flow::Continue
        });
        out
    }

    /// Depth-first search by key
    pub fn find_by_key(&self, key: &str) -> Option<&ChapterNode> {
        let mut found = None;
        walk(&self.roots, &mut |node, _| {
            if node.key == key {
                found = Some(node);
                Flow::Stop
            } else {
                Flow::Continue
            }
        });
        found
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find_by_key(key).is_some()
    }

    /// `"<num> - <label>"` of a chapter
    pub fn title_of(&self, key: &str) -> Option<String> {
        self.find_by_key(key).map(ChapterNode::title)
    }

    /// Keys of the chapter and all of its descendants
    pub fn subtree_keys(&self, key: &str) -> Vec<ChapterKey> {
        self.find_by_key(key)
            .map(|node| {
                let mut keys = Vec::new();
                walk(std::slice::from_ref(node), &mut |n, _| {
                    keys.push(n.key.clone());
                    Flow::Continue
                });
                keys
            })
            .unwrap_or_default()
    }

    /// Change a chapter's number and/or label.
    ///
    /// A changed number renumbers every descendant. Returns whether the key
    /// was found.
    pub fn update_node(&mut self, key: &str, new_num: Option<&str>, new_label: Option<&str>) -> bool {
        let mut found = false;
        walk_mut(&mut self.roots, &mut |node, _| {
            if node.key != key {
                return Flow::Continue;
            }
            found = true;
            if let Some(label) = new_label {
                node.label = label.to_string();
            }
            if let Some(num) = new_num {
                if node.num != num {
                    node.num = num.to_string();
                    renumber_children(&node.num, &mut node.children);
                }
            }
            Flow::Stop
        });
        found
    }

    /// Append a sub-chapter and return its key.
    pub fn add_child(&mut self, parent_key: &str) -> Option<ChapterKey> {
        let mut added = None;
        walk_mut(&mut self.roots, &mut |node, _| {
            if node.key != parent_key {
                return Flow::Continue;
            }
            let num = child_num(&node.num, node.children.len());
            let child = ChapterNode::fresh(num, NEW_CHILD_LABEL, Some(node.key.clone()));
            added = Some(child.key.clone());
            node.children.push(child);
            Flow::Stop
        });
        added
    }

    /// Append a root chapter numbered after the largest root and return its key.
    pub fn add_root(&mut self) -> ChapterKey {
        let num = next_root_num(self.roots.iter().map(|r| r.num.as_str()));
        let root = ChapterNode::fresh(num, NEW_ROOT_LABEL, None);
        let key = root.key.clone();
        self.roots.push(root);
        key
    }

    /// Remove a chapter and its subtree wherever it occurs.
    ///
    /// Remaining siblings of a removed sub-chapter are renumbered. Returns
    /// the keys of every removed chapter.
    pub fn delete_node(&mut self, key: &str) -> Vec<ChapterKey> {
        let removed = self.subtree_keys(key);
        if removed.is_empty() {
            return removed;
        }

        self.roots.retain(|r| r.key != key);
        walk_mut(&mut self.roots, &mut |node, _| {
            let before = node.children.len();
            node.children.retain(|c| c.key != key);
            if node.children.len() != before {
                renumber_children(&node.num, &mut node.children);
            }
            Flow::Continue
        });
        removed
    }

    /// Copy of the tree with siblings sorted by number at every level.
    pub fn sorted_for_display(&self) -> ChapterTree {
        fn sort(nodes: &mut [ChapterNode]) {
            nodes.sort_by(|a, b| compare_nums(&a.num, &b.num));
            for node in nodes.iter_mut() {
                sort(&mut node.children);
            }
        }

        let mut sorted = self.clone();
        sort(&mut sorted.roots);
        sorted
    }
}

/// Number `children` under `parent_num` by position, recursively.
pub fn renumber_children(parent_num: &str, children: &mut [ChapterNode]) {
    walk_mut(children, &mut |node, position| {
        let parent = position.parent_num.unwrap_or(parent_num);
        node.num = child_num(parent, position.index);
        Flow::Continue
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(key: &str, num: &str, parent: Option<&str>) -> FlatChapter {
        FlatChapter {
            key: key.to_string(),
            num: num.to_string(),
            label: format!("chapter {}", key),
            parent_id: parent.map(str::to_string),
        }
    }

    fn sample() -> ChapterTree {
        ChapterTree::build_from_flat(vec![
            flat("a", "1", None),
            flat("b", "2", None),
            flat("a1", "1.1", Some("a")),
            flat("a2", "1.2", Some("a")),
            flat("a11", "1.1.1", Some("a1")),
            flat("b1", "2.1", Some("b")),
        ])
    }

    fn num_of(tree: &ChapterTree, key: &str) -> String {
        tree.find_by_key(key).map(|n| n.num.clone()).unwrap_or_default()
    }

    #[test]
    fn builds_nested_tree() {
        let tree = sample();
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.roots()[0].children.len(), 2);
        assert_eq!(tree.find_by_key("a11").and_then(|n| n.parent_id.clone()), Some("a1".to_string()));
    }

    #[test]
    fn missing_parent_becomes_root() {
        let tree = ChapterTree::build_from_flat(vec![flat("x", "1", Some("ghost")), flat("y", "2", None)]);
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.roots()[0].parent_id, None);
    }

    #[test]
    fn cycles_do_not_loop() {
        let tree = ChapterTree::build_from_flat(vec![
            flat("x", "1", Some("y")),
            flat("y", "2", Some("x")),
            flat("z", "3", Some("z")),
        ]);
        assert_eq!(tree.len(), 3);
        assert!(tree.roots().iter().any(|r| r.key == "z"));
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn flatten_round_trips() {
        let tree = sample();
        let rebuilt = ChapterTree::build_from_flat(tree.flatten());
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn renumbering_cascades_to_descendants_only() {
        let mut tree = sample();
        assert!(tree.update_node("a1", Some("7.4"), None));
        assert_eq!(num_of(&tree, "a1"), "7.4");
        assert_eq!(num_of(&tree, "a11"), "7.4.1");
        assert_eq!(num_of(&tree, "a2"), "1.2");
        assert_eq!(num_of(&tree, "b1"), "2.1");
    }

    #[test]
    fn label_only_update_keeps_numbers() {
        let mut tree = sample();
        assert!(tree.update_node("b", None, Some("Toiture")));
        assert_eq!(tree.title_of("b").as_deref(), Some("2 - Toiture"));
        assert_eq!(num_of(&tree, "b1"), "2.1");
    }

    #[test]
    fn unknown_key_is_a_no_op() {
        let mut tree = sample();
        let before = tree.clone();
        assert!(!tree.update_node("nope", Some("9"), Some("x")));
        assert!(tree.add_child("nope").is_none());
        assert!(tree.delete_node("nope").is_empty());
        assert_eq!(tree, before);
    }

    #[test]
    fn add_root_and_child_follow_numbering() {
        let mut tree = ChapterTree::build_from_flat(vec![flat("a", "1", None), flat("b", "2", None)]);
        let root = tree.add_root();
        assert_eq!(num_of(&tree, &root), "3");

        let child = tree.add_child(&root).unwrap_or_default();
        assert_eq!(num_of(&tree, &child), "3.1");
        assert_eq!(tree.find_by_key(&child).map(|n| n.label.as_str()), Some(NEW_CHILD_LABEL));

        let mut empty = ChapterTree::new();
        let first = empty.add_root();
        assert_eq!(num_of(&empty, &first), "1");
    }

    #[test]
    fn delete_removes_subtree_and_renumbers_siblings() {
        let mut tree = sample();
        let removed = tree.delete_node("a1");
        assert_eq!(removed, vec!["a1".to_string(), "a11".to_string()]);
        assert!(!tree.contains("a11"));
        assert_eq!(num_of(&tree, "a2"), "1.1");
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn display_order_is_numeric() {
        let tree = ChapterTree::build_from_flat(vec![
            flat("ten", "10", None),
            flat("two", "2", None),
            flat("c10", "2.10", Some("two")),
            flat("c9", "2.9", Some("two")),
        ]);
        let sorted = tree.sorted_for_display();
        let keys: Vec<_> = sorted.flatten().into_iter().map(|f| f.key).collect();
        assert_eq!(keys, vec!["two", "c9", "c10", "ten"]);
    }
}
