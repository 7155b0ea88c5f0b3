//! Arena-backed opening move tree.
//!
//! Nodes live in a flat arena and are addressed by [`NodeId`]. Parent and
//! child links are explicit ids, so replacing or removing a subtree never
//! aliases or deep-copies node payloads. On the wire a tree is the nested
//! `MoveNode` array produced by a depth-first walk over the arena.
//!
//! A `NodeId` carries a tag of the tree that issued it; looking it up in any
//! other tree yields [`TreeError::NotFound`].

use std::sync::atomic::{AtomicU32, Ordering};

use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Deserializer, Serialize};

static NEXT_TREE_TAG: AtomicU32 = AtomicU32::new(1);

/// Stable handle to a node inside one [`MoveTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    tree: u32,
    index: u32,
}

/// One position transition in an opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNode {
    /// Position after the move.
    pub fen: String,
    /// Move in SAN.
    #[serde(rename = "move")]
    pub san: String,
    pub uci: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_main_line: bool,
}

impl MoveNode {
    pub fn new(san: impl Into<String>, uci: impl Into<String>, fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            san: san.into(),
            uci: uci.into(),
            comment: None,
            is_main_line: false,
        }
    }

    pub fn main_line(mut self) -> Self {
        self.is_main_line = true;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Nested wire shape of a node and its continuations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNodeRecord {
    pub fen: String,
    #[serde(rename = "move")]
    pub san: String,
    pub uci: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub is_main_line: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MoveNodeRecord>,
}

impl MoveNodeRecord {
    fn split(self) -> (MoveNode, Vec<MoveNodeRecord>) {
        let node = MoveNode {
            fen: self.fen,
            san: self.san,
            uci: self.uci,
            comment: self.comment,
            is_main_line: self.is_main_line,
        };
        (node, self.children)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Move node not found")]
    NotFound,
    #[error("No move node at path {0:?}")]
    PathNotFound(Vec<usize>),
    #[error("Move {san} does not change the position {fen}")]
    SameFen { san: String, fen: String },
}

#[derive(Debug, Clone)]
struct Slot {
    node: MoveNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Ordered forest of moves for one opening.
#[derive(Debug, Clone)]
pub struct MoveTree {
    tag: u32,
    slots: Vec<Option<Slot>>,
    roots: Vec<NodeId>,
    len: usize,
}

impl Default for MoveTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveTree {
    pub fn new() -> Self {
        Self {
            tag: NEXT_TREE_TAG.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            roots: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Top-level moves, i.e. replies to the opening's starting position.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn find(&self, id: NodeId) -> Result<&MoveNode, TreeError> {
        self.slot(id).map(|slot| &slot.node)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        self.slot(id).map(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        self.slot(id).map(|slot| slot.children.as_slice())
    }

    /// Append `node` as the last child of `parent` (`None` = top level).
    pub fn insert(&mut self, parent: Option<NodeId>, node: MoveNode) -> Result<NodeId, TreeError> {
        if let Some(parent) = parent {
            let parent_slot = self.slot(parent)?;
            if parent_slot.node.fen == node.fen {
                return Err(TreeError::SameFen {
                    san: node.san,
                    fen: node.fen,
                });
            }
        }

        let id = NodeId {
            tree: self.tag,
            index: self.slots.len() as u32,
        };
        self.slots.push(Some(Slot {
            node,
            parent,
            children: Vec::new(),
        }));
        match parent {
            Some(parent) => self.slot_mut(parent)?.children.push(id),
            None => self.roots.push(id),
        }
        self.len += 1;
        Ok(id)
    }

    /// Insert under the node addressed by a child-index path. An empty path
    /// inserts at the top level.
    pub fn insert_at(&mut self, parent_path: &[usize], node: MoveNode) -> Result<NodeId, TreeError> {
        let parent = if parent_path.is_empty() {
            None
        } else {
            Some(self.node_at_path(parent_path)?)
        };
        self.insert(parent, node)
    }

    /// Swap the payload of `id`, keeping its subtree. Returns the old payload.
    pub fn replace(&mut self, id: NodeId, node: MoveNode) -> Result<MoveNode, TreeError> {
        let slot = self.slot(id)?;
        let clashes_with_parent = match slot.parent {
            Some(parent) => self.slot(parent)?.node.fen == node.fen,
            None => false,
        };
        let clashes_with_child = slot
            .children
            .iter()
            .any(|child| self.find(*child).is_ok_and(|c| c.fen == node.fen));
        if clashes_with_parent || clashes_with_child {
            return Err(TreeError::SameFen {
                san: node.san,
                fen: node.fen,
            });
        }

        Ok(std::mem::replace(&mut self.slot_mut(id)?.node, node))
    }

    /// Remove `id` together with its whole subtree. Returns how many nodes
    /// were removed.
    pub fn remove(&mut self, id: NodeId) -> Result<usize, TreeError> {
        match self.slot(id)?.parent {
            Some(parent) => self.slot_mut(parent)?.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(slot) = self.slots[current.index as usize].take() {
                stack.extend(slot.children);
                removed += 1;
            }
        }
        self.len -= removed;
        Ok(removed)
    }

    /// Resolve a child-index path (`[0, 2]` = third reply to the first move).
    pub fn node_at_path(&self, path: &[usize]) -> Result<NodeId, TreeError> {
        let not_found = || TreeError::PathNotFound(path.to_vec());
        let (first, rest) = path.split_first().ok_or_else(not_found)?;
        let mut id = *self.roots.get(*first).ok_or_else(not_found)?;
        for index in rest {
            id = *self.slot(id)?.children.get(*index).ok_or_else(not_found)?;
        }
        Ok(id)
    }

    /// Inverse of [`MoveTree::node_at_path`].
    pub fn path_of(&self, id: NodeId) -> Result<Vec<usize>, TreeError> {
        let mut path = Vec::new();
        let mut current = id;
        loop {
            let parent = self.slot(current)?.parent;
            let siblings = match parent {
                Some(parent) => &self.slot(parent)?.children,
                None => &self.roots,
            };
            let index = siblings
                .iter()
                .position(|s| *s == current)
                .ok_or(TreeError::NotFound)?;
            path.push(index);
            match parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        path.reverse();
        Ok(path)
    }

    /// Pre-order traversal. Each call starts a fresh walk.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: self.roots.iter().rev().map(|id| (*id, 0)).collect(),
        }
    }

    /// Default line: at every level take the child flagged main line, or the
    /// first child when none is flagged.
    pub fn main_line(&self) -> Vec<&MoveNode> {
        let mut line = Vec::new();
        let mut level = self.roots.as_slice();
        while let Some(id) = self.main_child(level) {
            let Ok(slot) = self.slot(id) else { break };
            line.push(&slot.node);
            level = &slot.children;
        }
        line
    }

    fn main_child(&self, ids: &[NodeId]) -> Option<NodeId> {
        ids.iter()
            .copied()
            .find(|id| self.find(*id).is_ok_and(|n| n.is_main_line))
            .or_else(|| ids.first().copied())
    }

    pub fn to_records(&self) -> Vec<MoveNodeRecord> {
        self.records(&self.roots)
    }

    fn records(&self, ids: &[NodeId]) -> Vec<MoveNodeRecord> {
        ids.iter()
            .filter_map(|id| self.slot(*id).ok())
            .map(|slot| MoveNodeRecord {
                fen: slot.node.fen.clone(),
                san: slot.node.san.clone(),
                uci: slot.node.uci.clone(),
                comment: slot.node.comment.clone(),
                is_main_line: slot.node.is_main_line,
                children: self.records(&slot.children),
            })
            .collect()
    }

    /// Build an arena from nested records, enforcing the parent/child FEN rule.
    pub fn from_records(records: Vec<MoveNodeRecord>) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        let mut pending: Vec<(Option<NodeId>, MoveNodeRecord)> =
            records.into_iter().rev().map(|r| (None, r)).collect();
        while let Some((parent, record)) = pending.pop() {
            let (node, children) = record.split();
            let id = tree.insert(parent, node)?;
            pending.extend(children.into_iter().rev().map(|c| (Some(id), c)));
        }
        Ok(tree)
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, TreeError> {
        if id.tree != self.tag {
            return Err(TreeError::NotFound);
        }
        self.slots
            .get(id.index as usize)
            .and_then(Option::as_ref)
            .ok_or(TreeError::NotFound)
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut Slot, TreeError> {
        if id.tree != self.tag {
            return Err(TreeError::NotFound);
        }
        self.slots
            .get_mut(id.index as usize)
            .and_then(Option::as_mut)
            .ok_or(TreeError::NotFound)
    }
}

/// Structural equality: same moves in the same shape, regardless of arena layout.
impl PartialEq for MoveTree {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .walk()
                .map(|item| (item.depth, item.node))
                .eq(other.walk().map(|item| (item.depth, item.node)))
    }
}

impl Eq for MoveTree {}

#[derive(Debug, Clone, Copy)]
pub struct WalkItem<'a> {
    pub id: NodeId,
    pub depth: usize,
    pub node: &'a MoveNode,
}

/// Lazy pre-order iterator returned by [`MoveTree::walk`].
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    tree: &'a MoveTree,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = WalkItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        let slot = self.tree.slot(id).ok()?;
        self.stack
            .extend(slot.children.iter().rev().map(|c| (*c, depth + 1)));
        Some(WalkItem {
            id,
            depth,
            node: &slot.node,
        })
    }
}

struct NodeView<'a> {
    tree: &'a MoveTree,
    slot: &'a Slot,
}

struct LevelView<'a> {
    tree: &'a MoveTree,
    ids: &'a [NodeId],
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = &self.slot.node;
        let mut state = serializer.serialize_struct("MoveNode", 6)?;
        state.serialize_field("fen", &node.fen)?;
        state.serialize_field("move", &node.san)?;
        state.serialize_field("uci", &node.uci)?;
        match &node.comment {
            Some(comment) => state.serialize_field("comment", comment)?,
            None => state.skip_field("comment")?,
        }
        state.serialize_field("is_main_line", &node.is_main_line)?;
        if self.slot.children.is_empty() {
            state.skip_field("children")?;
        } else {
            state.serialize_field(
                "children",
                &LevelView {
                    tree: self.tree,
                    ids: &self.slot.children,
                },
            )?;
        }
        state.end()
    }
}

impl Serialize for LevelView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.ids
                .iter()
                .filter_map(|id| self.tree.slot(*id).ok())
                .map(|slot| NodeView {
                    tree: self.tree,
                    slot,
                }),
        )
    }
}

impl Serialize for MoveTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        LevelView {
            tree: self,
            ids: &self.roots,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MoveTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<MoveNodeRecord>::deserialize(deserializer)?;
        Self::from_records(records).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
    const D4: &str = "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq d3 0 1";
    const E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";
    const E4_C5: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq c6 0 2";
    const E4_C5_NF3: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2";

    /// 1. e4 (e5 | c5 2. Nf3), 1. d4
    fn sample() -> (MoveTree, NodeId, NodeId, NodeId) {
        let mut tree = MoveTree::new();
        let e4 = tree.insert(None, MoveNode::new("e4", "e2e4", E4).main_line()).unwrap();
        tree.insert(Some(e4), MoveNode::new("e5", "e7e5", E4_E5)).unwrap();
        let c5 = tree
            .insert(Some(e4), MoveNode::new("c5", "c7c5", E4_C5).main_line())
            .unwrap();
        tree.insert(Some(c5), MoveNode::new("Nf3", "g1f3", E4_C5_NF3).main_line())
            .unwrap();
        let d4 = tree.insert(None, MoveNode::new("d4", "d2d4", D4)).unwrap();
        (tree, e4, c5, d4)
    }

    #[test]
    fn walk_is_preorder_with_depths() {
        let (tree, ..) = sample();
        let walked: Vec<(&str, usize)> = tree
            .walk()
            .map(|item| (item.node.san.as_str(), item.depth))
            .collect();
        assert_eq!(
            walked,
            vec![("e4", 0), ("e5", 1), ("c5", 1), ("Nf3", 2), ("d4", 0)]
        );
    }

    #[test]
    fn walk_restarts_from_the_top() {
        let (tree, ..) = sample();
        let first: Vec<_> = tree.walk().map(|i| i.id).collect();
        let second: Vec<_> = tree.walk().map(|i| i.id).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), tree.len());
    }

    #[test]
    fn insert_under_unknown_parent_fails() {
        let (mut tree, _, c5, _) = sample();
        tree.remove(c5).unwrap();
        let err = tree
            .insert(Some(c5), MoveNode::new("Nf3", "g1f3", E4_C5_NF3))
            .unwrap_err();
        assert_eq!(err, TreeError::NotFound);
    }

    #[test]
    fn child_must_change_position() {
        let (mut tree, e4, ..) = sample();
        let err = tree
            .insert(Some(e4), MoveNode::new("??", "0000", E4))
            .unwrap_err();
        assert!(matches!(err, TreeError::SameFen { .. }));
    }

    #[test]
    fn remove_takes_whole_subtree() {
        let (mut tree, e4, ..) = sample();
        assert_eq!(tree.remove(e4).unwrap(), 4);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.find(e4), Err(TreeError::NotFound));
        assert_eq!(tree.walk().count(), 1);
    }

    #[test]
    fn replace_keeps_children() {
        let (mut tree, _, c5, _) = sample();
        let old = tree
            .replace(
                c5,
                MoveNode::new("c5", "c7c5", E4_C5).with_comment("Sicilian"),
            )
            .unwrap();
        assert_eq!(old.comment, None);
        assert_eq!(tree.find(c5).unwrap().comment.as_deref(), Some("Sicilian"));
        assert_eq!(tree.children(c5).unwrap().len(), 1);
    }

    #[test]
    fn replace_rejects_parent_position() {
        let (mut tree, _, c5, _) = sample();
        let err = tree.replace(c5, MoveNode::new("x", "x", E4)).unwrap_err();
        assert!(matches!(err, TreeError::SameFen { .. }));
    }

    #[test]
    fn ids_from_another_tree_do_not_resolve() {
        let (tree, e4, ..) = sample();
        let (mut other, ..) = sample();
        assert!(tree.find(e4).is_ok());
        let fresh = MoveTree::new();
        assert_eq!(fresh.find(e4), Err(TreeError::NotFound));
        // `other` was built independently, so the same index is foreign to it.
        assert_eq!(other.remove(e4), Err(TreeError::NotFound));
    }

    #[test]
    fn paths_resolve_both_ways() {
        let (tree, _, c5, d4) = sample();
        assert_eq!(tree.path_of(c5).unwrap(), vec![0, 1]);
        assert_eq!(tree.path_of(d4).unwrap(), vec![1]);
        assert_eq!(tree.node_at_path(&[0, 1]).unwrap(), c5);
        assert_eq!(
            tree.node_at_path(&[0, 5]),
            Err(TreeError::PathNotFound(vec![0, 5]))
        );
        assert!(tree.node_at_path(&[]).is_err());
    }

    #[test]
    fn insert_at_empty_path_is_top_level() {
        let mut tree = MoveTree::new();
        let id = tree.insert_at(&[], MoveNode::new("e4", "e2e4", E4)).unwrap();
        assert_eq!(tree.roots(), &[id]);
        let child = tree
            .insert_at(&[0], MoveNode::new("c5", "c7c5", E4_C5))
            .unwrap();
        assert_eq!(tree.parent(child).unwrap(), Some(id));
    }

    #[test]
    fn main_line_follows_flags_then_first_child() {
        let (tree, ..) = sample();
        let line: Vec<&str> = tree.main_line().iter().map(|n| n.san.as_str()).collect();
        assert_eq!(line, vec!["e4", "c5", "Nf3"]);
    }

    #[test]
    fn json_shape_matches_nested_nodes() {
        let mut tree = MoveTree::new();
        let e4 = tree.insert(None, MoveNode::new("e4", "e2e4", E4).main_line()).unwrap();
        tree.insert(Some(e4), MoveNode::new("c5", "c7c5", E4_C5)).unwrap();

        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "fen": E4,
                "move": "e4",
                "uci": "e2e4",
                "is_main_line": true,
                "children": [{
                    "fen": E4_C5,
                    "move": "c5",
                    "uci": "c7c5",
                    "is_main_line": false
                }]
            }])
        );
    }

    #[test]
    fn json_roundtrip_preserves_structure() {
        let (tree, ..) = sample();
        let json = serde_json::to_string(&tree).unwrap();
        let back: MoveTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.to_records(), tree.to_records());
    }

    #[test]
    fn deserialize_rejects_same_fen_child() {
        let json = serde_json::json!([{
            "fen": E4, "move": "e4", "uci": "e2e4",
            "children": [{ "fen": E4, "move": "e4", "uci": "e2e4" }]
        }]);
        assert!(serde_json::from_value::<MoveTree>(json).is_err());
    }
}
