//! Hierarchical turn labels
//!
//! A root and its direct branches share one flat sequence (`1`, `2`, `3`...).
//! Nested children get one dotted segment per level (`2.1`, `2.1.3`).
//! Labels depend only on position among siblings, never on a global counter.

use crate::ids::TurnId;
use crate::tree::node::{Forest, Node, NodeKind};

/// Label for `node` at zero-based `index_at_level` under `parent_label`
pub fn label(node: &Node, index_at_level: usize, parent_label: Option<&str>) -> String {
    let position = index_at_level + 1;
    match (node.kind, parent_label) {
        (NodeKind::Root | NodeKind::DirectBranch, _) | (NodeKind::Child, None) => {
            position.to_string()
        }
        (NodeKind::Child, Some(parent)) => format!("{parent}.{position}"),
    }
}

/// One row of the flattened sidebar tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineRow {
    pub turn_id: TurnId,
    /// Root of the conversation the row belongs to
    pub conversation_id: TurnId,
    /// 1-based position of that root in the forest; labels restart at `1`
    /// for every root, so this tells parallel conversations apart
    pub conversation: usize,
    pub label: String,
    pub depth: usize,
    pub kind: NodeKind,
    pub branch_label: Option<String>,
}

/// Flatten the forest into labelled rows.
///
/// Each root starts its own sequence: the root is `1`, its direct branches
/// follow as `2..n`, and each of those lists its nested children beneath it.
pub fn outline(forest: &Forest) -> Vec<OutlineRow> {
    let mut rows = Vec::with_capacity(forest.node_count());
    for (position, root) in forest.roots().iter().enumerate() {
        let sequence = std::iter::once(root).chain(root.direct_branches.iter());
        for (index, node) in sequence.enumerate() {
            let node_label = label(node, index, None);
            push_with_children(node, position + 1, node_label, 0, &mut rows);
        }
    }
    rows
}

fn push_with_children(
    node: &Node,
    conversation: usize,
    node_label: String,
    depth: usize,
    rows: &mut Vec<OutlineRow>,
) {
    rows.push(OutlineRow {
        turn_id: node.turn_id,
        conversation_id: node.conversation_id,
        conversation,
        label: node_label.clone(),
        depth,
        kind: node.kind,
        branch_label: node.branch_label.clone(),
    });
    for (index, child) in node.children.iter().enumerate() {
        let child_label = label(child, index, Some(&node_label));
        push_with_children(child, conversation, child_label, depth + 1, rows);
    }
}

/// Label of a single turn, if it is in the forest
pub fn label_of(forest: &Forest, turn_id: TurnId) -> Option<String> {
    outline(forest)
        .into_iter()
        .find(|row| row.turn_id == turn_id)
        .map(|row| row.label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn forest_with_branches() -> Forest {
        let at = Utc.timestamp_opt(0, 0).unwrap();
        let mut root = Node::root(TurnId::new(1), at);
        let first = Node::branch_of(&root, TurnId::new(2), at);
        let mut second = Node::branch_of(&root, TurnId::new(3), at);
        let nested = Node::child_of(&second, TurnId::new(4), at);
        second.children.push(nested);
        let root_child = Node::child_of(&root, TurnId::new(5), at);
        root.children.push(root_child);
        root.direct_branches.extend([first, second]);
        Forest::new(vec![root])
    }

    #[test]
    fn test_root_and_direct_branches_share_sequence() {
        let forest = forest_with_branches();
        let root = &forest.roots()[0];
        assert_eq!(label(root, 0, None), "1");
        assert_eq!(label(&root.direct_branches[0], 1, None), "2");
        assert_eq!(label(&root.direct_branches[1], 2, None), "3");
    }

    #[test]
    fn test_child_of_branch_gets_dotted_label() {
        let forest = forest_with_branches();
        let nested = &forest.roots()[0].direct_branches[0];
        let child = Node::child_of(nested, TurnId::new(9), nested.time_created);
        assert_eq!(label(&child, 0, Some("2")), "2.1");
        assert_eq!(label(&child, 2, Some("2.1")), "2.1.3");
    }

    #[test]
    fn test_outline_rows() {
        let forest = forest_with_branches();
        let rows: Vec<_> = outline(&forest)
            .into_iter()
            .map(|row| (row.turn_id.get(), row.label, row.depth))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, "1".to_string(), 0),
                (5, "1.1".to_string(), 1),
                (2, "2".to_string(), 0),
                (3, "3".to_string(), 0),
                (4, "3.1".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_each_root_numbers_independently() {
        let at = Utc.timestamp_opt(0, 0).unwrap();
        let forest = Forest::new(vec![
            Node::root(TurnId::new(1), at),
            Node::root(TurnId::new(2), at),
        ]);
        assert_eq!(label_of(&forest, TurnId::new(2)).as_deref(), Some("1"));
        assert_eq!(label_of(&forest, TurnId::new(3)), None);

        let conversations: Vec<_> = outline(&forest).iter().map(|row| row.conversation).collect();
        assert_eq!(conversations, vec![1, 2]);
    }
}
