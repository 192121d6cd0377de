//! Pathway resolution over the conversation forest
//!
//! Searches always visit a node, then its direct branches, then its children.
//! Turn ids are unique within a context, so the order only matters for
//! determinism.

use crate::ids::TurnId;
use crate::tree::node::{Forest, Node};

/// Find the root whose tree contains `turn_id`.
///
/// Each root is checked itself, then through its direct branches (and their
/// descendants), then through its own children. The first match wins.
pub fn find_owning_root(roots: &[Node], turn_id: TurnId) -> Option<&Node> {
    roots.iter().find(|root| {
        root.turn_id == turn_id
            || root
                .direct_branches
                .iter()
                .any(|branch| subtree_contains(branch, turn_id))
            || root
                .children
                .iter()
                .any(|child| subtree_contains(child, turn_id))
    })
}

fn subtree_contains(node: &Node, turn_id: TurnId) -> bool {
    node.turn_id == turn_id || node.attached().any(|next| subtree_contains(next, turn_id))
}

/// Ordered path from `root` to the node with `target`, both ends included.
///
/// Returns `None` when the target is not reachable from this root.
pub fn path_to_turn(root: &Node, target: TurnId) -> Option<Vec<&Node>> {
    let mut path = Vec::new();
    if accumulate(root, target, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn accumulate<'a>(node: &'a Node, target: TurnId, path: &mut Vec<&'a Node>) -> bool {
    path.push(node);
    if node.turn_id == target {
        return true;
    }
    for next in node.attached() {
        if accumulate(next, target, path) {
            return true;
        }
    }
    path.pop();
    false
}

/// Resolve the pathway for `turn_id` across the whole forest
pub fn pathway(forest: &Forest, turn_id: TurnId) -> Option<Vec<&Node>> {
    find_owning_root(forest.roots(), turn_id).and_then(|root| path_to_turn(root, turn_id))
}

/// Size of the tree rooted at `node`, counting direct branches and children
pub fn count_nodes(node: &Node) -> usize {
    1 + node.attached().map(count_nodes).sum::<usize>()
}

pub fn find_node(roots: &[Node], turn_id: TurnId) -> Option<&Node> {
    roots.iter().find_map(|root| find_in(root, turn_id))
}

fn find_in(node: &Node, turn_id: TurnId) -> Option<&Node> {
    if node.turn_id == turn_id {
        return Some(node);
    }
    node.attached().find_map(|next| find_in(next, turn_id))
}

pub fn find_node_mut(roots: &mut [Node], turn_id: TurnId) -> Option<&mut Node> {
    for root in roots.iter_mut() {
        if let Some(found) = find_in_mut(root, turn_id) {
            return Some(found);
        }
    }
    None
}

fn find_in_mut(node: &mut Node, turn_id: TurnId) -> Option<&mut Node> {
    if node.turn_id == turn_id {
        return Some(node);
    }
    for next in node
        .direct_branches
        .iter_mut()
        .chain(node.children.iter_mut())
    {
        if let Some(found) = find_in_mut(next, turn_id) {
            return Some(found);
        }
    }
    None
}

/// Pre-order walk over the forest.
///
/// The visitor receives each node with its indentation depth: roots and
/// their direct branches sit at depth 0, each level of nested children adds
/// one.
pub fn walk<F>(forest: &Forest, mut visit: F)
where
    F: FnMut(&Node, usize),
{
    for root in forest.roots() {
        walk_node(root, 0, &mut visit);
    }
}

fn walk_node<F>(node: &Node, depth: usize, visit: &mut F)
where
    F: FnMut(&Node, usize),
{
    visit(node, depth);
    for branch in &node.direct_branches {
        walk_node(branch, depth, visit);
    }
    for child in &node.children {
        walk_node(child, depth + 1, visit);
    }
}

/// Every turn id in walk order
pub fn all_turn_ids(forest: &Forest) -> Vec<TurnId> {
    let mut ids = Vec::with_capacity(forest.node_count());
    walk(forest, |node, _| ids.push(node.turn_id));
    ids
}

/// Highest turn id reachable from `turn_id` through nested children that
/// `counts` accepts, never lower than `turn_id` itself.
///
/// Direct branches are parallel lines, not continuations, so they are not
/// followed. `None` when the turn is not in the forest.
pub fn lineage_head(
    forest: &Forest,
    turn_id: TurnId,
    counts: impl Fn(TurnId) -> bool,
) -> Option<TurnId> {
    find_node(forest.roots(), turn_id).map(|node| deepest_continuation(node, &counts))
}

fn deepest_continuation(node: &Node, counts: &impl Fn(TurnId) -> bool) -> TurnId {
    node.children
        .iter()
        .filter_map(|child| {
            let head = deepest_continuation(child, counts);
            (head != child.turn_id || counts(child.turn_id)).then_some(head)
        })
        .fold(node.turn_id, TurnId::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    fn t(id: i64) -> TurnId {
        TurnId::new(id)
    }

    /// r1 { children: c2, c3 { children: c4 } }, direct branch d5 { child c6 }; r7
    fn sample_forest() -> Forest {
        let at = Utc.timestamp_opt(0, 0).unwrap();
        let mut r1 = Node::root(t(1), at);
        let c2 = Node::child_of(&r1, t(2), at);
        let mut c3 = Node::child_of(&r1, t(3), at);
        let c4 = Node::child_of(&c3, t(4), at);
        c3.children.push(c4);
        let mut d5 = Node::branch_of(&r1, t(5), at);
        let c6 = Node::child_of(&d5, t(6), at);
        d5.children.push(c6);
        r1.children.extend([c2, c3]);
        r1.direct_branches.push(d5);
        let r7 = Node::root(t(7), at);
        Forest::new(vec![r1, r7])
    }

    #[test]
    fn test_find_owning_root() {
        let forest = sample_forest();
        for id in [1, 2, 3, 4, 5, 6] {
            let root = find_owning_root(forest.roots(), t(id)).unwrap();
            assert_eq!(root.turn_id, t(1));
        }
        assert_eq!(
            find_owning_root(forest.roots(), t(7)).unwrap().turn_id,
            t(7)
        );
        assert!(find_owning_root(forest.roots(), t(99)).is_none());
    }

    #[test]
    fn test_path_starts_at_root_and_has_no_gaps() {
        let forest = sample_forest();
        for id in all_turn_ids(&forest) {
            let path = pathway(&forest, id).unwrap();
            assert!(path.first().unwrap().is_root());
            assert_eq!(path.last().unwrap().turn_id, id);
            for pair in path.windows(2) {
                assert!(pair[0].attached().any(|n| n.turn_id == pair[1].turn_id));
            }
        }
    }

    #[test]
    fn test_path_through_direct_branch() {
        let forest = sample_forest();
        let ids: Vec<_> = pathway(&forest, t(6))
            .unwrap()
            .iter()
            .map(|n| n.turn_id)
            .collect();
        assert_eq!(ids, vec![t(1), t(5), t(6)]);
    }

    #[test]
    fn test_path_to_unreachable_turn() {
        let forest = sample_forest();
        assert!(path_to_turn(&forest.roots()[1], t(4)).is_none());
    }

    #[test]
    fn test_count_nodes_identity() {
        let forest = sample_forest();
        let root = &forest.roots()[0];
        let expected = 1 + root.direct_branches.iter().map(count_nodes).sum::<usize>()
            + root.children.iter().map(count_nodes).sum::<usize>();
        assert_eq!(count_nodes(root), expected);
        assert_eq!(count_nodes(root), 6);
        assert_eq!(forest.node_count(), 7);
    }

    #[test]
    fn test_count_nodes_after_insertion() {
        let mut forest = sample_forest();
        let parent = forest.get(t(4)).unwrap().clone();
        assert!(forest.attach(Node::branch_of(&parent, t(8), parent.time_created)));
        assert_eq!(count_nodes(&forest.roots()[0]), 7);
    }

    #[test]
    fn test_turn_ids_are_unique() {
        let forest = sample_forest();
        let ids = all_turn_ids(&forest);
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
    }

    #[test]
    fn test_walk_depths() {
        let forest = sample_forest();
        let mut seen = Vec::new();
        walk(&forest, |node, depth| seen.push((node.turn_id.get(), depth)));
        assert_eq!(
            seen,
            vec![(1, 0), (5, 0), (6, 1), (2, 1), (3, 1), (4, 2), (7, 0)]
        );
    }

    #[test]
    fn test_lineage_head_follows_children_only() {
        let forest = sample_forest();
        let any = |_| true;
        assert_eq!(lineage_head(&forest, t(3), any), Some(t(4)));
        assert_eq!(lineage_head(&forest, t(1), any), Some(t(4)));
        assert_eq!(lineage_head(&forest, t(5), any), Some(t(6)));
        assert_eq!(lineage_head(&forest, t(2), any), Some(t(2)));
        assert_eq!(lineage_head(&forest, t(42), any), None);
    }

    #[test]
    fn test_lineage_head_skips_turns_not_counted() {
        let forest = sample_forest();
        assert_eq!(lineage_head(&forest, t(1), |turn| turn == t(2)), Some(t(2)));
        assert_eq!(lineage_head(&forest, t(1), |turn| turn == t(4)), Some(t(4)));
        assert_eq!(lineage_head(&forest, t(1), |_| false), Some(t(1)));
        assert_eq!(lineage_head(&forest, t(5), |_| false), Some(t(5)));
    }
}
