//! Wire format for tree payloads
//!
//! The server sends `{ "roots": [...] }` with camelCase nodes carrying
//! `isRoot`/`isDirectBranch` flags. Parsing validates the structure and
//! produces the tagged [`Node`] representation. An absent or empty payload is
//! the "no tree yet" state; a malformed payload is rejected as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use crate::error::ArborError;
use crate::ids::TurnId;
use crate::tree::node::{Forest, Node, NodeKind};

/// A node as it travels over the wire
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNode {
    pub turn_id: TurnId,
    #[serde(default)]
    pub conversation_id: Option<TurnId>,
    #[serde(default)]
    pub parent_turn_id: Option<TurnId>,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub is_direct_branch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_label: Option<String>,
    #[serde(default)]
    pub children: Vec<WireNode>,
    #[serde(default)]
    pub direct_branches: Vec<WireNode>,
    #[serde(default)]
    pub time_created: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WireTree {
    #[serde(default)]
    pub roots: Vec<WireNode>,
}

impl From<&Node> for WireNode {
    fn from(node: &Node) -> Self {
        Self {
            turn_id: node.turn_id,
            conversation_id: Some(node.conversation_id),
            parent_turn_id: node.parent_turn_id,
            is_root: node.is_root(),
            is_direct_branch: node.is_direct_branch(),
            branch_label: node.branch_label.clone(),
            children: node.children.iter().map(WireNode::from).collect(),
            direct_branches: node.direct_branches.iter().map(WireNode::from).collect(),
            time_created: node.time_created,
        }
    }
}

/// Encode a forest as a wire payload
pub fn encode(forest: &Forest) -> serde_json::Result<serde_json::Value> {
    let tree = WireTree {
        roots: forest.roots().iter().map(WireNode::from).collect(),
    };
    serde_json::to_value(tree)
}

/// Parse a payload strictly.
///
/// `None`, `null` and an empty object all mean "no tree yet" and yield an
/// empty forest.
pub fn parse(payload: Option<&serde_json::Value>) -> Result<Forest, ArborError> {
    let value = match payload {
        None | Some(serde_json::Value::Null) => return Ok(Forest::empty()),
        Some(value) => value,
    };

    let tree: WireTree = serde_json::from_value(value.clone())
        .map_err(|e| ArborError::MalformedTree(e.to_string()))?;

    let mut seen = HashSet::new();
    let roots = tree
        .roots
        .into_iter()
        .map(|raw| convert_root(raw, &mut seen))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Forest::new(roots))
}

/// Parse a payload, treating anything malformed as the empty state
pub fn parse_lenient(payload: Option<&serde_json::Value>) -> Forest {
    match parse(payload) {
        Ok(forest) => forest,
        Err(e) => {
            warn!(error = %e, "Discarding unusable tree payload");
            Forest::empty()
        }
    }
}

fn malformed(msg: String) -> ArborError {
    ArborError::MalformedTree(msg)
}

fn claim(seen: &mut HashSet<TurnId>, turn_id: TurnId) -> Result<(), ArborError> {
    if seen.insert(turn_id) {
        Ok(())
    } else {
        Err(malformed(format!("turn {turn_id} appears more than once")))
    }
}

fn convert_root(raw: WireNode, seen: &mut HashSet<TurnId>) -> Result<Node, ArborError> {
    if raw.is_direct_branch {
        return Err(malformed(format!(
            "turn {} is listed as a root but flagged as a direct branch",
            raw.turn_id
        )));
    }
    if let Some(parent) = raw.parent_turn_id {
        return Err(malformed(format!(
            "root {} has parent {parent}",
            raw.turn_id
        )));
    }
    claim(seen, raw.turn_id)?;

    let root_id = raw.turn_id;
    let conversation_id = raw.conversation_id.unwrap_or(root_id);
    let branch_ids: HashSet<TurnId> = raw.direct_branches.iter().map(|b| b.turn_id).collect();

    let direct_branches = raw
        .direct_branches
        .into_iter()
        .map(|branch| convert_direct_branch(branch, root_id, conversation_id, &branch_ids, seen))
        .collect::<Result<Vec<_>, _>>()?;
    let children = raw
        .children
        .into_iter()
        .map(|child| convert_child(child, root_id, conversation_id, seen))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Node {
        turn_id: root_id,
        conversation_id,
        parent_turn_id: None,
        kind: NodeKind::Root,
        branch_label: raw.branch_label,
        children,
        direct_branches,
        time_created: raw.time_created,
    })
}

fn convert_direct_branch(
    raw: WireNode,
    root_id: TurnId,
    conversation_id: TurnId,
    sibling_branches: &HashSet<TurnId>,
    seen: &mut HashSet<TurnId>,
) -> Result<Node, ArborError> {
    if raw.is_root {
        return Err(malformed(format!(
            "direct branch {} is flagged as a root",
            raw.turn_id
        )));
    }
    if !raw.direct_branches.is_empty() {
        return Err(malformed(format!(
            "direct branch {} carries its own direct branches",
            raw.turn_id
        )));
    }
    let parent = raw.parent_turn_id.unwrap_or(root_id);
    if parent != root_id && (parent == raw.turn_id || !sibling_branches.contains(&parent)) {
        return Err(malformed(format!(
            "direct branch {} hangs off {parent}, which is neither root {root_id} nor one of its branches",
            raw.turn_id
        )));
    }
    claim(seen, raw.turn_id)?;

    let turn_id = raw.turn_id;
    let children = raw
        .children
        .into_iter()
        .map(|child| convert_child(child, turn_id, conversation_id, seen))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Node {
        turn_id,
        conversation_id,
        parent_turn_id: Some(parent),
        kind: NodeKind::DirectBranch,
        branch_label: raw.branch_label,
        children,
        direct_branches: Vec::new(),
        time_created: raw.time_created,
    })
}

fn convert_child(
    raw: WireNode,
    container: TurnId,
    conversation_id: TurnId,
    seen: &mut HashSet<TurnId>,
) -> Result<Node, ArborError> {
    if raw.is_root || raw.is_direct_branch {
        return Err(malformed(format!(
            "turn {} is nested under {container} but flagged as a root or direct branch",
            raw.turn_id
        )));
    }
    if !raw.direct_branches.is_empty() {
        return Err(malformed(format!(
            "nested turn {} carries direct branches",
            raw.turn_id
        )));
    }
    let parent = raw.parent_turn_id.unwrap_or(container);
    if parent != container {
        return Err(malformed(format!(
            "turn {} is nested under {container} but names {parent} as its parent",
            raw.turn_id
        )));
    }
    claim(seen, raw.turn_id)?;

    let turn_id = raw.turn_id;
    let children = raw
        .children
        .into_iter()
        .map(|child| convert_child(child, turn_id, conversation_id, seen))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Node {
        turn_id,
        conversation_id,
        parent_turn_id: Some(parent),
        kind: NodeKind::Child,
        branch_label: raw.branch_label,
        children,
        direct_branches: Vec::new(),
        time_created: raw.time_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_tree() {
        let payload = json!({
            "roots": [{
                "turnId": 1,
                "isRoot": true,
                "timeCreated": "2024-05-01T10:00:00Z",
                "children": [
                    { "turnId": 2, "parentTurnId": 1, "timeCreated": "2024-05-01T10:01:00Z" }
                ],
                "directBranches": [
                    { "turnId": 3, "parentTurnId": 1, "isDirectBranch": true, "branchLabel": "alt" },
                    { "turnId": 4, "parentTurnId": 3, "isDirectBranch": true,
                      "children": [{ "turnId": 5, "parentTurnId": 4 }] }
                ]
            }]
        });

        let forest = parse(Some(&payload)).unwrap();
        let root = &forest.roots()[0];
        assert_eq!(root.kind, NodeKind::Root);
        assert_eq!(root.conversation_id, TurnId::new(1));
        assert_eq!(root.children[0].kind, NodeKind::Child);
        assert_eq!(root.direct_branches[0].branch_label.as_deref(), Some("alt"));
        assert_eq!(root.direct_branches[1].parent_turn_id, Some(TurnId::new(3)));
        assert_eq!(root.direct_branches[1].children[0].conversation_id, TurnId::new(1));
        assert_eq!(forest.node_count(), 5);
    }

    #[test]
    fn test_empty_payloads() {
        assert!(parse(None).unwrap().is_empty());
        assert!(parse(Some(&serde_json::Value::Null)).unwrap().is_empty());
        assert!(parse(Some(&json!({}))).unwrap().is_empty());
        assert!(parse(Some(&json!({ "roots": [] }))).unwrap().is_empty());
    }

    #[test]
    fn test_missing_parent_is_inferred() {
        let payload = json!({ "roots": [{ "turnId": 1, "children": [{ "turnId": 2 }] }] });
        let forest = parse(Some(&payload)).unwrap();
        assert_eq!(
            forest.get(TurnId::new(2)).unwrap().parent_turn_id,
            Some(TurnId::new(1))
        );
    }

    #[test]
    fn test_duplicate_turn_is_malformed() {
        let payload = json!({
            "roots": [
                { "turnId": 1, "children": [{ "turnId": 2 }] },
                { "turnId": 2 }
            ]
        });
        assert!(matches!(
            parse(Some(&payload)),
            Err(ArborError::MalformedTree(_))
        ));
    }

    #[test]
    fn test_structural_violations_are_malformed() {
        let cases = [
            json!({ "roots": [{ "turnId": 1, "parentTurnId": 9 }] }),
            json!({ "roots": [{ "turnId": 1, "children": [{ "turnId": 2, "isDirectBranch": true }] }] }),
            json!({ "roots": [{ "turnId": 1, "children": [{ "turnId": 2, "parentTurnId": 7 }] }] }),
            json!({ "roots": [{ "turnId": 1, "directBranches": [{ "turnId": 2, "parentTurnId": 8 }] }] }),
            json!({ "roots": [{ "turnId": 1, "children": [{ "turnId": 2,
                "directBranches": [{ "turnId": 3 }] }] }] }),
            json!({ "roots": "nope" }),
            json!([1, 2, 3]),
        ];
        for payload in cases {
            assert!(parse(Some(&payload)).is_err(), "accepted {payload}");
            assert!(parse_lenient(Some(&payload)).is_empty());
        }
    }

    #[test]
    fn test_encode_then_parse_preserves_structure() {
        let payload = json!({
            "roots": [{
                "turnId": 10,
                "directBranches": [{ "turnId": 11, "parentTurnId": 10, "isDirectBranch": true }],
                "children": [{ "turnId": 12, "children": [{ "turnId": 13 }] }]
            }]
        });
        let forest = parse(Some(&payload)).unwrap();
        let encoded = encode(&forest).unwrap();
        assert_eq!(encoded["roots"][0]["isRoot"], json!(true));
        assert_eq!(encoded["roots"][0]["directBranches"][0]["isDirectBranch"], json!(true));
        assert_eq!(parse(Some(&encoded)).unwrap(), forest);
    }
}
