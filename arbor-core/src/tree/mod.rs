//! Conversation tree model
//!
//! - `node` - tagged `Node` and the `Forest` of one context
//! - `pathway` - owning-root search, root-to-turn paths, typed walks
//! - `numbering` - hierarchical labels and the flattened outline
//! - `wire` - parsing and encoding of server tree payloads

pub mod node;
pub mod numbering;
pub mod pathway;
pub mod wire;

pub use node::{Forest, Node, NodeKind};
pub use numbering::{label, label_of, outline, OutlineRow};
pub use pathway::{
    all_turn_ids, count_nodes, find_node, find_owning_root, lineage_head, path_to_turn, pathway,
    walk,
};
