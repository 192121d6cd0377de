//! Conversation-tree navigation and branching engine
//!
//! This crate provides:
//! - **Tree**: tagged `Node`/`Forest`, pathway resolution, hierarchical numbering, wire parsing
//! - **Policy**: message visibility classification and the send/lock state machine
//! - **Mutation**: optimistic branch and root creation reconciled against the server
//! - **Viewports**: independent per-model positions over one shared tree
//! - **Session**: `ConversationSession`, the per-context coordinator tying it together
//!
//! # Example
//!
//! ```ignore
//! use arbor_core::{ConversationSession, MemoryBackend, SendTarget, TreeStore};
//!
//! let session = ConversationSession::new(context, backend, Arc::new(TreeStore::new()), options);
//! session.open().await?;
//! session.send_message("hello", SendTarget::ViewingTurn).await?;
//! let snapshot = session.active_snapshot()?;
//! ```
pub mod backend;
pub mod error;
pub mod ids;
pub mod lock;
pub mod message;
pub mod mutator;
pub mod session;
pub mod store;
pub mod stored;
pub mod tree;
pub mod viewport;
pub mod visibility;

pub use backend::{ConversationBackend, MemoryBackend, MutationReply, SendReceipt, SendReply, SendRequest};
pub use error::{ArborError, Result};
pub use ids::{ContextId, MessageId, ModelId, TurnId};
pub use lock::{LockInputs, LockState};
pub use message::{HistoryRecord, Message, MessageLog, Role, Scope, StoredMessage};
pub use mutator::{BranchMutator, Created};
pub use session::{
    ConversationSession, NoticeLevel, Notification, SendTarget, SessionEvent, SessionEventSender,
    SessionOptions, ViewportSnapshot,
};
pub use store::TreeStore;
pub use stored::Stored;
pub use tree::{Forest, Node, NodeKind, OutlineRow};
pub use viewport::{ViewportCoordinator, ViewportState};
pub use visibility::{Classification, VisibilityDecision};
