//! Backend contract
//!
//! The core talks to the conversation server through these request/response
//! shapes only. Transport failures surface as `Err`; a server that answers
//! `success: false` is a normal reply carrying a user-facing message.
//!
//! `MemoryBackend` is an in-process implementation used by tests and the CLI.

mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::{ContextId, MessageId, ModelId, TurnId};
use crate::message::HistoryRecord;

pub use memory::{MemoryBackend, Operation};

/// Reply to branch or root creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_turn_id: Option<TurnId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MutationReply {
    pub fn created(new_turn_id: TurnId) -> Self {
        Self {
            success: true,
            new_turn_id: Some(new_turn_id),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            new_turn_id: None,
            message: Some(message.into()),
        }
    }

    /// New turn id, or the server's explanation of why there is none
    pub fn into_outcome(self) -> std::result::Result<TurnId, String> {
        match (self.success, self.new_turn_id) {
            (true, Some(turn_id)) => Ok(turn_id),
            (true, None) => Err("server reported success without a new turn id".to_string()),
            (false, _) => Err(self.message.unwrap_or_else(|| "request was rejected".to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    /// Previous message in send order
    pub parent_id: Option<MessageId>,
    /// Turn to append to; `None` asks the server to open a new turn
    pub turn_id: Option<TurnId>,
    pub model_id: ModelId,
    pub content: String,
}

/// Reply to a message send: the assistant's answer and where it landed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReply {
    pub success: bool,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub turn_id: Option<TurnId>,
    /// Id the server gave the user's own message
    #[serde(default)]
    pub user_message_id: Option<MessageId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Accepted send, unpacked from a successful [`SendReply`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub content: String,
    pub turn_id: TurnId,
    pub user_message_id: Option<MessageId>,
}

impl SendReply {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            content: None,
            turn_id: None,
            user_message_id: None,
            message: Some(message.into()),
        }
    }

    pub fn into_outcome(self) -> std::result::Result<SendReceipt, String> {
        if !self.success {
            return Err(self.message.unwrap_or_else(|| "message was rejected".to_string()));
        }
        match (self.message_id, self.turn_id) {
            (Some(message_id), Some(turn_id)) => Ok(SendReceipt {
                message_id,
                content: self.content.unwrap_or_default(),
                turn_id,
                user_message_id: self.user_message_id,
            }),
            _ => Err("server reported success without a message or turn id".to_string()),
        }
    }
}

/// Conversation server operations consumed by the core
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Fetch the whole tree for a context.
    ///
    /// `Ok(None)` means the server has no tree yet. The payload is opaque
    /// JSON; see [`crate::tree::wire`] for its shape.
    async fn fetch_tree(&self, context: &ContextId) -> Result<Option<serde_json::Value>>;

    /// Previously-sent messages for a context
    async fn fetch_history(&self, context: &ContextId) -> Result<Vec<HistoryRecord>>;

    async fn create_branch(&self, context: &ContextId, parent: TurnId) -> Result<MutationReply>;

    async fn create_root(&self, context: &ContextId) -> Result<MutationReply>;

    async fn send_message(&self, context: &ContextId, request: SendRequest) -> Result<SendReply>;
}
