//! In-memory ConversationBackend implementation
//!
//! Behaves like the conversation server: assigns increasing turn and message
//! ids, keeps one forest and one message history per context, and answers
//! every message with a canned assistant reply. Failures and rejections can
//! be queued to exercise error paths.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::{ConversationBackend, MutationReply, SendReply, SendRequest};
use crate::ids::{ContextId, MessageId, ModelId, TurnId};
use crate::message::{HistoryRecord, Role};
use crate::tree::node::{Forest, Node};
use crate::tree::wire;

/// Backend call kinds, used to target injected failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchTree,
    FetchHistory,
    CreateBranch,
    CreateRoot,
    SendMessage,
}

type Responder = dyn Fn(&ModelId, &str) -> String + Send + Sync;

#[derive(Debug, Default)]
struct ContextState {
    forest: Forest,
    history: Vec<HistoryRecord>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_turn: i64,
    last_message: i64,
    contexts: HashMap<ContextId, ContextState>,
    failures: VecDeque<Operation>,
    rejections: VecDeque<(Operation, String)>,
    raw_trees: HashMap<ContextId, serde_json::Value>,
}

impl MemoryState {
    fn next_turn(&mut self) -> TurnId {
        self.last_turn += 1;
        TurnId::new(self.last_turn)
    }

    fn next_message(&mut self) -> MessageId {
        self.last_message += 1;
        MessageId::new(self.last_message)
    }

    /// Consume a queued failure for `op`, if any
    fn check(&mut self, op: Operation) -> Result<()> {
        if let Some(pos) = self.failures.iter().position(|queued| *queued == op) {
            self.failures.remove(pos);
            return Err(anyhow!("connection reset during {:?}", op));
        }
        Ok(())
    }

    fn take_rejection(&mut self, op: Operation) -> Option<String> {
        let pos = self.rejections.iter().position(|(queued, _)| *queued == op)?;
        self.rejections.remove(pos).map(|(_, message)| message)
    }
}

/// In-process conversation server
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    responder: Box<Responder>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend whose assistant replies echo the user's text tagged with the model
    pub fn new() -> Self {
        Self::with_responder(|model, content| format!("[{model}] {content}"))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ModelId, &str) -> String + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(MemoryState::default()),
            responder: Box::new(responder),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next call of `op` fail as if the connection dropped
    pub fn fail_next(&self, op: Operation) {
        self.lock().failures.push_back(op);
    }

    /// Make the next call of `op` answer `success: false` with `message`
    pub fn reject_next(&self, op: Operation, message: impl Into<String>) {
        self.lock().rejections.push_back((op, message.into()));
    }

    /// Serve `payload` verbatim from `fetch_tree` for this context
    pub fn serve_raw_tree(&self, context: &ContextId, payload: serde_json::Value) {
        self.lock().raw_trees.insert(context.clone(), payload);
    }

    pub fn clear_raw_tree(&self, context: &ContextId) {
        self.lock().raw_trees.remove(context);
    }

    /// Add a history record as-is, metadata included
    pub fn insert_history(&self, context: &ContextId, record: HistoryRecord) {
        self.lock()
            .contexts
            .entry(context.clone())
            .or_default()
            .history
            .push(record);
    }

    /// Snapshot of the server-side forest for a context
    pub fn forest(&self, context: &ContextId) -> Forest {
        self.lock()
            .contexts
            .get(context)
            .map(|ctx| ctx.forest.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConversationBackend for MemoryBackend {
    async fn fetch_tree(&self, context: &ContextId) -> Result<Option<serde_json::Value>> {
        let mut state = self.lock();
        state.check(Operation::FetchTree)?;

        if let Some(raw) = state.raw_trees.get(context) {
            return Ok(Some(raw.clone()));
        }
        match state.contexts.get(context) {
            Some(ctx) if !ctx.forest.is_empty() => Ok(Some(wire::encode(&ctx.forest)?)),
            _ => Ok(None),
        }
    }

    async fn fetch_history(&self, context: &ContextId) -> Result<Vec<HistoryRecord>> {
        let mut state = self.lock();
        state.check(Operation::FetchHistory)?;
        Ok(state
            .contexts
            .get(context)
            .map(|ctx| ctx.history.clone())
            .unwrap_or_default())
    }

    async fn create_branch(&self, context: &ContextId, parent: TurnId) -> Result<MutationReply> {
        let mut state = self.lock();
        state.check(Operation::CreateBranch)?;
        if let Some(message) = state.take_rejection(Operation::CreateBranch) {
            return Ok(MutationReply::rejected(message));
        }

        let turn_id = state.next_turn();
        let ctx = state.contexts.entry(context.clone()).or_default();
        let Some(parent_node) = ctx.forest.get(parent) else {
            return Ok(MutationReply::rejected(format!("Turn {parent} does not exist")));
        };
        let node = Node::branch_of(parent_node, turn_id, Utc::now());
        ctx.forest.attach(node);

        debug!(context = %context, parent = %parent, turn = %turn_id, "Created branch");
        Ok(MutationReply::created(turn_id))
    }

    async fn create_root(&self, context: &ContextId) -> Result<MutationReply> {
        let mut state = self.lock();
        state.check(Operation::CreateRoot)?;
        if let Some(message) = state.take_rejection(Operation::CreateRoot) {
            return Ok(MutationReply::rejected(message));
        }

        let turn_id = state.next_turn();
        let ctx = state.contexts.entry(context.clone()).or_default();
        ctx.forest.attach(Node::root(turn_id, Utc::now()));

        debug!(context = %context, turn = %turn_id, "Created root");
        Ok(MutationReply::created(turn_id))
    }

    async fn send_message(&self, context: &ContextId, request: SendRequest) -> Result<SendReply> {
        let mut state = self.lock();
        state.check(Operation::SendMessage)?;
        if let Some(message) = state.take_rejection(Operation::SendMessage) {
            return Ok(SendReply::rejected(message));
        }

        let new_turn = state.next_turn();
        let user_message_id = state.next_message();
        let assistant_message_id = state.next_message();
        let ctx = state.contexts.entry(context.clone()).or_default();
        let now = Utc::now();

        let turn_id = match (request.turn_id, request.parent_id) {
            (Some(turn_id), _) => {
                if !ctx.forest.contains(turn_id) {
                    return Ok(SendReply::rejected(format!("Turn {turn_id} does not exist")));
                }
                turn_id
            }
            (None, Some(parent_message)) => {
                let parent_turn = ctx
                    .history
                    .iter()
                    .find(|record| record.message_id == parent_message)
                    .map(|record| record.turn_id);
                let Some(parent_node) = parent_turn.and_then(|turn| ctx.forest.get(turn)) else {
                    return Ok(SendReply::rejected(format!(
                        "Message {parent_message} does not exist"
                    )));
                };
                let node = Node::child_of(parent_node, new_turn, now);
                ctx.forest.attach(node);
                new_turn
            }
            (None, None) => {
                ctx.forest.attach(Node::root(new_turn, now));
                new_turn
            }
        };

        let reply = (self.responder)(&request.model_id, &request.content);
        ctx.history.push(HistoryRecord {
            message_id: user_message_id,
            turn_id,
            role: Role::User,
            parent_id: request.parent_id,
            model_id: Some(request.model_id.clone()),
            content: request.content,
            time_created: now,
            metadata: None,
        });
        ctx.history.push(HistoryRecord {
            message_id: assistant_message_id,
            turn_id,
            role: Role::Assistant,
            parent_id: Some(user_message_id),
            model_id: Some(request.model_id),
            content: reply.clone(),
            time_created: now,
            metadata: None,
        });

        debug!(context = %context, turn = %turn_id, "Answered message");
        Ok(SendReply {
            success: true,
            message_id: Some(assistant_message_id),
            content: Some(reply),
            turn_id: Some(turn_id),
            user_message_id: Some(user_message_id),
            message: None,
        })
    }
}
