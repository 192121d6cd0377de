//! Messages and the append-only message log
//!
//! Messages belong to a turn and, in multi-model mode, to the model whose
//! viewport sent or answered them. The log never mutates or removes a
//! message; visibility is computed elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

use crate::ids::{MessageId, ModelId, TurnId};
use crate::stored::Stored;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Core message data
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Owning turn
    pub turn_id: TurnId,
    pub role: Role,
    /// Previous message in send order
    pub parent_id: Option<MessageId>,
    pub model_id: Option<ModelId>,
    pub content: String,
}

pub type StoredMessage = Stored<MessageId, Message>;

/// Which messages count for a viewport.
///
/// `All` in single-model mode; `Model` restricts to one model's messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    All,
    Model(&'a ModelId),
}

impl Scope<'_> {
    pub fn admits(&self, message: &Message) -> bool {
        match self {
            Scope::All => true,
            Scope::Model(model) => message.model_id.as_ref() == Some(*model),
        }
    }
}

/// A previously-sent message as returned by the history endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub message_id: MessageId,
    pub turn_id: TurnId,
    pub role: Role,
    #[serde(default)]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub model_id: Option<ModelId>,
    pub content: String,
    pub time_created: DateTime<Utc>,
    /// Embedded JSON blob; may be absent or garbage on old records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageMetadata {
    #[serde(default)]
    model_id: Option<ModelId>,
}

impl HistoryRecord {
    /// Decode into a stored message; fails only on unparseable metadata
    fn decode(self) -> serde_json::Result<StoredMessage> {
        let metadata = match self.metadata.as_deref() {
            None | Some("") => MessageMetadata::default(),
            Some(raw) => serde_json::from_str::<MessageMetadata>(raw)?,
        };
        let message = Message {
            turn_id: self.turn_id,
            role: self.role,
            parent_id: self.parent_id,
            model_id: metadata.model_id.or(self.model_id),
            content: self.content,
        };
        Ok(Stored::new(self.message_id, message, self.time_created))
    }
}

/// Append-only, time-ordered message store for one context
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<StoredMessage>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, keeping `(time_created, id)` order.
    ///
    /// Returns `false` if a message with the same id is already present.
    pub fn append(&mut self, message: StoredMessage) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        let key = message.order_key();
        let position = self.messages.partition_point(|m| m.order_key() <= key);
        self.messages.insert(position, message);
        true
    }

    /// Load history records, skipping any whose metadata cannot be parsed.
    ///
    /// Returns how many messages were added.
    pub fn ingest_history(&mut self, records: impl IntoIterator<Item = HistoryRecord>) -> usize {
        let mut added = 0;
        for record in records {
            let message_id = record.message_id;
            match record.decode() {
                Ok(message) => {
                    if self.append(message) {
                        added += 1;
                    }
                }
                Err(e) => {
                    warn!(message_id = %message_id, error = %e, "Skipping message with malformed metadata");
                }
            }
        }
        debug!(added, total = self.messages.len(), "Ingested message history");
        added
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StoredMessage> {
        self.messages.iter()
    }

    pub fn get(&self, id: MessageId) -> Option<&StoredMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Messages of one turn within a scope, oldest first
    pub fn in_turn<'a>(
        &'a self,
        turn_id: TurnId,
        scope: Scope<'_>,
    ) -> impl Iterator<Item = &'a StoredMessage> {
        self.messages
            .iter()
            .filter(move |m| m.turn_id == turn_id && scope.admits(m))
    }

    pub fn last_in_turn(&self, turn_id: TurnId, scope: Scope<'_>) -> Option<&StoredMessage> {
        self.in_turn(turn_id, scope).last()
    }

    pub fn has_messages(&self, turn_id: TurnId, scope: Scope<'_>) -> bool {
        self.in_turn(turn_id, scope).next().is_some()
    }

    /// A turn is complete when its latest message in scope is the assistant's
    pub fn turn_complete(&self, turn_id: TurnId, scope: Scope<'_>) -> bool {
        self.last_in_turn(turn_id, scope)
            .is_some_and(|m| m.role == Role::Assistant)
    }

    /// Latest message in scope across a set of turns
    pub fn last_in_turns(
        &self,
        turns: &BTreeSet<TurnId>,
        scope: Scope<'_>,
    ) -> Option<&StoredMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| turns.contains(&m.turn_id) && scope.admits(m))
    }

    /// Turn of the most recent message in scope
    pub fn latest_turn(&self, scope: Scope<'_>) -> Option<TurnId> {
        self.messages
            .iter()
            .rev()
            .find(|m| scope.admits(m))
            .map(|m| m.turn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn msg(id: i64, turn: i64, role: Role, model: Option<&str>, secs: i64) -> StoredMessage {
        Stored::new(
            MessageId::new(id),
            Message {
                turn_id: TurnId::new(turn),
                role,
                parent_id: None,
                model_id: model.map(ModelId::from),
                content: format!("message {id}"),
            },
            at(secs),
        )
    }

    fn record(id: i64, metadata: Option<&str>) -> HistoryRecord {
        HistoryRecord {
            message_id: MessageId::new(id),
            turn_id: TurnId::new(1),
            role: Role::User,
            parent_id: None,
            model_id: None,
            content: "hi".to_string(),
            time_created: at(id),
            metadata: metadata.map(str::to_string),
        }
    }

    #[test]
    fn test_append_keeps_time_order() {
        let mut log = MessageLog::new();
        assert!(log.append(msg(2, 1, Role::Assistant, None, 20)));
        assert!(log.append(msg(1, 1, Role::User, None, 10)));
        assert!(log.append(msg(3, 1, Role::User, None, 20)));
        assert!(!log.append(msg(3, 1, Role::User, None, 20)));

        let ids: Vec<_> = log.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_turn_complete_is_scoped() {
        let mut log = MessageLog::new();
        log.append(msg(1, 5, Role::User, Some("a"), 1));
        log.append(msg(2, 5, Role::Assistant, Some("a"), 2));
        log.append(msg(3, 5, Role::User, Some("b"), 3));

        let a = ModelId::from("a");
        let b = ModelId::from("b");
        assert!(log.turn_complete(TurnId::new(5), Scope::Model(&a)));
        assert!(!log.turn_complete(TurnId::new(5), Scope::Model(&b)));
        assert!(!log.turn_complete(TurnId::new(5), Scope::All));
        assert!(!log.turn_complete(TurnId::new(6), Scope::All));
        assert!(!log.has_messages(TurnId::new(6), Scope::All));
    }

    #[test]
    fn test_malformed_metadata_skips_only_that_record() {
        let mut log = MessageLog::new();
        let added = log.ingest_history(vec![
            record(1, None),
            record(2, Some("{not json")),
            record(3, Some(r#"{"modelId": "gpt"}"#)),
        ]);

        assert_eq!(added, 2);
        assert!(log.get(MessageId::new(2)).is_none());
        assert_eq!(
            log.get(MessageId::new(3)).unwrap().model_id,
            Some(ModelId::from("gpt"))
        );
    }

    #[test]
    fn test_latest_turn_and_last_in_turns() {
        let mut log = MessageLog::new();
        log.append(msg(1, 1, Role::User, Some("a"), 1));
        log.append(msg(2, 2, Role::User, Some("b"), 2));
        log.append(msg(3, 3, Role::User, Some("a"), 3));

        let a = ModelId::from("a");
        assert_eq!(log.latest_turn(Scope::Model(&a)), Some(TurnId::new(3)));
        assert_eq!(log.latest_turn(Scope::All), Some(TurnId::new(3)));

        let turns: BTreeSet<_> = [TurnId::new(1), TurnId::new(2)].into_iter().collect();
        assert_eq!(
            log.last_in_turns(&turns, Scope::Model(&a)).map(|m| m.id),
            Some(MessageId::new(1))
        );
    }
}
