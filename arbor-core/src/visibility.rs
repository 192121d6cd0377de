//! Visibility classification of messages for one viewport
//!
//! The filter never removes messages from the log; it only decides how each
//! one should be treated by a render layer:
//!
//! - `Current` - in the viewing turn, always shown
//! - `Previous` - in an ancestor of the viewing turn, shown when the
//!   "show previous" toggle is on
//! - `Hidden` - on another pathway or owned by another model, never shown

use serde::Serialize;
use std::collections::BTreeSet;

use crate::ids::{MessageId, TurnId};
use crate::message::{MessageLog, Scope, StoredMessage};
use crate::tree::node::Forest;
use crate::tree::pathway;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Current,
    Previous,
    Hidden,
}

impl Classification {
    pub fn is_visible(self, show_previous: bool) -> bool {
        match self {
            Classification::Current => true,
            Classification::Previous => show_previous,
            Classification::Hidden => false,
        }
    }
}

/// Turns whose messages may be shown while viewing `viewing_turn`.
///
/// Always contains the viewing turn. When the tree is missing or does not
/// know the turn, nothing else is admitted.
pub fn allowed_turns(forest: &Forest, viewing_turn: TurnId) -> BTreeSet<TurnId> {
    let mut allowed = BTreeSet::from([viewing_turn]);
    if let Some(path) = pathway::pathway(forest, viewing_turn) {
        allowed.extend(path.iter().map(|node| node.turn_id));
    }
    allowed
}

/// Classify a message by the turn that owns it
pub fn classify_message(
    message_turn: TurnId,
    allowed_turns: &BTreeSet<TurnId>,
    viewing_turn: TurnId,
) -> Classification {
    if !allowed_turns.contains(&message_turn) {
        Classification::Hidden
    } else if message_turn == viewing_turn {
        Classification::Current
    } else {
        Classification::Previous
    }
}

/// Visibility outcome for one message
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VisibilityDecision {
    pub message_id: MessageId,
    pub turn_id: TurnId,
    pub classification: Classification,
    pub visible: bool,
}

/// Classify every message in the log for one viewport.
///
/// Messages outside `scope` are `Hidden` regardless of their turn. Without a
/// viewing turn nothing is shown.
pub fn decide(
    forest: &Forest,
    log: &MessageLog,
    viewing_turn: Option<TurnId>,
    show_previous: bool,
    scope: Scope<'_>,
) -> Vec<VisibilityDecision> {
    let Some(viewing_turn) = viewing_turn else {
        return log.iter().map(hidden).collect();
    };
    let allowed = allowed_turns(forest, viewing_turn);

    log.iter()
        .map(|message| {
            let classification = if scope.admits(message) {
                classify_message(message.turn_id, &allowed, viewing_turn)
            } else {
                Classification::Hidden
            };
            VisibilityDecision {
                message_id: message.id,
                turn_id: message.turn_id,
                classification,
                visible: classification.is_visible(show_previous),
            }
        })
        .collect()
}

fn hidden(message: &StoredMessage) -> VisibilityDecision {
    VisibilityDecision {
        message_id: message.id,
        turn_id: message.turn_id,
        classification: Classification::Hidden,
        visible: false,
    }
}
