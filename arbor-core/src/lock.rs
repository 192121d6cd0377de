//! Send/lock policy
//!
//! A pure function from the current inputs to a lock state. It keeps no
//! history and is re-evaluated on every relevant event.

use serde::Serialize;
use std::fmt;

use crate::ids::TurnId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    WaitingResponse,
    /// Viewing a turn behind the viewport's current turn
    LockedPast,
    /// The turn is answered; a new branch or next turn is needed to continue
    LockedComplete,
    /// The conversation hit its node ceiling; no further branching
    LockedMaxTurns,
}

impl LockState {
    /// `Unlocked` and `WaitingResponse` are the only non-locked states
    pub fn is_locked(self) -> bool {
        !matches!(self, LockState::Unlocked | LockState::WaitingResponse)
    }

    /// Whether the input box accepts a new message into the viewing turn.
    ///
    /// Input is disabled while a request is in flight to prevent duplicate
    /// submission.
    pub fn input_enabled(self) -> bool {
        self == LockState::Unlocked
    }

    /// Whether a new turn may be opened after the viewing turn
    pub fn allows_next_turn(self) -> bool {
        self == LockState::LockedComplete
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LockState::Unlocked => "unlocked",
            LockState::WaitingResponse => "waiting for a response",
            LockState::LockedPast => "viewing an earlier turn",
            LockState::LockedComplete => "turn complete",
            LockState::LockedMaxTurns => "conversation reached its turn limit",
        };
        f.write_str(text)
    }
}

/// Everything the policy looks at
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LockInputs {
    pub viewing_turn: TurnId,
    pub current_turn: TurnId,
    /// The viewport's latest message in the viewing turn is the assistant's
    pub turn_complete: bool,
    pub request_in_flight: bool,
    pub max_turns: Option<usize>,
    /// Size of the whole tree under the conversation's root.
    ///
    /// This bounds total branching, not the depth of the path to the viewing
    /// turn. Whether depth was the intended measure is unresolved, so the
    /// whole-tree count is kept as observed.
    pub conversation_node_count: usize,
    pub viewing_turn_has_messages: bool,
}

/// Evaluate the lock state; rules apply in order, first match wins
pub fn evaluate(inputs: &LockInputs) -> LockState {
    if inputs.viewing_turn < inputs.current_turn {
        LockState::LockedPast
    } else if inputs.request_in_flight {
        LockState::WaitingResponse
    } else if !inputs.turn_complete {
        LockState::Unlocked
    } else if inputs
        .max_turns
        .is_some_and(|max| inputs.conversation_node_count >= max)
        && inputs.viewing_turn_has_messages
    {
        LockState::LockedMaxTurns
    } else {
        LockState::LockedComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> LockInputs {
        LockInputs {
            viewing_turn: TurnId::new(3),
            current_turn: TurnId::new(3),
            turn_complete: false,
            request_in_flight: false,
            max_turns: None,
            conversation_node_count: 1,
            viewing_turn_has_messages: false,
        }
    }

    #[test]
    fn test_viewing_past_turn_locks_regardless_of_flags() {
        for complete in [false, true] {
            for in_flight in [false, true] {
                let state = evaluate(&LockInputs {
                    viewing_turn: TurnId::new(2),
                    current_turn: TurnId::new(3),
                    turn_complete: complete,
                    request_in_flight: in_flight,
                    ..inputs()
                });
                assert_eq!(state, LockState::LockedPast);
            }
        }
    }

    #[test]
    fn test_in_flight_waits() {
        let state = evaluate(&LockInputs {
            request_in_flight: true,
            turn_complete: true,
            ..inputs()
        });
        assert_eq!(state, LockState::WaitingResponse);
        assert!(!state.is_locked());
        assert!(!state.input_enabled());
    }

    #[test]
    fn test_incomplete_turn_is_unlocked() {
        let state = evaluate(&inputs());
        assert_eq!(state, LockState::Unlocked);
        assert!(state.input_enabled());
    }

    #[test]
    fn test_ceiling_reached_locks_max_turns() {
        let state = evaluate(&LockInputs {
            turn_complete: true,
            max_turns: Some(3),
            conversation_node_count: 3,
            viewing_turn_has_messages: true,
            ..inputs()
        });
        assert_eq!(state, LockState::LockedMaxTurns);
        assert!(state.is_locked());
        assert!(!state.allows_next_turn());
    }

    #[test]
    fn test_below_ceiling_is_complete() {
        let base = LockInputs {
            turn_complete: true,
            max_turns: Some(3),
            conversation_node_count: 2,
            viewing_turn_has_messages: true,
            ..inputs()
        };
        assert_eq!(evaluate(&base), LockState::LockedComplete);
        assert!(evaluate(&base).allows_next_turn());

        let no_limit = LockInputs { max_turns: None, conversation_node_count: 50, ..base };
        assert_eq!(evaluate(&no_limit), LockState::LockedComplete);

        let empty_turn = LockInputs {
            conversation_node_count: 3,
            viewing_turn_has_messages: false,
            ..base
        };
        assert_eq!(evaluate(&empty_turn), LockState::LockedComplete);
    }

    #[test]
    fn test_identical_inputs_yield_identical_state() {
        let samples = [
            inputs(),
            LockInputs { turn_complete: true, ..inputs() },
            LockInputs { request_in_flight: true, ..inputs() },
            LockInputs {
                turn_complete: true,
                max_turns: Some(1),
                viewing_turn_has_messages: true,
                ..inputs()
            },
        ];
        for sample in samples {
            let copy = sample;
            assert_eq!(evaluate(&sample), evaluate(&copy));
        }
    }
}
