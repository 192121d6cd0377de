//! Plain-text rendering of outlines and viewport snapshots

use std::fmt::Write;

use arbor_core::{MessageId, NodeKind, OutlineRow, StoredMessage, TurnId, ViewportSnapshot};

/// Sidebar tree, one row per turn, with the viewing turn marked.
///
/// With several top-level conversations each label is prefixed by its
/// conversation number, since every conversation numbers from `1`.
pub fn outline(rows: &[OutlineRow], viewing: Option<TurnId>) -> String {
    if rows.is_empty() {
        return "(no conversations yet)\n".to_string();
    }
    let qualify = rows.iter().any(|row| row.conversation > 1);
    let mut out = String::new();
    for row in rows {
        let marker = if Some(row.turn_id) == viewing { '>' } else { ' ' };
        let indent = "  ".repeat(row.depth);
        let kind = match row.kind {
            NodeKind::Root => "conversation",
            NodeKind::DirectBranch => "branch",
            NodeKind::Child => "turn",
        };
        let label = if qualify {
            format!("#{} {}", row.conversation, row.label)
        } else {
            row.label.clone()
        };
        let _ = write!(out, "{marker} {indent}{label} [{kind} {}]", row.turn_id);
        if let Some(name) = &row.branch_label {
            let _ = write!(out, " {name}");
        }
        out.push('\n');
    }
    out
}

/// Status line plus every visible message of one viewport
pub fn viewport<F>(snapshot: &ViewportSnapshot, lookup: F) -> String
where
    F: Fn(MessageId) -> Option<StoredMessage>,
{
    let mut out = String::new();
    let position = match (&snapshot.turn_label, snapshot.viewing_turn) {
        (Some(label), Some(turn)) => format!("turn {label} ({turn})"),
        (None, Some(turn)) => format!("turn {turn}"),
        (_, None) => "no turn".to_string(),
    };
    let _ = writeln!(
        out,
        "[{}] {} | {}{}",
        snapshot.model,
        position,
        snapshot.lock_state,
        if snapshot.show_previous { " | showing previous" } else { "" }
    );

    for decision in snapshot.decisions.iter().filter(|d| d.visible) {
        let Some(message) = lookup(decision.message_id) else {
            continue;
        };
        let _ = writeln!(out, "  {:>9}: {}", message.role.to_string(), message.content.content);
    }

    let hint = if snapshot.input_enabled {
        "type a message"
    } else if snapshot.lock_state.allows_next_turn() {
        "/next to continue, /branch to fork"
    } else {
        "input disabled"
    };
    let _ = writeln!(out, "  ({hint})");
    out
}
