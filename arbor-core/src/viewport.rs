//! Per-model viewports over one shared tree
//!
//! Each viewport keeps its own viewing and current turn. Only the active
//! viewport follows sidebar navigation; sending in one viewport advances only
//! that viewport.
//!
//! Canonical root rule: on initialization, viewports are scanned in their
//! configured order and the root owning the first resolvable starting turn
//! becomes the canonical root. Every viewport starts inside that
//! conversation. The choice is made once and never moves to a more recently
//! updated root.

use tracing::debug;

use crate::error::{ArborError, Result};
use crate::ids::{ModelId, TurnId};
use crate::message::{MessageLog, Scope};
use crate::tree::node::{Forest, Node};
use crate::tree::pathway;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportState {
    pub viewing_turn: Option<TurnId>,
    /// Highest turn reached along this viewport's lineage
    pub current_turn: Option<TurnId>,
    pub show_previous: bool,
}

#[derive(Clone, Debug)]
struct Viewport {
    model: ModelId,
    state: ViewportState,
}

#[derive(Clone, Debug)]
pub struct ViewportCoordinator {
    viewports: Vec<Viewport>,
    active: usize,
    canonical_root: Option<TurnId>,
}

impl ViewportCoordinator {
    /// One viewport per model, in the given order. At least one viewport
    /// always exists; an empty list yields a single `default` viewport.
    pub fn new(models: Vec<ModelId>, show_previous: bool) -> Self {
        let models = if models.is_empty() {
            vec![ModelId::from("default")]
        } else {
            models
        };
        let viewports = models
            .into_iter()
            .map(|model| Viewport {
                model,
                state: ViewportState {
                    show_previous,
                    ..ViewportState::default()
                },
            })
            .collect();
        Self {
            viewports,
            active: 0,
            canonical_root: None,
        }
    }

    /// More than one viewport: messages are filtered by model
    pub fn is_multi_model(&self) -> bool {
        self.viewports.len() > 1
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.viewports.iter().map(|v| &v.model)
    }

    pub fn canonical_root(&self) -> Option<TurnId> {
        self.canonical_root
    }

    /// Message scope for a viewport's model
    pub fn scope<'a>(&self, model: &'a ModelId) -> Scope<'a> {
        scope_for(self.is_multi_model(), model)
    }

    pub fn active_model(&self) -> &ModelId {
        &self.viewports[self.active].model
    }

    pub fn active_state(&self) -> ViewportState {
        self.viewports[self.active].state
    }

    pub fn state(&self, model: &ModelId) -> Option<ViewportState> {
        self.viewports
            .iter()
            .find(|v| &v.model == model)
            .map(|v| v.state)
    }

    fn position(&self, model: &ModelId) -> Result<usize> {
        self.viewports
            .iter()
            .position(|v| &v.model == model)
            .ok_or_else(|| ArborError::UnknownViewport(model.clone()))
    }

    fn state_mut(&mut self, model: &ModelId) -> Result<&mut ViewportState> {
        let index = self.position(model)?;
        Ok(&mut self.viewports[index].state)
    }

    pub fn activate(&mut self, model: &ModelId) -> Result<()> {
        self.active = self.position(model)?;
        debug!(model = %model, "Activated viewport");
        Ok(())
    }

    /// Point every viewport at its starting turn and fix the canonical root.
    ///
    /// A viewport starts at the turn of its latest message. If that turn
    /// lies outside the canonical conversation, the viewport is moved to its
    /// latest turn inside it, or to the canonical root itself.
    pub fn initialize(&mut self, forest: &Forest, log: &MessageLog) {
        let multi = self.is_multi_model();

        let starts: Vec<Option<TurnId>> = self
            .viewports
            .iter()
            .map(|v| latest_turn_in(forest, log, scope_for(multi, &v.model), |_| true))
            .collect();

        if self.canonical_root.is_none() {
            self.canonical_root = starts
                .iter()
                .flatten()
                .find_map(|turn| pathway::find_owning_root(forest.roots(), *turn))
                .or_else(|| forest.roots().first())
                .map(|root| root.turn_id);
        }
        let Some(canonical) = self.canonical_root else {
            return;
        };
        let Some(canonical_node) = forest.get(canonical) else {
            return;
        };

        for (viewport, start) in self.viewports.iter_mut().zip(starts) {
            let in_canonical = |turn: TurnId| {
                pathway::find_owning_root(forest.roots(), turn)
                    .is_some_and(|root| root.turn_id == canonical)
            };
            let viewing = match start {
                Some(turn) if in_canonical(turn) => turn,
                _ => latest_turn_in(forest, log, scope_for(multi, &viewport.model), |turn| {
                    subtree_contains(canonical_node, turn)
                })
                .unwrap_or(canonical),
            };
            viewport.state.viewing_turn = Some(viewing);
            viewport.state.current_turn = Some(answered_head(
                forest,
                log,
                scope_for(multi, &viewport.model),
                viewing,
            ));
            debug!(model = %viewport.model, turn = %viewing, "Initialized viewport");
        }
    }

    /// Re-align the active viewport after sidebar navigation.
    ///
    /// The current turn only counts turns this viewport has messages in;
    /// turns opened by other viewports do not move it.
    pub fn navigate_active(&mut self, forest: &Forest, log: &MessageLog, turn: TurnId) {
        let scope = scope_for(self.is_multi_model(), &self.viewports[self.active].model);
        let head = answered_head(forest, log, scope, turn);
        let viewport = &mut self.viewports[self.active];
        viewport.state.viewing_turn = Some(turn);
        viewport.state.current_turn = Some(head);
        debug!(model = %viewport.model, turn = %turn, "Navigated viewport");
    }

    /// Record a send from `model` that landed in `turn`
    pub fn advance(&mut self, model: &ModelId, turn: TurnId) -> Result<()> {
        let state = self.state_mut(model)?;
        state.viewing_turn = Some(turn);
        state.current_turn = Some(state.current_turn.map_or(turn, |current| current.max(turn)));
        Ok(())
    }

    /// Move the active viewport onto a newly created node
    pub fn point_active_at(&mut self, turn: TurnId) {
        let state = &mut self.viewports[self.active].state;
        state.viewing_turn = Some(turn);
        state.current_turn = Some(turn);
    }

    /// Flip the active viewport's "show previous" toggle, returning the new value
    pub fn toggle_previous(&mut self) -> bool {
        let state = &mut self.viewports[self.active].state;
        state.show_previous = !state.show_previous;
        state.show_previous
    }
}

fn scope_for(multi_model: bool, model: &ModelId) -> Scope<'_> {
    if multi_model {
        Scope::Model(model)
    } else {
        Scope::All
    }
}

fn subtree_contains(node: &Node, turn: TurnId) -> bool {
    node.turn_id == turn || node.attached().any(|next| subtree_contains(next, turn))
}

/// Highest turn along `turn`'s lineage holding a message in `scope`, or `turn`
fn answered_head(forest: &Forest, log: &MessageLog, scope: Scope<'_>, turn: TurnId) -> TurnId {
    pathway::lineage_head(forest, turn, |t| log.has_messages(t, scope)).unwrap_or(turn)
}

/// Turn of the latest message in scope whose turn is in the forest and passes `keep`
fn latest_turn_in(
    forest: &Forest,
    log: &MessageLog,
    scope: Scope<'_>,
    keep: impl Fn(TurnId) -> bool,
) -> Option<TurnId> {
    log.iter()
        .rev()
        .filter(|m| scope.admits(m))
        .map(|m| m.turn_id)
        .find(|turn| forest.contains(*turn) && keep(*turn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MessageId;
    use crate::message::{Message, Role};
    use crate::stored::Stored;
    use chrono::{TimeZone, Utc};

    fn t(id: i64) -> TurnId {
        TurnId::new(id)
    }

    fn models() -> Vec<ModelId> {
        vec![ModelId::from("a"), ModelId::from("b")]
    }

    /// Two conversations: r1 { child 2 { child 3 } } and r4 { child 5 }
    fn two_conversations() -> Forest {
        let at = Utc.timestamp_opt(0, 0).unwrap();
        let mut r1 = Node::root(t(1), at);
        let mut c2 = Node::child_of(&r1, t(2), at);
        c2.children.push(Node::child_of(&c2, t(3), at));
        r1.children.push(c2);
        let mut r4 = Node::root(t(4), at);
        r4.children.push(Node::child_of(&r4, t(5), at));
        Forest::new(vec![r1, r4])
    }

    fn log(entries: &[(i64, i64, &str)]) -> MessageLog {
        let mut log = MessageLog::new();
        for (id, turn, model) in entries {
            log.append(Stored::new(
                MessageId::new(*id),
                Message {
                    turn_id: t(*turn),
                    role: Role::User,
                    parent_id: None,
                    model_id: Some(ModelId::from(*model)),
                    content: String::new(),
                },
                Utc.timestamp_opt(*id, 0).unwrap(),
            ));
        }
        log
    }

    #[test]
    fn test_first_discovered_root_is_canonical() {
        let forest = two_conversations();
        // b was updated most recently (in r4) but a is scanned first (in r1)
        let log = log(&[(1, 1, "b"), (2, 2, "a"), (3, 5, "b")]);
        let mut coordinator = ViewportCoordinator::new(models(), false);
        coordinator.initialize(&forest, &log);

        assert_eq!(coordinator.canonical_root(), Some(t(1)));
        let a = coordinator.state(&ModelId::from("a")).unwrap();
        assert_eq!(a.viewing_turn, Some(t(2)));
        // a has nothing in turn 3
        assert_eq!(a.current_turn, Some(t(2)));

        // b's latest turn is outside r1, so it aligns to its latest turn inside r1
        let b = coordinator.state(&ModelId::from("b")).unwrap();
        assert_eq!(b.viewing_turn, Some(t(1)));
    }

    #[test]
    fn test_canonical_root_does_not_move_on_reinitialize() {
        let forest = two_conversations();
        let mut coordinator = ViewportCoordinator::new(models(), false);
        coordinator.initialize(&forest, &log(&[(1, 5, "a")]));
        assert_eq!(coordinator.canonical_root(), Some(t(4)));

        coordinator.initialize(&forest, &log(&[(1, 5, "a"), (2, 2, "a")]));
        assert_eq!(coordinator.canonical_root(), Some(t(4)));
        let a = coordinator.state(&ModelId::from("a")).unwrap();
        assert_eq!(a.viewing_turn, Some(t(5)));
    }

    #[test]
    fn test_no_messages_falls_back_to_first_root() {
        let forest = two_conversations();
        let mut coordinator = ViewportCoordinator::new(models(), true);
        coordinator.initialize(&forest, &MessageLog::new());

        assert_eq!(coordinator.canonical_root(), Some(t(1)));
        for model in models() {
            let state = coordinator.state(&model).unwrap();
            assert_eq!(state.viewing_turn, Some(t(1)));
            assert!(state.show_previous);
        }
    }

    #[test]
    fn test_send_advances_only_sender() {
        let forest = two_conversations();
        let mut coordinator = ViewportCoordinator::new(models(), false);
        coordinator.initialize(&forest, &MessageLog::new());
        let before_b = coordinator.state(&ModelId::from("b")).unwrap();

        coordinator.advance(&ModelId::from("a"), t(5)).unwrap();

        let a = coordinator.state(&ModelId::from("a")).unwrap();
        assert_eq!(a.viewing_turn, Some(t(5)));
        assert_eq!(a.current_turn, Some(t(5)));
        assert_eq!(coordinator.state(&ModelId::from("b")).unwrap(), before_b);
    }

    #[test]
    fn test_navigation_moves_only_active_viewport() {
        let forest = two_conversations();
        let mut coordinator = ViewportCoordinator::new(models(), false);
        let log = log(&[(1, 3, "b")]);
        coordinator.initialize(&forest, &log);

        coordinator.activate(&ModelId::from("b")).unwrap();
        coordinator.navigate_active(&forest, &log, t(2));

        let b = coordinator.state(&ModelId::from("b")).unwrap();
        assert_eq!(b.viewing_turn, Some(t(2)));
        assert_eq!(b.current_turn, Some(t(3)));
        let a = coordinator.state(&ModelId::from("a")).unwrap();
        assert_eq!(a.viewing_turn, Some(t(1)));
    }

    #[test]
    fn test_turns_answered_by_other_viewports_do_not_move_current() {
        let forest = two_conversations();
        let log = log(&[(1, 1, "a"), (2, 1, "b"), (3, 2, "a"), (4, 3, "a")]);
        let mut coordinator = ViewportCoordinator::new(models(), false);
        coordinator.initialize(&forest, &log);

        coordinator.activate(&ModelId::from("b")).unwrap();
        coordinator.navigate_active(&forest, &log, t(1));
        let b = coordinator.state(&ModelId::from("b")).unwrap();
        assert_eq!(b.current_turn, Some(t(1)));

        coordinator.activate(&ModelId::from("a")).unwrap();
        coordinator.navigate_active(&forest, &log, t(1));
        let a = coordinator.state(&ModelId::from("a")).unwrap();
        assert_eq!(a.viewing_turn, Some(t(1)));
        assert_eq!(a.current_turn, Some(t(3)));
    }

    #[test]
    fn test_unknown_viewport() {
        let mut coordinator = ViewportCoordinator::new(models(), false);
        assert!(matches!(
            coordinator.activate(&ModelId::from("zzz")),
            Err(ArborError::UnknownViewport(_))
        ));
        assert!(coordinator.advance(&ModelId::from("zzz"), t(1)).is_err());
    }

    #[test]
    fn test_single_viewport_is_not_filtered() {
        let coordinator = ViewportCoordinator::new(Vec::new(), false);
        assert!(!coordinator.is_multi_model());
        assert_eq!(coordinator.active_model(), &ModelId::from("default"));
        assert_eq!(coordinator.scope(&ModelId::from("default")), Scope::All);
    }
}
