//! ConversationSession - the per-context coordinator
//!
//! One session is constructed per conversation context and owns everything
//! the navigation engine needs for it:
//! - the backend handle and the shared tree cache
//! - the message log
//! - the model viewports and their in-flight flags
//! - the event channel to the render layer
//!
//! Every failed backend call is returned to the caller and also emitted as a
//! [`Notification`]; cached state is left as it was so the user can retry.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{ConversationBackend, SendReceipt, SendRequest};
use crate::error::{ArborError, Result};
use crate::ids::{ContextId, MessageId, ModelId, TurnId};
use crate::lock::{self, LockInputs, LockState};
use crate::message::{Message, MessageLog, Role, StoredMessage};
use crate::mutator::{BranchMutator, Created};
use crate::store::{self, TreeStore};
use crate::stored::Stored;
use crate::tree::node::Forest;
use crate::tree::{numbering, pathway, OutlineRow};
use crate::viewport::{ViewportCoordinator, ViewportState};
use crate::visibility::{self, VisibilityDecision};


/// Type alias for the session event sender - sends (ContextId, SessionEvent) tuples
pub type SessionEventSender = mpsc::UnboundedSender<(ContextId, SessionEvent)>;

/// Per-context settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Viewport order; more than one model enables multi-model mode
    pub models: Vec<ModelId>,
    /// Node ceiling per conversation
    pub max_turns: Option<usize>,
    /// Initial value of every viewport's "show previous" toggle
    pub show_previous: bool,
}

impl From<&config::Settings> for SessionOptions {
    fn from(settings: &config::Settings) -> Self {
        Self {
            models: settings.models.iter().map(|m| ModelId::from(m.as_str())).collect(),
            max_turns: settings.max_turns,
            show_previous: settings.show_previous,
        }
    }
}

/// Where a message goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendTarget {
    /// Append to the viewing turn; requires `Unlocked`
    ViewingTurn,
    /// Open a new turn after the viewing turn; requires `LockedComplete`
    NextTurn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// User-facing message about a failed or refused action
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub text: String,
}

/// Events emitted to the render layer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The cached tree was overwritten by a fetch
    TreeRefreshed { node_count: usize },
    /// A viewport's viewing turn changed
    ViewportMoved { model: ModelId, viewing_turn: TurnId },
    BranchCreated { turn_id: TurnId, parent: Option<TurnId> },
    MessageSent {
        model: ModelId,
        turn_id: TurnId,
        message_id: MessageId,
    },
    Notice(Notification),
}

/// Everything a render layer needs to draw one viewport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewportSnapshot {
    pub model: ModelId,
    pub viewing_turn: Option<TurnId>,
    pub current_turn: Option<TurnId>,
    /// Hierarchical label of the viewing turn, when the tree knows it
    pub turn_label: Option<String>,
    pub lock_state: LockState,
    pub input_enabled: bool,
    pub show_previous: bool,
    /// One decision per message in the log, in time order
    pub decisions: Vec<VisibilityDecision>,
}

struct SessionState {
    log: MessageLog,
    viewports: ViewportCoordinator,
    in_flight: HashSet<ModelId>,
}

fn guard(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears a viewport's in-flight flag when the send finishes, however it ends
struct InFlight<'a> {
    state: &'a Mutex<SessionState>,
    model: ModelId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        guard(self.state).in_flight.remove(&self.model);
    }
}

pub struct ConversationSession<B: ConversationBackend + ?Sized> {
    context: ContextId,
    backend: Arc<B>,
    store: Arc<TreeStore>,
    mutator: BranchMutator<B>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    events: Option<SessionEventSender>,
}

impl<B: ConversationBackend + ?Sized> ConversationSession<B> {
    pub fn new(
        context: ContextId,
        backend: Arc<B>,
        store: Arc<TreeStore>,
        options: SessionOptions,
    ) -> Self {
        let viewports = ViewportCoordinator::new(options.models.clone(), options.show_previous);
        let mutator = BranchMutator::new(Arc::clone(&backend), Arc::clone(&store), context.clone());
        Self {
            context,
            backend,
            store,
            mutator,
            options,
            state: Mutex::new(SessionState {
                log: MessageLog::new(),
                viewports,
                in_flight: HashSet::new(),
            }),
            events: None,
        }
    }

    /// Route events and notifications to `sender`
    pub fn with_events(mut self, sender: SessionEventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Cached tree for this context (empty until the first successful fetch)
    pub fn forest(&self) -> Arc<Forest> {
        self.store.snapshot(&self.context)
    }

    pub fn outline(&self) -> Vec<OutlineRow> {
        numbering::outline(&self.forest())
    }

    pub fn message(&self, id: MessageId) -> Option<StoredMessage> {
        guard(&self.state).log.get(id).cloned()
    }

    pub fn message_count(&self) -> usize {
        guard(&self.state).log.len()
    }

    pub fn models(&self) -> Vec<ModelId> {
        guard(&self.state).viewports.models().cloned().collect()
    }

    pub fn active_model(&self) -> ModelId {
        guard(&self.state).viewports.active_model().clone()
    }

    pub fn canonical_root(&self) -> Option<TurnId> {
        guard(&self.state).viewports.canonical_root()
    }

    pub fn viewport(&self, model: &ModelId) -> Result<ViewportState> {
        guard(&self.state)
            .viewports
            .state(model)
            .ok_or_else(|| ArborError::UnknownViewport(model.clone()))
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load the tree and message history, then place every viewport.
    ///
    /// Both loads are attempted even if one fails; viewports are placed with
    /// whatever was loaded. The first failure is returned.
    pub async fn open(&self) -> Result<()> {
        let tree = self.refresh_tree().await;
        let history = self.load_history().await;

        let forest = self.forest();
        {
            let mut state = guard(&self.state);
            let SessionState { log, viewports, .. } = &mut *state;
            viewports.initialize(&forest, log);
        }
        info!(context = %self.context, nodes = forest.node_count(), "Opened session");

        tree?;
        history?;
        Ok(())
    }

    /// Fetch the tree and overwrite the cache with it
    pub async fn refresh_tree(&self) -> Result<Arc<Forest>> {
        match store::refetch(self.backend.as_ref(), &self.store, &self.context).await {
            Ok(forest) => {
                self.emit(SessionEvent::TreeRefreshed {
                    node_count: forest.node_count(),
                });
                Ok(forest)
            }
            Err(e) => Err(self.report("refresh the tree", ArborError::transport(e))),
        }
    }

    /// Fetch previously-sent messages into the log; returns how many were new
    pub async fn load_history(&self) -> Result<usize> {
        let records = self
            .backend
            .fetch_history(&self.context)
            .await
            .map_err(|e| self.report("load message history", ArborError::transport(e)))?;
        Ok(guard(&self.state).log.ingest_history(records))
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn activate(&self, model: &ModelId) -> Result<()> {
        let activated = guard(&self.state).viewports.activate(model);
        activated.map_err(|e| self.report("switch viewport", e))
    }

    /// Move the active viewport to `turn`; other viewports stay where they are
    pub fn navigate(&self, turn: TurnId) {
        let forest = self.forest();
        if !forest.contains(turn) {
            warn!(context = %self.context, turn = %turn, "Navigating to a turn the cached tree does not know");
        }
        let model = {
            let mut state = guard(&self.state);
            let SessionState { log, viewports, .. } = &mut *state;
            viewports.navigate_active(&forest, log, turn);
            viewports.active_model().clone()
        };
        self.emit(SessionEvent::ViewportMoved {
            model,
            viewing_turn: turn,
        });
    }

    /// Flip the active viewport's "show previous" toggle
    pub fn toggle_previous(&self) -> bool {
        guard(&self.state).viewports.toggle_previous()
    }

    // ========================================================================
    // Lock policy
    // ========================================================================

    pub fn lock_state(&self, model: &ModelId) -> Result<LockState> {
        let forest = self.forest();
        let state = guard(&self.state);
        self.evaluate_lock(&forest, &state, model)
    }

    fn evaluate_lock(&self, forest: &Forest, state: &SessionState, model: &ModelId) -> Result<LockState> {
        let viewport = state
            .viewports
            .state(model)
            .ok_or_else(|| ArborError::UnknownViewport(model.clone()))?;
        let request_in_flight = state.in_flight.contains(model);
        let Some(viewing_turn) = viewport.viewing_turn else {
            // nothing to view yet; the first send opens a conversation
            return Ok(if request_in_flight {
                LockState::WaitingResponse
            } else {
                LockState::Unlocked
            });
        };
        let scope = state.viewports.scope(model);
        let inputs = LockInputs {
            viewing_turn,
            current_turn: viewport.current_turn.unwrap_or(viewing_turn),
            turn_complete: state.log.turn_complete(viewing_turn, scope),
            request_in_flight,
            max_turns: self.options.max_turns,
            conversation_node_count: pathway::find_owning_root(forest.roots(), viewing_turn)
                .map_or(1, pathway::count_nodes),
            viewing_turn_has_messages: state.log.has_messages(viewing_turn, scope),
        };
        Ok(lock::evaluate(&inputs))
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send `content` from the active viewport.
    ///
    /// The lock policy is checked first. On success the user and assistant
    /// messages are appended, only the sending viewport advances, and the tree
    /// is refetched.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        target: SendTarget,
    ) -> Result<SendReceipt> {
        let content = content.into();
        let forest = self.forest();

        let (model, request) = {
            let mut state = guard(&self.state);
            let model = state.viewports.active_model().clone();
            let lock_state = self.evaluate_lock(&forest, &state, &model)?;
            let permitted = match target {
                SendTarget::ViewingTurn => lock_state.input_enabled(),
                SendTarget::NextTurn => lock_state.allows_next_turn(),
            };
            if !permitted {
                drop(state);
                return Err(self.report("send the message", ArborError::Locked(lock_state)));
            }

            let viewing_turn = state.viewports.state(&model).and_then(|v| v.viewing_turn);
            let scope = state.viewports.scope(&model);
            let parent_id = viewing_turn.and_then(|turn| {
                let allowed = visibility::allowed_turns(&forest, turn);
                state.log.last_in_turns(&allowed, scope).map(|m| m.id)
            });
            let request = SendRequest {
                parent_id,
                turn_id: match target {
                    SendTarget::ViewingTurn => viewing_turn,
                    SendTarget::NextTurn => None,
                },
                model_id: model.clone(),
                content: content.clone(),
            };
            state.in_flight.insert(model.clone());
            (model, request)
        };

        let receipt = {
            let _in_flight = InFlight {
                state: &self.state,
                model: model.clone(),
            };
            debug!(context = %self.context, model = %model, turn = ?request.turn_id, "Sending message");
            let parent_id = request.parent_id;
            let reply = self
                .backend
                .send_message(&self.context, request)
                .await
                .map_err(|e| self.report("send the message", ArborError::transport(e)))?;
            let receipt = reply
                .into_outcome()
                .map_err(|message| self.report("send the message", ArborError::Rejected(message)))?;

            let mut state = guard(&self.state);
            let now = Utc::now();
            if let Some(user_message_id) = receipt.user_message_id {
                state.log.append(Stored::new(
                    user_message_id,
                    Message {
                        turn_id: receipt.turn_id,
                        role: Role::User,
                        parent_id,
                        model_id: Some(model.clone()),
                        content,
                    },
                    now,
                ));
            }
            state.log.append(Stored::new(
                receipt.message_id,
                Message {
                    turn_id: receipt.turn_id,
                    role: Role::Assistant,
                    parent_id: receipt.user_message_id,
                    model_id: Some(model.clone()),
                    content: receipt.content.clone(),
                },
                now,
            ));
            state.viewports.advance(&model, receipt.turn_id)?;
            receipt
        };

        info!(context = %self.context, model = %model, turn = %receipt.turn_id, "Message sent");
        self.emit(SessionEvent::MessageSent {
            model: model.clone(),
            turn_id: receipt.turn_id,
            message_id: receipt.message_id,
        });
        self.emit(SessionEvent::ViewportMoved {
            model,
            viewing_turn: receipt.turn_id,
        });

        if let Err(e) = self.refresh_tree().await {
            // the send itself succeeded; the failed refetch is already reported
            debug!(context = %self.context, error = %e, "Tree refetch after send failed");
        }
        Ok(receipt)
    }

    // ========================================================================
    // Branching
    // ========================================================================

    /// Create a branch under `parent` and move the active viewport onto it
    pub async fn create_branch(&self, parent: TurnId) -> Result<Created> {
        self.ensure_below_ceiling(parent, "create a branch")?;
        let created = self
            .mutator
            .create_branch(parent)
            .await
            .map_err(|e| self.report("create a branch", e))?;
        self.land_on(created).await;
        Ok(created)
    }

    /// Start a new top-level conversation and move the active viewport onto it
    pub async fn create_root(&self) -> Result<Created> {
        let created = self
            .mutator
            .create_root()
            .await
            .map_err(|e| self.report("create a conversation", e))?;
        self.land_on(created).await;
        Ok(created)
    }

    /// Branching out of a conversation that hit its ceiling is refused,
    /// whichever turn of it is being viewed
    fn ensure_below_ceiling(&self, parent: TurnId, action: &str) -> Result<()> {
        let Some(max) = self.options.max_turns else {
            return Ok(());
        };
        let forest = self.forest();
        let node_count =
            pathway::find_owning_root(forest.roots(), parent).map_or(0, pathway::count_nodes);
        if node_count >= max {
            debug!(context = %self.context, parent = %parent, node_count, max, "Conversation at its turn limit");
            return Err(self.report(action, ArborError::Locked(LockState::LockedMaxTurns)));
        }
        Ok(())
    }

    async fn land_on(&self, created: Created) {
        let model = {
            let mut state = guard(&self.state);
            state.viewports.point_active_at(created.turn_id);
            state.viewports.active_model().clone()
        };
        self.emit(SessionEvent::BranchCreated {
            turn_id: created.turn_id,
            parent: created.parent,
        });
        self.emit(SessionEvent::ViewportMoved {
            model,
            viewing_turn: created.turn_id,
        });

        match self.mutator.reconcile().await {
            Ok(forest) => self.emit(SessionEvent::TreeRefreshed {
                node_count: forest.node_count(),
            }),
            Err(e) => {
                self.report("refresh the tree", e);
            }
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    pub fn snapshot(&self, model: &ModelId) -> Result<ViewportSnapshot> {
        let forest = self.forest();
        let state = guard(&self.state);
        let lock_state = self.evaluate_lock(&forest, &state, model)?;
        let viewport = state
            .viewports
            .state(model)
            .ok_or_else(|| ArborError::UnknownViewport(model.clone()))?;
        let decisions = visibility::decide(
            &forest,
            &state.log,
            viewport.viewing_turn,
            viewport.show_previous,
            state.viewports.scope(model),
        );
        Ok(ViewportSnapshot {
            model: model.clone(),
            viewing_turn: viewport.viewing_turn,
            current_turn: viewport.current_turn,
            turn_label: viewport
                .viewing_turn
                .and_then(|turn| numbering::label_of(&forest, turn)),
            lock_state,
            input_enabled: lock_state.input_enabled(),
            show_previous: viewport.show_previous,
            decisions,
        })
    }

    pub fn active_snapshot(&self) -> Result<ViewportSnapshot> {
        self.snapshot(&self.active_model())
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn emit(&self, event: SessionEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send((self.context.clone(), event));
        }
    }

    /// Log a failure, notify the render layer, and hand the error back
    fn report(&self, action: &str, err: ArborError) -> ArborError {
        let level = match &err {
            ArborError::Transport(_) => NoticeLevel::Error,
            ArborError::Locked(_) => NoticeLevel::Info,
            _ => NoticeLevel::Warning,
        };
        warn!(context = %self.context, error = %err, "Could not {action}");
        self.emit(SessionEvent::Notice(Notification {
            level,
            text: format!("Could not {action}: {err}"),
        }));
        err
    }
}
