//! Per-request authorization view
//!
//! The view is the memoization cache behind one request: resolved
//! entities, role outcomes, and action outcomes. Each key is backed by a
//! once-cell, which carries the engine's coalescing guarantee: the first
//! requester of a key starts the resolution, concurrent requesters of
//! the same key attach to the in-flight result, and a failed resolution
//! leaves the cell empty so a later attempt may retry.
//!
//! Downstream code only ever sees the read-only [`View`] handle; cached
//! decisions cannot be modified from outside the engine.

use crate::getters::Entity;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OnceCell};

type EntityCell = Arc<OnceCell<Option<Arc<Entity>>>>;
type BoolCell = Arc<OnceCell<bool>>;

/// Mutable per-request resolution state. Internal to the engine.
#[derive(Debug, Default)]
pub(crate) struct ViewState {
    entities: Mutex<HashMap<String, EntityCell>>,
    roles: Mutex<HashMap<String, BoolCell>>,
    actions: Mutex<HashMap<String, BoolCell>>,
}

impl ViewState {
    pub(crate) async fn entity_cell(&self, entity_type: &str) -> EntityCell {
        let mut entities = self.entities.lock().await;
        entities.entry(entity_type.to_string()).or_default().clone()
    }

    pub(crate) async fn role_cell(&self, role: &str) -> BoolCell {
        let mut roles = self.roles.lock().await;
        roles.entry(role.to_string()).or_default().clone()
    }

    pub(crate) async fn action_cell(&self, action: &str) -> BoolCell {
        let mut actions = self.actions.lock().await;
        actions.entry(action.to_string()).or_default().clone()
    }

    async fn entity(&self, entity_type: &str) -> Option<Arc<Entity>> {
        let entities = self.entities.lock().await;
        entities
            .get(entity_type)
            .and_then(|cell| cell.get())
            .and_then(|slot| slot.clone())
    }

    async fn role(&self, role: &str) -> Option<bool> {
        let roles = self.roles.lock().await;
        roles.get(role).and_then(|cell| cell.get()).copied()
    }

    async fn action(&self, action: &str) -> Option<bool> {
        let actions = self.actions.lock().await;
        actions.get(action).and_then(|cell| cell.get()).copied()
    }

    async fn snapshot(&self) -> ViewSnapshot {
        let mut snapshot = ViewSnapshot::default();
        {
            let entities = self.entities.lock().await;
            for (entity_type, cell) in entities.iter() {
                if let Some(Some(entity)) = cell.get() {
                    snapshot
                        .entities
                        .insert(entity_type.clone(), entity.as_ref().clone());
                }
            }
        }
        {
            let roles = self.roles.lock().await;
            for (role, cell) in roles.iter() {
                if let Some(has) = cell.get() {
                    snapshot.roles.insert(role.clone(), *has);
                }
            }
        }
        {
            let actions = self.actions.lock().await;
            for (action, cell) in actions.iter() {
                if let Some(allowed) = cell.get() {
                    snapshot.actions.insert(action.clone(), *allowed);
                }
            }
        }
        snapshot
    }
}

/// Read-only handle to a request's resolved authorization state.
///
/// All accessors distinguish "not yet evaluated for this request"
/// (`None`) from an evaluated `false`; a view never guesses.
///
/// The handle is cheap to clone and carries no mutation API, so cached
/// decisions cannot be corrupted by downstream consumers.
#[derive(Debug, Clone)]
pub struct View {
    state: Arc<ViewState>,
}

impl View {
    pub(crate) fn new(state: Arc<ViewState>) -> Self {
        Self { state }
    }

    /// Check whether an action has been evaluated, and its outcome.
    ///
    /// # Returns
    ///
    /// `Some(true)` / `Some(false)` once the action has been resolved for
    /// this request, `None` if it has not been evaluated yet.
    pub async fn can_perform(&self, action: &str) -> Option<bool> {
        self.state.action(action).await
    }

    /// Check whether a role has been evaluated, and its outcome.
    ///
    /// Accepts a role name or a [`Role`](crate::Role).
    pub async fn has_role(&self, role: impl AsRef<str>) -> Option<bool> {
        self.state.role(role.as_ref()).await
    }

    /// Get a cached entity.
    ///
    /// # Returns
    ///
    /// The resolved entity, or `None` if the entity is absent or has not
    /// been resolved yet.
    pub async fn entity(&self, entity_type: &str) -> Option<Arc<Entity>> {
        self.state.entity(entity_type).await
    }

    /// Copy everything resolved so far into plain serializable maps.
    ///
    /// Useful for handlers that echo authorization state into a response
    /// or a log entry.
    pub async fn snapshot(&self) -> ViewSnapshot {
        self.state.snapshot().await
    }
}

/// Plain-data copy of a view's resolved entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewSnapshot {
    /// Resolved entities by type (absent entities are omitted)
    pub entities: HashMap<String, Entity>,
    /// Resolved role outcomes by role name
    pub roles: HashMap<String, bool>,
    /// Resolved action outcomes by action name
    pub actions: HashMap<String, bool>,
}

/// Per-request authorization state slot, carried by the host pipeline.
///
/// The host creates one `AuthzContext` per request and drops it with the
/// request; the context's identity *is* the request's identity as far as
/// the engine is concerned. View state is materialized lazily on first
/// access, so an untouched request costs one empty slot.
#[derive(Debug, Default)]
pub struct AuthzContext {
    state: OnceLock<Arc<ViewState>>,
}

impl AuthzContext {
    /// Create an empty context for a new request.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> Arc<ViewState> {
        self.state
            .get_or_init(|| Arc::new(ViewState::default()))
            .clone()
    }

    /// Get the read-only view over this request's resolution state.
    pub fn view(&self) -> View {
        View::new(self.state())
    }
}

/// Contract the host pipeline's request type must satisfy.
///
/// The engine asks the request for its [`AuthzContext`]; everything else
/// about the request stays opaque and is only ever seen by the
/// application's own getters.
pub trait AuthzRequest: Send + Sync {
    /// The per-request authorization state slot.
    fn authz_context(&self) -> &AuthzContext;
}
