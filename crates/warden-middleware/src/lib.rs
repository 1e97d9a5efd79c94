//! # Warden Middleware
//!
//! Adapts the warden-core authorization engine to a request-handling
//! pipeline: the [`authorize`] factory produces an [`Authorizer`], the
//! handler a host pipeline runs ahead of its route handler.
//!
//! ## Overview
//!
//! - **Action selection**: a single action name, a list (OR across the
//!   list), or the `"*"` wildcard meaning every registered action
//! - **Fail-fast validation**: unknown action names are a
//!   [`ConfigError`] at factory time, before any async work
//! - **Body deferral**: while a check is pending, inbound body
//!   consumption is paused through the host-provided [`BodyControl`]
//!   capability and resumed once a decision is made, regardless of
//!   outcome
//! - **Distinct outcomes**: allow (continue cleanly), deny
//!   ([`UnauthorizedError`] naming every disallowed action), and
//!   resolution failure ([`AuthzError::Lookup`], never coerced into a
//!   denial)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_core::{AuthzContext, AuthzRequest, Manager, RoleResolver};
//! use warden_middleware::{authorize, PipelineRequest};
//!
//! struct Request {
//!     user: String,
//!     authz: AuthzContext,
//! }
//!
//! impl AuthzRequest for Request {
//!     fn authz_context(&self) -> &AuthzContext {
//!         &self.authz
//!     }
//! }
//!
//! // no pausable body on this pipeline; the default is a no-op
//! impl PipelineRequest for Request {}
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = Manager::builder();
//! builder.register_role(
//!     "admin",
//!     RoleResolver::simple(|req: Arc<Request>| async move { Ok(req.user == "root") }),
//! )?;
//! builder.register_action("delete-post", ["admin"])?;
//! let manager = builder.build();
//!
//! let guard = authorize(&manager, "delete-post")?;
//!
//! let req = Arc::new(Request {
//!     user: "root".to_string(),
//!     authz: AuthzContext::new(),
//! });
//! match guard.check(&req).await {
//!     Ok(()) => { /* continue the pipeline */ }
//!     Err(err) if err.is_unauthorized() => { /* reject the request */ }
//!     Err(err) => { /* surface the lookup failure */ return Err(err.into()); }
//! }
//! # Ok(())
//! # }
//! ```

use futures::future;
use std::sync::Arc;
use warden_core::{AuthzError, AuthzRequest, ConfigError, Manager, UnauthorizedError};

/// Wildcard action selector: every registered action.
pub const WILDCARD: &str = "*";

/// Host-pipeline capability to pause and resume inbound body consumption.
///
/// Some transports start streaming (and discarding) the request body as
/// soon as a handler yields; an asynchronous authorization check would
/// then lose body data a downstream handler needs. Pipelines that have
/// this problem expose the capability here; pipelines that buffer
/// internally simply don't.
pub trait BodyControl: Send + Sync {
    /// Stop consuming the inbound body.
    fn pause(&self);

    /// Resume normal body flow.
    fn resume(&self);
}

/// Contract the host pipeline's request type must satisfy to be guarded.
///
/// Extends the engine-side [`AuthzRequest`] with the optional body
/// deferral capability.
pub trait PipelineRequest: AuthzRequest {
    /// Body flow control, when the transport supports it.
    fn body_control(&self) -> Option<&dyn BodyControl> {
        None
    }
}

/// Which actions a guard evaluates.
///
/// Built from a name, a list of names, or the `"*"` wildcard via `From`
/// conversions; the composed check passes if at least one selected
/// action is allowed.
#[derive(Debug, Clone)]
pub enum ActionSelector {
    /// Every action registered on the manager
    All,
    /// The named actions, OR-combined
    Named(Vec<String>),
}

impl From<&str> for ActionSelector {
    fn from(action: &str) -> Self {
        if action == WILDCARD {
            ActionSelector::All
        } else {
            ActionSelector::Named(vec![action.to_string()])
        }
    }
}

impl From<String> for ActionSelector {
    fn from(action: String) -> Self {
        if action == WILDCARD {
            ActionSelector::All
        } else {
            ActionSelector::Named(vec![action])
        }
    }
}

impl From<Vec<String>> for ActionSelector {
    fn from(actions: Vec<String>) -> Self {
        ActionSelector::Named(actions)
    }
}

impl From<Vec<&str>> for ActionSelector {
    fn from(actions: Vec<&str>) -> Self {
        ActionSelector::Named(actions.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ActionSelector {
    fn from(actions: [&str; N]) -> Self {
        ActionSelector::Named(actions.into_iter().map(str::to_string).collect())
    }
}

/// Options for the middleware factory.
#[derive(Debug, Clone)]
pub struct AuthorizeOptions {
    /// Defer inbound body consumption while a check is pending.
    pub defer_body: bool,
}

impl Default for AuthorizeOptions {
    fn default() -> Self {
        Self { defer_body: true }
    }
}

/// Create an authorization guard with default options.
///
/// # Errors
///
/// Fails fast with [`ConfigError::UnknownAction`] if any named action was
/// never registered, or [`ConfigError::NoActionsSelected`] if the
/// selection is empty.
///
/// # Arguments
///
/// * `manager` - The configured manager (cloned into the guard)
/// * `actions` - One action name, a list, or the `"*"` wildcard
pub fn authorize<R, S>(manager: &Manager<R>, actions: S) -> Result<Authorizer<R>, ConfigError>
where
    R: PipelineRequest + 'static,
    S: Into<ActionSelector>,
{
    authorize_with(manager, actions, AuthorizeOptions::default())
}

/// Create an authorization guard with explicit options.
///
/// The wildcard expands to the manager's registered actions here, at
/// factory time. Registries are immutable once built, so the expansion
/// cannot go stale.
pub fn authorize_with<R, S>(
    manager: &Manager<R>,
    actions: S,
    options: AuthorizeOptions,
) -> Result<Authorizer<R>, ConfigError>
where
    R: PipelineRequest + 'static,
    S: Into<ActionSelector>,
{
    let actions = match actions.into() {
        ActionSelector::All => manager.action_names(),
        ActionSelector::Named(named) => {
            for action in &named {
                if !manager.has_action(action) {
                    return Err(ConfigError::UnknownAction(action.clone()));
                }
            }
            named
        }
    };
    if actions.is_empty() {
        return Err(ConfigError::NoActionsSelected);
    }
    Ok(Authorizer {
        manager: manager.clone(),
        actions,
        options,
    })
}

/// The handler produced by the [`authorize`] factory.
///
/// One guard instance serves every request to the route it protects;
/// cloning is cheap.
pub struct Authorizer<R> {
    manager: Manager<R>,
    actions: Vec<String>,
    options: AuthorizeOptions,
}

impl<R> Clone for Authorizer<R> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            actions: self.actions.clone(),
            options: self.options.clone(),
        }
    }
}

impl<R: PipelineRequest + 'static> Authorizer<R> {
    /// The actions this guard evaluates.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Run the authorization check for one request.
    ///
    /// Evaluates every selected action concurrently and succeeds if at
    /// least one is allowed. While the check is pending, inbound body
    /// consumption is paused (if the request exposes [`BodyControl`] and
    /// deferral is enabled) and resumed when the decision is made,
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`AuthzError::Unauthorized`] when every action resolved cleanly to
    /// "not allowed", naming all of them; [`AuthzError::Lookup`] when any
    /// resolution failed; the whole batch aborts and the failure is
    /// never reported as a denial.
    pub async fn check(&self, req: &Arc<R>) -> Result<(), AuthzError> {
        let _body = if self.options.defer_body {
            req.body_control().map(BodyPauseGuard::new)
        } else {
            None
        };

        let outcomes = future::try_join_all(
            self.actions
                .iter()
                .map(|action| self.manager.action_allowed(action, req)),
        )
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, "authorization check failed");
            err
        })?;

        if outcomes.into_iter().any(|allowed| allowed) {
            Ok(())
        } else {
            tracing::debug!(actions = ?self.actions, "authorization denied");
            Err(UnauthorizedError::new(self.actions.clone()).into())
        }
    }

    /// Run the check and hand the outcome to the pipeline continuation.
    ///
    /// `proceed` is invoked exactly once: with `None` when at least one
    /// action is allowed, otherwise with the error the pipeline should
    /// continue with.
    pub async fn handle<F>(&self, req: &Arc<R>, proceed: F)
    where
        F: FnOnce(Option<AuthzError>),
    {
        match self.check(req).await {
            Ok(()) => proceed(None),
            Err(err) => proceed(Some(err)),
        }
    }
}

/// Pauses body consumption on creation, resumes on drop.
struct BodyPauseGuard<'a> {
    control: &'a dyn BodyControl,
}

impl<'a> BodyPauseGuard<'a> {
    fn new(control: &'a dyn BodyControl) -> Self {
        control.pause();
        Self { control }
    }
}

impl Drop for BodyPauseGuard<'_> {
    fn drop(&mut self) {
        self.control.resume();
    }
}
