//! # Warden Core
//!
//! Relationship-based authorization engine for request-handling
//! pipelines: given a named *action*, decide whether the current
//! principal may perform it by evaluating a small dependency graph of
//! entities, roles, and actions.
//!
//! ## Overview
//!
//! The warden-core crate handles:
//! - **Roles**: named relations over a principal, optionally scoped to an
//!   entity type (`organization.owner`)
//! - **Actions**: named permissions defined as the logical OR of one or
//!   more roles
//! - **Entities**: domain objects fetched per request by caller-supplied
//!   getters
//! - **Views**: per-request memoization of everything resolved, exposed
//!   read-only to downstream handlers
//!
//! ## Architecture
//!
//! ```text
//! Action ─→ Role ─→ Entity
//!
//! "add-member" = admin OR organization.owner
//!   admin               -- simple role, checked against the request
//!   organization.owner  -- scoped role, checked against the resolved
//!                         organization entity
//! ```
//!
//! Registration happens once at startup through [`ManagerBuilder`], which
//! validates the whole graph (an action may only reference registered
//! roles, a scoped role only registered entity types). The built
//! [`Manager`] is an immutable, cheaply clonable handle; per-request
//! resolution memoizes each tier in the request's [`View`] and coalesces
//! concurrent lookups of the same key, so no getter runs twice for one
//! request.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_core::{AuthzContext, AuthzRequest, Manager, RoleResolver};
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
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = Manager::builder();
//! builder.register_entity("organization", |_req: Arc<Request>| async move {
//!     // fetch the organization for this request
//!     Ok(Some(serde_json::json!({"owners": ["u1"]})))
//! })?;
//! builder.register_role(
//!     "admin",
//!     RoleResolver::simple(|req: Arc<Request>| async move { Ok(req.user == "root") }),
//! )?;
//! builder.register_role(
//!     "organization.owner",
//!     RoleResolver::scoped(|org: Arc<warden_core::Entity>, req: Arc<Request>| async move {
//!         let owners = org["owners"].as_array().cloned().unwrap_or_default();
//!         Ok(owners.iter().any(|owner| owner.as_str() == Some(req.user.as_str())))
//!     }),
//! )?;
//! builder.register_action("add-member", ["admin", "organization.owner"])?;
//! let manager = builder.build();
//!
//! let req = Arc::new(Request {
//!     user: "u1".to_string(),
//!     authz: AuthzContext::new(),
//! });
//! assert!(manager.action_allowed("add-member", &req).await?);
//!
//! // downstream handlers read the memoized view
//! let view = manager.view(&req);
//! assert_eq!(view.has_role("organization.owner").await, Some(true));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Model
//!
//! - [`ConfigError`]: synchronous, raised at registration time; indicates
//!   a programming mistake and is never retried
//! - [`LookupError`]: asynchronous, raised during resolution; propagates
//!   unmodified and is never coerced into a denial
//! - [`UnauthorizedError`]: the sole expected negative outcome, raised
//!   when every requested action resolved cleanly to `false`
//!
//! ## Integration with warden-middleware
//!
//! This crate is the engine only. The `warden-middleware` crate adapts it
//! to a host pipeline: action selection (single, list, wildcard), body
//! deferral while a check is pending, and the continuation contract.

pub mod errors;
pub mod getters;
pub mod manager;
pub mod role;
pub mod view;

// Re-export main types for convenience
pub use errors::{AuthzError, ConfigError, LookupError, LookupResult, UnauthorizedError};
pub use getters::{Entity, EntityGetter, RoleGetter, RoleResolver, ScopedRoleGetter};
pub use manager::{Manager, ManagerBuilder};
pub use role::{IntoRole, Role};
pub use view::{AuthzContext, AuthzRequest, View, ViewSnapshot};
