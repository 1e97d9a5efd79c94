//! Getter contracts for entities and roles
//!
//! Getters are the engine's only way of reaching application data: an
//! entity getter fetches a domain object for the current request, a role
//! getter decides whether the current principal holds a relation. All
//! getters are asynchronous and receive the request as a shared handle.
//!
//! Plain async closures implement the traits directly, so registration
//! code rarely needs named types:
//!
//! ```ignore
//! builder.register_entity("organization", |req: Arc<AppRequest>| async move {
//!     Ok(store.load_organization(&req).await?)
//! })?;
//! ```

use crate::errors::LookupError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Entity value resolved by an entity getter.
///
/// Entities are arbitrary domain objects; they are carried as JSON values
/// so role getters can inspect them without the engine knowing their
/// shape.
pub type Entity = serde_json::Value;

/// Fetches an entity of one registered type for the current request.
///
/// Returning `Ok(None)` means the entity does not exist for this request;
/// any role scoped to it then resolves to `false` without its getter ever
/// running.
#[async_trait]
pub trait EntityGetter<R>: Send + Sync {
    /// Fetch the entity for this request.
    async fn get(&self, req: Arc<R>) -> Result<Option<Entity>, LookupError>;
}

#[async_trait]
impl<R, F, Fut> EntityGetter<R> for F
where
    R: Send + Sync + 'static,
    F: Fn(Arc<R>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Entity>, LookupError>> + Send + 'static,
{
    async fn get(&self, req: Arc<R>) -> Result<Option<Entity>, LookupError> {
        (self)(req).await
    }
}

/// Decides whether the current principal holds a simple role.
#[async_trait]
pub trait RoleGetter<R>: Send + Sync {
    /// Check the role for this request.
    async fn check(&self, req: Arc<R>) -> Result<bool, LookupError>;
}

#[async_trait]
impl<R, F, Fut> RoleGetter<R> for F
where
    R: Send + Sync + 'static,
    F: Fn(Arc<R>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, LookupError>> + Send + 'static,
{
    async fn check(&self, req: Arc<R>) -> Result<bool, LookupError> {
        (self)(req).await
    }
}

/// Decides whether the current principal holds an entity-scoped role.
///
/// The resolved entity is passed alongside the request; the getter never
/// runs when the entity is absent.
#[async_trait]
pub trait ScopedRoleGetter<R>: Send + Sync {
    /// Check the role against the resolved entity for this request.
    async fn check(&self, entity: Arc<Entity>, req: Arc<R>) -> Result<bool, LookupError>;
}

#[async_trait]
impl<R, F, Fut> ScopedRoleGetter<R> for F
where
    R: Send + Sync + 'static,
    F: Fn(Arc<Entity>, Arc<R>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, LookupError>> + Send + 'static,
{
    async fn check(&self, entity: Arc<Entity>, req: Arc<R>) -> Result<bool, LookupError> {
        (self)(entity, req).await
    }
}

/// A registered role getter of either kind.
///
/// The resolver kind fixes the getter's arity in the type system: simple
/// roles take the request alone, entity-scoped roles take the entity
/// first. Registration rejects a resolver whose kind does not match the
/// role's scope.
pub enum RoleResolver<R> {
    /// Getter for a role with no entity scope
    Simple(Arc<dyn RoleGetter<R>>),
    /// Getter for an entity-scoped role
    Scoped(Arc<dyn ScopedRoleGetter<R>>),
}

impl<R> RoleResolver<R> {
    /// Wrap a getter for a simple role.
    pub fn simple<G>(getter: G) -> Self
    where
        G: RoleGetter<R> + 'static,
    {
        RoleResolver::Simple(Arc::new(getter))
    }

    /// Wrap a getter for an entity-scoped role.
    pub fn scoped<G>(getter: G) -> Self
    where
        G: ScopedRoleGetter<R> + 'static,
    {
        RoleResolver::Scoped(Arc::new(getter))
    }

    /// Check if this resolver expects an entity.
    pub fn is_scoped(&self) -> bool {
        matches!(self, RoleResolver::Scoped(_))
    }
}

impl<R> Clone for RoleResolver<R> {
    fn clone(&self) -> Self {
        match self {
            RoleResolver::Simple(getter) => RoleResolver::Simple(Arc::clone(getter)),
            RoleResolver::Scoped(getter) => RoleResolver::Scoped(Arc::clone(getter)),
        }
    }
}

impl<R> fmt::Debug for RoleResolver<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleResolver::Simple(_) => f.write_str("RoleResolver::Simple"),
            RoleResolver::Scoped(_) => f.write_str("RoleResolver::Scoped"),
        }
    }
}
