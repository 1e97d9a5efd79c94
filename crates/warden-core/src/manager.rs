//! Authorization manager and resolution engine
//!
//! The manager owns the three registries (entity getters, role getters,
//! action definitions) and evaluates the action, role, and entity
//! dependency chain per request, memoizing each tier in the request's
//! view.
//!
//! Configuration is split from evaluation: a [`ManagerBuilder`] collects
//! registrations and validates the dependency graph as it grows, then
//! [`build`](ManagerBuilder::build) freezes everything into an immutable
//! [`Manager`] handle. Registries are therefore write-once and read
//! lock-free at request time.

use crate::errors::{ConfigError, LookupError, LookupResult};
use crate::getters::{Entity, EntityGetter, RoleResolver};
use crate::role::{IntoRole, Role};
use crate::view::{AuthzRequest, View};
use futures::future;
use std::collections::HashMap;
use std::sync::Arc;

struct Registries<R> {
    entity_getters: HashMap<String, Arc<dyn EntityGetter<R>>>,
    role_getters: HashMap<String, RoleResolver<R>>,
    actions: HashMap<String, Vec<Role>>,
}

impl<R> Default for Registries<R> {
    fn default() -> Self {
        Self {
            entity_getters: HashMap::new(),
            role_getters: HashMap::new(),
            actions: HashMap::new(),
        }
    }
}

/// Collects and validates registrations, then builds a [`Manager`].
///
/// Registration order matters: a role must be registered before any
/// action that uses it, and an entity getter before any action using a
/// role scoped to that entity. This keeps the dependency graph fully
/// resolvable before it can ever be evaluated: misconfiguration fails
/// at startup, not mid-request.
///
/// # Examples
///
/// ```ignore
/// let mut builder = Manager::builder();
/// builder.register_entity("organization", organization_getter)?;
/// builder.register_role("admin", RoleResolver::simple(admin_getter))?;
/// builder.register_role("organization.owner", RoleResolver::scoped(owner_getter))?;
/// builder.register_action("add-member", ["admin", "organization.owner"])?;
/// let manager = builder.build();
/// ```
pub struct ManagerBuilder<R> {
    registries: Registries<R>,
}

impl<R: AuthzRequest + 'static> ManagerBuilder<R> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            registries: Registries::default(),
        }
    }

    /// Register a getter for an entity type.
    ///
    /// Re-registration for the same type overwrites the previous getter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEntityType`] unless `entity_type` is
    /// a non-empty identifier without `.` or whitespace (a dotted entity
    /// type could never be named from a role).
    pub fn register_entity<G>(
        &mut self,
        entity_type: impl Into<String>,
        getter: G,
    ) -> Result<&mut Self, ConfigError>
    where
        G: EntityGetter<R> + 'static,
    {
        let entity_type = entity_type.into();
        if entity_type.is_empty()
            || entity_type.contains('.')
            || entity_type.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::InvalidEntityType(entity_type));
        }
        self.registries
            .entity_getters
            .insert(entity_type, Arc::new(getter));
        Ok(self)
    }

    /// Register a getter for a role.
    ///
    /// Accepts a [`Role`] or its dotted string form. Re-registration for
    /// the same role name overwrites the previous getter.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the role string is malformed, or if
    /// the resolver kind does not match the role's scope: a simple role
    /// needs a [`RoleResolver::Simple`] getter taking only the request,
    /// an entity-scoped role needs a [`RoleResolver::Scoped`] getter
    /// taking the entity first.
    pub fn register_role(
        &mut self,
        role: impl IntoRole,
        resolver: RoleResolver<R>,
    ) -> Result<&mut Self, ConfigError> {
        let role = role.into_role()?;
        if role.is_scoped() != resolver.is_scoped() {
            return Err(ConfigError::GetterScopeMismatch {
                role: role.name().to_string(),
            });
        }
        self.registries
            .role_getters
            .insert(role.name().to_string(), resolver);
        Ok(self)
    }

    /// Register the roles allowed to perform an action.
    ///
    /// The current principal may perform the action if they hold *any*
    /// one of the supplied roles. Roles are de-duplicated by name;
    /// re-registration for the same action name overwrites.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the role set is empty, if any role
    /// has no registered getter, or if any entity-scoped role references
    /// an entity type with no registered getter.
    pub fn register_action<I>(
        &mut self,
        name: impl Into<String>,
        roles: I,
    ) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: IntoRole,
    {
        let name = name.into();
        let mut role_set: Vec<Role> = Vec::new();
        for role in roles {
            let role = role.into_role()?;
            if role_set.iter().any(|seen| seen.name() == role.name()) {
                continue;
            }
            if !self.registries.role_getters.contains_key(role.name()) {
                return Err(ConfigError::UnregisteredRole {
                    action: name,
                    role: role.name().to_string(),
                });
            }
            if let Some(entity) = role.entity() {
                if !self.registries.entity_getters.contains_key(entity) {
                    return Err(ConfigError::UnregisteredEntity {
                        role: role.name().to_string(),
                        entity: entity.to_string(),
                    });
                }
            }
            role_set.push(role);
        }
        if role_set.is_empty() {
            return Err(ConfigError::EmptyRoleSet { action: name });
        }
        self.registries.actions.insert(name, role_set);
        Ok(self)
    }

    /// Freeze the registries and build the manager.
    pub fn build(self) -> Manager<R> {
        Manager {
            registries: Arc::new(self.registries),
        }
    }
}

impl<R: AuthzRequest + 'static> Default for ManagerBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the frozen registries and the resolution engine.
///
/// Cloning is cheap; all clones share the same registries. A manager is
/// built once at startup and used by every request for the process
/// lifetime.
pub struct Manager<R> {
    registries: Arc<Registries<R>>,
}

impl<R> Clone for Manager<R> {
    fn clone(&self) -> Self {
        Self {
            registries: Arc::clone(&self.registries),
        }
    }
}

impl<R: AuthzRequest + 'static> Manager<R> {
    /// Start building a manager.
    pub fn builder() -> ManagerBuilder<R> {
        ManagerBuilder::new()
    }

    /// Check if an action has been registered.
    pub fn has_action(&self, action: &str) -> bool {
        self.registries.actions.contains_key(action)
    }

    /// Get all registered action names, sorted.
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registries.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the read-only authorization view for a request.
    pub fn view(&self, req: &R) -> View {
        req.authz_context().view()
    }

    /// Check if an action is allowed for the current request.
    ///
    /// Resolves the action's roles concurrently (and, through them, any
    /// entities they are scoped to), OR-combines the outcomes, and caches
    /// every tier in the request's view. A second check of the same
    /// action, or of another action sharing a role, within one request
    /// re-invokes no getter.
    ///
    /// # Errors
    ///
    /// [`LookupError::UnknownAction`] if the action was never registered
    /// (distinct from "not allowed"); any getter failure propagates
    /// unmodified and leaves the failed tier uncached, so a later check
    /// within the same request may retry.
    pub async fn action_allowed(&self, action: &str, req: &Arc<R>) -> LookupResult<bool> {
        let roles = self
            .registries
            .actions
            .get(action)
            .ok_or_else(|| LookupError::UnknownAction(action.to_string()))?;
        let state = req.authz_context().state();
        let cell = state.action_cell(action).await;
        let allowed = cell
            .get_or_try_init(|| async {
                let outcomes = future::try_join_all(
                    roles.iter().map(|role| self.resolve_role(role, req)),
                )
                .await?;
                let allowed = outcomes.into_iter().any(|has| has);
                tracing::debug!(action, allowed, "action resolved");
                Ok::<_, LookupError>(allowed)
            })
            .await?;
        Ok(*allowed)
    }

    /// Resolve one role for the request, memoized by role name.
    async fn resolve_role(&self, role: &Role, req: &Arc<R>) -> LookupResult<bool> {
        let resolver = self
            .registries
            .role_getters
            .get(role.name())
            .ok_or_else(|| LookupError::UnknownRole(role.name().to_string()))?;
        let state = req.authz_context().state();
        let cell = state.role_cell(role.name()).await;
        let has = cell
            .get_or_try_init(|| async {
                let has = match resolver {
                    RoleResolver::Simple(getter) => getter.check(Arc::clone(req)).await?,
                    RoleResolver::Scoped(getter) => {
                        match self.resolve_entity(role.entity(), req).await? {
                            Some(entity) => getter.check(entity, Arc::clone(req)).await?,
                            // the relation cannot hold against a missing entity
                            None => false,
                        }
                    }
                };
                tracing::trace!(role = role.name(), has, "role resolved");
                Ok::<_, LookupError>(has)
            })
            .await?;
        Ok(*has)
    }

    /// Resolve an entity for the request, memoized by type.
    ///
    /// A successful lookup is cached whether or not an entity was found;
    /// a failed lookup is not, and a later resolution re-invokes the
    /// getter.
    async fn resolve_entity(
        &self,
        entity_type: Option<&str>,
        req: &Arc<R>,
    ) -> LookupResult<Option<Arc<Entity>>> {
        let Some(entity_type) = entity_type else {
            return Ok(None);
        };
        let getter = self
            .registries
            .entity_getters
            .get(entity_type)
            .ok_or_else(|| LookupError::UnknownEntity(entity_type.to_string()))?;
        let state = req.authz_context().state();
        let cell = state.entity_cell(entity_type).await;
        let entity = cell
            .get_or_try_init(|| async {
                let entity = getter.get(Arc::clone(req)).await?;
                tracing::debug!(entity_type, found = entity.is_some(), "entity resolved");
                Ok::<_, LookupError>(entity.map(Arc::new))
            })
            .await?;
        Ok(entity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::getters::RoleResolver;
    use crate::view::AuthzContext;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, Duration};

    struct TestRequest {
        user: &'static str,
        authz: AuthzContext,
    }

    impl TestRequest {
        fn new(user: &'static str) -> Arc<Self> {
            Arc::new(Self {
                user,
                authz: AuthzContext::new(),
            })
        }
    }

    impl AuthzRequest for TestRequest {
        fn authz_context(&self) -> &AuthzContext {
            &self.authz
        }
    }

    /// Counters for every getter in the standard organization fixture.
    #[derive(Default)]
    struct Calls {
        entity: AtomicUsize,
        admin: AtomicUsize,
        owner: AtomicUsize,
    }

    /// Build the organization fixture: entity `organization` owned by
    /// `u1`, roles `admin` (always false) and `organization.owner`, and
    /// two actions sharing the owner role.
    fn org_manager(calls: Arc<Calls>) -> Manager<TestRequest> {
        let mut builder = Manager::builder();

        let entity_calls = Arc::clone(&calls);
        builder
            .register_entity("organization", move |_req: Arc<TestRequest>| {
                let calls = Arc::clone(&entity_calls);
                async move {
                    calls.entity.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(json!({"id": "org1", "owners": ["u1"]})))
                }
            })
            .unwrap();

        let admin_calls = Arc::clone(&calls);
        builder
            .register_role(
                "admin",
                RoleResolver::simple(move |_req: Arc<TestRequest>| {
                    let calls = Arc::clone(&admin_calls);
                    async move {
                        calls.admin.fetch_add(1, Ordering::SeqCst);
                        Ok(false)
                    }
                }),
            )
            .unwrap();

        let owner_calls = Arc::clone(&calls);
        builder
            .register_role(
                "organization.owner",
                RoleResolver::scoped(move |org: Arc<Entity>, req: Arc<TestRequest>| {
                    let calls = Arc::clone(&owner_calls);
                    async move {
                        calls.owner.fetch_add(1, Ordering::SeqCst);
                        let owners = org["owners"].as_array().cloned().unwrap_or_default();
                        Ok(owners.iter().any(|owner| owner.as_str() == Some(req.user)))
                    }
                }),
            )
            .unwrap();

        builder
            .register_action("add-member", ["admin", "organization.owner"])
            .unwrap();
        builder
            .register_action("remove-member", ["organization.owner"])
            .unwrap();

        builder.build()
    }

    // =========================================================================
    // Registration validation
    // =========================================================================

    #[test]
    fn test_register_action_with_empty_roles_fails() {
        let mut builder: ManagerBuilder<TestRequest> = Manager::builder();
        let result = builder.register_action("add-member", Vec::<Role>::new());
        assert!(matches!(result, Err(ConfigError::EmptyRoleSet { .. })));
    }

    #[test]
    fn test_register_action_with_unregistered_role_fails() {
        let mut builder: ManagerBuilder<TestRequest> = Manager::builder();
        let result = builder.register_action("add-member", ["admin"]);
        assert!(matches!(result, Err(ConfigError::UnregisteredRole { .. })));
    }

    #[test]
    fn test_register_action_with_unregistered_entity_fails() {
        let mut builder: ManagerBuilder<TestRequest> = Manager::builder();
        builder
            .register_role(
                "organization.owner",
                RoleResolver::scoped(|_org: Arc<Entity>, _req: Arc<TestRequest>| async move {
                    Ok(true)
                }),
            )
            .unwrap();
        let result = builder.register_action("add-member", ["organization.owner"]);
        assert!(matches!(
            result,
            Err(ConfigError::UnregisteredEntity { .. })
        ));
    }

    #[test]
    fn test_register_role_scope_mismatch_fails() {
        let mut builder: ManagerBuilder<TestRequest> = Manager::builder();

        // scoped role, simple getter
        let result = builder.register_role(
            "organization.owner",
            RoleResolver::simple(|_req: Arc<TestRequest>| async move { Ok(true) }),
        );
        assert!(matches!(
            result,
            Err(ConfigError::GetterScopeMismatch { .. })
        ));

        // simple role, scoped getter
        let result = builder.register_role(
            "admin",
            RoleResolver::scoped(|_org: Arc<Entity>, _req: Arc<TestRequest>| async move {
                Ok(true)
            }),
        );
        assert!(matches!(
            result,
            Err(ConfigError::GetterScopeMismatch { .. })
        ));
    }

    #[test]
    fn test_register_entity_rejects_invalid_types() {
        let mut builder: ManagerBuilder<TestRequest> = Manager::builder();
        let getter = |_req: Arc<TestRequest>| async move { Ok(None) };
        assert!(matches!(
            builder.register_entity("", getter),
            Err(ConfigError::InvalidEntityType(_))
        ));
        assert!(matches!(
            builder.register_entity("org.unit", getter),
            Err(ConfigError::InvalidEntityType(_))
        ));
        assert!(matches!(
            builder.register_entity("my org", getter),
            Err(ConfigError::InvalidEntityType(_))
        ));
    }

    #[tokio::test]
    async fn test_register_action_redefinition_overwrites() {
        let calls = Arc::new(Calls::default());
        let mut builder = Manager::builder();

        let admin_calls = Arc::clone(&calls);
        builder
            .register_role(
                "admin",
                RoleResolver::simple(move |_req: Arc<TestRequest>| {
                    let calls = Arc::clone(&admin_calls);
                    async move {
                        calls.admin.fetch_add(1, Ordering::SeqCst);
                        Ok(true)
                    }
                }),
            )
            .unwrap();
        builder
            .register_role(
                "auditor",
                RoleResolver::simple(|_req: Arc<TestRequest>| async move { Ok(false) }),
            )
            .unwrap();

        builder.register_action("inspect", ["admin"]).unwrap();
        builder.register_action("inspect", ["auditor"]).unwrap();
        let manager = builder.build();

        assert_eq!(manager.action_names(), vec!["inspect".to_string()]);
        // the admin role is no longer part of the action
        let req = TestRequest::new("u1");
        assert!(!manager.action_allowed("inspect", &req).await.unwrap());
        assert_eq!(calls.admin.load(Ordering::SeqCst), 0);
    }

    // =========================================================================
    // Resolution semantics
    // =========================================================================

    #[tokio::test]
    async fn test_action_is_or_of_roles() {
        let calls = Arc::new(Calls::default());
        let manager = org_manager(Arc::clone(&calls));

        // admin is false but u1 owns the organization
        let req = TestRequest::new("u1");
        assert!(manager.action_allowed("add-member", &req).await.unwrap());

        // u2 holds neither role
        let req = TestRequest::new("u2");
        assert!(!manager.action_allowed("add-member", &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_roles_memoized_across_actions() {
        let calls = Arc::new(Calls::default());
        let manager = org_manager(Arc::clone(&calls));
        let req = TestRequest::new("u1");

        assert!(manager.action_allowed("add-member", &req).await.unwrap());
        assert!(manager.action_allowed("remove-member", &req).await.unwrap());

        // owner role and organization entity resolved exactly once
        assert_eq!(calls.owner.load(Ordering::SeqCst), 1);
        assert_eq!(calls.entity.load(Ordering::SeqCst), 1);
        assert_eq!(calls.admin.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_actions_coalesce_role_resolution() {
        let calls = Arc::new(Calls::default());
        let manager = org_manager(Arc::clone(&calls));
        let req = TestRequest::new("u1");

        let (first, second) = tokio::join!(
            manager.action_allowed("add-member", &req),
            manager.action_allowed("remove-member", &req),
        );
        assert!(first.unwrap());
        assert!(second.unwrap());
        assert_eq!(calls.owner.load(Ordering::SeqCst), 1);
        assert_eq!(calls.entity.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_roles_share_one_entity_lookup() {
        let entity_calls = Arc::new(AtomicUsize::new(0));
        let mut builder = Manager::builder();

        let counter = Arc::clone(&entity_calls);
        builder
            .register_entity("organization", move |_req: Arc<TestRequest>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    // keep the lookup in flight long enough for both roles to request it
                    sleep(Duration::from_millis(20)).await;
                    Ok(Some(json!({"owners": ["u1"], "members": ["u1", "u2"]})))
                }
            })
            .unwrap();
        builder
            .register_role(
                "organization.owner",
                RoleResolver::scoped(|org: Arc<Entity>, req: Arc<TestRequest>| async move {
                    let owners = org["owners"].as_array().cloned().unwrap_or_default();
                    Ok(owners.iter().any(|owner| owner.as_str() == Some(req.user)))
                }),
            )
            .unwrap();
        builder
            .register_role(
                "organization.member",
                RoleResolver::scoped(|org: Arc<Entity>, req: Arc<TestRequest>| async move {
                    let members = org["members"].as_array().cloned().unwrap_or_default();
                    Ok(members.iter().any(|member| member.as_str() == Some(req.user)))
                }),
            )
            .unwrap();
        builder
            .register_action(
                "view-dashboard",
                ["organization.owner", "organization.member"],
            )
            .unwrap();
        let manager = builder.build();

        let req = TestRequest::new("u2");
        assert!(manager.action_allowed("view-dashboard", &req).await.unwrap());
        assert_eq!(entity_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absent_entity_short_circuits_role_to_false() {
        let owner_calls = Arc::new(AtomicUsize::new(0));
        let mut builder = Manager::builder();

        builder
            .register_entity("organization", |_req: Arc<TestRequest>| async move {
                Ok(None)
            })
            .unwrap();
        let counter = Arc::clone(&owner_calls);
        builder
            .register_role(
                "organization.owner",
                RoleResolver::scoped(move |_org: Arc<Entity>, _req: Arc<TestRequest>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(true)
                    }
                }),
            )
            .unwrap();
        builder
            .register_action("add-member", ["organization.owner"])
            .unwrap();
        let manager = builder.build();

        let req = TestRequest::new("u1");
        assert!(!manager.action_allowed("add-member", &req).await.unwrap());
        // the role getter never ran, and the false outcome is cached
        assert_eq!(owner_calls.load(Ordering::SeqCst), 0);
        let view = manager.view(&req);
        assert_eq!(view.has_role("organization.owner").await, Some(false));
    }

    #[tokio::test]
    async fn test_getter_failure_propagates_and_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut builder = Manager::builder();

        let counter = Arc::clone(&attempts);
        builder
            .register_role(
                "admin",
                RoleResolver::simple(move |_req: Arc<TestRequest>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(LookupError::getter("directory unavailable"))
                        } else {
                            Ok(true)
                        }
                    }
                }),
            )
            .unwrap();
        builder.register_action("delete-org", ["admin"]).unwrap();
        let manager = builder.build();

        let req = TestRequest::new("u1");
        let err = manager.action_allowed("delete-org", &req).await.unwrap_err();
        assert!(matches!(err, LookupError::Getter(_)));

        // nothing was cached for the failed tiers
        let view = manager.view(&req);
        assert_eq!(view.can_perform("delete-org").await, None);
        assert_eq!(view.has_role("admin").await, None);

        // the same request may retry, and the getter runs again
        assert!(manager.action_allowed("delete-org", &req).await.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_action_is_a_lookup_error() {
        let calls = Arc::new(Calls::default());
        let manager = org_manager(calls);
        let req = TestRequest::new("u1");
        let err = manager.action_allowed("no-such-action", &req).await.unwrap_err();
        assert!(matches!(err, LookupError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn test_view_reflects_resolution() {
        let calls = Arc::new(Calls::default());
        let manager = org_manager(calls);
        let req = TestRequest::new("u1");

        assert!(manager.action_allowed("add-member", &req).await.unwrap());

        let view = manager.view(&req);
        assert_eq!(view.can_perform("add-member").await, Some(true));
        assert_eq!(view.can_perform("remove-member").await, None);
        assert_eq!(view.has_role("admin").await, Some(false));
        assert_eq!(view.has_role("organization.owner").await, Some(true));
        let org = view.entity("organization").await.unwrap();
        assert_eq!(org["id"], "org1");

        let snapshot = view.snapshot().await;
        assert_eq!(snapshot.actions["add-member"], true);
        assert_eq!(snapshot.roles.len(), 2);
        assert_eq!(snapshot.entities["organization"]["id"], "org1");
    }
}
