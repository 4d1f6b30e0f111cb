//! Permission grants and permission checks
//!
//! A subject holds a permission in a context when it was granted directly in
//! that context, or when a role the subject holds there carries the
//! permission (in that context or globally). Checks widen along the context
//! chain the same way role checks do.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::{verify_target_context, Context};
use crate::error::RbacResult;
use crate::joins::{PermissionRole, PermissionSubject};
use crate::models::{Permission, PermissionTarget, Role, RoleTarget, Target};
use crate::registry::ScopeSettings;
use crate::roles::RoleResolver;
use crate::store::{AuthStore, ContextFilter};

/// Permission operations for one auth scope
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn AuthStore>,
    settings: Arc<ScopeSettings>,
    roles: RoleResolver,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn AuthStore>, settings: Arc<ScopeSettings>) -> Self {
        let roles = RoleResolver::new(store.clone(), settings.clone());
        Self {
            store,
            settings,
            roles,
        }
    }

    fn force(&self, force_context: Option<bool>) -> bool {
        force_context.unwrap_or(self.settings.force_context)
    }

    /// Resolve a permission argument, widening slug lookups unless forced
    pub async fn target_permission(
        &self,
        permission: &PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<Permission>> {
        let slug = match permission {
            Target::Record(permission) => return Ok(Some(permission.clone())),
            Target::Slug(slug) => slug,
        };

        for candidate in context.lookup_chain(self.force(force_context)) {
            if let Some(permission) = self.store.find_permission(slug, &candidate).await? {
                return Ok(Some(permission));
            }
        }
        Ok(None)
    }

    /// Grant a permission directly to a subject in `context`
    pub async fn assign_permission(
        &self,
        subject_id: i32,
        permission: impl Into<PermissionTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<PermissionSubject>> {
        let permission = permission.into();
        let Some(target) = self
            .target_permission(&permission, context, force_context)
            .await?
        else {
            debug!("Permission '{}' not found for {}", permission.label(), context);
            return Ok(None);
        };

        if !verify_target_context(&target.context(), context) {
            warn!(
                "Permission '{}' is bound to {} and cannot be granted in {}",
                target.slug,
                target.context(),
                context
            );
            return Ok(None);
        }

        let join = self
            .store
            .find_or_create_permission_subject(subject_id, target.id, context)
            .await?;
        info!(
            "Granted permission '{}' to {} {} in {}",
            target.slug, self.settings.entities.subject, subject_id, context
        );
        Ok(Some(join))
    }

    pub async fn unassign_permission(
        &self,
        subject_id: i32,
        permission: impl Into<PermissionTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let permission = permission.into();
        let Some(target) = self
            .target_permission(&permission, context, force_context)
            .await?
        else {
            return Ok(false);
        };
        let Some(join) = self
            .store
            .find_permission_subject(subject_id, target.id, context)
            .await?
        else {
            return Ok(false);
        };

        let removed = self.store.delete_permission_subject(join.id).await?;
        if removed {
            info!(
                "Unassigned permission '{}' from {} {} in {}",
                target.slug, self.settings.entities.subject, subject_id, context
            );
        }
        Ok(removed)
    }

    pub async fn has_permission(
        &self,
        subject_id: i32,
        permission: impl Into<PermissionTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let force = self.force(force_context);
        let Some(target) = self
            .target_permission(&permission.into(), context, Some(force))
            .await?
        else {
            return Ok(false);
        };

        for candidate in context.lookup_chain(force) {
            if self.granted_in(subject_id, &target, &candidate).await? {
                debug!(
                    "{} {} has permission '{}' via {}",
                    self.settings.entities.subject, subject_id, target.slug, candidate
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Direct grant in exactly `context`, or a grant through a role held there
    async fn granted_in(&self, subject_id: i32, permission: &Permission, context: &Context) -> RbacResult<bool> {
        if self
            .store
            .find_permission_subject(subject_id, permission.id, context)
            .await?
            .is_some()
        {
            return Ok(true);
        }
        self.store
            .permission_via_roles(subject_id, permission.id, context)
            .await
    }

    /// Permissions held in `context`, directly or via the roles returned by
    /// [`RoleResolver::roles_for`]. Unless forced, wider grants are included.
    pub async fn permissions_for(
        &self,
        subject_id: i32,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Vec<Permission>> {
        let force = self.force(force_context);
        let role_ids: Vec<i32> = self
            .roles
            .roles_for(subject_id, context, Some(force))
            .await?
            .iter()
            .map(|role| role.id)
            .collect();

        let filter = ContextFilter::for_lookup(context, force);
        self.store
            .subject_permissions(subject_id, &role_ids, &filter)
            .await
    }

    // Role-side grants

    async fn resolve_pair(
        &self,
        role: &RoleTarget,
        permission: &PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<(Role, Permission)>> {
        let Some(role) = self.roles.target_role(role, context, force_context).await? else {
            return Ok(None);
        };
        let Some(permission) = self
            .target_permission(permission, context, force_context)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some((role, permission)))
    }

    /// Grant a permission to a role in `context`
    pub async fn grant_to_role(
        &self,
        role: impl Into<RoleTarget>,
        permission: impl Into<PermissionTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<PermissionRole>> {
        let Some((role, permission)) = self
            .resolve_pair(&role.into(), &permission.into(), context, force_context)
            .await?
        else {
            return Ok(None);
        };

        if !verify_target_context(&role.context(), context)
            || !verify_target_context(&permission.context(), context)
        {
            warn!(
                "Cannot grant '{}' to role '{}' in {}: outside their bound context",
                permission.slug, role.slug, context
            );
            return Ok(None);
        }

        let join = self
            .store
            .find_or_create_permission_role(role.id, permission.id, context)
            .await?;
        info!(
            "Granted permission '{}' to role '{}' in {}",
            permission.slug, role.slug, context
        );
        Ok(Some(join))
    }

    /// Remove a role grant made exactly in `context`
    pub async fn revoke_from_role(
        &self,
        role: impl Into<RoleTarget>,
        permission: impl Into<PermissionTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let Some((role, permission)) = self
            .resolve_pair(&role.into(), &permission.into(), context, force_context)
            .await?
        else {
            return Ok(false);
        };
        let Some(join) = self
            .store
            .find_permission_role(role.id, permission.id, context)
            .await?
        else {
            return Ok(false);
        };

        let removed = self.store.delete_permission_role(join.id).await?;
        if removed {
            info!(
                "Revoked permission '{}' from role '{}' in {}",
                permission.slug, role.slug, context
            );
        }
        Ok(removed)
    }

    /// Whether the role carries the permission in `context`, widening unless forced
    pub async fn role_has_permission(
        &self,
        role: impl Into<RoleTarget>,
        permission: impl Into<PermissionTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let force = self.force(force_context);
        let Some((role, permission)) = self
            .resolve_pair(&role.into(), &permission.into(), context, Some(force))
            .await?
        else {
            return Ok(false);
        };

        for candidate in context.lookup_chain(force) {
            if self
                .store
                .find_permission_role(role.id, permission.id, &candidate)
                .await?
                .is_some()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Permissions a role carries in `context`
    pub async fn role_permissions(
        &self,
        role: impl Into<RoleTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Vec<Permission>> {
        let force = self.force(force_context);
        let Some(role) = self
            .roles
            .target_role(&role.into(), context, Some(force))
            .await?
        else {
            return Ok(Vec::new());
        };
        self.store
            .role_permissions(role.id, &ContextFilter::for_lookup(context, force))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joins::JoinRecord;
    use crate::models::{NewPermission, NewRole};
    use crate::store::memory::MemoryStore;

    struct Fixture {
        permissions: PermissionResolver,
        roles: RoleResolver,
        publish: Permission,
        comment: Permission,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn AuthStore> = Arc::new(MemoryStore::new());
        store.insert_role(NewRole::new("admin", 10)).await.unwrap();
        store.insert_role(NewRole::new("editor", 5)).await.unwrap();
        let publish = store.insert_permission(NewPermission::new("publish")).await.unwrap();
        let comment = store.insert_permission(NewPermission::new("comment")).await.unwrap();

        let settings = Arc::new(ScopeSettings::default());
        Fixture {
            permissions: PermissionResolver::new(store.clone(), settings.clone()),
            roles: RoleResolver::new(store, settings),
            publish,
            comment,
        }
    }

    fn post(id: i32) -> Context {
        Context::instance("Post", id)
    }

    #[tokio::test]
    async fn test_permission_via_role() {
        let f = fixture().await;
        f.permissions
            .grant_to_role("editor", "publish", &Context::Global, None)
            .await
            .unwrap()
            .unwrap();
        f.roles.assign_role(1, "editor", &post(42), None).await.unwrap();

        assert!(f.permissions.has_permission(1, "publish", &post(42), None).await.unwrap());
        assert!(!f.permissions.has_permission(1, "publish", &post(99), Some(true)).await.unwrap());
        assert!(!f.permissions.has_permission(1, "publish", &post(99), None).await.unwrap());
        assert!(!f.permissions.has_permission(1, "comment", &post(42), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_global_role_grants_everywhere_unless_forced() {
        let f = fixture().await;
        f.permissions
            .grant_to_role("editor", "publish", &Context::Global, None)
            .await
            .unwrap();
        f.roles.assign_role(1, "editor", &Context::Global, None).await.unwrap();

        assert!(f.permissions.has_permission(1, "publish", &post(99), None).await.unwrap());
        assert!(!f
            .permissions
            .has_permission(1, &f.publish, &post(99), Some(true))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_role_grant_scoped_to_instance() {
        let f = fixture().await;
        f.permissions
            .grant_to_role("editor", "publish", &post(42), None)
            .await
            .unwrap();
        f.roles.assign_role(1, "editor", &post(42), None).await.unwrap();
        f.roles.assign_role(1, "editor", &post(43), None).await.unwrap();

        assert!(f.permissions.has_permission(1, "publish", &post(42), None).await.unwrap());
        assert!(!f.permissions.has_permission(1, "publish", &post(43), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_direct_grant() {
        let f = fixture().await;
        let join = f
            .permissions
            .assign_permission(1, "comment", &Context::class("Post"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(join.context(), Context::class("Post"));

        assert!(f.permissions.has_permission(1, "comment", &post(5), None).await.unwrap());
        assert!(!f.permissions.has_permission(1, "comment", &Context::Global, None).await.unwrap());
        assert!(!f.permissions.has_permission(2, "comment", &post(5), None).await.unwrap());

        assert!(f
            .permissions
            .unassign_permission(1, "comment", &Context::class("Post"), None)
            .await
            .unwrap());
        assert!(!f.permissions.has_permission(1, "comment", &post(5), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_permissions_for_unions_direct_and_role_grants() {
        let f = fixture().await;
        f.permissions
            .grant_to_role("editor", "publish", &Context::Global, None)
            .await
            .unwrap();
        f.roles.assign_role(1, "editor", &post(42), None).await.unwrap();
        f.permissions
            .assign_permission(1, "comment", &post(42), None)
            .await
            .unwrap();

        assert_eq!(
            f.permissions.permissions_for(1, &post(42), None).await.unwrap(),
            vec![f.publish.clone(), f.comment.clone()]
        );
        // Forced: the role grant was made globally, so only the direct grant counts
        assert_eq!(
            f.permissions.permissions_for(1, &post(42), Some(true)).await.unwrap(),
            vec![f.comment.clone()]
        );
        assert!(f.permissions.permissions_for(1, &post(7), None).await.unwrap().is_empty());
        assert!(f.permissions.permissions_for(2, &post(42), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_permission_management() {
        let f = fixture().await;
        assert!(f
            .permissions
            .grant_to_role("admin", "publish", &Context::Global, None)
            .await
            .unwrap()
            .is_some());
        assert!(f
            .permissions
            .grant_to_role("ghost", "publish", &Context::Global, None)
            .await
            .unwrap()
            .is_none());

        assert!(f
            .permissions
            .role_has_permission("admin", "publish", &post(3), None)
            .await
            .unwrap());
        assert!(!f
            .permissions
            .role_has_permission("admin", &f.publish, &post(3), Some(true))
            .await
            .unwrap());
        assert_eq!(
            f.permissions.role_permissions("admin", &Context::Global, None).await.unwrap(),
            vec![f.publish.clone()]
        );

        assert!(f
            .permissions
            .revoke_from_role("admin", "publish", &Context::Global, None)
            .await
            .unwrap());
        assert!(!f
            .permissions
            .role_has_permission("admin", "publish", &Context::Global, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_bound_permission_cannot_be_granted_elsewhere() {
        let f = fixture().await;
        let moderate = f
            .roles
            .store()
            .insert_permission(NewPermission::new("moderate").in_context(Context::class("Forum")))
            .await
            .unwrap();

        assert!(f
            .permissions
            .assign_permission(1, &moderate, &post(1), None)
            .await
            .unwrap()
            .is_none());
        assert!(f
            .permissions
            .assign_permission(1, &moderate, &Context::instance("Forum", 1), None)
            .await
            .unwrap()
            .is_some());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_removals_are_logged() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let f = fixture().await;
        f.permissions
            .assign_permission(4, "comment", &post(1), None)
            .await
            .unwrap();
        f.permissions
            .grant_to_role("editor", "publish", &Context::Global, None)
            .await
            .unwrap();

        assert!(f
            .permissions
            .unassign_permission(4, "comment", &post(1), None)
            .await
            .unwrap());
        assert!(f
            .permissions
            .revoke_from_role("editor", "publish", &Context::Global, None)
            .await
            .unwrap());

        let output = log.contents();
        assert!(output.contains("Unassigned permission 'comment' from User 4 in Post:1"));
        assert!(output.contains("Revoked permission 'publish' from role 'editor' in global"));
    }
}
