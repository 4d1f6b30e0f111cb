//! Subject-facing authorization API
//!
//! A [`Subject`] is a handle for one host entity (a user, an employee...)
//! within an auth scope. Role operations are always available; permission
//! operations only when the scope is configured `with_permissions`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{RbacError, RbacResult};
use crate::joins::{PermissionSubject, RoleSubject};
use crate::models::{Permission, PermissionTarget, Role, RoleTarget};
use crate::permissions::PermissionResolver;
use crate::registry::ScopeSettings;
use crate::roles::RoleResolver;

/// Role operations of an authorizable entity
///
/// `force_context` of `None` uses the scope default.
#[async_trait]
pub trait RoleCapable: Send + Sync {
    async fn assign_role(
        &self,
        role: RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<RoleSubject>>;

    async fn unassign_role(
        &self,
        role: RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool>;

    async fn has_role(&self, role: RoleTarget, context: &Context, force_context: Option<bool>) -> RbacResult<bool>;

    async fn has_role_or_higher(
        &self,
        role: RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool>;

    async fn highest_role(&self, context: &Context, force_context: Option<bool>) -> RbacResult<Option<Role>>;

    async fn roles_for(&self, context: &Context, force_context: Option<bool>) -> RbacResult<Vec<Role>>;
}

/// Permission operations of an authorizable entity
#[async_trait]
pub trait PermissionCapable: Send + Sync {
    async fn assign_permission(
        &self,
        permission: PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<PermissionSubject>>;

    async fn unassign_permission(
        &self,
        permission: PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool>;

    async fn has_permission(
        &self,
        permission: PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool>;

    async fn permissions_for(&self, context: &Context, force_context: Option<bool>) -> RbacResult<Vec<Permission>>;
}

/// Authorization handle for one subject
#[derive(Clone)]
pub struct Subject {
    id: i32,
    settings: Arc<ScopeSettings>,
    roles: RoleResolver,
    permissions: Option<PermissionResolver>,
}

impl Subject {
    pub(crate) fn new(
        id: i32,
        settings: Arc<ScopeSettings>,
        roles: RoleResolver,
        permissions: Option<PermissionResolver>,
    ) -> Self {
        Self {
            id,
            settings,
            roles,
            permissions,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Name of the scope this subject belongs to
    pub fn scope_name(&self) -> &str {
        &self.settings.name
    }

    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    /// `None` when the scope has no permissions
    pub fn permissions(&self) -> Option<&PermissionResolver> {
        self.permissions.as_ref()
    }

    fn permission_resolver(&self) -> RbacResult<&PermissionResolver> {
        self.permissions
            .as_ref()
            .ok_or_else(|| RbacError::PermissionsDisabled {
                scope: self.settings.name.clone(),
            })
    }
}

#[async_trait]
impl RoleCapable for Subject {
    async fn assign_role(
        &self,
        role: RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<RoleSubject>> {
        self.roles.assign_role(self.id, role, context, force_context).await
    }

    async fn unassign_role(
        &self,
        role: RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        self.roles.unassign_role(self.id, role, context, force_context).await
    }

    async fn has_role(&self, role: RoleTarget, context: &Context, force_context: Option<bool>) -> RbacResult<bool> {
        self.roles.has_role(self.id, role, context, force_context).await
    }

    async fn has_role_or_higher(
        &self,
        role: RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        self.roles
            .has_role_or_higher(self.id, role, context, force_context)
            .await
    }

    async fn highest_role(&self, context: &Context, force_context: Option<bool>) -> RbacResult<Option<Role>> {
        self.roles.highest_role(self.id, context, force_context).await
    }

    async fn roles_for(&self, context: &Context, force_context: Option<bool>) -> RbacResult<Vec<Role>> {
        self.roles.roles_for(self.id, context, force_context).await
    }
}

#[async_trait]
impl PermissionCapable for Subject {
    async fn assign_permission(
        &self,
        permission: PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<PermissionSubject>> {
        self.permission_resolver()?
            .assign_permission(self.id, permission, context, force_context)
            .await
    }

    async fn unassign_permission(
        &self,
        permission: PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        self.permission_resolver()?
            .unassign_permission(self.id, permission, context, force_context)
            .await
    }

    async fn has_permission(
        &self,
        permission: PermissionTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        self.permission_resolver()?
            .has_permission(self.id, permission, context, force_context)
            .await
    }

    async fn permissions_for(&self, context: &Context, force_context: Option<bool>) -> RbacResult<Vec<Permission>> {
        self.permission_resolver()?
            .permissions_for(self.id, context, force_context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPermission, NewRole};
    use crate::registry::AuthScope;
    use crate::store::memory::MemoryStore;

    fn scope(with_permissions: bool) -> AuthScope {
        let settings = ScopeSettings {
            with_permissions,
            ..ScopeSettings::default()
        };
        AuthScope::new(settings, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_subject_round_trip() {
        let scope = scope(true);
        scope.create_role(NewRole::new("editor", 5)).await.unwrap();
        scope
            .create_permission(NewPermission::new("publish"))
            .await
            .unwrap();
        scope
            .permissions()
            .unwrap()
            .grant_to_role("editor", "publish", &Context::Global, None)
            .await
            .unwrap();

        let user = scope.subject(7);
        assert_eq!(user.id(), 7);
        assert_eq!(user.scope_name(), "main");

        let post = Context::instance("Post", 1);
        user.assign_role("editor".into(), &post, None).await.unwrap();

        assert!(user.has_role("editor".into(), &post, None).await.unwrap());
        assert!(user.has_permission("publish".into(), &post, None).await.unwrap());
        assert_eq!(user.permissions_for(&post, None).await.unwrap().len(), 1);
        assert_eq!(
            user.highest_role(&post, None).await.unwrap().map(|r| r.slug),
            Some("editor".to_string())
        );

        assert!(user.unassign_role("editor".into(), &post, None).await.unwrap());
        assert!(!user.has_permission("publish".into(), &post, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_permission_calls_fail_without_permissions() {
        let scope = scope(false);
        let user = scope.subject(1);

        let err = user
            .has_permission("publish".into(), &Context::Global, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RbacError::PermissionsDisabled { ref scope } if scope == "main"));

        // Roles still work
        scope.create_role(NewRole::new("admin", 1)).await.unwrap();
        assert!(user
            .assign_role("admin".into(), &Context::Global, None)
            .await
            .unwrap()
            .is_some());
    }
}
