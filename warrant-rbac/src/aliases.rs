//! Short-form checks for call sites that read better as questions
//!
//! `is_role` mirrors [`RoleCapable::has_role`]; `can` and `allowed_to` mirror
//! [`PermissionCapable::has_permission`]. All use the scope's default
//! `force_context`.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::RbacResult;
use crate::models::{PermissionTarget, RoleTarget};
use crate::subject::{PermissionCapable, RoleCapable};

#[async_trait]
pub trait RoleAliases: RoleCapable {
    async fn is_role(&self, role: RoleTarget, context: &Context) -> RbacResult<bool> {
        self.has_role(role, context, None).await
    }
}

impl<T: RoleCapable + ?Sized> RoleAliases for T {}

#[async_trait]
pub trait PermissionAliases: PermissionCapable {
    async fn can(&self, permission: PermissionTarget, context: &Context) -> RbacResult<bool> {
        self.has_permission(permission, context, None).await
    }

    async fn allowed_to(&self, permission: PermissionTarget, context: &Context) -> RbacResult<bool> {
        self.has_permission(permission, context, None).await
    }
}

impl<T: PermissionCapable + ?Sized> PermissionAliases for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::{NewPermission, NewRole};
    use crate::registry::{AuthScope, ScopeSettings};
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_aliases_match_full_checks() {
        let scope = AuthScope::new(ScopeSettings::default(), Arc::new(MemoryStore::new()));
        scope.create_role(NewRole::new("moderator", 3)).await.unwrap();
        scope
            .create_permission(NewPermission::new("ban"))
            .await
            .unwrap();

        let user = scope.subject(4);
        let forum = Context::class("Forum");
        user.assign_role("moderator".into(), &forum, None).await.unwrap();
        user.assign_permission("ban".into(), &forum, None).await.unwrap();

        let thread = Context::instance("Forum", 12);
        assert!(user.is_role("moderator".into(), &thread).await.unwrap());
        assert!(user.can("ban".into(), &thread).await.unwrap());
        assert!(user.allowed_to("ban".into(), &thread).await.unwrap());
        assert!(!user.can("ban".into(), &Context::Global).await.unwrap());
    }
}
