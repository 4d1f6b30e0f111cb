//! In-memory [`AuthStore`]
//!
//! Mirrors the relational store's semantics, including cascading deletes and
//! case-insensitive join uniqueness. Used by unit tests and by embedders that
//! do not need persistence.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{AuthStore, ContextFilter, LevelQuery};
use crate::context::Context;
use crate::error::{RbacResult, ValidationError};
use crate::joins::{JoinRecord, PermissionRole, PermissionSubject, RoleSubject};
use crate::models::{NewPermission, NewRole, Permission, Role};

/// One auto-incrementing table
#[derive(Debug)]
struct Table<T> {
    next_id: i32,
    rows: BTreeMap<i32, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }
}

impl<J: JoinRecord> Table<J> {
    /// Row in the same uniqueness slot as `(owner_id, target_id, context)`
    fn find(&self, owner_id: i32, target_id: i32, context: &Context) -> Option<J> {
        let slot = J::from_parts(0, owner_id, target_id, context.to_ref());
        self.rows
            .values()
            .find(|join| join.conflicts_with(&slot))
            .cloned()
    }

    fn insert(&mut self, join: J) -> RbacResult<J> {
        join.validate()?;
        if self.rows.values().any(|existing| existing.conflicts_with(&join)) {
            return Err(join.duplicate_error().into());
        }

        let id = self.allocate_id();
        let stored = J::from_parts(id, join.owner_id(), join.target_id(), join.scope().cloned());
        self.rows.insert(id, stored.clone());
        Ok(stored)
    }

    fn retain(&mut self, keep: impl Fn(&J) -> bool) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|_, join| keep(join));
        (before - self.rows.len()) as u64
    }
}

#[derive(Debug, Default)]
struct Tables {
    roles: Table<Role>,
    permissions: Table<Permission>,
    role_subjects: Table<RoleSubject>,
    permission_subjects: Table<PermissionSubject>,
    permission_roles: Table<PermissionRole>,
}

/// [`AuthStore`] backed by in-process maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_level(mut roles: Vec<Role>) -> Vec<Role> {
    roles.sort_by(|a, b| b.level.cmp(&a.level).then(a.id.cmp(&b.id)));
    roles
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn insert_role(&self, role: NewRole) -> RbacResult<Role> {
        role.validate()?;
        let mut tables = self.tables.write().await;

        let scope = role.context.to_ref();
        if tables
            .roles
            .values()
            .any(|existing| existing.slug == role.slug && existing.scope == scope)
        {
            return Err(ValidationError::Duplicate {
                entity: "Role",
                key: format!("slug={}, context={}", role.slug, role.context),
            }
            .into());
        }

        let id = tables.roles.allocate_id();
        let stored = Role {
            id,
            slug: role.slug,
            name: role.name,
            level: role.level,
            scope,
        };
        tables.roles.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn role_by_id(&self, id: i32) -> RbacResult<Option<Role>> {
        Ok(self.tables.read().await.roles.rows.get(&id).cloned())
    }

    async fn find_role(&self, slug: &str, context: &Context) -> RbacResult<Option<Role>> {
        let scope = context.to_ref();
        let tables = self.tables.read().await;
        let found = tables
            .roles
            .values()
            .find(|role| role.slug == slug && role.scope == scope)
            .cloned();
        Ok(found)
    }

    async fn delete_role(&self, id: i32) -> RbacResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.roles.rows.remove(&id).is_none() {
            return Ok(false);
        }
        let assignments = tables.role_subjects.retain(|join| join.role_id != id);
        let grants = tables.permission_roles.retain(|join| join.role_id != id);
        debug!(
            "Deleted role {} with {} assignments and {} permission grants",
            id, assignments, grants
        );
        Ok(true)
    }

    async fn insert_permission(&self, permission: NewPermission) -> RbacResult<Permission> {
        permission.validate()?;
        let mut tables = self.tables.write().await;

        let scope = permission.context.to_ref();
        if tables
            .permissions
            .values()
            .any(|existing| existing.slug == permission.slug && existing.scope == scope)
        {
            return Err(ValidationError::Duplicate {
                entity: "Permission",
                key: format!("slug={}, context={}", permission.slug, permission.context),
            }
            .into());
        }

        let id = tables.permissions.allocate_id();
        let stored = Permission {
            id,
            slug: permission.slug,
            name: permission.name,
            scope,
        };
        tables.permissions.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn permission_by_id(&self, id: i32) -> RbacResult<Option<Permission>> {
        Ok(self.tables.read().await.permissions.rows.get(&id).cloned())
    }

    async fn find_permission(&self, slug: &str, context: &Context) -> RbacResult<Option<Permission>> {
        let scope = context.to_ref();
        let tables = self.tables.read().await;
        let found = tables
            .permissions
            .values()
            .find(|permission| permission.slug == slug && permission.scope == scope)
            .cloned();
        Ok(found)
    }

    async fn delete_permission(&self, id: i32) -> RbacResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.permissions.rows.remove(&id).is_none() {
            return Ok(false);
        }
        tables.permission_subjects.retain(|join| join.permission_id != id);
        tables.permission_roles.retain(|join| join.permission_id != id);
        Ok(true)
    }

    async fn delete_subject(&self, subject_id: i32) -> RbacResult<u64> {
        let mut tables = self.tables.write().await;
        let roles = tables.role_subjects.retain(|join| join.subject_id != subject_id);
        let permissions = tables
            .permission_subjects
            .retain(|join| join.subject_id != subject_id);
        Ok(roles + permissions)
    }

    async fn find_role_subject(
        &self,
        subject_id: i32,
        role_id: i32,
        context: &Context,
    ) -> RbacResult<Option<RoleSubject>> {
        Ok(self.tables.read().await.role_subjects.find(subject_id, role_id, context))
    }

    async fn insert_role_subject(&self, join: RoleSubject) -> RbacResult<RoleSubject> {
        self.tables.write().await.role_subjects.insert(join)
    }

    async fn delete_role_subject(&self, id: i32) -> RbacResult<bool> {
        Ok(self.tables.write().await.role_subjects.rows.remove(&id).is_some())
    }

    async fn find_permission_subject(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<Option<PermissionSubject>> {
        Ok(self
            .tables
            .read()
            .await
            .permission_subjects
            .find(subject_id, permission_id, context))
    }

    async fn insert_permission_subject(&self, join: PermissionSubject) -> RbacResult<PermissionSubject> {
        self.tables.write().await.permission_subjects.insert(join)
    }

    async fn delete_permission_subject(&self, id: i32) -> RbacResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .permission_subjects
            .rows
            .remove(&id)
            .is_some())
    }

    async fn find_permission_role(
        &self,
        role_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<Option<PermissionRole>> {
        Ok(self
            .tables
            .read()
            .await
            .permission_roles
            .find(role_id, permission_id, context))
    }

    async fn insert_permission_role(&self, join: PermissionRole) -> RbacResult<PermissionRole> {
        self.tables.write().await.permission_roles.insert(join)
    }

    async fn delete_permission_role(&self, id: i32) -> RbacResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .permission_roles
            .rows
            .remove(&id)
            .is_some())
    }

    async fn subject_roles(
        &self,
        subject_id: i32,
        filter: &ContextFilter,
        limit: Option<u64>,
    ) -> RbacResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let role_ids: BTreeSet<i32> = tables
            .role_subjects
            .values()
            .filter(|join| join.subject_id == subject_id && filter.matches(join.scope()))
            .map(|join| join.role_id)
            .collect();

        let roles = role_ids
            .iter()
            .filter_map(|id| tables.roles.rows.get(id).cloned())
            .collect();

        let mut roles = sorted_by_level(roles);
        if let Some(limit) = limit {
            roles.truncate(limit as usize);
        }
        Ok(roles)
    }

    async fn subject_has_role_level(&self, subject_id: i32, query: &LevelQuery) -> RbacResult<bool> {
        let tables = self.tables.read().await;
        let filter = ContextFilter::Exact(query.context.clone());
        let held = tables
            .role_subjects
            .values()
            .filter(|join| join.subject_id == subject_id && filter.matches(join.scope()))
            .filter_map(|join| tables.roles.rows.get(&join.role_id))
            .any(|role| query.accepts(role));
        Ok(held)
    }

    async fn permission_via_roles(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<bool> {
        let tables = self.tables.read().await;
        let held = ContextFilter::Exact(context.clone());
        let granted = ContextFilter::NullOrEqual(context.clone());

        let role_ids: BTreeSet<i32> = tables
            .role_subjects
            .values()
            .filter(|join| join.subject_id == subject_id && held.matches(join.scope()))
            .map(|join| join.role_id)
            .collect();

        let carried = tables.permission_roles.values().any(|join| {
            join.permission_id == permission_id
                && role_ids.contains(&join.role_id)
                && granted.matches(join.scope())
        });
        Ok(carried)
    }

    async fn subject_permissions(
        &self,
        subject_id: i32,
        role_ids: &[i32],
        filter: &ContextFilter,
    ) -> RbacResult<Vec<Permission>> {
        let tables = self.tables.read().await;

        let direct = tables
            .permission_subjects
            .values()
            .filter(|join| join.subject_id == subject_id && filter.matches(join.scope()))
            .map(|join| join.permission_id);
        let via_roles = tables
            .permission_roles
            .values()
            .filter(|join| role_ids.contains(&join.role_id) && filter.matches(join.scope()))
            .map(|join| join.permission_id);

        let ids: BTreeSet<i32> = direct.chain(via_roles).collect();
        Ok(ids
            .iter()
            .filter_map(|id| tables.permissions.rows.get(id).cloned())
            .collect())
    }

    async fn role_permissions(&self, role_id: i32, filter: &ContextFilter) -> RbacResult<Vec<Permission>> {
        let tables = self.tables.read().await;
        let ids: BTreeSet<i32> = tables
            .permission_roles
            .values()
            .filter(|join| join.role_id == role_id && filter.matches(join.scope()))
            .map(|join| join.permission_id)
            .collect();

        Ok(ids
            .iter()
            .filter_map(|id| tables.permissions.rows.get(id).cloned())
            .collect())
    }
}
