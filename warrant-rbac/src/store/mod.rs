//! Persistence seam for the authorization engine
//!
//! Resolvers only talk to [`AuthStore`]. Two implementations ship with the
//! crate: [`memory::MemoryStore`] for tests and embedding, and
//! [`seaorm::SeaOrmStore`] for SQLite/PostgreSQL.

pub mod memory;
pub mod seaorm;

use async_trait::async_trait;

use crate::context::{ColumnMatch, Context, ContextRef};
use crate::error::RbacResult;
use crate::joins::{PermissionRole, PermissionSubject, RoleSubject};
use crate::models::{NewPermission, NewRole, Permission, Role};

/// How a query constrains the context columns of a join row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextFilter {
    /// Row context equals the given context (NULL-safe)
    Exact(Context),
    /// Each context column is NULL or equal to the given one
    NullOrEqual(Context),
}

impl ContextFilter {
    /// Exact when forced, wildcard otherwise
    pub fn for_lookup(context: &Context, force_context: bool) -> Self {
        if force_context {
            Self::Exact(context.clone())
        } else {
            Self::NullOrEqual(context.clone())
        }
    }

    pub fn context(&self) -> &Context {
        match self {
            Self::Exact(context) | Self::NullOrEqual(context) => context,
        }
    }

    /// Predicates on `(context_type, context_id)`
    pub fn predicates(&self) -> (ColumnMatch<String>, ColumnMatch<i32>) {
        let (context_type, context_id) = self.context().columns();
        match self {
            Self::Exact(_) => (
                ColumnMatch::is_or_equal(context_type),
                ColumnMatch::is_or_equal(context_id),
            ),
            Self::NullOrEqual(_) => (
                ColumnMatch::null_or_equal(context_type),
                ColumnMatch::null_or_equal(context_id),
            ),
        }
    }

    /// Evaluate against a stored context
    pub fn matches(&self, scope: Option<&ContextRef>) -> bool {
        let (type_match, id_match) = self.predicates();
        type_match.matches(scope.map(|s| &s.context_type))
            && id_match.matches(scope.and_then(|s| s.context_id.as_ref()))
    }
}

/// "Holds a role of at least this level" query
///
/// Matches role assignments of the subject made exactly in `context` whose
/// role has `level >= min_level`. When the reference role is itself bound to
/// a context, candidates must be bound to the same type (and id, if set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelQuery {
    pub context: Context,
    pub min_level: i32,
    pub role_scope: Option<ContextRef>,
}

impl LevelQuery {
    pub fn for_role(role: &Role, context: &Context) -> Self {
        Self {
            context: context.clone(),
            min_level: role.level,
            role_scope: role.scope.clone(),
        }
    }

    /// Whether a candidate role satisfies the level and binding constraints
    pub fn accepts(&self, candidate: &Role) -> bool {
        if candidate.level < self.min_level {
            return false;
        }
        match &self.role_scope {
            None => true,
            Some(scope) => candidate.scope.as_ref().is_some_and(|c| {
                c.context_type == scope.context_type
                    && scope.context_id.map_or(true, |id| c.context_id == Some(id))
            }),
        }
    }
}

/// Storage operations required by the resolvers
#[async_trait]
pub trait AuthStore: Send + Sync {
    // Role catalog

    async fn insert_role(&self, role: NewRole) -> RbacResult<Role>;

    async fn role_by_id(&self, id: i32) -> RbacResult<Option<Role>>;

    /// Role with `slug` bound exactly to `context`
    async fn find_role(&self, slug: &str, context: &Context) -> RbacResult<Option<Role>>;

    /// Delete a role with its assignments and permission grants
    async fn delete_role(&self, id: i32) -> RbacResult<bool>;

    // Permission catalog

    async fn insert_permission(&self, permission: NewPermission) -> RbacResult<Permission>;

    async fn permission_by_id(&self, id: i32) -> RbacResult<Option<Permission>>;

    async fn find_permission(&self, slug: &str, context: &Context) -> RbacResult<Option<Permission>>;

    /// Delete a permission with every grant of it
    async fn delete_permission(&self, id: i32) -> RbacResult<bool>;

    /// Remove every assignment held by a subject, returning the row count
    async fn delete_subject(&self, subject_id: i32) -> RbacResult<u64>;

    // Subject roles

    /// Join occupying the uniqueness slot of `(subject, role, context)`;
    /// context types compare case-insensitively
    async fn find_role_subject(
        &self,
        subject_id: i32,
        role_id: i32,
        context: &Context,
    ) -> RbacResult<Option<RoleSubject>>;

    /// Validate and insert; fails with a duplicate error on conflict
    async fn insert_role_subject(&self, join: RoleSubject) -> RbacResult<RoleSubject>;

    async fn delete_role_subject(&self, id: i32) -> RbacResult<bool>;

    // Direct subject permissions

    async fn find_permission_subject(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<Option<PermissionSubject>>;

    async fn insert_permission_subject(&self, join: PermissionSubject) -> RbacResult<PermissionSubject>;

    async fn delete_permission_subject(&self, id: i32) -> RbacResult<bool>;

    // Role permissions

    async fn find_permission_role(
        &self,
        role_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<Option<PermissionRole>>;

    async fn insert_permission_role(&self, join: PermissionRole) -> RbacResult<PermissionRole>;

    async fn delete_permission_role(&self, id: i32) -> RbacResult<bool>;

    // Resolution queries

    /// Distinct roles held by a subject under `filter`, highest level first,
    /// ties by ascending id
    async fn subject_roles(
        &self,
        subject_id: i32,
        filter: &ContextFilter,
        limit: Option<u64>,
    ) -> RbacResult<Vec<Role>>;

    /// Whether any assignment matches a [`LevelQuery`]
    async fn subject_has_role_level(&self, subject_id: i32, query: &LevelQuery) -> RbacResult<bool>;

    /// Whether a role the subject holds exactly in `context` carries the
    /// permission in `context` or globally
    async fn permission_via_roles(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<bool>;

    /// Distinct permissions granted to the subject directly or through any of
    /// `role_ids`, both halves constrained by `filter`, ordered by id
    async fn subject_permissions(
        &self,
        subject_id: i32,
        role_ids: &[i32],
        filter: &ContextFilter,
    ) -> RbacResult<Vec<Permission>>;

    /// Distinct permissions granted to one role under `filter`, ordered by id
    async fn role_permissions(&self, role_id: i32, filter: &ContextFilter) -> RbacResult<Vec<Permission>>;

    // Provided

    async fn find_or_create_role_subject(
        &self,
        subject_id: i32,
        role_id: i32,
        context: &Context,
    ) -> RbacResult<RoleSubject> {
        if let Some(existing) = self.find_role_subject(subject_id, role_id, context).await? {
            return Ok(existing);
        }
        match self
            .insert_role_subject(RoleSubject::new(subject_id, role_id, context))
            .await
        {
            Err(err) if err.is_conflict() => self
                .find_role_subject(subject_id, role_id, context)
                .await?
                .ok_or(err),
            result => result,
        }
    }

    async fn find_or_create_permission_subject(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<PermissionSubject> {
        if let Some(existing) = self
            .find_permission_subject(subject_id, permission_id, context)
            .await?
        {
            return Ok(existing);
        }
        match self
            .insert_permission_subject(PermissionSubject::new(subject_id, permission_id, context))
            .await
        {
            Err(err) if err.is_conflict() => self
                .find_permission_subject(subject_id, permission_id, context)
                .await?
                .ok_or(err),
            result => result,
        }
    }

    async fn find_or_create_permission_role(
        &self,
        role_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<PermissionRole> {
        if let Some(existing) = self.find_permission_role(role_id, permission_id, context).await? {
            return Ok(existing);
        }
        match self
            .insert_permission_role(PermissionRole::new(role_id, permission_id, context))
            .await
        {
            Err(err) if err.is_conflict() => self
                .find_permission_role(role_id, permission_id, context)
                .await?
                .ok_or(err),
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(context: &Context) -> Option<ContextRef> {
        context.to_ref()
    }

    #[test]
    fn test_exact_filter() {
        let filter = ContextFilter::Exact(Context::instance("Post", 42));
        assert!(filter.matches(scope(&Context::instance("Post", 42)).as_ref()));
        assert!(!filter.matches(scope(&Context::class("Post")).as_ref()));
        assert!(!filter.matches(None));

        let global = ContextFilter::Exact(Context::Global);
        assert!(global.matches(None));
        assert!(!global.matches(scope(&Context::class("Post")).as_ref()));
    }

    #[test]
    fn test_null_or_equal_filter() {
        let filter = ContextFilter::NullOrEqual(Context::instance("Post", 42));
        assert!(filter.matches(scope(&Context::instance("Post", 42)).as_ref()));
        assert!(filter.matches(scope(&Context::class("Post")).as_ref()));
        assert!(filter.matches(None));
        assert!(!filter.matches(scope(&Context::instance("Post", 7)).as_ref()));
        assert!(!filter.matches(scope(&Context::class("Comment")).as_ref()));

        let class = ContextFilter::NullOrEqual(Context::class("Post"));
        assert!(class.matches(scope(&Context::class("Post")).as_ref()));
        assert!(!class.matches(scope(&Context::instance("Post", 42)).as_ref()));
    }

    #[test]
    fn test_level_query_binding() {
        let role = |level: i32, context: Context| Role {
            id: 1,
            slug: "r".to_string(),
            name: None,
            level,
            scope: context.to_ref(),
        };

        let unbound = LevelQuery::for_role(&role(3, Context::Global), &Context::Global);
        assert!(unbound.accepts(&role(5, Context::Global)));
        assert!(unbound.accepts(&role(3, Context::class("Post"))));
        assert!(!unbound.accepts(&role(2, Context::Global)));

        let bound = LevelQuery::for_role(&role(3, Context::class("Post")), &Context::Global);
        assert!(bound.accepts(&role(4, Context::class("Post"))));
        assert!(bound.accepts(&role(4, Context::instance("Post", 9))));
        assert!(!bound.accepts(&role(4, Context::Global)));
        assert!(!bound.accepts(&role(4, Context::class("Comment"))));
    }
}
