//! Role assignment and role checks
//!
//! Lookups without `force_context` widen from the requested context to its
//! class and then to global. With `force_context` only the exact context is
//! considered. The per-call flag overrides the scope default.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::{verify_target_context, Context};
use crate::error::RbacResult;
use crate::joins::RoleSubject;
use crate::models::{Role, RoleTarget, Target};
use crate::registry::ScopeSettings;
use crate::store::{AuthStore, ContextFilter, LevelQuery};

/// Role operations for subjects of one auth scope
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn AuthStore>,
    settings: Arc<ScopeSettings>,
}

impl RoleResolver {
    pub fn new(store: Arc<dyn AuthStore>, settings: Arc<ScopeSettings>) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    fn force(&self, force_context: Option<bool>) -> bool {
        force_context.unwrap_or(self.settings.force_context)
    }

    /// Resolve a role argument. Records are used as-is; slugs are looked up
    /// in the exact context first, then (unless forced) in wider contexts.
    pub async fn target_role(
        &self,
        role: &RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<Role>> {
        let slug = match role {
            Target::Record(role) => return Ok(Some(role.clone())),
            Target::Slug(slug) => slug,
        };

        for candidate in context.lookup_chain(self.force(force_context)) {
            if let Some(role) = self.store.find_role(slug, &candidate).await? {
                return Ok(Some(role));
            }
        }
        Ok(None)
    }

    /// Grant a role in `context`. Returns the (possibly pre-existing)
    /// assignment, or `None` when the role cannot be resolved or is bound to
    /// a context that does not contain `context`.
    pub async fn assign_role(
        &self,
        subject_id: i32,
        role: impl Into<RoleTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<RoleSubject>> {
        let role = role.into();
        let Some(target) = self.target_role(&role, context, force_context).await? else {
            debug!("Role '{}' not found for {}", role.label(), context);
            return Ok(None);
        };

        if !verify_target_context(&target.context(), context) {
            warn!(
                "Role '{}' is bound to {} and cannot be assigned in {}",
                target.slug,
                target.context(),
                context
            );
            return Ok(None);
        }

        let join = self
            .store
            .find_or_create_role_subject(subject_id, target.id, context)
            .await?;
        info!(
            "Assigned role '{}' to {} {} in {}",
            target.slug, self.settings.entities.subject, subject_id, context
        );
        Ok(Some(join))
    }

    /// Remove the assignment made exactly in `context`
    pub async fn unassign_role(
        &self,
        subject_id: i32,
        role: impl Into<RoleTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let role = role.into();
        let Some(target) = self.target_role(&role, context, force_context).await? else {
            return Ok(false);
        };
        let Some(join) = self
            .store
            .find_role_subject(subject_id, target.id, context)
            .await?
        else {
            return Ok(false);
        };

        let removed = self.store.delete_role_subject(join.id).await?;
        if removed {
            info!(
                "Unassigned role '{}' from {} {} in {}",
                target.slug, self.settings.entities.subject, subject_id, context
            );
        }
        Ok(removed)
    }

    pub async fn has_role(
        &self,
        subject_id: i32,
        role: impl Into<RoleTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        self.check_role(subject_id, &role.into(), context, force_context)
            .await
    }

    async fn check_role(
        &self,
        subject_id: i32,
        role: &RoleTarget,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let force = self.force(force_context);
        let Some(target) = self.target_role(role, context, Some(force)).await? else {
            return Ok(false);
        };

        for candidate in context.lookup_chain(force) {
            if self
                .store
                .find_role_subject(subject_id, target.id, &candidate)
                .await?
                .is_some()
            {
                debug!(
                    "{} {} has role '{}' via {}",
                    self.settings.entities.subject, subject_id, target.slug, candidate
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the subject holds the role, or any role of at least its level
    pub async fn has_role_or_higher(
        &self,
        subject_id: i32,
        role: impl Into<RoleTarget>,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<bool> {
        let role = role.into();
        if self
            .check_role(subject_id, &role, context, force_context)
            .await?
        {
            return Ok(true);
        }

        let force = self.force(force_context);
        let Some(target) = self.target_role(&role, context, Some(force)).await? else {
            return Ok(false);
        };

        for candidate in context.lookup_chain(force) {
            let query = LevelQuery::for_role(&target, &candidate);
            if self.store.subject_has_role_level(subject_id, &query).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Roles held in `context`; unless forced, roles held in wider contexts
    /// are included. Highest level first.
    pub async fn roles_for(
        &self,
        subject_id: i32,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Vec<Role>> {
        let filter = ContextFilter::for_lookup(context, self.force(force_context));
        self.store.subject_roles(subject_id, &filter, None).await
    }

    /// The highest-level role from [`Self::roles_for`]; ties go to the
    /// earliest created role
    pub async fn highest_role(
        &self,
        subject_id: i32,
        context: &Context,
        force_context: Option<bool>,
    ) -> RbacResult<Option<Role>> {
        let filter = ContextFilter::for_lookup(context, self.force(force_context));
        let roles = self.store.subject_roles(subject_id, &filter, Some(1)).await?;
        Ok(roles.into_iter().next())
    }
}
