//! Assignment records linking subjects, roles and permissions in a context
//!
//! Each join row pairs an owner with a target inside a context. A row is
//! unique per `(owner, target, context)`; the context type is compared
//! case-insensitively.

use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextRef};
use crate::error::{RbacResult, ValidationError};
use crate::models::{Permission, Role};
use crate::store::AuthStore;

/// Which join table a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    RoleSubject,
    PermissionSubject,
    PermissionRole,
}

/// Behaviour shared by the three join records
pub trait JoinRecord: Clone + Send + Sync + 'static {
    const KIND: JoinKind;
    const ENTITY: &'static str;
    const OWNER_FIELD: &'static str;
    const TARGET_FIELD: &'static str;

    fn from_parts(id: i32, owner_id: i32, target_id: i32, scope: Option<ContextRef>) -> Self;

    fn id(&self) -> i32;
    fn owner_id(&self) -> i32;
    fn target_id(&self) -> i32;
    fn scope(&self) -> Option<&ContextRef>;
    fn scope_mut(&mut self) -> &mut Option<ContextRef>;

    /// Context reconstructed from the stored columns
    fn context(&self) -> Context {
        Context::from(self.scope().cloned())
    }

    /// Store a context, decomposing it into type and id
    fn set_context(&mut self, context: &Context) {
        *self.scope_mut() = context.to_ref();
    }

    /// Both endpoint ids must reference persisted records
    fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            (Self::OWNER_FIELD, self.owner_id()),
            (Self::TARGET_FIELD, self.target_id()),
        ] {
            if value <= 0 {
                return Err(ValidationError::MissingForeignKey {
                    entity: Self::ENTITY,
                    field,
                    value,
                });
            }
        }

        if let Some(scope) = self.scope() {
            if scope.context_type.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    entity: Self::ENTITY,
                    field: "context_type",
                    message: "cannot be blank".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Whether `other` occupies the same uniqueness slot
    fn conflicts_with(&self, other: &Self) -> bool {
        self.owner_id() == other.owner_id()
            && self.target_id() == other.target_id()
            && match (self.scope(), other.scope()) {
                (None, None) => true,
                (Some(a), Some(b)) => a.matches_ignore_case(b),
                _ => false,
            }
    }

    /// Description of the uniqueness key for error messages
    fn key_description(&self) -> String {
        format!(
            "{}={}, {}={}, context={}",
            Self::OWNER_FIELD,
            self.owner_id(),
            Self::TARGET_FIELD,
            self.target_id(),
            self.context()
        )
    }

    fn duplicate_error(&self) -> ValidationError {
        ValidationError::Duplicate {
            entity: Self::ENTITY,
            key: self.key_description(),
        }
    }
}

macro_rules! join_record {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:ident, $owner:ident, $target:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub id: i32,
            pub $owner: i32,
            pub $target: i32,
            pub scope: Option<ContextRef>,
        }

        impl $name {
            /// Unsaved record in `context`
            pub fn new($owner: i32, $target: i32, context: &Context) -> Self {
                Self {
                    id: 0,
                    $owner,
                    $target,
                    scope: context.to_ref(),
                }
            }
        }

        impl JoinRecord for $name {
            const KIND: JoinKind = JoinKind::$kind;
            const ENTITY: &'static str = stringify!($name);
            const OWNER_FIELD: &'static str = stringify!($owner);
            const TARGET_FIELD: &'static str = stringify!($target);

            fn from_parts(id: i32, owner_id: i32, target_id: i32, scope: Option<ContextRef>) -> Self {
                Self {
                    id,
                    $owner: owner_id,
                    $target: target_id,
                    scope,
                }
            }

            fn id(&self) -> i32 {
                self.id
            }

            fn owner_id(&self) -> i32 {
                self.$owner
            }

            fn target_id(&self) -> i32 {
                self.$target
            }

            fn scope(&self) -> Option<&ContextRef> {
                self.scope.as_ref()
            }

            fn scope_mut(&mut self) -> &mut Option<ContextRef> {
                &mut self.scope
            }
        }
    };
}

join_record!(
    /// A role held by a subject in a context
    RoleSubject, RoleSubject, subject_id, role_id
);

join_record!(
    /// A permission granted directly to a subject in a context
    PermissionSubject, PermissionSubject, subject_id, permission_id
);

join_record!(
    /// A permission granted to a role in a context
    PermissionRole, PermissionRole, role_id, permission_id
);

impl RoleSubject {
    pub async fn role(&self, store: &dyn AuthStore) -> RbacResult<Option<Role>> {
        store.role_by_id(self.role_id).await
    }
}

impl PermissionSubject {
    pub async fn permission(&self, store: &dyn AuthStore) -> RbacResult<Option<Permission>> {
        store.permission_by_id(self.permission_id).await
    }
}

impl PermissionRole {
    pub async fn role(&self, store: &dyn AuthStore) -> RbacResult<Option<Role>> {
        store.role_by_id(self.role_id).await
    }

    pub async fn permission(&self, store: &dyn AuthStore) -> RbacResult<Option<Permission>> {
        store.permission_by_id(self.permission_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_accessors() {
        let mut join = RoleSubject::new(1, 2, &Context::Global);
        assert_eq!(join.context(), Context::Global);
        assert!(join.scope.is_none());

        join.set_context(&Context::instance("Post", 42));
        assert_eq!(join.scope.as_ref().map(|s| s.context_type.as_str()), Some("Post"));
        assert_eq!(join.scope.as_ref().and_then(|s| s.context_id), Some(42));
        assert_eq!(join.context(), Context::instance("Post", 42));
    }

    #[test]
    fn test_validation_requires_foreign_keys() {
        assert!(PermissionRole::new(1, 1, &Context::Global).validate().is_ok());

        let err = PermissionRole::new(0, 1, &Context::Global).validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingForeignKey {
                entity: "PermissionRole",
                field: "role_id",
                value: 0,
            }
        );

        let err = PermissionSubject::new(4, -1, &Context::Global)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MissingForeignKey { field: "permission_id", .. }
        ));
    }

    #[test]
    fn test_conflicts_compare_type_case_insensitively() {
        let a = RoleSubject::new(1, 2, &Context::instance("Post", 42));
        let b = RoleSubject::new(1, 2, &Context::instance("post", 42));
        let c = RoleSubject::new(1, 2, &Context::instance("Post", 43));
        let d = RoleSubject::new(1, 2, &Context::Global);

        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c));
        assert!(!a.conflicts_with(&d));
        assert!(d.conflicts_with(&RoleSubject::new(1, 2, &Context::Global)));
    }
}
