//! Role and permission catalog records

use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextRef};
use crate::error::ValidationError;

/// A named role with a numeric level
///
/// A role may itself be bound to a context (`scope`), in which case it can
/// only be granted within that context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i32,
    pub slug: String,
    pub name: Option<String>,
    pub level: i32,
    pub scope: Option<ContextRef>,
}

/// A named permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i32,
    pub slug: String,
    pub name: Option<String>,
    pub scope: Option<ContextRef>,
}

impl Role {
    /// Context this role is bound to, global when unbound
    pub fn context(&self) -> Context {
        Context::from(self.scope.clone())
    }
}

impl Permission {
    /// Context this permission is bound to, global when unbound
    pub fn context(&self) -> Context {
        Context::from(self.scope.clone())
    }
}

/// Role to be inserted into the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub slug: String,
    pub name: Option<String>,
    pub level: i32,
    pub context: Context,
}

impl NewRole {
    pub fn new(slug: impl Into<String>, level: i32) -> Self {
        Self {
            slug: slug.into(),
            name: None,
            level,
            context: Context::Global,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bind the role to a context
    pub fn in_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_slug("Role", &self.slug)
    }
}

/// Permission to be inserted into the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    pub slug: String,
    pub name: Option<String>,
    pub context: Context,
}

impl NewPermission {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: None,
            context: Context::Global,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_slug("Permission", &self.slug)
    }
}

/// Slugs are non-empty and limited to alphanumerics, `_`, `-`, `.` and `:`
fn validate_slug(entity: &'static str, slug: &str) -> Result<(), ValidationError> {
    let invalid = |message: &str| ValidationError::InvalidField {
        entity,
        field: "slug",
        message: message.to_string(),
    };

    if slug.is_empty() {
        return Err(invalid("cannot be empty"));
    }
    if slug.len() > 100 {
        return Err(invalid("cannot exceed 100 characters"));
    }
    if !slug
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(invalid(
            "can only contain alphanumeric characters, underscores, hyphens, dots and colons",
        ));
    }

    Ok(())
}

/// A role or permission argument: either a loaded record or a slug to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<T> {
    Record(T),
    Slug(String),
}

pub type RoleTarget = Target<Role>;
pub type PermissionTarget = Target<Permission>;

impl<T> From<&str> for Target<T> {
    fn from(slug: &str) -> Self {
        Self::Slug(slug.to_string())
    }
}

impl<T> From<String> for Target<T> {
    fn from(slug: String) -> Self {
        Self::Slug(slug)
    }
}

impl From<Role> for RoleTarget {
    fn from(role: Role) -> Self {
        Self::Record(role)
    }
}

impl From<&Role> for RoleTarget {
    fn from(role: &Role) -> Self {
        Self::Record(role.clone())
    }
}

impl From<Permission> for PermissionTarget {
    fn from(permission: Permission) -> Self {
        Self::Record(permission)
    }
}

impl From<&Permission> for PermissionTarget {
    fn from(permission: &Permission) -> Self {
        Self::Record(permission.clone())
    }
}

impl RoleTarget {
    /// Slug for log output
    pub fn label(&self) -> &str {
        match self {
            Self::Record(role) => &role.slug,
            Self::Slug(slug) => slug,
        }
    }
}

impl PermissionTarget {
    pub fn label(&self) -> &str {
        match self {
            Self::Record(permission) => &permission.slug,
            Self::Slug(slug) => slug,
        }
    }
}
