//! Error types for RBAC operations

use thiserror::Error;

/// Result type for RBAC operations
pub type RbacResult<T> = Result<T, RbacError>;

/// RBAC-specific errors
///
/// Unresolvable roles or permissions and missing assignments are not errors;
/// those operations answer `false` or `None`.
#[derive(Error, Debug)]
pub enum RbacError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Storage setup failed
    #[error("Storage error: {0}")]
    Storage(#[from] warrant_storage::StorageError),

    /// Context argument could not be interpreted
    #[error("Invalid context: {message}")]
    InvalidContext { message: String },

    /// Record failed validation on write
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] warrant_config::ConfigError),

    /// Auth scope is not registered
    #[error("Unknown auth scope: {scope}")]
    UnknownScope { scope: String },

    /// Permission operation on a scope configured without permissions
    #[error("Permissions are not enabled for auth scope {scope}")]
    PermissionsDisabled { scope: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Write-time validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{entity}.{field} must reference a persisted record, got {value}")]
    MissingForeignKey {
        entity: &'static str,
        field: &'static str,
        value: i32,
    },

    #[error("{entity} already exists for {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("{entity}.{field} {message}")]
    InvalidField {
        entity: &'static str,
        field: &'static str,
        message: String,
    },
}

impl RbacError {
    /// Create a new invalid context error
    pub fn invalid_context(message: impl Into<String>) -> Self {
        Self::InvalidContext {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Uniqueness violation on write.
    ///
    /// Concurrent assignment of the same grant surfaces this way; callers
    /// treat it as "already assigned".
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::Duplicate { .. }))
    }

    /// Check if this is an invalid context error
    pub fn is_invalid_context(&self) -> bool {
        matches!(self, Self::InvalidContext { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownScope { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let conflict: RbacError = ValidationError::Duplicate {
            entity: "RoleSubject",
            key: "user_id=1, role_id=2, context=global".to_string(),
        }
        .into();
        assert!(conflict.is_conflict());
        assert!(!conflict.is_invalid_context());

        let missing: RbacError = ValidationError::MissingForeignKey {
            entity: "PermissionRole",
            field: "role_id",
            value: 0,
        }
        .into();
        assert!(!missing.is_conflict());
        assert_eq!(
            missing.to_string(),
            "Validation failed: PermissionRole.role_id must reference a persisted record, got 0"
        );

        assert!(RbacError::invalid_context("id without type").is_invalid_context());
        assert!(RbacError::UnknownScope { scope: "staff".into() }.is_not_found());
    }
}
