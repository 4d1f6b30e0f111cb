//! Context-scoped role-based access control for Warrant
//!
//! Subjects (users, service accounts, ...) are granted roles and permissions
//! inside a [`Context`]: globally, for a resource type, or for a single
//! resource instance. Checks fall back from instance to type to global
//! unless the caller pins them to one exact context.
//!
//! - Roles carry a numeric level, enabling "this role or higher" checks
//! - Permissions are granted directly to subjects or inherited via roles
//! - Storage goes through the [`AuthStore`] trait, with in-memory and
//!   SeaORM implementations
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warrant_rbac::{AuthScope, Context, MemoryStore, NewRole, RoleCapable, ScopeSettings};
//!
//! # async fn run() -> warrant_rbac::RbacResult<()> {
//! let scope = AuthScope::new(ScopeSettings::default(), Arc::new(MemoryStore::new()));
//! let admin = scope.create_role(NewRole::new("admin", 10)).await?;
//!
//! let user = scope.subject(1);
//! user.assign_role(admin.clone().into(), &Context::Global, None).await?;
//!
//! let post = Context::instance("Post", 42);
//! assert!(user.has_role("admin".into(), &post, None).await?);
//! # Ok(())
//! # }
//! ```

pub mod aliases;
pub mod context;
pub mod error;
pub mod joins;
pub mod models;
pub mod permissions;
pub mod registry;
pub mod roles;
pub mod store;
pub mod subject;

pub use aliases::{PermissionAliases, RoleAliases};
pub use context::{verify_target_context, ColumnMatch, Context, ContextRef, IntoContext, Resource, ResourceKind};
pub use error::{RbacError, RbacResult, ValidationError};
pub use joins::{JoinKind, JoinRecord, PermissionRole, PermissionSubject, RoleSubject};
pub use models::{NewPermission, NewRole, Permission, PermissionTarget, Role, RoleTarget, Target};
pub use permissions::PermissionResolver;
pub use registry::{AuthScope, Registry, ScopeSettings};
pub use roles::RoleResolver;
pub use store::{memory::MemoryStore, seaorm::SeaOrmStore, AuthStore, ContextFilter, LevelQuery};
pub use subject::{PermissionCapable, RoleCapable, Subject};
