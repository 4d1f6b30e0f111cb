//! Auth scopes and the registry that builds them from configuration

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;
use warrant_config::{AuthScopeConfig, EntityNames, Validatable, WarrantConfig, DEFAULT_SCOPE};
use warrant_storage::{DatabaseConnection, TableNames};

use crate::context::Context;
use crate::error::{RbacError, RbacResult};
use crate::models::{NewPermission, NewRole, Permission, Role};
use crate::permissions::PermissionResolver;
use crate::roles::RoleResolver;
use crate::store::memory::MemoryStore;
use crate::store::seaorm::SeaOrmStore;
use crate::store::AuthStore;
use crate::subject::Subject;

/// Resolved settings of one auth scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSettings {
    pub name: String,
    pub with_permissions: bool,
    pub force_context: bool,
    pub entities: EntityNames,
    pub tables: TableNames,
}

impl ScopeSettings {
    pub fn from_config(name: impl Into<String>, config: &AuthScopeConfig) -> RbacResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            with_permissions: config.with_permissions,
            force_context: config.force_context,
            tables: TableNames::from_entities(&config.entities),
            entities: config.entities.clone(),
        })
    }
}

impl Default for ScopeSettings {
    fn default() -> Self {
        let config = AuthScopeConfig::default();
        Self {
            name: DEFAULT_SCOPE.to_string(),
            with_permissions: config.with_permissions,
            force_context: config.force_context,
            tables: TableNames::from_entities(&config.entities),
            entities: config.entities,
        }
    }
}

/// One configured subject type with its store
///
/// Hands out [`Subject`] handles and manages the role and permission catalog.
#[derive(Clone)]
pub struct AuthScope {
    settings: Arc<ScopeSettings>,
    store: Arc<dyn AuthStore>,
}

impl fmt::Debug for AuthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthScope")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AuthScope {
    pub fn new(settings: ScopeSettings, store: Arc<dyn AuthStore>) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    pub fn roles(&self) -> RoleResolver {
        RoleResolver::new(self.store.clone(), self.settings.clone())
    }

    /// Permission operations, unavailable on scopes without permissions
    pub fn permissions(&self) -> RbacResult<PermissionResolver> {
        if !self.settings.with_permissions {
            return Err(RbacError::PermissionsDisabled {
                scope: self.settings.name.clone(),
            });
        }
        Ok(PermissionResolver::new(self.store.clone(), self.settings.clone()))
    }

    /// Authorization handle for one subject
    pub fn subject(&self, id: i32) -> Subject {
        let permissions = self
            .settings
            .with_permissions
            .then(|| PermissionResolver::new(self.store.clone(), self.settings.clone()));
        Subject::new(id, self.settings.clone(), self.roles(), permissions)
    }

    pub async fn create_role(&self, role: NewRole) -> RbacResult<Role> {
        self.store.insert_role(role).await
    }

    pub async fn create_permission(&self, permission: NewPermission) -> RbacResult<Permission> {
        if !self.settings.with_permissions {
            return Err(RbacError::PermissionsDisabled {
                scope: self.settings.name.clone(),
            });
        }
        self.store.insert_permission(permission).await
    }

    /// Role with `slug` bound exactly to `context`
    pub async fn role(&self, slug: &str, context: &Context) -> RbacResult<Option<Role>> {
        self.store.find_role(slug, context).await
    }

    pub async fn permission(&self, slug: &str, context: &Context) -> RbacResult<Option<Permission>> {
        self.store.find_permission(slug, context).await
    }

    pub async fn delete_role(&self, id: i32) -> RbacResult<bool> {
        self.store.delete_role(id).await
    }

    pub async fn delete_permission(&self, id: i32) -> RbacResult<bool> {
        self.store.delete_permission(id).await
    }

    /// Drop every assignment of a subject, e.g. when the host deletes it
    pub async fn delete_subject(&self, subject_id: i32) -> RbacResult<u64> {
        self.store.delete_subject(subject_id).await
    }
}

/// Auth scopes keyed by name
#[derive(Clone, Default)]
pub struct Registry {
    scopes: BTreeMap<String, AuthScope>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scope: AuthScope) {
        self.scopes.insert(scope.name().to_string(), scope);
    }

    /// Every configured scope on its own [`MemoryStore`]
    pub fn in_memory(config: &WarrantConfig) -> RbacResult<Self> {
        let mut registry = Self::new();
        for (name, scope_config) in &config.scopes {
            let settings = ScopeSettings::from_config(name.clone(), scope_config)?;
            registry.register(AuthScope::new(settings, Arc::new(MemoryStore::new())));
        }
        Ok(registry)
    }

    /// Every configured scope on one shared database connection
    pub async fn connect(config: &WarrantConfig) -> RbacResult<Self> {
        let connection = DatabaseConnection::new(config.database.clone()).await?;
        Self::with_connection(config, &connection).await
    }

    /// Build scopes on an existing connection, creating tables when the
    /// database config asks for it
    pub async fn with_connection(
        config: &WarrantConfig,
        connection: &DatabaseConnection,
    ) -> RbacResult<Self> {
        let mut registry = Self::new();
        for (name, scope_config) in &config.scopes {
            let settings = ScopeSettings::from_config(name.clone(), scope_config)?;
            let store = SeaOrmStore::from_connection(connection, settings.tables.clone());
            if config.database.auto_create_schema {
                store.create_schema().await?;
            }
            registry.register(AuthScope::new(settings, Arc::new(store)));
        }

        info!(
            "Registered {} auth scope(s): {}",
            registry.scopes.len(),
            registry.names().collect::<Vec<_>>().join(", ")
        );
        Ok(registry)
    }

    pub fn scope(&self, name: &str) -> RbacResult<&AuthScope> {
        self.scopes.get(name).ok_or_else(|| RbacError::UnknownScope {
            scope: name.to_string(),
        })
    }

    /// The `main` scope
    pub fn default_scope(&self) -> RbacResult<&AuthScope> {
        self.scope(DEFAULT_SCOPE)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::RoleCapable;

    fn two_scope_config() -> WarrantConfig {
        let mut config = WarrantConfig::default();
        let mut staff = AuthScopeConfig {
            with_permissions: false,
            force_context: true,
            ..AuthScopeConfig::default()
        };
        staff.entities.subject = "Employee".to_string();
        staff.entities.role = "StaffRole".to_string();
        staff.entities.permission = "StaffPermission".to_string();
        config.scopes.insert("staff".to_string(), staff);
        config
    }

    #[test]
    fn test_settings_from_config() {
        let config = two_scope_config();
        let settings = ScopeSettings::from_config("staff", config.scope("staff").unwrap()).unwrap();

        assert!(!settings.with_permissions);
        assert!(settings.force_context);
        assert_eq!(settings.tables.roles, "staff_roles");
        assert_eq!(settings.tables.role_subjects, "staff_role_employees");
        assert_eq!(settings.tables.subject_fk, "employee_id");
    }

    #[test]
    fn test_invalid_scope_config_is_rejected() {
        let mut scope = AuthScopeConfig::default();
        scope.entities.permission = "Role".to_string();
        assert!(matches!(
            ScopeSettings::from_config("broken", &scope),
            Err(RbacError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = Registry::in_memory(&two_scope_config()).unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["main", "staff"]);
        assert!(registry.default_scope().is_ok());
        assert!(registry.scope("nobody").unwrap_err().is_not_found());
    }

    #[test]
    fn test_scope_debug_names_settings() {
        let scope = AuthScope::new(ScopeSettings::default(), Arc::new(MemoryStore::new()));
        let rendered = format!("{:?}", scope);
        assert!(rendered.starts_with("AuthScope"));
        assert!(rendered.contains("name: \"main\""));
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let registry = Registry::in_memory(&two_scope_config()).unwrap();
        let main = registry.scope("main").unwrap();
        let staff = registry.scope("staff").unwrap();

        let admin = main.create_role(NewRole::new("admin", 10)).await.unwrap();
        main.subject(1)
            .assign_role(admin.into(), &Context::Global, None)
            .await
            .unwrap();

        assert!(staff.role("admin", &Context::Global).await.unwrap().is_none());
        assert!(!staff
            .subject(1)
            .has_role("admin".into(), &Context::Global, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_permissions_disabled_scope() {
        let registry = Registry::in_memory(&two_scope_config()).unwrap();
        let staff = registry.scope("staff").unwrap();

        assert!(matches!(
            staff.permissions(),
            Err(RbacError::PermissionsDisabled { .. })
        ));
        assert!(matches!(
            staff.create_permission(NewPermission::new("publish")).await,
            Err(RbacError::PermissionsDisabled { .. })
        ));
        assert!(staff.subject(1).permissions().is_none());
    }
}
