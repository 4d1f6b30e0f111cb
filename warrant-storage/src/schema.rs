//! Table descriptors and schema creation
//!
//! Table and foreign key identifiers come from the scope's entity naming, so
//! several scopes can share one database. Column names inside each table are
//! fixed and listed in [`columns`].

use sea_orm::sea_query::{
    Alias, ColumnDef, ForeignKey, ForeignKeyAction, Index, IndexCreateStatement, Table,
    TableCreateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tracing::info;
use warrant_config::domains::auth::table_name;
use warrant_config::EntityNames;

use crate::error::StorageResult;

/// Fixed column names shared by the authorization tables
pub mod columns {
    pub const ID: &str = "id";
    pub const SLUG: &str = "slug";
    pub const NAME: &str = "name";
    pub const LEVEL: &str = "level";
    pub const CONTEXT_TYPE: &str = "context_type";
    pub const CONTEXT_ID: &str = "context_id";
}

/// Table and foreign key identifiers for one auth scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub roles: String,
    pub permissions: String,
    pub role_subjects: String,
    pub permission_subjects: String,
    pub permission_roles: String,
    pub subject_fk: String,
    pub role_fk: String,
    pub permission_fk: String,
}

impl TableNames {
    pub fn from_entities(names: &EntityNames) -> Self {
        Self {
            roles: table_name(&names.role),
            permissions: table_name(&names.permission),
            role_subjects: table_name(&names.role_subject()),
            permission_subjects: table_name(&names.permission_subject()),
            permission_roles: table_name(&names.permission_role()),
            subject_fk: names.subject_foreign_key(),
            role_fk: names.role_foreign_key(),
            permission_fk: names.permission_foreign_key(),
        }
    }

    /// CREATE TABLE statements in dependency order
    pub fn create_table_statements(&self) -> Vec<TableCreateStatement> {
        vec![
            catalog_table(&self.roles, true),
            catalog_table(&self.permissions, false),
            join_table(&self.role_subjects, &self.subject_fk, None, (&self.role_fk, &self.roles)),
            join_table(
                &self.permission_subjects,
                &self.subject_fk,
                None,
                (&self.permission_fk, &self.permissions),
            ),
            join_table(
                &self.permission_roles,
                &self.role_fk,
                Some(&self.roles),
                (&self.permission_fk, &self.permissions),
            ),
        ]
    }

    /// Unique indexes backing slug and assignment uniqueness
    pub fn create_index_statements(&self) -> Vec<IndexCreateStatement> {
        vec![
            unique_index(&self.roles, &[columns::SLUG]),
            unique_index(&self.permissions, &[columns::SLUG]),
            unique_index(&self.role_subjects, &[&self.subject_fk, &self.role_fk]),
            unique_index(&self.permission_subjects, &[&self.subject_fk, &self.permission_fk]),
            unique_index(&self.permission_roles, &[&self.role_fk, &self.permission_fk]),
        ]
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::from_entities(&EntityNames::default())
    }
}

/// Create all tables and indexes for a scope; existing objects are kept
pub async fn create_schema(db: &DatabaseConnection, tables: &TableNames) -> StorageResult<()> {
    let backend = db.get_database_backend();

    for statement in tables.create_table_statements() {
        db.execute(backend.build(&statement)).await?;
    }
    for statement in tables.create_index_statements() {
        db.execute(backend.build(&statement)).await?;
    }

    info!(
        "Authorization schema ready ({}, {}, {}, {}, {})",
        tables.roles,
        tables.permissions,
        tables.role_subjects,
        tables.permission_subjects,
        tables.permission_roles
    );
    Ok(())
}

fn catalog_table(table: &str, with_level: bool) -> TableCreateStatement {
    let mut statement = Table::create();
    statement
        .table(Alias::new(table))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new(columns::ID))
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Alias::new(columns::SLUG)).string().not_null())
        .col(ColumnDef::new(Alias::new(columns::NAME)).string().null());

    if with_level {
        statement.col(
            ColumnDef::new(Alias::new(columns::LEVEL))
                .integer()
                .not_null()
                .default(0),
        );
    }

    statement
        .col(ColumnDef::new(Alias::new(columns::CONTEXT_TYPE)).string().null())
        .col(ColumnDef::new(Alias::new(columns::CONTEXT_ID)).integer().null())
        .to_owned()
}

/// A join table. `owner_table` is set when the owner side is managed here
/// (roles); subjects live in the host application's schema.
fn join_table(
    table: &str,
    owner_fk: &str,
    owner_table: Option<&str>,
    (target_fk, target_table): (&str, &str),
) -> TableCreateStatement {
    let mut statement = Table::create();
    statement
        .table(Alias::new(table))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new(columns::ID))
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Alias::new(owner_fk)).integer().not_null())
        .col(ColumnDef::new(Alias::new(target_fk)).integer().not_null())
        .col(ColumnDef::new(Alias::new(columns::CONTEXT_TYPE)).string().null())
        .col(ColumnDef::new(Alias::new(columns::CONTEXT_ID)).integer().null())
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{}_{}", table, target_fk))
                .from(Alias::new(table), Alias::new(target_fk))
                .to(Alias::new(target_table), Alias::new(columns::ID))
                .on_delete(ForeignKeyAction::Cascade),
        );

    if let Some(owner_table) = owner_table {
        statement.foreign_key(
            ForeignKey::create()
                .name(format!("fk_{}_{}", table, owner_fk))
                .from(Alias::new(table), Alias::new(owner_fk))
                .to(Alias::new(owner_table), Alias::new(columns::ID))
                .on_delete(ForeignKeyAction::Cascade),
        );
    }

    statement.to_owned()
}

/// Unique index over `key_columns` plus the two context columns.
///
/// SQL treats NULLs as distinct in unique indexes, so global (NULL context)
/// duplicates are caught by the engine's own existence check instead.
fn unique_index(table: &str, key_columns: &[&str]) -> IndexCreateStatement {
    let mut index = Index::create();
    index
        .name(format!("idx_{}_unique", table))
        .table(Alias::new(table))
        .if_not_exists()
        .unique();

    for column in key_columns {
        index.col(Alias::new(*column));
    }
    index
        .col(Alias::new(columns::CONTEXT_TYPE))
        .col(Alias::new(columns::CONTEXT_ID))
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::DbBackend;

    #[test]
    fn test_default_table_names() {
        let tables = TableNames::default();
        assert_eq!(tables.roles, "roles");
        assert_eq!(tables.role_subjects, "role_users");
        assert_eq!(tables.permission_subjects, "permission_users");
        assert_eq!(tables.permission_roles, "permission_roles");
        assert_eq!(tables.subject_fk, "user_id");
    }

    #[test]
    fn test_join_table_sql_uses_configured_keys() {
        let names = EntityNames {
            subject: "Account".to_string(),
            ..EntityNames::default()
        };
        let tables = TableNames::from_entities(&names);
        let statements = tables.create_table_statements();

        let sql = DbBackend::Sqlite.build(&statements[2]).to_string();
        assert!(sql.contains("\"role_accounts\""));
        assert!(sql.contains("\"account_id\""));
        assert!(sql.contains("\"role_id\""));
        assert!(sql.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_unique_index_covers_context_columns() {
        let tables = TableNames::default();
        let sql = DbBackend::Postgres
            .build(&tables.create_index_statements()[2])
            .to_string();

        assert!(sql.contains("UNIQUE INDEX"));
        assert!(sql.contains("\"user_id\", \"role_id\", \"context_type\", \"context_id\""));
    }
}
