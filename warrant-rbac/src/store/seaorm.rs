//! SeaORM-backed [`AuthStore`]
//!
//! Table and foreign key names come from the scope's [`TableNames`], so the
//! queries are built dynamically with sea-query rather than through static
//! entity definitions.

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, Cond, Condition, DeleteStatement, Expr, Func, InsertStatement, JoinType, Order, Query,
    SelectStatement, SimpleExpr,
};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, SqlErr, TransactionTrait,
};
use tracing::{debug, info};
use warrant_storage::{columns, TableNames};

use super::{AuthStore, ContextFilter, LevelQuery};
use crate::context::{ColumnMatch, Context, ContextRef};
use crate::error::{RbacError, RbacResult, ValidationError};
use crate::joins::{JoinKind, JoinRecord, PermissionRole, PermissionSubject, RoleSubject};
use crate::models::{NewPermission, NewRole, Permission, Role};

// Table aliases used in multi-table queries
const ROLE: &str = "r";
const PERMISSION: &str = "p";
const ROLE_SUBJECT: &str = "rs";
const PERMISSION_SUBJECT: &str = "ps";
const PERMISSION_ROLE: &str = "pr";

/// Physical layout of one join table
struct JoinTable<'a> {
    table: &'a str,
    owner_fk: &'a str,
    target_fk: &'a str,
}

/// [`AuthStore`] on a SQLite or PostgreSQL database
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
    tables: TableNames,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection, tables: TableNames) -> Self {
        Self { db, tables }
    }

    /// Build a store on a shared storage connection
    pub fn from_connection(connection: &warrant_storage::DatabaseConnection, tables: TableNames) -> Self {
        Self::new(connection.get_connection().clone(), tables)
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Create this store's tables if they do not exist
    pub async fn create_schema(&self) -> RbacResult<()> {
        warrant_storage::create_schema(&self.db, &self.tables).await?;
        Ok(())
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    fn join_table(&self, kind: JoinKind) -> JoinTable<'_> {
        let t = &self.tables;
        match kind {
            JoinKind::RoleSubject => JoinTable {
                table: &t.role_subjects,
                owner_fk: &t.subject_fk,
                target_fk: &t.role_fk,
            },
            JoinKind::PermissionSubject => JoinTable {
                table: &t.permission_subjects,
                owner_fk: &t.subject_fk,
                target_fk: &t.permission_fk,
            },
            JoinKind::PermissionRole => JoinTable {
                table: &t.permission_roles,
                owner_fk: &t.role_fk,
                target_fk: &t.permission_fk,
            },
        }
    }

    async fn fetch_one(&self, query: &SelectStatement) -> RbacResult<Option<QueryResult>> {
        Ok(self.db.query_one(self.backend().build(query)).await?)
    }

    async fn fetch_all(&self, query: &SelectStatement) -> RbacResult<Vec<QueryResult>> {
        Ok(self.db.query_all(self.backend().build(query)).await?)
    }

    async fn delete(&self, statement: &DeleteStatement) -> RbacResult<u64> {
        let result = self.db.execute(self.backend().build(statement)).await?;
        Ok(result.rows_affected())
    }

    /// Run an INSERT ... RETURNING id, mapping unique index violations
    async fn insert_returning_id(
        &self,
        statement: &InsertStatement,
        duplicate: impl FnOnce() -> ValidationError,
    ) -> RbacResult<i32> {
        match self.db.query_one(self.backend().build(statement)).await {
            Ok(Some(row)) => Ok(row.try_get("", columns::ID)?),
            Ok(None) => Err(RbacError::internal("insert returned no id")),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Err(duplicate().into()),
                _ => Err(err.into()),
            },
        }
    }

    fn select_roles(&self) -> SelectStatement {
        let mut query = Query::select();
        query
            .columns(
                [
                    columns::ID,
                    columns::SLUG,
                    columns::NAME,
                    columns::LEVEL,
                    columns::CONTEXT_TYPE,
                    columns::CONTEXT_ID,
                ]
                .map(|name| col_ref(ROLE, name)),
            )
            .from_as(Alias::new(&self.tables.roles), Alias::new(ROLE));
        query
    }

    fn select_permissions(&self) -> SelectStatement {
        let mut query = Query::select();
        query
            .columns(
                [
                    columns::ID,
                    columns::SLUG,
                    columns::NAME,
                    columns::CONTEXT_TYPE,
                    columns::CONTEXT_ID,
                ]
                .map(|name| col_ref(PERMISSION, name)),
            )
            .from_as(Alias::new(&self.tables.permissions), Alias::new(PERMISSION));
        query
    }

    async fn find_join<J: JoinRecord>(
        &self,
        owner_id: i32,
        target_id: i32,
        context: &Context,
    ) -> RbacResult<Option<J>> {
        let t = self.join_table(J::KIND);
        let mut query = Query::select();
        query
            .columns(
                [
                    columns::ID,
                    t.owner_fk,
                    t.target_fk,
                    columns::CONTEXT_TYPE,
                    columns::CONTEXT_ID,
                ]
                .map(Alias::new),
            )
            .from(Alias::new(t.table))
            .cond_where(slot_condition(&t, owner_id, target_id, context.to_ref().as_ref()))
            .limit(1);

        self.fetch_one(&query)
            .await?
            .map(|row| join_from_row::<J>(&row, &t))
            .transpose()
    }

    /// Existing row in the same uniqueness slot, comparing types case-insensitively
    async fn join_conflict<J: JoinRecord>(&self, t: &JoinTable<'_>, join: &J) -> RbacResult<bool> {
        let mut query = Query::select();
        query
            .column(Alias::new(columns::ID))
            .from(Alias::new(t.table))
            .cond_where(slot_condition(t, join.owner_id(), join.target_id(), join.scope()))
            .limit(1);
        Ok(self.fetch_one(&query).await?.is_some())
    }

    async fn insert_join<J: JoinRecord>(&self, join: J) -> RbacResult<J> {
        join.validate()?;
        let t = self.join_table(J::KIND);
        if self.join_conflict(&t, &join).await? {
            return Err(join.duplicate_error().into());
        }

        let (context_type, context_id) = join.context().columns();
        let values: Vec<SimpleExpr> = vec![
            join.owner_id().into(),
            join.target_id().into(),
            context_type.into(),
            context_id.into(),
        ];

        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(t.table))
            .columns([t.owner_fk, t.target_fk, columns::CONTEXT_TYPE, columns::CONTEXT_ID].map(Alias::new))
            .values(values)
            .map_err(|e| RbacError::internal(e.to_string()))?
            .returning_col(Alias::new(columns::ID));

        let id = self
            .insert_returning_id(&insert, || join.duplicate_error())
            .await?;
        debug!("Inserted {} {} ({})", J::ENTITY, id, join.key_description());

        Ok(J::from_parts(
            id,
            join.owner_id(),
            join.target_id(),
            join.scope().cloned(),
        ))
    }

    async fn delete_join(&self, kind: JoinKind, id: i32) -> RbacResult<bool> {
        let t = self.join_table(kind);
        let statement = Query::delete()
            .from_table(Alias::new(t.table))
            .cond_where(column(None, columns::ID).eq(id))
            .to_owned();
        Ok(self.delete(&statement).await? > 0)
    }

    async fn catalog_row_exists(&self, table: &str, slug: &str, context: &Context) -> RbacResult<bool> {
        let mut query = Query::select();
        query
            .column(Alias::new(columns::ID))
            .from(Alias::new(table))
            .cond_where(
                Cond::all()
                    .add(column(None, columns::SLUG).eq(slug))
                    .add(context_condition(None, &ContextFilter::Exact(context.clone()))),
            )
            .limit(1);
        Ok(self.fetch_one(&query).await?.is_some())
    }

    /// Delete rows of several tables in one transaction
    async fn delete_in_transaction(&self, statements: Vec<DeleteStatement>) -> RbacResult<Vec<u64>> {
        let backend = self.backend();
        let txn = self.db.begin().await?;
        let mut affected = Vec::with_capacity(statements.len());
        for statement in &statements {
            affected.push(txn.execute(backend.build(statement)).await?.rows_affected());
        }
        txn.commit().await?;
        Ok(affected)
    }
}

fn col_ref(table: &str, name: &str) -> (Alias, Alias) {
    (Alias::new(table), Alias::new(name))
}

fn column(table: Option<&str>, name: &str) -> Expr {
    match table {
        Some(table) => Expr::col(col_ref(table, name)),
        None => Expr::col(Alias::new(name)),
    }
}

fn column_match<V: Into<SimpleExpr>>(table: Option<&str>, name: &str, predicate: ColumnMatch<V>) -> Condition {
    match predicate {
        ColumnMatch::Equals(value) => Cond::all().add(column(table, name).eq(value)),
        ColumnMatch::IsNull => Cond::all().add(column(table, name).is_null()),
        ColumnMatch::NullOrEquals(value) => Cond::any()
            .add(column(table, name).is_null())
            .add(column(table, name).eq(value)),
    }
}

fn context_condition(table: Option<&str>, filter: &ContextFilter) -> Condition {
    let (type_match, id_match) = filter.predicates();
    Cond::all()
        .add(column_match(table, columns::CONTEXT_TYPE, type_match))
        .add(column_match(table, columns::CONTEXT_ID, id_match))
}

/// Uniqueness slot of a join row, comparing context types case-insensitively
fn slot_condition(t: &JoinTable<'_>, owner_id: i32, target_id: i32, scope: Option<&ContextRef>) -> Condition {
    let keys = Cond::all()
        .add(column(None, t.owner_fk).eq(owner_id))
        .add(column(None, t.target_fk).eq(target_id));

    match scope {
        None => keys.add(context_condition(None, &ContextFilter::Exact(Context::Global))),
        Some(scope) => keys
            .add(
                Expr::expr(Func::lower(column(None, columns::CONTEXT_TYPE)))
                    .eq(scope.context_type.to_lowercase()),
            )
            .add(column_match(
                None,
                columns::CONTEXT_ID,
                ColumnMatch::is_or_equal(scope.context_id),
            )),
    }
}

fn scope_from_row(row: &QueryResult) -> RbacResult<Option<ContextRef>> {
    ContextRef::from_columns(
        row.try_get("", columns::CONTEXT_TYPE)?,
        row.try_get("", columns::CONTEXT_ID)?,
    )
}

fn role_from_row(row: &QueryResult) -> RbacResult<Role> {
    Ok(Role {
        id: row.try_get("", columns::ID)?,
        slug: row.try_get("", columns::SLUG)?,
        name: row.try_get("", columns::NAME)?,
        level: row.try_get("", columns::LEVEL)?,
        scope: scope_from_row(row)?,
    })
}

fn permission_from_row(row: &QueryResult) -> RbacResult<Permission> {
    Ok(Permission {
        id: row.try_get("", columns::ID)?,
        slug: row.try_get("", columns::SLUG)?,
        name: row.try_get("", columns::NAME)?,
        scope: scope_from_row(row)?,
    })
}

fn join_from_row<J: JoinRecord>(row: &QueryResult, t: &JoinTable<'_>) -> RbacResult<J> {
    Ok(J::from_parts(
        row.try_get("", columns::ID)?,
        row.try_get("", t.owner_fk)?,
        row.try_get("", t.target_fk)?,
        scope_from_row(row)?,
    ))
}

#[async_trait]
impl AuthStore for SeaOrmStore {
    async fn insert_role(&self, role: NewRole) -> RbacResult<Role> {
        role.validate()?;
        let duplicate = || ValidationError::Duplicate {
            entity: "Role",
            key: format!("slug={}, context={}", role.slug, role.context),
        };
        if self
            .catalog_row_exists(&self.tables.roles, &role.slug, &role.context)
            .await?
        {
            return Err(duplicate().into());
        }

        let (context_type, context_id) = role.context.columns();
        let values: Vec<SimpleExpr> = vec![
            role.slug.clone().into(),
            role.name.clone().into(),
            role.level.into(),
            context_type.into(),
            context_id.into(),
        ];

        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(&self.tables.roles))
            .columns(
                [
                    columns::SLUG,
                    columns::NAME,
                    columns::LEVEL,
                    columns::CONTEXT_TYPE,
                    columns::CONTEXT_ID,
                ]
                .map(Alias::new),
            )
            .values(values)
            .map_err(|e| RbacError::internal(e.to_string()))?
            .returning_col(Alias::new(columns::ID));

        let id = self.insert_returning_id(&insert, duplicate).await?;
        info!("Created role '{}' (id {}, level {}) in {}", role.slug, id, role.level, role.context);

        Ok(Role {
            id,
            scope: role.context.to_ref(),
            slug: role.slug,
            name: role.name,
            level: role.level,
        })
    }

    async fn role_by_id(&self, id: i32) -> RbacResult<Option<Role>> {
        let mut query = self.select_roles();
        query.cond_where(column(Some(ROLE), columns::ID).eq(id));
        self.fetch_one(&query).await?.map(|row| role_from_row(&row)).transpose()
    }

    async fn find_role(&self, slug: &str, context: &Context) -> RbacResult<Option<Role>> {
        let mut query = self.select_roles();
        query
            .cond_where(
                Cond::all()
                    .add(column(Some(ROLE), columns::SLUG).eq(slug))
                    .add(context_condition(Some(ROLE), &ContextFilter::Exact(context.clone()))),
            )
            .limit(1);
        self.fetch_one(&query).await?.map(|row| role_from_row(&row)).transpose()
    }

    async fn delete_role(&self, id: i32) -> RbacResult<bool> {
        let t = &self.tables;
        let affected = self
            .delete_in_transaction(vec![
                Query::delete()
                    .from_table(Alias::new(&t.role_subjects))
                    .cond_where(column(None, &t.role_fk).eq(id))
                    .to_owned(),
                Query::delete()
                    .from_table(Alias::new(&t.permission_roles))
                    .cond_where(column(None, &t.role_fk).eq(id))
                    .to_owned(),
                Query::delete()
                    .from_table(Alias::new(&t.roles))
                    .cond_where(column(None, columns::ID).eq(id))
                    .to_owned(),
            ])
            .await?;

        debug!(
            "Deleted role {} with {} assignments and {} permission grants",
            id, affected[0], affected[1]
        );
        Ok(affected[2] > 0)
    }

    async fn insert_permission(&self, permission: NewPermission) -> RbacResult<Permission> {
        permission.validate()?;
        let duplicate = || ValidationError::Duplicate {
            entity: "Permission",
            key: format!("slug={}, context={}", permission.slug, permission.context),
        };
        if self
            .catalog_row_exists(&self.tables.permissions, &permission.slug, &permission.context)
            .await?
        {
            return Err(duplicate().into());
        }

        let (context_type, context_id) = permission.context.columns();
        let values: Vec<SimpleExpr> = vec![
            permission.slug.clone().into(),
            permission.name.clone().into(),
            context_type.into(),
            context_id.into(),
        ];

        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(&self.tables.permissions))
            .columns(
                [
                    columns::SLUG,
                    columns::NAME,
                    columns::CONTEXT_TYPE,
                    columns::CONTEXT_ID,
                ]
                .map(Alias::new),
            )
            .values(values)
            .map_err(|e| RbacError::internal(e.to_string()))?
            .returning_col(Alias::new(columns::ID));

        let id = self.insert_returning_id(&insert, duplicate).await?;
        info!("Created permission '{}' (id {}) in {}", permission.slug, id, permission.context);

        Ok(Permission {
            id,
            scope: permission.context.to_ref(),
            slug: permission.slug,
            name: permission.name,
        })
    }

    async fn permission_by_id(&self, id: i32) -> RbacResult<Option<Permission>> {
        let mut query = self.select_permissions();
        query.cond_where(column(Some(PERMISSION), columns::ID).eq(id));
        self.fetch_one(&query)
            .await?
            .map(|row| permission_from_row(&row))
            .transpose()
    }

    async fn find_permission(&self, slug: &str, context: &Context) -> RbacResult<Option<Permission>> {
        let mut query = self.select_permissions();
        query
            .cond_where(
                Cond::all()
                    .add(column(Some(PERMISSION), columns::SLUG).eq(slug))
                    .add(context_condition(
                        Some(PERMISSION),
                        &ContextFilter::Exact(context.clone()),
                    )),
            )
            .limit(1);
        self.fetch_one(&query)
            .await?
            .map(|row| permission_from_row(&row))
            .transpose()
    }

    async fn delete_permission(&self, id: i32) -> RbacResult<bool> {
        let t = &self.tables;
        let affected = self
            .delete_in_transaction(vec![
                Query::delete()
                    .from_table(Alias::new(&t.permission_subjects))
                    .cond_where(column(None, &t.permission_fk).eq(id))
                    .to_owned(),
                Query::delete()
                    .from_table(Alias::new(&t.permission_roles))
                    .cond_where(column(None, &t.permission_fk).eq(id))
                    .to_owned(),
                Query::delete()
                    .from_table(Alias::new(&t.permissions))
                    .cond_where(column(None, columns::ID).eq(id))
                    .to_owned(),
            ])
            .await?;
        Ok(affected[2] > 0)
    }

    async fn delete_subject(&self, subject_id: i32) -> RbacResult<u64> {
        let t = &self.tables;
        let affected = self
            .delete_in_transaction(vec![
                Query::delete()
                    .from_table(Alias::new(&t.role_subjects))
                    .cond_where(column(None, &t.subject_fk).eq(subject_id))
                    .to_owned(),
                Query::delete()
                    .from_table(Alias::new(&t.permission_subjects))
                    .cond_where(column(None, &t.subject_fk).eq(subject_id))
                    .to_owned(),
            ])
            .await?;
        Ok(affected.iter().sum())
    }

    async fn find_role_subject(
        &self,
        subject_id: i32,
        role_id: i32,
        context: &Context,
    ) -> RbacResult<Option<RoleSubject>> {
        self.find_join(subject_id, role_id, context).await
    }

    async fn insert_role_subject(&self, join: RoleSubject) -> RbacResult<RoleSubject> {
        self.insert_join(join).await
    }

    async fn delete_role_subject(&self, id: i32) -> RbacResult<bool> {
        self.delete_join(JoinKind::RoleSubject, id).await
    }

    async fn find_permission_subject(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<Option<PermissionSubject>> {
        self.find_join(subject_id, permission_id, context).await
    }

    async fn insert_permission_subject(&self, join: PermissionSubject) -> RbacResult<PermissionSubject> {
        self.insert_join(join).await
    }

    async fn delete_permission_subject(&self, id: i32) -> RbacResult<bool> {
        self.delete_join(JoinKind::PermissionSubject, id).await
    }

    async fn find_permission_role(
        &self,
        role_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<Option<PermissionRole>> {
        self.find_join(role_id, permission_id, context).await
    }

    async fn insert_permission_role(&self, join: PermissionRole) -> RbacResult<PermissionRole> {
        self.insert_join(join).await
    }

    async fn delete_permission_role(&self, id: i32) -> RbacResult<bool> {
        self.delete_join(JoinKind::PermissionRole, id).await
    }

    async fn subject_roles(
        &self,
        subject_id: i32,
        filter: &ContextFilter,
        limit: Option<u64>,
    ) -> RbacResult<Vec<Role>> {
        let t = &self.tables;
        let mut query = self.select_roles();
        query
            .distinct()
            .join_as(
                JoinType::InnerJoin,
                Alias::new(&t.role_subjects),
                Alias::new(ROLE_SUBJECT),
                Expr::col(col_ref(ROLE_SUBJECT, &t.role_fk)).equals(col_ref(ROLE, columns::ID)),
            )
            .cond_where(
                Cond::all()
                    .add(column(Some(ROLE_SUBJECT), &t.subject_fk).eq(subject_id))
                    .add(context_condition(Some(ROLE_SUBJECT), filter)),
            )
            .order_by(col_ref(ROLE, columns::LEVEL), Order::Desc)
            .order_by(col_ref(ROLE, columns::ID), Order::Asc);
        if let Some(limit) = limit {
            query.limit(limit);
        }

        self.fetch_all(&query).await?.iter().map(role_from_row).collect()
    }

    async fn subject_has_role_level(&self, subject_id: i32, level: &LevelQuery) -> RbacResult<bool> {
        let t = &self.tables;
        let mut condition = Cond::all()
            .add(column(Some(ROLE_SUBJECT), &t.subject_fk).eq(subject_id))
            .add(context_condition(
                Some(ROLE_SUBJECT),
                &ContextFilter::Exact(level.context.clone()),
            ))
            .add(column(Some(ROLE), columns::LEVEL).gte(level.min_level));

        if let Some(scope) = &level.role_scope {
            condition = condition.add(column(Some(ROLE), columns::CONTEXT_TYPE).eq(scope.context_type.clone()));
            if let Some(id) = scope.context_id {
                condition = condition.add(column(Some(ROLE), columns::CONTEXT_ID).eq(id));
            }
        }

        let mut query = Query::select();
        query
            .column(col_ref(ROLE, columns::ID))
            .from_as(Alias::new(&t.roles), Alias::new(ROLE))
            .join_as(
                JoinType::InnerJoin,
                Alias::new(&t.role_subjects),
                Alias::new(ROLE_SUBJECT),
                Expr::col(col_ref(ROLE_SUBJECT, &t.role_fk)).equals(col_ref(ROLE, columns::ID)),
            )
            .cond_where(condition)
            .limit(1);

        Ok(self.fetch_one(&query).await?.is_some())
    }

    async fn permission_via_roles(
        &self,
        subject_id: i32,
        permission_id: i32,
        context: &Context,
    ) -> RbacResult<bool> {
        let t = &self.tables;
        let mut query = Query::select();
        query
            .column(col_ref(PERMISSION_ROLE, columns::ID))
            .from_as(Alias::new(&t.permission_roles), Alias::new(PERMISSION_ROLE))
            .join_as(
                JoinType::InnerJoin,
                Alias::new(&t.role_subjects),
                Alias::new(ROLE_SUBJECT),
                Expr::col(col_ref(ROLE_SUBJECT, &t.role_fk)).equals(col_ref(PERMISSION_ROLE, &t.role_fk)),
            )
            .cond_where(
                Cond::all()
                    .add(column(Some(ROLE_SUBJECT), &t.subject_fk).eq(subject_id))
                    .add(context_condition(
                        Some(ROLE_SUBJECT),
                        &ContextFilter::Exact(context.clone()),
                    ))
                    .add(column(Some(PERMISSION_ROLE), &t.permission_fk).eq(permission_id))
                    .add(context_condition(
                        Some(PERMISSION_ROLE),
                        &ContextFilter::NullOrEqual(context.clone()),
                    )),
            )
            .limit(1);

        Ok(self.fetch_one(&query).await?.is_some())
    }

    async fn subject_permissions(
        &self,
        subject_id: i32,
        role_ids: &[i32],
        filter: &ContextFilter,
    ) -> RbacResult<Vec<Permission>> {
        let t = &self.tables;

        let mut granted = Cond::any().add(
            Cond::all()
                .add(column(Some(PERMISSION_SUBJECT), &t.subject_fk).eq(subject_id))
                .add(context_condition(Some(PERMISSION_SUBJECT), filter)),
        );
        if !role_ids.is_empty() {
            granted = granted.add(
                Cond::all()
                    .add(column(Some(PERMISSION_ROLE), &t.role_fk).is_in(role_ids.iter().copied()))
                    .add(context_condition(Some(PERMISSION_ROLE), filter)),
            );
        }

        let mut query = self.select_permissions();
        query
            .distinct()
            .join_as(
                JoinType::LeftJoin,
                Alias::new(&t.permission_subjects),
                Alias::new(PERMISSION_SUBJECT),
                Expr::col(col_ref(PERMISSION_SUBJECT, &t.permission_fk))
                    .equals(col_ref(PERMISSION, columns::ID)),
            )
            .join_as(
                JoinType::LeftJoin,
                Alias::new(&t.permission_roles),
                Alias::new(PERMISSION_ROLE),
                Expr::col(col_ref(PERMISSION_ROLE, &t.permission_fk))
                    .equals(col_ref(PERMISSION, columns::ID)),
            )
            .cond_where(granted)
            .order_by(col_ref(PERMISSION, columns::ID), Order::Asc);

        self.fetch_all(&query)
            .await?
            .iter()
            .map(permission_from_row)
            .collect()
    }

    async fn role_permissions(&self, role_id: i32, filter: &ContextFilter) -> RbacResult<Vec<Permission>> {
        let t = &self.tables;
        let mut query = self.select_permissions();
        query
            .distinct()
            .join_as(
                JoinType::InnerJoin,
                Alias::new(&t.permission_roles),
                Alias::new(PERMISSION_ROLE),
                Expr::col(col_ref(PERMISSION_ROLE, &t.permission_fk))
                    .equals(col_ref(PERMISSION, columns::ID)),
            )
            .cond_where(
                Cond::all()
                    .add(column(Some(PERMISSION_ROLE), &t.role_fk).eq(role_id))
                    .add(context_condition(Some(PERMISSION_ROLE), filter)),
            )
            .order_by(col_ref(PERMISSION, columns::ID), Order::Asc);

        self.fetch_all(&query)
            .await?
            .iter()
            .map(permission_from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_store() -> SeaOrmStore {
        SeaOrmStore::new(DatabaseConnection::Disconnected, TableNames::default())
    }

    #[test]
    fn test_context_condition_sql() {
        let store = sqlite_store();
        let mut query = store.select_roles();
        query.cond_where(context_condition(
            Some(ROLE),
            &ContextFilter::NullOrEqual(Context::instance("Post", 42)),
        ));

        let sql = DbBackend::Sqlite.build(&query).to_string();
        assert!(sql.contains("FROM \"roles\" AS \"r\""));
        assert!(sql.contains("\"r\".\"context_type\" IS NULL OR \"r\".\"context_type\" = 'Post'"));
        assert!(sql.contains("\"r\".\"context_id\" IS NULL OR \"r\".\"context_id\" = 42"));
    }

    #[test]
    fn test_exact_global_condition_sql() {
        let mut query = Query::select();
        query
            .column(Alias::new(columns::ID))
            .from(Alias::new("role_users"))
            .cond_where(context_condition(None, &ContextFilter::Exact(Context::Global)));

        let sql = DbBackend::Postgres.build(&query).to_string();
        assert!(sql.contains("\"context_type\" IS NULL"));
        assert!(sql.contains("\"context_id\" IS NULL"));
        assert!(!sql.contains(" OR "));
    }

    #[test]
    fn test_join_tables_follow_entity_names() {
        let store = sqlite_store();
        let t = store.join_table(JoinKind::PermissionRole);
        assert_eq!(t.table, "permission_roles");
        assert_eq!(t.owner_fk, "role_id");
        assert_eq!(t.target_fk, "permission_id");

        let t = store.join_table(JoinKind::RoleSubject);
        assert_eq!(t.table, "role_users");
        assert_eq!(t.owner_fk, "user_id");
    }

    #[test]
    fn test_slot_condition_lowers_context_type() {
        let store = sqlite_store();
        let t = store.join_table(JoinKind::RoleSubject);
        let scope = Context::instance("Post", 42).to_ref();

        let mut query = Query::select();
        query
            .column(Alias::new(columns::ID))
            .from(Alias::new(t.table))
            .cond_where(slot_condition(&t, 1, 2, scope.as_ref()));

        let sql = DbBackend::Sqlite.build(&query).to_string();
        assert!(sql.contains("LOWER(\"context_type\") = 'post'"));
        assert!(sql.contains("\"context_id\" = 42"));
        assert!(sql.contains("\"user_id\" = 1"));
    }
}
