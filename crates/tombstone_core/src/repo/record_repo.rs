//! Record repository: the read/aggregate/bulk-delete façade.
//!
//! # Responsibility
//! - Decide, per call, whether the deletion filter applies.
//! - Build SELECT/UPDATE/DELETE statements from entity metadata and the
//!   active scope.
//! - Keep SQL details inside this boundary.
//!
//! # Invariants
//! - One reference timestamp per filtered call, captured at entry and
//!   shared by every composed predicate.
//! - `*_with_deleted` variants never consult the scope engine.
//! - Identifier lookups fail with NotFound when any requested id resolves
//!   to no row under the active filter.

use crate::db::{now_epoch_ms, DbError};
use crate::model::record::{Record, RecordError};
use crate::schema::entity::{EntityDef, SchemaError};
use crate::schema::registry::SchemaRegistry;
use crate::scope::include::{
    collect_include_joins, compose_include_scope, IncludeSpec, JoinClause, ScopedQuery,
};
use crate::scope::predicate::SqlCondition;
use crate::scope::query_scope::{QueryScope, ScopeFrame};
use crate::scope::ScopeError;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from repository operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Schema(SchemaError),
    Scope(ScopeError),
    Record(RecordError),
    /// A requested identifier matched no row under the active filter.
    NotFound { entity: String, id: Value },
    /// The entity's backing table does not exist on this connection;
    /// `SchemaRegistry::install_schema` has not run.
    MissingTable { entity: String, table: String },
    /// An aggregate or persisted value cannot be used as requested.
    InvalidData(String),
    /// A column name was referenced that the entity does not declare.
    UnknownColumn { entity: String, column: String },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Scope(err) => write!(f, "{err}"),
            Self::Record(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => {
                write!(f, "record of entity `{entity}` not found: {id:?}")
            }
            Self::MissingTable { entity, table } => write!(
                f,
                "entity `{entity}` requires table `{table}`; install the schema first"
            ),
            Self::InvalidData(message) => write!(f, "invalid data: {message}"),
            Self::UnknownColumn { entity, column } => {
                write!(f, "unknown column `{column}` on entity `{entity}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::Scope(err) => Some(err),
            Self::Record(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaError> for RepoError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<ScopeError> for RepoError {
    fn from(value: ScopeError) -> Self {
        Self::Scope(value)
    }
}

impl From<RecordError> for RepoError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

/// Shape of one read call.
#[derive(Debug, Clone, PartialEq)]
pub enum FindKind {
    /// At most one record.
    First,
    /// Every matching record.
    All,
    /// Exactly the listed identifiers; NotFound when any is absent.
    Ids(Vec<Value>),
}

/// Read/aggregate options.
///
/// `conditions`, `order`, `limit`, and `offset` pass through to the SQL
/// layer unchanged.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Bypass the deletion filter entirely.
    pub with_deleted: bool,
    /// Eager-load specification; included paranoid associations get
    /// their own deletion predicates.
    pub include: Option<IncludeSpec>,
    pub conditions: Option<SqlCondition>,
    pub order: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl FindOptions {
    pub fn with_deleted() -> Self {
        Self {
            with_deleted: true,
            ..Self::default()
        }
    }

    pub fn including(spec: IncludeSpec) -> Self {
        Self {
            include: Some(spec),
            ..Self::default()
        }
    }

    pub fn filtered(conditions: SqlCondition) -> Self {
        Self {
            conditions: Some(conditions),
            ..Self::default()
        }
    }
}

/// Aggregate kinds accepted by `calculate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn sql_fn(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// SQLite-backed repository for one registered entity type.
pub struct RecordRepository<'a> {
    conn: &'a Connection,
    registry: &'a SchemaRegistry,
    entity: &'a EntityDef,
}

impl<'a> RecordRepository<'a> {
    /// Creates a repository after checking the entity is registered and
    /// its backing table exists.
    pub fn try_new(
        conn: &'a Connection,
        registry: &'a SchemaRegistry,
        entity_name: &str,
    ) -> RepoResult<Self> {
        let entity = registry.require(entity_name)?;
        let table_present: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [&entity.table],
            |row| row.get(0),
        )?;
        if table_present == 0 {
            return Err(RepoError::MissingTable {
                entity: entity.name.clone(),
                table: entity.table.clone(),
            });
        }
        Ok(Self {
            conn,
            registry,
            entity,
        })
    }

    pub fn entity(&self) -> &EntityDef {
        self.entity
    }

    pub(crate) fn connection(&self) -> &Connection {
        self.conn
    }

    /// Reads records under the default deletion filter.
    ///
    /// `options.with_deleted` short-circuits to `find_with_deleted`.
    pub fn find(&self, kind: &FindKind, options: &FindOptions) -> RepoResult<Vec<Record>> {
        if options.with_deleted {
            return self.find_with_deleted(kind, options);
        }
        self.run_scoped(options.include.as_ref(), |repo, scope| {
            repo.fetch(scope, kind, options)
        })
    }

    /// Reads records with no deletion filtering.
    pub fn find_with_deleted(
        &self,
        kind: &FindKind,
        options: &FindOptions,
    ) -> RepoResult<Vec<Record>> {
        let mut scope = QueryScope::new();
        self.fetch(&mut scope, kind, options)
    }

    /// Returns whether any row matches under the default filter.
    pub fn exists(&self, options: &FindOptions) -> RepoResult<bool> {
        if options.with_deleted {
            return self.exists_with_deleted(options);
        }
        self.run_scoped(options.include.as_ref(), |repo, scope| {
            repo.probe_exists(scope, options)
        })
    }

    /// Returns whether any row matches, deleted rows included.
    pub fn exists_with_deleted(&self, options: &FindOptions) -> RepoResult<bool> {
        let mut scope = QueryScope::new();
        self.probe_exists(&mut scope, options)
    }

    /// Counts rows under the default filter.
    pub fn count(&self, options: &FindOptions) -> RepoResult<i64> {
        match self.calculate(Aggregate::Count, None, options)? {
            Value::Integer(count) => Ok(count),
            other => Err(RepoError::InvalidData(format!(
                "count returned a non-integer value: {other:?}"
            ))),
        }
    }

    /// Counts rows, deleted rows included.
    pub fn count_with_deleted(&self, options: &FindOptions) -> RepoResult<i64> {
        match self.calculate_with_deleted(Aggregate::Count, None, options)? {
            Value::Integer(count) => Ok(count),
            other => Err(RepoError::InvalidData(format!(
                "count returned a non-integer value: {other:?}"
            ))),
        }
    }

    /// Runs one aggregate under the default filter.
    ///
    /// `column` is required for every aggregate except `Count`.
    pub fn calculate(
        &self,
        aggregate: Aggregate,
        column: Option<&str>,
        options: &FindOptions,
    ) -> RepoResult<Value> {
        if options.with_deleted {
            return self.calculate_with_deleted(aggregate, column, options);
        }
        let expression = self.aggregate_expression(aggregate, column, options)?;
        self.run_scoped(options.include.as_ref(), move |repo, scope| {
            repo.run_aggregate(scope, &expression, options)
        })
    }

    /// Runs one aggregate with no deletion filtering.
    pub fn calculate_with_deleted(
        &self,
        aggregate: Aggregate,
        column: Option<&str>,
        options: &FindOptions,
    ) -> RepoResult<Value> {
        let expression = self.aggregate_expression(aggregate, column, options)?;
        let mut scope = QueryScope::new();
        self.run_aggregate(&mut scope, &expression, options)
    }

    /// Bulk soft delete: stamps the deletion attribute on every row
    /// matching `conditions` without removing anything.
    ///
    /// Falls back to physical deletion when the entity is not paranoid.
    pub fn delete_all(&self, conditions: Option<&SqlCondition>) -> RepoResult<usize> {
        let Some(attribute) = self.entity.deleted_attribute.as_deref() else {
            return self.delete_all_hard(conditions);
        };
        if self.entity.column(attribute).is_none() {
            return Err(ScopeError::MissingDeletionColumn {
                entity: self.entity.name.clone(),
                attribute: attribute.to_string(),
            }
            .into());
        }

        let mut sql = format!(
            "UPDATE \"{}\" SET \"{attribute}\" = ?",
            self.entity.table
        );
        let mut params = vec![Value::Integer(now_epoch_ms())];
        if let Some(conditions) = conditions {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.sql);
            params.extend(conditions.params.iter().cloned());
        }
        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        info!(
            "event=bulk_soft_delete module=repo status=ok entity={} rows={changed}",
            self.entity.name
        );
        Ok(changed)
    }

    /// Bulk physical delete, bypassing soft-delete semantics entirely.
    pub fn delete_all_hard(&self, conditions: Option<&SqlCondition>) -> RepoResult<usize> {
        let mut sql = format!("DELETE FROM \"{}\"", self.entity.table);
        let mut params = Vec::new();
        if let Some(conditions) = conditions {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.sql);
            params.extend(conditions.params.iter().cloned());
        }
        let changed = self.conn.execute(&sql, params_from_iter(params))?;
        info!(
            "event=bulk_hard_delete module=repo status=ok entity={} rows={changed}",
            self.entity.name
        );
        Ok(changed)
    }

    /// Inserts one record's declared columns.
    pub fn insert(&self, record: &Record) -> RepoResult<()> {
        let columns = self
            .entity
            .columns
            .iter()
            .map(|column| format!("\"{}\"", column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; self.entity.columns.len()].join(", ");
        let params = self
            .entity
            .columns
            .iter()
            .map(|column| record.get(&column.name).clone());
        self.conn.execute(
            &format!(
                "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders});",
                self.entity.table
            ),
            params_from_iter(params),
        )?;
        Ok(())
    }

    /// Persists every non-key column of `record` by primary key.
    pub fn update(&self, record: &Record) -> RepoResult<()> {
        let id = record.id(self.entity).clone();
        if matches!(id, Value::Null) {
            return Err(RepoError::InvalidData(format!(
                "cannot update entity `{}` without a primary key value",
                self.entity.name
            )));
        }

        let assignments = self
            .entity
            .columns
            .iter()
            .filter(|column| column.name != self.entity.primary_key)
            .map(|column| format!("\"{}\" = ?", column.name))
            .collect::<Vec<_>>()
            .join(", ");
        if assignments.is_empty() {
            return Ok(());
        }
        let mut params: Vec<Value> = self
            .entity
            .columns
            .iter()
            .filter(|column| column.name != self.entity.primary_key)
            .map(|column| record.get(&column.name).clone())
            .collect();
        params.push(id.clone());

        let changed = self.conn.execute(
            &format!(
                "UPDATE \"{}\" SET {assignments} WHERE \"{}\" = ?;",
                self.entity.table, self.entity.primary_key
            ),
            params_from_iter(params),
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: self.entity.name.clone(),
                id,
            });
        }
        Ok(())
    }

    /// Establishes the entity's deletion scope (and any include scope)
    /// around `run`.
    ///
    /// The root predicate applies only when the capability registry marks
    /// the root paranoid; included associations are scoped per their own
    /// targets either way. One timestamp is captured here and shared by
    /// every frame composed for this call.
    fn run_scoped<'s, T: 's>(
        &'s self,
        include: Option<&IncludeSpec>,
        run: impl FnOnce(&'s Self, &mut QueryScope) -> RepoResult<T> + 's,
    ) -> RepoResult<T> {
        let reference_ms = now_epoch_ms();
        let inner: ScopedQuery<'s, T, RepoError> = Box::new(move |scope| run(self, scope));
        let composed = match include {
            Some(spec) => {
                compose_include_scope(self.registry, self.entity, spec, reference_ms, inner)?
            }
            None => inner,
        };

        let mut scope = QueryScope::new();
        if self.entity.is_paranoid() {
            let root_frame = ScopeFrame::exclude_deleted(self.entity, reference_ms)?;
            scope.enter(root_frame, composed)
        } else {
            composed(&mut scope)
        }
    }

    fn fetch(
        &self,
        scope: &mut QueryScope,
        kind: &FindKind,
        options: &FindOptions,
    ) -> RepoResult<Vec<Record>> {
        let joins = self.joins_for(options)?;
        let qualified_pk = format!("\"{}\".\"{}\"", self.entity.table, self.entity.primary_key);

        let select_list = self
            .entity
            .columns
            .iter()
            .map(|column| format!("\"{}\".\"{}\"", self.entity.table, column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let distinct = if joins.is_empty() { "" } else { "DISTINCT " };
        let mut sql = format!(
            "SELECT {distinct}{select_list} FROM \"{}\"",
            self.entity.table
        );
        for join in &joins {
            sql.push(' ');
            sql.push_str(&join.sql);
        }

        let mut clauses = Vec::new();
        let mut params = Vec::new();
        self.collect_filters(scope, options, &mut clauses, &mut params);
        if let FindKind::Ids(ids) = kind {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            clauses.push(format!("{qualified_pk} IN ({placeholders})"));
            params.extend(ids.iter().cloned());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        match &options.order {
            Some(order) => {
                sql.push_str(" ORDER BY ");
                sql.push_str(order);
            }
            None => {
                sql.push_str(" ORDER BY ");
                sql.push_str(&qualified_pk);
                sql.push_str(" ASC");
            }
        }

        match kind {
            FindKind::First => sql.push_str(" LIMIT 1"),
            FindKind::All | FindKind::Ids(_) => {
                if let Some(limit) = options.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                    if options.offset > 0 {
                        sql.push_str(&format!(" OFFSET {}", options.offset));
                    }
                } else if options.offset > 0 {
                    sql.push_str(&format!(" LIMIT -1 OFFSET {}", options.offset));
                }
            }
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = BTreeMap::new();
            for (index, column) in self.entity.columns.iter().enumerate() {
                values.insert(column.name.clone(), row.get::<_, Value>(index)?);
            }
            records.push(Record::from_values(self.entity, values));
        }

        if let FindKind::Ids(ids) = kind {
            self.require_all_ids(&records, ids)?;
        }
        Ok(records)
    }

    fn probe_exists(&self, scope: &mut QueryScope, options: &FindOptions) -> RepoResult<bool> {
        let joins = self.joins_for(options)?;
        let mut sql = format!("SELECT 1 FROM \"{}\"", self.entity.table);
        for join in &joins {
            sql.push(' ');
            sql.push_str(&join.sql);
        }
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        self.collect_filters(scope, options, &mut clauses, &mut params);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let found: i64 = self.conn.query_row(
            &format!("SELECT EXISTS({sql});"),
            params_from_iter(params),
            |row| row.get(0),
        )?;
        Ok(found == 1)
    }

    fn run_aggregate(
        &self,
        scope: &mut QueryScope,
        expression: &str,
        options: &FindOptions,
    ) -> RepoResult<Value> {
        let joins = self.joins_for(options)?;
        let mut sql = format!("SELECT {expression} FROM \"{}\"", self.entity.table);
        for join in &joins {
            sql.push(' ');
            sql.push_str(&join.sql);
        }
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        self.collect_filters(scope, options, &mut clauses, &mut params);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let value = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| {
                row.get::<_, Value>(0)
            })?;
        Ok(value)
    }

    fn aggregate_expression(
        &self,
        aggregate: Aggregate,
        column: Option<&str>,
        options: &FindOptions,
    ) -> RepoResult<String> {
        if aggregate == Aggregate::Count {
            // Joined reads can multiply root rows; count distinct keys.
            return Ok(if options.include.is_some() {
                format!(
                    "COUNT(DISTINCT \"{}\".\"{}\")",
                    self.entity.table, self.entity.primary_key
                )
            } else {
                "COUNT(*)".to_string()
            });
        }

        let column = column.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "aggregate {}(...) requires a column",
                aggregate.sql_fn()
            ))
        })?;
        if self.entity.column(column).is_none() {
            return Err(RepoError::UnknownColumn {
                entity: self.entity.name.clone(),
                column: column.to_string(),
            });
        }
        Ok(format!(
            "{}(\"{}\".\"{column}\")",
            aggregate.sql_fn(),
            self.entity.table
        ))
    }

    fn joins_for(&self, options: &FindOptions) -> RepoResult<Vec<JoinClause>> {
        match &options.include {
            Some(spec) => Ok(collect_include_joins(self.registry, self.entity, spec)?),
            None => Ok(Vec::new()),
        }
    }

    fn collect_filters(
        &self,
        scope: &QueryScope,
        options: &FindOptions,
        clauses: &mut Vec<String>,
        params: &mut Vec<Value>,
    ) {
        for condition in scope.conditions() {
            clauses.push(condition.sql.clone());
            params.extend(condition.params.iter().cloned());
        }
        if let Some(conditions) = &options.conditions {
            clauses.push(format!("({})", conditions.sql));
            params.extend(conditions.params.iter().cloned());
        }
    }

    fn require_all_ids(&self, records: &[Record], ids: &[Value]) -> RepoResult<()> {
        for id in ids {
            let found = records
                .iter()
                .any(|record| record.id(self.entity) == id);
            if !found {
                return Err(RepoError::NotFound {
                    entity: self.entity.name.clone(),
                    id: id.clone(),
                });
            }
        }
        Ok(())
    }
}
