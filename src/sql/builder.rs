//! Renders a compiled plan to one parameterized PostgreSQL SELECT.
//!
//! Identifiers come from the catalog only and are always quoted; every value becomes a bind
//! parameter. Relation plans become correlated scalar subqueries returning JSON, relation
//! filters become `EXISTS` / `NOT EXISTS` semi-joins.

use crate::config::{FieldType, Relation, ResourceCatalog, ResourceType, Through};
use crate::error::ConfigError;
use crate::query::{ClauseKind, CompiledWhereClause, FieldRef, FieldScope, JoinKind, Operand, QueryPlan, RawPredicate};
use crate::sql::params::PgBindValue;
use std::collections::BTreeMap;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Escape `%`, `_` and the escape character itself for use inside an ILIKE pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Returns the placeholder for the pushed value.
    fn push_param(&mut self, v: PgBindValue) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }

    /// Bind every parameter to a sqlx query over `self.sql`.
    pub fn query(&self) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, p| query.bind(p.clone()))
    }
}

/// One table scope of the rendered statement.
struct Level<'a> {
    resource: &'a ResourceType,
    alias: String,
    depth: usize,
    via: Option<&'a Relation>,
}

impl<'a> Level<'a> {
    fn through(&self) -> Option<&'a Through> {
        self.via.and_then(|r| r.through.as_ref())
    }

    fn link_alias(&self) -> String {
        format!("{}_link", self.alias)
    }

    fn join_alias(&self, relation: &str) -> String {
        format!("{}_{}", self.alias, relation)
    }

    fn column(&self, field: &FieldRef) -> String {
        let table = match &field.scope {
            FieldScope::Resource => self.alias.clone(),
            FieldScope::Through => self.link_alias(),
            FieldScope::Relation(rel) => self.join_alias(rel),
        };
        format!("{}.{}", table, quoted(&field.name))
    }

    /// `FROM` target including the link table, if this level is reached through one.
    fn from(&self) -> String {
        let r = self.resource;
        let mut from = format!("{} {}", qualified_table(&r.schema, &r.table), self.alias);
        if let (Some(rel), Some(t)) = (self.via, self.through()) {
            from.push_str(&format!(
                " JOIN {} {} ON {}.{} = {}.{}",
                qualified_table(&r.schema, &t.table),
                self.link_alias(),
                self.link_alias(),
                quoted(&t.target_key),
                self.alias,
                quoted(&rel.target_key)
            ));
        }
        from
    }

    /// Condition tying this level's rows to a row of `parent`.
    fn correlate(&self, parent: &Level<'_>) -> String {
        match (self.via, self.through()) {
            (Some(rel), Some(t)) => format!(
                "{}.{} = {}.{}",
                self.link_alias(),
                quoted(&t.source_key),
                parent.alias,
                quoted(&rel.source_key)
            ),
            (Some(rel), None) => format!(
                "{}.{} = {}.{}",
                self.alias,
                quoted(&rel.target_key),
                parent.alias,
                quoted(&rel.source_key)
            ),
            (None, _) => "TRUE".to_string(),
        }
    }
}

/// Render a list (or single-item) plan.
pub fn select(catalog: &ResourceCatalog, plan: &QueryPlan) -> Result<QueryBuf, ConfigError> {
    render(catalog, plan, None)
}

/// Render a single-item plan restricted to the row whose id equals `id`.
pub fn select_by_id(catalog: &ResourceCatalog, plan: &QueryPlan, id: &str) -> Result<QueryBuf, ConfigError> {
    render(catalog, plan, Some(id))
}

fn render(catalog: &ResourceCatalog, plan: &QueryPlan, id: Option<&str>) -> Result<QueryBuf, ConfigError> {
    let resource = catalog.resource(&plan.resource)?;
    let level = Level {
        resource,
        alias: "t0".to_string(),
        depth: 0,
        via: None,
    };
    let mut q = QueryBuf::new();
    let mut conditions = Vec::new();
    if let Some(id) = id {
        let p = q.push_param(PgBindValue::Text(id.to_string()));
        conditions.push(format!("{}.{}::text = {}", level.alias, quoted(&resource.id), p));
    }
    let sql = render_level(catalog, plan, &level, conditions, &mut q)?;
    q.sql = sql;
    tracing::debug!(sql = %q.sql, params = q.params.len(), "query");
    Ok(q)
}

fn render_level(
    catalog: &ResourceCatalog,
    plan: &QueryPlan,
    level: &Level<'_>,
    mut conditions: Vec<String>,
    q: &mut QueryBuf,
) -> Result<String, ConfigError> {
    let resource = level.resource;

    let mut columns = Vec::new();
    for name in &plan.fields {
        let (field, ty) = match resource.field_type(name) {
            Some(ty) => (FieldRef::resource(name.clone()), Some(ty)),
            None => (
                FieldRef::through(name.clone()),
                level.through().and_then(|t| t.fields.get(name).copied()),
            ),
        };
        let col = level.column(&field);
        let expr = match ty {
            Some(FieldType::Geometry) => format!("ST_AsGeoJSON({})::jsonb", col),
            _ => col,
        };
        columns.push(format!("{} AS {}", expr, quoted(name)));
    }

    for (name, child) in &plan.relation_plans {
        let relation = relation_of(resource, name)?;
        let child_level = Level {
            resource: catalog.resource(&child.resource)?,
            alias: format!("t{}", level.depth + 1),
            depth: level.depth + 1,
            via: Some(relation),
        };
        let correlation = child_level.correlate(level);
        let inner = render_level(catalog, child, &child_level, vec![correlation], q)?;
        let sub = if relation.is_to_one() {
            format!("(SELECT to_jsonb(sub) FROM ({}) sub)", inner)
        } else {
            format!("(SELECT COALESCE(jsonb_agg(to_jsonb(sub)), '[]'::jsonb) FROM ({}) sub)", inner)
        };
        columns.push(format!("{} AS {}", sub, quoted(name)));
    }

    // Clauses on joined relations are grouped into one semi-join per relation.
    let mut by_relation: BTreeMap<&str, Vec<&CompiledWhereClause>> = BTreeMap::new();
    for c in &plan.filters {
        match scope_of(c) {
            Some(FieldScope::Relation(rel)) => by_relation.entry(rel.as_str()).or_default().push(c),
            _ => conditions.push(render_clause(c, level, q)),
        }
    }
    let mut joins: BTreeMap<&str, JoinKind> = plan.joins.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    for rel in by_relation.keys() {
        joins.entry(*rel).or_insert(JoinKind::Inner);
    }
    for (rel, join) in joins {
        let relation = relation_of(resource, rel)?;
        let joined = Level {
            resource: catalog.resource(&relation.target)?,
            alias: level.join_alias(rel),
            depth: level.depth,
            via: Some(relation),
        };
        let mut inner = vec![joined.correlate(level)];
        let clauses = by_relation.remove(rel).unwrap_or_default();
        // Absence needs no key check inside NOT EXISTS.
        if join == JoinKind::Inner {
            for c in clauses {
                inner.push(render_clause(c, level, q));
            }
        }
        let exists = format!("EXISTS (SELECT 1 FROM {} WHERE {})", joined.from(), inner.join(" AND "));
        conditions.push(match join {
            JoinKind::Inner => exists,
            JoinKind::LeftExclusive => format!("NOT {}", exists),
        });
    }

    let id_field = FieldRef::resource(resource.id.clone());
    let mut order: Vec<String> = plan
        .order
        .iter()
        .map(|e| format!("{} {}", level.column(&e.field), e.direction.as_sql()))
        .collect();
    if !plan.order.iter().any(|e| e.field == id_field) {
        order.push(format!("{} ASC", level.column(&id_field)));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    let limit_clause = plan.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = plan.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();

    Ok(format!(
        "SELECT {} FROM {}{} ORDER BY {}{}{}",
        columns.join(", "),
        level.from(),
        where_clause,
        order.join(", "),
        limit_clause,
        offset_clause
    ))
}

fn relation_of<'a>(resource: &'a ResourceType, name: &str) -> Result<&'a Relation, ConfigError> {
    resource.relation(name).ok_or_else(|| ConfigError::MissingReference {
        kind: "relation",
        id: format!("{}.{}", resource.name, name),
    })
}

/// Scope of the first field a clause (or any of its children) refers to.
fn scope_of(c: &CompiledWhereClause) -> Option<&FieldScope> {
    c.field
        .as_ref()
        .map(|f| &f.scope)
        .or_else(|| c.children.iter().find_map(scope_of))
}

fn render_clause(c: &CompiledWhereClause, level: &Level<'_>, q: &mut QueryBuf) -> String {
    let col = c.field.as_ref().map(|f| level.column(f)).unwrap_or_default();
    let binary = |op: &str, q: &mut QueryBuf| format!("{} {} {}", col, op, bind(c, 0, q));

    match c.kind {
        ClauseKind::Equals => binary("=", q),
        ClauseKind::NotEquals => binary("<>", q),
        ClauseKind::LessThan => binary("<", q),
        ClauseKind::LessThanOrEqual => binary("<=", q),
        ClauseKind::GreaterThan => binary(">", q),
        ClauseKind::GreaterThanOrEqual => binary(">=", q),
        ClauseKind::Between => {
            let low = bind(c, 0, q);
            let high = bind(c, 1, q);
            format!("{} BETWEEN {} AND {}", col, low, high)
        }
        ClauseKind::IsNull => format!("{} IS NULL", col),
        ClauseKind::IsNotNull => format!("{} IS NOT NULL", col),
        ClauseKind::InSet | ClauseKind::NotInSet => {
            let negated = c.kind == ClauseKind::NotInSet;
            if c.operands.is_empty() {
                return if negated { "TRUE" } else { "FALSE" }.to_string();
            }
            let placeholders: Vec<String> = (0..c.operands.len()).map(|i| bind(c, i, q)).collect();
            let op = if negated { "NOT IN" } else { "IN" };
            format!("{} {} ({})", col, op, placeholders.join(", "))
        }
        ClauseKind::LikeContains => like(c, &col, "ILIKE", |s| format!("%{}%", escape_like(s)), q),
        ClauseKind::LikePrefix => like(c, &col, "ILIKE", |s| format!("{}%", escape_like(s)), q),
        ClauseKind::LikeSuffix => like(c, &col, "ILIKE", |s| format!("%{}", escape_like(s)), q),
        ClauseKind::NotLike => like(c, &col, "NOT ILIKE", escape_like, q),
        ClauseKind::Raw(RawPredicate::NonEmpty) => format!("length({}::text) > 0", col),
        ClauseKind::Raw(RawPredicate::Empty) => format!("length({}::text) = 0", col),
        ClauseKind::Raw(RawPredicate::FullTextMatch) => format!("{} @@ plainto_tsquery({})", col, bind(c, 0, q)),
        ClauseKind::And | ClauseKind::Or => {
            let sep = if c.kind == ClauseKind::And { " AND " } else { " OR " };
            let parts: Vec<String> = c.children.iter().map(|child| render_clause(child, level, q)).collect();
            format!("({})", parts.join(sep))
        }
    }
}

fn bind(c: &CompiledWhereClause, i: usize, q: &mut QueryBuf) -> String {
    match c.operands.get(i) {
        Some(op) => q.push_param(PgBindValue::from(op)),
        None => "NULL".to_string(),
    }
}

fn like(c: &CompiledWhereClause, col: &str, op: &str, pattern: impl Fn(&str) -> String, q: &mut QueryBuf) -> String {
    let value = match c.operands.first() {
        Some(Operand::Text(s)) => PgBindValue::Text(pattern(s)),
        Some(other) => PgBindValue::from(other),
        None => PgBindValue::Text(pattern("")),
    };
    format!("{}::text {} {}", col, op, q.push_param(value))
}
