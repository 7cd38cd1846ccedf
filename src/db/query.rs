//! Dynamic SQL assembly for list, count and partial-update statements.
//!
//! User input only ever reaches the statement through `push_bind`. The text
//! of a statement is built from entity descriptors and [`SortOrder`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite};

use super::entity::{Entity, Managed};
use crate::error::{Error, Result};
use crate::model::SortOrder;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Allow-listed sort column for one entity.
pub trait SortField: Copy + Default + Send + Sync + 'static {
    fn parse_field(s: &str) -> Option<Self>;
    fn column(self) -> &'static str;
}

/// A column taking part in substring search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchColumn {
    Text(&'static str),
    /// Numeric column matched against its text form.
    Cast(&'static str),
    /// Boolean column matched as `true` / `false`.
    Bool(&'static str),
}

impl SearchColumn {
    fn push_lhs(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            SearchColumn::Text(col) => qb.push(*col),
            SearchColumn::Cast(col) => qb.push("CAST(").push(*col).push(" AS TEXT)"),
            SearchColumn::Bool(col) => qb
                .push("(CASE WHEN ")
                .push(*col)
                .push(" THEN 'true' ELSE 'false' END)"),
        };
    }
}

/// Permanent `column <> value` filter. NULL values are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exclusion {
    pub column: &'static str,
    pub value: &'static str,
}

/// Raw list parameters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
}

/// Normalised, validated list request for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery<S> {
    pub page: u32,
    pub limit: u32,
    pub sort: S,
    pub order: SortOrder,
    pub search: Option<String>,
}

impl<S: SortField> Default for ListQuery<S> {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            sort: S::default(),
            order: SortOrder::default(),
            search: None,
        }
    }
}

fn positive(raw: Option<&str>, fallback: u32) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|n| *n >= 1)
        .unwrap_or(fallback)
}

impl<S: SortField> ListQuery<S> {
    /// Permissive normalisation: bad values fall back to defaults instead of
    /// failing the request.
    pub fn from_params(params: &ListParams) -> Self {
        Self {
            page: positive(params.page.as_deref(), DEFAULT_PAGE),
            limit: positive(params.limit.as_deref(), DEFAULT_LIMIT),
            sort: params
                .sort
                .as_deref()
                .and_then(S::parse_field)
                .unwrap_or_default(),
            order: params
                .order
                .as_deref()
                .and_then(SortOrder::parse_order)
                .unwrap_or_default(),
            search: params
                .search
                .as_ref()
                .filter(|s| !s.is_empty())
                .cloned(),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

fn push_filter<E: Entity>(qb: &mut QueryBuilder<'_, Sqlite>, search: Option<&str>) {
    let mut has_where = false;
    if let Some(ex) = E::EXCLUDE {
        qb.push(" WHERE (")
            .push(ex.column)
            .push(" IS NULL OR ")
            .push(ex.column)
            .push(" <> ")
            .push_bind(ex.value)
            .push(")");
        has_where = true;
    }
    if let Some(term) = search {
        let pattern = format!("%{}%", term);
        qb.push(if has_where { " AND (" } else { " WHERE (" });
        for (i, col) in E::SEARCH.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            col.push_lhs(qb);
            qb.push(" LIKE ").push_bind(pattern.clone());
        }
        qb.push(")");
    }
}

/// `SELECT *` for one page, ordered and offset.
pub fn select_page<E: Entity>(q: &ListQuery<E::Sort>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", E::TABLE));
    push_filter::<E>(&mut qb, q.search.as_deref());
    let column = q.sort.column();
    qb.push(" ORDER BY ")
        .push(column)
        .push(" ")
        .push(q.order.as_str());
    if column != "id" {
        // Stable paging when the sort column has ties.
        qb.push(", id ").push(q.order.as_str());
    }
    qb.push(" LIMIT ")
        .push_bind(i64::from(q.limit))
        .push(" OFFSET ")
        .push_bind(q.offset());
    qb
}

/// `SELECT COUNT(*)` under the same filter as [`select_page`].
pub fn select_count<E: Entity>(search: Option<&str>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", E::TABLE));
    push_filter::<E>(&mut qb, search);
    qb
}

/// Storage class of an updatable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    Bool,
    Date,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text, nullable: true }
    }
    pub const fn required_text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text, nullable: false }
    }
    pub const fn integer(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Integer, nullable: true }
    }
    pub const fn real(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Real, nullable: true }
    }
    pub const fn flag(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Bool, nullable: false }
    }
    pub const fn date(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Date, nullable: true }
    }
    pub const fn required_date(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Date, nullable: false }
    }
    pub const fn required_timestamp(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Timestamp, nullable: false }
    }

    /// Convert a JSON value into something bindable for this column.
    /// `null` and `""` both mean SQL NULL.
    pub fn coerce(&self, value: &Value) -> Result<SqlValue> {
        if is_blank(value) {
            if self.nullable {
                return Ok(SqlValue::Null);
            }
            return Err(Error::bad_input(format!("{} cannot be empty", self.name)));
        }

        let invalid = || Error::bad_input(format!("invalid value for {}: {}", self.name, value));
        let coerced = match self.kind {
            ColumnKind::Text => SqlValue::Text(as_text(value).ok_or_else(invalid)?),
            ColumnKind::Integer => SqlValue::Int(as_integer(value).ok_or_else(invalid)?),
            ColumnKind::Real => SqlValue::Real(as_real(value).ok_or_else(invalid)?),
            ColumnKind::Bool => match value {
                Value::Bool(b) => SqlValue::Bool(*b),
                Value::String(s) if s.eq_ignore_ascii_case("true") => SqlValue::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => SqlValue::Bool(false),
                Value::Number(n) if n.as_i64() == Some(0) => SqlValue::Bool(false),
                Value::Number(n) if n.as_i64() == Some(1) => SqlValue::Bool(true),
                _ => return Err(invalid()),
            },
            ColumnKind::Date => {
                let date = value.as_str().and_then(parse_date).ok_or_else(invalid)?;
                SqlValue::Text(date.to_string())
            }
            ColumnKind::Timestamp => {
                let s = value.as_str().ok_or_else(invalid)?;
                let ts = parse_timestamp(s).ok_or_else(invalid)?;
                SqlValue::Text(ts.format(TIMESTAMP_FORMAT).to_string())
            }
        };
        Ok(coerced)
    }
}

pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integers, or strings holding one.
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers, or strings holding one.
pub(crate) fn as_real(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s.trim()).ok().map(|d| d.date_naive()))
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.naive_utc()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
}

impl SqlValue {
    pub(crate) fn push_to(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            SqlValue::Null => qb.push_bind(None::<String>),
            SqlValue::Text(s) => qb.push_bind(s),
            SqlValue::Int(i) => qb.push_bind(i),
            SqlValue::Real(f) => qb.push_bind(f),
            SqlValue::Bool(b) => qb.push_bind(b),
        };
    }
}

/// `UPDATE ... SET` touching only the keys present in `fields` that the
/// entity allows. Returns `None` when no allowed key is present.
pub fn update_statement<E: Managed>(
    id: i64,
    fields: &Map<String, Value>,
) -> Result<Option<QueryBuilder<'static, Sqlite>>> {
    let mut assignments = Vec::new();
    for column in E::COLUMNS {
        if let Some(value) = fields.get(column.name) {
            assignments.push((column.name, column.coerce(value)?));
        }
    }
    if assignments.is_empty() {
        return Ok(None);
    }

    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", E::TABLE));
    for (i, (name, value)) in assignments.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(name).push(" = ");
        value.push_to(&mut qb);
    }
    qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");
    Ok(Some(qb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entity::{WorkToDoSort, WorkerSort};
    use crate::db::model::{WorkToDo, Worker};
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut p = ListParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "page" => p.page = v,
                "limit" => p.limit = v,
                "sort" => p.sort = v,
                "order" => p.order = v,
                "search" => p.search = v,
                _ => unreachable!(),
            }
        }
        p
    }

    #[test]
    fn defaults_when_params_missing_or_garbage() {
        let q: ListQuery<WorkerSort> = ListQuery::from_params(&ListParams::default());
        assert_eq!(q, ListQuery::default());

        let q: ListQuery<WorkerSort> = ListQuery::from_params(&params(&[
            ("page", "zero"),
            ("limit", "0"),
            ("sort", "salary"),
            ("order", "upwards"),
            ("search", ""),
        ]));
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 10);
        assert_eq!(q.sort, WorkerSort::Id);
        assert_eq!(q.order, SortOrder::Desc);
        assert_eq!(q.search, None);
    }

    #[test]
    fn offset_skips_previous_pages() {
        let q: ListQuery<WorkerSort> =
            ListQuery::from_params(&params(&[("page", "3"), ("limit", "25")]));
        assert_eq!(q.offset(), 50);
        let q: ListQuery<WorkerSort> = ListQuery::from_params(&params(&[("page", "1")]));
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn page_sql_has_no_user_text() {
        let q: ListQuery<WorkerSort> = ListQuery::from_params(&params(&[
            ("sort", "name"),
            ("order", "asc"),
            ("search", "'; DROP TABLE workers; --"),
        ]));
        let qb = select_page::<Worker>(&q);
        let sql = qb.sql();
        assert!(!sql.contains("DROP"));
        assert!(sql.starts_with("SELECT * FROM workers WHERE ("));
        assert!(sql.contains("CAST(hours AS TEXT) LIKE ?"));
        assert!(sql.ends_with("ORDER BY name ASC, id ASC LIMIT ? OFFSET ?"));
        assert_eq!(sql.matches('?').count(), 5 + 2);
    }

    #[test]
    fn work_to_do_always_excludes_completed() {
        let q: ListQuery<WorkToDoSort> = ListQuery::default();
        let sql = select_page::<WorkToDo>(&q).sql().to_string();
        assert!(sql.contains("WHERE (status IS NULL OR status <> ?)"));
        assert!(!sql.contains("completed"));

        let count = select_count::<WorkToDo>(Some("fence"));
        let sql = count.sql();
        assert!(sql.contains("WHERE (status IS NULL OR status <> ?) AND ("));
        assert!(sql.contains("(CASE WHEN nb THEN 'true' ELSE 'false' END) LIKE ?"));
    }

    #[test]
    fn count_without_search_has_no_where() {
        let qb = select_count::<Worker>(None);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM workers");
    }

    #[test]
    fn update_touches_only_present_keys() {
        let fields = json!({"sector": "Main Barn", "salary": 10}).as_object().cloned().unwrap();
        let qb = update_statement::<Worker>(7, &fields).unwrap().unwrap();
        assert_eq!(qb.sql(), "UPDATE workers SET sector = ? WHERE id = ? RETURNING *");
    }

    #[test]
    fn update_without_known_keys_is_none() {
        let fields = json!({"unknown": 1}).as_object().cloned().unwrap();
        assert!(update_statement::<Worker>(7, &fields).unwrap().is_none());
        assert!(update_statement::<Worker>(7, &Map::new()).unwrap().is_none());
    }

    #[test]
    fn coercion_rules() {
        let hours = Column::real("hours");
        assert_eq!(hours.coerce(&json!(40)).unwrap(), SqlValue::Real(40.0));
        assert_eq!(hours.coerce(&json!("12.5")).unwrap(), SqlValue::Real(12.5));
        assert_eq!(hours.coerce(&json!("")).unwrap(), SqlValue::Null);
        assert!(hours.coerce(&json!("lots")).is_err());

        let nb = Column::flag("nb");
        assert_eq!(nb.coerce(&json!(true)).unwrap(), SqlValue::Bool(true));
        assert_eq!(nb.coerce(&json!("false")).unwrap(), SqlValue::Bool(false));
        assert!(nb.coerce(&Value::Null).is_err());

        let name = Column::required_text("name");
        assert!(matches!(name.coerce(&json!("")), Err(Error::BadInput(_))));

        let due = Column::date("due_date");
        assert_eq!(
            due.coerce(&json!("2025-09-10")).unwrap(),
            SqlValue::Text("2025-09-10".into())
        );
        assert_eq!(
            due.coerce(&json!("2025-09-10T08:00:00Z")).unwrap(),
            SqlValue::Text("2025-09-10".into())
        );
        assert!(due.coerce(&json!("next tuesday")).is_err());

        let ts = Column::required_timestamp("timestamp");
        assert_eq!(
            ts.coerce(&json!("2025-09-08T20:17:00")).unwrap(),
            SqlValue::Text("2025-09-08 20:17:00".into())
        );
    }
}
