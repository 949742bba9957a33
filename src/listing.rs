//! Pagination, sorting and filter criteria shared by every list endpoint.
//!
//! A list request is turned into a [`Criteria`] (the WHERE clause), a
//! [`Sort`] and a [`PageRequest`]. [`fetch_page`] renders the same criteria
//! into both the `COUNT(*)` query and the page query so `total` always
//! describes the filtered set, independent of paging.

use std::convert::Infallible;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rocket::request::{FromRequest, Outcome, Request};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Allowed sort fields: wire name paired with the column it orders by.
pub type SortFields = &'static [(&'static str, &'static str)];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: &PageRequest) -> Self {
        Self {
            data,
            total,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages(total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Result<Self, AppError> {
        if page < 1 {
            return Err(AppError::Validation(
                "page must be a positive integer".to_string(),
            ));
        }

        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::Validation(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if (page - 1).checked_mul(page_size).is_none() {
            return Err(AppError::Validation("page is out of range".to_string()));
        }

        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.page_size - 1) / self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(AppError::Validation(format!(
                "Invalid sort direction: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: "created_at",
            direction: SortDirection::Desc,
        }
    }
}

impl Sort {
    /// Accepts either `sort=field:direction` or `sortBy` + `sortOrder`.
    pub fn parse(
        sort: Option<&str>,
        sort_by: Option<&str>,
        sort_order: Option<&str>,
        fields: SortFields,
    ) -> Result<Self, AppError> {
        let (field, direction) = match (sort, sort_by) {
            (Some(raw), _) if !raw.trim().is_empty() => match raw.split_once(':') {
                Some((field, direction)) => (field, direction),
                None => (raw, ""),
            },
            (_, Some(field)) if !field.trim().is_empty() => (field, sort_order.unwrap_or("")),
            _ => return Ok(Sort::default()),
        };

        let field = field.trim();
        let column = fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
            .ok_or_else(|| AppError::Validation(format!("Cannot sort by field: {}", field)))?;

        Ok(Sort {
            column,
            direction: direction.parse()?,
        })
    }

    pub fn push_order_by(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let direction = self.direction.as_sql();
        qb.push(" ORDER BY ")
            .push(self.column)
            .push(" ")
            .push(direction)
            .push(", id ")
            .push(direction);
    }
}

/// Paging and sorting parameters shared by every list route, read straight
/// from the query string so each entity's filter form only names filters.
#[derive(Debug, Default, Clone)]
pub struct ListParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ListParams {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let value = |name: &str| {
            request
                .query_value::<String>(name)
                .and_then(|result| result.ok())
        };

        Outcome::Success(ListParams {
            page: value("page"),
            page_size: value("pageSize"),
            limit: value("limit"),
            sort: value("sort"),
            sort_by: value("sortBy"),
            sort_order: value("sortOrder"),
        })
    }
}

impl ListParams {
    pub fn page_request(&self) -> Result<PageRequest, AppError> {
        let page = parse_int("page", self.page.as_deref())?.unwrap_or(1);
        let page_size = match parse_int("pageSize", self.page_size.as_deref())? {
            Some(size) => size,
            None => parse_int("limit", self.limit.as_deref())?.unwrap_or(DEFAULT_PAGE_SIZE),
        };

        PageRequest::new(page, page_size)
    }

    pub fn sort(&self, fields: SortFields) -> Result<Sort, AppError> {
        Sort::parse(
            self.sort.as_deref(),
            self.sort_by.as_deref(),
            self.sort_order.as_deref(),
            fields,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::Timestamp(value)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(value: NaiveDate) -> Self {
        FilterValue::Date(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Equals(&'static str, FilterValue),
    Contains(&'static str, String),
    AnyContains(&'static [&'static str], String),
    AtLeast(&'static str, FilterValue),
    AtMost(&'static str, FilterValue),
}

/// A conjunction of filter conditions. Builders skip absent values, so a
/// handler can pass every optional query parameter straight through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    conditions: Vec<Condition>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn eq<V: Into<FilterValue>>(mut self, column: &'static str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.conditions.push(Condition::Equals(column, value.into()));
        }
        self
    }

    pub fn contains(mut self, column: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = non_empty(value) {
            self.conditions
                .push(Condition::Contains(column, value.to_string()));
        }
        self
    }

    /// Matches when any of `columns` contains `value`.
    pub fn search(mut self, columns: &'static [&'static str], value: Option<&str>) -> Self {
        if let Some(value) = non_empty(value) {
            self.conditions
                .push(Condition::AnyContains(columns, value.to_string()));
        }
        self
    }

    pub fn range<V: Into<FilterValue>>(
        mut self,
        column: &'static str,
        from: Option<V>,
        to: Option<V>,
    ) -> Self {
        if let Some(from) = from {
            self.conditions.push(Condition::AtLeast(column, from.into()));
        }
        if let Some(to) = to {
            self.conditions.push(Condition::AtMost(column, to.into()));
        }
        self
    }

    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for (index, condition) in self.conditions.iter().enumerate() {
            qb.push(if index == 0 { " WHERE " } else { " AND " });

            match condition {
                Condition::Equals(column, value) => {
                    qb.push(*column).push(" = ");
                    push_value(qb, value);
                }
                Condition::Contains(column, value) => {
                    push_like(qb, column, value);
                }
                Condition::AnyContains(columns, value) => {
                    qb.push("(");
                    for (i, column) in columns.iter().enumerate() {
                        if i > 0 {
                            qb.push(" OR ");
                        }
                        push_like(qb, column, value);
                    }
                    qb.push(")");
                }
                Condition::AtLeast(column, value) => {
                    qb.push(*column).push(" >= ");
                    push_value(qb, value);
                }
                Condition::AtMost(column, value) => {
                    qb.push(*column).push(" <= ");
                    push_value(qb, value);
                }
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &FilterValue) {
    match value {
        FilterValue::Int(v) => qb.push_bind(*v),
        FilterValue::Text(v) => qb.push_bind(v.clone()),
        FilterValue::Bool(v) => qb.push_bind(*v),
        FilterValue::Timestamp(v) => qb.push_bind(*v),
        FilterValue::Date(v) => qb.push_bind(*v),
    };
}

fn push_like(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, value: &str) {
    qb.push(column)
        .push(" LIKE ")
        .push_bind(like_pattern(value))
        .push(" ESCAPE '\\'");
}

pub fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Runs the count and page queries for `table` under one predicate.
#[instrument(skip(pool, criteria))]
pub async fn fetch_page<T>(
    pool: &Pool<Sqlite>,
    table: &str,
    columns: &str,
    criteria: &Criteria,
    sort: &Sort,
    page: &PageRequest,
) -> Result<(Vec<T>, i64), AppError>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut count_query: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table));
    criteria.push_where(&mut count_query);

    let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

    let mut page_query: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM {}", columns, table));
    criteria.push_where(&mut page_query);
    sort.push_order_by(&mut page_query);
    page_query
        .push(" LIMIT ")
        .push_bind(page.page_size)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = page_query.build_query_as::<T>().fetch_all(pool).await?;

    debug!(total = total, returned = rows.len(), "Fetched page");

    Ok((rows, total))
}

pub fn parse_int(name: &str, raw: Option<&str>) -> Result<Option<i64>, AppError> {
    match non_empty(raw) {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{} must be an integer", name))),
        None => Ok(None),
    }
}

pub fn parse_bool(name: &str, raw: Option<&str>) -> Result<Option<bool>, AppError> {
    match non_empty(raw).map(|v| v.trim().to_ascii_lowercase()) {
        Some(value) => match value.as_str() {
            "true" | "1" | "on" | "yes" => Ok(Some(true)),
            "false" | "0" | "off" | "no" => Ok(Some(false)),
            _ => Err(AppError::Validation(format!("{} must be a boolean", name))),
        },
        None => Ok(None),
    }
}

pub fn parse_enum<E: FromStr>(name: &str, raw: Option<&str>) -> Result<Option<E>, AppError> {
    match non_empty(raw) {
        Some(value) => value
            .trim()
            .parse::<E>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Invalid {}: {}", name, value))),
        None => Ok(None),
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its date part is kept).
pub fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    let Some(value) = non_empty(raw).map(str::trim) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Some(date));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| Some(dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| AppError::Validation(format!("{} must be a date", name)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Parses a timestamp bound. A bare date expands to the start or the end of
/// that day so `createdAtTo=2024-05-01` includes rows created on May 1st.
pub fn parse_timestamp(
    name: &str,
    raw: Option<&str>,
    bound: Bound,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(value) = non_empty(raw).map(str::trim) else {
        return Ok(None);
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("{} must be a date or timestamp", name)))?;

    let time = match bound {
        Bound::Start => NaiveTime::default(),
        Bound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or_default(),
    };

    Ok(Some(date.and_time(time).and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    const FIELDS: SortFields = &[("name", "name"), ("createdAt", "created_at")];

    #[test]
    fn test_page_request_bounds() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
        assert!(PageRequest::new(1, MAX_PAGE_SIZE + 1).is_err());

        let page = PageRequest::new(2, 10).unwrap();
        assert_eq!(page.offset(), 10);
        assert_eq!(page.total_pages(15), 2);
        assert_eq!(page.total_pages(20), 2);
        assert_eq!(page.total_pages(21), 3);
        assert_eq!(page.total_pages(0), 0);

        assert!(PageRequest::new(i64::MAX, 10).is_err());
        assert!(PageRequest::new(i64::MAX, 1).is_ok());
    }

    #[test]
    fn test_list_params_prefer_page_size_over_limit() {
        let params = ListParams {
            page_size: Some("5".into()),
            limit: Some("50".into()),
            ..Default::default()
        };
        assert_eq!(params.page_request().unwrap().page_size, 5);

        let params = ListParams {
            limit: Some("50".into()),
            ..Default::default()
        };
        assert_eq!(params.page_request().unwrap().page_size, 50);

        let params = ListParams {
            page: Some("two".into()),
            ..Default::default()
        };
        assert!(params.page_request().is_err());
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!(Sort::parse(None, None, None, FIELDS).unwrap(), Sort::default());

        let sort = Sort::parse(Some("name:desc"), None, None, FIELDS).unwrap();
        assert_eq!(sort.column, "name");
        assert_eq!(sort.direction, SortDirection::Desc);

        let sort = Sort::parse(Some("createdAt"), None, None, FIELDS).unwrap();
        assert_eq!(sort.column, "created_at");
        assert_eq!(sort.direction, SortDirection::Asc);

        let sort = Sort::parse(None, Some("name"), Some("DESC"), FIELDS).unwrap();
        assert_eq!(sort.direction, SortDirection::Desc);

        assert!(Sort::parse(Some("password:asc"), None, None, FIELDS).is_err());
        assert!(Sort::parse(Some("name:sideways"), None, None, FIELDS).is_err());
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Main"), "%Main%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_criteria_renders_where_clause() {
        let criteria = Criteria::new()
            .contains("address", Some("Main"))
            .contains("name", Some(""))
            .eq("latitude", Some(10_i64))
            .eq::<i64>("longitude", None)
            .search(&["firstname", "lastname"], Some("ann"));

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM t");
        criteria.push_where(&mut qb);

        assert_eq!(
            qb.sql(),
            "SELECT * FROM t WHERE address LIKE ? ESCAPE '\\' AND latitude = ? AND \
             (firstname LIKE ? ESCAPE '\\' OR lastname LIKE ? ESCAPE '\\')"
        );
    }

    #[test]
    fn test_timestamp_bounds_cover_whole_day() {
        let start = parse_timestamp("createdAtFrom", Some("2024-05-01"), Bound::Start)
            .unwrap()
            .unwrap();
        let end = parse_timestamp("createdAtTo", Some("2024-05-01"), Bound::End)
            .unwrap()
            .unwrap();

        assert_eq!(start.to_rfc3339(), "2024-05-01T00:00:00+00:00");
        assert!(end > start);
        assert_eq!(end.date_naive(), start.date_naive());

        assert!(parse_timestamp("createdAtTo", Some("yesterday"), Bound::End).is_err());
        assert!(parse_date("birthdayFrom", Some("2024-13-01")).is_err());
        assert_eq!(
            parse_date("birthdayFrom", Some("1990-02-03T10:00:00Z")).unwrap(),
            NaiveDate::from_ymd_opt(1990, 2, 3)
        );
    }

    #[test]
    fn test_parse_bool_values() {
        assert_eq!(parse_bool("disabled", Some("true")).unwrap(), Some(true));
        assert_eq!(parse_bool("disabled", Some("0")).unwrap(), Some(false));
        assert_eq!(parse_bool("disabled", None).unwrap(), None);
        assert!(parse_bool("disabled", Some("maybe")).is_err());
    }

    #[derive(sqlx::FromRow)]
    struct Row {
        id: i64,
        name: String,
    }

    #[rocket::async_test]
    async fn test_fetch_page_counts_full_filtered_set() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");

        sqlx::query(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, created_at TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        for i in 1..=15 {
            let name = if i % 5 == 0 { format!("skip {}", i) } else { format!("item {}", i) };
            sqlx::query("INSERT INTO items (id, name, created_at) VALUES (?, ?, ?)")
                .bind(i)
                .bind(name)
                .bind(Utc::now())
                .execute(&pool)
                .await
                .unwrap();
        }

        let sort = Sort {
            column: "id",
            direction: SortDirection::Asc,
        };

        let (rows, total) = fetch_page::<Row>(
            &pool,
            "items",
            "id, name",
            &Criteria::new(),
            &sort,
            &PageRequest::new(2, 10).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(total, 15);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].id, 11);

        let criteria = Criteria::new().contains("name", Some("item"));
        let (rows, total) = fetch_page::<Row>(
            &pool,
            "items",
            "id, name",
            &criteria,
            &sort,
            &PageRequest::new(1, 5).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(total, 12);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.name.starts_with("item")));
    }
}
