use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A single row constraint, expressed the way the platform's REST layer
/// understands it (`column=op.value`).
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// Case-insensitive match; `*` is the wildcard.
    ILike(String, String),
    In(String, Vec<Value>),
    IsNull(String),
    /// Any of the inner filters. Inner filters must not be `Or` themselves.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(column.to_string(), value.into())
    }

    pub fn gte(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(column.to_string(), value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(column.to_string(), value.into())
    }

    pub fn lte(column: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(column.to_string(), value.into())
    }

    pub fn ilike(column: &str, pattern: impl Into<String>) -> Self {
        Filter::ILike(column.to_string(), pattern.into())
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    /// Query-string pair for the top level of a request.
    pub fn to_param(&self) -> (String, String) {
        match self {
            Filter::Or(inner) => {
                let parts: Vec<String> = inner
                    .iter()
                    .map(|f| {
                        let (column, expr) = f.to_param();
                        format!("{column}.{expr}")
                    })
                    .collect();
                ("or".to_string(), format!("({})", parts.join(",")))
            }
            Filter::Eq(column, Value::Null) => (column.clone(), "is.null".to_string()),
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", render_value(value))),
            Filter::Neq(column, value) => (column.clone(), format!("neq.{}", render_value(value))),
            Filter::Gt(column, value) => (column.clone(), format!("gt.{}", render_value(value))),
            Filter::Gte(column, value) => (column.clone(), format!("gte.{}", render_value(value))),
            Filter::Lt(column, value) => (column.clone(), format!("lt.{}", render_value(value))),
            Filter::Lte(column, value) => (column.clone(), format!("lte.{}", render_value(value))),
            Filter::ILike(column, pattern) => (column.clone(), format!("ilike.{pattern}")),
            Filter::In(column, values) => {
                let items: Vec<String> = values.iter().map(render_list_item).collect();
                (column.clone(), format!("in.({})", items.join(",")))
            }
            Filter::IsNull(column) => (column.clone(), "is.null".to_string()),
        }
    }

    /// Evaluates the filter against a JSON row with SQL-like null semantics:
    /// comparisons against a missing or null column never match.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Or(inner) => inner.iter().any(|f| f.matches(row)),
            Filter::IsNull(column) => row.get(column).map_or(true, Value::is_null),
            Filter::Eq(column, Value::Null) => row.get(column).map_or(true, Value::is_null),
            Filter::Eq(column, expected) => {
                column_value(row, column).is_some_and(|v| compare(v, expected) == Some(Ordering::Equal))
            }
            Filter::Neq(column, expected) => {
                column_value(row, column).is_some_and(|v| compare(v, expected) != Some(Ordering::Equal))
            }
            Filter::Gt(column, bound) => ordering_is(row, column, bound, |o| o == Ordering::Greater),
            Filter::Gte(column, bound) => ordering_is(row, column, bound, |o| o != Ordering::Less),
            Filter::Lt(column, bound) => ordering_is(row, column, bound, |o| o == Ordering::Less),
            Filter::Lte(column, bound) => ordering_is(row, column, bound, |o| o != Ordering::Greater),
            Filter::ILike(column, pattern) => column_value(row, column)
                .and_then(Value::as_str)
                .is_some_and(|text| ilike_matches(pattern, text)),
            Filter::In(column, values) => column_value(row, column).is_some_and(|v| {
                values
                    .iter()
                    .any(|candidate| compare(v, candidate) == Some(Ordering::Equal))
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Read/write target for one platform round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Query-string parameters for a REST read. Filters repeat the column
    /// name when several constraints apply to it, which the platform ANDs.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if !self.order.is_empty() {
            let order: Vec<String> = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect();
            params.push(("order".to_string(), order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Filter-only parameters, used by writes (update/delete) that target rows.
    pub fn filter_params(&self) -> Vec<(String, String)> {
        self.filters.iter().map(Filter::to_param).collect()
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Applies ordering, offset, limit and projection to rows that already
    /// passed `matches`.
    pub fn shape(&self, mut rows: Vec<Value>) -> Vec<Value> {
        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for order in &self.order {
                    let ord = order_values(a.get(&order.column), b.get(&order.column), order.ascending);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(offset).take(limit);

        if self.columns.trim() == "*" {
            return rows.collect();
        }

        let columns: Vec<&str> = self.columns.split(',').map(str::trim).collect();
        rows.map(|row| {
            let mut projected = serde_json::Map::new();
            for column in &columns {
                if let Some(value) = row.get(*column) {
                    projected.insert((*column).to_string(), value.clone());
                }
            }
            Value::Object(projected)
        })
        .collect()
    }
}

/// Case-insensitive glob match where `*` spans any run of characters.
pub fn ilike_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while t < text.len() {
        if p < pattern.len() && pattern[p] != '*' && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

fn column_value<'a>(row: &'a Value, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|v| !v.is_null())
}

fn ordering_is(row: &Value, column: &str, bound: &Value, check: impl Fn(Ordering) -> bool) -> bool {
    column_value(row, column)
        .and_then(|v| compare(v, bound))
        .is_some_and(check)
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => Some(a.cmp(b)),
            }
        }
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        _ => None,
    }
}

fn order_values(a: Option<&Value>, b: Option<&Value>, ascending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    // nulls last ascending, first descending
    let ord = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
    };
    if ascending {
        ord
    } else {
        ord.reverse()
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_list_item(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        other => other.to_string(),
    }
}
