use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

pub struct FilterWhere;

impl FilterWhere {
    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    /// Parse `{ field: value }` and `{ field: { "$op": value } }` into conditions
    pub fn parse(where_data: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        Self::validate(where_data)?;
        let mut conditions = Vec::new();
        if let Value::Object(obj) = where_data {
            for (key, value) in obj {
                if key.starts_with('$') {
                    // Logical operators have no counterpart in the REST binding
                    return Err(FilterError::UnsupportedOperator(key.clone()));
                }
                Self::parse_field_condition(key, value, &mut conditions)?;
            }
        }
        Ok(conditions)
    }

    fn parse_field_condition(field: &str, value: &Value, out: &mut Vec<FilterWhereInfo>) -> Result<(), FilterError> {
        if let Value::Object(obj) = value {
            for (op_key, op_val) in obj {
                let operator = Self::map_operator(op_key)?;
                if operator == FilterOp::In && !op_val.is_array() {
                    return Err(FilterError::InvalidOperatorData("$in requires array".to_string()));
                }
                out.push(FilterWhereInfo { column: field.to_string(), operator, data: op_val.clone() });
            }
        } else {
            // Implicit equality: { field: value }
            out.push(FilterWhereInfo { column: field.to_string(), operator: FilterOp::Eq, data: value.clone() });
        }
        Ok(())
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Neq,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    /// Render one condition as a `(column, "op.value")` query pair
    pub fn render(condition: &FilterWhereInfo) -> (String, String) {
        let value = match (&condition.operator, &condition.data) {
            (FilterOp::Eq, Value::Null) => "is.null".to_string(),
            (FilterOp::Neq, Value::Null) => "not.is.null".to_string(),
            (FilterOp::In, Value::Array(values)) => {
                let items: Vec<String> = values.iter().map(Self::quote_list_item).collect();
                format!("in.({})", items.join(","))
            }
            (op, data) => format!("{}.{}", op.to_rest(), Self::scalar(data)),
        };
        (condition.column.clone(), value)
    }

    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        }
    }

    fn quote_list_item(value: &Value) -> String {
        let raw = Self::scalar(value);
        if raw.contains([',', '(', ')', '"']) {
            format!("\"{}\"", raw.replace('"', "\\\""))
        } else {
            raw
        }
    }

    /// Evaluate a condition against a JSON row
    pub fn matches(condition: &FilterWhereInfo, row: &Value) -> bool {
        let actual = row.get(&condition.column).unwrap_or(&Value::Null);
        let expected = &condition.data;
        match condition.operator {
            FilterOp::Eq => {
                if expected.is_null() { actual.is_null() } else { compare(actual, expected) == Some(Ordering::Equal) }
            }
            FilterOp::Neq => {
                if expected.is_null() { !actual.is_null() } else { compare(actual, expected) != Some(Ordering::Equal) }
            }
            FilterOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
            FilterOp::Lt => compare(actual, expected) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Like | FilterOp::ILike => match (actual.as_str(), expected.as_str()) {
                (Some(text), Some(pattern)) => like_match(pattern, text, condition.operator == FilterOp::ILike),
                _ => false,
            },
            FilterOp::In => expected
                .as_array()
                .map(|values| values.iter().any(|v| compare(actual, v) == Some(Ordering::Equal)))
                .unwrap_or(false),
        }
    }
}

/// Compare two JSON values the way the database would compare the column:
/// numbers numerically, timestamps and dates chronologically, strings lexically.
/// Returns `None` for incomparable values (including SQL null).
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(compare_text(x, y)),
        (Value::String(s), n @ Value::Number(_)) => s.parse::<f64>().ok().and_then(|x| x.partial_cmp(&n.as_f64()?)),
        (n @ Value::Number(_), Value::String(s)) => n.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

fn compare_text(x: &str, y: &str) -> Ordering {
    if let (Ok(a), Ok(b)) = (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (parse_naive(x), parse_naive(y)) {
        return a.cmp(&b);
    }
    if let (Ok(a), Ok(b)) = (x.parse::<f64>(), y.parse::<f64>()) {
        if let Some(ordering) = a.partial_cmp(&b) {
            return ordering;
        }
    }
    x.cmp(y)
}

// Plain dates sort as midnight so a date compares sensibly with a timestamp.
fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// SQL LIKE with `%` (any run) and `_` (one char); `*` is accepted for `%`
fn like_match(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    let (pattern, text) = if case_insensitive {
        (pattern.to_lowercase(), text.to_lowercase())
    } else {
        (pattern.to_string(), text.to_string())
    };
    let p: Vec<char> = pattern.chars().map(|c| if c == '*' { '%' } else { c }).collect();
    let t: Vec<char> = text.chars().collect();
    like_from(&p, &t)
}

fn like_from(p: &[char], t: &[char]) -> bool {
    match p.first() {
        None => t.is_empty(),
        Some('%') => (0..=t.len()).any(|skip| like_from(&p[1..], &t[skip..])),
        Some('_') => !t.is_empty() && like_from(&p[1..], &t[1..]),
        Some(c) => t.first() == Some(c) && like_from(&p[1..], &t[1..]),
    }
}
