//! Lenient field extraction for loosely typed catalog rows.
//!
//! The store hands back rows as JSON objects whose cells may be numbers,
//! numeric strings, blanks or garbage. A bad cell never rejects the row: it is
//! replaced with the documented default and logged at debug level.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::CatalogError;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

/// A single raw record of a named relation
pub struct Row<'a> {
    relation: &'static str,
    value: &'a Value,
}

impl<'a> Row<'a> {
    pub fn new(relation: &'static str, value: &'a Value) -> Self {
        Self { relation, value }
    }

    /// First present, non-null cell among `names` (column aliases)
    fn cell(&self, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
        names.iter().find_map(|name| {
            self.value
                .get(name)
                .filter(|v| !v.is_null())
                .map(|v| (*name, v))
        })
    }

    fn malformed(&self, field: &'static str) {
        let err = CatalogError::MalformedRecord {
            relation: self.relation,
            field,
        };
        tracing::debug!(error = %err, "Coerced malformed field");
    }

    /// Integer cell; non-numeric values become 0
    pub fn int(&self, names: &[&'static str]) -> i64 {
        let field = names.first().copied().unwrap_or("?");
        match self.cell(names) {
            Some((_, value)) => parse_int(value).unwrap_or_else(|| {
                self.malformed(field);
                0
            }),
            None => {
                self.malformed(field);
                0
            }
        }
    }

    /// Float cell; non-numeric or non-finite values become 0.0
    pub fn float(&self, names: &[&'static str]) -> f64 {
        let field = names.first().copied().unwrap_or("?");
        match self.cell(names).and_then(|(_, v)| parse_float(v)) {
            Some(value) => value,
            None => {
                self.malformed(field);
                0.0
            }
        }
    }

    /// Text cell; numbers are rendered, anything else becomes an empty string
    pub fn text(&self, names: &[&'static str]) -> String {
        match self.cell(names) {
            Some((_, Value::String(s))) => s.trim().to_string(),
            Some((_, Value::Number(n))) => n.to_string(),
            Some((_, Value::Bool(b))) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Timestamp cell; unparsable values become `None`
    pub fn timestamp(&self, names: &[&'static str]) -> Option<DateTime<Utc>> {
        let (field, value) = self.cell(names)?;
        let parsed = value.as_str().and_then(parse_timestamp);
        if parsed.is_none() {
            self.malformed(field);
        }
        parsed
    }

    /// Comma separated tags, or a JSON array of strings
    pub fn tags(&self, names: &[&'static str]) -> Vec<String> {
        match self.cell(names) {
            Some((_, Value::Array(items))) => items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some((_, Value::String(s))) => split_list(s).map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Comma separated integer ids, tolerating the leading apostrophe that
    /// spreadsheet-backed stores use to force a text cell
    pub fn id_list(&self, names: &[&'static str]) -> Vec<i64> {
        let mut ids: Vec<i64> = match self.cell(names) {
            Some((_, Value::Array(items))) => items.iter().filter_map(parse_int).collect(),
            Some((_, Value::Number(n))) => n.as_i64().into_iter().collect(),
            Some((_, Value::String(s))) => split_list(s.trim_start_matches('\''))
                .filter_map(|item| item.parse().ok())
                .collect(),
            _ => Vec::new(),
        };
        let mut seen = std::collections::HashSet::new();
        ids.retain(|id| seen.insert(*id));
        ids
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
