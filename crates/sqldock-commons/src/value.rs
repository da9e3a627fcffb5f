//! Row value model for query results.
//!
//! A result row is an ordered sequence of (column name, tagged value)
//! pairs. Column order is preserved within a row; values are a closed
//! variant set so no implicit type coercion happens between the engine's
//! wire types and the JSON response.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// A single column value in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Nested document (json/jsonb columns), passed through untouched.
    Json(serde_json::Value),
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Int(i) => serializer.serialize_i64(*i),
            SqlValue::Float(f) => serializer.serialize_f64(*f),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::Json(v) => v.serialize(serializer),
        }
    }
}

/// One result row: column order preserved, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<(String, SqlValue)>);

impl Row {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.0.push((column.into(), value));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, SqlValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_serializes_as_object_preserving_column_order() {
        let mut row = Row::new();
        row.push("zeta", SqlValue::Int(1));
        row.push("alpha", SqlValue::Text("x".into()));
        row.push("mid", SqlValue::Null);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":"x","mid":null}"#);
    }

    #[test]
    fn values_serialize_without_tags() {
        assert_eq!(serde_json::to_string(&SqlValue::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&SqlValue::Float(1.5)).unwrap(), "1.5");
        let nested = SqlValue::Json(serde_json::json!({"a": [1, 2]}));
        assert_eq!(serde_json::to_string(&nested).unwrap(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn get_finds_column_by_name() {
        let row: Row =
            vec![("id".to_string(), SqlValue::Int(7)), ("name".to_string(), SqlValue::Null)]
                .into_iter()
                .collect();
        assert_eq!(row.get("id"), Some(&SqlValue::Int(7)));
        assert!(row.get("missing").is_none());
    }
}
