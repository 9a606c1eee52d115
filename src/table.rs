use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::Serialize;

use crate::catalog::{CODE_COLUMN, YEAR_COLUMN};
use crate::domain::EntityKey;
use crate::error::OwidError;

/// A numeric cell. Keeps the text it was read from so output reproduces the source exactly.
#[derive(Debug, Clone)]
pub struct Number {
    value: f64,
    raw: String,
}

impl Number {
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self {
            value,
            raw: value.to_string(),
        }
    }
}

impl Serialize for Number {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(Number),
    Text(String),
}

impl Value {
    pub fn number(value: f64) -> Self {
        Value::Number(Number::from(value))
    }

    /// Numeric when the cell reads as a float, categorical otherwise.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(value) => Value::Number(Number {
                value,
                raw: trimmed.to_string(),
            }),
            Err(_) => Value::Text(trimmed.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(number.value),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(number) => write!(f, "{number}"),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Rows keyed by `(Code, Year)`, each holding one optional cell per value column.
///
/// A freshly fetched table has no empty cells; empties appear only after an
/// outer join, where a key is missing from one side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: BTreeMap<EntityKey, Vec<Option<Value>>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.rows.keys()
    }

    pub fn contains_key(&self, key: &EntityKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &[Option<Value>])> {
        self.rows.iter().map(|(key, values)| (key, values.as_slice()))
    }

    /// Inserts a row unless the key is already present. Returns whether it was inserted.
    pub fn insert(&mut self, key: EntityKey, values: Vec<Option<Value>>) -> bool {
        debug_assert_eq!(values.len(), self.columns.len());
        if self.rows.contains_key(&key) {
            return false;
        }
        self.rows.insert(key, values);
        true
    }

    pub fn row(&self, key: &EntityKey) -> Option<&[Option<Value>]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    pub fn get(&self, key: &EntityKey, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(key)?.get(index)?.as_ref()
    }

    /// Full outer join on the row key. Left columns come first.
    pub fn outer_join(self, other: Table) -> Result<Table, OwidError> {
        if let Some(shared) = other
            .columns
            .iter()
            .find(|column| self.columns.contains(column))
        {
            return Err(OwidError::DuplicateColumn(shared.clone()));
        }

        let left_width = self.columns.len();
        let right_width = other.columns.len();
        let mut right_rows = other.rows;
        let mut rows = BTreeMap::new();

        for (key, mut values) in self.rows {
            match right_rows.remove(&key) {
                Some(right) => values.extend(right),
                None => values.extend(std::iter::repeat_n(None, right_width)),
            }
            rows.insert(key, values);
        }
        for (key, right) in right_rows {
            let mut values: Vec<Option<Value>> = vec![None; left_width];
            values.extend(right);
            rows.insert(key, values);
        }

        let mut columns = self.columns;
        columns.extend(other.columns);
        Ok(Table { columns, rows })
    }

    /// Writes `Code,Year,<columns...>`; missing cells become empty fields.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), OwidError> {
        let mut out = csv::Writer::from_writer(writer);
        let header = [CODE_COLUMN, YEAR_COLUMN]
            .into_iter()
            .chain(self.columns.iter().map(String::as_str));
        out.write_record(header)
            .map_err(|err| OwidError::Filesystem(err.to_string()))?;
        for (key, values) in &self.rows {
            let mut record = Vec::with_capacity(values.len() + 2);
            record.push(key.code.clone());
            record.push(key.year.to_string());
            record.extend(
                values
                    .iter()
                    .map(|value| value.as_ref().map(Value::to_string).unwrap_or_default()),
            );
            out.write_record(&record)
                .map_err(|err| OwidError::Filesystem(err.to_string()))?;
        }
        out.flush()
            .map_err(|err| OwidError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn table(column: &str, rows: &[(&str, i32, f64)]) -> Table {
        let mut table = Table::new(vec![column.to_string()]);
        for (code, year, value) in rows {
            table.insert(EntityKey::new(*code, *year), vec![Some(Value::number(*value))]);
        }
        table
    }

    #[test]
    fn value_parse() {
        assert_eq!(Value::parse("5"), Value::number(5.0));
        assert_eq!(Value::parse(" 1.5e3 "), Value::number(1500.0));
        assert_eq!(
            Value::parse("Pursuing"),
            Value::Text("Pursuing".to_string())
        );
    }

    #[test]
    fn insert_keeps_first_row() {
        let mut t = table("a", &[("USA", 2020, 1.0)]);
        assert!(!t.insert(EntityKey::new("USA", 2020), vec![Some(Value::number(2.0))]));
        assert_eq!(
            t.get(&EntityKey::new("USA", 2020), "a"),
            Some(&Value::number(1.0))
        );
    }

    #[test]
    fn outer_join_unions_keys() {
        let left = table("a", &[("USA", 2020, 1.0), ("USA", 2021, 2.0)]);
        let right = table("b", &[("USA", 2021, 3.0), ("FRA", 2020, 4.0)]);
        let joined = left.outer_join(right).unwrap();

        assert_eq!(joined.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(joined.len(), 3);
        let usa_2021 = EntityKey::new("USA", 2021);
        assert_eq!(joined.get(&usa_2021, "a"), Some(&Value::number(2.0)));
        assert_eq!(joined.get(&usa_2021, "b"), Some(&Value::number(3.0)));
        assert_eq!(joined.get(&EntityKey::new("USA", 2020), "b"), None);
        assert_eq!(joined.get(&EntityKey::new("FRA", 2020), "a"), None);
        assert_eq!(
            joined.row(&EntityKey::new("FRA", 2020)).unwrap(),
            &[None, Some(Value::number(4.0))]
        );
    }

    #[test]
    fn outer_join_with_empty_is_identity() {
        let right = table("b", &[("FRA", 2020, 4.0)]);
        let joined = Table::default().outer_join(right.clone()).unwrap();
        assert_eq!(joined, right);
    }

    #[test]
    fn outer_join_rejects_shared_column() {
        let err = table("a", &[])
            .outer_join(table("a", &[]))
            .unwrap_err();
        assert_matches!(err, OwidError::DuplicateColumn(column) if column == "a");
    }

    #[test]
    fn write_csv_leaves_missing_cells_empty() {
        let joined = table("a", &[("USA", 2020, 5.0)])
            .outer_join(table("b", &[("FRA", 2020, 1.5)]))
            .unwrap();
        let mut buffer = Vec::new();
        joined.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "Code,Year,a,b\nFRA,2020,,1.5\nUSA,2020,5,\n");
    }

    #[test]
    fn write_csv_keeps_source_number_text() {
        let mut t = Table::new(vec!["a".to_string()]);
        t.insert(EntityKey::new("USA", 2020), vec![Some(Value::parse("5.00"))]);
        t.insert(
            EntityKey::new("USA", 2021),
            vec![Some(Value::parse("9007199254740993"))],
        );
        t.insert(EntityKey::new("USA", 2022), vec![Some(Value::parse(" 1e-7 "))]);
        assert_eq!(
            t.get(&EntityKey::new("USA", 2020), "a").and_then(Value::as_f64),
            Some(5.0)
        );
        let mut buffer = Vec::new();
        t.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "Code,Year,a\nUSA,2020,5.00\nUSA,2021,9007199254740993\nUSA,2022,1e-7\n"
        );
    }
}
