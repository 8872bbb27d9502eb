use crate::model::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One row of a query result: an ordered list of `(column name, value)` pairs. Field order is the
/// order in which the database returned the columns.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. A repeated name is kept as its own field, the way a query can return two
    /// columns with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    /// The column names in field order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// The value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// The value at position `index`.
    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|(_, value)| value)
    }
}

impl<S, V> FromIterator<(S, V)> for Record
where
    S: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.push(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The materialized rows returned by the query. The column set is the field names of the first
/// record; the database guarantees that every row shares it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// The column names, taken from the first record. Empty when there are no records.
    pub fn columns(&self) -> Vec<&str> {
        self.records
            .first()
            .map(|record| record.field_names().collect())
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<Record>> for ResultSet {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}
