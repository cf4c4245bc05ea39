//! Ordered name→value rows.
//!
//! A [`Row`] is what a record turns into when its columns are bound as
//! statement parameters, and what a connection hands back for every result
//! row. Columns keep the order in which they were pushed.

use super::value::SqlValue;

/// An ordered mapping from column (or parameter) name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, SqlValue<'static>)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty row with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append a column, replacing the value if the name is already present.
    pub fn push(&mut self, name: impl Into<String>, value: SqlValue<'static>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue<'static>>) -> Self {
        self.push(name, value.into());
        self
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&SqlValue<'static>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Remove a column and return its value.
    pub fn remove(&mut self, name: &str) -> Option<SqlValue<'static>> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue<'static>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, SqlValue<'static>)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue<'static>)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.push(name, value);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, SqlValue<'static>);
    type IntoIter = std::vec::IntoIter<(String, SqlValue<'static>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
