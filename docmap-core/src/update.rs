//! Update documents.
//!
//! ```rust
//! use bson::doc;
//! use docmap_core::update::Update;
//!
//! let update = Update::new()
//!     .set("status", "shipped")
//!     .inc("attempts", 1)
//!     .push_each("history", ["packed", "sent"]);
//!
//! assert_eq!(
//!     update.to_document(),
//!     doc! {
//!         "$set": { "status": "shipped" },
//!         "$inc": { "attempts": 1 },
//!         "$push": { "history": { "$each": ["packed", "sent"] } },
//!     }
//! );
//! ```

use bson::{Bson, Document, doc};

use crate::criteria::Criteria;
use crate::error::MappingResult;

/// Which end of an array `$pop` removes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
}

/// A filter bound to a `$[identifier]` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayFilter {
    Criteria(Criteria),
    Document(Document),
}

impl ArrayFilter {
    /// Render the filter document.
    pub fn to_document(&self) -> MappingResult<Document> {
        match self {
            Self::Criteria(criteria) => criteria.to_document(),
            Self::Document(doc) => Ok(doc.clone()),
        }
    }
}

impl From<Criteria> for ArrayFilter {
    fn from(criteria: Criteria) -> Self {
        Self::Criteria(criteria)
    }
}

impl From<Document> for ArrayFilter {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

/// An ordered `operator → { field: value }` update, or a replacement document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    operations: Document,
    array_filters: Vec<ArrayFilter>,
}

impl Update {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a raw update or replacement document.
    pub fn from_document(document: Document) -> Self {
        Self {
            operations: document,
            array_filters: Vec::new(),
        }
    }

    fn add(mut self, operator: &str, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.operations.get_mut(operator) {
            Some(Bson::Document(fields)) => {
                fields.insert(key, value);
            }
            _ => {
                let mut fields = Document::new();
                fields.insert(key, value);
                self.operations.insert(operator, fields);
            }
        }
        self
    }

    /// `$set` a field.
    pub fn set(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$set", key, value)
    }

    /// `$unset` a field.
    pub fn unset(self, key: impl Into<String>) -> Self {
        self.add("$unset", key, 1)
    }

    /// `$setOnInsert` a field; only applied when an upsert inserts.
    pub fn set_on_insert(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$setOnInsert", key, value)
    }

    /// `$inc` a numeric field.
    pub fn inc(self, key: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.add("$inc", key, amount)
    }

    /// `$mul` a numeric field.
    pub fn mul(self, key: impl Into<String>, factor: impl Into<Bson>) -> Self {
        self.add("$mul", key, factor)
    }

    /// `$min`: keep the smaller value.
    pub fn min(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$min", key, value)
    }

    /// `$max`: keep the larger value.
    pub fn max(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$max", key, value)
    }

    /// `$rename` a field.
    pub fn rename(self, old: impl Into<String>, new: impl Into<String>) -> Self {
        let new: String = new.into();
        self.add("$rename", old, new)
    }

    /// Set a field to the current date.
    pub fn current_date(self, key: impl Into<String>) -> Self {
        self.add("$currentDate", key, true)
    }

    /// Set a field to the current timestamp.
    pub fn current_timestamp(self, key: impl Into<String>) -> Self {
        self.add("$currentDate", key, doc! { "$type": "timestamp" })
    }

    /// `$push` a value.
    pub fn push(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$push", key, value)
    }

    /// `$push` several values with `$each`.
    pub fn push_each<V: Into<Bson>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.add("$push", key, doc! { "$each": values })
    }

    /// `$addToSet` a value.
    pub fn add_to_set(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$addToSet", key, value)
    }

    /// `$addToSet` several values with `$each`.
    pub fn add_to_set_each<V: Into<Bson>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.add("$addToSet", key, doc! { "$each": values })
    }

    /// `$pull` values equal to `value`, or matching it when it is a condition document.
    pub fn pull(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.add("$pull", key, value)
    }

    /// `$pullAll` the listed values.
    pub fn pull_all<V: Into<Bson>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.add("$pullAll", key, values)
    }

    /// `$pop` the first or last element.
    pub fn pop(self, key: impl Into<String>, position: Position) -> Self {
        let end = match position {
            Position::First => -1,
            Position::Last => 1,
        };
        self.add("$pop", key, end)
    }

    /// Bind a filter to a `$[identifier]` placeholder.
    pub fn filter_array(mut self, filter: impl Into<ArrayFilter>) -> Self {
        self.array_filters.push(filter.into());
        self
    }

    /// The update document.
    pub fn to_document(&self) -> Document {
        self.operations.clone()
    }

    /// The update document, by reference.
    pub fn as_document(&self) -> &Document {
        &self.operations
    }

    /// Render the array filters.
    pub fn array_filters(&self) -> MappingResult<Vec<Document>> {
        self.array_filters.iter().map(ArrayFilter::to_document).collect()
    }

    /// Whether any array filter is set.
    pub fn has_array_filters(&self) -> bool {
        !self.array_filters.is_empty()
    }

    /// Whether this is a replacement: no top level key starts with `$`.
    pub fn is_replacement(&self) -> bool {
        !self.operations.keys().any(|k| k.starts_with('$'))
    }

    /// Whether any operator touches `key`.
    pub fn modifies(&self, key: &str) -> bool {
        if self.is_replacement() {
            return self.operations.contains_key(key);
        }
        self.operations.values().any(|fields| match fields {
            Bson::Document(fields) => fields.contains_key(key),
            _ => false,
        })
    }
}

impl From<Document> for Update {
    fn from(document: Document) -> Self {
        Self::from_document(document)
    }
}
