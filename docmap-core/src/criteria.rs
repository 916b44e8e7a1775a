//! Criteria trees and queries.
//!
//! [`Criteria`] is a fluent builder in the spirit of a filter builder, but it
//! keeps a typed tree instead of a raw document so that combinators and
//! operator lists can be validated before rendering.
//!
//! ```rust
//! use bson::doc;
//! use docmap_core::criteria::Criteria;
//!
//! let filter = Criteria::new()
//!     .eq("status", "active")
//!     .gte("age", 18)
//!     .lt("age", 65)
//!     .or_operator([Criteria::new().eq("role", "admin"), Criteria::new().exists("owner", true)])
//!     .to_document()
//!     .unwrap();
//!
//! assert_eq!(
//!     filter,
//!     doc! {
//!         "status": "active",
//!         "age": { "$gte": 18, "$lt": 65 },
//!         "$or": [{ "role": "admin" }, { "owner": { "$exists": true } }],
//!     }
//! );
//! ```

use std::fmt;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{MappingError, MappingResult};

/// Query operators a field predicate can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    All,
    Exists,
    Type,
    Size,
    Regex,
    Options,
    ElemMatch,
    Not,
    Mod,
}

impl Operator {
    /// The operator key, e.g. `$gte`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::All => "$all",
            Self::Exists => "$exists",
            Self::Type => "$type",
            Self::Size => "$size",
            Self::Regex => "$regex",
            Self::Options => "$options",
            Self::ElemMatch => "$elemMatch",
            Self::Not => "$not",
            Self::Mod => "$mod",
        }
    }

    /// Parse an operator key.
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            "$all" => Self::All,
            "$exists" => Self::Exists,
            "$type" => Self::Type,
            "$size" => Self::Size,
            "$regex" => Self::Regex,
            "$options" => Self::Options,
            "$elemMatch" => Self::ElemMatch,
            "$not" => Self::Not,
            "$mod" => Self::Mod,
            _ => return None,
        })
    }

    /// Whether the operand is a list of values.
    pub fn takes_list(&self) -> bool {
        matches!(self, Self::In | Self::Nin | Self::All)
    }

    /// Whether the operand describes the query itself rather than a stored value.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Exists | Self::Type | Self::Size | Self::Regex | Self::Options
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The right-hand side of an operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Bson),
    Document(Document),
    List(Vec<Bson>),
}

impl Operand {
    /// Render the operand.
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Document(doc) => Bson::Document(doc.clone()),
            Self::List(values) => Bson::Array(values.clone()),
        }
    }
}

/// The condition placed on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Equality with a scalar or a whole embedded document.
    Equals(Bson),
    /// One or more operator conditions, in insertion order.
    Operators(Vec<(Operator, Operand)>),
}

impl Predicate {
    fn to_bson(&self) -> Bson {
        match self {
            Self::Equals(value) => value.clone(),
            Self::Operators(ops) => {
                let mut doc = Document::new();
                for (op, operand) in ops {
                    doc.insert(op.as_str(), operand.to_bson());
                }
                Bson::Document(doc)
            }
        }
    }
}

/// Logical combinators joining sibling criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    And,
    Or,
    Nor,
}

impl Combinator {
    /// The combinator key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
            Self::Nor => "$nor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Field(String, Predicate),
    Combined(Combinator, Vec<Criteria>),
}

/// A predicate tree rendered into a filter document.
///
/// Builder misuse (two equalities on the same field, an operator repeated on
/// a field, a combinator used twice) is recorded and reported by
/// [`Criteria::to_document`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    entries: Vec<Entry>,
    error: Option<String>,
}

impl Criteria {
    /// Create empty criteria (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a raw filter document. Every top level entry is kept as written.
    pub fn from_document(document: Document) -> Self {
        let entries = document
            .into_iter()
            .map(|(key, value)| Entry::Field(key, Predicate::Equals(value)))
            .collect();
        Self {
            entries,
            error: None,
        }
    }

    /// Whether no condition has been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The fields with conditions, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Field(key, predicate) => Some((key.as_str(), predicate)),
            Entry::Combined(..) => None,
        })
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| matches!(e, Entry::Field(key, _) if key == field))
    }

    /// Add an equality condition.
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        if self.position(field).is_some() {
            self.fail(format!("field '{}' already has a condition", field));
            return self;
        }
        self.entries
            .push(Entry::Field(field.to_string(), Predicate::Equals(value.into())));
        self
    }

    /// Add an operator condition on a field.
    pub fn op(mut self, field: &str, op: Operator, operand: Operand) -> Self {
        match self.position(field) {
            None => self.entries.push(Entry::Field(
                field.to_string(),
                Predicate::Operators(vec![(op, operand)]),
            )),
            Some(index) => match &mut self.entries[index] {
                Entry::Field(_, Predicate::Operators(ops)) => {
                    if ops.iter().any(|(existing, _)| *existing == op) {
                        self.fail(format!("operator {} used twice on '{}'", op, field));
                    } else {
                        ops.push((op, operand));
                    }
                }
                _ => self.fail(format!(
                    "field '{}' already has an equality condition",
                    field
                )),
            },
        }
        self
    }

    /// Add a not-equal condition.
    pub fn ne(self, field: &str, value: impl Into<Bson>) -> Self {
        self.op(field, Operator::Ne, Operand::Scalar(value.into()))
    }

    /// Add a greater-than condition.
    pub fn gt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.op(field, Operator::Gt, Operand::Scalar(value.into()))
    }

    /// Add a greater-than-or-equal condition.
    pub fn gte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.op(field, Operator::Gte, Operand::Scalar(value.into()))
    }

    /// Add a less-than condition.
    pub fn lt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.op(field, Operator::Lt, Operand::Scalar(value.into()))
    }

    /// Add a less-than-or-equal condition.
    pub fn lte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.op(field, Operator::Lte, Operand::Scalar(value.into()))
    }

    /// Add an "in" condition.
    pub fn in_values<V: Into<Bson>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.op(field, Operator::In, Operand::List(values))
    }

    /// Add a "not in" condition.
    pub fn not_in<V: Into<Bson>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.op(field, Operator::Nin, Operand::List(values))
    }

    /// Add an "all" condition.
    pub fn all<V: Into<Bson>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.op(field, Operator::All, Operand::List(values))
    }

    /// Add an exists condition.
    pub fn exists(self, field: &str, exists: bool) -> Self {
        self.op(field, Operator::Exists, Operand::Scalar(Bson::Boolean(exists)))
    }

    /// Add a type check condition.
    pub fn type_is(self, field: &str, bson_type: &str) -> Self {
        self.op(field, Operator::Type, Operand::Scalar(bson_type.into()))
    }

    /// Add an array size condition.
    pub fn size(self, field: &str, size: i32) -> Self {
        self.op(field, Operator::Size, Operand::Scalar(Bson::Int32(size)))
    }

    /// Add a regex condition, with options when given.
    pub fn regex(self, field: &str, pattern: &str, options: Option<&str>) -> Self {
        let criteria = self.op(field, Operator::Regex, Operand::Scalar(pattern.into()));
        match options {
            Some(options) => criteria.op(field, Operator::Options, Operand::Scalar(options.into())),
            None => criteria,
        }
    }

    /// Add a modulo condition.
    pub fn modulo(self, field: &str, divisor: i64, remainder: i64) -> Self {
        self.op(
            field,
            Operator::Mod,
            Operand::List(vec![Bson::Int64(divisor), Bson::Int64(remainder)]),
        )
    }

    /// Match array elements against nested criteria.
    pub fn elem_match(mut self, field: &str, criteria: Criteria) -> Self {
        match criteria.to_document() {
            Ok(doc) => self.op(field, Operator::ElemMatch, Operand::Document(doc)),
            Err(err) => {
                self.fail(err.to_string());
                self
            }
        }
    }

    /// Negate an operator expression, e.g. `doc! { "$gt": 5 }`.
    pub fn not(self, field: &str, expression: Document) -> Self {
        self.op(field, Operator::Not, Operand::Document(expression))
    }

    fn combine(mut self, combinator: Combinator, criteria: Vec<Criteria>) -> Self {
        let repeated = self
            .entries
            .iter()
            .any(|e| matches!(e, Entry::Combined(c, _) if *c == combinator));
        if repeated {
            self.fail(format!("{} used twice at the same level", combinator.as_str()));
        } else {
            self.entries.push(Entry::Combined(combinator, criteria));
        }
        self
    }

    /// Join criteria with `$and`.
    pub fn and_operator(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.combine(Combinator::And, criteria.into_iter().collect())
    }

    /// Join criteria with `$or`.
    pub fn or_operator(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.combine(Combinator::Or, criteria.into_iter().collect())
    }

    /// Join criteria with `$nor`.
    pub fn nor_operator(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.combine(Combinator::Nor, criteria.into_iter().collect())
    }

    /// Render the tree into a filter document.
    pub fn to_document(&self) -> MappingResult<Document> {
        if let Some(message) = &self.error {
            return Err(MappingError::invalid_criteria(message.clone()));
        }

        let mut document = Document::new();
        for entry in &self.entries {
            match entry {
                Entry::Field(key, predicate) => {
                    if document.contains_key(key) {
                        return Err(MappingError::invalid_criteria(format!(
                            "key '{}' rendered twice",
                            key
                        )));
                    }
                    document.insert(key.clone(), predicate.to_bson());
                }
                Entry::Combined(combinator, children) => {
                    let key = combinator.as_str();
                    if document.contains_key(key) {
                        return Err(MappingError::invalid_criteria(format!(
                            "key '{}' rendered twice",
                            key
                        )));
                    }
                    let rendered = children
                        .iter()
                        .map(|c| c.to_document().map(Bson::Document))
                        .collect::<MappingResult<Vec<_>>>()?;
                    document.insert(key, rendered);
                }
            }
        }
        Ok(document)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    fn as_i32(&self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// An ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    orders: Vec<(String, Direction)>,
}

impl Sort {
    /// Sort by one field.
    pub fn by(field: impl Into<String>, direction: Direction) -> Self {
        Self::default().then(field, direction)
    }

    /// Add a tie-breaking field.
    pub fn then(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.orders.push((field.into(), direction));
        self
    }

    /// Whether no sort key is set.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Render as a sort document.
    pub fn to_document(&self) -> Document {
        self.orders
            .iter()
            .map(|(field, direction)| (field.clone(), Bson::Int32(direction.as_i32())))
            .collect()
    }
}

/// Language-specific string comparison rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collation {
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_level: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_ordering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backwards: Option<bool>,
}

impl Collation {
    /// A collation for the given locale with server defaults otherwise.
    pub fn of(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            ..Default::default()
        }
    }

    /// Set the comparison strength (1 to 5).
    pub fn strength(mut self, strength: u32) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Compare numeric substrings by value.
    pub fn numeric_ordering(mut self, enabled: bool) -> Self {
        self.numeric_ordering = Some(enabled);
        self
    }

    /// Include case in strength 1 and 2 comparisons.
    pub fn case_level(mut self, enabled: bool) -> Self {
        self.case_level = Some(enabled);
        self
    }

    /// Render as the collation document sent with commands.
    pub fn to_document(&self) -> Document {
        let mut document = doc! { "locale": self.locale.as_str() };
        if let Some(strength) = self.strength {
            document.insert("strength", i64::from(strength));
        }
        if let Some(case_level) = self.case_level {
            document.insert("caseLevel", case_level);
        }
        if let Some(case_first) = &self.case_first {
            document.insert("caseFirst", case_first.as_str());
        }
        if let Some(numeric) = self.numeric_ordering {
            document.insert("numericOrdering", numeric);
        }
        if let Some(alternate) = &self.alternate {
            document.insert("alternate", alternate.as_str());
        }
        if let Some(max_variable) = &self.max_variable {
            document.insert("maxVariable", max_variable.as_str());
        }
        if let Some(normalization) = self.normalization {
            document.insert("normalization", normalization);
        }
        if let Some(backwards) = self.backwards {
            document.insert("backwards", backwards);
        }
        document
    }
}

/// Criteria plus sort, paging, projection and collation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    criteria: Criteria,
    sort: Sort,
    skip: Option<u64>,
    limit: Option<i64>,
    projection: Document,
    collation: Option<Collation>,
}

impl Query {
    /// Query matching the criteria.
    pub fn new(criteria: Criteria) -> Self {
        Self {
            criteria,
            ..Default::default()
        }
    }

    /// Query matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query from a raw filter document.
    pub fn from_document(filter: Document) -> Self {
        Self::new(Criteria::from_document(filter))
    }

    /// Set the sort order.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Skip the first `skip` matches.
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Return at most `limit` matches.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Include a field in the projection.
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.projection.insert(field.into(), 1);
        self
    }

    /// Exclude a field from the projection.
    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.projection.insert(field.into(), 0);
        self
    }

    /// Set the collation.
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// The criteria.
    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Render the filter document.
    pub fn filter(&self) -> MappingResult<Document> {
        self.criteria.to_document()
    }

    /// The sort order.
    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// The number of matches to skip.
    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    /// The maximum number of matches.
    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    /// The projection document (empty when every field is returned).
    pub fn projection(&self) -> &Document {
        &self.projection
    }

    /// The collation.
    pub fn collation(&self) -> Option<&Collation> {
        self.collation.as_ref()
    }
}

impl From<Criteria> for Query {
    fn from(criteria: Criteria) -> Self {
        Self::new(criteria)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operators_accumulate_per_field() {
        let filter = Criteria::new()
            .gt("age", 18)
            .lte("age", 30)
            .in_values("tags", ["a", "b"])
            .regex("name", "^J", Some("i"))
            .to_document()
            .unwrap();

        assert_eq!(
            filter,
            doc! {
                "age": { "$gt": 18, "$lte": 30 },
                "tags": { "$in": ["a", "b"] },
                "name": { "$regex": "^J", "$options": "i" },
            }
        );
    }

    #[test]
    fn test_nested_combinators() {
        let filter = Criteria::new()
            .nor_operator([Criteria::new().eq("a", 1)])
            .and_operator([
                Criteria::new().or_operator([Criteria::new().eq("b", 2), Criteria::new().eq("c", 3)]),
                Criteria::new().elem_match("items", Criteria::new().gt("qty", 5)),
            ])
            .to_document()
            .unwrap();

        assert_eq!(
            filter,
            doc! {
                "$nor": [{ "a": 1 }],
                "$and": [
                    { "$or": [{ "b": 2 }, { "c": 3 }] },
                    { "items": { "$elemMatch": { "qty": { "$gt": 5 } } } },
                ],
            }
        );
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let err = Criteria::new().eq("a", 1).eq("a", 2).to_document().unwrap_err();
        assert!(matches!(err, MappingError::InvalidCriteria(_)));

        let err = Criteria::new().gt("a", 1).gt("a", 2).to_document().unwrap_err();
        assert!(err.to_string().contains("$gt used twice"));

        let err = Criteria::new().eq("a", 1).gt("a", 2).to_document().unwrap_err();
        assert!(matches!(err, MappingError::InvalidCriteria(_)));

        let err = Criteria::new()
            .or_operator([Criteria::new()])
            .or_operator([Criteria::new()])
            .to_document()
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidCriteria(_)));
    }

    #[test]
    fn test_from_document_is_lossless() {
        let raw = doc! { "_id": { "$in": [1, 2] }, "$or": [{ "x": 1 }] };
        assert_eq!(Criteria::from_document(raw.clone()).to_document().unwrap(), raw);
    }

    #[test]
    fn test_query_parts() {
        let query = Query::new(Criteria::new().eq("status", "A"))
            .with_sort(Sort::by("age", Direction::Descending).then("name", Direction::Ascending))
            .with_skip(10)
            .with_limit(5)
            .include("name")
            .with_collation(Collation::of("fr").strength(2));

        assert_eq!(query.filter().unwrap(), doc! { "status": "A" });
        assert_eq!(query.sort().to_document(), doc! { "age": -1, "name": 1 });
        assert_eq!(query.skip(), Some(10));
        assert_eq!(query.limit(), Some(5));
        assert_eq!(query.projection(), &doc! { "name": 1 });
        assert_eq!(
            query.collation().unwrap().to_document(),
            doc! { "locale": "fr", "strength": 2_i64 }
        );
    }

    #[test]
    fn test_operator_keys() {
        assert_eq!(Operator::from_key("$elemMatch"), Some(Operator::ElemMatch));
        assert_eq!(Operator::from_key("$near"), None);
        assert!(Operator::Nin.takes_list());
        assert!(Operator::Exists.is_structural());
        assert!(!Operator::Gt.is_structural());
    }
}
