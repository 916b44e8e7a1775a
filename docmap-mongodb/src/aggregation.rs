//! Aggregation pipelines written against entity properties.
//!
//! An [`Aggregation`] collects stages using property names and `"$property"`
//! field references. Binding it to an entity with [`Aggregation::typed`] lets
//! the [`AggregationMapper`] rewrite the pipeline into stored field names
//! before it is sent.
//!
//! Stages are mapped against the entity until the first stage that reshapes
//! documents (`$group`, `$project`, `$replaceRoot`, `$facet`, `$bucket`,
//! `$count`). Later stages refer to fields the pipeline itself produced and
//! are passed through unchanged.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bson::doc;
//! use docmap_core::prelude::*;
//! use docmap_mongodb::aggregation::{Aggregation, AggregationMapper, accumulators};
//!
//! let context = Arc::new(MappingContext::new());
//! context
//!     .register(
//!         EntityDescriptor::builder("Order")
//!             .property(PropertyDescriptor::new("customerId", PropertyKind::String).field("cid"))
//!             .property(PropertyDescriptor::new("total", PropertyKind::Double))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let mapper = AggregationMapper::new(QueryMapper::new(Arc::new(DocumentConverter::new(context))));
//! let aggregation = Aggregation::new()
//!     .group("$customerId", doc! { "spent": accumulators::sum("$total") })
//!     .typed("Order");
//!
//! assert_eq!(
//!     mapper.map_pipeline(&aggregation).unwrap(),
//!     vec![doc! { "$group": { "_id": "$cid", "spent": { "$sum": "$total" } } }]
//! );
//! ```

use bson::{Bson, Document, doc};
use docmap_core::criteria::{Collation, Criteria, Sort};
use docmap_core::error::{MappingError, MappingResult};
use docmap_core::mapping::EntityDescriptor;
use docmap_core::query_mapper::QueryMapper;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Stages after which field references no longer name entity properties.
const RESHAPING_STAGES: &[&str] = &[
    "$group",
    "$project",
    "$replaceRoot",
    "$replaceWith",
    "$facet",
    "$bucket",
    "$bucketAuto",
    "$count",
];

/// Options passed along with the `aggregate` command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOptions {
    /// Allow stages to spill to disk.
    pub allow_disk_use: Option<bool>,
    /// Documents per cursor batch.
    pub batch_size: Option<u32>,
    /// Collation for string comparisons.
    pub collation: Option<Collation>,
}

/// What `$merge` does with a document that matches an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhenMatched {
    /// Replace the existing document.
    Replace,
    /// Keep the existing document.
    KeepExisting,
    /// Merge the fields into the existing document.
    Merge,
    /// Abort the aggregation.
    Fail,
    /// Update the existing document with a pipeline.
    Pipeline(Vec<Document>),
}

/// What `$merge` does with a document that matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhenNotMatched {
    /// Insert it.
    Insert,
    /// Drop it.
    Discard,
    /// Abort the aggregation.
    Fail,
}

/// Target and behavior of a `$merge` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSpec {
    /// Output collection.
    pub into: String,
    /// Fields identifying a match.
    pub on: Vec<String>,
    /// Behavior on match.
    pub when_matched: WhenMatched,
    /// Behavior without a match.
    pub when_not_matched: WhenNotMatched,
}

impl MergeSpec {
    /// Merge into a collection on `_id`, replacing matches and inserting the rest.
    pub fn into(collection: impl Into<String>) -> Self {
        Self {
            into: collection.into(),
            on: vec!["_id".to_string()],
            when_matched: WhenMatched::Replace,
            when_not_matched: WhenNotMatched::Insert,
        }
    }

    /// Render the stage body.
    pub fn to_document(&self) -> Document {
        let when_matched = match &self.when_matched {
            WhenMatched::Replace => Bson::from("replace"),
            WhenMatched::KeepExisting => Bson::from("keepExisting"),
            WhenMatched::Merge => Bson::from("merge"),
            WhenMatched::Fail => Bson::from("fail"),
            WhenMatched::Pipeline(stages) => Bson::Array(stages.iter().cloned().map(Bson::Document).collect()),
        };
        let when_not_matched = match self.when_not_matched {
            WhenNotMatched::Insert => "insert",
            WhenNotMatched::Discard => "discard",
            WhenNotMatched::Fail => "fail",
        };
        doc! {
            "into": self.into.as_str(),
            "on": self.on.clone(),
            "whenMatched": when_matched,
            "whenNotMatched": when_not_matched,
        }
    }
}

/// An aggregation pipeline under construction.
///
/// Stage rendering errors are recorded and reported by
/// [`Aggregation::pipeline`], so stages chain without `?`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    stages: Vec<Document>,
    options: AggregationOptions,
    error: Option<String>,
}

impl Aggregation {
    /// Start an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from raw stages.
    pub fn from_stages(stages: impl IntoIterator<Item = Document>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Append a raw stage.
    pub fn stage(mut self, stage: Document) -> Self {
        self.stages.push(stage);
        self
    }

    /// Filter with criteria.
    pub fn match_criteria(mut self, criteria: &Criteria) -> Self {
        match criteria.to_document() {
            Ok(filter) => self.stages.push(stages::match_stage(filter)),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err.to_string());
                }
            }
        }
        self
    }

    /// Keep only the named properties.
    pub fn project<'a>(self, properties: impl IntoIterator<Item = &'a str>) -> Self {
        let fields: Document = properties.into_iter().map(|p| (p.to_string(), Bson::Int32(1))).collect();
        self.stage(stages::project(fields))
    }

    /// Group by an expression.
    pub fn group(self, id: impl Into<Bson>, accumulators: Document) -> Self {
        self.stage(stages::group(id, accumulators))
    }

    /// Sort.
    pub fn sort(self, sort: &Sort) -> Self {
        self.stage(stages::sort(sort.to_document()))
    }

    /// Skip documents.
    pub fn skip(self, n: u64) -> Self {
        self.stage(stages::skip(n))
    }

    /// Limit documents.
    pub fn limit(self, n: u64) -> Self {
        self.stage(stages::limit(n))
    }

    /// Deconstruct an array property.
    pub fn unwind(self, property: &str) -> Self {
        self.stage(stages::unwind(property))
    }

    /// Join another collection.
    pub fn lookup(self, from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Self {
        self.stage(stages::lookup(from, local_field, foreign_field, as_field))
    }

    /// Add computed fields.
    pub fn add_fields(self, fields: Document) -> Self {
        self.stage(stages::add_fields(fields))
    }

    /// Count documents into a field.
    pub fn count(self, field: &str) -> Self {
        self.stage(stages::count(field))
    }

    /// Random sample.
    pub fn sample(self, size: u64) -> Self {
        self.stage(stages::sample(size))
    }

    /// Write the results to a collection, replacing it.
    pub fn out(self, collection: &str) -> Self {
        self.stage(stages::out(collection))
    }

    /// Merge the results into a collection.
    pub fn merge(self, spec: &MergeSpec) -> Self {
        self.stage(stages::merge(spec))
    }

    /// Allow stages to spill to disk.
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.options.allow_disk_use = Some(allow);
        self
    }

    /// Documents per cursor batch.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.options.batch_size = Some(size);
        self
    }

    /// Collation for string comparisons.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.options.collation = Some(collation);
        self
    }

    /// The command options.
    pub fn options(&self) -> &AggregationOptions {
        &self.options
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether no stage was added.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The stages, or the first recorded error.
    pub fn pipeline(&self) -> MappingResult<Vec<Document>> {
        match &self.error {
            Some(message) => Err(MappingError::invalid_criteria(message.clone())),
            None => Ok(self.stages.clone()),
        }
    }

    /// Bind the pipeline to an entity.
    pub fn typed(self, entity: impl Into<String>) -> TypedAggregation {
        TypedAggregation {
            entity: entity.into(),
            aggregation: self,
        }
    }
}

/// An aggregation bound to an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedAggregation {
    entity: String,
    aggregation: Aggregation,
}

impl TypedAggregation {
    /// Bind an aggregation to an entity.
    pub fn new(entity: impl Into<String>, aggregation: Aggregation) -> Self {
        aggregation.typed(entity)
    }

    /// The entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The unmapped aggregation.
    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }
}

/// Rewrites pipelines from property names to stored field names.
#[derive(Debug, Clone)]
pub struct AggregationMapper {
    query_mapper: QueryMapper,
}

impl AggregationMapper {
    /// Create a mapper.
    pub fn new(query_mapper: QueryMapper) -> Self {
        Self { query_mapper }
    }

    /// The query mapper used for `$match` stages.
    pub fn query_mapper(&self) -> &QueryMapper {
        &self.query_mapper
    }

    /// Map the pipeline of a typed aggregation.
    pub fn map_pipeline(&self, aggregation: &TypedAggregation) -> MappingResult<Vec<Document>> {
        let entity = self.query_mapper.context().require(aggregation.entity())?;
        let stages = aggregation.aggregation().pipeline()?;
        Ok(self.map_stages(&stages, Some(entity.as_ref())))
    }

    /// Map raw stages against an entity.
    pub fn map_stages(&self, stages: &[Document], entity: Option<&EntityDescriptor>) -> Vec<Document> {
        let mut scope = entity;
        stages
            .iter()
            .map(|stage| {
                let mapped = match scope {
                    Some(entity) => self.map_stage(stage, entity),
                    None => stage.clone(),
                };
                if stage.keys().any(|k| RESHAPING_STAGES.contains(&k.as_str())) {
                    scope = None;
                }
                mapped
            })
            .collect()
    }

    fn map_stage(&self, stage: &Document, entity: &EntityDescriptor) -> Document {
        let mut mapped = Document::new();
        for (name, body) in stage {
            let body = match (name.as_str(), body) {
                ("$match", Bson::Document(filter)) => {
                    Bson::Document(self.query_mapper.map_query(filter, Some(entity)))
                }
                ("$sort", Bson::Document(sort)) => {
                    Bson::Document(self.query_mapper.map_fields(sort, Some(entity)))
                }
                ("$project" | "$addFields" | "$set", Bson::Document(fields)) => {
                    Bson::Document(self.map_projection(fields, entity))
                }
                ("$group", Bson::Document(group)) => Bson::Document(
                    group
                        .iter()
                        .map(|(key, expr)| (key.clone(), self.map_expression(expr, entity)))
                        .collect(),
                ),
                ("$unwind", Bson::String(_)) => self.map_expression(body, entity),
                ("$unwind", Bson::Document(options)) => {
                    let mut options = options.clone();
                    if let Some(path) = options.get("path").cloned() {
                        options.insert("path", self.map_expression(&path, entity));
                    }
                    Bson::Document(options)
                }
                ("$lookup", Bson::Document(lookup)) => {
                    let mut lookup = lookup.clone();
                    if let Ok(local) = lookup.get_str("localField") {
                        let local = self.field(local, entity);
                        lookup.insert("localField", local);
                    }
                    Bson::Document(lookup)
                }
                ("$unset", Bson::String(field)) => Bson::String(self.field(field, entity)),
                ("$unset", Bson::Array(fields)) => Bson::Array(
                    fields
                        .iter()
                        .map(|f| match f {
                            Bson::String(field) => Bson::String(self.field(field, entity)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                _ => body.clone(),
            };
            mapped.insert(name.clone(), body);
        }
        trace!(entity = entity.name(), stage = ?mapped, "Mapped aggregation stage");
        mapped
    }

    fn map_projection(&self, fields: &Document, entity: &EntityDescriptor) -> Document {
        fields
            .iter()
            .map(|(key, expr)| (self.field(key, entity), self.map_expression(expr, entity)))
            .collect()
    }

    fn field(&self, property: &str, entity: &EntityDescriptor) -> String {
        self.query_mapper
            .context()
            .resolve_path(Some(entity), property)
            .path
    }

    /// Rewrite `"$property"` references inside an expression.
    fn map_expression(&self, expr: &Bson, entity: &EntityDescriptor) -> Bson {
        match expr {
            Bson::String(reference) if reference.starts_with('$') && !reference.starts_with("$$") => {
                Bson::String(format!("${}", self.field(&reference[1..], entity)))
            }
            Bson::Array(items) => {
                Bson::Array(items.iter().map(|item| self.map_expression(item, entity)).collect())
            }
            Bson::Document(document) => Bson::Document(
                document
                    .iter()
                    .map(|(key, value)| {
                        let value = if key == "$literal" {
                            value.clone()
                        } else {
                            self.map_expression(value, entity)
                        };
                        (key.clone(), value)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Stage constructors.
pub mod stages {
    use bson::{Bson, Document, doc};

    use super::MergeSpec;

    // Counts beyond `i64::MAX` saturate; the server caps them anyway.
    fn clamp(n: u64) -> i64 {
        i64::try_from(n).unwrap_or(i64::MAX)
    }

    /// `$match`.
    pub fn match_stage(filter: Document) -> Document {
        doc! { "$match": filter }
    }

    /// `$project`.
    pub fn project(fields: Document) -> Document {
        doc! { "$project": fields }
    }

    /// `$group` with `_id` first.
    pub fn group(id: impl Into<Bson>, accumulators: Document) -> Document {
        let mut body = doc! { "_id": id.into() };
        body.extend(accumulators);
        doc! { "$group": body }
    }

    /// `$sort`.
    pub fn sort(fields: Document) -> Document {
        doc! { "$sort": fields }
    }

    /// `$skip`.
    pub fn skip(n: u64) -> Document {
        doc! { "$skip": clamp(n) }
    }

    /// `$limit`.
    pub fn limit(n: u64) -> Document {
        doc! { "$limit": clamp(n) }
    }

    fn field_path(path: &str) -> String {
        if path.starts_with('$') {
            path.to_string()
        } else {
            format!("${path}")
        }
    }

    /// `$unwind` on a field path, with or without the leading `$`.
    pub fn unwind(path: &str) -> Document {
        doc! { "$unwind": field_path(path) }
    }

    /// `$unwind` keeping documents whose array is missing or empty.
    pub fn unwind_preserving(path: &str, index_field: Option<&str>) -> Document {
        let mut body = doc! {
            "path": field_path(path),
            "preserveNullAndEmptyArrays": true,
        };
        if let Some(index_field) = index_field {
            body.insert("includeArrayIndex", index_field);
        }
        doc! { "$unwind": body }
    }

    /// `$lookup` by equality.
    pub fn lookup(from: &str, local_field: &str, foreign_field: &str, as_field: &str) -> Document {
        doc! {
            "$lookup": {
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "as": as_field,
            }
        }
    }

    /// `$count`.
    pub fn count(field: &str) -> Document {
        doc! { "$count": field }
    }

    /// `$addFields`.
    pub fn add_fields(fields: Document) -> Document {
        doc! { "$addFields": fields }
    }

    /// `$set`.
    pub fn set(fields: Document) -> Document {
        doc! { "$set": fields }
    }

    /// `$unset`.
    pub fn unset<'a>(fields: impl IntoIterator<Item = &'a str>) -> Document {
        let fields: Vec<&str> = fields.into_iter().collect();
        match fields.as_slice() {
            [single] => doc! { "$unset": *single },
            many => doc! { "$unset": many.to_vec() },
        }
    }

    /// `$replaceRoot`.
    pub fn replace_root(new_root: impl Into<Bson>) -> Document {
        doc! { "$replaceRoot": { "newRoot": new_root.into() } }
    }

    /// `$facet` from named sub-pipelines.
    pub fn facet<'a>(facets: impl IntoIterator<Item = (&'a str, Vec<Document>)>) -> Document {
        let body: Document = facets
            .into_iter()
            .map(|(name, pipeline)| (name.to_string(), Bson::from(pipeline)))
            .collect();
        doc! { "$facet": body }
    }

    /// `$bucket`.
    pub fn bucket(
        group_by: impl Into<Bson>,
        boundaries: impl IntoIterator<Item = Bson>,
        default_bucket: impl Into<Bson>,
        output: Document,
    ) -> Document {
        doc! {
            "$bucket": {
                "groupBy": group_by.into(),
                "boundaries": boundaries.into_iter().collect::<Vec<_>>(),
                "default": default_bucket.into(),
                "output": output,
            }
        }
    }

    /// `$sample`.
    pub fn sample(size: u64) -> Document {
        doc! { "$sample": { "size": clamp(size) } }
    }

    /// `$out`.
    pub fn out(collection: &str) -> Document {
        doc! { "$out": collection }
    }

    /// `$merge`.
    pub fn merge(spec: &MergeSpec) -> Document {
        doc! { "$merge": spec.to_document() }
    }
}

/// `$group` accumulators.
pub mod accumulators {
    use bson::{Bson, doc};

    fn accumulator(operator: &str, expr: impl Into<Bson>) -> Bson {
        let mut body = bson::Document::new();
        body.insert(operator, expr.into());
        Bson::Document(body)
    }

    /// `$sum`.
    pub fn sum(expr: impl Into<Bson>) -> Bson {
        accumulator("$sum", expr)
    }

    /// `$avg`.
    pub fn avg(expr: impl Into<Bson>) -> Bson {
        accumulator("$avg", expr)
    }

    /// `$min`.
    pub fn min(expr: impl Into<Bson>) -> Bson {
        accumulator("$min", expr)
    }

    /// `$max`.
    pub fn max(expr: impl Into<Bson>) -> Bson {
        accumulator("$max", expr)
    }

    /// `$first`.
    pub fn first(expr: impl Into<Bson>) -> Bson {
        accumulator("$first", expr)
    }

    /// `$last`.
    pub fn last(expr: impl Into<Bson>) -> Bson {
        accumulator("$last", expr)
    }

    /// `$push`.
    pub fn push(expr: impl Into<Bson>) -> Bson {
        accumulator("$push", expr)
    }

    /// `$addToSet`.
    pub fn add_to_set(expr: impl Into<Bson>) -> Bson {
        accumulator("$addToSet", expr)
    }

    /// Number of documents in the group.
    pub fn count() -> Bson {
        Bson::Document(doc! { "$sum": 1 })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use docmap_core::convert::DocumentConverter;
    use docmap_core::criteria::Direction;
    use docmap_core::mapping::{IdKind, MappingContext, PropertyDescriptor, PropertyKind};
    use pretty_assertions::assert_eq;

    fn mapper() -> AggregationMapper {
        let context = Arc::new(MappingContext::new());
        context
            .register(
                EntityDescriptor::builder("Order")
                    .collection("orders")
                    .id("id", IdKind::String)
                    .property(PropertyDescriptor::new("customerId", PropertyKind::String).field("cid"))
                    .property(PropertyDescriptor::new("total", PropertyKind::Double).field("amt"))
                    .property(
                        PropertyDescriptor::new("tags", PropertyKind::Array(Box::new(PropertyKind::String)))
                            .field("tg"),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap();
        AggregationMapper::new(QueryMapper::new(Arc::new(DocumentConverter::new(context))))
    }

    #[test]
    fn test_stages_mapped_until_reshaped() {
        let aggregation = Aggregation::new()
            .match_criteria(&Criteria::new().gt("total", 10.0))
            .unwind("tags")
            .sort(&Sort::by("total", Direction::Descending))
            .group("$customerId", doc! { "spent": accumulators::sum("$total") })
            .sort(&Sort::by("total", Direction::Ascending))
            .typed("Order");

        let pipeline = mapper().map_pipeline(&aggregation).unwrap();
        assert_eq!(
            pipeline,
            vec![
                doc! { "$match": { "amt": { "$gt": 10.0 } } },
                doc! { "$unwind": "$tg" },
                doc! { "$sort": { "amt": -1 } },
                doc! { "$group": { "_id": "$cid", "spent": { "$sum": "$amt" } } },
                doc! { "$sort": { "total": 1 } },
            ]
        );
    }

    #[test]
    fn test_projection_and_expressions() {
        let aggregation = Aggregation::new()
            .add_fields(doc! {
                "doubled": { "$multiply": ["$total", 2] },
                "label": { "$literal": "$total" },
                "current": "$$ROOT",
            })
            .project(["customerId", "doubled"])
            .typed("Order");

        let pipeline = mapper().map_pipeline(&aggregation).unwrap();
        assert_eq!(
            pipeline[0],
            doc! {
                "$addFields": {
                    "doubled": { "$multiply": ["$amt", 2] },
                    "label": { "$literal": "$total" },
                    "current": "$$ROOT",
                }
            }
        );
        assert_eq!(pipeline[1], doc! { "$project": { "cid": 1, "doubled": 1 } });
    }

    #[test]
    fn test_unknown_entity() {
        let err = mapper()
            .map_pipeline(&Aggregation::new().count("n").typed("Ghost"))
            .unwrap_err();
        assert!(err.is_unknown_entity());
    }

    #[test]
    fn test_invalid_criteria_is_deferred() {
        let aggregation = Aggregation::new()
            .match_criteria(&Criteria::new().eq("total", 1).eq("total", 2))
            .limit(5);
        assert_eq!(aggregation.len(), 1);
        assert!(aggregation.pipeline().is_err());
    }

    #[test]
    fn test_options() {
        let aggregation = Aggregation::new()
            .allow_disk_use(true)
            .batch_size(50)
            .collation(Collation::of("fr"));
        assert_eq!(aggregation.options().allow_disk_use, Some(true));
        assert_eq!(aggregation.options().batch_size, Some(50));
        assert_eq!(aggregation.options().collation, Some(Collation::of("fr")));
    }

    #[test]
    fn test_stage_helpers() {
        assert_eq!(stages::unwind("$items"), doc! { "$unwind": "$items" });
        assert_eq!(
            stages::unwind_preserving("items", Some("i")),
            doc! {
                "$unwind": {
                    "path": "$items",
                    "preserveNullAndEmptyArrays": true,
                    "includeArrayIndex": "i",
                }
            }
        );
        assert_eq!(stages::unset(["a"]), doc! { "$unset": "a" });
        assert_eq!(stages::unset(["a", "b"]), doc! { "$unset": ["a", "b"] });
        assert_eq!(
            stages::group("$dept", doc! { "n": accumulators::count() }),
            doc! { "$group": { "_id": "$dept", "n": { "$sum": 1 } } }
        );
    }

    #[test]
    fn test_large_counts_saturate() {
        assert_eq!(stages::skip(10), doc! { "$skip": 10_i64 });
        assert_eq!(stages::limit(u64::MAX), doc! { "$limit": i64::MAX });
        assert_eq!(
            stages::sample(u64::MAX),
            doc! { "$sample": { "size": i64::MAX } }
        );
    }

    #[test]
    fn test_merge_stage() {
        let mut spec = MergeSpec::into("stats");
        spec.when_matched = WhenMatched::KeepExisting;
        spec.when_not_matched = WhenNotMatched::Discard;
        assert_eq!(
            stages::merge(&spec),
            doc! {
                "$merge": {
                    "into": "stats",
                    "on": ["_id"],
                    "whenMatched": "keepExisting",
                    "whenNotMatched": "discard",
                }
            }
        );
        assert_eq!(stages::out("archive"), doc! { "$out": "archive" });
    }
}
