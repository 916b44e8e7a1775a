//! Read-only views backed by aggregation pipelines.
//!
//! A view can be declared from raw stages, or from a [`TypedAggregation`] in
//! which case the pipeline is mapped to stored field names and the view is
//! defined on the entity's collection.
//!
//! # Example
//!
//! ```rust,ignore
//! use docmap_mongodb::aggregation::Aggregation;
//! use docmap_mongodb::view::AggregationView;
//!
//! let adults = Aggregation::new()
//!     .match_criteria(&Criteria::new().gte("age", 18))
//!     .project(["firstName", "lastName"])
//!     .typed("Person");
//!
//! client.create_typed_view("adults", &adults).await?;
//! ```

use bson::{Bson, Document, doc};
use docmap_core::criteria::Collation;
use docmap_core::error::MappingResult;
use futures::TryStreamExt;
use tracing::{debug, info};

use crate::aggregation::{AggregationMapper, MergeSpec, TypedAggregation, stages};
use crate::client::MongoClient;
use crate::error::{MongoError, MongoResult};

/// A view definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationView {
    /// The name of the view.
    pub name: String,
    /// The collection the view reads from.
    pub source_collection: String,
    /// The pipeline, in stored field names.
    pub pipeline: Vec<Document>,
    /// Optional collation for string comparisons.
    pub collation: Option<Collation>,
}

impl AggregationView {
    /// Create a view over raw stages.
    pub fn new(
        name: impl Into<String>,
        source_collection: impl Into<String>,
        pipeline: Vec<Document>,
    ) -> Self {
        Self {
            name: name.into(),
            source_collection: source_collection.into(),
            pipeline,
            collation: None,
        }
    }

    /// Create a builder for a view.
    pub fn builder(name: impl Into<String>) -> AggregationViewBuilder {
        AggregationViewBuilder::new(name)
    }

    /// Define a view from a typed aggregation.
    ///
    /// The source collection is the entity's collection and the collation is
    /// taken from the aggregation options.
    pub fn from_typed(
        name: impl Into<String>,
        aggregation: &TypedAggregation,
        mapper: &AggregationMapper,
    ) -> MappingResult<Self> {
        let entity = mapper
            .query_mapper()
            .context()
            .require(aggregation.entity())?;
        let pipeline = mapper.map_pipeline(aggregation)?;
        Ok(Self {
            name: name.into(),
            source_collection: entity.collection().to_string(),
            pipeline,
            collation: aggregation.aggregation().options().collation.clone(),
        })
    }

    /// Set the collation for string comparisons.
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// The `create` command for this view.
    pub fn to_create_command(&self) -> Document {
        let mut cmd = doc! {
            "create": self.name.as_str(),
            "viewOn": self.source_collection.as_str(),
            "pipeline": self.pipeline.iter().cloned().map(Bson::Document).collect::<Vec<_>>(),
        };

        if let Some(ref collation) = self.collation {
            cmd.insert("collation", collation.to_document());
        }

        cmd
    }

    fn from_listing(entry: &Document) -> MongoResult<Self> {
        let name = entry
            .get_str("name")
            .map_err(|e| MongoError::invalid_response(format!("missing view name: {e}")))?;
        let options = entry
            .get_document("options")
            .map_err(|e| MongoError::invalid_response(format!("missing options: {e}")))?;
        let view_on = options
            .get_str("viewOn")
            .map_err(|e| MongoError::invalid_response(format!("missing viewOn: {e}")))?;
        let pipeline = options
            .get_array("pipeline")
            .map_err(|e| MongoError::invalid_response(format!("missing pipeline: {e}")))?
            .iter()
            .filter_map(|stage| stage.as_document().cloned())
            .collect();
        let collation = options
            .get_document("collation")
            .ok()
            .and_then(|c| bson::from_document::<Collation>(c.clone()).ok());

        Ok(Self {
            name: name.to_string(),
            source_collection: view_on.to_string(),
            pipeline,
            collation,
        })
    }
}

/// Builder for views over raw stages.
#[derive(Debug, Default)]
pub struct AggregationViewBuilder {
    name: String,
    source_collection: Option<String>,
    pipeline: Vec<Document>,
    collation: Option<Collation>,
}

impl AggregationViewBuilder {
    /// Create a new builder with the given view name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the source collection.
    pub fn source_collection(mut self, collection: impl Into<String>) -> Self {
        self.source_collection = Some(collection.into());
        self
    }

    /// Set the pipeline.
    pub fn pipeline(mut self, pipeline: Vec<Document>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Append a stage.
    pub fn stage(mut self, stage: Document) -> Self {
        self.pipeline.push(stage);
        self
    }

    /// Set collation for string comparisons.
    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Build the view.
    pub fn build(self) -> MongoResult<AggregationView> {
        let source_collection = self
            .source_collection
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MongoError::invalid_argument("view source collection is required"))?;

        Ok(AggregationView {
            name: self.name,
            source_collection,
            pipeline: self.pipeline,
            collation: self.collation,
        })
    }
}

/// A pipeline whose results are persisted with `$out` or `$merge`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedAggregationView {
    /// The output collection.
    pub name: String,
    /// The collection the pipeline reads from.
    pub source_collection: String,
    /// The pipeline, without the output stage.
    pub pipeline: Vec<Document>,
    /// `$merge` settings; `None` replaces the output with `$out`.
    pub merge: Option<MergeSpec>,
}

impl MaterializedAggregationView {
    /// Replace the output collection on every refresh.
    pub fn with_out(
        name: impl Into<String>,
        source_collection: impl Into<String>,
        pipeline: Vec<Document>,
    ) -> Self {
        Self {
            name: name.into(),
            source_collection: source_collection.into(),
            pipeline,
            merge: None,
        }
    }

    /// Merge results into the output collection on every refresh.
    ///
    /// The merge target is the view name regardless of `spec.into`.
    pub fn with_merge(
        name: impl Into<String>,
        source_collection: impl Into<String>,
        pipeline: Vec<Document>,
        spec: MergeSpec,
    ) -> Self {
        let name = name.into();
        Self {
            merge: Some(MergeSpec {
                into: name.clone(),
                ..spec
            }),
            name,
            source_collection: source_collection.into(),
            pipeline,
        }
    }

    /// The pipeline with its output stage appended.
    pub fn to_pipeline(&self) -> Vec<Document> {
        let mut pipeline = self.pipeline.clone();
        pipeline.push(match &self.merge {
            Some(spec) => stages::merge(spec),
            None => stages::out(&self.name),
        });
        pipeline
    }
}

fn first_batch(reply: &Document) -> MongoResult<Vec<Document>> {
    let cursor = reply
        .get_document("cursor")
        .map_err(|e| MongoError::invalid_response(format!("missing cursor: {e}")))?;
    let batch = cursor
        .get_array("firstBatch")
        .map_err(|e| MongoError::invalid_response(format!("missing firstBatch: {e}")))?;
    Ok(batch
        .iter()
        .filter_map(|entry| entry.as_document().cloned())
        .collect())
}

impl MongoClient {
    /// Create a view in the database.
    pub async fn create_view(&self, view: &AggregationView) -> MongoResult<()> {
        self.run_command(view.to_create_command()).await?;
        info!(
            view = %view.name,
            source = %view.source_collection,
            stages = view.pipeline.len(),
            "View created"
        );
        Ok(())
    }

    /// Create a view from a typed aggregation, mapping its pipeline first.
    pub async fn create_typed_view(
        &self,
        name: &str,
        aggregation: &TypedAggregation,
    ) -> MongoResult<AggregationView> {
        let view = AggregationView::from_typed(name, aggregation, self.aggregation_mapper())?;
        self.create_view(&view).await?;
        Ok(view)
    }

    /// Drop a view from the database.
    pub async fn drop_view(&self, name: &str) -> MongoResult<()> {
        self.drop_collection(name).await
    }

    /// List all views in the database.
    pub async fn list_views(&self) -> MongoResult<Vec<String>> {
        let reply = self
            .run_command(doc! {
                "listCollections": 1,
                "filter": { "type": "view" },
                "nameOnly": true,
            })
            .await?;

        Ok(first_batch(&reply)?
            .iter()
            .filter_map(|entry| entry.get_str("name").ok().map(String::from))
            .collect())
    }

    /// The definition of a view, if it exists.
    pub async fn get_view_definition(&self, name: &str) -> MongoResult<Option<AggregationView>> {
        let reply = self
            .run_command(doc! {
                "listCollections": 1,
                "filter": { "name": name, "type": "view" }
            })
            .await?;

        first_batch(&reply)?
            .first()
            .map(AggregationView::from_listing)
            .transpose()
    }

    /// Run a materialized view's pipeline, returning the number of documents
    /// the pipeline yielded.
    pub async fn refresh_materialized_view(
        &self,
        view: &MaterializedAggregationView,
    ) -> MongoResult<u64> {
        let collection = self.collection_doc(&view.source_collection);
        let cursor = collection
            .aggregate(view.to_pipeline(), None)
            .await
            .map_err(|e| self.translator().to_mongo_error(e))?;
        let results: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| self.translator().to_mongo_error(e))?;

        debug!(view = %view.name, documents = results.len(), "Materialized view refreshed");
        Ok(results.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use docmap_core::convert::DocumentConverter;
    use docmap_core::criteria::Criteria;
    use docmap_core::mapping::{EntityDescriptor, MappingContext, PropertyDescriptor, PropertyKind};
    use docmap_core::query_mapper::QueryMapper;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::aggregation::{Aggregation, WhenMatched};

    fn mapper() -> AggregationMapper {
        let context = Arc::new(MappingContext::new());
        context
            .register(
                EntityDescriptor::builder("Person")
                    .collection("people")
                    .property(PropertyDescriptor::new("lastName", PropertyKind::String).field("ln"))
                    .property(PropertyDescriptor::new("age", PropertyKind::Int32))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        AggregationMapper::new(QueryMapper::new(Arc::new(DocumentConverter::new(context))))
    }

    #[test]
    fn test_view_builder() {
        let view = AggregationView::builder("active_users")
            .source_collection("users")
            .stage(doc! { "$match": { "status": "active" } })
            .collation(Collation::of("en"))
            .build()
            .unwrap();

        assert_eq!(view.name, "active_users");
        assert_eq!(view.source_collection, "users");
        assert_eq!(view.pipeline.len(), 1);
        assert_eq!(view.collation, Some(Collation::of("en")));
    }

    #[test]
    fn test_view_builder_requires_source() {
        let result = AggregationView::builder("orphan").build();
        assert!(matches!(result, Err(MongoError::InvalidArgument(_))));
    }

    #[test]
    fn test_view_create_command() {
        let view = AggregationView::new("v", "users", vec![doc! { "$limit": 5_i64 }])
            .with_collation(Collation::of("fr"));

        assert_eq!(
            view.to_create_command(),
            doc! {
                "create": "v",
                "viewOn": "users",
                "pipeline": [ { "$limit": 5_i64 } ],
                "collation": { "locale": "fr" },
            }
        );
    }

    #[test]
    fn test_view_from_typed_aggregation() {
        let aggregation = Aggregation::new()
            .match_criteria(&Criteria::new().eq("lastName", "Lovelace"))
            .collation(Collation::of("en"))
            .typed("Person");

        let view = AggregationView::from_typed("lovelaces", &aggregation, &mapper()).unwrap();

        assert_eq!(view.source_collection, "people");
        assert_eq!(view.pipeline, vec![doc! { "$match": { "ln": "Lovelace" } }]);
        assert_eq!(view.collation, Some(Collation::of("en")));
    }

    #[test]
    fn test_view_from_unknown_entity() {
        let aggregation = Aggregation::new().typed("Ghost");
        let err = AggregationView::from_typed("ghosts", &aggregation, &mapper()).unwrap_err();
        assert!(err.is_unknown_entity());
    }

    #[test]
    fn test_view_from_listing() {
        let entry = doc! {
            "name": "adults",
            "type": "view",
            "options": {
                "viewOn": "people",
                "pipeline": [ { "$match": { "age": { "$gte": 18 } } } ],
                "collation": { "locale": "en", "strength": 2 },
            },
        };

        let view = AggregationView::from_listing(&entry).unwrap();
        assert_eq!(view.source_collection, "people");
        assert_eq!(view.pipeline.len(), 1);
        assert_eq!(view.collation, Some(Collation::of("en").strength(2)));
    }

    #[test]
    fn test_materialized_view_out() {
        let view = MaterializedAggregationView::with_out(
            "daily_totals",
            "orders",
            vec![doc! { "$group": { "_id": "$day", "total": { "$sum": "$amount" } } }],
        );

        let pipeline = view.to_pipeline();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[1], doc! { "$out": "daily_totals" });
    }

    #[test]
    fn test_materialized_view_merge_targets_view_name() {
        let spec = MergeSpec {
            when_matched: WhenMatched::Merge,
            ..MergeSpec::into("ignored")
        };
        let view = MaterializedAggregationView::with_merge("totals", "orders", Vec::new(), spec);

        let pipeline = view.to_pipeline();
        let merge = pipeline[0].get_document("$merge").unwrap();
        assert_eq!(merge.get_str("into").unwrap(), "totals");
        assert_eq!(merge.get_str("whenMatched").unwrap(), "merge");
    }
}
