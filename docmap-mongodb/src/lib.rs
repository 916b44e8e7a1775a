//! # docmap-mongodb
//!
//! MongoDB driver binding for docmap.
//!
//! This crate provides:
//! - Connection configuration and a client owning the mapping context
//! - Bulk write batching, imperative ([`bulk`]) and asynchronous ([`reactive`])
//! - Translation of driver failures into the data access error taxonomy
//! - Aggregation pipelines mapped against entity metadata, and views
//!
//! ## Example
//!
//! ```rust,ignore
//! use docmap_core::prelude::*;
//! use docmap_mongodb::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MongoClient::builder()
//!         .uri("mongodb://localhost:27017")
//!         .database("mydb")
//!         .build()
//!         .await?;
//!
//!     client.register_entity(
//!         EntityDescriptor::builder("Person")
//!             .collection("people")
//!             .property(PropertyDescriptor::new("lastName", PropertyKind::String).field("ln"))
//!             .build()?,
//!     )?;
//!
//!     let mut bulk = client.bulk_ops::<Person>(BulkMode::Unordered, Some("Person"), None)?;
//!     bulk.insert(&ada)?
//!         .remove(&Query::new(Criteria::new().eq("lastName", "Babbage")))?;
//!
//!     match bulk.execute().await {
//!         Ok(outcome) => println!("inserted {}", outcome.inserted),
//!         Err(err) if err.is_duplicate_key() => println!("already there"),
//!         Err(err) => return Err(err.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod reactive;
pub mod translator;
pub mod view;

pub use bson::oid::ObjectId;
pub use bson::{Bson, Document, doc};
pub use aggregation::{
    Aggregation, AggregationMapper, AggregationOptions, MergeSpec, TypedAggregation, WhenMatched,
    WhenNotMatched, accumulators, stages,
};
pub use bulk::{
    BulkLifecycle, BulkMode, BulkOperationContext, BulkOperationError, BulkOperations,
    BulkOptions, BulkWriteOutcome, CollectionTarget, CommandTarget, NoopLifecycle, WriteErrorDetail,
    WriteModel,
};
pub use client::{MongoClient, MongoClientBuilder};
pub use config::{
    BulkConfig, DocmapConfig, MongoConfig, MongoConfigBuilder, ReadPreference, WriteConcern,
};
pub use error::{MongoError, MongoResult};
pub use reactive::{AsyncBulkLifecycle, ReactiveBulkOperations};
pub use translator::{DriverFault, FaultKind, MongoExceptionTranslator};
pub use view::{AggregationView, AggregationViewBuilder, MaterializedAggregationView};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::aggregation::{Aggregation, TypedAggregation, accumulators, stages};
    pub use crate::bulk::{BulkLifecycle, BulkMode, BulkOperations, BulkWriteOutcome};
    pub use crate::client::{MongoClient, MongoClientBuilder};
    pub use crate::config::{DocmapConfig, MongoConfig, MongoConfigBuilder};
    pub use crate::error::{MongoError, MongoResult};
    pub use crate::reactive::{AsyncBulkLifecycle, ReactiveBulkOperations};
    pub use crate::translator::MongoExceptionTranslator;
    pub use crate::view::{AggregationView, MaterializedAggregationView};
    pub use bson::oid::ObjectId;
    pub use bson::{Bson, Document, doc};
}
