//! # docmap
//!
//! Object-document mapping for MongoDB.
//!
//! docmap provides:
//! - Entity metadata declared in code, with field aliases and id kinds
//! - Filter and update documents mapped from property names to stored fields,
//!   with `_id` values coerced to the entity's id type
//! - Ordered and unordered bulk writes batched into server write commands
//! - Translation of driver failures into a stable data access error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docmap::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DocmapConfig::from_file("docmap.toml")?;
//!     config.init_logging();
//!
//!     let client = MongoClient::new(config.to_mongo_config()?).await?;
//!     client.register_entity(
//!         EntityDescriptor::builder("Order")
//!             .collection("orders")
//!             .id("id", IdKind::ObjectId)
//!             .property(PropertyDescriptor::new("customerId", PropertyKind::ObjectId).field("cid"))
//!             .build()?,
//!     )?;
//!
//!     let mut bulk = client.bulk_ops::<Order>(BulkMode::Ordered, Some("Order"), None)?;
//!     bulk.update_many(
//!         &Query::new(Criteria::new().eq("customerId", customer)),
//!         &Update::new().set("status", "shipped"),
//!     )?;
//!     bulk.execute().await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Entity metadata, conversion and query/update mapping.
pub mod mapping {
    pub use docmap_core::*;
}

/// MongoDB driver binding.
pub mod mongo {
    pub use docmap_mongodb::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use docmap_core::prelude::*;
    pub use docmap_mongodb::prelude::*;
}

// Re-export key types at the crate root
pub use docmap_core::{DataAccessError, DataAccessErrorKind, MappingError};
pub use docmap_mongodb::{MongoError, MongoExceptionTranslator};
