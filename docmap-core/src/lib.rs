//! # docmap-core
//!
//! Driver-agnostic object-document mapping for MongoDB.
//!
//! This crate provides:
//! - Entity metadata declared in code ([`mapping`])
//! - Value conversion and entity (de)serialization ([`convert`])
//! - Criteria, query and update builders ([`criteria`], [`update`])
//! - Filter and update mapping against entity metadata ([`query_mapper`], [`update_mapper`])
//! - `$jsonSchema` derivation ([`schema`])
//! - The translated data access error taxonomy ([`error`])
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bson::doc;
//! use docmap_core::prelude::*;
//!
//! let context = Arc::new(MappingContext::new());
//! let person = context
//!     .register(
//!         EntityDescriptor::builder("Person")
//!             .property(PropertyDescriptor::new("lastName", PropertyKind::String).field("ln"))
//!             .build()
//!             .unwrap(),
//!     )
//!     .unwrap();
//!
//! let mapper = QueryMapper::new(Arc::new(DocumentConverter::new(context)));
//! let filter = Criteria::new().eq("lastName", "Lovelace").to_document().unwrap();
//!
//! assert_eq!(mapper.map_query(&filter, Some(&person)), doc! { "ln": "Lovelace" });
//! ```

pub mod config;
pub mod convert;
pub mod criteria;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod query_mapper;
pub mod schema;
pub mod update;
pub mod update_mapper;

pub use config::MappingOptions;
pub use convert::{ConversionService, DocumentConverter, FnConverter, ValueConverter};
pub use criteria::{Collation, Criteria, Direction, Operand, Operator, Predicate, Query, Sort};
pub use error::{
    ConversionError, DataAccessError, DataAccessErrorKind, MappingError, MappingResult,
};
pub use mapping::{
    EntityDescriptor, IdKind, MappingContext, PropertyDescriptor, PropertyKind, ResolvedPath,
};
pub use query_mapper::{MappedQuery, QueryMapper, ValueShape};
pub use schema::JsonSchemaCreator;
pub use update::{ArrayFilter, Position, Update};
pub use update_mapper::{MappedUpdate, UpdateMapper};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::MappingOptions;
    pub use crate::convert::{DocumentConverter, FnConverter, ValueConverter};
    pub use crate::criteria::{Collation, Criteria, Direction, Query, Sort};
    pub use crate::error::{DataAccessError, DataAccessErrorKind, MappingError, MappingResult};
    pub use crate::mapping::{
        EntityDescriptor, IdKind, MappingContext, PropertyDescriptor, PropertyKind,
    };
    pub use crate::query_mapper::QueryMapper;
    pub use crate::update::Update;
    pub use crate::update_mapper::UpdateMapper;
}
