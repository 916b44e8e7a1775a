//! Explicit entity metadata.
//!
//! Entities are described in code instead of being discovered through
//! annotations. A descriptor names the id property, the storage alias of every
//! property and the target kind values are coerced to before they are written.
//!
//! ```rust
//! use docmap_core::mapping::{EntityDescriptor, IdKind, PropertyDescriptor, PropertyKind};
//!
//! let person = EntityDescriptor::builder("Person")
//!     .id("id", IdKind::ObjectId)
//!     .property(PropertyDescriptor::new("firstName", PropertyKind::String).field("first_name"))
//!     .property(PropertyDescriptor::new("address", PropertyKind::Embedded("Address".into())))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(person.collection(), "person");
//! assert_eq!(person.field_name("firstName"), "first_name");
//! assert_eq!(person.field_name("id"), "_id");
//! ```

pub mod context;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bson::spec::ElementType;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::convert::ValueConverter;
use crate::error::{MappingError, MappingResult};

pub use context::{MappingContext, ResolvedPath};

/// The storage field every document identifier lives in.
pub const ID_FIELD: &str = "_id";

/// The property name treated as the identifier when no entity is known.
pub const DEFAULT_ID_PROPERTY: &str = "id";

/// Whether `key` addresses the identifier of documents of `entity`.
///
/// Without an entity both `id` and `_id` are treated as the identifier.
pub fn is_id_key(key: &str, entity: Option<&EntityDescriptor>) -> bool {
    match entity {
        Some(entity) => entity.is_id_key(key),
        None => key == ID_FIELD || key == DEFAULT_ID_PROPERTY,
    }
}

/// Native representation of an entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// 12-byte MongoDB object id.
    #[default]
    ObjectId,
    /// Plain string.
    String,
    /// UUID stored as binary subtype 4.
    Uuid,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
}

impl IdKind {
    /// The BSON element type values of this kind are stored as.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::ObjectId => ElementType::ObjectId,
            Self::String => ElementType::String,
            Self::Uuid => ElementType::Binary,
            Self::Int32 => ElementType::Int32,
            Self::Int64 => ElementType::Int64,
        }
    }

    /// The matching property kind.
    pub fn property_kind(&self) -> PropertyKind {
        match self {
            Self::ObjectId => PropertyKind::ObjectId,
            Self::String => PropertyKind::String,
            Self::Uuid => PropertyKind::Uuid,
            Self::Int32 => PropertyKind::Int32,
            Self::Int64 => PropertyKind::Int64,
        }
    }

    /// The `bsonType` name used in JSON schemas.
    pub fn bson_type_name(&self) -> &'static str {
        self.property_kind().bson_type_name().unwrap_or("string")
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ObjectId => "objectId",
            Self::String => "string",
            Self::Uuid => "uuid",
            Self::Int32 => "int",
            Self::Int64 => "long",
        })
    }
}

/// The declared kind of a property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertyKind {
    /// No declared target; values are written as they are.
    #[default]
    Any,
    /// UTF-8 string.
    String,
    /// Boolean.
    Boolean,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// 64-bit float.
    Double,
    /// 128-bit decimal.
    Decimal128,
    /// UTC date-time.
    DateTime,
    /// Object id.
    ObjectId,
    /// UUID stored as binary subtype 4.
    Uuid,
    /// Embedded document described by another entity.
    Embedded(SmolStr),
    /// Array of values of the inner kind.
    Array(Box<PropertyKind>),
}

impl PropertyKind {
    /// The embedded entity name, looking through arrays.
    pub fn embedded_entity(&self) -> Option<&str> {
        match self {
            Self::Embedded(name) => Some(name.as_str()),
            Self::Array(inner) => inner.embedded_entity(),
            _ => None,
        }
    }

    /// Whether values of this kind are arrays.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// The element kind for arrays, the kind itself otherwise.
    pub fn element_kind(&self) -> &PropertyKind {
        match self {
            Self::Array(inner) => inner,
            other => other,
        }
    }

    /// The BSON element type scalar values of this kind are coerced to.
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            Self::String => Some(ElementType::String),
            Self::Boolean => Some(ElementType::Boolean),
            Self::Int32 => Some(ElementType::Int32),
            Self::Int64 => Some(ElementType::Int64),
            Self::Double => Some(ElementType::Double),
            Self::Decimal128 => Some(ElementType::Decimal128),
            Self::DateTime => Some(ElementType::DateTime),
            Self::ObjectId => Some(ElementType::ObjectId),
            Self::Uuid => Some(ElementType::Binary),
            Self::Any | Self::Embedded(_) | Self::Array(_) => None,
        }
    }

    /// The `bsonType` name used in JSON schemas.
    pub fn bson_type_name(&self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::String => Some("string"),
            Self::Boolean => Some("bool"),
            Self::Int32 => Some("int"),
            Self::Int64 => Some("long"),
            Self::Double => Some("double"),
            Self::Decimal128 => Some("decimal"),
            Self::DateTime => Some("date"),
            Self::ObjectId => Some("objectId"),
            Self::Uuid => Some("binData"),
            Self::Embedded(_) => Some("object"),
            Self::Array(_) => Some("array"),
        }
    }
}

/// Shared handle to a custom converter declared on a property.
#[derive(Clone)]
pub struct ConverterRef(pub Arc<dyn ValueConverter>);

impl fmt::Debug for ConverterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConverterRef").field(&self.0.name()).finish()
    }
}

impl PartialEq for ConverterRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Metadata for one property of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    name: SmolStr,
    field_name: SmolStr,
    kind: PropertyKind,
    required: bool,
    converter: Option<ConverterRef>,
}

impl PropertyDescriptor {
    /// Create a property stored under its own name.
    pub fn new(name: impl Into<SmolStr>, kind: PropertyKind) -> Self {
        let name = name.into();
        Self {
            field_name: name.clone(),
            name,
            kind,
            required: false,
            converter: None,
        }
    }

    /// Store the property under a different field name.
    pub fn field(mut self, field_name: impl Into<SmolStr>) -> Self {
        self.field_name = field_name.into();
        self
    }

    /// Mark the property as required in derived JSON schemas.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attach a custom writing converter.
    pub fn converter(mut self, converter: impl ValueConverter + 'static) -> Self {
        self.converter = Some(ConverterRef(Arc::new(converter)));
        self
    }

    /// Attach an already shared writing converter.
    pub fn shared_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = Some(ConverterRef(converter));
        self
    }

    /// The property name used by application code.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field name used in stored documents.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The declared kind.
    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Whether derived schemas list the property as required.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The custom converter, if any.
    pub fn custom_converter(&self) -> Option<&dyn ValueConverter> {
        self.converter.as_ref().map(|c| c.0.as_ref())
    }
}

/// Metadata for one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    name: SmolStr,
    collection: SmolStr,
    id_property: SmolStr,
    id_kind: IdKind,
    type_alias: Option<SmolStr>,
    properties: Vec<PropertyDescriptor>,
    by_name: HashMap<SmolStr, usize>,
    by_field: HashMap<SmolStr, usize>,
}

impl EntityDescriptor {
    /// Start describing an entity.
    pub fn builder(name: impl Into<SmolStr>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder::new(name)
    }

    /// The entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection documents of this entity are stored in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The property holding the identifier.
    pub fn id_property(&self) -> &str {
        &self.id_property
    }

    /// The native identifier representation.
    pub fn id_kind(&self) -> IdKind {
        self.id_kind
    }

    /// The alias written to the type key, if any.
    pub fn type_alias(&self) -> Option<&str> {
        self.type_alias.as_deref()
    }

    /// All properties in declaration order, the id property first.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Look up a property by its name.
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    /// Look up a property by its stored field name.
    pub fn property_by_field(&self, field: &str) -> Option<&PropertyDescriptor> {
        self.by_field.get(field).map(|&i| &self.properties[i])
    }

    /// The id property descriptor.
    pub fn id_descriptor(&self) -> &PropertyDescriptor {
        // The builder always inserts the id property first.
        &self.properties[0]
    }

    /// Whether the given key addresses the identifier.
    pub fn is_id_key(&self, key: &str) -> bool {
        key == ID_FIELD || key == self.id_property
    }

    /// The stored field name for a property, or the input if it is not declared.
    pub fn field_name<'a>(&'a self, property: &'a str) -> &'a str {
        self.property(property)
            .map(PropertyDescriptor::field_name)
            .unwrap_or(property)
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    name: SmolStr,
    collection: Option<SmolStr>,
    id: Option<(SmolStr, IdKind)>,
    type_alias: Option<SmolStr>,
    properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptorBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            id: None,
            type_alias: None,
            properties: Vec::new(),
        }
    }

    /// Set the collection name (defaults to the uncapitalized entity name).
    pub fn collection(mut self, collection: impl Into<SmolStr>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Declare the id property and its native kind (defaults to `id` / ObjectId).
    pub fn id(mut self, property: impl Into<SmolStr>, kind: IdKind) -> Self {
        self.id = Some((property.into(), kind));
        self
    }

    /// Set the alias written to the type key.
    pub fn type_alias(mut self, alias: impl Into<SmolStr>) -> Self {
        self.type_alias = Some(alias.into());
        self
    }

    /// Add a property.
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Add several properties.
    pub fn properties(mut self, properties: impl IntoIterator<Item = PropertyDescriptor>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> MappingResult<EntityDescriptor> {
        if self.name.trim().is_empty() {
            return Err(MappingError::invalid_entity("", "entity name must not be empty"));
        }

        let (id_property, id_kind) = self
            .id
            .unwrap_or_else(|| (SmolStr::new(DEFAULT_ID_PROPERTY), IdKind::default()));

        // The id property always maps to `_id`, whatever alias it was declared with.
        let id_descriptor = match self.properties.iter().find(|p| p.name == id_property) {
            Some(declared) => declared.clone().field(ID_FIELD),
            None => PropertyDescriptor::new(id_property.clone(), id_kind.property_kind())
                .field(ID_FIELD),
        };

        let mut properties = Vec::with_capacity(self.properties.len() + 1);
        properties.push(id_descriptor);
        properties.extend(self.properties.into_iter().filter(|p| p.name != id_property));

        let mut by_name = HashMap::with_capacity(properties.len());
        let mut by_field = HashMap::with_capacity(properties.len());
        let mut seen_fields = HashSet::with_capacity(properties.len());

        for (index, property) in properties.iter().enumerate() {
            if property.name.is_empty() || property.field_name.is_empty() {
                return Err(MappingError::invalid_entity(
                    self.name.as_str(),
                    "property and field names must not be empty",
                ));
            }
            if property.field_name.contains('.') || property.name.contains('.') {
                return Err(MappingError::invalid_entity(
                    self.name.as_str(),
                    format!("property '{}' must not contain '.'", property.name),
                ));
            }
            if by_name.insert(property.name.clone(), index).is_some() {
                return Err(MappingError::invalid_entity(
                    self.name.as_str(),
                    format!("duplicate property '{}'", property.name),
                ));
            }
            if !seen_fields.insert(property.field_name.clone()) {
                return Err(MappingError::invalid_entity(
                    self.name.as_str(),
                    format!("duplicate field name '{}'", property.field_name),
                ));
            }
            by_field.insert(property.field_name.clone(), index);
        }

        // A stored field must not double as another property's name, or a
        // mapped document would be renamed again on a second pass.
        for (index, property) in properties.iter().enumerate() {
            if let Some(&owner) = by_field.get(&property.name) {
                if owner != index {
                    return Err(MappingError::invalid_entity(
                        self.name.as_str(),
                        format!(
                            "property '{}' is also the stored field of '{}'",
                            property.name, properties[owner].name
                        ),
                    ));
                }
            }
        }

        let collection = self
            .collection
            .unwrap_or_else(|| uncapitalize(&self.name).into());

        Ok(EntityDescriptor {
            name: self.name,
            collection,
            id_property,
            id_kind,
            type_alias: self.type_alias,
            properties,
            by_name,
            by_field,
        })
    }
}

fn uncapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityDescriptor {
        EntityDescriptor::builder("Person")
            .id("key", IdKind::String)
            .type_alias("person")
            .property(PropertyDescriptor::new("firstName", PropertyKind::String).field("fn"))
            .property(PropertyDescriptor::new("age", PropertyKind::Int32).required())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let entity = EntityDescriptor::builder("OrderLine").build().unwrap();
        assert_eq!(entity.collection(), "orderLine");
        assert_eq!(entity.id_property(), "id");
        assert_eq!(entity.id_kind(), IdKind::ObjectId);
        assert_eq!(entity.field_name("id"), "_id");
        assert_eq!(entity.id_descriptor().kind(), &PropertyKind::ObjectId);
    }

    #[test]
    fn test_declared_id_and_aliases() {
        let entity = person();
        assert_eq!(entity.id_property(), "key");
        assert!(entity.is_id_key("key"));
        assert!(entity.is_id_key("_id"));
        assert!(!entity.is_id_key("id"));
        assert_eq!(entity.field_name("firstName"), "fn");
        assert_eq!(entity.field_name("unknown"), "unknown");
        assert_eq!(entity.property_by_field("fn").unwrap().name(), "firstName");
        assert_eq!(entity.type_alias(), Some("person"));
        assert!(entity.property("age").unwrap().is_required());
    }

    #[test]
    fn test_declared_id_property_is_forced_to_id_field() {
        let entity = EntityDescriptor::builder("Ticket")
            .id("ticketId", IdKind::Uuid)
            .property(PropertyDescriptor::new("ticketId", PropertyKind::Uuid).field("tid"))
            .build()
            .unwrap();
        assert_eq!(entity.field_name("ticketId"), "_id");
        assert_eq!(entity.properties().len(), 1);
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = EntityDescriptor::builder("Person")
            .property(PropertyDescriptor::new("a", PropertyKind::Any).field("x"))
            .property(PropertyDescriptor::new("b", PropertyKind::Any).field("x"))
            .build();
        assert!(matches!(result, Err(MappingError::InvalidEntity { .. })));
    }

    #[test]
    fn test_property_named_after_another_field_rejected() {
        let chained = EntityDescriptor::builder("Person")
            .property(PropertyDescriptor::new("x", PropertyKind::Any).field("y"))
            .property(PropertyDescriptor::new("y", PropertyKind::Any).field("z"))
            .build();
        assert!(matches!(chained, Err(MappingError::InvalidEntity { .. })));

        let swapped = EntityDescriptor::builder("Person")
            .property(PropertyDescriptor::new("x", PropertyKind::Any).field("y"))
            .property(PropertyDescriptor::new("y", PropertyKind::Any).field("x"))
            .build();
        assert!(swapped.is_err());

        let unaliased = EntityDescriptor::builder("Person")
            .property(PropertyDescriptor::new("x", PropertyKind::Any).field("x"))
            .property(PropertyDescriptor::new("y", PropertyKind::Any).field("z"))
            .build();
        assert!(unaliased.is_ok());
    }

    #[test]
    fn test_dotted_property_rejected() {
        let result = EntityDescriptor::builder("Person")
            .property(PropertyDescriptor::new("a.b", PropertyKind::Any))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_embedded_entity_lookup() {
        let kind = PropertyKind::Array(Box::new(PropertyKind::Embedded("Tag".into())));
        assert_eq!(kind.embedded_entity(), Some("Tag"));
        assert!(kind.is_array());
        assert_eq!(kind.element_kind(), &PropertyKind::Embedded("Tag".into()));
        assert_eq!(PropertyKind::String.embedded_entity(), None);
    }

    #[test]
    fn test_id_kind_element_types() {
        assert_eq!(IdKind::ObjectId.element_type(), ElementType::ObjectId);
        assert_eq!(IdKind::Uuid.element_type(), ElementType::Binary);
        assert_eq!(IdKind::Int64.bson_type_name(), "long");
    }
}
