//! The process-wide registry of entity descriptors.
//!
//! Descriptors are built once per entity and cached for the lifetime of the
//! context. A registered descriptor is never replaced, so readers can hold on to
//! the returned `Arc` without further synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use smol_str::SmolStr;

use super::{EntityDescriptor, ID_FIELD, PropertyDescriptor};
use crate::error::{MappingError, MappingResult};

/// Registry of entity descriptors keyed by entity name.
#[derive(Debug, Default)]
pub struct MappingContext {
    entities: RwLock<HashMap<SmolStr, Arc<EntityDescriptor>>>,
}

/// The outcome of translating a property path into a stored field path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// The translated dot path.
    pub path: String,
    /// The property the last named segment resolved to.
    pub property: Option<PropertyDescriptor>,
    /// The embedded entity of that property, looking through arrays.
    pub entity: Option<Arc<EntityDescriptor>>,
}

impl ResolvedPath {
    fn verbatim(path: &str) -> Self {
        Self {
            path: path.to_string(),
            property: None,
            entity: None,
        }
    }
}

enum Scope<'a> {
    Root(&'a EntityDescriptor),
    Nested(Arc<EntityDescriptor>),
    Opaque,
}

impl Scope<'_> {
    fn entity(&self) -> Option<&EntityDescriptor> {
        match self {
            Scope::Root(entity) => Some(*entity),
            Scope::Nested(entity) => Some(entity.as_ref()),
            Scope::Opaque => None,
        }
    }
}

impl MappingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context pre-populated with descriptors.
    pub fn with_entities(
        entities: impl IntoIterator<Item = EntityDescriptor>,
    ) -> MappingResult<Self> {
        let context = Self::new();
        for entity in entities {
            context.register(entity)?;
        }
        Ok(context)
    }

    /// Register a descriptor.
    ///
    /// Registering an identical descriptor again returns the cached instance;
    /// registering a different one under the same name is an error.
    pub fn register(&self, entity: EntityDescriptor) -> MappingResult<Arc<EntityDescriptor>> {
        let mut entities = self.entities.write();
        if let Some(existing) = entities.get(entity.name()) {
            if existing.as_ref() == &entity {
                return Ok(Arc::clone(existing));
            }
            return Err(MappingError::invalid_entity(
                entity.name(),
                "a different descriptor is already registered under this name",
            ));
        }

        tracing::debug!(
            entity = entity.name(),
            collection = entity.collection(),
            properties = entity.properties().len(),
            "Registered entity descriptor"
        );

        let entity = Arc::new(entity);
        entities.insert(SmolStr::new(entity.name()), Arc::clone(&entity));
        Ok(entity)
    }

    /// Get a cached descriptor or build and register it.
    pub fn get_or_register<F>(&self, name: &str, build: F) -> MappingResult<Arc<EntityDescriptor>>
    where
        F: FnOnce() -> MappingResult<EntityDescriptor>,
    {
        if let Some(entity) = self.get(name) {
            return Ok(entity);
        }
        self.register(build()?)
    }

    /// Look up a descriptor by entity name.
    pub fn get(&self, name: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities.read().get(name).cloned()
    }

    /// Look up a descriptor, failing with [`MappingError::UnknownEntity`].
    pub fn require(&self, name: &str) -> MappingResult<Arc<EntityDescriptor>> {
        self.get(name)
            .ok_or_else(|| MappingError::UnknownEntity(name.to_string()))
    }

    /// Look up the descriptor stored in a collection.
    pub fn for_collection(&self, collection: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities
            .read()
            .values()
            .find(|e| e.collection() == collection)
            .cloned()
    }

    /// Check if a descriptor is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.read().contains_key(name)
    }

    /// Get the number of registered descriptors.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Check if no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }


    /// Resolve a property by name against an entity, returning its embedded entity.
    pub fn resolve_property(
        &self,
        entity: &EntityDescriptor,
        name: &str,
    ) -> Option<(PropertyDescriptor, Option<Arc<EntityDescriptor>>)> {
        let property = entity
            .property(name)
            .or_else(|| entity.property_by_field(name))?
            .clone();
        let nested = property
            .kind()
            .embedded_entity()
            .and_then(|n| self.get(n));
        Some((property, nested))
    }

    /// Translate a dot path of property names into stored field names.
    ///
    /// Numeric segments and positional segments (`$`, `$[]`, `$[identifier]`)
    /// are kept and do not change the current entity. Unknown segments are kept
    /// verbatim and end resolution.
    pub fn resolve_path(&self, entity: Option<&EntityDescriptor>, path: &str) -> ResolvedPath {
        let Some(root) = entity else {
            return ResolvedPath::verbatim(path);
        };

        let mut scope = Scope::Root(root);
        let mut segments = Vec::new();
        let mut property = None;
        let mut nested_entity = None;

        for (index, segment) in path.split('.').enumerate() {
            if is_positional(segment) || is_array_index(segment) {
                segments.push(segment.to_string());
                continue;
            }

            let resolved = scope
                .entity()
                .and_then(|current| self.resolve_property(current, segment));

            match resolved {
                Some((prop, nested)) => {
                    // Only the root id maps to `_id`; embedded ids keep their alias.
                    let field = if index == 0 && root.is_id_key(prop.name()) {
                        ID_FIELD.to_string()
                    } else {
                        prop.field_name().to_string()
                    };
                    segments.push(field);
                    scope = match &nested {
                        Some(n) => Scope::Nested(Arc::clone(n)),
                        None => Scope::Opaque,
                    };
                    nested_entity = nested;
                    property = Some(prop);
                }
                None => {
                    segments.push(segment.to_string());
                    scope = Scope::Opaque;
                    nested_entity = None;
                    property = None;
                }
            }
        }

        tracing::trace!(path, mapped = %segments.join("."), "Resolved property path");

        ResolvedPath {
            path: segments.join("."),
            property,
            entity: nested_entity,
        }
    }
}

/// Whether a path segment is a positional update operator.
pub fn is_positional(segment: &str) -> bool {
    segment == "$" || (segment.starts_with("$[") && segment.ends_with(']'))
}

/// The identifier bound by a filtered positional operator (`$[identifier]`).
pub fn positional_identifier(segment: &str) -> Option<&str> {
    segment
        .strip_prefix("$[")
        .and_then(|s| s.strip_suffix(']'))
        .filter(|s| !s.is_empty())
}

fn is_array_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{IdKind, PropertyKind};
    use pretty_assertions::assert_eq;

    fn context() -> MappingContext {
        let address = EntityDescriptor::builder("Address")
            .property(PropertyDescriptor::new("street", PropertyKind::String).field("st"))
            .property(PropertyDescriptor::new("zipCode", PropertyKind::String).field("zip"))
            .build()
            .unwrap();
        let tag = EntityDescriptor::builder("Tag")
            .property(PropertyDescriptor::new("label", PropertyKind::String).field("lbl"))
            .build()
            .unwrap();
        let person = EntityDescriptor::builder("Person")
            .id("key", IdKind::ObjectId)
            .property(
                PropertyDescriptor::new("address", PropertyKind::Embedded("Address".into()))
                    .field("addr"),
            )
            .property(PropertyDescriptor::new(
                "tags",
                PropertyKind::Array(Box::new(PropertyKind::Embedded("Tag".into()))),
            ))
            .build()
            .unwrap();
        MappingContext::with_entities([address, tag, person]).unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let ctx = context();
        let again = EntityDescriptor::builder("Tag")
            .property(PropertyDescriptor::new("label", PropertyKind::String).field("lbl"))
            .build()
            .unwrap();
        assert!(ctx.register(again).is_ok());
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn test_register_conflict_rejected() {
        let ctx = context();
        let different = EntityDescriptor::builder("Tag").build().unwrap();
        assert!(ctx.register(different).is_err());
    }

    #[test]
    fn test_get_or_register_builds_once() {
        let ctx = MappingContext::new();
        let mut builds = 0;
        for _ in 0..3 {
            ctx.get_or_register("Note", || {
                builds += 1;
                EntityDescriptor::builder("Note").build()
            })
            .unwrap();
        }
        assert_eq!(builds, 1);
        assert_eq!(ctx.len(), 1);
        assert!(ctx.contains("Note"));
    }

    #[test]
    fn test_resolve_nested_path() {
        let ctx = context();
        let person = ctx.require("Person").unwrap();
        let resolved = ctx.resolve_path(Some(&*person), "address.zipCode");
        assert_eq!(resolved.path, "addr.zip");
        assert_eq!(resolved.property.unwrap().name(), "zipCode");
    }

    #[test]
    fn test_resolve_path_is_idempotent() {
        let ctx = context();
        let person = ctx.require("Person").unwrap();
        let resolved = ctx.resolve_path(Some(&*person), "addr.zip");
        assert_eq!(resolved.path, "addr.zip");
    }

    #[test]
    fn test_resolve_positional_segments() {
        let ctx = context();
        let person = ctx.require("Person").unwrap();
        assert_eq!(ctx.resolve_path(Some(&*person), "tags.$.label").path, "tags.$.lbl");
        assert_eq!(ctx.resolve_path(Some(&*person), "tags.$[t].label").path, "tags.$[t].lbl");
        assert_eq!(ctx.resolve_path(Some(&*person), "tags.3.label").path, "tags.3.lbl");

        let resolved = ctx.resolve_path(Some(&*person), "tags");
        assert_eq!(resolved.entity.unwrap().name(), "Tag");
    }

    #[test]
    fn test_resolve_id_and_unknown() {
        let ctx = context();
        let person = ctx.require("Person").unwrap();
        assert_eq!(ctx.resolve_path(Some(&*person), "key").path, "_id");
        assert_eq!(ctx.resolve_path(Some(&*person), "nickname.first").path, "nickname.first");
        assert_eq!(ctx.resolve_path(None, "address.zipCode").path, "address.zipCode");
    }

    #[test]
    fn test_positional_identifier() {
        assert_eq!(positional_identifier("$[elem]"), Some("elem"));
        assert_eq!(positional_identifier("$[]"), None);
        assert_eq!(positional_identifier("$"), None);
        assert!(is_positional("$[]"));
        assert!(!is_positional("$set"));
    }
}
