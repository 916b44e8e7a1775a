//! `$jsonSchema` validators derived from entity metadata.

use std::collections::HashSet;
use std::sync::Arc;

use bson::{Bson, Document, doc};
use smol_str::SmolStr;

use crate::error::MappingResult;
use crate::mapping::{EntityDescriptor, MappingContext, PropertyKind};

/// Derives JSON schemas from registered entities.
///
/// Embedded entities are expanded in place. An entity that embeds one of its
/// own ancestors gets the placeholder `{ "type": "object" }` at that point.
#[derive(Debug, Clone)]
pub struct JsonSchemaCreator {
    context: Arc<MappingContext>,
}

impl JsonSchemaCreator {
    /// Create a creator over a context.
    pub fn new(context: Arc<MappingContext>) -> Self {
        Self { context }
    }

    /// The `{ "$jsonSchema": ... }` validator for an entity.
    pub fn create_schema_for(&self, entity: &str) -> MappingResult<Document> {
        Ok(doc! { "$jsonSchema": self.object_schema_for(entity)? })
    }

    /// The bare object schema for an entity.
    pub fn object_schema_for(&self, entity: &str) -> MappingResult<Document> {
        let descriptor = self.context.require(entity)?;
        let mut visited = HashSet::new();
        Ok(self.object_schema(&descriptor, &mut visited))
    }

    /// The validator as relaxed extended JSON, pretty printed.
    ///
    /// Handy for `mongosh` or for checking schemas into version control.
    pub fn to_json_string(&self, entity: &str) -> MappingResult<String> {
        let schema = Bson::Document(self.create_schema_for(entity)?).into_relaxed_extjson();
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    fn object_schema(&self, entity: &EntityDescriptor, visited: &mut HashSet<SmolStr>) -> Document {
        visited.insert(SmolStr::new(entity.name()));

        let mut required = Vec::new();
        let mut properties = Document::new();
        for property in entity.properties() {
            if property.is_required() {
                required.push(Bson::String(property.field_name().to_string()));
            }
            properties.insert(
                property.field_name(),
                self.property_schema(property.kind(), visited),
            );
        }

        visited.remove(entity.name());

        let mut schema = doc! { "bsonType": "object" };
        if !required.is_empty() {
            schema.insert("required", required);
        }
        schema.insert("properties", properties);
        schema
    }

    fn property_schema(&self, kind: &PropertyKind, visited: &mut HashSet<SmolStr>) -> Document {
        match kind {
            PropertyKind::Any => Document::new(),
            PropertyKind::Embedded(name) => {
                if visited.contains(name) {
                    return doc! { "type": "object" };
                }
                match self.context.get(name) {
                    Some(nested) => self.object_schema(&nested, visited),
                    None => doc! { "bsonType": "object" },
                }
            }
            PropertyKind::Array(inner) => {
                let items = self.property_schema(inner, visited);
                let mut schema = doc! { "bsonType": "array" };
                if !items.is_empty() {
                    schema.insert("items", items);
                }
                schema
            }
            scalar => match scalar.bson_type_name() {
                Some(name) => doc! { "bsonType": name },
                None => Document::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use crate::mapping::{IdKind, PropertyDescriptor};
    use pretty_assertions::assert_eq;

    fn context() -> Arc<MappingContext> {
        let address = EntityDescriptor::builder("Address")
            .property(PropertyDescriptor::new("city", PropertyKind::String).required())
            .build()
            .unwrap();
        let person = EntityDescriptor::builder("Person")
            .id("id", IdKind::String)
            .property(PropertyDescriptor::new("name", PropertyKind::String).required())
            .property(PropertyDescriptor::new("address", PropertyKind::Embedded("Address".into())))
            .property(PropertyDescriptor::new("tags", PropertyKind::Array(Box::new(PropertyKind::String))))
            .property(PropertyDescriptor::new("extra", PropertyKind::Any))
            .build()
            .unwrap();
        let node = EntityDescriptor::builder("Node")
            .property(PropertyDescriptor::new("label", PropertyKind::String).field("l"))
            .property(PropertyDescriptor::new(
                "children",
                PropertyKind::Array(Box::new(PropertyKind::Embedded("Node".into()))),
            ))
            .build()
            .unwrap();
        Arc::new(MappingContext::with_entities([address, person, node]).unwrap())
    }

    #[test]
    fn test_schema_with_embedded_entity() {
        let creator = JsonSchemaCreator::new(context());
        let schema = creator.create_schema_for("Person").unwrap();
        assert_eq!(
            schema,
            doc! {
                "$jsonSchema": {
                    "bsonType": "object",
                    "required": ["name"],
                    "properties": {
                        "_id": { "bsonType": "string" },
                        "name": { "bsonType": "string" },
                        "address": {
                            "bsonType": "object",
                            "required": ["city"],
                            "properties": {
                                "_id": { "bsonType": "objectId" },
                                "city": { "bsonType": "string" },
                            },
                        },
                        "tags": { "bsonType": "array", "items": { "bsonType": "string" } },
                        "extra": {},
                    },
                }
            }
        );
    }

    #[test]
    fn test_cycle_emits_placeholder() {
        let creator = JsonSchemaCreator::new(context());
        let schema = creator.object_schema_for("Node").unwrap();
        assert_eq!(
            schema,
            doc! {
                "bsonType": "object",
                "properties": {
                    "_id": { "bsonType": "objectId" },
                    "l": { "bsonType": "string" },
                    "children": { "bsonType": "array", "items": { "type": "object" } },
                },
            }
        );
    }

    #[test]
    fn test_json_rendering() {
        let creator = JsonSchemaCreator::new(context());
        let json = creator.to_json_string("Person").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["$jsonSchema"]["required"], serde_json::json!(["name"]));
        assert_eq!(
            value["$jsonSchema"]["properties"]["address"]["properties"]["city"]["bsonType"],
            "string"
        );
    }

    #[test]
    fn test_unknown_entity() {
        let creator = JsonSchemaCreator::new(context());
        let err = creator.create_schema_for("Ghost").unwrap_err();
        assert!(matches!(err, MappingError::UnknownEntity(ref name) if name == "Ghost"));
    }
}
