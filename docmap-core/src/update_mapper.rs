//! Update document mapping.
//!
//! Operator updates have each field path translated (positional segments are
//! kept) and each value converted according to its operator. Replacement
//! documents are written like entities. Array filters are translated against
//! the element entity their `$[identifier]` is bound to.

use std::collections::HashMap;
use std::sync::Arc;

use bson::{Bson, Document};
use tracing::trace;

use crate::convert::DocumentConverter;
use crate::error::MappingResult;
use crate::mapping::context::positional_identifier;
use crate::mapping::{EntityDescriptor, ID_FIELD, PropertyDescriptor, is_id_key};
use crate::query_mapper::{QueryMapper, is_operator_document};
use crate::update::Update;

/// The result of mapping an [`Update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedUpdate {
    /// The mapped update or replacement document.
    pub update: Document,
    /// The mapped array filters.
    pub array_filters: Vec<Document>,
}

impl MappedUpdate {
    /// Whether the update replaces the whole document.
    pub fn is_replacement(&self) -> bool {
        !self.update.keys().any(|k| k.starts_with('$'))
    }
}

/// What a `$[identifier]` placeholder ranges over.
#[derive(Debug, Clone, Default)]
struct Binding {
    property: Option<PropertyDescriptor>,
    entity: Option<Arc<EntityDescriptor>>,
}

/// Maps update documents against entity metadata.
#[derive(Debug, Clone)]
pub struct UpdateMapper {
    query_mapper: QueryMapper,
}

impl UpdateMapper {
    /// Create a mapper over a converter.
    pub fn new(converter: Arc<DocumentConverter>) -> Self {
        Self {
            query_mapper: QueryMapper::new(converter),
        }
    }

    /// Create from an existing query mapper.
    pub fn from_query_mapper(query_mapper: QueryMapper) -> Self {
        Self { query_mapper }
    }

    /// The query mapper used for `$pull` conditions and array filters.
    pub fn query_mapper(&self) -> &QueryMapper {
        &self.query_mapper
    }

    fn converter(&self) -> &DocumentConverter {
        self.query_mapper.converter()
    }

    /// Map an update with its array filters.
    pub fn map_update(
        &self,
        update: &Update,
        entity: Option<&EntityDescriptor>,
    ) -> MappingResult<MappedUpdate> {
        let filters = update.array_filters()?;
        Ok(self.map_update_document(update.as_document(), &filters, entity))
    }

    /// Map a raw update or replacement document and its array filters.
    pub fn map_update_document(
        &self,
        update: &Document,
        array_filters: &[Document],
        entity: Option<&EntityDescriptor>,
    ) -> MappedUpdate {
        if !update.keys().any(|k| k.starts_with('$')) {
            return MappedUpdate {
                update: self.converter().write_document(update, entity),
                array_filters: array_filters.to_vec(),
            };
        }

        let mut bindings = HashMap::new();
        let mut mapped = Document::new();
        for (operator, fields) in update {
            let value = match fields {
                Bson::Document(fields) => {
                    Bson::Document(self.map_operator(operator, fields, entity, &mut bindings))
                }
                other => other.clone(),
            };
            mapped.insert(operator.clone(), value);
        }

        let array_filters = array_filters
            .iter()
            .map(|filter| self.map_array_filter(filter, &bindings))
            .collect();

        trace!(entity = ?entity.map(EntityDescriptor::name), operators = mapped.len(), "Mapped update");
        MappedUpdate {
            update: mapped,
            array_filters,
        }
    }

    fn map_operator(
        &self,
        operator: &str,
        fields: &Document,
        entity: Option<&EntityDescriptor>,
        bindings: &mut HashMap<String, Binding>,
    ) -> Document {
        let context = self.query_mapper.context();
        let mut mapped = Document::new();

        for (path, value) in fields {
            if is_id_key(path, entity) {
                let value = match operator {
                    "$unset" | "$currentDate" => value.clone(),
                    _ => self.query_mapper.convert_id(value, entity),
                };
                mapped.insert(ID_FIELD, value);
                continue;
            }

            self.bind_identifiers(path, entity, bindings);
            let resolved = context.resolve_path(entity, path);
            let property = resolved.property.as_ref();

            let value = match operator {
                "$unset" | "$currentDate" | "$pop" => value.clone(),
                "$rename" => match value {
                    Bson::String(target) => Bson::String(context.resolve_path(entity, target).path),
                    other => other.clone(),
                },
                "$push" | "$addToSet" => self.map_push(value, property, resolved.entity.as_deref()),
                "$pull" => match value {
                    Bson::Document(condition) if is_operator_document(condition) => Bson::Document(
                        self.query_mapper
                            .map_operators(condition, property, resolved.entity.as_deref()),
                    ),
                    Bson::Document(condition) => Bson::Document(
                        self.query_mapper
                            .map_query(condition, resolved.entity.as_deref()),
                    ),
                    other => self.converter().convert_to_mongo_type(other, property),
                },
                _ => self.converter().convert_to_mongo_type(value, property),
            };
            mapped.insert(resolved.path, value);
        }
        mapped
    }

    fn map_push(
        &self,
        value: &Bson,
        property: Option<&PropertyDescriptor>,
        element: Option<&EntityDescriptor>,
    ) -> Bson {
        let Bson::Document(modifiers) = value else {
            return self.converter().convert_to_mongo_type(value, property);
        };
        if !modifiers.contains_key("$each") {
            return self.converter().convert_to_mongo_type(value, property);
        }

        let mut mapped = Document::new();
        for (key, operand) in modifiers {
            let operand = match (key.as_str(), operand) {
                ("$each", Bson::Array(_)) => self.converter().convert_to_mongo_type(operand, property),
                ("$sort", Bson::Document(sort)) => {
                    Bson::Document(self.query_mapper.map_fields(sort, element))
                }
                _ => operand.clone(),
            };
            mapped.insert(key.clone(), operand);
        }
        Bson::Document(mapped)
    }

    fn bind_identifiers(
        &self,
        path: &str,
        entity: Option<&EntityDescriptor>,
        bindings: &mut HashMap<String, Binding>,
    ) {
        let segments: Vec<&str> = path.split('.').collect();
        for (index, segment) in segments.iter().enumerate() {
            let Some(identifier) = positional_identifier(segment) else {
                continue;
            };
            if bindings.contains_key(identifier) || index == 0 {
                continue;
            }
            let prefix = segments[..index].join(".");
            let resolved = self.query_mapper.context().resolve_path(entity, &prefix);
            bindings.insert(
                identifier.to_string(),
                Binding {
                    property: resolved.property,
                    entity: resolved.entity,
                },
            );
        }
    }

    fn map_array_filter(&self, filter: &Document, bindings: &HashMap<String, Binding>) -> Document {
        let mut mapped = Document::new();
        for (key, value) in filter {
            let (identifier, rest) = match key.split_once('.') {
                Some((identifier, rest)) => (identifier, Some(rest)),
                None => (key.as_str(), None),
            };

            let Some(binding) = bindings.get(identifier) else {
                mapped.insert(key.clone(), value.clone());
                continue;
            };

            match rest {
                Some(rest) => {
                    let resolved = self
                        .query_mapper
                        .context()
                        .resolve_path(binding.entity.as_deref(), rest);
                    let value = self.query_mapper.map_value(
                        value,
                        resolved.property.as_ref(),
                        resolved.entity.as_deref(),
                    );
                    mapped.insert(format!("{}.{}", identifier, resolved.path), value);
                }
                None => {
                    let value = self.query_mapper.map_value(
                        value,
                        binding.property.as_ref(),
                        binding.entity.as_deref(),
                    );
                    mapped.insert(key.clone(), value);
                }
            }
        }
        mapped
    }
}
