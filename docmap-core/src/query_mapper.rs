//! Filter document mapping.
//!
//! [`QueryMapper`] turns a filter written against entity properties into the
//! document the server expects: property names become stored field names, id
//! values are coerced to the native id type and combinators are mapped
//! recursively. The input is never modified.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bson::{Bson, doc, oid::ObjectId};
//! use docmap_core::convert::DocumentConverter;
//! use docmap_core::mapping::MappingContext;
//! use docmap_core::query_mapper::QueryMapper;
//!
//! let converter = Arc::new(DocumentConverter::new(Arc::new(MappingContext::new())));
//! let mapper = QueryMapper::new(converter);
//!
//! let mapped = mapper.map_query(&doc! { "$or": [{ "id": "5f1d7f1e8e4b2c3a4d5e6f70" }, { "id": 2 }] }, None);
//! let oid = ObjectId::parse_str("5f1d7f1e8e4b2c3a4d5e6f70").unwrap();
//! assert_eq!(mapped, doc! { "$or": [{ "_id": oid }, { "_id": 2 }] });
//! ```

use std::sync::Arc;

use bson::{Bson, Document};
use tracing::{trace, warn};

use crate::convert::DocumentConverter;
use crate::criteria::{Operator, Query};
use crate::error::MappingResult;
use crate::mapping::{EntityDescriptor, ID_FIELD, MappingContext, PropertyDescriptor, is_id_key};

/// The shape of a filter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueShape<'a> {
    /// A plain value.
    Scalar(&'a Bson),
    /// An operator document or an embedded document.
    Nested(&'a Document),
    /// A list of values.
    ListOperator(&'a [Bson]),
}

impl<'a> ValueShape<'a> {
    /// Classify a value.
    pub fn of(value: &'a Bson) -> Self {
        match value {
            Bson::Document(doc) => Self::Nested(doc),
            Bson::Array(items) => Self::ListOperator(items),
            other => Self::Scalar(other),
        }
    }
}

/// Whether the document is an operator expression (its first key starts with `$`).
pub fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// A fully mapped [`Query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedQuery {
    /// The mapped filter.
    pub filter: Document,
    /// The mapped sort document.
    pub sort: Document,
    /// The mapped projection.
    pub projection: Document,
    /// Matches to skip.
    pub skip: Option<u64>,
    /// Maximum matches.
    pub limit: Option<i64>,
    /// The collation document.
    pub collation: Option<Document>,
}

/// Maps filter documents against entity metadata.
///
/// Stateless apart from the shared converter; one instance serves every
/// caller concurrently.
#[derive(Debug, Clone)]
pub struct QueryMapper {
    converter: Arc<DocumentConverter>,
}

impl QueryMapper {
    /// Create a mapper over a converter.
    pub fn new(converter: Arc<DocumentConverter>) -> Self {
        Self { converter }
    }

    /// The converter.
    pub fn converter(&self) -> &Arc<DocumentConverter> {
        &self.converter
    }

    /// The mapping context.
    pub fn context(&self) -> &MappingContext {
        self.converter.context()
    }

    /// Whether a top level key joins sibling filters.
    pub fn is_combinator(&self, key: &str) -> bool {
        if matches!(key, "$and" | "$or" | "$nor") {
            return true;
        }
        self.converter.options().legacy_combinator_matching
            && key.starts_with('$')
            && key.ends_with("or")
    }

    /// Coerce an id value toward the entity's native id type.
    pub fn convert_id(&self, value: &Bson, entity: Option<&EntityDescriptor>) -> Bson {
        self.converter.convert_id(value, entity)
    }

    /// Map a filter document.
    pub fn map_query(&self, query: &Document, entity: Option<&EntityDescriptor>) -> Document {
        let property_id_present = query.keys().any(|k| k != ID_FIELD && is_id_key(k, entity));

        let mut mapped = Document::new();
        for (key, value) in query {
            if is_id_key(key, entity) {
                if key == ID_FIELD && property_id_present {
                    warn!(
                        entity = ?entity.map(EntityDescriptor::name),
                        "Filter names the id twice, keeping the id property and dropping _id"
                    );
                    continue;
                }
                mapped.insert(ID_FIELD, self.map_id_value(value, entity));
            } else if self.is_combinator(key) {
                mapped.insert(key.clone(), self.map_combinator(value, entity));
            } else if key.starts_with('$') {
                mapped.insert(key.clone(), value.clone());
            } else {
                let resolved = self.context().resolve_path(entity, key);
                let value =
                    self.map_value(value, resolved.property.as_ref(), resolved.entity.as_deref());
                mapped.insert(resolved.path, value);
            }
        }

        trace!(entity = ?entity.map(EntityDescriptor::name), keys = mapped.len(), "Mapped filter");
        mapped
    }

    /// Translate the keys of a sort or projection document.
    pub fn map_fields(&self, fields: &Document, entity: Option<&EntityDescriptor>) -> Document {
        fields
            .iter()
            .map(|(key, value)| {
                let key = if is_id_key(key, entity) {
                    ID_FIELD.to_string()
                } else {
                    self.context().resolve_path(entity, key).path
                };
                (key, value.clone())
            })
            .collect()
    }

    /// Map every part of a [`Query`].
    pub fn map_query_object(
        &self,
        query: &Query,
        entity: Option<&EntityDescriptor>,
    ) -> MappingResult<MappedQuery> {
        let filter = query.filter()?;
        Ok(MappedQuery {
            filter: self.map_query(&filter, entity),
            sort: self.map_fields(&query.sort().to_document(), entity),
            projection: self.map_fields(query.projection(), entity),
            skip: query.skip(),
            limit: query.limit(),
            collation: query.collation().map(|c| c.to_document()),
        })
    }

    fn map_id_value(&self, value: &Bson, entity: Option<&EntityDescriptor>) -> Bson {
        let Bson::Document(nested) = value else {
            return self.convert_id(value, entity);
        };

        if nested.contains_key("$in") || nested.contains_key("$nin") {
            let mut mapped = Document::new();
            for (key, operand) in nested {
                match (key.as_str(), operand) {
                    ("$in" | "$nin", Bson::Array(items)) => {
                        let items: Vec<Bson> =
                            items.iter().map(|item| self.convert_id(item, entity)).collect();
                        mapped.insert(key.clone(), items);
                    }
                    _ => {
                        mapped.insert(key.clone(), operand.clone());
                    }
                }
            }
            return Bson::Document(mapped);
        }

        let mapped = self
            .map_query(nested, entity)
            .into_iter()
            .map(|(key, operand)| {
                let operand = self.convert_id(&operand, entity);
                (key, operand)
            })
            .collect();
        Bson::Document(mapped)
    }

    fn map_combinator(&self, value: &Bson, entity: Option<&EntityDescriptor>) -> Bson {
        match value {
            Bson::Array(branches) => Bson::Array(
                branches
                    .iter()
                    .map(|branch| match branch {
                        Bson::Document(doc) => Bson::Document(self.map_query(doc, entity)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Map the value of an ordinary field.
    pub(crate) fn map_value(
        &self,
        value: &Bson,
        property: Option<&PropertyDescriptor>,
        nested: Option<&EntityDescriptor>,
    ) -> Bson {
        match ValueShape::of(value) {
            ValueShape::Nested(doc) if is_operator_document(doc) => {
                Bson::Document(self.map_operators(doc, property, nested))
            }
            ValueShape::Nested(_) | ValueShape::ListOperator(_) | ValueShape::Scalar(_) => {
                self.converter.convert_to_mongo_type(value, property)
            }
        }
    }

    pub(crate) fn map_operators(
        &self,
        operators: &Document,
        property: Option<&PropertyDescriptor>,
        nested: Option<&EntityDescriptor>,
    ) -> Document {
        let mut mapped = Document::new();
        for (key, operand) in operators {
            let value = match Operator::from_key(key) {
                Some(op) if op.takes_list() => match operand {
                    Bson::Array(_) => self.converter.convert_to_mongo_type(operand, property),
                    other => other.clone(),
                },
                Some(Operator::Not) => match operand {
                    Bson::Document(doc) => {
                        Bson::Document(self.map_operators(doc, property, nested))
                    }
                    other => other.clone(),
                },
                Some(Operator::ElemMatch) => match operand {
                    Bson::Document(doc) if is_operator_document(doc) => {
                        Bson::Document(self.map_operators(doc, property, None))
                    }
                    Bson::Document(doc) => Bson::Document(self.map_query(doc, nested)),
                    other => other.clone(),
                },
                Some(
                    Operator::Eq
                    | Operator::Ne
                    | Operator::Gt
                    | Operator::Gte
                    | Operator::Lt
                    | Operator::Lte,
                ) => self.converter.convert_to_mongo_type(operand, property),
                // Structural operators, $mod and operators we do not model.
                _ => operand.clone(),
            };
            mapped.insert(key.clone(), value);
        }
        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingOptions;
    use crate::criteria::{Collation, Criteria, Direction, Sort};
    use crate::mapping::{IdKind, PropertyKind};
    use bson::{doc, oid::ObjectId};
    use pretty_assertions::assert_eq;

    const HEX: &str = "5f1d7f1e8e4b2c3a4d5e6f70";

    fn oid() -> ObjectId {
        ObjectId::parse_str(HEX).unwrap()
    }

    fn mapper_with(options: MappingOptions) -> (QueryMapper, Arc<EntityDescriptor>) {
        let line = EntityDescriptor::builder("Line")
            .property(PropertyDescriptor::new("quantity", PropertyKind::Int64).field("qty"))
            .build()
            .unwrap();
        let order = EntityDescriptor::builder("Order")
            .id("orderId", IdKind::ObjectId)
            .property(PropertyDescriptor::new("customerName", PropertyKind::String).field("cust"))
            .property(PropertyDescriptor::new("total", PropertyKind::Int64))
            .property(PropertyDescriptor::new(
                "lines",
                PropertyKind::Array(Box::new(PropertyKind::Embedded("Line".into()))),
            ))
            .build()
            .unwrap();
        let context = Arc::new(MappingContext::with_entities([line, order]).unwrap());
        let order = context.require("Order").unwrap();
        let converter = Arc::new(DocumentConverter::with_options(context, options));
        (QueryMapper::new(converter), order)
    }

    fn mapper() -> (QueryMapper, Arc<EntityDescriptor>) {
        mapper_with(MappingOptions::default())
    }

    #[test]
    fn test_id_scalar_is_renamed_and_coerced() {
        let (mapper, order) = mapper();
        assert_eq!(
            mapper.map_query(&doc! { "orderId": HEX }, Some(&order)),
            doc! { "_id": oid() }
        );
        assert_eq!(
            mapper.map_query(&doc! { "_id": "not-hex" }, Some(&order)),
            doc! { "_id": "not-hex" }
        );
    }

    #[test]
    fn test_id_in_list_is_coerced_element_wise() {
        let (mapper, order) = mapper();
        let mapped = mapper.map_query(
            &doc! { "_id": { "$in": [HEX, "plain", 7], "$comment": "x" } },
            Some(&order),
        );
        assert_eq!(
            mapped,
            doc! { "_id": { "$in": [oid(), "plain", 7], "$comment": "x" } }
        );
    }

    #[test]
    fn test_id_operator_document_is_mapped_and_coerced() {
        let (mapper, order) = mapper();
        assert_eq!(
            mapper.map_query(&doc! { "_id": { "$gt": HEX } }, Some(&order)),
            doc! { "_id": { "$gt": oid() } }
        );
    }

    #[test]
    fn test_both_id_keys_keep_the_property() {
        let (mapper, _) = mapper();
        assert_eq!(
            mapper.map_query(&doc! { "_id": "a", "id": HEX }, None),
            doc! { "_id": oid() }
        );
    }

    #[test]
    fn test_aliases_and_value_conversion() {
        let (mapper, order) = mapper();
        let mapped = mapper.map_query(
            &doc! {
                "customerName": "Ada",
                "total": { "$gte": 10, "$exists": true },
                "lines.quantity": { "$in": [1, 2] },
                "lines": { "$elemMatch": { "quantity": { "$gt": 3 } } },
                "$comment": "kept",
            },
            Some(&order),
        );
        assert_eq!(
            mapped,
            doc! {
                "cust": "Ada",
                "total": { "$gte": 10_i64, "$exists": true },
                "lines.qty": { "$in": [1_i64, 2_i64] },
                "lines": { "$elemMatch": { "qty": { "$gt": 3_i64 } } },
                "$comment": "kept",
            }
        );
    }

    #[test]
    fn test_not_is_mapped_recursively() {
        let (mapper, order) = mapper();
        assert_eq!(
            mapper.map_query(&doc! { "total": { "$not": { "$lt": 5 } } }, Some(&order)),
            doc! { "total": { "$not": { "$lt": 5_i64 } } }
        );
    }

    #[test]
    fn test_embedded_equality_translates_keys() {
        let (mapper, order) = mapper();
        assert_eq!(
            mapper.map_query(&doc! { "lines": [{ "quantity": 1 }] }, Some(&order)),
            doc! { "lines": [{ "qty": 1_i64 }] }
        );
    }

    #[test]
    fn test_keys_preserved_without_id() {
        let (mapper, _) = mapper();
        let filter = doc! { "a": 1, "b": { "$gt": 2 }, "c": [1, 2], "d": { "x": 1 } };
        let mapped = mapper.map_query(&filter, None);
        let keys: Vec<&String> = mapped.keys().collect();
        assert_eq!(keys, filter.keys().collect::<Vec<_>>());
        assert_eq!(mapped, filter);
    }

    #[test]
    fn test_literal_combinators_by_default() {
        let (mapper, _) = mapper();
        assert!(mapper.is_combinator("$or"));
        assert!(mapper.is_combinator("$nor"));
        assert!(mapper.is_combinator("$and"));
        assert!(!mapper.is_combinator("$color"));

        let mapped = mapper.map_query(&doc! { "$color": [{ "id": HEX }] }, None);
        assert_eq!(mapped, doc! { "$color": [{ "id": HEX }] });
    }

    #[test]
    fn test_legacy_combinator_heuristic() {
        let (mapper, _) = mapper_with(MappingOptions::default().legacy_combinator_matching(true));
        assert!(mapper.is_combinator("$color"));
        let mapped = mapper.map_query(&doc! { "$color": [{ "id": HEX }] }, None);
        assert_eq!(mapped, doc! { "$color": [{ "_id": oid() }] });
    }

    #[test]
    fn test_combinator_passes_non_documents_through() {
        let (mapper, _) = mapper();
        assert_eq!(
            mapper.map_query(&doc! { "$or": [1, { "id": 2 }], "$and": "odd" }, None),
            doc! { "$or": [1, { "_id": 2 }], "$and": "odd" }
        );
    }

    #[test]
    fn test_mapping_is_idempotent() {
        let (mapper, order) = mapper();
        let filter = doc! {
            "orderId": { "$in": [HEX] },
            "customerName": "Ada",
            "$or": [{ "total": { "$lt": 3 } }, { "lines.quantity": 2 }],
        };
        let once = mapper.map_query(&filter, Some(&order));
        let twice = mapper.map_query(&once, Some(&order));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_chained_aliases_cannot_break_idempotence() {
        let context = MappingContext::new();
        let chained = EntityDescriptor::builder("Chain")
            .property(PropertyDescriptor::new("x", PropertyKind::String).field("y"))
            .property(PropertyDescriptor::new("y", PropertyKind::String).field("z"))
            .build();
        assert!(chained.is_err());

        let entity = context
            .register(
                EntityDescriptor::builder("Chain")
                    .property(PropertyDescriptor::new("x", PropertyKind::String).field("y"))
                    .property(PropertyDescriptor::new("w", PropertyKind::String).field("z"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let mapper = QueryMapper::new(Arc::new(DocumentConverter::new(Arc::new(context))));

        let once = mapper.map_query(&doc! { "x": "a", "w": "b" }, Some(&entity));
        let twice = mapper.map_query(&once, Some(&entity));
        assert_eq!(once, doc! { "y": "a", "z": "b" });
        assert_eq!(once, twice);
    }

    #[test]
    fn test_map_query_object() {
        let (mapper, order) = mapper();
        let query = Query::new(Criteria::new().eq("customerName", "Ada"))
            .with_sort(Sort::by("total", Direction::Descending).then("orderId", Direction::Ascending))
            .include("customerName")
            .with_limit(3)
            .with_collation(Collation::of("en"));

        let mapped = mapper.map_query_object(&query, Some(&order)).unwrap();
        assert_eq!(mapped.filter, doc! { "cust": "Ada" });
        assert_eq!(mapped.sort, doc! { "total": -1, "_id": 1 });
        assert_eq!(mapped.projection, doc! { "cust": 1 });
        assert_eq!(mapped.limit, Some(3));
        assert_eq!(mapped.collation, Some(doc! { "locale": "en" }));
    }

    #[test]
    fn test_value_shape() {
        assert!(matches!(ValueShape::of(&Bson::Int32(1)), ValueShape::Scalar(_)));
        assert!(matches!(ValueShape::of(&Bson::Array(vec![])), ValueShape::ListOperator(_)));
        assert!(matches!(
            ValueShape::of(&Bson::Document(doc! {})),
            ValueShape::Nested(_)
        ));
    }
}
