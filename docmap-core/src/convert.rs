//! Value conversion between application values and stored BSON.
//!
//! - [`ValueConverter`]: per-property custom writers.
//! - [`ConversionService`]: registry of type-to-type conversions used for
//!   best-effort coercion (ids, declared property kinds).
//! - [`DocumentConverter`]: writes entities to documents and reads them back,
//!   applying field aliases, id coercion and type hints.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bson::spec::{BinarySubtype, ElementType};
use bson::{Binary, Bson, Document, oid::ObjectId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use crate::config::MappingOptions;
use crate::error::{ConversionError, MappingResult};
use crate::mapping::{
    EntityDescriptor, ID_FIELD, MappingContext, PropertyDescriptor, PropertyKind, is_id_key,
};

/// A custom writer for property values.
///
/// Returning `None` declines the value and leaves it to the default conversion.
pub trait ValueConverter: Send + Sync {
    /// Name used in debug output.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Convert a value into its stored form.
    fn write(&self, value: &Bson) -> Option<Bson>;
}

/// A [`ValueConverter`] backed by a closure.
///
/// ```rust
/// use bson::Bson;
/// use docmap_core::convert::{FnConverter, ValueConverter};
///
/// let upper = FnConverter::new("upper", |v: &Bson| {
///     v.as_str().map(|s| Bson::String(s.to_uppercase()))
/// });
/// assert_eq!(upper.write(&Bson::String("eur".into())), Some(Bson::String("EUR".into())));
/// assert_eq!(upper.write(&Bson::Int32(1)), None);
/// ```
pub struct FnConverter<F> {
    name: &'static str,
    f: F,
}

impl<F> FnConverter<F>
where
    F: Fn(&Bson) -> Option<Bson> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> ValueConverter for FnConverter<F>
where
    F: Fn(&Bson) -> Option<Bson> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn write(&self, value: &Bson) -> Option<Bson> {
        (self.f)(value)
    }
}

impl<F> fmt::Debug for FnConverter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter").field("name", &self.name).finish()
    }
}

type ConversionFn = Arc<dyn Fn(&Bson) -> Result<Bson, ConversionError> + Send + Sync>;

/// The name of a BSON type as used in `$type` and JSON schemas.
pub fn type_name(element: ElementType) -> &'static str {
    match element {
        ElementType::Double => "double",
        ElementType::String => "string",
        ElementType::EmbeddedDocument => "object",
        ElementType::Array => "array",
        ElementType::Binary => "binData",
        ElementType::Undefined => "undefined",
        ElementType::ObjectId => "objectId",
        ElementType::Boolean => "bool",
        ElementType::DateTime => "date",
        ElementType::Null => "null",
        ElementType::RegularExpression => "regex",
        ElementType::DbPointer => "dbPointer",
        ElementType::JavaScriptCode => "javascript",
        ElementType::Symbol => "symbol",
        ElementType::JavaScriptCodeWithScope => "javascriptWithScope",
        ElementType::Int32 => "int",
        ElementType::Timestamp => "timestamp",
        ElementType::Int64 => "long",
        ElementType::Decimal128 => "decimal",
        ElementType::MaxKey => "maxKey",
        ElementType::MinKey => "minKey",
    }
}

/// Registry of conversions between BSON types.
///
/// Conversions are keyed by source and target element type. Converting a value
/// that already has the target type returns it unchanged.
#[derive(Clone)]
pub struct ConversionService {
    conversions: HashMap<(u8, u8), ConversionFn>,
}

impl fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionService")
            .field("conversions", &self.conversions.len())
            .finish()
    }
}

impl Default for ConversionService {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn key(from: ElementType, to: ElementType) -> (u8, u8) {
    (from as u8, to as u8)
}

fn fail(value: &Bson, to: ElementType, reason: impl Into<String>) -> ConversionError {
    ConversionError::new(type_name(value.element_type()), type_name(to), reason)
}

impl ConversionService {
    /// A service with no conversions.
    pub fn empty() -> Self {
        Self {
            conversions: HashMap::new(),
        }
    }

    /// A service with the built-in conversions.
    ///
    /// - hex string ⇄ ObjectId
    /// - string ⇄ UUID (binary subtype 4)
    /// - lossless numeric widening and narrowing
    /// - numeric string → int/long/double, number → string
    /// - RFC 3339 string and epoch millis → date
    /// - "true"/"false" → bool
    pub fn with_defaults() -> Self {
        use ElementType as T;

        let mut service = Self::empty();

        service.register(T::String, T::ObjectId, |v| {
            let s = v.as_str().unwrap_or_default();
            ObjectId::parse_str(s)
                .map(Bson::ObjectId)
                .map_err(|e| fail(v, T::ObjectId, e.to_string()))
        });
        service.register(T::ObjectId, T::String, |v| match v {
            Bson::ObjectId(oid) => Ok(Bson::String(oid.to_hex())),
            other => Err(fail(other, T::String, "not an object id")),
        });

        service.register(T::String, T::Binary, |v| {
            let s = v.as_str().unwrap_or_default();
            uuid::Uuid::parse_str(s)
                .map(|u| {
                    Bson::Binary(Binary {
                        subtype: BinarySubtype::Uuid,
                        bytes: u.as_bytes().to_vec(),
                    })
                })
                .map_err(|e| fail(v, T::Binary, e.to_string()))
        });
        service.register(T::Binary, T::String, |v| match v {
            Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes,
            }) => uuid::Uuid::from_slice(bytes)
                .map(|u| Bson::String(u.to_string()))
                .map_err(|e| fail(v, T::String, e.to_string())),
            other => Err(fail(other, T::String, "binary is not a UUID")),
        });

        service.register(T::Int32, T::Int64, |v| match v {
            Bson::Int32(i) => Ok(Bson::Int64(i64::from(*i))),
            other => Err(fail(other, T::Int64, "not an int")),
        });
        service.register(T::Int64, T::Int32, |v| match v {
            Bson::Int64(i) => i32::try_from(*i)
                .map(Bson::Int32)
                .map_err(|_| fail(v, T::Int32, "out of range")),
            other => Err(fail(other, T::Int32, "not a long")),
        });
        service.register(T::Int32, T::Double, |v| match v {
            Bson::Int32(i) => Ok(Bson::Double(f64::from(*i))),
            other => Err(fail(other, T::Double, "not an int")),
        });
        service.register(T::Int64, T::Double, |v| match v {
            Bson::Int64(i) if i.unsigned_abs() <= 1 << 53 => Ok(Bson::Double(*i as f64)),
            other => Err(fail(other, T::Double, "not exactly representable")),
        });
        service.register(T::Double, T::Int64, |v| match v {
            Bson::Double(d) if d.fract() == 0.0 && d.abs() <= (1u64 << 53) as f64 => {
                Ok(Bson::Int64(*d as i64))
            }
            other => Err(fail(other, T::Int64, "not an integral value")),
        });
        service.register(T::Double, T::Int32, |v| match v {
            Bson::Double(d)
                if d.fract() == 0.0 && *d >= f64::from(i32::MIN) && *d <= f64::from(i32::MAX) =>
            {
                Ok(Bson::Int32(*d as i32))
            }
            other => Err(fail(other, T::Int32, "not an integral int value")),
        });

        service.register(T::String, T::Int32, |v| {
            let s = v.as_str().unwrap_or_default();
            s.trim()
                .parse::<i32>()
                .map(Bson::Int32)
                .map_err(|e| fail(v, T::Int32, e.to_string()))
        });
        service.register(T::String, T::Int64, |v| {
            let s = v.as_str().unwrap_or_default();
            s.trim()
                .parse::<i64>()
                .map(Bson::Int64)
                .map_err(|e| fail(v, T::Int64, e.to_string()))
        });
        service.register(T::String, T::Double, |v| {
            let s = v.as_str().unwrap_or_default();
            s.trim()
                .parse::<f64>()
                .map(Bson::Double)
                .map_err(|e| fail(v, T::Double, e.to_string()))
        });
        for from in [T::Int32, T::Int64, T::Double] {
            service.register(from, T::String, |v| match v {
                Bson::Int32(i) => Ok(Bson::String(i.to_string())),
                Bson::Int64(i) => Ok(Bson::String(i.to_string())),
                Bson::Double(d) => Ok(Bson::String(d.to_string())),
                other => Err(fail(other, T::String, "not a number")),
            });
        }

        service.register(T::String, T::DateTime, |v| {
            let s = v.as_str().unwrap_or_default();
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| Bson::DateTime(bson::DateTime::from_millis(dt.timestamp_millis())))
                .map_err(|e| fail(v, T::DateTime, e.to_string()))
        });
        service.register(T::Int64, T::DateTime, |v| match v {
            Bson::Int64(millis) => Ok(Bson::DateTime(bson::DateTime::from_millis(*millis))),
            other => Err(fail(other, T::DateTime, "not epoch millis")),
        });
        service.register(T::Int32, T::DateTime, |v| match v {
            Bson::Int32(millis) => Ok(Bson::DateTime(bson::DateTime::from_millis(i64::from(
                *millis,
            )))),
            other => Err(fail(other, T::DateTime, "not epoch millis")),
        });

        service.register(T::String, T::Boolean, |v| {
            match v.as_str().map(str::to_ascii_lowercase).as_deref() {
                Some("true") => Ok(Bson::Boolean(true)),
                Some("false") => Ok(Bson::Boolean(false)),
                _ => Err(fail(v, T::Boolean, "not a boolean literal")),
            }
        });

        service
    }

    /// Register a conversion, replacing any existing one for the same pair.
    pub fn register<F>(&mut self, from: ElementType, to: ElementType, f: F) -> &mut Self
    where
        F: Fn(&Bson) -> Result<Bson, ConversionError> + Send + Sync + 'static,
    {
        self.conversions.insert(key(from, to), Arc::new(f));
        self
    }

    /// Whether a conversion between the two types is registered.
    pub fn can_convert(&self, from: ElementType, to: ElementType) -> bool {
        from == to || self.conversions.contains_key(&key(from, to))
    }

    /// Convert a value to the target type.
    pub fn convert(&self, value: &Bson, to: ElementType) -> Result<Bson, ConversionError> {
        let from = value.element_type();
        if from == to {
            return Ok(value.clone());
        }
        match self.conversions.get(&key(from, to)) {
            Some(convert) => convert(value),
            None => Err(fail(value, to, "no conversion registered")),
        }
    }
}

/// Writes entities into stored documents and reads them back.
#[derive(Debug)]
pub struct DocumentConverter {
    context: Arc<MappingContext>,
    conversions: ConversionService,
    options: MappingOptions,
}

impl DocumentConverter {
    /// Create a converter with default conversions and options.
    pub fn new(context: Arc<MappingContext>) -> Self {
        Self::with_options(context, MappingOptions::default())
    }

    /// Create a converter with the given options.
    pub fn with_options(context: Arc<MappingContext>, options: MappingOptions) -> Self {
        Self {
            context,
            conversions: ConversionService::with_defaults(),
            options,
        }
    }

    /// Replace the conversion service.
    pub fn with_conversions(mut self, conversions: ConversionService) -> Self {
        self.conversions = conversions;
        self
    }

    /// The mapping context.
    pub fn context(&self) -> &Arc<MappingContext> {
        &self.context
    }

    /// The conversion service.
    pub fn conversions(&self) -> &ConversionService {
        &self.conversions
    }

    /// The mapping options.
    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// Convert a value into its stored form.
    ///
    /// A custom converter on the property wins. Scalars are then coerced toward
    /// the declared kind when a conversion exists; arrays and documents are
    /// converted element by element, documents through their embedded entity.
    /// Values that cannot be coerced are returned as they are.
    pub fn convert_to_mongo_type(&self, value: &Bson, property: Option<&PropertyDescriptor>) -> Bson {
        match property {
            Some(p) => self.convert_value(value, p.kind(), p.custom_converter()),
            None => self.convert_value(value, &PropertyKind::Any, None),
        }
    }

    /// Coerce an identifier toward the native id kind.
    ///
    /// Tries the conversion service toward the entity's id kind (the configured
    /// default when there is no entity), then the generic value conversion.
    /// Never fails: the input comes back unchanged when nothing applies.
    pub fn convert_id(&self, value: &Bson, entity: Option<&EntityDescriptor>) -> Bson {
        let kind = entity
            .map(EntityDescriptor::id_kind)
            .unwrap_or(self.options.default_id_kind);
        let target = kind.element_type();

        if value.element_type() == target {
            return value.clone();
        }

        match self.conversions.convert(value, target) {
            Ok(converted) => converted,
            Err(err) => {
                trace!(error = %err, id_kind = %kind, "Falling back to generic id conversion");
                self.convert_to_mongo_type(value, entity.map(EntityDescriptor::id_descriptor))
            }
        }
    }

    /// Serialize a value and write it as a stored document.
    pub fn write<T: Serialize>(
        &self,
        value: &T,
        entity: Option<&EntityDescriptor>,
    ) -> MappingResult<Document> {
        let document = bson::to_document(value)?;
        Ok(self.write_document(&document, entity))
    }

    /// Write an already serialized document.
    ///
    /// The id key is renamed to `_id` and coerced, a `null` id is dropped so the
    /// server assigns one, aliases are applied through embedded entities and the
    /// type alias is written under the configured type key.
    pub fn write_document(&self, document: &Document, entity: Option<&EntityDescriptor>) -> Document {
        let type_hint = self
            .options
            .type_key
            .as_deref()
            .zip(entity.and_then(EntityDescriptor::type_alias));
        let property_id_present = document
            .keys()
            .any(|k| k != ID_FIELD && is_id_key(k, entity));

        let mut written = Document::new();
        for (key, value) in document {
            if is_id_key(key, entity) {
                if key == ID_FIELD && property_id_present {
                    warn!(entity = ?entity.map(EntityDescriptor::name), "Both an id property and _id present, dropping _id");
                    continue;
                }
                if !matches!(value, Bson::Null) {
                    written.insert(ID_FIELD, self.convert_id(value, entity));
                }
                continue;
            }
            if type_hint.is_some_and(|(type_key, _)| type_key == key) {
                continue;
            }

            let property = entity.and_then(|e| e.property(key).or_else(|| e.property_by_field(key)));
            match property {
                Some(p) => {
                    written.insert(p.field_name(), self.convert_to_mongo_type(value, Some(p)));
                }
                None => {
                    written.insert(key.clone(), self.convert_to_mongo_type(value, None));
                }
            }
        }

        if let Some((type_key, alias)) = type_hint {
            written.insert(type_key, alias);
        }
        written
    }

    /// Read a stored document into a value.
    ///
    /// Field aliases are reversed, `_id` becomes the id property when an entity
    /// is known and the type key is removed.
    pub fn read<T: DeserializeOwned>(
        &self,
        document: &Document,
        entity: Option<&EntityDescriptor>,
    ) -> MappingResult<T> {
        let document = self.read_document(document, entity);
        Ok(bson::from_document(document)?)
    }

    /// Reverse the aliases of a stored document.
    pub fn read_document(&self, document: &Document, entity: Option<&EntityDescriptor>) -> Document {
        let mut read = Document::new();
        for (key, value) in document {
            if self.options.type_key.as_deref() == Some(key.as_str()) {
                continue;
            }
            match entity.and_then(|e| e.property_by_field(key)) {
                Some(property) => {
                    let nested = property
                        .kind()
                        .embedded_entity()
                        .and_then(|name| self.context.get(name));
                    read.insert(property.name(), self.read_value(value, nested.as_deref()));
                }
                None => {
                    read.insert(key.clone(), self.read_value(value, None));
                }
            }
        }
        read
    }

    fn read_value(&self, value: &Bson, entity: Option<&EntityDescriptor>) -> Bson {
        match value {
            Bson::Document(doc) => Bson::Document(self.read_document(doc, entity)),
            Bson::Array(items) => Bson::Array(items.iter().map(|v| self.read_value(v, entity)).collect()),
            other => other.clone(),
        }
    }

    fn convert_value(
        &self,
        value: &Bson,
        kind: &PropertyKind,
        custom: Option<&dyn ValueConverter>,
    ) -> Bson {
        if let Some(written) = custom.and_then(|c| c.write(value)) {
            return written;
        }

        match value {
            Bson::Array(items) => Bson::Array(
                items
                    .iter()
                    .map(|item| self.convert_value(item, kind.element_kind(), custom))
                    .collect(),
            ),
            Bson::Document(doc) => {
                let nested = kind.embedded_entity().and_then(|name| self.context.get(name));
                Bson::Document(self.write_embedded(doc, nested.as_deref()))
            }
            Bson::Null => Bson::Null,
            scalar => self.coerce_scalar(scalar, kind.element_kind()),
        }
    }

    fn write_embedded(&self, document: &Document, entity: Option<&EntityDescriptor>) -> Document {
        let mut written = Document::new();
        for (key, value) in document {
            let property = entity.and_then(|e| e.property(key).or_else(|| e.property_by_field(key)));
            match property {
                Some(p) => {
                    written.insert(p.field_name(), self.convert_to_mongo_type(value, Some(p)));
                }
                None => {
                    written.insert(key.clone(), self.convert_to_mongo_type(value, None));
                }
            }
        }
        written
    }

    fn coerce_scalar(&self, value: &Bson, kind: &PropertyKind) -> Bson {
        let Some(target) = kind.element_type() else {
            return value.clone();
        };
        if value.element_type() == target {
            return value.clone();
        }
        match self.conversions.convert(value, target) {
            Ok(converted) => converted,
            Err(err) => {
                trace!(error = %err, "Keeping value of unconvertible type");
                value.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{IdKind, PropertyKind};
    use bson::doc;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    const HEX: &str = "5f1d7f1e8e4b2c3a4d5e6f70";

    fn context() -> Arc<MappingContext> {
        let address = EntityDescriptor::builder("Address")
            .property(PropertyDescriptor::new("zipCode", PropertyKind::String).field("zip"))
            .build()
            .unwrap();
        let person = EntityDescriptor::builder("Person")
            .type_alias("person")
            .property(PropertyDescriptor::new("firstName", PropertyKind::String).field("first"))
            .property(PropertyDescriptor::new("born", PropertyKind::DateTime))
            .property(PropertyDescriptor::new(
                "address",
                PropertyKind::Embedded("Address".into()),
            ))
            .build()
            .unwrap();
        Arc::new(MappingContext::with_entities([address, person]).unwrap())
    }

    #[test]
    fn test_default_conversions() {
        let service = ConversionService::with_defaults();

        let oid = service.convert(&Bson::String(HEX.into()), ElementType::ObjectId).unwrap();
        assert_eq!(oid, Bson::ObjectId(ObjectId::parse_str(HEX).unwrap()));
        assert_eq!(
            service.convert(&oid, ElementType::String).unwrap(),
            Bson::String(HEX.into())
        );

        assert_eq!(
            service.convert(&Bson::Int32(7), ElementType::Int64).unwrap(),
            Bson::Int64(7)
        );
        assert_eq!(
            service.convert(&Bson::String(" 42 ".into()), ElementType::Int32).unwrap(),
            Bson::Int32(42)
        );
        assert!(service.convert(&Bson::Double(1.5), ElementType::Int32).is_err());
        assert!(service.convert(&Bson::Int64(i64::MAX), ElementType::Int32).is_err());
    }

    #[test]
    fn test_uuid_round_trip() {
        let service = ConversionService::default();
        let text = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let binary = service.convert(&Bson::String(text.into()), ElementType::Binary).unwrap();
        match &binary {
            Bson::Binary(b) => assert_eq!(b.subtype, BinarySubtype::Uuid),
            other => panic!("expected binary, got {other:?}"),
        }
        assert_eq!(
            service.convert(&binary, ElementType::String).unwrap(),
            Bson::String(text.into())
        );
    }

    #[test]
    fn test_missing_conversion_errors() {
        let service = ConversionService::empty();
        let err = service.convert(&Bson::Int32(1), ElementType::ObjectId).unwrap_err();
        assert_eq!(err.from, "int");
        assert_eq!(err.to, "objectId");
        assert!(service.can_convert(ElementType::Int32, ElementType::Int32));
    }

    #[test]
    fn test_convert_id_best_effort() {
        let converter = DocumentConverter::new(context());

        let coerced = converter.convert_id(&Bson::String(HEX.into()), None);
        assert!(matches!(coerced, Bson::ObjectId(_)));
        // Already native: unchanged.
        assert_eq!(converter.convert_id(&coerced, None), coerced);
        // Not coercible: original value.
        assert_eq!(
            converter.convert_id(&Bson::String("abc".into()), None),
            Bson::String("abc".into())
        );
        assert_eq!(converter.convert_id(&Bson::Int32(1), None), Bson::Int32(1));
    }

    #[test]
    fn test_convert_id_uses_entity_kind() {
        let entity = EntityDescriptor::builder("Counter")
            .id("id", IdKind::Int64)
            .build()
            .unwrap();
        let converter = DocumentConverter::new(Arc::new(MappingContext::new()));
        assert_eq!(
            converter.convert_id(&Bson::String("12".into()), Some(&entity)),
            Bson::Int64(12)
        );
        // A hex string stays a string for non-ObjectId ids.
        assert_eq!(
            converter.convert_id(&Bson::String(HEX.into()), Some(&entity)),
            Bson::String(HEX.into())
        );
    }

    #[test]
    fn test_custom_converter_wins() {
        let money = PropertyDescriptor::new("price", PropertyKind::Int64).converter(FnConverter::new(
            "cents",
            |v: &Bson| v.as_f64().map(|d| Bson::Int64((d * 100.0).round() as i64)),
        ));
        let converter = DocumentConverter::new(Arc::new(MappingContext::new()));
        assert_eq!(
            converter.convert_to_mongo_type(&Bson::Double(12.5), Some(&money)),
            Bson::Int64(1250)
        );
        // Declined values fall through to kind coercion.
        assert_eq!(
            converter.convert_to_mongo_type(&Bson::Int32(3), Some(&money)),
            Bson::Int64(3)
        );
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Address {
        #[serde(rename = "zipCode")]
        zip_code: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Person {
        id: ObjectId,
        #[serde(rename = "firstName")]
        first_name: String,
        address: Address,
    }

    #[test]
    fn test_write_document_applies_metadata() {
        let context = context();
        let person = context.require("Person").unwrap();
        let converter = DocumentConverter::new(Arc::clone(&context));

        let written = converter.write_document(
            &doc! {
                "id": HEX,
                "firstName": "Ada",
                "born": "1815-12-10T00:00:00Z",
                "address": { "zipCode": "W1" },
                "extra": 1,
            },
            Some(&person),
        );

        assert_eq!(
            written,
            doc! {
                "_id": ObjectId::parse_str(HEX).unwrap(),
                "first": "Ada",
                "born": bson::DateTime::from_millis(-4_861_728_000_000),
                "address": { "zip": "W1" },
                "extra": 1,
                "_class": "person",
            }
        );
    }

    #[test]
    fn test_write_drops_null_id_and_duplicate_id() {
        let converter = DocumentConverter::new(Arc::new(MappingContext::new()));
        assert_eq!(
            converter.write_document(&doc! { "id": Bson::Null, "n": 1 }, None),
            doc! { "n": 1 }
        );
        assert_eq!(
            converter.write_document(&doc! { "_id": 2, "id": 1 }, None),
            doc! { "_id": 1 }
        );
    }

    #[test]
    fn test_write_read_entity() {
        let context = context();
        let entity = context.require("Person").unwrap();
        let converter = DocumentConverter::new(Arc::clone(&context));
        let person = Person {
            id: ObjectId::parse_str(HEX).unwrap(),
            first_name: "Grace".into(),
            address: Address {
                zip_code: "10001".into(),
            },
        };

        let stored = converter.write(&person, Some(&entity)).unwrap();
        assert_eq!(stored.get_str("first").unwrap(), "Grace");
        assert_eq!(stored.get_str("_class").unwrap(), "person");
        assert_eq!(
            stored.get_document("address").unwrap(),
            &doc! { "zip": "10001" }
        );

        let read: Person = converter.read(&stored, Some(&entity)).unwrap();
        assert_eq!(read, person);
    }

    #[test]
    fn test_type_key_disabled() {
        let context = context();
        let entity = context.require("Person").unwrap();
        let converter = DocumentConverter::with_options(
            Arc::clone(&context),
            MappingOptions::default().without_type_key(),
        );
        let written = converter.write_document(&doc! { "firstName": "Ada" }, Some(&entity));
        assert_eq!(written, doc! { "first": "Ada" });
    }
}
