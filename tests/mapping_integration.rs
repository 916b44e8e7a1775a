//! Integration tests for filter, update and id mapping.
//!
//! These tests check the properties every mapped document must satisfy:
//! - Keys are preserved for filters without an id
//! - Id coercion leaves native ids untouched
//! - `$in` lists and combinator branches are coerced element by element
//! - Mapping an already mapped document changes nothing

use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use docmap::mapping::{
    Criteria, DocumentConverter, EntityDescriptor, IdKind, MappingContext, PropertyDescriptor,
    PropertyKind, Query, QueryMapper, Update, UpdateMapper,
};
use pretty_assertions::assert_eq;

const HEX: &str = "64b7f0c2a1e3d4c5b6a79801";

fn oid() -> ObjectId {
    ObjectId::parse_str(HEX).unwrap()
}

struct Fixture {
    queries: QueryMapper,
    updates: UpdateMapper,
    invoice: Arc<EntityDescriptor>,
    tag: Arc<EntityDescriptor>,
}

fn fixture() -> Fixture {
    let address = EntityDescriptor::builder("Address")
        .property(PropertyDescriptor::new("city", PropertyKind::String).field("c"))
        .property(PropertyDescriptor::new("postalCode", PropertyKind::String).field("zip"))
        .build()
        .unwrap();
    let invoice = EntityDescriptor::builder("Invoice")
        .collection("invoices")
        .id("invoiceId", IdKind::ObjectId)
        .property(PropertyDescriptor::new("customer", PropertyKind::String).field("cust"))
        .property(PropertyDescriptor::new("amount", PropertyKind::Int64).field("amt"))
        .property(PropertyDescriptor::new(
            "billing",
            PropertyKind::Embedded("Address".into()),
        ))
        .build()
        .unwrap();
    let tag = EntityDescriptor::builder("Tag")
        .id("id", IdKind::String)
        .property(PropertyDescriptor::new("label", PropertyKind::String))
        .property(PropertyDescriptor::new("uses", PropertyKind::Int64))
        .build()
        .unwrap();

    let context = Arc::new(MappingContext::with_entities([address, invoice, tag]).unwrap());
    let converter = Arc::new(DocumentConverter::new(Arc::clone(&context)));
    Fixture {
        queries: QueryMapper::new(Arc::clone(&converter)),
        updates: UpdateMapper::new(converter),
        invoice: context.require("Invoice").unwrap(),
        tag: context.require("Tag").unwrap(),
    }
}

fn keys(document: &Document) -> Vec<&str> {
    let mut keys: Vec<&str> = document.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

#[test]
fn test_filters_without_id_keep_their_keys() {
    let f = fixture();
    let filters = [
        doc! { "label": "rust" },
        doc! { "label": { "$regex": "^ru" }, "uses": { "$gt": 3, "$lte": 10 } },
        doc! { "uses": { "$in": [1, 2, 3] }, "$comment": "hot tags" },
        doc! { "label": { "$exists": false }, "other": [1, 2] },
    ];

    for filter in &filters {
        let mapped = f.queries.map_query(filter, Some(&f.tag));
        assert_eq!(keys(&mapped), keys(filter));
    }

    let mapped = f.queries.map_query(&filters[1], Some(&f.tag));
    assert_eq!(mapped.get_document("uses").unwrap(), &doc! { "$gt": 3_i64, "$lte": 10_i64 });
}

#[test]
fn test_native_ids_are_left_alone() {
    let f = fixture();

    let native = Bson::ObjectId(oid());
    assert_eq!(f.queries.convert_id(&native, Some(&f.invoice)), native);

    let string_id = Bson::String("tag-42".to_string());
    assert_eq!(f.queries.convert_id(&string_id, Some(&f.tag)), string_id);

    let once = f.queries.convert_id(&Bson::String(HEX.to_string()), Some(&f.invoice));
    assert_eq!(once, native);
    assert_eq!(f.queries.convert_id(&once, Some(&f.invoice)), once);
}

#[test]
fn test_unconvertible_ids_pass_through() {
    let f = fixture();
    for value in [
        Bson::String("not-an-object-id".to_string()),
        Bson::Int32(7),
        Bson::Boolean(true),
        Bson::Null,
    ] {
        assert_eq!(f.queries.convert_id(&value, Some(&f.invoice)), value);
    }
}

#[test]
fn test_id_in_list_is_coerced_element_wise() {
    let f = fixture();
    let mapped = f.queries.map_query(
        &doc! { "_id": { "$in": ["invoice-7", HEX] } },
        Some(&f.invoice),
    );
    assert_eq!(mapped, doc! { "_id": { "$in": ["invoice-7", oid()] } });

    let mapped = f.queries.map_query(
        &doc! { "invoiceId": { "$nin": [HEX] } },
        Some(&f.invoice),
    );
    assert_eq!(mapped, doc! { "_id": { "$nin": [oid()] } });
}

#[test]
fn test_combinator_branches_rename_id() {
    let f = fixture();
    let mapped = f
        .queries
        .map_query(&doc! { "$or": [{ "id": 1 }, { "id": 2 }] }, None);
    assert_eq!(mapped, doc! { "$or": [{ "_id": 1 }, { "_id": 2 }] });

    let mapped = f.queries.map_query(
        &doc! { "$nor": [{ "invoiceId": HEX }, { "customer": "Ada" }] },
        Some(&f.invoice),
    );
    assert_eq!(mapped, doc! { "$nor": [{ "_id": oid() }, { "cust": "Ada" }] });
}

#[test]
fn test_mapping_twice_changes_nothing() {
    let f = fixture();
    let filter = Criteria::new()
        .in_values("invoiceId", [HEX, "draft"])
        .gte("amount", 100)
        .eq("billing.city", "Lisbon")
        .or_operator([
            Criteria::new().eq("customer", "Ada"),
            Criteria::new().eq("billing.postalCode", "1000-001"),
        ])
        .to_document()
        .unwrap();

    let once = f.queries.map_query(&filter, Some(&f.invoice));
    let twice = f.queries.map_query(&once, Some(&f.invoice));

    assert_eq!(once, twice);
    assert_eq!(
        once,
        doc! {
            "_id": { "$in": [oid(), "draft"] },
            "amt": { "$gte": 100_i64 },
            "billing.c": "Lisbon",
            "$or": [{ "cust": "Ada" }, { "billing.zip": "1000-001" }],
        }
    );
}

#[test]
fn test_query_object_and_update_mapping() {
    let f = fixture();
    let query = Query::new(Criteria::new().eq("customer", "Ada"));
    let mapped = f.queries.map_query_object(&query, Some(&f.invoice)).unwrap();
    assert_eq!(mapped.filter, doc! { "cust": "Ada" });

    let update = Update::new()
        .set("billing.city", "Porto")
        .inc("amount", 5)
        .set_on_insert("invoiceId", HEX);
    let mapped = f.updates.map_update(&update, Some(&f.invoice)).unwrap();
    assert_eq!(
        mapped.update,
        doc! {
            "$set": { "billing.c": "Porto" },
            "$inc": { "amt": 5_i64 },
            "$setOnInsert": { "_id": oid() },
        }
    );
    assert!(mapped.array_filters.is_empty());
}
