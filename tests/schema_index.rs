mod common;

use std::sync::Arc;
use std::thread;

use fieldcrypt::schema::WILDCARD;
use fieldcrypt::{ClassDef, EncryptedPredicate, FieldDef, FieldType, Node, NodeKind, SchemaError, SchemaIndex, TypeRegistry};

fn index() -> SchemaIndex {
    SchemaIndex::new(Arc::new(common::registry()))
}

fn names(index: &SchemaIndex, class: &str) -> Vec<String> {
    index
        .schema_for(class)
        .unwrap()
        .iter()
        .map(|node| node.field_name.clone())
        .collect()
}

#[test]
fn test_class_without_secrets_is_pruned() {
    let index = index();
    assert!(index.schema_for("PlainBean").unwrap().is_empty());
    assert!(index.schema_for("MySubBeanNotEncrypted").unwrap().is_empty());
    assert!(index.root_node("PlainBean").unwrap().is_none());
}

#[test]
fn test_recursive_model_terminates() {
    let index = index();

    assert_eq!(
        names(&index, "MyBean"),
        vec![
            "secretString",
            "secretLong",
            "secretBoolean",
            "secretSubBean",
            "secretStringList",
            "nonSensitiveSubBean",
            "nonSensitiveSubBeanList",
            "nonSensitiveMap",
            "secretMap",
            "nestedListMap",
            "nestedListList",
        ]
    );
    assert!(index.cycles_detected() > 0);
}

#[test]
fn test_encrypted_fields_are_opaque() {
    let index = index();
    let nodes = index.schema_for("MyBean").unwrap();

    let secret_map = nodes.iter().find(|n| n.field_name == "secretMap").unwrap();
    assert_eq!(secret_map.kind, NodeKind::Direct);
    assert!(secret_map.children.is_empty());
}

#[test]
fn test_nested_collections_get_one_level_per_collection() {
    let index = index();
    let nodes = index.schema_for("MyBean").unwrap();

    let nested = nodes.iter().find(|n| n.field_name == "nestedListMap").unwrap();
    assert_eq!(nested.kind, NodeKind::Map);
    let list = nested.element().unwrap();
    assert_eq!(list.kind, NodeKind::List);
    assert_eq!(list.field_name, WILDCARD);
    let bean = list.element().unwrap();
    assert_eq!(bean.kind, NodeKind::Document);
    assert!(bean.children.iter().any(|c| c.field_name == "secretString"));
}

#[test]
fn test_renamed_field_uses_document_name() {
    let index = index();
    let nodes = index.schema_for("RenamedField").unwrap();

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].field_name, "someSecret");
    assert_eq!(nodes[0].document_name, "password");
}

#[test]
fn test_superclass_fields_are_included() {
    let index = index();
    assert_eq!(names(&index, "Ssn"), vec!["someSecret", "ssn"]);

    let person = index.schema_for("Person").unwrap();
    assert_eq!(person[0].kind, NodeKind::Document);
    assert_eq!(person[0].children.len(), 2);
}

#[test]
fn test_qualified_name_predicate() {
    let registry = TypeRegistry::new().with_class(
        ClassDef::new("PlainBean")
            .field(FieldDef::leaf("nonSensitiveData"))
            .field(FieldDef::leaf("sensitiveData")),
    );
    let index = SchemaIndex::with_predicate(
        Arc::new(registry),
        EncryptedPredicate::qualified_names(["PlainBean.sensitiveData"]),
    );

    let nodes = index.schema_for("PlainBean").unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].field_name, "sensitiveData");
}

#[test]
fn test_unknown_types_are_reported() {
    let index = index();
    assert!(matches!(index.schema_for("Nope"), Err(SchemaError::UnknownType(name)) if name == "Nope"));

    let registry = TypeRegistry::new().with_class(
        ClassDef::new("Holder").field(FieldDef::new("items", FieldType::list(FieldType::class("Ghost")))),
    );
    let err = SchemaIndex::new(Arc::new(registry)).schema_for("Holder").unwrap_err();
    assert!(matches!(err, SchemaError::InField { ref location, .. } if location == "Holder.items"));
}

#[test]
fn test_concurrent_builds_agree() {
    let index = Arc::new(index());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let class = if i % 2 == 0 { "MyBean" } else { "MySubBean" };
                index.schema_for(class).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let bean = index.schema_for("MyBean").unwrap();
    let sub = index.schema_for("MySubBean").unwrap();
    for (i, nodes) in results.iter().enumerate() {
        let expected = if i % 2 == 0 { &bean } else { &sub };
        assert!(Arc::ptr_eq(nodes, expected), "thread {i} saw an unpublished tree");
    }
}

/// A single-threaded build of `class` on an index that has built nothing else.
fn cold(class: &str) -> Vec<Node> {
    index().schema_for(class).unwrap().to_vec()
}

#[test]
fn test_schema_does_not_depend_on_build_order() {
    let registry = || {
        Arc::new(
            TypeRegistry::new()
                .with_class(
                    ClassDef::new("A")
                        .field(FieldDef::leaf("secret").encrypted())
                        .field(FieldDef::new("b", FieldType::class("B"))),
                )
                .with_class(
                    ClassDef::new("B")
                        .field(FieldDef::leaf("secret").encrypted())
                        .field(FieldDef::new("a", FieldType::class("A"))),
                ),
        )
    };

    let fresh = SchemaIndex::new(registry());
    let warm = SchemaIndex::new(registry());
    warm.schema_for("A").unwrap();

    assert_eq!(&*fresh.schema_for("B").unwrap(), &*warm.schema_for("B").unwrap());
    assert_eq!(&*fresh.schema_for("A").unwrap(), &*warm.schema_for("A").unwrap());
}

#[test]
fn test_cold_warm_and_concurrent_builds_match() {
    let bean = cold("MyBean");
    let sub = cold("MySubBean");

    let warm = index();
    warm.schema_for("MySubBean").unwrap();
    assert_eq!(&*warm.schema_for("MyBean").unwrap(), bean.as_slice());
    let warm = index();
    warm.schema_for("MyBean").unwrap();
    assert_eq!(&*warm.schema_for("MySubBean").unwrap(), sub.as_slice());

    let shared = Arc::new(index());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let index = Arc::clone(&shared);
            thread::spawn(move || {
                let class = if i % 2 == 0 { "MySubBean" } else { "MyBean" };
                (class, index.schema_for(class).unwrap())
            })
        })
        .collect();
    for handle in handles {
        let (class, nodes) = handle.join().unwrap();
        let expected = if class == "MyBean" { &bean } else { &sub };
        assert_eq!(&*nodes, expected.as_slice(), "{class} differs from a cold build");
    }
}

#[test]
fn test_registry_from_json_matches_builder() {
    let registry = TypeRegistry::from_json(
        r#"{
            "classes": [
                {"name": "Inner", "fields": [{"name": "secret", "encrypted": true}]},
                {"name": "Outer", "fields": [
                    {"name": "plain"},
                    {"name": "inners", "type": {"map": {"list": {"class": "Inner"}}}}
                ]}
            ]
        }"#,
    )
    .unwrap();
    let index = SchemaIndex::new(Arc::new(registry));

    let nodes = index.schema_for("Outer").unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].kind, NodeKind::Map);
    assert_eq!(nodes[0].element().unwrap().kind, NodeKind::List);
}
