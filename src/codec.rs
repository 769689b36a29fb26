//! Walking document instances.
//!
//! [`transform`] applies a [`LeafTransform`] at every `Direct` node of a
//! precomputed schema tree. [`transform_dynamic`] does the same without a
//! full tree: it resolves each nested value's class at walk time through a
//! [`DynamicTypeResolver`], so sibling values of a polymorphic collection may
//! each get a different schema.
//!
//! Absent and null values are skipped. Failures carry the path down to the
//! failing leaf: field names, list indices and map keys.

use ciborium::Value;

use crate::document::{get_mut, key_segment, value_kind};
use crate::error::{CryptError, FieldCryptError, SchemaError};
use crate::leaf::LeafTransform;
use crate::resolver::DynamicTypeResolver;
use crate::schema::{FieldType, Node, NodeKind};

/// Walk `value` under `node`, transforming crypto-marked leaves in place.
pub fn transform(value: &mut Value, node: &Node, leaf: &dyn LeafTransform) -> Result<(), FieldCryptError> {
    if matches!(value, Value::Null) {
        return Ok(());
    }

    match node.kind {
        NodeKind::Direct => apply(value, leaf).map_err(FieldCryptError::at_root),
        NodeKind::Document | NodeKind::Root => transform_document(value, &node.children, leaf),
        NodeKind::List => {
            let Some(child) = node.children.first() else {
                return Ok(());
            };
            let elements = as_array(value)?;
            for (index, element) in elements.iter_mut().enumerate() {
                transform(element, child, leaf).map_err(|err| err.chain(index.to_string()))?;
            }
            Ok(())
        }
        NodeKind::Map => {
            let Some(child) = node.children.first() else {
                return Ok(());
            };
            let entries = as_map(value)?;
            for (key, entry) in entries.iter_mut() {
                transform(entry, child, leaf).map_err(|err| err.chain(key_segment(key)))?;
            }
            Ok(())
        }
    }
}

/// Walk the fields of one document under its top-level nodes.
pub fn transform_document(
    value: &mut Value,
    children: &[Node],
    leaf: &dyn LeafTransform,
) -> Result<(), FieldCryptError> {
    let entries = as_map(value)?;
    for child in children {
        let Some(slot) = get_mut(entries, &child.document_name) else {
            continue;
        };
        if matches!(slot, Value::Null) {
            continue;
        }
        match child.kind {
            NodeKind::Direct => {
                apply(slot, leaf).map_err(|err| FieldCryptError::new(&child.field_name, err))?
            }
            _ => transform(slot, child, leaf).map_err(|err| err.chain(&child.field_name))?,
        }
    }
    Ok(())
}

/// Walk a document whose class is resolved from its discriminator, falling
/// back to `declared`.
pub fn transform_dynamic(
    value: &mut Value,
    declared: &str,
    resolver: &DynamicTypeResolver,
    leaf: &dyn LeafTransform,
) -> Result<(), FieldCryptError> {
    let nodes = resolver
        .resolve(value, declared)
        .map_err(FieldCryptError::at_root)?;
    walk_resolved(value, &nodes, resolver, leaf)
}

/// Iterate the stored entries, matching each against the resolved nodes.
fn walk_resolved(
    value: &mut Value,
    nodes: &[Node],
    resolver: &DynamicTypeResolver,
    leaf: &dyn LeafTransform,
) -> Result<(), FieldCryptError> {
    let entries = as_map(value)?;
    for (key, slot) in entries.iter_mut() {
        let Value::Text(key) = &*key else {
            continue;
        };
        if key.as_str() == resolver.discriminator_key() || matches!(slot, Value::Null) {
            continue;
        }
        let Some(node) = nodes.iter().find(|node| node.document_name == *key) else {
            continue;
        };

        if node.kind == NodeKind::Direct {
            apply(slot, leaf).map_err(|err| FieldCryptError::new(&node.field_name, err))?;
            continue;
        }
        let Some(field) = &node.field else {
            continue;
        };
        dive(slot, &field.ty, resolver, leaf).map_err(|err| err.chain(&node.field_name))?;
    }
    Ok(())
}

/// Descend into one nested value of declared type `declared`.
fn dive(
    value: &mut Value,
    declared: &FieldType,
    resolver: &DynamicTypeResolver,
    leaf: &dyn LeafTransform,
) -> Result<(), FieldCryptError> {
    match (declared, value) {
        (_, Value::Null) | (FieldType::Leaf, _) => Ok(()),
        (FieldType::Class(class), value @ Value::Map(_)) => {
            transform_dynamic(value, class, resolver, leaf)
        }
        (FieldType::List(element), Value::Array(elements)) => {
            for (index, item) in elements.iter_mut().enumerate() {
                dive(item, element, resolver, leaf).map_err(|err| err.chain(index.to_string()))?;
            }
            Ok(())
        }
        (FieldType::Map(inner), Value::Map(entries)) => {
            for (key, item) in entries.iter_mut() {
                dive(item, inner, resolver, leaf).map_err(|err| err.chain(key_segment(key)))?;
            }
            Ok(())
        }
        (declared, other) => Err(FieldCryptError::at_root(SchemaError::Unresolvable {
            declared: declared.to_string(),
            actual: value_kind(other),
        })),
    }
}

fn apply(value: &mut Value, leaf: &dyn LeafTransform) -> Result<(), CryptError> {
    *value = leaf.apply(value)?;
    Ok(())
}

fn as_map(value: &mut Value) -> Result<&mut Vec<(Value, Value)>, FieldCryptError> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(shape_mismatch("map", other)),
    }
}

fn as_array(value: &mut Value) -> Result<&mut Vec<Value>, FieldCryptError> {
    match value {
        Value::Array(elements) => Ok(elements),
        other => Err(shape_mismatch("list", other)),
    }
}

fn shape_mismatch(expected: &'static str, actual: &Value) -> FieldCryptError {
    FieldCryptError::at_root(CryptError::ShapeMismatch {
        expected,
        actual: value_kind(actual),
    })
}
