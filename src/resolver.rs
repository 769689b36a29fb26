//! Per-value schema resolution for polymorphic documents.
//!
//! A stored sub-document may carry a discriminator (by default under
//! `_class`) naming its concrete class. The resolver prefers that tag and
//! falls back to the statically declared class. Tags are looked up in the
//! registry's allow-list only; an unknown tag is an error, never a guess.

use std::sync::Arc;

use ciborium::Value;

use crate::document::get;
use crate::error::SchemaError;
use crate::index::SchemaIndex;
use crate::schema::{ClassDef, Node, DISCRIMINATOR_KEY};

/// How much of the resolved class to describe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolveDepth {
    /// One level of fields. Nested values are resolved again when reached.
    #[default]
    SingleLevel,
    /// The full cached tree. Subtrees with no statically sensitive fields
    /// are pruned, so polymorphic values below them are not visited.
    Recursive,
}

#[derive(Debug, Clone)]
pub struct DynamicTypeResolver {
    index: Arc<SchemaIndex>,
    discriminator_key: String,
    depth: ResolveDepth,
}

impl DynamicTypeResolver {
    pub fn new(index: Arc<SchemaIndex>) -> Self {
        Self {
            index,
            discriminator_key: DISCRIMINATOR_KEY.to_string(),
            depth: ResolveDepth::default(),
        }
    }

    pub fn with_discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = key.into();
        self
    }

    pub fn with_depth(mut self, depth: ResolveDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn discriminator_key(&self) -> &str {
        &self.discriminator_key
    }

    pub fn index(&self) -> &Arc<SchemaIndex> {
        &self.index
    }

    /// The discriminator tag stored in `value`, if any.
    pub fn discriminator<'a>(&self, value: &'a Value) -> Result<Option<&'a str>, SchemaError> {
        match get(value, &self.discriminator_key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(tag)) => Ok(Some(tag.as_str())),
            Some(_) => Err(SchemaError::InvalidDiscriminator(
                self.discriminator_key.clone(),
            )),
        }
    }

    /// The concrete class of `value`.
    pub fn resolve_class(&self, value: &Value, declared: &str) -> Result<Arc<ClassDef>, SchemaError> {
        let registry = self.index.registry();
        match self.discriminator(value)? {
            Some(tag) => registry.resolve_discriminator(tag).cloned(),
            None => registry.class(declared).cloned(),
        }
    }

    /// The nodes to walk `value` with.
    pub fn resolve(&self, value: &Value, declared: &str) -> Result<Arc<[Node]>, SchemaError> {
        let class = self.resolve_class(value, declared)?;
        match self.depth {
            ResolveDepth::SingleLevel => self.index.single_level(&class.name),
            ResolveDepth::Recursive => self.index.schema_for(&class.name),
        }
    }
}
