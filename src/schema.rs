//! Static type descriptions and the schema tree.
//!
//! The host describes its persisted types once, either through the builder
//! API or from a JSON description file. [`crate::index::SchemaIndex`] turns
//! these descriptions into [`Node`] trees that say which fields are sensitive
//! and how to reach them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Default document key naming a value's concrete type.
pub const DISCRIMINATOR_KEY: &str = "_class";

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Scalars, strings, binary and anything else that never holds fields.
    Leaf,
    /// A sub-document of the named class.
    Class(String),
    /// A list or set of the element type.
    List(Box<FieldType>),
    /// A map with string keys and values of the given type.
    Map(Box<FieldType>),
}

impl FieldType {
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    pub fn list(element: FieldType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn map(value: FieldType) -> Self {
        Self::Map(Box::new(value))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf => f.write_str("leaf"),
            Self::Class(name) => f.write_str(name),
            Self::List(element) => write!(f, "List<{element}>"),
            Self::Map(value) => write!(f, "Map<String, {value}>"),
        }
    }
}

/// A persisted field of a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// The host identifier.
    pub name: String,
    /// The key used in the stored document, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(rename = "type", default = "leaf")]
    pub ty: FieldType,
    /// Marks the whole field value for encryption.
    #[serde(default)]
    pub encrypted: bool,
    /// `false` for transient or computed fields that never reach the document.
    #[serde(default = "persisted")]
    pub persisted: bool,
}

fn leaf() -> FieldType {
    FieldType::Leaf
}

fn persisted() -> bool {
    true
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            document_name: None,
            ty,
            encrypted: false,
            persisted: true,
        }
    }

    /// A scalar field.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Leaf)
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Store the field under a different document key.
    pub fn renamed(mut self, document_name: impl Into<String>) -> Self {
        self.document_name = Some(document_name.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.persisted = false;
        self
    }

    /// The key this field is stored under.
    pub fn document_name(&self) -> &str {
        self.document_name.as_deref().unwrap_or(&self.name)
    }
}

/// A persisted class: its own fields plus an optional superclass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<Arc<FieldDef>>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            fields: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.extends = Some(superclass.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(Arc::new(field));
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryFile {
    classes: Vec<ClassDef>,
    #[serde(default)]
    discriminators: HashMap<String, String>,
}

/// The allow-list of known classes.
///
/// Every class is discriminable by its own name. Extra discriminator tags,
/// such as fully qualified names written by another runtime, are added with
/// [`TypeRegistry::register_discriminator`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    classes: HashMap<String, Arc<ClassDef>>,
    discriminators: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: ClassDef) -> &mut Self {
        self.classes.insert(class.name.clone(), Arc::new(class));
        self
    }

    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.register(class);
        self
    }

    /// Map a discriminator tag to a registered class.
    pub fn register_discriminator(
        &mut self,
        tag: impl Into<String>,
        class: impl Into<String>,
    ) -> Result<&mut Self, SchemaError> {
        let class = class.into();
        if !self.classes.contains_key(&class) {
            return Err(SchemaError::UnknownType(class));
        }
        self.discriminators.insert(tag.into(), class);
        Ok(self)
    }

    /// Load a registry from a JSON description:
    /// `{"classes": [...], "discriminators": {"tag": "Class"}}`.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for class in file.classes {
            registry.register(class);
        }
        for (tag, class) in file.discriminators {
            registry.register_discriminator(tag, class)?;
        }
        Ok(registry)
    }

    pub fn class(&self, name: &str) -> Result<&Arc<ClassDef>, SchemaError> {
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Resolve a discriminator tag to a class. Unknown tags are errors.
    pub fn resolve_discriminator(&self, tag: &str) -> Result<&Arc<ClassDef>, SchemaError> {
        let name = self
            .discriminators
            .get(tag)
            .map(String::as_str)
            .unwrap_or(tag);
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownDiscriminator(tag.to_string()))
    }

    /// All persisted fields of `name`, superclass fields first.
    pub fn all_fields(&self, name: &str) -> Result<Vec<(Arc<ClassDef>, Arc<FieldDef>)>, SchemaError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(name.to_string());
        while let Some(class_name) = current {
            if !seen.insert(class_name.clone()) {
                return Err(SchemaError::InheritanceCycle(class_name));
            }
            let class = Arc::clone(self.class(&class_name)?);
            current = class.extends.clone();
            chain.push(class);
        }

        Ok(chain
            .into_iter()
            .rev()
            .flat_map(|class| {
                class
                    .fields
                    .iter()
                    .filter(|field| field.persisted)
                    .map(|field| (Arc::clone(&class), Arc::clone(field)))
                    .collect::<Vec<_>>()
            })
            .collect())
    }
}

type PredicateFn = dyn Fn(&ClassDef, &FieldDef) -> bool + Send + Sync;

/// Decides whether a field is sensitive.
#[derive(Clone)]
pub struct EncryptedPredicate(Arc<PredicateFn>);

impl EncryptedPredicate {
    /// Fields carrying the `encrypted` marker.
    pub fn marked() -> Self {
        Self(Arc::new(|_, field| field.encrypted))
    }

    /// Fields whose `Class.field` name is in `names`, marker or not.
    pub fn qualified_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self(Arc::new(move |class, field| {
            names.contains(&format!("{}.{}", class.name, field.name))
        }))
    }

    pub fn custom(predicate: impl Fn(&ClassDef, &FieldDef) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn test(&self, class: &ClassDef, field: &FieldDef) -> bool {
        (self.0)(class, field)
    }
}

impl Default for EncryptedPredicate {
    fn default() -> Self {
        Self::marked()
    }
}

impl fmt::Debug for EncryptedPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedPredicate")
    }
}

/// What a node does with its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The whole value is encrypted as one unit.
    Direct,
    /// Each element is walked with the single child.
    List,
    /// Each map value is walked with the single child.
    Map,
    /// Each child names a field of this sub-document.
    Document,
    /// The top-level document.
    Root,
}

/// Placeholder name of the synthetic element node under lists and maps.
pub const WILDCARD: &str = "*";

/// One node of an immutable schema tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub field_name: String,
    pub document_name: String,
    pub children: Vec<Node>,
    /// The field this node was built from. Absent on synthetic nodes.
    pub field: Option<Arc<FieldDef>>,
}

impl Node {
    pub fn direct(field: &Arc<FieldDef>) -> Self {
        Self {
            kind: NodeKind::Direct,
            field_name: field.name.clone(),
            document_name: field.document_name().to_string(),
            children: Vec::new(),
            field: Some(Arc::clone(field)),
        }
    }

    pub fn root(children: Vec<Node>) -> Self {
        Self {
            kind: NodeKind::Root,
            field_name: String::new(),
            document_name: String::new(),
            children,
            field: None,
        }
    }

    pub(crate) fn synthetic(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            field_name: WILDCARD.to_string(),
            document_name: WILDCARD.to_string(),
            children,
            field: None,
        }
    }

    /// Rename a synthetic node after the field that holds it.
    pub(crate) fn for_field(mut self, field: &Arc<FieldDef>) -> Self {
        self.field_name = field.name.clone();
        self.document_name = field.document_name().to_string();
        self.field = Some(Arc::clone(field));
        self
    }

    /// The element schema of a list or map node.
    pub fn element(&self) -> Option<&Node> {
        match self.kind {
            NodeKind::List | NodeKind::Map => self.children.first(),
            _ => None,
        }
    }
}
