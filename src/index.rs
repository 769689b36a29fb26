//! Cached schema trees.
//!
//! [`SchemaIndex::schema_for`] walks the declared field graph of a class
//! depth-first and memoizes the resulting [`Node`] list. Trees are built into
//! private vectors and published into the cache only once complete, and no
//! lock is held across the recursive build. Two threads racing on the same
//! class both build it; the first published result wins and both callers
//! return it.
//!
//! A class that reappears on the in-progress stack is a cycle. That branch
//! resolves to "nothing to do" and the enclosing results are marked
//! truncated. A truncated tree is only ever served as the schema of the
//! class it was built for. It is never spliced into another class's tree,
//! because the same class reached from a different entry point expands
//! further. Untruncated trees are the same from every entry point and are
//! reused freely, so a class's schema never depends on build order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::SchemaError;
use crate::schema::{ClassDef, EncryptedPredicate, FieldDef, FieldType, Node, NodeKind, TypeRegistry};

type Cache<T> = RwLock<HashMap<String, T>>;

/// A published tree and whether a cycle cut part of it off.
#[derive(Debug, Clone)]
struct Entry {
    nodes: Arc<[Node]>,
    truncated: bool,
}

/// Memoized schema trees for the classes of one registry.
#[derive(Debug)]
pub struct SchemaIndex {
    registry: Arc<TypeRegistry>,
    predicate: EncryptedPredicate,
    schemas: Cache<Entry>,
    single_level: Cache<Arc<[Node]>>,
    cycles: AtomicU64,
}

/// A build result, plus whether a cycle cut part of it off.
struct Built {
    nodes: Vec<Node>,
    truncated: bool,
}

impl SchemaIndex {
    /// An index detecting sensitive fields by their `encrypted` marker.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_predicate(registry, EncryptedPredicate::default())
    }

    pub fn with_predicate(registry: Arc<TypeRegistry>, predicate: EncryptedPredicate) -> Self {
        Self {
            registry,
            predicate,
            schemas: RwLock::default(),
            single_level: RwLock::default(),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn predicate(&self) -> &EncryptedPredicate {
        &self.predicate
    }

    /// The top-level sensitive-reachable nodes of `class`.
    ///
    /// An empty list means nothing in the class needs encryption.
    pub fn schema_for(&self, class: &str) -> Result<Arc<[Node]>, SchemaError> {
        if let Some(entry) = cached(&self.schemas, class) {
            return Ok(entry.nodes);
        }

        let mut stack = Vec::new();
        let built = self.build_class(class, &mut stack)?;
        tracing::debug!(
            class,
            nodes = built.nodes.len(),
            truncated = built.truncated,
            "schema built"
        );
        let entry = Entry {
            nodes: Arc::from(built.nodes),
            truncated: built.truncated,
        };
        Ok(publish(&self.schemas, class, entry).nodes)
    }

    /// The schema of `class` as a `Root` node, or `None` if it is empty.
    pub fn root_node(&self, class: &str) -> Result<Option<Node>, SchemaError> {
        let nodes = self.schema_for(class)?;
        if nodes.is_empty() {
            return Ok(None);
        }
        Ok(Some(Node::root(nodes.to_vec())))
    }

    /// A non-recursive scan of `class`.
    ///
    /// Sensitive fields become `Direct` nodes. Every other field that can
    /// hold structure becomes a childless `Document`, `List` or `Map` node
    /// carrying its declared type, so the caller can resolve nested values
    /// one at a time. Nothing is pruned.
    pub fn single_level(&self, class: &str) -> Result<Arc<[Node]>, SchemaError> {
        if let Some(cached) = cached(&self.single_level, class) {
            return Ok(cached);
        }

        let mut nodes = Vec::new();
        for (owner, field) in self.registry.all_fields(class)? {
            if self.predicate.test(&owner, &field) {
                nodes.push(Node::direct(&field));
                continue;
            }
            let kind = match field.ty {
                FieldType::Leaf => continue,
                FieldType::Class(_) => NodeKind::Document,
                FieldType::List(_) => NodeKind::List,
                FieldType::Map(_) => NodeKind::Map,
            };
            nodes.push(Node::synthetic(kind, Vec::new()).for_field(&field));
        }
        Ok(publish(&self.single_level, class, Arc::from(nodes)))
    }

    /// How many cyclic references were cut while building schemas.
    pub fn cycles_detected(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn build_class(&self, class: &str, stack: &mut Vec<String>) -> Result<Built, SchemaError> {
        if let Some(entry) = cached(&self.schemas, class).filter(|entry| !entry.truncated) {
            return Ok(Built {
                nodes: entry.nodes.to_vec(),
                truncated: false,
            });
        }
        if stack.iter().any(|entry| entry == class) {
            self.cycles.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(class, path = %stack.join(" -> "), "cyclic schema reference pruned");
            return Ok(Built {
                nodes: Vec::new(),
                truncated: true,
            });
        }

        stack.push(class.to_string());
        let result = self.build_fields(class, stack);
        stack.pop();
        let built = result?;

        if !built.truncated && !stack.is_empty() {
            let entry = Entry {
                nodes: Arc::from(built.nodes.clone()),
                truncated: false,
            };
            publish(&self.schemas, class, entry);
        }
        Ok(built)
    }

    fn build_fields(&self, class: &str, stack: &mut Vec<String>) -> Result<Built, SchemaError> {
        let mut built = Built {
            nodes: Vec::new(),
            truncated: false,
        };
        for (owner, field) in self.registry.all_fields(class)? {
            let (node, truncated) = self
                .field_node(&owner, &field, stack)
                .map_err(|source| SchemaError::InField {
                    location: format!("{}.{}", owner.name, field.name),
                    source: Box::new(source),
                })?;
            built.truncated |= truncated;
            built.nodes.extend(node);
        }
        Ok(built)
    }

    fn field_node(
        &self,
        owner: &ClassDef,
        field: &Arc<FieldDef>,
        stack: &mut Vec<String>,
    ) -> Result<(Option<Node>, bool), SchemaError> {
        if self.predicate.test(owner, field) {
            return Ok((Some(Node::direct(field)), false));
        }
        let (node, truncated) = self.type_node(&field.ty, stack)?;
        Ok((node.map(|node| node.for_field(field)), truncated))
    }

    fn type_node(&self, ty: &FieldType, stack: &mut Vec<String>) -> Result<(Option<Node>, bool), SchemaError> {
        match ty {
            FieldType::Leaf => Ok((None, false)),
            FieldType::Class(name) => {
                let built = self.build_class(name, stack)?;
                let node = (!built.nodes.is_empty())
                    .then(|| Node::synthetic(NodeKind::Document, built.nodes));
                Ok((node, built.truncated))
            }
            FieldType::List(element) => {
                let (child, truncated) = self.type_node(element, stack)?;
                Ok((child.map(|c| Node::synthetic(NodeKind::List, vec![c])), truncated))
            }
            FieldType::Map(value) => {
                let (child, truncated) = self.type_node(value, stack)?;
                Ok((child.map(|c| Node::synthetic(NodeKind::Map, vec![c])), truncated))
            }
        }
    }
}

fn cached<T: Clone>(cache: &Cache<T>, class: &str) -> Option<T> {
    cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(class)
        .cloned()
}

/// Insert unless another thread got there first; return the published value.
fn publish<T: Clone>(cache: &Cache<T>, class: &str, value: T) -> T {
    let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
    guard.entry(class.to_string()).or_insert(value).clone()
}
