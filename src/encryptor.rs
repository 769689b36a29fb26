//! The entry point for the host's persistence hooks.
//!
//! The host calls [`DocumentEncryptor::before_save`] on every document it is
//! about to write and [`DocumentEncryptor::after_load`] on every document it
//! has just read. Both transform the document in place and report failures
//! as a [`DocumentCryptError`] naming the collection and `_id`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::document::document_id;
use crate::error::{DocumentCryptError, FieldCryptError};
use crate::index::SchemaIndex;
use crate::leaf::{LeafDecoder, LeafEncoder, LeafTransform};
use crate::resolver::DynamicTypeResolver;
use crate::vault::CryptVault;

/// How documents are matched against their schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkMode {
    /// Precomputed, cached trees. Declared types only.
    #[default]
    Cached,
    /// Per-value resolution through the discriminator key. Supports
    /// polymorphic fields and collections.
    Reflection,
}

#[derive(Debug)]
pub struct DocumentEncryptor {
    vault: Arc<CryptVault>,
    index: Arc<SchemaIndex>,
    resolver: DynamicTypeResolver,
    mode: WalkMode,
    silent: AtomicBool,
}

impl DocumentEncryptor {
    pub fn new(vault: Arc<CryptVault>, index: Arc<SchemaIndex>) -> Self {
        let resolver = DynamicTypeResolver::new(Arc::clone(&index));
        Self {
            vault,
            index,
            resolver,
            mode: WalkMode::default(),
            silent: AtomicBool::new(false),
        }
    }

    pub fn with_mode(mut self, mode: WalkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the resolver used in [`WalkMode::Reflection`].
    pub fn with_resolver(mut self, resolver: DynamicTypeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_silent_decryption_failure(self, silent: bool) -> Self {
        self.set_silent_decryption_failure(silent);
        self
    }

    /// Toggle silent decryption failures at runtime.
    pub fn set_silent_decryption_failure(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    pub fn silent_decryption_failure(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    pub fn mode(&self) -> WalkMode {
        self.mode
    }

    pub fn vault(&self) -> &Arc<CryptVault> {
        &self.vault
    }

    pub fn index(&self) -> &Arc<SchemaIndex> {
        &self.index
    }

    /// Encrypt the sensitive fields of `doc`, a document of class `class`.
    pub fn before_save(&self, collection: &str, class: &str, doc: &mut Value) -> Result<(), DocumentCryptError> {
        let encoder = LeafEncoder::new(&self.vault);
        self.crypt(class, doc, &encoder)
            .map_err(|err| self.document_error(collection, doc, err))
    }

    /// Decrypt the sensitive fields of `doc`, a document of class `class`.
    pub fn after_load(&self, collection: &str, class: &str, doc: &mut Value) -> Result<(), DocumentCryptError> {
        let decoder = LeafDecoder::new(&self.vault).silent(self.silent_decryption_failure());
        self.crypt(class, doc, &decoder)
            .map_err(|err| self.document_error(collection, doc, err))
    }

    fn crypt(&self, class: &str, doc: &mut Value, leaf: &dyn LeafTransform) -> Result<(), FieldCryptError> {
        match self.mode {
            WalkMode::Cached => {
                let nodes = self
                    .index
                    .schema_for(class)
                    .map_err(FieldCryptError::at_root)?;
                if nodes.is_empty() {
                    return Ok(());
                }
                codec::transform_document(doc, &nodes, leaf)
            }
            WalkMode::Reflection => codec::transform_dynamic(doc, class, &self.resolver, leaf),
        }
    }

    fn document_error(&self, collection: &str, doc: &Value, err: FieldCryptError) -> DocumentCryptError {
        let err = DocumentCryptError::new(collection, document_id(doc), err);
        tracing::debug!(error = %err, path = %err.field_error(), "document crypt failed");
        err
    }
}
