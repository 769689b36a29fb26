//! # fieldcrypt
//!
//! Transparent field-level encryption for schema-described documents.
//!
//! Sensitive fields of a document are serialized, sealed by a versioned key
//! vault and stored as opaque binary envelopes. Everything else is left as
//! plaintext. On load the same fields are opened again, so callers only ever
//! see plaintext values.
//!
//! ## Public API
//!
//! - [`CryptVault`]: up to 256 key versions, one default, self-describing
//!   `version || salt || ciphertext` envelopes.
//! - [`TypeRegistry`] and [`SchemaIndex`]: static class descriptions and the
//!   cached trees of sensitive-reachable fields built from them.
//! - [`DynamicTypeResolver`]: per-value class resolution through a
//!   discriminator key, for polymorphic data.
//! - [`codec`]: the document walk itself.
//! - [`DocumentEncryptor`]: the object the host's before-save and after-load
//!   hooks call.
//! - [`EncryptConfig`]: JSON startup configuration wiring all of the above.

pub mod codec;
pub mod config;
pub(crate) mod crypto;
pub mod document;
pub mod encryptor;
pub mod error;
pub mod index;
pub mod keys;
pub mod leaf;
pub(crate) mod random;
pub mod resolver;
pub mod schema;
pub mod vault;

pub use config::{EncryptConfig, KeyConfig};
pub use crypto::CipherProfile;
pub use encryptor::{DocumentEncryptor, WalkMode};
pub use error::{
    ConfigError, CryptError, CryptOperationError, DocumentCryptError, FieldCryptError, SchemaError,
};
pub use index::SchemaIndex;
pub use keys::{CryptVersion, KeyMaterial};
pub use leaf::{deserialize_leaf, serialize_leaf, LeafDecoder, LeafEncoder, LeafTransform};
pub use resolver::{DynamicTypeResolver, ResolveDepth};
pub use schema::{ClassDef, EncryptedPredicate, FieldDef, FieldType, Node, NodeKind, TypeRegistry};
pub use vault::{CryptVault, KeyRing};
