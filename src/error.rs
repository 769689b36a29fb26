//! Error types for fieldcrypt.
//!
//! The taxonomy follows the lifecycle of a document operation:
//!
//! - [`ConfigError`]: the vault or its configuration is wrong. Raised at
//!   startup, never retried.
//! - [`CryptOperationError`]: a single encrypt/decrypt primitive failed
//!   (unknown version byte, wrong key, truncated payload).
//! - [`SchemaError`]: a type description could not be resolved.
//! - [`CryptError`]: whatever went wrong at one leaf of a document.
//! - [`FieldCryptError`]: a [`CryptError`] plus the field path it happened at.
//! - [`DocumentCryptError`]: the externally visible failure for one document.
//!
//! Messages signal *what* failed and *where*. They never contain key material
//! or plaintext.

use std::fmt;

use ciborium::Value;

/// Vault or configuration misuse. These are programmer errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A key version outside `0..=255` was supplied.
    #[error("version must be a byte (0-255), got {0}")]
    VersionOutOfRange(i64),

    /// The version slot is already populated. Registration is additive only.
    #[error("version {0} is already defined")]
    DuplicateVersion(u8),

    /// The version slot is empty.
    #[error("version {0} is undefined")]
    UndefinedVersion(u8),

    /// Key material has the wrong size for the cipher profile.
    #[error("invalid key size for {cipher}: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        cipher: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The salt length does not match the nonce size of the cipher profile.
    #[error("invalid salt length for {cipher}: expected {expected} bytes, got {actual}")]
    InvalidSaltLength {
        cipher: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The cipher backend refused the key.
    #[error("cipher initialisation failed for {0}")]
    CipherInit(&'static str),

    /// A configured key could not be base64-decoded.
    #[error("key for version {version} is not valid base64: {source}")]
    Base64 {
        version: i64,
        #[source]
        source: base64::DecodeError,
    },

    /// The configuration document could not be parsed.
    #[error("configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a single encrypt or decrypt primitive.
///
/// Retrying cannot help: the ciphertext and key are what they are.
#[derive(Debug, thiserror::Error)]
pub enum CryptOperationError {
    /// No key was ever registered with the vault.
    #[error("encryption keys are not initialized")]
    VaultUninitialized,

    /// The envelope names a version with no registered key.
    #[error("version {0} undefined")]
    UnknownVersion(u8),

    /// The payload cannot hold a version byte, a salt and an auth tag.
    #[error("payload too short ({actual} bytes), expected at least {minimum}")]
    PayloadTooShort { actual: usize, minimum: usize },

    /// The system randomness source failed.
    #[error("randomness source failed")]
    Randomness,

    /// The cipher backend could not seal the payload.
    #[error("encryption failed")]
    Encryption,

    /// Authentication failed: wrong key, rotated key, or tampered ciphertext.
    #[error("decryption failed")]
    Decryption,
}

/// A type description could not be resolved into a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A class name is not in the registry.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A discriminator names a type outside the allow-list.
    #[error("unknown discriminator reference: {0}")]
    UnknownDiscriminator(String),

    /// The discriminator key holds something other than text.
    #[error("discriminator `{0}` must be a text value")]
    InvalidDiscriminator(String),

    /// A class inherits from itself, directly or transitively.
    #[error("inheritance cycle through {0}")]
    InheritanceCycle(String),

    /// A document value does not fit the declared type of its field.
    #[error("cannot resolve {declared} for a {actual} value")]
    Unresolvable {
        declared: String,
        actual: &'static str,
    },

    /// A schema description file could not be parsed.
    #[error("schema description is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure while describing one field, tagged with `Class.field`.
    #[error("{location}: {source}")]
    InField {
        location: String,
        #[source]
        source: Box<SchemaError>,
    },
}

/// The cause of a failure at one document leaf or node.
#[derive(Debug, thiserror::Error)]
pub enum CryptError {
    /// The vault refused the operation.
    #[error(transparent)]
    Operation(#[from] CryptOperationError),

    /// The schema could not be resolved for the value.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An encrypted field does not hold a binary blob.
    #[error("got {0}, expected binary")]
    NotBinary(&'static str),

    /// A node expected one value shape and found another.
    #[error("expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// The leaf value could not be encoded to canonical bytes.
    #[error("leaf serialization failed: {0}")]
    Serialization(String),

    /// The decrypted bytes are not a canonical encoding.
    #[error("leaf deserialization failed: {0}")]
    Deserialization(String),

    /// The decrypted value is not a single-entry wrapping container.
    #[error("decrypted value is not a wrapped leaf")]
    MissingWrapper,
}

/// A [`CryptError`] annotated with the path of the field it happened at.
///
/// Segments are field names, list indices and map keys. They are pushed
/// innermost-first while the error travels up the document, and rendered
/// outermost-first as a dotted path such as `nonSensitiveMap.one.secretString`.
#[derive(Debug)]
pub struct FieldCryptError {
    segments: Vec<String>,
    source: Box<CryptError>,
}

impl FieldCryptError {
    /// Start a path at `field`.
    pub fn new(field: impl Into<String>, source: impl Into<CryptError>) -> Self {
        Self::at_root(source).chain(field)
    }

    /// A failure with no path yet, e.g. while resolving the root type.
    pub fn at_root(source: impl Into<CryptError>) -> Self {
        Self {
            segments: Vec::new(),
            source: Box::new(source.into()),
        }
    }

    /// Add the next enclosing segment. Empty segments are ignored.
    pub fn chain(mut self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        if !segment.is_empty() {
            self.segments.push(segment);
        }
        self
    }

    /// The dotted field path, outermost segment first.
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        parts.reverse();
        parts.join(".")
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().rev().map(String::as_str)
    }

    /// The leaf failure.
    pub fn cause(&self) -> &CryptError {
        &self.source
    }
}

impl fmt::Display for FieldCryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "<document root>")
        } else {
            f.write_str(&self.path())
        }
    }
}

impl std::error::Error for FieldCryptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Failure to encrypt or decrypt one whole document.
#[derive(Debug, thiserror::Error)]
#[error("Collection: {collection}, id: {}", display_id(.id))]
pub struct DocumentCryptError {
    collection: String,
    id: Option<Value>,
    #[source]
    source: FieldCryptError,
}

impl DocumentCryptError {
    pub fn new(collection: impl Into<String>, id: Option<Value>, source: FieldCryptError) -> Self {
        Self {
            collection: collection.into(),
            id,
            source,
        }
    }

    /// The collection (table) the document belongs to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The document's `_id`, if it had one.
    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// The path-carrying failure.
    pub fn field_error(&self) -> &FieldCryptError {
        &self.source
    }
}

fn display_id(id: &Option<Value>) -> String {
    match id {
        Some(Value::Text(text)) => text.clone(),
        Some(Value::Integer(int)) => i128::from(*int).to_string(),
        Some(Value::Bytes(bytes)) => bytes.iter().map(|b| format!("{b:02x}")).collect(),
        Some(other) => format!("{other:?}"),
        None => "null".to_string(),
    }
}
