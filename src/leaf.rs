//! Encrypt and decrypt transforms applied at `Direct` leaves.
//!
//! A leaf value of any shape is wrapped as `{"": value}`, encoded as CBOR and
//! sealed by the vault. The stored form is a `Value::Bytes` envelope.

use ciborium::Value;

use crate::document::value_kind;
use crate::error::CryptError;
use crate::vault::CryptVault;

/// A function from a stored leaf to its replacement.
pub trait LeafTransform {
    fn apply(&self, value: &Value) -> Result<Value, CryptError>;
}

impl<F> LeafTransform for F
where
    F: Fn(&Value) -> Result<Value, CryptError>,
{
    fn apply(&self, value: &Value) -> Result<Value, CryptError> {
        self(value)
    }
}

/// Canonical bytes of a leaf value, inside its one-entry wrapper.
pub fn serialize_leaf(value: &Value) -> Result<Vec<u8>, CryptError> {
    let wrapped = Value::Map(vec![(Value::Text(String::new()), value.clone())]);
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&wrapped, &mut bytes)
        .map_err(|err| CryptError::Serialization(err.to_string()))?;
    Ok(bytes)
}

/// Inverse of [`serialize_leaf`]. Anything but the one-entry wrapper fails.
pub fn deserialize_leaf(bytes: &[u8]) -> Result<Value, CryptError> {
    let decoded: Value = ciborium::de::from_reader(bytes)
        .map_err(|err| CryptError::Deserialization(err.to_string()))?;
    match decoded {
        Value::Map(mut entries) if entries.len() == 1 => {
            let (key, value) = entries.remove(0);
            match key {
                Value::Text(text) if text.is_empty() => Ok(value),
                _ => Err(CryptError::MissingWrapper),
            }
        }
        _ => Err(CryptError::MissingWrapper),
    }
}

/// Serializes and seals leaves.
#[derive(Debug, Clone, Copy)]
pub struct LeafEncoder<'a> {
    vault: &'a CryptVault,
}

impl<'a> LeafEncoder<'a> {
    pub fn new(vault: &'a CryptVault) -> Self {
        Self { vault }
    }
}

impl LeafTransform for LeafEncoder<'_> {
    fn apply(&self, value: &Value) -> Result<Value, CryptError> {
        let plaintext = serialize_leaf(value)?;
        Ok(Value::Bytes(self.vault.encrypt(&plaintext)?))
    }
}

/// Opens and deserializes leaves.
///
/// In silent mode a leaf that is not binary is returned as stored, which
/// lets unencrypted legacy data pass through, and a leaf the vault cannot
/// open becomes `Null`.
#[derive(Debug, Clone, Copy)]
pub struct LeafDecoder<'a> {
    vault: &'a CryptVault,
    silent: bool,
}

impl<'a> LeafDecoder<'a> {
    pub fn new(vault: &'a CryptVault) -> Self {
        Self {
            vault,
            silent: false,
        }
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

impl LeafTransform for LeafDecoder<'_> {
    fn apply(&self, value: &Value) -> Result<Value, CryptError> {
        let Value::Bytes(envelope) = value else {
            if self.silent {
                return Ok(value.clone());
            }
            return Err(CryptError::NotBinary(value_kind(value)));
        };

        match self.vault.decrypt(envelope) {
            Ok(plaintext) => deserialize_leaf(&plaintext),
            Err(err) if self.silent => {
                tracing::warn!(error = %err, "leaf decryption failed, value dropped");
                Ok(Value::Null)
            }
            Err(err) => Err(err.into()),
        }
    }
}
