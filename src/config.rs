//! Startup configuration.
//!
//! ```json
//! {
//!   "keys": [
//!     {"version": 1, "key": "hqHKBLV83LpCqzKpf8OvutbCs+O5wX5BPu3btWpEvXA="},
//!     {"version": 2, "key": "aic7QGYCCSHyy7gYRCyNTpPThbomw1/dtWl4bocyTnU=", "cipher": "CHACHA20-POLY1305"}
//!   ],
//!   "defaultVersion": 1,
//!   "mode": "reflection",
//!   "silentDecryptionFailures": false
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::CipherProfile;
use crate::encryptor::{DocumentEncryptor, WalkMode};
use crate::error::ConfigError;
use crate::index::SchemaIndex;
use crate::keys::{CryptVersion, KeyMaterial};
use crate::resolver::DynamicTypeResolver;
use crate::schema::{EncryptedPredicate, TypeRegistry, DISCRIMINATOR_KEY};
use crate::vault::CryptVault;

/// One configured key version.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Version index. Checked against `0..=255` when the vault is built.
    pub version: i64,
    /// Standard base64 key material.
    pub key: String,
    /// Defaults to AES-256-CBC.
    #[serde(default)]
    pub cipher: CipherProfile,
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("version", &self.version)
            .field("key", &"<redacted>")
            .field("cipher", &self.cipher)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptConfig {
    pub keys: Vec<KeyConfig>,
    /// Defaults to the highest configured version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<i64>,
    #[serde(default)]
    pub mode: WalkMode,
    #[serde(default)]
    pub silent_decryption_failures: bool,
    #[serde(default = "default_discriminator_key")]
    pub discriminator_key: String,
    /// `Class.field` names treated as sensitive instead of the
    /// `encrypted` marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_fields: Option<Vec<String>>,
}

fn default_discriminator_key() -> String {
    DISCRIMINATOR_KEY.to_string()
}

fn version_byte(version: i64) -> Result<u8, ConfigError> {
    u8::try_from(version).map_err(|_| ConfigError::VersionOutOfRange(version))
}

impl EncryptConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build the vault, validating every key before registering any.
    pub fn build_vault(&self) -> Result<CryptVault, ConfigError> {
        let mut versions = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let version = version_byte(key.version)?;
            let material = KeyMaterial::from_base64(&key.key).map_err(|source| ConfigError::Base64 {
                version: key.version,
                source,
            })?;
            let crypt_version = CryptVersion::new(key.cipher.nonce_len(), key.cipher, material)?;
            versions.push((version, crypt_version));
        }

        let vault = CryptVault::new();
        for (version, crypt_version) in versions {
            vault.register_key(version, crypt_version)?;
        }
        if let Some(default_version) = self.default_version {
            vault.set_default_version(version_byte(default_version)?)?;
        }
        if !vault.has_keys() {
            tracing::warn!("no encryption keys configured, every crypt operation will fail");
        }
        Ok(vault)
    }

    pub fn predicate(&self) -> EncryptedPredicate {
        match &self.encrypted_fields {
            Some(names) => EncryptedPredicate::qualified_names(names.iter().cloned()),
            None => EncryptedPredicate::marked(),
        }
    }

    /// Wire the vault, schema index and resolver for `registry`.
    pub fn build_encryptor(&self, registry: TypeRegistry) -> Result<DocumentEncryptor, ConfigError> {
        let vault = Arc::new(self.build_vault()?);
        let index = Arc::new(SchemaIndex::with_predicate(Arc::new(registry), self.predicate()));
        let resolver =
            DynamicTypeResolver::new(Arc::clone(&index)).with_discriminator_key(&self.discriminator_key);

        tracing::info!(
            versions = ?vault.registered_versions(),
            default_version = ?vault.default_version(),
            mode = ?self.mode,
            "document encryption configured"
        );
        Ok(DocumentEncryptor::new(vault, index)
            .with_mode(self.mode)
            .with_resolver(resolver)
            .with_silent_decryption_failure(self.silent_decryption_failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "hqHKBLV83LpCqzKpf8OvutbCs+O5wX5BPu3btWpEvXA=";

    #[test]
    fn test_defaults() {
        let config = EncryptConfig::from_json(&format!(r#"{{"keys": [{{"version": 0, "key": "{KEY}"}}]}}"#)).unwrap();

        assert_eq!(config.mode, WalkMode::Cached);
        assert!(!config.silent_decryption_failures);
        assert_eq!(config.discriminator_key, "_class");
        assert_eq!(config.keys[0].cipher, CipherProfile::Aes256Cbc);
        let vault = config.build_vault().unwrap();
        assert_eq!(vault.default_version(), Some(0));
        assert_eq!(vault.expected_ciphertext_length(8).unwrap(), 1 + 16 + 16);
    }

    #[test]
    fn test_named_cipher_sets_salt_length() {
        let config = EncryptConfig::from_json(&format!(
            r#"{{"keys": [{{"version": 0, "key": "{KEY}", "cipher": "AES-256-GCM"}}]}}"#
        ))
        .unwrap();

        let vault = config.build_vault().unwrap();
        assert_eq!(vault.expected_ciphertext_length(8).unwrap(), 1 + 12 + 8 + 16);
    }

    #[test]
    fn test_version_out_of_range() {
        let config = EncryptConfig::from_json(&format!(r#"{{"keys": [{{"version": 256, "key": "{KEY}"}}]}}"#)).unwrap();
        assert!(matches!(config.build_vault(), Err(ConfigError::VersionOutOfRange(256))));
    }

    #[test]
    fn test_bad_base64_names_version() {
        let config = EncryptConfig::from_json(r#"{"keys": [{"version": 3, "key": "not base64!"}]}"#).unwrap();
        assert!(matches!(config.build_vault(), Err(ConfigError::Base64 { version: 3, .. })));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = EncryptConfig::from_json(&format!(r#"{{"keys": [{{"version": 0, "key": "{KEY}"}}]}}"#)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(KEY));
        assert!(rendered.contains("<redacted>"));
    }
}
