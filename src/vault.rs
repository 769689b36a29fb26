//! Versioned symmetric-cipher vault.
//!
//! The vault owns up to 256 key versions and produces a self-describing
//! envelope:
//!
//! ```text
//! [ version (1 byte) ][ salt (salt_length bytes) ][ ciphertext ]
//! ```
//!
//! The version byte is the 0-255 index mapped through a signed-byte bias:
//! version 0 is stored as `i8::MIN` (0x80), version 255 as `i8::MAX` (0x7f).
//! Decryption reads the version from the envelope, so ciphertext survives
//! restarts and changes in registration order.
//!
//! ## Concurrency
//!
//! The key table is an immutable [`KeyRing`] published behind
//! `RwLock<Arc<KeyRing>>`. Readers clone the `Arc` and release the lock
//! before doing any cryptography; writers build a new ring and store it in
//! one assignment. In-flight operations therefore see either the old or the
//! new table in full.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, CryptOperationError};
use crate::keys::CryptVersion;
use crate::random::SaltSource;

/// Number of addressable key versions.
pub const VERSION_SLOTS: usize = 256;

/// Map a version index to its stored signed byte.
pub fn to_signed_byte(version: u8) -> i8 {
    (i16::from(version) + i16::from(i8::MIN)) as i8
}

/// Recover a version index from its stored signed byte.
pub fn from_signed_byte(byte: i8) -> u8 {
    (i16::from(byte) - i16::from(i8::MIN)) as u8
}

/// The version index an envelope was sealed with, if it has a version byte.
pub fn envelope_version(envelope: &[u8]) -> Option<u8> {
    envelope
        .first()
        .map(|&byte| from_signed_byte(byte as i8))
}

/// An immutable table of key versions plus the default version.
#[derive(Debug, Clone)]
pub struct KeyRing {
    versions: Vec<Option<Arc<CryptVersion>>>,
    default_version: Option<u8>,
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRing {
    /// An empty ring. Encryption fails until a key is registered.
    pub fn new() -> Self {
        Self {
            versions: vec![None; VERSION_SLOTS],
            default_version: None,
        }
    }

    /// Add a key version. The highest registered version becomes the default.
    pub fn with_key(mut self, version: u8, crypt_version: CryptVersion) -> Result<Self, ConfigError> {
        self.insert(version, crypt_version)?;
        Ok(self)
    }

    /// Choose the version used for new encryptions.
    pub fn with_default_version(mut self, version: u8) -> Result<Self, ConfigError> {
        self.set_default(version)?;
        Ok(self)
    }

    fn insert(&mut self, version: u8, crypt_version: CryptVersion) -> Result<(), ConfigError> {
        let slot = &mut self.versions[usize::from(version)];
        if slot.is_some() {
            return Err(ConfigError::DuplicateVersion(version));
        }
        *slot = Some(Arc::new(crypt_version));
        if self.default_version.map_or(true, |current| version > current) {
            self.default_version = Some(version);
        }
        Ok(())
    }

    fn set_default(&mut self, version: u8) -> Result<(), ConfigError> {
        if self.versions[usize::from(version)].is_none() {
            return Err(ConfigError::UndefinedVersion(version));
        }
        self.default_version = Some(version);
        Ok(())
    }

    pub fn default_version(&self) -> Option<u8> {
        self.default_version
    }

    pub fn get(&self, version: u8) -> Option<&Arc<CryptVersion>> {
        self.versions[usize::from(version)].as_ref()
    }

    /// Registered version indices in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = u8> + '_ {
        self.versions
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .filter_map(|(index, _)| u8::try_from(index).ok())
    }

    fn lookup(&self, version: u8) -> Result<&Arc<CryptVersion>, CryptOperationError> {
        if self.default_version.is_none() {
            return Err(CryptOperationError::VaultUninitialized);
        }
        self.get(version)
            .ok_or(CryptOperationError::UnknownVersion(version))
    }
}

/// Thread-safe versioned encryption of opaque byte payloads.
#[derive(Debug, Default)]
pub struct CryptVault {
    ring: RwLock<Arc<KeyRing>>,
    salts: SaltSource,
}

impl CryptVault {
    /// A vault with no keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// A vault serving an already-built ring.
    pub fn from_ring(ring: KeyRing) -> Self {
        Self {
            ring: RwLock::new(Arc::new(ring)),
            salts: SaltSource::new(),
        }
    }

    /// The current key table.
    pub fn key_ring(&self) -> Arc<KeyRing> {
        Arc::clone(&self.ring.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn update(
        &self,
        change: impl FnOnce(&mut KeyRing) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let mut guard = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = KeyRing::clone(&guard);
        change(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Register a key version. Fails if the slot is taken.
    ///
    /// The default version moves to `version` if it is higher than the
    /// current default.
    pub fn register_key(&self, version: u8, crypt_version: CryptVersion) -> Result<(), ConfigError> {
        let cipher = crypt_version.cipher_id();
        self.update(|ring| ring.insert(version, crypt_version))?;
        tracing::debug!(version, cipher, "key version registered");
        Ok(())
    }

    /// Register an AES-256-CBC/PKCS#7 key with a 128-bit salt, the standard
    /// profile.
    pub fn with_aes256_cbc_key(self, version: u8, secret: &[u8]) -> Result<Self, ConfigError> {
        self.register_key(version, CryptVersion::aes256_cbc(secret)?)?;
        Ok(self)
    }

    /// Register an AES-256-GCM key with a 96-bit salt.
    pub fn with_aes256_gcm_key(self, version: u8, secret: &[u8]) -> Result<Self, ConfigError> {
        self.register_key(version, CryptVersion::aes256_gcm(secret)?)?;
        Ok(self)
    }

    /// Register a key version, builder style.
    pub fn with_key(self, version: u8, crypt_version: CryptVersion) -> Result<Self, ConfigError> {
        self.register_key(version, crypt_version)?;
        Ok(self)
    }

    /// Choose the version used for new encryptions.
    pub fn set_default_version(&self, version: u8) -> Result<(), ConfigError> {
        self.update(|ring| ring.set_default(version))?;
        tracing::info!(version, "default key version changed");
        Ok(())
    }

    /// Builder-style [`CryptVault::set_default_version`].
    pub fn with_default_version(self, version: u8) -> Result<Self, ConfigError> {
        self.set_default_version(version)?;
        Ok(self)
    }

    /// Swap the whole key table atomically.
    pub fn replace_key_ring(&self, ring: KeyRing) {
        let default_version = ring.default_version();
        *self.ring.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(ring);
        tracing::info!(?default_version, "key ring replaced");
    }

    pub fn default_version(&self) -> Option<u8> {
        self.key_ring().default_version()
    }

    pub fn has_keys(&self) -> bool {
        self.default_version().is_some()
    }

    /// Registered version indices in ascending order.
    pub fn registered_versions(&self) -> Vec<u8> {
        self.key_ring().versions().collect()
    }

    /// Encrypt under the default version.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
        let ring = self.key_ring();
        let version = ring
            .default_version()
            .ok_or(CryptOperationError::VaultUninitialized)?;
        Self::encrypt_with(&ring, &self.salts, version, data)
    }

    /// Encrypt under an explicit version.
    pub fn encrypt_version(&self, version: u8, data: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
        let ring = self.key_ring();
        Self::encrypt_with(&ring, &self.salts, version, data)
    }

    fn encrypt_with(
        ring: &KeyRing,
        salts: &SaltSource,
        version: u8,
        data: &[u8],
    ) -> Result<Vec<u8>, CryptOperationError> {
        let crypt_version = ring.lookup(version)?;
        let salt = salts.bytes(crypt_version.salt_length())?;
        let sealed = crypt_version.seal(&salt, data)?;

        let mut envelope = Vec::with_capacity(1 + salt.len() + sealed.len());
        envelope.push(to_signed_byte(version) as u8);
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&sealed);
        Ok(envelope)
    }

    /// Decrypt an envelope, using the version it names.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
        let ring = self.key_ring();
        let version = envelope_version(data).ok_or(CryptOperationError::PayloadTooShort {
            actual: 0,
            minimum: 1,
        })?;
        let crypt_version = ring.lookup(version)?;

        let salt_end = 1 + crypt_version.salt_length();
        let minimum = crypt_version.encrypted_length(0) + salt_end;
        if data.len() < minimum {
            return Err(CryptOperationError::PayloadTooShort {
                actual: data.len(),
                minimum,
            });
        }

        crypt_version.open(&data[1..salt_end], &data[salt_end..])
    }

    /// Envelope length for a plaintext under the default version.
    pub fn expected_ciphertext_length(&self, plaintext_len: usize) -> Result<usize, CryptOperationError> {
        let ring = self.key_ring();
        let version = ring
            .default_version()
            .ok_or(CryptOperationError::VaultUninitialized)?;
        Self::expected_length_with(&ring, version, plaintext_len)
    }

    /// Envelope length for a plaintext under an explicit version.
    pub fn expected_ciphertext_length_version(
        &self,
        version: u8,
        plaintext_len: usize,
    ) -> Result<usize, CryptOperationError> {
        Self::expected_length_with(&self.key_ring(), version, plaintext_len)
    }

    fn expected_length_with(
        ring: &KeyRing,
        version: u8,
        plaintext_len: usize,
    ) -> Result<usize, CryptOperationError> {
        let crypt_version = ring.lookup(version)?;
        Ok(1 + crypt_version.salt_length() + crypt_version.encrypted_length(plaintext_len))
    }

    /// Replace the salt generator. Meant for the host's hourly scheduler.
    pub fn refresh_random(&self) {
        self.salts.refresh();
    }

    /// Whether the salt generator is due for a refresh at `now`.
    pub fn random_refresh_due(&self, now: DateTime<Utc>) -> bool {
        self.salts.refresh_due(now)
    }
}
