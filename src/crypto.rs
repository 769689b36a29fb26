//! Low-level cryptographic operations.
//!
//! This module and `random` are the only places in the crate that import a
//! cipher backend directly. The vault encrypts and decrypts exclusively
//! through the functions exposed here.
//!
//! Primitive choices:
//! - **Standard cipher**: AES-256-CBC with PKCS#7 padding and a 128-bit IV
//!   (`aes` + `cbc`)
//! - **AEAD ciphers**: AES-256-GCM and ChaCha20-Poly1305 with a 96-bit nonce
//!   (`ring`)
//! - **Key size**: 256 bits (32 bytes) for every profile
//!
//! The IV or nonce is supplied by the caller as the envelope salt.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, CHACHA20_POLY1305};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{ConfigError, CryptOperationError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of an AEAD nonce in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Size of an AES block, and so of a CBC IV, in bytes.
pub const BLOCK_LEN: usize = 16;

/// Size of a key in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Size of the authentication tag appended to every AEAD ciphertext.
pub const TAG_LEN: usize = 16;

/// Algorithm, mode and padding identifier of a key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CipherProfile {
    /// AES in cipher-block-chaining mode with PKCS#7 padding and a 256-bit
    /// key. The standard profile.
    #[default]
    #[serde(rename = "AES-256-CBC", alias = "aes256cbc")]
    Aes256Cbc,
    /// AES in Galois/Counter mode with a 256-bit key.
    #[serde(rename = "AES-256-GCM", alias = "aes256gcm")]
    Aes256Gcm,
    /// ChaCha20 stream cipher with a Poly1305 authenticator.
    #[serde(rename = "CHACHA20-POLY1305", alias = "chacha20poly1305")]
    ChaCha20Poly1305,
}

impl CipherProfile {
    /// The textual cipher identifier.
    pub fn id(self) -> &'static str {
        match self {
            Self::Aes256Cbc => "AES-256-CBC",
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "CHACHA20-POLY1305",
        }
    }

    fn aead_algorithm(self) -> Option<&'static aead::Algorithm> {
        match self {
            Self::Aes256Cbc => None,
            Self::Aes256Gcm => Some(&AES_256_GCM),
            Self::ChaCha20Poly1305 => Some(&CHACHA20_POLY1305),
        }
    }

    /// IV or nonce size the profile expects as salt.
    pub fn nonce_len(self) -> usize {
        self.aead_algorithm()
            .map_or(BLOCK_LEN, |algorithm| algorithm.nonce_len())
    }

    /// Key size the profile expects.
    pub fn key_len(self) -> usize {
        self.aead_algorithm()
            .map_or(KEY_LEN, |algorithm| algorithm.key_len())
    }

    /// Ciphertext size for a plaintext of `plaintext_len` bytes.
    ///
    /// CBC pads up to the next whole block, adding a full block when the
    /// plaintext is already aligned. The AEAD profiles add one trailing tag.
    pub fn encrypted_length(self, plaintext_len: usize) -> usize {
        match self {
            Self::Aes256Cbc => (plaintext_len | (BLOCK_LEN - 1)) + 1,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => plaintext_len + TAG_LEN,
        }
    }

    /// Build a key for this profile, rejecting material the backend refuses.
    pub(crate) fn key(self, key_bytes: &[u8]) -> Result<CipherKey, ConfigError> {
        if key_bytes.len() != self.key_len() {
            return Err(ConfigError::InvalidKeyLength {
                cipher: self.id(),
                expected: self.key_len(),
                actual: key_bytes.len(),
            });
        }
        let Some(algorithm) = self.aead_algorithm() else {
            let mut key = Zeroizing::new([0u8; KEY_LEN]);
            key.copy_from_slice(key_bytes);
            return Ok(CipherKey::Cbc(key));
        };
        let unbound =
            UnboundKey::new(algorithm, key_bytes).map_err(|_| ConfigError::CipherInit(self.id()))?;
        Ok(CipherKey::Aead(LessSafeKey::new(unbound)))
    }
}

/// Key material bound to one backend.
pub(crate) enum CipherKey {
    /// Raw AES key; the CBC state is rebuilt per call because it carries the IV.
    Cbc(Zeroizing<[u8; KEY_LEN]>),
    Aead(LessSafeKey),
}

/// Encrypt `plaintext` under `key` with the given IV or nonce.
///
/// Returns the padded ciphertext (CBC) or ciphertext followed by the
/// authentication tag (AEAD). The salt is not included; the vault places it
/// in the envelope itself.
pub(crate) fn seal(key: &CipherKey, salt: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
    match key {
        CipherKey::Cbc(key) => {
            let cipher = Aes256CbcEnc::new_from_slices(key.as_slice(), salt)
                .map_err(|_| CryptOperationError::Encryption)?;
            Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
        }
        CipherKey::Aead(key) => seal_aead(key, salt, plaintext),
    }
}

/// Decrypt output produced by [`seal`].
///
/// A wrong key or tampered ciphertext fails the authentication check (AEAD)
/// or, in most cases, the padding check (CBC). The caller receives no
/// partial plaintext.
pub(crate) fn open(key: &CipherKey, salt: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
    match key {
        CipherKey::Cbc(key) => {
            let cipher = Aes256CbcDec::new_from_slices(key.as_slice(), salt)
                .map_err(|_| CryptOperationError::Decryption)?;
            cipher
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map_err(|_| CryptOperationError::Decryption)
        }
        CipherKey::Aead(key) => open_aead(key, salt, ciphertext),
    }
}

fn seal_aead(key: &LessSafeKey, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
    let nonce =
        Nonce::try_assume_unique_for_key(nonce).map_err(|_| CryptOperationError::Encryption)?;

    let mut output = Vec::with_capacity(plaintext.len() + key.algorithm().tag_len());
    output.extend_from_slice(plaintext);

    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut output)
        .map_err(|_| CryptOperationError::Encryption)?;

    Ok(output)
}

fn open_aead(key: &LessSafeKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptOperationError> {
    let nonce =
        Nonce::try_assume_unique_for_key(nonce).map_err(|_| CryptOperationError::Decryption)?;

    let mut payload = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut payload)
        .map_err(|_| CryptOperationError::Decryption)?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILES: [CipherProfile; 3] = [
        CipherProfile::Aes256Cbc,
        CipherProfile::Aes256Gcm,
        CipherProfile::ChaCha20Poly1305,
    ];

    #[test]
    fn test_seal_open_roundtrip() {
        for profile in PROFILES {
            let key = profile.key(&[7u8; KEY_LEN]).unwrap();
            let salt = vec![1u8; profile.nonce_len()];

            let sealed = seal(&key, &salt, b"hello").unwrap();
            assert_eq!(sealed.len(), profile.encrypted_length(5));
            assert_eq!(open(&key, &salt, &sealed).unwrap(), b"hello");
        }
    }

    #[test]
    fn test_open_fails_with_wrong_key() {
        let key = CipherProfile::Aes256Gcm.key(&[7u8; KEY_LEN]).unwrap();
        let other = CipherProfile::Aes256Gcm.key(&[8u8; KEY_LEN]).unwrap();
        let nonce = [0u8; NONCE_LEN];

        let sealed = seal(&key, &nonce, b"secret").unwrap();
        assert!(matches!(
            open(&other, &nonce, &sealed),
            Err(CryptOperationError::Decryption)
        ));
    }

    #[test]
    fn test_cbc_never_yields_plaintext_under_wrong_key() {
        let key = CipherProfile::Aes256Cbc.key(&[7u8; KEY_LEN]).unwrap();
        let other = CipherProfile::Aes256Cbc.key(&[8u8; KEY_LEN]).unwrap();
        let iv = [0u8; BLOCK_LEN];

        let sealed = seal(&key, &iv, b"secret").unwrap();
        assert_ne!(open(&other, &iv, &sealed).ok(), Some(b"secret".to_vec()));
    }

    #[test]
    fn test_cbc_rejects_partial_block() {
        let key = CipherProfile::Aes256Cbc.key(&[7u8; KEY_LEN]).unwrap();
        let iv = [0u8; BLOCK_LEN];

        let mut sealed = seal(&key, &iv, b"secret").unwrap();
        sealed.pop();
        assert!(matches!(
            open(&key, &iv, &sealed),
            Err(CryptOperationError::Decryption)
        ));
    }

    #[test]
    fn test_short_key_is_rejected() {
        for profile in PROFILES {
            assert!(matches!(
                profile.key(&[0u8; 16]),
                Err(ConfigError::InvalidKeyLength { expected: 32, actual: 16, .. })
            ));
        }
    }

    #[test]
    fn test_profile_sizes() {
        assert_eq!(CipherProfile::default(), CipherProfile::Aes256Cbc);
        assert_eq!(CipherProfile::Aes256Cbc.nonce_len(), BLOCK_LEN);
        assert_eq!(CipherProfile::Aes256Gcm.nonce_len(), NONCE_LEN);
        assert_eq!(CipherProfile::ChaCha20Poly1305.nonce_len(), NONCE_LEN);
        assert_eq!(CipherProfile::Aes256Gcm.encrypted_length(0), TAG_LEN);
    }

    #[test]
    fn test_cbc_length_pads_to_next_block() {
        let profile = CipherProfile::Aes256Cbc;
        assert_eq!(profile.encrypted_length(0), 16);
        assert_eq!(profile.encrypted_length(8), 16);
        assert_eq!(profile.encrypted_length(15), 16);
        assert_eq!(profile.encrypted_length(16), 32);
        assert_eq!(profile.encrypted_length(17), 32);
    }
}
