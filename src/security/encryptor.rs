use crate::error::SecurityError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

const HKDF_SALT: &[u8] = b"connector-host-encryptor-v1";
const ENCRYPTION_INFO: &[u8] = b"aes-256-gcm key";
const NONCE_INFO: &[u8] = b"synthetic nonce key";

/// Key material for the framework-wide default encryptor.
///
/// Values encrypted with it stay comparable across process restarts and
/// between a client and a server built from the same framework version.
const DEFAULT_KEY_MATERIAL: &[u8] = b"connector-host/default-encryptor/6f1c9a52d7e84b03";

/// Symmetric, deterministic encryption of small in-memory values.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError>;

    /// The returned buffer is wiped when dropped.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, SecurityError>;
}

pub trait EncryptorFactory: Send + Sync {
    /// Encryptor keyed with the fixed framework key.
    fn default_encryptor(&self) -> Arc<dyn Encryptor>;

    /// Encryptor with a fresh key that lives only as long as the returned value.
    fn new_random_encryptor(&self) -> Result<Arc<dyn Encryptor>, SecurityError>;
}

/// AES-256-GCM with a synthetic nonce.
///
/// The nonce is the truncated HMAC-SHA256 of the plaintext under a second
/// derived key, so equal plaintexts encrypt to equal ciphertexts under one key.
/// Output layout: `nonce (12) || ciphertext || tag (16)`.
pub struct AesGcmEncryptor {
    cipher: Aes256Gcm,
    nonce_key: Zeroizing<[u8; KEY_LENGTH]>,
}

impl AesGcmEncryptor {
    pub fn from_key_material(key_material: &[u8]) -> Result<Self, SecurityError> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), key_material);

        let mut encryption_key = Zeroizing::new([0u8; KEY_LENGTH]);
        hk.expand(ENCRYPTION_INFO, encryption_key.as_mut())
            .map_err(|e| SecurityError::Encryption(format!("key derivation failed: {e}")))?;

        let mut nonce_key = Zeroizing::new([0u8; KEY_LENGTH]);
        hk.expand(NONCE_INFO, nonce_key.as_mut())
            .map_err(|e| SecurityError::Encryption(format!("key derivation failed: {e}")))?;

        let cipher = <Aes256Gcm as KeyInit>::new_from_slice(encryption_key.as_ref())
            .map_err(|e| SecurityError::Encryption(format!("invalid key: {e}")))?;

        Ok(Self { cipher, nonce_key })
    }

    pub fn random() -> Result<Self, SecurityError> {
        let mut key_material = Zeroizing::new([0u8; KEY_LENGTH]);
        OsRng
            .try_fill_bytes(key_material.as_mut())
            .map_err(|e| SecurityError::Encryption(format!("random source failed: {e}")))?;
        Self::from_key_material(key_material.as_ref())
    }

    fn synthetic_nonce(&self, plaintext: &[u8]) -> Result<[u8; NONCE_LENGTH], SecurityError> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(self.nonce_key.as_ref())
            .map_err(|e| SecurityError::Encryption(format!("invalid nonce key: {e}")))?;
        mac.update(plaintext);
        let tag = mac.finalize().into_bytes();

        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&tag[..NONCE_LENGTH]);
        Ok(nonce)
    }
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let nonce = self.synthetic_nonce(plaintext)?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SecurityError::Encryption("AES-GCM encryption failed".to_string()))?;

        let mut output = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, SecurityError> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(SecurityError::Decryption(format!(
                "ciphertext too short: {} bytes",
                ciphertext.len()
            )));
        }

        let (nonce, sealed) = ciphertext.split_at(NONCE_LENGTH);
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| SecurityError::Decryption("authentication tag mismatch".to_string()))?,
        );

        // A nonce that does not match the plaintext means the blob was not produced by this key.
        let expected = self.synthetic_nonce(&plaintext)?;
        if !bool::from(expected[..].ct_eq(nonce)) {
            return Err(SecurityError::Decryption("synthetic nonce mismatch".to_string()));
        }

        Ok(plaintext)
    }
}

impl fmt::Debug for AesGcmEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmEncryptor")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Built-in factory registered as `aes-256-gcm`.
pub struct AesGcmEncryptorFactory {
    default: Arc<dyn Encryptor>,
}

impl AesGcmEncryptorFactory {
    pub fn new() -> Result<Self, SecurityError> {
        Ok(Self {
            default: Arc::new(AesGcmEncryptor::from_key_material(DEFAULT_KEY_MATERIAL)?),
        })
    }
}

impl EncryptorFactory for AesGcmEncryptorFactory {
    fn default_encryptor(&self) -> Arc<dyn Encryptor> {
        self.default.clone()
    }

    fn new_random_encryptor(&self) -> Result<Arc<dyn Encryptor>, SecurityError> {
        Ok(Arc::new(AesGcmEncryptor::random()?))
    }
}
