use super::hash::SecretHash;
use super::{default_encryptor, new_random_encryptor, Encryptor};
use crate::error::SecurityError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Sensitive bytes kept encrypted in memory.
///
/// Each secret is sealed under its own random key. Plaintext only exists
/// inside [`GuardedSecret::access`] and is wiped before it returns. There is
/// intentionally no `PartialEq`; use [`GuardedSecret::secure_eq`].
#[derive(Clone)]
pub struct GuardedSecret {
    encryptor: Arc<dyn Encryptor>,
    sealed: Vec<u8>,
    disposed: bool,
}

impl GuardedSecret {
    /// Seals `raw` and overwrites it with zeros, whether or not sealing succeeds.
    pub fn from_bytes(raw: &mut [u8]) -> Result<Self, SecurityError> {
        let sealed = new_random_encryptor().and_then(|encryptor| {
            let sealed = encryptor.encrypt(raw)?;
            Ok((encryptor, sealed))
        });
        raw.zeroize();

        let (encryptor, sealed) = sealed?;
        Ok(Self {
            encryptor,
            sealed,
            disposed: false,
        })
    }

    pub fn from_string(value: String) -> Result<Self, SecurityError> {
        let mut bytes = value.into_bytes();
        let secret = Self::from_bytes(&mut bytes);
        bytes.zeroize();
        secret
    }

    /// Runs `f` over the decrypted bytes. The buffer is wiped on every exit
    /// path, including a panic inside `f`.
    pub fn access<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, SecurityError> {
        if self.disposed {
            return Err(SecurityError::Disposed);
        }
        let plaintext = self.encryptor.decrypt(&self.sealed)?;
        Ok(f(&plaintext))
    }

    pub fn access_str<R>(&self, f: impl FnOnce(&str) -> R) -> Result<R, SecurityError> {
        self.access(|bytes| std::str::from_utf8(bytes).map(f))?
            .map_err(|_| SecurityError::Encoding)
    }

    /// Constant-time comparison of the underlying values.
    pub fn secure_eq(&self, other: &GuardedSecret) -> Result<bool, SecurityError> {
        self.access(|mine| other.access(|theirs| bool::from(mine.ct_eq(theirs))))?
    }

    pub fn verify_hash(&self, hash: &SecretHash) -> Result<bool, SecurityError> {
        hash.verify(self)
    }

    /// Wipes the sealed value. Later access fails with [`SecurityError::Disposed`].
    pub fn dispose(&mut self) {
        self.sealed.zeroize();
        self.sealed.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Base64 blob sealed with the default encryptor, for crossing a process boundary.
    pub fn to_transport(&self) -> Result<String, SecurityError> {
        let encryptor = default_encryptor()?;
        let blob = self.access(|plaintext| encryptor.encrypt(plaintext))??;
        Ok(STANDARD.encode(blob))
    }

    pub fn from_transport(blob: &str) -> Result<Self, SecurityError> {
        let sealed = STANDARD
            .decode(blob)
            .map_err(|e| SecurityError::Decryption(format!("invalid secret blob: {e}")))?;
        let mut plaintext = default_encryptor()?.decrypt(&sealed)?;
        Self::from_bytes(plaintext.as_mut_slice())
    }
}

impl fmt::Debug for GuardedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GuardedSecret([REDACTED])")
    }
}

impl Drop for GuardedSecret {
    fn drop(&mut self) {
        self.sealed.zeroize();
    }
}

impl Serialize for GuardedSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let blob = self.to_transport().map_err(ser::Error::custom)?;
        serializer.serialize_str(&blob)
    }
}

impl<'de> Deserialize<'de> for GuardedSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let blob = String::deserialize(deserializer)?;
        GuardedSecret::from_transport(&blob).map_err(de::Error::custom)
    }
}
