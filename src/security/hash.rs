use super::GuardedSecret;
use crate::error::SecurityError;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

const SALT_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha512 => 64,
        }
    }

    fn digest(&self, salt: &[u8], secret: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::new()
                .chain_update(salt)
                .chain_update(secret)
                .finalize()
                .to_vec(),
            HashAlgorithm::Sha512 => Sha512::new()
                .chain_update(salt)
                .chain_update(secret)
                .finalize()
                .to_vec(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            other => Err(SecurityError::InvalidHash(format!(
                "unsupported hash algorithm '{other}'"
            ))),
        }
    }
}

/// Salted one-way hash of a shared secret.
///
/// Text form: `{SHA256}<base64 salt>$<base64 digest>`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHash {
    algorithm: HashAlgorithm,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl SecretHash {
    pub fn generate(
        secret: &GuardedSecret,
        algorithm: HashAlgorithm,
    ) -> Result<Self, SecurityError> {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| SecurityError::Encryption(format!("random source failed: {e}")))?;
        let digest = secret.access(|plaintext| algorithm.digest(&salt, plaintext))?;
        Ok(Self {
            algorithm,
            salt,
            digest,
        })
    }

    pub fn verify(&self, secret: &GuardedSecret) -> Result<bool, SecurityError> {
        secret.access(|plaintext| {
            let candidate = self.algorithm.digest(&self.salt, plaintext);
            bool::from(candidate.as_slice().ct_eq(self.digest.as_slice()))
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl fmt::Display for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}{}${}",
            self.algorithm,
            STANDARD.encode(&self.salt),
            STANDARD.encode(&self.digest)
        )
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHash")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl FromStr for SecretHash {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| SecurityError::InvalidHash(reason.to_string());

        let rest = s
            .trim()
            .strip_prefix('{')
            .ok_or_else(|| invalid("missing '{ALGORITHM}' prefix"))?;
        let (algorithm, rest) = rest
            .split_once('}')
            .ok_or_else(|| invalid("unterminated algorithm prefix"))?;
        let algorithm: HashAlgorithm = algorithm.parse()?;

        let (salt, digest) = rest
            .split_once('$')
            .ok_or_else(|| invalid("expected '<salt>$<digest>'"))?;
        let salt = STANDARD
            .decode(salt)
            .map_err(|e| SecurityError::InvalidHash(format!("salt is not base64: {e}")))?;
        let digest = STANDARD
            .decode(digest)
            .map_err(|e| SecurityError::InvalidHash(format!("digest is not base64: {e}")))?;

        if salt.is_empty() {
            return Err(invalid("salt is empty"));
        }
        if digest.len() != algorithm.digest_len() {
            return Err(SecurityError::InvalidHash(format!(
                "{algorithm} digest must be {} bytes, got {}",
                algorithm.digest_len(),
                digest.len()
            )));
        }

        Ok(Self {
            algorithm,
            salt,
            digest,
        })
    }
}
