//! Artifact content hashes.

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("Unknown hash algorithm \"{0}\"")]
    UnknownAlgorithm(String),
    #[error("Invalid {algorithm} digest \"{digest}\"")]
    InvalidDigest { algorithm: String, digest: String },
    #[error("Expected \"algorithm:digest\", got \"{0}\"")]
    Malformed(String),
}

/// Supported digest algorithms, ordered by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn all() -> &'static [HashAlgorithm] {
        &[
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of a hex encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Lowercase hex digest of `bytes`
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
            HashAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(bytes)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashAlgorithm::all()
            .iter()
            .find(|algorithm| algorithm.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| HashError::UnknownAlgorithm(s.to_string()))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest tagged with its algorithm, written `algorithm:hexdigest`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactHash {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

impl ArtifactHash {
    /// Build a hash from a known digest, validating its encoding
    pub fn new(algorithm: HashAlgorithm, digest: &str) -> Result<Self, HashError> {
        let hash = Self {
            algorithm,
            digest: digest.trim().to_ascii_lowercase(),
        };
        hash.validate()?;
        Ok(hash)
    }

    /// Parse `algorithm:digest`
    pub fn parse(input: &str) -> Result<Self, HashError> {
        let (algorithm, digest) = input
            .split_once(':')
            .ok_or_else(|| HashError::Malformed(input.to_string()))?;
        Self::new(algorithm.parse()?, digest)
    }

    /// Hash `bytes` with `algorithm`
    pub fn compute(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(bytes),
        }
    }

    /// Check the digest is lowercase hex of the algorithm's length
    pub fn validate(&self) -> Result<(), HashError> {
        let well_formed = self.digest.len() == self.algorithm.hex_len()
            && self.digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if well_formed {
            Ok(())
        } else {
            Err(HashError::InvalidDigest {
                algorithm: self.algorithm.to_string(),
                digest: self.digest.clone(),
            })
        }
    }
}

impl FromStr for ArtifactHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactHash::parse(s)
    }
}

impl fmt::Display for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(HashAlgorithm::Md5.digest(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            HashAlgorithm::Sha1.digest(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            HashAlgorithm::Sha256.digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_lengths() {
        for algorithm in HashAlgorithm::all() {
            let hash = ArtifactHash::compute(*algorithm, b"payload");
            assert_eq!(hash.digest.len(), algorithm.hex_len());
            assert!(hash.validate().is_ok());
        }
    }

    #[test]
    fn test_parse() {
        let digest = HashAlgorithm::Sha256.digest(b"x");
        let hash = ArtifactHash::parse(&format!("SHA256:{}", digest.to_uppercase())).unwrap();
        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(hash.digest, digest);
        assert_eq!(hash.to_string(), format!("sha256:{}", digest));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(ArtifactHash::parse("sha256"), Err(HashError::Malformed(_))));
        assert!(matches!(
            ArtifactHash::parse("crc32:abcd"),
            Err(HashError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            ArtifactHash::parse("sha256:abcd"),
            Err(HashError::InvalidDigest { .. })
        ));
        assert!(matches!(ArtifactHash::parse("md5:"), Err(HashError::InvalidDigest { .. })));
    }

    #[test]
    fn test_algorithms_sort_by_name() {
        let mut algorithms = vec![HashAlgorithm::Sha512, HashAlgorithm::Md5, HashAlgorithm::Sha256, HashAlgorithm::Sha1];
        algorithms.sort();
        let names: Vec<&str> = algorithms.iter().map(|a| a.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let hash = ArtifactHash::compute(HashAlgorithm::Sha384, b"abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert!(json.contains("\"algorithm\":\"sha384\""));
        assert!(serde_json::from_str::<ArtifactHash>(r#"{"algorithm":"crc32","digest":"00"}"#).is_err());
    }
}
