//! Hash-based verification of recovered files
//!
//! Digests are taken from the reassembled contents while they are still in
//! memory and can be re-checked against the files written to disk.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    SHA256,
}

impl HashAlgorithm {
    /// Get all algorithms
    pub fn all() -> Vec<Self> {
        vec![Self::MD5, Self::SHA1, Self::SHA256]
    }

    /// Get algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            Self::MD5 => "MD5",
            Self::SHA1 => "SHA1",
            Self::SHA256 => "SHA256",
        }
    }
}

/// Digest of one recovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hexadecimal digest
    pub hash: String,
    pub file_size: u64,
}

/// Outcome of re-hashing a file on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashVerification {
    pub file_path: String,
    pub expected_hash: String,
    /// `None` when the file could not be read back
    pub actual_hash: Option<String>,
    pub algorithm: HashAlgorithm,
    pub status: VerificationStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Hash matches expected value
    Verified,
    /// Hash does not match
    Corrupted,
    /// File is gone or unreadable
    Missing,
}

enum Hasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::MD5 => Hasher::Md5(md5::Context::new()),
            HashAlgorithm::SHA1 => Hasher::Sha1(sha1::Sha1::new()),
            HashAlgorithm::SHA256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.consume(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Md5(h) => format!("{:x}", h.compute()),
            Hasher::Sha1(h) => format!("{:x}", h.finalize()),
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Calculate hash from byte slice
pub fn calculate_hash(data: &[u8], algorithm: HashAlgorithm) -> FileHash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    FileHash {
        algorithm,
        hash: hasher.finish(),
        file_size: data.len() as u64,
    }
}

/// Calculate hash for a file
pub fn calculate_file_hash(
    path: impl AsRef<Path>,
    algorithm: HashAlgorithm,
) -> io::Result<FileHash> {
    let mut file = File::open(path.as_ref())?;
    let file_size = file.metadata()?.len();

    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(FileHash {
        algorithm,
        hash: hasher.finish(),
        file_size,
    })
}

/// Re-hash `path` and compare against a recorded digest
pub fn verify_file_integrity(path: impl AsRef<Path>, expected: &FileHash) -> HashVerification {
    let path = path.as_ref();
    let (actual_hash, status) = match calculate_file_hash(path, expected.algorithm) {
        Ok(actual) if actual.hash.eq_ignore_ascii_case(&expected.hash) => {
            (Some(actual.hash), VerificationStatus::Verified)
        }
        Ok(actual) => (Some(actual.hash), VerificationStatus::Corrupted),
        Err(e) => {
            tracing::warn!("Cannot re-read {}: {}", path.display(), e);
            (None, VerificationStatus::Missing)
        }
    };

    HashVerification {
        file_path: path.display().to_string(),
        expected_hash: expected.hash.clone(),
        actual_hash,
        algorithm: expected.algorithm,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            calculate_hash(b"abc", HashAlgorithm::MD5).hash,
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            calculate_hash(b"abc", HashAlgorithm::SHA1).hash,
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            calculate_hash(b"abc", HashAlgorithm::SHA256).hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovered.bin");
        std::fs::write(&path, b"original").unwrap();

        let expected = calculate_hash(b"original", HashAlgorithm::SHA256);
        assert_eq!(
            verify_file_integrity(&path, &expected).status,
            VerificationStatus::Verified
        );

        std::fs::write(&path, b"modified").unwrap();
        assert_eq!(
            verify_file_integrity(&path, &expected).status,
            VerificationStatus::Corrupted
        );

        std::fs::remove_file(&path).unwrap();
        let missing = verify_file_integrity(&path, &expected);
        assert_eq!(missing.status, VerificationStatus::Missing);
        assert!(missing.actual_hash.is_none());
    }
}
