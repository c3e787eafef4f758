//! Post-copy integrity checks
//!
//! Streams files through XXHash3-128, BLAKE3 or SHA-256 and compares
//! sources with their copies.

use crate::config::HashAlgorithm;
use crate::error::{CopyError, IoResultExt, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const HASH_BUFFER_SIZE: usize = 1024 * 1024;

/// Digest of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Algorithm used
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub hex: String,
    /// Bytes hashed
    pub size: u64,
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Incremental hasher over the supported algorithms
pub enum Hasher {
    /// XXHash3 128-bit
    XXHash3(Box<xxhash_rust::xxh3::Xxh3>),
    /// BLAKE3
    Blake3(Box<blake3::Hasher>),
    /// SHA-256
    Sha256(sha2::Sha256),
}

impl Hasher {
    /// Fresh hasher
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::XXHash3 => Self::XXHash3(Box::default()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::default()),
            HashAlgorithm::Sha256 => Self::Sha256(<sha2::Sha256 as sha2::Digest>::new()),
        }
    }

    /// Feed bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::XXHash3(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => sha2::Digest::update(h, data),
        }
    }

    /// Hex digest
    pub fn finalize(self) -> String {
        match self {
            Self::XXHash3(h) => format!("{:032x}", h.digest128()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
            Self::Sha256(h) => hex::encode(sha2::Digest::finalize(h)),
        }
    }
}

/// Hash a whole file
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<Digest> {
    let mut file = File::open(path).with_path(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buffer).with_path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }

    Ok(Digest {
        algorithm,
        hex: hasher.finalize(),
        size,
    })
}

/// Source and destination digests of one copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Source digest
    pub source_digest: Digest,
    /// Destination digest
    pub dest_digest: Digest,
}

impl Verification {
    /// Whether the copy is identical
    pub fn matches(&self) -> bool {
        self.source_digest == self.dest_digest
    }

    /// Turn a mismatch into an error
    pub fn into_result(self) -> Result<Self> {
        if self.matches() {
            Ok(self)
        } else {
            Err(CopyError::IntegrityMismatch {
                path: self.destination.clone(),
                expected: self.source_digest.hex.clone(),
                actual: self.dest_digest.hex.clone(),
            })
        }
    }
}

/// Hash `source` and `dest` and compare
pub fn verify_files_match(
    source: &Path,
    dest: &Path,
    algorithm: HashAlgorithm,
) -> Result<Verification> {
    Ok(Verification {
        source: source.to_path_buf(),
        destination: dest.to_path_buf(),
        source_digest: hash_file(source, algorithm)?,
        dest_digest: hash_file(dest, algorithm)?,
    })
}

/// Verify several copies on the rayon pool, preserving input order
pub fn verify_pairs(
    pairs: &[(PathBuf, PathBuf)],
    algorithm: HashAlgorithm,
) -> Vec<Result<Verification>> {
    pairs
        .par_iter()
        .map(|(src, dst)| verify_files_match(src, dst, algorithm))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ALGORITHMS: [HashAlgorithm; 3] = [
        HashAlgorithm::XXHash3,
        HashAlgorithm::Blake3,
        HashAlgorithm::Sha256,
    ];

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> Digest {
        let mut hasher = Hasher::new(algorithm);
        hasher.update(data);
        Digest {
            algorithm,
            hex: hasher.finalize(),
            size: data.len() as u64,
        }
    }

    #[test]
    fn test_digest_lengths() {
        for (algo, hex_len) in ALGORITHMS.into_iter().zip([32, 64, 64]) {
            let digest = hash_bytes(b"hello world", algo);
            assert_eq!(digest.hex.len(), hex_len);
            assert_eq!(digest.size, 11);
        }
    }

    #[test]
    fn test_known_sha256() {
        let digest = hash_bytes(b"abc", HashAlgorithm::Sha256);
        assert_eq!(
            digest.hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..3 * HASH_BUFFER_SIZE / 2).map(|i| (i % 13) as u8).collect();
        let path = create_test_file(dir.path(), "a.bin", &content);

        for algo in ALGORITHMS {
            assert_eq!(hash_file(&path, algo).unwrap(), hash_bytes(&content, algo));
        }
    }

    #[test]
    fn test_verify_files_match() {
        let dir = TempDir::new().unwrap();
        let a = create_test_file(dir.path(), "a", b"same content");
        let b = create_test_file(dir.path(), "b", b"same content");
        let c = create_test_file(dir.path(), "c", b"other content");

        assert!(verify_files_match(&a, &b, HashAlgorithm::Blake3).unwrap().matches());

        let mismatch = verify_files_match(&a, &c, HashAlgorithm::XXHash3).unwrap();
        assert!(!mismatch.matches());
        assert!(matches!(
            mismatch.into_result(),
            Err(CopyError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_pairs_keeps_order() {
        let dir = TempDir::new().unwrap();
        let a = create_test_file(dir.path(), "a", b"1");
        let b = create_test_file(dir.path(), "b", b"1");
        let missing = dir.path().join("missing");

        let results = verify_pairs(
            &[(a.clone(), b.clone()), (a.clone(), missing)],
            HashAlgorithm::Sha256,
        );
        assert!(results[0].as_ref().unwrap().matches());
        assert!(results[1].is_err());
    }
}
