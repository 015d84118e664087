//! Checksum utilities for matrix artifacts

use crate::error::{GenobankError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the hex-encoded SHA-256 digest of a file
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    sha256_reader(&mut file)
}

/// Compute the hex-encoded SHA-256 digest of any readable source
pub fn sha256_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify that a file hashes to the expected digest
pub fn verify_sha256(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(GenobankError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sha256_of_known_input() {
        let mut cursor = std::io::Cursor::new(b"abc".to_vec());
        assert_eq!(
            sha256_reader(&mut cursor).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"AA\tAT\n").unwrap();

        let digest = sha256_file(file.path()).unwrap();
        assert!(verify_sha256(file.path(), &digest).is_ok());
        assert!(verify_sha256(file.path(), &digest.to_uppercase()).is_ok());

        let err = verify_sha256(file.path(), "deadbeef").unwrap_err();
        assert!(matches!(err, GenobankError::ChecksumMismatch { .. }));
    }
}
