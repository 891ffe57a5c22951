//! Hashing utilities for package checksums.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha512};

/// Compute the SHA-512 hash of a byte slice, hex encoded.
pub fn sha512_bytes(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-512 hash of a file, hex encoded.
pub fn sha512_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha512::new();
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA512: &str = "9b71d224bd62f3785d96d46ad3ea3d73319bfbc2890caadae2dff72519673ca7\
        2323c3d99ba5c11d7c7acc6e14b8c5da0c4663475c2e5c3adef46f73bcdec043";

    #[test]
    fn test_sha512_bytes() {
        assert_eq!(sha512_bytes(b"hello"), HELLO_SHA512);
    }

    #[test]
    fn test_sha512_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("payload.tgz");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(sha512_file(&path).unwrap(), HELLO_SHA512);
    }
}
