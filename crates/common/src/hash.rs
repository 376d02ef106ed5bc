//! Digest helpers for archive integrity.
//!
//! Every checksum carried in a manifest or upload is the standard-alphabet
//! base64 encoding of an MD5 digest.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use std::io::Read;

/// Compute the base64 MD5 digest of bytes.
pub fn md5_base64(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    STANDARD.encode(hasher.finalize())
}

/// Compute the base64 MD5 digest of a reader.
pub fn md5_base64_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(STANDARD.encode(hasher.finalize()))
}
