use std::fs::File;
use std::path::Path;

use base64::Engine;
use sha2::{Digest, Sha256};

use super::IngestError;

/// SHA-256 of the file content, standard base64. The file is streamed into
/// the hasher, so memory stays bounded regardless of document size.
pub fn compute_content_hash(path: &Path) -> Result<String, IngestError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(hasher.finalize()))
}

/// Same digest as [`compute_content_hash`], for content already in memory.
pub fn hash_bytes(content: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(content))
}
