//! Engine persistence
//!
//! A built [`FuzzyDatabase`] round-trips through a versioned binary file:
//! a magic prefix, a little-endian format version, and the bincode-encoded
//! engine (backbone with pools, reference table, scoring profile). Every
//! container the engine serializes is ordered, so saving a loaded engine
//! reproduces the stream byte for byte. The stateless tokenizer is
//! reconstructed from the profile and never enters the stream.

use crate::engine::FuzzyDatabase;
use crate::error::{LinkError, Result};
use std::path::Path;

const MAGIC: &[u8; 4] = b"FZLK";
const FORMAT_VERSION: u32 = 1;

/// Serialize an engine to the on-disk format
pub fn to_bytes(engine: &FuzzyDatabase) -> Result<Vec<u8>> {
    let body = bincode::serialize(engine)
        .map_err(|e| LinkError::Persistence(format!("encode failed: {e}")))?;

    let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Deserialize an engine, validating magic and version first
pub fn from_bytes(bytes: &[u8]) -> Result<FuzzyDatabase> {
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(LinkError::Persistence(
            "not a fuzzylink engine stream".into(),
        ));
    }
    let version = u32::from_le_bytes(
        bytes[MAGIC.len()..MAGIC.len() + 4]
            .try_into()
            .expect("4-byte slice"),
    );
    if version != FORMAT_VERSION {
        return Err(LinkError::Persistence(format!(
            "unsupported engine format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    bincode::deserialize(&bytes[MAGIC.len() + 4..])
        .map_err(|e| LinkError::Persistence(format!("decode failed: {e}")))
}

/// Save a built engine to a file
pub fn save(engine: &FuzzyDatabase, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_bytes(engine)?)?;
    tracing::info!(path = %path.display(), "engine saved");
    Ok(())
}

/// Load a previously saved engine from a file
pub fn load(path: impl AsRef<Path>) -> Result<FuzzyDatabase> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| LinkError::Persistence(format!("cannot read {}: {e}", path.display())))?;
    from_bytes(&bytes)
}
