//! Content fingerprinting using BLAKE3 in extendable-output mode

use std::fmt;
use std::io::Read;
use std::path::Path;

use color_eyre::Result;
use color_eyre::eyre::eyre;

/// Width of a fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 512;

/// Width of the hex encoding of a fingerprint.
pub const FINGERPRINT_HEX_LEN: usize = FINGERPRINT_LEN * 2;

/// Chunk size for streaming file reads (bounds memory independently of file size).
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A 512-byte content fingerprint over a file's full byte content.
#[derive(Clone, PartialEq, Eq)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Sentinel recorded for files that could not be opened for reading.
    ///
    /// All-0xFF is distinguishable from any real digest with overwhelming
    /// probability.
    pub const UNREADABLE: Self = Self([0xFF; FINGERPRINT_LEN]);

    /// Fingerprint arbitrary bytes
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        Self::finish(&hasher)
    }

    /// Fingerprint a file by path, streaming its content in fixed-size chunks
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; READ_CHUNK_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(Self::finish(&hasher))
    }

    fn finish(hasher: &blake3::Hasher) -> Self {
        let mut raw = [0u8; FINGERPRINT_LEN];
        hasher.finalize_xof().fill(&mut raw);
        Self(raw)
    }

    /// Construct from raw digest bytes
    #[must_use]
    pub fn from_raw(raw: [u8; FINGERPRINT_LEN]) -> Self {
        Self(raw)
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Encode as a fixed-width lowercase hex string
    #[must_use]
    pub fn encode(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from the fixed-width hex form.
    ///
    /// Decoding is strict: the input must be exactly [`FINGERPRINT_HEX_LEN`]
    /// characters drawn from `[0-9a-fA-F]`. Anything else is rejected rather
    /// than zero-filled, so a corrupted manifest record surfaces as an error
    /// instead of masquerading as a digest.
    ///
    /// # Errors
    /// Returns an error on wrong length or non-hex characters.
    pub fn decode(text: &str) -> Result<Self> {
        if text.len() != FINGERPRINT_HEX_LEN {
            return Err(eyre!(
                "fingerprint must be {FINGERPRINT_HEX_LEN} hex chars, got {}",
                text.len()
            ));
        }

        let bytes = hex::decode(text).map_err(|e| eyre!("malformed fingerprint: {e}"))?;
        let mut raw = [0u8; FINGERPRINT_LEN];
        raw.copy_from_slice(&bytes);
        Ok(Self(raw))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.encode();
        write!(f, "Fingerprint({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.encode();
        write!(f, "{}", hex.get(..16).unwrap_or(&hex))
    }
}
