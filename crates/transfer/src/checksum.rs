use sha2::{Digest, Sha256};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Incremental SHA-256 over a sequence of chunks.
#[derive(Default)]
pub struct Checksum {
    hasher: Sha256,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Consumes the hasher and returns the hex-encoded digest.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
