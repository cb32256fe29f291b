use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A SHA-256 digest over the JSON form of everything added to it. Used to tell whether
/// persisted results were derived from the same inputs as the current run.
#[derive(Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        let bytes = serde_json::to_vec(value)?;
        // Length prefixed so that adjacent values can't run into each other.
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(&bytes);

        Ok(self)
    }

    pub fn finish(self) -> String {
        self.hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
