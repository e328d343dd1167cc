use crate::models::Fingerprint;
use sha2::{Digest, Sha256};

/// Content address of an upload. Identical bytes always map to the same value.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint::from_hex(format!("{:x}", hasher.finalize()))
}
