//! Content addressing for bundles
//!
//! The bundle hash is the SHA-256 over the `DDFB` chunk including its
//! eight-byte header; it is the bundle's identity and its filename in the
//! store. The file hash covers the whole bundle file and changes when outer
//! chunks change even if the `DDFB` payload does not.

use sha2::{Digest, Sha256};

use crate::chunk::Bundle;
use crate::error::{DdfError, Result};

/// 32-byte bundle hash, printed lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleHash(pub [u8; 32]);

impl BundleHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(DdfError::InvalidHash(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| DdfError::InvalidHash(s.to_string()))?;
        Ok(Self(bytes.try_into().expect("length checked")))
    }
}

impl std::fmt::Display for BundleHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Bundle hash: SHA-256 over the `DDFB` chunk with its header.
pub fn bundle_hash(bundle: &Bundle) -> BundleHash {
    BundleHash(Sha256::digest(&bundle.ddfb_raw).into())
}

/// File hash: SHA-256 over the entire bundle file.
pub fn file_hash(data: &[u8]) -> BundleHash {
    BundleHash(Sha256::digest(data).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle_bytes() -> Vec<u8> {
        Bundle::encode(
            br#"{"manufacturername":"Acme","modelid":"bulb-1","schema":"s"}"#,
            &[],
        )
    }

    #[test]
    fn test_bundle_hash_ignores_outer_chunks() {
        let raw = bundle_bytes();
        let bundle = Bundle::parse(&raw).unwrap();
        let h1 = bundle_hash(&bundle);

        // Append a trailing sibling chunk inside RIFF; DDFB is unchanged.
        let mut raw2 = raw.clone();
        raw2.extend_from_slice(b"XTRA");
        raw2.extend_from_slice(&0u32.to_le_bytes());
        let outer_len = (raw2.len() - 8) as u32;
        raw2[4..8].copy_from_slice(&outer_len.to_le_bytes());

        let bundle2 = Bundle::parse(&raw2).unwrap();
        assert_eq!(bundle_hash(&bundle2), h1);
        assert_ne!(file_hash(&raw2), file_hash(&raw));
    }

    #[test]
    fn test_hex_roundtrip() {
        let raw = bundle_bytes();
        let h = file_hash(&raw);
        assert_eq!(BundleHash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(BundleHash::from_hex("abc").is_err());
        assert!(BundleHash::from_hex(&"zz".repeat(32)).is_err());
    }
}
