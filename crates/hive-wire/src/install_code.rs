//! Install-code link key derivation
//!
//! Devices ship with a printed install code: 6, 8, 12 or 16 random bytes
//! followed by a CRC-16 (X-25 flavour, appended little-endian). The link key
//! is the AES-MMO hash (Matyas–Meyer–Oseas over AES-128) of the full code
//! including the CRC bytes.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::error::{Result, WireError};

/// Accepted install-code lengths (body + 2 CRC bytes).
const VALID_LENGTHS: [usize; 4] = [8, 10, 14, 18];

/// AES-MMO hash over arbitrary input, yielding a 128-bit digest.
///
/// H(0) = 0; H(i) = AES-128(key = H(i-1), M(i)) XOR M(i). The message is
/// padded with 0x80, zero bytes, and the big-endian 16-bit bit count to a
/// multiple of the block size.
pub fn aes_mmo_hash(data: &[u8]) -> [u8; 16] {
    let bit_len = (data.len() as u32) * 8;

    let mut padded = data.to_vec();
    padded.push(0x80);
    while (padded.len() + 2) % 16 != 0 {
        padded.push(0x00);
    }
    padded.push((bit_len >> 8) as u8);
    padded.push(bit_len as u8);

    let mut hash = [0u8; 16];
    for block in padded.chunks_exact(16) {
        let cipher = Aes128::new(GenericArray::from_slice(&hash));
        let mut out = GenericArray::clone_from_slice(block);
        cipher.encrypt_block(&mut out);
        for (h, (&e, &m)) in hash.iter_mut().zip(out.iter().zip(block.iter())) {
            *h = e ^ m;
        }
    }
    hash
}

/// CRC-16 as printed on install-code labels (poly 0x1021 reflected,
/// init 0xFFFF, final XOR 0xFFFF).
pub fn install_code_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    !crc
}

/// Parse a hex install code, verify length and CRC, and derive the link key.
pub fn derive_link_key(hex_code: &str) -> Result<[u8; 16]> {
    let cleaned: String = hex_code
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    let code = hex::decode(&cleaned).map_err(|_| WireError::InvalidHex(cleaned.clone()))?;

    if !VALID_LENGTHS.contains(&code.len()) {
        return Err(WireError::InvalidInstallCodeLength(code.len()));
    }

    let (body, crc_bytes) = code.split_at(code.len() - 2);
    let stored = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed = install_code_crc(body);
    if stored != computed {
        return Err(WireError::InstallCodeCrc { expected: computed, got: stored });
    }

    Ok(aes_mmo_hash(&code))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vector: 12-byte code + CRC, key per the platform test suite.
    const CODE: &str = "83FED3407A939723A5C639FF4C12";
    const KEY: &str = "58C1828CF7F1C3FE29E7B1024AD84BFA";

    #[test]
    fn test_mmo_reference_vector() {
        let code = hex::decode(CODE).unwrap();
        let hash = aes_mmo_hash(&code);
        assert_eq!(hex::encode_upper(hash), KEY);
    }

    #[test]
    fn test_derive_link_key() {
        let key = derive_link_key(CODE).unwrap();
        assert_eq!(hex::encode_upper(key), KEY);
    }

    #[test]
    fn test_derive_accepts_separators() {
        let spaced = "83FE D340 7A93 9723 A5C6 39FF 4C12";
        assert_eq!(derive_link_key(spaced).unwrap(), derive_link_key(CODE).unwrap());
    }

    #[test]
    fn test_crc_mismatch_rejected() {
        let bad = "83FED3407A939723A5C639FF0000";
        assert!(matches!(
            derive_link_key(bad),
            Err(WireError::InstallCodeCrc { .. })
        ));
    }

    #[test]
    fn test_bad_length_rejected() {
        assert!(matches!(
            derive_link_key("83FED340"),
            Err(WireError::InvalidInstallCodeLength(4))
        ));
    }

    #[test]
    fn test_not_hex_rejected() {
        assert!(matches!(derive_link_key("zzzz"), Err(WireError::InvalidHex(_))));
    }

    #[test]
    fn test_crc_matches_label() {
        let body = hex::decode("83FED3407A939723A5C639FF").unwrap();
        assert_eq!(install_code_crc(&body), 0x124C);
    }
}
