//! Password decoding for stored connection definitions.
//!
//! Stored passwords may be obfuscated as `Encrypted <hex>`, where the hex
//! digits are the big-endian integer of the UTF-8 password XOR-ed with a
//! fixed key. This is reversible obfuscation, not encryption; it only keeps
//! passwords out of plain sight in definition files.

use crate::error::{DbError, Result};

/// Prefix marking an obfuscated password.
pub const ENCRYPTED_PREFIX: &str = "Encrypted ";

/// Fixed XOR key (big-endian).
const OBFUSCATION_KEY: [u8; 17] = [
    0x02, 0xbe, 0x98, 0xaf, 0xc8, 0x6a, 0xa7, 0xf2, 0xe4, 0xcb, 0x79, 0xce, 0x10, 0xbe, 0xf2,
    0xcf, 0xba,
];

/// Turns a stored password into the clear text handed to the driver.
pub trait CredentialDecoder: Send + Sync {
    fn decode(&self, stored: &str) -> Result<String>;
}

/// Decoder for the `Encrypted <hex>` format. Values without the prefix pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObfuscatedPasswords;

impl ObfuscatedPasswords {
    /// Obfuscate a clear-text password, including the prefix.
    pub fn encode(&self, clear: &str) -> String {
        if clear.is_empty() {
            return String::new();
        }
        let mixed = xor_right_aligned(clear.as_bytes(), &OBFUSCATION_KEY);
        let hex = hex::encode(strip_leading_zeros(&mixed));
        format!("{}{}", ENCRYPTED_PREFIX, hex.trim_start_matches('0'))
    }
}

impl CredentialDecoder for ObfuscatedPasswords {
    fn decode(&self, stored: &str) -> Result<String> {
        let Some(hex) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(stored.to_string());
        };
        let hex = hex.trim();
        if hex.is_empty() {
            return Ok(String::new());
        }

        let padded = if hex.len() % 2 == 1 {
            format!("0{}", hex)
        } else {
            hex.to_string()
        };
        let bytes = hex::decode(&padded)
            .map_err(|e| DbError::Config(format!("Invalid obfuscated password: {}", e)))?;

        let clear = xor_right_aligned(&bytes, &OBFUSCATION_KEY);
        String::from_utf8(strip_leading_zeros(&clear).to_vec())
            .map_err(|e| DbError::Config(format!("Obfuscated password is not UTF-8: {}", e)))
    }
}

/// Passwords are stored in clear text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPasswords;

impl CredentialDecoder for PlainPasswords {
    fn decode(&self, stored: &str) -> Result<String> {
        Ok(stored.to_string())
    }
}

fn xor_right_aligned(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut out = vec![0u8; len];
    for (i, slot) in out.iter_mut().enumerate() {
        let from_end = len - 1 - i;
        let x = a.len().checked_sub(from_end + 1).map_or(0, |j| a[j]);
        let y = b.len().checked_sub(from_end + 1).map_or(0, |j| b[j]);
        *slot = x ^ y;
    }
    out
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let codec = ObfuscatedPasswords;
        assert_eq!(
            codec.encode("password"),
            "Encrypted 2be98afc86aa7f2e4bb18bd63c99dbdde"
        );
        assert_eq!(
            codec
                .decode("Encrypted 2be98afc86aa7f2e4bb18bd63c99dbdde")
                .unwrap(),
            "password"
        );
    }

    #[test]
    fn test_round_trip_and_passthrough() {
        let codec = ObfuscatedPasswords;
        let stored = codec.encode("s3cr3t!");
        assert!(stored.starts_with(ENCRYPTED_PREFIX));
        assert_eq!(codec.decode(&stored).unwrap(), "s3cr3t!");
        assert_eq!(codec.decode("plain").unwrap(), "plain");
        assert_eq!(codec.decode("").unwrap(), "");
    }

    #[test]
    fn test_invalid_hex_is_config_error() {
        let err = ObfuscatedPasswords.decode("Encrypted zz").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
