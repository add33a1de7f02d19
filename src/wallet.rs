//! Wallet address and token amount helpers.
//!
//! Addresses are EVM-style 0x-prefixed 20-byte hex. Every ledger keyed by a
//! player address stores the lowercased form, so the same wallet typed with
//! different casing always lands on the same records.

use anyhow::{Result, anyhow};

/// Base units per whole MON (9 decimals).
pub const UNITS_PER_MON: u64 = 1_000_000_000;

pub const ADDRESS_BYTES: usize = 20;
pub const ADDRESS_LEN: usize = 2 + ADDRESS_BYTES * 2;
pub const MAX_ADDRESS_LEN: usize = 64;

const _: [(); MAX_ADDRESS_LEN - ADDRESS_LEN] = [(); MAX_ADDRESS_LEN - ADDRESS_LEN];

/// Normalize a player wallet address: trimmed, 0x-prefixed 40-hex, lowercased.
pub fn sanitize_player_address(value: &str) -> Result<String> {
    sanitize_address(value, "player address")
}

/// Normalize an external-ledger contract address. Same shape as a wallet.
pub fn sanitize_contract_address(value: &str) -> Result<String> {
    sanitize_address(value, "contract address")
}

fn sanitize_address(value: &str, label: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{label} cannot be empty"));
    }
    if trimmed.len() > MAX_ADDRESS_LEN {
        return Err(anyhow!(
            "{label} exceeds {MAX_ADDRESS_LEN} character limit"
        ));
    }
    if !trimmed.starts_with("0x") && !trimmed.starts_with("0X") {
        return Err(anyhow!("{label} must be 0x-prefixed"));
    }
    let bytes = hex::decode(&trimmed[2..])
        .map_err(|err| anyhow!("Failed to decode {label} as hex: {err}"))?;
    if bytes.len() != ADDRESS_BYTES {
        return Err(anyhow!(
            "{label} must be {ADDRESS_BYTES} bytes, got {}",
            bytes.len()
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Format a base-unit amount as a human-readable MON string.
pub fn format_mon(base_units: u64) -> String {
    let whole = base_units / UNITS_PER_MON;
    let frac = base_units % UNITS_PER_MON;
    if frac == 0 {
        format!("{} MON", whole)
    } else {
        // Trim trailing zeros
        let frac_str = format!("{:09}", frac);
        let trimmed = frac_str.trim_end_matches('0');
        format!("{}.{} MON", whole, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_normalizes_case() {
        let mixed = "0xAbCdEf0123456789aBcDeF0123456789ABCDEF01";
        let sanitized = sanitize_player_address(mixed).expect("valid address");
        assert_eq!(sanitized, mixed.to_ascii_lowercase());
        assert_eq!(sanitized.len(), ADDRESS_LEN);
    }

    #[test]
    fn address_trims_whitespace() {
        let padded = "  0xabcdef0123456789abcdef0123456789abcdef01  ";
        let sanitized = sanitize_player_address(padded).expect("valid address");
        assert_eq!(sanitized, "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn address_rejects_bad_shapes() {
        assert!(sanitize_player_address("").is_err());
        assert!(sanitize_player_address("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(sanitize_player_address("0xabc").is_err());
        assert!(sanitize_player_address("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
        let too_long = format!("0x{}", "a".repeat(MAX_ADDRESS_LEN));
        assert!(sanitize_player_address(&too_long).is_err());
    }

    #[test]
    fn contract_address_same_rules() {
        assert!(sanitize_contract_address("0xABCDEF0123456789abcdef0123456789abcdef01").is_ok());
        assert!(sanitize_contract_address("0x00").is_err());
    }

    #[test]
    fn test_format_mon() {
        assert_eq!(format_mon(0), "0 MON");
        assert_eq!(format_mon(1_000_000_000), "1 MON");
        assert_eq!(format_mon(10_000_000), "0.01 MON");
        assert_eq!(format_mon(1_500_000_000), "1.5 MON");
        assert_eq!(format_mon(123_456_789), "0.123456789 MON");
        assert_eq!(format_mon(50_000_000), "0.05 MON");
    }
}
