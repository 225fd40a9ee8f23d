use crate::error::{GorillionaireError, Result};

/// Normalize an EVM wallet or contract address.
///
/// Accepts `0x`/`0X` followed by exactly 40 hex digits and returns the
/// lowercase form, which is how addresses are keyed everywhere in storage.
pub fn normalize_address(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| GorillionaireError::InvalidAddress(raw.to_string()))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GorillionaireError::InvalidAddress(raw.to_string()));
    }

    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}
