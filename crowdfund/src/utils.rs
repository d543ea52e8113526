use crate::error::{Error, Result};
use std::str::FromStr;
use web3::contract::Error as ContractError;
use web3::signing::{SecretKey, SecretKeyRef, Key};
use web3::types::{Address, U256};

/// Stablecoin decimals
pub const USDC_DECIMALS: u32 = 6;
/// Campaign reward token decimals
pub const TOKEN_DECIMALS: u32 = 18;

#[inline(always)]
pub fn extract_keypair_from_str(sk_str: &str) -> Result<(SecretKey, Address)> {
    let sk_str = sk_str.trim();
    let sk_str = sk_str.strip_prefix("0x").unwrap_or(sk_str);
    let root_sk = SecretKey::from_str(sk_str).map_err(|e| Error::InvalidConfig(format!("secret key: {}", e)))?;
    let root_addr = SecretKeyRef::new(&root_sk).address();
    Ok((root_sk, root_addr))
}

pub fn parse_address(addr: &str) -> Result<Address> {
    Address::from_str(addr.trim()).map_err(|_| Error::InvalidAddress(addr.to_string()))
}

/// storage key for an address: addresses compare case-insensitively
pub fn normalize_address(addr: &str) -> String {
    addr.trim().to_lowercase()
}

#[inline(always)]
pub fn handle_error(error: ContractError) -> String {
    match error {
        ContractError::InvalidOutputType(s) => format!("Invalid output type: {}", s),
        ContractError::Abi(e) => format!("Abi error: {}", e),
        ContractError::Api(e) => format!("Api error: {}", e),
        ContractError::Deployment(e) => format!("Deployment error: {}", e),
        ContractError::InterfaceUnsupported => "Contract does not support this interface.".to_string(),
    }
}

/// Parses a non-negative human-unit decimal such as `"12.5"`.
pub fn parse_amount(amount: &str) -> Result<f64> {
    let trimmed = amount.trim();
    let valid = !trimmed.is_empty()
        && trimmed.chars().all(|c| c.is_ascii_digit() || c == '.')
        && trimmed.chars().filter(|c| *c == '.').count() <= 1
        && trimmed != ".";
    if !valid {
        return Err(Error::InvalidAmount(amount.to_string()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidAmount(amount.to_string()))
}

/// Shortest round-trip rendering, `150.0` prints as `"150"`.
pub fn format_amount(value: f64) -> String {
    // -0.0 prints as "-0"
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Converts a decimal string into base units, e.g. `("1.5", 6)` -> `1_500_000`.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256> {
    let trimmed = amount.trim();
    parse_amount(trimmed)?;
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    if frac_part.len() > decimals as usize {
        return Err(Error::InvalidAmount(format!(
            "{} has more than {} decimals",
            amount, decimals
        )));
    }
    let digits = format!(
        "{}{}{}",
        int_part,
        frac_part,
        "0".repeat(decimals as usize - frac_part.len())
    );
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| Error::InvalidAmount(amount.to_string()))
}

/// Inverse of [`parse_units`], trailing zeros trimmed.
pub fn format_units(value: U256, decimals: u32) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let (i, f) = digits.split_at(digits.len() - decimals);
        (i.to_string(), f.to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Milliseconds since the unix epoch.
pub fn get_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
