//! Display-only token allocation preview.
//!
//! Launchpad campaigns distribute a fixed pool pro rata to the funding goal.
//! The contract's own `tokenAllocation` is authoritative once it is readable.

use crate::error::{Error, Result};

/// Reward tokens set aside for contributors, 0.75B.
pub const CONTRIBUTOR_TOKEN_POOL: f64 = 750_000_000.0;

/// `contribution * (pool / goal)`, both in human stablecoin units.
pub fn expected_tokens(contribution: f64, funding_goal: f64) -> Result<f64> {
    if !(funding_goal > 0.0) || !funding_goal.is_finite() {
        return Err(Error::InvalidAmount(format!("funding goal {}", funding_goal)));
    }
    if !(contribution >= 0.0) || !contribution.is_finite() {
        return Err(Error::InvalidAmount(format!("contribution {}", contribution)));
    }
    let tokens_per_dollar = CONTRIBUTOR_TOKEN_POOL / funding_goal;
    Ok(contribution * tokens_per_dollar)
}
