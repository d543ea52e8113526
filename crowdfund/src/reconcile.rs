//! Merges live chain data with the locally cached user records.

use crate::{
    allocation::expected_tokens,
    campaign::{CampaignData, CampaignState, ContributionInfo},
    db::KvStore,
    error::Result,
    metadata::ProjectMode,
    store::{ReconciliationStore, UserRecord},
    utils::{format_amount, format_units, parse_amount, TOKEN_DECIMALS, USDC_DECIMALS},
};
use log::info;
use serde::Serialize;

/// Commits what a confirmed contribution implies: the contribution itself and,
/// for launchpad campaigns, the previewed token allocation.
pub fn on_contribution_confirmed<S: KvStore>(
    store: &ReconciliationStore<S>,
    address: &str,
    campaign_id: &str,
    campaign: &CampaignData,
    amount: &str,
    tx_hash: &str,
) -> Result<()> {
    store.record_contribution(address, campaign_id, amount, Some(tx_hash))?;

    if campaign.project_mode() == ProjectMode::Launchpad {
        let tokens = expected_tokens(parse_amount(amount)?, campaign.funding_goal_human())?;
        store.record_token_allocation(
            address,
            campaign_id,
            &campaign.name,
            &format!("{:?}", campaign.token_address),
            &format_amount(tokens),
            amount,
        )?;
    }
    info!("recorded contribution of {} to campaign {} for {}", amount, campaign_id, address);
    Ok(())
}

pub fn on_claim_confirmed<S: KvStore>(
    store: &ReconciliationStore<S>,
    address: &str,
    campaign_id: &str,
    tx_hash: &str,
) -> Result<()> {
    store.mark_claimed(address, campaign_id, Some(tx_hash))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub campaign_id: String,
    pub campaign_name: String,
    pub state: CampaignState,
    pub mode: ProjectMode,
    /// stablecoin units
    pub contributed: String,
    pub tokens: String,
    /// true when `tokens` comes from the local preview formula
    pub tokens_estimated: bool,
    pub claimed: bool,
    pub claim_tx_hash: Option<String>,
}

impl Position {
    pub fn can_claim(&self) -> bool {
        self.mode == ProjectMode::Launchpad && self.state == CampaignState::Succeeded && !self.claimed
    }

    pub fn can_refund(&self) -> bool {
        self.state == CampaignState::Failed && self.contributed.parse::<f64>().map_or(false, |v| v > 0.0)
    }
}

/// Chain values win where they exist; local records fill the gaps.
pub fn merge_position(
    campaign_id: &str,
    campaign: &CampaignData,
    local: &UserRecord,
    chain: Option<&ContributionInfo>,
) -> Position {
    let local_token = local.token(campaign_id);

    let contributed = match chain {
        Some(info) if !info.amount.is_zero() => format_units(info.amount, USDC_DECIMALS),
        _ => format_amount(local.total_for(campaign_id)),
    };

    let (tokens, tokens_estimated) = match (chain, local_token) {
        (Some(info), _) if !info.token_allocation.is_zero() => {
            (format_units(info.token_allocation, TOKEN_DECIMALS), false)
        }
        (_, Some(token)) => (token.token_amount.clone(), true),
        _ => ("0".to_string(), false),
    };

    let chain_claimed = chain.map(|info| info.claimed).unwrap_or(false);
    let local_claimed = local_token.map(|t| t.claimed).unwrap_or(false);

    Position {
        campaign_id: campaign_id.to_string(),
        campaign_name: campaign.name.clone(),
        state: campaign.state,
        mode: campaign.project_mode(),
        contributed,
        tokens,
        tokens_estimated,
        claimed: chain_claimed || local_claimed,
        claim_tx_hash: local_token.and_then(|t| t.claim_tx_hash.clone()),
    }
}
