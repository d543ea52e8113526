use crate::{
    metadata::{CampaignMetadata, ProjectMode},
    utils::{format_units, parse_amount, parse_units, USDC_DECIMALS},
};
use serde::{Deserialize, Serialize};
use web3::contract::tokens::{Detokenize, Tokenizable, Tokenize};
use web3::contract::Error;
use web3::ethabi::Token;
use web3::types::{Address, U256};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CampaignState {
    #[default]
    Active,
    Succeeded,
    Failed,
}

impl TryFrom<u8> for CampaignState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Active),
            1 => Ok(Self::Succeeded),
            2 => Ok(Self::Failed),
            other => Err(Error::InvalidOutputType(format!("unknown campaign state {}", other))),
        }
    }
}

impl std::str::FromStr for CampaignState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err("Invalid state: active, succeeded and failed are supported".to_owned()),
        }
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::Active => "Active",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        write!(f, "{}", state)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CampaignData {
    pub creator: Address,
    pub name: String,
    pub metadata_uri: String,
    pub funding_goal: U256,
    pub deadline: U256,
    pub total_raised: U256,
    pub creator_reserve_percentage: U256,
    pub liquidity_percentage: U256,
    pub token_address: Address,
    pub state: CampaignState,
    pub created_at: U256,
}

fn expect_len(tokens: &[Token], len: usize) -> Result<(), Error> {
    if tokens.len() != len {
        return Err(Error::InvalidOutputType(format!(
            "Expected {} elements, got a list of length {}: {:?}",
            len,
            tokens.len(),
            tokens
        )));
    }
    Ok(())
}

fn field<T: Tokenizable>(token: &Token) -> Result<T, Error> {
    T::from_token(token.to_owned())
}

/// unwraps the single tuple a struct-returning view call yields
fn single_tuple(tokens: Vec<Token>) -> Result<Vec<Token>, Error> {
    expect_len(&tokens, 1)?;
    match tokens.into_iter().next() {
        Some(Token::Tuple(tokens)) | Some(Token::Array(tokens)) => Ok(tokens),
        other => Err(Error::InvalidOutputType(format!("Expected `Tuple`, got {:?}", other))),
    }
}

impl CampaignData {
    fn from_token(tokens: Vec<Token>) -> Result<Self, Error> {
        expect_len(&tokens, 11)?;
        let state: U256 = field(&tokens[9])?;
        let state = u8::try_from(state)
            .map_err(|_| Error::InvalidOutputType(format!("campaign state out of range: {}", state)))?;

        Ok(CampaignData {
            creator: field(&tokens[0])?,
            name: field(&tokens[1])?,
            metadata_uri: field(&tokens[2])?,
            funding_goal: field(&tokens[3])?,
            deadline: field(&tokens[4])?,
            total_raised: field(&tokens[5])?,
            creator_reserve_percentage: field(&tokens[6])?,
            liquidity_percentage: field(&tokens[7])?,
            token_address: field(&tokens[8])?,
            state: CampaignState::try_from(state)?,
            created_at: field(&tokens[10])?,
        })
    }

    pub fn metadata(&self) -> CampaignMetadata {
        CampaignMetadata::from_uri(&self.metadata_uri)
    }

    pub fn project_mode(&self) -> ProjectMode {
        self.metadata().project_mode
    }

    /// funding goal in stablecoin units
    pub fn funding_goal_human(&self) -> f64 {
        human(self.funding_goal)
    }

    pub fn total_raised_human(&self) -> f64 {
        human(self.total_raised)
    }

    /// Raised over goal in percent, capped at 100.
    pub fn progress(&self) -> f64 {
        let goal = self.funding_goal_human();
        if goal <= 0.0 {
            return 0.0;
        }
        (self.total_raised_human() / goal * 100.0).min(100.0)
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.deadline <= U256::from(now_secs)
    }
}

/// Listing filters, unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    /// case-insensitive, over name and description
    pub search: Option<String>,
    pub state: Option<CampaignState>,
    pub mode: Option<ProjectMode>,
}

impl CampaignFilter {
    pub fn matches(&self, campaign: &CampaignData) -> bool {
        let meta = campaign.metadata();
        if let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            if !campaign.name.to_lowercase().contains(&needle) && !meta.description.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if self.state.map_or(false, |state| state != campaign.state) {
            return false;
        }
        !self.mode.map_or(false, |mode| mode != meta.project_mode)
    }
}

fn human(value: U256) -> f64 {
    format_units(value, USDC_DECIMALS).parse().unwrap_or_default()
}

impl Detokenize for CampaignData {
    fn from_tokens(tokens: Vec<Token>) -> Result<Self, Error> {
        CampaignData::from_token(single_tuple(tokens)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ContributionInfo {
    pub contributor: Address,
    pub amount: U256,
    pub timestamp: U256,
    pub token_allocation: U256,
    pub claimed: bool,
}

impl ContributionInfo {
    fn from_token(tokens: Vec<Token>) -> Result<Self, Error> {
        expect_len(&tokens, 5)?;
        Ok(ContributionInfo {
            contributor: field(&tokens[0])?,
            amount: field(&tokens[1])?,
            timestamp: field(&tokens[2])?,
            token_allocation: field(&tokens[3])?,
            claimed: field(&tokens[4])?,
        })
    }
}

impl Detokenize for ContributionInfo {
    fn from_tokens(tokens: Vec<Token>) -> Result<Self, Error> {
        ContributionInfo::from_token(single_tuple(tokens)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateCampaignParams {
    pub name: String,
    pub metadata_uri: String,
    pub funding_goal: U256,
    /// seconds from now
    pub duration: U256,
    pub creator_reserve_percentage: U256,
    pub liquidity_percentage: U256,
    pub token_name: String,
    pub token_symbol: String,
}

impl Tokenize for CreateCampaignParams {
    fn into_tokens(self) -> Vec<Token> {
        vec![
            self.name.into_token(),
            self.metadata_uri.into_token(),
            self.funding_goal.into_token(),
            self.duration.into_token(),
            self.creator_reserve_percentage.into_token(),
            self.liquidity_percentage.into_token(),
            self.token_name.into_token(),
            self.token_symbol.into_token(),
        ]
    }
}

pub const MIN_FUNDING_GOAL: f64 = 100.0;
pub const MAX_FUNDING_GOAL: f64 = 10_000_000.0;
pub const CREATOR_RESERVE_PERCENTAGE: u64 = 25;

/// What a creator fills in before `createCampaign` is sent.
#[derive(Debug, Clone, Default)]
pub struct CampaignForm {
    pub project_mode: ProjectMode,
    pub project_name: String,
    /// unix seconds
    pub deadline: u64,
    pub fundraising_goal: String,
    pub token_name: String,
    pub token_symbol: String,
    pub liquidity_pool_percentage: u8,
    pub project_introduction: String,
    pub image: String,
}

impl CampaignForm {
    pub fn validate(&self, now_secs: u64) -> Vec<String> {
        let mut errors = Vec::new();
        if self.project_name.trim().is_empty() {
            errors.push("Project name is required".to_string());
        }
        if self.project_introduction.trim().is_empty() {
            errors.push("Project introduction is required".to_string());
        }
        match parse_amount(&self.fundraising_goal) {
            Err(_) => errors.push("Funding goal is required".to_string()),
            Ok(goal) if goal < MIN_FUNDING_GOAL => errors.push("Minimum funding goal is 100 USDC".to_string()),
            Ok(goal) if goal > MAX_FUNDING_GOAL => errors.push("Maximum funding goal is 10M USDC".to_string()),
            Ok(_) => {}
        }
        if self.project_mode == ProjectMode::Launchpad {
            if self.token_name.trim().is_empty() {
                errors.push("Token name is required for Launchpad mode".to_string());
            }
            if self.token_symbol.trim().is_empty() {
                errors.push("Token symbol is required for Launchpad mode".to_string());
            }
        }
        if self.deadline <= now_secs {
            errors.push("Deadline must be in the future".to_string());
        }
        if self.liquidity_pool_percentage > 100 {
            errors.push("Liquidity pool percentage must be between 0 and 100".to_string());
        }
        errors
    }

    pub fn into_params(self, now_secs: u64) -> crate::error::Result<CreateCampaignParams> {
        let errors = self.validate(now_secs);
        if !errors.is_empty() {
            return Err(crate::error::Error::InvalidConfig(errors.join("; ")));
        }
        let metadata = CampaignMetadata {
            description: self.project_introduction.clone(),
            image: self.image.clone(),
            project_mode: self.project_mode,
        };
        let token_name = match self.token_name.trim() {
            "" => self.project_name.clone(),
            name => name.to_string(),
        };
        let token_symbol = match self.token_symbol.trim() {
            "" => self.project_name.chars().take(4).collect::<String>().to_uppercase(),
            symbol => symbol.to_string(),
        };
        Ok(CreateCampaignParams {
            name: self.project_name,
            metadata_uri: metadata.to_uri()?,
            funding_goal: parse_units(&self.fundraising_goal, USDC_DECIMALS)?,
            duration: U256::from(self.deadline - now_secs),
            creator_reserve_percentage: U256::from(CREATOR_RESERVE_PERCENTAGE),
            liquidity_percentage: U256::from(self.liquidity_pool_percentage),
            token_name,
            token_symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign_tokens(state: u8) -> Vec<Token> {
        vec![Token::Tuple(vec![
            Token::Address(Address::from_low_u64_be(7)),
            Token::String("Solar".to_string()),
            Token::String("data:application/json,%7B%22description%22%3A%22d%22%2C%22projectMode%22%3A%22launchpad%22%7D".to_string()),
            Token::Uint(U256::from(1_000_000_000u64)),
            Token::Uint(U256::from(1_800_000_000u64)),
            Token::Uint(U256::from(250_000_000u64)),
            Token::Uint(U256::from(25u64)),
            Token::Uint(U256::from(45u64)),
            Token::Address(Address::from_low_u64_be(9)),
            Token::Uint(U256::from(state)),
            Token::Uint(U256::from(1_700_000_000u64)),
        ])]
    }

    #[test]
    fn test_decode_campaign() {
        let campaign = CampaignData::from_tokens(campaign_tokens(1)).unwrap();
        assert_eq!(campaign.name, "Solar");
        assert_eq!(campaign.state, CampaignState::Succeeded);
        assert_eq!(campaign.token_address, Address::from_low_u64_be(9));
        assert_eq!(campaign.funding_goal_human(), 1000.0);
        assert_eq!(campaign.total_raised_human(), 250.0);
        assert_eq!(campaign.progress(), 25.0);
        assert_eq!(campaign.project_mode(), ProjectMode::Launchpad);
        assert!(campaign.is_expired(1_800_000_000));
        assert!(!campaign.is_expired(1_799_999_999));
    }

    #[test]
    fn test_decode_rejects_unknown_state() {
        assert!(CampaignData::from_tokens(campaign_tokens(3)).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_arity() {
        assert!(CampaignData::from_tokens(vec![Token::Tuple(vec![Token::Bool(true)])]).is_err());
        assert!(CampaignData::from_tokens(vec![]).is_err());
        assert!(CampaignData::from_tokens(vec![Token::Bool(true)]).is_err());
    }

    #[test]
    fn test_decode_contribution() {
        let tokens = vec![Token::Tuple(vec![
            Token::Address(Address::from_low_u64_be(1)),
            Token::Uint(U256::from(10_000_000u64)),
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Uint(U256::exp10(24)),
            Token::Bool(false),
        ])];
        let info = ContributionInfo::from_tokens(tokens).unwrap();
        assert_eq!(info.amount, U256::from(10_000_000u64));
        assert!(!info.claimed);
    }

    #[test]
    fn test_progress_is_capped() {
        let campaign = CampaignData {
            funding_goal: U256::from(100u64),
            total_raised: U256::from(300u64),
            ..Default::default()
        };
        assert_eq!(campaign.progress(), 100.0);
        assert_eq!(CampaignData::default().progress(), 0.0);
    }

    #[test]
    fn test_create_params_tokenize() {
        let params = CreateCampaignParams {
            name: "Solar".to_string(),
            token_symbol: "SOLA".to_string(),
            ..Default::default()
        };
        let tokens = params.into_tokens();
        assert_eq!(tokens.len(), 8);
        assert_eq!(tokens[7], Token::String("SOLA".to_string()));
    }

    fn form() -> CampaignForm {
        CampaignForm {
            project_mode: ProjectMode::Classic,
            project_name: "solar farm".to_string(),
            deadline: 1_000 + 86_400,
            fundraising_goal: "5000".to_string(),
            liquidity_pool_percentage: 45,
            project_introduction: "panels".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_form_into_params() {
        let params = form().into_params(1_000).unwrap();
        assert_eq!(params.funding_goal, U256::from(5_000_000_000u64));
        assert_eq!(params.duration, U256::from(86_400u64));
        assert_eq!(params.creator_reserve_percentage, U256::from(25u64));
        assert_eq!(params.token_name, "solar farm");
        assert_eq!(params.token_symbol, "SOLA");
        let meta = CampaignMetadata::from_uri(&params.metadata_uri);
        assert_eq!(meta.description, "panels");
        assert_eq!(meta.project_mode, ProjectMode::Classic);
    }

    #[test]
    fn test_form_validation() {
        let mut bad = form();
        bad.fundraising_goal = "99".to_string();
        bad.deadline = 1_000;
        bad.project_mode = ProjectMode::Launchpad;
        let errors = bad.validate(1_000);
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(bad.into_params(1_000).is_err());

        let mut far = form();
        far.deadline = 1_000 + 10 * 365 * 86_400;
        assert!(far.validate(1_000).is_empty());
        far.fundraising_goal = "10000001".to_string();
        assert_eq!(far.validate(1_000).len(), 1);
    }

    fn listed(name: &str, description: &str, mode: ProjectMode, state: CampaignState) -> CampaignData {
        let meta = CampaignMetadata { description: description.to_string(), project_mode: mode, ..Default::default() };
        CampaignData {
            name: name.to_string(),
            metadata_uri: meta.to_uri().unwrap(),
            state,
            ..Default::default()
        }
    }

    #[test]
    fn test_campaign_filter() {
        let solar = listed("Solar Farm", "community panels", ProjectMode::Launchpad, CampaignState::Active);
        let cafe = listed("Corner Cafe", "Fresh SOLAR roasted beans", ProjectMode::Classic, CampaignState::Failed);
        let garden = listed("Garden", "", ProjectMode::Classic, CampaignState::Succeeded);
        let all = [&solar, &cafe, &garden];
        let hits = |filter: &CampaignFilter| all.iter().filter(|c| filter.matches(c)).count();

        assert_eq!(hits(&CampaignFilter::default()), 3);
        assert_eq!(hits(&CampaignFilter { search: Some("  ".to_string()), ..Default::default() }), 3);
        assert_eq!(hits(&CampaignFilter { search: Some("solar".to_string()), ..Default::default() }), 2);
        assert_eq!(hits(&CampaignFilter { search: Some("PANELS".to_string()), ..Default::default() }), 1);
        assert_eq!(hits(&CampaignFilter { state: Some(CampaignState::Failed), ..Default::default() }), 1);
        assert_eq!(hits(&CampaignFilter { mode: Some(ProjectMode::Classic), ..Default::default() }), 2);
        let narrow = CampaignFilter {
            search: Some("solar".to_string()),
            state: Some(CampaignState::Active),
            mode: Some(ProjectMode::Classic),
        };
        assert_eq!(hits(&narrow), 0);
    }

    #[test]
    fn test_state_from_str() {
        assert_eq!("Succeeded".parse::<CampaignState>().unwrap(), CampaignState::Succeeded);
        assert!("pending".parse::<CampaignState>().is_err());
    }
}
