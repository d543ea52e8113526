use crate::{
    abi::{CAMPAIGN_ABI, FACTORY_ABI, USDC_ABI},
    campaign::{CampaignData, CampaignState, ContributionInfo, CreateCampaignParams},
    metadata::ProjectMode,
    error::{Error, Result},
    utils::handle_error,
};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;
use web3::contract::tokens::Tokenize;
use web3::futures::lock::Mutex;
use web3::signing::{SecretKey, SecretKeyRef};
use web3::{
    self,
    api::Eth,
    contract::{Contract, Options},
    transports::Http,
    types::{Address, BlockNumber, H256, U256},
};

lazy_static! {
    pub static ref PRIKEY_CONTRACT_LOCK: Mutex<()> = Mutex::new(());
}

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
const RECEIPT_MAX_POLLS: u64 = 120;

/// Observable lifecycle of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum TxPhase {
    /// handed to the signer
    Pending,
    /// broadcast, waiting for inclusion
    Confirming { hash: H256 },
    Confirmed { hash: H256 },
    Failed { hash: Option<H256>, reason: String },
}

impl TxPhase {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxPhase::Confirmed { .. })
    }

    pub fn hash(&self) -> Option<H256> {
        match self {
            TxPhase::Pending => None,
            TxPhase::Confirming { hash } | TxPhase::Confirmed { hash } => Some(*hash),
            TxPhase::Failed { hash, .. } => *hash,
        }
    }

    /// Converts the terminal phase into a result carrying the hash.
    pub fn into_result(self) -> Result<H256> {
        match self {
            TxPhase::Confirmed { hash } => Ok(hash),
            TxPhase::Failed { reason, .. } => Err(Error::TxFailed(reason)),
            other => Err(Error::TxFailed(format!("transaction still {}", other))),
        }
    }
}

impl std::fmt::Display for TxPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxPhase::Pending => write!(f, "pending"),
            TxPhase::Confirming { hash } => write!(f, "confirming {:?}", hash),
            TxPhase::Confirmed { hash } => write!(f, "confirmed {:?}", hash),
            TxPhase::Failed { hash: Some(hash), reason } => write!(f, "failed {:?}: {}", hash, reason),
            TxPhase::Failed { hash: None, reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Signer {
    pub secret: SecretKey,
    pub address: Address,
}

#[derive(Debug, Clone)]
pub struct CrowdfundContract {
    pub factory_addr: Address,
    pub usdc_addr: Address,
    pub signer: Option<Signer>,
    pub gas: u64,
    pub gas_price: Option<u64>,
    pub confirmations: usize,
}

impl CrowdfundContract {
    fn factory(&self, eth: Eth<Http>) -> Result<Contract<Http>> {
        Ok(Contract::from_json(eth, self.factory_addr, FACTORY_ABI.as_bytes())?)
    }

    fn usdc(&self, eth: Eth<Http>) -> Result<Contract<Http>> {
        Ok(Contract::from_json(eth, self.usdc_addr, USDC_ABI.as_bytes())?)
    }

    fn campaign(&self, eth: Eth<Http>, campaign_addr: Address) -> Result<Contract<Http>> {
        Ok(Contract::from_json(eth, campaign_addr, CAMPAIGN_ABI.as_bytes())?)
    }

    fn signer(&self) -> Result<&Signer> {
        self.signer
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("no secret configured, writes are disabled".to_string()))
    }

    fn caller(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address)
    }

    async fn query<R, P>(&self, contract: &Contract<Http>, func: &str, params: P) -> Result<R>
    where
        R: web3::contract::tokens::Detokenize,
        P: Tokenize,
    {
        contract
            .query(func, params, self.caller(), Options::default(), None)
            .await
            .map_err(|e| {
                let msg = handle_error(e);
                debug!("{} query failed: {}", func, msg);
                Error::Decode(format!("{}: {}", func, msg))
            })
    }

    pub async fn campaign_count(&self, eth: Eth<Http>) -> Result<U256> {
        let factory = self.factory(eth)?;
        self.query(&factory, "getCampaignCount", ()).await
    }

    pub async fn get_campaign(&self, eth: Eth<Http>, campaign_id: U256) -> Result<CampaignData> {
        let factory = self.factory(eth)?;
        self.query(&factory, "getCampaign", campaign_id).await
    }

    pub async fn campaign_address(&self, eth: Eth<Http>, campaign_id: U256) -> Result<Address> {
        let factory = self.factory(eth)?;
        self.query(&factory, "getCampaignAddress", campaign_id).await
    }

    pub async fn campaigns_by_creator(&self, eth: Eth<Http>, creator: Address) -> Result<Vec<U256>> {
        let factory = self.factory(eth)?;
        self.query(&factory, "getCampaignsByCreator", creator).await
    }

    pub async fn campaign_details(&self, eth: Eth<Http>, campaign_addr: Address) -> Result<CampaignData> {
        let campaign = self.campaign(eth, campaign_addr)?;
        self.query(&campaign, "getCampaignDetails", ()).await
    }

    pub async fn contribution(
        &self,
        eth: Eth<Http>,
        campaign_addr: Address,
        contributor: Address,
    ) -> Result<ContributionInfo> {
        let campaign = self.campaign(eth, campaign_addr)?;
        self.query(&campaign, "getContribution", contributor).await
    }

    pub async fn usdc_balance(&self, eth: Eth<Http>, account: Address) -> Result<U256> {
        let usdc = self.usdc(eth)?;
        self.query(&usdc, "balanceOf", account).await
    }

    pub async fn usdc_allowance(&self, eth: Eth<Http>, owner: Address, spender: Address) -> Result<U256> {
        let usdc = self.usdc(eth)?;
        self.query(&usdc, "allowance", (owner, spender)).await
    }

    /// Signs, broadcasts and waits for the receipt of one call, reporting each phase.
    pub async fn send<P, F>(
        &self,
        eth: Eth<Http>,
        contract: &Contract<Http>,
        func: &str,
        params: P,
        on_phase: &mut F,
    ) -> TxPhase
    where
        P: Tokenize,
        F: FnMut(&TxPhase),
    {
        let signer = match self.signer() {
            Ok(signer) => signer,
            Err(e) => {
                let failed = TxPhase::Failed { hash: None, reason: e.to_string() };
                on_phase(&failed);
                return failed;
            }
        };
        on_phase(&TxPhase::Pending);

        let sent = {
            let _guard = PRIKEY_CONTRACT_LOCK.lock().await;
            let mut opt = Options {
                gas: Some(self.gas.into()),
                gas_price: self.gas_price.map(U256::from),
                ..Default::default()
            };
            match eth.transaction_count(signer.address, Some(BlockNumber::Pending)).await {
                Ok(nonce) => opt.nonce = Some(nonce),
                Err(e) => warn!("failed to get pending nonce for {:?}: {}", signer.address, e),
            }
            contract
                .signed_call(func, params, opt, SecretKeyRef::new(&signer.secret))
                .await
        };
        let hash = match sent {
            Ok(hash) => hash,
            Err(e) => {
                let failed = TxPhase::Failed { hash: None, reason: e.to_string() };
                on_phase(&failed);
                return failed;
            }
        };
        info!("{} signed_call ok: {:?}", func, hash);
        let confirming = TxPhase::Confirming { hash };
        on_phase(&confirming);

        let done = self.wait_for_receipt(eth, hash).await;
        on_phase(&done);
        done
    }

    async fn wait_for_receipt(&self, eth: Eth<Http>, hash: H256) -> TxPhase {
        for _ in 0..RECEIPT_MAX_POLLS {
            match eth.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    let included = receipt.block_number.unwrap_or_default();
                    let head = eth.block_number().await.unwrap_or(included);
                    if head.as_u64() + 1 < included.as_u64() + self.confirmations as u64 {
                        tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
                        continue;
                    }
                    return if receipt.status == Some(1u64.into()) {
                        TxPhase::Confirmed { hash }
                    } else {
                        TxPhase::Failed { hash: Some(hash), reason: "transaction reverted".to_string() }
                    };
                }
                Ok(None) => {}
                Err(e) => debug!("receipt for {:?} not available: {}", hash, e),
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        TxPhase::Failed { hash: Some(hash), reason: "timed out waiting for receipt".to_string() }
    }

    pub async fn approve<F: FnMut(&TxPhase)>(
        &self,
        eth: Eth<Http>,
        spender: Address,
        amount: U256,
        on_phase: &mut F,
    ) -> TxPhase {
        match self.usdc(eth.clone()) {
            Ok(usdc) => self.send(eth, &usdc, "approve", (spender, amount), on_phase).await,
            Err(e) => TxPhase::Failed { hash: None, reason: e.to_string() },
        }
    }

    /// Approves the campaign first when the allowance does not cover `amount`.
    pub async fn contribute<F: FnMut(&TxPhase)>(
        &self,
        eth: Eth<Http>,
        campaign_addr: Address,
        amount: U256,
        on_phase: &mut F,
    ) -> TxPhase {
        let owner = match self.signer() {
            Ok(signer) => signer.address,
            Err(e) => return TxPhase::Failed { hash: None, reason: e.to_string() },
        };
        let allowance = match self.usdc_allowance(eth.clone(), owner, campaign_addr).await {
            Ok(allowance) => allowance,
            Err(e) => return TxPhase::Failed { hash: None, reason: e.to_string() },
        };
        if allowance < amount {
            info!("allowance {} below {}, approving first", allowance, amount);
            let approval = self.approve(eth.clone(), campaign_addr, amount, on_phase).await;
            if !approval.is_confirmed() {
                return approval;
            }
        }
        self.campaign_call(eth, campaign_addr, "contribute", amount, on_phase).await
    }

    /// Parameterless or simple campaign writes: claimTokens, withdrawFunds, refund, ...
    pub async fn campaign_call<P: Tokenize, F: FnMut(&TxPhase)>(
        &self,
        eth: Eth<Http>,
        campaign_addr: Address,
        func: &str,
        params: P,
        on_phase: &mut F,
    ) -> TxPhase {
        match self.campaign(eth.clone(), campaign_addr) {
            Ok(campaign) => self.send(eth, &campaign, func, params, on_phase).await,
            Err(e) => TxPhase::Failed { hash: None, reason: e.to_string() },
        }
    }

    pub async fn create_campaign<F: FnMut(&TxPhase)>(
        &self,
        eth: Eth<Http>,
        params: CreateCampaignParams,
        on_phase: &mut F,
    ) -> TxPhase {
        match self.factory(eth.clone()) {
            Ok(factory) => self.send(eth, &factory, "createCampaign", params, on_phase).await,
            Err(e) => TxPhase::Failed { hash: None, reason: e.to_string() },
        }
    }
}

/// Campaign write actions exposed to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignAction {
    Claim,
    Withdraw,
    Refund,
    CreatePool,
    UpdateState,
}

impl CampaignAction {
    pub fn func_name(&self) -> &'static str {
        match self {
            CampaignAction::Claim => "claimTokens",
            CampaignAction::Withdraw => "withdrawFunds",
            CampaignAction::Refund => "refund",
            CampaignAction::CreatePool => "createLiquidityPool",
            CampaignAction::UpdateState => "updateCampaignState",
        }
    }

    /// Who may send this action in the campaign's current state.
    /// Withdraw and pool creation belong to the creator once the goal is met;
    /// claim and refund belong to backers.
    pub fn check(&self, campaign: &CampaignData, caller: Address) -> Result<()> {
        let is_creator = campaign.creator == caller;
        let allowed = match self {
            CampaignAction::Withdraw | CampaignAction::CreatePool => {
                is_creator && campaign.state == CampaignState::Succeeded
            }
            CampaignAction::Claim => {
                !is_creator
                    && campaign.state == CampaignState::Succeeded
                    && campaign.project_mode() == ProjectMode::Launchpad
            }
            CampaignAction::Refund => !is_creator && campaign.state == CampaignState::Failed,
            CampaignAction::UpdateState => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::NotAllowed(format!(
                "{} on a {} campaign by {}",
                self.func_name(),
                campaign.state,
                if is_creator { "its creator" } else { "a backer" }
            )))
        }
    }
}

/// Contributions need an active, unexpired campaign the caller did not create.
pub fn check_contribute(campaign: &CampaignData, caller: Address, now_secs: u64) -> Result<()> {
    if campaign.state != CampaignState::Active {
        return Err(Error::NotAllowed(format!("campaign is {}", campaign.state)));
    }
    if campaign.is_expired(now_secs) {
        return Err(Error::NotAllowed("campaign deadline has passed".to_string()));
    }
    if campaign.creator == caller {
        return Err(Error::NotAllowed("creators cannot back their own campaign".to_string()));
    }
    Ok(())
}
