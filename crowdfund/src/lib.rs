pub mod abi;
pub mod allocation;
pub mod campaign;
pub mod config;
pub mod contract;
pub mod db;
pub mod error;
pub mod metadata;
pub mod reconcile;
pub mod store;
pub mod utils;

use crate::{
    campaign::{CampaignData, ContributionInfo, CreateCampaignParams},
    config::Config,
    contract::{CampaignAction, CrowdfundContract, Signer, TxPhase},
    error::{Error, Result},
    utils::{extract_keypair_from_str, parse_address},
};
use log::{info, warn};
use reqwest::{Client, Url};
use std::{sync::Arc, time::Duration};
use tokio::runtime::Runtime;
use web3::{
    self,
    transports::Http,
    types::{Address, U256},
};

/// Blocking facade over the async chain adapter.
#[derive(Debug)]
pub struct BlockClient {
    pub web3: Arc<web3::Web3<Http>>,
    pub eth: Arc<web3::api::Eth<Http>>,
    pub contract: CrowdfundContract,
    pub config: Config,
    rt: Runtime,
}

impl BlockClient {
    pub fn setup(config: &Config, timeout: Option<u64>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout.unwrap_or(config.chain.opts.timeout)))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {}", e)))?;
        let url = Url::parse(config.chain.endpoint.as_str())
            .map_err(|e| Error::InvalidConfig(format!("endpoint {}: {}", config.chain.endpoint, e)))?;
        let transport = Http::with_client(client, url);
        let web3 = Arc::new(web3::Web3::new(transport));
        let eth = Arc::new(web3.eth());

        let signer = if config.secret.trim().is_empty() {
            warn!("no secret configured, running read-only");
            None
        } else {
            let (secret, address) = extract_keypair_from_str(&config.secret)?;
            Some(Signer { secret, address })
        };
        let contract = CrowdfundContract {
            factory_addr: parse_address(&config.chain.opts.factory)?,
            usdc_addr: parse_address(&config.chain.opts.usdc)?,
            signer,
            gas: config.chain.opts.gas_limit,
            gas_price: config.chain.opts.gas_price,
            confirmations: config.chain.opts.confirmations,
        };

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            web3,
            eth,
            contract,
            config: config.clone(),
            rt,
        })
    }

    fn eth(&self) -> web3::api::Eth<Http> {
        (*self.eth).clone()
    }

    /// account that signs writes, if any
    pub fn account(&self) -> Option<Address> {
        self.contract.signer.as_ref().map(|s| s.address)
    }

    pub fn chain_id(&self) -> Result<U256> {
        Ok(self.rt.block_on(self.eth.chain_id())?)
    }

    pub fn block_number(&self) -> Result<u64> {
        Ok(self.rt.block_on(self.eth.block_number())?.as_u64())
    }

    /// Fails with `CheckChainErr` when the node serves another chain than configured.
    pub fn check_chain(&self) -> Result<()> {
        let chain_id = self.chain_id()?;
        if chain_id.to_string() != self.config.chain.chain_id {
            return Err(Error::CheckChainErr);
        }
        let campaigns = self.campaign_count()?;
        info!(
            "chain_name:{:?}, chain_id:{:?}, endpoint:{:?}, campaigns_num:{:?}, factory:{:?}",
            self.config.chain.name, chain_id, self.config.chain.endpoint, campaigns, self.config.chain.opts.factory
        );
        Ok(())
    }

    pub fn campaign_count(&self) -> Result<U256> {
        self.rt.block_on(self.contract.campaign_count(self.eth()))
    }

    pub fn campaign(&self, campaign_id: U256) -> Result<CampaignData> {
        self.rt.block_on(self.contract.get_campaign(self.eth(), campaign_id))
    }

    pub fn campaign_address(&self, campaign_id: U256) -> Result<Address> {
        self.rt.block_on(self.contract.campaign_address(self.eth(), campaign_id))
    }

    pub fn campaigns_by_creator(&self, creator: Address) -> Result<Vec<U256>> {
        self.rt.block_on(self.contract.campaigns_by_creator(self.eth(), creator))
    }

    pub fn campaign_details(&self, campaign_addr: Address) -> Result<CampaignData> {
        self.rt.block_on(self.contract.campaign_details(self.eth(), campaign_addr))
    }

    pub fn contribution(&self, campaign_addr: Address, contributor: Address) -> Result<ContributionInfo> {
        self.rt
            .block_on(self.contract.contribution(self.eth(), campaign_addr, contributor))
    }

    pub fn usdc_balance(&self, account: Address) -> Result<U256> {
        self.rt.block_on(self.contract.usdc_balance(self.eth(), account))
    }

    pub fn contribute<F: FnMut(&TxPhase)>(&self, campaign_addr: Address, amount: U256, on_phase: &mut F) -> TxPhase {
        self.rt
            .block_on(self.contract.contribute(self.eth(), campaign_addr, amount, on_phase))
    }

    pub fn campaign_action<F: FnMut(&TxPhase)>(
        &self,
        campaign_addr: Address,
        action: CampaignAction,
        on_phase: &mut F,
    ) -> TxPhase {
        self.rt.block_on(self.contract.campaign_call(
            self.eth(),
            campaign_addr,
            action.func_name(),
            (),
            on_phase,
        ))
    }

    pub fn create_campaign<F: FnMut(&TxPhase)>(&self, params: CreateCampaignParams, on_phase: &mut F) -> TxPhase {
        self.rt
            .block_on(self.contract.create_campaign(self.eth(), params, on_phase))
    }
}
