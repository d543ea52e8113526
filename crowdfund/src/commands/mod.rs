use crate::api;
use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use crowdfund::{
    campaign::{CampaignData, CampaignFilter, CampaignForm, CampaignState},
    config::Config,
    contract::{check_contribute, CampaignAction, TxPhase},
    db::{self, KvStore},
    metadata::ProjectMode,
    reconcile::{self, merge_position},
    store::ReconciliationStore,
    utils::{format_units, get_timestamp, parse_address, parse_units, USDC_DECIMALS},
    BlockClient,
};
use log::{error, info, warn};
use std::{path::PathBuf, thread::sleep, time::Duration};
use web3::types::{Address, U256};

pub type Store = ReconciliationStore<Box<dyn KvStore>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Network {
    Local,
    Base,
    Sepolia,
    Node(String),
}

const LOCAL_URL: &str = "http://localhost:8545";
const BASE_URL: &str = "https://mainnet.base.org";
const SEPOLIA_URL: &str = "https://sepolia.base.org";

impl Network {
    pub fn get_url(&self) -> String {
        match self {
            Network::Local => LOCAL_URL.to_owned(),
            Network::Base => BASE_URL.to_owned(),
            Network::Sepolia => SEPOLIA_URL.to_owned(),
            Network::Node(url) => url.to_owned(),
        }
    }

    pub fn chain_id(&self) -> Option<&'static str> {
        match self {
            Network::Local => Some("31337"),
            Network::Base => Some("8453"),
            Network::Sepolia => Some("84532"),
            Network::Node(_) => None,
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "base" => Ok(Self::Base),
            "sepolia" => Ok(Self::Sepolia),
            network if network.starts_with("node") => {
                let segs: Vec<&str> = network.splitn(2, ',').collect();
                match segs.get(1) {
                    Some(node) if !node.is_empty() => Ok(Self::Node(node.to_string())),
                    _ => Err("Please provide a node".to_owned()),
                }
            }
            _ => Err("Invalid network".to_owned()),
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Config file
    #[clap(short = 'c', long = "config", default_value = "config.json", global = true)]
    pub(crate) config: PathBuf,

    /// override the configured endpoint: local, base, sepolia or node,<url>
    #[clap(long, global = true)]
    pub(crate) network: Option<Network>,

    #[clap(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// List campaigns
    Campaigns {
        /// only campaigns created by this account
        #[clap(long)]
        creator: Option<Address>,
        /// case-insensitive match on name or description
        #[clap(long)]
        search: Option<String>,
        /// active, succeeded or failed
        #[clap(long)]
        state: Option<CampaignState>,
        /// launchpad or classic
        #[clap(long)]
        mode: Option<ProjectMode>,
    },
    /// Show one campaign and your position in it
    Campaign {
        #[clap(long)]
        id: u64,
    },
    /// Poll a campaign and log changes
    Watch {
        #[clap(long)]
        id: u64,
        /// also poke `updateCampaignState` periodically
        #[clap(long)]
        refresh_state: bool,
        /// stop after this many polls
        #[clap(long)]
        rounds: Option<u64>,
    },
    /// Contribute stablecoin to a campaign, approving first if needed
    Contribute {
        #[clap(long)]
        id: u64,
        /// human units, e.g. 12.5
        #[clap(long)]
        amount: String,
    },
    /// Claim tokens of a succeeded launchpad campaign
    Claim {
        #[clap(long)]
        id: u64,
    },
    /// Get your contribution back from a failed campaign
    Refund {
        #[clap(long)]
        id: u64,
    },
    /// Withdraw raised funds (creator)
    Withdraw {
        #[clap(long)]
        id: u64,
    },
    /// Create the liquidity pool of a succeeded launchpad campaign (creator)
    CreatePool {
        #[clap(long)]
        id: u64,
    },
    /// Create a new campaign
    CreateCampaign {
        #[clap(long)]
        name: String,
        /// funding goal in stablecoin units
        #[clap(long)]
        goal: String,
        /// campaign length in days
        #[clap(long)]
        days: u64,
        #[clap(long, default_value = "classic")]
        mode: ProjectMode,
        #[clap(long)]
        description: String,
        #[clap(long, default_value_t = 45)]
        liquidity: u8,
        #[clap(long, default_value = "")]
        token_name: String,
        #[clap(long, default_value = "")]
        token_symbol: String,
        #[clap(long, default_value = "")]
        image: String,
    },
    /// Merge chain data with local records for an account
    Portfolio {
        #[clap(long)]
        account: Option<String>,
    },
    /// Dump the locally cached records of an account
    Records {
        #[clap(long)]
        account: Option<String>,
    },
    /// Serve the local records over http
    Serve,
    /// Print the default config
    ShowConfig,
}

fn deadline_after_days(now_secs: u64, days: u64) -> anyhow::Result<u64> {
    days.checked_mul(24 * 60 * 60)
        .and_then(|secs| secs.checked_add(now_secs))
        .with_context(|| format!("{} days is out of range", days))
}

fn now_secs() -> u64 {
    (get_timestamp() / 1000).max(0) as u64
}

fn fmt_time(secs: U256) -> String {
    i64::try_from(secs.low_u64())
        .ok()
        .and_then(|s| NaiveDateTime::from_timestamp_opt(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn log_phase(phase: &TxPhase) {
    match phase {
        TxPhase::Failed { .. } => error!("{}", phase),
        _ => info!("{}", phase),
    }
}

fn print_campaign(id: u64, campaign: &CampaignData) {
    let meta = campaign.metadata();
    println!(
        "#{} {} [{}|{}] {} / {} USDC ({:.1}%) deadline {}",
        id,
        campaign.name,
        campaign.state,
        meta.project_mode,
        format_units(campaign.total_raised, USDC_DECIMALS),
        format_units(campaign.funding_goal, USDC_DECIMALS),
        campaign.progress(),
        fmt_time(campaign.deadline),
    );
}

impl Cli {
    pub(crate) fn parse_args() -> Self {
        Cli::parse()
    }

    pub(crate) fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = if self.config.exists() {
            Config::parse_from_file(&self.config).with_context(|| format!("reading {:?}", self.config))?
        } else {
            warn!("{:?} not found, using default config", self.config);
            Config::default()
        };
        if let Some(network) = &self.network {
            config.chain.endpoint = network.get_url();
            if let Some(chain_id) = network.chain_id() {
                config.chain.chain_id = chain_id.to_string();
            }
        }
        Ok(config)
    }

    pub(crate) fn run(self) -> anyhow::Result<()> {
        if let Commands::ShowConfig = self.command {
            println!("{}", Config::show()?);
            return Ok(());
        }
        let config = self.load_config()?;
        let store: Store = ReconciliationStore::new(db::open(&config.storage)?);

        match self.command {
            Commands::Records { account } => Self::records_cmd(&config, &store, account),
            Commands::Serve => api::serve(&config.http_listen, store),
            command => {
                let client = BlockClient::setup(&config, None)?;
                client.check_chain()?;
                Self::chain_cmd(&client, &store, command)
            }
        }
    }

    fn chain_cmd(client: &BlockClient, store: &Store, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Campaigns {
                creator,
                search,
                state,
                mode,
            } => Self::campaigns_cmd(client, creator, &CampaignFilter { search, state, mode }),
            Commands::Campaign { id } => Self::campaign_cmd(client, store, id),
            Commands::Watch { id, refresh_state, rounds } => Self::watch_cmd(client, id, refresh_state, rounds),
            Commands::Contribute { id, amount } => Self::contribute_cmd(client, store, id, &amount),
            Commands::Claim { id } => Self::action_cmd(client, store, id, CampaignAction::Claim),
            Commands::Refund { id } => Self::action_cmd(client, store, id, CampaignAction::Refund),
            Commands::Withdraw { id } => Self::action_cmd(client, store, id, CampaignAction::Withdraw),
            Commands::CreatePool { id } => Self::action_cmd(client, store, id, CampaignAction::CreatePool),
            Commands::CreateCampaign {
                name,
                goal,
                days,
                mode,
                description,
                liquidity,
                token_name,
                token_symbol,
                image,
            } => {
                let now = now_secs();
                let form = CampaignForm {
                    project_mode: mode,
                    project_name: name,
                    deadline: deadline_after_days(now, days)?,
                    fundraising_goal: goal,
                    token_name,
                    token_symbol,
                    liquidity_pool_percentage: liquidity,
                    project_introduction: description,
                    image,
                };
                let params = form.into_params(now)?;
                let hash = client.create_campaign(params, &mut log_phase).into_result()?;
                println!("campaign created in {:?}", hash);
                Ok(())
            }
            Commands::Portfolio { account } => Self::portfolio_cmd(client, store, account),
            Commands::Records { .. } | Commands::Serve | Commands::ShowConfig => unreachable!(),
        }
    }

    fn campaigns_cmd(client: &BlockClient, creator: Option<Address>, filter: &CampaignFilter) -> anyhow::Result<()> {
        let ids: Vec<u64> = match creator {
            Some(creator) => client
                .campaigns_by_creator(creator)?
                .into_iter()
                .map(|id| id.low_u64())
                .collect(),
            None => (0..client.campaign_count()?.low_u64()).collect(),
        };
        let mut shown = 0;
        for id in ids {
            // one unreadable campaign must not hide the rest
            match client.campaign(U256::from(id)) {
                Ok(campaign) if filter.matches(&campaign) => {
                    print_campaign(id, &campaign);
                    shown += 1;
                }
                Ok(_) => {}
                Err(e) => println!("#{} unavailable: {}", id, e),
            }
        }
        if shown == 0 {
            println!("no campaigns");
        }
        Ok(())
    }

    fn campaign_cmd(client: &BlockClient, store: &Store, id: u64) -> anyhow::Result<()> {
        let addr = client.campaign_address(U256::from(id))?;
        let campaign = client.campaign_details(addr)?;
        print_campaign(id, &campaign);
        let meta = campaign.metadata();
        println!("  {}", meta.description);
        println!(
            "  creator {:?}, token {:?}, reserve {}%, liquidity {}%",
            campaign.creator, campaign.token_address, campaign.creator_reserve_percentage, campaign.liquidity_percentage
        );
        if let Some(account) = client.account() {
            let chain = client
                .contribution(addr, account)
                .map_err(|e| warn!("contribution unavailable: {}", e))
                .ok();
            let local = store.read(&format!("{:?}", account));
            let pos = merge_position(&id.to_string(), &campaign, &local, chain.as_ref());
            println!(
                "  you: {} USDC, {} tokens{}{}",
                pos.contributed,
                pos.tokens,
                if pos.tokens_estimated { " (estimate)" } else { "" },
                if pos.claimed { ", claimed" } else { "" }
            );
        }
        Ok(())
    }

    fn watch_cmd(client: &BlockClient, id: u64, refresh_state: bool, rounds: Option<u64>) -> anyhow::Result<()> {
        let addr = client.campaign_address(U256::from(id))?;
        let opts = &client.config.chain.opts;
        let poll = Duration::from_secs(opts.poll_interval);
        let refresh_every = (opts.state_refresh_interval / opts.poll_interval).max(1);
        if refresh_state && client.account().is_none() {
            bail!("--refresh-state needs a configured secret");
        }

        let mut last: Option<CampaignData> = None;
        let mut round = 0u64;
        loop {
            if refresh_state && round % refresh_every == 0 {
                client.campaign_action(addr, CampaignAction::UpdateState, &mut log_phase);
            }
            match client.campaign_details(addr) {
                Ok(campaign) => {
                    if last.as_ref() != Some(&campaign) {
                        if let Some(prev) = &last {
                            if prev.state != campaign.state {
                                info!("campaign {} moved {} -> {}", id, prev.state, campaign.state);
                            }
                        }
                        print_campaign(id, &campaign);
                        last = Some(campaign);
                    }
                }
                Err(e) => warn!("poll of campaign {} failed, keeping last view: {}", id, e),
            }
            round += 1;
            if rounds.map_or(false, |max| round >= max) {
                break;
            }
            sleep(poll);
        }
        Ok(())
    }

    fn signer(client: &BlockClient) -> anyhow::Result<Address> {
        match client.account() {
            Some(account) => Ok(account),
            None => bail!("this command needs a configured secret"),
        }
    }

    fn contribute_cmd(client: &BlockClient, store: &Store, id: u64, amount: &str) -> anyhow::Result<()> {
        let signer = Self::signer(client)?;
        let account = format!("{:?}", signer);
        let addr = client.campaign_address(U256::from(id))?;
        let campaign = client.campaign_details(addr)?;
        check_contribute(&campaign, signer, now_secs()).with_context(|| format!("campaign {}", id))?;
        let base_units = parse_units(amount, USDC_DECIMALS)?;
        if base_units.is_zero() {
            bail!("amount must be positive");
        }

        let phase = client.contribute(addr, base_units, &mut log_phase);
        let hash = phase.into_result()?;
        // the chain accepted it; a local cache failure is only worth a warning
        if let Err(e) =
            reconcile::on_contribution_confirmed(store, &account, &id.to_string(), &campaign, amount, &format!("{:?}", hash))
        {
            warn!("contribution confirmed but not cached locally: {}", e);
        }
        println!("contributed {} USDC to #{} in {:?}", amount, id, hash);
        Ok(())
    }

    fn action_cmd(client: &BlockClient, store: &Store, id: u64, action: CampaignAction) -> anyhow::Result<()> {
        let signer = Self::signer(client)?;
        let account = format!("{:?}", signer);
        let addr = client.campaign_address(U256::from(id))?;
        let campaign = client.campaign_details(addr)?;
        action.check(&campaign, signer).with_context(|| format!("campaign {}", id))?;
        let hash = client.campaign_action(addr, action, &mut log_phase).into_result()?;
        if action == CampaignAction::Claim {
            if let Err(e) = reconcile::on_claim_confirmed(store, &account, &id.to_string(), &format!("{:?}", hash)) {
                warn!("claim confirmed but not cached locally: {}", e);
            }
        }
        println!("{} on #{} confirmed in {:?}", action.func_name(), id, hash);
        Ok(())
    }

    fn resolve_account(client: Option<&BlockClient>, account: Option<String>) -> anyhow::Result<String> {
        match (account, client.and_then(|c| c.account())) {
            (Some(account), _) => Ok(format!("{:?}", parse_address(&account)?)),
            (None, Some(addr)) => Ok(format!("{:?}", addr)),
            (None, None) => bail!("pass --account or configure a secret"),
        }
    }

    fn portfolio_cmd(client: &BlockClient, store: &Store, account: Option<String>) -> anyhow::Result<()> {
        let account = Self::resolve_account(Some(client), account)?;
        let contributor = parse_address(&account)?;
        let local = store.read(&account);

        let mut ids: Vec<String> = store.contributed_campaign_ids(&account).into_iter().collect();
        for token in &local.tokens {
            if !ids.contains(&token.campaign_id) {
                ids.push(token.campaign_id.clone());
            }
        }
        ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
        if ids.is_empty() {
            println!("no recorded contributions for {}", account);
        }

        if let Ok(balance) = client.usdc_balance(contributor) {
            println!("USDC balance: {}", format_units(balance, USDC_DECIMALS));
        }
        for id in ids {
            let campaign_id = match U256::from_dec_str(&id) {
                Ok(campaign_id) => campaign_id,
                Err(_) => {
                    warn!("skipping malformed campaign id {:?}", id);
                    continue;
                }
            };
            let fetched = client
                .campaign_address(campaign_id)
                .and_then(|addr| Ok((addr, client.campaign_details(addr)?)));
            let (addr, campaign) = match fetched {
                Ok(fetched) => fetched,
                Err(e) => {
                    println!("#{} unavailable: {} (local total {} USDC)", id, e, store.total_contribution(&account, &id));
                    continue;
                }
            };
            let chain = client
                .contribution(addr, contributor)
                .map_err(|e| warn!("contribution of #{} unavailable: {}", id, e))
                .ok();
            let pos = merge_position(&id, &campaign, &local, chain.as_ref());
            let hint = if pos.can_claim() {
                " -> claimable"
            } else if pos.can_refund() {
                " -> refundable"
            } else {
                ""
            };
            println!(
                "#{} {} [{}] {} USDC, {} tokens{}{}{}",
                pos.campaign_id,
                pos.campaign_name,
                pos.state,
                pos.contributed,
                pos.tokens,
                if pos.tokens_estimated { " (estimate)" } else { "" },
                if pos.claimed { ", claimed" } else { "" },
                hint
            );
        }
        Ok(())
    }

    fn records_cmd(config: &Config, store: &Store, account: Option<String>) -> anyhow::Result<()> {
        let client = if account.is_none() && !config.secret.trim().is_empty() {
            Some(BlockClient::setup(config, None)?)
        } else {
            None
        };
        let account = Self::resolve_account(client.as_ref(), account)?;
        let record = store.try_read(&account)?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_from_str() {
        assert_eq!("base".parse::<Network>().unwrap(), Network::Base);
        assert_eq!(
            "node,http://10.0.0.1:8545".parse::<Network>().unwrap(),
            Network::Node("http://10.0.0.1:8545".to_string())
        );
        assert!("node".parse::<Network>().is_err());
        assert!("mainnet".parse::<Network>().is_err());
        assert_eq!(Network::Sepolia.chain_id(), Some("84532"));
        assert_eq!(Network::Local.get_url(), LOCAL_URL);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["crowdfund", "contribute", "--id", "3", "--amount", "12.5"]).unwrap();
        assert!(matches!(cli.command, Commands::Contribute { id: 3, ref amount } if amount == "12.5"));

        let cli = Cli::try_parse_from(["crowdfund", "--network", "sepolia", "watch", "--id", "1", "--refresh-state"])
            .unwrap();
        assert_eq!(cli.network, Some(Network::Sepolia));
        assert!(matches!(cli.command, Commands::Watch { id: 1, refresh_state: true, rounds: None }));

        let cli = Cli::try_parse_from(["crowdfund", "create-campaign", "--name", "n", "--goal", "100", "--days", "3",
            "--mode", "launchpad", "--description", "d"])
        .unwrap();
        assert!(matches!(cli.command, Commands::CreateCampaign { mode: ProjectMode::Launchpad, liquidity: 45, .. }));
    }

    #[test]
    fn test_network_overrides_config() {
        let cli = Cli::try_parse_from(["crowdfund", "-c", "/nonexistent/config.json", "--network", "local", "serve"])
            .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.chain.endpoint, LOCAL_URL);
        assert_eq!(config.chain.chain_id, "31337");
    }

    #[test]
    fn test_resolve_account_normalizes() {
        let account =
            Cli::resolve_account(None, Some("0x0bD88C32D195DE9De26127704FCeB7458E0094f9".to_string())).unwrap();
        assert_eq!(account, "0x0bd88c32d195de9de26127704fceb7458e0094f9");
        assert!(Cli::resolve_account(None, None).is_err());
    }

    #[test]
    fn test_deadline_after_days() {
        assert_eq!(deadline_after_days(1_000, 2).unwrap(), 1_000 + 2 * 86_400);
        assert!(deadline_after_days(1_000, 18_446_744_073_709_551).is_err());
        assert!(deadline_after_days(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_campaigns_filter_args() {
        let cli = Cli::try_parse_from(["crowdfund", "campaigns", "--search", "solar", "--state", "failed", "--mode",
            "classic"])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Campaigns {
                creator: None,
                search: Some(ref s),
                state: Some(CampaignState::Failed),
                mode: Some(ProjectMode::Classic),
            } if s == "solar"
        ));
    }

    #[test]
    fn test_fmt_time() {
        assert_eq!(fmt_time(U256::from(0u64)), "1970-01-01 00:00:00");
    }
}
