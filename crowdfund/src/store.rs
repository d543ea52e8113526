//! Durable per-address bookkeeping of contributions and token allocations.
//!
//! Every address lives inside one JSON object stored under [`STORAGE_KEY`],
//! keyed by the lowercased address. Mutations are full read-modify-write
//! cycles of that object, serialized through an in-process lock.

use crate::{
    db::KvStore,
    error::{Error, Result},
    utils::{format_amount, get_timestamp, normalize_address, parse_amount},
};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Mutex,
};

pub const STORAGE_KEY: &str = "crowdfunding_user_data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRecord {
    pub campaign_id: String,
    pub amount: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub campaign_id: String,
    pub campaign_name: String,
    pub token_address: String,
    pub token_amount: String,
    pub contribution_amount: String,
    pub claimed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub address: String,
    #[serde(default)]
    pub contributions: Vec<ContributionRecord>,
    #[serde(default)]
    pub tokens: Vec<TokenRecord>,
}

impl UserRecord {
    pub fn empty(address: &str) -> Self {
        Self {
            address: address.to_string(),
            contributions: Vec::new(),
            tokens: Vec::new(),
        }
    }

    pub fn token(&self, campaign_id: &str) -> Option<&TokenRecord> {
        self.tokens.iter().find(|t| t.campaign_id == campaign_id)
    }

    /// Sum of recorded contribution amounts for one campaign.
    pub fn total_for(&self, campaign_id: &str) -> f64 {
        self.contributions
            .iter()
            .filter(|c| c.campaign_id == campaign_id)
            .map(|c| stored_amount(&c.amount))
            .fold(0.0, |acc, v| acc + v)
    }
}

type Blob = BTreeMap<String, UserRecord>;

// values already on disk may carry exponents such as "1e+21"
fn stored_amount(amount: &str) -> f64 {
    match amount.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => {
            warn!("ignoring unparsable stored amount {:?}", amount);
            0.0
        }
    }
}

pub struct ReconciliationStore<S: KvStore> {
    backend: S,
    write_lock: Mutex<()>,
}

impl<S: KvStore> ReconciliationStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    fn load_blob(&self) -> Result<Blob> {
        match self.backend.get(STORAGE_KEY)? {
            None => Ok(Blob::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::Corrupt(e.to_string())),
        }
    }

    /// Returns the stored record, surfacing storage failures.
    pub fn try_read(&self, address: &str) -> Result<UserRecord> {
        let blob = self.load_blob()?;
        Ok(blob
            .get(&normalize_address(address))
            .cloned()
            .unwrap_or_else(|| UserRecord::empty(address)))
    }

    /// Never fails: unreadable storage reads as an empty record.
    pub fn read(&self, address: &str) -> UserRecord {
        self.try_read(address).unwrap_or_else(|e| {
            warn!("reading user data for {} failed, using empty record: {}", address, e);
            UserRecord::empty(address)
        })
    }

    fn update<F>(&self, address: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut UserRecord) -> bool,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| Error::Unknown(format!("store lock poisoned: {}", e)))?;

        let mut blob = self.load_blob().map_err(|e| {
            error!("loading user data failed, nothing written: {}", e);
            e
        })?;
        let key = normalize_address(address);
        let mut record = blob.get(&key).cloned().unwrap_or_else(|| UserRecord::empty(address));
        if !f(&mut record) {
            return Ok(());
        }
        blob.insert(key, record);

        let raw = serde_json::to_string(&blob)?;
        self.backend.set(STORAGE_KEY, &raw).map_err(|e| {
            error!("saving user data failed: {}", e);
            e
        })
    }

    /// Upserts a contribution keyed by `(campaign_id, tx_hash)`.
    pub fn record_contribution(
        &self,
        address: &str,
        campaign_id: &str,
        amount: &str,
        tx_hash: Option<&str>,
    ) -> Result<()> {
        parse_amount(amount)?;
        let contribution = ContributionRecord {
            campaign_id: campaign_id.to_string(),
            amount: amount.trim().to_string(),
            timestamp: get_timestamp(),
            tx_hash: tx_hash.map(str::to_string),
        };
        self.update(address, |record| {
            let existing = record
                .contributions
                .iter_mut()
                .find(|c| c.campaign_id == campaign_id && c.tx_hash.as_deref() == tx_hash);
            match existing {
                Some(slot) => *slot = contribution,
                None => record.contributions.push(contribution),
            }
            true
        })
    }

    /// Upserts the token allocation for a campaign; repeated calls accumulate.
    pub fn record_token_allocation(
        &self,
        address: &str,
        campaign_id: &str,
        campaign_name: &str,
        token_address: &str,
        token_amount: &str,
        contribution_amount: &str,
    ) -> Result<()> {
        let add_tokens = parse_amount(token_amount)?;
        let add_contribution = parse_amount(contribution_amount)?;
        self.update(address, |record| {
            match record.tokens.iter_mut().find(|t| t.campaign_id == campaign_id) {
                Some(token) => {
                    token.token_amount = format_amount(stored_amount(&token.token_amount) + add_tokens);
                    token.contribution_amount =
                        format_amount(stored_amount(&token.contribution_amount) + add_contribution);
                }
                None => record.tokens.push(TokenRecord {
                    campaign_id: campaign_id.to_string(),
                    campaign_name: campaign_name.to_string(),
                    token_address: token_address.to_string(),
                    token_amount: token_amount.trim().to_string(),
                    contribution_amount: contribution_amount.trim().to_string(),
                    claimed: false,
                    claim_tx_hash: None,
                }),
            }
            true
        })
    }

    /// Marks a campaign's tokens claimed; a missing allocation is skipped.
    pub fn mark_claimed(&self, address: &str, campaign_id: &str, claim_tx_hash: Option<&str>) -> Result<()> {
        self.update(address, |record| {
            match record.tokens.iter_mut().find(|t| t.campaign_id == campaign_id) {
                Some(token) => {
                    token.claimed = true;
                    if let Some(hash) = claim_tx_hash {
                        token.claim_tx_hash = Some(hash.to_string());
                    }
                    true
                }
                None => {
                    log::debug!("no token record for campaign {}, claim not recorded", campaign_id);
                    false
                }
            }
        })
    }

    pub fn contributed_campaign_ids(&self, address: &str) -> HashSet<String> {
        self.read(address)
            .contributions
            .into_iter()
            .map(|c| c.campaign_id)
            .collect()
    }

    pub fn total_contribution(&self, address: &str, campaign_id: &str) -> String {
        format_amount(self.read(address).total_for(campaign_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use std::sync::Arc;

    const ADDR: &str = "0xAbC0000000000000000000000000000000000001";

    fn store() -> ReconciliationStore<MemoryStore> {
        ReconciliationStore::new(MemoryStore::default())
    }

    fn raw_blob(store: &ReconciliationStore<MemoryStore>) -> Option<String> {
        store.backend().get(STORAGE_KEY).unwrap()
    }

    #[test]
    fn test_read_unknown_address_is_empty() {
        let store = store();
        assert_eq!(store.read(ADDR), UserRecord::empty(ADDR));
        assert_eq!(raw_blob(&store), None);
    }

    #[test]
    fn test_record_contribution_idempotent_per_tx() {
        let store = store();
        store.record_contribution(ADDR, "5", "100", Some("0xabc")).unwrap();
        store.record_contribution(ADDR, "5", "100", Some("0xabc")).unwrap();
        let record = store.read(ADDR);
        assert_eq!(record.contributions.len(), 1);
        assert_eq!(record.contributions[0].amount, "100");
        assert_eq!(record.contributions[0].tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_record_contribution_replaces_in_place() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", Some("0x1")).unwrap();
        store.record_contribution(ADDR, "2", "20", Some("0x2")).unwrap();
        store.record_contribution(ADDR, "1", "11", Some("0x1")).unwrap();
        let record = store.read(ADDR);
        let amounts: Vec<_> = record.contributions.iter().map(|c| c.amount.as_str()).collect();
        assert_eq!(amounts, vec!["11", "20"]);
    }

    #[test]
    fn test_same_campaign_other_tx_appends() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", Some("0x1")).unwrap();
        store.record_contribution(ADDR, "1", "15", Some("0x2")).unwrap();
        store.record_contribution(ADDR, "1", "5", None).unwrap();
        store.record_contribution(ADDR, "1", "6", None).unwrap();
        let record = store.read(ADDR);
        assert_eq!(record.contributions.len(), 3);
        assert_eq!(record.contributions[2].amount, "6");
        assert_eq!(record.contributions[2].tx_hash, None);
    }

    #[test]
    fn test_invalid_amount_writes_nothing() {
        let store = store();
        let res = store.record_contribution(ADDR, "1", "-4", None);
        assert!(matches!(res, Err(Error::InvalidAmount(_))));
        let res = store.record_token_allocation(ADDR, "1", "Camp", "0xTok", "abc", "1");
        assert!(matches!(res, Err(Error::InvalidAmount(_))));
        assert_eq!(raw_blob(&store), None);
    }

    #[test]
    fn test_token_allocation_accumulates() {
        let store = store();
        store.record_token_allocation(ADDR, "5", "Camp", "0xTok", "100", "100").unwrap();
        store.record_token_allocation(ADDR, "5", "Camp", "0xTok", "50", "50").unwrap();
        let record = store.read(ADDR);
        assert_eq!(record.tokens.len(), 1);
        let token = &record.tokens[0];
        assert_eq!(token.token_amount, "150");
        assert_eq!(token.contribution_amount, "150");
        assert!(!token.claimed);
    }

    #[test]
    fn test_claim_is_monotonic() {
        let store = store();
        store.record_token_allocation(ADDR, "5", "Camp", "0xTok", "100", "100").unwrap();
        store.mark_claimed(ADDR, "5", Some("0xhash")).unwrap();
        store.record_token_allocation(ADDR, "5", "Camp", "0xTok", "1", "1").unwrap();
        store.record_contribution(ADDR, "5", "1", Some("0xother")).unwrap();
        let token = store.read(ADDR).token("5").cloned().unwrap();
        assert!(token.claimed);
        assert_eq!(token.claim_tx_hash.as_deref(), Some("0xhash"));
        assert_eq!(token.token_amount, "101");
    }

    #[test]
    fn test_claim_without_hash_keeps_previous_hash() {
        let store = store();
        store.record_token_allocation(ADDR, "5", "Camp", "0xTok", "1", "1").unwrap();
        store.mark_claimed(ADDR, "5", Some("0xfirst")).unwrap();
        store.mark_claimed(ADDR, "5", None).unwrap();
        let token = store.read(ADDR).token("5").cloned().unwrap();
        assert_eq!(token.claim_tx_hash.as_deref(), Some("0xfirst"));
    }

    #[test]
    fn test_claim_without_allocation_is_noop() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", None).unwrap();
        let before = raw_blob(&store);
        store.mark_claimed(ADDR, "9", Some("0xhash")).unwrap();
        assert_eq!(raw_blob(&store), before);

        let fresh = self::store();
        fresh.mark_claimed(ADDR, "9", None).unwrap();
        assert_eq!(raw_blob(&fresh), None);
    }

    #[test]
    fn test_contributed_campaign_ids_dedup() {
        let store = store();
        store.record_contribution(ADDR, "1", "1", Some("0xa")).unwrap();
        store.record_contribution(ADDR, "2", "1", Some("0xb")).unwrap();
        store.record_contribution(ADDR, "1", "1", Some("0xc")).unwrap();
        let ids = store.contributed_campaign_ids(ADDR);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1") && ids.contains("2"));
    }

    #[test]
    fn test_total_contribution() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", Some("0xa")).unwrap();
        store.record_contribution(ADDR, "1", "15", Some("0xb")).unwrap();
        store.record_contribution(ADDR, "2", "99", Some("0xc")).unwrap();
        assert_eq!(store.total_contribution(ADDR, "1"), "25");
        assert_eq!(store.total_contribution(ADDR, "3"), "0");
    }

    #[test]
    fn test_total_without_contributions_is_zero() {
        let store = store();
        assert_eq!(store.total_contribution("0x00000000000000000000000000000000000000ff", "1"), "0");
        store.record_contribution(ADDR, "1", "10", Some("0xa")).unwrap();
        assert_eq!(store.total_contribution(ADDR, "2"), "0");
        assert_eq!(format_amount(store.read(ADDR).total_for("2")), "0");
    }

    #[test]
    fn test_stored_exponent_amounts_accumulate() {
        let store = store();
        let raw = r#"{"0xabc":{"address":"0xabc","contributions":[
            {"campaignId":"3","amount":"1e+21","timestamp":1}],
            "tokens":[{"campaignId":"3","campaignName":"C","tokenAddress":"0xT",
            "tokenAmount":"1e+21","claimed":false,"contributionAmount":"2"}]}}"#;
        store.backend().set(STORAGE_KEY, raw).unwrap();
        assert_eq!(store.total_contribution("0xabc", "3"), "1000000000000000000000");

        store
            .record_token_allocation("0xabc", "3", "C", "0xT", "1000000000000000000000", "3")
            .unwrap();
        let token = store.read("0xabc").token("3").cloned().unwrap();
        assert_eq!(token.token_amount, "2000000000000000000000");
        assert_eq!(token.contribution_amount, "5");
    }

    #[test]
    fn test_address_is_case_insensitive() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", None).unwrap();
        let lower = ADDR.to_lowercase();
        assert_eq!(store.read(&lower).contributions.len(), 1);
        assert_eq!(store.total_contribution(&ADDR.to_uppercase(), "1"), "10");
        let raw = raw_blob(&store).unwrap();
        assert!(raw.contains(&format!("\"{}\"", lower)));
    }

    #[test]
    fn test_addresses_are_isolated() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", None).unwrap();
        store.record_contribution("0xdef", "1", "3", None).unwrap();
        assert_eq!(store.total_contribution(ADDR, "1"), "10");
        assert_eq!(store.total_contribution("0xdef", "1"), "3");
    }

    #[test]
    fn test_corrupt_blob_fails_open_and_is_not_overwritten() {
        let store = store();
        store.backend().set(STORAGE_KEY, "{not json").unwrap();
        assert_eq!(store.read(ADDR), UserRecord::empty(ADDR));
        assert!(matches!(store.try_read(ADDR), Err(Error::Corrupt(_))));
        let res = store.record_contribution(ADDR, "1", "10", None);
        assert!(matches!(res, Err(Error::Corrupt(_))));
        assert_eq!(raw_blob(&store).as_deref(), Some("{not json"));
    }

    #[test]
    fn test_reads_existing_wire_format() {
        let store = store();
        let raw = r#"{"0xabc":{"address":"0xABC","contributions":[
            {"campaignId":"3","amount":"12.5","timestamp":1700000000000,"txHash":"0x1"},
            {"campaignId":"3","amount":"7.5","timestamp":1700000000001}],
            "tokens":[{"campaignId":"3","campaignName":"C","tokenAddress":"0xT",
            "tokenAmount":"1000","claimed":false,"contributionAmount":"20"}]}}"#;
        store.backend().set(STORAGE_KEY, raw).unwrap();
        let record = store.read("0xABC");
        assert_eq!(record.contributions[1].tx_hash, None);
        assert_eq!(store.total_contribution("0xabc", "3"), "20");
        assert_eq!(record.token("3").unwrap().claim_tx_hash, None);
    }

    #[test]
    fn test_optional_fields_omitted_when_absent() {
        let store = store();
        store.record_contribution(ADDR, "1", "10", None).unwrap();
        store.record_token_allocation(ADDR, "1", "Camp", "0xTok", "1", "10").unwrap();
        let raw = raw_blob(&store).unwrap();
        assert!(!raw.contains("txHash"));
        assert!(!raw.contains("claimTxHash"));
        assert!(raw.contains("\"campaignId\":\"1\""));
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_updates() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        let hash = format!("0x{}-{}", i, j);
                        store.record_contribution(ADDR, "1", "1", Some(&hash)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.read(ADDR).contributions.len(), 80);
        assert_eq!(store.total_contribution(ADDR, "1"), "80");
    }

    struct BrokenStore;

    impl KvStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded")))
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        let store = ReconciliationStore::new(BrokenStore);
        let res = store.record_contribution(ADDR, "1", "10", None);
        assert!(matches!(res, Err(Error::Io(_))));
        assert_eq!(store.read(ADDR), UserRecord::empty(ADDR));
    }
}
