use crate::source::{fetch, JsonSource, Request};
use crate::types::{ConsensusPubkey, Height, RawAddress};
use anyhow::{bail, Context};
use itertools::Itertools;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

pub const STAKING_VALIDATORS_PATH: &str = "/cosmos/staking/v1beta1/validators";
pub const CONSUMER_CHAINS_PATH: &str = "/interchain_security/ccv/provider/consumer_chains";
pub const BLOCK_HEIGHT_HEADER: &str = "x-cosmos-block-height";

// Nodes report counters either as JSON numbers or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Counter {
    Number(u64),
    Text(String),
}

impl Counter {
    fn value<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Counter::Number(value) => Ok(value),
            Counter::Text(text) => text.parse().map_err(E::custom),
        }
    }
}

fn counter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Counter::deserialize(deserializer)?.value()
}

fn optional_counter<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<Counter>::deserialize(deserializer)?
        .map(Counter::value)
        .transpose()
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block: Block,
}

#[derive(Debug, Deserialize)]
struct Block {
    header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    #[serde(deserialize_with = "counter")]
    height: u64,
}

#[derive(Debug, Deserialize)]
struct RpcValidatorsPage {
    #[serde(deserialize_with = "counter")]
    count: u64,
    #[serde(deserialize_with = "counter")]
    total: u64,
    validators: Vec<RpcValidator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RpcValidator {
    pub address: RawAddress,
    pub pub_key: RpcPubKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RpcPubKey {
    pub value: ConsensusPubkey,
}

#[derive(Debug, Deserialize)]
struct ApiValidatorsPage {
    validators: Vec<ApiValidator>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next_key: Option<String>,
    #[serde(default, deserialize_with = "optional_counter")]
    total: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiValidator {
    pub operator_address: String,
    pub consensus_pubkey: ApiPubKey,
    #[serde(default)]
    pub jailed: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: Description,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiPubKey {
    pub key: ConsensusPubkey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub moniker: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorSetPage {
    #[serde(deserialize_with = "counter")]
    total: u64,
    validators: Vec<SetValidator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SetValidator {
    pub address: String,
    pub pub_key: SetPubKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SetPubKey {
    #[serde(alias = "value")]
    pub key: ConsensusPubkey,
}

#[derive(Debug, Deserialize)]
struct ConsumerChains {
    #[serde(default)]
    chains: Vec<ConsumerChain>,
}

#[derive(Debug, Deserialize)]
struct ConsumerChain {
    chain_id: String,
}

fn dedup_by_pubkey<T>(
    records: Vec<T>,
    pubkey: impl Fn(&T) -> &ConsensusPubkey,
    source: &str,
) -> Vec<T> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = pubkey(record);
            if seen.insert(key.clone()) {
                true
            } else {
                tracing::warn!("{} returned {} more than once, dropping repeat", source, key);
                false
            }
        })
        .collect()
}

/// Resolves the snapshot height through `/block`. A pinned height is echoed
/// back by the node, which also confirms it is still available.
pub async fn resolve_height(rpc: &dyn JsonSource, height: Height) -> anyhow::Result<u64> {
    let mut request = Request::new("/block");
    if let Height::At(height) = height {
        request = request.query("height", height.to_string());
    }
    let response: RpcEnvelope<BlockResult> = fetch(rpc, &request)
        .await
        .with_context(|| format!("Failed to get block at height {height}"))?;
    Ok(response.result.block.header.height)
}

/// Consensus RPC `/validators`, paged by page number until the running count
/// reaches the reported total.
pub async fn collect_rpc_validators(
    rpc: &dyn JsonSource,
    height: Height,
) -> anyhow::Result<Vec<RpcValidator>> {
    let mut page: u64 = 1;
    let mut received: u64 = 0;
    let mut validators = vec![];
    loop {
        let mut request = Request::new("/validators").query("page", page.to_string());
        if let Height::At(height) = height {
            request = request.query("height", height.to_string());
        }
        let response: RpcEnvelope<RpcValidatorsPage> = fetch(rpc, &request)
            .await
            .with_context(|| format!("Failed to get RPC validators page {page}"))?;
        let result = response.result;
        tracing::debug!(
            "RPC validators page {}: {} of {}",
            page,
            result.count,
            result.total
        );

        received += result.count;
        validators.extend(result.validators);
        if received >= result.total {
            break;
        }
        if result.count == 0 {
            bail!(
                "RPC validators page {} was empty with {} of {} received",
                page,
                received,
                result.total
            );
        }
        page += 1;
    }

    tracing::info!("Collected {} validators via RPC", validators.len());
    Ok(dedup_by_pubkey(validators, |v| &v.pub_key.value, "RPC"))
}

/// Staking module validators, paged by opaque continuation key.
pub async fn collect_api_validators(
    api: &dyn JsonSource,
    height: Height,
    page_limit: u64,
) -> anyhow::Result<Vec<ApiValidator>> {
    let mut next_key: Option<String> = None;
    let mut sent_keys = HashSet::new();
    let mut validators = vec![];
    let mut reported_total = None;
    loop {
        let mut request =
            Request::new(STAKING_VALIDATORS_PATH).query("pagination.limit", page_limit.to_string());
        if let Some(key) = next_key.as_ref() {
            request = request.query("pagination.key", key.clone());
        }
        if let Height::At(height) = height {
            request = request.header(BLOCK_HEIGHT_HEADER, height.to_string());
        }
        let response: ApiValidatorsPage = fetch(api, &request).await.with_context(|| {
            format!("Failed to get API validators after key {:?}", next_key)
        })?;
        tracing::debug!("API validators page: {}", response.validators.len());
        validators.extend(response.validators);

        let pagination = match response.pagination {
            Some(pagination) => pagination,
            None => break,
        };
        // only the first page carries a non-zero total
        if let Some(total) = pagination.total.filter(|total| *total > 0) {
            reported_total = Some(total);
        }
        match pagination.next_key.filter(|key| !key.is_empty()) {
            Some(key) if !sent_keys.insert(key.clone()) => {
                bail!("API validators pagination repeated key {}", key)
            }
            Some(key) => next_key = Some(key),
            None => break,
        }
    }

    if let Some(total) = reported_total {
        if total != validators.len() as u64 {
            tracing::warn!(
                "API reported {} validators but {} were collected",
                total,
                validators.len()
            );
        }
    }
    tracing::info!("Collected {} validators via API", validators.len());
    Ok(dedup_by_pubkey(
        validators,
        |v| &v.consensus_pubkey.key,
        "API validators",
    ))
}

fn keep_new_set_validators(
    seen: &mut HashSet<ConsensusPubkey>,
    validators: &mut Vec<SetValidator>,
    page: Vec<SetValidator>,
) -> usize {
    let before = validators.len();
    for validator in page {
        if seen.insert(validator.pub_key.key.clone()) {
            validators.push(validator);
        } else {
            tracing::warn!(
                "validator set returned {} more than once, dropping repeat",
                validator.pub_key.key
            );
        }
    }
    validators.len() - before
}

/// `/validatorsets/{height}`. The first page carries no page parameter,
/// later pages count from 2. Only distinct pubkeys count towards the total.
pub async fn collect_api_validator_set(
    api: &dyn JsonSource,
    height: Height,
) -> anyhow::Result<Vec<SetValidator>> {
    let path = format!("/validatorsets/{height}");
    let response: RpcEnvelope<ValidatorSetPage> = fetch(api, &Request::new(path.clone()))
        .await
        .with_context(|| format!("Failed to get validator set at {height}"))?;
    let total = response.result.total;
    let mut seen = HashSet::new();
    let mut validators = vec![];
    keep_new_set_validators(&mut seen, &mut validators, response.result.validators);

    let mut page: u64 = 2;
    while (validators.len() as u64) < total {
        let request = Request::new(path.clone()).query("page", page.to_string());
        let response: RpcEnvelope<ValidatorSetPage> = fetch(api, &request)
            .await
            .with_context(|| format!("Failed to get validator set page {page}"))?;
        if keep_new_set_validators(&mut seen, &mut validators, response.result.validators) == 0 {
            bail!(
                "validator set page {} added nothing with {} of {} received",
                page,
                validators.len(),
                total
            );
        }
        page += 1;
    }

    tracing::info!("Collected {} validator set entries via API", validators.len());
    Ok(validators)
}

pub async fn consumer_chains(api: &dyn JsonSource) -> anyhow::Result<Vec<String>> {
    let response: ConsumerChains = fetch(api, &Request::new(CONSUMER_CHAINS_PATH))
        .await
        .context("Failed to get consumer chains")?;
    Ok(response
        .chains
        .into_iter()
        .map(|chain| chain.chain_id)
        .unique()
        .collect())
}
