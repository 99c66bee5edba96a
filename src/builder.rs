use crate::codec::AddressCodec;
use crate::collectors::{
    collect_api_validator_set, collect_api_validators, collect_rpc_validators, consumer_chains,
    resolve_height,
};
use crate::config::{DEFAULT_CONCURRENCY, DEFAULT_PAGE_LIMIT};
use crate::consumer::populate_consumer_chains;
use crate::merger::{derive_account_addresses, merge};
use crate::source::JsonSource;
use crate::types::{AddressBook, Height};

/// Assembles an address book using the staking validators as a starting point:
/// 1. API: operator address, pubkey, moniker
/// 2. RPC: raw address bytes
/// 3. API validator set: consensus address
/// 4. key utility: account addresses and consumer chain keys
pub struct AddressBookBuilder<'a> {
    rpc: &'a dyn JsonSource,
    api: &'a dyn JsonSource,
    codec: &'a dyn AddressCodec,
    page_limit: u64,
    concurrency: usize,
}

impl<'a> AddressBookBuilder<'a> {
    pub fn new(
        rpc: &'a dyn JsonSource,
        api: &'a dyn JsonSource,
        codec: &'a dyn AddressCodec,
    ) -> Self {
        Self {
            rpc,
            api,
            codec,
            page_limit: DEFAULT_PAGE_LIMIT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_page_limit(mut self, page_limit: u64) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn build(&self, height: Height) -> anyhow::Result<AddressBook> {
        let height = resolve_height(self.rpc, height).await?;
        tracing::info!("Building address book at height {}", height);
        let at = Height::At(height);

        let rpc_validators = collect_rpc_validators(self.rpc, at).await?;
        let validator_set = collect_api_validator_set(self.api, at).await?;

        tracing::info!("Getting API validator data");
        let operators = collect_api_validators(self.api, at, self.page_limit).await?;

        tracing::info!("Populating addresses and valcons");
        let mut book = merge(height, &operators, &rpc_validators, &validator_set);
        derive_account_addresses(&mut book, self.codec, self.concurrency).await?;

        tracing::info!("Populating consumer chain addresses");
        let chains = consumer_chains(self.api).await?;
        tracing::info!("Found {} consumer chains", chains.len());
        populate_consumer_chains(&mut book, &chains, self.codec, self.concurrency).await?;

        Ok(book)
    }
}
