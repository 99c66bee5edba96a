use crate::codec::AddressCodec;
use crate::collectors::{ApiValidator, RpcValidator, SetValidator};
use crate::types::{AddressBook, ConsensusPubkey, ValidatorRecord};
use anyhow::Context;
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::btree_map::Entry;

/// Builds one record per operator. RPC and validator-set entries only enrich
/// records that already exist; keys unknown to the staking module are dropped.
pub fn merge(
    height: u64,
    operators: &[ApiValidator],
    rpc_validators: &[RpcValidator],
    validator_set: &[SetValidator],
) -> AddressBook {
    let mut book = AddressBook::new(height);

    for operator in operators {
        match book.validators.entry(operator.consensus_pubkey.key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(ValidatorRecord {
                    moniker: operator.description.moniker.clone(),
                    operator_address: operator.operator_address.clone(),
                    status: operator.status.clone(),
                    jailed: operator.jailed,
                    ..Default::default()
                });
            }
            Entry::Occupied(slot) => {
                tracing::warn!(
                    "{} shares pubkey {} with {}, keeping the first",
                    operator.operator_address,
                    slot.key(),
                    slot.get().operator_address
                );
            }
        }
    }

    for validator in rpc_validators {
        match book.validators.get_mut(&validator.pub_key.value) {
            Some(record) => record.raw_address = validator.address.clone(),
            None => tracing::warn!(
                "{} was not found in the API validators",
                validator.pub_key.value
            ),
        }
    }

    for validator in validator_set {
        match book.validators.get_mut(&validator.pub_key.key) {
            Some(record) => record.consensus_address = validator.address.clone(),
            None => tracing::warn!(
                "{} was not found in the API validators",
                validator.pub_key.key
            ),
        }
    }

    book
}

/// Fills in the account address of every record from its operator address.
pub async fn derive_account_addresses(
    book: &mut AddressBook,
    codec: &dyn AddressCodec,
    concurrency: usize,
) -> anyhow::Result<()> {
    let derived: Vec<(ConsensusPubkey, String)> = stream::iter(book.validators.iter())
        .filter(|(_, record)| futures::future::ready(!record.operator_address.is_empty()))
        .map(|(pubkey, record)| async move {
            let account = codec
                .operator_to_account_address(&record.operator_address)
                .await
                .with_context(|| {
                    format!("Failed to derive account of {}", record.operator_address)
                })?;
            Ok::<_, anyhow::Error>((pubkey.clone(), account))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    for (pubkey, account) in derived {
        if let Some(record) = book.validators.get_mut(&pubkey) {
            record.account_address = account;
        }
    }
    Ok(())
}
