use crate::codec::{AddressCodec, CodecError};
use crate::types::{
    AddressBook, ConsensusPubkey, ConsumerChainEntry, ValidatorRecord, RECORD_FIELDS,
};
use anyhow::Context;
use futures::{stream, StreamExt, TryStreamExt};

/// Entry of one validator on one consumer chain. Starts as a copy of the
/// provider address and is replaced only when the validator assigned a
/// dedicated consumer key.
pub async fn consumer_entry(
    codec: &dyn AddressCodec,
    chain_id: &str,
    record: &ValidatorRecord,
) -> Result<ConsumerChainEntry, CodecError> {
    let mut entry = ConsumerChainEntry {
        consensus_address: record.consensus_address.clone(),
        raw_address: record.raw_address.clone(),
    };
    if record.consensus_address.is_empty() {
        return Ok(entry);
    }

    if let Some(consumer) = codec
        .consumer_address_lookup(chain_id, &record.consensus_address)
        .await?
    {
        entry.raw_address = codec.consensus_address_to_bytes(&consumer).await?;
        entry.consensus_address = consumer;
    }
    Ok(entry)
}

/// Chain ids that share a JSON key with a provider field of the record.
fn colliding_chains(chains: &[String]) -> Vec<&str> {
    chains
        .iter()
        .map(String::as_str)
        .filter(|chain| RECORD_FIELDS.contains(chain))
        .collect()
}

/// Adds an entry for every (validator, chain) pair. Lookups run concurrently;
/// the book itself is only written once all of them succeeded.
pub async fn populate_consumer_chains(
    book: &mut AddressBook,
    chains: &[String],
    codec: &dyn AddressCodec,
    concurrency: usize,
) -> anyhow::Result<()> {
    for chain in colliding_chains(chains) {
        tracing::warn!(
            "consumer chain id {} collides with a validator field, its JSON entry will be duplicated",
            chain
        );
    }

    let pairs = book.validators.iter().flat_map(|(pubkey, record)| {
        chains
            .iter()
            .map(move |chain| (pubkey, record, chain.as_str()))
    });

    let entries: Vec<(ConsensusPubkey, String, ConsumerChainEntry)> = stream::iter(pairs)
        .map(|(pubkey, record, chain)| async move {
            let entry = consumer_entry(codec, chain, record).await.with_context(|| {
                format!(
                    "Failed to get {} consumer address of {}",
                    chain, record.operator_address
                )
            })?;
            Ok::<_, anyhow::Error>((pubkey.clone(), chain.to_string(), entry))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    for (pubkey, chain, entry) in entries {
        if let Some(record) = book.validators.get_mut(&pubkey) {
            record.consumer_chains.insert(chain, entry);
        }
    }
    book.consumer_chains = chains.to_vec();
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::codec::testing::FakeCodec;
    use crate::consumer::{colliding_chains, consumer_entry, populate_consumer_chains};
    use crate::types::{AddressBook, ConsensusPubkey, RawAddress, ValidatorRecord};

    fn record(valcons: &str, raw: Vec<u8>) -> ValidatorRecord {
        ValidatorRecord {
            operator_address: "cosmosvaloper1aa".to_string(),
            consensus_address: valcons.to_string(),
            raw_address: RawAddress::new(raw),
            ..Default::default()
        }
    }

    fn book(records: Vec<(&str, ValidatorRecord)>) -> AddressBook {
        let mut book = AddressBook::new(7);
        for (pubkey, record) in records {
            book.validators.insert(ConsensusPubkey::new(pubkey), record);
        }
        book
    }

    #[tokio::test]
    async fn defaults_to_provider_address() {
        let codec = FakeCodec::default();
        let record = record("cosmosvalcons1aa11", vec![0xaa, 0x11]);
        let entry = consumer_entry(&codec, "neutron-1", &record).await.unwrap();
        assert_eq!(entry.consensus_address, record.consensus_address);
        assert_eq!(entry.raw_address, record.raw_address);
        assert_eq!(codec.lookups(), 1);
    }

    #[tokio::test]
    async fn assigned_key_overrides() {
        let codec = FakeCodec::default().assign(
            "neutron-1",
            "cosmosvalcons1aa11",
            "cosmosvalcons1bb22",
        );
        let record = record("cosmosvalcons1aa11", vec![0xaa, 0x11]);
        let entry = consumer_entry(&codec, "neutron-1", &record).await.unwrap();
        assert_eq!(entry.consensus_address, "cosmosvalcons1bb22");
        assert_eq!(entry.raw_address.to_string(), "BB22");
    }

    #[tokio::test]
    async fn empty_provider_address_skips_lookup() {
        let codec = FakeCodec::default();
        let record = record("", vec![]);
        let entry = consumer_entry(&codec, "neutron-1", &record).await.unwrap();
        assert!(entry.consensus_address.is_empty());
        assert!(entry.raw_address.is_empty());
        assert_eq!(codec.lookups(), 0);
    }

    #[tokio::test]
    async fn every_pair_gets_an_entry() {
        let codec =
            FakeCodec::default().assign("stride-1", "cosmosvalcons1aa11", "cosmosvalcons1cc33");
        let mut book = book(vec![
            ("P1", record("cosmosvalcons1aa11", vec![0xaa, 0x11])),
            ("P2", record("", vec![])),
            ("P3", record("cosmosvalcons1dd44", vec![0xdd, 0x44])),
        ]);
        let chains = vec!["neutron-1".to_string(), "stride-1".to_string()];
        populate_consumer_chains(&mut book, &chains, &codec, 3)
            .await
            .unwrap();

        assert_eq!(book.consumer_chains, chains);
        for record in book.validators.values() {
            assert_eq!(record.consumer_chains.len(), 2);
        }
        // two validators with a provider address, two chains
        assert_eq!(codec.lookups(), 4);

        let p1 = book.get(&ConsensusPubkey::new("P1")).unwrap();
        assert_eq!(
            p1.consumer_chains["neutron-1"].consensus_address,
            "cosmosvalcons1aa11"
        );
        assert_eq!(
            p1.consumer_chains["stride-1"].consensus_address,
            "cosmosvalcons1cc33"
        );
        assert_eq!(
            p1.consumer_chains["stride-1"].raw_address.to_string(),
            "CC33"
        );

        let p2 = book.get(&ConsensusPubkey::new("P2")).unwrap();
        assert!(p2.consumer_chains["stride-1"].consensus_address.is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_is_fatal() {
        let codec = FakeCodec::default().broken("cosmosvalcons1aa11");
        let mut book = book(vec![("P1", record("cosmosvalcons1aa11", vec![0xaa, 0x11]))]);
        let chains = vec!["neutron-1".to_string()];
        assert!(populate_consumer_chains(&mut book, &chains, &codec, 2)
            .await
            .is_err());
        assert!(book.validators.values().all(|r| r.consumer_chains.is_empty()));
    }

    #[tokio::test]
    async fn no_chains_is_noop() {
        let codec = FakeCodec::default();
        let mut book = book(vec![("P1", record("cosmosvalcons1aa11", vec![0xaa, 0x11]))]);
        populate_consumer_chains(&mut book, &[], &codec, 2).await.unwrap();
        assert!(book.consumer_chains.is_empty());
        assert_eq!(codec.lookups(), 0);
    }

    #[test]
    fn chain_ids_colliding_with_fields() {
        let chains = vec![
            "neutron-1".to_string(),
            "address".to_string(),
            "moniker".to_string(),
        ];
        assert_eq!(colliding_chains(&chains), vec!["address", "moniker"]);
        assert!(colliding_chains(&["stride-1".to_string()]).is_empty());
    }
}
