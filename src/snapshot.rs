use crate::types::AddressBook;
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const CSV_COLUMNS: [&str; 7] = [
    "cosmosvaloper",
    "cosmos",
    "moniker",
    "pubkey",
    "address",
    "cosmosvalcons",
    "bonded",
];

pub fn snapshot_file_name(chain: &str, height: u64, extension: &str) -> String {
    format!("{chain}-{height}-address-book.{extension}")
}

pub fn write_json_to<W: Write>(book: &AddressBook, writer: W) -> anyhow::Result<()> {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
    book.validators.serialize(&mut serializer)?;
    Ok(())
}

pub fn csv_header(consumer_chains: &[String]) -> Vec<String> {
    let mut header: Vec<String> = CSV_COLUMNS.iter().map(|column| column.to_string()).collect();
    for chain in consumer_chains {
        header.push(format!("{chain}-cosmosvalcons"));
        header.push(format!("{chain}-address"));
    }
    header
}

pub fn write_csv_to<W: Write>(book: &AddressBook, writer: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(csv_header(&book.consumer_chains))?;
    for (pubkey, record) in book.validators.iter() {
        let mut row = vec![
            record.operator_address.clone(),
            record.account_address.clone(),
            record.moniker.clone(),
            pubkey.to_string(),
            record.raw_address.to_string(),
            record.consensus_address.clone(),
            record.status.clone(),
        ];
        for chain in book.consumer_chains.iter() {
            match record.consumer_chains.get(chain) {
                Some(entry) => {
                    row.push(entry.consensus_address.clone());
                    row.push(entry.raw_address.to_string());
                }
                None => row.extend([String::new(), String::new()]),
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `{chain}-{height}-address-book.json` and `.csv` into `output_dir`.
pub fn write_snapshot(
    book: &AddressBook,
    output_dir: &Path,
    chain: &str,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let json_path = output_dir.join(snapshot_file_name(chain, book.height, "json"));
    let file = File::create(&json_path)
        .with_context(|| format!("Cannot create {}", json_path.display()))?;
    let mut json = BufWriter::new(file);
    write_json_to(book, &mut json)?;
    json.flush()?;
    tracing::info!("Wrote {}", json_path.display());

    let csv_path = output_dir.join(snapshot_file_name(chain, book.height, "csv"));
    let file = File::create(&csv_path)
        .with_context(|| format!("Cannot create {}", csv_path.display()))?;
    write_csv_to(book, BufWriter::new(file))?;
    tracing::info!("Wrote {}", csv_path.display());

    Ok((json_path, csv_path))
}

#[cfg(test)]
mod tests {
    use crate::snapshot::{csv_header, snapshot_file_name, write_csv_to, write_snapshot};
    use crate::types::{
        AddressBook, ConsensusPubkey, ConsumerChainEntry, RawAddress, ValidatorRecord,
    };
    use std::collections::BTreeMap;

    fn sample_book() -> AddressBook {
        let mut book = AddressBook::new(19000000);
        book.consumer_chains = vec!["neutron-1".to_string()];
        let mut alice = ValidatorRecord {
            moniker: "Alice, Inc".to_string(),
            operator_address: "cosmosvaloper1aa".to_string(),
            account_address: "cosmos1aa".to_string(),
            status: "BOND_STATUS_BONDED".to_string(),
            jailed: false,
            raw_address: RawAddress::new(vec![0xaa, 0x11]),
            consensus_address: "cosmosvalcons1abc".to_string(),
            consumer_chains: BTreeMap::new(),
        };
        alice.consumer_chains.insert(
            "neutron-1".to_string(),
            ConsumerChainEntry {
                consensus_address: "cosmosvalcons1abc".to_string(),
                raw_address: RawAddress::new(vec![0xaa, 0x11]),
            },
        );
        book.validators.insert(ConsensusPubkey::new("P1"), alice);
        book
    }

    #[test]
    fn file_names() {
        assert_eq!(
            snapshot_file_name("provider", 42, "csv"),
            "provider-42-address-book.csv"
        );
    }

    #[test]
    fn header_has_chain_columns() {
        assert_eq!(
            csv_header(&["neutron-1".to_string()]).join(","),
            "cosmosvaloper,cosmos,moniker,pubkey,address,cosmosvalcons,bonded,neutron-1-cosmosvalcons,neutron-1-address"
        );
    }

    #[test]
    fn csv_rows() {
        let mut out = vec![];
        write_csv_to(&sample_book(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "cosmosvaloper1aa,cosmos1aa,\"Alice, Inc\",P1,AA11,cosmosvalcons1abc,BOND_STATUS_BONDED,cosmosvalcons1abc,AA11"
        );
    }

    #[test]
    fn writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let book = sample_book();
        let (json_path, csv_path) = write_snapshot(&book, dir.path(), "cosmoshub").unwrap();
        assert_eq!(
            json_path.file_name().unwrap(),
            "cosmoshub-19000000-address-book.json"
        );
        assert!(csv_path.exists());

        let json = std::fs::read_to_string(&json_path).unwrap();
        assert!(json.contains("\n    \"P1\": {"));
        let parsed: BTreeMap<ConsensusPubkey, ValidatorRecord> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, book.validators);
    }
}
