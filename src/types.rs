use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Consensus public key as reported by the nodes (base64 text). This is the
/// join key across every data source.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsensusPubkey(String);

impl ConsensusPubkey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for ConsensusPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw consensus address bytes. Rendered as uppercase hex, the way the
/// consensus RPC reports them.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawAddress(Vec<u8>);

impl RawAddress {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RawAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

impl FromStr for RawAddress {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s.trim()).map(Self)
    }
}

impl Serialize for RawAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RawAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        RawAddress::from_str(&text).map_err(serde::de::Error::custom)
    }
}

/// Block height a request is pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Height {
    Latest,
    At(u64),
}

impl From<Option<u64>> for Height {
    fn from(height: Option<u64>) -> Self {
        match height {
            Some(height) if height > 0 => Height::At(height),
            _ => Height::Latest,
        }
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Height::Latest => f.write_str("latest"),
            Height::At(height) => write!(f, "{}", height),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerChainEntry {
    #[serde(rename = "cosmosvalcons")]
    pub consensus_address: String,
    #[serde(rename = "address")]
    pub raw_address: RawAddress,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub moniker: String,
    #[serde(rename = "cosmosvaloper")]
    pub operator_address: String,
    #[serde(rename = "cosmos")]
    pub account_address: String,
    #[serde(rename = "bonded")]
    pub status: String,
    #[serde(default)]
    pub jailed: bool,
    #[serde(rename = "address")]
    pub raw_address: RawAddress,
    #[serde(rename = "cosmosvalcons")]
    pub consensus_address: String,
    // chain id -> entry, emitted next to the provider fields
    #[serde(flatten)]
    pub consumer_chains: BTreeMap<String, ConsumerChainEntry>,
}

/// JSON keys of the provider fields of a [`ValidatorRecord`]. Consumer chain
/// entries share the same object, keyed by chain id.
pub const RECORD_FIELDS: &[&str] = &[
    "moniker",
    "cosmosvaloper",
    "cosmos",
    "bonded",
    "jailed",
    "address",
    "cosmosvalcons",
];

/// Point-in-time snapshot of every validator known to the staking module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressBook {
    pub height: u64,
    pub consumer_chains: Vec<String>,
    pub validators: BTreeMap<ConsensusPubkey, ValidatorRecord>,
}

impl AddressBook {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn get(&self, pubkey: &ConsensusPubkey) -> Option<&ValidatorRecord> {
        self.validators.get(pubkey)
    }
}
