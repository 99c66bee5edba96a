use crate::types::Height;
use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHAIN: &str = "provider";
pub const DEFAULT_BINARY: &str = "gaiad";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_PAGE_LIMIT: u64 = 1000;

/// Run configuration as read from YAML. Every field is optional so the same
/// type can carry command-line overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub rpc: Option<String>,
    pub api: Option<String>,
    pub chain: Option<String>,
    pub height: Option<u64>,
    pub binary: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub page_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc: String,
    pub api: String,
    pub chain: String,
    pub height: Height,
    pub binary: String,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub page_limit: u64,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let file = File::open(path)
            .with_context(|| format!("Cannot read config file {path}", path = path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot read config file {path}", path = path.display()))
    }

    /// Values set in `overrides` win over the ones in `self`.
    pub fn overridden_by(self, overrides: Config) -> Config {
        Config {
            rpc: overrides.rpc.or(self.rpc),
            api: overrides.api.or(self.api),
            chain: overrides.chain.or(self.chain),
            height: overrides.height.or(self.height),
            binary: overrides.binary.or(self.binary),
            output_dir: overrides.output_dir.or(self.output_dir),
            concurrency: overrides.concurrency.or(self.concurrency),
            page_limit: overrides.page_limit.or(self.page_limit),
        }
    }

    pub fn resolve(self) -> anyhow::Result<Settings> {
        let rpc = self.rpc.ok_or_else(|| anyhow!("RPC node address is not set"))?;
        let api = self.api.ok_or_else(|| anyhow!("API node address is not set"))?;
        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        let page_limit = self.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page_limit == 0 {
            bail!("page_limit must be at least 1");
        }
        Ok(Settings {
            rpc,
            api,
            chain: self.chain.unwrap_or_else(|| DEFAULT_CHAIN.to_string()),
            height: Height::from(self.height),
            binary: self.binary.unwrap_or_else(|| DEFAULT_BINARY.to_string()),
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from(".")),
            concurrency,
            page_limit,
        })
    }
}
