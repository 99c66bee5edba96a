use crate::types::RawAddress;
use async_trait::async_trait;
use serde::Deserialize;
use std::process::ExitStatus;
use std::str::FromStr;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("unexpected output from `{command}`: {reason}")]
    Malformed { command: String, reason: String },
}

/// Conversions between the address formats of the provider chain, plus the
/// provider query for consumer-chain key assignments.
#[async_trait]
pub trait AddressCodec: Send + Sync {
    async fn bytes_to_consensus_address(&self, bytes: &RawAddress) -> Result<String, CodecError>;

    async fn consensus_address_to_bytes(&self, address: &str) -> Result<RawAddress, CodecError>;

    async fn operator_to_account_address(&self, operator: &str) -> Result<String, CodecError>;

    /// `None` when the validator kept its provider key on `chain_id`.
    async fn consumer_address_lookup(
        &self,
        chain_id: &str,
        provider_address: &str,
    ) -> Result<Option<String>, CodecError>;
}

// Order of `formats` printed by `keys parse` for a hex input.
const ACCOUNT_FORMAT: usize = 0;
const CONSENSUS_FORMAT: usize = 4;

#[derive(Debug, Default, Deserialize)]
struct ParsedKey {
    #[serde(default)]
    bytes: Option<String>,
    #[serde(default)]
    formats: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConsumerKey {
    #[serde(default)]
    consumer_address: String,
}

fn parse_bytes_output(command: &str, stdout: &str) -> Result<RawAddress, CodecError> {
    let malformed = |reason: String| CodecError::Malformed {
        command: command.to_string(),
        reason,
    };
    let parsed: ParsedKey =
        serde_json::from_str(stdout).map_err(|err| malformed(err.to_string()))?;
    let bytes = parsed
        .bytes
        .ok_or_else(|| malformed("no bytes field".to_string()))?;
    RawAddress::from_str(&bytes).map_err(|err| malformed(format!("bytes {bytes}: {err}")))
}

fn parse_format_output(command: &str, stdout: &str, index: usize) -> Result<String, CodecError> {
    let parsed: ParsedKey = serde_json::from_str(stdout).map_err(|err| CodecError::Malformed {
        command: command.to_string(),
        reason: err.to_string(),
    })?;
    parsed
        .formats
        .into_iter()
        .nth(index)
        .ok_or_else(|| CodecError::Malformed {
            command: command.to_string(),
            reason: format!("no address format at position {index}"),
        })
}

fn parse_consumer_output(command: &str, stdout: &str) -> Result<Option<String>, CodecError> {
    let parsed: ConsumerKey = serde_json::from_str(stdout).map_err(|err| CodecError::Malformed {
        command: command.to_string(),
        reason: err.to_string(),
    })?;
    let address = parsed.consumer_address.trim().to_string();
    Ok(if address.is_empty() {
        None
    } else {
        Some(address)
    })
}

/// Runs the chain binary (`gaiad` and friends) for every conversion.
#[derive(Clone, Debug)]
pub struct KeysCli {
    binary: String,
    node: String,
}

impl KeysCli {
    pub fn new(binary: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            node: node.into(),
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    async fn run(&self, args: &[&str]) -> Result<String, CodecError> {
        let command = self.describe(args);
        tracing::trace!("running {}", command);
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| CodecError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(CodecError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|err| CodecError::Malformed {
            command,
            reason: err.to_string(),
        })
    }

    async fn keys_parse(&self, address: &str) -> Result<(String, String), CodecError> {
        let args = ["keys", "parse", address, "--output", "json"];
        let stdout = self.run(&args).await?;
        Ok((self.describe(&args), stdout))
    }
}

#[async_trait]
impl AddressCodec for KeysCli {
    async fn bytes_to_consensus_address(&self, bytes: &RawAddress) -> Result<String, CodecError> {
        let (command, stdout) = self.keys_parse(&bytes.to_string()).await?;
        parse_format_output(&command, &stdout, CONSENSUS_FORMAT)
    }

    async fn consensus_address_to_bytes(&self, address: &str) -> Result<RawAddress, CodecError> {
        let (command, stdout) = self.keys_parse(address).await?;
        parse_bytes_output(&command, &stdout)
    }

    async fn operator_to_account_address(&self, operator: &str) -> Result<String, CodecError> {
        let bytes = self.consensus_address_to_bytes(operator).await?;
        let (command, stdout) = self.keys_parse(&bytes.to_string()).await?;
        parse_format_output(&command, &stdout, ACCOUNT_FORMAT)
    }

    async fn consumer_address_lookup(
        &self,
        chain_id: &str,
        provider_address: &str,
    ) -> Result<Option<String>, CodecError> {
        let args = [
            "q",
            "provider",
            "validator-consumer-key",
            chain_id,
            provider_address,
            "--node",
            self.node.as_str(),
            "--output",
            "json",
        ];
        let stdout = self.run(&args).await?;
        parse_consumer_output(&self.describe(&args), &stdout)
    }
}
