use std::path::PathBuf;

use clap::Parser;

use tracing_subscriber::prelude::*;
use validator_address_book::builder::AddressBookBuilder;
use validator_address_book::codec::KeysCli;
use validator_address_book::config::Config;
use validator_address_book::snapshot::write_snapshot;
use validator_address_book::source::HttpSource;

#[derive(Parser, Debug)]
#[clap(version, about = "Build a validator address book.")]
pub struct Cli {
    /// RPC node address, including port
    #[clap(short, long, value_parser)]
    rpc: Option<String>,

    /// API node address, including port
    #[clap(short, long, value_parser)]
    api: Option<String>,

    /// Chain name to use in the output file names
    #[clap(short, long, value_parser)]
    chain: Option<String>,

    /// Snapshot height, latest block when omitted
    #[clap(long, value_parser)]
    height: Option<u64>,

    /// path to config file
    #[clap(long, value_parser)]
    config_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = _main().await {
        tracing::error!("{:?}", err);
        std::process::exit(1);
    }
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer();

    let http_filter = tracing_subscriber::filter::Targets::new()
        // connection pool chatter from every paginated request
        .with_target("hyper", tracing::Level::WARN)
        .with_target("reqwest", tracing::Level::WARN)
        .with_default(tracing_subscriber::fmt::Subscriber::DEFAULT_MAX_LEVEL);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(http_filter)
        .init();

    let Cli {
        rpc,
        api,
        chain,
        height,
        config_path,
    } = Cli::parse();

    let config = match config_path {
        Some(config_path) => {
            tracing::info!("Config file {:?}", config_path);
            Config::load(&config_path)?
        }
        None => Config::default(),
    };
    let settings = config
        .overridden_by(Config {
            rpc,
            api,
            chain,
            height,
            ..Default::default()
        })
        .resolve()?;

    let rpc = HttpSource::new(settings.rpc.clone())?;
    let api = HttpSource::new(settings.api.clone())?;
    let codec = KeysCli::new(settings.binary.clone(), settings.rpc.clone());
    tracing::info!(
        "RPC {}, API {}, key utility {}",
        rpc.endpoint(),
        api.endpoint(),
        settings.binary
    );

    let book = AddressBookBuilder::new(&rpc, &api, &codec)
        .with_page_limit(settings.page_limit)
        .with_concurrency(settings.concurrency)
        .build(settings.height)
        .await?;
    tracing::info!(
        "Address book at height {} has {} validators",
        book.height,
        book.len()
    );

    write_snapshot(&book, &settings.output_dir, &settings.chain)?;

    Ok(())
}
