//! chainstream CLI — stream account transactions from the terminal.
//!
//! Usage:
//! ```bash
//! # History followed by live updates, one JSON item per line
//! chainstream stream --address 0x4a1eade6b3780b50582344c162a547d04e4e8e4a
//!
//! # One-shot history on a testnet
//! chainstream history --address 0x… --network sepolia --from 4000000
//!
//! # List supported networks
//! chainstream networks
//! ```

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainstream_core::{Provider, StreamError, StreamRequest, Streamer, CONCURRENCY_KEY};
use chainstream_providers::etherscan::{self, EtherscanConfig, Network, ProviderKind, SortOrder};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }
    init_tracing(has_flag(&args, "--verbose"), has_flag(&args, "--json"));

    let result = match args[1].as_str() {
        "stream" => cmd_stream(&args[2..]).await,
        "history" => cmd_history(&args[2..]).await,
        "networks" => {
            cmd_networks();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chainstream {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(exit_code(&e));
    }
}

/// 2 for invalid use (bad flags, a stream already running), 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StreamError>() {
        Some(e) if e.is_misuse() => 2,
        Some(StreamError::Config(_)) => 2,
        _ => 1,
    }
}

fn print_usage() {
    println!("chainstream {}", env!("CARGO_PKG_VERSION"));
    println!("Stream Ethereum account transactions from Etherscan\n");
    println!("USAGE:");
    println!("    chainstream <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    stream     History and live transactions for an address");
    println!("    history    Transactions for an address, then exit");
    println!("    networks   List supported networks");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --address <ADDR>       Account to stream  [required]");
    println!("    --network <NAME>       mainnet | ropsten | rinkeby | goerli | sepolia  [default: mainnet]");
    println!("    --api-key <KEY>        Etherscan API key  [env: ETHERSCAN_API_KEY]");
    println!("    --provider <KIND>      all | http | ws  [default: all]  (stream only)");
    println!("    --from <BLOCK>         First block");
    println!("    --to <BLOCK>           Last block  (history only)");
    println!("    --sort <ORDER>         asc | desc  [default: desc]");
    println!("    --duration <SECS>      Stop streaming after SECS  (stream only)");
    println!("    --concurrency <N>      Items processed in parallel  [default: 10]");
    println!("    --include-internal     Attach internal transactions to each item");
    println!("    --verbose              Debug logging for chainstream crates");
    println!("    --json                 Log as JSON");
}

/// Logs go to stderr; stdout carries items only.
fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "warn,chainstream=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Flags shared by `stream` and `history`.
fn parse_config(args: &[String]) -> anyhow::Result<EtherscanConfig> {
    let mut config = EtherscanConfig::default();

    if let Some(network) = parse_flag(args, "--network") {
        config.network = network.parse::<Network>()?;
    }
    if let Some(key) = parse_flag(args, "--api-key").or_else(|| env::var("ETHERSCAN_API_KEY").ok()) {
        config.api_key = key;
    }
    if let Some(sort) = parse_flag(args, "--sort") {
        config.sort = match sort.as_str() {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            other => bail!("unknown sort order: {other}"),
        };
    }
    config.include_internal = has_flag(args, "--include-internal");
    Ok(config)
}

fn parse_request(args: &[String]) -> anyhow::Result<StreamRequest> {
    let address = parse_flag(args, "--address").ok_or_else(|| anyhow!("--address is required"))?;
    let mut request = StreamRequest::new(address);
    request.from_position = parse_number(args, "--from")?;
    request.to_position = parse_number(args, "--to")?;
    Ok(request)
}

async fn cmd_stream(args: &[String]) -> anyhow::Result<()> {
    let config = parse_config(args)?;
    let request = parse_request(args)?;
    let kind = match parse_flag(args, "--provider") {
        Some(kind) => kind.parse::<ProviderKind>()?,
        None => ProviderKind::default(),
    };
    let duration = parse_number(args, "--duration")?.map(Duration::from_secs);

    let client = etherscan::shared_client().context("building HTTP client")?;
    let providers = etherscan::build(kind, &config, client).context("building providers")?;
    let streamer = Streamer::new(providers);
    if let Some(n) = parse_number(args, "--concurrency")? {
        streamer.configure(CONCURRENCY_KEY, n)?;
    }

    tracing::info!(
        subject = %request.subject,
        network = %config.network,
        provider = %kind,
        "streaming"
    );
    let subscription = streamer
        .stream(request)
        .await
        .context("starting stream")?;

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<anyhow::Result<()>>();
    let done_tx = Arc::new(std::sync::Mutex::new(Some(done_tx)));
    let on_error = done_tx.clone();
    let observer = subscription.observe(
        print_item,
        move |e| {
            if let Some(tx) = on_error.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(Err(anyhow!(e)));
            }
        },
        move || {
            if let Some(tx) = done_tx.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(Ok(()));
            }
        },
    );

    let stopped = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };

    let outcome = tokio::select! {
        finished = done_rx => finished.unwrap_or(Ok(())),
        _ = stopped => Ok(()),
    };

    streamer.close().await.context("closing stream")?;
    let _ = observer.await;
    outcome.context("stream failed")
}

async fn cmd_history(args: &[String]) -> anyhow::Result<()> {
    let config = parse_config(args)?;
    let request = parse_request(args)?;

    let client = etherscan::shared_client().context("building HTTP client")?;
    let provider = etherscan::http_provider(&config, client).context("building provider")?;
    if let Some(n) = parse_number(args, "--concurrency")? {
        provider.configure(CONCURRENCY_KEY, serde_json::json!(n))?;
    }

    let items = provider
        .listen(request)
        .await
        .context("starting request")?
        .wait_all()
        .await
        .context("fetching transactions")?;

    println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
    eprintln!("{} transaction(s)", items.len());
    Ok(())
}

fn cmd_networks() {
    println!("Supported networks:\n");
    for network in Network::ALL {
        let config = EtherscanConfig::new(network, etherscan::DEFAULT_API_KEY);
        let live = match config.push_url() {
            Some(_) => "push",
            None => "polling",
        };
        println!("  {:<9} {}  (live: {live})", network.as_str(), config.api_base_url());
    }
}

fn print_item(item: serde_json::Value) {
    println!("{item}");
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_number(args: &[String], flag: &str) -> anyhow::Result<Option<u64>> {
    parse_flag(args, flag)
        .map(|v| v.parse::<u64>().with_context(|| format!("{flag} expects a number, got {v:?}")))
        .transpose()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
