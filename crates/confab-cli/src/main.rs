//! confab demo responder
//!
//! Declares a queryable, feeds matched queries through a bounded channel,
//! and answers every one of them from a single consumer loop. Run it with
//! `--probe N` to drive the same path end to end from inside one process.

use std::thread;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{error, info};

use confab_core::{channel, Config, KeyExpr, Parameters, Payload, Session};

const DEFAULT_KEY_EXPR: &str = "demo/example/confab-queryable";
const DEFAULT_VALUE: &str = "Queryable from confab!";

/// Serve replies to queries on a key expression
#[derive(Debug, Parser)]
#[command(name = "confab", version, about)]
struct Cli {
    /// Key expression to answer queries on
    #[arg(default_value = DEFAULT_KEY_EXPR)]
    key_expr: String,

    /// Endpoint to add to the session's connect list (proto/address)
    connect: Option<String>,

    /// Payload returned with every reply
    #[arg(long, default_value = DEFAULT_VALUE)]
    value: String,

    /// Capacity of the query channel
    #[arg(long, default_value_t = 16)]
    capacity: usize,

    /// Submit this many demo queries from a second thread
    #[arg(long, default_value_t = 0)]
    probe: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        std::process::exit(-1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::default();
    if let Some(endpoint) = &cli.connect {
        config.add_connect(endpoint.parse().context("invalid connect endpoint")?);
    }

    info!("Opening session...");
    let session = Session::open(config)?;

    let key_expr = KeyExpr::new(cli.key_expr.as_str())?;
    let (tx, rx) = channel::bounded(cli.capacity)?;

    info!("Declaring queryable on '{}'...", key_expr);
    let closer = tx.clone();
    let queryable = session.declare_queryable(&key_expr, tx)?;

    let consumer = {
        let reply_key = key_expr.clone();
        let reply_value = cli.value.clone();
        thread::spawn(move || {
            while let Some(query) = rx.recv() {
                match query.payload() {
                    Some(payload) => info!(
                        "Received query '{}' with payload '{}'",
                        query.selector(),
                        payload.utf8_lossy()
                    ),
                    None => info!("Received query '{}'", query.selector()),
                }
                match query.reply(reply_key.clone(), Payload::from(reply_value.as_str())) {
                    Ok(()) => info!("Replied to '{}' with '{}'", query.selector(), reply_value),
                    Err(e) => error!("Failed to reply to '{}': {}", query.selector(), e),
                }
            }
            info!("Query channel drained, consumer exiting");
        })
    };

    let probe = spawn_probe(&cli, &session, &key_expr);

    info!("Press CTRL-C to quit...");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("Shutting down...");
    queryable.undeclare()?;
    closer.close();
    consumer
        .join()
        .map_err(|_| anyhow!("consumer thread panicked"))?;
    if let Some(probe) = probe {
        probe.join().map_err(|_| anyhow!("probe thread panicked"))?;
    }
    session.close();

    Ok(())
}

/// Drive the queryable end to end from inside the same process
fn spawn_probe(cli: &Cli, session: &Session, key_expr: &KeyExpr) -> Option<thread::JoinHandle<()>> {
    if cli.probe == 0 {
        return None;
    }
    let count = cli.probe;
    let session = session.clone();
    let key_expr = key_expr.clone();
    Some(thread::spawn(move || {
        for n in 0..count {
            let receiver = match session.query(
                &key_expr,
                Parameters::from(format!("seq={}", n)),
                Some(Payload::from(format!("probe #{}", n))),
            ) {
                Ok(receiver) => receiver,
                Err(e) => {
                    error!("Probe query failed: {}", e);
                    return;
                }
            };
            match receiver.recv() {
                Some(reply) => info!(
                    "Probe received '{}' from '{}'",
                    reply.payload().utf8_lossy(),
                    reply.key_expr()
                ),
                None => info!("Probe query went unanswered"),
            }
        }
    }))
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
