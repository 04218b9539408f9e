use std::path::PathBuf;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Parser, Subcommand};
use gm_session::chain::Standalone;
use gm_session::rpc::Eip1193Provider;
use gm_session::service::GmService;
use gm_session::sim::SimulatedChain;
use gm_session::submit::SubmissionKind;
use gm_session::{
    AppConfig, ChainClient, HostPlatform, JsonFileStore, KeyValueStore, MemoryStore, NoticeEvent,
    Notice, NoticeLevel, Operation, SessionHandle, SessionRuntime, SessionView, SystemClock,
    WalletProvider,
};
use shared_types::{Address, ConnectorChoice};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gm-cli", about = "Say GM on Base once per UTC day")]
struct Args {
    /// JSON config file; missing fields use the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wallet JSON-RPC endpoint. Overrides `rpc_url` from the config.
    #[arg(long, env = "GM_RPC_URL")]
    rpc_url: Option<String>,

    /// Persist the per-wallet cache in this JSON file.
    #[arg(long, env = "GM_CACHE")]
    cache: Option<PathBuf>,

    /// Run against an in-memory chain instead of a wallet endpoint.
    #[arg(long)]
    simulate: bool,

    /// Account used by the simulated wallet.
    #[arg(long, default_value = "0x000000000000000000000000000000000000dEaD")]
    account: Address,

    /// Simulated wallet advertises atomic batch support.
    #[arg(long)]
    batch: bool,

    #[arg(long, value_enum)]
    connector: Option<Connector>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Connector {
    MiniApp,
    Injected,
    WalletConnect,
}

impl From<Connector> for ConnectorChoice {
    fn from(connector: Connector) -> Self {
        match connector {
            Connector::MiniApp => ConnectorChoice::MiniApp,
            Connector::Injected => ConnectorChoice::Injected,
            Connector::WalletConnect => ConnectorChoice::WalletConnect,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and show the session.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print the synced on-chain points.
    Points,
    /// Send today's GM.
    Gm,
    /// Send the two-transfer batch demo.
    BatchDemo,
    /// Forget the cached points and GM time for the connected wallet.
    Reset,
    /// Run a GraphQL query against the connected session.
    Query { query: String },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(url) = &args.rpc_url {
        config.rpc_url = url.clone();
    }
    if let Some(path) = &args.cache {
        config.cache_path = Some(path.clone());
    }

    match config.cache_path.clone() {
        Some(path) => {
            let store = JsonFileStore::open(&path)
                .with_context(|| format!("opening cache {}", path.display()))?;
            with_store(args, config, store).await
        }
        None => with_store(args, config, MemoryStore::new()).await,
    }
}

async fn with_store<S>(args: Args, config: AppConfig, store: S) -> Result<()>
where
    S: KeyValueStore + Send + 'static,
{
    if args.simulate {
        let sim = SimulatedChain::new(args.account).with_batch(args.batch);
        execute(args, config, store, sim.clone(), sim.clone(), sim).await
    } else {
        let provider = Eip1193Provider::new(config.rpc_url.clone(), config.chain_id, config.receipt_poll());
        execute(args, config, store, provider.clone(), provider, Standalone).await
    }
}

async fn execute<S, W, C, H>(args: Args, config: AppConfig, store: S, wallet: W, chain: C, host: H) -> Result<()>
where
    S: KeyValueStore + Send + 'static,
    W: WalletProvider,
    C: ChainClient,
    H: HostPlatform,
{
    let explorer = config.explorer_tx_url.clone();
    let (runtime, handle) = SessionRuntime::new(config, store, SystemClock, wallet, chain, host);
    let runtime = tokio::spawn(runtime.run());
    let printer = tokio::spawn(print_notices(handle.notices()));

    handle.send(Operation::Init)?;
    let view = connect(&handle, args.connector.map(Into::into)).await?;
    info!(address = ?view.address, "session connected");

    let show_final = matches!(args.command, Command::Gm | Command::BatchDemo | Command::Reset);
    match args.command {
        Command::Status { json: true } => println!("{}", serde_json::to_string_pretty(&view)?),
        Command::Status { json: false } => print_status(&view),
        Command::Points => println!("{}", view.points.unwrap_or(0)),
        Command::Gm => {
            if !view.can_gm {
                println!("Already said GM today. Come back tomorrow.");
            } else {
                let view = submit(&handle, Operation::SubmitGm).await?;
                if let Some(celebration) = &view.celebration {
                    println!("{}", celebration.render());
                }
            }
        }
        Command::BatchDemo => {
            if !view.batch_supported {
                bail!("Batch transactions not supported by your wallet");
            }
            submit(&handle, Operation::BatchDemo).await?;
        }
        Command::Reset => handle.send(Operation::ResetCache)?,
        Command::Query { query } => {
            let response = GmService::new(handle.clone()).handle_query(query.into()).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    drop(handle);
    let session = runtime.await.context("session runtime panicked")?;
    printer.abort();

    let view = session.view();
    if let Some(outcome) = view.last_outcome.as_ref().filter(|o| o.confirmed && o.kind == SubmissionKind::Gm) {
        info!(submission = outcome.id, explorer = %explorer, "GM landed");
    }
    if show_final {
        print_status(&view);
    }
    Ok(())
}

/// Connect and wait for the first fresh points read, bailing on an error notice.
async fn connect(handle: &SessionHandle, connector: Option<ConnectorChoice>) -> Result<SessionView> {
    let mut notices = handle.notices();
    handle.send(Operation::Connect { connector })?;
    let synced = handle.wait_for(|view| view.points_synced);
    tokio::pin!(synced);
    loop {
        tokio::select! {
            view = &mut synced => return Ok(view?),
            event = notices.recv() => match event {
                Ok(NoticeEvent::Show(notice)) if notice.title == "Wallet connection failed" => {
                    bail!(describe(&notice));
                }
                Err(RecvError::Closed) => bail!("session stopped before connecting"),
                _ => {}
            },
        }
    }
}

async fn submit(handle: &SessionHandle, operation: Operation) -> Result<SessionView> {
    handle.send(operation)?;
    let view = handle
        .wait_for(|view| view.last_outcome.is_some() && !view.submitting())
        .await?;
    let outcome = view
        .last_outcome
        .clone()
        .ok_or_else(|| anyhow!("submission finished without an outcome"))?;
    if !outcome.confirmed {
        bail!(
            "submission failed: {}",
            outcome.detail.unwrap_or_else(|| "unknown error".into())
        );
    }
    Ok(view)
}

async fn print_notices(mut notices: tokio::sync::broadcast::Receiver<NoticeEvent>) {
    loop {
        match notices.recv().await {
            Ok(NoticeEvent::Show(notice)) => eprintln!("{}", describe(&notice)),
            Ok(NoticeEvent::Dismiss) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

fn describe(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Loading => "...",
        NoticeLevel::Success => "ok",
        NoticeLevel::Error => "error",
    };
    match &notice.description {
        Some(description) => format!("[{tag}] {}: {description}", notice.title),
        None => format!("[{tag}] {}", notice.title),
    }
}

fn print_status(view: &SessionView) {
    println!("account:  {}", view.short_address().unwrap_or_else(|| "-".into()));
    if let Some(chain) = view.chain_id {
        println!("chain:    {chain}");
    }
    match view.points {
        Some(points) => println!("points:   {points}"),
        None => println!("points:   -"),
    }
    println!("last GM:  {}", view.last_gm_label());
    println!("button:   {}", view.button_label());
}
