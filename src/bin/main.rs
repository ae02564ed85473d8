//! cardano-wc CLI - chain identity tools and an in-process session demo
//!
//!   cardano-wc chains                                  → known chains
//!   cardano-wc account encode <chain> <stake> <base>   → account string
//!   cardano-wc account decode <account>                → {chain, stake, base}
//!   cardano-wc namespaces [--chains a,b] [--legacy]    → proposal payload
//!   cardano-wc demo [--direct] [--chain <id>] [--app <name>]
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context};
use cardano_wc::core::chain::{decode_account, encode_account};
use cardano_wc::core::namespace::{build_optional, build_required, chain_to_rpc};
use cardano_wc::logging::init_logging;
use cardano_wc::provider::parse_chains;
use cardano_wc::{
    AppMetadata, CardanoProvider, ChainId, DappRelay, FileStorage, KeyValueStorage, MemoryDataSource, MemoryHub,
    NetworkId, ProviderConfig, Shutdown, StaticWallet, WalletConnector,
};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const MAINNET_BASE: &str = "addr1qx2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3n0d3vllmyqwsx5wktcd8cc3sq835lu7drv2xwl2wywfgse35a3x";
const MAINNET_STAKE: &str = "stake1uyehkck0lajq8gr28t9uxnuvgcqrc6070x3k9r8048z8y5gh6ffgw";
const TESTNET_BASE: &str = "addr_test1qz2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzer3n0d3vllmyqwsx5wktcd8cc3sq835lu7drv2xwl2wywfgs68faae";
const TESTNET_STAKE: &str = "stake_test1uqehkck0lajq8gr28t9uxnuvgcqrc6070x3k9r8048z8y5gcjqgl0";

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);
    init_logging();

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("cardano-wc {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("chains") => cmd_chains(),
        Some("account") => cmd_account(&opts),
        Some("namespaces") | Some("ns") => cmd_namespaces(&opts),
        Some("demo") => cmd_demo(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || (!opts.json && std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{e:#}")}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|e| format!("{{\"error\":\"render: {e}\"}}"))
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    chain: Option<String>,
    chains: Option<String>,
    app: Option<String>,
    direct: bool,
    legacy: bool,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--direct" => opts.direct = true,
                "--legacy" => opts.legacy = true,
                "--chain" | "-c" => {
                    if i + 1 < args.len() {
                        opts.chain = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--chains" => {
                    if i + 1 < args.len() {
                        opts.chains = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--app" | "-a" => {
                    if i + 1 < args.len() {
                        opts.app = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                _ => positional.push(arg.clone()),
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        opts.command = positional.next();
        opts.positional = positional.collect();
        opts
    }

    fn chains(&self) -> anyhow::Result<Vec<ChainId>> {
        let raw = match &self.chains {
            Some(raw) => raw.clone(),
            None => env::var("CARDANO_WC_CHAINS").unwrap_or_else(|_| "mainnet".into()),
        };
        Ok(parse_chains(&raw)?)
    }
}

fn print_usage() {
    println!(
        r#"cardano-wc - Cardano dApp/wallet session tools

USAGE:
    cardano-wc <command> [args] [options]

COMMANDS:
    chains                               List known chains
    account encode <chain> <stake> <base>
                                         Build an account string
    account decode <account>             Split an account string
    namespaces                           Show the required/optional proposal
    demo                                 Pair an in-process dApp and wallet

OPTIONS:
    --chain, -c <id>        Chain id or alias (mainnet|preprod|preview)
    --chains <a,b>          Configured chains (env: CARDANO_WC_CHAINS)
    --legacy                Legacy mode (full method list, no Direct mode)
    --direct                Demo: answer reads from the data source
    --app, -a <name>        Demo: persist dApp storage under this app name
                            (root: CARDANO_WC_ROOT)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --help, -h              Show this help
    --version, -V           Show version

ENVIRONMENT:
    CARDANO_WC_PROJECT_ID   Relay project id
    CARDANO_WC_RELAY_URL    Relay url or region (us|eu|apac)
    CARDANO_WC_LEGACY_MODE  1|true to enable legacy mode
    CARDANO_WC_LOG_JSON     1 for JSON logs on stderr
    RUST_LOG                Log filter (default: info)"#
    );
}

fn chain_json(chain: &ChainId) -> Value {
    json!({
        "id": chain.to_string(),
        "name": chain.name(),
        "network_id": chain.network_id().as_u8(),
        "protocol_magic": chain.protocol_magic(),
        "rpc": chain_to_rpc(chain),
    })
}

fn cmd_chains() -> anyhow::Result<Value> { Ok(Value::Array(ChainId::all().iter().map(chain_json).collect())) }

fn cmd_account(opts: &ParsedArgs) -> anyhow::Result<Value> {
    match opts.positional.first().map(String::as_str) {
        Some("encode") => {
            let [chain, stake, base] = match &opts.positional[1..] {
                [chain, stake, base] => [chain, stake, base],
                _ => bail!("usage: account encode <chain> <stake> <base>"),
            };
            let chain = ChainId::from_alias(chain)?;
            Ok(json!({"account": encode_account(chain, stake, base)?}))
        }
        Some("decode") => {
            let raw = opts.positional.get(1).context("usage: account decode <account>")?;
            let account = decode_account(raw)?;
            Ok(json!({
                "chain": chain_json(&account.chain),
                "stake_address": account.stake_address,
                "base_address": account.base_address,
            }))
        }
        _ => bail!("usage: account encode|decode ..."),
    }
}

fn cmd_namespaces(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let chains = opts.chains()?;
    let legacy = opts.legacy || env::var("CARDANO_WC_LEGACY_MODE").map(|v| v == "1" || v == "true").unwrap_or(false);
    Ok(json!({
        "requiredNamespaces": build_required(&chains, legacy),
        "optionalNamespaces": build_optional(&chains),
    }))
}

fn demo_wallet() -> StaticWallet {
    StaticWallet::new()
        .with_addresses(NetworkId::Mainnet, MAINNET_BASE, MAINNET_STAKE)
        .with_addresses(NetworkId::Testnet, TESTNET_BASE, TESTNET_STAKE)
}

fn demo_source() -> MemoryDataSource {
    MemoryDataSource::new()
        .with_balance(NetworkId::Mainnet, MAINNET_STAKE, "1a3b9aca00")
        .with_balance(NetworkId::Testnet, TESTNET_STAKE, "1a05f5e100")
        .with_utxos(NetworkId::Testnet, TESTNET_STAKE, vec!["828258200000000000000000000000000000000000000000000000000000000000000000".into()])
}

fn cmd_demo(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let chain = match &opts.chain {
        Some(raw) => ChainId::from_alias(raw)?,
        None => ChainId::PREPROD,
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(demo(opts, chain))
}

async fn demo(opts: &ParsedArgs, chain: ChainId) -> anyhow::Result<Value> {
    let hub = MemoryHub::new();
    let source = Arc::new(demo_source());
    let connector = Arc::new(WalletConnector::new(Arc::new(hub.wallet()), Arc::new(demo_wallet()), chain).with_data_source(source.clone()));
    let shutdown = Shutdown::new();
    let serving = connector.spawn(shutdown.clone());

    let metadata = AppMetadata::new("cardano-wc demo", "https://localhost");
    let relay: Arc<dyn DappRelay> = match &opts.app {
        Some(app) => {
            let storage = FileStorage::open(app)?;
            info!(path = %storage.path().display(), "dapp storage");
            let storage: Arc<dyn KeyValueStorage> = Arc::new(storage);
            Arc::new(hub.dapp_with_storage(metadata.clone(), storage)?)
        }
        None => Arc::new(hub.dapp(metadata.clone())?),
    };
    let mut config = ProviderConfig::from_env()
        .unwrap_or_else(|_| ProviderConfig::new("demo"))
        .with_chains(ChainId::all())
        .with_desired_chain(chain)
        .with_metadata(metadata)
        .with_legacy_mode(opts.legacy);
    if opts.direct {
        config = config.with_data_source(source.clone());
    }

    let provider = CardanoProvider::init(config, relay)?;
    let api = provider.enable(None).await?;
    let mode = api.mode().await;
    let enabled = json!({
        "topic": api.topic(),
        "mode": mode.as_str(),
        "network_id": api.get_network_id().await.as_u8(),
        "used_addresses": api.get_used_addresses(None).await?,
        "reward_addresses": api.get_reward_addresses().await?,
        "balance": api.get_balance().await?,
        "collateral": api.get_collateral().await?,
        "witness_set": api.sign_tx("84a400800180020003a0f5f6", false).await?,
    });

    let next = if chain == ChainId::MAINNET { ChainId::PREPROD } else { ChainId::MAINNET };
    let report = connector.switch_chain(next).await?;
    let mut waited = Duration::ZERO;
    while api.chain().await != next && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    debug!(?waited, "chain switch observed");
    let switched = json!({
        "to": next.to_string(),
        "emitted_to": report.emitted_to(),
        "emulator_chain": api.chain().await.to_string(),
        "account": api.account().await.map(|a| a.to_string()),
        "default_chain": provider.default_chain_id().await.ok().map(|c| c.to_string()),
    });

    provider.disconnect().await?;
    shutdown.trigger().await;
    serving.await??;

    Ok(json!({
        "chain": chain_json(&chain),
        "enabled": enabled,
        "chain_switch": switched,
        "sessions_after_disconnect": connector.sessions().await?.len(),
    }))
}
