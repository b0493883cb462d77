use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use xccepta_core::{ChannelId, Drops, Keypair};
use xccepta_kiosk::{init_logging, Kiosk, KioskConfig, KioskOptions, LogFormat, ProcessReport};

#[derive(Parser)]
#[command(
    name = "xccepta-kiosk",
    about = "Offline payment-channel claim acceptance for vending kiosks"
)]
struct Cli {
    /// Path to a TOML configuration file. Environment variables override it.
    #[arg(long, env = "XCCEPTA_CONFIG")]
    config: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Log filter, e.g. "info" or "debug,xccepta_vend=trace".
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one claim file ("-" for stdin) and dispense on approval.
    Process {
        file: PathBuf,

        /// Do not look up missing keys on the ledger.
        #[arg(long)]
        offline: bool,

        /// Do not drive the vending hardware.
        #[arg(long)]
        no_vend: bool,

        /// Do not forward the claim to the settlement backend.
        #[arg(long)]
        no_settlement: bool,
    },

    /// Show exposure state for one channel, or all known channels.
    Status { channel: Option<String> },

    /// Record a settlement confirmed on the ledger.
    Settle { channel: String, amount: u64 },

    /// List accepted claims with no confirmed dispense.
    Undispensed,

    /// Sign a claim with a test seed, as a buyer device would.
    MakeClaim {
        /// 32-byte Ed25519 seed, hex.
        #[arg(long)]
        seed: String,

        #[arg(long)]
        channel: String,

        #[arg(long)]
        amount: u64,

        /// Omit the public key so the kiosk must resolve it.
        #[arg(long)]
        no_pubkey: bool,
    },

    /// Register this kiosk with the settlement backend.
    Register,

    /// Check the settlement backend.
    Health,

    /// Ask the settlement backend to settle queued claims now.
    SettleNow,

    /// Show settlement receipts from the backend.
    Receipts {
        /// Record each receipt's settled amount in the local exposure state.
        #[arg(long)]
        apply: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "human" => Ok(LogFormat::Human),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format {:?}", other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = KioskConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_logging(
        cli.log_format.unwrap_or(config.log.format),
        cli.log_level.as_deref().unwrap_or(&config.log.level),
    )?;
    if let Some(path) = &cli.config {
        tracing::debug!("loaded config from {}", path.display());
    }

    match cli.command {
        Command::Process {
            file,
            offline,
            no_vend,
            no_settlement,
        } => {
            let text = read_claim(&file)?;
            let options = KioskOptions {
                offline,
                no_settlement,
            };
            let kiosk = open_kiosk(config, options, no_vend).await?;
            let mut report = kiosk.process_json(&text).await?;
            if let Some(status) = report.settlement_status().await {
                tracing::debug!(?status, "settlement notification finished");
            }
            print_report(&report)?;
            kiosk.shutdown().await;
            Ok(exit_code(&report))
        }

        Command::Status { channel } => {
            let kiosk = Kiosk::open(config, offline_options())?;
            let states = match channel {
                Some(hex) => vec![kiosk.ledger().status(&parse_channel(&hex)?).await?],
                None => kiosk.ledger().channels().await?,
            };
            let cap = kiosk.ledger().cap();
            let rows: Vec<_> = states
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "channel_id": s.channel_id.to_hex(),
                        "last_seen_amount": s.last_seen_amount.get(),
                        "settled_amount": s.settled_amount.get(),
                        "outstanding": s.outstanding().get(),
                        "headroom": cap.get().saturating_sub(s.outstanding().get()),
                        "updated_at": s.updated_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Settle { channel, amount } => {
            let kiosk = Kiosk::open(config, offline_options())?;
            let channel = parse_channel(&channel)?;
            let advanced = kiosk.ledger().record_settlement(&channel, Drops(amount)).await?;
            if !advanced {
                println!("settled amount already at or above {}", amount);
            }
            let state = kiosk.ledger().status(&channel).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Undispensed => {
            let kiosk = Kiosk::open(config, offline_options())?;
            let rows: Vec<_> = kiosk
                .ledger()
                .list_undispensed()
                .await?
                .into_iter()
                .map(|e| {
                    serde_json::json!({
                        "digest": e.digest.to_hex(),
                        "channel_id": e.channel_id.to_hex(),
                        "amount": e.amount.get(),
                        "device_id": e.device_id,
                        "accepted_at": e.accepted_at,
                        "status": format!("{:?}", e.status).to_lowercase(),
                        "detail": e.detail,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(ExitCode::SUCCESS)
        }

        Command::MakeClaim {
            seed,
            channel,
            amount,
            no_pubkey,
        } => {
            let keypair = Keypair::from_seed_hex(&seed).context("invalid seed")?;
            let mut claim = keypair
                .sign_claim(&channel, Drops(amount))
                .context("cannot sign claim")?
                .with_generated_at(chrono::Utc::now().to_rfc3339());
            if no_pubkey {
                claim.pubkey = None;
            }
            println!("{}", claim.to_json_pretty()?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Register => {
            let kiosk = Kiosk::open(config, backend_options())?;
            let sink = kiosk
                .settlement()
                .context("settlement backend is disabled")?;
            sink.register_device(&kiosk.config().device_id, kiosk.config().exposure_cap())
                .await?;
            println!("registered {} with {}", kiosk.config().device_id, sink.base_url());
            Ok(ExitCode::SUCCESS)
        }

        Command::Health => {
            let kiosk = Kiosk::open(config, backend_options())?;
            let sink = kiosk
                .settlement()
                .context("settlement backend is disabled")?;
            println!("{}", sink.health().await?);
            Ok(ExitCode::SUCCESS)
        }

        Command::SettleNow => {
            let kiosk = Kiosk::open(config, backend_options())?;
            let sink = kiosk
                .settlement()
                .context("settlement backend is disabled")?;
            let reply = sink.settle_now().await?;
            match (reply.ok, reply.tx_hash) {
                (true, tx_hash) => {
                    println!("settled, tx {}", tx_hash.as_deref().unwrap_or("?"));
                    Ok(ExitCode::SUCCESS)
                }
                (false, _) => {
                    println!("backend declined to settle");
                    Ok(ExitCode::from(2))
                }
            }
        }

        Command::Receipts { apply } => {
            let kiosk = Kiosk::open(config, backend_options())?;
            let sink = kiosk
                .settlement()
                .context("settlement backend is disabled")?;
            let receipts = sink.receipts().await?;
            println!("{}", serde_json::to_string_pretty(&receipts)?);
            if apply {
                let applied = kiosk.ledger().apply_receipts(&receipts).await?;
                println!("{} channel(s) advanced", applied);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn offline_options() -> KioskOptions {
    KioskOptions {
        offline: true,
        no_settlement: true,
    }
}

fn backend_options() -> KioskOptions {
    KioskOptions {
        offline: true,
        no_settlement: false,
    }
}

fn read_claim(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn parse_channel(hex: &str) -> anyhow::Result<ChannelId> {
    ChannelId::from_hex(hex).with_context(|| format!("invalid channel id {:?}", hex))
}

/// Open the kiosk and, unless disabled, connect the vending hardware first.
///
/// A failed connect is not fatal: an approved claim is then recorded as
/// undispensed.
async fn open_kiosk(config: KioskConfig, options: KioskOptions, no_vend: bool) -> anyhow::Result<Kiosk> {
    if no_vend {
        return Ok(Kiosk::open(config, options)?);
    }

    #[cfg(feature = "ble")]
    {
        let (kiosk, mut events) =
            Kiosk::open_with_link(config, options, xccepta_kiosk::vend::BtleplugLink::new())?;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    xccepta_kiosk::vend::VendEvent::Telemetry(text) => {
                        tracing::info!(telemetry = %text, "vend device");
                    }
                    xccepta_kiosk::vend::VendEvent::Disconnected => {
                        tracing::warn!("vend device disconnected");
                    }
                }
            }
        });
        match kiosk.connect_vend().await {
            Ok(device) => tracing::info!(device = %device.id, name = ?device.name, "vend device connected"),
            Err(e) => tracing::warn!(error = %e, "vend device unavailable"),
        }
        Ok(kiosk)
    }

    #[cfg(not(feature = "ble"))]
    {
        tracing::warn!("built without Bluetooth support; vend disabled");
        Ok(Kiosk::open(config, options)?)
    }
}

fn print_report(report: &ProcessReport) -> anyhow::Result<()> {
    let mut out = serde_json::to_value(report.outcome)?;
    if let Some(map) = out.as_object_mut() {
        if let Some(vend) = &report.vend {
            map.insert("vend".into(), serde_json::to_value(vend)?);
        }
        if let Some(digest) = &report.digest {
            map.insert("digest".into(), digest.to_hex().into());
        }
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn exit_code(report: &ProcessReport) -> ExitCode {
    if report.outcome.is_approved() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
