use anyhow::Context;
use clap::{Parser, Subcommand};
use lib::config::Settings;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "WhatsApp → Gemini webhook relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway (default when no subcommand is given). Required secrets come from the environment (or .env) and the optional config file; startup fails if any is missing.
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Listen port (default from PORT, config, or 10000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Resolve and validate configuration, print a redacted summary, and exit.
    CheckConfig {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the x-hub-signature-256 header for a request body (for testing the webhook with curl).
    Sign {
        /// App secret (default: APP_SECRET env)
        #[arg(long, value_name = "SECRET")]
        secret: Option<String>,

        /// File holding the exact body bytes; reads stdin when omitted.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // .env may carry RUST_LOG, so it is loaded before the logger reads the environment.
    let dotenv = dotenvy::dotenv();
    logger().init();
    install_panic_hook();
    if let Err(e) = dotenv {
        if !e.not_found() {
            log::warn!("ignoring .env: {}", e);
        }
    }

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            if let Err(e) = run_serve(None, None).await {
                log::error!("relay failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig { config }) => {
            if let Err(e) = run_check_config(config) {
                log::error!("configuration invalid: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign { secret, file }) => {
            if let Err(e) = run_sign(secret, file) {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Logger configured from RUST_LOG, defaulting to info.
fn logger() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
}

/// Log panics through the logger before the default hook prints them.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("uncaught panic: {}", info);
        default_hook(info);
    }));
}

fn resolve_settings(config_path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::debug!("config path: {}", path.display());
    Ok(Settings::from_env(&config)?)
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let mut settings = resolve_settings(config_path)?;
    if let Some(p) = port {
        settings.port = p;
    }
    log::info!("configuration validated");
    log::info!("phone number id: {}", settings.whatsapp.phone_number_id);
    log::info!("gemini model: {}", settings.gemini.model);
    log::info!(
        "starting relay v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        settings.bind,
        settings.port
    );
    lib::gateway::run_gateway(settings).await
}

fn run_check_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let s = resolve_settings(config_path)?;
    println!("listen:          {}:{}", s.bind, s.port);
    println!("service:         {}", s.service_name);
    println!("timeout:         {}s", s.timeout.as_secs());
    println!("phone number id: {}", s.whatsapp.phone_number_id);
    println!("whatsapp token:  {}", redact(&s.whatsapp.access_token));
    println!("app secret:      {}", redact(&s.whatsapp.app_secret));
    println!("verify token:    {}", redact(&s.whatsapp.verify_token));
    println!(
        "graph api:       {}/{}",
        s.whatsapp.api_base_url, s.whatsapp.api_version
    );
    println!("gemini api:      {}", s.gemini.api_base_url);
    println!("gemini key:      {}", redact(&s.gemini.api_key));
    println!("gemini model:    {}", s.gemini.model);
    println!("persona:         {}", s.persona.name);
    Ok(())
}

fn run_sign(secret: Option<String>, file: Option<PathBuf>) -> anyhow::Result<()> {
    let secret = secret
        .or_else(|| std::env::var("APP_SECRET").ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("no secret: pass --secret or set APP_SECRET"))?;
    let body = match file {
        Some(path) => {
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };
    println!("{}", lib::signature::sign_payload(&secret, &body));
    Ok(())
}

/// First four characters followed by an ellipsis; short values are fully masked.
fn redact(value: &str) -> String {
    if value.chars().count() <= 8 {
        "****".to_string()
    } else {
        let head: String = value.chars().take(4).collect();
        format!("{}…", head)
    }
}
