use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use volt_core::{
    build_memory, build_services, decode, ensure_skeleton_config, load_config, validate_config,
    Normalizer, VoltConfig,
};
use volt_server::AppState;

#[derive(Parser)]
#[command(name = "volt", version, about = "Volt chat relay, memory and conversation service")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.volt",
        help = "Config root directory (contains config/, data/ and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP server")]
    Start {
        #[arg(long, help = "Override server.port from main.yaml")]
        port: Option<u16>,
    },
    #[command(about = "Validate config/main.yaml")]
    Validate,
    #[command(about = "Normalize a conversation export and print canonical JSON")]
    Normalize {
        #[arg(help = "JSON or newline-delimited JSON file")]
        file: PathBuf,
        #[arg(long, help = "Pretty-print the output")]
        pretty: bool,
    },
    #[command(subcommand, about = "Inspect and write the memory store")]
    Memory(MemoryCommands),
}

#[derive(Subcommand)]
enum MemoryCommands {
    #[command(about = "Save a context record and update the latest pointer")]
    SaveContext {
        #[arg(help = "Context text")]
        text: String,
    },
    #[command(about = "Show the latest context record")]
    Latest,
    #[command(about = "List stored keys with sizes")]
    List,
    #[command(about = "Print the context-restoration prompt")]
    GenerateContext,
}

fn expand_home(path: &Path) -> PathBuf {
    if path.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(path.strip_prefix("~").unwrap_or(path));
        }
    }
    path.to_path_buf()
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    cli.config_root = expand_home(&cli.config_root);

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "volt.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Start { port } => {
            start_server(&cli.config_root, port).await?;
        }
        Commands::Validate => {
            let config = load_config(&cli.config_root.join("config"))?;
            validate_config(&config)?;
            println!(
                "Config valid. provider={:?} model={} memory={:?} listen={}:{}",
                config.chat.provider,
                config.chat.model,
                config.memory.backend,
                config.server.bind,
                config.server.port
            );
        }
        Commands::Normalize { file, pretty } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let decoded = decode(&text)?;
            let normalized = Normalizer::new().normalize_decoded(&decoded);
            let output = if pretty {
                serde_json::to_string_pretty(&normalized)?
            } else {
                serde_json::to_string(&normalized)?
            };
            println!("{output}");
        }
        Commands::Memory(cmd) => {
            run_memory_command(&cli.config_root, cmd).await?;
        }
    }

    Ok(())
}

async fn start_server(root: &Path, port: Option<u16>) -> Result<()> {
    ensure_skeleton_config(root, port.unwrap_or(3000))?;
    let mut config = load_config(&root.join("config"))?;
    if let Some(port) = port {
        config.server.port = port;
    }
    validate_config(&config)?;

    let services = build_services(root, &config)?;
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    tracing::info!(
        echo = services.relay.is_echo(),
        model = %services.relay.model(),
        "starting volt on {addr}"
    );
    volt_server::serve(AppState::from(services), &addr).await
}

fn load_memory_config(root: &Path) -> Result<VoltConfig> {
    let config_dir = root.join("config");
    if config_dir.join(volt_core::MAIN_CONFIG_FILE).exists() {
        let config = load_config(&config_dir)?;
        validate_config(&config)?;
        Ok(config)
    } else {
        Ok(VoltConfig::default())
    }
}

async fn run_memory_command(root: &Path, cmd: MemoryCommands) -> Result<()> {
    let config = load_memory_config(root)?;
    let store = build_memory(root, &config.memory)?;

    match cmd {
        MemoryCommands::SaveContext { text } => {
            let ack = store.save_context(&text).await?;
            println!("Saved {}", ack.key);
        }
        MemoryCommands::Latest => match store.fetch_latest_context().await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("No context saved yet."),
        },
        MemoryCommands::List => {
            let entries = store.list_entries().await?;
            if entries.is_empty() {
                println!("Memory store is empty.");
            }
            for entry in entries {
                println!("{:>8}  {}", entry.size, entry.key);
            }
        }
        MemoryCommands::GenerateContext => {
            println!("{}", store.generate_context().await?);
        }
    }
    Ok(())
}
