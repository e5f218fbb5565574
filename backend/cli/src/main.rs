mod output;
mod script;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use exthost_config::{ExtensionConfig, RuntimeConfig};
use exthost_core::{EventKind, PlatformInfo, UpdateSource};
use exthost_events::ListenerRef;
use exthost_logging::AuditListener;
use exthost_runtime::{
    ChannelReloadHandler, ChannelTransport, ExtensionManifest, ExtensionRuntime, HttpUpdateSource,
    UpdateChecker,
};

use output::{note_error, note_info, note_success, note_warn, EventPrinter};
use script::Outcome;

/// Extension id used when neither the config nor the manifest names one.
const FALLBACK_EXTENSION_ID: &str = "extension";

#[derive(Parser)]
#[command(name = "exthost")]
#[command(about = "Extension runtime host: modules, permissions, updates and events")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file with every default filled in
    Init {
        /// Extension id to record
        #[arg(long)]
        id: Option<String>,
        /// Replace an existing config (the old one is kept as a backup)
        #[arg(long)]
        force: bool,
    },
    /// Print the detected platform as JSON
    Platform,
    /// Compare a version against an update endpoint
    CheckUpdate {
        /// Currently installed version
        #[arg(long)]
        current: String,
        /// Update endpoint; defaults to `updates.url` from the config
        #[arg(long)]
        url: Option<String>,
    },
    /// Replay a YAML command script against a fresh runtime
    Run {
        #[arg(short, long)]
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| exthost_config::config_file_path(&exthost_config::config_dir()));
    let config = exthost_config::load_and_prepare(&config_path).await?;

    let log_dir = config
        .logging
        .as_ref()
        .and_then(|l| l.dir.clone())
        .unwrap_or_else(|| exthost_config::config_dir().join("logs"));
    if !exthost_logging::init_logger(&log_dir, config.log_level()) {
        note_warn("Logging was already initialised; continuing");
    }
    debug!(path = %config_path.display(), "Config ready");

    match cli.command {
        Commands::Init { id, force } => init_config(&config_path, id, force).await?,
        Commands::Platform => {
            let platform = PlatformInfo::current()?;
            println!("{}", serde_json::to_string_pretty(&platform)?);
        }
        Commands::CheckUpdate { current, url } => {
            let url = url.or_else(|| config.update_url().map(String::from));
            let Some(url) = url else {
                note_error("No update URL given and none configured (updates.url)");
                std::process::exit(2);
            };
            let source = HttpUpdateSource::new(url, update_timeout(&config))?;
            let check = UpdateChecker::new(current, Arc::new(source)).check().await;
            println!("{}", serde_json::to_string_pretty(&check)?);
        }
        Commands::Run { script } => run_script(&config, &script).await?,
    }

    Ok(())
}

async fn init_config(path: &Path, id: Option<String>, force: bool) -> Result<()> {
    if path.exists() && !force {
        note_error(&format!("{} already exists; pass --force to replace it", path.display()));
        std::process::exit(1);
    }
    let config = exthost_config::apply_all_defaults(RuntimeConfig {
        extension: Some(ExtensionConfig { id, ..Default::default() }),
        ..Default::default()
    });
    exthost_config::write_config(&config, path).await?;
    note_success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn update_timeout(config: &RuntimeConfig) -> Duration {
    let secs = config
        .updates
        .as_ref()
        .and_then(|u| u.timeout_secs)
        .unwrap_or(exthost_config::defaults::DEFAULT_UPDATE_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

async fn build_runtime(config: &RuntimeConfig) -> Result<ExtensionRuntime> {
    let extension = config.extension.clone().unwrap_or_default();

    let manifest = match &extension.manifest_path {
        Some(path) => ExtensionManifest::load(path).await?,
        None => ExtensionManifest::default(),
    };
    let extension_id = config
        .extension_id()
        .or(manifest.name())
        .unwrap_or(FALLBACK_EXTENSION_ID)
        .to_string();

    let (reload, mut reload_rx) = ChannelReloadHandler::new();
    tokio::spawn(async move {
        while let Some(request) = reload_rx.recv().await {
            note_info(&format!("reload request #{} accepted", request.sequence));
        }
    });

    let (transport, mut outbound) = ChannelTransport::new();
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            info!(message_id = %message.id, sender = %message.sender, "Outbound message");
            note_info(&format!("outbound message {}: {}", message.id, message.payload));
        }
    });

    let mut builder = ExtensionRuntime::builder(extension_id)
        .manifest(manifest)
        .enabled(extension.enabled.unwrap_or(true))
        .listener_timeout(Duration::from_millis(
            extension
                .listener_timeout_ms
                .unwrap_or(exthost_config::defaults::DEFAULT_LISTENER_TIMEOUT_MS),
        ))
        .reload_handler(Arc::new(reload))
        .message_transport(Arc::new(transport));
    if let Some(version) = extension.version {
        builder = builder.version(version);
    }
    if let Some(url) = config.update_url() {
        let source: Arc<dyn UpdateSource> =
            Arc::new(HttpUpdateSource::new(url, update_timeout(config))?);
        builder = builder.update_source(source);
    }

    Ok(builder.build()?)
}

async fn run_script(config: &RuntimeConfig, path: &Path) -> Result<()> {
    let steps = script::load_script(path).await?;
    let runtime = build_runtime(config).await.context("Failed to start runtime")?;

    let audit: ListenerRef = Arc::new(AuditListener::new(runtime.extension_id()));
    let printer: ListenerRef = Arc::new(EventPrinter);
    for kind in EventKind::ALL {
        let handler = runtime.on(kind);
        handler.add_listener(audit.clone()).await;
        handler.add_listener(printer.clone()).await;
    }

    note_info(&format!(
        "{} v{} on {}/{}: replaying {} step(s)",
        runtime.extension_id(),
        runtime.current_version(),
        runtime.get_platform_info().await.os,
        runtime.get_platform_info().await.arch,
        steps.len()
    ));

    let outcomes = script::replay(&runtime, &steps).await;
    let rejected = outcomes.iter().filter(|o| matches!(o, Outcome::Rejected(_))).count();
    for (index, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Outcome::Done(summary) => note_success(&format!("[{index}] {summary}")),
            Outcome::Rejected(reason) => note_warn(&format!("[{index}] {reason}")),
        }
    }

    let modules = runtime.get_modules().await;
    let permissions = runtime.get_permissions().await;
    print!("\n{}", output::render_snapshot(&modules, &permissions));
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "modules": modules,
        "permissions": permissions,
    }))?);

    if rejected > 0 {
        note_warn(&format!("{rejected} step(s) rejected"));
    }
    Ok(())
}
