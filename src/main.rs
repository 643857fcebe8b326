use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use secrecy::SecretString;

use columbus_backend::{BackendClient, BackendConfig};
use columbus_browser::{chrome, CdpBrowser, LaunchOptions};
use columbus_engine::{ScanConfig, ScanOrchestrator, ScanServices};
use columbus_settings::{columbus_home, load_settings_from_path, resolve_path, settings_path, ColumbusSettings};
use columbus_store::{Database, ScanHistoryRepo};
use columbus_telemetry::{init_telemetry, TelemetryConfig};

/// Scan orchestrator: drives AI chat destinations in a browser and reports
/// brand visibility to the backend.
#[derive(Debug, Parser)]
#[command(name = "columbus", version)]
struct Cli {
    /// Settings file (defaults to ~/.columbus/settings.json).
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Control server port.
    #[arg(long)]
    port: Option<u16>,

    /// Attach to a browser already listening for DevTools on this port.
    #[arg(long, value_name = "PORT")]
    connect: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path).with_context(|| format!("loading {}", path.display()))?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(port) = cli.connect {
        settings.browser.connect_port = Some(port);
    }

    let home = columbus_home();
    std::fs::create_dir_all(&home).with_context(|| format!("creating {}", home.display()))?;

    let telemetry = init_telemetry(TelemetryConfig {
        filter: settings.logging.level.clone(),
        json: settings.logging.json,
        log_to_sqlite: true,
        log_db_path: resolve_path(&home, &settings.logging.db_path),
    });
    tracing::info!(settings = %path.display(), "starting columbus");

    let db_path = resolve_path(&home, &settings.store.db_path);
    let db = Database::open(&db_path).with_context(|| format!("opening {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "scan history opened");

    let browser = Arc::new(start_browser(&settings, &home).await?);
    let backend = Arc::new(BackendClient::new(BackendConfig {
        base_url: settings.backend.base_url.clone(),
        anon_key: settings.backend.anon_key.clone(),
        access_token: settings.backend.access_token.clone().map(SecretString::from),
        request_timeout: Duration::from_millis(settings.backend.request_timeout_ms),
    })?);

    let orchestrator = Arc::new(ScanOrchestrator::new(
        ScanServices {
            host: browser.clone(),
            channel: browser.clone(),
            prompts: backend.clone(),
            sink: backend,
            history: Some(ScanHistoryRepo::new(db)),
        },
        ScanConfig::from(&settings.scan),
    ));

    let server = columbus_server::start(
        columbus_server::ServerConfig {
            host: settings.server.host.clone(),
            port: settings.server.port,
            ..Default::default()
        },
        Arc::clone(&orchestrator),
        telemetry.logs(),
    )
    .await
    .context("starting control server")?;
    tracing::info!(port = server.port, "columbus ready");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");

    if orchestrator.cancel_scan().await {
        tracing::info!("active scan cancelled");
    }
    orchestrator.join().await;
    server.shutdown();
    browser.shutdown();
    Ok(())
}

async fn start_browser(settings: &ColumbusSettings, home: &std::path::Path) -> Result<CdpBrowser> {
    let browser = &settings.browser;
    let scripts_dir = resolve_path(home, &browser.scripts_dir);
    let command_timeout = Duration::from_millis(browser.command_timeout_ms);

    if let Some(port) = browser.connect_port {
        tracing::info!(port, "connecting to running browser");
        return CdpBrowser::connect(port, scripts_dir, command_timeout)
            .await
            .with_context(|| format!("connecting to browser on port {port}"));
    }

    let configured = browser.chrome_path.as_deref().map(std::path::Path::new);
    let Some(chrome_path) = chrome::find_chrome(configured) else {
        bail!("no Chrome or Chromium binary found; set browser.chromePath or use --connect");
    };
    tracing::info!(path = %chrome_path.display(), "launching browser");
    CdpBrowser::launch(LaunchOptions {
        chrome_path,
        user_data_dir: resolve_path(home, &browser.user_data_dir),
        debugging_port: browser.debugging_port,
        headless: browser.headless,
        scripts_dir,
        command_timeout,
    })
    .await
    .context("launching browser")
}
