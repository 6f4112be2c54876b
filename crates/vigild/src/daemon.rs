//! Daemon wiring: opens the store, builds the monitor and serves the API.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use vigil_api::{ApiState, build_router};
use vigil_core::{Preferences, VigilConfig};
use vigil_health::checker::{SERVICE_HTTP, SERVICE_HTTPS, SERVICE_SSL_CERTIFICATE};
use vigil_health::{ManualCheckResult, Monitor, MonitorDeps};
use vigil_notify::{ChannelHub, LogMailer, Notifier, TwilioSms};
use vigil_state::{Service, StateStore};

const DB_FILE: &str = "vigil.redb";

/// Run the monitor and API server until Ctrl-C.
pub async fn run(config: VigilConfig) -> anyhow::Result<()> {
    info!("Vigil daemon starting");

    let store = open_store(&config)?;
    let seeded = seed_service_kinds(&store)?;
    if seeded > 0 {
        info!(seeded, "service kinds seeded");
    }

    let state = assemble(&config, store)?;
    let scheduled = state.monitor.start().await?;
    info!(scheduled, "monitor started");

    let monitor = state.monitor.clone();
    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
        })
        .await?;

    monitor.shutdown().await;
    info!("Vigil daemon stopped");
    Ok(())
}

/// Run one manual check against the on-disk store.
pub async fn check_once(
    config: VigilConfig,
    id: u64,
    old_status: &str,
) -> anyhow::Result<ManualCheckResult> {
    let store = open_store(&config)?;
    let state = assemble(&config, store)?;
    Ok(state.monitor.run_manual_check(id, old_status).await)
}

/// Write a scaffolded config file. Refuses to overwrite unless `force`.
pub fn write_scaffold(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, VigilConfig::scaffold().to_toml_string()?)?;
    info!(path = %path.display(), "config written");
    Ok(())
}

fn open_store(config: &VigilConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

/// Insert the built-in service kinds into an empty store.
///
/// Returns how many were written.
pub fn seed_service_kinds(store: &StateStore) -> anyhow::Result<usize> {
    if !store.list_services()?.is_empty() {
        return Ok(0);
    }
    let kinds = [
        (SERVICE_HTTP, "HTTP", "fas fa-server"),
        (SERVICE_HTTPS, "HTTPS", "fas fa-server"),
        (SERVICE_SSL_CERTIFICATE, "SSL Certificate", "fas fa-lock"),
    ];
    for (id, name, icon) in kinds {
        store.put_service(&Service {
            id,
            service_name: name.to_string(),
            icon: icon.to_string(),
            active: true,
            ..Default::default()
        })?;
    }
    Ok(kinds.len())
}

/// Build every collaborator from config and hand back the API state.
pub fn assemble(config: &VigilConfig, store: StateStore) -> anyhow::Result<ApiState> {
    let preferences = Preferences::from(config.preferences.clone());
    let hub = ChannelHub::default();

    let sms = TwilioSms::new(preferences.clone(), config.monitor.probe_timeout())?;
    let notifier =
        Notifier::new(Arc::new(LogMailer), preferences.clone()).with_sms(Arc::new(sms));

    let monitor = Monitor::new(MonitorDeps {
        store: Arc::new(store.clone()),
        broadcaster: Arc::new(hub.clone()),
        notifier: Arc::new(notifier),
        preferences,
        config: config.monitor.clone(),
    });

    Ok(ApiState {
        store,
        monitor,
        hub,
    })
}
