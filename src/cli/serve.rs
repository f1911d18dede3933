use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::core::config::AppConfig;
use crate::core::lifecycle::LifecycleManager;
use crate::core::store::Store;
use crate::core::terminal::{GuideSection, print_warn};
use crate::core::vault::TokenCipher;
use crate::interfaces::web::{ApiServer, AppState};
use crate::platform::{NativePlatform, Platform};

const DATABASE_FILE: &str = "consultflow.db";

/// Relative log paths live in the data directory.
fn resolve_log_file(config: &AppConfig, data_dir: &std::path::Path) -> Option<PathBuf> {
    config.log_file.as_ref().map(|p| {
        if p.is_absolute() {
            p.clone()
        } else {
            data_dir.join(p)
        }
    })
}

pub(super) async fn run_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let data_dir = NativePlatform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    NativePlatform::restrict_dir_permissions(&data_dir);

    let config = AppConfig::load(&data_dir)?.with_overrides(host, port);
    crate::logging::init(
        &config.log_level,
        resolve_log_file(&config, &data_dir).as_deref(),
    )?;

    if config.uses_default_session_secret() {
        print_warn("SESSION_SECRET is not set. Set it before storing real credentials.");
    }

    let store = Store::open(
        &data_dir.join(DATABASE_FILE),
        TokenCipher::new(&config.session_secret),
    )?;
    let frontend_url = config.frontend_url.clone();
    let state = AppState::from_config(config, store)?;

    let server = Arc::new(Mutex::new(ApiServer::new(state)));
    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(server.clone());
    lifecycle.start().await?;

    let bound = server
        .lock()
        .await
        .bound_addr()
        .map(|a| format!("http://{}", a))
        .unwrap_or_default();
    GuideSection::new("consultflow")
        .status("API", &bound)
        .status("Frontend", &frontend_url)
        .status("Data", &data_dir.display().to_string())
        .blank()
        .text("Press Ctrl+C to stop.")
        .print();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await
}
