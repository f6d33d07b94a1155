// SPDX-FileCopyrightText: 2026 Roomport Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `roomport serve` command implementation.
//!
//! Wires the durable stores, the Matrix client, the import worker, and the
//! webhook server together. The import gate is seeded from the persisted
//! queue length so jobs enqueued before a restart are processed without any
//! external signal.

use std::path::PathBuf;
use std::sync::Arc;

use roomport_appservice::{AppState, DispatcherSettings};
use roomport_config::RoomportConfig;
use roomport_core::{ImportGate, RoomportError};
use roomport_import::{ImportWorker, WorkerSettings};
use roomport_matrix::MatrixClient;
use roomport_storage::{Database, SPACE_ID_KEY, StoreContext};
use tracing::{info, warn};

/// Runs the `roomport serve` command.
pub async fn run_serve(config: RoomportConfig) -> Result<(), RoomportError> {
    init_tracing(&config.log_level);
    info!("starting roomport serve");

    let database = Database::open(&config.storage.database_path).await?;
    let stores = Arc::new(StoreContext::open(&database).await?);
    info!(
        path = config.storage.database_path.as_str(),
        "database opened, stores materialized"
    );

    // Seed well-known config keys so command-driven updates always find
    // their row. The file value only applies on first boot; the store wins
    // afterwards so runtime updates survive restart.
    stores
        .config
        .ensure(
            SPACE_ID_KEY,
            config.import.space_id.as_deref().unwrap_or_default(),
        )
        .await?;

    let client = Arc::new(MatrixClient::new(
        &config.homeserver.url,
        &config.appservice.as_token,
        &config.appservice.admin_token,
    )?);

    let bot_user_id = config.bot_user_id();
    if let Err(e) = client
        .setup_bot_profile(&bot_user_id, &config.bot.displayname)
        .await
    {
        warn!(error = %e, "bot profile setup failed, continuing");
    }
    match client.ping(&config.appservice.id).await {
        Ok(pong) => info!(duration_ms = pong.duration_ms, "homeserver ping ok"),
        Err(e) => warn!(error = %e, "homeserver ping failed, continuing"),
    }

    let backlog = stores.queue.len().await;
    let gate = Arc::new(ImportGate::new(backlog));
    info!(backlog, "import gate seeded from persisted queue");

    let worker = ImportWorker::new(
        client.clone(),
        stores.clone(),
        gate.clone(),
        WorkerSettings {
            bot_user_id: bot_user_id.clone(),
            server_name: config.homeserver.server_name.clone(),
        },
    );
    tokio::spawn(worker.run());

    let state = AppState {
        client,
        stores,
        gate,
        settings: Arc::new(DispatcherSettings {
            bot_user_id,
            allow_users: config.bot.allow_users.clone(),
            hs_token: config.appservice.hs_token.clone(),
            import_dir: PathBuf::from(&config.storage.import_dir),
        }),
    };

    roomport_appservice::start_server(&config.appservice.host, config.appservice.port, state).await
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("roomport={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
