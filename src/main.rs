use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use orderflow as api;
use orderflow::courier::{HttpCourierProvider, HttpCourierSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let provider = HttpCourierProvider::new(HttpCourierSettings::from(&cfg.courier))
        .context("failed to build courier provider")?;
    info!(provider = %cfg.courier.provider, "Courier provider configured");

    // Standalone mode keeps state in memory; embedders supply their own repositories
    let repositories = api::repositories::Repositories::in_memory(cfg.payment_methods.clone());
    let addr = cfg.server_addr();
    let (state, event_rx) = api::AppState::build(
        cfg,
        repositories,
        Arc::new(provider),
        Arc::new(api::clock::SystemClock),
    );

    tokio::spawn(api::events::process_events(event_rx));

    let leads = state.leads.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let removed = leads.prune_idle();
            if removed > 0 {
                info!(removed, "dropped idle lead sessions");
            }
        }
    });

    let app = api::app(state);

    info!("orderflow listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
