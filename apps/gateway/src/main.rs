use std::sync::Arc;

use anyhow::Context;
use axum::Router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let boot = gateway_core::bootstrap::bootstrap_from_env().await?;

    let app = Router::new()
        .merge(gateway_router::proxy_router(boot.state.clone()))
        .nest(
            "/admin",
            gateway_router::admin_router(
                boot.state.clone(),
                boot.config.admin_jwt_secret.clone(),
                boot.factories.clone(),
                boot.cipher.clone(),
            ),
        );

    let bind = format!("{}:{}", boot.config.server.host, boot.config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding to {bind}"))?;
    tracing::info!(event = "listening", addr = %bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // `app` (and every `Arc<GatewayState>` clone it held) was dropped when
    // the `Serve` future above finished, so `boot.state` is down to its own
    // handle here -- aside from these background tasks, which are joined
    // (not just aborted) so any `Arc` clones they hold are gone before the
    // unwrap below.
    for handle in boot.background {
        handle.abort();
        let _ = handle.await;
    }

    match Arc::try_unwrap(boot.state) {
        Ok(state) => match Arc::try_unwrap(state.telemetry) {
            Ok(telemetry) => telemetry.shutdown().await,
            Err(_) => tracing::warn!(event = "telemetry_shutdown_skipped", reason = "bus still referenced"),
        },
        Err(_) => tracing::warn!(event = "telemetry_shutdown_skipped", reason = "gateway state still referenced"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
