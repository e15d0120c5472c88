//! Concord admin server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use concord_admin::auth::{Role, UserDirectory};
use concord_admin::routes::build_router;
use concord_admin::{build_plane, AdminConfig};
use concord_governance::MockLlmClient;

fn users_from_env() -> UserDirectory {
    let admin_password =
        std::env::var("CONCORD_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let operator_password =
        std::env::var("CONCORD_OPERATOR_PASSWORD").unwrap_or_else(|_| "operator".to_string());
    let auditor_password =
        std::env::var("CONCORD_AUDITOR_PASSWORD").unwrap_or_else(|_| "auditor".to_string());

    UserDirectory::new()
        .with_user("admin", &admin_password, Role::Admin)
        .with_user("operator", &operator_password, Role::Operator)
        .with_user("auditor", &auditor_password, Role::Auditor)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(
                std::env::var("CONCORD_LOG").unwrap_or_else(|_| "info".to_string()),
            )
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AdminConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    // The dev server runs against the scripted LLM client; a real provider
    // plugs in through the same port.
    let plane = build_plane(config, users_from_env(), Arc::new(MockLlmClient::new())).await;

    // Background arbitration: sweep pending proposals into decisions.
    let cycle_plane = Arc::new(plane);
    let sweeper = cycle_plane.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let summary = sweeper.run_arbitration_cycle().await;
            if summary.conflicts_resolved + summary.singles_resolved > 0 {
                tracing::debug!(
                    conflicts = summary.conflicts_resolved,
                    singles = summary.singles_resolved,
                    "arbitration cycle completed"
                );
            }
        }
    });

    let app = build_router(cycle_plane.state.clone());

    tracing::info!("concord admin server listening on http://{bind_addr}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
