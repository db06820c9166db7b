use std::net::SocketAddr;

use anyhow::Context;

use cockpit_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cockpit_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    let app = cockpit_api::app::build_app(&settings)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
