use crate::cli::ServeArgs;
use crate::infra::{default_routing_config, stub_registry, AppState, InMemoryCheckpointStore};
use crate::routes::with_underwriting_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use lending_ai::config::AppConfig;
use lending_ai::error::AppError;
use lending_ai::telemetry;
use lending_ai::workflows::underwriting::{EngineSettings, OrchestrationEngine, RoutingTable};
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryCheckpointStore::default());
    let engine = Arc::new(OrchestrationEngine::new(
        store,
        stub_registry(),
        RoutingTable::new(default_routing_config()),
        EngineSettings::from(&config.engine),
    ));

    let app = with_underwriting_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "loan underwriting orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
