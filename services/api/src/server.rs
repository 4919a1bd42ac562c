use crate::cli::ServeArgs;
use crate::infra::{seed_houses, seed_identity, AppState, SandboxPaymentGateway};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rental_hub::config::AppConfig;
use rental_hub::error::AppError;
use rental_hub::telemetry;
use rental_hub::workflows::rental_requests::{InMemoryRequestStore, RentalRequestService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let store = Arc::new(InMemoryRequestStore::new());
    let houses = Arc::new(seed_houses());
    let gateway = Arc::new(SandboxPaymentGateway::new(
        config.payments.checkout_base_url.clone(),
    ));
    let service = Arc::new(RentalRequestService::new(
        store,
        houses,
        gateway,
        config.pagination,
    ));

    let app = with_service_routes(service, Arc::new(seed_identity()))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "rental request service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
