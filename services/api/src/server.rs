use crate::cli::ServeArgs;
use crate::infra::{build_services, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hoa_desk::config::AppConfig;
use hoa_desk::error::AppError;
use hoa_desk::http::{api_router, ApiState};
use hoa_desk::services::{AdminBootstrap, Services};
use hoa_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let services = build_services(&config)?;
    bootstrap_admin(&services, &config)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let api = api_router(ApiState::new(services, config.storage.max_upload_bytes));
    let app = with_operational_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hoa desk api ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn bootstrap_admin(services: &Services, config: &AppConfig) -> Result<(), AppError> {
    let Some(admin) = &config.auth.bootstrap_admin else {
        return Ok(());
    };
    match services
        .users
        .ensure_admin(&admin.name, &admin.email, &admin.password)
    {
        Ok(AdminBootstrap::Created(user)) => {
            info!(user_id = user.meta.id, email = %user.email, "bootstrap administrator created");
            Ok(())
        }
        Ok(AdminBootstrap::Existing(_)) => Ok(()),
        Err(err) => {
            warn!(error = %err, "could not create the bootstrap administrator");
            Err(err.into())
        }
    }
}
