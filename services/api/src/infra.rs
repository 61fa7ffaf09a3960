use chrono::NaiveDate;
use hoa_desk::config::AppConfig;
use hoa_desk::error::AppError;
use hoa_desk::services::{ServiceContext, Services};
use hoa_desk::storage::LocalDisk;
use hoa_desk::store::Store;
use metrics_exporter_prometheus::PrometheusHandle;
use mockable::DefaultClock;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Open the store and public disk named by the configuration and wire the services.
pub(crate) fn build_services(config: &AppConfig) -> Result<Services, AppError> {
    let store = match &config.storage.data_path {
        Some(path) => {
            info!(path = %path.display(), "opening database snapshot");
            Store::open(path)?
        }
        None => {
            info!("running with an in-memory database");
            Store::in_memory()
        }
    };

    std::fs::create_dir_all(&config.storage.root)?;
    let disk = LocalDisk::new(&config.storage.root, config.storage.public_url.clone());

    let context = ServiceContext::new(store, Arc::new(DefaultClock), Arc::new(disk))
        .with_billing(config.billing.clone())
        .with_token_ttl_hours(config.auth.token_ttl_hours);
    Ok(Services::new(context))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
