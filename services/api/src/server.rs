use crate::cli::ServeArgs;
use crate::infra::{seed_demo_posts, AppState, Engine};
use crate::routes::with_transaction_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lendhub::config::AppConfig;
use lendhub::error::AppError;
use lendhub::telemetry;
use lendhub::workflows::transactions::{spawn_rental_scheduler, StaticUserDirectory};
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

    if config.administrators.is_empty() {
        warn!("APP_ADMIN_IDS is empty; verification requests cannot be reviewed");
    }
    let engine = Engine::new(StaticUserDirectory::new(config.administrators.clone()));
    if args.seed_demo {
        let seeded = seed_demo_posts(&engine.store)?;
        info!(seeded, "demo posts loaded");
    }

    let scheduler_task = if config.scheduler.enabled {
        Some(spawn_rental_scheduler(
            engine.scheduler.clone(),
            config.scheduler.period(),
        ))
    } else {
        info!("rental scheduler disabled");
        None
    };

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        dispatcher: engine.dispatcher.clone(),
    };

    let app = with_transaction_routes(engine.service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "transaction engine ready");

    let served = axum::serve(listener, app).await;
    if let Some(task) = scheduler_task {
        task.abort();
    }
    served?;
    Ok(())
}
