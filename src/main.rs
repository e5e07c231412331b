use std::{process, sync::Arc};

use staleguard::{
    application::{error::AppError, reports::ReportService},
    cache::{CacheConfig, CacheEngine, ResponseCodec},
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        upstream::UpstreamClient,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    run_serve(settings).await
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let engine = CacheEngine::new(CacheConfig::from(&settings.cache));

    let upstream = UpstreamClient::new(settings.upstream.timeout)?;
    if settings.upstream.sql_base_url.is_none() {
        info!("no default upstream configured; requests must name toriiSqlBaseUrl or toriiBaseUrl");
    }
    let reports = ReportService::new(
        &engine,
        &settings.reports,
        upstream,
        settings.upstream.sql_base_url.clone(),
    );

    let state = HttpState {
        reports: Arc::new(reports),
        codec: ResponseCodec::from(engine.config()),
    };

    engine.start();
    let result = serve_http(&settings, state).await;
    engine.stop();

    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
