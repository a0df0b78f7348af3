use std::path::PathBuf;

use actix_web::{App, HttpServer, middleware, web};
use analysis_gateway::api::api_handlers::{configure, json_config};
use analysis_gateway::api::api_objects::AppState;
use analysis_gateway::utils::load_config;
use analysis_gateway::worker::start_gateway;
use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Single-slot HTTP gateway in front of an external analysis tool.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML config file.
    #[arg(long, env = "ANALYSIS_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `bind_address` from the config.
    #[arg(long, env = "ANALYSIS_GATEWAY_BIND")]
    bind: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_config(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let gateway = start_gateway(&config).await?;
    let state = web::Data::new(AppState {
        admission: gateway.admission,
        pt_element: config.invocation.pt_list.element,
    });
    let max_request_bytes = config.max_request_bytes;

    info!(
        bind = %config.bind_address,
        executable = %config.executable_path.display(),
        "server started"
    );
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(json_config(max_request_bytes))
            .configure(configure)
    })
    .bind(&config.bind_address)
    .with_context(|| format!("failed to bind {}", config.bind_address))?
    .run()
    .await?;

    Ok(())
}
