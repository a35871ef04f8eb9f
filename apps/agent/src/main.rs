#![warn(clippy::all, clippy::pedantic)]

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use actix_web::{App, HttpServer, web};
use checkup::rpc;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod agent;
mod cli;
mod config;
mod error;
mod routes;
mod server;

use agent::Agent;
use cli::Cli;
use config::Config;
use error::AppError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_config(cli.config.as_ref())?;
    if cli.standalone {
        config.standalone = true;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    logger::init_with(&config.log);
    if cli.print_config {
        println!("{config}");
    }

    let result = run(config).await;
    if let Err(err) = &result {
        error!("agent stopped: {err}");
    }
    result
}

async fn run(config: Config) -> Result<(), AppError> {
    let agent = Arc::new(Agent::new(&config)?);
    agent.add_config_checks(&config.checks).await?;
    info!(checks = config.checks.len(), standalone = config.standalone, "agent started");

    let token = CancellationToken::new();

    let rpc_server = if config.standalone {
        None
    } else {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        let listener = TcpListener::bind(addr).await?;
        Some(tokio::spawn(rpc::serve(listener, Arc::clone(&agent), token.clone())))
    };

    let status_server = match config.status_port {
        Some(port) => {
            let data = web::Data::from(Arc::clone(&agent));
            let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
                .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?
                .disable_signals()
                .run();
            info!(port, "status endpoint listening");
            let handle = server.handle();
            actix_web::rt::spawn(server);
            Some(handle)
        }
        None => None,
    };

    let exporter = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.run().await })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!("failed to listen for ctrl-c: {err}");
            }
            info!("shutting down");
        }
        () = agent.manager().wait() => {}
    }

    token.cancel();
    agent.stop(SHUTDOWN_TIMEOUT).await;

    if let Some(handle) = status_server {
        handle.stop(true).await;
    }
    if let Some(rpc_server) = rpc_server {
        match rpc_server.await {
            Ok(Err(err)) => warn!("RPC server failed: {err}"),
            Err(err) => warn!("RPC server panicked: {err}"),
            Ok(Ok(())) => {}
        }
    }
    if let Err(err) = exporter.await {
        warn!("export loop panicked: {err}");
    }

    info!("agent stopped");
    Ok(())
}
