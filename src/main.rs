//! # Task Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor HTTP/1.0. La configuración entra por
//! variables de entorno; SIGINT/SIGTERM cierran el Job Manager y el
//! proceso sale con código 0.

use task_server::config::Config;
use task_server::server::Server;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::new();
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "configuración inválida");
        std::process::exit(1);
    }
    config.log_summary();

    let server = Server::new(config);

    // Apagado ordenado: cerrar el Job Manager y salir limpio
    let jobs = server.jobs();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("señal recibida, cerrando");
        jobs.close();
        std::process::exit(0);
    }) {
        tracing::warn!(error = %e, "no se pudo instalar el handler de señales");
    }

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "el listener no pudo iniciarse");
        std::process::exit(1);
    }
}
