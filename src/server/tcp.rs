//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Implementación del servidor TCP que maneja múltiples conexiones
//! simultáneas usando threads: una conexión, un thread, un request,
//! una respuesta, `Connection: close`.

use crate::config::Config;
use crate::http::{split_target, ParseError, Request, Response};
use crate::jobs::JobManager;
use crate::router::Dispatcher;
use crate::util;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Estado del proceso que alimenta `/status`
#[derive(Clone)]
struct Runtime {
    started: Instant,
    started_at: DateTime<Utc>,
    connections: Arc<AtomicU64>,
}

/// Servidor HTTP/1.0 concurrente
pub struct Server {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    runtime: Runtime,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(&config));
        Server {
            config,
            dispatcher,
            runtime: Runtime {
                started: Instant::now(),
                started_at: Utc::now(),
                connections: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    /// Job Manager del servidor (para el apagado ordenado desde `main`)
    pub fn jobs(&self) -> Arc<JobManager> {
        Arc::clone(self.dispatcher.jobs())
    }

    /// Bind según la configuración y atiende para siempre
    pub fn run(&self) -> std::io::Result<()> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)?;
        tracing::info!(%address, "servidor HTTP/1.0 escuchando");
        self.serve(listener)
    }

    /// Bucle de accept sobre un listener ya creado (útil en tests)
    pub fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    self.runtime.connections.fetch_add(1, Ordering::SeqCst);
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let runtime = self.runtime.clone();
                    thread::spawn(move || handle_connection(stream, &dispatcher, &runtime));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept falló");
                }
            }
        }
        Ok(())
    }
}

/// Atiende una conexión: parsea, despacha, responde y cierra.
fn handle_connection(mut stream: TcpStream, dispatcher: &Dispatcher, runtime: &Runtime) {
    let mut trace = HashMap::new();
    trace.insert("X-Request-Id".to_string(), util::new_id());
    trace.insert("Connection".to_string(), "close".to_string());

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "no se pudo clonar el stream");
            return;
        }
    };
    let mut reader = BufReader::new(reader_stream);

    let request = match Request::read_from(&mut reader) {
        Ok(req) => req,
        // El peer cerró sin mandar nada: no hay respuesta que dar
        Err(ParseError::Eof) => return,
        Err(e) => {
            tracing::debug!(error = %e, "request malformado");
            let res = Response::bad_request("bad_request", &e.to_string());
            write_response(&mut stream, &res, &trace);
            return;
        }
    };

    tracing::debug!(
        method = request.method(),
        target = request.target(),
        req_id = trace.get("X-Request-Id").map(String::as_str).unwrap_or(""),
        "request recibido"
    );

    // /status se sintetiza acá: necesita pid/uptime/conexiones del proceso
    let (path, _) = split_target(request.target());
    let response = if request.method() == "GET" && path == "/status" {
        let body = json!({
            "pid": process::id(),
            "uptime_ms": runtime.started.elapsed().as_millis() as u64,
            "started_at": runtime.started_at.to_rfc3339(),
            "connections": runtime.connections.load(Ordering::SeqCst),
            "pools": dispatcher.pools_summary(),
        })
        .to_string();
        Response::json_ok(body)
    } else {
        dispatcher.dispatch(request.method(), request.target())
    };

    write_response(&mut stream, &response, &trace);
}

fn write_response(stream: &mut TcpStream, response: &Response, trace: &HashMap<String, String>) {
    if let Err(e) = stream
        .write_all(&response.to_bytes(trace))
        .and_then(|_| stream.flush())
    {
        tracing::debug!(error = %e, "escritura de respuesta falló");
    }
}
