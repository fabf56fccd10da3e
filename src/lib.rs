//! # Task Server
//! src/lib.rs
//!
//! Servidor HTTP/1.0 concurrente con ejecución de tareas por pools:
//! planificación por prioridad, jobs asíncronos con journal y cancelación
//! cooperativa.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: parsing y serialización del protocolo HTTP/1.0
//! - `server`: servidor TCP y manejo de conexiones
//! - `router`: dispatcher de rutas a handlers o pools
//! - `sched`: pools de workers con colas de prioridad acotadas
//! - `jobs`: jobs asíncronos (ciclo de vida, journal, TTL)
//! - `commands`: implementación de los comandos (básicos, CPU, IO)
//! - `metrics`: estadística streaming y snapshots de métricas
//! - `config`: configuración por variables de entorno
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use task_server::config::Config;
//! use task_server::server::Server;
//!
//! let config = Config::default();
//! let server = Server::new(config);
//! server.run().expect("error al iniciar el servidor");
//! ```

pub mod commands;
pub mod config;
pub mod http;
pub mod jobs;
pub mod metrics;
pub mod router;
pub mod sched;
pub mod server;
pub mod util;
