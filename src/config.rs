//! # Configuración del Servidor
//! src/config.rs
//!
//! Toda la configuración entra por variables de entorno con defaults seguros;
//! el binario no necesita flags (aunque clap también los acepta, cada opción
//! lee primero su variable `env`).
//!
//! ## Variables reconocidas
//!
//! ```bash
//! HTTP_HOST=0.0.0.0 HTTP_PORT=8080 DATA_DIR=./data \
//! WORKERS_SLEEP=2 QUEUE_SLEEP=8 \
//! TIMEOUT_CPU=60 TIMEOUT_IO=120 \
//! ./task_server
//! ```
//!
//! `WORKERS_<TAREA>` y `QUEUE_<TAREA>` existen para cada pool (SLEEP, SPIN,
//! ISPRIME, FACTOR, PI, MANDELBROT, MATRIXMUL, WORDCOUNT, GREP, HASHFILE,
//! SORTFILE, COMPRESS). Los timeouts van en segundos enteros.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuración del servidor HTTP/1.0
#[derive(Debug, Clone, Parser)]
#[command(name = "task_server")]
#[command(about = "Servidor HTTP/1.0 concurrente con pools de workers por tarea")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    pub host: String,

    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value_t = 8080, env = "HTTP_PORT")]
    pub port: u16,

    /// Directorio de datos (archivos de los handlers IO + journal de jobs)
    #[arg(long, default_value = "./data", env = "DATA_DIR")]
    pub data_dir: String,

    /// TTL en segundos de los jobs terminales antes de su expulsión
    #[arg(long, default_value_t = 600, env = "JOBS_TTL_SECS")]
    pub jobs_ttl_secs: u64,

    // === Timeouts por clase (encolado + ejecución, en segundos) ===
    /// Timeout para tareas CPU-bound
    #[arg(long, default_value_t = 60, env = "TIMEOUT_CPU")]
    pub timeout_cpu: u64,

    /// Timeout para tareas IO-bound
    #[arg(long, default_value_t = 120, env = "TIMEOUT_IO")]
    pub timeout_io: u64,

    // === Workers y colas por pool ===
    #[arg(long, default_value_t = 2, env = "WORKERS_SLEEP")]
    pub workers_sleep: usize,
    #[arg(long, default_value_t = 8, env = "QUEUE_SLEEP")]
    pub queue_sleep: usize,

    #[arg(long, default_value_t = 2, env = "WORKERS_SPIN")]
    pub workers_spin: usize,
    #[arg(long, default_value_t = 8, env = "QUEUE_SPIN")]
    pub queue_spin: usize,

    #[arg(long, default_value_t = 2, env = "WORKERS_ISPRIME")]
    pub workers_isprime: usize,
    #[arg(long, default_value_t = 64, env = "QUEUE_ISPRIME")]
    pub queue_isprime: usize,

    #[arg(long, default_value_t = 2, env = "WORKERS_FACTOR")]
    pub workers_factor: usize,
    #[arg(long, default_value_t = 64, env = "QUEUE_FACTOR")]
    pub queue_factor: usize,

    #[arg(long, default_value_t = 1, env = "WORKERS_PI")]
    pub workers_pi: usize,
    #[arg(long, default_value_t = 8, env = "QUEUE_PI")]
    pub queue_pi: usize,

    #[arg(long, default_value_t = 1, env = "WORKERS_MANDELBROT")]
    pub workers_mandelbrot: usize,
    #[arg(long, default_value_t = 4, env = "QUEUE_MANDELBROT")]
    pub queue_mandelbrot: usize,

    #[arg(long, default_value_t = 1, env = "WORKERS_MATRIXMUL")]
    pub workers_matrixmul: usize,
    #[arg(long, default_value_t = 8, env = "QUEUE_MATRIXMUL")]
    pub queue_matrixmul: usize,

    #[arg(long, default_value_t = 2, env = "WORKERS_WORDCOUNT")]
    pub workers_wordcount: usize,
    #[arg(long, default_value_t = 64, env = "QUEUE_WORDCOUNT")]
    pub queue_wordcount: usize,

    #[arg(long, default_value_t = 2, env = "WORKERS_GREP")]
    pub workers_grep: usize,
    #[arg(long, default_value_t = 64, env = "QUEUE_GREP")]
    pub queue_grep: usize,

    #[arg(long, default_value_t = 2, env = "WORKERS_HASHFILE")]
    pub workers_hashfile: usize,
    #[arg(long, default_value_t = 64, env = "QUEUE_HASHFILE")]
    pub queue_hashfile: usize,

    #[arg(long, default_value_t = 1, env = "WORKERS_SORTFILE")]
    pub workers_sortfile: usize,
    #[arg(long, default_value_t = 4, env = "QUEUE_SORTFILE")]
    pub queue_sortfile: usize,

    #[arg(long, default_value_t = 1, env = "WORKERS_COMPRESS")]
    pub workers_compress: usize,
    #[arg(long, default_value_t = 4, env = "QUEUE_COMPRESS")]
    pub queue_compress: usize,
}

impl Config {
    /// Parsea configuración desde env/CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Dirección completa para el bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn data_path(&self) -> &Path {
        Path::new(&self.data_dir)
    }

    pub fn cpu_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_cpu)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_io)
    }

    pub fn jobs_ttl(&self) -> Duration {
        Duration::from_secs(self.jobs_ttl_secs)
    }

    /// Valida la configuración
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.is_empty() {
            return Err("data_dir must not be empty".to_string());
        }
        if self.timeout_cpu == 0 {
            return Err("TIMEOUT_CPU must be >= 1 second".to_string());
        }
        if self.timeout_io == 0 {
            return Err("TIMEOUT_IO must be >= 1 second".to_string());
        }
        Ok(())
    }

    /// Resume la configuración efectiva en el log
    pub fn log_summary(&self) {
        tracing::info!(
            address = %self.address(),
            data_dir = %self.data_dir,
            timeout_cpu_s = self.timeout_cpu,
            timeout_io_s = self.timeout_io,
            jobs_ttl_s = self.jobs_ttl_secs,
            "configuración cargada"
        );
    }
}

impl Default for Config {
    /// Defaults idénticos a los de las variables de entorno; útil en tests
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: "./data".to_string(),
            jobs_ttl_secs: 600,
            timeout_cpu: 60,
            timeout_io: 120,
            workers_sleep: 2,
            queue_sleep: 8,
            workers_spin: 2,
            queue_spin: 8,
            workers_isprime: 2,
            queue_isprime: 64,
            workers_factor: 2,
            queue_factor: 64,
            workers_pi: 1,
            queue_pi: 8,
            workers_mandelbrot: 1,
            queue_mandelbrot: 4,
            workers_matrixmul: 1,
            queue_matrixmul: 8,
            workers_wordcount: 2,
            queue_wordcount: 64,
            workers_grep: 2,
            queue_grep: 64,
            workers_hashfile: 2,
            queue_hashfile: 64,
            workers_sortfile: 1,
            queue_sortfile: 4,
            workers_compress: 1,
            queue_compress: 4,
        }
    }
}
