//! # Job Manager
//! src/jobs/manager.rs
//!
//! Convierte los envíos síncronos del planificador en jobs asíncronos
//! direccionables: cada `submit` crea un job con su propio token de
//! cancelación y un hilo supervisor que lo ejecuta en el pool destino.
//!
//! ## Journal
//!
//! Cada mutación se anota en un archivo append-only de líneas JSON
//! (`jobs.journal` en el directorio de datos). El journal es una pista de
//! recuperación, no una fuente de verdad: al arrancar se reproduce en orden
//! y cualquier job que haya quedado en `queued` o `running` se marca como
//! `failed` con código `restart` (la corrida que lo produjo ya no existe).
//! Las líneas corruptas o de tipo desconocido se ignoran en silencio.
//!
//! ## Limpieza
//!
//! Un hilo de GC corre cada minuto y elimina los jobs terminales cuyo
//! `ended_at` superó el TTL, anotando un registro `delete` por cada uno.

use crate::http::Response;
use crate::jobs::types::{Job, JobStatus, JournalRecord};
use crate::sched::{CancelToken, Params, Pool, PoolManager};
use crate::util;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

/// Resultado de consultar `/jobs/result`
#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// El id no existe
    NotFound,
    /// El job existe pero todavía no llegó a un estado terminal
    NotReady,
    /// JSON final `{status, result?, error?}`
    Ready(String),
}

/// Mapa de jobs + journal, protegidos por un único RwLock
struct Registry {
    jobs: HashMap<String, Job>,
    journal: PathBuf,
}

impl Registry {
    /// Agrega una línea al journal (O_APPEND). Los errores solo se loguean:
    /// perder una pista de replay no debe afectar la petición en curso.
    fn append_journal(&self, rec: &JournalRecord) {
        let line = match serde_json::to_string(rec) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "no se pudo serializar registro del journal");
                return;
            }
        };
        match OpenOptions::new().create(true).append(true).open(&self.journal) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    tracing::warn!(error = %e, "escritura al journal falló");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %self.journal.display(), "no se pudo abrir el journal");
            }
        }
    }

    /// Inserta/actualiza el job en el mapa y lo anota en el journal
    fn upsert(&mut self, job: Job) {
        let rec = JournalRecord::upsert(&job);
        self.jobs.insert(job.id.clone(), job);
        self.append_journal(&rec);
    }
}

/// Registro de jobs asíncronos sobre los pools del planificador
pub struct JobManager {
    pools: Arc<PoolManager>,
    registry: Arc<RwLock<Registry>>,
    stop: Mutex<Option<mpsc::Sender<()>>>,
}

impl JobManager {
    /// Crea el manager, reproduce el journal y lanza el hilo de GC.
    ///
    /// `ttl` controla cuánto sobreviven los jobs terminales antes de ser
    /// eliminados del mapa (y del journal, vía registro `delete`).
    pub fn new(pools: Arc<PoolManager>, ttl: Duration, data_dir: &Path) -> Self {
        if let Err(e) = fs::create_dir_all(data_dir) {
            tracing::warn!(error = %e, dir = %data_dir.display(), "no se pudo crear el directorio de datos");
        }
        let journal = data_dir.join("jobs.journal");

        let mut jobs = HashMap::new();
        load_journal(&mut jobs, &journal);
        if !jobs.is_empty() {
            tracing::info!(count = jobs.len(), "jobs rehidratados desde el journal");
        }

        let registry = Arc::new(RwLock::new(Registry { jobs, journal }));

        let (stop_tx, stop_rx) = mpsc::channel();
        let gc_registry = Arc::clone(&registry);
        thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(Duration::from_secs(60)) {
                    Err(RecvTimeoutError::Timeout) => Self::cleanup(&gc_registry, ttl),
                    _ => return,
                }
            }
        });

        JobManager {
            pools,
            registry,
            stop: Mutex::new(Some(stop_tx)),
        }
    }

    /// Detiene el hilo de GC. Llamarlo dos veces no hace nada.
    pub fn close(&self) {
        let mut stop = self.stop.lock().unwrap();
        stop.take();
    }

    /// Crea un job para `task` y lo ejecuta en background.
    ///
    /// Devuelve el id asignado, o una cadena vacía si no hay pool registrado
    /// con ese nombre (el caller lo traduce a 404).
    pub fn submit(&self, task: &str, params: Params, exec_timeout: Duration) -> String {
        let Some(pool) = self.pools.pool(task) else {
            return String::new();
        };

        let id = util::new_id();
        let token = CancelToken::new();
        let job = Job::new(id.clone(), task.to_string(), params.clone(), token.clone());
        {
            let mut reg = self.registry.write().unwrap();
            reg.upsert(job);
        }
        tracing::info!(job = %id, task = %task, "job encolado");

        let registry = Arc::clone(&self.registry);
        let job_id = id.clone();
        thread::spawn(move || {
            supervise(registry, pool, job_id, token, params, exec_timeout);
        });

        id
    }

    /// Cancela un job.
    ///
    /// - id inexistente: `("not_found", false)`
    /// - terminal: `("not_cancelable", true)`, sin mutarlo
    /// - `queued`: corta en seco — dispara el token, marca `canceled` con
    ///   `ended_at` y anota el journal
    /// - `running`: dispara el token y responde de inmediato; el supervisor
    ///   hará la transición cuando el handler retorne
    pub fn cancel(&self, id: &str) -> (&'static str, bool) {
        let mut reg = self.registry.write().unwrap();
        let Some(job) = reg.jobs.get_mut(id) else {
            return ("not_found", false);
        };
        if job.status.is_terminal() {
            return ("not_cancelable", true);
        }
        job.token.cancel();
        if job.status == JobStatus::Queued {
            job.status = JobStatus::Canceled;
            job.ended_at = Some(Utc::now());
            job.result = Some(Response::unavailable("canceled", "job canceled"));
            let snapshot = job.clone();
            reg.append_journal(&JournalRecord::upsert(&snapshot));
        }
        tracing::info!(job = %id, "cancelación solicitada");
        ("canceled", true)
    }

    /// Snapshot JSON completo del job, con `progress`/`eta_ms` derivados
    /// para la tarea `sleep` mientras corre.
    pub fn snapshot_json(&self, id: &str) -> Option<String> {
        let reg = self.registry.read().unwrap();
        let job = reg.jobs.get(id)?;
        let mut value = serde_json::to_value(job).ok()?;

        if let Some((progress, eta_ms)) = sleep_progress(job) {
            value["progress"] = json!(progress);
            value["eta_ms"] = json!(eta_ms);
        }
        Some(value.to_string())
    }

    /// Resultado final del job: `{status, result?, error?}` si es terminal
    pub fn result_json(&self, id: &str) -> JobOutcome {
        let reg = self.registry.read().unwrap();
        let Some(job) = reg.jobs.get(id) else {
            return JobOutcome::NotFound;
        };
        if !job.status.is_terminal() {
            return JobOutcome::NotReady;
        }
        let mut obj = serde_json::Map::new();
        obj.insert("status".to_string(), json!(job.status));
        if let Some(res) = &job.result {
            if !res.body.is_empty() {
                obj.insert("result".to_string(), json!(res.body));
            }
            if let Some(err) = &res.err {
                obj.insert("error".to_string(), json!(err.detail));
            }
        }
        JobOutcome::Ready(serde_json::Value::Object(obj).to_string())
    }

    /// Enumeración liviana `[{id, task, status}, ...]`
    pub fn list_json(&self) -> String {
        let reg = self.registry.read().unwrap();
        let out: Vec<serde_json::Value> = reg
            .jobs
            .values()
            .map(|j| json!({"id": j.id, "task": j.task, "status": j.status}))
            .collect();
        serde_json::Value::Array(out).to_string()
    }

    /// Elimina los jobs terminales con `ended_at` anterior a `now - ttl`
    fn cleanup(registry: &RwLock<Registry>, ttl: Duration) {
        let cut = Utc::now() - chrono::Duration::milliseconds(ttl.as_millis() as i64);
        let mut reg = registry.write().unwrap();
        let expired: Vec<String> = reg
            .jobs
            .iter()
            .filter(|(_, j)| j.status.is_terminal() && j.ended_at.map_or(false, |t| t < cut))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            reg.jobs.remove(&id);
            reg.append_journal(&JournalRecord::delete(&id));
            tracing::debug!(job = %id, "job expirado eliminado");
        }
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Progreso derivado para la tarea `sleep` (`seconds=N`, estado running)
fn sleep_progress(job: &Job) -> Option<(u64, i64)> {
    if job.task != "sleep" || job.status != JobStatus::Running {
        return None;
    }
    let started = job.started_at?;
    let secs: f64 = job.params.get("seconds")?.parse().ok()?;
    if secs <= 0.0 {
        return None;
    }
    let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
    if elapsed >= secs {
        Some((100, 0))
    } else {
        let progress = ((elapsed / secs) * 100.0).floor() as u64;
        let eta_ms = ((secs - elapsed) * 1000.0).ceil() as i64;
        Some((progress, eta_ms))
    }
}

/// Hilo supervisor de un job: lo entrega al pool y registra las transiciones
fn supervise(
    registry: Arc<RwLock<Registry>>,
    pool: Pool,
    id: String,
    token: CancelToken,
    params: Params,
    timeout: Duration,
) {
    // Cancelado antes de llegar al pool
    if token.is_canceled() {
        let mut reg = registry.write().unwrap();
        if let Some(job) = reg.jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Canceled;
                job.ended_at = Some(Utc::now());
                job.result = Some(Response::unavailable("canceled", "job canceled"));
            }
            let snapshot = job.clone();
            reg.append_journal(&JournalRecord::upsert(&snapshot));
        }
        return;
    }

    // queued -> running
    {
        let mut reg = registry.write().unwrap();
        let Some(job) = reg.jobs.get_mut(&id) else { return };
        // Un cancel pudo ganar la carrera y dejarlo terminal
        if job.status != JobStatus::Queued {
            return;
        }
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        let snapshot = job.clone();
        reg.append_journal(&JournalRecord::upsert(&snapshot));
    }

    let (res, enqueued) = pool.submit_and_wait(&token, &id, params, timeout);

    // running -> terminal
    let mut reg = registry.write().unwrap();
    let Some(job) = reg.jobs.get_mut(&id) else { return };
    job.ended_at = Some(Utc::now());
    job.status = if !enqueued {
        JobStatus::Failed
    } else if res.err_code() == Some("canceled") {
        JobStatus::Canceled
    } else if res.err_code() == Some("timeout") {
        JobStatus::Timeout
    } else if res.status.is_success() {
        JobStatus::Done
    } else {
        JobStatus::Failed
    };
    job.result = Some(res);
    let final_status = job.status;
    let snapshot = job.clone();
    reg.append_journal(&JournalRecord::upsert(&snapshot));
    tracing::info!(job = %id, status = final_status.as_str(), "job finalizado");
}

/// Reproduce el journal en orden. Archivo ausente: no-op.
///
/// Los jobs rehidratados en `queued`/`running` se degradan a `failed` con
/// código `restart`: la ejecución que los produjo ya no existe.
fn load_journal(jobs: &mut HashMap<String, Job>, path: &Path) {
    let Ok(file) = File::open(path) else {
        return;
    };
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { return };
        let Ok(rec) = serde_json::from_str::<JournalRecord>(&line) else {
            continue;
        };
        match rec.kind.as_str() {
            "upsert" => {
                if let Some(mut job) = rec.job {
                    if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
                        job.status = JobStatus::Failed;
                        job.ended_at = Some(Utc::now());
                        job.result = Some(Response::internal_error("restart", "server restarted"));
                    }
                    jobs.insert(job.id.clone(), job);
                }
            }
            "delete" => {
                if let Some(id) = rec.id {
                    jobs.remove(&id);
                }
            }
            _ => {}
        }
    }
}
