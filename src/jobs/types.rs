//! # Tipos y Estructuras para el Sistema de Jobs
//! src/jobs/types.rs
//!
//! Define los tipos fundamentales del manejo de trabajos asíncronos:
//! el estado de un job, el job en sí y los registros del journal.

use crate::http::Response;
use crate::sched::CancelToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Estado de un job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// En cola, el supervisor todavía no lo tomó
    Queued,

    /// El supervisor lo entregó al pool (puede seguir esperando worker)
    Running,

    /// Terminó con resultado exitoso (2xx)
    Done,

    /// Terminó con error (incluye rechazo por backpressure)
    Failed,

    /// La ejecución excedió su timeout
    Timeout,

    /// Cancelado por el usuario
    Canceled,
}

impl JobStatus {
    /// Estados finales: el job ya no cambia (salvo por la expulsión del TTL)
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Done | JobStatus::Failed | JobStatus::Timeout | JobStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Canceled => "canceled",
        }
    }
}

/// Trabajo asíncrono direccionable por id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Id aleatorio de 16 caracteres hex
    pub id: String,

    /// Nombre del pool destino
    pub task: String,

    /// Parámetros con los que se ejecuta la tarea
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,

    pub status: JobStatus,

    pub enqueued_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Resultado final (presente solo en estados terminales)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Response>,

    /// Token de cancelación del contexto privado del job; no se persiste
    #[serde(skip)]
    pub token: CancelToken,
}

impl Job {
    /// Crea un job recién encolado
    pub fn new(id: String, task: String, params: HashMap<String, String>, token: CancelToken) -> Self {
        Self {
            id,
            task,
            params,
            status: JobStatus::Queued,
            enqueued_at: Utc::now(),
            started_at: None,
            ended_at: None,
            result: None,
            token,
        }
    }
}

/// Registro del journal: una línea JSON por mutación
///
/// `upsert` guarda el snapshot completo del job; `delete` solo el id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl JournalRecord {
    pub fn upsert(job: &Job) -> Self {
        Self {
            kind: "upsert".to_string(),
            job: Some(job.clone()),
            id: None,
        }
    }

    pub fn delete(id: &str) -> Self {
        Self {
            kind: "delete".to_string(),
            job: None,
            id: Some(id.to_string()),
        }
    }
}
