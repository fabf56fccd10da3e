//! # Sistema de Jobs
//!
//! Envoltura asíncrona sobre los pools del planificador: cada job es
//! direccionable por id, tiene ciclo de vida propio, token de cancelación,
//! progreso estimado y una pista de recuperación en el journal.
//!
//! ## Endpoints servidos por el dispatcher
//!
//! - `/jobs/submit?task=TASK&params...` - Encolar job
//! - `/jobs/status?id=JOBID` - Snapshot del estado
//! - `/jobs/result?id=JOBID` - Resultado final
//! - `/jobs/cancel?id=JOBID` - Cancelación cooperativa
//! - `/jobs/list` - Enumeración liviana

pub mod manager;
pub mod types;

pub use manager::{JobManager, JobOutcome};
pub use types::{Job, JobStatus, JournalRecord};
