//! # Planificador: Pools de Workers por Tarea
//! src/sched/mod.rs
//!
//! Cada tipo de tarea tiene su propio [`Pool`]: un grupo de workers dedicados
//! con tres subcolas acotadas por prioridad (`high`, `normal`, `low`),
//! cancelación cooperativa y métricas propias.
//!
//! ## Protocolo de envío
//!
//! [`Pool::submit_and_wait`] es el único punto de entrada. Aplica el mismo
//! timeout dos veces: una para el encolado (si la subcola elegida sigue llena
//! al vencer, la petición se rechaza con `backpressure`) y otra para esperar
//! el resultado (si el handler no termina a tiempo se responde `timeout`,
//! aunque el worker siga corriendo hasta observar la cancelación).
//!
//! ## Disciplina de prioridad
//!
//! Los workers toman trabajo siempre en orden `high > normal > low` en cada
//! turno de despacho. Dentro de una misma subcola el orden es FIFO. Una
//! avalancha de items `low` no puede desplazar a los `high` porque cada clase
//! tiene capacidad propia (reparto 1:2:1 de la capacidad total).

use crate::http::Response;
use crate::metrics::{
    LatencyMs, LatencyStat, PoolMetrics, PriorityQueues, QueueDepth, WelfordStat, WorkerCounts,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Parámetros de una tarea (query params del request)
pub type Params = HashMap<String, String>;

/// Función de tarea: recibe el token de cancelación y los parámetros
pub type TaskFn = Box<dyn Fn(&CancelToken, &Params) -> Response + Send + Sync>;

/// Granularidad con la que se sondea la cancelación en las esperas del submit
const POLL_SLICE: Duration = Duration::from_millis(20);

/// Token de cancelación cooperativa.
///
/// Los handlers deben consultarlo periódicamente (cada N iteraciones del
/// bucle interno, con N entre ~256 y ~8192 según el costo de la iteración)
/// y retornar rápido con `canceled` al observarlo.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solicita la cancelación; es irreversible
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Unidad de trabajo que viaja por la cola del pool
struct Work {
    /// Id de correlación (solo para logs)
    id: String,
    token: CancelToken,
    params: Params,
    enqueued: Instant,
    /// Canal de resultado de un solo uso; el worker escribe exactamente una vez
    done: SyncSender<Response>,
}

/// Clase de prioridad de un item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prio {
    High = 0,
    Normal = 1,
    Low = 2,
}

impl Prio {
    /// `params["prio"]`: "high" o "low"; ausente o desconocido es normal
    fn from_params(params: &Params) -> Prio {
        match params.get("prio").map(String::as_str) {
            Some("high") => Prio::High,
            Some("low") => Prio::Low,
            _ => Prio::Normal,
        }
    }

    fn idx(self) -> usize {
        self as usize
    }
}

/// Las tres subcolas más el flag de cierre, bajo un único mutex
struct Queues {
    slots: [VecDeque<Work>; 3],
    closed: bool,
}

impl Queues {
    /// Siguiente item respetando high > normal > low
    fn pop_next(&mut self) -> Option<Work> {
        for q in self.slots.iter_mut() {
            if let Some(w) = q.pop_front() {
                return Some(w);
            }
        }
        None
    }

    fn total_len(&self) -> usize {
        self.slots.iter().map(VecDeque::len).sum()
    }
}

struct PoolInner {
    name: String,
    task: TaskFn,

    queues: Mutex<Queues>,
    not_empty: Condvar,
    not_full: Condvar,
    /// Capacidades por clase: [high, normal, low]
    caps: [usize; 3],

    total_workers: usize,
    started: AtomicBool,
    busy: AtomicUsize,

    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    wait_stat: WelfordStat,
    run_stat: WelfordStat,
}

/// Pool de workers para un tipo de tarea
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Crea un pool con `workers` hilos y capacidad total `capacity`,
    /// repartida 1:2:1 entre high:normal:low (mínimo 1 por clase).
    ///
    /// `workers == 0` se ajusta a 1; `capacity == 0` deja cada subcola con
    /// al menos un lugar.
    pub fn new(name: &str, task: TaskFn, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let cap_high = (capacity / 4).max(1);
        let cap_norm = (capacity / 2).max(1);
        let cap_low = capacity.saturating_sub(cap_high + cap_norm).max(1);

        Pool {
            inner: Arc::new(PoolInner {
                name: name.to_string(),
                task,
                queues: Mutex::new(Queues {
                    slots: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                    closed: false,
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                caps: [cap_high, cap_norm, cap_low],
                total_workers: workers,
                started: AtomicBool::new(false),
                busy: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                wait_stat: WelfordStat::new(),
                run_stat: WelfordStat::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Lanza los workers. Idempotente y no bloqueante.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for i in 0..self.inner.total_workers {
            let inner = Arc::clone(&self.inner);
            thread::spawn(move || worker_loop(&inner, i));
        }
    }

    /// Marca el pool como cerrado y despierta a todos los que esperan.
    /// Idempotente; no espera a que se drene la cola (los workers terminan
    /// lo pendiente y recién entonces salen).
    pub fn close(&self) {
        {
            let mut q = self.inner.queues.lock().unwrap();
            q.closed = true;
        }
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    /// Encola un item según `params["prio"]` y espera su resultado.
    ///
    /// Devuelve `(respuesta, encolado)`. `encolado == false` significa que el
    /// item nunca entró a la cola (backpressure); en todos los demás casos es
    /// `true`, incluso para cancelaciones y timeouts de ejecución.
    pub fn submit_and_wait(
        &self,
        token: &CancelToken,
        id: &str,
        params: Params,
        timeout: Duration,
    ) -> (Response, bool) {
        let submit_start = Instant::now();
        let prio = Prio::from_params(&params);

        // ---- Fase 1: encolado acotado por `timeout` ----
        let deadline = submit_start + timeout;
        let rx = {
            let mut q = self.inner.queues.lock().unwrap();
            if q.closed {
                return (Response::unavailable("closed", "pool closed"), true);
            }
            loop {
                if token.is_canceled() {
                    return (Response::unavailable("canceled", "job canceled"), true);
                }
                if q.slots[prio.idx()].len() < self.inner.caps[prio.idx()] {
                    let (tx, rx) = mpsc::sync_channel(1);
                    q.slots[prio.idx()].push_back(Work {
                        id: id.to_string(),
                        token: token.clone(),
                        params,
                        enqueued: submit_start,
                        done: tx,
                    });
                    self.inner.submitted.fetch_add(1, Ordering::SeqCst);
                    self.inner.not_empty.notify_one();
                    break rx;
                }
                let now = Instant::now();
                if now >= deadline {
                    self.inner.rejected.fetch_add(1, Ordering::SeqCst);
                    return (
                        Response::unavailable("backpressure", "{\"retry_after_ms\":100}"),
                        false,
                    );
                }
                let slice = POLL_SLICE.min(deadline - now);
                let (guard, _) = self.inner.not_full.wait_timeout(q, slice).unwrap();
                q = guard;
                if q.closed {
                    return (Response::unavailable("closed", "pool closed"), true);
                }
            }
        };

        // ---- Fase 2: espera del resultado, con un timeout nuevo ----
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return (Response::unavailable("timeout", "execution timed out"), true);
            }
            let slice = POLL_SLICE.min(deadline - now);
            match rx.recv_timeout(slice) {
                Ok(res) => return (res, true),
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_canceled() {
                        return (Response::unavailable("canceled", "job canceled"), true);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return (Response::unavailable("closed", "pool closed"), true);
                }
            }
        }
    }

    /// Snapshot serializable para `/metrics`
    pub fn metrics(&self) -> PoolMetrics {
        let (lens, total_len) = {
            let q = self.inner.queues.lock().unwrap();
            ([q.slots[0].len(), q.slots[1].len(), q.slots[2].len()], q.total_len())
        };
        let caps = self.inner.caps;
        let busy = self.inner.busy.load(Ordering::SeqCst);
        let total = self.inner.total_workers;
        let (_, wait_avg, wait_std) = self.inner.wait_stat.snapshot();
        let (_, run_avg, run_std) = self.inner.run_stat.snapshot();

        PoolMetrics {
            queue_len: total_len,
            queue_cap: caps.iter().sum(),
            priority_queues: PriorityQueues {
                high: QueueDepth { len: lens[0], cap: caps[0] },
                norm: QueueDepth { len: lens[1], cap: caps[1] },
                low: QueueDepth { len: lens[2], cap: caps[2] },
            },
            workers: WorkerCounts {
                total,
                busy: busy.min(total),
                idle: total.saturating_sub(busy),
            },
            submitted: self.inner.submitted.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            rejected: self.inner.rejected.load(Ordering::SeqCst),
            latency_ms: LatencyMs {
                wait: LatencyStat { avg: wait_avg, std: wait_std },
                run: LatencyStat { avg: run_avg, std: run_std },
            },
        }
    }
}

/// Bucle de un worker: toma items con sesgo de prioridad y los ejecuta.
///
/// Sale cuando el pool está cerrado y ya no queda nada pendiente.
fn worker_loop(inner: &PoolInner, index: usize) {
    let tag = format!("{}#{}", inner.name, index);
    loop {
        let work = {
            let mut q = inner.queues.lock().unwrap();
            loop {
                if let Some(w) = q.pop_next() {
                    break w;
                }
                if q.closed {
                    return;
                }
                q = inner.not_empty.wait(q).unwrap();
            }
        };
        inner.not_full.notify_all();

        // Cancelado antes de ejecutar: no toca busy/completed ni métricas
        if work.token.is_canceled() {
            let _ = work
                .done
                .send(Response::unavailable("canceled", "job canceled before run"));
            continue;
        }

        inner.busy.fetch_add(1, Ordering::SeqCst);
        let wait = work.enqueued.elapsed();
        let run_start = Instant::now();

        let res = (inner.task)(&work.token, &work.params);

        let run = run_start.elapsed();
        inner.busy.fetch_sub(1, Ordering::SeqCst);
        inner.completed.fetch_add(1, Ordering::SeqCst);
        inner.wait_stat.add(wait.as_secs_f64() * 1000.0);
        inner.run_stat.add(run.as_secs_f64() * 1000.0);

        tracing::debug!(
            pool = %inner.name,
            worker = %tag,
            id = %work.id,
            run_ms = run.as_millis() as u64,
            "tarea completada"
        );

        // El submitter puede haberse ido (timeout/cancel); el send fallido se ignora
        let _ = work.done.send(res.with_header("X-Worker-Id", &tag));
    }
}

/// Error al registrar un pool con nombre repetido
#[derive(Debug, Error)]
#[error("pool '{0}' already exists")]
pub struct DuplicatePool(pub String);

/// Registro thread-safe de pools por nombre
#[derive(Default)]
pub struct PoolManager {
    pools: RwLock<HashMap<String, Pool>>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra y arranca un pool. Falla si el nombre ya está tomado.
    pub fn register(&self, name: &str, pool: Pool) -> Result<(), DuplicatePool> {
        let mut pools = self.pools.write().unwrap();
        if pools.contains_key(name) {
            return Err(DuplicatePool(name.to_string()));
        }
        pool.start();
        pools.insert(name.to_string(), pool);
        Ok(())
    }

    /// Busca un pool por nombre
    pub fn pool(&self, name: &str) -> Option<Pool> {
        self.pools.read().unwrap().get(name).cloned()
    }

    /// JSON de `/metrics`: un objeto por pool, ordenado por nombre
    pub fn metrics_json(&self) -> String {
        let pools = self.pools.read().unwrap();
        let out: BTreeMap<&str, PoolMetrics> = pools
            .iter()
            .map(|(name, pool)| (name.as_str(), pool.metrics()))
            .collect();
        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
    }

    /// Vista recortada por pool para `/status`
    pub fn summary(&self) -> serde_json::Value {
        let pools = self.pools.read().unwrap();
        let out: BTreeMap<&str, crate::metrics::PoolSummary> = pools
            .iter()
            .map(|(name, pool)| (name.as_str(), pool.metrics().summary()))
            .collect();
        serde_json::to_value(out).unwrap_or(serde_json::Value::Null)
    }
}
