//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Este módulo implementa la parte numérica de la observabilidad del servidor:
//! - Acumuladores de estadística streaming (algoritmo de Welford) para
//!   latencias de espera en cola y de ejecución
//! - Los tipos serializables que forman el payload estable de `/metrics`
//!
//! Cada pool alimenta dos [`WelfordStat`] (espera y ejecución, en ms) y arma
//! su [`PoolMetrics`] bajo demanda; el manager de pools los agrupa por nombre.

use serde::Serialize;
use std::sync::Mutex;

/// Acumulador streaming de media y desviación estándar (Welford).
///
/// Mantiene la terna `(count, mean, M2)` bajo un mutex de corta duración;
/// `add` es O(1) y no guarda las muestras.
#[derive(Debug, Default)]
pub struct WelfordStat {
    inner: Mutex<WelfordState>,
}

#[derive(Debug, Default)]
struct WelfordState {
    n: u64,
    mean: f64,
    m2: f64,
}

impl WelfordStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorpora una muestra
    pub fn add(&self, x: f64) {
        let mut s = self.inner.lock().unwrap();
        s.n += 1;
        let delta = x - s.mean;
        s.mean += delta / s.n as f64;
        let delta2 = x - s.mean;
        s.m2 += delta * delta2;
    }

    /// Snapshot no bloqueante de `(count, media, desviación estándar)`.
    ///
    /// La desviación usa varianza muestral (n-1); con menos de dos muestras
    /// reporta 0.
    pub fn snapshot(&self) -> (u64, f64, f64) {
        let s = self.inner.lock().unwrap();
        let std = if s.n > 1 {
            let variance = s.m2 / (s.n - 1) as f64;
            if variance > 0.0 { variance.sqrt() } else { 0.0 }
        } else {
            0.0
        };
        (s.n, s.mean, std)
    }
}

/// Ocupación de una cola: elementos presentes y capacidad
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueDepth {
    pub len: usize,
    pub cap: usize,
}

/// Ocupación de las tres subcolas de prioridad
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriorityQueues {
    pub high: QueueDepth,
    pub norm: QueueDepth,
    pub low: QueueDepth,
}

/// Conteo de workers de un pool
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorkerCounts {
    pub total: usize,
    pub busy: usize,
    pub idle: usize,
}

/// Media y desviación de una latencia en milisegundos
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencyStat {
    pub avg: f64,
    pub std: f64,
}

/// Latencias de un pool: espera en cola y ejecución
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencyMs {
    pub wait: LatencyStat,
    pub run: LatencyStat,
}

/// Snapshot completo de un pool, tal como sale en `/metrics`
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub queue_len: usize,
    pub queue_cap: usize,
    pub priority_queues: PriorityQueues,
    pub workers: WorkerCounts,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub latency_ms: LatencyMs,
}

/// Vista recortada por pool para `/status`
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub workers: WorkerCounts,
    pub queue_len: usize,
    pub queue_cap: usize,
}

impl PoolMetrics {
    /// Versión resumida para el payload de `/status`
    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            workers: self.workers,
            queue_len: self.queue_len,
            queue_cap: self.queue_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welford_empty() {
        let stat = WelfordStat::new();
        let (n, mean, std) = stat.snapshot();
        assert_eq!(n, 0);
        assert_eq!(mean, 0.0);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn test_welford_single_sample_has_no_stddev() {
        let stat = WelfordStat::new();
        stat.add(42.0);
        let (n, mean, std) = stat.snapshot();
        assert_eq!(n, 1);
        assert_eq!(mean, 42.0);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn test_welford_known_values() {
        // Muestras 1, 2, 3: media 2, varianza muestral 1, desviación 1
        let stat = WelfordStat::new();
        for x in [1.0, 2.0, 3.0] {
            stat.add(x);
        }
        let (n, mean, std) = stat.snapshot();
        assert_eq!(n, 3);
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((std - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_welford_constant_samples() {
        let stat = WelfordStat::new();
        for _ in 0..10 {
            stat.add(7.5);
        }
        let (n, mean, std) = stat.snapshot();
        assert_eq!(n, 10);
        assert!((mean - 7.5).abs() < 1e-12);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn test_pool_metrics_json_shape() {
        let metrics = PoolMetrics {
            queue_len: 1,
            queue_cap: 8,
            priority_queues: PriorityQueues {
                high: QueueDepth { len: 0, cap: 2 },
                norm: QueueDepth { len: 1, cap: 4 },
                low: QueueDepth { len: 0, cap: 2 },
            },
            workers: WorkerCounts { total: 2, busy: 1, idle: 1 },
            submitted: 5,
            completed: 4,
            rejected: 1,
            latency_ms: LatencyMs {
                wait: LatencyStat { avg: 0.5, std: 0.1 },
                run: LatencyStat { avg: 12.0, std: 3.0 },
            },
        };
        let json = serde_json::to_string(&metrics).unwrap();
        for key in [
            "\"queue_len\"",
            "\"queue_cap\"",
            "\"priority_queues\"",
            "\"high\"",
            "\"norm\"",
            "\"low\"",
            "\"workers\"",
            "\"submitted\"",
            "\"completed\"",
            "\"rejected\"",
            "\"latency_ms\"",
            "\"wait\"",
            "\"run\"",
        ] {
            assert!(json.contains(key), "falta {} en {}", key, json);
        }
    }
}
