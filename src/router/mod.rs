//! # Dispatcher
//! src/router/mod.rs
//!
//! Mapea cada path a una acción: los endpoints baratos se ejecutan directo,
//! los pesados se envían al pool de su tarea con el timeout de su clase
//! (CPU o IO), y la superficie `/jobs/*` opera sobre el Job Manager.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → Dispatcher ─┬→ handler directo            (reverse, hash, ...)
//!                       ├→ Pool::submit_and_wait      (isprime, sortfile, ...)
//!                       └→ JobManager                 (/jobs/submit, ...)
//! ```

use crate::commands::{basic, cpu_bound, io_bound};
use crate::config::Config;
use crate::http::{parse_query, split_target, Response};
use crate::jobs::{JobManager, JobOutcome};
use crate::sched::{CancelToken, Params, Pool, PoolManager, TaskFn};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Router del servidor: pools registrados + Job Manager + timeouts por clase
pub struct Dispatcher {
    pools: Arc<PoolManager>,
    jobs: Arc<JobManager>,
    cpu_timeout: Duration,
    io_timeout: Duration,
    data_dir: PathBuf,
}

impl Dispatcher {
    /// Construye el dispatcher: registra los 12 pools con la configuración
    /// dada y levanta el Job Manager (journal incluido).
    pub fn new(config: &Config) -> Self {
        let pools = Arc::new(PoolManager::new());
        let data_dir = PathBuf::from(&config.data_dir);

        let register = |name: &str, task: TaskFn, workers: usize, capacity: usize| {
            if let Err(e) = pools.register(name, Pool::new(name, task, workers, capacity)) {
                tracing::error!(error = %e, "registro de pool falló");
            }
        };

        // Simulación
        register("sleep", Box::new(basic::sleep_task), config.workers_sleep, config.queue_sleep);
        register("spin", Box::new(basic::spin_task), config.workers_spin, config.queue_spin);

        // CPU-bound
        register("isprime", Box::new(cpu_bound::isprime), config.workers_isprime, config.queue_isprime);
        register("factor", Box::new(cpu_bound::factor), config.workers_factor, config.queue_factor);
        register("pi", Box::new(cpu_bound::pi), config.workers_pi, config.queue_pi);
        register("mandelbrot", Box::new(cpu_bound::mandelbrot), config.workers_mandelbrot, config.queue_mandelbrot);
        register("matrixmul", Box::new(cpu_bound::matrixmul), config.workers_matrixmul, config.queue_matrixmul);

        // IO-bound (cierran sobre el directorio de datos)
        let dir = data_dir.clone();
        register("wordcount", Box::new(move |t: &CancelToken, p: &Params| io_bound::wordcount(t, p, &dir)), config.workers_wordcount, config.queue_wordcount);
        let dir = data_dir.clone();
        register("grep", Box::new(move |t: &CancelToken, p: &Params| io_bound::grep(t, p, &dir)), config.workers_grep, config.queue_grep);
        let dir = data_dir.clone();
        register("hashfile", Box::new(move |t: &CancelToken, p: &Params| io_bound::hashfile(t, p, &dir)), config.workers_hashfile, config.queue_hashfile);
        let dir = data_dir.clone();
        register("sortfile", Box::new(move |t: &CancelToken, p: &Params| io_bound::sortfile(t, p, &dir)), config.workers_sortfile, config.queue_sortfile);
        let dir = data_dir.clone();
        register("compress", Box::new(move |t: &CancelToken, p: &Params| io_bound::compress(t, p, &dir)), config.workers_compress, config.queue_compress);

        let jobs = Arc::new(JobManager::new(
            Arc::clone(&pools),
            config.jobs_ttl(),
            &data_dir,
        ));

        Dispatcher {
            pools,
            jobs,
            cpu_timeout: config.cpu_timeout(),
            io_timeout: config.io_timeout(),
            data_dir,
        }
    }

    /// Resuelve un request GET sobre la tabla de rutas
    pub fn dispatch(&self, method: &str, target: &str) -> Response {
        if method != "GET" {
            return Response::bad_request("method", "only GET");
        }

        let (path, query) = split_target(target);
        let args = parse_query(query);

        match path {
            // Básicas
            "/" => Response::plain_ok("hola mundo\n"),
            "/help" => basic::help(),
            "/timestamp" => basic::timestamp(&args),
            "/reverse" => basic::reverse(&args),
            "/toupper" => basic::to_upper(&args),
            "/hash" => basic::hash(&args),
            "/random" => basic::random(&args),
            "/fibonacci" => basic::fibonacci(&args),

            // Archivos
            "/createfile" => basic::create_file(&args, &self.data_dir),
            "/deletefile" => basic::delete_file(&args, &self.data_dir),

            // Pools / simulación
            "/sleep" => self.submit_sync("sleep", args, self.io_timeout).0,
            "/simulate" => {
                let task = args.get("task").cloned().unwrap_or_default();
                if task != "sleep" && task != "spin" {
                    return Response::bad_request("task", "use task=sleep|spin");
                }
                // sleep → timeout IO, spin → timeout CPU
                let timeout = if task == "sleep" { self.io_timeout } else { self.cpu_timeout };
                self.submit_sync(&task, args, timeout).0
            }
            "/loadtest" => self.loadtest(&args),

            // Métricas
            "/metrics" => Response::json_ok(self.pools.metrics_json()),

            // CPU-bound
            "/isprime" => self.submit_sync("isprime", args, self.cpu_timeout).0,
            "/factor" => self.submit_sync("factor", args, self.cpu_timeout).0,
            "/pi" => self.submit_sync("pi", args, self.cpu_timeout).0,
            "/mandelbrot" => self.submit_sync("mandelbrot", args, self.cpu_timeout).0,
            "/matrixmul" => self.submit_sync("matrixmul", args, self.cpu_timeout).0,

            // IO-bound
            "/wordcount" => self.submit_sync("wordcount", args, self.io_timeout).0,
            "/grep" => self.submit_sync("grep", args, self.io_timeout).0,
            "/hashfile" => self.submit_sync("hashfile", args, self.io_timeout).0,
            "/sortfile" => self.submit_sync("sortfile", args, self.io_timeout).0,
            "/compress" => self.submit_sync("compress", args, self.io_timeout).0,

            // Jobs
            "/jobs/submit" => self.jobs_submit(args),
            "/jobs/status" => {
                let Some(id) = args.get("id").filter(|id| !id.is_empty()) else {
                    return Response::bad_request("id", "id required");
                };
                match self.jobs.snapshot_json(id) {
                    Some(snapshot) => Response::json_ok(snapshot),
                    None => Response::not_found("not_found", "job not found"),
                }
            }
            "/jobs/result" => {
                let Some(id) = args.get("id").filter(|id| !id.is_empty()) else {
                    return Response::bad_request("id", "id required");
                };
                match self.jobs.result_json(id) {
                    JobOutcome::NotFound => Response::not_found("not_found", "job not found"),
                    JobOutcome::NotReady => {
                        Response::bad_request("not_ready", "job not finished yet")
                    }
                    JobOutcome::Ready(body) => Response::json_ok(body),
                }
            }
            "/jobs/cancel" => {
                let Some(id) = args.get("id").filter(|id| !id.is_empty()) else {
                    return Response::bad_request("id", "id required");
                };
                let (status, found) = self.jobs.cancel(id);
                if !found {
                    return Response::not_found("not_found", "job not found");
                }
                Response::json_ok(json!({"status": status}).to_string())
            }
            "/jobs/list" => Response::json_ok(self.jobs.list_json()),

            _ => Response::not_found("not_found", "route"),
        }
    }

    /// `/loadtest?tasks=n&sleep=s`: n envíos secuenciales al pool sleep
    fn loadtest(&self, args: &Params) -> Response {
        let tasks = match args.get("tasks").map(|s| s.parse::<u64>()) {
            Some(Ok(n)) if n > 0 => n,
            _ => return Response::bad_request("tasks", "must be integer > 0"),
        };
        let sleep = match args.get("sleep").map(|s| s.parse::<u64>()) {
            Some(Ok(s)) => s,
            _ => return Response::bad_request("sleep", "must be integer >= 0"),
        };

        let mut ok = 0u64;
        for _ in 0..tasks {
            let mut params = Params::new();
            params.insert("seconds".to_string(), sleep.to_string());
            let (res, enqueued) = self.submit_sync("sleep", params, self.io_timeout);
            if enqueued && res.status.as_u16() == 200 {
                ok += 1;
            }
        }
        Response::plain_ok(format!("ok {}/{}\n", ok, tasks))
    }

    /// `/jobs/submit?task=POOL&...`: crea el job con el timeout de su clase
    fn jobs_submit(&self, args: Params) -> Response {
        let Some(task) = args.get("task").filter(|t| !t.is_empty()).cloned() else {
            return Response::bad_request("task", "task=<pool_name> required");
        };
        let params: Params = args
            .into_iter()
            .filter(|(k, _)| k != "task")
            .collect();

        let id = self.jobs.submit(&task, params, self.timeout_for_task(&task));
        if id.is_empty() {
            return Response::not_found("no_pool", "pool not found");
        }
        Response::json_ok(json!({"job_id": id, "status": "queued"}).to_string())
    }

    /// Clase de timeout del pool destino
    fn timeout_for_task(&self, task: &str) -> Duration {
        match task {
            "sleep" | "wordcount" | "grep" | "hashfile" | "sortfile" | "compress" => {
                self.io_timeout
            }
            _ => self.cpu_timeout,
        }
    }

    /// Envía de forma síncrona (sin cancelación externa) y espera el resultado
    fn submit_sync(&self, name: &str, args: Params, timeout: Duration) -> (Response, bool) {
        let Some(pool) = self.pools.pool(name) else {
            return (Response::internal_error("no_pool", "pool not found"), true);
        };
        let token = CancelToken::new();
        pool.submit_and_wait(&token, "", args, timeout)
    }

    /// Vista recortada de pools para `/status`
    pub fn pools_summary(&self) -> serde_json::Value {
        self.pools.summary()
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// Cierra los recursos del dispatcher (Job Manager)
    pub fn close(&self) {
        self.jobs.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    fn dispatcher() -> (Dispatcher, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_string_lossy().to_string();
        (Dispatcher::new(&config), dir)
    }

    fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_only_get_is_accepted() {
        let (d, _dir) = dispatcher();
        let res = d.dispatch("POST", "/");
        assert_eq!(res.status.as_u16(), 400);
        assert_eq!(res.err_code(), Some("method"));
    }

    #[test]
    fn test_root_and_unknown_route() {
        let (d, _dir) = dispatcher();

        let res = d.dispatch("GET", "/");
        assert_eq!(res.body, "hola mundo\n");

        let res = d.dispatch("GET", "/nope");
        assert_eq!(res.status.as_u16(), 404);
        assert_eq!(res.err_code(), Some("not_found"));
    }

    #[test]
    fn test_cheap_routes_bypass_pools() {
        let (d, _dir) = dispatcher();

        let res = d.dispatch("GET", "/reverse?text=abcd");
        assert_eq!(res.body, "dcba\n");
        // Sin pool de por medio no hay X-Worker-Id
        assert!(res.headers.is_none());

        let res = d.dispatch("GET", "/toupper?text=ab");
        assert_eq!(res.body, "AB\n");

        let res = d.dispatch("GET", "/fibonacci?num=10");
        assert_eq!(res.body, "55\n");
    }

    #[test]
    fn test_sleep_zero_through_pool() {
        let (d, _dir) = dispatcher();
        let res = d.dispatch("GET", "/sleep?seconds=0");
        assert_eq!(res.status.as_u16(), 200);
        assert_eq!(res.body, "slept 0 s\n");
        let headers = res.headers.unwrap();
        assert!(headers.get("X-Worker-Id").unwrap().starts_with("sleep#"));
    }

    #[test]
    fn test_simulate_validation_and_spin() {
        let (d, _dir) = dispatcher();

        let res = d.dispatch("GET", "/simulate?seconds=0");
        assert_eq!(res.err_code(), Some("task"));

        let res = d.dispatch("GET", "/simulate?task=walk&seconds=0");
        assert_eq!(res.err_code(), Some("task"));

        let res = d.dispatch("GET", "/simulate?task=spin&seconds=0");
        assert_eq!(res.body, "spun 0 s\n");
    }

    #[test]
    fn test_loadtest() {
        let (d, _dir) = dispatcher();

        assert_eq!(d.dispatch("GET", "/loadtest").err_code(), Some("tasks"));
        assert_eq!(
            d.dispatch("GET", "/loadtest?tasks=0&sleep=0").err_code(),
            Some("tasks")
        );
        assert_eq!(
            d.dispatch("GET", "/loadtest?tasks=2&sleep=-1").err_code(),
            Some("sleep")
        );

        let res = d.dispatch("GET", "/loadtest?tasks=3&sleep=0");
        assert_eq!(res.body, "ok 3/3\n");
    }

    #[test]
    fn test_isprime_through_pool() {
        let (d, _dir) = dispatcher();
        let res = d.dispatch("GET", "/isprime?n=97");
        assert_eq!(res.status.as_u16(), 200);
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(v["is_prime"], true);
    }

    #[test]
    fn test_metrics_lists_all_pools() {
        let (d, _dir) = dispatcher();
        let res = d.dispatch("GET", "/metrics");
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        for pool in [
            "sleep", "spin", "isprime", "factor", "pi", "mandelbrot", "matrixmul",
            "wordcount", "grep", "hashfile", "sortfile", "compress",
        ] {
            assert!(v.get(pool).is_some(), "falta pool {}", pool);
        }
        assert!(v["sleep"]["workers"]["total"].as_u64().unwrap() >= 1);
    }

    #[test]
    fn test_jobs_submit_validations() {
        let (d, _dir) = dispatcher();

        let res = d.dispatch("GET", "/jobs/submit");
        assert_eq!(res.err_code(), Some("task"));

        let res = d.dispatch("GET", "/jobs/submit?task=unknown");
        assert_eq!(res.status.as_u16(), 404);
        assert_eq!(res.err_code(), Some("no_pool"));
    }

    #[test]
    fn test_jobs_flow_submit_status_result() {
        let (d, _dir) = dispatcher();

        let res = d.dispatch("GET", "/jobs/submit?task=sleep&seconds=0");
        assert_eq!(res.status.as_u16(), 200);
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(v["status"], "queued");
        let id = v["job_id"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 16);

        assert!(wait_until(Duration::from_secs(3), || {
            let res = d.dispatch("GET", &format!("/jobs/status?id={}", id));
            let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
            v["status"] == "done"
        }));

        let res = d.dispatch("GET", &format!("/jobs/result?id={}", id));
        assert_eq!(res.status.as_u16(), 200);
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(v["status"], "done");
        assert_eq!(v["result"], "slept 0 s\n");
    }

    #[test]
    fn test_jobs_status_and_result_errors() {
        let (d, _dir) = dispatcher();

        assert_eq!(d.dispatch("GET", "/jobs/status").err_code(), Some("id"));
        assert_eq!(
            d.dispatch("GET", "/jobs/status?id=ffffffffffffffff").err_code(),
            Some("not_found")
        );
        assert_eq!(d.dispatch("GET", "/jobs/result").err_code(), Some("id"));
        assert_eq!(
            d.dispatch("GET", "/jobs/result?id=ffffffffffffffff").err_code(),
            Some("not_found")
        );
        assert_eq!(
            d.dispatch("GET", "/jobs/cancel?id=ffffffffffffffff").err_code(),
            Some("not_found")
        );
    }

    #[test]
    fn test_jobs_cancel_running_spin() {
        let (d, _dir) = dispatcher();

        let res = d.dispatch("GET", "/jobs/submit?task=spin&seconds=10");
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        let id = v["job_id"].as_str().unwrap().to_string();

        assert!(wait_until(Duration::from_secs(2), || {
            let res = d.dispatch("GET", &format!("/jobs/status?id={}", id));
            let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
            v["status"] == "running"
        }));

        let res = d.dispatch("GET", &format!("/jobs/cancel?id={}", id));
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(v["status"], "canceled");

        assert!(wait_until(Duration::from_secs(2), || {
            let res = d.dispatch("GET", &format!("/jobs/status?id={}", id));
            let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
            v["status"] == "canceled"
        }));

        // Cancelar de nuevo: ya es terminal
        let res = d.dispatch("GET", &format!("/jobs/cancel?id={}", id));
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        assert_eq!(v["status"], "not_cancelable");
    }

    #[test]
    fn test_jobs_list() {
        let (d, _dir) = dispatcher();
        d.dispatch("GET", "/jobs/submit?task=sleep&seconds=0");

        let res = d.dispatch("GET", "/jobs/list");
        let v: serde_json::Value = serde_json::from_str(&res.body).unwrap();
        let arr = v.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["task"], "sleep");
    }

    #[test]
    fn test_io_route_missing_file() {
        let (d, _dir) = dispatcher();
        let res = d.dispatch("GET", "/wordcount?name=nope.txt");
        assert_eq!(res.status.as_u16(), 404);
        assert_eq!(res.err_code(), Some("not_found"));
    }
}
