//! Tests de integración del servidor completo sobre sockets reales:
//! framing HTTP/1.0, rutas baratas, pools (prioridad, backpressure),
//! jobs (cancelación, resultado) y el flujo de archivos.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use task_server::config::Config;
use task_server::server::Server;
use tempfile::TempDir;

/// Levanta un servidor sobre un puerto efímero con la config dada
fn spawn_server_with(mut config: Config) -> (SocketAddr, TempDir) {
    let dir = TempDir::new().unwrap();
    config.data_dir = dir.path().to_string_lossy().to_string();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    let server = Server::new(config);
    thread::spawn(move || {
        let _ = server.serve(listener);
    });
    (addr, dir)
}

fn spawn_server() -> (SocketAddr, TempDir) {
    spawn_server_with(Config::default())
}

/// GET crudo: devuelve la respuesta completa como texto
fn raw_get(addr: SocketAddr, target: &str) -> String {
    let mut client = TcpStream::connect(addr).unwrap();
    client
        .write_all(format!("GET {} HTTP/1.0\r\n\r\n", target).as_bytes())
        .unwrap();
    client.shutdown(std::net::Shutdown::Write).unwrap();
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).unwrap();
    String::from_utf8_lossy(&buf).to_string()
}

fn body_of(response: &str) -> &str {
    response.split("\r\n\r\n").nth(1).unwrap_or("")
}

fn get_json(addr: SocketAddr, target: &str) -> serde_json::Value {
    serde_json::from_str(body_of(&raw_get(addr, target))).unwrap()
}

fn job_status(addr: SocketAddr, id: &str) -> String {
    get_json(addr, &format!("/jobs/status?id={}", id))["status"]
        .as_str()
        .unwrap_or("")
        .to_string()
}

fn submit_job(addr: SocketAddr, query: &str) -> String {
    let v = get_json(addr, &format!("/jobs/submit?{}", query));
    v["job_id"].as_str().expect("job_id").to_string()
}

fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(30));
    }
    false
}

#[test]
fn test_cheap_plain_route_exact_bytes() {
    let (addr, _dir) = spawn_server();
    let text = raw_get(addr, "/reverse?text=abcd");

    assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
    assert!(text.contains("Content-Length: 5\r\n"));
    assert!(text.contains("X-Request-Id: "));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.contains("Server: "));
    assert!(text.contains("Date: "));
    assert_eq!(body_of(&text), "dcba\n");
}

#[test]
fn test_framing_error_http11() {
    let (addr, _dir) = spawn_server();

    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    client.shutdown(std::net::Shutdown::Write).unwrap();
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).unwrap();
    let text = String::from_utf8_lossy(&buf);

    assert!(text.starts_with("HTTP/1.0 400 Bad Request\r\n"));
    let v: serde_json::Value = serde_json::from_str(body_of(&text)).unwrap();
    assert_eq!(v["error"], "bad_request");
    assert!(v["detail"].as_str().unwrap().contains("HTTP/1.0"));
}

#[test]
fn test_status_and_metrics_shapes() {
    let (addr, _dir) = spawn_server();

    let status = get_json(addr, "/status");
    assert!(status["pid"].as_u64().unwrap() > 0);
    assert!(status["connections"].as_u64().unwrap() >= 1);
    assert!(status["pools"]["sleep"]["workers"]["idle"].is_u64());

    let metrics = get_json(addr, "/metrics");
    assert!(metrics["isprime"]["latency_ms"]["run"]["avg"].is_number());
    assert_eq!(metrics["sleep"]["priority_queues"]["norm"]["cap"], 4);
}

#[test]
fn test_priority_high_overtakes_low() {
    // Un solo worker en sleep para observar el orden de despacho
    let mut config = Config::default();
    config.workers_sleep = 1;
    config.queue_sleep = 8;
    let (addr, _dir) = spawn_server_with(config);

    // Ocupa el worker
    let blocker = submit_job(addr, "task=sleep&seconds=2");
    thread::sleep(Duration::from_millis(300));

    // Encola low primero, high después
    let low = submit_job(addr, "task=sleep&seconds=1&prio=low");
    thread::sleep(Duration::from_millis(100));
    let high = submit_job(addr, "task=sleep&seconds=1&prio=high");

    // El high debe terminar mientras el low sigue pendiente
    assert!(wait_until(Duration::from_secs(6), || job_status(addr, &high) == "done"));
    assert_ne!(job_status(addr, &low), "done");

    assert!(wait_until(Duration::from_secs(6), || job_status(addr, &low) == "done"));
    assert_eq!(job_status(addr, &blocker), "done");
}

#[test]
fn test_backpressure_on_full_queue() {
    // Timeout IO corto para que el encolado venza rápido
    let mut config = Config::default();
    config.workers_sleep = 2;
    config.queue_sleep = 8;
    config.timeout_io = 1;
    let (addr, _dir) = spawn_server_with(config);

    // Ocupa ambos workers
    submit_job(addr, "task=sleep&seconds=3");
    submit_job(addr, "task=sleep&seconds=3");
    thread::sleep(Duration::from_millis(300));

    // 12 envíos síncronos concurrentes: la subcola normal (cap 4) se llena
    let mut clients = Vec::new();
    for _ in 0..12 {
        clients.push(thread::spawn(move || raw_get(addr, "/sleep?seconds=3")));
    }
    let responses: Vec<String> = clients.into_iter().map(|c| c.join().unwrap()).collect();

    let backpressured = responses
        .iter()
        .filter(|r| r.starts_with("HTTP/1.0 503") && r.contains("\"backpressure\""))
        .count();
    assert!(backpressured >= 1, "ninguna respuesta fue backpressure:\n{}", responses[0]);
}

#[test]
fn test_cancel_pending_job() {
    let mut config = Config::default();
    config.workers_sleep = 1;
    let (addr, _dir) = spawn_server_with(config);

    // El worker queda ocupado; el segundo job espera en la cola del pool
    submit_job(addr, "task=sleep&seconds=3");
    thread::sleep(Duration::from_millis(200));
    let pending = submit_job(addr, "task=sleep&seconds=5");
    thread::sleep(Duration::from_millis(200));

    let v = get_json(addr, &format!("/jobs/cancel?id={}", pending));
    assert_eq!(v["status"], "canceled");

    assert!(wait_until(Duration::from_secs(2), || {
        job_status(addr, &pending) == "canceled"
    }));

    let result = get_json(addr, &format!("/jobs/result?id={}", pending));
    assert_eq!(result["status"], "canceled");
    assert!(result["error"].as_str().unwrap().contains("canceled"));
}

#[test]
fn test_cancel_running_spin_job() {
    let (addr, _dir) = spawn_server();

    let id = submit_job(addr, "task=spin&seconds=10");
    assert!(wait_until(Duration::from_secs(2), || job_status(addr, &id) == "running"));

    let v = get_json(addr, &format!("/jobs/cancel?id={}", id));
    assert_eq!(v["status"], "canceled");

    // El spin sondea su token: debe cortarse en tiempo acotado
    assert!(wait_until(Duration::from_secs(3), || {
        job_status(addr, &id) == "canceled"
    }));
    let result = get_json(addr, &format!("/jobs/result?id={}", id));
    assert_eq!(result["status"], "canceled");
}

#[test]
fn test_sleep_job_reports_progress() {
    let (addr, _dir) = spawn_server();

    let id = submit_job(addr, "task=sleep&seconds=2");
    assert!(wait_until(Duration::from_secs(2), || job_status(addr, &id) == "running"));
    thread::sleep(Duration::from_millis(400));

    let v = get_json(addr, &format!("/jobs/status?id={}", id));
    if v["status"] == "running" {
        let progress = v["progress"].as_u64().expect("progress presente");
        let eta = v["eta_ms"].as_i64().expect("eta_ms presente");
        assert!(progress <= 99);
        assert!(eta > 0 && eta <= 2000);
    }

    assert!(wait_until(Duration::from_secs(4), || job_status(addr, &id) == "done"));
}

#[test]
fn test_file_workflow_create_count_hash_compress_sort() {
    let (addr, _dir) = spawn_server();

    // createfile con contenido repetido
    let v = get_json(addr, "/createfile?name=data.txt&content=7&repeat=5");
    assert_eq!(v["action"], "created");

    // conflicto: 409 con sugerencias sin escapar
    let text = raw_get(addr, "/createfile?name=data.txt");
    assert!(text.starts_with("HTTP/1.0 409 Conflict\r\n"));
    assert!(body_of(&text).contains("&conflict=overwrite"));

    let v = get_json(addr, "/wordcount?name=data.txt");
    assert_eq!(v["lines"], 5);

    let v = get_json(addr, "/hashfile?name=data.txt");
    assert_eq!(v["hex"].as_str().unwrap().len(), 64);

    let v = get_json(addr, "/compress?name=data.txt");
    assert_eq!(v["output"], "data.txt.gz");

    let v = get_json(addr, "/sortfile?name=data.txt&algo=quick");
    assert_eq!(v["sorted_file"], "data.txt.sorted");

    let text = raw_get(addr, "/deletefile?name=data.txt");
    assert_eq!(body_of(&text), "deleted\n");
}

#[test]
fn test_loadtest_and_grep_end_to_end() {
    let (addr, _dir) = spawn_server();

    let text = raw_get(addr, "/loadtest?tasks=2&sleep=0");
    assert_eq!(body_of(&text), "ok 2/2\n");

    get_json(addr, "/createfile?name=log.txt&content=error:x&repeat=3");
    let v = get_json(addr, "/grep?name=log.txt&pattern=error");
    assert_eq!(v["matches"], 3);
}
