//! # Comandos Básicos
//! src/commands/basic.rs
//!
//! Handlers baratos que el dispatcher ejecuta sin pasar por los pools
//! (reverse, toupper, hash, random, fibonacci, timestamp, archivos) y las
//! dos tareas de simulación (`sleep`, `spin`) que sí corren en sus pools.
//!
//! La lógica "pura" vive en funciones core no exportadas, sin validaciones
//! ni conocimiento de HTTP; los handlers exportados validan parámetros y
//! arman el `Response`.

use crate::commands::sanitize;
use crate::http::{Response, StatusCode};
use crate::sched::{CancelToken, Params};
use chrono::Utc;
use rand::Rng;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

// -------------------------------------------------
// Helpers "core" (puros)
// -------------------------------------------------

/// Invierte el texto por caracteres (UTF-8 seguro) y agrega "\n"
fn reverse_core(s: &str) -> String {
    let mut out: String = s.chars().rev().collect();
    out.push('\n');
    out
}

fn to_upper_core(s: &str) -> String {
    format!("{}\n", s.to_uppercase())
}

/// SHA-256 del texto como JSON `{algo, hex}`
fn hash_core(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    json!({"algo": "sha256", "hex": format!("{:x}", digest)}).to_string()
}

/// N-ésimo Fibonacci iterativo, O(n) y espacio O(1).
/// Con n grande el valor envuelve (wrapping), igual que un entero de máquina.
fn fibonacci_core(n: u64) -> u128 {
    let (mut a, mut b) = (0u128, 1u128);
    match n {
        0 => 0,
        1 => 1,
        _ => {
            for _ in 2..=n {
                let next = a.wrapping_add(b);
                a = b;
                b = next;
            }
            b
        }
    }
}

// -------------------------------------------------
// Handlers exportados
// -------------------------------------------------

/// Listado de rutas disponibles (texto plano)
pub fn help() -> Response {
    Response::plain_ok(
        "\
/                      -> hola mundo
/help                  -> este listado
/status                -> estado del proceso + pools (pid, uptime, conns, colas, workers)
/metrics               -> metricas por pool (latencias, colas, workers, contadores)

/fibonacci?num=N       -> N-esimo (iterativo)
/reverse?text=abc      -> invierte texto
/toupper?text=abc      -> a MAYUSCULAS
/random?count=n&min=a&max=b -> n enteros aleatorios
/timestamp             -> JSON con epoch/UTC
/hash?text=abc         -> SHA-256 (hex)

/createfile?name=FILE&content=txt&repeat=x[&conflict=fail|overwrite|autorename]
/deletefile?name=FILE

# Pools / simulacion
/sleep?seconds=s
/simulate?seconds=s&task=sleep|spin
/loadtest?tasks=n&sleep=s

# CPU-bound
/isprime?n=NUM[&method=division|miller-rabin]
/factor?n=NUM
/pi?digits=D
/mandelbrot?width=W&height=H&max_iter=I
/matrixmul?size=N&seed=S

# IO-bound
/wordcount?name=FILE
/grep?name=FILE&pattern=REGEX
/hashfile?name=FILE[&algo=sha256]
/sortfile?name=FILE[&algo=merge|quick][&chunksize=N]
/compress?name=FILE[&codec=gzip]

/jobs/submit?task=TASK&<params>[&prio=low|normal|high]
/jobs/status?id=JOBID
/jobs/result?id=JOBID
/jobs/cancel?id=JOBID
/jobs/list
",
    )
}

/// JSON con epoch Unix y fecha UTC
pub fn timestamp(_args: &Params) -> Response {
    let now = Utc::now();
    Response::json_ok(
        json!({"unix": now.timestamp(), "utc": now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)})
            .to_string(),
    )
}

/// Invierte el texto recibido en `?text=...`
pub fn reverse(args: &Params) -> Response {
    let Some(text) = args.get("text") else {
        return Response::bad_request("missing_param", "text is required");
    };
    Response::plain_ok(reverse_core(text))
}

/// Convierte a MAYÚSCULAS el parámetro `?text=...`
pub fn to_upper(args: &Params) -> Response {
    let Some(text) = args.get("text") else {
        return Response::bad_request("missing_param", "text is required");
    };
    Response::plain_ok(to_upper_core(text))
}

/// SHA-256 del parámetro `?text=...`
pub fn hash(args: &Params) -> Response {
    let Some(text) = args.get("text") else {
        return Response::bad_request("missing_param", "text is required");
    };
    Response::json_ok(hash_core(text))
}

/// Genera `count` enteros uniformes en `[min, max]`
pub fn random(args: &Params) -> Response {
    let count = match args.get("count").map(|s| s.parse::<usize>()) {
        Some(Ok(n)) if n >= 1 => n,
        Some(_) => return Response::bad_request("count", "must be integer >= 1"),
        None => return Response::bad_request("count", "count is required (integer >= 1)"),
    };
    let min = match args.get("min").map(|s| s.parse::<i64>()) {
        Some(Ok(n)) => n,
        Some(_) => return Response::bad_request("min", "min must be integer"),
        None => return Response::bad_request("min", "min is required (integer)"),
    };
    let max = match args.get("max").map(|s| s.parse::<i64>()) {
        Some(Ok(n)) => n,
        Some(_) => return Response::bad_request("max", "max must be integer"),
        None => return Response::bad_request("max", "max is required (integer)"),
    };
    if min > max {
        return Response::bad_request("range", "min must be <= max");
    }

    let mut rng = rand::thread_rng();
    let values: Vec<i64> = (0..count).map(|_| rng.gen_range(min..=max)).collect();
    Response::json_ok(json!({"values": values}).to_string())
}

/// N-ésimo número de Fibonacci como texto terminado en "\n"
pub fn fibonacci(args: &Params) -> Response {
    let Some(raw) = args.get("num") else {
        return Response::bad_request("missing_param", "num is required");
    };
    let Ok(n) = raw.parse::<u64>() else {
        return Response::bad_request("num", "num must be integer >= 0");
    };
    Response::plain_ok(format!("{}\n", fibonacci_core(n)))
}

// -------------------------------------------------
// Archivos (/createfile, /deletefile)
// -------------------------------------------------

/// Separa `base.ext` en (`base`, `.ext`); sin punto devuelve (`name`, "")
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Primer nombre libre agregando "(k)" creciente antes de la extensión:
/// `demo.txt -> demo(1).txt, demo(2).txt, ...`
fn first_available_name(dir: &Path, base: &str) -> String {
    let (stem, ext) = split_ext(base);
    for k in 1..1_000_000 {
        let candidate = format!("{}({}){}", stem, k, ext);
        if !dir.join(&candidate).exists() {
            return candidate;
        }
    }
    format!("{}_copy{}", stem, ext)
}

/// Crea un archivo en el directorio de datos con control de conflictos.
///
/// Parámetros:
/// - `name=FILE` (obligatorio, nombre simple)
/// - `content=TEXT` (opcional, default "")
/// - `repeat=N` (opcional, default 1, N >= 1)
/// - `conflict=fail|overwrite|autorename` (opcional, default fail)
///
/// Con `conflict=fail` y el archivo presente responde 409 con
/// `suggested_name` y URLs de sugerencia; el `&` de esas URLs viaja literal.
pub fn create_file(args: &Params, data_dir: &Path) -> Response {
    let raw_name = args.get("name").map(String::as_str).unwrap_or("");
    let Some(name) = sanitize(raw_name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };
    let content = args.get("content").map(String::as_str).unwrap_or("");
    let repeat = match args.get("repeat") {
        None => 1usize,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n >= 1 => n,
            _ => return Response::bad_request("repeat", "repeat must be integer >= 1"),
        },
    };
    let mode = args.get("conflict").map(String::as_str).unwrap_or("fail");
    if !matches!(mode, "fail" | "overwrite" | "autorename") {
        return Response::bad_request("conflict", "use conflict=fail|overwrite|autorename");
    }

    if fs::create_dir_all(data_dir).is_err() {
        return Response::internal_error("fs_error", "cannot create data dir");
    }

    let start = Instant::now();
    let mut name = name.to_string();
    let mut action = "created";
    let mut renamed_from = None;

    if data_dir.join(&name).exists() {
        match mode {
            "fail" => {
                let suggested = first_available_name(data_dir, &name);
                let body = json!({
                    "error": "exists",
                    "detail": "file already exists",
                    "file": name,
                    "suggested_name": suggested,
                    "how_to_overwrite": format!(
                        "/createfile?name={}&content=...&repeat={}&conflict=overwrite", name, repeat),
                    "how_to_autorename": format!(
                        "/createfile?name={}&content=...&repeat={}&conflict=autorename", name, repeat),
                    "how_to_use_other_name": "/createfile?name=<otro_nombre>&content=...&repeat=N",
                })
                .to_string();
                return Response::json_with_status(StatusCode::Conflict, body);
            }
            "autorename" => {
                renamed_from = Some(name.clone());
                name = first_available_name(data_dir, &name);
                action = "autorename";
            }
            _ => action = "overwritten",
        }
    }

    let mut file = match File::create(data_dir.join(&name)) {
        Ok(f) => f,
        Err(_) => return Response::internal_error("fs_error", "cannot create file"),
    };
    let mut written = 0u64;
    for _ in 0..repeat {
        if file.write_all(content.as_bytes()).is_err() || file.write_all(b"\n").is_err() {
            return Response::internal_error("fs_error", "write failed");
        }
        written += content.len() as u64 + 1;
    }

    let mut out = json!({
        "file": name,
        "action": action,
        "bytes": written,
        "elapsed_ms": start.elapsed().as_millis() as u64,
    });
    // Solo se reporta policy cuando no es el default
    if mode != "fail" {
        out["policy"] = json!(mode);
    }
    if let Some(from) = renamed_from {
        out["renamed_from"] = json!(from);
    }
    Response::json_ok(out.to_string())
}

/// Elimina un archivo del directorio de datos
pub fn delete_file(args: &Params, data_dir: &Path) -> Response {
    let raw_name = args.get("name").map(String::as_str).unwrap_or("");
    let Some(name) = sanitize(raw_name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };
    match fs::remove_file(data_dir.join(name)) {
        Ok(()) => Response::plain_ok("deleted\n"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Response::not_found("not_found", "file does not exist")
        }
        Err(_) => Response::internal_error("fs_error", "cannot delete file"),
    }
}

// -------------------------------------------------
// Tareas de simulación (corren dentro de los pools)
// -------------------------------------------------

fn seconds_param(params: &Params) -> u64 {
    params
        .get("seconds")
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0)
        .max(0) as u64
}

/// Espera `seconds` segundos simulando IO, sondeando la cancelación
pub fn sleep_task(token: &CancelToken, params: &Params) -> Response {
    let secs = seconds_param(params);
    let deadline = Instant::now() + Duration::from_secs(secs);
    while Instant::now() < deadline {
        if token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        thread::sleep(Duration::from_millis(50).min(deadline - Instant::now()));
    }
    Response::plain_ok(format!("slept {} s\n", secs))
}

/// Quema CPU durante `seconds` segundos, sondeando la cancelación
pub fn spin_task(token: &CancelToken, params: &Params) -> Response {
    let secs = seconds_param(params);
    let deadline = Instant::now() + Duration::from_secs(secs);
    let mut x = 0.0f64;
    let mut i = 0u64;
    while Instant::now() < deadline {
        x += 99991.0f64.sqrt();
        if x > 1e9 {
            x = 0.0;
        }
        i = i.wrapping_add(1);
        if i & 4095 == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
    }
    Response::plain_ok(format!("spun {} s\n", secs))
}
