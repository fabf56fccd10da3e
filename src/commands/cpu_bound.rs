//! # Comandos CPU-bound
//! src/commands/cpu_bound.rs
//!
//! Handlers intensivos en CPU. Todos respetan la cancelación cooperativa
//! sondeando el token cada cierta cantidad de iteraciones (el timeout en sí
//! lo maneja el pool; acá solo se observa el token).
//!
//! Endpoints cubiertos:
//! - `/isprime?n=NUM[&method=division|miller-rabin]`
//! - `/factor?n=NUM`
//! - `/pi?digits=D`
//! - `/mandelbrot?width=W&height=H&max_iter=I`
//! - `/matrixmul?size=N&seed=S`

use crate::http::Response;
use crate::sched::{CancelToken, Params};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Instant;

fn to_json(out: &impl Serialize) -> Response {
    match serde_json::to_string(out) {
        Ok(body) => Response::json_ok(body),
        Err(e) => Response::internal_error("encode", &e.to_string()),
    }
}

// ============================================================================
// /isprime - primalidad con dos métodos
// ============================================================================

/// `/isprime?n=NUM[&method=division|miller-rabin]` (default: division)
pub fn isprime(token: &CancelToken, params: &Params) -> Response {
    let n = match params.get("n").map(|s| s.parse::<i64>()) {
        Some(Ok(n)) if n >= 0 => n,
        _ => return Response::bad_request("n", "n must be integer >= 0"),
    };
    let method = params.get("method").map(String::as_str).unwrap_or("division");
    if method != "division" && method != "miller-rabin" {
        return Response::bad_request("method", "use method=division|miller-rabin");
    }

    let start = Instant::now();

    #[derive(Serialize)]
    struct Out {
        n: i64,
        is_prime: bool,
        method: &'static str,
        elapsed_ms: u64,
    }

    let is_prime = match method {
        "division" => match trial_division(token, n as u64) {
            Some(p) => p,
            None => return Response::unavailable("canceled", "job canceled"),
        },
        _ => mr_is_prime_u64(token, n as u64),
    };

    to_json(&Out {
        n,
        is_prime,
        method: if method == "division" { "division" } else { "miller-rabin" },
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

/// División por tentativa hasta √n. `None` si se canceló a mitad de camino.
fn trial_division(token: &CancelToken, n: u64) -> Option<bool> {
    if n < 2 {
        return Some(false);
    }
    if n == 2 || n == 3 {
        return Some(true);
    }
    if n % 2 == 0 {
        return Some(false);
    }
    let limit = (n as f64).sqrt() as u64;
    let mut i = 0u64;
    let mut d = 3u64;
    while d <= limit {
        if i & 1023 == 0 && token.is_canceled() {
            return None;
        }
        i += 1;
        if n % d == 0 {
            return Some(false);
        }
        d += 2;
    }
    Some(true)
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    acc
}

/// Miller-Rabin determinístico para u64 (bases que garantizan exactitud
/// en 64 bits). Retorna false ante cancelación: el caller ya cortó.
fn mr_is_prime_u64(token: &CancelToken, n: u64) -> bool {
    const SMALL: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for p in SMALL {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }

    // n-1 = d * 2^r
    let mut d = n - 1;
    let mut r = 0;
    while d & 1 == 0 {
        d >>= 1;
        r += 1;
    }

    'bases: for (i, &a) in SMALL.iter().enumerate() {
        if i & 1 == 0 && token.is_canceled() {
            return false;
        }
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

// ============================================================================
// /factor - factorización por división tentativa
// ============================================================================

/// `/factor?n=NUM` con n >= 2; responde `[[primo, exponente], ...]`
pub fn factor(token: &CancelToken, params: &Params) -> Response {
    let n0 = match params.get("n").map(|s| s.parse::<i64>()) {
        Some(Ok(n)) if n >= 2 => n,
        _ => return Response::bad_request("n", "n must be integer >= 2"),
    };
    let start = Instant::now();

    let mut n = n0 as u64;
    let mut factors: Vec<[i64; 2]> = Vec::new();

    if n % 2 == 0 {
        let mut count = 0i64;
        while n % 2 == 0 {
            n /= 2;
            count += 1;
        }
        factors.push([2, count]);
    }

    let mut i = 0u64;
    let mut d = 3u64;
    while d <= n / d {
        if i & 1023 == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        i += 1;
        if n % d == 0 {
            let mut count = 0i64;
            while n % d == 0 {
                n /= d;
                count += 1;
            }
            factors.push([d as i64, count]);
        }
        d += 2;
    }
    if n > 1 {
        factors.push([n as i64, 1]);
    }

    #[derive(Serialize)]
    struct Out {
        n: i64,
        factors: Vec<[i64; 2]>,
        elapsed_ms: u64,
    }
    to_json(&Out {
        n: n0,
        factors,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

// ============================================================================
// /pi - dígitos de π con el spigot de Rabinowitz-Wagon
// ============================================================================

const MAX_PI_DIGITS: usize = 10_000;

/// `/pi?digits=D` con D >= 1 (tope 10000)
pub fn pi(token: &CancelToken, params: &Params) -> Response {
    let digits = match params.get("digits").map(|s| s.parse::<usize>()) {
        Some(Ok(d)) if d >= 1 => d.min(MAX_PI_DIGITS),
        _ => return Response::bad_request("digits", "digits must be integer >= 1"),
    };
    let method = params.get("method").map(String::as_str).unwrap_or("spigot");
    if method != "spigot" {
        return Response::bad_request("method", "use method=spigot");
    }

    let start = Instant::now();
    let (pi, iterations, truncated) = pi_spigot(token, digits);

    #[derive(Serialize)]
    struct Out {
        digits: usize,
        method: &'static str,
        iterations: u64,
        truncated: bool,
        pi: String,
        elapsed_ms: u64,
    }
    to_json(&Out {
        digits,
        method: "spigot",
        iterations,
        truncated,
        pi,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

/// Estado del emisor de dígitos del spigot
#[derive(PartialEq)]
enum SpigotState {
    /// Descartar la parte entera (el primer q=3)
    DropInt,
    /// Capturar el primer predígito decimal
    FirstPred,
    /// Flujo normal de emisión
    Normal,
}

/// Spigot de Rabinowitz-Wagon en base 10.
///
/// Devuelve `"3."` + `n` decimales exactos (sin redondear), la cantidad de
/// iteraciones internas y un flag de truncado por cancelación.
fn pi_spigot(token: &CancelToken, n: usize) -> (String, u64, bool) {
    let size = (10 * n) / 3 + 1;
    let mut a = vec![2i64; size];

    let mut state = SpigotState::DropInt;
    let mut nines = 0usize;
    let mut predigit = 0i64;
    let mut iters = 0u64;

    let mut out = String::with_capacity(n + 2);
    out.push_str("3.");

    let mut digits = 0usize;
    while digits < n {
        // Cancelación periódica
        if digits & 63 == 0 && token.is_canceled() {
            // Solo se emite el predígito si el flujo ya lo venía usando
            if state == SpigotState::Normal {
                out.push((b'0' + predigit as u8) as char);
                while nines > 0 && out.len() < 2 + n {
                    out.push('9');
                    nines -= 1;
                }
            }
            out.truncate(2 + n);
            return (out, iters, true);
        }

        // Paso interno del spigot
        let mut carry = 0i64;
        for i in (1..size).rev() {
            let x = a[i] * 10 + carry * (i as i64 + 1);
            let den = 2 * i as i64 + 1;
            a[i] = x % den;
            carry = x / den;
            iters += 1;
        }
        let x0 = a[0] * 10 + carry;
        a[0] = x0 % 10;
        let q = x0 / 10;

        match state {
            SpigotState::DropInt => {
                // q debería ser 3; ya pusimos "3."
                state = SpigotState::FirstPred;
            }
            SpigotState::FirstPred => {
                predigit = q;
                state = SpigotState::Normal;
            }
            SpigotState::Normal => match q {
                9 => nines += 1,
                10 => {
                    out.push((b'0' + predigit as u8 + 1) as char);
                    while nines > 0 {
                        out.push('0');
                        nines -= 1;
                    }
                    predigit = 0;
                    digits += 1;
                }
                _ => {
                    out.push((b'0' + predigit as u8) as char);
                    while nines > 0 {
                        out.push('9');
                        nines -= 1;
                    }
                    predigit = q;
                    digits += 1;
                }
            },
        }
    }

    // Empuja el último predígito para completar exactamente n decimales
    if out.len() < 2 + n {
        out.push((b'0' + predigit as u8) as char);
    }
    out.truncate(2 + n);
    (out, iters, false)
}

// ============================================================================
// /mandelbrot - mapa de iteraciones
// ============================================================================

const MAX_DIM: usize = 512;
const MAX_ITER: usize = 2000;

/// `/mandelbrot?width=W&height=H&max_iter=I` (topes 512x512, 2000 iteraciones)
pub fn mandelbrot(token: &CancelToken, params: &Params) -> Response {
    let (w, h, it) = match (
        params.get("width").map(|s| s.parse::<i64>()),
        params.get("height").map(|s| s.parse::<i64>()),
        params.get("max_iter").map(|s| s.parse::<i64>()),
    ) {
        (Some(Ok(w)), Some(Ok(h)), Some(Ok(it))) => (w, h, it),
        _ => return Response::bad_request("params", "width,height,max_iter must be integers"),
    };
    if w <= 0 || h <= 0 || it <= 0 {
        return Response::bad_request("params", "width,height,max_iter must be > 0");
    }
    let w = (w as usize).min(MAX_DIM);
    let h = (h as usize).min(MAX_DIM);
    let it = (it as usize).min(MAX_ITER);

    let start = Instant::now();

    // Ventana típica del conjunto
    let (min_re, max_re) = (-2.5f64, 1.0f64);
    let (min_im, max_im) = (-1.0f64, 1.0f64);

    let mut map = Vec::with_capacity(h);
    for y in 0..h {
        if y & 63 == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        let mut row = Vec::with_capacity(w);
        let ci = min_im + (max_im - min_im) * y as f64 / (h - 1).max(1) as f64;
        for x in 0..w {
            let cr = min_re + (max_re - min_re) * x as f64 / (w - 1).max(1) as f64;
            let (mut zr, mut zi) = (0.0f64, 0.0f64);
            let mut iter = 0usize;
            while iter < it {
                if iter & 255 == 0 && token.is_canceled() {
                    return Response::unavailable("canceled", "job canceled");
                }
                let (nzr, nzi) = (zr * zr - zi * zi + cr, 2.0 * zr * zi + ci);
                zr = nzr;
                zi = nzi;
                if zr * zr + zi * zi > 4.0 {
                    break;
                }
                iter += 1;
            }
            row.push(iter as u32);
        }
        map.push(row);
    }

    #[derive(Serialize)]
    struct Out {
        width: usize,
        height: usize,
        max_iter: usize,
        map: Vec<Vec<u32>>,
        elapsed_ms: u64,
    }
    to_json(&Out {
        width: w,
        height: h,
        max_iter: it,
        map,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

// ============================================================================
// /matrixmul - multiplicación NxN con hash del resultado
// ============================================================================

/// `/matrixmul?size=N&seed=S`: genera A y B con RNG determinístico (seed),
/// calcula C = A*B y responde el SHA-256 de C (little endian por celda).
pub fn matrixmul(token: &CancelToken, params: &Params) -> Response {
    let (n, seed) = match (
        params.get("size").map(|s| s.parse::<i64>()),
        params.get("seed").map(|s| s.parse::<i64>()),
    ) {
        (Some(Ok(n)), Some(Ok(seed))) if n > 0 => (n as usize, seed),
        _ => return Response::bad_request("params", "size>0 and valid seed required"),
    };
    let start = Instant::now();

    let mut rng = StdRng::seed_from_u64(seed as u64);

    // Matrices en forma lineal, enteros pequeños en [-3, 3]
    let mut a = vec![0i64; n * n];
    let mut b = vec![0i64; n * n];
    for i in 0..n * n {
        if i & 1023 == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        a[i] = rng.gen_range(0..7) - 3;
        b[i] = rng.gen_range(0..7) - 3;
    }

    // C = A * B (orden i-k-j, amigable con la caché)
    let mut c = vec![0i64; n * n];
    for i in 0..n {
        if i & 7 == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        let ik = i * n;
        for k in 0..n {
            let aik = a[ik + k];
            if aik == 0 {
                continue;
            }
            let kj = k * n;
            for j in 0..n {
                c[ik + j] += aik * b[kj + j];
            }
        }
    }

    let mut hasher = Sha256::new();
    for (idx, value) in c.iter().enumerate() {
        if idx & 8191 == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        hasher.update(value.to_le_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());

    #[derive(Serialize)]
    struct Out {
        size: usize,
        seed: i64,
        result_sha256: String,
        elapsed_ms: u64,
    }
    to_json(&Out {
        size: n,
        seed,
        result_sha256: digest,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn token() -> CancelToken {
        CancelToken::new()
    }

    fn body_json(res: &Response) -> serde_json::Value {
        assert_eq!(res.status.as_u16(), 200, "respuesta no exitosa: {:?}", res.err);
        serde_json::from_str(&res.body).unwrap()
    }

    #[test]
    fn test_isprime_division() {
        for (n, expected) in [("0", false), ("1", false), ("2", true), ("17", true), ("97", true), ("100", false)] {
            let res = isprime(&token(), &args(&[("n", n)]));
            let v = body_json(&res);
            assert_eq!(v["is_prime"].as_bool(), Some(expected), "n={}", n);
            assert_eq!(v["method"], "division");
        }
    }

    #[test]
    fn test_isprime_miller_rabin_agrees() {
        for n in ["2", "97", "561", "7919", "2305843009213693951"] {
            let division_ok = n.parse::<u64>().unwrap() < 1_000_000_000;
            let mr = isprime(&token(), &args(&[("n", n), ("method", "miller-rabin")]));
            let v = body_json(&mr);
            if division_ok {
                let div = isprime(&token(), &args(&[("n", n)]));
                assert_eq!(v["is_prime"], body_json(&div)["is_prime"], "n={}", n);
            }
        }
        // 2^61 - 1 es primo de Mersenne
        let res = isprime(
            &token(),
            &args(&[("n", "2305843009213693951"), ("method", "miller-rabin")]),
        );
        assert_eq!(body_json(&res)["is_prime"].as_bool(), Some(true));
        // 561 es un número de Carmichael, no primo
        let res = isprime(&token(), &args(&[("n", "561"), ("method", "miller-rabin")]));
        assert_eq!(body_json(&res)["is_prime"].as_bool(), Some(false));
    }

    #[test]
    fn test_isprime_validations() {
        assert_eq!(isprime(&token(), &args(&[])).err_code(), Some("n"));
        assert_eq!(isprime(&token(), &args(&[("n", "-1")])).err_code(), Some("n"));
        assert_eq!(
            isprime(&token(), &args(&[("n", "7"), ("method", "magic")])).err_code(),
            Some("method")
        );
    }

    #[test]
    fn test_factor_known() {
        let res = factor(&token(), &args(&[("n", "360")]));
        let v = body_json(&res);
        assert_eq!(v["n"], 360);
        assert_eq!(v["factors"], serde_json::json!([[2, 3], [3, 2], [5, 1]]));
    }

    #[test]
    fn test_factor_prime_and_validations() {
        let res = factor(&token(), &args(&[("n", "97")]));
        assert_eq!(body_json(&res)["factors"], serde_json::json!([[97, 1]]));

        assert_eq!(factor(&token(), &args(&[("n", "1")])).err_code(), Some("n"));
        assert_eq!(factor(&token(), &args(&[])).err_code(), Some("n"));
    }

    #[test]
    fn test_pi_digits() {
        let res = pi(&token(), &args(&[("digits", "1")]));
        let v = body_json(&res);
        assert_eq!(v["pi"], "3.1");
        assert_eq!(v["truncated"], false);

        let res = pi(&token(), &args(&[("digits", "10")]));
        let v = body_json(&res);
        assert_eq!(v["pi"], "3.1415926535");
        assert!(v["iterations"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_pi_fifty_digits() {
        let res = pi(&token(), &args(&[("digits", "50")]));
        let v = body_json(&res);
        assert_eq!(v["pi"], "3.14159265358979323846264338327950288419716939937510");
    }

    #[test]
    fn test_pi_validations() {
        assert_eq!(pi(&token(), &args(&[])).err_code(), Some("digits"));
        assert_eq!(pi(&token(), &args(&[("digits", "0")])).err_code(), Some("digits"));
        assert_eq!(
            pi(&token(), &args(&[("digits", "5"), ("method", "chudnovsky")])).err_code(),
            Some("method")
        );
    }

    #[test]
    fn test_pi_canceled_reports_truncated() {
        let t = token();
        t.cancel();
        let res = pi(&t, &args(&[("digits", "200")]));
        let v = body_json(&res);
        assert_eq!(v["truncated"], true);
    }

    #[test]
    fn test_mandelbrot_shape_and_caps() {
        let res = mandelbrot(
            &token(),
            &args(&[("width", "8"), ("height", "4"), ("max_iter", "50")]),
        );
        let v = body_json(&res);
        assert_eq!(v["width"], 8);
        assert_eq!(v["height"], 4);
        let map = v["map"].as_array().unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map[0].as_array().unwrap().len(), 8);

        // El tope de iteraciones se aplica
        let res = mandelbrot(
            &token(),
            &args(&[("width", "2"), ("height", "2"), ("max_iter", "999999")]),
        );
        assert_eq!(body_json(&res)["max_iter"], 2000);
    }

    #[test]
    fn test_mandelbrot_validations() {
        assert_eq!(mandelbrot(&token(), &args(&[])).err_code(), Some("params"));
        assert_eq!(
            mandelbrot(&token(), &args(&[("width", "0"), ("height", "2"), ("max_iter", "5")]))
                .err_code(),
            Some("params")
        );
    }

    #[test]
    fn test_mandelbrot_canceled() {
        let t = token();
        t.cancel();
        let res = mandelbrot(
            &t,
            &args(&[("width", "64"), ("height", "64"), ("max_iter", "100")]),
        );
        assert_eq!(res.err_code(), Some("canceled"));
    }

    #[test]
    fn test_matrixmul_deterministic() {
        let run = |seed: &str| {
            let res = matrixmul(&token(), &args(&[("size", "16"), ("seed", seed)]));
            body_json(&res)["result_sha256"].as_str().unwrap().to_string()
        };
        assert_eq!(run("42"), run("42"));
        assert_ne!(run("42"), run("43"));
    }

    #[test]
    fn test_matrixmul_validations() {
        assert_eq!(matrixmul(&token(), &args(&[])).err_code(), Some("params"));
        assert_eq!(
            matrixmul(&token(), &args(&[("size", "0"), ("seed", "1")])).err_code(),
            Some("params")
        );
        assert_eq!(
            matrixmul(&token(), &args(&[("size", "4"), ("seed", "x")])).err_code(),
            Some("params")
        );
    }
}
