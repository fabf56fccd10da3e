//! # Comandos IO-bound
//! src/commands/io_bound.rs
//!
//! Comandos que trabajan sobre archivos del directorio de datos:
//! - `/wordcount`: contar líneas, palabras y bytes (tipo `wc`)
//! - `/grep`: buscar un patrón (regex) y devolver las primeras coincidencias
//! - `/hashfile`: SHA-256 streaming
//! - `/sortfile`: ordenar enteros, en memoria o con external sort k-way
//! - `/compress`: comprimir con gzip
//!
//! Todos leen en streaming y sondean el token de cancelación con una máscara
//! amortizada (`CHECK_EVERY` iteraciones).

use crate::commands::sanitize;
use crate::http::Response;
use crate::sched::{CancelToken, Params};
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Sonda barata de cancelación (las potencias de 2 enmascaran bien)
const CHECK_EVERY: u64 = 4096;

fn to_json(out: &impl Serialize) -> Response {
    match serde_json::to_string(out) {
        Ok(body) => Response::json_ok(body),
        Err(e) => Response::internal_error("encode", &e.to_string()),
    }
}

/// Abre un archivo del directorio de datos mapeando los errores comunes
fn open_data_file(path: &Path) -> Result<File, Response> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Response::not_found("not_found", "file does not exist")
        } else {
            Response::internal_error("fs_error", "open failed")
        }
    })
}

/// Limpia una línea numérica: BOM UTF-8 + espacios alrededor
fn clean_int_line(line: &str) -> &str {
    line.trim().trim_start_matches('\u{feff}').trim()
}

// ============================================================================
// /wordcount
// ============================================================================

/// `/wordcount?name=FILE`: líneas, palabras y bytes en streaming
pub fn wordcount(token: &CancelToken, params: &Params, data_dir: &Path) -> Response {
    let Some(name) = params.get("name").filter(|n| !n.is_empty()) else {
        return Response::bad_request("name", "file name required");
    };
    let Some(name) = sanitize(name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };

    let file = match open_data_file(&data_dir.join(name)) {
        Ok(f) => f,
        Err(res) => return res,
    };

    let start = Instant::now();
    let (mut lines, mut words, mut bytes) = (0u64, 0u64, 0u64);

    let mut i = 0u64;
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => return Response::internal_error("fs_error", "scan error"),
        };
        if i & (CHECK_EVERY - 1) == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        i += 1;

        lines += 1;
        bytes += line.len() as u64 + 1; // +1 por el '\n' que el reader quita

        let mut in_word = false;
        for c in line.bytes() {
            if c > b' ' {
                if !in_word {
                    words += 1;
                    in_word = true;
                }
            } else {
                in_word = false;
            }
        }
    }

    #[derive(Serialize)]
    struct Out<'a> {
        file: &'a str,
        lines: u64,
        words: u64,
        bytes: u64,
        elapsed_ms: u64,
    }
    to_json(&Out {
        file: name,
        lines,
        words,
        bytes,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

// ============================================================================
// /grep
// ============================================================================

/// `/grep?name=FILE&pattern=REGEX`: cantidad de coincidencias y las
/// primeras 10 líneas que hacen match
pub fn grep(token: &CancelToken, params: &Params, data_dir: &Path) -> Response {
    let name = params.get("name").map(String::as_str).unwrap_or("");
    let pattern = params.get("pattern").map(String::as_str).unwrap_or("");
    if name.is_empty() || pattern.is_empty() {
        return Response::bad_request("params", "name and pattern required");
    }
    let Some(name) = sanitize(name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };
    let Ok(re) = Regex::new(pattern) else {
        return Response::bad_request("pattern", "invalid regex");
    };

    let file = match open_data_file(&data_dir.join(name)) {
        Ok(f) => f,
        Err(res) => return res,
    };

    let start = Instant::now();
    let mut matches = 0u64;
    let mut first: Vec<String> = Vec::with_capacity(10);

    let mut i = 0u64;
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => return Response::internal_error("fs_error", "scan error"),
        };
        if i & (CHECK_EVERY - 1) == 0 && token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        i += 1;

        if re.is_match(&line) {
            matches += 1;
            if first.len() < 10 {
                first.push(line);
            }
        }
    }

    #[derive(Serialize)]
    struct Out<'a> {
        file: &'a str,
        pattern: &'a str,
        matches: u64,
        first: Vec<String>,
        elapsed_ms: u64,
    }
    to_json(&Out {
        file: name,
        pattern,
        matches,
        first,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

// ============================================================================
// /hashfile
// ============================================================================

/// `/hashfile?name=FILE[&algo=sha256]`: SHA-256 streaming (1 MiB por lectura)
pub fn hashfile(token: &CancelToken, params: &Params, data_dir: &Path) -> Response {
    let algo = params.get("algo").map(String::as_str).unwrap_or("sha256");
    if algo != "sha256" {
        return Response::bad_request("algo", "only sha256 is supported for now");
    }
    let Some(name) = params.get("name").filter(|n| !n.is_empty()) else {
        return Response::bad_request("name", "file name required");
    };
    let Some(name) = sanitize(name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };

    let mut file = match open_data_file(&data_dir.join(name)) {
        Ok(f) => f,
        Err(res) => return res,
    };

    let start = Instant::now();
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        if token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(_) => return Response::internal_error("fs_error", "read error"),
        }
    }

    #[derive(Serialize)]
    struct Out<'a> {
        file: &'a str,
        algo: &'static str,
        hex: String,
        elapsed_ms: u64,
    }
    to_json(&Out {
        file: name,
        algo: "sha256",
        hex: format!("{:x}", hasher.finalize()),
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

// ============================================================================
// /sortfile
// ============================================================================

/// Fallas internas del ordenamiento
enum SortError {
    Canceled,
    Io(std::io::Error),
    Parse(String),
}

impl From<std::io::Error> for SortError {
    fn from(e: std::io::Error) -> Self {
        SortError::Io(e)
    }
}

impl SortError {
    fn into_response(self) -> Response {
        match self {
            SortError::Canceled => Response::unavailable("canceled", "job canceled"),
            SortError::Io(e) => Response::internal_error("sort_error", &e.to_string()),
            SortError::Parse(s) => Response::internal_error("sort_error", &format!("parse int: {}", s)),
        }
    }
}

/// `/sortfile?name=FILE[&algo=merge|quick][&chunksize=N]`
///
/// Ordena enteros (uno por línea) hacia `FILE.sorted`. `quick` carga todo en
/// memoria; `merge` hace external sort por chunks con fusión k-way.
pub fn sortfile(token: &CancelToken, params: &Params, data_dir: &Path) -> Response {
    let Some(name) = params.get("name").filter(|n| !n.is_empty()) else {
        return Response::bad_request("name", "file name required");
    };
    let Some(name) = sanitize(name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };

    // Default: external sort, el más robusto
    let algo = match params.get("algo").map(String::as_str) {
        Some("quick") => "quick",
        _ => "merge",
    };
    let chunk_lines = params
        .get("chunksize")
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(1_000_000);

    let in_path = data_dir.join(name);
    let bytes_in = match fs::metadata(&in_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Response::not_found("not_found", "file does not exist");
        }
        Err(_) => return Response::internal_error("fs_error", "stat failed"),
    };
    let sorted_name = format!("{}.sorted", name);
    let out_path = data_dir.join(&sorted_name);

    let start = Instant::now();
    let result = if algo == "quick" {
        sort_in_memory(token, &in_path, &out_path)
    } else {
        external_sort(token, data_dir, &in_path, &out_path, chunk_lines)
    };
    let chunks = match result {
        Ok(chunks) => chunks,
        Err(e) => return e.into_response(),
    };
    let bytes_out = fs::metadata(&out_path).map(|m| m.len()).unwrap_or(0);

    #[derive(Serialize)]
    struct Out<'a> {
        file: &'a str,
        algo: &'a str,
        sorted_file: &'a str,
        chunks: usize,
        bytes_in: u64,
        bytes_out: u64,
        elapsed_ms: u64,
    }
    to_json(&Out {
        file: name,
        algo,
        sorted_file: &sorted_name,
        chunks,
        bytes_in,
        bytes_out,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

/// Lee todos los enteros de un reader, sondeando el token
fn read_ints(
    token: &CancelToken,
    reader: impl BufRead,
    into: &mut Vec<i64>,
) -> Result<(), SortError> {
    let mut i = 0u64;
    for line in reader.lines() {
        let line = line?;
        if i & (CHECK_EVERY - 1) == 0 && token.is_canceled() {
            return Err(SortError::Canceled);
        }
        i += 1;
        let cleaned = clean_int_line(&line);
        if cleaned.is_empty() {
            continue;
        }
        let n: i64 = cleaned
            .parse()
            .map_err(|_| SortError::Parse(cleaned.to_string()))?;
        into.push(n);
    }
    Ok(())
}

fn write_ints(token: &CancelToken, path: &Path, nums: &[i64]) -> Result<(), SortError> {
    let mut writer = BufWriter::with_capacity(1 << 20, File::create(path)?);
    for (i, n) in nums.iter().enumerate() {
        if i as u64 & (CHECK_EVERY - 1) == 0 && token.is_canceled() {
            return Err(SortError::Canceled);
        }
        writeln!(writer, "{}", n)?;
    }
    writer.flush()?;
    Ok(())
}

/// Orden en memoria ("quick"): un solo chunk lógico
fn sort_in_memory(token: &CancelToken, in_path: &Path, out_path: &Path) -> Result<usize, SortError> {
    let mut nums = Vec::new();
    read_ints(token, BufReader::with_capacity(1 << 20, File::open(in_path)?), &mut nums)?;
    nums.sort_unstable();
    write_ints(token, out_path, &nums)?;
    Ok(1)
}

/// External sort: divide en chunks ordenados y fusiona k-way
fn external_sort(
    token: &CancelToken,
    data_dir: &Path,
    in_path: &Path,
    out_path: &Path,
    chunk_lines: usize,
) -> Result<usize, SortError> {
    let reader = BufReader::with_capacity(4 << 20, File::open(in_path)?);
    let mut chunk_files: Vec<PathBuf> = Vec::new();
    let mut nums: Vec<i64> = Vec::with_capacity(chunk_lines.min(1 << 20));

    let flush_chunk =
        |nums: &mut Vec<i64>, chunk_files: &mut Vec<PathBuf>| -> Result<(), SortError> {
            if nums.is_empty() {
                return Ok(());
            }
            nums.sort_unstable();
            let path = data_dir.join(format!(".sortchunk-{}", chunk_files.len()));
            write_ints(token, &path, nums)?;
            chunk_files.push(path);
            nums.clear();
            Ok(())
        };

    let mut i = 0u64;
    for line in reader.lines() {
        let line = line?;
        if i & (CHECK_EVERY - 1) == 0 && token.is_canceled() {
            cleanup_chunks(&chunk_files);
            return Err(SortError::Canceled);
        }
        i += 1;
        let cleaned = clean_int_line(&line);
        if cleaned.is_empty() {
            continue;
        }
        let n: i64 = cleaned.parse().map_err(|_| {
            cleanup_chunks(&chunk_files);
            SortError::Parse(cleaned.to_string())
        })?;
        nums.push(n);
        if nums.len() >= chunk_lines {
            flush_chunk(&mut nums, &mut chunk_files)?;
        }
    }
    flush_chunk(&mut nums, &mut chunk_files)?;

    // Un único chunk: basta renombrarlo
    if chunk_files.len() == 1 {
        fs::rename(&chunk_files[0], out_path)?;
        return Ok(1);
    }
    if chunk_files.is_empty() {
        // Entrada vacía: salida vacía
        File::create(out_path)?;
        return Ok(0);
    }

    let total = chunk_files.len();
    let result = k_way_merge(token, &chunk_files, out_path);
    cleanup_chunks(&chunk_files);
    result?;
    Ok(total)
}

fn cleanup_chunks(paths: &[PathBuf]) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

/// Avanza un reader de chunk hasta el próximo entero (saltando vacías)
fn next_int(reader: &mut BufReader<File>) -> Result<Option<i64>, SortError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let cleaned = clean_int_line(&line);
        if cleaned.is_empty() {
            continue;
        }
        return cleaned
            .parse()
            .map(Some)
            .map_err(|_| SortError::Parse(cleaned.to_string()));
    }
}

/// Fusión k-way con min-heap
fn k_way_merge(token: &CancelToken, parts: &[PathBuf], out_path: &Path) -> Result<(), SortError> {
    let mut readers = Vec::with_capacity(parts.len());
    let mut heap: BinaryHeap<Reverse<(i64, usize)>> = BinaryHeap::new();

    for (idx, part) in parts.iter().enumerate() {
        let mut reader = BufReader::with_capacity(1 << 20, File::open(part)?);
        if let Some(value) = next_int(&mut reader)? {
            heap.push(Reverse((value, idx)));
        }
        readers.push(reader);
    }

    let mut writer = BufWriter::with_capacity(1 << 20, File::create(out_path)?);
    let mut step = 0u64;
    while let Some(Reverse((value, idx))) = heap.pop() {
        if step & (CHECK_EVERY - 1) == 0 && token.is_canceled() {
            return Err(SortError::Canceled);
        }
        step += 1;
        writeln!(writer, "{}", value)?;
        if let Some(next) = next_int(&mut readers[idx])? {
            heap.push(Reverse((next, idx)));
        }
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// /compress
// ============================================================================

/// `/compress?name=FILE[&codec=gzip]`: comprime hacia `FILE.gz`
pub fn compress(token: &CancelToken, params: &Params, data_dir: &Path) -> Response {
    let Some(name) = params.get("name").filter(|n| !n.is_empty()) else {
        return Response::bad_request("name", "file name required");
    };
    let Some(name) = sanitize(name) else {
        return Response::bad_request("bad_name", "invalid file name");
    };
    let codec = params.get("codec").map(String::as_str).unwrap_or("gzip");
    if codec != "gzip" {
        return Response::bad_request("codec", "codec must be gzip");
    }

    let in_path = data_dir.join(name);
    let bytes_in = match fs::metadata(&in_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Response::not_found("not_found", "file does not exist");
        }
        Err(_) => return Response::internal_error("fs_error", "stat failed"),
    };
    let output_name = format!("{}.gz", name);
    let out_path = data_dir.join(&output_name);

    let start = Instant::now();
    let mut input = match open_data_file(&in_path) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let out_file = match File::create(&out_path) {
        Ok(f) => f,
        Err(_) => return Response::internal_error("fs_error", "create failed"),
    };
    let mut encoder = GzEncoder::new(out_file, Compression::fast());

    let mut buf = vec![0u8; 1 << 20];
    loop {
        if token.is_canceled() {
            return Response::unavailable("canceled", "job canceled");
        }
        match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if encoder.write_all(&buf[..n]).is_err() {
                    return Response::internal_error("compress_error", "write failed");
                }
            }
            Err(e) => return Response::internal_error("fs_error", &e.to_string()),
        }
    }
    if let Err(e) = encoder.finish() {
        return Response::internal_error("compress_error", &e.to_string());
    }
    let bytes_out = fs::metadata(&out_path).map(|m| m.len()).unwrap_or(0);

    #[derive(Serialize)]
    struct Out<'a> {
        file: &'a str,
        codec: &'static str,
        output: &'a str,
        bytes_in: u64,
        bytes_out: u64,
        elapsed_ms: u64,
    }
    to_json(&Out {
        file: name,
        codec: "gzip",
        output: &output_name,
        bytes_in,
        bytes_out,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn args(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn token() -> CancelToken {
        CancelToken::new()
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn body_json(res: &Response) -> serde_json::Value {
        assert_eq!(res.status.as_u16(), 200, "respuesta no exitosa: {:?}", res.err);
        serde_json::from_str(&res.body).unwrap()
    }

    #[test]
    fn test_wordcount() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "wc.txt", "hola mundo\nuna linea mas\n\nfin\n");

        let res = wordcount(&token(), &args(&[("name", "wc.txt")]), dir.path());
        let v = body_json(&res);
        assert_eq!(v["file"], "wc.txt");
        assert_eq!(v["lines"], 4);
        assert_eq!(v["words"], 6);
        assert_eq!(v["bytes"], 30);
    }

    #[test]
    fn test_wordcount_missing_file_and_params() {
        let dir = TempDir::new().unwrap();
        let res = wordcount(&token(), &args(&[("name", "nope.txt")]), dir.path());
        assert_eq!(res.err_code(), Some("not_found"));

        let res = wordcount(&token(), &args(&[]), dir.path());
        assert_eq!(res.err_code(), Some("name"));

        let res = wordcount(&token(), &args(&[("name", "../x")]), dir.path());
        assert_eq!(res.err_code(), Some("bad_name"));
    }

    #[test]
    fn test_grep() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "g.txt", "error uno\nok\nerror dos\nnada\n");

        let res = grep(
            &token(),
            &args(&[("name", "g.txt"), ("pattern", "^error")]),
            dir.path(),
        );
        let v = body_json(&res);
        assert_eq!(v["matches"], 2);
        assert_eq!(v["first"], serde_json::json!(["error uno", "error dos"]));
    }

    #[test]
    fn test_grep_validations() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "g.txt", "x\n");

        let res = grep(&token(), &args(&[("name", "g.txt")]), dir.path());
        assert_eq!(res.err_code(), Some("params"));

        let res = grep(
            &token(),
            &args(&[("name", "g.txt"), ("pattern", "[invalid")]),
            dir.path(),
        );
        assert_eq!(res.err_code(), Some("pattern"));
    }

    #[test]
    fn test_grep_caps_first_at_ten() {
        let dir = TempDir::new().unwrap();
        let content: String = (0..25).map(|i| format!("match {}\n", i)).collect();
        write_file(&dir, "many.txt", &content);

        let res = grep(
            &token(),
            &args(&[("name", "many.txt"), ("pattern", "match")]),
            dir.path(),
        );
        let v = body_json(&res);
        assert_eq!(v["matches"], 25);
        assert_eq!(v["first"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_hashfile_known_digest() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "h.txt", "abc");

        let res = hashfile(&token(), &args(&[("name", "h.txt")]), dir.path());
        let v = body_json(&res);
        assert_eq!(v["algo"], "sha256");
        assert_eq!(
            v["hex"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hashfile_rejects_other_algos() {
        let dir = TempDir::new().unwrap();
        let res = hashfile(
            &token(),
            &args(&[("name", "x"), ("algo", "md5")]),
            dir.path(),
        );
        assert_eq!(res.err_code(), Some("algo"));
    }

    #[test]
    fn test_sortfile_quick() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "nums.txt", "3\n1\n\n-5\n2\n");

        let res = sortfile(
            &token(),
            &args(&[("name", "nums.txt"), ("algo", "quick")]),
            dir.path(),
        );
        let v = body_json(&res);
        assert_eq!(v["algo"], "quick");
        assert_eq!(v["chunks"], 1);
        assert_eq!(v["sorted_file"], "nums.txt.sorted");

        let sorted = fs::read_to_string(dir.path().join("nums.txt.sorted")).unwrap();
        assert_eq!(sorted, "-5\n1\n2\n3\n");
    }

    #[test]
    fn test_sortfile_merge_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let content: String = [9, 4, 7, 1, 8, 2, 6, 3, 5, 0]
            .iter()
            .map(|n| format!("{}\n", n))
            .collect();
        write_file(&dir, "nums.txt", &content);

        let res = sortfile(
            &token(),
            &args(&[("name", "nums.txt"), ("algo", "merge"), ("chunksize", "3")]),
            dir.path(),
        );
        let v = body_json(&res);
        assert_eq!(v["chunks"], 4);

        let sorted = fs::read_to_string(dir.path().join("nums.txt.sorted")).unwrap();
        assert_eq!(sorted, "0\n1\n2\n3\n4\n5\n6\n7\n8\n9\n");

        // Los temporales se limpian
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".sortchunk"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_sortfile_parse_error() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "bad.txt", "1\nno-numero\n3\n");

        let res = sortfile(
            &token(),
            &args(&[("name", "bad.txt"), ("algo", "quick")]),
            dir.path(),
        );
        assert_eq!(res.status.as_u16(), 500);
        assert_eq!(res.err_code(), Some("sort_error"));
    }

    #[test]
    fn test_sortfile_missing_file_and_bom() {
        let dir = TempDir::new().unwrap();
        let res = sortfile(&token(), &args(&[("name", "nope")]), dir.path());
        assert_eq!(res.err_code(), Some("not_found"));

        // BOM al inicio no rompe el parseo
        write_file(&dir, "bom.txt", "\u{feff}2\n1\n");
        let res = sortfile(
            &token(),
            &args(&[("name", "bom.txt"), ("algo", "quick")]),
            dir.path(),
        );
        assert_eq!(res.status.as_u16(), 200);
        let sorted = fs::read_to_string(dir.path().join("bom.txt.sorted")).unwrap();
        assert_eq!(sorted, "1\n2\n");
    }

    #[test]
    fn test_compress_gzip_roundtrip() {
        let dir = TempDir::new().unwrap();
        let content = "contenido repetido ".repeat(200);
        write_file(&dir, "c.txt", &content);

        let res = compress(&token(), &args(&[("name", "c.txt")]), dir.path());
        let v = body_json(&res);
        assert_eq!(v["codec"], "gzip");
        assert_eq!(v["output"], "c.txt.gz");
        assert_eq!(v["bytes_in"], content.len() as u64);
        let bytes_out = v["bytes_out"].as_u64().unwrap();
        assert!(bytes_out > 0 && bytes_out < content.len() as u64);

        let mut decoder = GzDecoder::new(File::open(dir.path().join("c.txt.gz")).unwrap());
        let mut back = String::new();
        decoder.read_to_string(&mut back).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn test_compress_validations() {
        let dir = TempDir::new().unwrap();
        let res = compress(
            &token(),
            &args(&[("name", "x"), ("codec", "xz")]),
            dir.path(),
        );
        assert_eq!(res.err_code(), Some("codec"));

        let res = compress(&token(), &args(&[("name", "nope")]), dir.path());
        assert_eq!(res.err_code(), Some("not_found"));
    }

    #[test]
    fn test_canceled_token_cuts_io_handlers() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "f.txt", "1\n2\n3\n");
        let t = token();
        t.cancel();

        for res in [
            wordcount(&t, &args(&[("name", "f.txt")]), dir.path()),
            grep(&t, &args(&[("name", "f.txt"), ("pattern", "1")]), dir.path()),
            hashfile(&t, &args(&[("name", "f.txt")]), dir.path()),
            sortfile(&t, &args(&[("name", "f.txt")]), dir.path()),
            compress(&t, &args(&[("name", "f.txt")]), dir.path()),
        ] {
            assert_eq!(res.err_code(), Some("canceled"));
        }
    }
}
