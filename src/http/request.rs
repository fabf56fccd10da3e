//! # Parsing de Requests HTTP/1.0
//! src/http/request.rs
//!
//! Parser estricto de HTTP/1.0 que lee directamente del socket.
//!
//! ## Formato de un Request HTTP/1.0
//!
//! ```text
//! GET /path?param1=value1&param2=value2 HTTP/1.0\r\n
//! Host: localhost:8080\r\n
//! User-Agent: curl/7.68.0\r\n
//! \r\n
//! ```
//!
//! ## Reglas de parsing
//!
//! 1. **Request line**: exactamente tres tokens separados por un espacio,
//!    terminada en CRLF. La versión debe ser literalmente `HTTP/1.0`.
//! 2. **Headers**: líneas `Name: Value` terminadas en CRLF. Los nombres se
//!    normalizan a minúsculas y los valores se recortan; si una clave se
//!    repite gana la última.
//! 3. **Línea vacía**: un CRLF solo cierra los headers.
//! 4. **Body**: no se lee (el servidor solo atiende GET).
//!
//! Un EOF antes de recibir el primer byte no es un request malformado: es el
//! caso "el peer cerró sin enviar nada" y se reporta como [`ParseError::Eof`].

use std::collections::HashMap;
use std::io::BufRead;
use thiserror::Error;

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Error)]
pub enum ParseError {
    /// Request malformado: falta CRLF, request line inválida, header sin ':'
    #[error("malformed request (CRLF/fields)")]
    BadRequest,

    /// La versión del protocolo no es HTTP/1.0
    #[error("unsupported protocol (HTTP/1.0 only)")]
    BadProto,

    /// El peer cerró la conexión antes de enviar un request
    #[error("connection closed before request")]
    Eof,

    /// Error de lectura del socket
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Representa un request HTTP/1.0 parseado
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP tal como llegó (ej: "GET")
    method: String,

    /// Target completo, path con query incluido (ej: "/reverse?text=abc")
    target: String,

    /// Versión del protocolo (siempre "HTTP/1.0")
    version: String,

    /// Headers con claves en minúsculas y valores recortados
    headers: HashMap<String, String>,
}

impl Request {
    /// Lee y parsea un request HTTP/1.0 estricto desde un reader
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use task_server::http::Request;
    ///
    /// let raw: &[u8] = b"GET /reverse?text=abc HTTP/1.0\r\nHost: localhost\r\n\r\n";
    /// let req = Request::read_from(&mut &raw[..]).unwrap();
    ///
    /// assert_eq!(req.method(), "GET");
    /// assert_eq!(req.target(), "/reverse?text=abc");
    /// assert_eq!(req.header("host"), Some("localhost"));
    /// ```
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, ParseError> {
        // Request line
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(ParseError::Eof);
        }
        let Some(line) = line.strip_suffix("\r\n") else {
            return Err(ParseError::BadRequest);
        };

        // Exactamente: METHOD SP TARGET SP VERSION
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() != 3 {
            return Err(ParseError::BadRequest);
        }
        let (method, target, version) = (parts[0], parts[1], parts[2]);
        if version != "HTTP/1.0" {
            return Err(ParseError::BadProto);
        }

        // Headers hasta la línea vacía
        let mut headers = HashMap::new();
        loop {
            let mut raw = String::new();
            let n = reader.read_line(&mut raw)?;
            if n == 0 {
                // EOF a mitad de headers sí es un request malformado
                return Err(ParseError::BadRequest);
            }
            if raw == "\r\n" {
                break;
            }
            let Some(stripped) = raw.strip_suffix("\r\n") else {
                return Err(ParseError::BadRequest);
            };
            let Some((name, value)) = stripped.split_once(':') else {
                return Err(ParseError::BadRequest);
            };
            headers.insert(
                name.trim().to_lowercase(),
                value.trim().to_string(),
            );
        }

        Ok(Request {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
            headers,
        })
    }

    /// Obtiene el método HTTP del request
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Obtiene el target completo (path + query)
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Obtiene la versión del protocolo
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Obtiene todos los headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Obtiene un header específico (la clave debe ir en minúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

/// Separa un target en (path, query) cortando en el primer `?`.
///
/// Ninguna de las dos partes se decodifica (sin percent-decoding).
pub fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

/// Parsea una query string tipo `a=1&b=2` en un mapa simple.
///
/// - Los segmentos vacíos se descartan (`a=1&&b=2` tiene dos entradas).
/// - Un segmento sin `=` produce la clave con valor vacío.
/// - Si hay más de un `=`, el resto queda en el valor.
/// - Clave repetida: gana la última.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for segment in query.split('&') {
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, value)) => params.insert(key.to_string(), value.to_string()),
            None => params.insert(segment.to_string(), String::new()),
        };
    }
    params
}
