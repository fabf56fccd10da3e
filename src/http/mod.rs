//! # Módulo HTTP
//!
//! Este módulo implementa el subconjunto servidor de HTTP/1.0 desde cero,
//! sin librerías de alto nivel. Incluye:
//!
//! - Parsing estricto de requests HTTP/1.0 (request line, headers)
//! - El sobre de respuesta uniforme y su serialización
//! - Códigos de estado soportados
//! - Separación de path/query y parsing de query strings
//!
//! ## Especificación HTTP/1.0
//!
//! El protocolo HTTP/1.0 (RFC 1945) es más simple que HTTP/1.1:
//! - No requiere el header `Host`
//! - No tiene chunked transfer encoding
//! - Una conexión atiende un único request (`Connection: close`)

pub mod request;   // Parsing de HTTP requests + query strings
pub mod response;  // Sobre de respuesta y serialización
pub mod status;    // Códigos de estado HTTP

// Re-exportamos los tipos principales para facilitar su uso
pub use request::{parse_query, split_target, ParseError, Request};
pub use response::{ErrorBody, Response};
pub use status::StatusCode;
