//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Conjunto cerrado de códigos de estado que usa el servidor. Según el
//! RFC 1945 (HTTP/1.0), cada código lleva una "reason phrase" estándar:
//!
//! - **2xx**: Éxito (200 OK)
//! - **4xx**: Error del cliente (400, 404, 409, 429)
//! - **5xx**: Error del servidor (500, 503)

use serde::{Deserialize, Serialize};

/// Códigos de estado HTTP que puede producir el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum StatusCode {
    /// 200 OK - La petición fue exitosa
    Ok = 200,

    /// 400 Bad Request - Parámetros inválidos o framing HTTP malformado
    BadRequest = 400,

    /// 404 Not Found - Ruta, archivo o job inexistente
    NotFound = 404,

    /// 409 Conflict - Conflicto en el estado del recurso (ej: archivo ya existe)
    Conflict = 409,

    /// 429 Too Many Requests - Reservado para rate limiting
    TooManyRequests = 429,

    /// 500 Internal Server Error - Error interno del servidor
    InternalServerError = 500,

    /// 503 Service Unavailable - Backpressure, timeout o pool cerrado
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Retorna la "reason phrase" asociada al código (RFC 1945)
    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::Conflict => "Conflict",
            StatusCode::TooManyRequests => "Too Many Requests",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            200 => Ok(StatusCode::Ok),
            400 => Ok(StatusCode::BadRequest),
            404 => Ok(StatusCode::NotFound),
            409 => Ok(StatusCode::Conflict),
            429 => Ok(StatusCode::TooManyRequests),
            500 => Ok(StatusCode::InternalServerError),
            503 => Ok(StatusCode::ServiceUnavailable),
            other => Err(format!("unknown status code: {}", other)),
        }
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
