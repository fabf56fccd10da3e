//! # Sobre de Respuesta y Serialización HTTP/1.0
//! src/http/response.rs
//!
//! Este módulo define el sobre uniforme que viaja desde los handlers y los
//! pools hasta el socket, y su serialización HTTP/1.0.
//!
//! ## Formato de una respuesta HTTP/1.0
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Length: 12\r\n
//! Content-Type: application/json\r\n
//! Date: Tue, 14 Jul 2026 10:00:00 GMT\r\n
//! ...
//! \r\n
//! {"ok": true}
//! ```
//!
//! ## El sobre
//!
//! Un [`Response`] lleva el código de estado, el body (posiblemente un JSON ya
//! serializado), un flag que distingue JSON de texto plano, un descriptor de
//! error opcional `{error, detail}` y headers extra a mezclar al serializar.
//! Cuando hay descriptor de error el body va vacío: el JSON de error se
//! produce recién al escribir la respuesta.

use super::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Cadena identificadora enviada en el header `Server`
pub const SERVER_ID: &str = "task-server/0.1";

/// Descriptor de error estándar que se serializa como `{"error","detail"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Código de error para máquinas (ej: "backpressure", "not_found")
    #[serde(rename = "error")]
    pub code: String,

    /// Detalle legible para humanos
    pub detail: String,
}

/// Sobre de respuesta uniforme producido por handlers y pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Código de estado HTTP
    pub status: StatusCode,

    /// Body de la respuesta; si `json` es true ya viene serializado
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,

    /// Distingue `application/json` de `text/plain`
    #[serde(default)]
    pub json: bool,

    /// Descriptor de error; cuando está presente el body debe ir vacío
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<ErrorBody>,

    /// Headers adicionales a mezclar al serializar (ej: X-Worker-Id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl Response {
    /// 200 con texto plano
    pub fn plain_ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            body: body.into(),
            json: false,
            err: None,
            headers: None,
        }
    }

    /// 200 con un JSON ya serializado
    pub fn json_ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::Ok,
            body: body.into(),
            json: true,
            err: None,
            headers: None,
        }
    }

    /// Respuesta JSON con un código arbitrario del conjunto soportado
    /// (ej: el 409 de /createfile, que lleva body propio y no descriptor)
    pub fn json_with_status(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            json: true,
            err: None,
            headers: None,
        }
    }

    fn error(status: StatusCode, code: &str, detail: &str) -> Self {
        Self {
            status,
            body: String::new(),
            json: true,
            err: Some(ErrorBody {
                code: code.to_string(),
                detail: detail.to_string(),
            }),
            headers: None,
        }
    }

    /// 400 Bad Request con `{error, detail}`
    pub fn bad_request(code: &str, detail: &str) -> Self {
        Self::error(StatusCode::BadRequest, code, detail)
    }

    /// 404 Not Found con `{error, detail}`
    pub fn not_found(code: &str, detail: &str) -> Self {
        Self::error(StatusCode::NotFound, code, detail)
    }

    /// 409 Conflict con `{error, detail}`
    pub fn conflict(code: &str, detail: &str) -> Self {
        Self::error(StatusCode::Conflict, code, detail)
    }

    /// 429 Too Many Requests con `{error, detail}`
    pub fn too_many(code: &str, detail: &str) -> Self {
        Self::error(StatusCode::TooManyRequests, code, detail)
    }

    /// 500 Internal Server Error con `{error, detail}`
    pub fn internal_error(code: &str, detail: &str) -> Self {
        Self::error(StatusCode::InternalServerError, code, detail)
    }

    /// 503 Service Unavailable con `{error, detail}`
    pub fn unavailable(code: &str, detail: &str) -> Self {
        Self::error(StatusCode::ServiceUnavailable, code, detail)
    }

    /// Devuelve la misma respuesta con un header adicional
    ///
    /// # Ejemplo
    /// ```
    /// use task_server::http::Response;
    ///
    /// let res = Response::plain_ok("hola\n").with_header("X-Worker-Id", "sleep#0");
    /// assert_eq!(
    ///     res.headers.as_ref().unwrap().get("X-Worker-Id").map(String::as_str),
    ///     Some("sleep#0"),
    /// );
    /// ```
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Código de error del descriptor, si lo hay
    pub fn err_code(&self) -> Option<&str> {
        self.err.as_ref().map(|e| e.code.as_str())
    }

    /// Body efectivo que irá en el socket.
    ///
    /// Con descriptor de error produce `{"error":"<code>","detail":"<detail>"}`;
    /// serde_json escapa las comillas del detail pero nunca `&`, `<` ni `>`,
    /// así las URLs de sugerencia se leen literales.
    pub fn wire_body(&self) -> String {
        match &self.err {
            Some(err) => serde_json::to_string(err).unwrap_or_else(|_| {
                r#"{"error":"internal","detail":"serialization failed"}"#.to_string()
            }),
            None => self.body.clone(),
        }
    }

    /// Serializa la respuesta completa (status line + headers + body).
    ///
    /// Headers por defecto: `Date` (RFC 1123, UTC), `Content-Type`,
    /// `Content-Length`, `Connection: close` y `Server`. Los headers en
    /// `extra` (trazabilidad de la conexión) los sobreescriben, y los del
    /// propio sobre (ej: `X-Worker-Id`) tienen la última palabra.
    pub fn to_bytes(&self, extra: &HashMap<String, String>) -> Vec<u8> {
        let body = self.wire_body();
        let content_type = if self.json || self.err.is_some() {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        };

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        headers.insert(
            "Date".to_string(),
            Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
        headers.insert("Content-Type".to_string(), content_type.to_string());
        headers.insert("Content-Length".to_string(), body.len().to_string());
        headers.insert("Connection".to_string(), "close".to_string());
        headers.insert("Server".to_string(), SERVER_ID.to_string());
        for (k, v) in extra {
            headers.insert(k.clone(), v.clone());
        }
        if let Some(own) = &self.headers {
            for (k, v) in own {
                headers.insert(k.clone(), v.clone());
            }
        }

        let mut out = Vec::with_capacity(256 + body.len());
        out.extend_from_slice(
            format!("HTTP/1.0 {} {}\r\n", self.status.as_u16(), self.status.reason_phrase())
                .as_bytes(),
        );
        for (name, value) in &headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(body.as_bytes());
        out
    }
}
