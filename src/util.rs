//! # Utilidades
//! src/util.rs

/// Genera un identificador corto (16 caracteres hex) para correlacionar
/// peticiones y jobs en logs y respuestas.
pub fn new_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
