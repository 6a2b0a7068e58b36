//! # Módulo de Caminhos JSON - Avaliação de Dot-Paths
//!
//! Avalia caminhos com notação de ponto e índices de colchete sobre um
//! documento JSON já parseado.
//!
//! ## Gramática aceita:
//!
//! ```text
//! caminho  := segmento ("." segmento)*  |  ""           (vazio = raiz)
//! segmento := chave | chave "[" índice "]" | "[" índice "]"
//! ```
//!
//! Exemplos: `data.token`, `items[0].sku`, `[2].id` (raiz é array).
//!
//! ## Semântica:
//!
//! - `.chave` em objeto retorna o valor; chave ausente é erro.
//! - `[n]` em array retorna o elemento n; índice fora dos limites ou
//!   não numérico é erro.
//! - Tipo errado em passo intermediário é erro.
//! - Caminho vazio retorna a raiz.
//!
//! O chamador decide a forma em string: `stringify` para extração,
//! `literal_matches` para comparações de igualdade.

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// ERROS DE CAMINHO
// ============================================================================

/// Erros de avaliação de caminho JSON.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathError {
    /// A chave não existe no objeto visitado.
    #[error("path '{path}' not found: key '{key}' missing")]
    NotFound { path: String, key: String },

    /// Índice de array fora dos limites.
    #[error("path '{path}': index {index} out of bounds (array has {len} elements)")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// Índice de array não é um inteiro.
    #[error("path '{path}': invalid array index '{segment}'")]
    BadIndex { path: String, segment: String },

    /// O valor visitado não tem o tipo exigido pelo segmento.
    #[error("path '{path}': expected {expected} while resolving '{segment}'")]
    TypeMismatch {
        path: String,
        segment: String,
        expected: &'static str,
    },
}

// ============================================================================
// AVALIAÇÃO
// ============================================================================

/// Avalia um caminho sobre um documento e retorna o valor bruto.
pub fn evaluate<'a>(root: &'a Value, path: &str) -> Result<&'a Value, PathError> {
    if path.is_empty() {
        return Ok(root);
    }

    let mut current = root;
    for segment in split_path(path) {
        current = step(current, &segment, path)?;
    }
    Ok(current)
}

/// Divide um caminho em segmentos, separando índices de colchete.
///
/// Exemplo: `"users[0].name"` → `["users", "[0]", "name"]`
fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(current.clone());
                    current.clear();
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(current.clone());
                    current.clear();
                }
                current.push('[');
                for next in chars.by_ref() {
                    current.push(next);
                    if next == ']' {
                        break;
                    }
                }
                segments.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Resolve um único segmento do caminho.
fn step<'a>(value: &'a Value, segment: &str, full_path: &str) -> Result<&'a Value, PathError> {
    // Índice de array: [0], [17]
    if let Some(inner) = segment.strip_prefix('[') {
        let index_str = inner.strip_suffix(']').unwrap_or(inner);
        let index: usize = index_str.parse().map_err(|_| PathError::BadIndex {
            path: full_path.to_string(),
            segment: segment.to_string(),
        })?;

        return match value {
            Value::Array(items) => items.get(index).ok_or_else(|| PathError::IndexOutOfBounds {
                path: full_path.to_string(),
                index,
                len: items.len(),
            }),
            _ => Err(PathError::TypeMismatch {
                path: full_path.to_string(),
                segment: segment.to_string(),
                expected: "array",
            }),
        };
    }

    // Chave de objeto
    match value {
        Value::Object(map) => map.get(segment).ok_or_else(|| PathError::NotFound {
            path: full_path.to_string(),
            key: segment.to_string(),
        }),
        _ => Err(PathError::TypeMismatch {
            path: full_path.to_string(),
            segment: segment.to_string(),
            expected: "object",
        }),
    }
}

// ============================================================================
// FORMAS EM STRING
// ============================================================================

/// Forma em string de um valor para fins de extração.
///
/// - string → o conteúdo, sem aspas
/// - bool → `"true"` / `"false"`
/// - número → decimal mínimo de ida-e-volta (Display do serde_json)
/// - null → string vazia
/// - objeto/array → JSON compacto
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Compara um valor obtido contra um literal esperado.
///
/// O literal é parseado como JSON quando possível e comparado
/// estruturalmente; caso contrário a forma canônica em string do valor
/// obtido é comparada ao literal.
pub fn literal_matches(actual: &Value, expected_literal: &str) -> bool {
    match serde_json::from_str::<Value>(expected_literal) {
        Ok(expected) => actual == &expected,
        Err(_) => stringify(actual) == expected_literal,
    }
}

// ============================================================================
// TESTES
// ============================================================================
