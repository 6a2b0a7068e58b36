//! # Módulo de Resposta - Modelo Tipado e Redação
//!
//! Define o resultado tipado de uma operação (`ResponseResult`) e o passe
//! de redação que limpa valores sensíveis de toda mensagem emitida.
//!
//! ## Headers multi-valor:
//!
//! Headers repetidos na resposta são concatenados com `", "` na ordem
//! recebida, e é essa forma concatenada que participa de comparações e
//! extrações. A busca por nome nunca diferencia maiúsculas/minúsculas.
//!
//! ## Redação:
//!
//! O passe de redação trabalha por VALOR: os valores dos headers da
//! lista `redact_headers` (onde quer que tenham sido declarados), tokens
//! bearer e senhas basic são substituídos por `[REDACTED]` em qualquer
//! mensagem de erro ou diagnóstico. Assim, nem mensagens do transporte
//! que ecoam a requisição conseguem vazar um segredo.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sufixo anexado ao corpo quando o teto de leitura foi atingido.
pub const TRUNCATION_SENTINEL: &str = "... [TRUNCATED]";

/// Texto que substitui valores sensíveis em mensagens.
pub const REDACTED: &str = "[REDACTED]";

// ============================================================================
// RESULTADO DA OPERAÇÃO: RESPONSE RESULT
// ============================================================================

/// Resultado tipado de uma operação de requisição.
///
/// Produzido uma vez por operação, mesmo em falha: uma falha de
/// transporte gera `status_code = 0` com `error` preenchido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseResult {
    /// Status HTTP final; 0 quando o transporte falhou.
    pub status_code: u16,

    /// Headers da resposta, nome → valor concatenado com `", "`.
    pub headers: HashMap<String, String>,

    /// Corpo decodificado; pode terminar em `"... [TRUNCATED]"`.
    pub body: String,

    /// Número exato de tentativas de transporte realizadas.
    pub attempt_count: u32,

    /// Mensagem de erro já redigida, se a operação falhou.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseResult {
    /// Resultado para falha de transporte sem nenhuma resposta.
    pub fn transport_failure(message: impl Into<String>, attempt_count: u32) -> Self {
        Self {
            status_code: 0,
            headers: HashMap::new(),
            body: String::new(),
            attempt_count,
            error: Some(message.into()),
        }
    }

    /// Busca um header sem diferenciar maiúsculas/minúsculas.
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == wanted)
            .map(|(_, v)| v.as_str())
    }
}

/// Concatena pares ordenados de headers em um mapa nome → valor.
///
/// Ocorrências repetidas do mesmo nome (case-insensitive) são unidas
/// com `", "` na ordem recebida; a grafia da primeira ocorrência vence.
pub fn join_header_pairs(pairs: &[(String, String)]) -> HashMap<String, String> {
    let mut joined: HashMap<String, String> = HashMap::new();
    let mut canonical: HashMap<String, String> = HashMap::new();

    for (name, value) in pairs {
        let key = name.to_ascii_lowercase();
        let display = canonical
            .entry(key)
            .or_insert_with(|| name.clone())
            .clone();

        joined
            .entry(display)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }

    joined
}

// ============================================================================
// REDAÇÃO
// ============================================================================

/// Substitui valores sensíveis conhecidos por `[REDACTED]`.
///
/// O construtor de requisição alimenta o redator com cada valor
/// sensível que passou pela requisição; o executor aplica o passe em
/// toda mensagem antes de entregá-la ao host.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    values: Vec<String>,
}

impl Redactor {
    /// Cria um redator sem valores registrados.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra um valor sensível.
    ///
    /// Valores vazios são ignorados: substituí-los corromperia qualquer
    /// mensagem.
    pub fn add_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.values.push(value);
        }
    }

    /// Aplica a redação sobre uma mensagem.
    pub fn apply(&self, message: &str) -> String {
        let mut result = message.to_string();
        for value in &self.values {
            if result.contains(value.as_str()) {
                result = result.replace(value.as_str(), REDACTED);
            }
        }
        result
    }
}

// ============================================================================
// TESTES
// ============================================================================
