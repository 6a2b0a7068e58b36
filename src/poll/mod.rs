//! # Módulo de Polling - Avaliação da Condição de Parada
//!
//! Decide se uma resposta satisfaz a `PollCondition` declarada e, quando
//! não satisfaz, explica exatamente o porquê.
//!
//! ## Para todos entenderem:
//!
//! Polling é "perguntar de novo até a resposta ficar pronta". A condição
//! descreve o que "pronta" significa: um status específico, um campo
//! JSON com certo valor, um header, um padrão no corpo. O loop de retry
//! consulta este módulo após cada tentativa:
//!
//! - **satisfeita** → o loop termina com sucesso
//! - **insatisfeita** → o loop dorme e tenta de novo, guardando as
//!   razões para o relatório final (`PollingExhausted`)
//!
//! ## Semântica:
//!
//! Todas as sub-condições presentes precisam valer AO MESMO TEMPO.
//! Uma condição vazia é considerada satisfeita.

use regex::Regex;
use serde_json::Value;

use crate::errors::ExecError;
use crate::jsonpath;
use crate::protocol::PollCondition;
use crate::response::ResponseResult;

// ============================================================================
// VEREDITO
// ============================================================================

/// Resultado da avaliação de uma condição de polling.
#[derive(Debug, Clone)]
pub struct PollVerdict {
    /// Todas as sub-condições valeram.
    pub satisfied: bool,

    /// Uma razão legível por sub-condição violada (vazio se satisfeita).
    pub unsatisfied: Vec<String>,
}

impl PollVerdict {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            unsatisfied: Vec::new(),
        }
    }
}

// ============================================================================
// VALIDAÇÃO PRÉVIA
// ============================================================================

/// Valida a condição antes do loop começar.
///
/// Regex inválida é erro de spec e precisa falhar ANTES de qualquer
/// tentativa, não silenciosamente a cada avaliação.
pub fn validate(condition: &PollCondition) -> Result<(), ExecError> {
    if let Some(pattern) = &condition.body_regex {
        Regex::new(pattern).map_err(|e| {
            ExecError::InvalidSpec(format!("invalid body_regex '{}': {}", pattern, e))
        })?;
    }
    Ok(())
}

// ============================================================================
// AVALIAÇÃO
// ============================================================================

/// Avalia a condição contra uma resposta.
pub fn evaluate(condition: &PollCondition, response: &ResponseResult) -> PollVerdict {
    if condition.is_empty() {
        return PollVerdict::satisfied();
    }

    let mut unsatisfied = Vec::new();

    // Status dentro do conjunto declarado.
    if !condition.status_codes.is_empty()
        && !condition.status_codes.contains(&response.status_code)
    {
        unsatisfied.push(format!(
            "status {} not in {:?}",
            response.status_code, condition.status_codes
        ));
    }

    // Igualdade por caminho JSON. Corpo não-JSON falha a condição.
    if !condition.json_path_equals.is_empty() {
        match serde_json::from_str::<Value>(&response.body) {
            Ok(body) => {
                for (path, expected) in &condition.json_path_equals {
                    match jsonpath::evaluate(&body, path) {
                        Ok(actual) => {
                            if !jsonpath::literal_matches(actual, expected) {
                                unsatisfied.push(format!(
                                    "json path '{}': expected '{}', got '{}'",
                                    path,
                                    expected,
                                    jsonpath::stringify(actual)
                                ));
                            }
                        }
                        Err(e) => unsatisfied.push(format!("json path '{}': {}", path, e)),
                    }
                }
            }
            Err(_) => {
                unsatisfied.push("response body is not valid JSON".to_string());
            }
        }
    }

    // Igualdade de headers (case-insensitive no nome).
    for (name, expected) in &condition.header_equals {
        match response.header(name) {
            Some(actual) if actual == expected => {}
            Some(actual) => unsatisfied.push(format!(
                "header '{}': expected '{}', got '{}'",
                name, expected, actual
            )),
            None => unsatisfied.push(format!("header '{}' not present", name)),
        }
    }

    // Regex sobre o corpo. Padrão vazio casa com qualquer corpo.
    if let Some(pattern) = &condition.body_regex {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(&response.body) {
                    unsatisfied.push(format!("body does not match regex '{}'", pattern));
                }
            }
            // validate() roda antes do loop; chegar aqui é spec inválida
            // que escapou do chamador.
            Err(e) => unsatisfied.push(format!("invalid body_regex '{}': {}", pattern, e)),
        }
    }

    PollVerdict {
        satisfied: unsatisfied.is_empty(),
        unsatisfied,
    }
}

// ============================================================================
// TESTES
// ============================================================================
