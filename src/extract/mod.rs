//! # Módulo de Extração - Saídas Nomeadas da Resposta
//!
//! Materializa os valores escalares que specs posteriores podem
//! referenciar: cada `ExtractRule` vira uma entrada em `outputs`.
//!
//! ## Para todos entenderem:
//!
//! Imagine que a criação de um recurso devolve um id na resposta.
//! Specs seguintes (e a sub-spec de destroy) precisam desse id:
//!
//! 1. **Recebe** a resposta (body JSON, headers)
//! 2. **Busca** o dado pelo caminho JSON ou pelo nome do header
//! 3. **Converte** para a forma escalar em string
//! 4. **Publica** em `outputs` sob o nome declarado
//!
//! ## Regras importantes:
//!
//! - Extração NUNCA falha a operação: fonte ausente produz string
//!   vazia e um diagnóstico de warning.
//! - Header tem precedência quando a regra declara as duas fontes.
//! - Nomes duplicados: a última regra vence.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::ErrorCode;
use crate::jsonpath;
use crate::protocol::ExtractRule;
use crate::response::ResponseResult;

/// Mapa de saídas nomeadas produzido pela extração.
pub type Outputs = BTreeMap<String, String>;

// ============================================================================
// RESULTADO DE EXTRAÇÃO
// ============================================================================

/// Resultado de uma regra de extração, para diagnósticos e relatório.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    /// Nome da saída (target em `outputs`).
    pub name: String,

    /// Fonte utilizada: "header" ou "json_path".
    pub source: String,

    /// Caminho ou nome de header consultado.
    pub path: String,

    /// Valor extraído, quando a fonte existia.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Mensagem de erro, quando a fonte estava ausente.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Código estruturado da falha.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Se a extração encontrou a fonte.
    pub success: bool,
}

impl ExtractionOutcome {
    fn found(name: &str, source: &str, path: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            path: path.to_string(),
            value: Some(value),
            error: None,
            error_code: None,
            success: true,
        }
    }

    fn missing(name: &str, source: &str, path: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            path: path.to_string(),
            value: None,
            error: Some(error),
            error_code: Some(ErrorCode::EXTRACTION_MISS.formatted()),
            success: false,
        }
    }
}

// ============================================================================
// MOTOR DE EXTRAÇÃO
// ============================================================================

/// Motor de extração de saídas.
pub struct Extractor;

impl Extractor {
    /// Processa todas as regras de uma spec contra a resposta final.
    ///
    /// ## Retorno:
    /// - Um resultado por regra, na ordem declarada
    /// - O mapa `outputs` (toda regra produz entrada; ausência = `""`)
    pub fn process(
        rules: &[ExtractRule],
        body_json: Option<&Value>,
        response: &ResponseResult,
    ) -> (Vec<ExtractionOutcome>, Outputs) {
        let mut outcomes = Vec::with_capacity(rules.len());
        let mut outputs = Outputs::new();

        for rule in rules {
            let outcome = Self::extract_single(rule, body_json, response);

            // Toda regra publica uma entrada; ausência vira string vazia.
            outputs.insert(
                rule.name.clone(),
                outcome.value.clone().unwrap_or_default(),
            );

            if outcome.success {
                tracing::debug!(
                    name = %outcome.name,
                    source = %outcome.source,
                    path = %outcome.path,
                    "extraction succeeded"
                );
            } else {
                tracing::warn!(
                    name = %outcome.name,
                    source = %outcome.source,
                    path = %outcome.path,
                    error = %outcome.error.as_deref().unwrap_or("unknown"),
                    "extraction missed, output set to empty string"
                );
            }

            outcomes.push(outcome);
        }

        (outcomes, outputs)
    }

    /// Processa uma única regra. Header vence quando ambas as fontes
    /// foram declaradas.
    fn extract_single(
        rule: &ExtractRule,
        body_json: Option<&Value>,
        response: &ResponseResult,
    ) -> ExtractionOutcome {
        if let Some(header_name) = &rule.header {
            return Self::extract_from_header(&rule.name, header_name, response);
        }

        if let Some(path) = &rule.json_path {
            return Self::extract_from_body(&rule.name, path, body_json);
        }

        ExtractionOutcome::missing(
            &rule.name,
            "json_path",
            "",
            "extract rule declares neither 'json_path' nor 'header'".to_string(),
        )
    }

    /// Extrai do corpo JSON pela notação de ponto.
    fn extract_from_body(
        name: &str,
        path: &str,
        body_json: Option<&Value>,
    ) -> ExtractionOutcome {
        let body = match body_json {
            Some(b) => b,
            None => {
                return ExtractionOutcome::missing(
                    name,
                    "json_path",
                    path,
                    "response body is empty or not valid JSON".to_string(),
                );
            }
        };

        match jsonpath::evaluate(body, path) {
            Ok(value) => {
                ExtractionOutcome::found(name, "json_path", path, jsonpath::stringify(value))
            }
            Err(e) => ExtractionOutcome::missing(name, "json_path", path, e.to_string()),
        }
    }

    /// Extrai de um header da resposta (case-insensitive).
    fn extract_from_header(
        name: &str,
        header_name: &str,
        response: &ResponseResult,
    ) -> ExtractionOutcome {
        match response.header(header_name) {
            Some(value) => {
                ExtractionOutcome::found(name, "header", header_name, value.to_string())
            }
            None => ExtractionOutcome::missing(
                name,
                "header",
                header_name,
                format!("header '{}' not present in response", header_name),
            ),
        }
    }
}

// ============================================================================
// TESTES
// ============================================================================
