//! # Módulo Executor - Ponto de Entrada das Operações
//!
//! Amarra o pipeline completo de uma operação (create/read/update):
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │ 1. Build │ →  │ 2. Retry │ →  │ 3. Expect│ →  │ 4.Extract│
//! │  request │    │   loop   │    │          │    │          │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! ## Contrato de erro:
//!
//! - Erros de construção (`InvalidSpec`, `InvalidConfig`) retornam como
//!   `Err` ANTES de qualquer tentativa.
//! - Desfechos do loop e das expectations vêm DENTRO do
//!   `ExecutionResult`, junto com a resposta, as saídas e os
//!   diagnósticos, para o host decidir o que persistir.
//! - Toda mensagem passa pelo passe de redação antes de sair.

use tokio::time::Instant;

use crate::errors::{Diagnostic, ErrorCode, ExecError};
use crate::expect;
use crate::extract::{Extractor, Outputs};
use crate::poll;
use crate::protocol::{ProviderDefaults, RequestSpec};
use crate::request;
use crate::response::{Redactor, ResponseResult, TRUNCATION_SENTINEL};
use crate::retry::RetryEngine;
use crate::transport::{HttpTransport, Transport};

// ============================================================================
// RESULTADO DA OPERAÇÃO
// ============================================================================

/// Resultado completo de uma operação de execução.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Resposta tipada (status 0 em falha de transporte).
    pub response: ResponseResult,

    /// Saídas nomeadas extraídas (vazio quando a operação falhou).
    pub outputs: Outputs,

    /// Diagnósticos já redigidos, em ordem de emissão.
    pub diagnostics: Vec<Diagnostic>,

    /// Desfecho de erro do loop/validação, se a operação falhou.
    pub error: Option<ExecError>,
}

impl ExecutionResult {
    /// True quando a operação terminou sem erro.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ============================================================================
// EXECUÇÃO
// ============================================================================

/// Executa uma RequestSpec completa contra o transporte real.
///
/// Constrói o transporte a partir dos defaults e delega para
/// [`execute_with_transport`]; separado para os testes injetarem
/// transportes roteirizados.
pub async fn execute(
    spec: &RequestSpec,
    defaults: &ProviderDefaults,
    deadline: Instant,
) -> Result<ExecutionResult, ExecError> {
    let transport = HttpTransport::build(defaults, spec)?;
    execute_with_transport(spec, defaults, &transport, deadline).await
}

/// Pipeline completo sobre um transporte arbitrário.
#[tracing::instrument(
    name = "http_request",
    skip_all,
    fields(
        http.method = %spec.method,
        http.url = %spec.url,
        http.status_code = tracing::field::Empty,
        http.attempts = tracing::field::Empty,
        otel.kind = "client"
    )
)]
pub async fn execute_with_transport(
    spec: &RequestSpec,
    defaults: &ProviderDefaults,
    transport: &dyn Transport,
    deadline: Instant,
) -> Result<ExecutionResult, ExecError> {
    let span = tracing::Span::current();

    // ------------------------------------------------------------------
    // Pré-voo: regex de polling e construção da requisição. Qualquer
    // falha aqui retorna antes da primeira tentativa.
    // ------------------------------------------------------------------
    if let Some(condition) = &spec.retry_until {
        poll::validate(condition)?;
    }

    let (built, redactor) = request::build(spec, defaults)?;

    // ------------------------------------------------------------------
    // Loop de retry.
    // ------------------------------------------------------------------
    let mut engine = RetryEngine::new(transport);
    let loop_result = engine
        .run(&built, spec.retry.as_ref(), spec.retry_until.as_ref(), deadline)
        .await;

    match loop_result {
        Ok(success) => {
            let response = success.response.to_response(success.attempts);
            span.record("http.status_code", response.status_code as i64);
            span.record("http.attempts", success.attempts as i64);

            let mut diagnostics = Vec::new();
            if response.body.ends_with(TRUNCATION_SENTINEL) {
                diagnostics.push(Diagnostic::warning(
                    ErrorCode::BODY_TRUNCATED,
                    format!(
                        "response body exceeded {} bytes and was truncated",
                        defaults.max_response_body_bytes
                    ),
                ));
            }

            // ----------------------------------------------------------
            // Expectations sobre a resposta final.
            // ----------------------------------------------------------
            if let Some(expectations) = &spec.expect {
                if let Err(err) = expect::validate(expectations, &response) {
                    let err = redact_error(err, &redactor);
                    if let ExecError::ExpectationFailed { failures } = &err {
                        for failure in failures {
                            diagnostics.push(Diagnostic::error(
                                ErrorCode::EXPECTATION_FAILED,
                                failure.as_str(),
                            ));
                        }
                    }

                    let mut response = response;
                    response.error = Some(redactor.apply(&err.to_string()));
                    return Ok(ExecutionResult {
                        response,
                        outputs: Outputs::new(),
                        diagnostics,
                        error: Some(err),
                    });
                }
            }

            // ----------------------------------------------------------
            // Extração de saídas (nunca falha a operação).
            // ----------------------------------------------------------
            let body_json = serde_json::from_str(&response.body).ok();
            let (outcomes, outputs) =
                Extractor::process(&spec.extract, body_json.as_ref(), &response);

            for outcome in &outcomes {
                if !outcome.success {
                    diagnostics.push(Diagnostic::warning(
                        ErrorCode::EXTRACTION_MISS,
                        redactor.apply(&format!(
                            "extract '{}': {}",
                            outcome.name,
                            outcome.error.as_deref().unwrap_or("source missing")
                        )),
                    ));
                }
            }

            tracing::info!(
                status = response.status_code,
                attempts = response.attempt_count,
                outputs = outputs.len(),
                "request finished"
            );

            Ok(ExecutionResult {
                response,
                outputs,
                diagnostics,
                error: None,
            })
        }

        Err(failure) => {
            let error = redact_error(failure.error, &redactor);
            let message = redactor.apply(&error.to_string());

            let mut response = match &failure.last_response {
                Some(raw) => raw.to_response(failure.attempts),
                None => ResponseResult::transport_failure(message.clone(), failure.attempts),
            };
            response.error = Some(message.clone());

            span.record("http.status_code", response.status_code as i64);
            span.record("http.attempts", failure.attempts as i64);
            tracing::warn!(
                attempts = failure.attempts,
                error = %message,
                "request failed"
            );

            let diagnostics = vec![Diagnostic::error(error.code(), message)];

            Ok(ExecutionResult {
                response,
                outputs: Outputs::new(),
                diagnostics,
                error: Some(error),
            })
        }
    }
}

// ============================================================================
// REDAÇÃO DO ERRO
// ============================================================================

/// Aplica o passe de redação a cada campo textual de um erro.
fn redact_error(error: ExecError, redactor: &Redactor) -> ExecError {
    match error {
        ExecError::Transport { message, attempts } => ExecError::Transport {
            message: redactor.apply(&message),
            attempts,
        },
        ExecError::PollingExhausted { reasons, attempts } => ExecError::PollingExhausted {
            reasons: reasons.iter().map(|r| redactor.apply(r)).collect(),
            attempts,
        },
        ExecError::ExpectationFailed { failures } => ExecError::ExpectationFailed {
            failures: failures.iter().map(|f| redactor.apply(f)).collect(),
        },
        ExecError::Cancelled {
            last_status,
            unsatisfied,
        } => ExecError::Cancelled {
            last_status,
            unsatisfied: unsatisfied.iter().map(|r| redactor.apply(r)).collect(),
        },
        other => other,
    }
}

// ============================================================================
// TESTES
// ============================================================================
