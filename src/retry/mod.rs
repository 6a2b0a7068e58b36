//! # Módulo de Retry - Loop de Tentativas com Backoff
//!
//! Dirige uma requisição construída através do transporte, repetindo
//! conforme a política e consultando a condição de polling para decidir
//! quando parar.
//!
//! ## Para todos entenderem:
//!
//! Às vezes uma requisição falha por motivos temporários:
//! - Servidor ocupado (503, 429)
//! - Rede teve um soluço
//! - Recurso ainda não estava pronto
//!
//! Este módulo tenta de novo automaticamente, esperando um pouco mais
//! a cada tentativa, até o limite de tentativas ou o deadline da
//! operação.
//!
//! ## Máquina de estados por tentativa:
//!
//! ```text
//! Idle → Attempting → Succeeded
//!                   → FailedTransport ──┐
//!                   → FailedStatus ─────┼→ (Sleep → Attempting)
//!                   → CondUnsatisfied ──┘   | Exhausted | Cancelled
//! ```
//!
//! ## Decisão após cada tentativa:
//!
//! | Desfecho                      | retry_until? | Ação                       |
//! |-------------------------------|--------------|----------------------------|
//! | Erro de transporte            | qualquer     | retry se restam tentativas |
//! | Condição de polling satisfeita| sim          | sucesso imediato           |
//! | Condição insatisfeita         | sim          | retry; esgotou → exhausted |
//! | Status em retry_on            | não          | retry; esgotou → exhausted |
//! | Status fora de retry_on       | não          | sucesso                    |
//!
//! Com `retry_until` presente, a condição decide SOZINHA o sucesso;
//! `retry_on_status_codes` não participa dessa decisão.
//!
//! ## Delay entre tentativas (tentativa n, 1-indexada):
//!
//! - `Retry-After` da resposta anterior, quando respeitado, vale
//!   verbatim (ignora min/max/jitter)
//! - fixed: `min` · linear: `min × n` · exponential: `min × 2^(n-1)`
//! - teto em `max_delay_ms`; jitter soma uniforme de `[0, base/4]`
//!
//! Todos os sleeps usam o relógio monotônico do tokio e respeitam o
//! deadline da operação: expirou, retorna `Cancelled`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

use crate::errors::ExecError;
use crate::poll;
use crate::protocol::{Backoff, PollCondition, RetryPolicy};
use crate::request::BuiltRequest;
use crate::transport::{RawResponse, Transport};

// ============================================================================
// POLÍTICA DEFAULT DE POLLING
// ============================================================================

/// Política usada quando há `retry_until` mas nenhum bloco `retry`.
///
/// Polling costuma esperar recursos lentos: muitas tentativas, backoff
/// exponencial contido e respeito ao `Retry-After` do servidor.
pub fn poll_default_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 60,
        min_delay_ms: 1000,
        max_delay_ms: 5000,
        backoff: Backoff::Exponential,
        jitter: true,
        retry_on_status_codes: Vec::new(),
        respect_retry_after: true,
    }
}

/// Política de tentativa única, usada sem `retry` e sem `retry_until`.
fn single_attempt_policy() -> RetryPolicy {
    RetryPolicy {
        attempts: 1,
        min_delay_ms: 0,
        max_delay_ms: 0,
        backoff: Backoff::Fixed,
        jitter: false,
        retry_on_status_codes: Vec::new(),
        respect_retry_after: false,
    }
}

// ============================================================================
// RESULTADO DO LOOP
// ============================================================================

/// Desfecho de sucesso do loop.
#[derive(Debug)]
pub struct LoopSuccess {
    /// Resposta final (a que encerrou o loop).
    pub response: RawResponse,
    /// Tentativas de transporte realizadas.
    pub attempts: u32,
}

/// Desfecho de falha do loop.
#[derive(Debug)]
pub struct LoopFailure {
    /// Erro tipado do desfecho.
    pub error: ExecError,
    /// Última resposta observada, se houve alguma.
    pub last_response: Option<RawResponse>,
    /// Tentativas de transporte realizadas.
    pub attempts: u32,
}

pub type LoopResult = Result<LoopSuccess, LoopFailure>;

// ============================================================================
// MOTOR DE RETRY
// ============================================================================

/// Motor que executa o loop de tentativas sobre um transporte.
///
/// O RNG do jitter é semeado da entropia do SO na construção; testes
/// injetam um RNG determinístico via `with_rng`.
pub struct RetryEngine<'a> {
    transport: &'a dyn Transport,
    rng: StdRng,
}

impl<'a> RetryEngine<'a> {
    /// Cria o motor com RNG semeado do sistema operacional.
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            rng: StdRng::from_entropy(),
        }
    }

    /// Cria o motor com RNG determinístico (testes).
    pub fn with_rng(transport: &'a dyn Transport, rng: StdRng) -> Self {
        Self { transport, rng }
    }

    /// Executa o loop completo de tentativas.
    ///
    /// A política efetiva é: o bloco `retry` declarado; senão a política
    /// default de polling quando há `retry_until`; senão uma tentativa
    /// única.
    pub async fn run(
        &mut self,
        request: &BuiltRequest,
        retry: Option<&RetryPolicy>,
        retry_until: Option<&PollCondition>,
        deadline: Instant,
    ) -> LoopResult {
        let policy = match retry {
            Some(p) => p.clone().normalized(),
            None if retry_until.is_some() => poll_default_policy(),
            None => single_attempt_policy(),
        };

        let mut attempts: u32 = 0;
        let mut last_response: Option<RawResponse> = None;
        let mut last_unsatisfied: Vec<String> = Vec::new();

        loop {
            // Deadline conferido ANTES de cada tentativa.
            if Instant::now() >= deadline {
                return Err(self.cancelled(last_response, last_unsatisfied, attempts));
            }

            attempts += 1;
            let attempt = attempts;

            tracing::debug!(attempt, max_attempts = policy.attempts, "attempt started");

            // O deadline externo também limita a tentativa em curso.
            let sent = tokio::time::timeout_at(deadline, self.transport.send(request)).await;

            let outcome = match sent {
                Err(_) => {
                    tracing::warn!(attempt, "deadline elapsed mid-attempt");
                    return Err(self.cancelled(last_response, last_unsatisfied, attempts));
                }
                Ok(outcome) => outcome,
            };

            match outcome {
                // ------------------------------------------------------------
                // Erro de transporte: retry enquanto restam tentativas.
                // ------------------------------------------------------------
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "transport attempt failed");

                    if attempt >= policy.attempts {
                        return Err(LoopFailure {
                            error: ExecError::Transport {
                                message: e.to_string(),
                                attempts,
                            },
                            last_response,
                            attempts,
                        });
                    }

                    // Sem resposta, sem Retry-After: só o backoff computado.
                    if let Some(failure) =
                        self.sleep_before_retry(&policy, attempt, None, deadline, &last_response, &last_unsatisfied, attempts).await
                    {
                        return Err(failure);
                    }
                }

                // ------------------------------------------------------------
                // Resposta obtida: polling ou tabela de status.
                // ------------------------------------------------------------
                Ok(raw) => {
                    let retry_after = parse_retry_after(&raw);
                    let status = raw.status;

                    if let Some(condition) = retry_until {
                        let verdict = poll::evaluate(condition, &raw.to_response(attempts));
                        if verdict.satisfied {
                            tracing::info!(attempt, status, "poll condition satisfied");
                            return Ok(LoopSuccess {
                                response: raw,
                                attempts,
                            });
                        }

                        tracing::debug!(
                            attempt,
                            status,
                            reasons = ?verdict.unsatisfied,
                            "poll condition unsatisfied"
                        );
                        last_unsatisfied = verdict.unsatisfied;
                        last_response = Some(raw);

                        if attempt >= policy.attempts {
                            return Err(LoopFailure {
                                error: ExecError::PollingExhausted {
                                    reasons: last_unsatisfied.clone(),
                                    attempts,
                                },
                                last_response,
                                attempts,
                            });
                        }

                        if let Some(failure) = self
                            .sleep_before_retry(&policy, attempt, retry_after, deadline, &last_response, &last_unsatisfied, attempts)
                            .await
                        {
                            return Err(failure);
                        }
                    } else if policy.retry_on_status_codes.contains(&status) {
                        tracing::debug!(attempt, status, "retryable status");
                        last_response = Some(raw);

                        if attempt >= policy.attempts {
                            return Err(LoopFailure {
                                error: ExecError::RetryExhausted {
                                    last_status: status,
                                    attempts,
                                },
                                last_response,
                                attempts,
                            });
                        }

                        if let Some(failure) = self
                            .sleep_before_retry(&policy, attempt, retry_after, deadline, &last_response, &last_unsatisfied, attempts)
                            .await
                        {
                            return Err(failure);
                        }
                    } else {
                        // Status não-retryable encerra o loop com sucesso;
                        // expectations julgam a resposta depois.
                        return Ok(LoopSuccess {
                            response: raw,
                            attempts,
                        });
                    }
                }
            }
        }
    }

    /// Dorme o backoff da tentativa `attempt`, honrando o deadline.
    ///
    /// Retorna `Some(LoopFailure::Cancelled)` quando o deadline expira
    /// antes ou durante o sleep.
    #[allow(clippy::too_many_arguments)]
    async fn sleep_before_retry(
        &mut self,
        policy: &RetryPolicy,
        attempt: u32,
        retry_after: Option<Duration>,
        deadline: Instant,
        last_response: &Option<RawResponse>,
        last_unsatisfied: &[String],
        attempts: u32,
    ) -> Option<LoopFailure> {
        let delay = compute_delay(policy, attempt, retry_after, &mut self.rng);
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "sleeping before retry"
        );

        let wake = Instant::now() + delay;
        if wake >= deadline {
            // O deadline venceria durante o sleep: dorme só até ele e
            // reporta cancelamento.
            tokio::time::sleep_until(deadline).await;
            return Some(self.cancelled(
                last_response.clone(),
                last_unsatisfied.to_vec(),
                attempts,
            ));
        }

        tokio::time::sleep_until(wake).await;
        None
    }

    fn cancelled(
        &self,
        last_response: Option<RawResponse>,
        unsatisfied: Vec<String>,
        attempts: u32,
    ) -> LoopFailure {
        LoopFailure {
            error: ExecError::Cancelled {
                last_status: last_response.as_ref().map(|r| r.status),
                unsatisfied,
            },
            last_response,
            attempts,
        }
    }
}

// ============================================================================
// CÁLCULO DO DELAY
// ============================================================================

/// Calcula o delay após a tentativa `attempt` (1-indexada).
///
/// `Retry-After` respeitado vale verbatim; caso contrário a base da
/// estratégia é limitada por `max_delay_ms` e o jitter soma um uniforme
/// de `[0, base/4]` DEPOIS do teto.
pub fn compute_delay(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
    rng: &mut StdRng,
) -> Duration {
    if policy.respect_retry_after {
        if let Some(hint) = retry_after {
            return hint;
        }
    }

    let n = attempt.max(1) as u64;
    let base_ms = match policy.backoff {
        Backoff::Fixed => policy.min_delay_ms,
        Backoff::Linear => policy.min_delay_ms.saturating_mul(n),
        Backoff::Exponential => {
            let factor = 1u64.checked_shl((n - 1).min(63) as u32).unwrap_or(u64::MAX);
            policy.min_delay_ms.saturating_mul(factor)
        }
    };

    let capped = base_ms.min(policy.max_delay_ms);
    let final_ms = if policy.jitter {
        capped + rng.gen_range(0..=capped / 4)
    } else {
        capped
    };

    Duration::from_millis(final_ms)
}

// ============================================================================
// RETRY-AFTER
// ============================================================================

/// Interpreta o header `Retry-After` de uma resposta.
///
/// Aceita segundos inteiros ou uma data HTTP (IMF-fixdate, RFC-850,
/// ANSIC). Datas no passado são rejeitadas e o chamador volta ao
/// backoff computado.
pub fn parse_retry_after(response: &RawResponse) -> Option<Duration> {
    let value = response
        .header_pairs
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .map(|(_, value)| value.trim())?;

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let when = httpdate::parse_http_date(value).ok()?;
    when.duration_since(SystemTime::now()).ok()
}

// ============================================================================
// TESTES
// ============================================================================
