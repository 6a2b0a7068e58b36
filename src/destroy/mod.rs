//! # Módulo de Destroy - Orquestração da Destruição
//!
//! Segundo ponto de entrada do executor: quando o host sinaliza a
//! destruição de um recurso, este módulo lê o estado anterior, expande
//! os templates `${self.*}` da sub-spec e reexecuta o pipeline inteiro
//! no papel de limpeza.
//!
//! ## Procedimento:
//!
//! 1. Sem `on_destroy` na spec → sucesso sem nenhum I/O.
//! 2. Lê o estado anterior (id, outputs, status, corpo).
//! 3. Monta o `InterpolationContext`.
//! 4. Expande os campos com template; chave ausente aborta.
//! 5. Roda o pipeline completo (builder → retry → expectations) com o
//!    `retry`/`retry_until` da própria sub-spec.
//! 6. Qualquer falha nos passos 4-6 retorna `Err` e o host RETÉM o
//!    estado para tentar de novo. Sucesso sinaliza a remoção.
//!
//! ## Fail-safe:
//!
//! Reter o estado em falha garante que o host tente a destruição de
//! novo em vez de esquecer o recurso. Não existe modo "sempre sucesso".

use tokio::time::Instant;

use crate::errors::{Diagnostic, ExecError};
use crate::executor;
use crate::interpolate::InterpolationContext;
use crate::protocol::{ProviderDefaults, RequestSpec};
use crate::state::ResourceState;
use crate::transport::{HttpTransport, Transport};

/// Executa a destruição declarada de um recurso.
///
/// `Ok(diagnostics)` sinaliza ao host que a entrada de estado pode ser
/// removida; `Err` exige que o estado seja retido.
pub async fn destroy(
    prior: &ResourceState,
    spec: &RequestSpec,
    defaults: &ProviderDefaults,
    deadline: Instant,
) -> Result<Vec<Diagnostic>, ExecError> {
    // Sem sub-spec de destroy, não há nada a desfazer no servidor.
    let destroy_spec = match &spec.on_destroy {
        Some(sub) => sub.as_ref(),
        None => {
            tracing::debug!("no on_destroy sub-spec, nothing to do");
            return Ok(Vec::new());
        }
    };

    let transport = HttpTransport::build(defaults, destroy_spec)?;
    destroy_with_transport(prior, spec, defaults, &transport, deadline).await
}

/// Orquestração completa sobre um transporte arbitrário.
#[tracing::instrument(name = "destroy", skip_all, fields(resource.id = %prior.id))]
pub async fn destroy_with_transport(
    prior: &ResourceState,
    spec: &RequestSpec,
    defaults: &ProviderDefaults,
    transport: &dyn Transport,
    deadline: Instant,
) -> Result<Vec<Diagnostic>, ExecError> {
    let destroy_spec = match &spec.on_destroy {
        Some(sub) => sub.as_ref(),
        None => return Ok(Vec::new()),
    };

    // Contexto somente-leitura com o estado da última aplicação.
    let context = InterpolationContext {
        id: prior.id.clone(),
        outputs: prior.outputs.clone(),
        status_code: prior.status_code,
        response_body: prior.response_body.clone(),
    };

    // Expansão pura: a spec armazenada nunca é alterada.
    let expanded = context.expand_spec(destroy_spec)?;

    tracing::info!(
        method = %expanded.method,
        url = %expanded.url,
        "running destroy request"
    );

    let result =
        executor::execute_with_transport(&expanded, defaults, transport, deadline).await?;

    if let Some(error) = result.error {
        tracing::warn!(error = %error, "destroy failed, state retained");
        return Err(error);
    }

    tracing::info!(status = result.response.status_code, "destroy succeeded");
    Ok(result.diagnostics)
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Outputs;
    use crate::protocol::Expectations;
    use crate::request::BuiltRequest;
    use crate::transport::{RawResponse, TransportError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transporte que registra a URL recebida e devolve um status fixo.
    struct RecordingTransport {
        status: u16,
        seen_urls: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn new(status: u16) -> Self {
            Self {
                status,
                seen_urls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: &BuiltRequest) -> Result<RawResponse, TransportError> {
            self.seen_urls.lock().unwrap().push(request.url.clone());
            Ok(RawResponse {
                status: self.status,
                header_pairs: Vec::new(),
                body: String::new(),
            })
        }
    }

    fn prior_state() -> ResourceState {
        let mut outputs = Outputs::new();
        outputs.insert("user_id".to_string(), "u42".to_string());
        ResourceState {
            id: "abc123".to_string(),
            status_code: 201,
            outputs,
            ..Default::default()
        }
    }

    fn destroy_spec(url: &str) -> RequestSpec {
        RequestSpec {
            method: "POST".to_string(),
            url: "https://api.test/users".to_string(),
            on_destroy: Some(Box::new(RequestSpec {
                method: "DELETE".to_string(),
                url: url.to_string(),
                expect: Some(Expectations {
                    status_codes: vec![200, 204, 404],
                    ..Default::default()
                }),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    async fn run(
        spec: &RequestSpec,
        transport: &RecordingTransport,
    ) -> Result<Vec<Diagnostic>, ExecError> {
        destroy_with_transport(
            &prior_state(),
            spec,
            &ProviderDefaults::default(),
            transport,
            deadline(),
        )
        .await
    }

    #[tokio::test]
    async fn no_sub_spec_succeeds_without_io() {
        let transport = RecordingTransport::new(200);
        let spec = RequestSpec {
            method: "POST".to_string(),
            url: "https://api.test/users".to_string(),
            ..Default::default()
        };

        let diags = run(&spec, &transport).await.unwrap();

        assert!(diags.is_empty());
        assert!(transport.seen_urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn interpolated_url_reaches_transport() {
        let transport = RecordingTransport::new(204);
        let spec = destroy_spec("https://api.test/users/${self.outputs.user_id}");

        run(&spec, &transport).await.unwrap();

        let urls = transport.seen_urls.lock().unwrap();
        assert_eq!(urls.as_slice(), ["https://api.test/users/u42"]);
    }

    #[tokio::test]
    async fn expected_404_counts_as_success() {
        // Recurso já sumiu no servidor: 404 está na lista esperada,
        // então o host pode remover o estado.
        let transport = RecordingTransport::new(404);
        let spec = destroy_spec("https://api.test/users/${self.outputs.user_id}");

        assert!(run(&spec, &transport).await.is_ok());
    }

    #[tokio::test]
    async fn missing_output_key_aborts_without_io() {
        let transport = RecordingTransport::new(204);
        let spec = destroy_spec("https://api.test/users/${self.outputs.nope}");

        let err = run(&spec, &transport).await.unwrap_err();

        assert_eq!(
            err,
            ExecError::InterpolationKeyMissing {
                key: "nope".to_string()
            }
        );
        // Abortou antes de qualquer requisição: estado retido.
        assert!(transport.seen_urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expectation_failure_retains_state() {
        let transport = RecordingTransport::new(500);
        let spec = destroy_spec("https://api.test/users/${self.outputs.user_id}");

        let err = run(&spec, &transport).await.unwrap_err();
        assert!(matches!(err, ExecError::ExpectationFailed { .. }));
    }
}
