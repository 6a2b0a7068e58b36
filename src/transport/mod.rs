//! # Módulo de Transporte - Cliente HTTP e Trait de Envio
//!
//! Define o contrato de envio (`Transport`) e a implementação real
//! sobre `reqwest` (`HttpTransport`), configurada a partir dos defaults
//! do provider: TLS customizado, proxy, timeout e teto de leitura do
//! corpo da resposta.
//!
//! ## Por que um trait?
//!
//! O loop de retry precisa ser testável sem rede. Com o contrato em um
//! trait, os testes injetam transportes roteirizados ("responda 503
//! duas vezes, depois 200") e o motor de retry é exercitado de verdade.
//!
//! ## Teto de leitura:
//!
//! O corpo é lido em chunks até `max_response_body_bytes`. Bytes
//! excedentes são descartados de forma determinística e o sufixo
//! `"... [TRUNCATED]"` é anexado ao texto decodificado.

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::ExecError;
use crate::protocol::{ProviderDefaults, RequestSpec};
use crate::request::BuiltRequest;
use crate::response::TRUNCATION_SENTINEL;

// ============================================================================
// RESPOSTA CRUA
// ============================================================================

/// Resposta de uma única tentativa, antes de virar `ResponseResult`.
///
/// Os headers ficam como pares ordenados para preservar duplicatas;
/// a concatenação com `", "` acontece na montagem do resultado.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Status HTTP da tentativa.
    pub status: u16,

    /// Pares (nome, valor) na ordem recebida, duplicatas preservadas.
    pub header_pairs: Vec<(String, String)>,

    /// Corpo decodificado, já limitado e com sentinela se truncado.
    pub body: String,
}

impl RawResponse {
    /// Converte em `ResponseResult`, concatenando headers repetidos.
    pub fn to_response(&self, attempt_count: u32) -> crate::response::ResponseResult {
        crate::response::ResponseResult {
            status_code: self.status,
            headers: crate::response::join_header_pairs(&self.header_pairs),
            body: self.body.clone(),
            attempt_count,
            error: None,
        }
    }
}

// ============================================================================
// ERRO DE TRANSPORTE
// ============================================================================

/// Falha de transporte em uma tentativa (DNS, conexão, TLS, leitura).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A tentativa excedeu o timeout configurado.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Falha de resolução/conexão/TLS antes de qualquer byte de resposta.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Falha lendo o corpo ou outra falha do cliente.
    #[error("transport failure: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

// ============================================================================
// TRAIT DE TRANSPORTE
// ============================================================================

/// Contrato de envio de uma tentativa.
///
/// O trait requer Send + Sync porque a mesma instância atravessa todas
/// as tentativas do loop assíncrono.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Envia a requisição construída e devolve a resposta crua.
    async fn send(&self, request: &BuiltRequest) -> Result<RawResponse, TransportError>;
}

// ============================================================================
// IMPLEMENTAÇÃO REQWEST
// ============================================================================

/// Transporte real sobre `reqwest::Client`.
///
/// O cliente é construído uma vez por operação e é somente-leitura
/// depois disso; reutilizá-lo entre tentativas mantém o pool de
/// conexões aquecido.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpTransport {
    /// Constrói o transporte a partir dos defaults do provider com os
    /// overrides da spec aplicados.
    ///
    /// Falha com `InvalidConfig` quando o proxy não parseia ou o
    /// material TLS em PEM é inválido.
    pub fn build(defaults: &ProviderDefaults, spec: &RequestSpec) -> Result<Self, ExecError> {
        let mut builder = reqwest::Client::builder();

        // TLS: CA raiz adicional.
        if let Some(ca_pem) = &defaults.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(ca_pem.as_bytes())
                .map_err(|e| ExecError::InvalidConfig(format!("invalid ca_cert_pem: {}", e)))?;
            builder = builder.use_rustls_tls().add_root_certificate(cert);
        }

        // TLS: identidade de cliente (cert + chave concatenados em PEM).
        if let (Some(cert_pem), Some(key_pem)) =
            (&defaults.client_cert_pem, &defaults.client_key_pem)
        {
            let mut bundle = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
            bundle.extend_from_slice(cert_pem.as_bytes());
            bundle.push(b'\n');
            bundle.extend_from_slice(key_pem.as_bytes());

            let identity = reqwest::Identity::from_pem(&bundle).map_err(|e| {
                ExecError::InvalidConfig(format!("invalid client certificate material: {}", e))
            })?;
            builder = builder.use_rustls_tls().identity(identity);
        }

        // Verificação TLS desabilitada por opt-in explícito.
        let skip_verify = spec
            .insecure_skip_verify
            .unwrap_or(defaults.insecure_skip_verify);
        if skip_verify {
            tracing::warn!("TLS certificate verification disabled for this request");
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy de saída.
        let proxy_url = spec.proxy_url.as_ref().or(defaults.proxy_url.as_ref());
        if let Some(proxy_url) = proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                ExecError::InvalidConfig(format!("invalid proxy_url '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ExecError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: defaults.max_response_body_bytes,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &BuiltRequest) -> Result<RawResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Other(format!("invalid HTTP method: {}", e)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let header_pairs: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        // Lê o corpo em chunks até o teto; o excedente é descartado.
        let mut response = response;
        let mut buf: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await? {
            if push_capped(&mut buf, &chunk, self.max_body_bytes) {
                truncated = true;
                break;
            }
        }

        let mut body = String::from_utf8_lossy(&buf).into_owned();
        if truncated {
            tracing::debug!(
                cap_bytes = self.max_body_bytes,
                "response body truncated at configured cap"
            );
            body.push_str(TRUNCATION_SENTINEL);
        }

        Ok(RawResponse {
            status,
            header_pairs,
            body,
        })
    }
}

/// Anexa um chunk respeitando o teto. Retorna true quando truncou.
fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    if buf.len() + chunk.len() > cap {
        let take = cap.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..take]);
        true
    } else {
        buf.extend_from_slice(chunk);
        false
    }
}

// ============================================================================
// TESTES
// ============================================================================
