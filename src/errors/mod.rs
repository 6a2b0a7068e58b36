//! # Módulo de Erros - Taxonomia e Códigos Estruturados
//!
//! Define a taxonomia de erros do executor e os códigos numéricos que
//! acompanham cada diagnóstico emitido para o host.
//!
//! ## Para todos entenderem:
//!
//! Quando algo dá errado, este módulo fornece duas coisas:
//!
//! 1. **`ExecError`**: o erro tipado que o host recebe e usa para
//!    decidir o que fazer (falhar a operação, reter estado, etc.)
//! 2. **`ErrorCode`**: um código numérico único que identifica
//!    exatamente o que aconteceu, para dashboards e automação.
//!
//! ## Categorias de Código
//!
//! | Faixa  | Categoria       | Descrição                               |
//! |--------|-----------------|-----------------------------------------|
//! | E1xxx  | Spec            | A RequestSpec declarada é inválida      |
//! | E2xxx  | Execução        | Transporte, configuração, cancelamento  |
//! | E3xxx  | Resposta        | Polling, expectations, extração         |
//! | E4xxx  | Destruição      | Interpolação e orquestração de destroy  |
//! | E5xxx  | Interno         | Bug no próprio executor                 |
//!
//! ## Política de propagação:
//!
//! - Erros de construção da requisição retornam ANTES de qualquer
//!   tentativa de transporte.
//! - Erros de transporte dentro do loop de retry podem ser engolidos em
//!   favor de uma nova tentativa; só o desfecho final é reportado.
//! - Falhas de extração NUNCA viram erro: produzem string vazia e um
//!   diagnóstico de warning.
//! - Erros de destroy sempre chegam ao host com o estado retido.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// ERRO PRINCIPAL: EXEC ERROR
// ============================================================================

/// Erro tipado do executor, na granularidade que o host consome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecError {
    /// A RequestSpec é inválida (URL, corpo, regex, literal).
    #[error("invalid request spec: {0}")]
    InvalidSpec(String),

    /// A configuração do provider é inválida (proxy, material TLS).
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    /// Falha de transporte (DNS, conexão, TLS, leitura) que sobreviveu
    /// a todas as tentativas.
    #[error("transport failure after {attempts} attempt(s): {message}")]
    Transport { message: String, attempts: u32 },

    /// O loop terminou sem a condição de polling valer.
    #[error("poll condition unsatisfied after {attempts} attempt(s): {}", .reasons.join("; "))]
    PollingExhausted { reasons: Vec<String>, attempts: u32 },

    /// Um status retryable continuava em vigor quando as tentativas
    /// acabaram (sem condição de polling).
    #[error("retryable status {last_status} still returned after {attempts} attempt(s)")]
    RetryExhausted { last_status: u16, attempts: u32 },

    /// Uma ou mais expectations falharam na resposta final.
    #[error("response expectations failed: {}", .failures.join("; "))]
    ExpectationFailed { failures: Vec<String> },

    /// Template de destroy referencia uma saída que não existe no
    /// estado anterior.
    #[error("destroy template references unknown output key '{key}'")]
    InterpolationKeyMissing { key: String },

    /// O deadline da operação expirou durante uma tentativa ou sleep.
    #[error("operation cancelled by deadline")]
    Cancelled {
        /// Status da última resposta observada, se houve alguma.
        last_status: Option<u16>,
        /// Razões de insatisfação do polling na última avaliação.
        unsatisfied: Vec<String>,
    },
}

impl ExecError {
    /// Código estruturado correspondente a esta variante.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidSpec(_) => ErrorCode::INVALID_SPEC,
            Self::InvalidConfig(_) => ErrorCode::INVALID_CONFIG,
            Self::Transport { .. } => ErrorCode::TRANSPORT_FAILURE,
            Self::Cancelled { .. } => ErrorCode::CANCELLED,
            Self::PollingExhausted { .. } => ErrorCode::POLLING_EXHAUSTED,
            Self::RetryExhausted { .. } => ErrorCode::RETRY_EXHAUSTED,
            Self::ExpectationFailed { .. } => ErrorCode::EXPECTATION_FAILED,
            Self::InterpolationKeyMissing { .. } => ErrorCode::INTERPOLATION_KEY_MISSING,
        }
    }
}

// ============================================================================
// CÓDIGO DE ERRO
// ============================================================================

/// Código de erro estruturado com categoria e número.
///
/// O código é um número de 4 dígitos onde:
/// - Primeiro dígito: categoria (1-5)
/// - Últimos 3 dígitos: erro específico (001-999)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Spec inválida
    // ========================================================================
    // Problema declarativo: a operação falha antes de qualquer I/O.

    /// Spec inválida (variante genérica).
    pub const INVALID_SPEC: Self = Self(1001);

    /// Mais de um campo de corpo preenchido (body, body_json, body_file).
    pub const BODY_CONFLICT: Self = Self(1002);

    /// URL não parseável.
    pub const INVALID_URL: Self = Self(1003);

    /// `body_json` não é JSON válido.
    pub const INVALID_JSON_BODY: Self = Self(1004);

    /// `body_file` não pôde ser lido.
    pub const BODY_FILE_UNREADABLE: Self = Self(1005);

    /// Regex de `body_regex` não compila.
    pub const INVALID_REGEX: Self = Self(1006);

    /// Método HTTP não reconhecido pelo transporte.
    pub const INVALID_HTTP_METHOD: Self = Self(1007);

    // ========================================================================
    // E2xxx: Execução
    // ========================================================================
    // Transporte, configuração do provider e cancelamento.

    /// Falha de transporte (DNS, conexão, TLS, leitura).
    pub const TRANSPORT_FAILURE: Self = Self(2001);

    /// Configuração do provider inválida (proxy, PEM).
    pub const INVALID_CONFIG: Self = Self(2002);

    /// Corpo da resposta truncado no teto configurado.
    pub const BODY_TRUNCATED: Self = Self(2003);

    /// Deadline expirou durante a operação.
    pub const CANCELLED: Self = Self(2004);

    // ========================================================================
    // E3xxx: Resposta
    // ========================================================================
    // A requisição aconteceu, mas a resposta não é o esperado.

    /// Polling terminou sem a condição valer.
    pub const POLLING_EXHAUSTED: Self = Self(3001);

    /// Tentativas acabaram com status retryable em vigor.
    pub const RETRY_EXHAUSTED: Self = Self(3002);

    /// Uma ou mais expectations falharam.
    pub const EXPECTATION_FAILED: Self = Self(3003);

    /// Fonte de extração ausente (caminho ou header).
    pub const EXTRACTION_MISS: Self = Self(3004);

    // ========================================================================
    // E4xxx: Destruição
    // ========================================================================

    /// Chave de outputs desconhecida em template de destroy.
    pub const INTERPOLATION_KEY_MISSING: Self = Self(4001);

    /// Pipeline de destroy falhou; estado retido.
    pub const DESTROY_FAILED: Self = Self(4002);

    // ========================================================================
    // E5xxx: Interno
    // ========================================================================

    /// Erro interno inesperado. Se aparecer, é bug do executor.
    pub const INTERNAL: Self = Self(5001);

    /// Retorna o código numérico.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Retorna o código formatado com prefixo "E".
    ///
    /// Exemplo: `ErrorCode::INVALID_URL.formatted() == "E1003"`
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    /// Categoria do erro baseada no primeiro dígito.
    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Spec,
            2 => ErrorCategory::Execution,
            3 => ErrorCategory::Response,
            4 => ErrorCategory::Destroy,
            5 => ErrorCategory::Internal,
            _ => ErrorCategory::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

/// Categoria de erro baseada no primeiro dígito do código.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// E1xxx: a spec declarada é inválida.
    Spec,
    /// E2xxx: transporte, configuração ou cancelamento.
    Execution,
    /// E3xxx: a resposta não é o esperado.
    Response,
    /// E4xxx: interpolação/orquestração de destroy.
    Destroy,
    /// E5xxx: bug no executor.
    Internal,
    /// Fora das faixas conhecidas.
    Unknown,
}

// ============================================================================
// DIAGNÓSTICO
// ============================================================================

/// Severidade de um diagnóstico.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A operação continua; o host pode exibir o aviso.
    Warning,
    /// A operação falhou por esta causa.
    Error,
}

/// Diagnóstico estruturado emitido pelo executor.
///
/// Toda mensagem já passou pelo passe de redação antes de chegar aqui:
/// valores de headers sensíveis e tokens aparecem como `[REDACTED]`.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Severidade (warning não falha a operação).
    pub severity: Severity,

    /// Código estruturado, quando a causa tem um.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,

    /// Mensagem já redigida.
    pub message: String,

    /// Momento de emissão em RFC3339 (UTC).
    pub timestamp: String,
}

impl Diagnostic {
    /// Cria um diagnóstico de warning.
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: Some(code),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Cria um diagnóstico de erro.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: Some(code),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

// ============================================================================
// TESTES
// ============================================================================
