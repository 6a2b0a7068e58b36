//! # httpx-runner - Executor Declarativo de Requisições HTTP
//!
//! Este crate é o **núcleo embutível** do plugin httpx de
//! infraestrutura-como-código. Dada uma [`RequestSpec`] (método, URL,
//! headers, corpo, auth, retry, polling condicional, expectations e
//! regras de extração), ele executa a requisição, aplica a máquina de
//! estados de retry/backoff, valida a resposta e materializa as saídas
//! nomeadas que specs posteriores podem referenciar.
//!
//! ## O que este crate faz?
//!
//! 1. **Constrói a requisição** (merge dos defaults do provider + spec)
//! 2. **Dirige o loop de retry** com backoff, `Retry-After` e deadline
//! 3. **Avalia a condição de polling** para decidir quando parar
//! 4. **Valida expectations** e **extrai saídas** da resposta final
//! 5. **Orquestra o destroy** expandindo `${self.*}` do estado anterior
//!
//! O host (framework de plugin) é dono do ciclo de vida do processo, do
//! parser de configuração e da superfície de diagnósticos; este crate
//! expõe dois pontos de entrada e devolve resultados tipados.
//!
//! ## Exemplo de uso:
//!
//! ```ignore
//! let result = httpx_runner::execute(&spec, &defaults, deadline).await?;
//! match result.error {
//!     None => host.persist(ResourceState::from_execution(..)),
//!     Some(err) => host.fail(err, result.diagnostics),
//! }
//! ```
//!
//! ## Arquitetura:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  executor / destroy (entradas)                  │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │
//!          ┌──────────────────┼──────────────────────┐
//!          ▼                  ▼                      ▼
//!    ┌──────────┐       ┌──────────┐          ┌───────────┐
//!    │ request/ │       │  retry/  │          │  expect/  │
//!    │ (builder)│       │ (+ poll) │          │ extract/  │
//!    └────┬─────┘       └────┬─────┘          └─────┬─────┘
//!         │                  │                      │
//!         ▼                  ▼                      ▼
//!    ┌──────────┐      ┌───────────┐          ┌──────────┐
//!    │protocol/ │      │transport/ │          │ jsonpath/│
//!    └──────────┘      └───────────┘          └──────────┘
//! ```

// ============================================================================
// DECLARAÇÃO DE MÓDULOS
// ============================================================================

/// Módulo de destroy: orquestra a destruição com interpolação de estado.
pub mod destroy;

/// Módulo de erros: taxonomia tipada e códigos estruturados (E1xxx...).
pub mod errors;

/// Módulo executor: ponto de entrada das operações create/read/update.
pub mod executor;

/// Módulo de expectations: validação pós-loop com acúmulo de falhas.
pub mod expect;

/// Módulo de extração: saídas nomeadas a partir da resposta.
pub mod extract;

/// Módulo de interpolação: expansão de `${self.*}` para destroy.
pub mod interpolate;

/// Módulo de caminhos JSON: avaliação de dot-paths com índices.
pub mod jsonpath;

/// Módulo de polling: avaliação da condição de parada do retry.
pub mod poll;

/// Módulo de protocolo: o modelo declarativo (RequestSpec e afins).
pub mod protocol;

/// Módulo de construção: da spec à requisição pronta para o transporte.
pub mod request;

/// Módulo de resposta: resultado tipado e passe de redação.
pub mod response;

/// Módulo de retry: loop de tentativas, backoff e Retry-After.
pub mod retry;

/// Módulo de estado: id estável e persistência por recurso.
pub mod state;

/// Módulo de transporte: trait de envio e cliente reqwest configurado.
pub mod transport;

// ============================================================================
// RE-EXPORTS DA SUPERFÍCIE PÚBLICA
// ============================================================================

pub use destroy::destroy;
pub use errors::{Diagnostic, ErrorCode, ExecError, Severity};
pub use executor::{execute, ExecutionResult};
pub use extract::Outputs;
pub use interpolate::InterpolationContext;
pub use protocol::{
    Backoff, BasicAuth, Expectations, ExtractRule, HeaderEntry, PollCondition, ProviderDefaults,
    RequestSpec, RetryPolicy, Role,
};
pub use response::ResponseResult;
pub use state::{resource_id, should_store_response_body, ResourceState};
