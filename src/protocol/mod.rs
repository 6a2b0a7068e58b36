//! # Módulo de Protocolo - Modelo Declarativo de Requisição
//!
//! Este módulo define todas as **estruturas de dados** que descrevem uma
//! requisição HTTP declarativa: o que enviar, como repetir, quando parar
//! de fazer polling, o que validar e o que extrair da resposta.
//!
//! ## O que é uma RequestSpec?
//!
//! A RequestSpec é o "contrato" entre o plugin hospedeiro e o executor.
//! O parser de configuração do host produz uma RequestSpec; o executor
//! a consome sem nunca modificá-la.
//!
//! ## Estrutura de uma RequestSpec:
//!
//! ```json
//! {
//!   "method": "POST",
//!   "url": "https://api.example.com/users",
//!   "headers": { "X-Tenant": "acme" },
//!   "body_json": "{\"name\": \"Ana\"}",
//!   "retry": { "attempts": 3, "min_delay_ms": 500 },
//!   "retry_until": { "status_codes": [200] },
//!   "expect": { "status_codes": [200, 201] },
//!   "extract": [ { "name": "user_id", "json_path": "data.id" } ],
//!   "on_destroy": { "method": "DELETE", "url": "..." }
//! }
//! ```
//!
//! ## Hierarquia de Tipos:
//!
//! ```text
//! RequestSpec
//! ├── HeaderEntry[] (headers ordenados, duplicatas permitidas)
//! ├── BasicAuth / bearer_token (credenciais)
//! ├── RetryPolicy (tentativas e backoff)
//! ├── PollCondition (quando o polling está satisfeito)
//! ├── Expectations (validações pós-loop)
//! ├── ExtractRule[] (saídas nomeadas)
//! └── on_destroy: RequestSpec (sub-spec de destruição)
//! ```

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

// ============================================================================
// ESTRUTURA PRINCIPAL: REQUEST SPEC
// ============================================================================

/// Descrição declarativa e imutável de uma requisição HTTP.
///
/// Campos de corpo (`body`, `body_json`, `body_file`) são mutuamente
/// exclusivos; o construtor de requisição rejeita specs com mais de um
/// preenchido. Campos de autenticação podem coexistir com os defaults do
/// provider; a precedência é resolvida na construção.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RequestSpec {
    /// Verbo HTTP (GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS).
    pub method: String,

    /// URL absoluta da requisição.
    ///
    /// Pode conter query string embutida; parâmetros de `query` são
    /// ADICIONADOS a ela, nunca a substituem.
    pub url: String,

    /// Headers como mapa nome → valor.
    ///
    /// Nomes são comparados sem diferenciar maiúsculas/minúsculas no
    /// merge com os defaults do provider.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Headers ordenados, permitindo nomes duplicados.
    ///
    /// São anexados DEPOIS do mapa `headers`, preservando a ordem
    /// declarada. Útil para headers repetidos como `X-Forwarded-For`.
    #[serde(default)]
    pub header_entries: Vec<HeaderEntry>,

    /// Parâmetros de query key → valor (ordem irrelevante).
    #[serde(default)]
    pub query: HashMap<String, String>,

    /// Corpo bruto, enviado exatamente como declarado.
    #[serde(default)]
    pub body: Option<String>,

    /// Corpo JSON como texto; é parseado e re-serializado na construção.
    ///
    /// JSON inválido é rejeitado antes de qualquer tentativa.
    #[serde(default)]
    pub body_json: Option<String>,

    /// Caminho de arquivo cujo conteúdo vira o corpo.
    ///
    /// O arquivo é lido integralmente para memória.
    #[serde(default)]
    pub body_file: Option<PathBuf>,

    /// Credencial Basic no nível da requisição.
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,

    /// Token Bearer no nível da requisição.
    ///
    /// Guardado como segredo: nunca aparece em Debug nem em logs.
    #[serde(default)]
    pub bearer_token: Option<SecretString>,

    /// Timeout por tentativa em milissegundos (sobrescreve o default).
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Desabilita verificação TLS para esta requisição (opt-in explícito).
    #[serde(default)]
    pub insecure_skip_verify: Option<bool>,

    /// Proxy HTTP de saída (sobrescreve o default do provider).
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Política de retry. Ausente + sem `retry_until` = uma única tentativa.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Condição de polling: o loop só termina com sucesso quando satisfeita.
    #[serde(default)]
    pub retry_until: Option<PollCondition>,

    /// Validações aplicadas após o loop de retry terminar com sucesso.
    #[serde(default)]
    pub expect: Option<Expectations>,

    /// Regras de extração de valores nomeados da resposta.
    #[serde(default)]
    pub extract: Vec<ExtractRule>,

    /// Marca as saídas e o corpo como sensíveis na camada do host.
    #[serde(default)]
    pub response_sensitive: bool,

    /// Se o corpo da resposta deve ser persistido no estado.
    ///
    /// `None` ativa a política de defaults (ver módulo `state`);
    /// valor explícito sempre vence.
    #[serde(default)]
    pub store_response_body: Option<bool>,

    /// Sub-spec executada na destruição do recurso.
    ///
    /// Campos string desta sub-spec podem referenciar `${self.id}` e
    /// `${self.outputs.NOME}` do estado anterior.
    #[serde(default)]
    pub on_destroy: Option<Box<RequestSpec>>,
}

// ============================================================================
// HEADERS ORDENADOS: HEADER ENTRY
// ============================================================================

/// Um par (nome, valor) de header com posição estável.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderEntry {
    /// Nome do header (case-insensitive na comparação).
    pub name: String,
    /// Valor do header.
    pub value: String,
}

// ============================================================================
// CREDENCIAIS: BASIC AUTH
// ============================================================================

/// Credencial HTTP Basic.
///
/// A senha é um segredo: o tipo `SecretString` impede vazamento
/// acidental via Debug/Display.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuth {
    /// Nome de usuário.
    pub username: String,
    /// Senha (secreta).
    pub password: SecretString,
}

// ============================================================================
// POLÍTICA DE RETRY: RETRY POLICY
// ============================================================================

/// Define quantas tentativas fazer e como espaçá-las.
///
/// ## Estratégias de backoff:
/// - `fixed`: sempre `min_delay_ms`
/// - `linear`: `min_delay_ms × n` na tentativa n
/// - `exponential`: `min_delay_ms × 2^(n-1)` na tentativa n
///
/// O delay calculado é limitado por `max_delay_ms`; com `jitter` ativo,
/// um valor uniforme em `[0, 0.25 × base]` é somado após o teto.
///
/// ## Exemplo:
/// ```json
/// {
///   "attempts": 4,
///   "min_delay_ms": 500,
///   "max_delay_ms": 4000,
///   "backoff": "exponential",
///   "jitter": false,
///   "retry_on_status_codes": [429, 503]
/// }
/// ```
///
/// Isso tenta 4 vezes com delays de 500ms, 1000ms, 2000ms.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Número máximo de tentativas, incluindo a primeira (≥ 1).
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay base em milissegundos.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Teto do delay calculado em milissegundos.
    ///
    /// Um teto menor que `min_delay_ms` é elevado até ele na
    /// normalização da política.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Estratégia de crescimento do delay.
    #[serde(default)]
    pub backoff: Backoff,

    /// Soma um componente aleatório ao delay para dessincronizar clientes.
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Status HTTP que disparam retry quando não há `retry_until`.
    ///
    /// Quando o bloco `retry` existe mas este campo está ausente,
    /// assume o conjunto clássico de status transitórios. Sem bloco
    /// `retry` algum, nenhum retry acontece.
    #[serde(default = "default_retry_on_status_codes")]
    pub retry_on_status_codes: Vec<u16>,

    /// Honra o header `Retry-After` da resposta anterior.
    ///
    /// O valor do servidor é usado verbatim, ignorando min/max/jitter.
    #[serde(default = "default_respect_retry_after")]
    pub respect_retry_after: bool,
}

/// Estratégia de backoff entre tentativas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Delay constante: sempre `min_delay_ms`.
    Fixed,
    /// Delay cresce linearmente com o número da tentativa.
    Linear,
    /// Delay dobra a cada tentativa.
    #[default]
    Exponential,
}

fn default_attempts() -> u32 {
    3
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_jitter() -> bool {
    true
}

fn default_respect_retry_after() -> bool {
    true
}

/// Status transitórios clássicos: timeout, rate-limit e erros de gateway.
fn default_retry_on_status_codes() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}

impl RetryPolicy {
    /// Normaliza a política: garante `attempts ≥ 1` e `max ≥ min`.
    pub fn normalized(mut self) -> Self {
        if self.attempts == 0 {
            self.attempts = 1;
        }
        if self.max_delay_ms < self.min_delay_ms {
            self.max_delay_ms = self.min_delay_ms;
        }
        self
    }
}

// ============================================================================
// CONDIÇÃO DE POLLING: POLL CONDITION
// ============================================================================

/// Conjunto de sub-condições que encerram o polling com sucesso.
///
/// TODAS as sub-condições presentes precisam valer ao mesmo tempo.
/// Uma condição sem nenhuma sub-condição é considerada satisfeita.
///
/// ## Exemplo: aguardar um job assíncrono ficar pronto
/// ```json
/// {
///   "status_codes": [200],
///   "json_path_equals": { "data.state": "ready" }
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PollCondition {
    /// O status da resposta deve pertencer a este conjunto (se não vazio).
    #[serde(default)]
    pub status_codes: Vec<u16>,

    /// Caminho JSON → literal esperado.
    ///
    /// O literal é parseado como JSON quando possível (comparação
    /// estrutural); caso contrário compara-se a forma canônica em string.
    #[serde(default)]
    pub json_path_equals: BTreeMap<String, String>,

    /// Nome de header (case-insensitive) → valor esperado.
    #[serde(default)]
    pub header_equals: BTreeMap<String, String>,

    /// Regex que precisa casar com o corpo da resposta.
    ///
    /// Padrão vazio casa com qualquer corpo.
    #[serde(default)]
    pub body_regex: Option<String>,
}

impl PollCondition {
    /// Retorna true quando nenhuma sub-condição foi declarada.
    pub fn is_empty(&self) -> bool {
        self.status_codes.is_empty()
            && self.json_path_equals.is_empty()
            && self.header_equals.is_empty()
            && self.body_regex.is_none()
    }
}

// ============================================================================
// VALIDAÇÕES PÓS-LOOP: EXPECTATIONS
// ============================================================================

/// Asserções aplicadas somente após o loop de retry terminar com sucesso.
///
/// Diferente da PollCondition, que decide CONTINUAR tentando, as
/// expectations decidem se o resultado final é uma FALHA. Todas as
/// violações são acumuladas e reportadas de uma vez.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Expectations {
    /// O status final deve pertencer a este conjunto (se não vazio).
    #[serde(default)]
    pub status_codes: Vec<u16>,

    /// Headers que precisam estar presentes (case-insensitive).
    #[serde(default)]
    pub header_present: Vec<String>,

    /// Caminhos JSON que precisam existir no corpo.
    #[serde(default)]
    pub json_path_exists: Vec<String>,

    /// Caminho JSON → literal esperado (mesma semântica da PollCondition).
    #[serde(default)]
    pub json_path_equals: BTreeMap<String, String>,
}

impl Expectations {
    /// Retorna true quando nenhuma asserção foi declarada.
    pub fn is_empty(&self) -> bool {
        self.status_codes.is_empty()
            && self.header_present.is_empty()
            && self.json_path_exists.is_empty()
            && self.json_path_equals.is_empty()
    }
}

// ============================================================================
// EXTRAÇÃO DE SAÍDAS: EXTRACT RULE
// ============================================================================

/// Declara uma saída nomeada extraída da resposta.
///
/// A fonte é um caminho JSON no corpo OU um header. Quando ambos são
/// declarados, o header tem precedência. Fontes ausentes produzem
/// string vazia com diagnóstico; extração nunca falha a operação.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRule {
    /// Nome da saída em `outputs`.
    ///
    /// Nomes duplicados: a última regra vence.
    pub name: String,

    /// Caminho JSON no corpo da resposta (ex: `data.id`, `items[0].sku`).
    #[serde(default)]
    pub json_path: Option<String>,

    /// Nome de header da resposta (case-insensitive).
    #[serde(default)]
    pub header: Option<String>,
}

// ============================================================================
// DEFAULTS DO PROVIDER
// ============================================================================

/// Configuração global do provider, mesclada sob toda requisição.
///
/// O host entrega uma instância por operação; o executor nunca a altera.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDefaults {
    /// Headers mesclados sob todas as requisições.
    #[serde(default)]
    pub default_headers: HashMap<String, String>,

    /// Credencial Basic default.
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,

    /// Token Bearer default.
    #[serde(default)]
    pub bearer_token: Option<SecretString>,

    /// Timeout por tentativa em milissegundos.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Desabilita verificação TLS globalmente (opt-in explícito).
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Proxy HTTP de saída.
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// CA raiz adicional em PEM.
    #[serde(default)]
    pub ca_cert_pem: Option<String>,

    /// Certificado de cliente em PEM (requer `client_key_pem`).
    #[serde(default)]
    pub client_cert_pem: Option<String>,

    /// Chave privada do certificado de cliente em PEM.
    #[serde(default)]
    pub client_key_pem: Option<String>,

    /// Headers cujos VALORES são substituídos por `[REDACTED]` em
    /// qualquer mensagem de erro ou diagnóstico.
    #[serde(default = "default_redact_headers")]
    pub redact_headers: Vec<String>,

    /// Teto de leitura do corpo da resposta em bytes.
    ///
    /// Bytes excedentes são descartados e o sufixo `"... [TRUNCATED]"`
    /// é anexado ao corpo decodificado.
    #[serde(default = "default_max_response_body_bytes")]
    pub max_response_body_bytes: usize,
}

/// Default manual alinhado com os defaults de deserialização: um
/// `ProviderDefaults::default()` construído em código se comporta igual
/// a um bloco de configuração vazio.
impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            default_headers: HashMap::new(),
            basic_auth: None,
            bearer_token: None,
            timeout_ms: default_timeout_ms(),
            insecure_skip_verify: false,
            proxy_url: None,
            ca_cert_pem: None,
            client_cert_pem: None,
            client_key_pem: None,
            redact_headers: default_redact_headers(),
            max_response_body_bytes: default_max_response_body_bytes(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_redact_headers() -> Vec<String> {
    vec![
        "Authorization".to_string(),
        "Proxy-Authorization".to_string(),
        "X-Api-Key".to_string(),
    ]
}

fn default_max_response_body_bytes() -> usize {
    1_048_576
}

// ============================================================================
// PAPEL DA OPERAÇÃO
// ============================================================================

/// Papel sob o qual a spec está sendo executada.
///
/// Afeta apenas a política de persistência do corpo da resposta:
/// recursos persistem por padrão, data-sources não.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Recurso gerenciado (create/read/update/delete).
    Resource,
    /// Fonte de dados somente-leitura.
    DataSource,
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_fills_transient_status_set_when_field_absent() {
        let policy: RetryPolicy = serde_json::from_str(r#"{ "attempts": 2 }"#).unwrap();
        assert_eq!(policy.attempts, 2);
        assert_eq!(
            policy.retry_on_status_codes,
            vec![408, 429, 500, 502, 503, 504]
        );
        assert!(policy.respect_retry_after);
    }

    #[test]
    fn retry_policy_explicit_empty_status_set_is_kept() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{ "retry_on_status_codes": [] }"#).unwrap();
        assert!(policy.retry_on_status_codes.is_empty());
    }

    #[test]
    fn retry_policy_normalized_lifts_max_to_min() {
        let policy = RetryPolicy {
            attempts: 0,
            min_delay_ms: 800,
            max_delay_ms: 100,
            backoff: Backoff::Fixed,
            jitter: false,
            retry_on_status_codes: vec![],
            respect_retry_after: false,
        }
        .normalized();

        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.max_delay_ms, 800);
    }

    #[test]
    fn backoff_deserializes_lowercase() {
        let policy: RetryPolicy = serde_json::from_str(r#"{ "backoff": "linear" }"#).unwrap();
        assert_eq!(policy.backoff, Backoff::Linear);
    }

    #[test]
    fn poll_condition_empty_detection() {
        let empty = PollCondition::default();
        assert!(empty.is_empty());

        let with_status: PollCondition =
            serde_json::from_str(r#"{ "status_codes": [200] }"#).unwrap();
        assert!(!with_status.is_empty());
    }

    #[test]
    fn request_spec_minimal_deserializes() {
        let spec: RequestSpec =
            serde_json::from_str(r#"{ "method": "GET", "url": "https://example.test/ok" }"#)
                .unwrap();

        assert_eq!(spec.method, "GET");
        assert!(spec.retry.is_none());
        assert!(spec.extract.is_empty());
        assert!(spec.on_destroy.is_none());
        assert!(!spec.response_sensitive);
    }

    #[test]
    fn request_spec_with_destroy_sub_spec() {
        let spec: RequestSpec = serde_json::from_str(
            r#"{
                "method": "POST",
                "url": "https://api.test/users",
                "on_destroy": {
                    "method": "DELETE",
                    "url": "https://api.test/users/${self.outputs.user_id}"
                }
            }"#,
        )
        .unwrap();

        let destroy = spec.on_destroy.expect("sub-spec presente");
        assert_eq!(destroy.method, "DELETE");
        assert!(destroy.url.contains("${self.outputs.user_id}"));
    }

    #[test]
    fn provider_defaults_have_documented_values() {
        let parsed: ProviderDefaults = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.timeout_ms, 30_000);
        assert_eq!(parsed.max_response_body_bytes, 1_048_576);
        assert_eq!(
            parsed.redact_headers,
            vec!["Authorization", "Proxy-Authorization", "X-Api-Key"]
        );

        // O Default em código se comporta igual ao bloco vazio.
        let constructed = ProviderDefaults::default();
        assert_eq!(constructed.timeout_ms, parsed.timeout_ms);
        assert_eq!(constructed.redact_headers, parsed.redact_headers);
        assert_eq!(
            constructed.max_response_body_bytes,
            parsed.max_response_body_bytes
        );
    }

    #[test]
    fn bearer_token_debug_does_not_leak() {
        let spec: RequestSpec = serde_json::from_str(
            r#"{ "method": "GET", "url": "https://x.test", "bearer_token": "tok-123" }"#,
        )
        .unwrap();

        let debug = format!("{:?}", spec);
        assert!(!debug.contains("tok-123"));
    }
}
