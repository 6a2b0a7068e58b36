//! # Módulo de Construção - Da Spec à Requisição Pronta
//!
//! Mescla os defaults do provider com a RequestSpec e produz uma
//! `BuiltRequest` pronta para o transporte.
//!
//! ## Fluxo de construção:
//!
//! ```text
//! ┌──────────┐     ┌──────────┐     ┌──────────┐     ┌──────────┐
//! │ 1. URL + │  →  │ 2. Merge │  →  │ 3. Corpo │  →  │ 4. Auth  │
//! │  query   │     │  headers │     │          │     │          │
//! └──────────┘     └──────────┘     └──────────┘     └──────────┘
//! ```
//!
//! ## Regras:
//!
//! - Parâmetros de `query` são ADICIONADOS à query embutida na URL.
//! - Ordem de merge de headers (o posterior sobrescreve o anterior no
//!   mapa; entries ordenados são anexados): defaults do provider →
//!   mapa da spec → entries ordenados da spec. Nomes case-insensitive.
//! - Corpo: raw verbatim; json é parseado e re-serializado (JSON
//!   inválido é rejeitado), com `Content-Type: application/json`
//!   quando ausente; file é lido integralmente.
//! - Auth: Bearer da spec > Basic da spec > Bearer do provider >
//!   Basic do provider. Escreve exatamente um header `Authorization`.
//!
//! O construtor também alimenta o `Redactor` com cada valor sensível
//! que passou pela requisição, para o passe de redação das mensagens.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::time::Duration;
use url::Url;

use crate::errors::ExecError;
use crate::protocol::{BasicAuth, ProviderDefaults, RequestSpec};
use crate::response::Redactor;

// ============================================================================
// REQUISIÇÃO CONSTRUÍDA
// ============================================================================

/// Requisição totalmente resolvida, pronta para o transporte.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    /// Verbo HTTP validado.
    pub method: String,

    /// URL final, com os parâmetros de query anexados.
    pub url: String,

    /// Headers ordenados; duplicatas intencionais preservadas.
    pub headers: Vec<(String, String)>,

    /// Corpo resolvido, se houver.
    pub body: Option<String>,

    /// Timeout desta tentativa.
    pub timeout: Duration,
}

// ============================================================================
// CONSTRUÇÃO
// ============================================================================

/// Constrói a requisição final a partir da spec e dos defaults.
///
/// Erros de spec retornam ANTES de qualquer tentativa de transporte.
/// Além da requisição, devolve o `Redactor` carregado com os valores
/// sensíveis vistos durante a construção.
pub fn build(
    spec: &RequestSpec,
    defaults: &ProviderDefaults,
) -> Result<(BuiltRequest, Redactor), ExecError> {
    // ------------------------------------------------------------------
    // Método e URL validados primeiro: falha barata e clara.
    // ------------------------------------------------------------------
    reqwest::Method::from_bytes(spec.method.as_bytes())
        .map_err(|_| ExecError::InvalidSpec(format!("invalid HTTP method '{}'", spec.method)))?;

    let parsed = Url::parse(&spec.url)
        .map_err(|e| ExecError::InvalidSpec(format!("invalid url '{}': {}", spec.url, e)))?;

    let url = append_query(&parsed, spec);

    // ------------------------------------------------------------------
    // Merge de headers.
    // ------------------------------------------------------------------
    let mut headers: Vec<(String, String)> = Vec::new();

    let mut default_names: Vec<&String> = defaults.default_headers.keys().collect();
    default_names.sort();
    for name in default_names {
        headers.push((name.clone(), defaults.default_headers[name].clone()));
    }

    let mut spec_names: Vec<&String> = spec.headers.keys().collect();
    spec_names.sort();
    for name in spec_names {
        set_header(&mut headers, name, &spec.headers[name]);
    }

    for entry in &spec.header_entries {
        headers.push((entry.name.clone(), entry.value.clone()));
    }

    // ------------------------------------------------------------------
    // Corpo.
    // ------------------------------------------------------------------
    let body = resolve_body(spec, &mut headers)?;

    // ------------------------------------------------------------------
    // Autenticação.
    // ------------------------------------------------------------------
    let mut redactor = Redactor::new();
    apply_auth(spec, defaults, &mut headers, &mut redactor);

    // ------------------------------------------------------------------
    // Valores sensíveis dos headers da lista de redação.
    // ------------------------------------------------------------------
    for (name, value) in &headers {
        let lowered = name.to_ascii_lowercase();
        if defaults
            .redact_headers
            .iter()
            .any(|r| r.to_ascii_lowercase() == lowered)
        {
            redactor.add_value(value.clone());
        }
    }

    let timeout = Duration::from_millis(spec.timeout_ms.unwrap_or(defaults.timeout_ms));

    tracing::debug!(
        method = %spec.method,
        url = %url,
        header_count = headers.len(),
        has_body = body.is_some(),
        "request built"
    );

    Ok((
        BuiltRequest {
            method: spec.method.clone(),
            url,
            headers,
            body,
            timeout,
        },
        redactor,
    ))
}

/// Anexa os parâmetros de `query` à URL, preservando a query embutida.
///
/// Chaves são ordenadas para uma URL final estável.
fn append_query(parsed: &Url, spec: &RequestSpec) -> String {
    let mut url = parsed.to_string();
    if spec.query.is_empty() {
        return url;
    }

    let mut names: Vec<&String> = spec.query.keys().collect();
    names.sort();

    let mut parts: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        parts.push(format!(
            "{}={}",
            urlencoding::encode(name),
            urlencoding::encode(&spec.query[name])
        ));
    }

    let separator = if parsed.query().is_some() { '&' } else { '?' };
    url.push(separator);
    url.push_str(&parts.join("&"));
    url
}

/// Sobrescreve (case-insensitive) ou insere um header no vetor.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    let lowered = name.to_ascii_lowercase();
    headers.retain(|(existing, _)| existing.to_ascii_lowercase() != lowered);
    headers.push((name.to_string(), value.to_string()));
}

/// Busca um header no vetor sem diferenciar maiúsculas/minúsculas.
fn has_header(headers: &[(String, String)], name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    headers
        .iter()
        .any(|(existing, _)| existing.to_ascii_lowercase() == lowered)
}

/// Resolve a fonte de corpo declarada. No máximo uma pode estar presente.
fn resolve_body(
    spec: &RequestSpec,
    headers: &mut Vec<(String, String)>,
) -> Result<Option<String>, ExecError> {
    let declared = [
        spec.body.is_some(),
        spec.body_json.is_some(),
        spec.body_file.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if declared > 1 {
        return Err(ExecError::InvalidSpec(
            "at most one of 'body', 'body_json' and 'body_file' may be set".to_string(),
        ));
    }

    if let Some(raw) = &spec.body {
        return Ok(Some(raw.clone()));
    }

    if let Some(text) = &spec.body_json {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ExecError::InvalidSpec(format!("body_json is not valid JSON: {}", e)))?;
        let serialized = serde_json::to_string(&value)
            .map_err(|e| ExecError::InvalidSpec(format!("body_json re-serialization: {}", e)))?;

        if !has_header(headers, "content-type") {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        return Ok(Some(serialized));
    }

    if let Some(path) = &spec.body_file {
        let content = fs::read_to_string(path).map_err(|e| {
            ExecError::InvalidSpec(format!("cannot read body_file '{}': {}", path.display(), e))
        })?;
        return Ok(Some(content));
    }

    Ok(None)
}

/// Aplica a credencial vencedora como um único header `Authorization`.
///
/// Precedência: Bearer da spec > Basic da spec > Bearer do provider >
/// Basic do provider. Sem credencial nenhuma, headers ficam como estão.
fn apply_auth(
    spec: &RequestSpec,
    defaults: &ProviderDefaults,
    headers: &mut Vec<(String, String)>,
    redactor: &mut Redactor,
) {
    let bearer_value = |token: &SecretString, redactor: &mut Redactor| {
        let token = token.expose_secret();
        redactor.add_value(token.clone());
        format!("Bearer {}", token)
    };
    let basic_value = |credential: &BasicAuth, redactor: &mut Redactor| {
        let password = credential.password.expose_secret();
        redactor.add_value(password.clone());
        format!(
            "Basic {}",
            BASE64.encode(format!("{}:{}", credential.username, password))
        )
    };

    let value = if let Some(token) = &spec.bearer_token {
        bearer_value(token, redactor)
    } else if let Some(credential) = &spec.basic_auth {
        basic_value(credential, redactor)
    } else if let Some(token) = &defaults.bearer_token {
        bearer_value(token, redactor)
    } else if let Some(credential) = &defaults.basic_auth {
        basic_value(credential, redactor)
    } else {
        return;
    };

    redactor.add_value(value.clone());
    set_header(headers, "Authorization", &value);
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BasicAuth, HeaderEntry};
    use secrecy::SecretString;

    fn spec(method: &str, url: &str) -> RequestSpec {
        RequestSpec {
            method: method.to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn header<'a>(built: &'a BuiltRequest, name: &str) -> Vec<&'a str> {
        let lowered = name.to_ascii_lowercase();
        built
            .headers
            .iter()
            .filter(|(n, _)| n.to_ascii_lowercase() == lowered)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn minimal_get_builds() {
        let (built, _) = build(&spec("GET", "https://example.test/ok"), &ProviderDefaults::default())
            .unwrap();
        assert_eq!(built.method, "GET");
        assert_eq!(built.url, "https://example.test/ok");
        assert!(built.body.is_none());
        assert_eq!(built.timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn invalid_url_is_invalid_spec() {
        let err = build(&spec("GET", "not a url"), &ProviderDefaults::default()).unwrap_err();
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }

    #[test]
    fn invalid_method_is_invalid_spec() {
        let err = build(
            &spec("GE T", "https://example.test"),
            &ProviderDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }

    #[test]
    fn query_params_are_added_not_replacing() {
        let mut s = spec("GET", "https://example.test/search?page=1");
        s.query.insert("q".to_string(), "valor com espaço".to_string());

        let (built, _) = build(&s, &ProviderDefaults::default()).unwrap();
        assert!(built.url.contains("page=1"));
        assert!(built.url.contains("q=valor%20com%20espa%C3%A7o"));
        assert!(built.url.contains('&'));
    }

    #[test]
    fn header_merge_order_defaults_then_map_then_entries() {
        let mut defaults = ProviderDefaults::default();
        defaults
            .default_headers
            .insert("X-Env".to_string(), "prod".to_string());
        defaults
            .default_headers
            .insert("X-Keep".to_string(), "default".to_string());

        let mut s = spec("GET", "https://example.test");
        // Sobrescreve com case diferente: mesma chave lógica.
        s.headers.insert("x-env".to_string(), "staging".to_string());
        s.header_entries.push(HeaderEntry {
            name: "X-Env".to_string(),
            value: "entry".to_string(),
        });

        let (built, _) = build(&s, &defaults).unwrap();
        assert_eq!(header(&built, "X-Keep"), vec!["default"]);
        // O mapa sobrescreveu o default; o entry duplicou de propósito.
        assert_eq!(header(&built, "X-Env"), vec!["staging", "entry"]);
    }

    #[test]
    fn multiple_body_sources_conflict() {
        let mut s = spec("POST", "https://example.test");
        s.body = Some("raw".to_string());
        s.body_json = Some("{}".to_string());

        let err = build(&s, &ProviderDefaults::default()).unwrap_err();
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }

    #[test]
    fn json_body_is_reserialized_and_content_type_set() {
        let mut s = spec("POST", "https://example.test");
        s.body_json = Some("{ \"name\" :  \"ana\" }".to_string());

        let (built, _) = build(&s, &ProviderDefaults::default()).unwrap();
        assert_eq!(built.body.as_deref(), Some(r#"{"name":"ana"}"#));
        assert_eq!(header(&built, "Content-Type"), vec!["application/json"]);
    }

    #[test]
    fn json_body_respects_existing_content_type() {
        let mut s = spec("POST", "https://example.test");
        s.body_json = Some("{}".to_string());
        s.headers.insert(
            "content-type".to_string(),
            "application/vnd.api+json".to_string(),
        );

        let (built, _) = build(&s, &ProviderDefaults::default()).unwrap();
        assert_eq!(header(&built, "content-type"), vec!["application/vnd.api+json"]);
    }

    #[test]
    fn invalid_json_body_is_invalid_spec() {
        let mut s = spec("POST", "https://example.test");
        s.body_json = Some("{ nope".to_string());

        let err = build(&s, &ProviderDefaults::default()).unwrap_err();
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }

    #[test]
    fn file_body_is_read_fully() {
        let path = std::env::temp_dir().join("httpx_runner_body_test.txt");
        fs::write(&path, "file payload").unwrap();

        let mut s = spec("POST", "https://example.test");
        s.body_file = Some(path.clone());

        let (built, _) = build(&s, &ProviderDefaults::default()).unwrap();
        assert_eq!(built.body.as_deref(), Some("file payload"));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn unreadable_file_body_is_invalid_spec() {
        let mut s = spec("POST", "https://example.test");
        s.body_file = Some("/definitely/not/here.txt".into());

        let err = build(&s, &ProviderDefaults::default()).unwrap_err();
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }

    #[test]
    fn spec_bearer_wins_over_everything() {
        let defaults = ProviderDefaults {
            bearer_token: Some(SecretString::new("provider-tok".to_string())),
            basic_auth: Some(BasicAuth {
                username: "root".to_string(),
                password: SecretString::new("hunter2".to_string()),
            }),
            ..Default::default()
        };

        let mut s = spec("GET", "https://example.test");
        s.bearer_token = Some(SecretString::new("spec-tok".to_string()));
        s.basic_auth = Some(BasicAuth {
            username: "user".to_string(),
            password: SecretString::new("pass".to_string()),
        });

        let (built, _) = build(&s, &defaults).unwrap();
        assert_eq!(header(&built, "Authorization"), vec!["Bearer spec-tok"]);
    }

    #[test]
    fn spec_basic_wins_over_provider_bearer() {
        let defaults = ProviderDefaults {
            bearer_token: Some(SecretString::new("provider-tok".to_string())),
            ..Default::default()
        };

        let mut s = spec("GET", "https://example.test");
        s.basic_auth = Some(BasicAuth {
            username: "user".to_string(),
            password: SecretString::new("pass".to_string()),
        });

        let (built, _) = build(&s, &defaults).unwrap();
        let expected = format!("Basic {}", BASE64.encode("user:pass"));
        assert_eq!(header(&built, "Authorization"), vec![expected.as_str()]);
    }

    #[test]
    fn provider_bearer_wins_over_provider_basic() {
        let defaults = ProviderDefaults {
            bearer_token: Some(SecretString::new("provider-tok".to_string())),
            basic_auth: Some(BasicAuth {
                username: "root".to_string(),
                password: SecretString::new("hunter2".to_string()),
            }),
            ..Default::default()
        };

        let (built, _) = build(&spec("GET", "https://example.test"), &defaults).unwrap();
        assert_eq!(header(&built, "Authorization"), vec!["Bearer provider-tok"]);
    }

    #[test]
    fn auth_writes_single_authorization_header() {
        let mut s = spec("GET", "https://example.test");
        s.headers
            .insert("Authorization".to_string(), "stale".to_string());
        s.bearer_token = Some(SecretString::new("tok".to_string()));

        let (built, _) = build(&s, &ProviderDefaults::default()).unwrap();
        assert_eq!(header(&built, "Authorization"), vec!["Bearer tok"]);
    }

    #[test]
    fn redactor_learns_auth_and_listed_header_values() {
        let mut s = spec("GET", "https://example.test");
        s.bearer_token = Some(SecretString::new("tok-xyz".to_string()));
        s.headers
            .insert("X-Api-Key".to_string(), "key-123".to_string());

        let (_, redactor) = build(&s, &ProviderDefaults::default()).unwrap();

        let message = "failed: token tok-xyz rejected, api key key-123 invalid";
        let clean = redactor.apply(message);
        assert!(!clean.contains("tok-xyz"));
        assert!(!clean.contains("key-123"));
    }

    #[test]
    fn timeout_override_from_spec() {
        let mut s = spec("GET", "https://example.test");
        s.timeout_ms = Some(1500);

        let (built, _) = build(&s, &ProviderDefaults::default()).unwrap();
        assert_eq!(built.timeout, Duration::from_millis(1500));
    }
}
