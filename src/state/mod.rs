//! # Módulo de Estado - Persistência por Recurso
//!
//! Define o que o host persiste por recurso entre operações: o id
//! estável, o último resultado e as saídas extraídas. O destroy lê este
//! estado para montar o contexto de interpolação.
//!
//! ## Id estável:
//!
//! O id é derivado de (URL, método, corpo): os primeiros 16 caracteres
//! hex de um digest SHA-256. O mesmo trio produz sempre o mesmo id,
//! então refresh e destroy reencontram o recurso.
//!
//! ## Política de persistência do corpo:
//!
//! | Papel       | `store_response_body` ausente           | explícito |
//! |-------------|------------------------------------------|-----------|
//! | Resource    | true; vira false se há regras de extração| vence     |
//! | DataSource  | false                                    | vence     |

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::extract::Outputs;
use crate::protocol::{RequestSpec, Role};
use crate::response::ResponseResult;

// ============================================================================
// ID ESTÁVEL
// ============================================================================

/// Deriva o id estável do recurso a partir de (URL, método, corpo).
///
/// Primeiros 16 caracteres hex do SHA-256 sobre os três campos, com um
/// separador para evitar ambiguidade entre fronteiras.
pub fn resource_id(url: &str, method: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0x1f]);
    hasher.update(method.as_bytes());
    hasher.update([0x1f]);
    if let Some(body) = body {
        hasher.update(body.as_bytes());
    }

    let digest = hasher.finalize();
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

// ============================================================================
// POLÍTICA DE PERSISTÊNCIA
// ============================================================================

/// Decide se o corpo da resposta deve ser persistido no estado.
pub fn should_store_response_body(spec: &RequestSpec, role: Role) -> bool {
    if let Some(explicit) = spec.store_response_body {
        return explicit;
    }

    match role {
        // Com regras de extração o corpo já cumpriu seu papel; o
        // default flipa para não persistir.
        Role::Resource => spec.extract.is_empty(),
        Role::DataSource => false,
    }
}

// ============================================================================
// ESTADO PERSISTIDO
// ============================================================================

/// Estado persistido por recurso entre operações.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceState {
    /// Id estável do recurso (16 hex).
    pub id: String,

    /// Status HTTP da última operação.
    pub status_code: u16,

    /// Headers da última resposta, já concatenados.
    #[serde(default)]
    pub response_headers: HashMap<String, String>,

    /// Corpo da última resposta, conforme a política de persistência.
    #[serde(default)]
    pub response_body: Option<String>,

    /// Saídas extraídas na última operação.
    #[serde(default)]
    pub outputs: Outputs,

    /// Tentativas de transporte da última operação.
    #[serde(default)]
    pub last_attempt_count: u32,

    /// Erro redigido da última operação, se houve.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ResourceState {
    /// Monta o estado a partir de uma execução concluída.
    pub fn from_execution(
        spec: &RequestSpec,
        role: Role,
        response: &ResponseResult,
        outputs: &Outputs,
    ) -> Self {
        let body = if should_store_response_body(spec, role) {
            Some(response.body.clone())
        } else {
            None
        };

        Self {
            id: resource_id(&spec.url, &spec.method, spec.body.as_deref()),
            status_code: response.status_code,
            response_headers: response.headers.clone(),
            response_body: body,
            outputs: outputs.clone(),
            last_attempt_count: response.attempt_count,
            last_error: response.error.clone(),
        }
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ExtractRule;

    #[test]
    fn resource_id_is_sixteen_hex_chars() {
        let id = resource_id("https://api.test/users", "POST", Some("{}"));
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn resource_id_is_stable() {
        let a = resource_id("https://api.test/users", "POST", Some("{}"));
        let b = resource_id("https://api.test/users", "POST", Some("{}"));
        assert_eq!(a, b);
    }

    #[test]
    fn resource_id_changes_with_any_input() {
        let base = resource_id("https://api.test/users", "POST", Some("{}"));
        assert_ne!(base, resource_id("https://api.test/other", "POST", Some("{}")));
        assert_ne!(base, resource_id("https://api.test/users", "PUT", Some("{}")));
        assert_ne!(base, resource_id("https://api.test/users", "POST", Some("x")));
        assert_ne!(base, resource_id("https://api.test/users", "POST", None));
    }

    fn spec_with_extract(extract: bool, store: Option<bool>) -> RequestSpec {
        let mut spec = RequestSpec {
            method: "GET".to_string(),
            url: "https://api.test".to_string(),
            store_response_body: store,
            ..Default::default()
        };
        if extract {
            spec.extract.push(ExtractRule {
                name: "id".to_string(),
                json_path: Some("id".to_string()),
                header: None,
            });
        }
        spec
    }

    #[test]
    fn resource_stores_body_by_default() {
        assert!(should_store_response_body(
            &spec_with_extract(false, None),
            Role::Resource
        ));
    }

    #[test]
    fn extraction_flips_resource_default_to_false() {
        assert!(!should_store_response_body(
            &spec_with_extract(true, None),
            Role::Resource
        ));
    }

    #[test]
    fn explicit_value_always_wins() {
        assert!(should_store_response_body(
            &spec_with_extract(true, Some(true)),
            Role::Resource
        ));
        assert!(should_store_response_body(
            &spec_with_extract(true, Some(true)),
            Role::DataSource
        ));
        assert!(!should_store_response_body(
            &spec_with_extract(false, Some(false)),
            Role::Resource
        ));
    }

    #[test]
    fn data_source_does_not_store_by_default() {
        assert!(!should_store_response_body(
            &spec_with_extract(false, None),
            Role::DataSource
        ));
    }

    #[test]
    fn state_assembly_honors_store_policy() {
        let spec = spec_with_extract(true, None);
        let response = ResponseResult {
            status_code: 201,
            headers: HashMap::new(),
            body: "{\"id\":1}".to_string(),
            attempt_count: 2,
            error: None,
        };
        let mut outputs = Outputs::new();
        outputs.insert("id".to_string(), "1".to_string());

        let state = ResourceState::from_execution(&spec, Role::Resource, &response, &outputs);

        assert_eq!(state.status_code, 201);
        assert_eq!(state.last_attempt_count, 2);
        assert!(state.response_body.is_none());
        assert_eq!(state.outputs.get("id").map(String::as_str), Some("1"));
        assert_eq!(state.id.len(), 16);
    }
}
