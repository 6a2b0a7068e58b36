//! # Módulo de Expectations - Validação Pós-Loop
//!
//! Aplica as asserções declaradas em `expect` sobre a resposta FINAL,
//! depois que o loop de retry terminou com sucesso.
//!
//! ## Por que acumular falhas?
//!
//! Parar na primeira violação obrigaria o usuário a corrigir e rodar de
//! novo para descobrir a próxima. Acumulamos TODAS as violações e
//! devolvemos um único `ExpectationFailed` com a lista completa.
//!
//! ## Validações realizadas:
//!
//! 1. **status_codes**: o status final pertence ao conjunto
//! 2. **header_present**: headers obrigatórios existem (case-insensitive)
//! 3. **json_path_exists**: caminhos existem no corpo JSON
//! 4. **json_path_equals**: caminhos têm o valor esperado

use serde_json::Value;

use crate::errors::ExecError;
use crate::jsonpath;
use crate::protocol::Expectations;
use crate::response::ResponseResult;

/// Valida a resposta final contra as expectations declaradas.
///
/// Retorna `Ok(())` quando todas valem; caso contrário um único
/// `ExpectationFailed` com todas as violações encontradas.
pub fn validate(expectations: &Expectations, response: &ResponseResult) -> Result<(), ExecError> {
    if expectations.is_empty() {
        return Ok(());
    }

    let mut failures = Vec::new();

    // ------------------------------------------------------------------
    // Status dentro do conjunto declarado.
    // ------------------------------------------------------------------
    if !expectations.status_codes.is_empty()
        && !expectations.status_codes.contains(&response.status_code)
    {
        failures.push(format!(
            "status {} not in {:?}",
            response.status_code, expectations.status_codes
        ));
    }

    // ------------------------------------------------------------------
    // Presença de headers (case-insensitive).
    // ------------------------------------------------------------------
    for name in &expectations.header_present {
        if response.header(name).is_none() {
            failures.push(format!("missing header '{}'", name));
        }
    }

    // ------------------------------------------------------------------
    // Checagens de caminho JSON. O corpo é parseado uma única vez; se
    // não for JSON válido, cada checagem pedida vira uma violação clara.
    // ------------------------------------------------------------------
    let wants_json =
        !expectations.json_path_exists.is_empty() || !expectations.json_path_equals.is_empty();

    if wants_json {
        match serde_json::from_str::<Value>(&response.body) {
            Ok(body) => {
                for path in &expectations.json_path_exists {
                    if let Err(e) = jsonpath::evaluate(&body, path) {
                        failures.push(format!("json path '{}' does not exist: {}", path, e));
                    }
                }

                for (path, expected) in &expectations.json_path_equals {
                    match jsonpath::evaluate(&body, path) {
                        Ok(actual) => {
                            if !jsonpath::literal_matches(actual, expected) {
                                failures.push(format!(
                                    "json path '{}': expected '{}', got '{}'",
                                    path,
                                    expected,
                                    jsonpath::stringify(actual)
                                ));
                            }
                        }
                        Err(e) => failures.push(format!("json path '{}': {}", path, e)),
                    }
                }
            }
            Err(_) => {
                failures.push(
                    "json path expectations declared but response body is not valid JSON"
                        .to_string(),
                );
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        tracing::warn!(count = failures.len(), "response expectations failed");
        Err(ExecError::ExpectationFailed { failures })
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    fn response(status: u16, body: &str, headers: &[(&str, &str)]) -> ResponseResult {
        let mut map = HashMap::new();
        for (k, v) in headers {
            map.insert(k.to_string(), v.to_string());
        }
        ResponseResult {
            status_code: status,
            headers: map,
            body: body.to_string(),
            attempt_count: 1,
            error: None,
        }
    }

    fn failures(err: ExecError) -> Vec<String> {
        match err {
            ExecError::ExpectationFailed { failures } => failures,
            other => panic!("expected ExpectationFailed, got {:?}", other),
        }
    }

    #[test]
    fn empty_expectations_always_pass() {
        let result = validate(&Expectations::default(), &response(500, "bad", &[]));
        assert!(result.is_ok());
    }

    #[test]
    fn status_membership_passes_and_fails() {
        let expectations = Expectations {
            status_codes: vec![200, 204],
            ..Default::default()
        };

        assert!(validate(&expectations, &response(204, "", &[])).is_ok());

        let errs = failures(validate(&expectations, &response(500, "", &[])).unwrap_err());
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("500"));
    }

    #[test]
    fn accumulates_every_violation() {
        // Status errado E header ausente: as duas violações na lista.
        let expectations = Expectations {
            status_codes: vec![200],
            header_present: vec!["X-Id".to_string()],
            ..Default::default()
        };

        let resp = response(500, "bad", &[("Content-Type", "text/plain")]);
        let errs = failures(validate(&expectations, &resp).unwrap_err());

        assert_eq!(errs.len(), 2);
        assert!(errs[0].contains("status 500"));
        assert!(errs[1].contains("X-Id"));
    }

    #[test]
    fn header_presence_is_case_insensitive() {
        let expectations = Expectations {
            header_present: vec!["x-request-id".to_string()],
            ..Default::default()
        };

        let resp = response(200, "", &[("X-Request-Id", "abc")]);
        assert!(validate(&expectations, &resp).is_ok());
    }

    #[test]
    fn json_path_exists() {
        let expectations = Expectations {
            json_path_exists: vec!["data.id".to_string()],
            ..Default::default()
        };

        assert!(validate(&expectations, &response(200, r#"{"data":{"id":1}}"#, &[])).is_ok());

        let errs =
            failures(validate(&expectations, &response(200, r#"{"data":{}}"#, &[])).unwrap_err());
        assert!(errs[0].contains("does not exist"));
    }

    #[test]
    fn json_path_equals_structural_and_fallback() {
        let mut equals = BTreeMap::new();
        equals.insert("count".to_string(), "3".to_string());
        let expectations = Expectations {
            json_path_equals: equals,
            ..Default::default()
        };

        assert!(validate(&expectations, &response(200, r#"{"count":3}"#, &[])).is_ok());

        let errs =
            failures(validate(&expectations, &response(200, r#"{"count":4}"#, &[])).unwrap_err());
        assert!(errs[0].contains("expected '3'"));
    }

    #[test]
    fn non_json_body_with_json_check_fails_clearly() {
        let expectations = Expectations {
            json_path_exists: vec!["x".to_string()],
            ..Default::default()
        };

        let errs = failures(validate(&expectations, &response(200, "<html>", &[])).unwrap_err());
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("not valid JSON"));
    }

    #[test]
    fn non_json_body_without_json_checks_is_fine() {
        let expectations = Expectations {
            status_codes: vec![200],
            ..Default::default()
        };

        assert!(validate(&expectations, &response(200, "<html>", &[])).is_ok());
    }
}
