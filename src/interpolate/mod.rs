// Module: Interpolate
// Expands ${self.*} templates from prior state into destroy-time specs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ExecError;
use crate::extract::Outputs;
use crate::protocol::RequestSpec;

static SELF_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{self\.([A-Za-z0-9_.]+)\}").expect("valid interpolation regex"));

static OUTPUT_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid output key regex"));

/// Read-only snapshot of prior state visible to destroy-time expansion.
#[derive(Debug, Clone)]
pub struct InterpolationContext {
    pub id: String,
    pub outputs: Outputs,
    pub status_code: u16,
    pub response_body: Option<String>,
}

impl InterpolationContext {
    /// Expands `${self.id}` and `${self.outputs.KEY}` inside a string.
    ///
    /// Unknown output keys abort with `InterpolationKeyMissing`; any
    /// other `${self.…}` form is left untouched.
    pub fn expand_str(&self, input: &str) -> Result<String, ExecError> {
        let mut result = String::new();
        let mut last_index = 0;

        for capture in SELF_TOKEN_RE.captures_iter(input) {
            let matched = capture.get(0).unwrap();
            let token = capture.get(1).unwrap().as_str();

            result.push_str(&input[last_index..matched.start()]);
            match self.resolve_token(token)? {
                Some(value) => result.push_str(&value),
                None => result.push_str(matched.as_str()),
            }
            last_index = matched.end();
        }

        result.push_str(&input[last_index..]);
        Ok(result)
    }

    /// Pure expansion of every template-bearing field of a destroy spec.
    ///
    /// The stored spec is never mutated; callers get a fresh copy with
    /// url, bodies, header values and query values expanded. Numeric and
    /// boolean fields pass through untouched.
    pub fn expand_spec(&self, spec: &RequestSpec) -> Result<RequestSpec, ExecError> {
        let mut expanded = spec.clone();

        expanded.url = self.expand_str(&spec.url)?;

        if let Some(body) = &spec.body {
            expanded.body = Some(self.expand_str(body)?);
        }
        if let Some(body_json) = &spec.body_json {
            expanded.body_json = Some(self.expand_str(body_json)?);
        }

        for (_, value) in expanded.headers.iter_mut() {
            *value = self.expand_str(value)?;
        }
        for entry in expanded.header_entries.iter_mut() {
            entry.value = self.expand_str(&entry.value)?;
        }
        for (_, value) in expanded.query.iter_mut() {
            *value = self.expand_str(value)?;
        }

        Ok(expanded)
    }

    /// Resolves one captured token.
    ///
    /// Ok(None) means "not ours, leave the original text in place".
    fn resolve_token(&self, token: &str) -> Result<Option<String>, ExecError> {
        if token == "id" {
            return Ok(Some(self.id.clone()));
        }

        if let Some(key) = token.strip_prefix("outputs.") {
            if !OUTPUT_KEY_RE.is_match(key) {
                return Ok(None);
            }
            return match self.outputs.get(key) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(ExecError::InterpolationKeyMissing {
                    key: key.to_string(),
                }),
            };
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HeaderEntry;

    fn context() -> InterpolationContext {
        let mut outputs = Outputs::new();
        outputs.insert("user_id".to_string(), "u42".to_string());
        outputs.insert("zone".to_string(), "us-east".to_string());
        InterpolationContext {
            id: "abc123".to_string(),
            outputs,
            status_code: 201,
            response_body: None,
        }
    }

    #[test]
    fn expands_id_and_output_keys() {
        let ctx = context();
        let expanded = ctx
            .expand_str("https://api.test/users/${self.outputs.user_id}?trace=${self.id}")
            .unwrap();
        assert_eq!(expanded, "https://api.test/users/u42?trace=abc123");
    }

    #[test]
    fn missing_output_key_aborts() {
        let ctx = context();
        let err = ctx.expand_str("${self.outputs.nope}").unwrap_err();
        assert_eq!(
            err,
            ExecError::InterpolationKeyMissing {
                key: "nope".to_string()
            }
        );
    }

    #[test]
    fn unrecognized_self_forms_are_left_unchanged() {
        let ctx = context();
        assert_eq!(
            ctx.expand_str("${self.status_code}").unwrap(),
            "${self.status_code}"
        );
        // Nested dots do not match the KEY grammar.
        assert_eq!(
            ctx.expand_str("${self.outputs.a.b}").unwrap(),
            "${self.outputs.a.b}"
        );
    }

    #[test]
    fn non_template_text_passes_through() {
        let ctx = context();
        assert_eq!(ctx.expand_str("plain ${other} text").unwrap(), "plain ${other} text");
    }

    #[test]
    fn expand_spec_covers_every_string_field() {
        let ctx = context();
        let mut spec = RequestSpec {
            method: "DELETE".to_string(),
            url: "https://api.test/users/${self.outputs.user_id}".to_string(),
            body: Some("bye ${self.id}".to_string()),
            ..Default::default()
        };
        spec.headers
            .insert("X-Trace".to_string(), "${self.id}".to_string());
        spec.header_entries.push(HeaderEntry {
            name: "X-Zone".to_string(),
            value: "${self.outputs.zone}".to_string(),
        });
        spec.query
            .insert("owner".to_string(), "${self.outputs.user_id}".to_string());

        let expanded = ctx.expand_spec(&spec).unwrap();

        assert_eq!(expanded.url, "https://api.test/users/u42");
        assert_eq!(expanded.body.as_deref(), Some("bye abc123"));
        assert_eq!(expanded.headers.get("X-Trace").map(String::as_str), Some("abc123"));
        assert_eq!(expanded.header_entries[0].value, "us-east");
        assert_eq!(expanded.query.get("owner").map(String::as_str), Some("u42"));

        // No known template survives anywhere after expansion.
        for text in [
            expanded.url.as_str(),
            expanded.body.as_deref().unwrap_or(""),
        ] {
            assert!(!text.contains("${self.id}"));
            assert!(!text.contains("${self.outputs."));
        }
    }

    #[test]
    fn expand_spec_missing_key_does_not_partially_apply() {
        let ctx = context();
        let spec = RequestSpec {
            method: "DELETE".to_string(),
            url: "https://api.test/${self.outputs.gone}".to_string(),
            ..Default::default()
        };

        assert!(ctx.expand_spec(&spec).is_err());
    }
}
