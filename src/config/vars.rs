//! Environment variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{                           # Opening ${
            ([A-Za-z_][A-Za-z0-9_]*)   # Variable name (capture group 1)
            (?:                        # Optional default value group
                (:?-)                  # :- or just - (capture group 2)
                ([^}]*)                # Default value (capture group 3)
            )?
        \}                             # Closing }
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # Unbraced $VAR (capture group 4)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered during interpolation.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// Errors are accumulated rather than returned on first failure so the
/// user sees every missing variable at once.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let full_match = caps.get(0).unwrap().as_str();

            if full_match == "$$" {
                return "$".to_string();
            }

            let var_name = caps
                .get(1)
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");

            let default_syntax = caps.get(2).map(|m| m.as_str());
            let default_value = caps.get(3).map(|m| m.as_str());

            match env::var(var_name) {
                Ok(value) => {
                    // Config files are line-oriented YAML; a variable
                    // carrying newlines could smuggle extra keys in.
                    if value.contains('\n') || value.contains('\r') {
                        errors.push(format!(
                            "environment variable '{}' contains newlines, which is not allowed",
                            var_name
                        ));
                        return full_match.to_string();
                    }

                    if value.is_empty() && default_syntax == Some(":-") {
                        return default_value.unwrap_or("").to_string();
                    }

                    value
                }
                Err(_) => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        errors.push(format!("environment variable '{}' is not set", var_name));
                        full_match.to_string()
                    }
                }
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: These tests run serially (not in parallel) and we restore values after
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: Restoring original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_basic_substitution() {
        with_env_vars(&[("FLOE_TEST_BASIC", Some("hello"))], || {
            let result = interpolate("value: $FLOE_TEST_BASIC");
            assert!(result.is_ok());
            assert_eq!(result.text, "value: hello");
        });
    }

    #[test]
    fn test_braced_and_default() {
        with_env_vars(
            &[("FLOE_TEST_SET", Some("actual")), ("FLOE_TEST_UNSET", None)],
            || {
                let result =
                    interpolate("a: ${FLOE_TEST_SET:-fallback}, b: ${FLOE_TEST_UNSET:-fallback}");
                assert!(result.is_ok());
                assert_eq!(result.text, "a: actual, b: fallback");
            },
        );
    }

    #[test]
    fn test_missing_variables_accumulate_errors() {
        with_env_vars(
            &[("FLOE_TEST_MISS1", None), ("FLOE_TEST_MISS2", None)],
            || {
                let result = interpolate("a: $FLOE_TEST_MISS1, b: $FLOE_TEST_MISS2");
                assert!(!result.is_ok());
                assert_eq!(result.errors.len(), 2);
                assert!(result.errors[0].contains("not set"));
            },
        );
    }

    #[test]
    fn test_empty_value_default_variants() {
        with_env_vars(&[("FLOE_TEST_EMPTY", Some(""))], || {
            let colon = interpolate("v: ${FLOE_TEST_EMPTY:-default}");
            assert_eq!(colon.text, "v: default");

            let plain = interpolate("v: ${FLOE_TEST_EMPTY-default}");
            assert_eq!(plain.text, "v: ");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("FLOE_TEST_INJECT", Some("line1\nline2"))], || {
            let result = interpolate("value: $FLOE_TEST_INJECT");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_yaml_config_example() {
        with_env_vars(
            &[
                ("FLOE_TEST_DATA_DIR", Some("/data/kpis")),
                ("FLOE_TEST_SHARDS", None),
            ],
            || {
                let yaml = r#"
tables:
  - name: order_kpi_table
    rows_path: "${FLOE_TEST_DATA_DIR}/order_kpis.ndjson"
    key_fields: [order_date]
    shard_count: ${FLOE_TEST_SHARDS:-5}
"#;
                let result = interpolate(yaml);
                assert!(result.is_ok());
                assert!(result.text.contains("/data/kpis/order_kpis.ndjson"));
                assert!(result.text.contains("shard_count: 5"));
            },
        );
    }
}
