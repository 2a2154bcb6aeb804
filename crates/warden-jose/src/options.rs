use serde::{Deserialize, Serialize};
use warden_crypto::provider::{
    DEFAULT_MAX_DECOMPRESSED, DEFAULT_PBES2_ITERATIONS, DEFAULT_PBES2_MAX_ITERATIONS,
};

pub const DEFAULT_MAX_TOKEN_LENGTH: usize = 1024 * 1024;

/// Serializer configuration. Plain data; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    /// Longer compact strings are rejected before any parsing.
    pub max_token_length: usize,
    /// Limit on inflated `zip: DEF` payloads.
    pub max_decompressed_size: usize,
    /// `p2c` written into new PBES2 tokens.
    pub pbes2_iterations: u32,
    /// Largest `p2c` accepted on decode.
    pub pbes2_max_iterations: u32,
    /// Decode `alg: none` tokens instead of rejecting them.
    pub allow_unsecured: bool,
    /// Decode the JWS inside a JWE whose `cty` is `JWT`.
    pub unwrap_nested: bool,
    /// `typ` added to new headers unless the caller sets one.
    pub default_typ: Option<String>,
    /// Extension parameters the caller processes itself; only these may
    /// appear in `crit`.
    pub critical_headers: Vec<String>,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            max_token_length: DEFAULT_MAX_TOKEN_LENGTH,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED,
            pbes2_iterations: DEFAULT_PBES2_ITERATIONS,
            pbes2_max_iterations: DEFAULT_PBES2_MAX_ITERATIONS,
            allow_unsecured: false,
            unwrap_nested: true,
            default_typ: None,
            critical_headers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options: SerializerOptions =
            serde_json::from_str(r#"{"allow_unsecured": true, "default_typ": "JWT"}"#).unwrap();
        assert!(options.allow_unsecured);
        assert_eq!(options.default_typ.as_deref(), Some("JWT"));
        assert_eq!(options.max_token_length, DEFAULT_MAX_TOKEN_LENGTH);
        assert_eq!(options.pbes2_iterations, DEFAULT_PBES2_ITERATIONS);
        assert!(options.unwrap_nested);
    }

    #[test]
    fn defaults_reject_unsecured_tokens() {
        let options = SerializerOptions::default();
        assert!(!options.allow_unsecured);
        assert!(options.pbes2_iterations <= options.pbes2_max_iterations);
    }
}
