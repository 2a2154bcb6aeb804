use thiserror::Error;
use warden_crypto::{CryptoError, ErrorKind};

#[derive(Debug, Error)]
pub enum JoseError {
    #[error("Malformed token: {0}")]
    Format(String),

    // No detail: which key or step failed is not revealed.
    #[error("Token integrity check failed")]
    Integrity,

    #[error("No signing or encrypting credentials supplied")]
    MissingCredentials,

    #[error("Unsecured (alg=none) tokens are not accepted")]
    UnsecuredTokenRejected,

    #[error("Header JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl JoseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JoseError::Format(_) | JoseError::Json(_) => ErrorKind::Format,
            JoseError::Integrity => ErrorKind::Integrity,
            JoseError::MissingCredentials | JoseError::UnsecuredTokenRejected => ErrorKind::Other,
            JoseError::Crypto(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_pass_through_crypto_errors() {
        assert_eq!(
            JoseError::from(CryptoError::UnknownAlgorithm("X".to_string())).kind(),
            ErrorKind::UnknownAlgorithm
        );
        assert_eq!(
            JoseError::from(CryptoError::Disposed("secret key")).kind(),
            ErrorKind::Disposed
        );
        assert_eq!(JoseError::Integrity.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn json_errors_are_format_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(JoseError::from(err).kind(), ErrorKind::Format);
    }

    #[test]
    fn integrity_message_carries_no_detail() {
        assert_eq!(JoseError::Integrity.to_string(), "Token integrity check failed");
    }
}
