//! Opaque list continuation tokens: the snapshot revision plus the last key
//! returned, relative to the listed prefix.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use foundry_core::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    /// Snapshot revision of the first page.
    pub rv: u64,
    /// Last key served, without the list prefix.
    pub start: String,
}

impl Continuation {
    pub fn encode(&self) -> ApiResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| ApiError::internal(format!("encode continue token: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> ApiResult<Self> {
        let bad = || ApiError::bad_request(format!("invalid continue token {token:?}"));
        let raw = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| bad())?;
        let c: Continuation = serde_json::from_slice(&raw).map_err(|_| bad())?;
        if c.rv == 0 || c.start.is_empty() || c.start.contains("..") || c.start.starts_with('/') {
            return Err(bad());
        }
        Ok(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_opaque_and_decodable() {
        let c = Continuation { rv: 42, start: "default/foo".into() };
        let token = c.encode().unwrap();
        assert!(!token.contains("default"));
        assert_eq!(Continuation::decode(&token).unwrap(), c);
    }

    #[test]
    fn garbage_is_bad_request() {
        assert_eq!(Continuation::decode("%%%").unwrap_err().code(), 400);
        let forged = URL_SAFE_NO_PAD.encode(br#"{"rv":3,"start":"/etc/x"}"#);
        assert!(Continuation::decode(&forged).is_err());
    }
}
