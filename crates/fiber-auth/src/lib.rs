//! Bearer token verification (spec §4.2 step 1, §9 "trust graph, not monolithic RBAC").
//!
//! Central issues scoped tokens to regionals; regionals verify probe tokens
//! and carry them forward (or re-sign) for the central hop. Either a
//! probe-signed or a relay-signed token must verify at the central gateway
//! (spec §4.3 "auth accepts either").

use chrono::Utc;
use fiber_core::FiberError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a probe or relay bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeClaims {
    /// Token subject — becomes the actor identity (spec §4.2 step 1).
    pub sub: String,
    /// Region claim; for `/ingest` batches this must match the declared source region.
    pub region: String,
    pub exp: i64,
    /// `true` when this token was issued to a regional relay rather than a probe.
    #[serde(default)]
    pub is_relay: bool,
}

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// `public_key_pem` is the central authority's public key (spec §6 `JWT_PUBLIC_KEY`).
    pub fn from_pem(public_key_pem: &str) -> Result<Self, FiberError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .or_else(|_| DecodingKey::from_ec_pem(public_key_pem.as_bytes()))
            .map_err(|e| FiberError::AuthFailure(format!("invalid public key: {e}")))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        Ok(Self { decoding_key, validation })
    }

    /// Verifies a bearer token and, for batch ingest, checks the region claim
    /// against the declared source region. Never logs the raw token (spec §7).
    pub fn verify(&self, bearer_token: &str, declared_region: Option<&str>) -> Result<ProbeClaims, FiberError> {
        let data = decode::<ProbeClaims>(bearer_token, &self.decoding_key, &self.validation)
            .map_err(|e| FiberError::AuthFailure(format!("token verification failed: {e}")))?;

        if data.claims.exp < Utc::now().timestamp() {
            return Err(FiberError::AuthFailure("token expired".into()));
        }

        if let Some(declared) = declared_region {
            if data.claims.region != declared {
                return Err(FiberError::AuthFailure(format!(
                    "region claim {:?} does not match declared source region {:?}",
                    data.claims.region, declared
                )));
            }
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_obviously_malformed_token() {
        // A syntactically-valid-looking PEM is required to even construct the
        // verifier; exercising the reject path here only needs a verifier to
        // exist, which `from_pem` on garbage input will itself refuse.
        let result = TokenVerifier::from_pem("not a pem");
        assert!(result.is_err());
    }
}
