//! Client Token
//!
//! Signed cookie value identifying one client context:
//! `{client_id}.{base64url(hmac_sha256(secret, client_id))}`.

use base64::Engine;
use hmac::{Hmac, Mac};
use kernel::id::ClientId;
use sha2::Sha256;

use crate::error::{GateError, GateResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct ClientTokenSigner {
    secret: [u8; 32],
}

impl ClientTokenSigner {
    pub fn new(secret: [u8; 32]) -> Self {
        Self { secret }
    }

    fn mac(&self) -> GateResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| GateError::Internal(format!("HMAC key rejected: {e}")))
    }

    /// Sign a client id
    pub fn issue(&self, client_id: &ClientId) -> GateResult<String> {
        let client_id = client_id.to_string();

        let mut mac = self.mac()?;
        mac.update(client_id.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            client_id,
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify a token and return the client id it names.
    /// Anything malformed or forged yields `None`.
    pub fn verify(&self, token: &str) -> Option<ClientId> {
        let (client_id, signature_b64) = token.split_once('.')?;

        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(client_id.as_bytes());
        mac.verify_slice(&signature).ok()?;

        client_id.parse().ok()
    }
}
