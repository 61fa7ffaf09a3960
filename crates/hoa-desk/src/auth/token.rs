//! Opaque bearer tokens. Clients hold the random token, the store keeps its digest.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Generate a new token and the digest to persist.
pub fn generate_token() -> (String, String) {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let digest = token_digest(&token);
    (token, digest)
}

/// Hex SHA-256 of the token as presented by the client.
pub fn token_digest(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_digest_matches() {
        let (first, first_digest) = generate_token();
        let (second, _) = generate_token();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert_eq!(token_digest(&first), first_digest);
        assert_eq!(first_digest.len(), 64);
    }
}
