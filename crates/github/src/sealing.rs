//! Encrypts secret values for the Actions secrets API.
//!
//! GitHub expects a libsodium sealed box built against the repository's
//! public key, base64 encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use crypto_box::aead::OsRng;
use crypto_box::PublicKey;
use pipeline::ApiError;

/// Seals `plaintext` for the base64-encoded X25519 `public_key`.
pub fn seal_secret(public_key: &str, plaintext: &str) -> Result<String, ApiError> {
    let bytes = STANDARD
        .decode(public_key.trim())
        .map_err(|e| ApiError::permanent(format!("repository public key is not base64: {e}")))?;
    let key: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ApiError::permanent("repository public key must be 32 bytes"))?;

    let sealed = PublicKey::from(key)
        .seal(&mut OsRng, plaintext.as_bytes())
        .map_err(|_| ApiError::permanent("failed to encrypt secret value"))?;
    Ok(STANDARD.encode(sealed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_box::SecretKey;
    use pipeline::ErrorKind;

    #[test]
    fn sealed_value_opens_with_the_matching_key() {
        let secret_key = SecretKey::generate(&mut OsRng);
        let public = STANDARD.encode(secret_key.public_key().as_bytes());

        let sealed = seal_secret(&public, "hunter2").unwrap();
        let opened = secret_key.unseal(&STANDARD.decode(sealed).unwrap()).unwrap();
        assert_eq!(opened, b"hunter2");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert_eq!(seal_secret("%%%", "x").unwrap_err().kind, ErrorKind::PermanentApi);
        let short = STANDARD.encode([0u8; 16]);
        assert_eq!(seal_secret(&short, "x").unwrap_err().kind, ErrorKind::PermanentApi);
    }
}
