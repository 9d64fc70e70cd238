use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The size of a session identifier in bytes (256 bits).
pub const SESSION_ID_SIZE: usize = 32;
/// The size of an HMAC-SHA256 tag in bytes.
const TAG_SIZE: usize = 32;
/// Separates the identifier from its tag in a signed token.
const SEPARATOR: char = '.';

/// Generates session identifiers and signs/verifies the cookie form of them.
///
/// A signed token is `base64url(id) + "." + base64url(HMAC-SHA256(id))`.
/// The identifier half, still base64url-encoded, is the session store key.
#[derive(Clone)]
pub struct TokenCodec {
    key: Zeroizing<Vec<u8>>,
}

impl TokenCodec {
    /// Creates a codec keyed with `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: Zeroizing::new(secret.to_vec()),
        }
    }

    /// Generates a new random session identifier.
    ///
    /// # Returns
    ///
    /// A URL-safe base64 identifier carrying 256 bits of OS entropy. Fails
    /// only if the OS entropy source does.
    pub fn generate(&self) -> Result<String> {
        let mut id = [0u8; SESSION_ID_SIZE];
        OsRng
            .try_fill_bytes(&mut id)
            .map_err(|e| AppError::Internal(format!("Entropy source failure: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(id))
    }

    /// Signs `id`, producing the client-visible token.
    pub fn sign(&self, id: &str) -> String {
        let tag = self.mac(id).finalize().into_bytes();
        format!("{}{}{}", id, SEPARATOR, URL_SAFE_NO_PAD.encode(tag))
    }

    /// Verifies a signed token and returns its identifier.
    ///
    /// Runs entirely in memory; nothing here touches the store.
    ///
    /// # Errors
    ///
    /// [`AuthError::MalformedToken`] if the token does not have the expected
    /// shape, [`AuthError::InvalidSignature`] if the tag does not match.
    pub fn verify<'a>(&self, token: &'a str) -> std::result::Result<&'a str, AuthError> {
        let (id, tag) = token
            .split_once(SEPARATOR)
            .ok_or(AuthError::MalformedToken)?;

        let id_bytes = URL_SAFE_NO_PAD
            .decode(id)
            .map_err(|_| AuthError::MalformedToken)?;
        if id_bytes.len() != SESSION_ID_SIZE {
            return Err(AuthError::MalformedToken);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::MalformedToken)?;
        if provided.len() != TAG_SIZE {
            return Err(AuthError::MalformedToken);
        }

        let expected = self.mac(id).finalize().into_bytes();
        if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            Ok(id)
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn mac(&self, id: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(id.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&[7u8; 32])
    }

    #[test]
    fn generated_ids_are_unique_and_256_bits() {
        let codec = codec();
        let a = codec.generate().unwrap();
        let b = codec.generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), SESSION_ID_SIZE);
    }

    #[test]
    fn signed_token_verifies_to_its_id() {
        let codec = codec();
        for _ in 0..16 {
            let id = codec.generate().unwrap();
            let token = codec.sign(&id);
            assert_eq!(codec.verify(&token).unwrap(), id);
        }
    }

    #[test]
    fn any_single_bit_flip_is_rejected() {
        let codec = codec();
        let id = codec.generate().unwrap();
        let token = codec.sign(&id);
        let bytes = token.as_bytes();

        for i in 0..bytes.len() {
            for bit in 0..8 {
                let mut flipped = bytes.to_vec();
                flipped[i] ^= 1 << bit;
                let Ok(candidate) = String::from_utf8(flipped) else {
                    continue;
                };
                assert!(
                    codec.verify(&candidate).is_err(),
                    "flip of bit {} at byte {} was accepted",
                    bit,
                    i
                );
            }
        }
    }

    #[test]
    fn token_signed_with_another_key_is_rejected() {
        let other = TokenCodec::new(b"a completely different secret key!!");
        let id = codec().generate().unwrap();
        let token = other.sign(&id);
        assert_eq!(codec().verify(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let codec = codec();
        let id = codec.generate().unwrap();
        let trailing_dot = format!("{}.", id);
        for bad in ["", ".", "no-separator", id.as_str(), trailing_dot.as_str(), "abc.def"] {
            assert_eq!(codec.verify(bad), Err(AuthError::MalformedToken), "{bad:?}");
        }
    }
}
