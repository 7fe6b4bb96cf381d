use rsa::pkcs8::DecodePublicKey;
use rsa::{pkcs1v15::VerifyingKey, signature::Verifier, RsaPublicKey};
use sha2::Sha256;
use tracing::warn;

/// Strips any byte outside the base64 alphabet, then requires the remaining
/// length to be a multiple of 4. Logs what it strips; never panics.
fn clean_base64(input: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' {
            cleaned.push(c);
        } else {
            warn!(char = %c, "filtered invalid base64 character");
        }
    }
    if cleaned.len() % 4 != 0 {
        warn!(len = cleaned.len(), "invalid base64 length, must be multiple of 4");
        return None;
    }
    Some(cleaned)
}

fn decode_signature(signature_b64: &str) -> Option<Vec<u8>> {
    let cleaned = clean_base64(signature_b64)?;
    match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &cleaned) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(error = %e, "failed to decode base64 signature");
            None
        }
    }
}

fn decode_hex_pem(public_key_hex: &str) -> Option<Vec<u8>> {
    match hex::decode(public_key_hex) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(error = %e, "failed to decode hex public key");
            None
        }
    }
}

/// Verifies an RSA-PKCS1v1.5/SHA-256 signature over `body`. Any decoding,
/// parsing, or verification failure returns `false` with a diagnostic log line
/// rather than propagating an error — the caller only needs the boolean.
pub fn verify(body: &[u8], signature_b64: &str, public_key_hex: &str) -> bool {
    let Some(sig_bytes) = decode_signature(signature_b64) else {
        return false;
    };
    let Some(key_pem_bytes) = decode_hex_pem(public_key_hex) else {
        return false;
    };
    let Ok(key_pem) = std::str::from_utf8(&key_pem_bytes) else {
        warn!("decoded public key is not valid UTF-8 PEM");
        return false;
    };
    let Ok(public_key) = RsaPublicKey::from_public_key_pem(key_pem) else {
        warn!("failed to parse public key");
        return false;
    };
    let Ok(signature) = rsa::pkcs1v15::Signature::try_from(sig_bytes.as_slice()) else {
        warn!("malformed signature bytes");
        return false;
    };

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    match verifying_key.verify(body, &signature) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "signature verification failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;

    fn make_keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn verifies_a_genuine_signature() {
        let (private, public) = make_keypair();
        let body = b"hello scheduler";
        let signing_key = SigningKey::<Sha256>::new(private);
        let signature = signing_key.sign(body);
        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());
        let pem = public.to_public_key_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let key_hex = hex::encode(pem.as_bytes());

        assert!(verify(body, &sig_b64, &key_hex));
        assert!(!verify(b"tampered body", &sig_b64, &key_hex));
    }

    #[test]
    fn rejects_non_multiple_of_four_base64() {
        assert!(clean_base64("abc").is_none());
    }

    #[test]
    fn strips_invalid_characters_before_length_check() {
        // "AB==" with an injected invalid char still cleans to a valid quartet.
        let cleaned = clean_base64("A!B==").unwrap();
        assert_eq!(cleaned, "AB==");
    }

    #[test]
    fn rejects_garbage_public_key() {
        assert!(!verify(b"body", "AAAA", &hex::encode("not a pem")));
    }
}
