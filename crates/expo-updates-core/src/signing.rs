//! RSA-SHA256 code signing of manifest and directive bodies.
//!
//! The signature covers the exact bytes placed in the multipart part, so
//! callers must sign the serialized string they transmit, never a
//! re-serialization of it.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use tracing::warn;

use crate::error::{Result, UpdatesError};

pub const KEY_ID: &str = "main";

/// Signs `payload` with RSASSA-PKCS1-v1_5 over SHA-256 and returns the
/// standard base64 signature.
pub fn sign(payload: &str, private_key_pem: &str) -> Result<String> {
    let key = parse_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(key);
    let signature = signing_key
        .try_sign(payload.as_bytes())
        .map_err(|err| UpdatesError::Signing(err.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|err| UpdatesError::Signing(format!("invalid private key: {err}")))
}

/// Reads the PEM private key. A missing path or file means signing is
/// unavailable.
pub async fn load_private_key(path: Option<&Path>) -> Result<Option<String>> {
    let Some(path) = path else {
        return Ok(None);
    };
    match tokio::fs::read_to_string(path).await {
        Ok(pem) => Ok(Some(pem)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "private key file not found");
            Ok(None)
        }
        Err(err) => Err(UpdatesError::Signing(format!(
            "failed to read private key {}: {err}",
            path.display()
        ))),
    }
}

/// Serializes `(key, value)` pairs as a structured-field dictionary of byte
/// sequences: `sig=:<b64>:, keyid=:main:`.
pub fn serialize_dictionary(items: &[(&str, &str)]) -> String {
    items
        .iter()
        .map(|(key, value)| format!("{key}=:{value}:"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `expo-signature` header value for a base64 signature.
pub fn signature_header(signature: &str) -> String {
    serialize_dictionary(&[("sig", signature), ("keyid", KEY_ID)])
}
