//! Verifier: confirms a DSSE envelope or blob signature over an artifact
//! using a named asymmetric public key (ECDSA P-256/P-384 or RSA,
//! PSS-then-PKCS1v15).

use std::collections::HashMap;
use std::sync::Arc;

use contentnode_domain_hash::{hash, hash_equal, HashAlgorithm};
use contentnode_infra_ports::{KeyService, KeyServiceError};
use dashmap::DashMap;
use pkcs8::DecodePublicKey;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pss::Pss;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use signature::Verifier as _;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed signature bundle: {0}")]
    ParseError(String),
    #[error("unsupported signature algorithm: {0}")]
    AlgorithmUnsupported(String),
    #[error("signature did not verify")]
    SignatureInvalid,
    #[error("artifact digest does not match the verified download hash")]
    DigestMismatch,
    #[error("no DSSE subject digest matched the artifact")]
    NoMatchingSubject,
    #[error("failed to fetch verification key: {0}")]
    KeyFetchFailed(String),
}

impl From<KeyServiceError> for VerifyError {
    fn from(e: KeyServiceError) -> Self {
        VerifyError::KeyFetchFailed(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SignatureBundleDoc {
    dsse: Option<DsseEnvelope>,
    blob: Option<BlobSignature>,
}

#[derive(Debug, Deserialize)]
struct DsseEnvelope {
    #[serde(rename = "payloadType")]
    payload_type: String,
    payload: String,
    signatures: Vec<DsseSignature>,
}

#[derive(Debug, Deserialize)]
struct DsseSignature {
    sig: String,
}

#[derive(Debug, Deserialize)]
struct BlobSignature {
    digest_algorithm: Option<String>,
    digest: Option<String>,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct InTotoStatement {
    subject: Vec<InTotoSubject>,
}

#[derive(Debug, Deserialize)]
struct InTotoSubject {
    #[allow(dead_code)]
    name: Option<String>,
    digest: HashMap<String, String>,
}

enum CachedKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
    Rsa(rsa::RsaPublicKey),
}

/// Builds the DSSE Pre-Authentication Encoding for `(payload_type, payload)`.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload_type.len() + 32);
    out.extend_from_slice(b"DSSEv1");
    out.push(b' ');
    out.extend_from_slice(payload_type.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload_type.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out
}

fn parse_public_key(der: &[u8]) -> Result<CachedKey, VerifyError> {
    if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
        return Ok(CachedKey::EcdsaP256(key));
    }
    if let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(der) {
        return Ok(CachedKey::EcdsaP384(key));
    }
    if let Ok(key) = rsa::RsaPublicKey::from_public_key_der(der) {
        return Ok(CachedKey::Rsa(key));
    }
    Err(VerifyError::AlgorithmUnsupported(
        "key is neither a recognised EC nor RSA PKIX DER encoding".to_string(),
    ))
}

fn verify_raw(key: &CachedKey, message: &[u8], signature_bytes: &[u8]) -> Result<(), VerifyError> {
    match key {
        CachedKey::EcdsaP256(verifying_key) => {
            let sig = p256::ecdsa::Signature::from_der(signature_bytes)
                .map_err(|_| VerifyError::SignatureInvalid)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| VerifyError::SignatureInvalid)
        }
        CachedKey::EcdsaP384(verifying_key) => {
            let sig = p384::ecdsa::Signature::from_der(signature_bytes)
                .map_err(|_| VerifyError::SignatureInvalid)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| VerifyError::SignatureInvalid)
        }
        CachedKey::Rsa(public_key) => {
            let hashed = Sha256::digest(message);
            if public_key
                .verify(Pss::new::<Sha256>(), &hashed, signature_bytes)
                .is_ok()
            {
                return Ok(());
            }
            public_key
                .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature_bytes)
                .map_err(|_| VerifyError::SignatureInvalid)
        }
    }
}

/// Verifies DSSE/blob signature bundles over artifacts, caching fetched
/// public keys for the lifetime of the process.
pub struct Verifier<K: KeyService> {
    key_service: Arc<K>,
    key_cache: DashMap<String, Arc<CachedKey>>,
}

impl<K: KeyService> Verifier<K> {
    pub fn new(key_service: Arc<K>) -> Self {
        Self {
            key_service,
            key_cache: DashMap::new(),
        }
    }

    async fn resolve_key(
        &self,
        key_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<CachedKey>, VerifyError> {
        if let Some(cached) = self.key_cache.get(key_name) {
            return Ok(cached.clone());
        }
        let der = self
            .key_service
            .fetch_public_key_der(key_name, cancel)
            .await?;
        let parsed = Arc::new(parse_public_key(&der)?);
        let entry = self
            .key_cache
            .entry(key_name.to_string())
            .or_insert_with(|| parsed);
        Ok(entry.clone())
    }

    /// Verifies `signature_bundle_bytes` over `artifact` using the public
    /// key named `key_name`.
    pub async fn verify(
        &self,
        key_name: &str,
        artifact: &[u8],
        signature_bundle_bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), VerifyError> {
        let bundle: SignatureBundleDoc = serde_json::from_slice(signature_bundle_bytes)
            .map_err(|e| VerifyError::ParseError(e.to_string()))?;
        let key = self.resolve_key(key_name, cancel).await?;

        if let Some(dsse) = bundle.dsse {
            return self.verify_dsse(&key, artifact, dsse);
        }
        if let Some(blob) = bundle.blob {
            return self.verify_blob(&key, artifact, blob);
        }
        Err(VerifyError::ParseError(
            "bundle carries neither a dsse envelope nor a blob signature".to_string(),
        ))
    }

    fn verify_dsse(
        &self,
        key: &CachedKey,
        artifact: &[u8],
        dsse: DsseEnvelope,
    ) -> Result<(), VerifyError> {
        let payload = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &dsse.payload)
            .map_err(|e| VerifyError::ParseError(e.to_string()))?;
        let first_signature = dsse
            .signatures
            .first()
            .ok_or_else(|| VerifyError::ParseError("dsse envelope carries no signatures".to_string()))?;
        let sig_bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &first_signature.sig,
        )
        .map_err(|e| VerifyError::ParseError(e.to_string()))?;

        let message = pae(&dsse.payload_type, &payload);
        verify_raw(key, &message, &sig_bytes)?;

        let statement: InTotoStatement = serde_json::from_slice(&payload)
            .map_err(|e| VerifyError::ParseError(e.to_string()))?;
        let artifact_sha256 = hash(artifact, HashAlgorithm::Sha256);
        let matched = statement.subject.iter().any(|subject| {
            subject
                .digest
                .get("sha256")
                .map(|d| hash_equal(d, &artifact_sha256))
                .unwrap_or(false)
        });
        if !matched {
            return Err(VerifyError::NoMatchingSubject);
        }
        Ok(())
    }

    fn verify_blob(
        &self,
        key: &CachedKey,
        artifact: &[u8],
        blob: BlobSignature,
    ) -> Result<(), VerifyError> {
        let sig_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &blob.signature)
            .map_err(|e| VerifyError::ParseError(e.to_string()))?;
        verify_raw(key, artifact, &sig_bytes)?;

        if let Some(digest) = blob.digest.filter(|d| !d.is_empty()) {
            let algorithm_name = blob.digest_algorithm.as_deref().unwrap_or("sha256");
            let algorithm = HashAlgorithm::parse(algorithm_name)
                .ok_or_else(|| VerifyError::AlgorithmUnsupported(algorithm_name.to_string()))?;
            let actual = hash(artifact, algorithm);
            if !hash_equal(&actual, &digest) {
                return Err(VerifyError::DigestMismatch);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use p256::ecdsa::{signature::Signer, Signature, SigningKey};
    use pkcs8::EncodePublicKey;
    use rand_core::OsRng;

    struct StaticKeyService {
        der: Vec<u8>,
    }

    #[async_trait]
    impl KeyService for StaticKeyService {
        async fn fetch_public_key_der(
            &self,
            _key_name: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<u8>, KeyServiceError> {
            Ok(self.der.clone())
        }
    }

    #[test]
    fn pae_matches_spec_vector() {
        let encoded = pae("application/vnd.in-toto+json", b"{}");
        assert_eq!(
            encoded,
            b"DSSEv1 28 application/vnd.in-toto+json 2 {}".to_vec()
        );
    }

    #[tokio::test]
    async fn verifies_blob_signature_with_matching_digest() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        let der = verifying_key.to_public_key_der().unwrap().to_vec();

        let artifact = b"hello world";
        let signature: Signature = signing_key.sign(artifact);
        let digest = hash(artifact, HashAlgorithm::Sha256);

        let bundle = serde_json::json!({
            "blob": {
                "digest_algorithm": "sha256",
                "digest": digest,
                "signature": base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    signature.to_der().as_bytes(),
                ),
            }
        });

        let verifier = Verifier::new(Arc::new(StaticKeyService { der }));
        let cancel = CancellationToken::new();
        verifier
            .verify("content-key", artifact, bundle.to_string().as_bytes(), &cancel)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_blob_signature_from_wrong_key() {
        let signing_key = SigningKey::random(&mut OsRng);
        let other_key = SigningKey::random(&mut OsRng);
        let verifying_key = *other_key.verifying_key();
        let der = verifying_key.to_public_key_der().unwrap().to_vec();

        let artifact = b"hello world";
        let signature: Signature = signing_key.sign(artifact);

        let bundle = serde_json::json!({
            "blob": {
                "digest_algorithm": "sha256",
                "digest": "",
                "signature": base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    signature.to_der().as_bytes(),
                ),
            }
        });

        let verifier = Verifier::new(Arc::new(StaticKeyService { der }));
        let cancel = CancellationToken::new();
        let err = verifier
            .verify("content-key", artifact, bundle.to_string().as_bytes(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::SignatureInvalid));
    }

    #[tokio::test]
    async fn verifies_dsse_envelope_with_matching_subject() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        let der = verifying_key.to_public_key_der().unwrap().to_vec();

        let artifact = b"bundle contents";
        let artifact_digest = hash(artifact, HashAlgorithm::Sha256);
        let payload = serde_json::json!({
            "subject": [{ "name": "bundle.tar.gz", "digest": { "sha256": artifact_digest } }]
        })
        .to_string();
        let payload_type = "application/vnd.in-toto+json";
        let message = pae(payload_type, payload.as_bytes());
        let signature: Signature = signing_key.sign(&message);

        let bundle = serde_json::json!({
            "dsse": {
                "payloadType": payload_type,
                "payload": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, payload.as_bytes()),
                "signatures": [{
                    "sig": base64::Engine::encode(
                        &base64::engine::general_purpose::STANDARD,
                        signature.to_der().as_bytes(),
                    ),
                }],
            }
        });

        let verifier = Verifier::new(Arc::new(StaticKeyService { der }));
        let cancel = CancellationToken::new();
        verifier
            .verify("content-key", artifact, bundle.to_string().as_bytes(), &cancel)
            .await
            .unwrap();
    }
}
