//! # CMS Signing
//!
//! WSAA accepts the login ticket request as a PKCS#7 `SignedData` with the
//! content embedded (not detached), DER encoded and then base64 encoded.
//! Equivalent to:
//!
//! ```text
//! openssl smime -sign -signer cert.pem -inkey key.pem -outform DER -nodetach -binary
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::X509;

use crate::error::AfipResult;

/// Certificate and private key loaded for signing.
///
/// Deliberately not `Debug`: it holds key material.
pub struct SigningCredentials {
    cert: X509,
    key: PKey<Private>,
}

impl SigningCredentials {
    /// Parses a certificate and a private key in any PEM encoding OpenSSL
    /// reads (PKCS#8, PKCS#1, SEC1 EC, DSA, encrypted PKCS#8).
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], passphrase: Option<&str>) -> AfipResult<Self> {
        let cert = X509::from_pem(cert_pem)?;
        let key = match passphrase {
            Some(pass) => PKey::private_key_from_pem_passphrase(key_pem, pass.as_bytes())?,
            // Empty passphrase instead of OpenSSL's terminal prompt
            None => PKey::private_key_from_pem_callback(key_pem, |_| Ok(0))?,
        };
        Ok(SigningCredentials { cert, key })
    }

    /// True when the key is the certificate's private half.
    pub fn key_matches(&self) -> AfipResult<bool> {
        let public = self.cert.public_key()?;
        Ok(public.public_eq(&self.key))
    }

    /// DER-encoded attached `SignedData` over `content`.
    pub fn sign(&self, content: &[u8]) -> AfipResult<Vec<u8>> {
        let extra_certs = Stack::new()?;
        let pkcs7 = Pkcs7::sign(&self.cert, &self.key, &extra_certs, content, Pkcs7Flags::BINARY)?;
        Ok(pkcs7.to_der()?)
    }

    /// Base64 of [`sign`](Self::sign), as sent in `loginCms/in0`.
    pub fn sign_base64(&self, content: &str) -> AfipResult<String> {
        Ok(BASE64.encode(self.sign(content.as_bytes())?))
    }
}
