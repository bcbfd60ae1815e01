//! Throwaway certificates and keys for tests.

use chrono::{Duration, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::{X509Builder, X509NameBuilder};

pub struct CredentialOptions {
    /// Goes into the subject as `serialNumber=CUIT <cuit>`; `None` omits it.
    pub cuit: Option<String>,
    /// Offsets from now, in days.
    pub not_before_days: i64,
    pub not_after_days: i64,
    /// Encrypts the key as PKCS#8 with this passphrase.
    pub passphrase: Option<String>,
}

impl Default for CredentialOptions {
    fn default() -> Self {
        CredentialOptions {
            cuit: Some("20123456786".to_string()),
            not_before_days: -1,
            not_after_days: 365,
            passphrase: None,
        }
    }
}

pub struct GeneratedCredentials {
    pub cert_pem: String,
    pub key_pem: String,
}

pub fn generate_credentials(options: &CredentialOptions) -> GeneratedCredentials {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "mostrador-test").unwrap();
    if let Some(cuit) = &options.cuit {
        name.append_entry_by_nid(Nid::SERIALNUMBER, &format!("CUIT {}", cuit))
            .unwrap();
    }
    let name = name.build();

    let now = Utc::now();
    let not_before = Asn1Time::from_unix((now + Duration::days(options.not_before_days)).timestamp()).unwrap();
    let not_after = Asn1Time::from_unix((now + Duration::days(options.not_after_days)).timestamp()).unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(rand::random::<u32>() >> 1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let key_pem = match &options.passphrase {
        Some(pass) => key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), pass.as_bytes())
            .unwrap(),
        None => key.private_key_to_pem_pkcs8().unwrap(),
    };

    GeneratedCredentials {
        cert_pem: String::from_utf8(cert.to_pem().unwrap()).unwrap(),
        key_pem: String::from_utf8(key_pem).unwrap(),
    }
}
