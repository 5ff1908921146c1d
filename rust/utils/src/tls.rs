//! Self-signed serving certificates, generated in memory at process startup.
//!
//! Neither binary persists its certificate: every restart produces a fresh key pair.

use openssl::{
    asn1::{Asn1Integer, Asn1Time},
    bn::{BigNum, MsbOption},
    conf::{Conf, ConfMethod},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{
        extension::{
            BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
            SubjectKeyIdentifier,
        },
        X509Builder, X509NameBuilder, X509,
    },
};
use snafu::{ResultExt, Snafu};
use stackable_operator::time::Duration;
use time::OffsetDateTime;

/// Key size used by the binaries; tests use smaller keys to stay fast.
pub const DEFAULT_KEY_BITS: u32 = 4096;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to generate certificate key"))]
    GenerateKey { source: openssl::error::ErrorStack },

    #[snafu(display("failed to load OpenSSL configuration"))]
    LoadConf { source: openssl::error::ErrorStack },

    #[snafu(display("failed to build certificate for {hostname:?}"))]
    BuildCertificate {
        source: openssl::error::ErrorStack,
        hostname: String,
    },

    #[snafu(display("failed to serialize certificate"))]
    SerializeCertificate { source: openssl::error::ErrorStack },
}
type Result<T, E = Error> = std::result::Result<T, E>;

/// A certificate that is its own issuer, together with its private key.
pub struct SelfSignedCertificate {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl SelfSignedCertificate {
    /// Generates a ten-year server certificate for `hostname`, usable for both server and client auth.
    pub fn generate(hostname: &str, key_bits: u32) -> Result<Self> {
        let subject_name = X509NameBuilder::new()
            .and_then(|mut name| {
                name.append_entry_by_nid(Nid::COMMONNAME, hostname)?;
                Ok(name)
            })
            .with_context(|_| BuildCertificateSnafu { hostname })?
            .build();
        let now = OffsetDateTime::now_utc();
        let not_before = now - Duration::from_minutes_unchecked(5);
        let not_after = now + Duration::from_days_unchecked(10 * 365);
        let conf = Conf::new(ConfMethod::default()).context(LoadConfSnafu)?;
        let key = Rsa::generate(key_bits)
            .and_then(PKey::try_from)
            .context(GenerateKeySnafu)?;
        let cert = X509Builder::new()
            .and_then(|mut x509| {
                x509.set_subject_name(&subject_name)?;
                x509.set_issuer_name(&subject_name)?;
                x509.set_not_before(Asn1Time::from_unix(not_before.unix_timestamp())?.as_ref())?;
                x509.set_not_after(Asn1Time::from_unix(not_after.unix_timestamp())?.as_ref())?;
                x509.set_pubkey(&key)?;
                let mut serial = BigNum::new()?;
                serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
                x509.set_serial_number(Asn1Integer::from_bn(&serial)?.as_ref())?;
                x509.set_version(
                    3 - 1, // zero-indexed
                )?;
                let ctx = x509.x509v3_context(None, Some(&conf));
                let exts = [
                    BasicConstraints::new().critical().build()?,
                    SubjectKeyIdentifier::new().build(&ctx)?,
                    SubjectAlternativeName::new().dns(hostname).build(&ctx)?,
                    KeyUsage::new()
                        .critical()
                        .digital_signature()
                        .key_agreement()
                        .key_encipherment()
                        .data_encipherment()
                        .build()?,
                    ExtendedKeyUsage::new().server_auth().client_auth().build()?,
                ];
                for ext in exts {
                    x509.append_extension(ext)?;
                }
                x509.sign(&key, MessageDigest::sha256())?;
                Ok(x509)
            })
            .with_context(|_| BuildCertificateSnafu { hostname })?
            .build();
        Ok(Self { cert, key })
    }

    pub fn cert_pem(&self) -> Result<Vec<u8>> {
        self.cert.to_pem().context(SerializeCertificateSnafu)
    }

    pub fn key_pem(&self) -> Result<Vec<u8>> {
        self.key
            .private_key_to_pem_pkcs8()
            .context(SerializeCertificateSnafu)
    }
}
