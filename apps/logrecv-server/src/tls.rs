//! TLS acceptor setup.
//!
//! The certificate and key are read from PEM files. When either cannot be
//! loaded a self-signed certificate for the configured domain is generated so
//! the endpoint still comes up.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use rcgen::CertifiedKey;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{info, warn};

type CertifiedPair = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>);

/// Build the acceptor from the PEM files, or from a self-signed certificate
/// for `domain` when they are unusable.
pub fn acceptor(cert_path: &Path, key_path: &Path, domain: &str) -> Result<TlsAcceptor> {
    let (certs, key) = match load_pem(cert_path, key_path) {
        Ok(pair) => {
            info!(cert = %cert_path.display(), "loaded TLS certificate");
            pair
        }
        Err(err) => {
            warn!(
                error = format!("{err:#}"),
                domain, "cannot load TLS certificate, using a self-signed one"
            );
            self_signed(domain)?
        }
    };

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS certificate or key")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_pem(cert_path: &Path, key_path: &Path) -> Result<CertifiedPair> {
    let cert_file = File::open(cert_path)
        .with_context(|| format!("failed to open {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse {}", cert_path.display()))?;
    if certs.is_empty() {
        bail!("no certificate found in {}", cert_path.display());
    }

    let key_file =
        File::open(key_path).with_context(|| format!("failed to open {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .with_context(|| format!("failed to parse {}", key_path.display()))?
        .with_context(|| format!("no private key found in {}", key_path.display()))?;

    Ok((certs, key))
}

fn self_signed(domain: &str) -> Result<CertifiedPair> {
    let mut names = vec![domain.to_owned()];
    for name in ["localhost", "127.0.0.1", "::1"] {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_owned());
        }
    }

    let CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names)
        .context("failed to generate a self-signed certificate")?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    Ok((vec![cert.der().clone()], key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_fall_back_to_self_signed_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let result = acceptor(
            &dir.path().join("missing-cert.pem"),
            &dir.path().join("missing-key.pem"),
            "logs.example.com",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_should_fail_to_load_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_pem(&dir.path().join("cert.pem"), &dir.path().join("key.pem")).unwrap_err();
        assert!(format!("{err:#}").contains("cert.pem"));
    }

    #[test]
    fn test_should_load_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();

        let (certs, _key) = load_pem(&cert_path, &key_path).unwrap();
        assert_eq!(certs.len(), 1);
        assert!(acceptor(&cert_path, &key_path, "localhost").is_ok());
    }

    #[test]
    fn test_should_reject_pem_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let CertifiedKey { cert, .. } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(&key_path, "not a key").unwrap();

        let err = load_pem(&cert_path, &key_path).unwrap_err();
        assert!(format!("{err:#}").contains("no private key"));
    }
}
