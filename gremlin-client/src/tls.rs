//! TLS connector for `wss://` endpoints.

use crate::connection::TlsClientConfig;
use crate::error::ClientError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_tungstenite::Connector;

/// Builds the connector used for the WebSocket handshake.
///
/// Returns `None` when no custom TLS is configured, leaving `wss://` to the
/// default webpki roots.
pub fn create_connector(
    config: Option<&TlsClientConfig>,
) -> Result<Option<Connector>, ClientError> {
    let Some(config) = config.filter(|c| c.enabled) else {
        return Ok(None);
    };

    let client_config = if config.insecure {
        tracing::warn!("TLS certificate verification disabled");
        insecure_client_config()
    } else {
        client_config(config)?
    };

    Ok(Some(Connector::Rustls(Arc::new(client_config))))
}

fn client_config(config: &TlsClientConfig) -> Result<rustls::ClientConfig, ClientError> {
    let root_store = if let Some(ref ca_path) = config.ca_cert_path {
        let certs = load_certs(ca_path)?;
        let mut store = RootCertStore::empty();
        for cert in certs {
            store
                .add(cert)
                .map_err(|e| ClientError::TlsConfig(format!("invalid CA cert: {}", e)))?;
        }
        store
    } else {
        let mut store = RootCertStore::empty();
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        store
    };

    let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

    match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ClientError::TlsConfig(format!("invalid client cert/key: {}", e)))
        }
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(ClientError::TlsConfig(
            "client certificate and key must be given together".to_string(),
        )),
    }
}

/// Accepts any server certificate. Development only.
fn insecure_client_config() -> rustls::ClientConfig {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::UnixTime;
    use rustls::DigitallySignedStruct;

    #[derive(Debug)]
    struct AcceptAnyCert;

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _: &CertificateDer<'_>,
            _: &[CertificateDer<'_>],
            _: &ServerName<'_>,
            _: &[u8],
            _: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            use rustls::SignatureScheme::*;
            vec![
                RSA_PKCS1_SHA256,
                RSA_PKCS1_SHA384,
                RSA_PKCS1_SHA512,
                ECDSA_NISTP256_SHA256,
                ECDSA_NISTP384_SHA384,
                ECDSA_NISTP521_SHA512,
                RSA_PSS_SHA256,
                RSA_PSS_SHA384,
                RSA_PSS_SHA512,
                ED25519,
            ]
        }
    }

    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth()
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(ClientError::TlsConfig(format!(
            "no certificates found in {:?}",
            path
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open key file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ClientError::TlsConfig(format!("invalid key file {:?}: {}", path, e)))?
        .ok_or_else(|| ClientError::TlsConfig(format!("no private key found in {:?}", path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disabled_config_uses_default() {
        assert!(create_connector(None).unwrap().is_none());
        assert!(create_connector(Some(&TlsClientConfig::new()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_insecure_connector() {
        let config = TlsClientConfig::new().with_insecure();
        let connector = create_connector(Some(&config)).unwrap();
        assert!(matches!(connector, Some(Connector::Rustls(_))));
    }

    #[test]
    fn test_webpki_roots_connector() {
        let config = TlsClientConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(create_connector(Some(&config)).unwrap().is_some());
    }

    #[test]
    fn test_missing_ca_file() {
        let config = TlsClientConfig::new().with_ca_cert("/nonexistent/ca.pem");
        let err = create_connector(Some(&config)).err().unwrap();
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_half_configured_client_auth() {
        let config = TlsClientConfig {
            enabled: true,
            client_cert_path: Some("/nonexistent/cert.pem".into()),
            ..Default::default()
        };
        let err = create_connector(Some(&config)).err().unwrap();
        assert!(matches!(err, ClientError::TlsConfig(_)));
    }

    #[test]
    fn test_load_invalid_cert_path() {
        let result = load_certs(Path::new("/nonexistent/cert.pem"));
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_empty_cert_file() {
        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(b"not a pem file\n").unwrap();

        let result = load_certs(cert_file.path());
        assert!(result.unwrap_err().to_string().contains("no certificates"));
    }

    #[test]
    fn test_load_invalid_key_path() {
        let result = load_private_key(Path::new("/nonexistent/key.pem"));
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_key_file_without_key() {
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(b"not a valid key").unwrap();

        let result = load_private_key(key_file.path());
        assert!(result.unwrap_err().to_string().contains("no private key"));
    }
}
