//! XML signing capability.
//!
//! The engine treats signing as opaque: bytes in, signed bytes out. The
//! production adapter shells out to an external XAdES-BES signer so that the
//! PKCS#12 handling stays outside this process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use einvoice_fiscal::DocumentType;

/// Environment variable the password is passed through; never argv.
pub const PASSWORD_ENV: &str = "EINVOICE_SIGNER_PASSWORD";

/// Certificate location plus the password that unlocks it.
#[derive(Clone)]
pub struct SigningCredential {
    pub certificate_path: PathBuf,
    pub password: String,
}

impl SigningCredential {
    pub fn new(certificate_path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("certificate_path", &self.certificate_path)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("certificate not found: {0}")]
    CertificateNotFound(PathBuf),
    #[error("certificate password rejected")]
    BadPassword,
    #[error("signing failed: {0}")]
    Failed(String),
    #[error("signer i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait DocumentSigner: Send + Sync {
    async fn sign_invoice(
        &self,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError>;

    async fn sign_credit_note(
        &self,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError>;
}

/// Runs an external program: unsigned XML on stdin, signed XML on stdout.
///
/// The program receives `--document-type <01|04> --cert <path>` after the
/// configured arguments and reads the password from [`PASSWORD_ENV`].
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSigner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn run(
        &self,
        document_type: DocumentType,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError> {
        ensure_certificate(&credential.certificate_path).await?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--document-type")
            .arg(document_type.code())
            .arg("--cert")
            .arg(&credential.certificate_path)
            .env(PASSWORD_ENV, &credential.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SignError::Failed("signer stdin was not captured".into()))?;
        let feed = async move {
            stdin.write_all(xml).await?;
            stdin.shutdown().await
        };
        // Output is drained while the input is still being written.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let lowered = stderr.to_lowercase();
            if lowered.contains("password") || lowered.contains("mac check failed") {
                return Err(SignError::BadPassword);
            }
            return Err(SignError::Failed(format!(
                "signer exited with {}: {stderr}",
                output.status
            )));
        }
        fed?;
        if output.stdout.is_empty() {
            return Err(SignError::Failed("signer produced no output".into()));
        }

        debug!(
            document_type = %document_type,
            bytes = output.stdout.len(),
            "document signed"
        );
        Ok(output.stdout)
    }
}

#[async_trait]
impl DocumentSigner for CommandSigner {
    async fn sign_invoice(
        &self,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError> {
        self.run(DocumentType::Invoice, xml, credential).await
    }

    async fn sign_credit_note(
        &self,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError> {
        self.run(DocumentType::CreditNote, xml, credential).await
    }
}

async fn ensure_certificate(path: &Path) -> Result<(), SignError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(SignError::CertificateNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SignError::CertificateNotFound(path.to_path_buf()))
        }
        Err(e) => Err(SignError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let credential = SigningCredential::new("/certs/acme.p12", "hunter2");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("/certs/acme.p12"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn missing_certificate_is_reported_before_spawning() {
        let signer = CommandSigner::new("/definitely/not/a/signer", vec![]);
        let credential = SigningCredential::new("/definitely/not/a/cert.p12", "x");

        let err = signer
            .sign_invoice(b"<factura/>", &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::CertificateNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_is_the_signed_document() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.p12");
        std::fs::write(&cert, b"not really pkcs12").unwrap();

        // `sh -c cat x ...` ignores the trailing arguments and echoes stdin.
        let signer = CommandSigner::new("sh", vec!["-c".into(), "cat".into(), "signer".into()]);
        let credential = SigningCredential::new(&cert, "secret");

        let signed = signer
            .sign_credit_note(b"<notaCredito/>", &credential)
            .await
            .unwrap();
        assert_eq!(signed, b"<notaCredito/>");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_output_before_reading_input_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.p12");
        std::fs::write(&cert, b"x").unwrap();

        // Fills the stdout pipe before touching stdin.
        let signer = CommandSigner::new(
            "sh",
            vec![
                "-c".into(),
                "head -c 262144 /dev/zero; cat".into(),
                "signer".into(),
            ],
        );
        let credential = SigningCredential::new(&cert, "secret");
        let xml = vec![b'a'; 262_144];

        let signed = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            signer.sign_invoice(&xml, &credential),
        )
        .await
        .expect("signer pipes deadlocked")
        .unwrap();
        assert_eq!(signed.len(), 2 * 262_144);
        assert!(signed.ends_with(&xml));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn password_complaints_map_to_bad_password() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.p12");
        std::fs::write(&cert, b"x").unwrap();

        let signer = CommandSigner::new(
            "sh",
            vec![
                "-c".into(),
                "cat > /dev/null; echo 'invalid password' >&2; exit 3".into(),
                "signer".into(),
            ],
        );
        let credential = SigningCredential::new(&cert, "wrong");

        let err = signer
            .sign_invoice(b"<factura/>", &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, SignError::BadPassword));
    }
}
