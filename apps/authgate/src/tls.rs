use std::io;
use std::path::{Path, PathBuf};

pub const CERT_FILE_NAME: &str = "server.crt";
pub const KEY_FILE_NAME: &str = "server.key";

/// PEM-encoded certificate chain and private key.
pub struct CertificatePem {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

/// Source of the listener's TLS identity. `Ok(None)` means serve plain HTTP.
pub trait CertificateProvider {
    fn load(&self) -> io::Result<Option<CertificatePem>>;
}

/// Looks for `server.crt` and `server.key` in one directory.
pub struct CertDirProvider {
    dir: PathBuf,
}

impl CertDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE_NAME)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE_NAME)
    }
}

impl CertificateProvider for CertDirProvider {
    fn load(&self) -> io::Result<Option<CertificatePem>> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();
        if !cert_path.is_file() || !key_path.is_file() {
            return Ok(None);
        }
        Ok(Some(CertificatePem {
            cert: std::fs::read(cert_path)?,
            key: std::fs::read(key_path)?,
        }))
    }
}
