//! Output directory for generated documents.
//!
//! Each user has exactly one artifact, `Terms_<user>.pdf`, replaced every
//! time a new document is generated.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::profile::store::write_atomic;
use crate::profile::UserId;

/// File name of the terms document generated for `user`.
///
/// ASCII letters, digits and `-` are kept. Every other byte, `_` included,
/// becomes `_XX` in hex, so distinct ids never share a file.
pub fn document_file_name(user: &UserId) -> String {
    let mut safe = String::with_capacity(user.as_str().len());
    for byte in user.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            safe.push(char::from(byte));
        } else {
            safe.push_str(&format!("_{byte:02X}"));
        }
    }
    format!("Terms_{safe}.pdf")
}

/// Directory that receives generated documents.
pub struct ArtifactDir {
    base_path: PathBuf,
}

impl ArtifactDir {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ensure the output directory exists.
    pub async fn ensure_dirs(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.base_path.display().to_string(),
                source,
            })
    }

    /// Write (overwrite) an artifact and return its path.
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.base_path.join(file_name);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_uses_user_id() {
        assert_eq!(document_file_name(&UserId::new("123456")), "Terms_123456.pdf");
        assert_eq!(document_file_name(&UserId::new("local-user")), "Terms_local-user.pdf");
    }

    #[test]
    fn file_name_escapes_path_characters() {
        assert_eq!(
            document_file_name(&UserId::new("../etc/x")),
            "Terms__2E_2E_2Fetc_2Fx.pdf"
        );
        assert_eq!(document_file_name(&UserId::new("राज")).len(), "Terms_.pdf".len() + 27);
    }

    #[test]
    fn file_names_do_not_collide() {
        let dotted = document_file_name(&UserId::new("a.b"));
        let underscored = document_file_name(&UserId::new("a_b"));
        assert_eq!(dotted, "Terms_a_2Eb.pdf");
        assert_eq!(underscored, "Terms_a_5Fb.pdf");
        assert_ne!(dotted, underscored);
        assert_ne!(document_file_name(&UserId::new("a/b")), dotted);
    }

    #[tokio::test]
    async fn write_overwrites_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactDir::new(dir.path().join("generated"));
        artifacts.ensure_dirs().await.unwrap();

        let first = artifacts.write("Terms_u1.pdf", b"first").await.unwrap();
        let second = artifacts.write("Terms_u1.pdf", b"second").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
        let entries = std::fs::read_dir(artifacts.base_path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
