use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use crate::error::ScanError;

/// Something that can produce a photograph of a medication box as raw
/// bytes. The CLI reads from disk; a device build would put the camera
/// behind the same trait.
#[async_trait]
pub trait CaptureSource {
    async fn capture(&self) -> Result<Vec<u8>, ScanError>;
}

/// Capture source backed by an image file on disk.
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureSource for FileCapture {
    async fn capture(&self) -> Result<Vec<u8>, ScanError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ScanError::Capture(format!("{}: {e}", self.path.display())))?;

        if bytes.is_empty() {
            return Err(ScanError::Capture(format!(
                "{}: file is empty",
                self.path.display()
            )));
        }

        info!(path = %self.path.display(), bytes = bytes.len(), "Image captured");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_reads_file_bytes() {
        let path = std::env::temp_dir().join(format!("medscan-capture-{}.jpg", std::process::id()));
        std::fs::write(&path, b"fake jpeg bytes").unwrap();

        let bytes = FileCapture::new(&path).capture().await.unwrap();
        assert_eq!(bytes, b"fake jpeg bytes");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_a_capture_failure() {
        let err = FileCapture::new("/no/such/box.jpg").capture().await.unwrap_err();
        assert!(matches!(err, ScanError::Capture(_)));
    }
}
