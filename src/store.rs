// src/store.rs

use reqwest::Client;
use tracing::info;
use urlencoding::encode;
use uuid::Uuid;

use crate::config::StorageSection;
use crate::error::ScanError;

/// Environment variable holding the content-store service credential.
pub const STORE_KEY_ENV: &str = "MEDSCAN_STORE_KEY";

/// Client for the remote content store holding captured box photos.
///
/// Objects live in a single bucket and are addressed by a generated name;
/// the relay downloads them by that name instead of receiving megabytes of
/// base64 inline.
pub struct ObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl ObjectStore {
    pub fn new(storage: &StorageSection) -> Result<Self, ScanError> {
        let service_key = std::env::var(STORE_KEY_ENV)
            .map_err(|_| ScanError::MissingCredential(format!("{STORE_KEY_ENV} not set")))?;

        info!(url = %storage.base_url, bucket = %storage.bucket, "Using content store");

        Ok(Self {
            client: Client::new(),
            base_url: storage.base_url.trim_end_matches('/').to_string(),
            bucket: storage.bucket.clone(),
            service_key,
        })
    }

    /// Unique object name for one captured photo: random id, fixed extension.
    pub fn generate_object_name() -> String {
        format!("{}.jpg", Uuid::new_v4().simple())
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            encode(&self.bucket),
            encode(name)
        )
    }

    /// Upload image bytes under `name`. No retry — a failed upload surfaces
    /// to the user, who re-invokes capture.
    pub async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<(), ScanError> {
        let url = self.object_url(name);
        info!(url = %url, bytes = bytes.len(), "Uploading captured image");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", "image/jpeg")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Capture(format!(
                "upload rejected ({status}): {body}"
            )));
        }

        Ok(())
    }

    /// Fetch a previously uploaded object by name (the relay side of the
    /// stored-object handoff).
    pub async fn download(&self, name: &str) -> Result<Vec<u8>, ScanError> {
        let url = self.object_url(name);
        info!(url = %url, "Downloading stored image");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ScanError::Capture(format!(
                "failed to download image ({status})"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names_are_unique_jpgs() {
        let a = ObjectStore::generate_object_name();
        let b = ObjectStore::generate_object_name();
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), 32 + ".jpg".len());
    }

    #[test]
    fn test_object_url_escapes_names() {
        let store = ObjectStore {
            client: Client::new(),
            base_url: "https://store.example.com".to_string(),
            bucket: "boxes".to_string(),
            service_key: "test-key".to_string(),
        };
        assert_eq!(
            store.object_url("abc 123.jpg"),
            "https://store.example.com/storage/v1/object/boxes/abc%20123.jpg"
        );
    }
}
