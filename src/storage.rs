use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use opendal::services::{Fs, S3};
use opendal::{ErrorKind, Operator, layers::RetryLayer};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory under the workspace holding the audio objects for local storage
pub const AUDIO_DIR: &str = "audio-files";

/// Storage configuration
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub workspace: PathBuf,
}

impl StorageConfig {
    /// Root of the local audio store, never the workspace itself
    pub fn audio_root(&self) -> PathBuf {
        self.workspace.join(AUDIO_DIR)
    }
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Local,
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: String,
        secret_access_key: String,
    },
}

/// Object storage holding the audio files, keyed by filename
#[derive(Clone)]
pub struct StorageManager {
    operator: Operator,
    config: StorageConfig,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let operator = match &config.backend {
            StorageBackend::Local => build_fs_operator(&config.audio_root())?,
            StorageBackend::S3 {
                bucket,
                endpoint,
                region,
                access_key_id,
                secret_access_key,
            } => build_s3_operator(
                bucket,
                endpoint.as_deref(),
                region.as_deref(),
                access_key_id,
                secret_access_key,
            )?,
        };

        Ok(Self { operator, config })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.config.backend, StorageBackend::S3 { .. })
    }

    /// Size of the object in bytes, `None` if it does not exist
    pub async fn stat(&self, key: &str) -> Result<Option<u64>> {
        match self.operator.stat(key).await {
            Ok(meta) => Ok(Some(meta.content_length())),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("stat {key}")),
        }
    }

    /// Read an inclusive byte range of the object
    pub async fn read_range(&self, key: &str, range: RangeInclusive<u64>) -> Result<Bytes> {
        let data = self
            .operator
            .read_with(key)
            .range(range)
            .await
            .with_context(|| format!("read {key}"))?;

        Ok(data.to_bytes())
    }

    pub async fn write(&self, key: &str, data: impl Into<Bytes>) -> Result<()> {
        self.operator
            .write(key, data.into())
            .await
            .with_context(|| format!("write {key}"))?;
        Ok(())
    }
}

fn build_fs_operator(root: &Path) -> Result<Operator> {
    info!(root = ?root, "Building filesystem operator");

    let mut builder = Fs::default();
    builder = builder.root(
        root.to_str()
            .ok_or_else(|| anyhow!("Invalid root path: {:?}", root))?,
    );

    Ok(Operator::new(builder)?
        .layer(RetryLayer::new().with_max_times(3))
        .finish())
}

fn build_s3_operator(
    bucket: &str,
    endpoint: Option<&str>,
    region: Option<&str>,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    info!(
        bucket = %bucket,
        endpoint = ?endpoint,
        region = ?region,
        "Building S3 operator"
    );

    let mut builder = S3::default();
    builder = builder.bucket(bucket);
    builder = builder.access_key_id(access_key_id);
    builder = builder.secret_access_key(secret_access_key);

    if let Some(region) = region {
        builder = builder.region(region);
    }

    if let Some(endpoint) = endpoint {
        builder = builder.endpoint(endpoint);
    }

    Ok(Operator::new(builder)?
        .layer(RetryLayer::new().with_max_times(3))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_manager() -> (StorageManager, PathBuf) {
        let workspace = std::env::temp_dir().join(format!(
            "story-audio-storage-{}-{}",
            std::process::id(),
            crate::token::signer::now_ms()
        ));
        std::fs::create_dir_all(workspace.join(AUDIO_DIR)).unwrap();

        let manager = StorageManager::new(StorageConfig {
            backend: StorageBackend::Local,
            workspace: workspace.clone(),
        })
        .unwrap();
        (manager, workspace)
    }

    #[tokio::test]
    async fn test_local_stat_and_read() {
        let (manager, workspace) = local_manager();
        assert!(!manager.is_remote());

        manager.write("a.mp3", b"0123456789".to_vec()).await.unwrap();
        assert_eq!(manager.stat("a.mp3").await.unwrap(), Some(10));
        assert_eq!(manager.stat("missing.mp3").await.unwrap(), None);

        let all = manager.read_range("a.mp3", 0..=9).await.unwrap();
        assert_eq!(&all[..], b"0123456789");

        let part = manager.read_range("a.mp3", 2..=4).await.unwrap();
        assert_eq!(&part[..], b"234");

        std::fs::remove_dir_all(workspace).ok();
    }

    #[tokio::test]
    async fn test_local_store_is_confined_to_audio_dir() {
        let (manager, workspace) = local_manager();
        std::fs::write(workspace.join("secrets.toml"), b"token_secret = \"x\"").unwrap();

        assert_eq!(manager.stat("secrets.toml").await.unwrap(), None);

        manager.write("b.mp3", b"abc".to_vec()).await.unwrap();
        assert!(workspace.join(AUDIO_DIR).join("b.mp3").exists());
        assert!(!workspace.join("b.mp3").exists());

        std::fs::remove_dir_all(workspace).ok();
    }
}
