use crate::config::Config;
use crate::storage::{AUDIO_DIR, StorageManager};
use crate::token::{FilenameExtractor, TokenSigner};
use anyhow::{Context, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const STREAM_PATH: &str = "/api/stream-audio";

async fn init_workspace(workspace: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace.join(AUDIO_DIR)).await
}

#[derive(Clone)]
pub struct AppState {
    pub signer: Arc<TokenSigner>,
    pub storage_manager: Arc<StorageManager>,
    pub extractor: Arc<FilenameExtractor>,
    pub public_url: String,
}

impl AppState {
    pub async fn new(config: &Config, storage_manager: StorageManager) -> anyhow::Result<Self> {
        if !storage_manager.is_remote() {
            init_workspace(Path::new(&config.workspace))
                .await
                .with_context(|| format!("create workspace {}", config.workspace))?;
        }

        let secret = config
            .token_secret
            .as_deref()
            .ok_or_else(|| anyhow!("Token secret is required"))?;
        let signer = TokenSigner::new(secret)?;
        let extractor = FilenameExtractor::new(&config.bucket_marker)?;

        info!(
            bucket_marker = %config.bucket_marker,
            remote = storage_manager.is_remote(),
            "App state initialized"
        );

        Ok(Self {
            signer: Arc::new(signer),
            storage_manager: Arc::new(storage_manager),
            extractor: Arc::new(extractor),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL a client uses to stream the audio behind `token`
    pub fn streaming_url(&self, token: &str) -> String {
        format!("{}{STREAM_PATH}?token={token}", self.public_url)
    }
}
