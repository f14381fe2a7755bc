use crate::storage::{StorageBackend, StorageConfig};
use crate::token::DEFAULT_BUCKET_MARKER;
use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure that can be loaded from CLI, config file, or environment
///
/// Example configuration file content
/// # Story Audio Configuration
///
/// # Server configuration
/// listen_on_port = 3000
/// public_url = "https://stories.example.com"
///
/// # Token configuration
/// token_secret = "change-me"       # or TOKEN_SECRET in the environment
/// bucket_marker = "audio-files"
///
/// # Storage configuration
/// storage_backend = "s3"  # Options: "local" or "s3"
/// workspace = "./data"    # Root directory for "local"
///
/// # S3 configuration (required when storage_backend = "s3")
/// s3_bucket = "audio-files"
/// s3_endpoint = "https://project.supabase.co/storage/v1/s3"
/// s3_region = "eu-central-1"
/// s3_access_key_id = "..."
/// s3_secret_access_key = "..."
#[derive(Clone, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Secret used to sign audio tokens
    #[arg(long, env = "TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Public base URL used to build streaming URLs (empty = relative)
    #[arg(long, default_value = "")]
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Storage path segment preceding the filename in audio URLs
    #[arg(long, default_value = DEFAULT_BUCKET_MARKER)]
    #[serde(default = "default_bucket_marker")]
    pub bucket_marker: String,

    /// Working directory for local file storage
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Configuration file path (overrides all other arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Storage backend: local or s3
    #[arg(short, long, default_value = "local")]
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// S3 bucket name (required when storage-backend is s3)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 endpoint (for Supabase/MinIO/custom S3)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region
    #[arg(long)]
    pub s3_region: Option<String>,

    /// S3 access key ID
    #[arg(long)]
    pub s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long)]
    pub s3_secret_access_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_on_port", &self.listen_on_port)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("public_url", &self.public_url)
            .field("bucket_marker", &self.bucket_marker)
            .field("workspace", &self.workspace)
            .field("config", &self.config)
            .field("storage_backend", &self.storage_backend)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_region", &self.s3_region)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            token_secret: None,
            public_url: default_public_url(),
            bucket_marker: default_bucket_marker(),
            workspace: default_workspace(),
            config: None,
            storage_backend: default_storage_backend(),
            s3_bucket: None,
            s3_endpoint: None,
            s3_region: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        // First parse CLI args
        let mut config = Config::parse();

        // If a config file is specified, load it and merge
        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.public_url == default_public_url() {
            self.public_url = file_config.public_url;
        }
        if self.bucket_marker == default_bucket_marker() {
            self.bucket_marker = file_config.bucket_marker;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.storage_backend == default_storage_backend() {
            self.storage_backend = file_config.storage_backend;
        }

        // For Option fields, CLI takes precedence if Some
        if self.token_secret.is_none() {
            self.token_secret = file_config.token_secret;
        }
        if self.s3_bucket.is_none() {
            self.s3_bucket = file_config.s3_bucket;
        }
        if self.s3_endpoint.is_none() {
            self.s3_endpoint = file_config.s3_endpoint;
        }
        if self.s3_region.is_none() {
            self.s3_region = file_config.s3_region;
        }
        if self.s3_access_key_id.is_none() {
            self.s3_access_key_id = file_config.s3_access_key_id;
        }
        if self.s3_secret_access_key.is_none() {
            self.s3_secret_access_key = file_config.s3_secret_access_key;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // There is no fallback secret: an unconfigured server must not start
        if self
            .token_secret
            .as_ref()
            .map(|s| s.is_empty())
            .unwrap_or(true)
        {
            return Err(anyhow::anyhow!(
                "Token secret is required (set TOKEN_SECRET or --token-secret)"
            ));
        }

        if self.bucket_marker.is_empty() {
            return Err(anyhow::anyhow!("Bucket marker cannot be empty"));
        }

        // Validate storage configuration
        match self.storage_backend.as_str() {
            "local" => {
                // Local storage doesn't need additional validation
            }
            "s3" => {
                if self
                    .s3_bucket
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 bucket name is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_access_key_id
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 access key ID is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_secret_access_key
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 secret access key is required when backend is 's3'"
                    ));
                }
            }
            backend => {
                return Err(anyhow::anyhow!(
                    "Unsupported storage backend: {}. Use 'local' or 's3'",
                    backend
                ));
            }
        }

        if !self.public_url.is_empty()
            && !self.public_url.starts_with("http://")
            && !self.public_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "Public URL must start with http:// or https://"
            ));
        }

        Ok(())
    }

    /// Build the storage configuration for the selected backend
    pub fn to_storage_config(&self) -> Result<StorageConfig> {
        let backend = match self.storage_backend.as_str() {
            "local" => StorageBackend::Local,
            "s3" => {
                let s3_config = self.to_s3_config().ok_or_else(|| {
                    anyhow::anyhow!("S3 configuration is required when using S3 backend")
                })?;
                StorageBackend::S3 {
                    bucket: s3_config.bucket,
                    endpoint: s3_config.endpoint,
                    region: s3_config.region,
                    access_key_id: s3_config.access_key_id,
                    secret_access_key: s3_config.secret_access_key,
                }
            }
            backend => {
                return Err(anyhow::anyhow!(
                    "Unsupported storage backend: {}. Use 'local' or 's3'",
                    backend
                ));
            }
        };

        Ok(StorageConfig {
            backend,
            workspace: PathBuf::from(&self.workspace),
        })
    }

    /// Convert to S3 storage backend configuration
    pub fn to_s3_config(&self) -> Option<S3Config> {
        if self.storage_backend != "s3" {
            return None;
        }

        Some(S3Config {
            bucket: self.s3_bucket.clone()?,
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key_id: self.s3_access_key_id.clone()?,
            secret_access_key: self.s3_secret_access_key.clone()?,
        })
    }
}

// S3 configuration subset
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

// Default value functions
fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    String::new()
}

fn default_bucket_marker() -> String {
    DEFAULT_BUCKET_MARKER.to_string()
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}
