use regex::Regex;
use std::sync::LazyLock;

/// Path segment of the storage bucket holding story audio
pub const DEFAULT_BUCKET_MARKER: &str = "audio-files";

static OBJECT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("object key pattern is valid"));

static DEFAULT_EXTRACTOR: LazyLock<FilenameExtractor> = LazyLock::new(FilenameExtractor::default);

/// Check that `key` is a single, flat, non-hidden object key safe to hand to storage
pub fn is_valid_object_key(key: &str) -> bool {
    OBJECT_KEY.is_match(key) && !key.starts_with('.') && !key.contains("..")
}

/// Extract the object key from a storage URL using the default bucket marker
pub fn extract_filename(storage_url: &str) -> Option<String> {
    DEFAULT_EXTRACTOR.extract(storage_url)
}

/// Turns public storage URLs (`.../<bucket>/<filename>?...`) into object keys
#[derive(Debug, Clone)]
pub struct FilenameExtractor {
    pattern: Regex,
}

impl FilenameExtractor {
    pub fn new(bucket_marker: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"/{}/([^/?#]+)", regex::escape(bucket_marker)))?;
        Ok(Self { pattern })
    }

    /// Returns `None` when the URL does not point into the bucket or the
    /// captured segment is not a valid object key.
    pub fn extract(&self, storage_url: &str) -> Option<String> {
        let captures = self.pattern.captures(storage_url)?;
        let filename = captures.get(1)?.as_str();

        is_valid_object_key(filename).then(|| filename.to_string())
    }
}

impl Default for FilenameExtractor {
    fn default() -> Self {
        Self {
            pattern: Regex::new(r"/audio-files/([^/?#]+)").expect("bucket pattern is valid"),
        }
    }
}
