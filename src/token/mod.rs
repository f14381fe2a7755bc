pub mod create_request;
pub mod error;
pub mod filename;
pub mod payload;
pub mod signer;

// Re-export public types and functions
pub use create_request::{CreateTokenRequest, CreateTokenResponse};
pub use error::TokenError;
pub use filename::{DEFAULT_BUCKET_MARKER, FilenameExtractor, extract_filename, is_valid_object_key};
pub use payload::TokenPayload;
pub use signer::TokenSigner;

/// Lifetime of a minted token in milliseconds
pub const TOKEN_TTL_MS: u64 = 3_600_000;

/// Lifetime of a minted token in seconds, as reported to clients
pub const TOKEN_TTL_SECS: u64 = TOKEN_TTL_MS / 1000;
