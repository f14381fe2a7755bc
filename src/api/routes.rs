use crate::AppState;
use crate::token::{CreateTokenRequest, CreateTokenResponse, TOKEN_TTL_SECS, is_valid_object_key};
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::io::Error as IoError;
use tracing::{debug, error, info, warn};

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";
const AUDIO_CACHE_CONTROL: &str = "private, max-age=3600";
const STREAM_CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub token: Option<String>,
}

/// Byte range selected by a `Range` request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Mint a streaming token for an audio file in the storage bucket
pub async fn create_token(
    Extension(state): Extension<AppState>,
    request: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            warn!(%rejection, "Invalid token request body");
            return err_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let Some(audio_url) = request.audio_url.filter(|url| !url.is_empty()) else {
        return err_response(StatusCode::BAD_REQUEST, "audioUrl is required");
    };

    let Some(filename) = state.extractor.extract(&audio_url) else {
        warn!(%audio_url, "No filename in audio URL");
        return err_response(StatusCode::BAD_REQUEST, "Invalid audio URL");
    };

    let resource_id = request.resource_id.as_deref();
    let user_id = request.user_id.as_deref();
    match state.signer.mint(&filename, resource_id, user_id) {
        Ok(token) => {
            info!(%filename, ?resource_id, ?user_id, "Audio token created");
            let response = CreateTokenResponse {
                streaming_url: state.streaming_url(&token),
                token,
                expires_in: TOKEN_TTL_SECS,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(error) => {
            error!(?error, %filename, "Failed to create audio token");
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
        }
    }
}

/// Stream the audio file named by a valid token
pub async fn stream_audio(
    Extension(state): Extension<AppState>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = params.token.filter(|token| !token.is_empty()) else {
        return err_response(StatusCode::BAD_REQUEST, "Token is required");
    };

    let payload = match state.signer.verify(&token) {
        Ok(payload) => payload,
        Err(reason) => {
            // The reason stays in the logs, clients get one message for every failure
            warn!(%reason, "Rejected audio token");
            return err_response(reason.status_code(), "Invalid or expired token");
        }
    };

    let filename = payload.filename;
    if !is_valid_object_key(&filename) {
        warn!(%filename, "Rejected audio token for unsafe filename");
        return err_response(StatusCode::FORBIDDEN, "Invalid or expired token");
    }

    debug!(
        %filename,
        resource_id = ?payload.resource_id,
        user_id = ?payload.user_id,
        "Audio token accepted"
    );

    let size = match state.storage_manager.stat(&filename).await {
        Ok(Some(size)) => size,
        Ok(None) => {
            warn!(%filename, "Audio file not found");
            return err_response(StatusCode::NOT_FOUND, "Audio file not found");
        }
        Err(error) => {
            error!(%filename, ?error, "Failed to stat audio file");
            return err_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load audio file",
            );
        }
    };

    let (status, start, end) = match parse_range(&headers, size) {
        ByteRange::Unsatisfiable => return range_not_satisfiable(size),
        _ if size == 0 => return audio_response(StatusCode::OK, Body::empty(), 0, None),
        ByteRange::Full => (StatusCode::OK, 0, size - 1),
        ByteRange::Partial { start, end } => (StatusCode::PARTIAL_CONTENT, start, end),
    };

    let data = match state.storage_manager.read_range(&filename, start..=end).await {
        Ok(data) => data,
        Err(error) => {
            error!(%filename, ?error, "Failed to read audio file");
            return err_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load audio file",
            );
        }
    };

    debug!(%filename, start, end, size, "Serving audio object");
    let len = end - start + 1;
    let content_range = (status == StatusCode::PARTIAL_CONTENT).then_some((start, end, size));
    audio_response(status, Body::from_stream(chunked(data)), len, content_range)
}

fn chunked(data: Bytes) -> impl futures::Stream<Item = Result<Bytes, IoError>> + Send {
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(STREAM_CHUNK_SIZE)
        .map(|offset| data.slice(offset..(offset + STREAM_CHUNK_SIZE).min(data.len())))
        .collect();

    futures::stream::iter(chunks.into_iter().map(Ok::<Bytes, IoError>))
}

fn audio_response(
    status: StatusCode,
    body: Body,
    len: u64,
    content_range: Option<(u64, u64, u64)>,
) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(AUDIO_CONTENT_TYPE),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(AUDIO_CACHE_CONTROL),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some((start, end, size)) = content_range
        && let Ok(value) = HeaderValue::try_from(format!("bytes {start}-{end}/{size}"))
    {
        headers.insert(header::CONTENT_RANGE, value);
    }

    (status, headers, body).into_response()
}

fn range_not_satisfiable(size: u64) -> Response {
    let mut response = err_response(StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable");
    if let Ok(value) = HeaderValue::try_from(format!("bytes */{size}")) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

/// Interpret a single `bytes=` range against an object of `size` bytes.
/// Malformed or multi-part ranges fall back to the full object.
fn parse_range(headers: &HeaderMap, size: u64) -> ByteRange {
    let Some(spec) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().strip_prefix("bytes="))
    else {
        return ByteRange::Full;
    };

    if spec.contains(',') {
        return ByteRange::Full;
    }

    let Some((first, last)) = spec.split_once('-') else {
        return ByteRange::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    // Suffix range: the final `last` bytes
    if first.is_empty() {
        return match last.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if size == 0 => ByteRange::Unsatisfiable,
            Ok(suffix) => ByteRange::Partial {
                start: size.saturating_sub(suffix),
                end: size - 1,
            },
            Err(_) => ByteRange::Full,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return ByteRange::Full,
        }
    };

    if start >= size {
        return ByteRange::Unsatisfiable;
    }

    ByteRange::Partial {
        start,
        end: end.unwrap_or(size - 1).min(size - 1),
    }
}

pub(crate) fn err_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
