use crate::token::filename::is_valid_object_key;
use crate::token::{TokenError, TokenPayload};
use anyhow::{Result, anyhow, bail};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = ':';

/// base64url without padding on output; padded input is accepted too
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Mints and verifies audio access tokens.
///
/// Token layout: `base64url(payload_json ":" hex(hmac_sha256(secret, payload_json)))`.
/// Tokens are stateless; nothing is recorded on issue and expiry is the
/// only way a token stops working.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Create a signer for `secret`. An empty secret is refused.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            bail!("Token secret must not be empty");
        }

        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|error| anyhow!("Invalid token secret: {error}"))?;
        Ok(Self { mac })
    }

    /// Mint a token for `filename` valid for one hour from now
    pub fn mint(
        &self,
        filename: &str,
        resource_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<String> {
        self.mint_at(now_ms(), filename, resource_id, user_id)
    }

    /// Mint a token as if issued at `issued_at_ms`
    pub fn mint_at(
        &self,
        issued_at_ms: u64,
        filename: &str,
        resource_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<String> {
        if !is_valid_object_key(filename) {
            bail!("Refusing to mint token for unsafe filename {filename:?}");
        }

        let payload = TokenPayload::new(filename, resource_id, user_id, issued_at_ms);
        let mut token_bytes = payload.serialize_to_bytes()?;
        let signature = self.signature(&token_bytes);

        token_bytes.push(SEPARATOR as u8);
        token_bytes.extend_from_slice(signature.as_bytes());

        Ok(TOKEN_ENGINE.encode(token_bytes))
    }

    /// Verify a token against the current time
    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify_at(token, now_ms())
    }

    /// Verify a token as of `now_ms`
    pub fn verify_at(&self, token: &str, now_ms: u64) -> Result<TokenPayload, TokenError> {
        let token_bytes = TOKEN_ENGINE
            .decode(token)
            .map_err(|_| TokenError::InvalidFormat)?;
        let token_str = std::str::from_utf8(&token_bytes).map_err(|_| TokenError::InvalidFormat)?;

        // The JSON payload contains ':' itself, the hex signature never does
        let (payload_str, signature) = token_str
            .rsplit_once(SEPARATOR)
            .ok_or(TokenError::InvalidFormat)?;
        if payload_str.is_empty() || signature.is_empty() {
            return Err(TokenError::InvalidFormat);
        }

        let expected = self.signature(payload_str.as_bytes());
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(TokenError::InvalidSignature);
        }

        let payload = TokenPayload::deserialize_from_bytes(payload_str.as_bytes())?;
        if payload.is_expired_at(now_ms) {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }

    /// Lowercase hex HMAC-SHA256 of `data`
    fn signature(&self, data: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TOKEN_TTL_MS;

    const SECRET: &str = "test-secret";
    const T: u64 = 1_760_000_000_000;

    fn signer() -> TokenSigner {
        TokenSigner::new(SECRET).unwrap()
    }

    fn decode(token: &str) -> String {
        String::from_utf8(TOKEN_ENGINE.decode(token).unwrap()).unwrap()
    }

    fn encode(raw: &str) -> String {
        TOKEN_ENGINE.encode(raw.as_bytes())
    }

    #[test]
    fn test_empty_secret_is_refused() {
        assert!(TokenSigner::new("").is_err());
        assert!(TokenSigner::new(Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", signer());
        assert!(!debug.contains(SECRET));
    }

    #[test]
    fn test_round_trip() {
        let signer = signer();
        let token = signer
            .mint_at(T, "story-42.mp3", Some("r1"), Some("u9"))
            .unwrap();

        let payload = signer.verify_at(&token, T).unwrap();
        assert_eq!(payload.filename, "story-42.mp3");
        assert_eq!(payload.resource_id.as_deref(), Some("r1"));
        assert_eq!(payload.user_id.as_deref(), Some("u9"));
        assert_eq!(payload.expires_at, T + TOKEN_TTL_MS);

        let token = signer.mint_at(T, "plain.mp3", None, None).unwrap();
        let payload = signer.verify_at(&token, T).unwrap();
        assert_eq!(payload.filename, "plain.mp3");
        assert_eq!(payload.resource_id, None);
        assert_eq!(payload.user_id, None);
    }

    #[test]
    fn test_mint_uses_wall_clock() {
        let signer = signer();
        let before = now_ms();
        let token = signer.mint("clock.mp3", None, None).unwrap();
        let payload = signer.verify(&token).unwrap();

        assert!(payload.expires_at >= before + TOKEN_TTL_MS);
        assert!(payload.expires_at <= now_ms() + TOKEN_TTL_MS);
    }

    #[test]
    fn test_wire_format() {
        let signer = signer();
        let token = signer.mint_at(T, "a.mp3", None, Some("u1")).unwrap();

        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));

        let raw = decode(&token);
        let (payload, signature) = raw.rsplit_once(':').unwrap();
        assert_eq!(
            payload,
            format!(r#"{{"filename":"a.mp3","userId":"u1","expiresAt":{}}}"#, T + TOKEN_TTL_MS)
        );
        assert_eq!(signature.len(), 64);
        assert!(
            signature
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );

        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_padded_token_is_accepted() {
        let signer = signer();
        let token = signer.mint_at(T, "a.mp3", None, None).unwrap();
        let padded = base64::engine::general_purpose::URL_SAFE.encode(decode(&token));

        assert_eq!(signer.verify_at(&padded, T).unwrap().filename, "a.mp3");
    }

    #[test]
    fn test_mint_refuses_unsafe_filename() {
        let signer = signer();
        assert!(signer.mint_at(T, "", None, None).is_err());
        assert!(signer.mint_at(T, "../etc/passwd", None, None).is_err());
        assert!(signer.mint_at(T, "a/b.mp3", None, None).is_err());
        assert!(signer.mint_at(T, ".env", None, None).is_err());
    }

    #[test]
    fn test_signature_tamper() {
        let signer = signer();
        let token = signer.mint_at(T, "story.mp3", Some("r"), None).unwrap();
        let raw = decode(&token);
        let sep = raw.rfind(':').unwrap();

        for i in sep + 1..raw.len() {
            let mut tampered = raw.clone().into_bytes();
            tampered[i] = if tampered[i] == b'0' { b'1' } else { b'0' };
            let tampered = encode(std::str::from_utf8(&tampered).unwrap());

            assert_eq!(
                signer.verify_at(&tampered, T),
                Err(TokenError::InvalidSignature),
                "flipping signature byte {i}"
            );
        }

        // Uppercase hex is a different string
        let upper = format!("{}:{}", &raw[..sep], raw[sep + 1..].to_uppercase());
        assert_eq!(
            signer.verify_at(&encode(&upper), T),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_payload_tamper() {
        let signer = signer();
        let token = signer.mint_at(T, "story.mp3", Some("r"), Some("u")).unwrap();
        let raw = decode(&token);
        let sep = raw.rfind(':').unwrap();

        for i in 0..sep {
            let mut tampered = raw.clone().into_bytes();
            tampered[i] = if tampered[i] == b'x' { b'y' } else { b'x' };
            let tampered = encode(std::str::from_utf8(&tampered).unwrap());

            assert_eq!(
                signer.verify_at(&tampered, T),
                Err(TokenError::InvalidSignature),
                "flipping payload byte {i}"
            );
        }
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = signer().mint_at(T, "a.mp3", None, None).unwrap();
        let other = TokenSigner::new("another-secret").unwrap();
        assert_eq!(
            other.verify_at(&token, T),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let signer = signer();
        let token = signer.mint_at(T, "a.mp3", None, None).unwrap();

        assert!(signer.verify_at(&token, T + TOKEN_TTL_MS - 1).is_ok());
        assert_eq!(
            signer.verify_at(&token, T + TOKEN_TTL_MS),
            Err(TokenError::Expired)
        );
        assert_eq!(
            signer.verify_at(&token, T + TOKEN_TTL_MS + 1),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_format_rejection() {
        let signer = signer();

        // Not base64url at all
        assert_eq!(
            signer.verify_at("!!not a token!!", T),
            Err(TokenError::InvalidFormat)
        );
        assert_eq!(signer.verify_at("", T), Err(TokenError::InvalidFormat));

        // No separator after decoding
        assert_eq!(
            signer.verify_at(&encode("no separator here"), T),
            Err(TokenError::InvalidFormat)
        );

        // Empty halves
        assert_eq!(
            signer.verify_at(&encode(":abcdef"), T),
            Err(TokenError::InvalidFormat)
        );
        assert_eq!(
            signer.verify_at(&encode(r#"{"filename":"a.mp3"}:"#), T),
            Err(TokenError::InvalidFormat)
        );

        // Not UTF-8
        assert_eq!(
            signer.verify_at(&TOKEN_ENGINE.encode([0xff, 0xfe, b':', b'a']), T),
            Err(TokenError::InvalidFormat)
        );

        // Random garbage with a separator fails the signature check
        assert_eq!(
            signer.verify_at(&encode("garbage:deadbeef"), T),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_signed_garbage_fails_validation() {
        let signer = signer();
        let body = "definitely not json";
        let token = encode(&format!("{body}:{}", signer.signature(body.as_bytes())));

        assert_eq!(
            signer.verify_at(&token, T),
            Err(TokenError::ValidationFailed)
        );
    }

    #[test]
    fn test_end_to_end_scenario() {
        let signer = signer();
        let token = signer
            .mint_at(T, "story-42.mp3", Some("r1"), Some("u9"))
            .unwrap();

        let payload = signer.verify_at(&token, T + 1).unwrap();
        assert_eq!(
            payload,
            TokenPayload {
                filename: "story-42.mp3".to_string(),
                resource_id: Some("r1".to_string()),
                user_id: Some("u9".to_string()),
                expires_at: T + TOKEN_TTL_MS,
            }
        );

        assert_eq!(
            signer.verify_at(&token, T + TOKEN_TTL_MS + 60_000),
            Err(TokenError::Expired)
        );
    }
}
