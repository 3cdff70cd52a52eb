//! Signaling codec for the direct-peer handshake.
//!
//! A [`SignalingArtifact`] is the offer or answer the peer transport produces.
//! It travels out of band, usually as the `signalData` query parameter of a
//! link, so the text form has to survive browsers, clipboards and URL
//! encoders. We encode with the URL-safe alphabet and no padding. Decoding is
//! forgiving: the standard alphabet is tried first, then the text is remapped
//! (`-` to `+`, `_` to `/`) and tried again.

use crate::error::ProtocolError;
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Query parameter carrying the encoded artifact.
pub const SIGNAL_PARAM: &str = "signalData";

/// Parameter name used by older host links.
pub const LEGACY_SIGNAL_PARAM: &str = "connect";

/// Standard alphabet, padding optional.
const FORGIVING_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Offer or answer produced by the peer transport. Always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalingArtifact(Value);

impl SignalingArtifact {
    /// Wrap a transport description. It must be a JSON object.
    pub fn new(value: Value) -> Result<Self, ProtocolError> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(ProtocolError::MalformedSignal(
                "signal data is not an object".into(),
            ))
        }
    }

    /// Borrow the description.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Encode an artifact as URL-safe text.
pub fn encode(artifact: &SignalingArtifact) -> String {
    URL_SAFE_NO_PAD.encode(artifact.0.to_string())
}

/// Decode text produced by [`encode`] or by a standard-alphabet encoder.
pub fn decode(text: &str) -> Result<SignalingArtifact, ProtocolError> {
    let text = text.trim();
    if let Some(artifact) = decode_with(&FORGIVING_STANDARD, text) {
        return Ok(artifact);
    }
    let remapped = text.replace('-', "+").replace('_', "/");
    decode_with(&FORGIVING_STANDARD, &remapped).ok_or_else(|| {
        ProtocolError::MalformedSignal("not a valid connection signal".into())
    })
}

fn decode_with(engine: &GeneralPurpose, text: &str) -> Option<SignalingArtifact> {
    let bytes = engine.decode(text).ok()?;
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    SignalingArtifact::new(value).ok()
}

/// Build a connection link: `base` with `signalData=<encoded>` appended.
pub fn link(base: &Url, artifact: &SignalingArtifact) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair(SIGNAL_PARAM, &encode(artifact));
    url
}

/// Pull an artifact out of whatever the user pasted: a full link carrying
/// `signalData` (or the legacy `connect` parameter), or bare codec text.
pub fn extract(input: &str) -> Result<SignalingArtifact, ProtocolError> {
    let input = input.trim();
    let Ok(url) = Url::parse(input) else {
        return decode(input);
    };
    let param = url
        .query_pairs()
        .find(|(key, _)| key == SIGNAL_PARAM || key == LEGACY_SIGNAL_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| ProtocolError::MalformedSignal("link has no signal data".into()))?;
    // Form decoding turns a literal '+' into a space.
    decode(&param.replace(' ', "+"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    fn sample() -> SignalingArtifact {
        // Long enough to produce '+' and '/' in the standard alphabet.
        SignalingArtifact::new(json!({
            "type": "offer",
            "sdp": "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\n~~~???>>>",
        }))
        .unwrap()
    }

    #[test]
    fn encoded_text_is_url_safe() {
        let text = encode(&sample());
        assert!(
            text.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(decode(&text).unwrap(), sample());
    }

    #[test]
    fn standard_alphabet_decodes() {
        let text = STANDARD.encode(sample().as_value().to_string());
        assert!(text.contains('+') || text.contains('/'));
        assert_eq!(decode(&text).unwrap(), sample());
    }

    #[test]
    fn url_safe_substitution_decodes_identically() {
        let standard = STANDARD.encode(sample().as_value().to_string());
        let substituted = standard.replace('+', "-").replace('/', "_");
        assert_eq!(decode(&substituted).unwrap(), decode(&standard).unwrap());
    }

    #[test]
    fn garbage_is_malformed_signal() {
        assert!(matches!(
            decode("%%% not base64 %%%"),
            Err(ProtocolError::MalformedSignal(_))
        ));
        // Valid base64, but not JSON.
        let text = STANDARD.encode("hello there");
        assert!(matches!(decode(&text), Err(ProtocolError::MalformedSignal(_))));
        // Valid JSON, but not an object.
        let text = STANDARD.encode("[1,2,3]");
        assert!(matches!(decode(&text), Err(ProtocolError::MalformedSignal(_))));
    }

    #[test]
    fn link_roundtrip() {
        let base = Url::parse("https://remote.example/").unwrap();
        let url = link(&base, &sample());
        assert!(url.as_str().contains("signalData="));
        assert_eq!(extract(url.as_str()).unwrap(), sample());
    }

    #[test]
    fn extract_accepts_legacy_param_and_mangled_plus() {
        let standard = STANDARD.encode(sample().as_value().to_string());
        // Pasted without percent-encoding: '+' arrives as a space.
        let pasted = format!("http://localhost:3000/?connect={standard}");
        assert_eq!(extract(&pasted).unwrap(), sample());
    }

    #[test]
    fn extract_accepts_bare_text() {
        let text = encode(&sample());
        assert_eq!(extract(&format!("  {text}\n")).unwrap(), sample());
    }

    #[test]
    fn link_without_param_is_rejected() {
        assert!(matches!(
            extract("https://remote.example/?gameId=ab12cd"),
            Err(ProtocolError::MalformedSignal(_))
        ));
    }
}
