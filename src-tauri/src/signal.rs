//! Out-of-band signaling: session descriptions as text, QR code or share URL.
//!
//! The text form is the browser's JSON session description
//! (`{"type":"offer","sdp":"..."}`), so payloads can be pasted between this
//! editor and a plain web page. A compact gzip+base64 form is also produced
//! for QR codes and accepted by [`decode`].

use std::fmt;
use std::io::{Read, Write};

use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use qrcode::render::{svg, unicode};
use qrcode::types::QrError;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use url::Url;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::{Error, Result};

/// Cap on decompressed payloads, protects against gzip bombs.
const MAX_DECOMPRESSED_SIZE: u64 = 256 * 1024;

/// Name of the URL fragment parameter carrying the payload.
pub const SHARE_PARAM: &str = "offer";

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpRole {
    Offer,
    Answer,
}

impl fmt::Display for SdpRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpRole::Offer => f.write_str("offer"),
            SdpRole::Answer => f.write_str("answer"),
        }
    }
}

/// Negotiation record exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub role: SdpRole,
    pub sdp: String,
    /// Session id of the offering side, echoed back in the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            role: SdpRole::Offer,
            sdp: sdp.into(),
            session: None,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            role: SdpRole::Answer,
            sdp: sdp.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn role(&self) -> SdpRole {
        self.role
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn from_rtc(desc: &RTCSessionDescription) -> Result<Self> {
        match desc.sdp_type {
            RTCSdpType::Offer => Ok(Self::offer(desc.sdp.clone())),
            RTCSdpType::Answer => Ok(Self::answer(desc.sdp.clone())),
            other => Err(Error::MalformedPayload(format!(
                "unsupported description type {other}"
            ))),
        }
    }

    /// Parses the SDP; a description that is not valid SDP is malformed.
    pub fn to_rtc(&self) -> Result<RTCSessionDescription> {
        let parsed = match self.role {
            SdpRole::Offer => RTCSessionDescription::offer(self.sdp.clone()),
            SdpRole::Answer => RTCSessionDescription::answer(self.sdp.clone()),
        };
        parsed.map_err(|e| Error::MalformedPayload(e.to_string()))
    }
}

/// JSON text, as the page puts it in the textarea.
pub fn encode(desc: &SessionDescription) -> String {
    // a struct of strings and a unit enum always serializes
    serde_json::to_string(desc).unwrap_or_default()
}

/// gzip + base64 of the JSON, smaller for QR codes.
pub fn encode_compact(desc: &SessionDescription) -> Result<String> {
    let json = serde_json::to_vec(desc).map_err(|e| Error::MalformedPayload(e.to_string()))?;

    let mut gz = GzEncoder::new(Vec::new(), Compression::best());
    gz.write_all(&json)?;
    let compressed = gz.finish()?;

    Ok(general_purpose::STANDARD.encode(compressed))
}

/// Accepts either the JSON form or the compact form.
pub fn decode(text: &str) -> Result<SessionDescription> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::MalformedPayload("empty payload".into()));
    }

    let desc: SessionDescription = if text.starts_with('{') {
        serde_json::from_str(text).map_err(|e| Error::MalformedPayload(e.to_string()))?
    } else {
        let json = decompress(text)?;
        serde_json::from_slice(&json).map_err(|e| Error::MalformedPayload(e.to_string()))?
    };

    if desc.sdp.trim().is_empty() {
        return Err(Error::MalformedPayload("description has no sdp".into()));
    }
    Ok(desc)
}

fn decompress(text: &str) -> Result<Vec<u8>> {
    let compressed = general_purpose::STANDARD
        .decode(text)
        .map_err(|e| Error::MalformedPayload(format!("not JSON nor base64: {e}")))?;

    let mut json = Vec::new();
    GzDecoder::new(&compressed[..])
        .take(MAX_DECOMPRESSED_SIZE)
        .read_to_end(&mut json)
        .map_err(|e| Error::MalformedPayload(format!("bad compressed payload: {e}")))?;
    Ok(json)
}

fn qr_code(text: &str) -> Result<QrCode> {
    QrCode::new(text.as_bytes()).map_err(|e| match e {
        QrError::DataTooLong => Error::SignalTooLarge(text.len()),
        other => Error::MalformedPayload(other.to_string()),
    })
}

/// Scannable code as an SVG document, at least `size` pixels wide.
pub fn to_qr_svg(text: &str, size: u32) -> Result<String> {
    let code = qr_code(text)?;
    Ok(code
        .render()
        .min_dimensions(size, size)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

/// Same code drawn with half-block characters, for terminals and logs.
pub fn to_qr_terminal(text: &str) -> Result<String> {
    let code = qr_code(text)?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// `<origin><path>#offer=<encodeURIComponent(text)>`
pub fn to_share_url(base: &str, text: &str) -> Result<String> {
    let mut url = Url::parse(base).map_err(|e| Error::InvalidShareUrl(format!("{base}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidShareUrl(format!("{base}: not an absolute URL")));
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(format!(
        "{url}#{SHARE_PARAM}={}",
        utf8_percent_encode(text, URI_COMPONENT)
    ))
}

/// Absolute URL with a fragment, as opposed to a bare payload. JSON and
/// base64 payloads never parse as absolute URLs.
pub fn is_share_url(text: &str) -> bool {
    Url::parse(text.trim()).is_ok_and(|url| !url.cannot_be_a_base() && url.fragment().is_some())
}

/// Pulls the payload back out of a share URL.
pub fn from_share_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::InvalidShareUrl(e.to_string()))?;
    let fragment = parsed
        .fragment()
        .ok_or_else(|| Error::InvalidShareUrl("URL has no fragment".into()))?;

    let value = fragment
        .split('&')
        .find_map(|pair| pair.strip_prefix(SHARE_PARAM)?.strip_prefix('='))
        .ok_or_else(|| Error::InvalidShareUrl(format!("no `{SHARE_PARAM}` parameter")))?;

    percent_decode_str(value)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidShareUrl(e.to_string()))
}
