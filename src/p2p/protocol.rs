//! Ghost protocol message codec
//!
//! Frame layout (ASCII, pipe-delimited):
//!
//! ```text
//! Ghost|<len>|<TYPE>|<body>
//! ```
//!
//! where `len` is the decimal byte length of `body` and `body` is a
//! pipe-separated list of `NAME:<tag><value>` pairs: `+` tags a decimal
//! integer, `^` tags a string. Any other tag is rejected; list values
//! have no wire encoding and are therefore unrepresentable.
//!
//! On a byte-stream transport every payload is length-prefixed (u32
//! big-endian). Established sessions seal the whole encoded frame with
//! AES-256-GCM under the 32-byte session key; the wire payload is then
//! `nonce(12) ‖ ciphertext`. Handshake frames travel cleartext because
//! the session key does not exist yet.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Fixed frame prefix
pub const FRAME_PREFIX: &str = "Ghost";

/// AES-GCM nonce length
const NONCE_SIZE: usize = 12;

/// Upper bound on any wire payload: a block-size-limit block plus codec
/// and encryption overhead fits comfortably
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
    #[error("Unknown parameter type tag '{0}'")]
    UnknownTypeTag(char),
    #[error("Invalid parameter name '{0}'")]
    InvalidParamName(String),
    #[error("Invalid message type '{0}'")]
    InvalidMessageType(String),
    #[error("Parameter value contains the frame delimiter")]
    DelimiterInValue,
    #[error("Frame exceeds the maximum size")]
    FrameTooLarge,
    #[error("Decryption failed")]
    DecryptFailed,
    #[error("Encryption failed")]
    EncryptFailed,
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

/// A decoded Ghost message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostMessage {
    /// Upper-case message type, e.g. `PING`
    pub msg_type: String,
    /// Named parameters, deterministic (sorted) order on the wire
    pub params: BTreeMap<String, ParamValue>,
}

impl GhostMessage {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style integer parameter
    pub fn with_int(mut self, name: &str, value: i64) -> Self {
        self.params.insert(name.to_string(), ParamValue::Int(value));
        self
    }

    /// Builder-style string parameter
    pub fn with_str(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params
            .insert(name.to_string(), ParamValue::Str(value.into()));
        self
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.params.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.params.get(name) {
            Some(ParamValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Encode to the ASCII frame
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if !is_valid_type(&self.msg_type) {
            return Err(CodecError::InvalidMessageType(self.msg_type.clone()));
        }
        let mut body = String::new();
        for (i, (name, value)) in self.params.iter().enumerate() {
            if !is_valid_name(name) {
                return Err(CodecError::InvalidParamName(name.clone()));
            }
            if i > 0 {
                body.push('|');
            }
            body.push_str(name);
            body.push(':');
            match value {
                ParamValue::Int(v) => {
                    body.push('+');
                    body.push_str(&v.to_string());
                }
                ParamValue::Str(v) => {
                    if v.contains('|') {
                        return Err(CodecError::DelimiterInValue);
                    }
                    body.push('^');
                    body.push_str(v);
                }
            }
        }
        let frame = format!("{}|{}|{}|{}", FRAME_PREFIX, body.len(), self.msg_type, body);
        if frame.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge);
        }
        Ok(frame.into_bytes())
    }

    /// Decode an ASCII frame
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| CodecError::MalformedFrame("not utf-8".to_string()))?;
        let mut parts = text.splitn(4, '|');
        let prefix = parts.next().unwrap_or_default();
        if prefix != FRAME_PREFIX {
            return Err(CodecError::MalformedFrame(format!(
                "bad prefix '{}'",
                prefix
            )));
        }
        let len: usize = parts
            .next()
            .ok_or_else(|| CodecError::MalformedFrame("missing length".to_string()))?
            .parse()
            .map_err(|_| CodecError::MalformedFrame("bad length".to_string()))?;
        let msg_type = parts
            .next()
            .ok_or_else(|| CodecError::MalformedFrame("missing type".to_string()))?
            .to_string();
        if !is_valid_type(&msg_type) {
            return Err(CodecError::InvalidMessageType(msg_type));
        }
        let body = parts.next().unwrap_or_default();
        if body.len() != len {
            return Err(CodecError::MalformedFrame(format!(
                "length {} does not match body of {}",
                len,
                body.len()
            )));
        }

        let mut params = BTreeMap::new();
        if !body.is_empty() {
            for pair in body.split('|') {
                let (name, tagged) = pair
                    .split_once(':')
                    .ok_or_else(|| CodecError::MalformedFrame(format!("bad pair '{}'", pair)))?;
                if !is_valid_name(name) {
                    return Err(CodecError::InvalidParamName(name.to_string()));
                }
                let mut chars = tagged.chars();
                let tag = chars
                    .next()
                    .ok_or_else(|| CodecError::MalformedFrame("empty value".to_string()))?;
                let raw = chars.as_str();
                let value = match tag {
                    '+' => ParamValue::Int(raw.parse().map_err(|_| {
                        CodecError::MalformedFrame(format!("bad integer '{}'", raw))
                    })?),
                    '^' => ParamValue::Str(raw.to_string()),
                    other => return Err(CodecError::UnknownTypeTag(other)),
                };
                params.insert(name.to_string(), value);
            }
        }

        Ok(Self { msg_type, params })
    }

    /// Encode and encrypt under a session key: `nonce ‖ ciphertext`
    pub fn seal(&self, session_key: &[u8; 32]) -> Result<Vec<u8>, CodecError> {
        let plaintext = self.encode()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(session_key));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| CodecError::EncryptFailed)?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(payload)
    }

    /// Decrypt and decode a sealed payload
    pub fn open(payload: &[u8], session_key: &[u8; 32]) -> Result<Self, CodecError> {
        if payload.len() <= NONCE_SIZE {
            return Err(CodecError::DecryptFailed);
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(session_key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CodecError::DecryptFailed)?;
        Self::decode(&plaintext)
    }
}

fn is_valid_type(s: &str) -> bool {
    !s.is_empty()
        && s.starts_with(|c: char| c.is_ascii_uppercase())
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_valid_name(s: &str) -> bool {
    is_valid_type(s)
}

/// Write one length-prefixed payload to the transport
pub async fn write_payload<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> std::io::Result<()> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "payload exceeds maximum frame size",
        ));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Read one length-prefixed payload from the transport
///
/// One payload is pulled per call; backpressure is the caller not
/// calling again until the current frame is handled.
pub async fn read_payload<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "frame length out of bounds",
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
