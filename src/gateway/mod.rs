//! Single-shot request/response boundary with the remote agent.
//!
//! One utterance in, one structured reply out. The exchange either fully
//! succeeds (a complete [`AgentReply`]) or fully fails with
//! [`VoiceError::Gateway`]. There are no partial results and no retries
//! here; a retry policy, if one is ever added, must stay invisible to the
//! session controller.

use crate::capture::Utterance;
use crate::error::{Result, VoiceError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Voice submission endpoint (multipart audio).
const VOICE_PATH: &str = "/process-voice";
/// Text submission endpoint (JSON body).
const TEXT_PATH: &str = "/process-text";

/// A reply audio blob plus its container tag.
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub bytes: Bytes,
    pub mime: String,
}

/// Result of one agent exchange. Immutable once received.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Reply transcript. Required on the wire; may be empty.
    pub reply_text: String,
    /// Synthesized reply audio, when the agent produced any.
    pub reply_audio: Option<EncodedAudio>,
    /// Server-side transcript of the user utterance, when available.
    pub transcript: Option<String>,
    /// Ordered reasoning/tool-use trace lines. May be empty.
    pub trace: Vec<String>,
}

/// The agent boundary the session controller depends on.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Perform exactly one exchange with the remote agent.
    ///
    /// # Errors
    ///
    /// Fails closed with [`VoiceError::Gateway`] on any transport,
    /// protocol, or decoding failure.
    async fn send(&self, utterance: Utterance) -> Result<AgentReply>;
}

/// Wire shape of the agent response.
#[derive(Debug, Deserialize)]
struct WireReply {
    agent_text: String,
    #[serde(default)]
    agent_audio: Option<String>,
    #[serde(default)]
    user_text: Option<String>,
    #[serde(default)]
    trace: Option<Vec<String>>,
}

/// HTTP implementation of the agent boundary.
pub struct HttpAgentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentGateway {
    /// Build a gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be constructed.
    pub fn new(config: &crate::config::GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl AgentGateway for HttpAgentGateway {
    async fn send(&self, utterance: Utterance) -> Result<AgentReply> {
        let request_id = Uuid::new_v4();

        let request = match utterance {
            Utterance::Audio { bytes, mime } => {
                debug!(%request_id, size = bytes.len(), %mime, "submitting audio utterance");
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name("recording.wav")
                    .mime_str(&mime)
                    .map_err(|e| gateway_error(format!("invalid audio MIME tag: {e}")))?;
                let form = reqwest::multipart::Form::new().part("file", part);
                self.client
                    .post(format!("{}{VOICE_PATH}", self.base_url))
                    .multipart(form)
            }
            Utterance::Text(text) => {
                debug!(%request_id, chars = text.len(), "submitting text utterance");
                self.client
                    .post(format!("{}{TEXT_PATH}", self.base_url))
                    .json(&serde_json::json!({ "text": text }))
            }
        };

        let response = request.send().await.map_err(|e| {
            warn!(%request_id, "agent request failed: {e}");
            gateway_error(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%request_id, %status, "agent returned failure status");
            return Err(gateway_error(format!("agent returned status {status}")));
        }

        let wire: WireReply = response.json().await.map_err(|e| {
            warn!(%request_id, "agent reply was undecodable: {e}");
            gateway_error(format!("undecodable reply body: {e}"))
        })?;

        let reply = decode_reply(wire)?;
        debug!(
            %request_id,
            reply_chars = reply.reply_text.len(),
            has_audio = reply.reply_audio.is_some(),
            trace_steps = reply.trace.len(),
            "agent exchange complete"
        );
        Ok(reply)
    }
}

fn gateway_error(cause: String) -> VoiceError {
    VoiceError::Gateway { cause }
}

/// Decode the wire reply into an [`AgentReply`].
///
/// Missing optional fields mean "no audio" / "no transcript" / "no trace";
/// the agent sends empty strings for skipped synthesis, so those count as
/// absent too. Undecodable base64 fails the whole exchange.
fn decode_reply(wire: WireReply) -> Result<AgentReply> {
    let reply_audio = match wire.agent_audio.as_deref() {
        None | Some("") => None,
        Some(encoded) => {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| gateway_error(format!("undecodable reply audio: {e}")))?;
            Some(EncodedAudio {
                bytes: Bytes::from(bytes),
                mime: "audio/mpeg".to_owned(),
            })
        }
    };

    let transcript = wire.user_text.filter(|t| !t.trim().is_empty());

    Ok(AgentReply {
        reply_text: wire.agent_text,
        reply_audio,
        transcript,
        trace: wire.trace.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn wire(json: serde_json::Value) -> WireReply {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn full_reply_decodes() {
        let reply = decode_reply(wire(serde_json::json!({
            "user_text": "what is my balance",
            "agent_text": "Here is your answer",
            "agent_audio": BASE64.encode(b"mp3-bytes"),
            "trace": ["Calling Tool: search", "Final Answer: done"],
        })))
        .unwrap();

        assert_eq!(reply.reply_text, "Here is your answer");
        assert_eq!(reply.transcript.as_deref(), Some("what is my balance"));
        assert_eq!(reply.reply_audio.unwrap().bytes.as_ref(), b"mp3-bytes");
        assert_eq!(reply.trace.len(), 2);
    }

    #[test]
    fn missing_optionals_mean_absent() {
        let reply = decode_reply(wire(serde_json::json!({ "agent_text": "hi" }))).unwrap();
        assert_eq!(reply.reply_text, "hi");
        assert!(reply.reply_audio.is_none());
        assert!(reply.transcript.is_none());
        assert!(reply.trace.is_empty());
    }

    #[test]
    fn empty_audio_string_means_no_audio() {
        let reply = decode_reply(wire(serde_json::json!({
            "agent_text": "hi",
            "agent_audio": "",
            "user_text": "",
        })))
        .unwrap();
        assert!(reply.reply_audio.is_none());
        assert!(reply.transcript.is_none());
    }

    #[test]
    fn undecodable_audio_fails_the_exchange() {
        let result = decode_reply(wire(serde_json::json!({
            "agent_text": "hi",
            "agent_audio": "not!!base64@@",
        })));
        assert!(matches!(result, Err(VoiceError::Gateway { .. })));
    }

    #[test]
    fn reply_text_is_required_on_the_wire() {
        let result: std::result::Result<WireReply, _> =
            serde_json::from_value(serde_json::json!({ "trace": [] }));
        assert!(result.is_err());
    }
}
