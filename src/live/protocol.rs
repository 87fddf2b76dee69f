//! # Live API Wire Format
//!
//! JSON messages of the bidirectional `BidiGenerateContent` stream.
//!
//! ## Client → Server:
//! - `setup`: model, response modality, voice and system instruction (first message only)
//! - `realtimeInput`: base64 PCM16 media chunks from the microphone
//!
//! ## Server → Client:
//! - `setupComplete`: the setup was accepted
//! - `serverContent`: model turn parts (inline audio), `interrupted`, `turnComplete`
//! - `goAway`: the server will close the connection soon

use serde::{Deserialize, Serialize};

use crate::audio::codec::MediaBlob;

/// Kinds of output the model may produce. Sessions here only ever ask for audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Everything needed to open a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSetup {
    pub model: String,
    pub response_modality: Modality,
    pub voice: String,
    pub system_instruction: String,
}

impl LiveSetup {
    /// Audio-only setup with the given persona instruction.
    pub fn audio(model: impl Into<String>, voice: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_modality: Modality::Audio,
            voice: voice.into(),
            system_instruction: system_instruction.into(),
        }
    }

    /// First message sent on a fresh connection.
    pub fn to_message(&self) -> SetupMessage {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };

        SetupMessage {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec![self.response_modality],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: self.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: self.system_instruction.clone(),
                    }],
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// One realtime input frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

impl RealtimeInputMessage {
    pub fn media(blob: MediaBlob) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![blob],
            },
        }
    }
}

/// Any message the server sends. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: Option<bool>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Base64 audio of the first part carrying inline data, if any.
    pub fn audio_data(&self) -> Option<&str> {
        self.server_content
            .as_ref()?
            .model_turn
            .as_ref()?
            .parts
            .iter()
            .find_map(|part| part.inline_data.as_ref())
            .map(|inline| inline.data.as_str())
    }

    /// Whether the model was cut off (typically because the user started talking).
    pub fn interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|content| content.interrupted)
            .unwrap_or(false)
    }

    pub fn turn_complete(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|content| content.turn_complete)
            .unwrap_or(false)
    }

    /// Message carrying only an interruption flag.
    pub fn interruption() -> Self {
        Self {
            server_content: Some(ServerContent {
                interrupted: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Message carrying one base64 audio chunk.
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            server_content: Some(ServerContent {
                model_turn: Some(ModelTurn {
                    parts: vec![Part {
                        inline_data: Some(InlineData {
                            mime_type: Some("audio/pcm;rate=24000".to_string()),
                            data: data.into(),
                        }),
                        text: None,
                    }],
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_message_field_names() {
        let setup = LiveSetup::audio("gemini-test", "Zephyr", "Be kind.");
        let json = serde_json::to_value(setup.to_message()).unwrap();

        assert_eq!(json["setup"]["model"], "models/gemini-test");
        assert_eq!(json["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(json["setup"]["systemInstruction"]["parts"][0]["text"], "Be kind.");
    }

    #[test]
    fn test_model_prefix_not_doubled() {
        let setup = LiveSetup::audio("models/gemini-test", "Puck", "");
        assert_eq!(setup.to_message().setup.model, "models/gemini-test");
    }

    #[test]
    fn test_realtime_input_shape() {
        let blob = MediaBlob {
            data: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let json = serde_json::to_value(RealtimeInputMessage::media(blob)).unwrap();
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["data"], "AAAA");
    }

    #[test]
    fn test_parse_audio_and_interruption() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": { "parts": [
                    { "text": "thinking" },
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAE=" } }
                ]},
                "interrupted": true
            }
        }"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.audio_data(), Some("AAE="));
        assert!(message.interrupted());
        assert!(!message.turn_complete());
    }

    #[test]
    fn test_parse_control_messages() {
        let setup: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(setup.setup_complete.is_some());
        assert_eq!(setup.audio_data(), None);
        assert!(!setup.interrupted());

        let done: ServerMessage =
            serde_json::from_str(r#"{"serverContent":{"turnComplete":true}}"#).unwrap();
        assert!(done.turn_complete());

        let away: ServerMessage =
            serde_json::from_str(r#"{"goAway":{"timeLeft":"10s"},"usageMetadata":{}}"#).unwrap();
        assert_eq!(away.go_away.unwrap().time_left.as_deref(), Some("10s"));
    }
}
