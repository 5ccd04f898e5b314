//! services/api/src/adapters/sst.rs
//!
//! This module contains the adapter for OpenAI's Speech-to-Text (Whisper) service.
//! It implements the `SpeechToTextService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{AudioInput, CreateTranscriptionRequest},
    Client,
};
use async_trait::async_trait;
use hound::{WavSpec, WavWriter};
use thinkpath_core::ports::{PortError, PortResult, SpeechToTextService};
use tracing::debug;

/// Sample rate assumed for raw PCM uploads from the browser recorder.
const PCM_SAMPLE_RATE: u32 = 48_000;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechToTextService` port using the OpenAI Whisper API.
#[derive(Clone)]
pub struct OpenAiSstAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSstAdapter {
    /// Creates a new `OpenAiSstAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
        let mut cursor = std::io::Cursor::new(Vec::new());

        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm_data.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;

        Ok(cursor.into_inner())
    }

    /// Turns an upload into a named file Whisper will accept.
    ///
    /// Raw little-endian PCM is wrapped in a WAV container; anything else is passed
    /// through with an extension derived from its MIME type.
    fn prepare_upload(audio_data: &[u8], mime_type: &str) -> PortResult<(String, Vec<u8>)> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if matches!(essence.as_str(), "audio/pcm" | "audio/l16") {
            let wav = Self::pcm16_to_wav(audio_data, PCM_SAMPLE_RATE)
                .map_err(|e| PortError::Unexpected(format!("Failed to encode WAV: {}", e)))?;
            return Ok(("learner_audio.wav".to_string(), wav));
        }

        let extension = match essence.as_str() {
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
            "audio/flac" => "flac",
            _ => {
                return Err(PortError::Malformed(format!(
                    "Unsupported audio type '{}'",
                    mime_type
                )))
            }
        };
        Ok((format!("learner_audio.{}", extension), audio_data.to_vec()))
    }
}

//=========================================================================================
// `SpeechToTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechToTextService for OpenAiSstAdapter {
    /// Transcribes a clip of learner audio into text using the configured Whisper model.
    async fn transcribe_audio(&self, audio_data: &[u8], mime_type: &str) -> PortResult<String> {
        if audio_data.is_empty() {
            return Err(PortError::Malformed("Audio clip is empty".to_string()));
        }

        let (file_name, bytes) = Self::prepare_upload(audio_data, mime_type)?;
        debug!(file = %file_name, size = bytes.len(), "Sending audio for transcription");

        let request = CreateTranscriptionRequest {
            file: AudioInput::from_vec_u8(file_name, bytes),
            model: self.model.clone(),
            ..Default::default()
        };

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .audio()
            .transcription()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        Ok(response.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_is_wrapped_in_wav() {
        let pcm = [0u8, 0, 1, 0, 255, 127, 0, 128];
        let (name, wav) = OpenAiSstAdapter::prepare_upload(&pcm, "audio/pcm").unwrap();
        assert_eq!(name, "learner_audio.wav");
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header followed by the four samples.
        assert_eq!(wav.len(), 44 + pcm.len());
    }

    #[test]
    fn container_formats_pass_through() {
        let clip = b"not really webm";
        let (name, bytes) =
            OpenAiSstAdapter::prepare_upload(clip, "audio/webm;codecs=opus").unwrap();
        assert_eq!(name, "learner_audio.webm");
        assert_eq!(bytes, clip.to_vec());
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = OpenAiSstAdapter::prepare_upload(b"abc", "video/mp4").unwrap_err();
        assert!(matches!(err, PortError::Malformed(_)));
    }
}
