//! Voice input hook. Recognition itself belongs to the host; this module
//! tracks listening state and turns recognition results into text.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSettings {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            lang: "ja-JP".into(),
            continuous: true,
            interim_results: true,
        }
    }
}

/// One entry of the engine's cumulative result list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Candidate transcripts, best first.
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub is_final: bool,
}

/// Speech engine provided by the host environment.
pub trait Recognizer: Send {
    fn start(&mut self, settings: &RecognitionSettings) -> Result<()>;
    fn stop(&mut self);
}

/// Engine running inside the editor page; the page reports results back.
#[derive(Debug, Default)]
pub struct HostRecognizer {
    running: bool,
}

impl Recognizer for HostRecognizer {
    fn start(&mut self, settings: &RecognitionSettings) -> Result<()> {
        tracing::info!("voice recognition started ({})", settings.lang);
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.running {
            tracing::info!("voice recognition stopped");
        }
        self.running = false;
    }
}

/// What a batch of results produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoiceUpdate {
    /// Whole transcript so far, interim results included.
    pub transcript: String,
    /// Text of results that became final since the previous batch.
    pub finalized: String,
}

pub struct VoiceInput {
    recognizer: Option<Box<dyn Recognizer>>,
    settings: RecognitionSettings,
    listening: bool,
    finalized_count: usize,
}

impl VoiceInput {
    /// `None` means the host has no speech engine.
    pub fn new(recognizer: Option<Box<dyn Recognizer>>) -> Self {
        Self {
            recognizer,
            settings: RecognitionSettings::default(),
            listening: false,
            finalized_count: 0,
        }
    }

    pub fn unsupported() -> Self {
        Self::new(None)
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }

    pub fn start(&mut self) -> Result<()> {
        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or(Error::RecognitionUnsupported)?;
        if self.listening {
            return Ok(());
        }
        recognizer.start(&self.settings)?;
        self.listening = true;
        self.finalized_count = 0;
        Ok(())
    }

    /// The only cancel path: stops the engine mid-utterance.
    pub fn stop(&mut self) -> Result<()> {
        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or(Error::RecognitionUnsupported)?;
        recognizer.stop();
        self.listening = false;
        Ok(())
    }

    /// Joins the best alternative of every result. Results arrive as the
    /// engine's cumulative list, so only newly final ones count as finalized.
    pub fn on_result(&mut self, results: &[RecognitionResult]) -> VoiceUpdate {
        let best = |r: &RecognitionResult| r.alternatives.first().cloned().unwrap_or_default();

        let transcript: String = results.iter().map(best).collect();

        let mut finalized = String::new();
        let start = self.finalized_count.min(results.len());
        for result in results[start..].iter().take_while(|r| r.is_final) {
            finalized.push_str(&best(result));
            self.finalized_count += 1;
        }

        VoiceUpdate {
            transcript,
            finalized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str, is_final: bool) -> RecognitionResult {
        RecognitionResult {
            alternatives: vec![text.into(), "alt".into()],
            is_final,
        }
    }

    #[test]
    fn start_without_engine_is_unsupported() {
        let mut voice = VoiceInput::unsupported();
        assert!(matches!(voice.start(), Err(Error::RecognitionUnsupported)));
        assert!(!voice.is_listening());
    }

    #[test]
    fn start_and_stop_toggle_listening() {
        let mut voice = VoiceInput::new(Some(Box::<HostRecognizer>::default()));
        voice.start().unwrap();
        assert!(voice.is_listening());
        voice.stop().unwrap();
        assert!(!voice.is_listening());
    }

    #[test]
    fn default_settings_are_japanese_continuous() {
        let voice = VoiceInput::unsupported();
        assert_eq!(voice.settings().lang, "ja-JP");
        assert!(voice.settings().continuous);
        assert!(voice.settings().interim_results);
    }

    #[test]
    fn only_new_final_results_are_finalized() {
        let mut voice = VoiceInput::new(Some(Box::<HostRecognizer>::default()));
        voice.start().unwrap();

        let first = voice.on_result(&[result("こんにちは", true), result("せか", false)]);
        assert_eq!(first.transcript, "こんにちはせか");
        assert_eq!(first.finalized, "こんにちは");

        let second = voice.on_result(&[result("こんにちは", true), result("世界", true)]);
        assert_eq!(second.transcript, "こんにちは世界");
        assert_eq!(second.finalized, "世界");
    }
}
