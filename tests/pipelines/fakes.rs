//! Canned collaborator services.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use relaybot::config::{Config, PipelineConfig};
use relaybot::message::Media;
use relaybot::services::{
    Answer, Answerer, GeneratedImage, ImageGenerator, ServiceError, Services, Synthesizer,
    Transcriber, Transcript,
};

pub struct FixedAnswerer {
    pub text: &'static str,
    pub cost: f64,
}

#[async_trait]
impl Answerer for FixedAnswerer {
    async fn answer(&self, _prompt: &str) -> Result<Answer, ServiceError> {
        Ok(Answer {
            text: self.text.to_owned(),
            cost: self.cost,
        })
    }
}

pub struct FixedTranscriber(pub &'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _audio: &Media) -> Result<Transcript, ServiceError> {
        Ok(Transcript::new(self.0, Some("en".to_owned())))
    }
}

pub struct OneImage;

#[async_trait]
impl ImageGenerator for OneImage {
    async fn generate(&self, _prompt: &str) -> Result<Vec<GeneratedImage>, ServiceError> {
        Ok(vec![GeneratedImage {
            file_name: "image_1.png".to_owned(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }])
    }
}

/// Records the languages it was asked to speak.
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub languages: Mutex<Vec<String>>,
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(&self, _text: &str, language: &str) -> Result<Vec<u8>, ServiceError> {
        if let Ok(mut languages) = self.languages.lock() {
            languages.push(language.to_owned());
        }
        Ok(b"ID3".to_vec())
    }
}

/// Every service configured with a canned implementation.
pub fn all_services(synthesizer: Arc<RecordingSynthesizer>) -> Services {
    Services {
        answerer: Some(Arc::new(FixedAnswerer {
            text: "forty-two",
            cost: 0.0,
        })),
        transcriber: Some(Arc::new(FixedTranscriber("hello from a voice note"))),
        image_generator: Some(Arc::new(OneImage)),
        synthesizer: Some(synthesizer),
    }
}

/// Pipeline entries parsed from a TOML snippet of `[[pipelines]]` tables.
pub fn pipeline_configs(toml_str: &str) -> Vec<PipelineConfig> {
    let config: Config = toml::from_str(toml_str).expect("pipelines should parse");
    config.pipelines
}
