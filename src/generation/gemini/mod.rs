
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Generator;
use crate::RagError;
use crate::config::GeminiConfig;
use crate::gemini::{Content, GeminiClient};

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiGenerator {
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = GeminiClient::new(config)?;
        Ok(Self::with_client(
            client,
            &config.generation_model,
            config.temperature,
        ))
    }

    #[inline]
    pub fn with_client(client: GeminiClient, model: &str, temperature: f32) -> Self {
        Self {
            client,
            model: GeminiClient::model_resource(model),
            temperature,
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run `generateContent` and join the text parts of the first candidate
    #[inline]
    pub fn generate_text(&self, prompt: &str) -> Result<String> {
        let url = self.client.model_method_url(&self.model, "generateContent")?;

        let request = GenerateContentRequest {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        debug!(
            "Generating with {} ({} prompt chars)",
            self.model,
            prompt.chars().count()
        );
        let response: GenerateContentResponse = self.client.post_json(&url, &request)?;

        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            warn!("Prompt blocked by provider: {}", reason);
            bail!("Prompt was blocked: {}", reason);
        }

        let Some(candidate) = response.candidates.into_iter().next() else {
            bail!("Provider returned no candidates");
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            bail!(
                "Provider returned an empty answer (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            );
        }

        Ok(text)
    }
}

impl Generator for GeminiGenerator {
    #[inline]
    fn generate(&self, prompt: &str) -> crate::Result<String> {
        self.generate_text(prompt)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }
}
