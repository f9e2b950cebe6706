use serde::Serialize;
use crate::error::{ MentorError, Result };
use crate::llm::CompletionOptions;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// The fixed set of models an operator may pick from, plus the default temperature.
/// Only built through `new`, so the list is never empty.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelCatalog {
    models: Vec<String>,
    default_temperature: f32,
}

impl ModelCatalog {
    pub fn new(models: Vec<String>, default_temperature: f32) -> Result<Self> {
        let models: Vec<String> = models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(MentorError::InvalidSettings("at least one chat model is required".into()));
        }
        check_temperature(default_temperature)?;
        Ok(Self { models, default_temperature })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn default_temperature(&self) -> f32 {
        self.default_temperature
    }

    pub fn default_model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or_default()
    }

    pub fn default_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.default_model().to_string(),
            temperature: Some(self.default_temperature),
        }
    }

    pub fn validate(&self, model: &str, temperature: f32) -> Result<CompletionOptions> {
        if !self.models.iter().any(|m| m == model) {
            return Err(
                MentorError::InvalidSettings(
                    format!("unknown model '{}', expected one of: {}", model, self.models.join(", "))
                )
            );
        }
        check_temperature(temperature)?;
        Ok(CompletionOptions {
            model: model.to_string(),
            temperature: Some(temperature),
        })
    }
}

fn check_temperature(temperature: f32) -> Result<()> {
    if !temperature.is_finite() || temperature < MIN_TEMPERATURE || temperature > MAX_TEMPERATURE {
        return Err(
            MentorError::InvalidSettings(
                format!(
                    "temperature {} is outside [{}, {}]",
                    temperature,
                    MIN_TEMPERATURE,
                    MAX_TEMPERATURE
                )
            )
        );
    }
    Ok(())
}
