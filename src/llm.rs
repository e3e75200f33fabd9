//! Specialty classifier abstraction
//!
//! The orchestrator never talks to a model API directly; it goes through
//! [`SpecialtyClassifier`] so tests can substitute a fake and the retry and
//! default-speciality fallback stay in one place.

mod error;
mod openai;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiClassifier;

use async_trait::async_trait;

/// Speciality substituted when the classifier fails or returns garbage.
pub const DEFAULT_SPECIALITY: &str = "General Medicine";

/// System instruction for the speciality-inference call.
pub const SPECIALITY_INFERENCE_PROMPT: &str = "\
You are a medical specialty classifier. Based on the patient's symptoms, identify the most appropriate medical specialty.

Available specialties:
- Orthopedics (bone, joint, muscle, spine issues, fractures, arthritis, sports injuries)
- Dermatology (skin, hair, nail conditions, rashes, acne, eczema)
- Cardiology (heart conditions, chest pain, blood pressure)
- Neurology (brain, nervous system, headaches, seizures)
- Pediatrics (children's health)
- General Medicine (fever, cold, flu, general health issues)

Instructions:
1. Analyze the symptoms described by the patient
2. Return ONLY the specialty name (one word)
3. If symptoms match multiple specialties, choose the most relevant one
4. If unsure, return \"General Medicine\"

Examples:
- \"knee pain\" -> Orthopedics
- \"skin rash\" -> Dermatology
- \"fever and headache\" -> General Medicine
- \"chest pain\" -> Cardiology

Return only the specialty name, nothing else.";

/// Maps free-text symptoms to a medical speciality label.
///
/// The label may come back syntactically malformed; callers are expected to
/// sanitize it before use.
#[async_trait]
pub trait SpecialtyClassifier: Send + Sync {
    async fn classify(&self, symptoms: &str) -> Result<String, LlmError>;
}

/// Configuration for the classifier provider
#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Alternate OpenAI-compatible endpoint base URL.
    pub base_url: Option<String>,
}

impl ClassifierConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("CLINIC_LLM_MODEL").ok(),
            base_url: std::env::var("CLINIC_LLM_BASE_URL").ok(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}
