//! Built-in capability implementations
//!
//! `BudgetPlanner` computes a fixed-ratio monthly budget locally; it still
//! insists on a credential so it behaves like a keyed upstream when the pool
//! runs dry. `StubTranscriber` validates the audio payload and returns a
//! canned transcription.

use async_trait::async_trait;
use base64::Engine;

use super::provider::{AiBackend, BackendError, VoiceBackend};
use super::types::{PlanOutput, PlanRequest, VoiceRequest};

/// Share of income set aside per budget line
const SAVINGS_RATIO: f64 = 0.20;
const FOOD_RATIO: f64 = 0.25;
const TRANSPORT_RATIO: f64 = 0.10;
const OTHERS_RATIO: f64 = 0.45;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fixed-ratio budget planner
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetPlanner;

impl BudgetPlanner {
    pub fn plan(request: &PlanRequest) -> Result<PlanOutput, BackendError> {
        if !request.income.is_finite() || request.income < 0.0 {
            return Err(BackendError::InvalidPayload(format!(
                "income must be a non-negative number, got {}",
                request.income
            )));
        }

        Ok(PlanOutput {
            savings: round2(request.income * SAVINGS_RATIO),
            food: round2(request.income * FOOD_RATIO),
            transport: round2(request.income * TRANSPORT_RATIO),
            others: round2(request.income * OTHERS_RATIO),
            goals: request.goals.clone(),
        })
    }
}

#[async_trait]
impl AiBackend for BudgetPlanner {
    fn backend_id(&self) -> &'static str {
        "budget_planner"
    }

    async fn invoke(
        &self,
        credential: Option<&str>,
        request: &PlanRequest,
    ) -> Result<PlanOutput, BackendError> {
        if credential.is_none() {
            return Err(BackendError::Rejected("no API key available".to_string()));
        }
        Self::plan(request)
    }
}

/// Voice capability returning a fixed transcription
#[derive(Debug, Clone)]
pub struct StubTranscriber {
    text: String,
}

impl StubTranscriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Default for StubTranscriber {
    fn default() -> Self {
        Self::new("lunch 30k")
    }
}

#[async_trait]
impl VoiceBackend for StubTranscriber {
    fn backend_id(&self) -> &'static str {
        "stub_transcriber"
    }

    async fn transcribe(&self, request: &VoiceRequest) -> Result<String, BackendError> {
        let audio = base64::engine::general_purpose::STANDARD
            .decode(request.audio_base64.trim())
            .map_err(|e| BackendError::InvalidPayload(format!("audio is not valid base64: {}", e)))?;
        if audio.is_empty() {
            return Err(BackendError::InvalidPayload("audio is empty".to_string()));
        }
        Ok(self.text.clone())
    }
}
