//! Guardrail stage (spec.md §4.3 Step 6): post-selection policy checks that
//! may override the selected action to PONDER or DEFER.

use async_trait::async_trait;

use crate::domain::errors::GuardrailError;
use crate::domain::models::{
    ActionParameters, ActionSelectionResult, DeferParams, GuardrailOutcome, PonderParams,
    SelectedAction,
};

/// Configuration for the built-in guardrails, matching spec.md §6's
/// `guardrails.entropy_threshold`/`guardrails.coherence_threshold` keys.
#[derive(Debug, Clone)]
pub struct GuardrailsConfig {
    pub entropy_threshold: f64,
    pub coherence_threshold: f64,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            entropy_threshold: 0.65,
            coherence_threshold: 0.6,
        }
    }
}

#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate `result` and decide whether it passes or should be
    /// overridden. Must not mutate `result`; the caller decides how to
    /// react to an override.
    async fn check(&self, result: &ActionSelectionResult) -> Result<GuardrailOutcome, GuardrailError>;
}

/// Rejects SPEAK content whose measured entropy falls below the configured
/// threshold, a proxy for degenerate/repetitive output.
pub struct EntropyGuardrail {
    threshold: f64,
}

impl EntropyGuardrail {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn shannon_entropy(content: &str) -> f64 {
        if content.is_empty() {
            return 0.0;
        }
        let mut counts = [0u32; 256];
        let mut total = 0u32;
        for b in content.bytes() {
            counts[b as usize] += 1;
            total += 1;
        }
        let total = f64::from(total);
        counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = f64::from(c) / total;
                -p * p.log2()
            })
            .sum::<f64>()
            / 8.0 // normalize against the 8-bit max entropy
    }
}

#[async_trait]
impl Guardrail for EntropyGuardrail {
    fn name(&self) -> &'static str {
        "entropy"
    }

    async fn check(&self, result: &ActionSelectionResult) -> Result<GuardrailOutcome, GuardrailError> {
        let ActionParameters::Speak(ref params) = result.action_parameters else {
            return Ok(GuardrailOutcome::Pass);
        };
        let entropy = Self::shannon_entropy(&params.content);
        if entropy < self.threshold {
            return Ok(GuardrailOutcome::Overridden {
                original_action: Box::new(result.clone()),
                override_reason: format!(
                    "content entropy {entropy:.3} below threshold {:.3}",
                    self.threshold
                ),
            });
        }
        Ok(GuardrailOutcome::Pass)
    }
}

/// Rejects action selections reporting low confidence, a proxy for the
/// original's coherence check on the action-selection DMA's own self-report.
pub struct CoherenceGuardrail {
    threshold: f64,
}

impl CoherenceGuardrail {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Guardrail for CoherenceGuardrail {
    fn name(&self) -> &'static str {
        "coherence"
    }

    async fn check(&self, result: &ActionSelectionResult) -> Result<GuardrailOutcome, GuardrailError> {
        if let Some(confidence) = result.confidence {
            if confidence < self.threshold {
                return Ok(GuardrailOutcome::Overridden {
                    original_action: Box::new(result.clone()),
                    override_reason: format!(
                        "confidence {confidence:.3} below coherence threshold {:.3}",
                        self.threshold
                    ),
                });
            }
        }
        Ok(GuardrailOutcome::Pass)
    }
}

/// Runs a chain of guardrails in order; the first override wins.
pub struct GuardrailPipeline {
    guardrails: Vec<Box<dyn Guardrail>>,
}

impl GuardrailPipeline {
    pub fn new(config: &GuardrailsConfig) -> Self {
        Self {
            guardrails: vec![
                Box::new(EntropyGuardrail::new(config.entropy_threshold)),
                Box::new(CoherenceGuardrail::new(config.coherence_threshold)),
            ],
        }
    }

    /// Evaluate every guardrail against `result`, converting the first
    /// override into a PONDER (content-level issues are recoverable by
    /// asking the thought to reconsider) unless the action is already
    /// terminal-by-policy (REJECT/DEFER), in which case the override goes
    /// straight to DEFER — mirroring spec.md §4.3 Step 6's two override
    /// shapes.
    pub async fn evaluate(
        &self,
        result: &ActionSelectionResult,
    ) -> Result<(GuardrailOutcome, Option<ActionSelectionResult>), GuardrailError> {
        for guardrail in &self.guardrails {
            let outcome = guardrail.check(result).await?;
            if let GuardrailOutcome::Overridden {
                ref original_action,
                ref override_reason,
            } = outcome
            {
                let rewritten = if matches!(result.selected_action, SelectedAction::Reject | SelectedAction::Defer) {
                    ActionSelectionResult::new(
                        ActionParameters::Defer(DeferParams {
                            reason: override_reason.clone(),
                            context: serde_json::json!({"original_action": original_action.selected_action}),
                            defer_until: None,
                        }),
                        format!("guardrail '{}' forced DEFER: {}", guardrail.name(), override_reason),
                    )
                } else {
                    ActionSelectionResult::new(
                        ActionParameters::Ponder(PonderParams {
                            questions: vec![format!(
                                "the previous {} action failed the '{}' guardrail: {}",
                                original_action.selected_action.as_str(),
                                guardrail.name(),
                                override_reason
                            )],
                        }),
                        format!("guardrail '{}' forced PONDER: {}", guardrail.name(), override_reason),
                    )
                };
                return Ok((outcome, Some(rewritten)));
            }
        }
        Ok((GuardrailOutcome::Pass, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SpeakParams;

    fn speak(content: &str) -> ActionSelectionResult {
        ActionSelectionResult::new(
            ActionParameters::Speak(SpeakParams {
                content: content.to_string(),
                channel_id: Some("c1".into()),
            }),
            "say hi",
        )
    }

    #[tokio::test]
    async fn low_entropy_content_is_overridden_to_ponder() {
        let pipeline = GuardrailPipeline::new(&GuardrailsConfig {
            entropy_threshold: 0.99,
            coherence_threshold: 0.0,
        });
        let (outcome, rewritten) = pipeline.evaluate(&speak("aaaaaaaaaaaa")).await.unwrap();
        assert!(outcome.is_overridden());
        assert_eq!(rewritten.unwrap().selected_action, SelectedAction::Ponder);
    }

    #[tokio::test]
    async fn high_entropy_content_passes() {
        let pipeline = GuardrailPipeline::new(&GuardrailsConfig {
            entropy_threshold: 0.0,
            coherence_threshold: 0.0,
        });
        let (outcome, rewritten) = pipeline.evaluate(&speak("hello there, friend!")).await.unwrap();
        assert!(!outcome.is_overridden());
        assert!(rewritten.is_none());
    }

    #[tokio::test]
    async fn low_confidence_reject_is_overridden_to_defer() {
        let pipeline = GuardrailPipeline::new(&GuardrailsConfig {
            entropy_threshold: 0.0,
            coherence_threshold: 0.9,
        });
        let result = ActionSelectionResult::new(
            ActionParameters::Reject(crate::domain::models::RejectParams {
                reason: "nope".into(),
                create_filter: false,
                filter_pattern: None,
                filter_priority: None,
            }),
            "reject",
        )
        .with_confidence(0.1);
        let (outcome, rewritten) = pipeline.evaluate(&result).await.unwrap();
        assert!(outcome.is_overridden());
        assert_eq!(rewritten.unwrap().selected_action, SelectedAction::Defer);
    }
}
