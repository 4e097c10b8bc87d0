//! DMA fan-out and the shared retry/timeout wrapper (spec.md §4.3 Step 2).
//!
//! Mirrors the teacher's `infrastructure::claude` retry idiom, rebuilt on
//! top of the `backoff` crate already in the dependency stack.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;

use crate::domain::errors::DmaError;
use crate::domain::models::{CsdmaResult, DmaResults, DsdmaResult, EthicalDmaResult, Thought};
use crate::domain::ports::llm_service::LlmError;
use crate::domain::ports::LlmService;

/// Runs `attempt` up to `retry_limit` times, each bounded by
/// `timeout_seconds`, backing off exponentially between attempts. On final
/// failure returns `DmaError::Timeout`.
pub async fn run_dma_with_retries<F, Fut, T>(
    dma_name: &str,
    retry_limit: u32,
    timeout_seconds: u64,
    mut attempt: F,
) -> Result<T, DmaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(None)
        .build();

    let mut last_error = String::new();
    for attempt_no in 1..=retry_limit.max(1) {
        let call = attempt();
        match tokio::time::timeout(Duration::from_secs(timeout_seconds), call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => last_error = err.to_string(),
            Err(_) => last_error = format!("{dma_name} timed out after {timeout_seconds}s"),
        }
        if attempt_no < retry_limit.max(1) {
            if let Some(delay) = backoff.next_backoff() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(DmaError::Timeout {
        attempts: retry_limit.max(1),
        message: last_error,
    })
}

/// The three parallel DMA outputs for the seed steps of the pipeline
/// (spec.md §4.3 Step 2), aggregated via the critical-failure gate.
pub struct DmaOrchestrator {
    pub llm: std::sync::Arc<dyn LlmService>,
    pub retry_limit: u32,
    pub timeout_seconds: u64,
}

impl DmaOrchestrator {
    pub fn new(llm: std::sync::Arc<dyn LlmService>, retry_limit: u32, timeout_seconds: u64) -> Self {
        Self {
            llm,
            retry_limit,
            timeout_seconds,
        }
    }

    /// Run Ethical PDMA and CSDMA concurrently, plus DSDMA when `dsdma_name`
    /// is set for the active profile (spec.md §4.3 Step 2). Never returns an
    /// `Err`: DMA failures are folded into `DmaResults::failed_dmas` so the
    /// pipeline's critical-failure gate (Step 3) can decide.
    pub async fn run(&self, thought: &Thought, dsdma_name: Option<&str>) -> DmaResults {
        use crate::domain::ports::llm_service::{LlmMessage, ResponseModel};

        let ethical_fut = run_dma_with_retries("ethical", self.retry_limit, self.timeout_seconds, || {
            let llm = self.llm.clone();
            let content = thought.content.clone();
            async move {
                let (value, _usage) = llm
                    .call_llm_structured(
                        vec![LlmMessage::user(format!("Evaluate ethically: {content}"))],
                        ResponseModel::Ethical,
                        512,
                        0.0,
                    )
                    .await?;
                serde_json::from_value::<EthicalDmaResult>(value)
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            }
        });

        let csdma_fut = run_dma_with_retries("common_sense", self.retry_limit, self.timeout_seconds, || {
            let llm = self.llm.clone();
            let content = thought.content.clone();
            async move {
                let (value, _usage) = llm
                    .call_llm_structured(
                        vec![LlmMessage::user(format!("Evaluate plausibility: {content}"))],
                        ResponseModel::CommonSense,
                        512,
                        0.0,
                    )
                    .await?;
                serde_json::from_value::<CsdmaResult>(value)
                    .map_err(|e| LlmError::InvalidResponse(e.to_string()))
            }
        });

        let dsdma_fut = async {
            match dsdma_name {
                None => Ok(None),
                Some(name) => {
                    let result = run_dma_with_retries("domain_specific", self.retry_limit, self.timeout_seconds, || {
                        let llm = self.llm.clone();
                        let content = thought.content.clone();
                        let name = name.to_string();
                        async move {
                            let (value, _usage) = llm
                                .call_llm_structured(
                                    vec![LlmMessage::user(format!("[{name}] evaluate: {content}"))],
                                    ResponseModel::DomainSpecific,
                                    512,
                                    0.0,
                                )
                                .await?;
                            serde_json::from_value::<DsdmaResult>(value)
                                .map_err(|e| LlmError::InvalidResponse(e.to_string()))
                        }
                    })
                    .await;
                    result.map(Some)
                }
            }
        };

        let (ethical, csdma, dsdma) = tokio::join!(ethical_fut, csdma_fut, dsdma_fut);

        let mut results = DmaResults::default();
        match ethical {
            Ok(r) => results.ethical = Some(r),
            Err(e) => results.failed_dmas.push(format!("ethical: {e}")),
        }
        match csdma {
            Ok(r) => results.common_sense = Some(r),
            Err(e) => results.failed_dmas.push(format!("common_sense: {e}")),
        }
        match dsdma {
            Ok(r) => results.domain_specific = r,
            Err(e) => results.failed_dmas.push(format!("domain_specific: {e}")),
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let result = run_dma_with_retries::<_, _, u32>("test", 3, 5, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_timeout() {
        let result = run_dma_with_retries::<_, _, u32>("test", 2, 1, || async {
            Err(LlmError::RequestFailed("boom".into()))
        })
        .await;
        assert!(matches!(result, Err(DmaError::Timeout { attempts: 2, .. })));
    }
}
