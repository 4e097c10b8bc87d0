//! `ProcessorRuntime`: the single logical event loop that owns the current
//! `AgentState` and drives rounds (spec.md §4.2, §5 "Scheduling model").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::errors::PersistenceError;
use crate::domain::models::AgentState;

/// What a processor's round produced: whether to transition the owning
/// state machine to a different `AgentState` next round.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundOutcome {
    pub next_state: Option<AgentState>,
}

impl RoundOutcome {
    pub fn stay() -> Self {
        Self::default()
    }

    pub fn transition_to(state: AgentState) -> Self {
        Self { next_state: Some(state) }
    }
}

/// A processor owns the states it declares support for and implements one
/// round of work for them. Only the processor for the current `AgentState`
/// runs at any given time (spec.md §5 "multiple processors do not run
/// simultaneously").
#[async_trait]
pub trait Processor: Send + Sync {
    fn supported_states(&self) -> &'static [AgentState];

    fn can_handle(&self, state: AgentState) -> bool {
        self.supported_states().contains(&state)
    }

    async fn run_round(&self, round_number: u64) -> Result<RoundOutcome, PersistenceError>;
}

/// Drives the round loop: advances `round_number`, runs the processor owning
/// the current state, sleeps `round_delay_seconds` (or until the stop
/// signal fires, whichever comes first).
pub struct ProcessorRuntime {
    processors: HashMap<AgentState, Arc<dyn Processor>>,
    state: AgentState,
    round_delay: Duration,
    shutdown_grace: Duration,
    round_number: AtomicU64,
    stop: watch::Receiver<bool>,
}

impl ProcessorRuntime {
    pub fn new(
        processors: Vec<Arc<dyn Processor>>,
        initial_state: AgentState,
        round_delay_seconds: f64,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let mut map = HashMap::new();
        for processor in processors {
            for state in processor.supported_states() {
                map.insert(*state, processor.clone());
            }
        }
        Self {
            processors: map,
            state: initial_state,
            round_delay: Duration::from_secs_f64(round_delay_seconds.max(0.0)),
            shutdown_grace: Duration::from_secs(10),
            round_number: AtomicU64::new(0),
            stop,
        }
    }

    pub fn current_state(&self) -> AgentState {
        self.state
    }

    /// Runs rounds until a stop signal arrives or a processor transitions
    /// into `AgentState::Shutdown` and that round completes.
    pub async fn run(&mut self) -> Result<(), PersistenceError> {
        loop {
            if *self.stop.borrow() {
                break;
            }

            let round_number = self.round_number.fetch_add(1, Ordering::SeqCst) + 1;
            let Some(processor) = self.processors.get(&self.state).cloned() else {
                tracing::error!(state = self.state.as_str(), "no processor registered for state");
                break;
            };

            let outcome = processor.run_round(round_number).await?;
            if let Some(next_state) = outcome.next_state {
                tracing::info!(from = self.state.as_str(), to = next_state.as_str(), "agent state transition");
                self.state = next_state;
            }

            if self.state == AgentState::Shutdown && outcome.next_state.is_none() {
                // The shutdown processor reports completion by staying in
                // SHUTDOWN with no further transition requested.
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.round_delay) => {}
                _ = self.wait_for_stop() => {
                    tracing::info!("stop signal received; ending round loop");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Caller-side helper: after flipping the stop signal, await this
    /// runtime's `run()` task up to the grace period before cancelling it
    /// hard (spec.md §5 "Cancellation & shutdown").
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    async fn wait_for_stop(&self) {
        let mut rx = self.stop.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}
