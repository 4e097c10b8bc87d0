//! Processor framework (spec.md §4.2): one processor per lifecycle state,
//! driving the round loop and delegating per-round work.

pub mod round;
pub mod runtime;
pub mod shutdown;
pub mod wakeup;
pub mod work;

pub use round::TaskThoughtGraph;
pub use runtime::{Processor, ProcessorRuntime};
pub use shutdown::{ShutdownContext, ShutdownOutcome, ShutdownProcessor};
pub use wakeup::{WakeupMode, WakeupProcessor, WakeupStep};
pub use work::WorkProcessor;
