//! Concrete action handlers, one per closed action (spec.md §4.4), grounded
//! file-for-file in `original_source/ciris_engine/core/action_handlers/`.

mod defer;
mod forget;
mod memorize;
mod observe;
mod ponder;
mod recall;
mod reject;
mod speak;
mod task_complete;
mod tool;

pub use defer::DeferHandler;
pub use forget::ForgetHandler;
pub use memorize::MemorizeHandler;
pub use observe::ObserveHandler;
pub use ponder::PonderHandler;
pub use recall::RecallHandler;
pub use reject::RejectHandler;
pub use speak::SpeakHandler;
pub use task_complete::TaskCompleteHandler;
pub use tool::ToolHandler;

use crate::domain::models::Thought;

/// Builds the one follow-up thought a terminal handler may create
/// (spec.md §4.4: "optionally creates exactly one follow-up Thought").
/// `priority_offset` is +1 on success, 0 on failure/partial outcomes, per
/// the original's `create_follow_up_thought(priority_offset=...)`, clamped
/// to a non-negative priority.
pub fn make_follow_up(parent: &Thought, content: impl Into<String>, success: bool) -> Thought {
    let offset = if success { 1 } else { 0 };
    Thought::new_follow_up(parent, content).with_priority((parent.priority + offset).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TaskContext, TaskId};

    #[test]
    fn success_raises_priority_by_one() {
        let parent = Thought::new_seed(TaskId::new(), "p", TaskContext::default()).with_priority(4);
        let follow_up = make_follow_up(&parent, "done", true);
        assert_eq!(follow_up.priority, 5);
    }

    #[test]
    fn failure_leaves_priority_unchanged() {
        let parent = Thought::new_seed(TaskId::new(), "p", TaskContext::default()).with_priority(4);
        let follow_up = make_follow_up(&parent, "failed", false);
        assert_eq!(follow_up.priority, 4);
    }

    #[test]
    fn priority_is_clamped_to_non_negative() {
        let parent = Thought::new_seed(TaskId::new(), "p", TaskContext::default()).with_priority(0);
        let follow_up = make_follow_up(&parent, "failed", false);
        assert_eq!(follow_up.priority, 0);
    }
}
