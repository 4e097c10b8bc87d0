//! Newtype identifiers.
//!
//! The original implementation used opaque strings for every id; we use
//! `Uuid`-backed newtypes instead (following the teacher's use of `Uuid`
//! for `Task::id`) so that task/thought/scheduled-task/correlation ids are
//! never interchangeable at the type level.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(TaskId);
uuid_id!(ThoughtId);
uuid_id!(CorrelationId);

/// Scheduled tasks carry a human-assigned name as well as an id; the id is
/// still a uuid newtype for consistency with the other aggregates.
uuid_id!(ScheduledTaskId);
