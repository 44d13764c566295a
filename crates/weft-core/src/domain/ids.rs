//! Task identifiers.
//!
//! Ids are ULIDs (Universally Unique Lexicographically Sortable Identifier):
//! - sortable by creation time, since the timestamp comes first
//! - 128-bit, generated without coordination
//!
//! Generation goes through the [`IdGenerator`](crate::ports::IdGenerator) port
//! so tests can pin the timestamp part with a fixed clock.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a submitted task. Assigned by the manager at submission.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_task_prefix() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);

        assert_eq!(id.as_ulid(), ulid);
        assert!(id.to_string().starts_with("task-"));
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ids_can_be_serialized() {
        let id = TaskId::from(Ulid::new());

        let serialized = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(id, back);
    }

    #[test]
    fn id_is_the_size_of_a_ulid() {
        assert_eq!(std::mem::size_of::<TaskId>(), 16);
    }
}
