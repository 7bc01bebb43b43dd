use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_id!(WorkflowId, "Tenant-scoped workflow identifier.");
uuid_id!(WorkflowVersionId, "Identifier of one immutable workflow version snapshot.");
uuid_id!(ExecutionId, "Identifier of one workflow execution.");
uuid_id!(StepExecutionId, "Identifier of one step execution record.");

#[cfg(test)]
mod tests {
    use super::WorkflowId;

    #[test]
    fn workflow_id_round_trips_through_uuid() {
        let id = WorkflowId::new();
        let round_tripped = WorkflowId::from_uuid(id.as_uuid());
        assert_eq!(id, round_tripped);
    }
}
