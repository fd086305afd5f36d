//! Typed views over the status lookup tables.
//!
//! The schema stores every status as a SMALLINT foreign key into a seeded
//! `*_statuses` table. The enums here pin that seed ordering on the Rust
//! side: each variant's discriminant is the row id the migration inserts
//! for it, so `id()` and `from_id()` translate both ways without a query.

/// Raw status id as stored in the database (SMALLINT / SMALLSERIAL).
pub type StatusId = i16;

/// Declares a status enum whose discriminants mirror a lookup table's seed
/// rows, together with the two id conversions every caller needs.
macro_rules! status_lookup {
    (
        $(#[$outer:meta])*
        $name:ident {
            $( $(#[$inner:meta])* $variant:ident = $id:literal ),+ $(,)?
        }
    ) => {
        $(#[$outer])*
        #[repr(i16)]
        #[derive(Clone, Copy, Debug, Eq, PartialEq)]
        pub enum $name {
            $( $(#[$inner])* $variant = $id ),+
        }

        impl $name {
            /// The lookup-table row id for this status.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Translate a raw id back; `None` for ids outside the seed set.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $id => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(status: $name) -> StatusId {
                status.id()
            }
        }
    };
}

status_lookup! {
    /// Workflow lifecycle status.
    WorkflowStatus {
        Draft = 1,
        Active = 2,
        Archived = 3,
    }
}

status_lookup! {
    /// Execution lifecycle status. Terminal states are sticky.
    ExecutionStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        Failed = 4,
        Cancelled = 5,
    }
}

status_lookup! {
    /// Step execution status.
    StepStatus {
        Pending = 1,
        Running = 2,
        Completed = 3,
        Failed = 4,
        Skipped = 5,
    }
}

status_lookup! {
    /// Durable queue row status.
    QueueStatus {
        Pending = 1,
        Processing = 2,
        Done = 3,
        Failed = 4,
    }
}

impl ExecutionStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl StepStatus {
    /// Completed or skipped: the step no longer blocks downstream nodes.
    pub fn is_settled(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}
