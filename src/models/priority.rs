//! Process priority classes.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Scheduling priority applied to a worker process after it is spawned.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPriority {
    /// Runs only when the system is otherwise idle.
    Lowest,
    /// Yields to normal-priority work.
    BelowNormal,
    /// Inherited default; no adjustment is made.
    #[default]
    Normal,
    /// Preferred over normal-priority work.
    AboveNormal,
    /// Highest class available without real-time scheduling.
    Highest,
}

impl ProcessPriority {
    /// Unix nice value corresponding to this class.
    ///
    /// Raising priority (negative values) usually requires elevated
    /// privileges; failures are reported as [`crate::AppError::Priority`].
    #[must_use]
    pub fn niceness(self) -> i32 {
        match self {
            Self::Lowest => 19,
            Self::BelowNormal => 10,
            Self::Normal => 0,
            Self::AboveNormal => -5,
            Self::Highest => -10,
        }
    }
}

impl Display for ProcessPriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lowest => "lowest",
            Self::BelowNormal => "below_normal",
            Self::Normal => "normal",
            Self::AboveNormal => "above_normal",
            Self::Highest => "highest",
        };
        f.write_str(name)
    }
}
