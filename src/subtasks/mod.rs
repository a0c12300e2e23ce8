//! Subtask taxonomy, completion detection and feasibility masking
//!
//! ```text
//! (prev GameState, curr GameState)
//!     │
//!     ▼
//! completed_subtask()  ──► Option<Subtask> per player
//!
//! curr GameState
//!     │
//!     ▼
//! doable_subtasks()    ──► SubtaskMask consumed by managers
//! ```

mod detector;
mod feasibility;
mod taxonomy;

pub use detector::{SubtaskError, completed_subtask, completed_subtasks, facing};
pub use feasibility::doable_subtasks;
pub use taxonomy::{Subtask, SubtaskCategory, SubtaskMask, UnknownSubtask};
