pub mod config;
pub mod infra;
pub mod planners;
pub mod state;
pub mod subtasks;

// Re-export commonly used types for convenience
pub use infra::{Action, AStar, Position};
pub use state::{GameState, Kitchen, Layout, Simulator};
pub use subtasks::Subtask;
