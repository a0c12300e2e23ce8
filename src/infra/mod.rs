mod default_observer;
mod game_observer;
mod pathfinding;
pub mod trajectory;
mod types;

pub use default_observer::DefaultObserver;
pub use game_observer::GameObserver;
pub use pathfinding::AStar;
pub use trajectory::{
    Trajectory, TrajectoryError, TrajectoryHeader, TrajectoryRecorder, TrajectoryRow,
    combine_trials, label_subtasks, load_combined, load_trajectory,
};
pub use types::{Action, Direction, JointAction, Position};

// ============================================================================
// Helper functions
// ============================================================================

/// Movement that takes the first step along `path` (which starts at `current`)
pub fn path_to_action(current: Position, path: &[Position]) -> Option<Action> {
    if path.len() < 2 {
        return None;
    }
    current.direction_to(&path[1]).map(Action::movement)
}

/// Action that makes a player at `from` face the adjacent tile `to`.
/// Facing an obstacle only turns the player, so this is a plain movement.
pub fn face_action(from: Position, to: Position) -> Option<Action> {
    from.direction_to(&to).map(Action::movement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_action() {
        let current = Position::new(1, 1);
        let path = [current, Position::new(1, 2)];
        assert_eq!(path_to_action(current, &path), Some(Action::South));
        assert_eq!(path_to_action(current, &path[..1]), None);
    }

    #[test]
    fn test_face_action() {
        assert_eq!(face_action(Position::new(1, 1), Position::new(0, 1)), Some(Action::West));
        assert_eq!(face_action(Position::new(1, 1), Position::new(3, 1)), None);
    }
}
