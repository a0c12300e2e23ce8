mod game_state;
mod layout;
mod objects;
mod player_state;
pub mod simulator;

pub use game_state::GameState;
pub use layout::{Layout, LayoutError, Terrain};
pub use objects::{COOK_TIME, MAX_INGREDIENTS, ObjectId, ObjectKind, Soup, WorldObject};
pub use player_state::PlayerState;
pub use simulator::{Kitchen, Simulator, StepOutcome};
