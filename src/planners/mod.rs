pub mod heuristic;
pub mod hrl;
