use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::infra::Position;
use crate::state::Layout;

#[derive(Clone, Eq, PartialEq)]
struct Node {
    pos: Position,
    f_score: i32,
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.pos.cmp(&self.pos))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct AStar;

impl AStar {
    /// Shortest floor path from `start` to `goal`, both included.
    /// `is_walkable` can veto floor cells, e.g. the one the teammate occupies.
    pub fn find_path<F>(
        layout: &Layout,
        start: Position,
        goal: Position,
        is_walkable: F,
    ) -> Option<Vec<Position>>
    where
        F: Fn(&Position) -> bool,
    {
        if start == goal {
            return Some(vec![goal]);
        }

        let mut open_set = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut g_score: HashMap<Position, i32> = HashMap::new();
        let mut closed_set: HashSet<Position> = HashSet::new();

        g_score.insert(start, 0);
        open_set.push(Node {
            pos: start,
            f_score: heuristic(start, goal),
        });

        while let Some(Node { pos: current, .. }) = open_set.pop() {
            if current == goal {
                return Some(reconstruct_path(&came_from, current));
            }

            if !closed_set.insert(current) {
                continue;
            }

            let current_g_score = g_score.get(&current).copied().unwrap_or(0);

            for neighbor in current.neighbors() {
                if closed_set.contains(&neighbor)
                    || !layout.is_floor(&neighbor)
                    || !is_walkable(&neighbor)
                {
                    continue;
                }

                let tentative_g = current_g_score + 1;
                if tentative_g < g_score.get(&neighbor).copied().unwrap_or(i32::MAX) {
                    came_from.insert(neighbor, current);
                    g_score.insert(neighbor, tentative_g);
                    open_set.push(Node {
                        pos: neighbor,
                        f_score: tentative_g + heuristic(neighbor, goal),
                    });
                }
            }
        }

        None
    }

    /// Shortest path to any floor cell adjacent to one of `targets`.
    /// Returns the path and the target it ends next to.
    pub fn find_path_to_adjacent<F>(
        layout: &Layout,
        start: Position,
        targets: &[Position],
        is_walkable: F,
    ) -> Option<(Vec<Position>, Position)>
    where
        F: Fn(&Position) -> bool,
    {
        let mut best: Option<(Vec<Position>, Position)> = None;

        for target in targets {
            for cell in target.neighbors() {
                if !layout.is_floor(&cell) || (cell != start && !is_walkable(&cell)) {
                    continue;
                }
                if let Some(path) = Self::find_path(layout, start, cell, &is_walkable)
                    && best.as_ref().is_none_or(|(b, _)| path.len() < b.len())
                {
                    best = Some((path, *target));
                }
            }
        }

        best
    }
}

fn heuristic(a: Position, b: Position) -> i32 {
    a.distance(&b)
}

fn reconstruct_path(came_from: &HashMap<Position, Position>, mut current: Position) -> Vec<Position> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_around_pots() {
        let layout = Layout::from_name("asymmetric_advantages").unwrap();
        let path = AStar::find_path(&layout, Position::new(1, 2), Position::new(3, 3), |_| true)
            .unwrap();
        assert_eq!(path.first(), Some(&Position::new(1, 2)));
        assert_eq!(path.last(), Some(&Position::new(3, 3)));
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_unreachable_across_wall() {
        let layout = Layout::from_name("forced_coordination").unwrap();
        assert!(AStar::find_path(&layout, Position::new(1, 2), Position::new(3, 2), |_| true).is_none());
    }

    #[test]
    fn test_blocked_cell_is_avoided() {
        let layout = Layout::from_name("cramped_room").unwrap();
        let blocked = Position::new(2, 1);
        let path = AStar::find_path(&layout, Position::new(1, 1), Position::new(3, 1), |p| *p != blocked)
            .unwrap();
        assert!(!path.contains(&blocked));
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn test_adjacent_to_closest_target() {
        let layout = Layout::from_name("forced_coordination").unwrap();
        let dispensers = [Position::new(0, 1), Position::new(0, 2)];
        let (path, target) =
            AStar::find_path_to_adjacent(&layout, Position::new(1, 3), &dispensers, |_| true).unwrap();
        assert_eq!(target, Position::new(0, 2));
        assert_eq!(path, vec![Position::new(1, 3), Position::new(1, 2)]);
    }
}
