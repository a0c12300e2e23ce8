use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::Position;

/// Static terrain of a kitchen cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Floor,
    Counter,
    Pot,
    OnionDispenser,
    DishDispenser,
    Serving,
}

impl Terrain {
    pub fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            ' ' | '1' | '2' => Some(Terrain::Floor),
            'X' => Some(Terrain::Counter),
            'P' => Some(Terrain::Pot),
            'O' => Some(Terrain::OnionDispenser),
            'D' => Some(Terrain::DishDispenser),
            'S' => Some(Terrain::Serving),
            _ => None,
        }
    }

    pub fn glyph(self) -> char {
        match self {
            Terrain::Floor => ' ',
            Terrain::Counter => 'X',
            Terrain::Pot => 'P',
            Terrain::OnionDispenser => 'O',
            Terrain::DishDispenser => 'D',
            Terrain::Serving => 'S',
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("layout is empty")]
    Empty,

    #[error("row {row} has width {found}, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown glyph {glyph:?} at ({x}, {y})")]
    UnknownGlyph { glyph: char, x: usize, y: usize },

    #[error("missing start marker for player {0}")]
    MissingStart(usize),

    #[error("duplicate start marker for player {0}")]
    DuplicateStart(usize),

    #[error("unknown layout name {0:?}")]
    UnknownName(String),
}

const CRAMPED_ROOM: &str = "\
XXPXX
O  2O
X1  X
XDXSX";

const ASYMMETRIC_ADVANTAGES: &str = "\
XXXXXXXXX
O XSXOX S
X   P   X
X 1 P 2 X
XXXDXDXXX";

const FORCED_COORDINATION: &str = "\
XXXPX
O X1P
O2X X
D X X
XXXSX";

/// Immutable terrain grid plus player start positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub name: String,
    pub width: i32,
    pub height: i32,
    grid: Vec<Vec<Terrain>>,
    start_positions: Vec<Position>,
}

impl Layout {
    pub const BUILT_IN: [&'static str; 3] =
        ["cramped_room", "asymmetric_advantages", "forced_coordination"];

    pub fn from_name(name: &str) -> Result<Self, LayoutError> {
        let ascii = match name {
            "cramped_room" => CRAMPED_ROOM,
            "asymmetric_advantages" => ASYMMETRIC_ADVANTAGES,
            "forced_coordination" => FORCED_COORDINATION,
            _ => return Err(LayoutError::UnknownName(name.to_string())),
        };
        Self::parse(name, ascii)
    }

    /// Parse an ASCII layout. `1` and `2` mark the player start cells.
    pub fn parse(name: &str, ascii: &str) -> Result<Self, LayoutError> {
        let rows: Vec<&str> = ascii.lines().filter(|line| !line.is_empty()).collect();
        let expected = rows.first().ok_or(LayoutError::Empty)?.chars().count();

        let mut grid = Vec::with_capacity(rows.len());
        let mut starts: [Option<Position>; 2] = [None, None];

        for (y, row) in rows.iter().enumerate() {
            let found = row.chars().count();
            if found != expected {
                return Err(LayoutError::RaggedRow {
                    row: y,
                    expected,
                    found,
                });
            }

            let mut cells = Vec::with_capacity(expected);
            for (x, glyph) in row.chars().enumerate() {
                let terrain =
                    Terrain::from_glyph(glyph).ok_or(LayoutError::UnknownGlyph { glyph, x, y })?;
                if let Some(player) = glyph.to_digit(10) {
                    let slot = &mut starts[player as usize - 1];
                    if slot.is_some() {
                        return Err(LayoutError::DuplicateStart(player as usize));
                    }
                    *slot = Some(Position::new(x as i32, y as i32));
                }
                cells.push(terrain);
            }
            grid.push(cells);
        }

        let start_positions = starts
            .iter()
            .enumerate()
            .map(|(i, start)| start.ok_or(LayoutError::MissingStart(i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            width: expected as i32,
            height: grid.len() as i32,
            grid,
            start_positions,
        })
    }

    pub fn tile(&self, pos: &Position) -> Option<Terrain> {
        if pos.x < 0 || pos.y < 0 {
            return None;
        }
        self.grid
            .get(pos.y as usize)
            .and_then(|row| row.get(pos.x as usize))
            .copied()
    }

    pub fn is_floor(&self, pos: &Position) -> bool {
        self.tile(pos) == Some(Terrain::Floor)
    }

    pub fn start_positions(&self) -> &[Position] {
        &self.start_positions
    }

    /// `(width, height)`
    pub fn shape(&self) -> (usize, usize) {
        (self.width as usize, self.height as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, Terrain)> + '_ {
        self.grid.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, terrain)| (Position::new(x as i32, y as i32), *terrain))
        })
    }

    pub fn locations(&self, terrain: Terrain) -> Vec<Position> {
        self.iter()
            .filter(|(_, t)| *t == terrain)
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn pot_locations(&self) -> Vec<Position> {
        self.locations(Terrain::Pot)
    }

    pub fn counter_locations(&self) -> Vec<Position> {
        self.locations(Terrain::Counter)
    }

    pub fn draw_ascii(&self) -> String {
        self.grid
            .iter()
            .map(|row| row.iter().map(|t| t.glyph()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_layouts_parse() {
        for name in Layout::BUILT_IN {
            let layout = Layout::from_name(name).unwrap();
            assert_eq!(layout.start_positions().len(), 2);
            for start in layout.start_positions() {
                assert!(layout.is_floor(start));
            }
            assert!(!layout.pot_locations().is_empty());
        }
    }

    #[test]
    fn test_forced_coordination_tiles() {
        let layout = Layout::from_name("forced_coordination").unwrap();
        assert_eq!(layout.shape(), (5, 5));
        assert_eq!(layout.tile(&Position::new(3, 0)), Some(Terrain::Pot));
        assert_eq!(layout.tile(&Position::new(0, 3)), Some(Terrain::DishDispenser));
        assert_eq!(layout.tile(&Position::new(3, 4)), Some(Terrain::Serving));
        assert_eq!(layout.tile(&Position::new(-1, 0)), None);
        assert_eq!(layout.start_positions()[0], Position::new(3, 1));
        assert_eq!(layout.start_positions()[1], Position::new(1, 2));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Layout::parse("bad", "XXX\nX1"),
            Err(LayoutError::RaggedRow {
                row: 1,
                expected: 3,
                found: 2
            })
        );
        assert!(matches!(
            Layout::parse("bad", "X1Q2"),
            Err(LayoutError::UnknownGlyph { glyph: 'Q', .. })
        ));
        assert_eq!(Layout::parse("bad", "X1 X"), Err(LayoutError::MissingStart(2)));
        assert_eq!(Layout::parse("bad", "11 2"), Err(LayoutError::DuplicateStart(1)));
        assert!(matches!(
            Layout::from_name("nowhere"),
            Err(LayoutError::UnknownName(_))
        ));
    }

    #[test]
    fn test_draw_ascii_drops_start_markers() {
        let layout = Layout::from_name("cramped_room").unwrap();
        assert_eq!(layout.draw_ascii(), "XXPXX\nO   O\nX   X\nXDXSX");
    }
}
