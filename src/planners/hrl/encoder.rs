//! State encoders - convert a GameState into policy observations
//!
//! Three interchangeable schemes. A policy must be run with the scheme it
//! was trained against; the channel and feature layouts below are fixed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::{Direction, Position};
use crate::state::{GameState, Layout, ObjectKind, Terrain, WorldObject};

use super::observation::{ObsTensor, Observation};

/// Ticks left below which the urgency flag is raised
pub const URGENCY_THRESHOLD: u32 = 40;

/// Per-player feature count of the `oai_feats` scheme
pub const PLAYER_FEATURES: usize = 30;
/// Total feature count of the `oai_feats` scheme
pub const OAI_FEATURES: usize = 2 * PLAYER_FEATURES + 4;
/// Channel count of the `oai_lossless` scheme
pub const LOSSLESS_CHANNELS: usize = 20;

// Dense channel layout
const AGENT_CHANNEL: usize = 0;
const TERRAIN_CHANNEL: usize = 1;
const ITEM_CHANNEL: usize = 2;
const STATUS_1_CHANNEL: usize = 3;
const STATUS_2_CHANNEL: usize = 4;

// Pot status values on the first status channel (idle pots carry their onion count)
const POT_COOKING: f32 = 3.0;
const POT_READY: f32 = 4.0;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unknown encoding scheme {0:?}")]
    UnknownScheme(String),

    #[error("layout {layout:?} does not fit in grid shape {grid:?}")]
    GridTooSmall {
        layout: (usize, usize),
        grid: (usize, usize),
    },

    #[error("player index {0} out of range")]
    InvalidPlayer(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingScheme {
    /// 5-channel id grid plus a 7-feature agent vector
    DenseLossless,
    /// 64 hand-crafted features, no grid
    OaiFeats,
    /// 20 one-hot style channels, no agent vector
    OaiLossless,
}

impl EncodingScheme {
    pub fn name(self) -> &'static str {
        match self {
            EncodingScheme::DenseLossless => "dense_lossless",
            EncodingScheme::OaiFeats => "oai_feats",
            EncodingScheme::OaiLossless => "oai_lossless",
        }
    }
}

impl fmt::Display for EncodingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncodingScheme {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dense_lossless" => Ok(EncodingScheme::DenseLossless),
            "oai_feats" => Ok(EncodingScheme::OaiFeats),
            "oai_lossless" => Ok(EncodingScheme::OaiLossless),
            _ => Err(EncodingError::UnknownScheme(s.to_string())),
        }
    }
}

/// Configuration for the state encoder
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub scheme: EncodingScheme,
    /// Grid the visual observation is padded to, defaults to the layout's shape
    pub grid_shape: Option<(usize, usize)>,
    pub horizon: u32,
    /// Dense scheme: produce the agent vector
    pub include_agent_obs: bool,
    /// Dense scheme: fifth channel with direction / cook time remaining
    pub include_soup_time: bool,
    /// Dense scheme: urgency flag as the seventh agent feature
    pub include_urgency: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            scheme: EncodingScheme::DenseLossless,
            grid_shape: None,
            horizon: 400,
            include_agent_obs: true,
            include_soup_time: true,
            include_urgency: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateEncoder {
    config: EncoderConfig,
}

impl StateEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn grid_shape(&self, layout: &Layout) -> (usize, usize) {
        self.config.grid_shape.unwrap_or_else(|| layout.shape())
    }

    /// Encode `state` for `player_index`, or for both players when `None`
    /// (the results are then stacked along a leading axis of size 2).
    #[tracing::instrument(level = "trace", skip(self, layout, state))]
    pub fn encode(
        &self,
        layout: &Layout,
        state: &GameState,
        player_index: Option<usize>,
    ) -> Result<Observation, EncodingError> {
        let grid_shape = self.grid_shape(layout);
        let (width, height) = layout.shape();
        if width > grid_shape.0 || height > grid_shape.1 {
            return Err(EncodingError::GridTooSmall {
                layout: (width, height),
                grid: grid_shape,
            });
        }
        if let Some(p) = player_index
            && p >= state.players.len()
        {
            return Err(EncodingError::InvalidPlayer(p));
        }

        Ok(match self.config.scheme {
            EncodingScheme::DenseLossless => self.encode_dense(layout, state, grid_shape, player_index),
            EncodingScheme::OaiFeats => encode_features(layout, state, player_index),
            EncodingScheme::OaiLossless => encode_lossless(layout, state, grid_shape, player_index),
        })
    }

    fn encode_dense(
        &self,
        layout: &Layout,
        state: &GameState,
        grid_shape: (usize, usize),
        player_index: Option<usize>,
    ) -> Observation {
        let config = &self.config;
        let channels = if config.include_soup_time { 5 } else { 4 };
        let has_status_2 = channels > STATUS_2_CHANNEL;
        let mut visual = ObsTensor::zeros(&[channels, grid_shape.0, grid_shape.1]);
        let mut set = |channel: usize, pos: &Position, value: f32| {
            visual.set(&[channel, pos.x as usize, pos.y as usize], value);
        };

        for (pos, terrain) in layout.iter() {
            set(TERRAIN_CHANNEL, &pos, terrain_id(terrain));
        }

        for (i, player) in state.players.iter().enumerate() {
            set(AGENT_CHANNEL, &player.position, (i + 1) as f32);
            if let Some(kind) = player.held_kind() {
                set(STATUS_1_CHANNEL, &player.position, kind.item_id() as f32);
            }
            if has_status_2 {
                set(STATUS_2_CHANNEL, &player.position, player.orientation.index() as f32);
            }
        }

        // Held objects share their holder's cell
        for obj in state.all_objects() {
            if obj.kind == ObjectKind::Soup && layout.tile(&obj.position) == Some(Terrain::Pot) {
                // Soups in pots are encoded as pot status rather than items
                if let Some(soup) = obj.soup {
                    if soup.is_idle() {
                        set(STATUS_1_CHANNEL, &obj.position, soup.onions as f32);
                    } else if soup.is_ready() {
                        set(STATUS_1_CHANNEL, &obj.position, POT_READY);
                    } else {
                        set(STATUS_1_CHANNEL, &obj.position, POT_COOKING);
                        if has_status_2 {
                            set(STATUS_2_CHANNEL, &obj.position, soup.cook_time_remaining() as f32);
                        }
                    }
                }
            } else {
                set(ITEM_CHANNEL, &obj.position, obj.kind.item_id() as f32);
            }
        }

        let agent_features = if !config.include_agent_obs {
            0
        } else if config.include_urgency {
            7
        } else {
            6
        };
        let time_left = config.horizon.saturating_sub(state.timestep);
        let agent_rows: Vec<ObsTensor> = state
            .players
            .iter()
            .enumerate()
            .map(|(i, player)| {
                let mut row = ObsTensor::zeros(&[agent_features]);
                if agent_features == 0 {
                    return row;
                }
                row.set(&[0], i as f32);
                row.set(&[1], player.position.x as f32);
                row.set(&[2], player.position.y as f32);
                row.set(&[3], player.orientation.index() as f32);
                row.set(&[4], player.held_kind().map_or(0, |k| k.item_id()) as f32);
                row.set(&[5], time_left as f32);
                if config.include_urgency && time_left < URGENCY_THRESHOLD {
                    row.set(&[6], 1.0);
                }
                row
            })
            .collect();

        match player_index {
            Some(p) => Observation::new(visual, agent_rows[p].clone()),
            None => Observation::new(
                ObsTensor::stack(&[visual.clone(), visual]).unwrap_or_default(),
                ObsTensor::stack(&agent_rows).unwrap_or_default(),
            ),
        }
    }
}

/// Terrain ids of the dense scheme. Id 4 stays reserved for a second
/// ingredient dispenser so trained models keep their meaning.
pub fn terrain_id(terrain: Terrain) -> f32 {
    match terrain {
        Terrain::Floor => 0.0,
        Terrain::Counter => 1.0,
        Terrain::Pot => 2.0,
        Terrain::OnionDispenser => 3.0,
        Terrain::DishDispenser => 5.0,
        Terrain::Serving => 6.0,
    }
}

fn encode_features(layout: &Layout, state: &GameState, player_index: Option<usize>) -> Observation {
    let rows: Vec<ObsTensor> = (0..state.players.len().min(2))
        .filter_map(|p| ObsTensor::from_vec(&[OAI_FEATURES], player_features_for(layout, state, p)))
        .collect();

    let agent_obs = match player_index {
        Some(p) => rows.get(p).cloned().unwrap_or_default(),
        None => ObsTensor::stack(&rows).unwrap_or_default(),
    };
    Observation::new(ObsTensor::empty(), agent_obs)
}

/// `[own 30, teammate 30, teammate - own position, own position]`
fn player_features_for(layout: &Layout, state: &GameState, p: usize) -> Vec<f32> {
    let other = 1 - p;
    let own = &state.players[p];
    let mate = &state.players[other];

    let mut features = Vec::with_capacity(OAI_FEATURES);
    features.extend(single_player_features(layout, state, p));
    features.extend(single_player_features(layout, state, other));
    features.push((mate.position.x - own.position.x) as f32);
    features.push((mate.position.y - own.position.y) as f32);
    features.push(own.position.x as f32);
    features.push(own.position.y as f32);
    features
}

fn single_player_features(layout: &Layout, state: &GameState, p: usize) -> Vec<f32> {
    let player = &state.players[p];
    let pos = player.position;
    let held = player.held_kind();
    let mut features = Vec::with_capacity(PLAYER_FEATURES);

    for direction in Direction::ALL {
        features.push(if player.orientation == direction { 1.0 } else { 0.0 });
    }
    for kind in ObjectKind::ALL {
        features.push(if held == Some(kind) { 1.0 } else { 0.0 });
    }

    let loose = |kind: ObjectKind| -> Vec<Position> {
        state
            .objects()
            .filter(|obj| obj.kind == kind && layout.tile(&obj.position) != Some(Terrain::Pot))
            .map(|obj| obj.position)
            .collect()
    };
    let with_dispensers = |kind: ObjectKind, terrain: Terrain| -> Vec<Position> {
        let mut sources = loose(kind);
        sources.extend(layout.locations(terrain));
        sources
    };

    // Nothing to look for when the item is already in hand
    let sources_unless_held = |kind: ObjectKind, sources: Vec<Position>| -> Vec<Position> {
        if held == Some(kind) { Vec::new() } else { sources }
    };

    let pots: Vec<(Position, Option<&WorldObject>)> = layout
        .pot_locations()
        .into_iter()
        .map(|pot| (pot, state.object_at(&pot)))
        .collect();

    let empty_counters: Vec<Position> = layout
        .counter_locations()
        .into_iter()
        .filter(|c| !state.has_object_at(c))
        .collect();

    let targets = [
        sources_unless_held(ObjectKind::Onion, with_dispensers(ObjectKind::Onion, Terrain::OnionDispenser)),
        sources_unless_held(ObjectKind::Dish, with_dispensers(ObjectKind::Dish, Terrain::DishDispenser)),
        sources_unless_held(ObjectKind::Soup, loose(ObjectKind::Soup)),
        layout.locations(Terrain::Serving),
        empty_counters,
        pots_where(&pots, |obj| obj.is_none()),
        pots_where(&pots, |obj| obj.is_some_and(|o| o.is_idle())),
        pots_where(&pots, |obj| obj.is_some_and(|o| o.is_cooking())),
        pots_where(&pots, |obj| obj.is_some_and(|o| o.is_ready())),
    ];
    for candidates in &targets {
        let (dx, dy) = closest_delta(pos, candidates);
        features.push(dx);
        features.push(dy);
    }

    let closest_pot_onions = closest(pos, &layout.pot_locations())
        .and_then(|pot| state.object_at(&pot))
        .and_then(|obj| obj.soup)
        .map_or(0, |soup| soup.onions);
    features.push(closest_pot_onions as f32);

    for direction in Direction::ALL {
        features.push(if layout.is_floor(&pos.step(direction)) { 0.0 } else { 1.0 });
    }

    features
}

fn pots_where(pots: &[(Position, Option<&WorldObject>)], pred: impl Fn(Option<&WorldObject>) -> bool) -> Vec<Position> {
    pots.iter().filter(|(_, obj)| pred(*obj)).map(|(pos, _)| *pos).collect()
}

fn closest(from: Position, candidates: &[Position]) -> Option<Position> {
    candidates.iter().copied().min_by_key(|c| from.distance(c))
}

fn closest_delta(from: Position, candidates: &[Position]) -> (f32, f32) {
    closest(from, candidates).map_or((0.0, 0.0), |c| ((c.x - from.x) as f32, (c.y - from.y) as f32))
}

fn encode_lossless(
    layout: &Layout,
    state: &GameState,
    grid_shape: (usize, usize),
    player_index: Option<usize>,
) -> Observation {
    let grids: Vec<ObsTensor> = (0..state.players.len().min(2))
        .map(|p| lossless_grid(layout, state, grid_shape, p))
        .collect();

    let visual_obs = match player_index {
        Some(p) => grids.get(p).cloned().unwrap_or_default(),
        None => ObsTensor::stack(&grids).unwrap_or_default(),
    };
    Observation::new(visual_obs, ObsTensor::empty())
}

/// Channel order: ego location, teammate location, ego orientation (4),
/// teammate orientation (4), pot, counter, onion dispenser, dish dispenser,
/// serving, onions in pot, cook ticks, soup, dishes, onions.
fn lossless_grid(layout: &Layout, state: &GameState, grid_shape: (usize, usize), ego: usize) -> ObsTensor {
    let mut grid = ObsTensor::zeros(&[LOSSLESS_CHANNELS, grid_shape.0, grid_shape.1]);
    let mut set = |channel: usize, pos: &Position, value: f32| {
        grid.set(&[channel, pos.x as usize, pos.y as usize], value);
    };

    let order = [ego, 1 - ego];
    for (slot, &p) in order.iter().enumerate() {
        let player = &state.players[p];
        set(slot, &player.position, 1.0);
        set(2 + slot * 4 + player.orientation.index(), &player.position, 1.0);
    }

    for (pos, terrain) in layout.iter() {
        let channel = match terrain {
            Terrain::Pot => 10,
            Terrain::Counter => 11,
            Terrain::OnionDispenser => 12,
            Terrain::DishDispenser => 13,
            Terrain::Serving => 14,
            Terrain::Floor => continue,
        };
        set(channel, &pos, 1.0);
    }

    for obj in state.all_objects() {
        match obj.kind {
            ObjectKind::Soup if layout.tile(&obj.position) == Some(Terrain::Pot) => {
                if let Some(soup) = obj.soup {
                    set(15, &obj.position, soup.onions as f32);
                    if let Some(ticks) = soup.cook_ticks {
                        set(16, &obj.position, ticks as f32);
                    }
                    if soup.is_ready() {
                        set(17, &obj.position, 1.0);
                    }
                }
            }
            ObjectKind::Soup => set(17, &obj.position, 1.0),
            ObjectKind::Dish => set(18, &obj.position, 1.0),
            ObjectKind::Onion => set(19, &obj.position, 1.0),
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Action;
    use crate::state::{COOK_TIME, Kitchen, Simulator, Soup};

    fn layout() -> Layout {
        Layout::from_name("forced_coordination").unwrap()
    }

    fn encoder(scheme: EncodingScheme) -> StateEncoder {
        StateEncoder::new(EncoderConfig {
            scheme,
            ..EncoderConfig::default()
        })
    }

    fn dense_at(obs: &Observation, channel: usize, x: usize, y: usize) -> f32 {
        obs.visual_obs.get(&[channel, x, y]).unwrap()
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!("dense_lossless".parse(), Ok(EncodingScheme::DenseLossless));
        assert_eq!("OAI_feats".parse(), Ok(EncodingScheme::OaiFeats));
        assert_eq!("OAI_lossless".parse(), Ok(EncodingScheme::OaiLossless));
        assert!("pixels".parse::<EncodingScheme>().is_err());
    }

    #[test]
    fn test_dense_initial_state() {
        let layout = layout();
        let state = GameState::initial(&layout);
        let obs = encoder(EncodingScheme::DenseLossless)
            .encode(&layout, &state, Some(0))
            .unwrap();

        assert_eq!(obs.visual_obs.shape(), &[5, 5, 5]);
        assert_eq!(dense_at(&obs, AGENT_CHANNEL, 3, 1), 1.0);
        assert_eq!(dense_at(&obs, AGENT_CHANNEL, 1, 2), 2.0);
        assert_eq!(dense_at(&obs, TERRAIN_CHANNEL, 3, 0), 2.0);
        assert_eq!(dense_at(&obs, TERRAIN_CHANNEL, 0, 1), 3.0);
        assert_eq!(dense_at(&obs, TERRAIN_CHANNEL, 0, 3), 5.0);
        assert_eq!(dense_at(&obs, TERRAIN_CHANNEL, 3, 4), 6.0);

        assert_eq!(obs.agent_obs.data(), &[0.0, 3.0, 1.0, 0.0, 0.0, 400.0, 0.0]);
    }

    #[test]
    fn test_dense_items_and_pot_status() {
        let layout = layout();
        let mut state = GameState::initial(&layout);
        let onion = state.spawn(ObjectKind::Onion, Position::new(2, 1));
        state.add_object(onion);
        let mut soup = state.spawn(ObjectKind::Soup, Position::new(3, 0));
        soup.soup = Some(Soup {
            onions: 3,
            cook_ticks: Some(5),
        });
        state.add_object(soup);
        let dish = state.spawn(ObjectKind::Dish, Position::new(1, 2));
        state.players[1].held_object = Some(dish);

        let obs = encoder(EncodingScheme::DenseLossless)
            .encode(&layout, &state, Some(1))
            .unwrap();
        assert_eq!(dense_at(&obs, ITEM_CHANNEL, 2, 1), ObjectKind::Onion.item_id() as f32);
        assert_eq!(dense_at(&obs, ITEM_CHANNEL, 3, 0), 0.0);
        assert_eq!(dense_at(&obs, STATUS_1_CHANNEL, 3, 0), POT_COOKING);
        assert_eq!(dense_at(&obs, STATUS_2_CHANNEL, 3, 0), (COOK_TIME - 5) as f32);
        assert_eq!(dense_at(&obs, STATUS_1_CHANNEL, 1, 2), ObjectKind::Dish.item_id() as f32);
        assert_eq!(dense_at(&obs, ITEM_CHANNEL, 1, 2), ObjectKind::Dish.item_id() as f32);
        assert_eq!(obs.agent_obs.data()[4], ObjectKind::Dish.item_id() as f32);
    }

    #[test]
    fn test_dense_urgency() {
        let layout = layout();
        let mut state = GameState::initial(&layout);
        state.timestep = 365;
        let obs = encoder(EncodingScheme::DenseLossless)
            .encode(&layout, &state, Some(0))
            .unwrap();
        assert_eq!(obs.agent_obs.data()[5], 35.0);
        assert_eq!(obs.agent_obs.data()[6], 1.0);
    }

    #[test]
    fn test_both_players_without_index() {
        let layout = layout();
        let state = GameState::initial(&layout);

        let dense = encoder(EncodingScheme::DenseLossless).encode(&layout, &state, None).unwrap();
        assert_eq!(dense.visual_obs.shape(), &[2, 5, 5, 5]);
        assert_eq!(dense.agent_obs.shape(), &[2, 7]);

        let feats = encoder(EncodingScheme::OaiFeats).encode(&layout, &state, None).unwrap();
        assert_eq!(feats.agent_obs.shape(), &[2, OAI_FEATURES]);
        assert!(feats.visual_obs.is_empty());

        let lossless = encoder(EncodingScheme::OaiLossless).encode(&layout, &state, None).unwrap();
        assert_eq!(lossless.visual_obs.shape(), &[2, LOSSLESS_CHANNELS, 5, 5]);
        assert!(lossless.agent_obs.is_empty());
    }

    #[test]
    fn test_features_are_egocentric() {
        let layout = layout();
        let state = GameState::initial(&layout);
        let obs = encoder(EncodingScheme::OaiFeats).encode(&layout, &state, Some(1)).unwrap();
        let data = obs.agent_obs.data();
        assert_eq!(data.len(), 64);
        // Player 2 at (1, 2), teammate at (3, 1)
        assert_eq!(&data[60..64], &[2.0, -1.0, 1.0, 2.0]);
        // Facing north, holding nothing
        assert_eq!(&data[0..7], &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        // Closest onion source is the dispenser to the west
        assert_eq!(&data[7..9], &[-1.0, 0.0]);
    }

    #[test]
    fn test_lossless_puts_ego_first() {
        let layout = layout();
        let mut kitchen = Kitchen::new(layout.clone(), 400);
        kitchen.step([Action::Stay, Action::West]);
        kitchen.step([Action::Stay, Action::Interact]);
        let state = kitchen.state();

        let obs = encoder(EncodingScheme::OaiLossless).encode(&layout, state, Some(1)).unwrap();
        let at = |c: usize, x: usize, y: usize| obs.visual_obs.get(&[c, x, y]).unwrap();
        assert_eq!(at(0, 1, 2), 1.0);
        assert_eq!(at(1, 3, 1), 1.0);
        // Ego faces west, teammate north
        assert_eq!(at(2 + Direction::West.index(), 1, 2), 1.0);
        assert_eq!(at(6 + Direction::North.index(), 3, 1), 1.0);
        assert_eq!(at(10, 3, 0), 1.0);
        assert_eq!(at(19, 1, 2), 1.0);
    }

    #[test]
    fn test_grid_padding_and_limits() {
        let layout = layout();
        let state = GameState::initial(&layout);
        let padded = StateEncoder::new(EncoderConfig {
            scheme: EncodingScheme::OaiLossless,
            grid_shape: Some((7, 6)),
            ..EncoderConfig::default()
        });
        let obs = padded.encode(&layout, &state, Some(0)).unwrap();
        assert_eq!(obs.visual_obs.shape(), &[LOSSLESS_CHANNELS, 7, 6]);

        let small = StateEncoder::new(EncoderConfig {
            grid_shape: Some((3, 3)),
            ..EncoderConfig::default()
        });
        assert!(matches!(
            small.encode(&layout, &state, Some(0)),
            Err(EncodingError::GridTooSmall { .. })
        ));
        assert_eq!(
            encoder(EncodingScheme::DenseLossless).encode(&layout, &state, Some(2)),
            Err(EncodingError::InvalidPlayer(2))
        );
    }
}
