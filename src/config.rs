//! Run configuration read from `KITCHEN_*` environment variables

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::planners::hrl::EncodingScheme;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub layout: String,
    pub horizon: u32,
    pub encoding: EncodingScheme,
    pub episodes: usize,
    pub seed: Option<u64>,
    /// Record trajectories here when set
    pub data_path: Option<PathBuf>,
    /// Trajectory file to replay and label instead of playing
    pub replay: Option<PathBuf>,
    /// Merge recorded trials in `data_path` and exit
    pub combine: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            layout: "forced_coordination".to_string(),
            horizon: 400,
            encoding: EncodingScheme::DenseLossless,
            episodes: 1,
            seed: None,
            data_path: None,
            replay: None,
            combine: false,
        }
    }
}

impl RunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(layout) = lookup("KITCHEN_LAYOUT") {
            config.layout = layout;
        }
        if let Some(value) = lookup("KITCHEN_HORIZON") {
            config.horizon = parse("KITCHEN_HORIZON", value, "tick count")?;
        }
        if let Some(value) = lookup("KITCHEN_ENCODING") {
            config.encoding = parse("KITCHEN_ENCODING", value, "encoding scheme")?;
        }
        if let Some(value) = lookup("KITCHEN_EPISODES") {
            config.episodes = parse("KITCHEN_EPISODES", value, "episode count")?;
        }
        if let Some(value) = lookup("KITCHEN_SEED") {
            config.seed = Some(parse("KITCHEN_SEED", value, "u64 seed")?);
        }
        config.data_path = lookup("KITCHEN_DATA_PATH").map(PathBuf::from);
        config.replay = lookup("KITCHEN_REPLAY").map(PathBuf::from);
        if let Some(value) = lookup("KITCHEN_COMBINE") {
            config.combine = parse("KITCHEN_COMBINE", value, "bool")?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String, expected: &'static str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value, expected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RunConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let config = RunConfig::from_lookup(lookup(&[
            ("KITCHEN_LAYOUT", "cramped_room"),
            ("KITCHEN_HORIZON", "200"),
            ("KITCHEN_ENCODING", "oai_feats"),
            ("KITCHEN_EPISODES", "5"),
            ("KITCHEN_SEED", "42"),
            ("KITCHEN_DATA_PATH", "data/trials"),
            ("KITCHEN_COMBINE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.layout, "cramped_room");
        assert_eq!(config.horizon, 200);
        assert_eq!(config.encoding, EncodingScheme::OaiFeats);
        assert_eq!(config.episodes, 5);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.data_path, Some(PathBuf::from("data/trials")));
        assert_eq!(config.replay, None);
        assert!(config.combine);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let err = RunConfig::from_lookup(lookup(&[("KITCHEN_HORIZON", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "KITCHEN_HORIZON",
                value: "soon".to_string(),
                expected: "tick count",
            }
        );
    }
}
