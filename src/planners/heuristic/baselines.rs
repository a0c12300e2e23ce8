use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use crate::infra::Action;
use crate::planners::hrl::{Policy, PolicyContext};

/// Uniformly random primitive actions
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        "random"
    }

    fn predict(&mut self, _ctx: &PolicyContext) -> Action {
        Action::ALL.choose(&mut self.rng).copied().unwrap_or(Action::Stay)
    }
}

/// Never moves
#[derive(Debug, Default)]
pub struct StayPolicy;

impl Policy for StayPolicy {
    fn name(&self) -> &str {
        "stay"
    }

    fn predict(&mut self, _ctx: &PolicyContext) -> Action {
        Action::Stay
    }
}
