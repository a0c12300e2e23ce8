use std::error::Error;
use std::path::Path;

use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kitchen_hrl::config::RunConfig;
use kitchen_hrl::infra::{DefaultObserver, combine_trials, label_subtasks, load_trajectory};
use kitchen_hrl::planners::heuristic::{ScriptedWorker, ValueBasedManager, ValueManagerConfig};
use kitchen_hrl::planners::hrl::{
    EncoderConfig, EpisodeMetrics, EpisodeRunner, HierarchicalAgent, Policy, RunnerConfig, count_subtask,
};
use kitchen_hrl::state::Layout;
use kitchen_hrl::subtasks::Subtask;

fn init_logging() -> Result<(), Box<dyn Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kitchen_hrl=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn hierarchical(player_index: usize) -> Box<dyn Policy> {
    let manager = ValueBasedManager::new(player_index, ValueManagerConfig::default());
    Box::new(HierarchicalAgent::new(manager, ScriptedWorker::new()))
}

fn combine(folder: &Path) -> Result<(), Box<dyn Error>> {
    let (path, rows) = combine_trials(folder)?;
    info!("{} rows written to {}", rows, path.display());
    Ok(())
}

fn replay(path: &Path) -> Result<(), Box<dyn Error>> {
    let trajectory = load_trajectory(path)?;
    let labels = label_subtasks(&trajectory)?;
    info!(
        "Trial {} on {}: {} ticks, score {}",
        trajectory.header.trial_id,
        trajectory.header.layout_name,
        trajectory.rows.len(),
        trajectory.final_score()
    );

    for player in 0..2 {
        let player_labels: Vec<Option<Subtask>> = labels.iter().map(|tick| tick[player]).collect();
        for subtask in Subtask::ALL {
            let count = count_subtask(&player_labels, subtask);
            if count > 0 {
                info!("  player {}: {} x{}", player + 1, subtask, count);
            }
        }
    }
    Ok(())
}

fn play(config: &RunConfig) -> Result<(), Box<dyn Error>> {
    let layout = Layout::from_name(&config.layout)?;
    let runner_config = RunnerConfig {
        encoder_config: EncoderConfig {
            scheme: config.encoding,
            ..EncoderConfig::default()
        },
        seed: config.seed,
        record_folder: config.data_path.clone(),
    };
    let mut runner = EpisodeRunner::from_layout(layout, config.horizon, runner_config, DefaultObserver);
    let mut players = [hierarchical(0), hierarchical(1)];
    let mut metrics = EpisodeMetrics::default();

    for _ in 0..config.episodes {
        let summary = runner.run_episode(&mut players)?;
        metrics.record_episode(&summary);
    }
    metrics.log_to_console();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    init_logging()?;

    let config = RunConfig::from_env()?;
    info!("Layout: {}, horizon: {}, encoding: {}", config.layout, config.horizon, config.encoding);

    if config.combine {
        let Some(folder) = config.data_path.as_deref() else {
            return Err("KITCHEN_COMBINE needs KITCHEN_DATA_PATH".into());
        };
        return combine(folder);
    }

    if let Some(path) = config.replay.as_deref() {
        return replay(path);
    }

    play(&config)
}
