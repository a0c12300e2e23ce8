//! Trajectory files: one JSON header line followed by one JSON row per tick.
//!
//! Files are named `<layout>.<trial>.jsonl`; [`combine_trials`] merges every
//! trial in a folder into `all_trials.jsonl` (rows only).

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::infra::JointAction;
use crate::state::{GameState, Kitchen, Layout, LayoutError, Simulator};
use crate::subtasks::{Subtask, SubtaskError, completed_subtasks};

pub const COMBINED_FILE: &str = "all_trials.jsonl";
const EXTENSION: &str = "jsonl";

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed trajectory line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode trajectory: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("trajectory file {0} is empty")]
    MissingHeader(PathBuf),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Subtask(#[from] SubtaskError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryHeader {
    pub layout_name: String,
    pub trial_id: u32,
    pub horizon: u32,
    pub started_at: String,
}

/// State before the joint action, with the reward that action earned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    pub state: GameState,
    pub joint_action: JointAction,
    pub reward: f32,
    pub score: f32,
    pub timestep: u32,
    pub time_left: u32,
    pub layout_name: String,
    pub trial_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub header: TrajectoryHeader,
    pub rows: Vec<TrajectoryRow>,
}

impl Trajectory {
    pub fn final_score(&self) -> f32 {
        self.rows.last().map(|row| row.score).unwrap_or(0.0)
    }
}

pub struct TrajectoryRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    header: TrajectoryHeader,
    score: f32,
}

impl TrajectoryRecorder {
    /// Open a new trial file in `folder`, numbered after the trials already there
    pub fn new(folder: &Path, layout_name: &str, horizon: u32) -> Result<Self, TrajectoryError> {
        if !folder.exists() {
            fs::create_dir_all(folder)?;
        }

        let trial_id = next_trial_id(folder, layout_name)?;
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let header = TrajectoryHeader {
            layout_name: layout_name.to_string(),
            trial_id,
            horizon,
            started_at: now.format(&Rfc3339)?,
        };

        let path = folder.join(format!("{}.{}.{}", layout_name, trial_id, EXTENSION));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &header)?;
        writer.write_all(b"\n")?;

        info!("Recording trajectory to {}", path.display());
        Ok(Self {
            writer,
            path,
            header,
            score: 0.0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn trial_id(&self) -> u32 {
        self.header.trial_id
    }

    pub fn record(
        &mut self,
        state: &GameState,
        joint_action: JointAction,
        reward: f32,
    ) -> Result<(), TrajectoryError> {
        self.score += reward;
        let row = TrajectoryRow {
            state: state.clone(),
            joint_action,
            reward,
            score: self.score,
            timestep: state.timestep,
            time_left: self.header.horizon.saturating_sub(state.timestep),
            layout_name: self.header.layout_name.clone(),
            trial_id: self.header.trial_id,
        };
        serde_json::to_writer(&mut self.writer, &row)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf, TrajectoryError> {
        self.writer.flush()?;
        debug!("Trajectory {} closed with score {}", self.path.display(), self.score);
        Ok(self.path)
    }
}

/// Trial ids start at 1 and continue after the highest one found in `folder`
pub fn next_trial_id(folder: &Path, layout_name: &str) -> Result<u32, TrajectoryError> {
    let mut next = 1;
    for (name, id) in trial_files(folder)? {
        if name == layout_name {
            next = next.max(id + 1);
        }
    }
    Ok(next)
}

pub fn load_trajectory(path: &Path) -> Result<Trajectory, TrajectoryError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines().enumerate();

    let header = match lines.next() {
        Some((_, line)) => parse_line::<TrajectoryHeader>(&line?, 1)?,
        None => return Err(TrajectoryError::MissingHeader(path.to_path_buf())),
    };

    let mut rows = Vec::new();
    for (i, line) in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_line(&line, i + 1)?);
    }

    Ok(Trajectory { header, rows })
}

/// Rows of a combined file written by [`combine_trials`]
pub fn load_combined(path: &Path) -> Result<Vec<TrajectoryRow>, TrajectoryError> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            rows.push(parse_line(&line, i + 1)?);
        }
    }
    Ok(rows)
}

/// Merge the rows of every trial in `folder` into [`COMBINED_FILE`], ordered
/// by layout then trial id. Returns the combined path and the row count.
pub fn combine_trials(folder: &Path) -> Result<(PathBuf, usize), TrajectoryError> {
    let mut trials = trial_files(folder)?;
    trials.sort();

    let path = folder.join(COMBINED_FILE);
    let mut writer = BufWriter::new(File::create(&path)?);
    let mut count = 0;

    for (layout_name, trial_id) in &trials {
        let trial = folder.join(format!("{}.{}.{}", layout_name, trial_id, EXTENSION));
        let trajectory = load_trajectory(&trial)?;
        for row in &trajectory.rows {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        count += trajectory.rows.len();
    }
    writer.flush()?;

    info!("Combined {} trials ({} rows) into {}", trials.len(), count, path.display());
    Ok((path, count))
}

/// Subtasks each player completed on every row, found by replaying the
/// row's joint action from its recorded state
pub fn label_subtasks(trajectory: &Trajectory) -> Result<Vec<[Option<Subtask>; 2]>, TrajectoryError> {
    let layout = Layout::from_name(&trajectory.header.layout_name)?;
    let mut labels = Vec::with_capacity(trajectory.rows.len());

    for row in &trajectory.rows {
        let mut kitchen = Kitchen::with_state(layout.clone(), trajectory.header.horizon, row.state.clone());
        kitchen.step(row.joint_action);
        let completed = completed_subtasks(&layout, &row.state, kitchen.state())?;
        labels.push([
            completed.first().copied().flatten(),
            completed.get(1).copied().flatten(),
        ]);
    }

    Ok(labels)
}

fn parse_line<T: for<'de> Deserialize<'de>>(line: &str, line_number: usize) -> Result<T, TrajectoryError> {
    serde_json::from_str(line).map_err(|source| TrajectoryError::Json {
        line: line_number,
        source,
    })
}

/// `(layout, trial)` for every `<layout>.<trial>.jsonl` in `folder`
fn trial_files(folder: &Path) -> Result<Vec<(String, u32)>, TrajectoryError> {
    let mut trials = Vec::new();
    if !folder.exists() {
        return Ok(trials);
    }

    for entry in fs::read_dir(folder)? {
        let file_name = entry?.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(stem) = name.strip_suffix(&format!(".{}", EXTENSION)) else {
            continue;
        };
        if let Some((layout_name, id)) = stem.rsplit_once('.')
            && let Ok(id) = id.parse::<u32>()
        {
            trials.push((layout_name.to_string(), id));
        }
    }

    Ok(trials)
}
