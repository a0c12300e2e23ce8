//! Episode statistics

use std::collections::VecDeque;
use std::time::Instant;

use tracing::info;

use crate::subtasks::Subtask;

/// Average over the last `window_size` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.window.len() == self.window_size
            && let Some(oldest) = self.window.pop_front()
        {
            self.sum -= oldest;
        }
        self.window.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// Outcome of one finished episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub score: f32,
    pub ticks: u32,
    pub soups_served: u32,
    /// Subtasks completed per player
    pub subtasks_completed: [u32; 2],
    pub stuck_ticks: u32,
}

/// Tracks episodes across a run
#[derive(Debug)]
pub struct EpisodeMetrics {
    pub scores: MovingAverage,
    pub lengths: MovingAverage,
    pub soups: MovingAverage,
    pub subtasks: [MovingAverage; 2],
    pub stuck_rate: MovingAverage,
    pub episodes: usize,
    pub total_ticks: u64,
    pub best_score: f32,
    start_time: Instant,
}

impl EpisodeMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            scores: MovingAverage::new(window_size),
            lengths: MovingAverage::new(window_size),
            soups: MovingAverage::new(window_size),
            subtasks: [MovingAverage::new(window_size), MovingAverage::new(window_size)],
            stuck_rate: MovingAverage::new(window_size),
            episodes: 0,
            total_ticks: 0,
            best_score: 0.0,
            start_time: Instant::now(),
        }
    }

    pub fn record_episode(&mut self, summary: &EpisodeSummary) {
        self.scores.push(summary.score);
        self.lengths.push(summary.ticks as f32);
        self.soups.push(summary.soups_served as f32);
        for (average, &count) in self.subtasks.iter_mut().zip(&summary.subtasks_completed) {
            average.push(count as f32);
        }
        let stuck = if summary.ticks == 0 {
            0.0
        } else {
            summary.stuck_ticks as f32 / summary.ticks as f32
        };
        self.stuck_rate.push(stuck);

        self.episodes += 1;
        self.total_ticks += u64::from(summary.ticks);
        self.best_score = self.best_score.max(summary.score);
    }

    pub fn ticks_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_ticks as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self) {
        info!(
            "Episodes {} | Ticks {} | TPS {:.1}",
            self.episodes,
            self.total_ticks,
            self.ticks_per_second()
        );
        info!(
            "  Score: avg={:.2}, best={:.1}, soups={:.2}",
            self.scores.average(),
            self.best_score,
            self.soups.average()
        );
        info!(
            "  Subtasks: player 1={:.1}, player 2={:.1}, stuck={:.1}%",
            self.subtasks[0].average(),
            self.subtasks[1].average(),
            self.stuck_rate.average() * 100.0
        );
    }
}

impl Default for EpisodeMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Count of `subtask` among per-tick labels of one player
pub fn count_subtask(labels: &[Option<Subtask>], subtask: Subtask) -> usize {
    labels.iter().filter(|label| **label == Some(subtask)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_window() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.average(), 0.0);
        for value in [1.0, 2.0, 3.0, 10.0] {
            avg.push(value);
        }
        assert_eq!(avg.len(), 3);
        assert_eq!(avg.average(), 5.0);
    }

    #[test]
    fn test_record_episode() {
        let mut metrics = EpisodeMetrics::new(10);
        metrics.record_episode(&EpisodeSummary {
            score: 40.0,
            ticks: 100,
            soups_served: 2,
            subtasks_completed: [12, 8],
            stuck_ticks: 5,
        });
        metrics.record_episode(&EpisodeSummary {
            score: 0.0,
            ticks: 100,
            soups_served: 0,
            subtasks_completed: [4, 0],
            stuck_ticks: 0,
        });

        assert_eq!(metrics.episodes, 2);
        assert_eq!(metrics.total_ticks, 200);
        assert_eq!(metrics.best_score, 40.0);
        assert_eq!(metrics.scores.average(), 20.0);
        assert_eq!(metrics.subtasks[0].average(), 8.0);
        assert!((metrics.stuck_rate.average() - 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_count_subtask() {
        let labels = [None, Some(Subtask::ServeSoup), Some(Subtask::GetSoup), Some(Subtask::ServeSoup)];
        assert_eq!(count_subtask(&labels, Subtask::ServeSoup), 2);
    }
}
