use fstrings::{format_args_f, write_f};
use rolling_stats::Stats;

use crate::controller::TickOutcome;

#[derive(Clone)]
pub struct RunReport {
    pub model: String,
    pub ticks: u32,
    pub decisions: u32,
    pub lane_changes: u32,
    pub slowdowns: u32,
    pub skipped: u32,
    pub ego_exited: bool,
    pub collisions: usize,
    pub sim_time: f64,
    pub ego_speed: Stats<f64>,
}

impl RunReport {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_owned(),
            ticks: 0,
            decisions: 0,
            lane_changes: 0,
            slowdowns: 0,
            skipped: 0,
            ego_exited: false,
            collisions: 0,
            sim_time: 0.0,
            ego_speed: Stats::new(),
        }
    }

    pub fn record(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::LaneChange { .. } => {
                self.decisions += 1;
                self.lane_changes += 1;
            }
            TickOutcome::SlowDown { .. } => {
                self.decisions += 1;
                self.slowdowns += 1;
            }
            TickOutcome::Skipped => self.skipped += 1,
            TickOutcome::EgoAbsent | TickOutcome::LowestLane => (),
        }
    }
}

impl std::fmt::Debug for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunReport")
            .field("model", &self.model)
            .field("ticks", &self.ticks)
            .field("decisions", &self.decisions)
            .field("lane_changes", &self.lane_changes)
            .field("slowdowns", &self.slowdowns)
            .field("skipped", &self.skipped)
            .field("ego_exited", &self.ego_exited)
            .field("collisions", &self.collisions)
            .field("mean_ego_speed", &self.ego_speed.mean)
            .finish()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (mean_speed, std_dev_speed) = if self.ego_speed.count > 0 {
            (self.ego_speed.mean, self.ego_speed.std_dev)
        } else {
            (0.0, 0.0)
        };
        let s = self;
        write_f!(
            f,
            "{s.model} {s.ticks} {s.sim_time:.1} {s.decisions} {s.lane_changes} {s.slowdowns} {s.skipped} {s.collisions} {s.ego_exited} {mean_speed:.3} {std_dev_speed:.3}"
        )
    }
}
