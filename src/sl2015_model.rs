use std::{cmp::Ordering, collections::HashSet};

use crate::{
    arg_parameters::Sl2015Parameters,
    decision::{Decision, DecisionModelTrait, Scores},
    error::{DecisionError, SimError},
    lane::VehicleId,
    simulation::Simulation,
    snapshot::{Neighbor, TrafficSnapshot},
};

#[derive(Debug, Clone)]
pub struct Sl2015Model {
    params: Sl2015Parameters,
    configured: HashSet<VehicleId>,
}

impl Sl2015Model {
    pub fn new(params: Sl2015Parameters) -> Self {
        Self {
            params,
            configured: HashSet::new(),
        }
    }

    fn strategic(current: u32, desired: u32) -> f64 {
        match desired.cmp(&current) {
            Ordering::Less => 1.0,
            Ordering::Equal => 0.0,
            Ordering::Greater => -1.0,
        }
    }

    fn keep_right(current: u32, desired: u32) -> f64 {
        if desired < current {
            1.0
        } else {
            -1.0
        }
    }

    // Best speed reachable in the target lane minus the best in the current one,
    // each capped by its leader.
    fn speed_gain(
        max_speed: f64,
        current_leader: &Option<Neighbor>,
        target_leader: &Option<Neighbor>,
    ) -> f64 {
        let achievable = |leader: &Option<Neighbor>| {
            leader
                .as_ref()
                .map_or(max_speed, |l| max_speed.min(l.speed))
        };
        achievable(target_leader) - achievable(current_leader)
    }

    fn is_safe(&self, s: &TrafficSnapshot) -> bool {
        let p = &self.params;

        if let Some(leader) = &s.target_lane_leader {
            if leader.gap < p.min_safe_gap {
                return false;
            }
        }

        if let Some(follower) = &s.target_lane_follower {
            if follower.gap < p.min_safe_gap {
                return false;
            }
            let closing_speed = follower.speed - s.ego_speed;
            // the follower must not be able to close the whole gap within the reaction time
            if closing_speed > 0.0 && follower.gap < closing_speed * p.reaction_time {
                return false;
            }
        }

        true
    }
}

impl DecisionModelTrait for Sl2015Model {
    fn name(&self) -> &'static str {
        "sl2015"
    }

    fn prepare(&mut self, sim: &mut dyn Simulation, ego: &VehicleId) -> Result<(), SimError> {
        if self.configured.contains(ego) {
            return Ok(());
        }
        for (name, value) in self.params.lateral_parameters.iter() {
            sim.set_lateral_parameter(ego, name, value)?;
        }
        log::debug!(
            "applied {} lateral parameters to {}",
            self.params.lateral_parameters.len(),
            ego
        );
        self.configured.insert(ego.clone());
        Ok(())
    }

    fn decide(&self, s: &TrafficSnapshot) -> Result<Decision, DecisionError> {
        let p = &self.params;
        let (current, desired) = s.lane_indices()?;

        let strategic = Self::strategic(current, desired);
        let speed_gain =
            Self::speed_gain(s.ego_max_speed, &s.current_lane_leader, &s.target_lane_leader);
        let keep_right = Self::keep_right(current, desired);
        let total = p.strategic_weight * strategic
            + p.speed_gain_weight * speed_gain
            + p.keep_right_weight * keep_right;
        let safe = self.is_safe(s);

        Ok(Decision::new(
            safe && total > 0.0,
            Scores::Incentive {
                strategic,
                speed_gain,
                keep_right,
                total,
                safe,
            },
        ))
    }
}
