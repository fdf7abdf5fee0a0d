use std::collections::BTreeMap;

use parry2d_f64::{
    na::{Isometry2, Vector2},
    shape::Cuboid,
};
use rand::prelude::{Rng, StdRng};
use rand_distr::{Distribution, Normal};

use crate::{lane::VehicleId, road::LANE_WIDTH, KMH_TO_MPS};

pub const CAR_WIDTH: f64 = 1.8;
pub const CAR_LENGTH: f64 = 5.0;
pub const SPEED_DEFAULT: f64 = 50.0 * KMH_TO_MPS;
pub const SPEED_LOW: f64 = 20.0 * KMH_TO_MPS;
pub const SPEED_HIGH: f64 = 70.0 * KMH_TO_MPS;
pub const SPEED_STD_DEV: f64 = 8.0 * KMH_TO_MPS;
pub const MAX_SPEED_DEFAULT: f64 = 120.0 * KMH_TO_MPS;
pub const FOLLOW_DIST_MIN: f64 = 2.5;
pub const FOLLOW_TIME_LOW: f64 = 1.0;
pub const FOLLOW_TIME_HIGH: f64 = 2.0;
pub const FOLLOW_TIME_DEFAULT: f64 = (FOLLOW_TIME_LOW + FOLLOW_TIME_HIGH) / 2.0;
pub const PREFERRED_ACCEL_LOW: f64 = 1.0;
pub const PREFERRED_ACCEL_HIGH: f64 = 3.0;
pub const PREFERRED_ACCEL_DEFAULT: f64 = 2.6;
pub const BREAKING_ACCEL: f64 = 4.5;
// Lateral speed during a lane change, m/s.
pub const LATERAL_SPEED: f64 = 1.6;

#[derive(Clone, Debug, PartialEq)]
pub struct LaneHold {
    pub lane: u32,
    pub until: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpeedRamp {
    pub from: f64,
    pub to: f64,
    pub start: f64,
    pub end: f64,
}

impl SpeedRamp {
    pub fn speed_at(&self, t: f64) -> f64 {
        if t >= self.end || self.end <= self.start {
            return self.to;
        }
        let progress = ((t - self.start) / (self.end - self.start)).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * progress
    }
}

#[derive(Clone, Debug)]
pub struct Car {
    pub id: VehicleId,
    // Traffic cars re-enter at the road start after leaving it; the ego does not.
    pub respawn: bool,

    // x is the front bumper along the road, y the lateral center
    pub x: f64,
    pub y: f64,
    pub vel: f64,
    pub accel: f64,

    pub width: f64,
    pub length: f64,

    pub preferred_vel: f64,
    pub max_vel: f64,
    pub preferred_accel: f64,
    pub follow_min_dist: f64,
    pub follow_time: f64,

    pub lane_hold: Option<LaneHold>,
    pub speed_ramp: Option<SpeedRamp>,
    pub lateral_parameters: BTreeMap<String, String>,
}

impl Car {
    pub fn new(id: &str, lane_i: u32, x: f64, vel: f64) -> Self {
        Self {
            id: VehicleId::from(id),
            respawn: false,

            x,
            y: lane_i as f64 * LANE_WIDTH,
            vel,
            accel: 0.0,

            width: CAR_WIDTH,
            length: CAR_LENGTH,

            preferred_vel: vel,
            max_vel: vel.max(MAX_SPEED_DEFAULT),
            preferred_accel: PREFERRED_ACCEL_DEFAULT,
            follow_min_dist: FOLLOW_DIST_MIN,
            follow_time: FOLLOW_TIME_DEFAULT,

            lane_hold: None,
            speed_ramp: None,
            lateral_parameters: BTreeMap::new(),
        }
    }

    pub fn random_new(
        id: &str,
        n_lanes: u32,
        road_length: f64,
        speed: &Normal<f64>,
        rng: &mut StdRng,
    ) -> Self {
        let lane_i = rng.gen_range(0..n_lanes.max(1));
        let x = rng.gen_range(CAR_LENGTH..road_length.max(CAR_LENGTH + 1.0));
        let preferred_vel = speed.sample(rng).clamp(SPEED_LOW, SPEED_HIGH);

        let mut car = Self::new(id, lane_i, x, preferred_vel);
        car.respawn = true;
        car.preferred_accel = rng.gen_range(PREFERRED_ACCEL_LOW..PREFERRED_ACCEL_HIGH);
        car.follow_time = rng.gen_range(FOLLOW_TIME_LOW..FOLLOW_TIME_HIGH);
        car
    }

    pub fn current_lane(&self, n_lanes: u32) -> u32 {
        let lane = (self.y / LANE_WIDTH).round().max(0.0) as u32;
        lane.min(n_lanes.saturating_sub(1))
    }

    pub fn follow_dist(&self) -> f64 {
        self.follow_min_dist + self.follow_time * self.vel
    }

    pub fn target_vel(&self, t: f64) -> f64 {
        match &self.speed_ramp {
            Some(ramp) => ramp.speed_at(t),
            None => self.preferred_vel,
        }
        .min(self.max_vel)
    }

    pub fn update(&mut self, accel: f64, t: f64, dt: f64) {
        let accel = accel.max(-BREAKING_ACCEL);
        let mut vel = (self.vel + accel * dt).max(0.0);
        if let Some(ramp) = &self.speed_ramp {
            // a requested speed is followed exactly unless traffic forces slower
            vel = vel.min(ramp.speed_at(t + dt));
            if t + dt >= ramp.end {
                self.speed_ramp = None;
            }
        }
        vel = vel.min(self.max_vel);
        self.accel = (vel - self.vel) / dt;
        self.vel = vel;
        self.x += vel * dt;

        if let Some(hold) = &self.lane_hold {
            let target_y = hold.lane as f64 * LANE_WIDTH;
            let step = LATERAL_SPEED * dt;
            let dy = target_y - self.y;
            self.y = if dy.abs() <= step {
                target_y
            } else {
                self.y + step * dy.signum()
            };
            if t + dt >= hold.until {
                self.lane_hold = None;
            }
        }
    }

    pub fn pose(&self) -> Isometry2<f64> {
        let center_x = self.x - self.length / 2.0;
        Isometry2::new(Vector2::new(center_x, self.y), 0.0)
    }

    pub fn shape(&self) -> Cuboid {
        Cuboid::new(Vector2::new(self.length / 2.0, self.width / 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn speed_ramp_is_linear() {
        let ramp = SpeedRamp {
            from: 10.0,
            to: 8.0,
            start: 2.0,
            end: 7.0,
        };
        assert_abs_diff_eq!(ramp.speed_at(2.0), 10.0);
        assert_abs_diff_eq!(ramp.speed_at(4.5), 9.0);
        assert_abs_diff_eq!(ramp.speed_at(7.0), 8.0);
        assert_abs_diff_eq!(ramp.speed_at(100.0), 8.0);
    }

    #[test]
    fn lane_change_moves_sideways_until_aligned() {
        let mut car = Car::new("a", 2, 50.0, 10.0);
        car.lane_hold = Some(LaneHold {
            lane: 1,
            until: 20.0,
        });
        assert_eq!(car.current_lane(3), 2);

        let mut t = 0.0;
        while car.lane_hold.is_some() && t < 10.0 {
            car.update(0.0, t, 1.0);
            t += 1.0;
            if car.y == LANE_WIDTH {
                break;
            }
        }
        assert_eq!(car.current_lane(3), 1);
        assert_abs_diff_eq!(car.y, LANE_WIDTH);
        assert_abs_diff_eq!(car.x, 50.0 + 10.0 * t);
    }

    #[test]
    fn slowdown_never_accelerates() {
        let mut car = Car::new("a", 0, 0.0, 10.0);
        car.speed_ramp = Some(SpeedRamp {
            from: 10.0,
            to: 5.0,
            start: 0.0,
            end: 5.0,
        });
        let mut t = 0.0;
        for _ in 0..5 {
            car.update(PREFERRED_ACCEL_DEFAULT, t, 1.0);
            t += 1.0;
            assert_abs_diff_eq!(car.vel, 10.0 - t, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(car.vel, 5.0);
        assert!(car.speed_ramp.is_none());
    }
}
