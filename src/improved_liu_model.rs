use crate::{
    arg_parameters::ImprovedLiuParameters,
    decision::{Decision, DecisionModelTrait, Scores},
    error::DecisionError,
    liu_model::{gap_gain, gap_or_unreachable, safety, tolerance},
    snapshot::TrafficSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
}

#[derive(Debug, Clone)]
pub struct ImprovedLiuModel {
    params: ImprovedLiuParameters,
}

impl ImprovedLiuModel {
    pub fn new(params: ImprovedLiuParameters) -> Self {
        Self { params }
    }

    fn coefficients(&self, ego_speed: f64, traffic_density: f64) -> Coefficients {
        let p = &self.params;
        let density_scale = 1.0 + p.density_gain * traffic_density;
        Coefficients {
            a: density_scale,
            b: 1.0 + p.speed_gain * (p.desired_speed - ego_speed),
            c: p.c,
            d: density_scale,
            e: p.e,
        }
    }

    fn safe_gap(&self, ego_speed: f64, follower_speed: f64) -> f64 {
        self.params.base_safe_gap
            + self.params.closing_speed_gap_factor * (ego_speed - follower_speed).abs()
    }
}

impl DecisionModelTrait for ImprovedLiuModel {
    fn name(&self) -> &'static str {
        "improved_liu"
    }

    fn decide(&self, s: &TrafficSnapshot) -> Result<Decision, DecisionError> {
        let p = &self.params;

        if s.traffic_density > p.density_threshold {
            return Ok(Decision::new(
                false,
                Scores::DensityVeto {
                    density: s.traffic_density,
                },
            ));
        }

        if let Some(leader) = &s.current_lane_leader {
            let deficit = s.ego_speed - leader.speed;
            if deficit > p.speed_deficit_threshold {
                return Ok(Decision::new(true, Scores::SpeedDeficit { deficit }));
            }
        }

        let k = self.coefficients(s.ego_speed, s.traffic_density);

        let leader_gap = gap_or_unreachable(s.current_lane_leader.as_ref().map(|n| n.gap));
        let leader_speed = s
            .current_lane_leader
            .as_ref()
            .map_or(p.absent_leader_speed, |n| n.speed);
        let target_leader_gap = gap_or_unreachable(s.target_lane_leader.as_ref().map(|n| n.gap));
        let follower_gap = gap_or_unreachable(s.target_lane_follower.as_ref().map(|n| n.gap));
        let follower_speed = s.target_lane_follower.as_ref().map_or(0.0, |n| n.speed);

        let speed_benefit = (p.desired_speed - leader_speed).min(0.0);
        let benefit = k.a * speed_benefit + k.b * gap_gain(target_leader_gap, leader_gap);
        let tolerance = tolerance(k.c, leader_gap, s.ego_speed, p.min_reference_speed);
        let safe_gap = self.safe_gap(s.ego_speed, follower_speed);
        let safety = safety(
            k.d,
            k.e,
            follower_gap,
            safe_gap,
            s.ego_speed,
            follower_speed,
        );

        let change_lane = safety > 0.0 && (benefit - p.theta * tolerance) > 0.0;
        Ok(Decision::new(
            change_lane,
            Scores::Utility {
                benefit,
                tolerance,
                safety,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::neighbor;
    use approx::assert_abs_diff_eq;

    fn model() -> ImprovedLiuModel {
        ImprovedLiuModel::new(ImprovedLiuParameters::default())
    }

    #[test]
    fn dense_target_lane_always_vetoes() {
        let mut s = TrafficSnapshot::open_road(20.0, "E0_1", "E0_0");
        // everything else as favorable as it gets
        s.current_lane_leader = neighbor("crawler", 2.0, 0.0);
        s.traffic_density = 0.31;

        let decision = model().decide(&s).unwrap();
        assert!(!decision.change_lane);
        assert_eq!(decision.scores, Scores::DensityVeto { density: 0.31 });
    }

    #[test]
    fn slow_leader_forces_change() {
        let mut s = TrafficSnapshot::open_road(15.0, "E0_1", "E0_0");
        s.current_lane_leader = neighbor("slow", 50.0, 10.0);
        // a follower this close would otherwise veto
        s.target_lane_follower = neighbor("rear", 1.0, 30.0);
        s.traffic_density = 0.1;

        let decision = model().decide(&s).unwrap();
        assert!(decision.change_lane);
        assert!(matches!(decision.scores, Scores::SpeedDeficit { .. }));
    }

    #[test]
    fn safe_gap_grows_with_closing_speed() {
        let m = model();
        assert_abs_diff_eq!(m.safe_gap(10.0, 10.0), 20.0);
        assert_abs_diff_eq!(m.safe_gap(10.0, 15.0), 30.0);
        assert_abs_diff_eq!(m.safe_gap(15.0, 10.0), 30.0);

        let mut s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        s.target_lane_follower = neighbor("rear", 25.0, 15.0);
        assert!(!m.decide(&s).unwrap().change_lane);
    }

    #[test]
    fn falls_back_to_weighted_rule() {
        let mut s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        s.current_lane_leader = neighbor("lead", 20.0, 10.0);
        s.target_lane_leader = neighbor("ahead", 60.0, 12.0);
        s.target_lane_follower = neighbor("rear", 40.0, 8.0);
        s.traffic_density = 0.01;

        let decision = model().decide(&s).unwrap();
        match decision.scores {
            Scores::Utility {
                benefit, safety, ..
            } => {
                assert!(benefit > 0.0);
                assert!(safety > 0.0);
            }
            _ => panic!("unexpected scores {:?}", decision.scores),
        }
        assert!(decision.change_lane);

        let k = model().coefficients(10.0, 0.01);
        assert_abs_diff_eq!(k.a, 1.001, epsilon = 1e-12);
        assert_abs_diff_eq!(k.d, 1.001, epsilon = 1e-12);
        assert_abs_diff_eq!(k.b, 1.0 + 0.05 * (40.0 / 3.6 - 10.0), epsilon = 1e-12);
    }
}
