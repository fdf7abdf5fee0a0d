use crate::{
    arg_parameters::LiuParameters,
    decision::{Decision, DecisionModelTrait, Scores},
    error::DecisionError,
    snapshot::TrafficSnapshot,
};

pub(crate) fn gap_or_unreachable(gap: Option<f64>) -> f64 {
    gap.unwrap_or(f64::INFINITY)
}

// `target - current`, with two unreachable gaps comparing as equal.
pub(crate) fn gap_gain(target: f64, current: f64) -> f64 {
    if target.is_infinite() && current.is_infinite() {
        0.0
    } else {
        target - current
    }
}

// `c * (gap - v * t_h)` with `t_h = gap / v`. A stopped ego uses
// `min_reference_speed` for the headway, which leaves the whole gap as
// the tolerance term instead of dividing by zero.
pub(crate) fn tolerance(c: f64, gap: f64, ego_speed: f64, min_reference_speed: f64) -> f64 {
    if gap.is_infinite() {
        return if ego_speed > 0.0 { 0.0 } else { f64::INFINITY };
    }
    let headway_speed = if ego_speed > 0.0 {
        ego_speed
    } else {
        min_reference_speed
    };
    let time_headway = gap / headway_speed;
    c * (gap - ego_speed * time_headway)
}

pub(crate) fn safety(
    d: f64,
    e: f64,
    follower_gap: f64,
    min_gap: f64,
    ego_speed: f64,
    follower_speed: f64,
) -> f64 {
    if follower_gap >= min_gap {
        d * (follower_gap - min_gap) + e * (ego_speed - follower_speed)
    } else {
        f64::NEG_INFINITY
    }
}

#[derive(Debug, Clone)]
pub struct LiuModel {
    params: LiuParameters,
}

impl LiuModel {
    pub fn new(params: LiuParameters) -> Self {
        Self { params }
    }
}

impl DecisionModelTrait for LiuModel {
    fn name(&self) -> &'static str {
        "liu"
    }

    fn decide(&self, s: &TrafficSnapshot) -> Result<Decision, DecisionError> {
        let p = &self.params;

        let leader_gap = gap_or_unreachable(s.current_lane_leader.as_ref().map(|n| n.gap));
        let leader_speed = s
            .current_lane_leader
            .as_ref()
            .map_or(p.absent_leader_speed, |n| n.speed);
        let target_leader_gap = gap_or_unreachable(s.target_lane_leader.as_ref().map(|n| n.gap));
        let follower_gap = gap_or_unreachable(s.target_lane_follower.as_ref().map(|n| n.gap));
        let follower_speed = s.target_lane_follower.as_ref().map_or(0.0, |n| n.speed);

        let speed_benefit = (p.desired_speed - leader_speed).min(0.0);
        let benefit = p.a * speed_benefit + p.b * gap_gain(target_leader_gap, leader_gap);
        let tolerance = tolerance(p.c, leader_gap, s.ego_speed, p.min_reference_speed);
        let safety = safety(
            p.d,
            p.e,
            follower_gap,
            p.min_safe_gap,
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

    fn model() -> LiuModel {
        LiuModel::new(LiuParameters::default())
    }

    #[test]
    fn empty_target_lane_accepts() {
        let mut s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        s.current_lane_leader = neighbor("lead", 5.0, 10.0);

        let decision = model().decide(&s).unwrap();
        match decision.scores {
            Scores::Utility { benefit, .. } => assert!(benefit >= 0.0),
            _ => panic!("unexpected scores {:?}", decision.scores),
        }
        assert!(decision.change_lane);
    }

    #[test]
    fn close_fast_follower_vetoes() {
        let mut s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        s.target_lane_follower = neighbor("rear", 10.0, 20.0);

        let decision = model().decide(&s).unwrap();
        assert!(!decision.change_lane);
        assert!(matches!(
            decision.scores,
            Scores::Utility { safety, .. } if safety == f64::NEG_INFINITY
        ));
    }

    #[test]
    fn safety_veto_beats_any_benefit() {
        let mut s = TrafficSnapshot::open_road(30.0, "E0_2", "E0_1");
        s.current_lane_leader = neighbor("crawler", 1.0, 0.0);
        s.target_lane_follower = neighbor("rear", 14.9, 0.0);
        assert!(!model().decide(&s).unwrap().change_lane);

        s.target_lane_follower = neighbor("rear", 15.1, 0.0);
        assert!(model().decide(&s).unwrap().change_lane);
    }

    #[test]
    fn stopped_ego_keeps_scores_defined() {
        let mut s = TrafficSnapshot::open_road(0.0, "E0_1", "E0_0");
        s.current_lane_leader = neighbor("lead", 8.0, 0.0);
        s.target_lane_leader = neighbor("target", 30.0, 5.0);

        let decision = model().decide(&s).unwrap();
        match decision.scores {
            Scores::Utility {
                benefit,
                tolerance,
                safety,
            } => {
                assert!(benefit.is_finite());
                assert_eq!(tolerance, 8.0);
                assert!(!safety.is_nan());
            }
            _ => panic!("unexpected scores {:?}", decision.scores),
        }
        // benefit 22 against half the 8 m tolerance
        assert!(decision.change_lane);
    }

    #[test]
    fn no_leaders_anywhere_is_neutral() {
        let s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        let decision = model().decide(&s).unwrap();
        match decision.scores {
            Scores::Utility {
                benefit, tolerance, ..
            } => {
                assert_eq!(tolerance, 0.0);
                assert!(!benefit.is_nan());
            }
            _ => panic!("unexpected scores {:?}", decision.scores),
        }
    }
}
