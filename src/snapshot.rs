use itertools::Itertools;

use crate::{
    error::DecisionError,
    lane::{LaneId, VehicleId},
    neighbors::{find_neighbors, NearestPair, NearestVehicle},
    simulation::Simulation,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Neighbor {
    pub id: VehicleId,
    /// Longitudinal distance to the ego in meters, never negative.
    pub gap: f64,
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrafficSnapshot {
    pub ego: VehicleId,
    pub ego_speed: f64,
    pub ego_acceleration: f64,
    pub ego_max_speed: f64,
    pub current_lane: LaneId,
    pub desired_lane: LaneId,
    pub current_lane_leader: Option<Neighbor>,
    pub current_lane_follower: Option<Neighbor>,
    pub target_lane_leader: Option<Neighbor>,
    pub target_lane_follower: Option<Neighbor>,
    // Vehicles per meter in the desired lane.
    pub traffic_density: f64,
}

fn finite(vehicle: &VehicleId, what: &'static str, value: f64) -> Result<f64, DecisionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DecisionError::NonFinite {
            vehicle: vehicle.clone(),
            what,
            value,
        })
    }
}

fn with_speed(
    sim: &dyn Simulation,
    nearest: Option<NearestVehicle>,
) -> Result<Option<Neighbor>, DecisionError> {
    nearest
        .map(|n| -> Result<Neighbor, DecisionError> {
            let speed = finite(&n.id, "speed", sim.vehicle_speed(&n.id)?)?;
            Ok(Neighbor {
                id: n.id,
                gap: n.gap,
                speed,
            })
        })
        .transpose()
}

fn lane_neighbors(
    sim: &dyn Simulation,
    ego: &VehicleId,
    ego_x: f64,
    occupants: &[VehicleId],
) -> Result<(Option<Neighbor>, Option<Neighbor>), DecisionError> {
    let positions = occupants
        .iter()
        .filter(|id| *id != ego)
        .map(|id| -> Result<(&VehicleId, f64), DecisionError> {
            Ok((id, finite(id, "position", sim.vehicle_position(id)?.0)?))
        })
        .collect::<Result<Vec<_>, DecisionError>>()?;

    let NearestPair { leader, follower } = find_neighbors(ego, ego_x, positions);
    Ok((with_speed(sim, leader)?, with_speed(sim, follower)?))
}

impl TrafficSnapshot {
    pub fn capture(
        sim: &dyn Simulation,
        ego: &VehicleId,
        current_lane: &LaneId,
        desired_lane: &LaneId,
    ) -> Result<Self, DecisionError> {
        let ego_speed = finite(ego, "speed", sim.vehicle_speed(ego)?)?;
        let ego_acceleration = finite(ego, "acceleration", sim.vehicle_acceleration(ego)?)?;
        let ego_max_speed = finite(ego, "max speed", sim.vehicle_max_speed(ego)?)?;
        let ego_x = finite(ego, "position", sim.vehicle_position(ego)?.0)?;

        let current_occupants = sim.lane_occupants(current_lane)?;
        if !current_occupants.contains(ego) {
            return Err(DecisionError::EgoNotInLane {
                ego: ego.clone(),
                lane: current_lane.clone(),
            });
        }
        let target_occupants = sim.lane_occupants(desired_lane)?;

        let (current_lane_leader, current_lane_follower) =
            lane_neighbors(sim, ego, ego_x, &current_occupants)?;
        let (target_lane_leader, target_lane_follower) =
            lane_neighbors(sim, ego, ego_x, &target_occupants)?;

        let lane_length = sim.lane_length(desired_lane)?;
        let others_in_target = target_occupants.iter().filter(|id| *id != ego).count();
        let traffic_density = others_in_target as f64 / lane_length.max(1.0);

        let snapshot = Self {
            ego: ego.clone(),
            ego_speed,
            ego_acceleration,
            ego_max_speed,
            current_lane: current_lane.clone(),
            desired_lane: desired_lane.clone(),
            current_lane_leader,
            current_lane_follower,
            target_lane_leader,
            target_lane_follower,
            traffic_density,
        };
        log::trace!(
            "{}: snapshot around {} with neighbors [{}]",
            sim.sim_time(),
            ego,
            snapshot.neighbor_ids().join(", ")
        );
        Ok(snapshot)
    }

    fn neighbor_ids(&self) -> Vec<&str> {
        [
            &self.current_lane_leader,
            &self.current_lane_follower,
            &self.target_lane_leader,
            &self.target_lane_follower,
        ]
        .into_iter()
        .filter_map(|n| n.as_ref().map(|n| n.id.as_str()))
        .collect_vec()
    }

    pub fn lane_indices(&self) -> Result<(u32, u32), DecisionError> {
        Ok((self.current_lane.index()?, self.desired_lane.index()?))
    }

    pub fn open_road(ego_speed: f64, current_lane: &str, desired_lane: &str) -> Self {
        Self {
            ego: VehicleId::from("Ego"),
            ego_speed,
            ego_acceleration: 0.0,
            ego_max_speed: 2.0 * ego_speed.max(1.0),
            current_lane: LaneId::from(current_lane),
            desired_lane: LaneId::from(desired_lane),
            current_lane_leader: None,
            current_lane_follower: None,
            target_lane_leader: None,
            target_lane_follower: None,
            traffic_density: 0.0,
        }
    }
}

pub fn neighbor(id: &str, gap: f64, speed: f64) -> Option<Neighbor> {
    Some(Neighbor {
        id: VehicleId::from(id),
        gap,
        speed,
    })
}
