use crate::{
    error::SimError,
    lane::{LaneId, VehicleId},
};

/// Everything the decision core needs from a running traffic simulator.
///
/// Speeds are m/s, accelerations m/s², positions and lengths meters. The
/// first position component is the longitudinal coordinate along the road.
pub trait Simulation {
    /// Advances the simulation by one tick.
    fn step(&mut self) -> Result<(), SimError>;
    fn close(&mut self) -> Result<(), SimError>;
    /// Simulated seconds since the start.
    fn sim_time(&self) -> f64;

    fn has_vehicle(&self, id: &VehicleId) -> bool;
    fn vehicle_speed(&self, id: &VehicleId) -> Result<f64, SimError>;
    fn vehicle_acceleration(&self, id: &VehicleId) -> Result<f64, SimError>;
    fn vehicle_position(&self, id: &VehicleId) -> Result<(f64, f64), SimError>;
    fn vehicle_max_speed(&self, id: &VehicleId) -> Result<f64, SimError>;
    fn vehicle_lane(&self, id: &VehicleId) -> Result<LaneId, SimError>;

    fn lane_occupants(&self, lane: &LaneId) -> Result<Vec<VehicleId>, SimError>;
    fn lane_length(&self, lane: &LaneId) -> Result<f64, SimError>;

    /// Keeps `id` in lane `target_lane_index` of its current edge for `duration` seconds.
    fn request_lane_change(
        &mut self,
        id: &VehicleId,
        target_lane_index: u32,
        duration: f64,
    ) -> Result<(), SimError>;
    /// Ramps the speed of `id` linearly to `target_speed` over `duration` seconds.
    fn request_speed(
        &mut self,
        id: &VehicleId,
        target_speed: f64,
        duration: f64,
    ) -> Result<(), SimError>;
    fn set_lateral_parameter(
        &mut self,
        id: &VehicleId,
        name: &str,
        value: &str,
    ) -> Result<(), SimError>;
}
