use itertools::Itertools;
use parry2d_f64::{query, shape::Shape};
use rand::{prelude::StdRng, Rng, SeedableRng};
use rand_distr::Normal;

use crate::{
    arg_parameters::Parameters,
    car::{Car, CAR_LENGTH, SPEED_DEFAULT, SPEED_STD_DEV},
    error::SimError,
    intelligent_driver::IntelligentDriverPolicy,
    lane::{LaneId, VehicleId},
    simulation::Simulation,
};

pub const LANE_WIDTH: f64 = 3.2;
pub const EDGE_ID: &str = "E0";

pub const SIDE_MARGIN: f64 = 0.0;

#[derive(Clone, Debug)]
pub struct Road {
    pub n_lanes: u32,
    pub length: f64,
    pub dt: f64,
    pub t: f64,           // current time in seconds
    pub timesteps: usize, // current time in timesteps (related by dt)
    pub cars: Vec<Car>,
    pub departing: Vec<Car>,
    pub collisions: usize,
    closed: bool,
    respawn_rng: Option<StdRng>,
}

fn range_dist(low_a: f64, high_a: f64, low_b: f64, high_b: f64) -> f64 {
    let sep1 = (low_a - high_b).max(0.0);
    let sep2 = (low_b - high_a).max(0.0);
    sep1.max(sep2)
}

impl Road {
    pub fn empty(n_lanes: u32, length: f64, dt: f64) -> Self {
        Self {
            n_lanes,
            length,
            dt,
            t: 0.0,
            timesteps: 0,
            cars: Vec::new(),
            departing: Vec::new(),
            collisions: 0,
            closed: false,
            respawn_rng: None,
        }
    }

    pub fn random(params: &Parameters) -> Result<Self, SimError> {
        let mut road = Self::empty(params.n_lanes, params.road_length, params.physics_dt);

        let mut full_seed = [0; 32];
        full_seed[0..8].copy_from_slice(&params.rng_seed.to_le_bytes());
        let mut scenario_rng = StdRng::from_seed(full_seed);
        road.respawn_rng = Some(StdRng::from_seed(full_seed));

        let speed = Normal::new(SPEED_DEFAULT, SPEED_STD_DEV)
            .map_err(|e| SimError::Backend(e.to_string()))?;
        for car_i in 0..params.n_cars {
            let id = format!("car_{}", car_i);
            if !road.add_random_car(&id, &speed, &mut scenario_rng) {
                log::warn!("no free spot for {} after 100 tries, skipping it", id);
            }
        }

        let ego = Car::new(
            &params.ego_id,
            params.n_lanes.saturating_sub(1),
            CAR_LENGTH,
            SPEED_DEFAULT,
        );
        road.departing.push(ego);

        log::debug!(
            "road with {} lanes and {} cars, ego '{}' departing",
            road.n_lanes,
            road.cars.len(),
            params.ego_id
        );
        Ok(road)
    }

    pub fn add_car(&mut self, car: Car) {
        self.cars.push(car);
    }

    fn add_random_car(&mut self, id: &str, speed: &Normal<f64>, rng: &mut StdRng) -> bool {
        // leave the entry zone free for the ego
        let start = 4.0 * CAR_LENGTH;
        for _ in 0..100 {
            let mut car = Car::random_new(id, self.n_lanes, self.length - start, speed, rng);
            car.x += start;
            if self.collides_any_car(&car) {
                continue;
            }
            self.cars.push(car);
            return true;
        }
        false
    }

    pub fn car(&self, id: &VehicleId) -> Option<&Car> {
        self.cars.iter().find(|c| &c.id == id)
    }

    pub fn car_mut(&mut self, id: &VehicleId) -> Option<&mut Car> {
        self.cars.iter_mut().find(|c| &c.id == id)
    }

    fn car_or_err(&self, id: &VehicleId) -> Result<&Car, SimError> {
        self.car(id).ok_or_else(|| SimError::UnknownVehicle(id.clone()))
    }

    fn car_mut_or_err(&mut self, id: &VehicleId) -> Result<&mut Car, SimError> {
        self.car_mut(id)
            .ok_or_else(|| SimError::UnknownVehicle(id.clone()))
    }

    fn lane_index(&self, lane: &LaneId) -> Result<u32, SimError> {
        let unknown = || SimError::UnknownLane(lane.clone());
        if lane.edge().map_err(|_| unknown())? != EDGE_ID {
            return Err(unknown());
        }
        let index = lane.index().map_err(|_| unknown())?;
        if index >= self.n_lanes {
            return Err(unknown());
        }
        Ok(index)
    }

    pub fn collides_between(&self, car_i1: usize, car_i2: usize) -> bool {
        let car_a = &self.cars[car_i1];
        let car_b = &self.cars[car_i2];

        if (car_a.x - car_b.x).abs() > (car_a.length + car_b.length) / 2.0 {
            return false;
        }

        query::intersection_test(&car_a.pose(), &car_a.shape(), &car_b.pose(), &car_b.shape())
            .unwrap_or(false)
    }

    pub fn collides_any_car(&self, car: &Car) -> bool {
        let pose = car.pose();
        let shape = car.shape();
        self.cars.iter().any(|c| {
            query::intersection_test(&pose, &shape, &c.pose(), &c.shape()).unwrap_or(false)
        })
    }

    // Bumper-to-bumper distance to the nearest car ahead that overlaps
    // `car_i` laterally, and its index.
    pub fn dist_clear_ahead(&self, car_i: usize) -> Option<(f64, usize)> {
        let car = &self.cars[car_i];
        let dist_thresh = car.follow_dist() * 4.0;
        let own = car.shape().compute_aabb(&car.pose());

        self.cars
            .iter()
            .enumerate()
            .filter(|(i, c)| *i != car_i && c.x >= car.x && c.x - car.x < dist_thresh)
            .filter_map(|(i, c)| {
                let other = c.shape().compute_aabb(&c.pose());
                let side_sep = range_dist(own.mins[1], own.maxs[1], other.mins[1], other.maxs[1]);
                (side_sep <= SIDE_MARGIN).then(|| (other.mins[0] - own.maxs[0], i))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    fn depart_waiting_cars(&mut self) {
        let waiting = std::mem::take(&mut self.departing);
        for car in waiting {
            if self.collides_any_car(&car) {
                self.departing.push(car);
            } else {
                log::trace!("{}: {} departs", self.t, car.id);
                self.cars.push(car);
            }
        }
    }

    fn remove_collided(&mut self) {
        let mut collided = vec![false; self.cars.len()];
        for (i1, i2) in (0..self.cars.len()).tuple_combinations() {
            if self.collides_between(i1, i2) {
                log::warn!(
                    "{}: collision between {} and {}",
                    self.t,
                    self.cars[i1].id,
                    self.cars[i2].id
                );
                self.collisions += 1;
                collided[i1] = true;
                collided[i2] = true;
            }
        }
        let mut i = 0;
        self.cars.retain(|_| {
            i += 1;
            !collided[i - 1]
        });
    }

    fn remove_exited(&mut self) {
        let length = self.length;
        let (exited, staying): (Vec<Car>, Vec<Car>) = std::mem::take(&mut self.cars)
            .into_iter()
            .partition(|c| c.x - c.length > length);
        self.cars = staying;

        for mut car in exited {
            log::trace!("{}: {} left the road", self.t, car.id);
            if !car.respawn {
                continue;
            }
            car.x = CAR_LENGTH;
            car.lane_hold = None;
            car.speed_ramp = None;
            if let Some(rng) = self.respawn_rng.as_mut() {
                car.vel = rng.gen_range(0.5..=1.0) * car.preferred_vel;
            }
            self.departing.push(car);
        }
    }

    pub fn update(&mut self, dt: f64) {
        self.depart_waiting_cars();

        let driver = IntelligentDriverPolicy::new();
        let accels = (0..self.cars.len())
            .map(|car_i| driver.choose_accel(self, car_i))
            .collect_vec();
        let t = self.t;
        for (car, accel) in self.cars.iter_mut().zip(accels) {
            car.update(accel, t, dt);
        }

        self.remove_collided();
        self.remove_exited();

        self.t += dt;
        self.timesteps += 1;
    }
}

impl Simulation for Road {
    fn step(&mut self) -> Result<(), SimError> {
        if self.closed {
            return Err(SimError::Closed);
        }
        self.update(self.dt);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SimError> {
        self.closed = true;
        Ok(())
    }

    fn sim_time(&self) -> f64 {
        self.t
    }

    fn has_vehicle(&self, id: &VehicleId) -> bool {
        self.car(id).is_some()
    }

    fn vehicle_speed(&self, id: &VehicleId) -> Result<f64, SimError> {
        Ok(self.car_or_err(id)?.vel)
    }

    fn vehicle_acceleration(&self, id: &VehicleId) -> Result<f64, SimError> {
        Ok(self.car_or_err(id)?.accel)
    }

    fn vehicle_position(&self, id: &VehicleId) -> Result<(f64, f64), SimError> {
        let car = self.car_or_err(id)?;
        Ok((car.x, car.y))
    }

    fn vehicle_max_speed(&self, id: &VehicleId) -> Result<f64, SimError> {
        Ok(self.car_or_err(id)?.max_vel)
    }

    fn vehicle_lane(&self, id: &VehicleId) -> Result<LaneId, SimError> {
        let lane = self.car_or_err(id)?.current_lane(self.n_lanes);
        Ok(LaneId::from_parts(EDGE_ID, lane))
    }

    fn lane_occupants(&self, lane: &LaneId) -> Result<Vec<VehicleId>, SimError> {
        let index = self.lane_index(lane)?;
        Ok(self
            .cars
            .iter()
            .filter(|c| c.current_lane(self.n_lanes) == index)
            .sorted_by(|a, b| a.x.total_cmp(&b.x))
            .map(|c| c.id.clone())
            .collect())
    }

    fn lane_length(&self, lane: &LaneId) -> Result<f64, SimError> {
        self.lane_index(lane)?;
        Ok(self.length)
    }

    fn request_lane_change(
        &mut self,
        id: &VehicleId,
        target_lane_index: u32,
        duration: f64,
    ) -> Result<(), SimError> {
        if target_lane_index >= self.n_lanes {
            return Err(SimError::UnknownLane(LaneId::from_parts(
                EDGE_ID,
                target_lane_index,
            )));
        }
        let until = self.t + duration;
        let car = self.car_mut_or_err(id)?;
        car.lane_hold = Some(crate::car::LaneHold {
            lane: target_lane_index,
            until,
        });
        Ok(())
    }

    fn request_speed(
        &mut self,
        id: &VehicleId,
        target_speed: f64,
        duration: f64,
    ) -> Result<(), SimError> {
        let t = self.t;
        let car = self.car_mut_or_err(id)?;
        car.speed_ramp = Some(crate::car::SpeedRamp {
            from: car.vel,
            to: target_speed.max(0.0),
            start: t,
            end: t + duration,
        });
        Ok(())
    }

    fn set_lateral_parameter(
        &mut self,
        id: &VehicleId,
        name: &str,
        value: &str,
    ) -> Result<(), SimError> {
        let car = self.car_mut_or_err(id)?;
        car.lateral_parameters
            .insert(name.to_owned(), value.to_owned());
        Ok(())
    }
}
