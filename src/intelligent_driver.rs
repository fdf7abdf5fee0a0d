use crate::{car::BREAKING_ACCEL, road::Road};

#[derive(Debug, Clone)]
pub struct IntelligentDriverPolicy;

impl IntelligentDriverPolicy {
    pub fn new() -> Self {
        Self
    }

    // https://en.wikipedia.org/wiki/Intelligent_driver_model
    pub fn choose_accel(&self, road: &Road, car_i: usize) -> f64 {
        let car = &road.cars[car_i];
        let desired_vel = car.target_vel(road.t).max(0.1);

        let accel_free_road = car.preferred_accel * (1.0 - (car.vel / desired_vel).powi(4));

        if let Some((forward_dist, c_i)) = road.dist_clear_ahead(car_i) {
            let approaching_rate = car.vel - road.cars[c_i].vel;

            let spacing_term = car.follow_min_dist
                + car.vel * car.follow_time
                + car.vel * approaching_rate / (2.0 * (car.preferred_accel * BREAKING_ACCEL).sqrt());
            let accel_interaction =
                car.preferred_accel * (-(spacing_term.max(0.0) / forward_dist.max(0.1)).powi(2));

            accel_free_road + accel_interaction
        } else {
            accel_free_road
        }
    }
}

impl Default for IntelligentDriverPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::Car;

    #[test]
    fn free_road_accelerates_toward_preferred_speed() {
        let mut road = Road::empty(2, 1000.0, 1.0);
        let mut car = Car::new("a", 0, 10.0, 5.0);
        car.preferred_vel = 20.0;
        road.add_car(car);
        assert!(IntelligentDriverPolicy::new().choose_accel(&road, 0) > 0.0);
    }

    #[test]
    fn brakes_behind_a_stopped_car() {
        let mut road = Road::empty(2, 1000.0, 1.0);
        road.add_car(Car::new("a", 0, 100.0, 15.0));
        road.add_car(Car::new("stopped", 0, 120.0, 0.0));
        // a car in the other lane is ignored
        road.add_car(Car::new("beside", 1, 104.0, 0.0));
        assert!(IntelligentDriverPolicy::new().choose_accel(&road, 0) < -BREAKING_ACCEL);
    }
}
