use crate::{
    arg_parameters::ControllerParameters,
    decision::{Decision, DecisionModel, DecisionModelTrait},
    error::{DecisionError, LaneIdError, SimError},
    lane::{LaneId, VehicleId},
    report::RunReport,
    simulation::Simulation,
    snapshot::TrafficSnapshot,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    EgoAbsent,
    LowestLane,
    LaneChange { target_lane: LaneId },
    SlowDown { target_speed: f64 },
    // A precondition failed; the ego keeps its speed and lane this tick.
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EgoStatus {
    Pending,
    Active,
    Exited,
}

pub fn desired_lane(current: &LaneId) -> Result<Option<LaneId>, LaneIdError> {
    match current.index()? {
        0 => Ok(None),
        index => Ok(Some(current.with_index(index - 1)?)),
    }
}

pub struct LaneChangeController {
    model: DecisionModel,
    params: ControllerParameters,
    ego: VehicleId,
    report: RunReport,
}

impl LaneChangeController {
    pub fn new(model: DecisionModel, params: ControllerParameters, ego: VehicleId) -> Self {
        let report = RunReport::new(model.name());
        Self {
            model,
            params,
            ego,
            report,
        }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    fn decide(
        &self,
        sim: &dyn Simulation,
        current: &LaneId,
        desired: &LaneId,
    ) -> Result<(Decision, u32), DecisionError> {
        let snapshot = TrafficSnapshot::capture(sim, &self.ego, current, desired)?;
        let decision = self.model.decide(&snapshot)?;
        Ok((decision, desired.index()?))
    }

    fn skip(&self, sim: &dyn Simulation, e: DecisionError) -> TickOutcome {
        log::warn!("{}: skipping {} this tick: {}", sim.sim_time(), self.ego, e);
        TickOutcome::Skipped
    }

    /// One decision for the ego against the current simulator state.
    /// Only simulator failures are returned as errors.
    pub fn step(&mut self, sim: &mut dyn Simulation) -> Result<TickOutcome, SimError> {
        let ego = self.ego.clone();
        if !sim.has_vehicle(&ego) {
            return Ok(TickOutcome::EgoAbsent);
        }

        let current = sim.vehicle_lane(&ego)?;
        let desired = match desired_lane(&current) {
            Ok(Some(desired)) => desired,
            Ok(None) => return Ok(TickOutcome::LowestLane),
            Err(e) => return Ok(self.skip(sim, e.into())),
        };

        self.model.prepare(sim, &ego)?;

        let (decision, target_index) = match self.decide(sim, &current, &desired) {
            Ok(decided) => decided,
            Err(DecisionError::Sim(e)) => return Err(e),
            Err(e) => return Ok(self.skip(sim, e)),
        };
        log::debug!(
            "{}: {} {} -> {}: {} says {}",
            sim.sim_time(),
            ego,
            current,
            desired,
            self.model.name(),
            decision
        );

        if decision.change_lane {
            sim.request_lane_change(&ego, target_index, self.params.lane_change_duration)?;
            Ok(TickOutcome::LaneChange {
                target_lane: desired,
            })
        } else {
            let target_speed = (sim.vehicle_speed(&ego)? - self.params.speed_decrement).max(0.0);
            sim.request_speed(&ego, target_speed, self.params.slow_down_duration)?;
            Ok(TickOutcome::SlowDown { target_speed })
        }
    }

    fn run_steps(&mut self, sim: &mut dyn Simulation, max_steps: u32) -> Result<(), SimError> {
        let mut status = EgoStatus::Pending;
        for _ in 0..max_steps {
            sim.step()?;
            self.report.ticks += 1;
            self.report.sim_time = sim.sim_time();

            status = match (status, sim.has_vehicle(&self.ego)) {
                (_, true) => EgoStatus::Active,
                (EgoStatus::Pending, false) => EgoStatus::Pending,
                (_, false) => EgoStatus::Exited,
            };
            log::trace!("{}: ego {} is {:?}", sim.sim_time(), self.ego, status);
            match status {
                EgoStatus::Pending => continue,
                EgoStatus::Exited => {
                    log::info!("{}: {} left the simulation", sim.sim_time(), self.ego);
                    self.report.ego_exited = true;
                    break;
                }
                EgoStatus::Active => {
                    self.report.ego_speed.update(sim.vehicle_speed(&self.ego)?);
                }
            }

            let outcome = self.step(sim)?;
            self.report.record(&outcome);
        }
        Ok(())
    }

    /// Steps the simulation up to `max_steps` times, deciding once per tick,
    /// then closes it. Ends early once the ego has appeared and left again.
    pub fn run(&mut self, sim: &mut dyn Simulation, max_steps: u32) -> Result<RunReport, SimError> {
        log::info!(
            "running {} for {} with at most {} steps",
            self.model.name(),
            self.ego,
            max_steps
        );
        let result = self.run_steps(sim, max_steps);
        let closed = sim.close();
        result?;
        closed?;
        log::info!("finished after {} ticks", self.report.ticks);
        Ok(self.report.clone())
    }
}
