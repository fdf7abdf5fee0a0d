#[macro_use]
extern crate enum_dispatch;

pub mod arg_parameters;
pub mod car;
pub mod classifier_model;
pub mod controller;
pub mod decision;
pub mod error;
pub mod improved_liu_model;
pub mod intelligent_driver;
pub mod lane;
pub mod liu_model;
pub mod neighbors;
pub mod report;
pub mod road;
pub mod simulation;
pub mod sl2015_model;
pub mod snapshot;

use arg_parameters::Parameters;
use controller::LaneChangeController;
use decision::select_model;
use error::RunError;
use lane::VehicleId;
use report::RunReport;
use road::Road;

pub const KMH_TO_MPS: f64 = 1.0 / 3.6;

pub fn run_with_parameters(params: Parameters) -> Result<RunReport, RunError> {
    let model = select_model(&params)?;
    let mut road = Road::random(&params)?;

    let mut controller = LaneChangeController::new(
        model,
        params.controller.clone(),
        VehicleId::new(params.ego_id.clone()),
    );
    let mut report = controller.run(&mut road, params.max_steps)?;
    report.collisions = road.collisions;
    Ok(report)
}
