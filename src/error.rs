use std::{num::ParseIntError, path::PathBuf};

use thiserror::Error;

use crate::{
    decision::MODEL_NAMES,
    lane::{LaneId, VehicleId},
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LaneIdError {
    #[error("lane id '{0}' has no '_<index>' suffix")]
    MissingIndex(String),
    #[error("lane id '{lane}' has an unparseable index")]
    BadIndex {
        lane: String,
        #[source]
        source: ParseIntError,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("vehicle '{0}' is not in the simulation")]
    UnknownVehicle(VehicleId),
    #[error("lane '{0}' does not exist")]
    UnknownLane(LaneId),
    #[error("simulation has already been closed")]
    Closed,
    #[error("simulator failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecisionError {
    #[error(transparent)]
    Lane(#[from] LaneIdError),
    #[error("ego '{ego}' is missing from the occupants of its own lane '{lane}'")]
    EgoNotInLane { ego: VehicleId, lane: LaneId },
    #[error("{what} of '{vehicle}' is not finite ({value})")]
    NonFinite {
        vehicle: VehicleId,
        what: &'static str,
        value: f64,
    },
    #[error("classifier expects {expected} features but {found} were built")]
    FeatureCount { expected: usize, found: usize },
    #[error(transparent)]
    Sim(#[from] SimError),
}

impl DecisionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecisionError::Sim(_))
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot read artifact {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {path:?} is malformed")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact {path:?} is inconsistent: {reason}")]
    Shape { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("unknown decision model '{0}' (expected one of {:?})", MODEL_NAMES)]
    UnknownModel(String),
    #[error("classifier artifacts could not be loaded: {0}")]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Sim(#[from] SimError),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("{0} is not a valid parameter")]
    Unknown(String),
    #[error("invalid value '{value}' for parameter {name}")]
    Invalid { name: String, value: String },
    #[error("parameter {0} has already been specified")]
    Duplicate(String),
    #[error("no values given for parameter {0}")]
    MissingValues(String),
    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed { failed: usize, total: usize },
}
