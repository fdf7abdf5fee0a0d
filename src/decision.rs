use fstrings::{format_args_f, write_f};

use crate::{
    arg_parameters::Parameters,
    classifier_model::ClassifierModel,
    error::{DecisionError, RunError, SimError},
    improved_liu_model::ImprovedLiuModel,
    lane::VehicleId,
    liu_model::LiuModel,
    simulation::Simulation,
    sl2015_model::Sl2015Model,
    snapshot::TrafficSnapshot,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Scores {
    Utility {
        benefit: f64,
        tolerance: f64,
        safety: f64,
    },
    DensityVeto {
        density: f64,
    },
    SpeedDeficit {
        deficit: f64,
    },
    Incentive {
        strategic: f64,
        speed_gain: f64,
        keep_right: f64,
        total: f64,
        safe: bool,
    },
    Classifier {
        class: u8,
        margin: f64,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub change_lane: bool,
    pub scores: Scores,
}

impl Decision {
    pub fn new(change_lane: bool, scores: Scores) -> Self {
        Self {
            change_lane,
            scores,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let change = self.change_lane;
        match self.scores {
            Scores::Utility {
                benefit,
                tolerance,
                safety,
            } => write_f!(
                f,
                "{change} (benefit {benefit:.2}, tolerance {tolerance:.2}, safety {safety:.2})"
            ),
            Scores::DensityVeto { density } => {
                write_f!(f, "{change} (target lane density {density:.3} over threshold)")
            }
            Scores::SpeedDeficit { deficit } => {
                write_f!(f, "{change} (leader {deficit:.2} m/s slower than ego)")
            }
            Scores::Incentive {
                strategic,
                speed_gain,
                keep_right,
                total,
                safe,
            } => write_f!(
                f,
                "{change} (strategic {strategic:.1}, speed gain {speed_gain:.2}, keep right {keep_right:.1}, total {total:.2}, safe {safe})"
            ),
            Scores::Classifier { class, margin } => {
                write_f!(f, "{change} (class {class}, margin {margin:.3})")
            }
        }
    }
}

#[enum_dispatch]
#[derive(Debug, Clone)]
pub enum DecisionModel {
    LiuModel,
    ImprovedLiuModel,
    Sl2015Model,
    ClassifierModel,
}

#[enum_dispatch(DecisionModel)]
pub trait DecisionModelTrait {
    fn name(&self) -> &'static str;

    /// Per-vehicle setup issued before a decision. Must be idempotent.
    fn prepare(&mut self, _sim: &mut dyn Simulation, _ego: &VehicleId) -> Result<(), SimError> {
        Ok(())
    }

    fn decide(&self, snapshot: &TrafficSnapshot) -> Result<Decision, DecisionError>;
}

pub const MODEL_NAMES: [&str; 6] = [
    "liu",
    "improved_liu",
    "liu_improved",
    "sl2015",
    "ml",
    "classifier",
];

/// Builds the model named by `params.model`. Classifier artifacts are loaded
/// here, so a missing model or scaler fails before the run starts.
pub fn select_model(params: &Parameters) -> Result<DecisionModel, RunError> {
    let model = match params.model.as_str() {
        "liu" => LiuModel::new(params.liu.clone()).into(),
        "improved_liu" | "liu_improved" => {
            ImprovedLiuModel::new(params.improved_liu.clone()).into()
        }
        "sl2015" => Sl2015Model::new(params.sl2015.clone()).into(),
        "ml" | "classifier" => ClassifierModel::load(&params.classifier)?.into(),
        other => return Err(RunError::UnknownModel(other.to_owned())),
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_name() {
        let mut params = Parameters::default();
        for (name, expected) in [
            ("liu", "liu"),
            ("liu_improved", "improved_liu"),
            ("sl2015", "sl2015"),
        ] {
            params.model = name.to_owned();
            assert_eq!(select_model(&params).unwrap().name(), expected);
        }

        params.model = "mobil".to_owned();
        assert!(matches!(
            select_model(&params),
            Err(RunError::UnknownModel(name)) if name == "mobil"
        ));
    }

    #[test]
    fn missing_classifier_artifacts_fail_fast() {
        let mut params = Parameters::default();
        params.model = "ml".to_owned();
        params.classifier.model_path = "does/not/exist.json".into();
        let err = select_model(&params).unwrap_err();
        assert!(matches!(err, RunError::Artifact(_)));
        // the cause is part of the message
        assert!(err.to_string().contains("does/not/exist.json"));
    }

    #[test]
    fn every_registered_name_selects_a_model() {
        let mut params = Parameters::default();
        params.classifier.model_path = "does/not/exist.json".into();
        for name in MODEL_NAMES {
            params.model = name.to_owned();
            assert!(
                !matches!(select_model(&params), Err(RunError::UnknownModel(_))),
                "{} is registered but not selectable",
                name
            );
        }
    }
}
