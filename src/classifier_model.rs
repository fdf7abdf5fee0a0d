use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    arg_parameters::ClassifierParameters,
    decision::{Decision, DecisionModelTrait, Scores},
    error::{ArtifactError, DecisionError},
    snapshot::{Neighbor, TrafficSnapshot},
};

const BASE_FEATURES: usize = 8;
const EXTENDED_FEATURES: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(x, (mean, scale))| {
                // constant features were stored with a zero scale
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect()
    }
}

// A binary decision boundary; a positive margin is class 1 (change lanes).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kernel", rename_all = "snake_case")]
pub enum Classifier {
    Linear {
        weights: Vec<f64>,
        intercept: f64,
    },
    Rbf {
        gamma: f64,
        support_vectors: Vec<Vec<f64>>,
        dual_coef: Vec<f64>,
        intercept: f64,
    },
}

impl Classifier {
    pub fn margin(&self, x: &[f64]) -> f64 {
        match self {
            Classifier::Linear { weights, intercept } => {
                weights.iter().zip(x).map(|(w, x)| w * x).sum::<f64>() + intercept
            }
            Classifier::Rbf {
                gamma,
                support_vectors,
                dual_coef,
                intercept,
            } => {
                support_vectors
                    .iter()
                    .zip(dual_coef)
                    .map(|(sv, coef)| {
                        let dist_sq = sv.iter().zip(x).map(|(s, x)| (s - x).powi(2)).sum::<f64>();
                        coef * (-gamma * dist_sq).exp()
                    })
                    .sum::<f64>()
                    + intercept
            }
        }
    }

    fn check_dim(&self, dim: usize) -> Result<(), String> {
        match self {
            Classifier::Linear { weights, .. } => {
                if weights.len() != dim {
                    return Err(format!("{} weights for {} features", weights.len(), dim));
                }
            }
            Classifier::Rbf {
                support_vectors,
                dual_coef,
                ..
            } => {
                if support_vectors.len() != dual_coef.len() {
                    return Err(format!(
                        "{} support vectors but {} dual coefficients",
                        support_vectors.len(),
                        dual_coef.len()
                    ));
                }
                if let Some(sv) = support_vectors.iter().find(|sv| sv.len() != dim) {
                    return Err(format!("support vector of length {} for {} features", sv.len(), dim));
                }
            }
        }
        Ok(())
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Parse {
        path: path.to_owned(),
        source,
    })
}

fn shape_error(path: &Path, reason: String) -> ArtifactError {
    ArtifactError::Shape {
        path: PathBuf::from(path),
        reason,
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierModel {
    params: ClassifierParameters,
    scaler: StandardScaler,
    classifier: Classifier,
}

impl ClassifierModel {
    /// Loads and cross-checks both artifacts. Any failure here ends the run.
    pub fn load(params: &ClassifierParameters) -> Result<Self, ArtifactError> {
        let scaler: StandardScaler = load_json(&params.scaler_path)?;
        let classifier: Classifier = load_json(&params.model_path)?;
        let model = Self::from_parts(params.clone(), scaler, classifier)?;
        log::info!(
            "loaded classifier {:?} with scaler {:?}",
            params.model_path,
            params.scaler_path
        );
        Ok(model)
    }

    pub fn from_parts(
        params: ClassifierParameters,
        scaler: StandardScaler,
        classifier: Classifier,
    ) -> Result<Self, ArtifactError> {
        let dim = if params.extended_features {
            EXTENDED_FEATURES
        } else {
            BASE_FEATURES
        };
        if scaler.mean.len() != dim || scaler.scale.len() != dim {
            return Err(shape_error(
                &params.scaler_path,
                format!(
                    "{} means and {} scales for {} features",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    dim
                ),
            ));
        }
        classifier
            .check_dim(dim)
            .map_err(|reason| shape_error(&params.model_path, reason))?;

        Ok(Self {
            params,
            scaler,
            classifier,
        })
    }

    // Raw features in training order, sentinels in place of missing
    // neighbors, converted to training units. Always finite.
    pub fn features(&self, s: &TrafficSnapshot) -> Vec<f64> {
        let p = &self.params;
        let gap = |n: &Option<Neighbor>| n.as_ref().map_or(p.absent_gap, |n| n.gap);
        let leader_speed = |n: &Option<Neighbor>| n.as_ref().map_or(p.absent_leader_speed, |n| n.speed);

        let v_e = s.ego_speed;
        let v_tr = s
            .target_lane_follower
            .as_ref()
            .map_or(p.absent_follower_speed, |n| n.speed);
        let v_tp = leader_speed(&s.target_lane_leader);

        let mut features = vec![
            v_e,
            s.ego_acceleration,
            gap(&s.current_lane_leader),
            gap(&s.target_lane_follower),
            gap(&s.target_lane_leader),
            leader_speed(&s.current_lane_leader),
            v_tr,
            v_tp,
        ];
        if p.extended_features {
            features.push(v_e - v_tr);
            features.push(v_e - v_tp);
        }
        for x in features.iter_mut() {
            *x *= p.unit_factor;
        }
        features
    }
}

impl DecisionModelTrait for ClassifierModel {
    fn name(&self) -> &'static str {
        "ml"
    }

    fn decide(&self, s: &TrafficSnapshot) -> Result<Decision, DecisionError> {
        let features = self.features(s);
        if features.len() != self.scaler.dim() {
            return Err(DecisionError::FeatureCount {
                expected: self.scaler.dim(),
                found: features.len(),
            });
        }
        let scaled = self.scaler.transform(&features);
        let margin = self.classifier.margin(&scaled);
        let class = u8::from(margin > 0.0);
        Ok(Decision::new(class == 1, Scores::Classifier { class, margin }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::neighbor;
    use approx::assert_abs_diff_eq;

    fn identity_scaler(dim: usize) -> StandardScaler {
        StandardScaler {
            mean: vec![0.0; dim],
            scale: vec![1.0; dim],
        }
    }

    fn gap_comparison_model() -> ClassifierModel {
        let mut weights = vec![0.0; EXTENDED_FEATURES];
        weights[2] = -1.0;
        weights[4] = 1.0;
        ClassifierModel::from_parts(
            ClassifierParameters::default(),
            identity_scaler(EXTENDED_FEATURES),
            Classifier::Linear {
                weights,
                intercept: 0.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn features_stay_finite_for_any_neighborhood() {
        let model = gap_comparison_model();
        for mask in 0..8u8 {
            let mut s = TrafficSnapshot::open_road(12.0, "E0_1", "E0_0");
            if mask & 1 != 0 {
                s.current_lane_leader = neighbor("lead", 20.0, 10.0);
            }
            if mask & 2 != 0 {
                s.target_lane_leader = neighbor("ahead", 40.0, 14.0);
            }
            if mask & 4 != 0 {
                s.target_lane_follower = neighbor("rear", 25.0, 11.0);
            }
            let features = model.features(&s);
            assert_eq!(features.len(), EXTENDED_FEATURES);
            assert!(features.iter().all(|x| x.is_finite()), "{:?}", features);
            assert!(model.decide(&s).is_ok());
        }
    }

    #[test]
    fn sentinels_then_unit_conversion() {
        let model = gap_comparison_model();
        let s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        let f = model.features(&s);
        let ft = 3.28084;
        assert_abs_diff_eq!(f[0], 10.0 * ft, epsilon = 1e-9);
        assert_abs_diff_eq!(f[2], 1000.0 * ft, epsilon = 1e-9);
        assert_abs_diff_eq!(f[5], 1000.0 * ft, epsilon = 1e-9);
        assert_abs_diff_eq!(f[6], 0.0);
        assert_abs_diff_eq!(f[8], 10.0 * ft, epsilon = 1e-9);
        assert_abs_diff_eq!(f[9], -990.0 * ft, epsilon = 1e-9);
    }

    #[test]
    fn linear_boundary() {
        let model = gap_comparison_model();
        let mut s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        s.current_lane_leader = neighbor("lead", 10.0, 8.0);
        s.target_lane_leader = neighbor("ahead", 50.0, 12.0);
        let decision = model.decide(&s).unwrap();
        assert!(decision.change_lane);
        assert!(matches!(decision.scores, Scores::Classifier { class: 1, .. }));

        s.target_lane_leader = neighbor("ahead", 5.0, 12.0);
        let decision = model.decide(&s).unwrap();
        assert!(!decision.change_lane);
        assert!(matches!(decision.scores, Scores::Classifier { class: 0, .. }));
    }

    #[test]
    fn rbf_boundary_and_zero_scale() {
        let params = ClassifierParameters {
            extended_features: false,
            unit_factor: 1.0,
            ..ClassifierParameters::default()
        };
        let mut scaler = identity_scaler(BASE_FEATURES);
        scaler.scale[1] = 0.0;
        let positive = vec![10.0, 0.0, 1000.0, 1000.0, 1000.0, 1000.0, 0.0, 1000.0];
        let classifier = Classifier::Rbf {
            gamma: 0.5,
            support_vectors: vec![positive],
            dual_coef: vec![1.0],
            intercept: -0.5,
        };
        let model = ClassifierModel::from_parts(params, scaler, classifier).unwrap();

        // exactly on the support vector: exp(0) - 0.5
        let s = TrafficSnapshot::open_road(10.0, "E0_1", "E0_0");
        match model.decide(&s).unwrap().scores {
            Scores::Classifier { class, margin } => {
                assert_eq!(class, 1);
                assert_abs_diff_eq!(margin, 0.5, epsilon = 1e-12);
            }
            other => panic!("unexpected scores {:?}", other),
        }

        let s = TrafficSnapshot::open_road(20.0, "E0_1", "E0_0");
        assert!(!model.decide(&s).unwrap().change_lane);
    }

    #[test]
    fn artifacts_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        let model_path = dir.path().join("classifier.json");
        fs::write(
            &scaler_path,
            serde_json::to_string(&identity_scaler(EXTENDED_FEATURES)).unwrap(),
        )
        .unwrap();
        fs::write(
            &model_path,
            r#"{"kernel": "linear", "weights": [0,0,-1,0,1,0,0,0,0,0], "intercept": 0.0}"#,
        )
        .unwrap();

        let params = ClassifierParameters {
            model_path,
            scaler_path,
            ..ClassifierParameters::default()
        };
        let model = ClassifierModel::load(&params).unwrap();
        assert_eq!(model.name(), "ml");
        assert_eq!(model.classifier, gap_comparison_model().classifier);
    }

    #[test]
    fn artifact_problems_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        let model_path = dir.path().join("classifier.json");
        fs::write(
            &model_path,
            r#"{"kernel": "linear", "weights": [1,2,3], "intercept": 0.0}"#,
        )
        .unwrap();

        let params = ClassifierParameters {
            model_path: model_path.clone(),
            scaler_path: scaler_path.clone(),
            ..ClassifierParameters::default()
        };
        assert!(matches!(
            ClassifierModel::load(&params),
            Err(ArtifactError::Io { .. })
        ));

        fs::write(&scaler_path, "not json").unwrap();
        assert!(matches!(
            ClassifierModel::load(&params),
            Err(ArtifactError::Parse { .. })
        ));

        fs::write(
            &scaler_path,
            serde_json::to_string(&identity_scaler(EXTENDED_FEATURES)).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            ClassifierModel::load(&params),
            Err(ArtifactError::Shape { path, .. }) if path == model_path
        ));
    }
}
