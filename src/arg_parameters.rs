use std::{
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};

use fstrings::{format_args_f, format_f};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{decision::MODEL_NAMES, error::ParameterError, run_with_parameters, KMH_TO_MPS};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerParameters {
    pub lane_change_duration: f64,
    pub speed_decrement: f64,
    pub slow_down_duration: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiuParameters {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub theta: f64,
    pub min_safe_gap: f64,
    pub desired_speed: f64,
    // Stand-in ego speed for the time headway when the ego is stopped.
    pub min_reference_speed: f64,
    pub absent_leader_speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImprovedLiuParameters {
    pub base_safe_gap: f64,
    pub closing_speed_gap_factor: f64,
    pub density_threshold: f64,
    pub speed_deficit_threshold: f64,
    pub density_gain: f64,
    pub speed_gain: f64,
    pub c: f64,
    pub e: f64,
    pub theta: f64,
    pub desired_speed: f64,
    pub min_reference_speed: f64,
    pub absent_leader_speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sl2015Parameters {
    pub strategic_weight: f64,
    pub speed_gain_weight: f64,
    pub keep_right_weight: f64,
    pub min_safe_gap: f64,
    pub reaction_time: f64,
    pub lateral_parameters: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParameters {
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    pub extended_features: bool,
    pub absent_gap: f64,
    pub absent_leader_speed: f64,
    pub absent_follower_speed: f64,
    // Multiplier from simulator units to the units the classifier was trained on.
    pub unit_factor: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub rng_seed: u64,
    pub max_steps: u32,
    pub physics_dt: f64,
    pub n_cars: usize,
    pub n_lanes: u32,
    pub road_length: f64,
    pub ego_id: String,
    pub model: String,

    pub thread_limit: usize,
    pub file_name: Option<String>,

    pub controller: ControllerParameters,
    pub liu: LiuParameters,
    pub improved_liu: ImprovedLiuParameters,
    pub sl2015: Sl2015Parameters,
    pub classifier: ClassifierParameters,
}

impl Default for ControllerParameters {
    fn default() -> Self {
        Self {
            lane_change_duration: 20.0,
            speed_decrement: 2.0 * KMH_TO_MPS,
            slow_down_duration: 5.0,
        }
    }
}

impl Default for LiuParameters {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 1.0,
            c: 1.0,
            d: 1.0,
            e: 1.0,
            theta: 0.5,
            min_safe_gap: 15.0,
            desired_speed: 40.0 * KMH_TO_MPS,
            min_reference_speed: 1.0 * KMH_TO_MPS,
            absent_leader_speed: 1000.0,
        }
    }
}

impl Default for ImprovedLiuParameters {
    fn default() -> Self {
        Self {
            base_safe_gap: 20.0,
            closing_speed_gap_factor: 2.0,
            density_threshold: 0.3,
            speed_deficit_threshold: 5.0 * KMH_TO_MPS,
            density_gain: 0.1,
            speed_gain: 0.05,
            c: 1.0,
            e: 1.0,
            theta: 0.5,
            desired_speed: 40.0 * KMH_TO_MPS,
            min_reference_speed: 1.0 * KMH_TO_MPS,
            absent_leader_speed: 1000.0,
        }
    }
}

impl Default for Sl2015Parameters {
    fn default() -> Self {
        let lateral_parameters = [
            ("lcSublane", "0.5"),
            ("lcPushy", "0.1"),
            ("lcAssertive", "0.2"),
            ("lcImpatience", "0.0"),
            ("lcTimeToImpatience", "120.0"),
            ("lcAccelLat", "0.5"),
            ("maxSpeedLat", "0.5"),
            ("minGapLat", "1.5"),
            ("latAlignment", "center"),
        ]
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            strategic_weight: 1.0,
            speed_gain_weight: 1.0,
            keep_right_weight: 1.0,
            min_safe_gap: 15.0,
            reaction_time: 2.0,
            lateral_parameters,
        }
    }
}

impl Default for ClassifierParameters {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/classifier.json"),
            scaler_path: PathBuf::from("models/scaler.json"),
            extended_features: true,
            absent_gap: 1000.0,
            absent_leader_speed: 1000.0,
            absent_follower_speed: 0.0,
            unit_factor: 3.28084,
        }
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            rng_seed: 0,
            max_steps: 500,
            physics_dt: 1.0,
            n_cars: 30,
            n_lanes: 3,
            road_length: 3000.0,
            ego_id: "Ego".to_owned(),
            model: "liu".to_owned(),
            thread_limit: 1,
            file_name: None,
            controller: ControllerParameters::default(),
            liu: LiuParameters::default(),
            improved_liu: ImprovedLiuParameters::default(),
            sl2015: Sl2015Parameters::default(),
            classifier: ClassifierParameters::default(),
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, ParameterError> {
    value.parse().map_err(|_| ParameterError::Invalid {
        name: name.to_owned(),
        value: value.to_owned(),
    })
}

fn set_parameter(params: &mut Parameters, name: &str, val: &str) -> Result<(), ParameterError> {
    match name {
        "rng_seed" => params.rng_seed = parse(name, val)?,
        "max_steps" => params.max_steps = parse(name, val)?,
        "physics_dt" => params.physics_dt = parse(name, val)?,
        "n_cars" => params.n_cars = parse(name, val)?,
        "n_lanes" => params.n_lanes = parse(name, val)?,
        "road_length" => params.road_length = parse(name, val)?,
        "ego_id" => params.ego_id = val.to_owned(),
        "model" if MODEL_NAMES.contains(&val) => params.model = val.to_owned(),
        "model" => {
            return Err(ParameterError::Invalid {
                name: name.to_owned(),
                value: val.to_owned(),
            })
        }
        "thread_limit" => params.thread_limit = parse(name, val)?,
        "controller.lane_change_duration" => {
            params.controller.lane_change_duration = parse(name, val)?
        }
        "controller.speed_decrement" => params.controller.speed_decrement = parse(name, val)?,
        "controller.slow_down_duration" => {
            params.controller.slow_down_duration = parse(name, val)?
        }
        "liu.a" => params.liu.a = parse(name, val)?,
        "liu.b" => params.liu.b = parse(name, val)?,
        "liu.c" => params.liu.c = parse(name, val)?,
        "liu.d" => params.liu.d = parse(name, val)?,
        "liu.e" => params.liu.e = parse(name, val)?,
        "liu.theta" => params.liu.theta = parse(name, val)?,
        "liu.min_safe_gap" => params.liu.min_safe_gap = parse(name, val)?,
        "liu.desired_speed" => params.liu.desired_speed = parse(name, val)?,
        "improved_liu.base_safe_gap" => params.improved_liu.base_safe_gap = parse(name, val)?,
        "improved_liu.density_threshold" => {
            params.improved_liu.density_threshold = parse(name, val)?
        }
        "improved_liu.speed_deficit_threshold" => {
            params.improved_liu.speed_deficit_threshold = parse(name, val)?
        }
        "improved_liu.theta" => params.improved_liu.theta = parse(name, val)?,
        "improved_liu.desired_speed" => params.improved_liu.desired_speed = parse(name, val)?,
        "sl2015.strategic_weight" => params.sl2015.strategic_weight = parse(name, val)?,
        "sl2015.speed_gain_weight" => params.sl2015.speed_gain_weight = parse(name, val)?,
        "sl2015.keep_right_weight" => params.sl2015.keep_right_weight = parse(name, val)?,
        "sl2015.min_safe_gap" => params.sl2015.min_safe_gap = parse(name, val)?,
        "sl2015.reaction_time" => params.sl2015.reaction_time = parse(name, val)?,
        "classifier.model_path" => params.classifier.model_path = PathBuf::from(val),
        "classifier.scaler_path" => params.classifier.scaler_path = PathBuf::from(val),
        "classifier.extended_features" => {
            params.classifier.extended_features = parse(name, val)?
        }
        _ => return Err(ParameterError::Unknown(name.to_owned())),
    }
    Ok(())
}

pub fn create_scenarios(
    base_params: &Parameters,
    name_value_pairs: &[(String, Vec<String>)],
) -> Result<Vec<Parameters>, ParameterError> {
    if name_value_pairs.is_empty() {
        return Ok(vec![base_params.clone()]);
    }

    let mut scenarios = Vec::new();
    let (name, values) = &name_value_pairs[0];
    if values.is_empty() {
        return Err(ParameterError::MissingValues(name.clone()));
    }

    for value in values.iter() {
        let mut params = base_params.clone();
        set_parameter(&mut params, name, value)?;

        let not_for_file_name = ["thread_limit"];
        if let Some(file_name) = params.file_name.as_mut() {
            if !not_for_file_name.contains(&name.as_str()) {
                if !file_name.is_empty() {
                    file_name.push('_');
                }
                file_name.push_str(&format_f!("{name}_{value}"));
            }
        }

        if name_value_pairs.len() > 1 {
            scenarios.append(&mut create_scenarios(&params, &name_value_pairs[1..])?);
        } else {
            scenarios.push(params);
        }
    }
    Ok(scenarios)
}

// Splits `name value* :: name value* ::` into name/value groups.
pub fn parse_name_value_pairs<I>(args: I) -> Result<Vec<(String, Vec<String>)>, ParameterError>
where
    I: IntoIterator<Item = String>,
{
    let mut name_value_pairs = Vec::<(String, Vec<String>)>::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for arg in args.into_iter().chain(std::iter::once("::".to_owned())) {
        if arg == "::" {
            if let Some((name, vals)) = current.take() {
                if name_value_pairs.iter().any(|pair| pair.0 == name) {
                    return Err(ParameterError::Duplicate(name));
                }
                name_value_pairs.push((name, vals));
            }
        } else if let Some((_, vals)) = current.as_mut() {
            vals.push(arg);
        } else {
            current = Some((arg, Vec::new()));
        }
    }
    Ok(name_value_pairs)
}

fn print_help() {
    eprintln!("Usage: (<param name> [param value]* ::)*");
    eprintln!("For example: model liu improved_liu sl2015 :: rng_seed 0 1 2 :: liu.theta 0.3 0.5");
    eprintln!("Valid parameters and their default values:");
    match serde_json::to_string_pretty(&Parameters::default()) {
        Ok(defaults) => eprintln!("{}", defaults),
        Err(e) => log::error!("cannot print defaults: {}", e),
    }
}

fn append_result(file_name: &str, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("results.txt")?;
    writeln!(file, "{} {}", file_name, line)
}

pub fn run_parallel_scenarios() -> Result<(), ParameterError> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|arg| arg == "--help" || arg == "help") {
        print_help();
        return Ok(());
    }

    let name_value_pairs = parse_name_value_pairs(args)?;

    let mut base_scenario = Parameters::default();
    base_scenario.file_name = Some("".to_owned());

    let scenarios = create_scenarios(&base_scenario, &name_value_pairs)?;

    let n_scenarios = scenarios.len();
    log::info!("Starting to run {} scenarios", n_scenarios);
    if n_scenarios == 0 {
        return Ok(());
    }

    let thread_limit = scenarios[0].thread_limit;
    if thread_limit > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_limit)
            .build_global()
        {
            log::warn!("could not limit the thread pool: {}", e);
        }
    }

    run_scenarios(&scenarios)
}

pub fn run_scenarios(scenarios: &[Parameters]) -> Result<(), ParameterError> {
    let n_scenarios = scenarios.len();
    let n_scenarios_completed = AtomicUsize::new(0);
    let n_scenarios_failed = AtomicUsize::new(0);

    scenarios.par_iter().for_each(|scenario| {
        let name = scenario.file_name.clone().unwrap_or_default();
        match run_with_parameters(scenario.clone()) {
            Ok(report) => {
                let completed = n_scenarios_completed.fetch_add(1, Ordering::Relaxed) + 1;
                log::info!("{}/{} scenarios completed", completed, n_scenarios);
                println!("{} {}", name, report);
                if n_scenarios > 1 || !name.is_empty() {
                    if let Err(e) = append_result(&name, &report.to_string()) {
                        log::error!("could not record results for '{}': {}", name, e);
                    }
                }
            }
            Err(e) => {
                n_scenarios_failed.fetch_add(1, Ordering::Relaxed);
                log::error!("scenario '{}' failed: {}", name, e);
            }
        }
    });

    let failed = n_scenarios_failed.into_inner();
    if failed > 0 {
        return Err(ParameterError::ScenariosFailed {
            failed,
            total: n_scenarios,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn cartesian_product_of_values() {
        let pairs = parse_name_value_pairs(args("model liu sl2015 :: rng_seed 1 2 3")).unwrap();
        let mut base = Parameters::default();
        base.file_name = Some(String::new());

        let scenarios = create_scenarios(&base, &pairs).unwrap();
        assert_eq!(scenarios.len(), 6);
        assert_eq!(scenarios[0].model, "liu");
        assert_eq!(scenarios[0].rng_seed, 1);
        assert_eq!(scenarios[5].model, "sl2015");
        assert_eq!(scenarios[5].rng_seed, 3);
        assert_eq!(
            scenarios[4].file_name.as_deref(),
            Some("model_sl2015_rng_seed_2")
        );
    }

    #[test]
    fn dotted_names_reach_nested_blocks() {
        let pairs = parse_name_value_pairs(args("liu.theta 0.25 :: sl2015.reaction_time 3"))
            .unwrap();
        let scenarios = create_scenarios(&Parameters::default(), &pairs).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].liu.theta, 0.25);
        assert_eq!(scenarios[0].sl2015.reaction_time, 3.0);
    }

    #[test]
    fn bad_parameters_are_rejected() {
        let pairs = parse_name_value_pairs(args("warp_speed 9")).unwrap();
        assert_eq!(
            create_scenarios(&Parameters::default(), &pairs),
            Err(ParameterError::Unknown("warp_speed".to_owned()))
        );

        let pairs = parse_name_value_pairs(args("max_steps many")).unwrap();
        assert!(matches!(
            create_scenarios(&Parameters::default(), &pairs),
            Err(ParameterError::Invalid { .. })
        ));

        assert_eq!(
            parse_name_value_pairs(args("rng_seed 1 :: rng_seed 2")),
            Err(ParameterError::Duplicate("rng_seed".to_owned()))
        );
    }

    #[test]
    fn unknown_model_is_rejected_before_running() {
        let pairs = parse_name_value_pairs(args("model liu mobil")).unwrap();
        assert_eq!(
            create_scenarios(&Parameters::default(), &pairs),
            Err(ParameterError::Invalid {
                name: "model".to_owned(),
                value: "mobil".to_owned(),
            })
        );

        let pairs = parse_name_value_pairs(args("model liu_improved classifier")).unwrap();
        assert_eq!(create_scenarios(&Parameters::default(), &pairs).unwrap().len(), 2);
    }

    #[test]
    fn failed_scenarios_fail_the_sweep() {
        let mut failing = Parameters::default();
        failing.model = "ml".to_owned();
        failing.classifier.model_path = "does/not/exist.json".into();
        let mut also_failing = failing.clone();
        also_failing.classifier.scaler_path = "nor/this.json".into();

        assert_eq!(
            run_scenarios(&[failing, also_failing]),
            Err(ParameterError::ScenariosFailed {
                failed: 2,
                total: 2
            })
        );

        let passing = Parameters {
            max_steps: 5,
            n_cars: 5,
            road_length: 400.0,
            ..Parameters::default()
        };
        assert_eq!(run_scenarios(&[passing]), Ok(()));
    }
}
