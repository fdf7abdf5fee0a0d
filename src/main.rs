use lane_change_decision::arg_parameters::run_parallel_scenarios;

fn main() {
    env_logger::init();
    if let Err(e) = run_parallel_scenarios() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
