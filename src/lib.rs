pub mod alg;
pub mod env;
pub mod error;
pub mod geometry;
pub mod run;
pub mod search;

/// dimensional analysis types
pub type Scalar = f64;
pub type Probability = f64;
pub type Entropy = f64;
pub type Utility = f64;

// czt parameters
const CZT_BIAS: Scalar = 4.0;
const CZT_BALL_SPLIT_VISIT_THRESH: u64 = 10;

// simplex map parameters
const SM_L_INF_THRESH: Scalar = 0.05;
const SM_MAX_DEPTH: u32 = 40;
const SM_SPLIT_VISIT_THRESH: u64 = 1;

// boltzmann search parameters
const SMBTS_SEARCH_TEMP: Scalar = 1.0;
const SMBTS_EPSILON: Probability = 0.5;
const SMBTS_TEMP_DECAY_VISITS_SCALE: Scalar = 1.0;
const SMDENTS_ENTROPY_TEMP_INIT: Scalar = 1.0;
const SMDENTS_ENTROPY_TEMP_VISITS_SCALE: Scalar = 1.0;

// geometric tolerances
const GEOMETRY_EPSILON: Scalar = 1e-9;
const LP_EPSILON: Scalar = 1e-9;

/// progress bar
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_secs(60);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan}";
    let style = indicatif::ProgressStyle::with_template(style).unwrap();
    let progress = indicatif::ProgressBar::new(n as u64);
    progress.set_style(style);
    progress.enable_steady_tick(tick);
    progress
}

/// initialize logging to terminal and a timestamped file
pub fn init() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config.clone(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}
