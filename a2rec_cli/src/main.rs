use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

use liba2rec::calibration::{CalibrationFile, CalibrationProvider};
use liba2rec::config::Config;
use liba2rec::process::{create_subsets, process_subset};
use liba2rec::worker_status::{WorkerPhase, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn bar_style(phase: WorkerPhase) -> ProgressStyle {
    let color = match phase {
        WorkerPhase::Unpacking => "cyan",
        WorkerPhase::Finished => "green",
        WorkerPhase::Failed => "red",
    };
    ProgressStyle::with_template(&format!(
        "{{prefix}} {{bar:40.{color}}} {{percent}}%"
    ))
    .expect("Could not create progress bar style!")
}

fn main() {
    // Create a cli
    let matches = Command::new("a2rec_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );

        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Raw Path: {}", config.raw_path.to_string_lossy());
    log::info!(
        "Calibration Path: {}",
        config.calibration_path.to_string_lossy()
    );
    log::info!(
        "Channel Map Path: {}",
        config
            .channel_map_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("default"))
    );
    log::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );

    if !config.is_n_threads_valid() {
        log::error!("Number of threads must be at least 1!");
        return;
    }

    // The calibration provider is fatal at startup if unavailable, and is
    // shared read-only by every worker
    let calibration: Arc<dyn CalibrationProvider> =
        match CalibrationFile::load(&config.calibration_path) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                log::error!("Could not load calibration: {e}");
                return;
            }
        };

    let (tx, rx) = channel::<WorkerStatus>();
    let subsets = create_subsets(&config);
    let mut handles = Vec::new();
    let mut bars: HashMap<usize, ProgressBar> = HashMap::new();
    for (worker_id, subset) in subsets.into_iter().enumerate() {
        if subset.is_empty() {
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(WorkerPhase::Unpacking));
        bar.set_prefix(format!("worker {worker_id}"));
        bars.insert(worker_id, bar);

        let worker_config = config.clone();
        let worker_tx = tx.clone();
        let worker_calibration = calibration.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(worker_config, worker_calibration, worker_tx, worker_id, subset)
        }));
    }
    drop(tx);

    // Update the bars until every worker hangs up its sender
    while let Ok(status) = rx.recv() {
        if let Some(bar) = bars.get(&status.worker_id) {
            bar.set_style(bar_style(status.phase));
            bar.set_prefix(format!("worker {} run {}", status.worker_id, status.run_number));
            bar.set_position((status.progress * 100.0) as u64);
        }
    }

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => (),
            Ok(Err(e)) => log::error!("Processing failed with error: {e}"),
            Err(_) => log::error!("Failed to join processing thread!"),
        }
    }
    for bar in bars.values() {
        bar.finish();
    }

    log::info!("Done.");
}
