use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::calibration::{CalibrationFile, CalibrationProvider};
use super::channel_map::ChannelMap;
use super::config::Config;
use super::error::ProcessorError;
use super::hook::HookChainBuilder;
use super::message::MessageLevel;
use super::reconstruct::Reconstruct;
use super::sink::{EventSink, SummarySink};
use super::unpacker::Unpacker;
use super::worker_status::{WorkerPhase, WorkerStatus};

/// The main loop of a2rec.
///
/// Opens the raw file of one run, builds the hook chain and drives the
/// unpack/reconstruct pipeline to completion, reporting progress through the
/// status channel. The calibration provider is shared read-only across all
/// workers.
pub fn process_run(
    config: &Config,
    calibration: Arc<dyn CalibrationProvider>,
    run_number: i32,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let raw_file = config.get_raw_file_name(run_number);
    let channel_map = ChannelMap::new(config.channel_map_path.as_deref())?;
    let mut unpacker = Unpacker::open(&raw_file)?;
    spdlog::info!(
        "Opened {} as {} stream (run number {})",
        raw_file.to_string_lossy(),
        unpacker.variant_name(),
        unpacker.run_number()
    );
    if let Some(total) = unpacker.total_size() {
        spdlog::info!(
            "Total run size: {}",
            human_bytes::human_bytes(total as f64)
        );
    }

    let chain = HookChainBuilder::new(config.reconstruction.clone())
        .with_pedestal_averaging()
        .build();
    let mut reconstruct = Reconstruct::new(chain, channel_map, calibration);
    let mut sink = SummarySink::new();

    tx.send(WorkerStatus::new(
        0.0,
        run_number,
        *worker_id,
        WorkerPhase::Unpacking,
    ))?;

    // report in ~1% steps of the consumed bytes
    let total_size = unpacker.total_size().unwrap_or(0);
    let flush_frac: f32 = 0.01;
    let flush_val = (total_size as f64 * flush_frac as f64) as u64;
    let mut last_flush: u64 = 0;

    let mut event_count: u64 = 0;
    while let Some(block) = unpacker.next_event()? {
        let event = reconstruct.process_block(block);
        for message in &event.diagnostics {
            if message.level >= MessageLevel::DataError {
                spdlog::warn!("{}", message);
            }
        }
        sink.push(event)
            .map_err(crate::error::ReconstructError::SinkError)?;
        event_count += 1;

        let consumed = unpacker.bytes_read();
        if flush_val > 0 && consumed - last_flush > flush_val {
            last_flush = consumed;
            let progress = consumed as f32 / total_size as f32;
            tx.send(WorkerStatus::new(
                progress.min(1.0),
                run_number,
                *worker_id,
                WorkerPhase::Unpacking,
            ))?;
        }
    }
    for message in unpacker.drain_messages() {
        if message.level >= MessageLevel::DataError {
            spdlog::warn!("{}", message);
        }
    }

    tx.send(WorkerStatus::new(
        1.0,
        run_number,
        *worker_id,
        WorkerPhase::Finished,
    ))?;
    spdlog::info!("Done with run {run_number} ({event_count} events).");
    sink.log_summary();
    Ok(())
}

/// The function to be called by a separate thread (typically the UI).
/// Processes the full run range of the config sequentially.
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let calibration: Arc<dyn CalibrationProvider> =
        Arc::new(CalibrationFile::load(&config.calibration_path)?);
    for run in config.first_run_number..(config.last_run_number + 1) {
        if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            process_run(&config, calibration.clone(), run, &tx, &worker_id)?;
            spdlog::info!("Finished processing run {}.", run);
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Process a subset of runs
pub fn process_subset(
    config: Config,
    calibration: Arc<dyn CalibrationProvider>,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(), ProcessorError> {
    for run in subset {
        if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            process_run(&config, calibration.clone(), run, &tx, &worker_id)?;
            spdlog::info!("Finished processing run {}.", run);
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(())
}

/// Divide a run range in to a set of subranges (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); config.n_threads as usize];
    let n_subsets = subsets.len();

    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        subsets[idx % n_subsets].push(run)
    }

    subsets
}
