/// What a worker is currently doing with its run. The UI maps phases to
/// progress-bar styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerPhase {
    #[default]
    Unpacking,
    Finished,
    Failed,
}

/// Progress message sent from a processing worker to the driving UI thread.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub run_number: i32,
    pub worker_id: usize,
    pub phase: WorkerPhase,
}

impl WorkerStatus {
    pub fn new(progress: f32, run_number: i32, worker_id: usize, phase: WorkerPhase) -> Self {
        Self {
            progress,
            run_number,
            worker_id,
            phase,
        }
    }
}
