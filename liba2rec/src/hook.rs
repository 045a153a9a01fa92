use super::calibrate::{CalibrationHook, PedestalAverageHook};
use super::calibration::CalibrationProvider;
use super::candidate_builder::CandidateBuilderHook;
use super::channel_map::ChannelMap;
use super::clustering::ClusteringHook;
use super::config::ReconstructionParams;
use super::event::{
    Candidate, Cluster, ClusterHit, DaqError, DetectorReadHit, DetectorType, EventData,
    RawEventBlock, SlowControl,
};
use super::message::{DiagnosticCode, MessageLevel, UnpackerMessage};
use super::tid::Tid;

/// The working representation of one event while it walks the hook chain.
///
/// Each stage fills the next collection: read hits are calibrated into
/// cluster hits, cluster hits grouped into clusters, clusters promoted to
/// candidates. Hooks append diagnostics here; nothing in an assembly outlives
/// its Tid.
#[derive(Debug, Clone)]
pub struct EventAssembly {
    pub tid: Tid,
    pub read_hits: Vec<DetectorReadHit>,
    pub cluster_hits: Vec<ClusterHit>,
    pub clusters: Vec<Cluster>,
    pub candidates: Vec<Candidate>,
    pub slow_controls: Vec<SlowControl>,
    pub daq_errors: Vec<DaqError>,
    pub diagnostics: Vec<UnpackerMessage>,
}

impl EventAssembly {
    /// Apply the channel-to-detector-element mapping to a raw block.
    ///
    /// Every raw hit yields exactly one read hit; channels absent from the
    /// map come out as `DetectorType::Unknown` with a diagnostic and are
    /// suppressed from calibration later, never silently dropped.
    pub fn from_block(block: RawEventBlock, map: &ChannelMap) -> Self {
        let tid = block.tid.unwrap_or(Tid::new(0, 0));
        let mut assembly = Self {
            tid,
            read_hits: Vec::with_capacity(block.hits.len()),
            cluster_hits: Vec::new(),
            clusters: Vec::new(),
            candidates: Vec::new(),
            slow_controls: block.slow_controls,
            daq_errors: block.daq_errors,
            diagnostics: block.messages,
        };
        for hit in block.hits {
            match map.get(hit.channel) {
                Some(id) => assembly.read_hits.push(DetectorReadHit {
                    channel: hit.channel,
                    detector: id.detector,
                    element: id.element,
                    position: id.position,
                    values: hit.values,
                }),
                None => {
                    assembly.diagnostics.push(UnpackerMessage::for_tid(
                        tid,
                        MessageLevel::Warn,
                        DiagnosticCode::UnmappedChannel,
                        format!("Raw channel {} has no channel map entry", hit.channel),
                    ));
                    assembly.read_hits.push(DetectorReadHit {
                        channel: hit.channel,
                        detector: DetectorType::Unknown,
                        element: hit.channel as u32,
                        position: [0.0; 3],
                        values: hit.values,
                    });
                }
            }
        }
        assembly
    }

    /// Seal the assembly into the immutable per-Tid event record.
    pub fn finalize(self) -> EventData {
        EventData {
            tid: self.tid,
            candidates: self.candidates,
            unmatched_clusters: self.clusters,
            slow_controls: self.slow_controls,
            daq_errors: self.daq_errors,
            diagnostics: self.diagnostics,
        }
    }
}

/// A hook consuming the detector read hits of one event.
///
/// Hooks are pure per-Tid transformations. A hook that intentionally carries
/// running state across events (pedestal averaging and friends) must document
/// its warm-up behavior and mark affected outputs low-confidence.
pub trait ReadHitsHook: Send {
    fn name(&self) -> &'static str;
    fn process(&mut self, assembly: &mut EventAssembly, calibration: &dyn CalibrationProvider);
}

/// A hook consuming calibrated cluster hits.
pub trait ClusterHitsHook: Send {
    fn name(&self) -> &'static str;
    fn process(&mut self, assembly: &mut EventAssembly, calibration: &dyn CalibrationProvider);
}

/// A hook consuming built clusters.
pub trait ClustersHook: Send {
    fn name(&self) -> &'static str;
    fn process(&mut self, assembly: &mut EventAssembly, calibration: &dyn CalibrationProvider);
}

/// A hook consuming the nearly-final event (candidates built).
pub trait EventHook: Send {
    fn name(&self) -> &'static str;
    fn process(&mut self, assembly: &mut EventAssembly, calibration: &dyn CalibrationProvider);
}

/// The ordered set of processing stages applied to every event.
///
/// User hooks run per stage in registration order; the built-in stage
/// transitions (calibration, clustering, candidate building) run in fixed
/// order between them. The chain is configured once and invoked per event.
pub struct HookChain {
    read_hits_hooks: Vec<Box<dyn ReadHitsHook>>,
    calibrate: CalibrationHook,
    cluster_hits_hooks: Vec<Box<dyn ClusterHitsHook>>,
    clustering: ClusteringHook,
    clusters_hooks: Vec<Box<dyn ClustersHook>>,
    candidate_builder: CandidateBuilderHook,
    event_hooks: Vec<Box<dyn EventHook>>,
}

impl HookChain {
    pub fn run(&mut self, assembly: &mut EventAssembly, calibration: &dyn CalibrationProvider) {
        for hook in &mut self.read_hits_hooks {
            hook.process(assembly, calibration);
        }
        self.calibrate.apply(assembly, calibration);
        for hook in &mut self.cluster_hits_hooks {
            hook.process(assembly, calibration);
        }
        self.clustering.apply(assembly);
        for hook in &mut self.clusters_hooks {
            hook.process(assembly, calibration);
        }
        self.candidate_builder.apply(assembly);
        for hook in &mut self.event_hooks {
            hook.process(assembly, calibration);
        }
    }
}

/// Builds a [`HookChain`]: user hooks are appended per stage, the built-ins
/// are inserted in their required order at `build`.
pub struct HookChainBuilder {
    params: ReconstructionParams,
    read_hits_hooks: Vec<Box<dyn ReadHitsHook>>,
    cluster_hits_hooks: Vec<Box<dyn ClusterHitsHook>>,
    clusters_hooks: Vec<Box<dyn ClustersHook>>,
    event_hooks: Vec<Box<dyn EventHook>>,
}

impl HookChainBuilder {
    pub fn new(params: ReconstructionParams) -> Self {
        Self {
            params,
            read_hits_hooks: Vec::new(),
            cluster_hits_hooks: Vec::new(),
            clusters_hooks: Vec::new(),
            event_hooks: Vec::new(),
        }
    }

    /// Enable running pedestal averaging ahead of calibration. Outputs during
    /// the warm-up window are marked low-confidence.
    pub fn with_pedestal_averaging(mut self) -> Self {
        if self.params.pedestal_warmup_events > 0 {
            self.read_hits_hooks.push(Box::new(PedestalAverageHook::new(
                self.params.pedestal_warmup_events,
            )));
        }
        self
    }

    pub fn add_read_hits_hook(mut self, hook: Box<dyn ReadHitsHook>) -> Self {
        self.read_hits_hooks.push(hook);
        self
    }

    pub fn add_cluster_hits_hook(mut self, hook: Box<dyn ClusterHitsHook>) -> Self {
        self.cluster_hits_hooks.push(hook);
        self
    }

    pub fn add_clusters_hook(mut self, hook: Box<dyn ClustersHook>) -> Self {
        self.clusters_hooks.push(hook);
        self
    }

    pub fn add_event_hook(mut self, hook: Box<dyn EventHook>) -> Self {
        self.event_hooks.push(hook);
        self
    }

    pub fn build(self) -> HookChain {
        HookChain {
            read_hits_hooks: self.read_hits_hooks,
            calibrate: CalibrationHook::new(),
            cluster_hits_hooks: self.cluster_hits_hooks,
            clustering: ClusteringHook::new(
                self.params.cluster_time_window,
                self.params.neighbour_radius,
            ),
            clusters_hooks: self.clusters_hooks,
            candidate_builder: CandidateBuilderHook::new(self.params.phi_epsilon),
            event_hooks: self.event_hooks,
        }
    }
}
