use super::event::{Candidate, Cluster, DetectorMask, DetectorType};
use super::hook::EventAssembly;

/// Wrap an angle difference into (-pi, pi], so matching works across the
/// 180/-180 degree seam.
fn phi_mpi_pi(mut dphi: f64) -> f64 {
    while dphi > std::f64::consts::PI {
        dphi -= 2.0 * std::f64::consts::PI;
    }
    while dphi <= -std::f64::consts::PI {
        dphi += 2.0 * std::f64::consts::PI;
    }
    dphi
}

/// The built-in candidate building stage: Clusters in, Candidates out.
///
/// Calorimeter clusters are matched against clusters of their veto partner
/// (CB with PID, TAPS with its veto wall) by azimuthal proximity: a veto
/// cluster within `phi_epsilon` of a calorimeter cluster marks that
/// deposition as charged and contributes its energy as the candidate's veto
/// energy. A calorimeter cluster unmatched across detectors still yields a
/// single-detector candidate; veto clusters matching nothing stay behind as
/// unmatched clusters on the event.
#[derive(Debug)]
pub struct CandidateBuilderHook {
    phi_epsilon: f64,
}

impl CandidateBuilderHook {
    pub fn new(phi_epsilon: f64) -> Self {
        Self { phi_epsilon }
    }

    pub fn apply(&self, assembly: &mut EventAssembly) {
        let clusters = std::mem::take(&mut assembly.clusters);
        let (calorimeter, veto): (Vec<Cluster>, Vec<Cluster>) = clusters
            .into_iter()
            .partition(|c| c.detector.is_calorimeter());

        let mut veto_used = vec![false; veto.len()];
        for cluster in calorimeter {
            let partner = cluster.detector.veto_partner();
            let matched = partner.and_then(|p| self.match_veto(&cluster, p, &veto, &veto_used));
            let mut detectors = DetectorMask::default().with(cluster.detector);
            let veto_energy = matched.map(|v| {
                veto_used[v] = true;
                detectors = detectors.with(veto[v].detector);
                veto[v].energy
            });
            assembly.candidates.push(Candidate {
                detectors,
                energy: cluster.energy,
                theta: cluster.theta(),
                phi: cluster.phi(),
                time: cluster.time,
                cluster_size: cluster.hits.len(),
                veto_energy,
            });
        }

        // veto-only depositions are kept, just not promoted
        assembly.clusters = veto
            .into_iter()
            .zip(veto_used)
            .filter_map(|(c, used)| (!used).then_some(c))
            .collect();
    }

    /// Nearest unconsumed veto cluster of the partner detector inside the phi
    /// window; equal distances resolve to the lower central element.
    fn match_veto(
        &self,
        cluster: &Cluster,
        partner: DetectorType,
        veto: &[Cluster],
        used: &[bool],
    ) -> Option<usize> {
        let phi = cluster.phi();
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in veto.iter().enumerate() {
            if used[i] || v.detector != partner {
                continue;
            }
            let dphi = phi_mpi_pi(v.phi() - phi).abs();
            if dphi > self.phi_epsilon {
                continue;
            }
            best = match best {
                None => Some((i, dphi)),
                Some((bi, bd)) => {
                    if dphi < bd
                        || (dphi == bd && v.central_element < veto[bi].central_element)
                    {
                        Some((i, dphi))
                    } else {
                        Some((bi, bd))
                    }
                }
            };
        }
        best.map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ClusterHit;
    use crate::tid::Tid;

    fn cluster(detector: DetectorType, element: u32, position: [f64; 3], energy: f64) -> Cluster {
        let hit = ClusterHit {
            detector,
            element,
            channel: element as u16,
            position,
            energy,
            time: 10.0,
            low_confidence: false,
        };
        Cluster {
            detector,
            energy,
            time: 10.0,
            position,
            central_element: element,
            hits: vec![hit],
        }
    }

    fn assembly_with(clusters: Vec<Cluster>) -> EventAssembly {
        EventAssembly {
            tid: Tid::new(1, 0),
            read_hits: Vec::new(),
            cluster_hits: Vec::new(),
            clusters,
            candidates: Vec::new(),
            slow_controls: Vec::new(),
            daq_errors: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_charged_candidate_from_cb_pid_match() {
        let mut assembly = assembly_with(vec![
            cluster(DetectorType::Cb, 4, [30.0, 0.5, 0.0], 120.0),
            cluster(DetectorType::Pid, 1, [10.0, 0.2, 0.0], 2.5),
        ]);
        CandidateBuilderHook::new(0.2).apply(&mut assembly);
        assert_eq!(assembly.candidates.len(), 1);
        let candidate = &assembly.candidates[0];
        assert!(candidate.detectors.has(DetectorType::Cb));
        assert!(candidate.detectors.has(DetectorType::Pid));
        assert_eq!(candidate.veto_energy, Some(2.5));
        assert!(assembly.clusters.is_empty());
    }

    #[test]
    fn test_unmatched_calorimeter_cluster_still_promotes() {
        let mut assembly = assembly_with(vec![cluster(
            DetectorType::Taps,
            7,
            [3.0, 3.0, 150.0],
            80.0,
        )]);
        CandidateBuilderHook::new(0.2).apply(&mut assembly);
        assert_eq!(assembly.candidates.len(), 1);
        let candidate = &assembly.candidates[0];
        assert!(candidate.detectors.has(DetectorType::Taps));
        assert_eq!(candidate.veto_energy, None);
    }

    #[test]
    fn test_wrong_partner_is_not_matched() {
        // a PID cluster cannot veto a TAPS cluster
        let mut assembly = assembly_with(vec![
            cluster(DetectorType::Taps, 7, [6.0, 0.0, 150.0], 80.0),
            cluster(DetectorType::Pid, 1, [10.0, 0.0, 0.0], 2.5),
        ]);
        CandidateBuilderHook::new(0.5).apply(&mut assembly);
        assert_eq!(assembly.candidates.len(), 1);
        assert_eq!(assembly.candidates[0].veto_energy, None);
        // the PID cluster survives as an unmatched cluster
        assert_eq!(assembly.clusters.len(), 1);
        assert_eq!(assembly.clusters[0].detector, DetectorType::Pid);
    }

    #[test]
    fn test_phi_wraparound_match() {
        // clusters either side of the 180 degree seam
        let near_pi = cluster(DetectorType::Cb, 2, [-30.0, 0.3, 0.0], 90.0);
        let near_minus_pi = cluster(DetectorType::Pid, 6, [-10.0, -0.1, 0.0], 1.5);
        let mut assembly = assembly_with(vec![near_pi, near_minus_pi]);
        CandidateBuilderHook::new(0.1).apply(&mut assembly);
        assert_eq!(assembly.candidates.len(), 1);
        assert_eq!(assembly.candidates[0].veto_energy, Some(1.5));
    }

    #[test]
    fn test_each_veto_consumed_once() {
        let mut assembly = assembly_with(vec![
            cluster(DetectorType::Cb, 1, [30.0, 0.0, 0.0], 100.0),
            cluster(DetectorType::Cb, 2, [30.0, 1.0, 0.0], 50.0),
            cluster(DetectorType::Pid, 0, [10.0, 0.1, 0.0], 2.0),
        ]);
        CandidateBuilderHook::new(0.2).apply(&mut assembly);
        assert_eq!(assembly.candidates.len(), 2);
        let with_veto = assembly
            .candidates
            .iter()
            .filter(|c| c.veto_energy.is_some())
            .count();
        assert_eq!(with_veto, 1);
    }
}
