use bit_set::BitSet;

use super::event::{Cluster, ClusterHit, DetectorType};
use super::hook::EventAssembly;

/// Logarithmic energy weight for the centroid position. The cutoff constant
/// matches the usual choice for electromagnetic calorimeters.
const WEIGHT_CUTOFF: f64 = 4.25;

fn energy_weight(energy: f64, total: f64) -> f64 {
    (WEIGHT_CUTOFF + (energy / total).ln()).max(0.0)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// The built-in clustering stage: ClusterHits in, Clusters out.
///
/// Hits are grouped per detector by spatial adjacency (member within the
/// neighbour radius) inside a timing window around the cluster's central
/// time. Seeds are the local energy maxima of each detector's hit set; every
/// other sane hit is attached to a seeded cluster, ambiguous hits to the
/// cluster with the nearer central time. On an exact time tie the cluster
/// with the lower central element index wins, which keeps assignment
/// deterministic and reproducible.
///
/// Hits without finite energy and time are skipped; a hit ends up in at most
/// one cluster per detector.
#[derive(Debug)]
pub struct ClusteringHook {
    time_window: f64,
    neighbour_radius: f64,
}

impl ClusteringHook {
    pub fn new(time_window: f64, neighbour_radius: f64) -> Self {
        Self {
            time_window,
            neighbour_radius,
        }
    }

    pub fn apply(&self, assembly: &mut EventAssembly) {
        let detectors = [
            DetectorType::Cb,
            DetectorType::Pid,
            DetectorType::Taps,
            DetectorType::TapsVeto,
        ];
        for detector in detectors {
            let hits: Vec<&ClusterHit> = assembly
                .cluster_hits
                .iter()
                .filter(|h| h.detector == detector && h.is_sane())
                .collect();
            if !hits.is_empty() {
                self.cluster_detector(&hits, &mut assembly.clusters);
            }
        }
    }

    /// Cluster the sane hits of one detector.
    fn cluster_detector(&self, hits: &[&ClusterHit], clusters: &mut Vec<Cluster>) {
        // seeds: hits at least as energetic as every spatial neighbour;
        // equal energies resolve to the lower element index
        let mut seeds: Vec<usize> = Vec::new();
        for (i, hit) in hits.iter().enumerate() {
            let is_max = hits.iter().enumerate().all(|(j, other)| {
                if i == j || distance(&hit.position, &other.position) > self.neighbour_radius {
                    return true;
                }
                match other.energy.partial_cmp(&hit.energy) {
                    Some(std::cmp::Ordering::Greater) => false,
                    Some(std::cmp::Ordering::Equal) => hit.element <= other.element,
                    _ => true,
                }
            });
            if is_max {
                seeds.push(i);
            }
        }

        // one member set per seeded cluster, seeded with the maximum itself
        let mut members: Vec<Vec<usize>> = seeds.iter().map(|s| vec![*s]).collect();
        let mut assigned = BitSet::with_capacity(hits.len());
        for s in &seeds {
            assigned.insert(*s);
        }

        // grow until every reachable hit is attached; each pass only attaches
        // hits adjacent to an existing member so clusters grow outward from
        // their seeds
        loop {
            let mut attached_any = false;
            for i in 0..hits.len() {
                if assigned.contains(i) {
                    continue;
                }
                let hit = hits[i];
                // candidate clusters: those with a member in reach whose
                // central time is inside the window
                let mut best: Option<usize> = None;
                for (c, member_list) in members.iter().enumerate() {
                    let seed = hits[seeds[c]];
                    let in_reach = member_list
                        .iter()
                        .any(|m| distance(&hit.position, &hits[*m].position) <= self.neighbour_radius);
                    if !in_reach || (hit.time - seed.time).abs() > self.time_window {
                        continue;
                    }
                    best = Some(match best {
                        None => c,
                        Some(prev) => self.closer_cluster(hit, prev, c, &seeds, hits),
                    });
                }
                if let Some(c) = best {
                    members[c].push(i);
                    assigned.insert(i);
                    attached_any = true;
                }
            }
            if !attached_any {
                break;
            }
        }

        for (c, member_list) in members.iter().enumerate() {
            clusters.push(self.build_cluster(hits, seeds[c], member_list));
        }
    }

    /// Tie-break between two candidate clusters for one ambiguous hit:
    /// nearer central time wins, an exact tie goes to the cluster whose
    /// central element index is lower.
    fn closer_cluster(
        &self,
        hit: &ClusterHit,
        a: usize,
        b: usize,
        seeds: &[usize],
        hits: &[&ClusterHit],
    ) -> usize {
        let seed_a = hits[seeds[a]];
        let seed_b = hits[seeds[b]];
        let da = (hit.time - seed_a.time).abs();
        let db = (hit.time - seed_b.time).abs();
        if da < db {
            a
        } else if db < da {
            b
        } else if seed_a.element <= seed_b.element {
            a
        } else {
            b
        }
    }

    fn build_cluster(&self, hits: &[&ClusterHit], seed: usize, member_list: &[usize]) -> Cluster {
        let seed_hit = hits[seed];
        let energy: f64 = member_list.iter().map(|m| hits[*m].energy).sum();

        let mut position = [0.0; 3];
        let mut weighted_sum = 0.0;
        for m in member_list {
            let hit = hits[*m];
            let w = energy_weight(hit.energy, energy);
            for (p, x) in position.iter_mut().zip(hit.position.iter()) {
                *p += x * w;
            }
            weighted_sum += w;
        }
        if weighted_sum > 0.0 {
            for p in &mut position {
                *p /= weighted_sum;
            }
        } else {
            position = seed_hit.position;
        }

        let mut member_hits: Vec<ClusterHit> =
            member_list.iter().map(|m| hits[*m].clone()).collect();
        member_hits.sort_by_key(|h| h.element);

        Cluster {
            detector: seed_hit.detector,
            energy,
            time: seed_hit.time,
            position,
            central_element: seed_hit.element,
            hits: member_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DaqError, SlowControl};
    use crate::message::UnpackerMessage;
    use crate::tid::Tid;

    fn hit(element: u32, position: [f64; 3], energy: f64, time: f64) -> ClusterHit {
        ClusterHit {
            detector: DetectorType::Cb,
            element,
            channel: element as u16,
            position,
            energy,
            time,
            low_confidence: false,
        }
    }

    fn assembly_with(hits: Vec<ClusterHit>) -> EventAssembly {
        EventAssembly {
            tid: Tid::new(1, 0),
            read_hits: Vec::new(),
            cluster_hits: hits,
            clusters: Vec::new(),
            candidates: Vec::new(),
            slow_controls: Vec::<SlowControl>::new(),
            daq_errors: Vec::<DaqError>::new(),
            diagnostics: Vec::<UnpackerMessage>::new(),
        }
    }

    #[test]
    fn test_isolated_hits_form_singleton_clusters() {
        let mut assembly = assembly_with(vec![
            hit(0, [0.0, 0.0, 0.0], 50.0, 10.0),
            hit(10, [100.0, 0.0, 0.0], 60.0, 12.0),
        ]);
        ClusteringHook::new(5.0, 6.0).apply(&mut assembly);
        assert_eq!(assembly.clusters.len(), 2);
        assert!(assembly.clusters.iter().all(|c| c.hits.len() == 1));
    }

    #[test]
    fn test_adjacent_hits_merge_into_one_cluster() {
        let mut assembly = assembly_with(vec![
            hit(0, [0.0, 0.0, 0.0], 100.0, 10.0),
            hit(1, [4.0, 0.0, 0.0], 20.0, 10.5),
            hit(2, [8.0, 0.0, 0.0], 5.0, 10.2),
        ]);
        ClusteringHook::new(5.0, 6.0).apply(&mut assembly);
        assert_eq!(assembly.clusters.len(), 1);
        let cluster = &assembly.clusters[0];
        assert_eq!(cluster.central_element, 0);
        assert_eq!(cluster.energy, 125.0);
        assert_eq!(cluster.time, 10.0);
        assert_eq!(cluster.hits.len(), 3);
    }

    #[test]
    fn test_insane_hits_are_skipped() {
        let mut assembly = assembly_with(vec![
            hit(0, [0.0, 0.0, 0.0], 100.0, 10.0),
            hit(1, [4.0, 0.0, 0.0], 20.0, f64::NAN),
            hit(2, [4.0, 3.0, 0.0], -3.0, 10.0),
        ]);
        ClusteringHook::new(5.0, 6.0).apply(&mut assembly);
        assert_eq!(assembly.clusters.len(), 1);
        assert_eq!(assembly.clusters[0].hits.len(), 1);
    }

    #[test]
    fn test_ambiguous_hits_join_nearer_centroid_time() {
        // two seeds with central times 10.1 and 11.5, both spatially adjacent
        // to the two ambiguous hits at 10.0 and 10.3
        let mut assembly = assembly_with(vec![
            hit(0, [0.0, 0.0, 0.0], 100.0, 10.1),
            hit(3, [12.0, 0.0, 0.0], 100.0, 11.5),
            hit(1, [4.0, 0.0, 0.0], 10.0, 10.0),
            hit(2, [8.0, 0.0, 0.0], 10.0, 10.3),
        ]);
        // radius reaches the neighbour either side, not the far seed
        ClusteringHook::new(5.0, 6.0).apply(&mut assembly);
        assert_eq!(assembly.clusters.len(), 2);
        let near = assembly
            .clusters
            .iter()
            .find(|c| c.central_element == 0)
            .unwrap();
        let far = assembly
            .clusters
            .iter()
            .find(|c| c.central_element == 3)
            .unwrap();
        // |10.0 - 10.1| < |10.0 - 11.5| and |10.3 - 10.1| < |10.3 - 11.5|
        assert_eq!(near.hits.len(), 3);
        assert_eq!(far.hits.len(), 1);
    }

    #[test]
    fn test_exact_tie_goes_to_lower_central_element() {
        let mut assembly = assembly_with(vec![
            hit(5, [0.0, 0.0, 0.0], 100.0, 10.0),
            hit(2, [8.0, 0.0, 0.0], 100.0, 10.0),
            // equidistant in time to both seeds, adjacent to both
            hit(7, [4.0, 0.0, 0.0], 10.0, 10.0),
        ]);
        ClusteringHook::new(5.0, 6.0).apply(&mut assembly);
        assert_eq!(assembly.clusters.len(), 2);
        let winner = assembly
            .clusters
            .iter()
            .find(|c| c.central_element == 2)
            .unwrap();
        assert_eq!(winner.hits.len(), 2);
    }

    #[test]
    fn test_hit_belongs_to_at_most_one_cluster() {
        let mut assembly = assembly_with(vec![
            hit(0, [0.0, 0.0, 0.0], 100.0, 10.0),
            hit(1, [4.0, 0.0, 0.0], 50.0, 10.0),
            hit(2, [8.0, 0.0, 0.0], 100.0, 10.0),
        ]);
        ClusteringHook::new(5.0, 6.0).apply(&mut assembly);
        let total_members: usize = assembly.clusters.iter().map(|c| c.hits.len()).sum();
        assert_eq!(total_members, 3);
    }
}
