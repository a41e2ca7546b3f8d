//! Online multi-object tracker
//!
//! SORT-style tracking: each confirmed object carries a constant-velocity
//! Kalman state that is predicted forward every cycle, then corrected by
//! the detection it is matched to via optimal IoU assignment. Predicting
//! before associating lets tracks bridge brief detector misses; the
//! minimum-hits gate keeps one-off false positives from minting spurious
//! identities, and the maximum-age gate bounds memory.

pub mod assignment;
pub mod kalman;

use assignment::min_cost_assignment;
use kalman::KalmanBox;
use serde::{Deserialize, Serialize};

/// Tracker thresholds.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Cycles a track survives without a match before removal.
    pub max_age: u32,
    /// Matches required to promote Tentative → Confirmed.
    pub min_hits: u32,
    /// Minimum IoU for an assignment pair to be accepted.
    pub iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_age: 5,
            min_hits: 2,
            iou_threshold: 0.3,
        }
    }
}

/// Track confidence stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// Not yet enough consecutive matches to be trusted as real.
    Tentative,
    Confirmed,
}

/// One persistent hypothesis about a physical object's position.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub status: TrackStatus,
    pub label: String,
    pub score: f32,
    /// Cycles since creation.
    pub age: u32,
    /// Cycles matched to a detection.
    pub hits: u32,
    /// Cycles since the last successful match; 0 exactly when matched
    /// this cycle.
    pub time_since_update: u32,
    kalman: KalmanBox,
}

impl Track {
    fn new(id: u64, det: &crate::detection::Detection) -> Self {
        Self {
            id,
            status: TrackStatus::Tentative,
            label: det.label.clone(),
            score: det.score,
            age: 1,
            hits: 1,
            time_since_update: 0,
            kalman: KalmanBox::new(det.bbox),
        }
    }

    pub fn bbox(&self) -> [f32; 4] {
        self.kalman.bbox()
    }
}

/// Read-only tracker output: id plus current box. Tracks themselves are
/// owned exclusively by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackOutput {
    pub id: u64,
    pub label: String,
    pub bbox: [f32; 4],
}

/// Multi-object tracker with stable identities across cycles.
pub struct SortTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    /// Never reused for a different physical object.
    next_id: u64,
    cycles: u64,
}

/// Deterministic tie-break: with equal IoU, a more established track
/// (larger `hits`) wins the match. The bias is capped far below the IoU
/// resolution so it can never flip a genuinely better overlap.
fn hits_bias(hits: u32) -> f32 {
    hits.min(100) as f32 * 1e-7
}

impl SortTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
            cycles: 0,
        }
    }

    /// Consume one cycle's detections and return the display-eligible
    /// track set.
    pub fn update(&mut self, detections: &[crate::detection::Detection]) -> Vec<TrackOutput> {
        self.cycles += 1;

        // 1. Predict every track forward under its motion model.
        for track in &mut self.tracks {
            track.kalman.predict();
        }

        // 2. Associate predicted boxes to detections: optimal min-cost
        //    matching on (1 - IoU), then gate by the acceptance threshold.
        let n_tracks = self.tracks.len();
        let n_dets = detections.len();
        let mut matched_track = vec![false; n_tracks];
        let mut matched_det = vec![false; n_dets];

        if n_tracks > 0 && n_dets > 0 {
            let mut overlap = vec![vec![0.0_f32; n_dets]; n_tracks];
            let mut cost = vec![vec![0.0_f32; n_dets]; n_tracks];
            for (ti, track) in self.tracks.iter().enumerate() {
                for (di, det) in detections.iter().enumerate() {
                    let score = iou(track.bbox(), det.bbox);
                    overlap[ti][di] = score;
                    cost[ti][di] = 1.0 - score - hits_bias(track.hits);
                }
            }

            for (ti, di) in min_cost_assignment(&cost) {
                if overlap[ti][di] < self.config.iou_threshold {
                    continue; // below acceptance: treated as unmatched
                }
                matched_track[ti] = true;
                matched_det[di] = true;

                // 3. Correct the matched track toward its detection.
                let track = &mut self.tracks[ti];
                track.kalman.update(detections[di].bbox);
                track.label = detections[di].label.clone();
                track.score = detections[di].score;
                track.age += 1;
                track.hits += 1;
                track.time_since_update = 0;
                if track.status == TrackStatus::Tentative && track.hits >= self.config.min_hits {
                    track.status = TrackStatus::Confirmed;
                    tracing::debug!("Track {} confirmed after {} hits", track.id, track.hits);
                }
            }
        }

        // 4. Age unmatched tracks.
        for (ti, matched) in matched_track.iter().enumerate() {
            if !matched {
                let track = &mut self.tracks[ti];
                track.age += 1;
                track.time_since_update += 1;
            }
        }

        // 5. Spawn a tentative track for every unmatched detection.
        for (di, det) in detections.iter().enumerate() {
            if !matched_det[di] {
                let track = Track::new(self.next_id, det);
                tracing::debug!("New track {} for '{}'", track.id, track.label);
                self.next_id += 1;
                self.tracks.push(track);
            }
        }

        // Prune tracks that missed too many cycles.
        let max_age = self.config.max_age;
        self.tracks.retain(|t| {
            if t.time_since_update > max_age {
                tracing::debug!("Track {} pruned after {} missed cycles", t.id, t.time_since_update);
                false
            } else {
                true
            }
        });

        // 6. Emit only tracks matched this cycle that have satisfied the
        //    confirmation policy (or fall inside the startup grace period
        //    before enough cycles have run to accumulate min_hits).
        let grace = self.cycles <= self.config.min_hits as u64;
        self.tracks
            .iter()
            .filter(|t| {
                t.time_since_update == 0 && (t.status == TrackStatus::Confirmed || grace)
            })
            .map(|t| TrackOutput {
                id: t.id,
                label: t.label.clone(),
                bbox: t.bbox(),
            })
            .collect()
    }

    /// All live tracks, confirmed or not.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Drop every track. Identities are still never reused.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}

impl Default for SortTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

/// Intersection-over-union of two (x1, y1, x2, y2) boxes.
pub fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new("person", 0.8, [x1, y1, x2, y2])
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        let score = iou([0.0, 0.0, 100.0, 100.0], [50.0, 50.0, 150.0, 150.0]);
        assert!((score - 2500.0 / 17500.0).abs() < 0.01);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou([0.0, 0.0, 50.0, 50.0], [100.0, 100.0, 200.0, 200.0]), 0.0);
    }

    #[test]
    fn smooth_motion_keeps_one_stable_identity() {
        let mut tracker = SortTracker::default();
        let mut seen_ids = std::collections::HashSet::new();

        // One object drifting right 5 px per cycle: well above the IoU
        // acceptance threshold between consecutive cycles.
        for cycle in 0..20 {
            let x = 100.0 + 5.0 * cycle as f32;
            let out = tracker.update(&[det(x, 100.0, x + 80.0, 180.0)]);
            if cycle + 1 >= 2 {
                assert_eq!(out.len(), 1, "cycle {cycle} should report the track");
                seen_ids.insert(out[0].id);
            }
        }
        assert_eq!(seen_ids.len(), 1, "identity must stay stable");
    }

    #[test]
    fn track_confirms_at_min_hits() {
        let mut tracker = SortTracker::new(TrackerConfig {
            min_hits: 3,
            ..TrackerConfig::default()
        });

        tracker.update(&[det(0.0, 0.0, 50.0, 50.0)]);
        assert_eq!(tracker.tracks()[0].status, TrackStatus::Tentative);
        tracker.update(&[det(1.0, 1.0, 51.0, 51.0)]);
        assert_eq!(tracker.tracks()[0].status, TrackStatus::Tentative);
        tracker.update(&[det(2.0, 2.0, 52.0, 52.0)]);
        assert_eq!(tracker.tracks()[0].status, TrackStatus::Confirmed);
    }

    #[test]
    fn confirmed_track_is_pruned_after_max_age_misses() {
        let mut tracker = SortTracker::new(TrackerConfig {
            max_age: 3,
            min_hits: 2,
            iou_threshold: 0.3,
        });

        for _ in 0..4 {
            tracker.update(&[det(10.0, 10.0, 60.0, 60.0)]);
        }
        assert_eq!(tracker.tracks().len(), 1);

        // Miss max_age cycles: still held (coasting), but never output.
        for _ in 0..3 {
            let out = tracker.update(&[]);
            assert!(out.is_empty());
        }
        assert_eq!(tracker.tracks().len(), 1);

        // One more miss exceeds max_age and the track is removed.
        tracker.update(&[]);
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn disjoint_detections_spawn_new_tracks_not_reused_ids() {
        let mut tracker = SortTracker::default();
        for _ in 0..3 {
            tracker.update(&[det(0.0, 0.0, 40.0, 40.0)]);
        }
        let first_id = tracker.tracks()[0].id;

        // Two detections with zero overlap with the existing track.
        tracker.update(&[
            det(0.0, 0.0, 40.0, 40.0),
            det(200.0, 200.0, 240.0, 240.0),
            det(400.0, 0.0, 440.0, 40.0),
        ]);

        assert_eq!(tracker.tracks().len(), 3);
        let new: Vec<_> = tracker
            .tracks()
            .iter()
            .filter(|t| t.id != first_id)
            .collect();
        assert_eq!(new.len(), 2);
        assert!(new.iter().all(|t| t.status == TrackStatus::Tentative));
        assert!(new.iter().all(|t| t.id > first_id), "ids are never reused");
    }

    #[test]
    fn time_since_update_resets_only_on_match() {
        let mut tracker = SortTracker::default();
        tracker.update(&[det(0.0, 0.0, 50.0, 50.0)]);
        assert_eq!(tracker.tracks()[0].time_since_update, 0);

        tracker.update(&[]);
        assert_eq!(tracker.tracks()[0].time_since_update, 1);
        tracker.update(&[]);
        assert_eq!(tracker.tracks()[0].time_since_update, 2);

        tracker.update(&[det(0.0, 0.0, 50.0, 50.0)]);
        assert_eq!(tracker.tracks()[0].time_since_update, 0);
    }

    #[test]
    fn equal_cost_match_prefers_established_track() {
        let mut tracker = SortTracker::default();

        // Track 1 accumulates hits on a stationary box; with identical
        // observations its Kalman state converges to the box exactly.
        for _ in 0..4 {
            tracker.update(&[det(0.0, 0.0, 50.0, 50.0)]);
        }
        // A second detection two pixels to the right spawns track 2.
        tracker.update(&[det(0.0, 0.0, 50.0, 50.0), det(2.0, 0.0, 52.0, 50.0)]);

        let established = tracker.tracks().iter().max_by_key(|t| t.hits).unwrap().id;
        let newcomer = tracker.tracks().iter().min_by_key(|t| t.hits).unwrap().id;
        assert_ne!(established, newcomer);

        // One detection exactly between the two predicted boxes: its IoU
        // with each is bit-identical, so only the hits tie-break decides.
        tracker.update(&[det(1.0, 0.0, 51.0, 50.0)]);

        let win = tracker.tracks().iter().find(|t| t.id == established).unwrap();
        let lose = tracker.tracks().iter().find(|t| t.id == newcomer).unwrap();
        assert_eq!(win.time_since_update, 0, "established track takes the match");
        assert_eq!(lose.time_since_update, 1);
    }

    #[test]
    fn lone_detection_matches_the_overlapping_track_not_the_first() {
        let mut tracker = SortTracker::default();

        // Two well-separated confirmed tracks.
        let a = det(0.0, 0.0, 50.0, 50.0);
        let b = det(200.0, 200.0, 250.0, 250.0);
        tracker.update(&[a.clone(), b.clone()]);
        let out = tracker.update(&[a.clone(), b.clone()]);
        assert_eq!(out.len(), 2);
        let b_id = out
            .iter()
            .find(|t| iou(t.bbox, b.bbox) > 0.5)
            .expect("second track present")
            .id;

        // A single detection lying exactly on the second track must
        // match it, even though the first track comes first in the
        // cost matrix, and must not mint a new identity.
        let out = tracker.update(&[b.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, b_id);
        assert_eq!(tracker.tracks().len(), 2, "no spurious track spawned");
    }

    #[test]
    fn output_excludes_coasting_and_tentative_tracks() {
        let mut tracker = SortTracker::new(TrackerConfig {
            max_age: 5,
            min_hits: 3,
            iou_threshold: 0.3,
        });

        // After the grace period, a fresh tentative track is not shown.
        for _ in 0..4 {
            tracker.update(&[det(0.0, 0.0, 50.0, 50.0)]);
        }
        let out = tracker.update(&[
            det(0.0, 0.0, 50.0, 50.0),
            det(500.0, 500.0, 550.0, 550.0),
        ]);
        assert_eq!(out.len(), 1, "new tentative track must not be displayed");
    }
}
