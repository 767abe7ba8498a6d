//! Report-level verdict from per-frame detections.
//!
//! Two reductions run over the accepted detections:
//! - the headline detection is the one with the greatest confidence, the
//!   earliest frame winning exact ties;
//! - the dominant damage type is the most frequent type, the type seen
//!   first winning exact ties.
//!
//! Detections below the acceptance threshold take part in neither.

use std::collections::HashMap;

use serde::Serialize;

use crate::detection::{DamageType, Detection};

/// Default minimum confidence for a detection to count.
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.3;

/// Aggregated outcome of analyzing one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateVerdict {
    pub best_detection: Detection,
    pub frames_with_detection: usize,
    pub total_frames_sampled: usize,
    pub dominant_damage_type: DamageType,
}

/// Incremental form of the reduction, fed one frame at a time.
#[derive(Debug)]
pub struct VerdictAccumulator {
    threshold: f64,
    best: Option<(usize, Detection)>,
    // type -> (occurrences, first frame index)
    type_counts: HashMap<DamageType, (usize, usize)>,
    accepted: usize,
}

impl VerdictAccumulator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            best: None,
            type_counts: HashMap::new(),
            accepted: 0,
        }
    }

    /// Record the detection for the frame at `frame_index`.
    ///
    /// Returns `false` if it fell below the acceptance threshold.
    pub fn observe(&mut self, frame_index: usize, detection: Detection) -> bool {
        if detection.confidence < self.threshold {
            return false;
        }
        self.accepted += 1;

        let entry = self
            .type_counts
            .entry(detection.damage_type)
            .or_insert((0, frame_index));
        entry.0 += 1;
        entry.1 = entry.1.min(frame_index);

        let replace = match &self.best {
            None => true,
            Some((best_index, best)) => {
                detection.confidence > best.confidence
                    || (detection.confidence == best.confidence && frame_index < *best_index)
            }
        };
        if replace {
            self.best = Some((frame_index, detection));
        }
        true
    }

    /// Number of accepted detections so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Finish the reduction. `None` when nothing was accepted.
    pub fn finish(self, total_frames_sampled: usize) -> Option<AggregateVerdict> {
        let (_, best_detection) = self.best?;

        let dominant_damage_type = self
            .type_counts
            .into_iter()
            .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                // Higher count wins; on equal count the earlier first sighting wins.
                count_a.cmp(count_b).then(first_b.cmp(first_a))
            })
            .map(|(damage_type, _)| damage_type)?;

        Some(AggregateVerdict {
            best_detection,
            frames_with_detection: self.accepted,
            total_frames_sampled,
            dominant_damage_type,
        })
    }
}

/// Reduce `(frame_index, detection)` pairs into a verdict.
pub fn reduce_detections<I>(
    detections: I,
    total_frames_sampled: usize,
    threshold: f64,
) -> Option<AggregateVerdict>
where
    I: IntoIterator<Item = (usize, Detection)>,
{
    let mut acc = VerdictAccumulator::new(threshold);
    for (frame_index, detection) in detections {
        acc.observe(frame_index, detection);
    }
    acc.finish(total_frames_sampled)
}
