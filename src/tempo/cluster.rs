use serde::Serialize;

/// Lower bound candidates are folded into before clustering
pub const CANDIDATE_MIN_BPM: f32 = 60.0;

/// Upper bound candidates are folded into before clustering
pub const CANDIDATE_MAX_BPM: f32 = 200.0;

/// Algorithm that produced a tempo figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TempoSource {
    /// External beat tracker
    Tracker,
    /// Built-in autocorrelation estimator
    Native,
    /// Continuously fed onset analyzer
    Live,
    /// Offline beat-grid worker
    Grid,
}

impl TempoSource {
    const ALL: [TempoSource; 4] = [
        TempoSource::Tracker,
        TempoSource::Native,
        TempoSource::Live,
        TempoSource::Grid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TempoSource::Tracker => "tracker",
            TempoSource::Native => "native",
            TempoSource::Live => "live",
            TempoSource::Grid => "grid",
        }
    }
}

impl std::fmt::Display for TempoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmCandidate {
    pub bpm: f32,
    pub source: TempoSource,
    pub weight: f32,
}

impl BpmCandidate {
    pub fn new(bpm: f32, source: TempoSource, weight: f32) -> Self {
        Self { bpm, source, weight }
    }
}

/// Reconciled tempo with its confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoEstimate {
    pub bpm: f32,
    pub confidence: f32,
    pub source: TempoSource,
}

#[derive(Debug, Clone)]
struct Bucket {
    members: Vec<BpmCandidate>,
    weight: f32,
    center: f32,
}

impl Bucket {
    fn add(&mut self, candidate: BpmCandidate) {
        self.weight += candidate.weight;
        self.center += (candidate.bpm - self.center) * (candidate.weight / self.weight);
        self.members.push(candidate);
    }

    fn dominant_source(&self) -> TempoSource {
        let mut best = (TempoSource::Native, 0usize, f32::MIN);
        for source in TempoSource::ALL {
            let (count, weight) = self
                .members
                .iter()
                .filter(|m| m.source == source)
                .fold((0usize, 0.0f32), |(c, w), m| (c + 1, w + m.weight));
            if count > best.1 || (count == best.1 && count > 0 && weight > best.2) {
                best = (source, count, weight);
            }
        }
        best.0
    }
}

/// Fold a candidate into [60, 200] by doubling or halving.
/// `None` for non-finite or non-positive tempos.
pub fn fold_candidate(bpm: f32) -> Option<f32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }
    Some(crate::tempo::autocorr::fold_bpm(bpm, CANDIDATE_MIN_BPM, CANDIDATE_MAX_BPM))
}

/// Cluster weighted candidates and pick the heaviest bucket.
///
/// A candidate joins the nearest bucket whose center lies within
/// `tolerance` BPM, otherwise it opens a new one. Confidence is the winning
/// weight over the total weight plus `prior_weight`.
pub fn cluster_candidates(
    candidates: &[BpmCandidate],
    tolerance: f32,
    prior_weight: f32,
) -> Option<TempoEstimate> {
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut total = 0.0f32;

    for candidate in candidates {
        if !(candidate.weight > 0.0) {
            continue;
        }
        let Some(bpm) = fold_candidate(candidate.bpm) else {
            continue;
        };
        let candidate = BpmCandidate { bpm, ..*candidate };
        total += candidate.weight;

        let nearest = buckets
            .iter_mut()
            .map(|b| ((b.center - bpm).abs(), b))
            .filter(|(distance, _)| *distance <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((_, bucket)) => bucket.add(candidate),
            None => buckets.push(Bucket {
                members: vec![candidate],
                weight: candidate.weight,
                center: bpm,
            }),
        }
    }

    let mut winner: Option<&Bucket> = None;
    for bucket in &buckets {
        if winner.map_or(true, |w| bucket.weight > w.weight) {
            winner = Some(bucket);
        }
    }
    let winner = winner?;

    let bpm = winner
        .members
        .iter()
        .map(|m| m.bpm * m.weight)
        .sum::<f32>()
        / winner.weight;
    let confidence = (winner.weight / (total + prior_weight.max(0.0))).clamp(0.0, 1.0);

    tracing::debug!(
        "Clustered {} candidates into {} buckets: {:.2} BPM ({:.0}% confidence)",
        candidates.len(), buckets.len(), bpm, confidence * 100.0
    );

    Some(TempoEstimate {
        bpm,
        confidence,
        source: winner.dominant_source(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_118_bucket_wins() {
        let candidates = [
            BpmCandidate::new(118.0, TempoSource::Tracker, 1.0),
            BpmCandidate::new(119.2, TempoSource::Native, 1.0),
            BpmCandidate::new(117.8, TempoSource::Tracker, 1.0),
            BpmCandidate::new(240.0, TempoSource::Native, 0.5),
        ];
        let estimate = cluster_candidates(&candidates, 1.25, 1.0).unwrap();
        assert!((estimate.bpm - 118.33).abs() < 0.05, "bpm {}", estimate.bpm);
        assert!((estimate.confidence - 0.667).abs() < 0.005, "conf {}", estimate.confidence);
        assert_eq!(estimate.source, TempoSource::Tracker);
    }

    #[test]
    fn test_single_candidate_never_certain() {
        let estimate =
            cluster_candidates(&[BpmCandidate::new(128.0, TempoSource::Native, 0.6)], 1.25, 1.0).unwrap();
        assert_eq!(estimate.bpm, 128.0);
        assert!(estimate.confidence < 1.0);
        let certain =
            cluster_candidates(&[BpmCandidate::new(128.0, TempoSource::Native, 0.6)], 1.25, 0.0).unwrap();
        assert_eq!(certain.confidence, 1.0);
    }

    #[test]
    fn test_folding_and_invalid_candidates() {
        assert_eq!(fold_candidate(45.0), Some(90.0));
        assert_eq!(fold_candidate(400.0), Some(200.0));
        assert_eq!(fold_candidate(f32::NAN), None);
        assert_eq!(fold_candidate(0.0), None);
        assert!(cluster_candidates(&[], 1.25, 1.0).is_none());
        assert!(cluster_candidates(&[BpmCandidate::new(f32::INFINITY, TempoSource::Native, 1.0)], 1.25, 1.0).is_none());
    }

    #[test]
    fn test_octave_errors_merge() {
        let candidates = [
            BpmCandidate::new(64.0, TempoSource::Native, 0.6),
            BpmCandidate::new(128.0, TempoSource::Tracker, 1.0),
            BpmCandidate::new(256.0, TempoSource::Native, 0.6),
            BpmCandidate::new(96.0, TempoSource::Tracker, 1.0),
        ];
        let estimate = cluster_candidates(&candidates, 1.25, 1.0).unwrap();
        // 256 folds to 128; 64 stays in range and forms its own bucket
        assert!((estimate.bpm - 128.0).abs() < 1e-3);
        assert_eq!(estimate.source, TempoSource::Tracker);
    }
}
