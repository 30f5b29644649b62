//! Scorer ensemble
//!
//! ```text
//! candidates ──► core scorers (rayon pool, one scorer at a time)
//!            └─► optional scorers (helper thread, call timeout ∧ deadline)
//!                        │
//!                        ▼
//!   availability for this request ──► renormalized weights ──► hybrid
//! ```
//!
//! A scorer that fails, panics, times out or produces a non-finite value
//! on any path is dropped for the whole candidate set, so every path in a
//! response is combined with the same effective weights.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    CentralityScorer, EdgeLikelihoodModel, LearnedScorer, MotifScorer, PathScorer, ScoringWeights,
    WeightedCostScorer,
};
use crate::deadline::{call_with_timeout, Deadline, DEFAULT_CALL_TIMEOUT};
use crate::graph::Subgraph;
use crate::models::{Algorithm, AttackPath, Notice, NoticeKind};
use crate::paths::DEFAULT_CANDIDATE_CAP;

/// Scored candidates plus how the hybrid score was formed
#[derive(Debug, Clone, Default)]
pub struct ScoreOutcome {
    pub paths: Vec<AttackPath>,
    /// Selection actually used (a selection with no score left becomes `hybrid`)
    pub algorithm: Algorithm,
    /// Effective weights, summing to 1 over the available scorers
    pub weights: BTreeMap<String, f64>,
    /// Scorers dropped for this request
    pub unavailable: Vec<String>,
    pub notices: Vec<Notice>,
}

pub struct ScorerEnsemble {
    core: Vec<Arc<dyn PathScorer>>,
    learned: Option<Arc<dyn PathScorer>>,
    weights: ScoringWeights,
    pool: Option<rayon::ThreadPool>,
    call_timeout: Duration,
}

impl ScorerEnsemble {
    pub fn builder() -> ScorerEnsembleBuilder {
        ScorerEnsembleBuilder::new()
    }

    pub fn has_learned(&self) -> bool {
        self.learned.is_some()
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Scorers a request for `algorithm` runs, and the selection they amount to
    fn select(&self, algorithm: Algorithm, notices: &mut Vec<Notice>) -> (Algorithm, Vec<Arc<dyn PathScorer>>) {
        let all = || {
            let mut scorers = self.core.clone();
            scorers.extend(self.learned.clone());
            scorers
        };
        match algorithm {
            Algorithm::Hybrid => (Algorithm::Hybrid, all()),
            Algorithm::Learned => match &self.learned {
                Some(learned) => (Algorithm::Learned, vec![Arc::clone(learned)]),
                None => {
                    let msg = "no learned model configured, using hybrid scoring";
                    warn!("{}", msg);
                    notices.push(Notice::new(NoticeKind::ScorerUnavailable, msg));
                    (Algorithm::Hybrid, all())
                }
            },
            single => (
                single,
                self.core
                    .iter()
                    .filter(|s| s.algorithm() == single)
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// Score every candidate and combine the available scores.
    ///
    /// A single-algorithm selection that ends up with no score at all is
    /// rerun as `hybrid` over the core scorers that have not failed yet.
    pub fn score(
        &self,
        candidates: Vec<AttackPath>,
        subgraph: &Arc<Subgraph>,
        algorithm: Algorithm,
        deadline: &Deadline,
    ) -> ScoreOutcome {
        let start = Instant::now();
        let mut notices = Vec::new();
        let mut unavailable: Vec<String> = Vec::new();
        let (mut effective, scorers) = self.select(algorithm, &mut notices);

        let mut available = self.run_scorers(
            &scorers,
            &candidates,
            subgraph,
            Some(deadline),
            &mut notices,
            &mut unavailable,
        );

        if available.is_empty() && effective != Algorithm::Hybrid {
            let msg = format!("no {effective} score available, using hybrid scoring");
            warn!("{}", msg);
            notices.push(Notice::new(NoticeKind::ScorerUnavailable, msg));
            effective = Algorithm::Hybrid;
            let fallback: Vec<Arc<dyn PathScorer>> = self
                .core
                .iter()
                .filter(|s| !unavailable.iter().any(|u| u == s.name()))
                .cloned()
                .collect();
            available = self.run_scorers(
                &fallback,
                &candidates,
                subgraph,
                Some(deadline),
                &mut notices,
                &mut unavailable,
            );
        }

        let algorithms: Vec<Algorithm> = available.iter().map(|(a, _, _)| *a).collect();
        let weights = self.weights.normalized(&algorithms);
        let paths = combine(candidates, &available, &weights);

        debug!(
            "Scored {} paths with {:?} in {:?}",
            paths.len(),
            weights,
            start.elapsed()
        );

        ScoreOutcome {
            paths,
            algorithm: effective,
            weights,
            unavailable,
            notices,
        }
    }

    /// Re-score `paths` with a fixed set of effective weights.
    ///
    /// Only the scorers named in `weights` run, the optional one under the
    /// call timeout alone. A scorer that fails now keeps each path's
    /// previous component score, so the weights stay those of the run
    /// that produced `paths`.
    pub fn rescore(
        &self,
        paths: Vec<AttackPath>,
        subgraph: &Arc<Subgraph>,
        weights: &BTreeMap<String, f64>,
        notices: &mut Vec<Notice>,
    ) -> Vec<AttackPath> {
        let scorers: Vec<Arc<dyn PathScorer>> = self
            .core
            .iter()
            .chain(self.learned.iter())
            .filter(|s| weights.contains_key(s.name()))
            .cloned()
            .collect();

        let mut unavailable = Vec::new();
        let mut available = self.run_scorers(
            &scorers,
            &paths,
            subgraph,
            None,
            notices,
            &mut unavailable,
        );
        for name in &unavailable {
            let Some(scorer) = scorers.iter().find(|s| s.name() == name.as_str()) else {
                continue;
            };
            let previous = paths
                .iter()
                .map(|p| p.scores.get(scorer.name()).copied().unwrap_or(0.0))
                .collect();
            available.push((scorer.algorithm(), scorer.name(), previous));
        }
        combine(paths, &available, weights)
    }

    /// Run `scorers` over `candidates`, recording the ones that fail.
    ///
    /// Without a deadline the optional scorer is bounded by the call timeout only.
    fn run_scorers(
        &self,
        scorers: &[Arc<dyn PathScorer>],
        candidates: &[AttackPath],
        subgraph: &Arc<Subgraph>,
        deadline: Option<&Deadline>,
        notices: &mut Vec<Notice>,
        unavailable: &mut Vec<String>,
    ) -> Vec<(Algorithm, &'static str, Vec<f64>)> {
        let mut available = Vec::new();
        for scorer in scorers {
            let name = scorer.name();
            let result = if scorer.is_optional() {
                if deadline.is_some_and(|d| d.expired()) {
                    let msg = format!("deadline reached, skipping {name} scorer");
                    info!("{}", msg);
                    notices.push(Notice::new(NoticeKind::DeadlineExceeded, msg));
                    unavailable.push(name.to_string());
                    continue;
                }
                let timeout = deadline.map_or(self.call_timeout, |d| d.clamp(self.call_timeout));
                self.run_optional(scorer, candidates, subgraph, timeout)
            } else {
                self.run_core(scorer.as_ref(), candidates, subgraph)
            };

            match result {
                Ok(scores) => available.push((scorer.algorithm(), name, scores)),
                Err(reason) => {
                    warn!("Scorer {} unavailable: {}", name, reason);
                    notices.push(Notice::new(
                        NoticeKind::ScorerUnavailable,
                        format!("{name} scorer unavailable: {reason}"),
                    ));
                    unavailable.push(name.to_string());
                }
            }
        }
        available
    }

    fn run_core(
        &self,
        scorer: &dyn PathScorer,
        candidates: &[AttackPath],
        subgraph: &Subgraph,
    ) -> Result<Vec<f64>, String> {
        let run = || {
            candidates
                .par_iter()
                .map(|path| score_guarded(scorer, path, subgraph))
                .collect::<Result<Vec<f64>, String>>()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => candidates
                .iter()
                .map(|path| score_guarded(scorer, path, subgraph))
                .collect(),
        }
    }

    fn run_optional(
        &self,
        scorer: &Arc<dyn PathScorer>,
        candidates: &[AttackPath],
        subgraph: &Arc<Subgraph>,
        timeout: Duration,
    ) -> Result<Vec<f64>, String> {
        let scorer = Arc::clone(scorer);
        let subgraph = Arc::clone(subgraph);
        let candidates = candidates.to_vec();
        call_with_timeout(scorer.name(), timeout, move || {
            candidates
                .iter()
                .map(|path| score_guarded(scorer.as_ref(), path, &subgraph))
                .collect::<Result<Vec<f64>, String>>()
        })
        .map_err(|e| e.to_string())?
    }
}

/// Record component scores and the weighted hybrid on every path
fn combine(
    candidates: Vec<AttackPath>,
    available: &[(Algorithm, &'static str, Vec<f64>)],
    weights: &BTreeMap<String, f64>,
) -> Vec<AttackPath> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, mut path)| {
            let mut hybrid = 0.0;
            for (_, name, scores) in available {
                let s = scores[i];
                path.scores.insert(name.to_string(), s);
                hybrid += weights.get(*name).copied().unwrap_or(0.0) * s;
            }
            path.hybrid_score = hybrid.clamp(0.0, 1.0);
            path
        })
        .collect()
}

/// One score, with panics and out-of-range values turned into errors
fn score_guarded(scorer: &dyn PathScorer, path: &AttackPath, subgraph: &Subgraph) -> Result<f64, String> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scorer.score(path, subgraph)));
    match result {
        Ok(Ok(s)) if s.is_finite() => Ok(s.clamp(0.0, 1.0)),
        Ok(Ok(s)) => Err(format!("non-finite score {s} for {}", path.display())),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic_info) => {
            let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(format!("panicked: {msg}"))
        }
    }
}

/// Builder for [`ScorerEnsemble`]
pub struct ScorerEnsembleBuilder {
    workers: usize,
    candidate_cap: usize,
    weights: ScoringWeights,
    motif_penalty: f64,
    learned: Option<Arc<dyn EdgeLikelihoodModel>>,
    extra: Vec<Arc<dyn PathScorer>>,
    call_timeout: Duration,
}

impl Default for ScorerEnsembleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScorerEnsembleBuilder {
    pub fn new() -> Self {
        Self {
            workers: 0,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
            weights: ScoringWeights::default(),
            motif_penalty: super::motif::DEFAULT_MOTIF_PENALTY,
            learned: None,
            extra: Vec::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Worker threads for core scoring (0 = auto-detect, capped at 16)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn candidate_cap(mut self, cap: usize) -> Self {
        self.candidate_cap = cap;
        self
    }

    pub fn weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn motif_penalty(mut self, penalty: f64) -> Self {
        self.motif_penalty = penalty;
        self
    }

    pub fn learned_model(mut self, model: Arc<dyn EdgeLikelihoodModel>) -> Self {
        self.learned = Some(model);
        self
    }

    /// Replace a built-in core scorer with the same algorithm
    pub fn scorer(mut self, scorer: Arc<dyn PathScorer>) -> Self {
        self.extra.push(scorer);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn build(self) -> ScorerEnsemble {
        let workers = resolve_workers(self.workers).min(self.candidate_cap.max(1));
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pathwarden-score-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("Could not build scoring pool ({}), scoring sequentially", e);
                None
            }
        };

        let mut core: Vec<Arc<dyn PathScorer>> = vec![
            Arc::new(WeightedCostScorer),
            Arc::new(CentralityScorer),
            Arc::new(MotifScorer::new(self.motif_penalty)),
        ];
        for replacement in self.extra {
            core.retain(|s| s.algorithm() != replacement.algorithm());
            core.push(replacement);
        }

        let learned = self
            .learned
            .map(|model| Arc::new(LearnedScorer::new(model)) as Arc<dyn PathScorer>);

        debug!("Scorer ensemble: {} core scorers, learned = {}", core.len(), learned.is_some());

        ScorerEnsemble {
            core,
            learned,
            weights: self.weights,
            pool,
            call_timeout: self.call_timeout,
        }
    }
}

/// 0 means one worker per core, capped at 16
pub fn resolve_workers(workers: usize) -> usize {
    if workers == 0 {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4)
            .min(16)
    } else {
        workers
    }
}
