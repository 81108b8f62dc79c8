//! Local parameter search maximizing a matching objective.
//!
//! The calibrator never touches the caller's equalizer: it works on a clone
//! and returns the best configuration in a [`Calibration`], which the caller
//! may [`commit`](Calibration::commit).
//!
//! Every sweep visits each free parameter, trying `value + delta` and then
//! `value - delta` (integers step by the ceiling and floor of `delta`,
//! booleans toggle). A strictly better score keeps the trial value and
//! widens the step by 10%; otherwise the value is restored and the step
//! narrows by 10%.
//! Parameters whose step fell below their tolerance are converged.
//!
//! [`Calibrator::search`] repeats the local search from randomly sampled
//! starting points and keeps the best outcome.

use crate::candidate::Candidate;
use crate::equalizer::{Category, Equalizer, ParamValue, Parameter};
use crate::finder::{Finder, Strategy};
use crate::image::Image;
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::LocateResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Scores the candidates of one case in `[0, 1]`.
pub trait Objective {
    fn score(&self, candidates: &[Candidate]) -> f64;

    /// Similarity threshold the cases are located with.
    ///
    /// Zero hands the objective the raw confidence of the single best
    /// window; objectives that compare competing windows need more.
    fn similarity(&self) -> f64 {
        0.0
    }

    /// Amount subtracted from a case score when locating took `elapsed`.
    fn time_penalty(&self, _elapsed: Duration) -> f64 {
        0.0
    }
}

/// Confidence of the best candidate.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BestConfidence;

impl Objective for BestConfidence {
    fn score(&self, candidates: &[Candidate]) -> f64 {
        candidates.first().map_or(0.0, |c| c.confidence)
    }
}

/// Rewards the candidate at `peak` and penalizes all competitors: the mean of
/// `confidence` at the peak and `1 - confidence` elsewhere.
///
/// Cases are located at `floor`, so every window at least that similar to
/// the needle competes with the peak.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PeakDiscrimination {
    /// Expected top-left corner of the true match.
    pub peak: (usize, usize),
    /// Lowest confidence a competitor needs to be seen.
    pub floor: f64,
}

impl PeakDiscrimination {
    /// Default competitor floor.
    pub const DEFAULT_FLOOR: f64 = 0.5;

    /// Discriminates the match at `peak` with the default floor.
    pub fn new(peak: (usize, usize)) -> Self {
        Self {
            peak,
            floor: Self::DEFAULT_FLOOR,
        }
    }
}

impl Objective for PeakDiscrimination {
    fn similarity(&self) -> f64 {
        self.floor
    }

    fn score(&self, candidates: &[Candidate]) -> f64 {
        if candidates.is_empty() {
            return 0.0;
        }
        let total: f64 = candidates
            .iter()
            .map(|c| {
                if (c.x, c.y) == self.peak {
                    c.confidence
                } else {
                    1.0 - c.confidence
                }
            })
            .sum();
        total / candidates.len() as f64
    }
}

/// Wraps another objective and penalizes slow configurations linearly:
/// every second a case spends beyond `max_exec_time` costs one unit of
/// score.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Performance<O = BestConfidence> {
    pub inner: O,
    pub max_exec_time: Duration,
}

impl<O: Objective> Performance<O> {
    pub fn new(inner: O, max_exec_time: Duration) -> Self {
        Self {
            inner,
            max_exec_time,
        }
    }
}

impl<O: Objective> Objective for Performance<O> {
    fn score(&self, candidates: &[Candidate]) -> f64 {
        self.inner.score(candidates)
    }

    fn similarity(&self) -> f64 {
        self.inner.similarity()
    }

    fn time_penalty(&self, elapsed: Duration) -> f64 {
        let overtime = elapsed.saturating_sub(self.max_exec_time);
        self.inner.time_penalty(elapsed) + overtime.as_secs_f64()
    }
}

impl<F> Objective for F
where
    F: Fn(&[Candidate]) -> f64,
{
    fn score(&self, candidates: &[Candidate]) -> f64 {
        self(candidates)
    }
}

/// One needle/haystack pair to tune on.
#[derive(Clone, Debug)]
pub struct CalibrationCase {
    pub needle: Image,
    pub haystack: Image,
    /// `false` for negative cases where the needle should not be found.
    pub maximize: bool,
}

impl CalibrationCase {
    /// A case where the needle is present.
    pub fn positive(needle: Image, haystack: Image) -> Self {
        Self {
            needle,
            haystack,
            maximize: true,
        }
    }

    /// A case where the needle is absent.
    pub fn negative(needle: Image, haystack: Image) -> Self {
        Self {
            needle,
            haystack,
            maximize: false,
        }
    }
}

/// Outcome of a calibration run.
#[derive(Clone, Debug)]
pub struct Calibration {
    /// Best mean objective over all cases.
    pub score: f64,
    /// Configuration that reached `score`.
    pub equalizer: Equalizer,
    /// Number of objective evaluations performed.
    pub evaluations: usize,
}

impl Calibration {
    /// Replaces `live` with the calibrated configuration.
    pub fn commit(self, live: &mut Equalizer) {
        *live = self.equalizer;
    }
}

/// Result of one benchmarked algorithm combination.
#[derive(Clone, Debug)]
pub struct BenchmarkEntry {
    /// Algorithm names joined by `+`, localization first.
    pub method: String,
    pub score: f64,
    /// Configuration that was scored.
    pub equalizer: Equalizer,
}

/// Iterative local search over free parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Calibrator {
    /// Maximum number of sweeps.
    pub max_attempts: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

type ParamKey = (Category, String);

struct Run<'a, B, O> {
    build: &'a B,
    cases: &'a [CalibrationCase],
    objective: &'a O,
    evaluations: usize,
}

impl<B, S, O> Run<'_, B, O>
where
    B: Fn(&Equalizer) -> LocateResult<S>,
    S: Strategy,
    O: Objective,
{
    /// Mean case score; failures count as zero similarity.
    fn evaluate(&mut self, eq: &Equalizer) -> f64 {
        self.evaluations += 1;
        if self.cases.is_empty() {
            return 0.0;
        }
        let strategy = (self.build)(eq).ok();
        let threshold = self.objective.similarity();
        let total: f64 = self
            .cases
            .iter()
            .map(|case| {
                let started = Instant::now();
                let found = strategy
                    .as_ref()
                    .and_then(|s| s.locate(&case.needle, &case.haystack, threshold).ok());
                let elapsed = started.elapsed();
                let similarity = found.map_or(0.0, |found| self.objective.score(&found));
                let score = if case.maximize {
                    similarity
                } else {
                    1.0 - similarity
                };
                score - self.objective.time_penalty(elapsed)
            })
            .sum();
        total / self.cases.len() as f64
    }
}

fn free_parameters(eq: &Equalizer) -> Vec<ParamKey> {
    let mut keys = Vec::new();
    for category in Category::ALL {
        for (name, param) in eq.parameters(category) {
            if !param.is_fixed() {
                keys.push((category, name.clone()));
            }
        }
    }
    keys
}

enum Direction {
    Up,
    Down,
}

/// Trial value of `start` moved by `delta`, clamped to the bounds.
fn step(eq: &Equalizer, key: &ParamKey, delta: f64, dir: Direction) -> LocateResult<ParamValue> {
    let param = eq.get_parameter(key.0, &key.1)?;
    let moved = match (param.value(), dir) {
        (ParamValue::Float(v), Direction::Up) => ParamValue::Float(param.clamp(v + delta)),
        (ParamValue::Float(v), Direction::Down) => ParamValue::Float(param.clamp(v - delta)),
        (ParamValue::Int(v), Direction::Up) => {
            ParamValue::Int(param.clamp((v as f64) + delta.ceil()) as i64)
        }
        (ParamValue::Int(v), Direction::Down) => {
            ParamValue::Int(param.clamp((v as f64) - delta.floor()) as i64)
        }
        (ParamValue::Bool(v), _) => ParamValue::Bool(!v),
    };
    Ok(moved)
}

/// Pins the hybrid coarse threshold to zero so the feature stage sees every
/// window. A caller who fixed the threshold keeps their value.
fn pin_front_similarity(eq: &mut Equalizer) -> LocateResult<()> {
    let free = eq
        .get_parameter(Category::Localization, "front_similarity")
        .is_ok_and(|param| !param.is_fixed());
    if free {
        eq.set_parameter(Category::Localization, "front_similarity", 0.0)?;
        eq.lock(Category::Localization, |name| name == "front_similarity");
    }
    Ok(())
}

/// Distribution of random starting points for [`Calibrator::search`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Sampling {
    /// Uniform within the bounds; unbounded parameters fall back to
    /// [`Sampling::Normal`].
    Uniform,
    /// Normal around the current value with the calibration step as the
    /// standard deviation, clamped to the bounds.
    #[default]
    Normal,
}

/// Settings of a random-restart search.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SearchOptions {
    pub random_starts: usize,
    pub sampling: Sampling,
    /// Seed of the sampler, so searches are reproducible.
    pub seed: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            random_starts: 1,
            sampling: Sampling::Normal,
            seed: 0,
        }
    }
}

fn gaussian<R: Rng>(rng: &mut R, mean: f64, deviation: f64) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    mean + deviation * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Draws a value of the same kind inside the bounds of `param`.
fn random_value<R: Rng>(param: &Parameter, sampling: Sampling, rng: &mut R) -> ParamValue {
    let within =
        |x: f64| param.min().map_or(true, |lo| x >= lo) && param.max().map_or(true, |hi| x <= hi);
    match (param.value(), sampling, param.min(), param.max()) {
        (ParamValue::Bool(_), ..) => ParamValue::Bool(rng.random_bool(0.5)),
        (ParamValue::Float(_), Sampling::Uniform, Some(lo), Some(hi)) => {
            ParamValue::Float(rng.random_range(lo..=hi))
        }
        (ParamValue::Int(v), Sampling::Uniform, Some(lo), Some(hi)) => {
            let (lo, hi) = (lo.ceil() as i64, hi.floor() as i64);
            ParamValue::Int(if lo <= hi { rng.random_range(lo..=hi) } else { v })
        }
        (ParamValue::Float(v), ..) => {
            ParamValue::Float(param.clamp(gaussian(rng, v, param.delta())))
        }
        (ParamValue::Int(v), ..) => {
            let drawn = param.clamp(gaussian(rng, v as f64, param.delta())).round();
            ParamValue::Int(if within(drawn) { drawn as i64 } else { v })
        }
    }
}

/// Replaces every free parameter with a random draw.
fn randomize<R: Rng>(eq: &mut Equalizer, sampling: Sampling, rng: &mut R) -> LocateResult<()> {
    for key in free_parameters(eq) {
        let value = random_value(eq.get_parameter(key.0, &key.1)?, sampling, rng);
        eq.set_parameter(key.0, &key.1, value)?;
    }
    Ok(())
}

impl Calibrator {
    /// Creates a calibrator running at most `max_attempts` sweeps.
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    /// Tunes the free parameters of `start` for the strategy produced by
    /// `build`.
    ///
    /// Every case is located at [`Objective::similarity`] (zero unless the
    /// objective compares competing windows) so that the objective sees the
    /// raw confidence; a case whose search fails scores zero.
    /// `front_similarity` of the hybrid method is pinned to zero for the same
    /// reason unless the caller fixed it.
    pub fn calibrate<B, S, O>(
        &self,
        start: &Equalizer,
        build: B,
        cases: &[CalibrationCase],
        objective: &O,
    ) -> LocateResult<Calibration>
    where
        B: Fn(&Equalizer) -> LocateResult<S>,
        S: Strategy,
        O: Objective,
    {
        let _span = trace_span!("calibrate", cases = cases.len()).entered();
        let mut eq = start.clone();
        pin_front_similarity(&mut eq)?;

        let mut run = Run {
            build: &build,
            cases,
            objective,
            evaluations: 0,
        };
        let mut best = run.evaluate(&eq);
        let keys = free_parameters(&eq);
        let mut deltas: BTreeMap<ParamKey, f64> = BTreeMap::new();
        for key in &keys {
            deltas.insert(key.clone(), eq.get_parameter(key.0, &key.1)?.delta());
        }

        for attempt in 0..self.max_attempts {
            trace_event!("calibrate_sweep", attempt = attempt, best = best);
            if best >= 1.0 {
                break;
            }
            let mut converged = true;
            let mut improved = false;
            for key in &keys {
                let param = eq.get_parameter(key.0, &key.1)?;
                let delta = deltas.get(key).copied().unwrap_or(0.0);
                if delta < param.tolerance() {
                    continue;
                }
                converged = false;
                let saved = eq.snapshot();

                let trial = step(&eq, key, delta, Direction::Up)?;
                eq.set_parameter(key.0, &key.1, trial)?;
                let score = run.evaluate(&eq);
                trace_debug!("calibrate_trial", name = key.1.as_str(), score = score);
                if score > best {
                    best = score;
                    improved = true;
                    deltas.insert(key.clone(), delta * 1.1);
                    continue;
                }
                eq.restore(&saved);
                if matches!(eq.get_parameter(key.0, &key.1)?.value(), ParamValue::Bool(_)) {
                    continue;
                }

                let trial = step(&eq, key, delta, Direction::Down)?;
                eq.set_parameter(key.0, &key.1, trial)?;
                let score = run.evaluate(&eq);
                trace_debug!("calibrate_trial", name = key.1.as_str(), score = score);
                if score > best {
                    best = score;
                    improved = true;
                    deltas.insert(key.clone(), delta * 1.1);
                } else {
                    eq.restore(&saved);
                    deltas.insert(key.clone(), delta * 0.9);
                }
            }
            if converged || !improved {
                break;
            }
        }

        trace_event!("calibrate_done", score = best, evaluations = run.evaluations);
        Ok(Calibration {
            score: best,
            equalizer: eq,
            evaluations: run.evaluations,
        })
    }

    /// Runs [`calibrate`](Self::calibrate) from `random_starts` random
    /// starting points and returns the best outcome.
    ///
    /// The unmodified `start` is scored first; a restart replaces the best
    /// result only when it scores strictly higher. Fixed parameters are never
    /// sampled. With `max_attempts == 0` the restarts are scored without
    /// local refinement.
    pub fn search<B, S, O>(
        &self,
        start: &Equalizer,
        build: B,
        cases: &[CalibrationCase],
        objective: &O,
        options: &SearchOptions,
    ) -> LocateResult<Calibration>
    where
        B: Fn(&Equalizer) -> LocateResult<S>,
        S: Strategy,
        O: Objective,
    {
        let _span = trace_span!("calibrate_search", starts = options.random_starts).entered();
        let mut best = Calibrator::new(0).calibrate(start, &build, cases, objective)?;
        let mut evaluations = best.evaluations;
        let mut rng = StdRng::seed_from_u64(options.seed);
        for restart in 0..options.random_starts {
            let mut eq = start.clone();
            randomize(&mut eq, options.sampling, &mut rng)?;
            let outcome = self.calibrate(&eq, &build, cases, objective)?;
            evaluations += outcome.evaluations;
            trace_event!(
                "calibrate_restart",
                restart = restart,
                score = outcome.score,
                best = best.score
            );
            if outcome.score > best.score {
                best = outcome;
            }
        }
        best.evaluations = evaluations;
        Ok(best)
    }

    /// Random-restart search over the strategy selected by the equalizer's
    /// localization method.
    pub fn search_finder<O: Objective>(
        &self,
        start: &Equalizer,
        cases: &[CalibrationCase],
        objective: &O,
        options: &SearchOptions,
    ) -> LocateResult<Calibration> {
        self.search(start, Finder::from_equalizer, cases, objective, options)
    }

    /// Calibrates the strategy selected by the equalizer's localization
    /// method.
    pub fn calibrate_finder<O: Objective>(
        &self,
        start: &Equalizer,
        cases: &[CalibrationCase],
        objective: &O,
    ) -> LocateResult<Calibration> {
        self.calibrate(start, Finder::from_equalizer, cases, objective)
    }

    /// Scores every template matcher and every feature
    /// detector/extractor/matcher combination, best first.
    ///
    /// With `calibrate` each combination is tuned before it is scored.
    pub fn benchmark<O: Objective>(
        &self,
        start: &Equalizer,
        cases: &[CalibrationCase],
        objective: &O,
        calibrate: bool,
    ) -> LocateResult<Vec<BenchmarkEntry>> {
        let mut configs: Vec<(String, Equalizer)> = Vec::new();
        for &matcher in Category::TemplateMatcher.algorithms() {
            let mut eq = start.clone();
            eq.select(Category::Localization, "template")?;
            eq.select(Category::TemplateMatcher, matcher)?;
            configs.push((format!("template+{matcher}"), eq));
        }
        for &detector in Category::FeatureDetector.algorithms() {
            for &extractor in Category::FeatureExtractor.algorithms() {
                for &matcher in Category::FeatureMatcher.algorithms() {
                    let mut eq = start.clone();
                    eq.select(Category::Localization, "feature")?;
                    eq.select(Category::FeatureDetector, detector)?;
                    eq.select(Category::FeatureExtractor, extractor)?;
                    eq.select(Category::FeatureMatcher, matcher)?;
                    configs.push((format!("feature+{detector}+{extractor}+{matcher}"), eq));
                }
            }
        }

        let mut entries = Vec::with_capacity(configs.len());
        for (method, eq) in configs {
            let (score, equalizer) = if calibrate {
                let calibration = self.calibrate_finder(&eq, cases, objective)?;
                (calibration.score, calibration.equalizer)
            } else {
                let build = Finder::from_equalizer;
                let mut run = Run {
                    build: &build,
                    cases,
                    objective,
                    evaluations: 0,
                };
                (run.evaluate(&eq), eq)
            };
            trace_event!("benchmark_entry", method = method.as_str(), score = score);
            entries.push(BenchmarkEntry {
                method,
                score,
                equalizer,
            });
        }
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(entries)
    }
}
