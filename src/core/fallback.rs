use crate::models::{CompatibilityBreakdown, CompatibilityResult, Profile, Provenance};
use std::collections::HashSet;

/// Default age difference (years) at which age closeness reaches zero
pub const DEFAULT_AGE_SPAN: f64 = 10.0;

/// Largest size-class distance (tiny vs giant)
const MAX_SIZE_GAP: f64 = 4.0;

/// Raw similarity signals between two profiles, each within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub species: f64,
    pub age: f64,
    pub size: f64,
    pub traits: f64,
    pub intent: f64,
}

impl Signals {
    pub fn between(a: &Profile, b: &Profile, age_span: f64) -> Self {
        Self {
            species: species_score(&a.species, &b.species),
            age: age_score(a.age_years, b.age_years, age_span),
            size: size_score(a, b),
            traits: trait_overlap(&a.traits, &b.traits),
            intent: if a.intent == b.intent { 1.0 } else { 0.0 },
        }
    }
}

/// Deterministic compatibility score, used when the remote scorer fails.
///
/// Breakdown (each factor scaled to 0-100):
///     temperament = 0.7 * traits + 0.3 * species
///     activity    = 0.5 * age    + 0.5 * size
///     size        = size
///     age         = age
///     interests   = traits
///     lifestyle   = 0.5 * species + 0.5 * intent
///
/// Overall is the mean of the six factors, so the effective contribution of
/// each signal is bounded: traits 28.3, age 25, size 25, species 13.3 and
/// intent 8.3 points.
pub fn fallback_score(a: &Profile, b: &Profile, age_span: f64) -> CompatibilityResult {
    let s = Signals::between(a, b, age_span);

    let breakdown = CompatibilityBreakdown {
        temperament: scaled(0.7 * s.traits + 0.3 * s.species),
        activity: scaled(0.5 * s.age + 0.5 * s.size),
        size: scaled(s.size),
        age: scaled(s.age),
        interests: scaled(s.traits),
        lifestyle: scaled(0.5 * s.species + 0.5 * s.intent),
    };
    let overall = round1(breakdown.mean());

    CompatibilityResult {
        overall,
        summary: summarize(overall, &breakdown),
        breakdown,
        provenance: Provenance::LocalFallback,
    }
}

/// One-line human summary from the overall band and the extreme factors
pub fn summarize(overall: f64, breakdown: &CompatibilityBreakdown) -> String {
    let band = if overall >= 80.0 {
        "Excellent match"
    } else if overall >= 60.0 {
        "Good match"
    } else if overall >= 40.0 {
        "Fair match"
    } else {
        "Low compatibility"
    };
    let ((best, _), (worst, worst_value)) = breakdown.extremes();

    if worst_value >= 80.0 {
        format!("{} ({:.1}); strong across every factor, led by {}.", band, overall, best)
    } else {
        format!("{} ({:.1}); strongest on {}, weakest on {}.", band, overall, best, worst)
    }
}

#[inline]
fn scaled(signal: f64) -> f64 {
    round1(signal.clamp(0.0, 1.0) * 100.0)
}

#[inline]
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn species_score(a: &str, b: &str) -> f64 {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return 0.5;
    }
    if a.eq_ignore_ascii_case(b) {
        1.0
    } else {
        0.0
    }
}

/// Linear decay from 1 (same age) to 0 at `age_span` years apart
#[inline]
fn age_score(a: f64, b: f64, age_span: f64) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    let span = if age_span > 0.0 { age_span } else { DEFAULT_AGE_SPAN };
    (1.0 - (a - b).abs() / span).max(0.0)
}

#[inline]
fn size_score(a: &Profile, b: &Profile) -> f64 {
    let gap = (i16::from(a.size.ordinal()) - i16::from(b.size.ordinal())).abs();
    1.0 - f64::from(gap) / MAX_SIZE_GAP
}

/// Jaccard overlap of trait tags, case-insensitive
fn trait_overlap(a: &[String], b: &[String]) -> f64 {
    let normalize = |tags: &[String]| -> HashSet<String> {
        tags.iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    };
    let (a, b) = (normalize(a), normalize(b));

    if a.is_empty() && b.is_empty() {
        return 0.5;
    }
    let shared = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    shared / union
}
