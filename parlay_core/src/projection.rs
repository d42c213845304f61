//! Multi-source projection aggregation and line optimization.
//!
//! Merges weighted projections of a single quantity into a mean/variance
//! estimate, prices the probability of clearing an arbitrary line, and
//! inversely solves for the line hitting a target probability:
//! analytically for Normal projections, by bisection for Poisson.

use crate::distributions::inverse_normal_cdf;
use crate::models::{
    AggregatedProjection, DistributionKind, LineAction, LineRecommendation, ProjectionSource, Side,
};
use crate::prop_model::{normal_over_under, poisson_over_under, PROB_CEIL, PROB_FLOOR};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weighted mean below this threshold selects a Poisson projection.
const POISSON_MEAN_CUTOFF: f64 = 10.0;

/// Standard deviation floor as a fraction of the weighted mean.
const SD_FLOOR_FRACTION: f64 = 0.15;

/// Bisection parameters for the discrete inverse CDF.
const BISECTION_ITERATIONS: u32 = 50;
const BISECTION_TOLERANCE: f64 = 0.25;

/// Suggested lines further than this from the current line are treated
/// as unreliable extrapolations.
const MAX_LINE_SHIFT: f64 = 5.0;

/// Target probabilities within this distance of the current probability
/// need no adjustment.
const KEEP_TOLERANCE: f64 = 0.02;

/// Source weight: confidence x log-scaled sample size x recency.
fn source_weight(source: &ProjectionSource) -> f64 {
    let sample_factor = ((source.sample_size as f64) + 1.0).ln() / 100f64.ln();
    source.confidence.clamp(0.0, 1.0) * sample_factor * (0.5 + 0.5 * source.recency.clamp(0.0, 1.0))
}

/// Merge weighted projection sources into a single estimate.
///
/// Pure: the source list is never mutated, so repeated calls on the same
/// list yield identical output. The weighted standard deviation is
/// floored at 15% of the weighted mean so near-duplicate sources cannot
/// claim degenerate precision.
pub fn aggregate_projections(sources: &[ProjectionSource]) -> Result<AggregatedProjection> {
    if sources.is_empty() {
        return Err(anyhow!("cannot aggregate an empty projection source list"));
    }

    let n = sources.len() as f64;
    let mean = sources.iter().map(|s| s.value).sum::<f64>() / n;

    let mut sorted: Vec<f64> = sources.iter().map(|s| s.value).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = if sorted.len() % 2 == 0 {
        (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    };

    let weights: Vec<f64> = sources.iter().map(source_weight).collect();
    let total_weight: f64 = weights.iter().sum();

    // All-zero weights (e.g. every source at zero confidence) degrade to
    // uniform weighting rather than dividing by zero.
    let (weighted_mean, weighted_variance) = if total_weight > 0.0 {
        let wm = sources
            .iter()
            .zip(&weights)
            .map(|(s, w)| s.value * w)
            .sum::<f64>()
            / total_weight;
        let wv = sources
            .iter()
            .zip(&weights)
            .map(|(s, w)| w * (s.value - wm) * (s.value - wm))
            .sum::<f64>()
            / total_weight;
        (wm, wv)
    } else {
        let wv = sources.iter().map(|s| (s.value - mean) * (s.value - mean)).sum::<f64>() / n;
        (mean, wv)
    };

    let sd_floor = SD_FLOOR_FRACTION * weighted_mean.abs();
    let weighted_std_dev = weighted_variance.sqrt().max(sd_floor);

    let confidence = if total_weight > 0.0 {
        (sources
            .iter()
            .zip(&weights)
            .map(|(s, w)| s.confidence * w)
            .sum::<f64>()
            / total_weight)
            .clamp(0.0, 1.0)
    } else {
        0.0
    };

    let distribution = if weighted_mean < POISSON_MEAN_CUTOFF {
        DistributionKind::Poisson
    } else {
        DistributionKind::Normal
    };

    Ok(AggregatedProjection {
        mean,
        median,
        weighted_mean,
        weighted_std_dev,
        confidence,
        distribution,
        source_count: sources.len(),
    })
}

/// Probability that the projected quantity clears a line on a side.
pub fn calculate_probability_at_line(
    projection: &AggregatedProjection,
    line: f64,
    side: Side,
) -> f64 {
    let raw = match projection.distribution {
        DistributionKind::Poisson => poisson_over_under(projection.weighted_mean, line, side),
        DistributionKind::Normal => normal_over_under(
            projection.weighted_mean,
            projection.weighted_std_dev,
            line,
            side,
        ),
    };
    raw.clamp(PROB_FLOOR, PROB_CEIL)
}

/// Solve for the line that yields a target win probability.
///
/// Normal projections invert analytically through the normal quantile
/// function; Poisson projections have no closed-form inverse CDF and use
/// bisection (50 iterations, 0.25 tolerance, rounded to the nearest half
/// point).
pub fn find_optimal_line(
    projection: &AggregatedProjection,
    target_probability: f64,
    side: Side,
) -> f64 {
    let target = target_probability.clamp(PROB_FLOOR, PROB_CEIL);

    match projection.distribution {
        DistributionKind::Normal => {
            let z = match side {
                Side::Over => inverse_normal_cdf(1.0 - target),
                Side::Under => inverse_normal_cdf(target),
            };
            projection.weighted_mean + z * projection.weighted_std_dev
        }
        DistributionKind::Poisson => {
            let mut lo = 0.0_f64;
            let mut hi = projection.weighted_mean * 3.0 + 15.0;
            for _ in 0..BISECTION_ITERATIONS {
                if hi - lo < BISECTION_TOLERANCE {
                    break;
                }
                let mid = (lo + hi) / 2.0;
                let p = calculate_probability_at_line(projection, mid, side);
                // Over probability falls as the line rises; under rises
                let move_up = match side {
                    Side::Over => p > target,
                    Side::Under => p < target,
                };
                if move_up {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let raw = (lo + hi) / 2.0;
            (raw * 2.0).round() / 2.0
        }
    }
}

/// Suggest a line move toward a target probability.
///
/// `keep` when the current line already prices within 2 percentage points
/// of the target; `skip` when the required shift exceeds 5 points (an
/// unreliable extrapolation); otherwise `adjust`, with the approximate
/// odds impact of the move (a linear proxy, not a vig model).
pub fn generate_line_recommendation(
    projection: &AggregatedProjection,
    current_line: f64,
    side: Side,
    target_probability: f64,
) -> LineRecommendation {
    let target = target_probability.clamp(PROB_FLOOR, PROB_CEIL);
    let current_probability = calculate_probability_at_line(projection, current_line, side);

    if (current_probability - target).abs() <= KEEP_TOLERANCE {
        return LineRecommendation {
            current_line,
            suggested_line: current_line,
            current_probability,
            target_probability: target,
            probability_gain: 0.0,
            odds_impact: "none".to_string(),
            action: LineAction::Keep,
        };
    }

    let suggested_line = find_optimal_line(projection, target, side);
    let suggested_probability = calculate_probability_at_line(projection, suggested_line, side);
    let probability_gain = suggested_probability - current_probability;
    let odds_shift = (probability_gain * 400.0).round() as i32;

    let action = if (suggested_line - current_line).abs() > MAX_LINE_SHIFT {
        debug!(
            "line shift {:.1} -> {:.1} exceeds {} points, skipping",
            current_line, suggested_line, MAX_LINE_SHIFT
        );
        LineAction::Skip
    } else {
        LineAction::Adjust
    };

    LineRecommendation {
        current_line,
        suggested_line,
        current_probability,
        target_probability: target,
        probability_gain,
        odds_impact: format!("~{:+} American odds", -odds_shift),
        action,
    }
}

/// One leg's inputs to a parlay-wide line optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayLegPlan {
    pub label: String,
    pub projection: AggregatedProjection,
    pub current_line: f64,
    pub side: Side,
    pub target_probability: f64,
}

/// Parlay-wide line optimization report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayOptimization {
    /// Product of per-leg probabilities at the current lines
    pub current_probability: f64,
    /// Product with adjusted legs at their suggested lines; skipped legs
    /// retain their original probability (no improvement is claimed for
    /// unresolvable legs)
    pub optimized_probability: f64,
    pub improvement: f64,
    pub line_recommendations: Vec<LineRecommendation>,
    /// Natural-language per-leg summaries
    pub summaries: Vec<String>,
}

/// Apply line optimization across every leg of a parlay.
pub fn optimize_parlay(legs: &[ParlayLegPlan]) -> ParlayOptimization {
    let mut current_probability = 1.0;
    let mut optimized_probability = 1.0;
    let mut line_recommendations = Vec::with_capacity(legs.len());
    let mut summaries = Vec::with_capacity(legs.len());

    for leg in legs {
        let rec = generate_line_recommendation(
            &leg.projection,
            leg.current_line,
            leg.side,
            leg.target_probability,
        );
        current_probability *= rec.current_probability;

        match rec.action {
            LineAction::Adjust => {
                optimized_probability *= rec.current_probability + rec.probability_gain;
                summaries.push(format!(
                    "{}: move line {:.1} -> {:.1} ({:+.1} pp, {})",
                    leg.label,
                    rec.current_line,
                    rec.suggested_line,
                    rec.probability_gain * 100.0,
                    rec.odds_impact
                ));
            }
            LineAction::Keep => {
                optimized_probability *= rec.current_probability;
                summaries.push(format!(
                    "{}: keep line {:.1} (already within {:.0} pp of target)",
                    leg.label,
                    rec.current_line,
                    KEEP_TOLERANCE * 100.0
                ));
            }
            LineAction::Skip => {
                // Unresolvable leg: keep the original probability
                optimized_probability *= rec.current_probability;
                summaries.push(format!(
                    "{}: skip (needed shift {:.1} points exceeds {:.0})",
                    leg.label,
                    (rec.suggested_line - rec.current_line).abs(),
                    MAX_LINE_SHIFT
                ));
            }
        }

        line_recommendations.push(rec);
    }

    if legs.is_empty() {
        current_probability = 0.0;
        optimized_probability = 0.0;
    }

    ParlayOptimization {
        current_probability,
        optimized_probability,
        improvement: optimized_probability - current_probability,
        line_recommendations,
        summaries,
    }
}

/// Coarse causal label for a projection shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    NewSourceAdded,
    TrendDetected,
    RoutineUpdate,
}

/// Comparison of two snapshots of sources for the same subject/statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionChange {
    pub significant: bool,
    pub previous_probability: f64,
    pub current_probability: f64,
    pub probability_shift: f64,
    /// Relative weighted-mean shift, e.g. 0.06 for a 6% move
    pub mean_shift: f64,
    pub cause: ChangeCause,
}

/// Relative mean shift above this is a trend.
const MEAN_SHIFT_THRESHOLD: f64 = 0.05;

/// Compare two snapshots of the source set for one subject/statistic.
///
/// Flags the change significant when the probability at the given line
/// shifts by at least `probability_threshold` (default 0.05) or the
/// weighted mean moves by more than 5%.
pub fn detect_projection_change(
    previous: &[ProjectionSource],
    current: &[ProjectionSource],
    line: f64,
    side: Side,
    probability_threshold: Option<f64>,
) -> Result<ProjectionChange> {
    let threshold = probability_threshold.unwrap_or(0.05);

    let old = aggregate_projections(previous)?;
    let new = aggregate_projections(current)?;

    let previous_probability = calculate_probability_at_line(&old, line, side);
    let current_probability = calculate_probability_at_line(&new, line, side);
    let probability_shift = (current_probability - previous_probability).abs();

    let mean_shift = if old.weighted_mean.abs() > f64::EPSILON {
        ((new.weighted_mean - old.weighted_mean) / old.weighted_mean).abs()
    } else {
        0.0
    };

    let cause = if current.len() > previous.len() {
        ChangeCause::NewSourceAdded
    } else if mean_shift > MEAN_SHIFT_THRESHOLD {
        ChangeCause::TrendDetected
    } else {
        ChangeCause::RoutineUpdate
    };

    Ok(ProjectionChange {
        significant: probability_shift >= threshold || mean_shift > MEAN_SHIFT_THRESHOLD,
        previous_probability,
        current_probability,
        probability_shift,
        mean_shift,
        cause,
    })
}
