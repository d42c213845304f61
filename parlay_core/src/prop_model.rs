//! Single-leg probability models for player props and game markets.
//!
//! Selects between Poisson and Normal distributions per market, applies
//! bounded contextual adjustments to the expectation, and provides a fast
//! screening pre-filter so low-value candidates can be discarded before
//! any Monte Carlo work.

use crate::distributions::{normal_cdf_with_params, poisson_cdf};
use crate::models::{
    ContextFactors, DistributionKind, LegInput, MarketKind, ScreeningRecommendation,
    ScreeningResult, Side,
};
use crate::odds::american_to_implied;
use anyhow::{anyhow, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Break-even probability at standard -110 juice. Edges are quoted
/// against this baseline.
pub const FAIR_ODDS_BASELINE: f64 = 0.524;

/// Probability threshold below which a market expectation is modeled as
/// Poisson regardless of market kind.
const POISSON_EXPECTATION_CUTOFF: f64 = 10.0;

/// Reported probabilities are clamped into this range so downstream odds
/// conversions never divide by zero.
pub const PROB_FLOOR: f64 = 0.01;
pub const PROB_CEIL: f64 = 0.99;

/// Parametric probability for a single leg, with its edge against the
/// fair-odds baseline and a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropProbability {
    pub probability: f64,
    /// Probability minus the 52.4% fair-odds baseline
    pub edge: f64,
    /// clamp(0.5 + 2|edge|, 0.3, 0.95)
    pub confidence: f64,
    pub distribution: DistributionKind,
}

/// Over/under probability under a Poisson model.
///
/// Half-point lines floor to the next integer. On whole-number lines the
/// push outcome is excluded from both sides: "over" is P(X > line) and
/// "under" is P(X <= line - 1), matching sportsbook push conventions.
pub fn poisson_over_under(expected: f64, line: f64, side: Side) -> f64 {
    let floored = line.floor();
    let is_integer_line = (line - floored).abs() < f64::EPSILON;
    match side {
        Side::Over => 1.0 - poisson_cdf(expected, floored),
        Side::Under => {
            if is_integer_line {
                poisson_cdf(expected, line - 1.0)
            } else {
                poisson_cdf(expected, floored)
            }
        }
    }
}

/// Over/under probability under a Normal model via z-score transform.
pub fn normal_over_under(expected: f64, sd: f64, line: f64, side: Side) -> f64 {
    let under = normal_cdf_with_params(line, expected, sd);
    match side {
        Side::Over => 1.0 - under,
        Side::Under => under,
    }
}

/// Parametric over/under probability for a market.
///
/// Poisson is used for known low-count discrete markets and whenever the
/// expectation is below 10; Normal otherwise, with a default standard
/// deviation of `expected * sd_multiplier` from the per-market table.
///
/// An explicitly supplied non-positive standard deviation is rejected:
/// that is caller error, not something to degrade through.
pub fn calculate_prop_probability(
    market: MarketKind,
    expected: f64,
    line: f64,
    side: Side,
    custom_sd: Option<f64>,
) -> Result<PropProbability> {
    if let Some(sd) = custom_sd {
        if sd <= 0.0 {
            return Err(anyhow!(
                "custom standard deviation must be positive, got {}",
                sd
            ));
        }
    }

    let use_poisson = market.is_low_count_discrete() || expected < POISSON_EXPECTATION_CUTOFF;

    let (raw, distribution) = if use_poisson {
        (
            poisson_over_under(expected, line, side),
            DistributionKind::Poisson,
        )
    } else {
        let sd = custom_sd.unwrap_or(expected * market.sd_multiplier());
        (
            normal_over_under(expected, sd, line, side),
            DistributionKind::Normal,
        )
    };

    let probability = raw.clamp(PROB_FLOOR, PROB_CEIL);
    let edge = probability - FAIR_ODDS_BASELINE;
    let confidence = (0.5 + 2.0 * edge.abs()).clamp(0.3, 0.95);

    Ok(PropProbability {
        probability,
        edge,
        confidence,
        distribution,
    })
}

/// Apply contextual multiplicative adjustments to a base expectation.
///
/// Each factor contributes an independent bounded multiplier (roughly
/// within +/-10%), composed multiplicatively so the order of application
/// cannot matter.
pub fn apply_contextual_adjustments(base_expected: f64, factors: &ContextFactors) -> f64 {
    let mut multiplier = 1.0;

    if let Some(rest) = factors.rest_days {
        multiplier *= match rest {
            0 => 0.96, // back-to-back fatigue
            1 => 0.98,
            2 => 1.0,
            _ => 1.02,
        };
    }

    if let Some(miles) = factors.travel_miles {
        multiplier *= if miles > 2000.0 {
            0.97
        } else if miles > 1000.0 {
            0.985
        } else {
            1.0
        };
    }

    if let Some(is_home) = factors.is_home {
        multiplier *= if is_home { 1.03 } else { 0.98 };
    }

    if let Some(altitude) = factors.altitude_feet {
        if altitude > 4000.0 {
            multiplier *= 0.98;
        }
    }

    if let Some(wind) = factors.wind_mph {
        multiplier *= if wind > 15.0 {
            0.95
        } else if wind > 8.0 {
            0.98
        } else {
            1.0
        };
    }

    if let Some(injury) = factors.injury_impact {
        multiplier *= 1.0 - injury.clamp(0.0, 0.10);
    }

    if let Some(form) = factors.recent_form {
        // form is recent/season ratio; move a third of the way toward it
        multiplier *= (1.0 + (form - 1.0) / 3.0).clamp(0.92, 1.08);
    }

    if let Some(def) = factors.opponent_defense_rating {
        // above-average defense (rating > 1.0) suppresses the stat
        multiplier *= (1.0 + (1.0 - def) * 0.5).clamp(0.90, 1.10);
    }

    if let Some(pace) = factors.pace_factor {
        multiplier *= (1.0 + (pace - 1.0) * 0.5).clamp(0.92, 1.08);
    }

    base_expected * multiplier
}

/// Estimate a leg's expectation from its quoted market when the caller
/// supplies none.
///
/// Juice-direction heuristic: if the quoted side is priced past the fair
/// baseline, the book leans that way, so shift the line proportionally.
/// A linear proxy, not a vig model.
pub fn derive_expected_from_market(line: f64, side: Side, odds: i32) -> f64 {
    let implied = american_to_implied(odds);
    let lean = ((implied - FAIR_ODDS_BASELINE) * 0.2).clamp(-0.08, 0.08);
    match side {
        Side::Over => line * (1.0 + lean),
        Side::Under => line * (1.0 - lean),
    }
}

/// Fast pre-filter for a single candidate leg. No simulation runs here;
/// the point is to cheaply discard low-value candidates.
pub fn screen_prop_candidate(leg: &LegInput, min_edge: f64) -> Result<ScreeningResult> {
    let base_expected = leg
        .expected_value
        .unwrap_or_else(|| derive_expected_from_market(leg.line, leg.side, leg.odds));

    let adjusted_expected = match &leg.context {
        Some(factors) => apply_contextual_adjustments(base_expected, factors),
        None => base_expected,
    };

    let prop = calculate_prop_probability(leg.market, adjusted_expected, leg.line, leg.side, None)?;
    let implied = american_to_implied(leg.odds);
    let edge = prop.probability - implied;

    let recommendation = if edge >= 2.0 * min_edge && prop.probability >= 0.55 {
        ScreeningRecommendation::StrongPick
    } else if edge >= min_edge {
        ScreeningRecommendation::Consider
    } else if edge <= -min_edge {
        ScreeningRecommendation::Avoid
    } else {
        ScreeningRecommendation::Neutral
    };

    Ok(ScreeningResult {
        adjusted_expected,
        probability: prop.probability,
        edge,
        confidence: prop.confidence,
        distribution: prop.distribution,
        recommendation,
    })
}

/// Screen a batch of candidates in parallel.
pub fn screen_prop_candidates(legs: &[LegInput], min_edge: f64) -> Result<Vec<ScreeningResult>> {
    legs.par_iter()
        .map(|leg| screen_prop_candidate(leg, min_edge))
        .collect()
}
