//! Hybrid Monte Carlo parlay simulator.
//!
//! Blends closed-form parametric probabilities with correlated Monte
//! Carlo estimates. Iterations run in rayon batches with per-batch
//! seeded RNGs; partial win counts reduce with an associative sum, so a
//! fixed seed gives a reproducible result regardless of scheduling.

use crate::correlation::{
    build_correlation_matrix, cholesky_decomposition, generate_correlated_uniforms,
    CholeskyFactor, CorrelationData, CorrelationMatrix,
};
use crate::models::{
    HybridSimulationResult, LegInput, LegSimulationResult, ParlayRecommendation,
    ScreeningRecommendation,
};
use crate::odds::{american_to_decimal, american_to_implied};
use crate::prop_model::{
    apply_contextual_adjustments, calculate_prop_probability, derive_expected_from_market,
    PROB_CEIL, PROB_FLOOR,
};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Iterations per rayon work unit.
const BATCH_SIZE: u32 = 2048;

/// Reference iteration count: confidence saturates here.
const FULL_CONFIDENCE_ITERATIONS: f64 = 50_000.0;

/// Flat correlation bonus applied by the quick (no-simulation) path when
/// any two legs share a game.
const QUICK_SAME_GAME_BONUS: f64 = 1.05;

/// Simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub iterations: u32,
    pub use_correlations: bool,
    /// Weight on the parametric estimate in both blends
    pub parametric_weight: f64,
    /// Weight on the Monte Carlo estimate in both blends
    pub monte_carlo_weight: f64,
    /// Minimum per-leg edge for a Consider verdict
    pub min_edge: f64,
    /// Fixed seed for reproducible runs; None draws one from OS entropy
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 50_000,
            use_correlations: true,
            parametric_weight: 0.4,
            monte_carlo_weight: 0.6,
            min_edge: 0.03,
            seed: None,
        }
    }
}

/// Per-batch accumulator. Reduction is a plain component-wise sum, so
/// batch order cannot affect the totals.
struct BatchCounts {
    independent_wins: u64,
    correlated_wins: u64,
    leg_hits: Vec<u64>,
}

impl BatchCounts {
    fn zero(n_legs: usize) -> Self {
        Self {
            independent_wins: 0,
            correlated_wins: 0,
            leg_hits: vec![0; n_legs],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.independent_wins += other.independent_wins;
        self.correlated_wins += other.correlated_wins;
        for (a, b) in self.leg_hits.iter_mut().zip(other.leg_hits) {
            *a += b;
        }
        self
    }
}

/// Run one batch of iterations with its own seeded RNG.
fn run_batch(
    probs: &[f64],
    factor: &CholeskyFactor,
    iterations: u32,
    seed: u64,
) -> BatchCounts {
    let n = probs.len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = BatchCounts::zero(n);

    for _ in 0..iterations {
        let correlated = generate_correlated_uniforms(factor, &mut rng);
        let mut all_correlated_hit = true;
        for (i, &p) in probs.iter().enumerate() {
            if correlated[i] <= p {
                counts.leg_hits[i] += 1;
            } else {
                all_correlated_hit = false;
            }
        }
        if all_correlated_hit {
            counts.correlated_wins += 1;
        }

        let mut all_independent_hit = true;
        for &p in probs {
            let u: f64 = rng.gen();
            if u > p {
                all_independent_hit = false;
                // Remaining independent draws for this iteration are
                // irrelevant to the all-legs-hit check.
                break;
            }
        }
        if all_independent_hit {
            counts.independent_wins += 1;
        }
    }

    counts
}

/// Estimate each leg's parametric probability after contextual
/// adjustment, deriving the expectation from the quoted market when the
/// caller supplies none.
fn leg_parametric_probabilities(legs: &[LegInput]) -> Result<Vec<f64>> {
    legs.iter()
        .map(|leg| {
            let base = leg
                .expected_value
                .unwrap_or_else(|| derive_expected_from_market(leg.line, leg.side, leg.odds));
            let adjusted = match &leg.context {
                Some(factors) => apply_contextual_adjustments(base, factors),
                None => base,
            };
            let prop =
                calculate_prop_probability(leg.market, adjusted, leg.line, leg.side, None)?;
            Ok(prop.probability)
        })
        .collect()
}

/// Per-leg verdict from a blended probability and the quoted odds.
fn leg_recommendation(edge: f64, probability: f64, min_edge: f64) -> ScreeningRecommendation {
    if edge >= 2.0 * min_edge && probability >= 0.55 {
        ScreeningRecommendation::StrongPick
    } else if edge >= min_edge {
        ScreeningRecommendation::Consider
    } else if edge <= -min_edge {
        ScreeningRecommendation::Avoid
    } else {
        ScreeningRecommendation::Neutral
    }
}

/// Parlay recommendation from edge and confidence.
fn parlay_recommendation(edge: f64, confidence: f64) -> ParlayRecommendation {
    if edge >= 0.08 && confidence >= 0.7 {
        ParlayRecommendation::StrongBet
    } else if edge >= 0.03 {
        ParlayRecommendation::ValueBet
    } else if edge <= -0.05 {
        ParlayRecommendation::Fade
    } else {
        ParlayRecommendation::Skip
    }
}

/// Confidence level: grows with iteration count, shrinks with variance.
fn confidence_level(iterations: u32, variance: f64) -> f64 {
    let depth = (iterations as f64 / FULL_CONFIDENCE_ITERATIONS).min(1.0);
    ((0.55 + 0.35 * depth) / (1.0 + variance)).clamp(0.1, 0.95)
}

/// Fill in the parlay-level risk metrics shared by the full and quick paths.
fn derive_parlay_metrics(result: &mut HybridSimulationResult, legs: &[LegInput]) {
    let p = result.hybrid_win_rate;
    let total_decimal: f64 = legs.iter().map(|l| american_to_decimal(l.odds)).product();
    let b = total_decimal - 1.0;
    let implied = 1.0 / total_decimal;

    result.total_decimal_odds = total_decimal;
    result.expected_value = p * b - (1.0 - p);
    result.variance = p * (1.0 - p) * b * b;
    result.sharpe_ratio = if result.variance > 0.0 {
        result.expected_value / result.variance.sqrt()
    } else {
        0.0
    };
    result.kelly_fraction = ((b * p - (1.0 - p)) / b).max(0.0);
    result.edge = p - implied;
    result.confidence = confidence_level(result.iterations, result.variance);
    result.recommendation = parlay_recommendation(result.edge, result.confidence);
}

/// Run the hybrid Monte Carlo simulation for a parlay.
///
/// Leg-level and parlay-level blending are computed
/// independently: each leg blends its parametric probability with its
/// simulated hit rate, while the parlay blends the independent and
/// correlated win rates directly. The parlay figure is never recomputed
/// from the blended leg probabilities.
pub fn run_hybrid_simulation(
    legs: &[LegInput],
    config: &SimulationConfig,
    data: Option<&CorrelationData>,
) -> Result<HybridSimulationResult> {
    if legs.is_empty() || config.iterations == 0 {
        return Ok(HybridSimulationResult::neutral());
    }

    let n = legs.len();
    let probs = leg_parametric_probabilities(legs)?;

    let matrix = if config.use_correlations && n > 1 {
        build_correlation_matrix(legs, data)
    } else {
        CorrelationMatrix::identity(n)
    };
    let factor = cholesky_decomposition(&matrix);

    let master_seed = config.seed.unwrap_or_else(rand::random);
    debug!(
        "hybrid simulation: {} legs, {} iterations, seed {}",
        n, config.iterations, master_seed
    );

    let full_batches = config.iterations / BATCH_SIZE;
    let remainder = config.iterations % BATCH_SIZE;
    let mut batch_sizes: Vec<u32> = vec![BATCH_SIZE; full_batches as usize];
    if remainder > 0 {
        batch_sizes.push(remainder);
    }

    let totals = batch_sizes
        .par_iter()
        .enumerate()
        .map(|(b, &size)| run_batch(&probs, &factor, size, master_seed.wrapping_add(b as u64)))
        .reduce(|| BatchCounts::zero(n), BatchCounts::merge);

    let iters = config.iterations as f64;
    let independent_win_rate = totals.independent_wins as f64 / iters;
    let correlated_win_rate = totals.correlated_wins as f64 / iters;

    let pw = config.parametric_weight;
    let mw = config.monte_carlo_weight;

    let leg_results: Vec<LegSimulationResult> = legs
        .iter()
        .enumerate()
        .map(|(i, leg)| {
            let parametric = probs[i];
            let simulated = totals.leg_hits[i] as f64 / iters;
            let hybrid = (pw * parametric + mw * simulated).clamp(PROB_FLOOR, PROB_CEIL);
            let implied = american_to_implied(leg.odds);
            let edge = hybrid - implied;
            LegSimulationResult {
                market: leg.market,
                subject: leg.subject.clone(),
                parametric_probability: parametric,
                simulated_hit_rate: simulated,
                hybrid_probability: hybrid,
                correlation_impact: simulated - parametric,
                implied_probability: implied,
                edge,
                recommendation: leg_recommendation(edge, hybrid, config.min_edge),
            }
        })
        .collect();

    let hybrid_win_rate =
        (pw * independent_win_rate + mw * correlated_win_rate).clamp(PROB_FLOOR, PROB_CEIL);

    let mut result = HybridSimulationResult {
        independent_win_rate,
        correlated_win_rate,
        hybrid_win_rate,
        iterations: config.iterations,
        correlation_regularized: factor.regularized,
        legs: leg_results,
        ..HybridSimulationResult::neutral()
    };
    derive_parlay_metrics(&mut result, legs);

    Ok(result)
}

/// Low-latency approximation that skips Monte Carlo entirely.
///
/// Multiplies the parametric leg probabilities and applies a flat +5%
/// bonus when any two legs share a game, instead of simulating the
/// dependence. Coarser than the full simulation; meant for paths where
/// latency matters more than precision.
pub fn quick_hybrid_analysis(
    legs: &[LegInput],
    config: &SimulationConfig,
) -> Result<HybridSimulationResult> {
    if legs.is_empty() {
        return Ok(HybridSimulationResult::neutral());
    }

    let probs = leg_parametric_probabilities(legs)?;
    let independent: f64 = probs.iter().product();

    let any_same_game = legs
        .iter()
        .enumerate()
        .any(|(i, a)| legs[i + 1..].iter().any(|b| a.game_id == b.game_id));
    let correlated = if config.use_correlations && any_same_game {
        independent * QUICK_SAME_GAME_BONUS
    } else {
        independent
    };
    let hybrid = correlated.clamp(PROB_FLOOR, PROB_CEIL);

    let leg_results: Vec<LegSimulationResult> = legs
        .iter()
        .zip(&probs)
        .map(|(leg, &parametric)| {
            let implied = american_to_implied(leg.odds);
            let edge = parametric - implied;
            LegSimulationResult {
                market: leg.market,
                subject: leg.subject.clone(),
                parametric_probability: parametric,
                simulated_hit_rate: parametric,
                hybrid_probability: parametric,
                correlation_impact: 0.0,
                implied_probability: implied,
                edge,
                recommendation: leg_recommendation(edge, parametric, config.min_edge),
            }
        })
        .collect();

    let mut result = HybridSimulationResult {
        independent_win_rate: independent.clamp(PROB_FLOOR, PROB_CEIL),
        correlated_win_rate: hybrid,
        hybrid_win_rate: hybrid,
        iterations: 0,
        correlation_regularized: false,
        legs: leg_results,
        ..HybridSimulationResult::neutral()
    };
    derive_parlay_metrics(&mut result, legs);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketKind, Side, Sport};

    fn make_leg(
        subject: &str,
        market: MarketKind,
        line: f64,
        expected: f64,
        game_id: &str,
    ) -> LegInput {
        LegInput::new(market, subject, line, Side::Over, -110, game_id, Sport::NBA)
            .with_expected_value(expected)
    }

    fn seeded_config(seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_parlay_is_neutral_skip() {
        let result = run_hybrid_simulation(&[], &SimulationConfig::default(), None).unwrap();
        assert_eq!(result.recommendation, ParlayRecommendation::Skip);
        assert_eq!(result.hybrid_win_rate, 0.0);
        assert_eq!(result.expected_value, 0.0);
        assert!(result.legs.is_empty());
    }

    #[test]
    fn test_zero_iterations_is_neutral() {
        let legs = vec![make_leg("A", MarketKind::Points, 22.5, 25.0, "G1")];
        let config = SimulationConfig {
            iterations: 0,
            ..Default::default()
        };
        let result = run_hybrid_simulation(&legs, &config, None).unwrap();
        assert_eq!(result.recommendation, ParlayRecommendation::Skip);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_independent_win_rate_converges() {
        // Two legs in different games, correlation disabled: the simulated
        // independent win rate must converge to the product of the
        // parametric probabilities (law of large numbers at 50k iters).
        let legs = vec![
            make_leg("Player A", MarketKind::Points, 22.5, 24.5, "G1"),
            make_leg("Player B", MarketKind::Rebounds, 10.5, 10.5, "G2"),
        ];
        let probs = leg_parametric_probabilities(&legs).unwrap();
        let expected_joint: f64 = probs.iter().product();

        let config = SimulationConfig {
            use_correlations: false,
            seed: Some(1234),
            ..Default::default()
        };
        let result = run_hybrid_simulation(&legs, &config, None).unwrap();
        assert!(
            (result.independent_win_rate - expected_joint).abs() < 0.01,
            "independent rate {:.4} should be within 0.01 of {:.4}",
            result.independent_win_rate,
            expected_joint
        );
        // Correlation disabled: both models sample the same identity factor
        assert!(
            (result.correlated_win_rate - expected_joint).abs() < 0.01,
            "correlated rate should match under independence: {:.4} vs {:.4}",
            result.correlated_win_rate,
            expected_joint
        );
    }

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let legs = vec![
            make_leg("Player A", MarketKind::Points, 22.5, 25.0, "G1"),
            make_leg("Player B", MarketKind::Assists, 6.5, 7.0, "G1"),
        ];
        let a = run_hybrid_simulation(&legs, &seeded_config(7), None).unwrap();
        let b = run_hybrid_simulation(&legs, &seeded_config(7), None).unwrap();
        assert_eq!(a, b, "same seed must reproduce the same result");

        let c = run_hybrid_simulation(&legs, &seeded_config(8), None).unwrap();
        assert_ne!(
            a.correlated_win_rate, c.correlated_win_rate,
            "different seeds should differ"
        );
    }

    #[test]
    fn test_positive_correlation_lifts_joint_rate() {
        // Same player over two markets: strongly positively correlated, so
        // the correlated joint win rate should beat independence.
        let legs = vec![
            make_leg("Nikola Jokic", MarketKind::Points, 24.5, 26.0, "G1"),
            make_leg("Nikola Jokic", MarketKind::Assists, 7.5, 8.2, "G1"),
        ];
        let result = run_hybrid_simulation(&legs, &seeded_config(99), None).unwrap();
        assert!(
            result.correlated_win_rate > result.independent_win_rate,
            "positive correlation should lift the joint rate: {:.4} vs {:.4}",
            result.correlated_win_rate,
            result.independent_win_rate
        );
        // The per-leg correlation impact is reported, not hidden
        for leg in &result.legs {
            assert!(leg.correlation_impact.is_finite());
        }
    }

    #[test]
    fn test_parlay_blend_uses_win_rates_not_leg_probs() {
        let legs = vec![
            make_leg("Player A", MarketKind::Points, 22.5, 25.0, "G1"),
            make_leg("Player B", MarketKind::Rebounds, 9.5, 10.5, "G1"),
        ];
        let config = seeded_config(5);
        let result = run_hybrid_simulation(&legs, &config, None).unwrap();

        let expected_blend = (config.parametric_weight * result.independent_win_rate
            + config.monte_carlo_weight * result.correlated_win_rate)
            .clamp(PROB_FLOOR, PROB_CEIL);
        assert!(
            (result.hybrid_win_rate - expected_blend).abs() < 1e-12,
            "parlay hybrid must blend the win rates directly"
        );

        // And explicitly NOT equal the product of blended leg probabilities
        let leg_product: f64 = result.legs.iter().map(|l| l.hybrid_probability).product();
        assert!(
            (result.hybrid_win_rate - leg_product).abs() > 1e-6,
            "parlay blend should not be recomputed from leg blends"
        );
    }

    #[test]
    fn test_risk_metrics_consistent() {
        let legs = vec![
            make_leg("Player A", MarketKind::Points, 22.5, 26.0, "G1"),
            make_leg("Player B", MarketKind::Rebounds, 9.5, 11.0, "G2"),
        ];
        let result = run_hybrid_simulation(&legs, &seeded_config(3), None).unwrap();

        let p = result.hybrid_win_rate;
        let b = result.total_decimal_odds - 1.0;
        assert!((result.expected_value - (p * b - (1.0 - p))).abs() < 1e-12);
        assert!((result.variance - p * (1.0 - p) * b * b).abs() < 1e-12);
        assert!(result.kelly_fraction >= 0.0);
        assert!(result.confidence >= 0.1 && result.confidence <= 0.95);
        // -110 both legs: total decimal odds ~ 3.64
        assert!((result.total_decimal_odds - 3.645).abs() < 0.01);
    }

    #[test]
    fn test_negative_edge_parlay_fades() {
        // Expectations far below the lines: both legs are bad overs
        let legs = vec![
            make_leg("Player A", MarketKind::Points, 30.5, 22.0, "G1"),
            make_leg("Player B", MarketKind::Rebounds, 14.5, 9.0, "G2"),
        ];
        let result = run_hybrid_simulation(&legs, &seeded_config(11), None).unwrap();
        assert!(result.edge < 0.0);
        assert_eq!(result.recommendation, ParlayRecommendation::Fade);
        for leg in &result.legs {
            assert_eq!(leg.recommendation, ScreeningRecommendation::Avoid);
        }
    }

    #[test]
    fn test_strong_edge_parlay_recommended() {
        // Expectations comfortably above the lines
        let legs = vec![
            make_leg("Player A", MarketKind::Points, 20.5, 27.0, "G1"),
            make_leg("Player B", MarketKind::PassingYards, 230.5, 285.0, "G2"),
        ];
        let result = run_hybrid_simulation(&legs, &seeded_config(21), None).unwrap();
        assert!(result.edge > 0.03, "edge should be positive: {:.4}", result.edge);
        assert!(matches!(
            result.recommendation,
            ParlayRecommendation::ValueBet | ParlayRecommendation::StrongBet
        ));
        assert!(result.kelly_fraction > 0.0);
    }

    #[test]
    fn test_single_leg_uses_identity() {
        let legs = vec![make_leg("Player A", MarketKind::Points, 22.5, 25.0, "G1")];
        let result = run_hybrid_simulation(&legs, &seeded_config(2), None).unwrap();
        // One leg: correlated and independent models coincide
        assert!(
            (result.correlated_win_rate - result.independent_win_rate).abs() < 0.01,
            "single leg should behave identically under both models"
        );
        assert!(!result.correlation_regularized);
    }

    #[test]
    fn test_quick_analysis_same_game_bonus() {
        let same_game = vec![
            make_leg("Player A", MarketKind::Points, 22.5, 24.0, "G1"),
            make_leg("Player B", MarketKind::Rebounds, 9.5, 10.0, "G1"),
        ];
        let cross_game = vec![
            make_leg("Player A", MarketKind::Points, 22.5, 24.0, "G1"),
            make_leg("Player B", MarketKind::Rebounds, 9.5, 10.0, "G2"),
        ];
        let config = SimulationConfig::default();
        let bonused = quick_hybrid_analysis(&same_game, &config).unwrap();
        let flat = quick_hybrid_analysis(&cross_game, &config).unwrap();

        assert!(
            bonused.hybrid_win_rate > flat.hybrid_win_rate,
            "same-game parlay should get the flat correlation bonus: {:.4} vs {:.4}",
            bonused.hybrid_win_rate,
            flat.hybrid_win_rate
        );
        let ratio = bonused.hybrid_win_rate / flat.hybrid_win_rate;
        assert!((ratio - QUICK_SAME_GAME_BONUS).abs() < 1e-9);
        assert_eq!(bonused.iterations, 0);
    }

    #[test]
    fn test_quick_analysis_empty_is_neutral() {
        let result = quick_hybrid_analysis(&[], &SimulationConfig::default()).unwrap();
        assert_eq!(result.recommendation, ParlayRecommendation::Skip);
    }
}
