//! Core value objects for the probability and correlation engine.
//!
//! Everything here is an in-memory value: legs are immutable once
//! constructed, projection sources are combined but never mutated, and
//! all result types are pure functions of their inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod market_kind;

pub use market_kind::MarketKind;

/// Sports covered by the engine and the historical correlation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    NBA,
    NFL,
    MLB,
    NHL,
    NCAAB,
    NCAAF,
    Soccer,
}

/// Which side of the line a wager is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Over,
    Under,
}

impl Side {
    pub fn flipped(&self) -> Self {
        match self {
            Self::Over => Self::Under,
            Self::Under => Self::Over,
        }
    }
}

/// Contextual factors applied as bounded multiplicative adjustments to a
/// leg's base expectation. All fields optional; absent factors are neutral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFactors {
    /// Days of rest before the game
    pub rest_days: Option<u8>,
    /// Travel distance in miles
    pub travel_miles: Option<f64>,
    /// Playing at home
    pub is_home: Option<bool>,
    /// Venue altitude in feet
    pub altitude_feet: Option<f64>,
    /// Wind speed in mph (outdoor markets)
    pub wind_mph: Option<f64>,
    /// Injury discount in [0, 1]; 0.05 means a 5% reduction
    pub injury_impact: Option<f64>,
    /// Recent form ratio (recent average / season average)
    pub recent_form: Option<f64>,
    /// Opponent defensive rating relative to league average (1.0 = average)
    pub opponent_defense_rating: Option<f64>,
    /// Game pace relative to league average (1.0 = average)
    pub pace_factor: Option<f64>,
}

/// A single wager within a parlay. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegInput {
    pub market: MarketKind,
    /// Player name for props, team name for game-level markets
    pub subject: String,
    /// Team the subject belongs to, when known
    pub team: Option<String>,
    pub line: f64,
    pub side: Side,
    /// Quoted American odds (e.g. -110, +145)
    pub odds: i32,
    /// Externally modeled expectation; derived from odds/line when absent
    pub expected_value: Option<f64>,
    pub game_id: String,
    pub sport: Sport,
    pub context: Option<ContextFactors>,
}

impl LegInput {
    pub fn new(
        market: MarketKind,
        subject: impl Into<String>,
        line: f64,
        side: Side,
        odds: i32,
        game_id: impl Into<String>,
        sport: Sport,
    ) -> Self {
        Self {
            market,
            subject: subject.into(),
            team: None,
            line,
            side,
            odds,
            expected_value: None,
            game_id: game_id.into(),
            sport,
            context: None,
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_expected_value(mut self, expected: f64) -> Self {
        self.expected_value = Some(expected);
        self
    }

    pub fn with_context(mut self, context: ContextFactors) -> Self {
        self.context = Some(context);
        self
    }
}

/// One estimate of an expected statistic value from a named origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSource {
    pub source: String,
    pub value: f64,
    /// Source confidence in [0, 1]
    pub confidence: f64,
    /// Games/observations behind this estimate
    pub sample_size: u32,
    /// Recency weight in [0, 1]; 1.0 = freshest
    pub recency: f64,
    pub fetched_at: DateTime<Utc>,
}

impl ProjectionSource {
    pub fn new(
        source: impl Into<String>,
        value: f64,
        confidence: f64,
        sample_size: u32,
        recency: f64,
    ) -> Self {
        Self {
            source: source.into(),
            value,
            confidence,
            sample_size,
            recency,
            fetched_at: Utc::now(),
        }
    }
}

/// Distribution family chosen for a projection or prop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Poisson,
    Normal,
}

/// Merged view over several weighted projection sources.
///
/// Derived, never stored: recomputed whenever the source set changes.
/// The standard deviation is floored at 15% of the weighted mean so a
/// cluster of agreeing sources cannot produce degenerate overconfidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedProjection {
    /// Simple unweighted mean (diagnostic)
    pub mean: f64,
    /// Unweighted median (diagnostic)
    pub median: f64,
    /// Sample-size/confidence/recency-weighted mean
    pub weighted_mean: f64,
    /// Weighted standard deviation, floored at 15% of the weighted mean
    pub weighted_std_dev: f64,
    /// Overall confidence in [0, 1]
    pub confidence: f64,
    pub distribution: DistributionKind,
    pub source_count: usize,
}

/// Per-leg screening verdict from the fast pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningRecommendation {
    StrongPick,
    Consider,
    Neutral,
    Avoid,
}

/// Result of the cheap parametric pre-filter (no simulation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    /// Expectation after contextual adjustments
    pub adjusted_expected: f64,
    pub probability: f64,
    /// Probability minus the probability implied by the quoted odds
    pub edge: f64,
    pub confidence: f64,
    pub distribution: DistributionKind,
    pub recommendation: ScreeningRecommendation,
}

/// Per-leg verdict out of the hybrid simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSimulationResult {
    pub market: MarketKind,
    pub subject: String,
    /// Closed-form probability from the parametric model
    pub parametric_probability: f64,
    /// Empirical hit rate under correlated simulation
    pub simulated_hit_rate: f64,
    /// Linear blend of the two by the configured weights
    pub hybrid_probability: f64,
    /// Simulated minus parametric: how much correlation moved this leg
    pub correlation_impact: f64,
    /// Probability implied by the quoted odds
    pub implied_probability: f64,
    pub edge: f64,
    pub recommendation: ScreeningRecommendation,
}

/// Parlay-level recommendation tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParlayRecommendation {
    StrongBet,
    ValueBet,
    Skip,
    Fade,
}

/// Parlay-level output of the hybrid Monte Carlo simulator.
///
/// Pure function of its inputs; no hidden state. The hybrid win rate
/// blends the independent and correlated parlay win rates directly with
/// the configured weights; it is not recomputed from the blended leg
/// probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridSimulationResult {
    /// Empirical parlay win rate assuming independent legs
    pub independent_win_rate: f64,
    /// Empirical parlay win rate under the correlation model
    pub correlated_win_rate: f64,
    /// Weighted blend of the two win rates
    pub hybrid_win_rate: f64,
    /// Product of per-leg decimal odds
    pub total_decimal_odds: f64,
    /// Expected value per unit stake
    pub expected_value: f64,
    /// p(1-p)(odds-1)^2
    pub variance: f64,
    /// EV / stddev, zero when stddev is zero
    pub sharpe_ratio: f64,
    /// Kelly-criterion stake fraction, clamped at zero
    pub kelly_fraction: f64,
    /// Hybrid win rate minus the parlay's implied probability
    pub edge: f64,
    /// Confidence level: grows with iterations, shrinks with variance
    pub confidence: f64,
    pub iterations: u32,
    /// True when Cholesky factorization had to floor a diagonal term
    pub correlation_regularized: bool,
    pub recommendation: ParlayRecommendation,
    pub legs: Vec<LegSimulationResult>,
}

impl HybridSimulationResult {
    /// Neutral result for an empty parlay or a zero-iteration request.
    pub fn neutral() -> Self {
        Self {
            independent_win_rate: 0.0,
            correlated_win_rate: 0.0,
            hybrid_win_rate: 0.0,
            total_decimal_odds: 0.0,
            expected_value: 0.0,
            variance: 0.0,
            sharpe_ratio: 0.0,
            kelly_fraction: 0.0,
            edge: 0.0,
            confidence: 0.0,
            iterations: 0,
            correlation_regularized: false,
            recommendation: ParlayRecommendation::Skip,
            legs: Vec::new(),
        }
    }
}

/// Action suggested for a leg's line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineAction {
    Adjust,
    Skip,
    Keep,
}

/// A suggested alternative line for a target win probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecommendation {
    pub current_line: f64,
    pub suggested_line: f64,
    pub current_probability: f64,
    pub target_probability: f64,
    /// Probability at the suggested line minus probability at the current line
    pub probability_gain: f64,
    /// Approximate American-odds impact of the move (linear proxy, not a vig model)
    pub odds_impact: String,
    pub action: LineAction,
}
