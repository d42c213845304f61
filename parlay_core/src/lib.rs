//! Parlay Core - probability and correlation engine for multi-leg bets.
//!
//! This crate provides:
//! - Parametric single-leg probability models (Poisson/Normal) with
//!   contextual adjustments and a fast screening pre-filter
//! - Leg-pair correlation estimation with a Cholesky-factored matrix
//! - A hybrid Monte Carlo simulator blending parametric and correlated
//!   simulated estimates into edge, variance, Kelly, and a recommendation
//! - Multi-source projection aggregation and inverse line solving
//! - Batch processing via rayon with seedable, reproducible RNG
//!
//! The engine is a pure library: no I/O, no persistence, no market data
//! fetching. Callers assemble `LegInput` values upstream and consume the
//! in-memory result objects downstream.

pub mod correlation;
pub mod distributions;
pub mod models;
pub mod odds;
pub mod projection;
pub mod prop_model;
pub mod simulation;

pub use correlation::{
    build_correlation_matrix, cholesky_decomposition, classify_leg_pair,
    generate_correlated_uniforms, lookup_correlation, CholeskyFactor, CorrelationConfidence,
    CorrelationData, CorrelationKind, CorrelationMatrix, CorrelationRecord, PairCorrelation,
};
pub use distributions::{inverse_normal_cdf, normal_cdf, normal_cdf_with_params, poisson_cdf, poisson_pmf};
pub use models::*;
pub use odds::{american_to_decimal, american_to_implied, expected_value, implied_to_american};
pub use projection::{
    aggregate_projections, calculate_probability_at_line, detect_projection_change,
    find_optimal_line, generate_line_recommendation, optimize_parlay, ChangeCause,
    ParlayLegPlan, ParlayOptimization, ProjectionChange,
};
pub use prop_model::{
    apply_contextual_adjustments, calculate_prop_probability, normal_over_under,
    poisson_over_under, screen_prop_candidate, screen_prop_candidates, PropProbability,
    FAIR_ODDS_BASELINE,
};
pub use simulation::{quick_hybrid_analysis, run_hybrid_simulation, SimulationConfig};
