//! Leg-pair correlation estimation and correlated sampling.
//!
//! Classifies leg pairs, looks up (or defaults) a correlation coefficient
//! per pair, assembles a symmetric correlation matrix, factors it via
//! Cholesky decomposition, and draws correlated uniforms through a
//! Gaussian copula for the Monte Carlo simulator.

use crate::distributions::normal_cdf;
use crate::models::{LegInput, MarketKind, Sport};
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Relationship between two legs, in strict classification precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    SamePlayer,
    SameGame,
    SameTeam,
    CrossGame,
}

impl CorrelationKind {
    /// Flat fallback coefficient when no pair-specific data exists.
    pub fn flat_default(&self) -> f64 {
        match self {
            Self::SamePlayer => 0.30,
            Self::SameGame => 0.20,
            Self::SameTeam => 0.15,
            Self::CrossGame => 0.05,
        }
    }
}

/// How well-supported a returned coefficient is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationConfidence {
    /// Historical coefficient with >= 100 samples
    High,
    /// Historical coefficient with >= 20 samples
    Medium,
    /// Literature default or flat per-type constant
    Estimated,
}

/// A pair coefficient with its provenance tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub coefficient: f64,
    pub kind: CorrelationKind,
    pub confidence: CorrelationConfidence,
}

/// One historical pair observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub coefficient: f64,
    pub sample_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CorrelationKey {
    sport: Sport,
    market_a: MarketKind,
    market_b: MarketKind,
    kind: CorrelationKind,
}

/// Read-only historical pair-correlation table. The estimator degrades
/// gracefully to defaults when a pair is missing.
#[derive(Debug, Clone, Default)]
pub struct CorrelationData {
    table: FxHashMap<CorrelationKey, CorrelationRecord>,
}

/// Normalize a market pair so lookups are order-symmetric.
fn normalize_pair(a: MarketKind, b: MarketKind) -> (MarketKind, MarketKind) {
    if a.type_name() <= b.type_name() {
        (a, b)
    } else {
        (b, a)
    }
}

impl CorrelationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        sport: Sport,
        market_a: MarketKind,
        market_b: MarketKind,
        kind: CorrelationKind,
        record: CorrelationRecord,
    ) {
        let (market_a, market_b) = normalize_pair(market_a, market_b);
        self.table.insert(
            CorrelationKey {
                sport,
                market_a,
                market_b,
                kind,
            },
            record,
        );
    }

    pub fn get(
        &self,
        sport: Sport,
        market_a: MarketKind,
        market_b: MarketKind,
        kind: CorrelationKind,
    ) -> Option<CorrelationRecord> {
        let (market_a, market_b) = normalize_pair(market_a, market_b);
        self.table
            .get(&CorrelationKey {
                sport,
                market_a,
                market_b,
                kind,
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Classify a leg pair. First matching rule wins:
/// same player > same game > same team > cross-game.
pub fn classify_leg_pair(a: &LegInput, b: &LegInput) -> CorrelationKind {
    if a.market.is_player_prop() && b.market.is_player_prop() && a.subject == b.subject {
        return CorrelationKind::SamePlayer;
    }
    if a.game_id == b.game_id {
        return CorrelationKind::SameGame;
    }
    if let (Some(team_a), Some(team_b)) = (&a.team, &b.team) {
        if team_a == team_b {
            return CorrelationKind::SameTeam;
        }
    }
    CorrelationKind::CrossGame
}

/// True when the unordered pair {a, b} equals the unordered pair {x, y}.
fn pair_is(a: MarketKind, b: MarketKind, x: MarketKind, y: MarketKind) -> bool {
    (a == x && b == y) || (a == y && b == x)
}

/// Literature-informed default coefficients for well-known market pairs.
fn default_pair_correlation(a: MarketKind, b: MarketKind, kind: CorrelationKind) -> Option<f64> {
    use MarketKind::*;
    match kind {
        CorrelationKind::SamePlayer => {
            if pair_is(a, b, Points, Assists) {
                Some(0.45)
            } else if pair_is(a, b, Points, Rebounds) {
                Some(0.40)
            } else if pair_is(a, b, Points, ThreePointers) {
                Some(0.55)
            } else if pair_is(a, b, Rebounds, Blocks) {
                Some(0.35)
            } else if pair_is(a, b, PassingYards, Touchdowns) {
                Some(0.50)
            } else if pair_is(a, b, RushingYards, Touchdowns) {
                Some(0.40)
            } else if pair_is(a, b, ReceivingYards, Receptions) {
                Some(0.65)
            } else if pair_is(a, b, Hits, TotalBases) {
                Some(0.60)
            } else if pair_is(a, b, Goals, Shots) {
                Some(0.45)
            } else {
                None
            }
        }
        CorrelationKind::SameGame => {
            if a == GameTotal || b == GameTotal {
                // Every counting stat rides the game's pace/total
                Some(0.30)
            } else if pair_is(a, b, Spread, Moneyline) {
                Some(0.70)
            } else {
                None
            }
        }
        CorrelationKind::SameTeam => {
            if pair_is(a, b, PassingYards, ReceivingYards) {
                // QB yards are his receivers' yards
                Some(0.55)
            } else if pair_is(a, b, Points, Assists) {
                Some(0.25)
            } else {
                None
            }
        }
        CorrelationKind::CrossGame => None,
    }
}

/// Look up the correlation coefficient for a market pair.
///
/// Preference order: historical data (with a sample-size confidence tag),
/// then the literature-default table, then the flat per-type constant.
/// Never errors; missing data degrades to defaults.
pub fn lookup_correlation(
    sport: Sport,
    market_a: MarketKind,
    market_b: MarketKind,
    kind: CorrelationKind,
    data: Option<&CorrelationData>,
) -> PairCorrelation {
    if let Some(record) = data.and_then(|d| d.get(sport, market_a, market_b, kind)) {
        let confidence = if record.sample_size >= 100 {
            CorrelationConfidence::High
        } else if record.sample_size >= 20 {
            CorrelationConfidence::Medium
        } else {
            CorrelationConfidence::Estimated
        };
        return PairCorrelation {
            coefficient: record.coefficient.clamp(-1.0, 1.0),
            kind,
            confidence,
        };
    }

    if let Some(coefficient) = default_pair_correlation(market_a, market_b, kind) {
        return PairCorrelation {
            coefficient,
            kind,
            confidence: CorrelationConfidence::Estimated,
        };
    }

    debug!(
        "no correlation data for {}/{} ({:?}), using flat default",
        market_a.type_name(),
        market_b.type_name(),
        kind
    );
    PairCorrelation {
        coefficient: kind.flat_default(),
        kind,
        confidence: CorrelationConfidence::Estimated,
    }
}

/// Symmetric n x n correlation matrix over a fixed leg ordering.
/// Diagonal is fixed at 1; off-diagonal entries live in [-1, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    n: usize,
    values: Vec<f64>,
}

impl CorrelationMatrix {
    /// Identity matrix: the independence model.
    pub fn identity(n: usize) -> Self {
        let mut m = Self {
            n,
            values: vec![0.0; n * n],
        };
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.n + j] = value;
    }
}

/// Build the pairwise correlation matrix for a set of legs.
///
/// O(n^2) fill; entries are written to both [i][j] and [j][i] so the
/// matrix is symmetric by construction, with a forced unit diagonal.
pub fn build_correlation_matrix(
    legs: &[LegInput],
    data: Option<&CorrelationData>,
) -> CorrelationMatrix {
    let n = legs.len();
    let mut matrix = CorrelationMatrix::identity(n);

    for i in 0..n {
        for j in (i + 1)..n {
            let kind = classify_leg_pair(&legs[i], &legs[j]);
            let pair = lookup_correlation(legs[i].sport, legs[i].market, legs[j].market, kind, data);
            let rho = pair.coefficient.clamp(-1.0, 1.0);
            matrix.set(i, j, rho);
            matrix.set(j, i, rho);
        }
    }

    matrix
}

/// Lower-triangular Cholesky factor of a correlation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    n: usize,
    lower: Vec<f64>,
    /// True when a non-positive diagonal term had to be floored
    pub regularized: bool,
}

impl CholeskyFactor {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.lower[i * self.n + j]
    }

    /// Apply the factor to a vector of independent draws: y = L x.
    pub fn apply(&self, x: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            for j in 0..=i {
                acc += self.lower[i * n + j] * x[j];
            }
            y[i] = acc;
        }
        y
    }
}

/// Standard lower-triangular Cholesky factorization.
///
/// Inconsistent pairwise correlations can make the input non-PSD; rather
/// than failing, a diagonal term that computes non-positive is substituted
/// with sqrt(max(0.001, d)). The substitution is a documented local
/// approximation: it is logged and surfaced on the returned factor.
pub fn cholesky_decomposition(matrix: &CorrelationMatrix) -> CholeskyFactor {
    let n = matrix.n();
    let mut lower = vec![0.0; n * n];
    let mut regularized = false;

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += lower[i * n + k] * lower[j * n + k];
            }

            if i == j {
                let d = matrix.get(i, i) - sum;
                if d <= 0.0 {
                    warn!(
                        "correlation matrix not positive semi-definite at diagonal {}, \
                         flooring ({:.6} -> 0.001)",
                        i, d
                    );
                    regularized = true;
                }
                lower[i * n + j] = d.max(0.001).sqrt();
            } else {
                lower[i * n + j] = (matrix.get(i, j) - sum) / lower[j * n + j];
            }
        }
    }

    CholeskyFactor {
        n,
        lower,
        regularized,
    }
}

/// Draw n independent standard normals via the Box-Muller transform.
pub fn standard_normals<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        // Open interval to keep ln() finite
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen::<f64>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        out.push(r * theta.cos());
        if out.len() < n {
            out.push(r * theta.sin());
        }
    }
    out
}

/// Draw one vector of correlated uniforms in [0, 1].
///
/// Gaussian-copula recipe: independent standard normals, correlated via
/// the Cholesky factor, then mapped through the standard normal CDF.
pub fn generate_correlated_uniforms<R: Rng + ?Sized>(
    factor: &CholeskyFactor,
    rng: &mut R,
) -> Vec<f64> {
    let z = standard_normals(factor.n(), rng);
    factor.apply(&z).into_iter().map(normal_cdf).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_leg(subject: &str, market: MarketKind, game_id: &str, team: &str) -> LegInput {
        LegInput::new(market, subject, 20.5, Side::Over, -110, game_id, Sport::NBA)
            .with_team(team)
    }

    #[test]
    fn test_classification_precedence() {
        let a = make_leg("LeBron James", MarketKind::Points, "LAL-BOS", "LAL");
        let b = make_leg("LeBron James", MarketKind::Assists, "LAL-BOS", "LAL");
        // Same player wins over same game and same team
        assert_eq!(classify_leg_pair(&a, &b), CorrelationKind::SamePlayer);

        let c = make_leg("Anthony Davis", MarketKind::Rebounds, "LAL-BOS", "LAL");
        // Same game wins over same team
        assert_eq!(classify_leg_pair(&a, &c), CorrelationKind::SameGame);

        let d = make_leg("Anthony Davis", MarketKind::Rebounds, "LAL-GSW", "LAL");
        assert_eq!(classify_leg_pair(&a, &d), CorrelationKind::SameTeam);

        let e = make_leg("Jayson Tatum", MarketKind::Points, "BOS-NYK", "BOS");
        assert_eq!(classify_leg_pair(&a, &e), CorrelationKind::CrossGame);
    }

    #[test]
    fn test_lookup_prefers_historical() {
        let mut data = CorrelationData::new();
        data.insert(
            Sport::NBA,
            MarketKind::Points,
            MarketKind::Assists,
            CorrelationKind::SamePlayer,
            CorrelationRecord {
                coefficient: 0.61,
                sample_size: 250,
            },
        );

        let pair = lookup_correlation(
            Sport::NBA,
            MarketKind::Assists, // reversed order must still hit
            MarketKind::Points,
            CorrelationKind::SamePlayer,
            Some(&data),
        );
        assert_eq!(pair.coefficient, 0.61);
        assert_eq!(pair.confidence, CorrelationConfidence::High);
    }

    #[test]
    fn test_lookup_confidence_tiers() {
        let mut data = CorrelationData::new();
        data.insert(
            Sport::NBA,
            MarketKind::Points,
            MarketKind::Rebounds,
            CorrelationKind::SamePlayer,
            CorrelationRecord {
                coefficient: 0.42,
                sample_size: 35,
            },
        );
        let medium = lookup_correlation(
            Sport::NBA,
            MarketKind::Points,
            MarketKind::Rebounds,
            CorrelationKind::SamePlayer,
            Some(&data),
        );
        assert_eq!(medium.confidence, CorrelationConfidence::Medium);

        // No data at all: literature default for a known pair
        let default = lookup_correlation(
            Sport::NBA,
            MarketKind::Points,
            MarketKind::Assists,
            CorrelationKind::SamePlayer,
            None,
        );
        assert_eq!(default.coefficient, 0.45);
        assert_eq!(default.confidence, CorrelationConfidence::Estimated);

        // Unknown pair: flat per-type constant
        let flat = lookup_correlation(
            Sport::NBA,
            MarketKind::Steals,
            MarketKind::Saves,
            CorrelationKind::CrossGame,
            None,
        );
        assert_eq!(flat.coefficient, 0.05);
    }

    #[test]
    fn test_matrix_symmetric_unit_diagonal() {
        let legs = vec![
            make_leg("LeBron James", MarketKind::Points, "LAL-BOS", "LAL"),
            make_leg("LeBron James", MarketKind::Assists, "LAL-BOS", "LAL"),
            make_leg("Jayson Tatum", MarketKind::Points, "LAL-BOS", "BOS"),
        ];
        let m = build_correlation_matrix(&legs, None);
        for i in 0..3 {
            assert_eq!(m.get(i, i), 1.0, "diagonal must be 1 at {}", i);
            for j in 0..3 {
                assert_eq!(
                    m.get(i, j),
                    m.get(j, i),
                    "matrix must be symmetric at ({}, {})",
                    i,
                    j
                );
                assert!((-1.0..=1.0).contains(&m.get(i, j)));
            }
        }
    }

    #[test]
    fn test_single_leg_matrix_is_trivial() {
        let legs = vec![make_leg("LeBron James", MarketKind::Points, "LAL-BOS", "LAL")];
        let m = build_correlation_matrix(&legs, None);
        assert_eq!(m.n(), 1);
        assert_eq!(m.get(0, 0), 1.0);
    }

    #[test]
    fn test_same_player_trio_floor() {
        // Three legs on the same player: every pair classifies same_player
        // and defaults to at least the 0.30 flat constant.
        let legs = vec![
            make_leg("Nikola Jokic", MarketKind::Points, "DEN-MIN", "DEN"),
            make_leg("Nikola Jokic", MarketKind::Rebounds, "DEN-MIN", "DEN"),
            make_leg("Nikola Jokic", MarketKind::Assists, "DEN-MIN", "DEN"),
        ];
        let m = build_correlation_matrix(&legs, None);
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    assert!(
                        m.get(i, j) >= 0.30,
                        "same-player off-diagonal below floor at ({}, {}): {}",
                        i,
                        j,
                        m.get(i, j)
                    );
                }
            }
        }
    }

    #[test]
    fn test_cholesky_identity() {
        let m = CorrelationMatrix::identity(3);
        let factor = cholesky_decomposition(&m);
        assert!(!factor.regularized);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((factor.get(i, j) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_reconstructs_matrix() {
        let mut m = CorrelationMatrix::identity(2);
        m.set(0, 1, 0.5);
        m.set(1, 0, 0.5);
        let l = cholesky_decomposition(&m);
        assert!(!l.regularized);

        // L L^T must reproduce the input
        for i in 0..2 {
            for j in 0..2 {
                let mut acc = 0.0;
                for k in 0..2 {
                    acc += l.get(i, k) * l.get(j, k);
                }
                assert!(
                    (acc - m.get(i, j)).abs() < 1e-9,
                    "L L^T drifted at ({}, {}): {:.9} vs {:.9}",
                    i,
                    j,
                    acc,
                    m.get(i, j)
                );
            }
        }
    }

    #[test]
    fn test_cholesky_regularizes_non_psd() {
        // Inconsistent pairwise correlations: each pair at 0.9/-0.9 cannot
        // coexist, so the matrix is not PSD.
        let mut m = CorrelationMatrix::identity(3);
        for (i, j, v) in [(0, 1, 0.9), (0, 2, 0.9), (1, 2, -0.9)] {
            m.set(i, j, v);
            m.set(j, i, v);
        }
        let l = cholesky_decomposition(&m);
        assert!(l.regularized, "non-PSD input must set the regularized flag");
        // Factor stays finite and usable
        for i in 0..3 {
            for j in 0..3 {
                assert!(l.get(i, j).is_finite());
            }
        }
    }

    #[test]
    fn test_correlated_uniforms_in_unit_interval() {
        let mut m = CorrelationMatrix::identity(4);
        for i in 0..4 {
            for j in 0..4 {
                if i != j {
                    m.set(i, j, 0.3);
                }
            }
        }
        let factor = cholesky_decomposition(&m);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let u = generate_correlated_uniforms(&factor, &mut rng);
            assert_eq!(u.len(), 4);
            for v in u {
                assert!((0.0..=1.0).contains(&v), "uniform out of range: {}", v);
            }
        }
    }

    #[test]
    fn test_correlated_uniforms_positive_dependence() {
        // With rho = 0.8, the two uniforms should co-move
        let mut m = CorrelationMatrix::identity(2);
        m.set(0, 1, 0.8);
        m.set(1, 0, 0.8);
        let factor = cholesky_decomposition(&m);
        let mut rng = StdRng::seed_from_u64(42);

        let trials = 20_000;
        let mut same_side = 0;
        for _ in 0..trials {
            let u = generate_correlated_uniforms(&factor, &mut rng);
            if (u[0] < 0.5) == (u[1] < 0.5) {
                same_side += 1;
            }
        }
        let agreement = same_side as f64 / trials as f64;
        // Independent uniforms agree 50% of the time; rho 0.8 pushes
        // agreement to ~79% (1/2 + asin(rho)/pi).
        assert!(
            agreement > 0.70,
            "expected strong co-movement, got {:.3}",
            agreement
        );
    }

    #[test]
    fn test_box_muller_moments() {
        let mut rng = StdRng::seed_from_u64(99);
        let draws = standard_normals(50_000, &mut rng);
        let mean: f64 = draws.iter().sum::<f64>() / draws.len() as f64;
        let var: f64 =
            draws.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.02, "mean should be ~0: {:.4}", mean);
        assert!((var - 1.0).abs() < 0.03, "variance should be ~1: {:.4}", var);
    }
}
