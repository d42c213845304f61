//! American odds conversions and expected value helpers.
//!
//! All conversions are the standard bijective transforms; round-tripping
//! odds through an implied probability reconstructs them within integer
//! rounding. Probabilities fed to these functions are clamped to
//! [0.01, 0.99] so no downstream division can blow up.

/// Convert American odds to the implied win probability.
///
/// -110 → 0.5238, +150 → 0.40. Includes the book's vig; this is the
/// break-even probability, not a fair probability.
#[inline]
pub fn american_to_implied(odds: i32) -> f64 {
    if odds < 0 {
        let o = (-odds) as f64;
        o / (o + 100.0)
    } else {
        100.0 / (odds as f64 + 100.0)
    }
}

/// Convert an implied probability back to American odds.
///
/// Probabilities are clamped to [0.01, 0.99] before conversion.
#[inline]
pub fn implied_to_american(probability: f64) -> i32 {
    let p = probability.clamp(0.01, 0.99);
    if p > 0.5 {
        (-(p / (1.0 - p)) * 100.0).round() as i32
    } else {
        (((1.0 - p) / p) * 100.0).round() as i32
    }
}

/// Convert American odds to decimal odds (total payout per unit stake).
#[inline]
pub fn american_to_decimal(odds: i32) -> f64 {
    if odds < 0 {
        1.0 + 100.0 / (-odds) as f64
    } else {
        1.0 + odds as f64 / 100.0
    }
}

/// Expected value per unit stake for a win probability at given odds.
///
/// Positive when the modeled probability beats the implied probability.
#[inline]
pub fn expected_value(probability: f64, odds: i32) -> f64 {
    let p = probability.clamp(0.01, 0.99);
    let b = american_to_decimal(odds) - 1.0;
    p * b - (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_implied() {
        assert!((american_to_implied(-110) - 0.5238).abs() < 0.001);
        assert!((american_to_implied(100) - 0.50).abs() < 1e-9);
        assert!((american_to_implied(150) - 0.40).abs() < 1e-9);
        assert!((american_to_implied(-200) - 0.6667).abs() < 0.001);
    }

    #[test]
    fn test_round_trip_both_sign_ranges() {
        for odds in [-350, -200, -110, -105, 100, 120, 150, 240, 400] {
            let implied = american_to_implied(odds);
            let back = implied_to_american(implied);
            assert!(
                (back - odds).abs() <= 1,
                "round trip drifted: {} -> {:.4} -> {}",
                odds,
                implied,
                back
            );
        }
    }

    #[test]
    fn test_american_to_decimal() {
        assert!((american_to_decimal(-110) - 1.909).abs() < 0.001);
        assert!((american_to_decimal(150) - 2.50).abs() < 1e-9);
        assert!((american_to_decimal(100) - 2.00).abs() < 1e-9);
    }

    #[test]
    fn test_expected_value_sign() {
        // Model 55% at -110 (implied 52.4%) is +EV
        assert!(expected_value(0.55, -110) > 0.0);
        // Model 50% at -110 is -EV (the vig)
        assert!(expected_value(0.50, -110) < 0.0);
        // At exactly the implied probability, EV ~ 0
        let implied = american_to_implied(-110);
        assert!(expected_value(implied, -110).abs() < 1e-9);
    }
}
