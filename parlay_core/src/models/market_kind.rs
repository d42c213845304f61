//! Market kind taxonomy for prop and game markets
//!
//! Defines the explicit market enumeration consumed by the probability
//! engine. Market classification from free-text descriptions is an
//! ingestion concern and happens upstream; the core only ever sees
//! these tags.

use serde::{Deserialize, Serialize};

/// Statistical market kinds supported by the pricing engine.
///
/// Each kind carries a volatility profile (standard deviation as a
/// fraction of the expectation) and a flag for low-count discrete
/// statistics that are better modeled by a Poisson distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    // Basketball player props
    Points,
    Rebounds,
    Assists,
    ThreePointers,
    Steals,
    Blocks,

    // Football player props
    PassingYards,
    RushingYards,
    ReceivingYards,
    Receptions,
    Touchdowns,

    // Baseball player props
    Strikeouts,
    Hits,
    TotalBases,

    // Hockey player props
    Goals,
    Shots,
    Saves,

    // Game-level markets
    GameTotal,
    Spread,
    Moneyline,
}

impl MarketKind {
    /// Default standard deviation as a multiple of the expected value.
    ///
    /// Derived from historical per-market volatility: high-volume stats
    /// (points, passing yards) are tight around their mean; rare events
    /// (steals, blocks, touchdowns) swing much wider.
    pub fn sd_multiplier(&self) -> f64 {
        match self {
            Self::Points => 0.30,
            Self::Rebounds => 0.40,
            Self::Assists => 0.45,
            Self::ThreePointers => 0.60,
            Self::Steals => 0.70,
            Self::Blocks => 0.70,
            Self::PassingYards => 0.35,
            Self::RushingYards => 0.45,
            Self::ReceivingYards => 0.50,
            Self::Receptions => 0.45,
            Self::Touchdowns => 0.70,
            Self::Strikeouts => 0.40,
            Self::Hits => 0.60,
            Self::TotalBases => 0.55,
            Self::Goals => 0.70,
            Self::Shots => 0.45,
            Self::Saves => 0.35,
            Self::GameTotal => 0.30,
            Self::Spread => 0.50,
            Self::Moneyline => 0.50,
        }
    }

    /// Low-count discrete statistics modeled with a Poisson distribution
    /// regardless of the expectation.
    pub fn is_low_count_discrete(&self) -> bool {
        matches!(
            self,
            Self::ThreePointers
                | Self::Steals
                | Self::Blocks
                | Self::Receptions
                | Self::Touchdowns
                | Self::Hits
                | Self::TotalBases
                | Self::Goals
        )
    }

    /// Player-level markets (as opposed to game-level markets).
    pub fn is_player_prop(&self) -> bool {
        !matches!(self, Self::GameTotal | Self::Spread | Self::Moneyline)
    }

    /// Human-readable market name for logging and recommendations.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Points => "points",
            Self::Rebounds => "rebounds",
            Self::Assists => "assists",
            Self::ThreePointers => "three_pointers",
            Self::Steals => "steals",
            Self::Blocks => "blocks",
            Self::PassingYards => "passing_yards",
            Self::RushingYards => "rushing_yards",
            Self::ReceivingYards => "receiving_yards",
            Self::Receptions => "receptions",
            Self::Touchdowns => "touchdowns",
            Self::Strikeouts => "strikeouts",
            Self::Hits => "hits",
            Self::TotalBases => "total_bases",
            Self::Goals => "goals",
            Self::Shots => "shots",
            Self::Saves => "saves",
            Self::GameTotal => "game_total",
            Self::Spread => "spread",
            Self::Moneyline => "moneyline",
        }
    }
}
