//! Ecosystem-specific scoring thresholds.
//!
//! Release cadence and responsiveness norms differ sharply between npm's
//! high-velocity packages and Homebrew formulae; the scorer evaluates each
//! package against its own ecosystem's profile.

use pkgpulse_core::Ecosystem;

pub struct EcosystemProfile {
    /// An average first-response under this is "fast" for the ecosystem.
    pub issue_response_fast_hours: f64,
    /// Releases per year considered a healthy cadence (inclusive).
    pub release_sweet_spot: (u32, u32),
    /// Monthly install counts for the community bonus tiers.
    pub install_bonus_high: u64,
    pub install_bonus_mid: u64,
}

impl EcosystemProfile {
    pub fn for_ecosystem(ecosystem: Option<Ecosystem>) -> Self {
        match ecosystem {
            Some(Ecosystem::Npm) => Self {
                issue_response_fast_hours: 24.0,
                release_sweet_spot: (12, 52),
                install_bonus_high: 100_000,
                install_bonus_mid: 10_000,
            },
            Some(Ecosystem::Homebrew) => Self {
                issue_response_fast_hours: 48.0,
                release_sweet_spot: (4, 12),
                install_bonus_high: 10_000,
                install_bonus_mid: 1_000,
            },
            Some(Ecosystem::Pypi) => Self {
                issue_response_fast_hours: 48.0,
                release_sweet_spot: (6, 24),
                install_bonus_high: 100_000,
                install_bonus_mid: 10_000,
            },
            Some(Ecosystem::Crates) | None => Self {
                issue_response_fast_hours: 48.0,
                release_sweet_spot: (4, 24),
                install_bonus_high: 100_000,
                install_bonus_mid: 10_000,
            },
        }
    }
}
