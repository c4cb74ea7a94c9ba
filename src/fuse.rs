//! Fuse policy
//!
//! Every mode-specific rule for the bomb timer lives here. Callers only ever ask
//! "what does the fuse look like after this trigger?" via [`next_fuse`].

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const SHOT_CLOCK_MS: u64 = 15_000;

pub const ACCELERATING_START_MS: u64 = 30_000;
pub const ACCELERATING_STEP_MS: u64 = 2_000;
pub const ACCELERATING_FLOOR_MS: u64 = 5_000;

pub const CHAOS_MIN_MS: u64 = 5_000;
pub const CHAOS_MAX_MS: u64 = 25_000;

pub const CLASSIC_MIN_MS: u64 = 45_000;
pub const CLASSIC_MAX_MS: u64 = 90_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "kind",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum FuseMode {
    /// Timer resets to the configured duration on every pass
    Fixed { duration_ms: u64 },
    /// Timer keeps running across passes; only an explosion resets it
    HotPotato { duration_ms: u64 },
    /// Always [`SHOT_CLOCK_MS`], reset on every pass
    ShotClock,
    /// Each pass shortens the fuse by `step_ms` down to `floor_ms`
    Accelerating {
        start_ms: u64,
        step_ms: u64,
        floor_ms: u64,
    },
    /// Fresh random fuse on every pass and explosion
    Chaos { min_ms: u64, max_ms: u64 },
    /// Long random fuse that passes never touch
    Classic { min_ms: u64, max_ms: u64 },
}

impl Default for FuseMode {
    fn default() -> Self {
        FuseMode::Fixed {
            duration_ms: ACCELERATING_START_MS,
        }
    }
}

impl FuseMode {
    /// Mode selected by the host's "reset on pass" toggle
    pub fn from_reset_on_pass(duration_ms: u64, reset_on_pass: bool) -> Self {
        if reset_on_pass {
            FuseMode::Fixed { duration_ms }
        } else {
            FuseMode::HotPotato { duration_ms }
        }
    }

    pub fn accelerating() -> Self {
        FuseMode::Accelerating {
            start_ms: ACCELERATING_START_MS,
            step_ms: ACCELERATING_STEP_MS,
            floor_ms: ACCELERATING_FLOOR_MS,
        }
    }

    pub fn chaos() -> Self {
        FuseMode::Chaos {
            min_ms: CHAOS_MIN_MS,
            max_ms: CHAOS_MAX_MS,
        }
    }

    pub fn classic() -> Self {
        FuseMode::Classic {
            min_ms: CLASSIC_MIN_MS,
            max_ms: CLASSIC_MAX_MS,
        }
    }

    /// Whether a successful pass restarts the countdown
    pub fn resets_on_pass(&self) -> bool {
        !matches!(self, FuseMode::HotPotato { .. } | FuseMode::Classic { .. })
    }

    /// Nominal duration shown before a round starts
    pub fn base_duration_ms(&self) -> u64 {
        match self {
            FuseMode::Fixed { duration_ms } | FuseMode::HotPotato { duration_ms } => *duration_ms,
            FuseMode::ShotClock => SHOT_CLOCK_MS,
            FuseMode::Accelerating { start_ms, .. } => *start_ms,
            FuseMode::Chaos { min_ms, max_ms } | FuseMode::Classic { min_ms, max_ms } => {
                (min_ms + max_ms) / 2
            }
        }
    }

    /// Check the mode parameters against the allowed host-configurable range.
    ///
    /// Fixed durations and the accelerating start must lie in
    /// `min_ms..=max_ms`; random ranges may reach down to [`CHAOS_MIN_MS`]
    /// and up to [`CLASSIC_MAX_MS`].
    pub fn validate(&self, min_ms: u64, max_ms: u64) -> Result<(), String> {
        let check = |value: u64, field: &str, low: u64, high: u64| {
            if (low..=high).contains(&value) {
                Ok(())
            } else {
                Err(format!(
                    "{} must be between {}ms and {}ms (got {}ms)",
                    field, low, high, value
                ))
            }
        };

        match self {
            FuseMode::Fixed { duration_ms } | FuseMode::HotPotato { duration_ms } => {
                check(*duration_ms, "Fuse duration", min_ms, max_ms)
            }
            FuseMode::ShotClock => Ok(()),
            FuseMode::Accelerating {
                start_ms,
                step_ms,
                floor_ms,
            } => {
                check(*start_ms, "Accelerating start", min_ms, max_ms)?;
                check(*floor_ms, "Accelerating floor", 1, *start_ms)?;
                check(*step_ms, "Accelerating step", 0, *start_ms)
            }
            FuseMode::Chaos { min_ms, max_ms } | FuseMode::Classic { min_ms, max_ms } => {
                check(*min_ms, "Random fuse minimum", CHAOS_MIN_MS, CLASSIC_MAX_MS)?;
                check(*max_ms, "Random fuse maximum", *min_ms, CLASSIC_MAX_MS)
            }
        }
    }
}

/// What caused the fuse to be (re)evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseTrigger {
    RoundStart,
    Pass,
    Explosion,
}

/// Fuse duration plus the absolute server time it goes off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fuse {
    pub duration_ms: u64,
    pub explodes_at: Option<i64>,
}

impl Fuse {
    fn armed(duration_ms: u64, now: i64) -> Self {
        Self {
            duration_ms,
            explodes_at: Some(
                now.saturating_add(i64::try_from(duration_ms).unwrap_or(i64::MAX)),
            ),
        }
    }
}

/// Compute the fuse after `trigger`.
///
/// Passes in modes that do not reset return `previous` untouched, including its
/// deadline. Every other combination re-arms the fuse relative to `now`.
pub fn next_fuse<R: Rng>(
    mode: &FuseMode,
    trigger: FuseTrigger,
    previous: Fuse,
    now: i64,
    rng: &mut R,
) -> Fuse {
    match (mode, trigger) {
        (FuseMode::Fixed { duration_ms }, _) => Fuse::armed(*duration_ms, now),

        (FuseMode::HotPotato { .. }, FuseTrigger::Pass) => previous,
        (FuseMode::HotPotato { duration_ms }, _) => Fuse::armed(*duration_ms, now),

        (FuseMode::ShotClock, _) => Fuse::armed(SHOT_CLOCK_MS, now),

        (
            FuseMode::Accelerating {
                step_ms, floor_ms, ..
            },
            FuseTrigger::Pass,
        ) => {
            let shortened = previous.duration_ms.saturating_sub(*step_ms).max(*floor_ms);
            Fuse::armed(shortened, now)
        }
        (FuseMode::Accelerating { start_ms, .. }, _) => Fuse::armed(*start_ms, now),

        (FuseMode::Chaos { min_ms, max_ms }, _) => {
            Fuse::armed(rng.random_range(*min_ms..=*max_ms), now)
        }

        (FuseMode::Classic { .. }, FuseTrigger::Pass) => previous,
        (FuseMode::Classic { min_ms, max_ms }, _) => {
            Fuse::armed(rng.random_range(*min_ms..=*max_ms), now)
        }
    }
}
