//! Block subsidy schedule
//!
//! The subsidy is a pure function of height. Early heights follow a table of
//! flat tiers; from [`HALVING_BASE_HEIGHT`] on, a 4-coin base subsidy halves
//! every [`HALVING_INTERVAL`] blocks until it is exhausted.
//!
//! Tiers (upper bounds are exclusive, so a boundary height already pays the
//! next, lower tier):
//! - height 0: 0
//! - 1..77_777: 21_000 coins
//! - 77_777..300_001: 15_000 coins
//! - 300_001..400_001: 10_000 coins
//! - 400_001..500_001: 5_000 coins
//! - 500_001..600_001: 312.5 coins
//! - 600_001..700_001: 156.25 coins
//! - 700_001..800_001: 78 coins
//! - 800_001..900_001: 39 coins
//! - 900_001..1_000_001: 19.5 coins
//! - 1_000_001..3_102_401: 8 coins
//! - 3_102_401 onward: `4 coins >> ((height - 3_102_400) / 2_102_400)`
//!
//! All amounts are satoshis in `u64`; floats only appear in [`to_coins`].

/// Satoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Height the halving counter is measured from.
pub const HALVING_BASE_HEIGHT: u64 = 3_102_400;

/// Blocks per halving epoch.
pub const HALVING_INTERVAL: u64 = 2_102_400;

/// Subsidy of halving epoch 0.
pub const HALVING_BASE_SUBSIDY: u64 = 4 * COIN;

/// Halving count at which the subsidy is treated as exhausted.
pub const MAX_HALVINGS: u64 = 64;

/// One flat tier: heights below `below` (and above the previous tier) pay `subsidy`.
#[derive(Debug, Clone, Copy)]
struct Tier {
    below: u64,
    subsidy: u64,
}

const TIERS: [Tier; 10] = [
    Tier { below: 77_777, subsidy: 21_000 * COIN },
    Tier { below: 300_001, subsidy: 15_000 * COIN },
    Tier { below: 400_001, subsidy: 10_000 * COIN },
    Tier { below: 500_001, subsidy: 5_000 * COIN },
    Tier { below: 600_001, subsidy: 31_250_000_000 },
    Tier { below: 700_001, subsidy: 15_625_000_000 },
    Tier { below: 800_001, subsidy: 78 * COIN },
    Tier { below: 900_001, subsidy: 39 * COIN },
    Tier { below: 1_000_001, subsidy: 1_950_000_000 },
    Tier { below: HALVING_BASE_HEIGHT + 1, subsidy: 8 * COIN },
];

/// First height paid by the halving regime.
pub const HALVING_START_HEIGHT: u64 = HALVING_BASE_HEIGHT + 1;

/// Subsidy in satoshis for the block at `height`.
pub fn block_reward(height: u64) -> u64 {
    if height == 0 {
        return 0;
    }
    if let Some(tier) = TIERS.iter().find(|t| height < t.below) {
        return tier.subsidy;
    }
    match halvings(height) {
        Some(n) => halving_subsidy(n),
        None => 0,
    }
}

/// Halving count for `height`, or `None` while the flat tiers still apply.
pub fn halvings(height: u64) -> Option<u64> {
    if height < HALVING_START_HEIGHT {
        return None;
    }
    Some((height - HALVING_BASE_HEIGHT) / HALVING_INTERVAL)
}

/// Subsidy paid during halving epoch `n`; zero from [`MAX_HALVINGS`] on.
pub fn halving_subsidy(n: u64) -> u64 {
    if n >= MAX_HALVINGS {
        return 0;
    }
    HALVING_BASE_SUBSIDY >> n
}

/// Total subsidy issued by blocks `1..=height`.
///
/// Walks tiers and halving epochs instead of individual blocks.
pub fn circulating_supply(height: u64) -> u64 {
    let mut total: u64 = 0;
    let mut start = 1u64;

    for tier in TIERS.iter() {
        if height < start {
            return total;
        }
        let last = height.min(tier.below - 1);
        total = total.saturating_add(tier.subsidy.saturating_mul(last - start + 1));
        start = tier.below;
    }

    for epoch in 0..MAX_HALVINGS {
        let subsidy = halving_subsidy(epoch);
        if subsidy == 0 || height < start {
            break;
        }
        let end = HALVING_BASE_HEIGHT.saturating_add((epoch + 1).saturating_mul(HALVING_INTERVAL));
        let last = height.min(end - 1);
        total = total.saturating_add(subsidy.saturating_mul(last - start + 1));
        start = end;
    }

    total
}

/// Presentation-only conversion to whole coins.
pub fn to_coins(satoshis: u64) -> f64 {
    satoshis as f64 / COIN as f64
}

/// Exact 8-decimal rendering of a satoshi amount.
pub fn format_coins(satoshis: u64) -> String {
    format!("{}.{:08}", satoshis / COIN, satoshis % COIN)
}
