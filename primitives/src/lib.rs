//! Epoch Mining Primitives
//!
//! Shared constants and the pure fee/reward arithmetic of the epoch mining
//! protocol. Everything here is deterministic and storage-free so runtimes,
//! RPC helpers and off-chain tooling compute identical numbers.

#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::{Perbill, RuntimeDebug};

/// Token decimals used by the default parameter set
pub const DECIMALS: u8 = 9;

/// 1 token = 10^9 base units
pub const UNIT: u128 = 1_000_000_000;

/// Default epoch length: one day in milliseconds
pub const DEFAULT_EPOCH_DURATION_MS: u64 = 86_400_000;

/// First registrant in an epoch mines for free
pub const DEFAULT_FEE_BASE: Balance = 0;

/// Each prior registrant raises the fee by 0.00005 native tokens
pub const DEFAULT_FEE_GROWTH_RATE: Balance = UNIT / 10 / 2_000;

/// Reward tokens allocated to an epoch when the reserve allows it
pub const DEFAULT_REWARD_RATE: Balance = 10_000_000;

/// No decay: every epoch is offered the same reward rate
pub const DEFAULT_REWARD_DECAY: Perbill = Perbill::from_parts(1_000_000_000);

/// Reward rate shrinks to 7/8 every epoch
pub const REWARD_DECAY_SEVEN_EIGHTHS: Perbill = Perbill::from_parts(875_000_000);

pub type Balance = u128;
pub type EpochIndex = u64;
/// Milliseconds, as reported by `pallet_timestamp`
pub type Moment = u64;

/// Lifecycle of an epoch. `Closed` is terminal.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug)]
pub enum EpochState {
    Open,
    Closed,
}

/// Parameters an epoch runs under, frozen when the epoch opens.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug)]
pub struct EpochTerms {
    pub epoch_duration: Moment,
    pub fee_base: Balance,
    pub fee_growth_rate: Balance,
    pub reward_rate: Balance,
}

impl EpochTerms {
    /// Fee the next registrant pays once `prior_participants` have mined.
    pub fn fee_for(&self, prior_participants: u64) -> Option<Balance> {
        registration_fee(self.fee_base, self.fee_growth_rate, prior_participants)
    }
}

/// Bonding curve: `fee_base + fee_growth_rate * prior_participants`.
///
/// Returns `None` on overflow.
pub fn registration_fee(
    fee_base: Balance,
    fee_growth_rate: Balance,
    prior_participants: u64,
) -> Option<Balance> {
    fee_growth_rate
        .checked_mul(Balance::from(prior_participants))?
        .checked_add(fee_base)
}

/// Tokens reserved for a closing epoch, capped by what the treasury holds.
pub fn reward_pool(reward_rate: Balance, token_reserve: Balance) -> Balance {
    reward_rate.min(token_reserve)
}

/// Floor share of `pool` for each of `participants`. `None` for an empty epoch.
pub fn reward_share(pool: Balance, participants: u64) -> Option<Balance> {
    pool.checked_div(Balance::from(participants))
}

/// Part of `pool` no participant can ever claim because of floor division.
pub fn reward_dust(pool: Balance, participants: u64) -> Balance {
    pool.checked_rem(Balance::from(participants)).unwrap_or(pool)
}

/// Earliest moment at which an epoch opened at `opened_at` may be closed.
pub fn epoch_ends_at(opened_at: Moment, epoch_duration: Moment) -> Option<Moment> {
    opened_at.checked_add(epoch_duration)
}

pub fn epoch_elapsed(opened_at: Moment, epoch_duration: Moment, now: Moment) -> bool {
    now.saturating_sub(opened_at) >= epoch_duration
}

/// Reward rate offered to the next epoch after applying `decay`.
pub fn decayed_reward(reward_rate: Balance, decay: Perbill) -> Balance {
    decay.mul_floor(reward_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registrant_pays_base() {
        assert_eq!(registration_fee(0, DEFAULT_FEE_GROWTH_RATE, 0), Some(0));
        assert_eq!(registration_fee(7, 3, 0), Some(7));
    }

    #[test]
    fn test_fee_strictly_increases() {
        let mut last = registration_fee(0, 1, 0).unwrap();
        for prior in 1..50u64 {
            let fee = registration_fee(0, 1, prior).unwrap();
            assert!(fee > last);
            last = fee;
        }
    }

    #[test]
    fn test_fee_overflow() {
        assert_eq!(registration_fee(0, Balance::MAX, 2), None);
        assert_eq!(registration_fee(Balance::MAX, 1, 1), None);
        assert_eq!(registration_fee(Balance::MAX, 0, u64::MAX), Some(Balance::MAX));
    }

    #[test]
    fn test_default_growth_rate() {
        // 0.1 native / 2000
        assert_eq!(DEFAULT_FEE_GROWTH_RATE, 50_000);
    }

    #[test]
    fn test_reward_pool_capped_by_reserve() {
        assert_eq!(reward_pool(DEFAULT_REWARD_RATE, 50_000), 50_000);
        assert_eq!(reward_pool(1_000, 50_000), 1_000);
        assert_eq!(reward_pool(1_000, 0), 0);
    }

    #[test]
    fn test_reward_share_floors() {
        assert_eq!(reward_share(50_000, 2), Some(25_000));
        assert_eq!(reward_share(10, 3), Some(3));
        assert_eq!(reward_dust(10, 3), 1);
        assert_eq!(reward_share(10, 0), None);
        assert_eq!(reward_dust(10, 0), 10);
    }

    #[test]
    fn test_shares_never_exceed_pool() {
        for participants in 1..20u64 {
            let pool = 1_000_003u128;
            let share = reward_share(pool, participants).unwrap();
            let paid = share * participants as u128;
            assert!(paid <= pool);
            assert_eq!(paid + reward_dust(pool, participants), pool);
        }
    }

    #[test]
    fn test_epoch_timing() {
        assert!(!epoch_elapsed(1_000, 10_000, 10_999));
        assert!(epoch_elapsed(1_000, 10_000, 11_000));
        assert!(!epoch_elapsed(5_000, 10, 0));
        assert_eq!(epoch_ends_at(1_000, 10_000), Some(11_000));
        assert_eq!(epoch_ends_at(u64::MAX, 1), None);
    }

    #[test]
    fn test_reward_decay() {
        assert_eq!(decayed_reward(DEFAULT_REWARD_RATE, DEFAULT_REWARD_DECAY), DEFAULT_REWARD_RATE);
        assert_eq!(decayed_reward(8_000, REWARD_DECAY_SEVEN_EIGHTHS), 7_000);
        assert_eq!(decayed_reward(10_000_000, REWARD_DECAY_SEVEN_EIGHTHS), 8_750_000);
    }

    #[test]
    fn test_terms_fee_for() {
        let terms = EpochTerms {
            epoch_duration: DEFAULT_EPOCH_DURATION_MS,
            fee_base: 10,
            fee_growth_rate: 5,
            reward_rate: DEFAULT_REWARD_RATE,
        };
        assert_eq!(terms.fee_for(0), Some(10));
        assert_eq!(terms.fee_for(4), Some(30));
    }
}
