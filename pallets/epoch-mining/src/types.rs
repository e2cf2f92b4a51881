use codec::{Decode, Encode, MaxEncodedLen};
use epoch_mining_primitives::{
    epoch_ends_at, reward_share, Balance, EpochIndex, EpochState, EpochTerms, Moment,
};
use frame_support::pallet_prelude::RuntimeDebug;
use scale_info::TypeInfo;
use sp_runtime::Perbill;

/// Governance-controlled protocol parameters. One instance per chain.
#[derive(Clone, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug)]
pub struct GlobalParameters<AccountId, AssetId> {
    /// Only identity allowed to change parameters or withdraw fees
    pub admin: AccountId,
    /// Asset paid out to claimants
    pub reward_token: AssetId,
    pub epoch_duration: Moment,
    pub fee_base: Balance,
    pub fee_growth_rate: Balance,
    /// Reward tokens offered to each newly opened epoch
    pub reward_rate: Balance,
    /// Applied to `reward_rate` every time an epoch from index 2 on opens
    pub reward_decay: Perbill,
}

impl<AccountId, AssetId> GlobalParameters<AccountId, AssetId> {
    pub fn terms(&self) -> EpochTerms {
        EpochTerms {
            epoch_duration: self.epoch_duration,
            fee_base: self.fee_base,
            fee_growth_rate: self.fee_growth_rate,
            reward_rate: self.reward_rate,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug)]
pub struct EpochInfo {
    pub index: EpochIndex,
    pub opened_at: Moment,
    pub closed_at: Option<Moment>,
    pub state: EpochState,
    pub terms: EpochTerms,
    /// Frozen once the epoch is closed
    pub total_participants: u64,
    /// Zero while open, fixed at close
    pub reward_pool: Balance,
    pub fees_collected: Balance,
    pub rewards_claimed: Balance,
}

impl EpochInfo {
    pub fn open(index: EpochIndex, now: Moment, terms: EpochTerms) -> Self {
        Self {
            index,
            opened_at: now,
            closed_at: None,
            state: EpochState::Open,
            terms,
            total_participants: 0,
            reward_pool: 0,
            fees_collected: 0,
            rewards_claimed: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == EpochState::Open
    }

    /// Fee charged to the next registrant.
    pub fn next_fee(&self) -> Option<Balance> {
        self.terms.fee_for(self.total_participants)
    }

    /// Per-participant payout. Only meaningful once closed.
    pub fn share(&self) -> Option<Balance> {
        reward_share(self.reward_pool, self.total_participants)
    }

    pub fn ends_at(&self) -> Option<Moment> {
        epoch_ends_at(self.opened_at, self.terms.epoch_duration)
    }
}

/// Registration marker for one participant in one epoch.
#[derive(Clone, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug)]
pub struct Participation {
    pub epoch: EpochIndex,
    pub registered: bool,
    pub claimed: bool,
    pub fee_paid: Balance,
}

/// Accounting view of the funds held by the pallet account.
#[derive(Clone, Default, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo, RuntimeDebug)]
pub struct TreasuryState {
    /// Native currency collected from registrations
    pub fee_balance: Balance,
    /// Reward tokens not yet promised to any epoch
    pub token_reserve: Balance,
    /// Reward tokens promised to closed epochs and not yet claimed
    pub committed_rewards: Balance,
}
