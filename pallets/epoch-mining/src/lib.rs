//! # Epoch Mining Pallet
//!
//! Time-boxed mining rounds with an escalating entry fee and a shared reward pot.
//!
//! ## How it works:
//! 1. `Config::InitializeOrigin` calls `initialize` once, naming the admin and the reward token
//! 2. Anyone opens epoch 0 with `initialize_epoch`
//! 3. Participants `mine` the open epoch once each. The fee grows linearly with
//!    the number of earlier registrants: `fee_base + fee_growth_rate * n`
//! 4. Anyone tops up the reward reserve with `fund_program_token`
//! 5. After `epoch_duration` anyone calls `new_epoch`, which freezes the old epoch
//!    and reserves `min(reward_rate, reserve)` tokens for it
//! 6. Each registrant of a closed epoch `claim`s `reward_pool / total_participants`
//!
//! ## Treasury:
//! - Fees and reward tokens sit in the pallet account (`Config::PalletId`)
//! - `Treasury` storage tracks how those funds are earmarked
//! - Floor-division dust of a reward pool is never paid out
//!
//! ## Governance:
//! - The admin may change reward rate, epoch duration, fee growth and reward decay
//! - The admin may withdraw collected fees
//! - Changes only apply to epochs opened afterwards

#![cfg_attr(not(feature = "std"), no_std)]

pub use pallet::*;

mod types;
pub use types::*;

#[cfg(test)]
mod mock;


#[frame_support::pallet]
pub mod pallet {
    use super::types::*;
    use epoch_mining_primitives::{
        decayed_reward, epoch_elapsed, reward_pool, Balance, EpochIndex, EpochState, EpochTerms,
        Moment,
    };
    use frame_support::{
        pallet_prelude::*,
        traits::{fungibles, tokens::Preservation, Currency, ExistenceRequirement},
        PalletId,
    };
    use frame_system::pallet_prelude::*;
    use sp_runtime::{
        traits::{AccountIdConversion, SaturatedConversion},
        Perbill,
    };
    use sp_std::vec::Vec;

    pub type BalanceOf<T> =
        <<T as Config>::Currency as Currency<<T as frame_system::Config>::AccountId>>::Balance;

    pub type AssetIdOf<T> = <<T as Config>::Assets as fungibles::Inspect<
        <T as frame_system::Config>::AccountId,
    >>::AssetId;

    pub type AssetBalanceOf<T> = <<T as Config>::Assets as fungibles::Inspect<
        <T as frame_system::Config>::AccountId,
    >>::Balance;

    pub type GlobalParametersOf<T> =
        GlobalParameters<<T as frame_system::Config>::AccountId, AssetIdOf<T>>;

    const LOG_TARGET: &str = "runtime::epoch-mining";

    #[pallet::config]
    pub trait Config: frame_system::Config + pallet_timestamp::Config {
        /// The overarching event type
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// Native currency registration fees are paid in
        type Currency: Currency<Self::AccountId>;

        /// Multi-asset backend holding the reward token
        type Assets: fungibles::Inspect<Self::AccountId> + fungibles::Mutate<Self::AccountId>;

        /// Origin allowed to create the protocol parameters and pick the admin
        type InitializeOrigin: EnsureOrigin<Self::RuntimeOrigin>;

        /// Derives the treasury account
        #[pallet::constant]
        type PalletId: Get<PalletId>;

        /// Epoch length in milliseconds used until governance changes it
        #[pallet::constant]
        type DefaultEpochDuration: Get<Moment>;

        #[pallet::constant]
        type DefaultFeeBase: Get<Balance>;

        #[pallet::constant]
        type DefaultFeeGrowthRate: Get<Balance>;

        #[pallet::constant]
        type DefaultRewardRate: Get<Balance>;

        #[pallet::constant]
        type DefaultRewardDecay: Get<Perbill>;
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    /// Protocol parameters and admin; `None` until `initialize`
    #[pallet::storage]
    #[pallet::getter(fn global_params)]
    pub type GlobalParams<T: Config> = StorageValue<_, GlobalParametersOf<T>, OptionQuery>;

    /// Index of the single open epoch
    #[pallet::storage]
    #[pallet::getter(fn current_epoch)]
    pub type CurrentEpoch<T: Config> = StorageValue<_, EpochIndex, OptionQuery>;

    /// Every epoch ever opened, by index
    #[pallet::storage]
    pub type Epochs<T: Config> = StorageMap<_, Twox64Concat, EpochIndex, EpochInfo, OptionQuery>;

    /// (epoch, participant) registrations
    #[pallet::storage]
    pub type Participations<T: Config> = StorageDoubleMap<
        _,
        Twox64Concat,
        EpochIndex,
        Blake2_128Concat,
        T::AccountId,
        Participation,
        OptionQuery,
    >;

    #[pallet::storage]
    #[pallet::getter(fn treasury)]
    pub type Treasury<T: Config> = StorageValue<_, TreasuryState, ValueQuery>;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// Protocol parameters were created
        Initialized { admin: T::AccountId, reward_token: AssetIdOf<T> },
        EpochOpened { index: EpochIndex, opened_at: Moment },
        /// Epoch frozen with its final participant count and reward pool
        EpochClosed { index: EpochIndex, total_participants: u64, reward_pool: Balance },
        /// Participant registered for an epoch and paid `fee`
        Mined { who: T::AccountId, epoch: EpochIndex, fee: Balance },
        ProgramFunded { who: T::AccountId, amount: Balance },
        FeesWithdrawn { admin: T::AccountId, amount: Balance },
        /// Reward share paid out
        Claimed { who: T::AccountId, epoch: EpochIndex, amount: Balance },
        GlobalParametersChanged { reward_rate: Balance, epoch_duration: Moment, fee_growth_rate: Balance },
        RewardDecayChanged { decay: Perbill },
    }

    #[pallet::error]
    pub enum Error<T> {
        /// Parameters or genesis epoch already exist
        AlreadyInitialized,
        /// Parameters have not been created yet
        NotInitialized,
        /// Caller is not the admin
        Unauthorized,
        /// Current epoch has not lasted `epoch_duration` yet
        EpochNotElapsed,
        /// Epoch index is not the successor of the open epoch
        InvalidSequence,
        /// Epoch index was never opened
        UnknownEpoch,
        /// Epoch is no longer accepting registrations
        EpochClosed,
        /// Rewards are only known once the epoch is closed
        EpochStillOpen,
        /// Participant already mined this epoch
        AlreadyRegistered,
        /// Participant did not mine this epoch
        NotRegistered,
        /// Reward for this epoch was already paid
        AlreadyClaimed,
        /// Balance too low for the requested debit
        InsufficientFunds,
        /// Amount must be non-zero
        InvalidAmount,
        /// Registration fee is above the caller's limit
        FeeLimitExceeded,
        /// Arithmetic overflow
        ArithmeticOverflow,
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        fn integrity_test() {
            assert!(
                T::DefaultEpochDuration::get() > 0,
                "DefaultEpochDuration must be non-zero"
            );
        }
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Create the protocol parameters with config defaults.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0))]
        pub fn initialize(
            origin: OriginFor<T>,
            admin: T::AccountId,
            reward_token: AssetIdOf<T>,
        ) -> DispatchResult {
            T::InitializeOrigin::ensure_origin(origin)?;
            ensure!(!GlobalParams::<T>::exists(), Error::<T>::AlreadyInitialized);

            GlobalParams::<T>::put(GlobalParameters {
                admin: admin.clone(),
                reward_token: reward_token.clone(),
                epoch_duration: T::DefaultEpochDuration::get(),
                fee_base: T::DefaultFeeBase::get(),
                fee_growth_rate: T::DefaultFeeGrowthRate::get(),
                reward_rate: T::DefaultRewardRate::get(),
                reward_decay: T::DefaultRewardDecay::get(),
            });

            log::info!(target: LOG_TARGET, "✅ Epoch mining initialized");
            Self::deposit_event(Event::Initialized { admin, reward_token });
            Ok(())
        }

        /// Open the genesis epoch. Only index 0 is accepted, and only once.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0))]
        pub fn initialize_epoch(origin: OriginFor<T>, index: EpochIndex) -> DispatchResult {
            ensure_signed(origin)?;
            let params = Self::params()?;
            ensure!(index == 0, Error::<T>::InvalidSequence);
            ensure!(!Epochs::<T>::contains_key(index), Error::<T>::AlreadyInitialized);

            Self::open_epoch(index, Self::now(), params.terms());
            Ok(())
        }

        /// Overwrite reward rate, epoch duration and fee growth in one step.
        ///
        /// Open and closed epochs keep the terms they were opened with.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0))]
        pub fn change_global_parameters(
            origin: OriginFor<T>,
            reward_rate: Balance,
            epoch_duration: Moment,
            fee_growth_rate: Balance,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut params = Self::ensure_admin(&who)?;

            params.reward_rate = reward_rate;
            params.epoch_duration = epoch_duration;
            params.fee_growth_rate = fee_growth_rate;
            GlobalParams::<T>::put(params);

            log::info!(
                target: LOG_TARGET,
                "Global parameters changed: reward_rate={} epoch_duration={}ms fee_growth_rate={}",
                reward_rate,
                epoch_duration,
                fee_growth_rate
            );
            Self::deposit_event(Event::GlobalParametersChanged {
                reward_rate,
                epoch_duration,
                fee_growth_rate,
            });
            Ok(())
        }

        /// Close the open epoch and open `next_index`.
        ///
        /// Closing fixes the participant count and reserves
        /// `min(reward_rate, token_reserve)` reward tokens for claimants.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(60_000_000, 0))]
        pub fn new_epoch(origin: OriginFor<T>, next_index: EpochIndex) -> DispatchResult {
            ensure_signed(origin)?;
            let mut params = Self::params()?;

            let current = CurrentEpoch::<T>::get().ok_or(Error::<T>::NotInitialized)?;
            ensure!(current.checked_add(1) == Some(next_index), Error::<T>::InvalidSequence);

            let mut previous = Epochs::<T>::get(current).ok_or(Error::<T>::UnknownEpoch)?;
            ensure!(previous.is_open(), Error::<T>::EpochClosed);

            let now = Self::now();
            ensure!(
                epoch_elapsed(previous.opened_at, previous.terms.epoch_duration, now),
                Error::<T>::EpochNotElapsed
            );

            let mut treasury = Treasury::<T>::get();
            let pool = reward_pool(previous.terms.reward_rate, treasury.token_reserve);
            treasury.token_reserve = treasury
                .token_reserve
                .checked_sub(pool)
                .ok_or(Error::<T>::InsufficientFunds)?;
            treasury.committed_rewards = treasury
                .committed_rewards
                .checked_add(pool)
                .ok_or(Error::<T>::ArithmeticOverflow)?;

            if pool < previous.terms.reward_rate {
                log::warn!(
                    target: LOG_TARGET,
                    "Epoch {} closes underfunded: pool {} of {} requested",
                    current,
                    pool,
                    previous.terms.reward_rate
                );
            }

            previous.state = EpochState::Closed;
            previous.closed_at = Some(now);
            previous.reward_pool = pool;

            // epoch 1 keeps the genesis rate, decay starts with epoch 2
            if next_index > 1 {
                params.reward_rate = decayed_reward(params.reward_rate, params.reward_decay);
            }
            let terms = params.terms();

            Epochs::<T>::insert(current, &previous);
            Treasury::<T>::put(treasury);
            GlobalParams::<T>::put(params);

            log::info!(
                target: LOG_TARGET,
                "Epoch {} closed: {} participants, reward pool {}",
                current,
                previous.total_participants,
                pool
            );
            Self::deposit_event(Event::EpochClosed {
                index: current,
                total_participants: previous.total_participants,
                reward_pool: pool,
            });

            Self::open_epoch(next_index, now, terms);
            Ok(())
        }

        /// Register for the open epoch, paying the current bonding-curve fee.
        ///
        /// `max_fee` rejects the call if earlier registrations in the same
        /// epoch pushed the fee above what the caller expected.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(50_000_000, 0))]
        pub fn mine(
            origin: OriginFor<T>,
            epoch_index: EpochIndex,
            max_fee: Option<Balance>,
        ) -> DispatchResult {
            let who = ensure_signed(origin)?;

            let mut epoch = Epochs::<T>::get(epoch_index).ok_or(Error::<T>::UnknownEpoch)?;
            ensure!(epoch.is_open(), Error::<T>::EpochClosed);
            ensure!(
                !Participations::<T>::contains_key(epoch_index, &who),
                Error::<T>::AlreadyRegistered
            );

            let fee = epoch.next_fee().ok_or(Error::<T>::ArithmeticOverflow)?;
            if let Some(limit) = max_fee {
                ensure!(fee <= limit, Error::<T>::FeeLimitExceeded);
            }

            epoch.total_participants = epoch
                .total_participants
                .checked_add(1)
                .ok_or(Error::<T>::ArithmeticOverflow)?;
            epoch.fees_collected =
                epoch.fees_collected.checked_add(fee).ok_or(Error::<T>::ArithmeticOverflow)?;

            let mut treasury = Treasury::<T>::get();
            treasury.fee_balance =
                treasury.fee_balance.checked_add(fee).ok_or(Error::<T>::ArithmeticOverflow)?;

            if fee > 0 {
                let amount: BalanceOf<T> =
                    fee.try_into().map_err(|_| Error::<T>::ArithmeticOverflow)?;
                ensure!(T::Currency::free_balance(&who) >= amount, Error::<T>::InsufficientFunds);
                T::Currency::transfer(
                    &who,
                    &Self::pallet_account(),
                    amount,
                    ExistenceRequirement::KeepAlive,
                )?;
            }

            Participations::<T>::insert(
                epoch_index,
                &who,
                Participation { epoch: epoch_index, registered: true, claimed: false, fee_paid: fee },
            );
            Epochs::<T>::insert(epoch_index, &epoch);
            Treasury::<T>::put(treasury);

            log::info!(
                target: LOG_TARGET,
                "Miner #{} registered for epoch {} (fee {})",
                epoch.total_participants,
                epoch_index,
                fee
            );
            Self::deposit_event(Event::Mined { who, epoch: epoch_index, fee });
            Ok(())
        }

        /// Deposit reward tokens into the reserve. Open to anyone.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(40_000_000, 0))]
        pub fn fund_program_token(origin: OriginFor<T>, amount: Balance) -> DispatchResult {
            let who = ensure_signed(origin)?;
            ensure!(amount > 0, Error::<T>::InvalidAmount);
            let params = Self::params()?;

            let mut treasury = Treasury::<T>::get();
            treasury.token_reserve =
                treasury.token_reserve.checked_add(amount).ok_or(Error::<T>::ArithmeticOverflow)?;

            let tokens: AssetBalanceOf<T> =
                amount.try_into().map_err(|_| Error::<T>::ArithmeticOverflow)?;
            ensure!(
                <T::Assets as fungibles::Inspect<T::AccountId>>::balance(
                    params.reward_token.clone(),
                    &who
                ) >= tokens,
                Error::<T>::InsufficientFunds
            );
            <T::Assets as fungibles::Mutate<T::AccountId>>::transfer(
                params.reward_token,
                &who,
                &Self::pallet_account(),
                tokens,
                Preservation::Expendable,
            )?;

            Treasury::<T>::put(treasury);

            log::info!(target: LOG_TARGET, "Reward reserve funded with {}", amount);
            Self::deposit_event(Event::ProgramFunded { who, amount });
            Ok(())
        }

        /// Move collected registration fees to the admin.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(40_000_000, 0))]
        pub fn withdraw_fees(origin: OriginFor<T>, amount: Balance) -> DispatchResult {
            let who = ensure_signed(origin)?;
            Self::ensure_admin(&who)?;
            ensure!(amount > 0, Error::<T>::InvalidAmount);

            let mut treasury = Treasury::<T>::get();
            treasury.fee_balance =
                treasury.fee_balance.checked_sub(amount).ok_or(Error::<T>::InsufficientFunds)?;

            let value: BalanceOf<T> =
                amount.try_into().map_err(|_| Error::<T>::ArithmeticOverflow)?;
            T::Currency::transfer(
                &Self::pallet_account(),
                &who,
                value,
                ExistenceRequirement::AllowDeath,
            )?;

            let remaining = treasury.fee_balance;
            Treasury::<T>::put(treasury);

            log::info!(target: LOG_TARGET, "Withdrew {} in fees, {} left", amount, remaining);
            Self::deposit_event(Event::FeesWithdrawn { admin: who, amount });
            Ok(())
        }

        /// Collect the caller's share of a closed epoch's reward pool.
        #[pallet::call_index(7)]
        #[pallet::weight(Weight::from_parts(50_000_000, 0))]
        pub fn claim(origin: OriginFor<T>, epoch_index: EpochIndex) -> DispatchResult {
            let who = ensure_signed(origin)?;

            let mut record =
                Participations::<T>::get(epoch_index, &who).ok_or(Error::<T>::NotRegistered)?;
            ensure!(record.registered, Error::<T>::NotRegistered);
            ensure!(!record.claimed, Error::<T>::AlreadyClaimed);

            let mut epoch = Epochs::<T>::get(epoch_index).ok_or(Error::<T>::UnknownEpoch)?;
            ensure!(epoch.state == EpochState::Closed, Error::<T>::EpochStillOpen);

            let share = epoch.share().ok_or(Error::<T>::ArithmeticOverflow)?;

            let mut treasury = Treasury::<T>::get();
            treasury.committed_rewards = treasury
                .committed_rewards
                .checked_sub(share)
                .ok_or(Error::<T>::InsufficientFunds)?;
            epoch.rewards_claimed =
                epoch.rewards_claimed.checked_add(share).ok_or(Error::<T>::ArithmeticOverflow)?;
            ensure!(epoch.rewards_claimed <= epoch.reward_pool, Error::<T>::InsufficientFunds);

            if share > 0 {
                let params = Self::params()?;
                let tokens: AssetBalanceOf<T> =
                    share.try_into().map_err(|_| Error::<T>::ArithmeticOverflow)?;
                <T::Assets as fungibles::Mutate<T::AccountId>>::transfer(
                    params.reward_token,
                    &Self::pallet_account(),
                    &who,
                    tokens,
                    Preservation::Expendable,
                )?;
            }

            record.claimed = true;
            Participations::<T>::insert(epoch_index, &who, record);
            Epochs::<T>::insert(epoch_index, &epoch);
            Treasury::<T>::put(treasury);

            log::info!(target: LOG_TARGET, "Claimed {} for epoch {}", share, epoch_index);
            Self::deposit_event(Event::Claimed { who, epoch: epoch_index, amount: share });
            Ok(())
        }

        /// Set the factor applied to `reward_rate` each time an epoch from
        /// index 2 onwards opens. Epoch 1 always inherits the genesis rate.
        #[pallet::call_index(8)]
        #[pallet::weight(Weight::from_parts(20_000_000, 0))]
        pub fn set_reward_decay(origin: OriginFor<T>, decay: Perbill) -> DispatchResult {
            let who = ensure_signed(origin)?;
            let mut params = Self::ensure_admin(&who)?;

            params.reward_decay = decay;
            GlobalParams::<T>::put(params);

            Self::deposit_event(Event::RewardDecayChanged { decay });
            Ok(())
        }
    }

    impl<T: Config> Pallet<T> {
        /// Account holding fees and reward tokens
        pub fn pallet_account() -> T::AccountId {
            T::PalletId::get().into_account_truncating()
        }

        /// Fee the next `mine` in the open epoch would pay (for UI/RPC)
        pub fn current_fee() -> Option<Balance> {
            let index = CurrentEpoch::<T>::get()?;
            Epochs::<T>::get(index)?.next_fee()
        }

        /// Share `who` could claim right now for `epoch_index`
        pub fn pending_reward(epoch_index: EpochIndex, who: &T::AccountId) -> Option<Balance> {
            let record = Participations::<T>::get(epoch_index, who)?;
            if !record.registered || record.claimed {
                return None;
            }
            let epoch = Epochs::<T>::get(epoch_index)?;
            if epoch.is_open() {
                return None;
            }
            epoch.share()
        }

        /// Earliest timestamp at which the epoch may be closed
        pub fn epoch_ends_at(epoch_index: EpochIndex) -> Option<Moment> {
            Epochs::<T>::get(epoch_index)?.ends_at()
        }

        /// Raw storage key of an epoch record
        pub fn epoch_storage_key(epoch_index: EpochIndex) -> Vec<u8> {
            Epochs::<T>::hashed_key_for(epoch_index)
        }

        /// Raw storage key of a participation record
        pub fn participation_storage_key(epoch_index: EpochIndex, who: &T::AccountId) -> Vec<u8> {
            Participations::<T>::hashed_key_for(epoch_index, who)
        }

        fn params() -> Result<GlobalParametersOf<T>, DispatchError> {
            GlobalParams::<T>::get().ok_or_else(|| Error::<T>::NotInitialized.into())
        }

        fn ensure_admin(who: &T::AccountId) -> Result<GlobalParametersOf<T>, DispatchError> {
            let params = Self::params()?;
            ensure!(&params.admin == who, Error::<T>::Unauthorized);
            Ok(params)
        }

        fn now() -> Moment {
            pallet_timestamp::Pallet::<T>::get().saturated_into::<Moment>()
        }

        fn open_epoch(index: EpochIndex, now: Moment, terms: EpochTerms) {
            Epochs::<T>::insert(index, EpochInfo::open(index, now, terms));
            CurrentEpoch::<T>::put(index);

            log::info!(
                target: LOG_TARGET,
                "Epoch {} opened at {} (duration {}ms, reward rate {})",
                index,
                now,
                terms.epoch_duration,
                terms.reward_rate
            );
            Self::deposit_event(Event::EpochOpened { index, opened_at: now });
        }
    }
}
