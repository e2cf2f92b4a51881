use crate as pallet_epoch_mining;
use epoch_mining_primitives::{
    Balance, DEFAULT_FEE_BASE, DEFAULT_FEE_GROWTH_RATE, DEFAULT_REWARD_DECAY, DEFAULT_REWARD_RATE,
    UNIT,
};
use frame_support::{
    assert_ok, derive_impl, parameter_types,
    traits::{fungibles, AsEnsureOriginWithArg, ConstU128, ConstU32, ConstU64},
    PalletId,
};
use frame_system::{EnsureRoot, EnsureSigned};
use sp_runtime::{traits::IdentityLookup, BuildStorage, Perbill};

type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
    pub enum Test {
        System: frame_system,
        Timestamp: pallet_timestamp,
        Balances: pallet_balances,
        Assets: pallet_assets,
        EpochMining: pallet_epoch_mining,
    }
);

pub const ADMIN: u64 = 1;
pub const ALICE: u64 = 2;
pub const BOB: u64 = 3;
pub const CHARLIE: u64 = 4;
/// Holds almost no native currency and no reward tokens
pub const DAVE: u64 = 5;

pub const REWARD_ASSET: u32 = 7;
/// 10 seconds
pub const EPOCH_DURATION: u64 = 10_000;
pub const GENESIS_TIME: u64 = 1_000_000;

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
    type Block = Block;
    type AccountId = u64;
    type Lookup = IdentityLookup<Self::AccountId>;
    type AccountData = pallet_balances::AccountData<Balance>;
}

impl pallet_timestamp::Config for Test {
    type Moment = u64;
    type OnTimestampSet = ();
    type MinimumPeriod = ConstU64<1>;
    type WeightInfo = ();
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
    type Balance = Balance;
    type ExistentialDeposit = ConstU128<1>;
    type AccountStore = System;
}

impl pallet_assets::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Balance = Balance;
    type RemoveItemsLimit = ConstU32<1000>;
    type AssetId = u32;
    type AssetIdParameter = u32;
    type Currency = Balances;
    type CreateOrigin = AsEnsureOriginWithArg<EnsureSigned<u64>>;
    type ForceOrigin = EnsureRoot<u64>;
    type AssetDeposit = ConstU128<1>;
    type AssetAccountDeposit = ConstU128<10>;
    type MetadataDepositBase = ConstU128<1>;
    type MetadataDepositPerByte = ConstU128<1>;
    type ApprovalDeposit = ConstU128<1>;
    type StringLimit = ConstU32<50>;
    type Freezer = ();
    type Extra = ();
    type CallbackHandle = ();
    type WeightInfo = ();
    #[cfg(feature = "runtime-benchmarks")]
    type BenchmarkHelper = ();
}

parameter_types! {
    pub const EpochMiningPalletId: PalletId = PalletId(*b"epochmin");
    pub const RewardDecay: Perbill = DEFAULT_REWARD_DECAY;
}

impl pallet_epoch_mining::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Currency = Balances;
    type Assets = Assets;
    type InitializeOrigin = EnsureRoot<u64>;
    type PalletId = EpochMiningPalletId;
    type DefaultEpochDuration = ConstU64<EPOCH_DURATION>;
    type DefaultFeeBase = ConstU128<DEFAULT_FEE_BASE>;
    type DefaultFeeGrowthRate = ConstU128<DEFAULT_FEE_GROWTH_RATE>;
    type DefaultRewardRate = ConstU128<DEFAULT_REWARD_RATE>;
    type DefaultRewardDecay = RewardDecay;
}

pub fn new_test_ext() -> sp_io::TestExternalities {
    let mut t = frame_system::GenesisConfig::<Test>::default()
        .build_storage()
        .unwrap();

    pallet_balances::GenesisConfig::<Test> {
        balances: vec![
            (ADMIN, 1_000 * UNIT),
            (ALICE, 10 * UNIT),
            (BOB, 10 * UNIT),
            (CHARLIE, 10 * UNIT),
            (DAVE, 10),
        ],
        ..Default::default()
    }
    .assimilate_storage(&mut t)
    .unwrap();

    let mut ext: sp_io::TestExternalities = t.into();
    ext.execute_with(|| {
        System::set_block_number(1);
        Timestamp::set_timestamp(GENESIS_TIME);
        assert_ok!(<Assets as fungibles::Create<u64>>::create(REWARD_ASSET, ADMIN, true, 1));
        assert_ok!(<Assets as fungibles::Mutate<u64>>::mint_into(REWARD_ASSET, &ADMIN, 1_000_000));
        assert_ok!(<Assets as fungibles::Mutate<u64>>::mint_into(REWARD_ASSET, &ALICE, 100_000));
    });
    ext
}

/// `initialize` + `initialize_epoch(0)` at `GENESIS_TIME`
pub fn new_started_ext() -> sp_io::TestExternalities {
    let mut ext = new_test_ext();
    ext.execute_with(|| {
        assert_ok!(EpochMining::initialize(RuntimeOrigin::root(), ADMIN, REWARD_ASSET));
        assert_ok!(EpochMining::initialize_epoch(RuntimeOrigin::signed(ADMIN), 0));
    });
    ext
}

pub fn advance_time(ms: u64) {
    Timestamp::set_timestamp(Timestamp::get() + ms);
}

pub fn token_balance(who: u64) -> Balance {
    <Assets as fungibles::Inspect<u64>>::balance(REWARD_ASSET, &who)
}

pub fn native_balance(who: u64) -> Balance {
    Balances::free_balance(who)
}
