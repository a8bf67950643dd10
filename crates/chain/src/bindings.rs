//! Contract bindings for the subnet registry.

use alloy::sol;
use zkminer_core::MemberRecord;

// Generate SubnetRegistry contract bindings
sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract SubnetRegistry {
        struct Member {
            address hotkey;
            uint64 stake;
            uint16 rank;
            uint16 trust;
            uint16 consensus;
            uint16 incentive;
            uint64 emission;
        }

        function members(uint16 netuid) external view returns (Member[] memory);
        function setWeights(uint16 netuid, uint16[] calldata uids, uint16[] calldata weights) external;
    }
}

impl From<SubnetRegistry::Member> for MemberRecord {
    fn from(m: SubnetRegistry::Member) -> Self {
        MemberRecord::from_raw(
            m.hotkey,
            m.stake,
            m.rank,
            m.trust,
            m.consensus,
            m.incentive,
            m.emission,
        )
    }
}
