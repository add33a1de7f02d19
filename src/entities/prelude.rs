#![allow(unused_imports)]

pub use super::claim_settlement::Entity as ClaimSettlement;
pub use super::faucet::Entity as Faucet;
pub use super::pending_claim::Entity as PendingClaim;
pub use super::player::Entity as Player;
