//! Database entities backing the game ledgers.

pub mod claim_settlement;
pub mod faucet;
pub mod pending_claim;
pub mod player;
pub mod prelude;
