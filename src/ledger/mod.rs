//! Local game ledgers: per-(faucet, player) pending value and per-faucet
//! supply mirrors. Settlement against the external ledger lives in the
//! engine; these modules only answer for local storage.

pub mod pending;
pub mod supply;
