use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use tokio::time::sleep;

/// Outcome states reported by the ledger node for a submitted claim.
pub const OUTCOME_CONFIRMED: &str = "confirmed";
pub const OUTCOME_REJECTED: &str = "rejected";
pub const OUTCOME_PENDING: &str = "pending";

/// How a faucet reaches its funds on the external ledger.
///
/// `Direct` faucets own a funded contract; `Managed` faucets settle through a
/// shared manager contract and are identified on it by a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractBinding {
    Direct {
        contract_address: String,
    },
    Managed {
        manager_address: String,
        faucet_key: String,
    },
}

impl ContractBinding {
    /// Stable key for caching per-binding values such as the mine unit.
    pub fn cache_key(&self) -> String {
        match self {
            ContractBinding::Direct { contract_address } => contract_address.clone(),
            ContractBinding::Managed {
                manager_address,
                faucet_key,
            } => format!("{manager_address}::{faucet_key}"),
        }
    }

    pub fn address(&self) -> &str {
        match self {
            ContractBinding::Direct { contract_address } => contract_address,
            ContractBinding::Managed {
                manager_address, ..
            } => manager_address,
        }
    }
}

#[derive(Clone)]
pub struct RpcClient {
    inner: HttpClient,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        assert!(
            self.timeout >= Duration::from_millis(100),
            "Timeout invariant broken"
        );
        assert!(
            self.timeout <= Duration::from_secs(60),
            "Timeout exceeds maximum bound"
        );
        self.timeout
    }

    /// Current faucet balance on the ledger, in base units.
    pub async fn read_balance(&self, binding: &ContractBinding) -> Result<u64> {
        let response: BalanceResponse = match binding {
            ContractBinding::Direct { contract_address } => self
                .inner
                .request("faucet_getBalance", rpc_params![contract_address])
                .await
                .context("RPC call faucet_getBalance failed")?,
            ContractBinding::Managed {
                manager_address,
                faucet_key,
            } => self
                .inner
                .request(
                    "manager_faucetBalance",
                    rpc_params![manager_address, faucet_key],
                )
                .await
                .context("RPC call manager_faucetBalance failed")?,
        };
        assert!(
            response.balance <= i64::MAX as u64,
            "Balance exceeds storage bounds"
        );
        Ok(response.balance)
    }

    /// Value of one mine grant, in base units.
    pub async fn read_mine_unit_value(&self, binding: &ContractBinding) -> Result<u64> {
        let response: UnitValueResponse = match binding {
            ContractBinding::Direct { contract_address } => self
                .inner
                .request("faucet_mineUnitValue", rpc_params![contract_address])
                .await
                .context("RPC call faucet_mineUnitValue failed")?,
            ContractBinding::Managed {
                manager_address,
                faucet_key,
            } => self
                .inner
                .request(
                    "manager_mineUnitValue",
                    rpc_params![manager_address, faucet_key],
                )
                .await
                .context("RPC call manager_mineUnitValue failed")?,
        };
        if response.mine_unit_value == 0 {
            return Err(anyhow!("Ledger reported a zero mine unit value"));
        }
        assert!(
            response.mine_unit_value <= i64::MAX as u64,
            "Mine unit value exceeds storage bounds"
        );
        Ok(response.mine_unit_value)
    }

    /// Claim cooldown state for one account.
    pub async fn read_cooldown(
        &self,
        binding: &ContractBinding,
        account: &str,
    ) -> Result<CooldownStatus> {
        assert!(!account.is_empty(), "Account address must be provided");
        let response: CooldownStatus = match binding {
            ContractBinding::Direct { contract_address } => self
                .inner
                .request("faucet_cooldown", rpc_params![contract_address, account])
                .await
                .context("RPC call faucet_cooldown failed")?,
            ContractBinding::Managed {
                manager_address,
                faucet_key,
            } => self
                .inner
                .request(
                    "manager_cooldown",
                    rpc_params![manager_address, faucet_key, account],
                )
                .await
                .context("RPC call manager_cooldown failed")?,
        };
        assert!(
            response.seconds_remaining <= 31_536_000,
            "Cooldown sanity check failed"
        );
        Ok(response)
    }

    /// Submit a claim for settlement. `claim_ref` is the idempotency key the
    /// node binds the transaction to; outcome polling queries by it, so a
    /// lost response does not orphan the claim.
    pub async fn submit_claim(
        &self,
        binding: &ContractBinding,
        account: &str,
        amount: u64,
        claim_ref: &str,
    ) -> Result<SubmittedClaim> {
        assert!(!account.is_empty(), "Account address must be provided");
        assert!(amount > 0, "Claim amount must be positive");
        assert!(!claim_ref.is_empty(), "Claim reference must be provided");

        let mut params = ObjectParams::new();
        match binding {
            ContractBinding::Direct { contract_address } => {
                params
                    .insert("contract", contract_address)
                    .context("Failed to encode contract parameter")?;
            }
            ContractBinding::Managed {
                manager_address,
                faucet_key,
            } => {
                params
                    .insert("manager", manager_address)
                    .context("Failed to encode manager parameter")?;
                params
                    .insert("faucet_key", faucet_key)
                    .context("Failed to encode faucet_key parameter")?;
            }
        }
        params
            .insert("account", account)
            .context("Failed to encode account parameter")?;
        params
            .insert("amount", amount)
            .context("Failed to encode amount parameter")?;
        params
            .insert("claim_ref", claim_ref)
            .context("Failed to encode claim_ref parameter")?;

        let method = match binding {
            ContractBinding::Direct { .. } => "faucet_submitClaim",
            ContractBinding::Managed { .. } => "manager_submitClaim",
        };
        let response: SubmittedClaim = self
            .inner
            .request(method, params)
            .await
            .with_context(|| format!("RPC call {method} failed"))?;

        assert!(
            !response.tx_hash.is_empty(),
            "RPC returned empty transaction hash"
        );
        Ok(response)
    }

    /// Point-in-time outcome of a submitted claim.
    pub async fn claim_outcome(&self, claim_ref: &str) -> Result<ClaimOutcome> {
        assert!(!claim_ref.is_empty(), "Claim reference must be provided");
        let response: ClaimOutcome = self
            .inner
            .request("faucet_claimOutcome", rpc_params![claim_ref])
            .await
            .context("RPC call faucet_claimOutcome failed")?;
        Ok(screen_outcome(response))
    }

    /// Poll the claim outcome until it resolves or the budget runs out.
    ///
    /// Returns the last observation: a still-`pending` outcome after the
    /// budget, or an error when every poll failed, both mean the caller must
    /// treat the settlement as unknown rather than failed.
    pub async fn await_confirmation(
        &self,
        claim_ref: &str,
        poll_interval: Duration,
        budget: Duration,
    ) -> Result<ClaimOutcome> {
        assert!(
            poll_interval >= Duration::from_millis(100),
            "Poll interval below 100ms is unsafe"
        );
        assert!(budget >= poll_interval, "Budget must cover at least one poll");

        let started = Instant::now();
        let mut last: Result<ClaimOutcome> = Err(anyhow!(
            "Claim outcome was never observed within the confirmation budget"
        ));
        loop {
            match self.claim_outcome(claim_ref).await {
                Ok(outcome)
                    if outcome.status == OUTCOME_CONFIRMED
                        || outcome.status == OUTCOME_REJECTED =>
                {
                    return Ok(outcome);
                }
                observed => last = observed,
            }
            if started.elapsed() + poll_interval >= budget {
                return last;
            }
            sleep(poll_interval).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    pub balance: u64,
}

#[derive(Debug, Deserialize)]
struct UnitValueResponse {
    pub mine_unit_value: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownStatus {
    pub can_claim: bool,
    pub seconds_remaining: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedClaim {
    pub tx_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimOutcome {
    /// One of `confirmed`, `rejected`, `pending`. Anything unrecognized is
    /// handled as `pending` by callers, which is the conservative reading.
    pub status: String,
    /// Amount actually moved, reported on confirmation
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Ledger-supplied reason on rejection
    #[serde(default)]
    pub reason: Option<String>,
}

/// Sanity bounds on the figures an outcome poll reports, checked at the
/// boundary like every other read. An amount that cannot be stored must not
/// reach settlement.
fn screen_outcome(outcome: ClaimOutcome) -> ClaimOutcome {
    assert!(!outcome.status.is_empty(), "RPC returned empty status");
    assert!(
        outcome.amount.unwrap_or(0) <= i64::MAX as u64,
        "Settled amount exceeds storage bounds"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_screen_passes_sane_reports() {
        let reported = screen_outcome(ClaimOutcome {
            status: OUTCOME_CONFIRMED.to_string(),
            amount: Some(30_000_000),
            tx_hash: Some("0xf00d".to_string()),
            reason: None,
        });
        assert_eq!(reported.amount, Some(30_000_000), "Sane amounts pass through");

        // An absent amount is a legitimate report; the submit-time snapshot
        // covers settlement in that case.
        let quiet = screen_outcome(ClaimOutcome {
            status: OUTCOME_PENDING.to_string(),
            amount: None,
            tx_hash: None,
            reason: None,
        });
        assert!(quiet.amount.is_none(), "Absent amounts pass through");
    }

    #[test]
    #[should_panic(expected = "Settled amount exceeds storage bounds")]
    fn outcome_screen_rejects_unstorable_amounts() {
        screen_outcome(ClaimOutcome {
            status: OUTCOME_CONFIRMED.to_string(),
            amount: Some(u64::MAX),
            tx_hash: None,
            reason: None,
        });
    }
}
