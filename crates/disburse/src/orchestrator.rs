//! The disbursement state machine.
//!
//! Phases advance strictly in order within one attempt:
//! `Idle → Filtering → AwaitingApproval → [Approving →] ApprovalConfirmed →
//! Transferring → Completed`, with `Failed` reachable from any chain
//! interaction. The machine never auto-retries: after `Failed` the operator
//! re-invokes `execute`, which re-enters at `AwaitingApproval` and re-reads
//! the allowance, making resumption idempotent.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use meritdrop_core::{Address, UserRecord};
use meritdrop_eligibility::EligibilityCriterion;
use meritdrop_settlement::{ChainError, TokenClient, TxReceipt};

use crate::{DisburseError, DisbursementPlan, Result};

/// Where a disbursement attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisbursePhase {
    Idle,
    Filtering,
    AwaitingApproval,
    Approving,
    ApprovalConfirmed,
    Transferring,
    Completed,
    Failed,
}

impl fmt::Display for DisbursePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisbursePhase::Idle => "idle",
            DisbursePhase::Filtering => "filtering",
            DisbursePhase::AwaitingApproval => "awaiting approval",
            DisbursePhase::Approving => "approving",
            DisbursePhase::ApprovalConfirmed => "approval confirmed",
            DisbursePhase::Transferring => "transferring",
            DisbursePhase::Completed => "completed",
            DisbursePhase::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Orchestrates one disbursement at a time against the chain client.
///
/// Holds the phase explicitly (rather than in per-call state) so it can be
/// observed from other tasks and tested without a UI in front of it.
pub struct Disburser {
    client: Arc<TokenClient>,
    phase: RwLock<DisbursePhase>,
    abandoned: AtomicBool,
    abandon_signal: Notify,
}

impl Disburser {
    pub fn new(client: Arc<TokenClient>) -> Self {
        Self {
            client,
            phase: RwLock::new(DisbursePhase::Idle),
            abandoned: AtomicBool::new(false),
            abandon_signal: Notify::new(),
        }
    }

    pub fn phase(&self) -> DisbursePhase {
        *self.phase.read().expect("phase lock poisoned")
    }

    fn set_phase(&self, next: DisbursePhase) {
        let mut phase = self.phase.write().expect("phase lock poisoned");
        debug!(from = %phase, to = %next, "phase transition");
        *phase = next;
    }

    /// Stop waiting on the current attempt and return to `Idle` locally.
    ///
    /// Transactions already submitted to the network cannot be revoked;
    /// only the local wait is cancelled.
    pub fn abandon(&self) {
        warn!("abandoning disbursement; submitted transactions are not revocable");
        self.abandoned.store(true, Ordering::SeqCst);
        self.abandon_signal.notify_waiters();
    }

    /// Filter the recipient set and build a validated plan.
    ///
    /// Reads the token's decimal count from the chain; an unreadable
    /// decimals value counts as a missing input. On any validation failure
    /// the machine returns to `Idle`.
    pub async fn prepare(
        &self,
        records: &[UserRecord],
        criterion: &EligibilityCriterion,
        token: Address,
        amount_each: &str,
    ) -> Result<DisbursementPlan> {
        self.abandoned.store(false, Ordering::SeqCst);
        self.set_phase(DisbursePhase::Filtering);

        let eligible = meritdrop_eligibility::filter(records, Some(criterion));
        let recipients = meritdrop_eligibility::wallets(&eligible);
        debug!(
            candidates = records.len(),
            eligible = recipients.len(),
            %criterion,
            "filtered recipients"
        );

        let decimals = match self.client.decimals(token).await {
            Ok(d) => d,
            Err(e) => {
                self.set_phase(DisbursePhase::Idle);
                return Err(DisburseError::Validation(format!(
                    "token decimals unavailable: {e}"
                )));
            }
        };

        let plan = match DisbursementPlan::build(token, decimals, amount_each, recipients) {
            Ok(plan) => plan,
            Err(e) => {
                self.set_phase(DisbursePhase::Idle);
                return Err(e);
            }
        };

        info!(
            %token,
            recipients = plan.recipients.len(),
            total_base = plan.total_base,
            "disbursement plan ready"
        );
        self.set_phase(DisbursePhase::AwaitingApproval);
        Ok(plan)
    }

    /// Execute a prepared plan: approve if the allowance is short, then
    /// submit the batch transfer.
    ///
    /// May be called again after `Failed`; it re-enters at
    /// `AwaitingApproval` and re-reads the allowance, so a resumed attempt
    /// that already approved skips straight to the transfer.
    pub async fn execute(&self, plan: &DisbursementPlan) -> Result<TxReceipt> {
        {
            let mut phase = self.phase.write().expect("phase lock poisoned");
            match *phase {
                DisbursePhase::AwaitingApproval => {}
                DisbursePhase::Failed => {
                    debug!("resuming from failed attempt");
                    *phase = DisbursePhase::AwaitingApproval;
                }
                other => {
                    return Err(DisburseError::Validation(format!(
                        "cannot execute while {other}"
                    )));
                }
            }
        }

        let owner = self.client.config().operator;
        let spender = self.client.config().disburse_contract;

        let allowance = self
            .client
            .allowance(plan.token, owner, spender)
            .await
            .map_err(|e| self.fail(DisbursePhase::AwaitingApproval, e))?;

        if allowance < plan.total_base {
            info!(
                current = allowance,
                required = plan.total_base,
                "allowance insufficient, approval needed"
            );
            self.checkpoint()?;
            self.set_phase(DisbursePhase::Approving);
            let tx = self
                .client
                .approve(plan.token, spender, plan.total_base)
                .await
                .map_err(|e| self.fail(DisbursePhase::Approving, e))?;
            let receipt = self.wait(tx, DisbursePhase::Approving).await?;
            if !receipt.success {
                return Err(self.fail(
                    DisbursePhase::Approving,
                    ChainError::TransactionFailed(format!(
                        "approval 0x{} reverted",
                        hex::encode(receipt.tx_hash)
                    )),
                ));
            }
        } else {
            info!(
                current = allowance,
                required = plan.total_base,
                "allowance already sufficient, skipping approval"
            );
        }
        self.set_phase(DisbursePhase::ApprovalConfirmed);

        // Never trust the earlier read: re-check immediately before the
        // transfer so a raced-away allowance fails here, not on-chain.
        let fresh = self
            .client
            .allowance(plan.token, owner, spender)
            .await
            .map_err(|e| self.fail(DisbursePhase::ApprovalConfirmed, e))?;
        if fresh < plan.total_base {
            return Err(self.fail(
                DisbursePhase::ApprovalConfirmed,
                ChainError::TransactionFailed(format!(
                    "allowance {fresh} below required {} at transfer time",
                    plan.total_base
                )),
            ));
        }

        self.checkpoint()?;
        self.set_phase(DisbursePhase::Transferring);
        let amounts = plan.amounts();
        let tx = self
            .client
            .bulk_disburse(plan.token, &plan.recipients, &amounts, plan.total_base)
            .await
            .map_err(|e| self.fail(DisbursePhase::Transferring, e))?;
        let receipt = self.wait(tx, DisbursePhase::Transferring).await?;
        if !receipt.success {
            return Err(self.fail(
                DisbursePhase::Transferring,
                ChainError::TransactionFailed(format!(
                    "transfer 0x{} reverted",
                    hex::encode(receipt.tx_hash)
                )),
            ));
        }

        self.set_phase(DisbursePhase::Completed);
        info!(
            tx = %format!("0x{}", hex::encode(receipt.tx_hash)),
            recipients = plan.recipients.len(),
            total_base = plan.total_base,
            "disbursement completed"
        );
        Ok(receipt)
    }

    /// Bail out to `Idle` if the operator abandoned between phases.
    fn checkpoint(&self) -> Result<()> {
        if self.abandoned.swap(false, Ordering::SeqCst) {
            self.set_phase(DisbursePhase::Idle);
            return Err(DisburseError::Abandoned);
        }
        Ok(())
    }

    /// Wait for a receipt, racing against abandonment.
    async fn wait(&self, tx: meritdrop_core::TxHash, phase: DisbursePhase) -> Result<TxReceipt> {
        tokio::select! {
            receipt = self.client.wait_for_receipt(tx) => {
                receipt.map_err(|e| self.fail(phase, e))
            }
            _ = self.abandon_signal.notified() => {
                self.abandoned.store(false, Ordering::SeqCst);
                self.set_phase(DisbursePhase::Idle);
                Err(DisburseError::Abandoned)
            }
        }
    }

    fn fail(&self, phase: DisbursePhase, source: ChainError) -> DisburseError {
        warn!(%phase, %source, "disbursement failed");
        self.set_phase(DisbursePhase::Failed);
        DisburseError::Chain { phase, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meritdrop_core::{Profile, ScoreField, ScoreSet};
    use meritdrop_settlement::ChainConfig;

    const OPERATOR: [u8; 20] = [0x0a; 20];
    const CONTRACT: [u8; 20] = [0x0b; 20];
    const TOKEN: [u8; 20] = [0xee; 20];

    fn record(id: u64, skills: u32) -> UserRecord {
        let mut wallet = [0u8; 20];
        wallet[19] = id as u8;
        UserRecord {
            id,
            wallet: Address::new(wallet),
            scores: ScoreSet {
                skills,
                ..ScoreSet::default()
            },
            profile: Profile {
                display_name: format!("user-{id}"),
                ..Profile::default()
            },
        }
    }

    fn setup() -> (Arc<TokenClient>, Disburser) {
        let client = Arc::new(TokenClient::new(ChainConfig::mock(
            Address::new(OPERATOR),
            Address::new(CONTRACT),
        )));
        client.register_token(Address::new(TOKEN), 6);
        let disburser = Disburser::new(client.clone());
        (client, disburser)
    }

    fn criterion() -> EligibilityCriterion {
        EligibilityCriterion::new(ScoreField::Skills, 80)
    }

    #[tokio::test]
    async fn prepare_builds_plan_and_awaits_approval() {
        let (_, disburser) = setup();
        let records = vec![record(1, 90), record(2, 40), record(3, 85)];

        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "1")
            .await
            .unwrap();

        assert_eq!(plan.recipients.len(), 2);
        assert_eq!(plan.recipients[0], records[0].wallet);
        assert_eq!(plan.recipients[1], records[2].wallet);
        assert_eq!(plan.total_base, 2_000_000);
        assert_eq!(disburser.phase(), DisbursePhase::AwaitingApproval);
    }

    #[tokio::test]
    async fn prepare_with_no_eligible_recipients_stays_idle() {
        let (_, disburser) = setup();
        let records = vec![record(1, 10)];

        let err = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "1")
            .await
            .unwrap_err();

        assert!(matches!(err, DisburseError::Validation(_)));
        assert_eq!(disburser.phase(), DisbursePhase::Idle);
    }

    #[tokio::test]
    async fn prepare_with_unknown_token_stays_idle() {
        let (_, disburser) = setup();
        let records = vec![record(1, 90)];

        let err = disburser
            .prepare(&records, &criterion(), Address::new([0x77; 20]), "1")
            .await
            .unwrap_err();

        assert!(matches!(err, DisburseError::Validation(_)));
        assert_eq!(disburser.phase(), DisbursePhase::Idle);
    }

    #[tokio::test]
    async fn sufficient_allowance_skips_approval() {
        let (client, disburser) = setup();
        // allowance 1000, five recipients at 100 base units each → 500 needed
        client.set_allowance(
            Address::new(TOKEN),
            Address::new(OPERATOR),
            Address::new(CONTRACT),
            1000,
        );
        let records: Vec<UserRecord> = (1..=5).map(|id| record(id, 90)).collect();

        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "0.0001")
            .await
            .unwrap();
        assert_eq!(plan.total_base, 500);

        let receipt = disburser.execute(&plan).await.unwrap();
        assert!(receipt.success);
        assert_eq!(disburser.phase(), DisbursePhase::Completed);
        assert_eq!(client.approve_count(), 0);
    }

    #[tokio::test]
    async fn short_allowance_approves_once_then_transfers() {
        let (client, disburser) = setup();
        client.set_allowance(
            Address::new(TOKEN),
            Address::new(OPERATOR),
            Address::new(CONTRACT),
            400,
        );
        let records: Vec<UserRecord> = (1..=5).map(|id| record(id, 90)).collect();

        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "0.0001")
            .await
            .unwrap();
        let receipt = disburser.execute(&plan).await.unwrap();

        assert!(receipt.success);
        assert_eq!(client.approve_count(), 1);
        assert_eq!(disburser.phase(), DisbursePhase::Completed);
        let disbursals = client.disbursals();
        assert_eq!(disbursals.len(), 1);
        assert_eq!(disbursals[0].total, 500);
    }

    #[tokio::test]
    async fn reverted_transfer_never_completes() {
        let (client, disburser) = setup();
        client.set_allowance(
            Address::new(TOKEN),
            Address::new(OPERATOR),
            Address::new(CONTRACT),
            1_000_000,
        );
        client.revert_next_disburse();
        let records = vec![record(1, 90)];

        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "0.5")
            .await
            .unwrap();
        let err = disburser.execute(&plan).await.unwrap_err();

        assert!(matches!(
            err,
            DisburseError::Chain {
                phase: DisbursePhase::Transferring,
                ..
            }
        ));
        assert_eq!(disburser.phase(), DisbursePhase::Failed);
        assert!(client.disbursals().is_empty());
    }

    #[tokio::test]
    async fn reverted_approval_fails_in_approving_phase() {
        let (client, disburser) = setup();
        client.revert_next_approve();
        let records = vec![record(1, 90)];

        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "1")
            .await
            .unwrap();
        let err = disburser.execute(&plan).await.unwrap_err();

        assert!(matches!(
            err,
            DisburseError::Chain {
                phase: DisbursePhase::Approving,
                ..
            }
        ));
        assert_eq!(disburser.phase(), DisbursePhase::Failed);
    }

    #[tokio::test]
    async fn failed_attempt_resumes_with_fresh_allowance_check() {
        let (client, disburser) = setup();
        client.revert_next_approve();
        let records = vec![record(1, 90)];

        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "1")
            .await
            .unwrap();
        assert!(disburser.execute(&plan).await.is_err());
        assert_eq!(disburser.phase(), DisbursePhase::Failed);

        // Second invocation re-enters at AwaitingApproval and succeeds.
        let receipt = disburser.execute(&plan).await.unwrap();
        assert!(receipt.success);
        assert_eq!(disburser.phase(), DisbursePhase::Completed);
        assert_eq!(client.approve_count(), 2);
    }

    #[tokio::test]
    async fn execute_from_idle_is_a_validation_error() {
        let (_, disburser) = setup();
        let plan = DisbursementPlan::build(
            Address::new(TOKEN),
            6,
            "1",
            vec![Address::new([1u8; 20])],
        )
        .unwrap();

        let err = disburser.execute(&plan).await.unwrap_err();
        assert!(matches!(err, DisburseError::Validation(_)));
        assert_eq!(disburser.phase(), DisbursePhase::Idle);
    }

    #[tokio::test]
    async fn abandon_before_execute_returns_to_idle() {
        let (client, disburser) = setup();
        client.set_allowance(
            Address::new(TOKEN),
            Address::new(OPERATOR),
            Address::new(CONTRACT),
            0,
        );
        let records = vec![record(1, 90)];
        let plan = disburser
            .prepare(&records, &criterion(), Address::new(TOKEN), "1")
            .await
            .unwrap();

        disburser.abandon();
        let err = disburser.execute(&plan).await.unwrap_err();
        // The abandon flag is consumed at the first checkpoint after the
        // allowance read finds an approval is needed.
        assert!(matches!(err, DisburseError::Abandoned));
        assert_eq!(disburser.phase(), DisbursePhase::Idle);
        assert_eq!(client.approve_count(), 0);
    }
}
