//! Token client for on-chain operations.
//!
//! In mock mode all operations resolve against in-memory state and receipts
//! are available immediately. In live mode calls go over JSON-RPC to the
//! configured node, which holds the operator account and signs submissions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, info};

use meritdrop_core::{Address, TxHash};

use crate::abi;
use crate::{ChainError, Result, TxReceipt};

/// Chain interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    /// Mock mode for development - all operations succeed against
    /// in-memory state.
    Mock,
    /// Live JSON-RPC mode (requires a node with the operator account).
    Live,
}

/// Token client configuration.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Chain mode (Mock or Live).
    pub mode: ChainMode,
    /// JSON-RPC endpoint (only used in Live mode).
    pub rpc_url: String,
    /// Account that owns the tokens and signs submissions.
    pub operator: Address,
    /// Batch-disbursement contract; the spender that must be approved.
    pub disburse_contract: Address,
    /// Receipt polling interval (Live mode).
    pub receipt_poll: Duration,
    /// How long to poll for a receipt before giving up.
    pub receipt_timeout: Duration,
}

impl ChainConfig {
    /// Mock configuration for development and tests.
    pub fn mock(operator: Address, disburse_contract: Address) -> Self {
        Self {
            mode: ChainMode::Mock,
            rpc_url: String::new(),
            operator,
            disburse_contract,
            receipt_poll: Duration::from_millis(10),
            receipt_timeout: Duration::from_secs(1),
        }
    }

    /// Live configuration against a JSON-RPC node.
    pub fn live(
        rpc_url: impl Into<String>,
        operator: Address,
        disburse_contract: Address,
    ) -> Self {
        Self {
            mode: ChainMode::Live,
            rpc_url: rpc_url.into(),
            operator,
            disburse_contract,
            receipt_poll: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(180),
        }
    }
}

/// One recorded mock disbursal, for test inspection.
#[derive(Debug, Clone)]
pub struct MockDisbursal {
    pub token: Address,
    pub recipients: Vec<Address>,
    pub amounts: Vec<u128>,
    pub total: u128,
}

/// In-memory state for mock mode.
#[derive(Default)]
struct MockChain {
    /// Registered token decimal counts.
    decimals: HashMap<Address, u8>,
    /// (token, owner, spender) → allowance in base units.
    allowances: HashMap<(Address, Address, Address), u128>,
    /// Receipts by transaction hash.
    receipts: HashMap<TxHash, TxReceipt>,
    /// Executed disbursals.
    disbursals: Vec<MockDisbursal>,
    /// Force the next approve/disburse to revert.
    revert_next_approve: bool,
    revert_next_disburse: bool,
    /// Counts approve submissions, for assertions on skipped approvals.
    approve_count: u64,
    /// Transaction counter for generating mock hashes.
    tx_counter: u64,
}

/// Client for the token and batch-disbursement contracts.
pub struct TokenClient {
    config: ChainConfig,
    /// HTTP client (only used in Live mode).
    http: reqwest::Client,
    /// Mock state (only used in Mock mode).
    mock: Arc<RwLock<MockChain>>,
}

impl TokenClient {
    pub fn new(config: ChainConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to create HTTP client");
        Self {
            config,
            http,
            mock: Arc::new(RwLock::new(MockChain::default())),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn is_mock(&self) -> bool {
        self.config.mode == ChainMode::Mock
    }

    /// Generate a mock transaction hash (when already holding the lock).
    fn next_mock_tx(state: &mut MockChain) -> TxHash {
        state.tx_counter += 1;
        let mut hash = [0u8; 32];
        hash[0..8].copy_from_slice(&state.tx_counter.to_le_bytes());
        hash[8..16].copy_from_slice(b"mocktxn!");
        hash
    }

    // ==================== Mock-state helpers ====================

    /// Register a token's decimal count (mock only).
    pub fn register_token(&self, token: Address, decimals: u8) {
        let mut state = self.mock.write().expect("chain lock poisoned");
        state.decimals.insert(token, decimals);
    }

    /// Seed an allowance (mock only).
    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: u128) {
        let mut state = self.mock.write().expect("chain lock poisoned");
        state.allowances.insert((token, owner, spender), amount);
    }

    /// Force the next approve submission to revert (mock only).
    pub fn revert_next_approve(&self) {
        self.mock
            .write()
            .expect("chain lock poisoned")
            .revert_next_approve = true;
    }

    /// Force the next disburse submission to revert (mock only).
    pub fn revert_next_disburse(&self) {
        self.mock
            .write()
            .expect("chain lock poisoned")
            .revert_next_disburse = true;
    }

    /// Executed disbursals (mock only).
    pub fn disbursals(&self) -> Vec<MockDisbursal> {
        self.mock
            .read()
            .expect("chain lock poisoned")
            .disbursals
            .clone()
    }

    /// Number of approve submissions so far (mock only).
    pub fn approve_count(&self) -> u64 {
        self.mock.read().expect("chain lock poisoned").approve_count
    }

    // ==================== Contract reads ====================

    /// `decimals()` on the token contract.
    pub async fn decimals(&self, token: Address) -> Result<u8> {
        if self.is_mock() {
            let state = self.mock.read().expect("chain lock poisoned");
            return state
                .decimals
                .get(&token)
                .copied()
                .ok_or(ChainError::UnknownToken(token));
        }

        let ret = self.eth_call(&token, abi::encode_decimals()).await?;
        abi::decode_u8(&ret)
    }

    /// `allowance(owner, spender)` on the token contract. Always a fresh
    /// chain read; nothing is cached between calls.
    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<u128> {
        if self.is_mock() {
            let state = self.mock.read().expect("chain lock poisoned");
            return Ok(state
                .allowances
                .get(&(token, owner, spender))
                .copied()
                .unwrap_or(0));
        }

        let ret = self
            .eth_call(&token, abi::encode_allowance(&owner, &spender))
            .await?;
        abi::decode_u128(&ret)
    }

    // ==================== Contract writes ====================

    /// Submit `approve(spender, amount)` on the token contract.
    pub async fn approve(&self, token: Address, spender: Address, amount: u128) -> Result<TxHash> {
        info!(%token, %spender, amount, "submitting approval");

        if self.is_mock() {
            let mut state = self.mock.write().expect("chain lock poisoned");
            state.approve_count += 1;
            let tx = Self::next_mock_tx(&mut state);
            if state.revert_next_approve {
                state.revert_next_approve = false;
                state.receipts.insert(
                    tx,
                    TxReceipt {
                        tx_hash: tx,
                        success: false,
                        confirmations: 1,
                    },
                );
                info!("[MOCK] approval reverted");
                return Ok(tx);
            }
            state
                .allowances
                .insert((token, self.config.operator, spender), amount);
            state.receipts.insert(
                tx,
                TxReceipt {
                    tx_hash: tx,
                    success: true,
                    confirmations: 1,
                },
            );
            info!("[MOCK] approval confirmed");
            return Ok(tx);
        }

        self.send_transaction(&token, abi::encode_approve(&spender, amount))
            .await
    }

    /// Submit `bulkDisburse(token, recipients, amounts, total)` on the
    /// disbursement contract. The operator must have pre-approved `total`
    /// to the contract's address.
    pub async fn bulk_disburse(
        &self,
        token: Address,
        recipients: &[Address],
        amounts: &[u128],
        total: u128,
    ) -> Result<TxHash> {
        if recipients.len() != amounts.len() {
            return Err(ChainError::TransactionFailed(format!(
                "{} recipients but {} amounts",
                recipients.len(),
                amounts.len()
            )));
        }
        let sum = amounts
            .iter()
            .try_fold(0u128, |acc, a| acc.checked_add(*a))
            .ok_or_else(|| ChainError::TransactionFailed("amounts overflow".to_string()))?;
        if sum != total {
            return Err(ChainError::TransactionFailed(format!(
                "amounts sum to {sum}, expected total {total}"
            )));
        }

        info!(
            %token,
            recipients = recipients.len(),
            total,
            "submitting bulk disbursement"
        );

        if self.is_mock() {
            let mut state = self.mock.write().expect("chain lock poisoned");
            let tx = Self::next_mock_tx(&mut state);
            let key = (token, self.config.operator, self.config.disburse_contract);
            let allowance = state.allowances.get(&key).copied().unwrap_or(0);
            let reverts = state.revert_next_disburse || allowance < total;
            state.revert_next_disburse = false;
            if reverts {
                state.receipts.insert(
                    tx,
                    TxReceipt {
                        tx_hash: tx,
                        success: false,
                        confirmations: 1,
                    },
                );
                info!("[MOCK] disbursement reverted");
                return Ok(tx);
            }
            state.allowances.insert(key, allowance - total);
            state.disbursals.push(MockDisbursal {
                token,
                recipients: recipients.to_vec(),
                amounts: amounts.to_vec(),
                total,
            });
            state.receipts.insert(
                tx,
                TxReceipt {
                    tx_hash: tx,
                    success: true,
                    confirmations: 1,
                },
            );
            info!("[MOCK] disbursement confirmed");
            return Ok(tx);
        }

        let contract = self.config.disburse_contract;
        self.send_transaction(
            &contract,
            abi::encode_bulk_disburse(&token, recipients, amounts, total),
        )
        .await
    }

    /// Wait for a transaction receipt, polling until the configured timeout.
    pub async fn wait_for_receipt(&self, tx: TxHash) -> Result<TxReceipt> {
        if self.is_mock() {
            let state = self.mock.read().expect("chain lock poisoned");
            return state.receipts.get(&tx).copied().ok_or_else(|| {
                ChainError::ReceiptTimeout(hex::encode(tx), self.config.receipt_timeout)
            });
        }

        let deadline = Instant::now() + self.config.receipt_timeout;
        loop {
            if let Some(receipt) = self.try_receipt(tx).await? {
                info!(
                    tx = %abi::to_hex(&tx),
                    success = receipt.success,
                    confirmations = receipt.confirmations,
                    "transaction receipt"
                );
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout(
                    hex::encode(tx),
                    self.config.receipt_timeout,
                ));
            }
            tokio::time::sleep(self.config.receipt_poll).await;
        }
    }

    // ==================== JSON-RPC plumbing (Live mode) ====================

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(method, "rpc request");

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(format!("{method}: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Rpc(format!("{method}: {e}")))?;

        if let Some(err) = body.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(ChainError::Rpc(format!("{method}: {message}")));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn eth_call(&self, to: &Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let result = self
            .rpc(
                "eth_call",
                json!([{ "to": to.to_string(), "data": abi::to_hex(&data) }, "latest"]),
            )
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call result is not a string".to_string()))?;
        abi::from_hex(hex)
    }

    async fn send_transaction(&self, to: &Address, data: Vec<u8>) -> Result<TxHash> {
        let result = self
            .rpc(
                "eth_sendTransaction",
                json!([{
                    "from": self.config.operator.to_string(),
                    "to": to.to_string(),
                    "data": abi::to_hex(&data),
                }]),
            )
            .await?;
        let hex = result.as_str().ok_or_else(|| {
            ChainError::Decode("eth_sendTransaction result is not a string".to_string())
        })?;
        let bytes = abi::from_hex(hex)?;
        let hash: TxHash = bytes
            .try_into()
            .map_err(|_| ChainError::Decode("transaction hash is not 32 bytes".to_string()))?;
        info!(tx = %abi::to_hex(&hash), "transaction submitted");
        Ok(hash)
    }

    async fn try_receipt(&self, tx: TxHash) -> Result<Option<TxReceipt>> {
        let result = self
            .rpc("eth_getTransactionReceipt", json!([abi::to_hex(&tx)]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }

        let success = result
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s == "0x1")
            .unwrap_or(false);
        let confirmations = match result.get("blockNumber").and_then(Value::as_str) {
            Some(block_hex) => {
                let receipt_block = u64::from_str_radix(
                    block_hex.strip_prefix("0x").unwrap_or(block_hex),
                    16,
                )
                .map_err(|e| ChainError::Decode(format!("blockNumber: {e}")))?;
                let head = self.block_number().await?;
                head.saturating_sub(receipt_block) + 1
            }
            None => 0,
        };

        Ok(Some(TxReceipt {
            tx_hash: tx,
            success,
            confirmations,
        }))
    }

    async fn block_number(&self) -> Result<u64> {
        let result = self.rpc("eth_blockNumber", json!([])).await?;
        let hex = result.as_str().ok_or_else(|| {
            ChainError::Decode("eth_blockNumber result is not a string".to_string())
        })?;
        u64::from_str_radix(hex.strip_prefix("0x").unwrap_or(hex), 16)
            .map_err(|e| ChainError::Decode(format!("eth_blockNumber: {e}")))
    }
}
