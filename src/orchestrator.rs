use std::sync::Arc;
use std::time::Duration;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
};
use rust_decimal::Decimal;
use tracing::info;

use crate::chain::abi::{expect_uint, AbiRegistry};
use crate::chain::invoker::ContractInvoker;
use crate::chain::token::{to_raw, TokenBalanceReader};
use crate::chain::{PendingCall, Receipt};
use crate::config::ContractsConfig;
use crate::error::{Result, WalletError};

/// Proof that the caller deliberately approved a state-changing flow.
///
/// The reference UI gated every spend behind a confirmation dialog; headless
/// callers mint this token after their own prompt (the CLI requires a `--yes`
/// flag). Flows cannot be invoked without it, so an accidental re-run never
/// double-spends.
#[derive(Debug, Clone, Copy)]
pub struct Confirmation(());

impl Confirmation {
    pub fn granted() -> Self {
        Confirmation(())
    }
}

/// Outcome of the two-step approve-then-deposit flow. Both steps confirmed.
#[derive(Debug, Clone)]
pub struct DepositOutcome {
    pub approval: Receipt,
    pub deposit: Receipt,
}

/// Outcome of a single receipt-confirmed call.
#[derive(Debug, Clone)]
pub struct ConfirmedCall {
    pub pending: PendingCall,
    pub receipt: Receipt,
}

#[derive(Debug, Clone)]
pub struct EpochInfo {
    pub yield_amount: U256,
    pub total_score: U256,
    pub score_set: bool,
    pub remaining_yield: U256,
}

/// Sequences multi-step flows where a later step depends on an earlier
/// transaction's confirmation. Each dependent step waits on the real
/// receipt; there are no fixed "sleep and hope" delays.
pub struct AccountOrchestrator {
    invoker: Arc<ContractInvoker>,
    tokens: TokenBalanceReader,
    abis: AbiRegistry,
    usdc: Address,
    vault: Address,
    reward_pool: Address,
    receipt_timeout: Duration,
}

impl AccountOrchestrator {
    pub fn new(
        invoker: Arc<ContractInvoker>,
        abis: AbiRegistry,
        contracts: &ContractsConfig,
        receipt_timeout: Duration,
    ) -> Result<Self> {
        let tokens = TokenBalanceReader::new(invoker.clone(), abis.erc20.clone());
        Ok(Self {
            usdc: contracts.usdc()?,
            vault: contracts.vault()?,
            reward_pool: contracts.reward_pool()?,
            invoker,
            tokens,
            abis,
            receipt_timeout,
        })
    }

    pub fn sender(&self) -> Address {
        self.invoker.sender()
    }

    pub fn tokens(&self) -> &TokenBalanceReader {
        &self.tokens
    }

    pub fn usdc_address(&self) -> Address {
        self.usdc
    }

    pub fn vault_address(&self) -> Address {
        self.vault
    }

    pub fn reward_pool_address(&self) -> Address {
        self.reward_pool
    }

    /// Approve-then-deposit. The deposit is only built after the approval's
    /// receipt reports success; an approval that confirms but is followed by
    /// a failed deposit surfaces as a partial-flow error naming both steps.
    pub async fn deposit(&self, amount: Decimal, _confirmed: Confirmation) -> Result<DepositOutcome> {
        let decimals = self.tokens.token_decimals(self.usdc).await?;
        let raw = to_raw(amount, decimals)?;

        info!("Step 1/2: approving vault to spend {} USDC", amount);
        let approve = self
            .invoker
            .build_and_send(
                self.usdc,
                &self.abis.erc20,
                "approve",
                &[
                    DynSolValue::Address(self.vault),
                    DynSolValue::Uint(raw, 256),
                ],
                U256::ZERO,
            )
            .await?;

        let approval = self
            .invoker
            .wait_for_receipt(approve.tx_hash, self.receipt_timeout)
            .await?;
        if !approval.success {
            return Err(WalletError::SubmissionRejected {
                function: "approve".to_string(),
                reason: "approval transaction reverted on-chain".to_string(),
            });
        }

        info!("Step 2/2: depositing {} USDC into the vault", amount);
        let deposit_result = self
            .deposit_step(raw)
            .await
            .map_err(|e| WalletError::PartialFlow {
                flow: "deposit",
                completed: "approval",
                failed: "deposit",
                source: Box::new(e),
            })?;

        Ok(DepositOutcome {
            approval,
            deposit: deposit_result.receipt,
        })
    }

    async fn deposit_step(&self, raw: U256) -> Result<ConfirmedCall> {
        let pending = self
            .invoker
            .build_and_send(
                self.vault,
                &self.abis.vault,
                "deposit",
                &[DynSolValue::Uint(raw, 256)],
                U256::ZERO,
            )
            .await?;
        let receipt = self.confirm(&pending).await?;
        Ok(ConfirmedCall { pending, receipt })
    }

    /// Faucet: mint test USDC to the caller's own wallet and wait for the
    /// receipt. Success is the receipt's status, not the returned hash.
    pub async fn faucet_mint(
        &self,
        amount: Decimal,
        _confirmed: Confirmation,
    ) -> Result<ConfirmedCall> {
        let decimals = self.tokens.token_decimals(self.usdc).await?;
        let raw = to_raw(amount, decimals)?;

        info!("Minting {} test USDC to {:?}", amount, self.sender());
        let pending = self
            .invoker
            .build_and_send(
                self.usdc,
                &self.abis.erc20,
                "mint",
                &[
                    DynSolValue::Address(self.sender()),
                    DynSolValue::Uint(raw, 256),
                ],
                U256::ZERO,
            )
            .await?;
        let receipt = self.confirm(&pending).await?;
        Ok(ConfirmedCall { pending, receipt })
    }

    /// Epoch-based reward claim against the RewardPool contract.
    pub async fn claim_reward(
        &self,
        epoch_id: u64,
        user_score: u64,
        signature: Vec<u8>,
        _confirmed: Confirmation,
    ) -> Result<ConfirmedCall> {
        info!(
            "Claiming reward for epoch {} with score {}",
            epoch_id, user_score
        );
        let pending = self
            .invoker
            .build_and_send(
                self.reward_pool,
                &self.abis.reward_pool,
                "claimReward",
                &[
                    DynSolValue::Uint(U256::from(epoch_id), 256),
                    DynSolValue::Uint(U256::from(user_score), 256),
                    DynSolValue::Bytes(signature),
                ],
                U256::ZERO,
            )
            .await?;
        let receipt = self.confirm(&pending).await?;
        Ok(ConfirmedCall { pending, receipt })
    }

    /// Direct-transfer reward: `10 + score/10` USDC out of this wallet,
    /// receipt-confirmed.
    pub async fn send_direct_reward(
        &self,
        recipient: Address,
        activity_score: u64,
        _confirmed: Confirmation,
    ) -> Result<ConfirmedCall> {
        let reward = direct_reward_amount(activity_score);
        let decimals = self.tokens.token_decimals(self.usdc).await?;
        let raw = to_raw(reward, decimals)?;

        info!(
            "Sending {} USDC reward to {:?} (activity score {})",
            reward, recipient, activity_score
        );
        let pending = self
            .invoker
            .build_and_send(
                self.usdc,
                &self.abis.erc20,
                "transfer",
                &[
                    DynSolValue::Address(recipient),
                    DynSolValue::Uint(raw, 256),
                ],
                U256::ZERO,
            )
            .await?;
        let receipt = self.confirm(&pending).await?;
        Ok(ConfirmedCall { pending, receipt })
    }

    /// Admin: publish the epoch's total activity score.
    pub async fn set_epoch_total_score(
        &self,
        epoch_id: u64,
        total_score: u64,
        _confirmed: Confirmation,
    ) -> Result<ConfirmedCall> {
        let pending = self
            .invoker
            .build_and_send(
                self.reward_pool,
                &self.abis.reward_pool,
                "setEpochTotalScore",
                &[
                    DynSolValue::Uint(U256::from(epoch_id), 256),
                    DynSolValue::Uint(U256::from(total_score), 256),
                ],
                U256::ZERO,
            )
            .await?;
        let receipt = self.confirm(&pending).await?;
        Ok(ConfirmedCall { pending, receipt })
    }

    pub async fn epoch_info(&self, epoch_id: u64) -> Result<EpochInfo> {
        let returned = self
            .invoker
            .call(
                self.reward_pool,
                &self.abis.reward_pool,
                "getEpochInfo",
                &[DynSolValue::Uint(U256::from(epoch_id), 256)],
            )
            .await?;

        Ok(EpochInfo {
            yield_amount: expect_uint(&returned, 0, "getEpochInfo")?,
            total_score: expect_uint(&returned, 1, "getEpochInfo")?,
            score_set: returned
                .get(2)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            remaining_yield: expect_uint(&returned, 3, "getEpochInfo")?,
        })
    }

    pub async fn calculate_reward(&self, epoch_id: u64, user_score: u64) -> Result<U256> {
        let returned = self
            .invoker
            .call(
                self.reward_pool,
                &self.abis.reward_pool,
                "calculateReward",
                &[
                    DynSolValue::Uint(U256::from(epoch_id), 256),
                    DynSolValue::Uint(U256::from(user_score), 256),
                ],
            )
            .await?;
        expect_uint(&returned, 0, "calculateReward")
    }

    async fn confirm(&self, pending: &PendingCall) -> Result<Receipt> {
        let receipt = self
            .invoker
            .wait_for_receipt(pending.tx_hash, self.receipt_timeout)
            .await?;
        if !receipt.success {
            return Err(WalletError::SubmissionRejected {
                function: pending.function.clone(),
                reason: format!("transaction {:?} reverted on-chain", pending.tx_hash),
            });
        }
        Ok(receipt)
    }
}

/// Reward schedule: 10 USDC base plus 0.1 USDC per activity point.
pub fn direct_reward_amount(activity_score: u64) -> Decimal {
    Decimal::from(10) + Decimal::from(activity_score) / Decimal::from(10)
}
