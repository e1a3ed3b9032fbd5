use std::sync::Arc;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256},
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use super::abi::{expect_uint, ContractAbi};
use super::invoker::ContractInvoker;
use crate::error::{Result, WalletError};

/// Native-coin decimal exponent (wei per ETH).
const NATIVE_DECIMALS: u8 = 18;

/// A token amount in both raw and human units. The exponent comes from the
/// token contract itself, never from an assumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenQuantity {
    pub raw: U256,
    pub decimals: u8,
    pub amount: Decimal,
}

/// Human-scaled balance queries. The lenient entry points return zero on any
/// failure so a display layer stays responsive; the strict ones propagate.
pub struct TokenBalanceReader {
    invoker: Arc<ContractInvoker>,
    erc20: ContractAbi,
}

impl TokenBalanceReader {
    pub fn new(invoker: Arc<ContractInvoker>, erc20: ContractAbi) -> Self {
        Self { invoker, erc20 }
    }

    /// `balanceOf(holder) / 10^decimals()`, or zero when anything fails.
    pub async fn token_balance(&self, token: Address, holder: Address) -> Decimal {
        match self.token_balance_strict(token, holder).await {
            Ok(quantity) => quantity.amount,
            Err(e) => {
                warn!("Token balance read for {:?} failed, reporting 0: {}", token, e);
                Decimal::ZERO
            }
        }
    }

    pub async fn token_balance_strict(
        &self,
        token: Address,
        holder: Address,
    ) -> Result<TokenQuantity> {
        let decimals = self.token_decimals(token).await?;

        let returned = self
            .invoker
            .call(token, &self.erc20, "balanceOf", &[DynSolValue::Address(holder)])
            .await?;
        let raw = expect_uint(&returned, 0, "balanceOf")?;

        Ok(TokenQuantity {
            raw,
            decimals,
            amount: scale_raw(raw, decimals)?,
        })
    }

    pub async fn token_decimals(&self, token: Address) -> Result<u8> {
        let returned = self.invoker.call(token, &self.erc20, "decimals", &[]).await?;
        let decimals = expect_uint(&returned, 0, "decimals")?;
        u8::try_from(decimals).map_err(|_| {
            WalletError::AmountOutOfRange(format!("decimals() returned {}", decimals))
        })
    }

    /// Native balance in ETH, zero on failure.
    pub async fn native_balance(&self, holder: Address) -> Decimal {
        let wei = match self.invoker.node().balance(holder).await {
            Ok(wei) => wei,
            Err(e) => {
                warn!("Native balance read failed, reporting 0: {}", e);
                return Decimal::ZERO;
            }
        };
        scale_raw(wei, NATIVE_DECIMALS).unwrap_or_else(|e| {
            warn!("Native balance out of range, reporting 0: {}", e);
            Decimal::ZERO
        })
    }
}

/// `raw / 10^decimals` as an exact decimal, no binary floats involved.
pub fn scale_raw(raw: U256, decimals: u8) -> Result<Decimal> {
    if decimals > 28 {
        return Err(WalletError::AmountOutOfRange(format!(
            "decimal exponent {} exceeds supported precision",
            decimals
        )));
    }
    let raw = u128::try_from(raw)
        .map_err(|_| WalletError::AmountOutOfRange(format!("raw balance {} too large", raw)))?;
    let raw = i128::try_from(raw)
        .map_err(|_| WalletError::AmountOutOfRange(format!("raw balance {} too large", raw)))?;
    Decimal::try_from_i128_with_scale(raw, decimals as u32)
        .map_err(|e| WalletError::AmountOutOfRange(e.to_string()))
}

/// Human amount back to raw token units. Rejects amounts with more
/// fractional digits than the token carries, rather than rounding silently.
pub fn to_raw(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount.is_sign_negative() {
        return Err(WalletError::AmountOutOfRange(format!(
            "negative amount {}",
            amount
        )));
    }
    if decimals > 28 {
        return Err(WalletError::AmountOutOfRange(format!(
            "decimal exponent {} exceeds supported precision",
            decimals
        )));
    }

    let factor = Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0);
    let scaled = amount
        .checked_mul(factor)
        .ok_or_else(|| WalletError::AmountOutOfRange(format!("amount {} overflows", amount)))?;

    if scaled != scaled.trunc() {
        return Err(WalletError::AmountOutOfRange(format!(
            "{} has more than {} fractional digits",
            amount, decimals
        )));
    }

    let units = scaled
        .to_u128()
        .ok_or_else(|| WalletError::AmountOutOfRange(format!("amount {} out of range", amount)))?;
    Ok(U256::from(units))
}
