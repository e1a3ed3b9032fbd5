use std::collections::BTreeMap;

use alloy::{
    dyn_abi::DynSolValue,
    json_abi::Function,
    primitives::U256,
};
use serde_json::Value;

use crate::error::{Result, WalletError};

/// Function table for one contract, resolved once at construction instead of
/// by name lookup on every call.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    name: &'static str,
    functions: BTreeMap<String, Function>,
}

impl ContractAbi {
    pub fn parse(name: &'static str, signatures: &[&str]) -> Result<Self> {
        let mut functions = BTreeMap::new();
        for signature in signatures {
            let function = Function::parse(signature)
                .map_err(|e| WalletError::InvalidAbi(format!("{}: {}", signature, e)))?;
            functions.insert(function.name.clone(), function);
        }
        Ok(Self { name, functions })
    }

    pub fn contract_name(&self) -> &'static str {
        self.name
    }

    pub fn resolve(&self, function: &str) -> Result<&Function> {
        self.functions
            .get(function)
            .ok_or_else(|| WalletError::UnknownFunction {
                contract: self.name.to_string(),
                function: function.to_string(),
                available: self
                    .functions
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// The fixed contract surface this wallet drives.
#[derive(Debug, Clone)]
pub struct AbiRegistry {
    pub erc20: ContractAbi,
    pub vault: ContractAbi,
    pub reward_pool: ContractAbi,
}

impl AbiRegistry {
    pub fn standard() -> Result<Self> {
        Ok(Self {
            erc20: ContractAbi::parse(
                "ERC20",
                &[
                    "balanceOf(address owner) returns (uint256)",
                    "decimals() returns (uint8)",
                    "approve(address spender, uint256 amount) returns (bool)",
                    "transfer(address to, uint256 amount) returns (bool)",
                    "mint(address to, uint256 amount)",
                ],
            )?,
            vault: ContractAbi::parse("BrowserVault", &["deposit(uint256 amount)"])?,
            reward_pool: ContractAbi::parse(
                "RewardPool",
                &[
                    "claimReward(uint256 epochId, uint256 userScore, bytes signature)",
                    "setEpochTotalScore(uint256 epochId, uint256 totalScore)",
                    "getEpochInfo(uint256 epochId) returns (uint256 yieldAmount, uint256 totalScore, bool scoreSet, uint256 remainingYield)",
                    "calculateReward(uint256 epochId, uint256 userScore) returns (uint256 reward)",
                ],
            )?,
        })
    }
}

/// Renders decoded return values for display. Uints come back as decimal
/// strings to avoid JSON number precision loss.
pub fn decoded_to_json(values: &[DynSolValue]) -> Value {
    match values {
        [single] => dyn_value_to_json(single),
        many => Value::Array(many.iter().map(dyn_value_to_json).collect()),
    }
}

fn dyn_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(format!("{:?}", addr)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(bytes, _) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::Array(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(dyn_value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}

/// Pulls a uint out of a decoded return slot.
pub fn expect_uint(values: &[DynSolValue], index: usize, context: &'static str) -> Result<U256> {
    values
        .get(index)
        .and_then(|v| v.as_uint())
        .map(|(num, _)| num)
        .ok_or_else(|| WalletError::InvalidAbi(format!("{}: expected uint at slot {}", context, index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::dyn_abi::JsonAbiExt;
    use alloy::primitives::Address;

    #[test]
    fn registry_parses_and_resolves() {
        let registry = AbiRegistry::standard().unwrap();
        assert!(registry.erc20.resolve("balanceOf").is_ok());
        assert!(registry.vault.resolve("deposit").is_ok());
        assert!(registry.reward_pool.resolve("getEpochInfo").is_ok());
    }

    #[test]
    fn unknown_function_lists_alternatives() {
        let registry = AbiRegistry::standard().unwrap();
        match registry.erc20.resolve("burn") {
            Err(WalletError::UnknownFunction { available, .. }) => {
                assert!(available.contains("balanceOf"));
                assert!(available.contains("transfer"));
            }
            other => panic!("expected UnknownFunction, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn selectors_match_the_canonical_erc20_abi() {
        let registry = AbiRegistry::standard().unwrap();
        let selector = |abi: &ContractAbi, name: &str| abi.resolve(name).unwrap().selector().0;
        assert_eq!(selector(&registry.erc20, "balanceOf"), hex_selector("70a08231"));
        assert_eq!(selector(&registry.erc20, "decimals"), hex_selector("313ce567"));
        assert_eq!(selector(&registry.erc20, "approve"), hex_selector("095ea7b3"));
        assert_eq!(selector(&registry.erc20, "transfer"), hex_selector("a9059cbb"));
        assert_eq!(selector(&registry.erc20, "mint"), hex_selector("40c10f19"));
        assert_eq!(selector(&registry.vault, "deposit"), hex_selector("b6b55f25"));
    }

    #[test]
    fn encodes_balance_of_calldata() {
        let registry = AbiRegistry::standard().unwrap();
        let function = registry.erc20.resolve("balanceOf").unwrap();
        let calldata = function
            .abi_encode_input(&[DynSolValue::Address(Address::ZERO)])
            .unwrap();
        assert_eq!(calldata.len(), 4 + 32);
        assert_eq!(&calldata[..4], &hex_selector("70a08231"));
    }

    fn hex_selector(s: &str) -> [u8; 4] {
        let bytes = hex::decode(s).unwrap();
        [bytes[0], bytes[1], bytes[2], bytes[3]]
    }
}
