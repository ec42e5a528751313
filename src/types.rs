// src/types.rs
use ethers::abi::{encode, AbiEncode, Token};
use ethers::contract::EthCall;
use ethers::types::{Address, Bytes, Log, H256, U256, U64};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// One call of the atomic batch executed by a user operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Function name, for logs only.
    pub function: String,
}

impl Call {
    pub fn new<C: EthCall + AbiEncode>(to: Address, call: C) -> Self {
        Self {
            to,
            value: U256::zero(),
            function: C::function_name().into_owned(),
            data: call.encode().into(),
        }
    }
}

/// Mode byte of the token paymaster payload for permit-funded operations.
pub const PAYMASTER_MODE_PERMIT: u8 = 0;

const PAYLOAD_HEADER_LEN: usize = 1 + 20 + 32;

/// `encodePacked(uint8 mode, address token, uint256 maxAmount, bytes permitSignature)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymasterPayload {
    pub mode: u8,
    pub token: Address,
    pub max_amount: U256,
    pub signature: Bytes,
}

impl PaymasterPayload {
    pub fn encode(&self) -> Bytes {
        let mut data = Vec::with_capacity(PAYLOAD_HEADER_LEN + self.signature.len());
        data.push(self.mode);
        data.extend_from_slice(self.token.as_bytes());

        let mut amount = [0u8; 32];
        self.max_amount.to_big_endian(&mut amount);
        data.extend_from_slice(&amount);

        data.extend_from_slice(&self.signature);
        Bytes::from(data)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        if data.len() < PAYLOAD_HEADER_LEN {
            return Err(PayloadError::TooShort(data.len()));
        }
        Ok(Self {
            mode: data[0],
            token: Address::from_slice(&data[1..21]),
            max_amount: U256::from_big_endian(&data[21..PAYLOAD_HEADER_LEN]),
            signature: Bytes::from(data[PAYLOAD_HEADER_LEN..].to_vec()),
        })
    }
}

/// ERC-4337 v0.7 user operation in the unpacked form bundlers accept over RPC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn init_code(&self) -> Vec<u8> {
        match self.factory {
            Some(factory) => {
                let mut code = factory.as_bytes().to_vec();
                if let Some(data) = &self.factory_data {
                    code.extend_from_slice(data);
                }
                code
            }
            None => Vec::new(),
        }
    }

    pub fn paymaster_and_data(&self) -> Vec<u8> {
        let Some(paymaster) = self.paymaster else {
            return Vec::new();
        };
        let mut data = paymaster.as_bytes().to_vec();
        let limits = pack_u128_pair(
            self.paymaster_verification_gas_limit.unwrap_or_default(),
            self.paymaster_post_op_gas_limit.unwrap_or_default(),
        );
        data.extend_from_slice(&limits);
        if let Some(paymaster_data) = &self.paymaster_data {
            data.extend_from_slice(paymaster_data);
        }
        data
    }

    /// The EntryPoint v0.7 `PackedUserOperation` encoding, signature excluded.
    pub fn pack_for_hash(&self) -> Vec<u8> {
        encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(self.init_code()).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(
                pack_u128_pair(self.verification_gas_limit, self.call_gas_limit).to_vec(),
            ),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(
                pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas).to_vec(),
            ),
            Token::FixedBytes(keccak256(self.paymaster_and_data()).to_vec()),
        ])
    }

    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let inner = keccak256(self.pack_for_hash());
        H256::from(keccak256(encode(&[
            Token::FixedBytes(inner.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ])))
    }
}

/// Two 128-bit values in one word, `high` first.
fn pack_u128_pair(high: U256, low: U256) -> [u8; 32] {
    let mut packed = [0u8; 32];
    let mut word = [0u8; 32];
    high.to_big_endian(&mut word);
    packed[..16].copy_from_slice(&word[16..]);
    low.to_big_endian(&mut word);
    packed[16..].copy_from_slice(&word[16..]);
    packed
}

/// Result of `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
    #[serde(default)]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub paymaster_post_op_gas_limit: Option<U256>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPrice {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Fee tiers returned by `pimlico_getUserOperationGasPrice`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    pub slow: GasPrice,
    pub standard: GasPrice,
    pub fast: GasPrice,
}

/// Fresh gas inputs for one orchestrated action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasQuote {
    pub additional_gas_charge: U256,
    pub fees: GasPrice,
}

/// Bundle transaction part of a user operation receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_number: Option<U64>,
}

/// Result of `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub sender: Address,
    pub nonce: U256,
    #[serde(default)]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
    pub receipt: BundleReceipt,
}

/// Terminal record of one submitted operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReceipt {
    pub user_op_hash: H256,
    pub success: bool,
    pub transaction_hash: H256,
    pub block_number: Option<U64>,
    pub actual_gas_used: U256,
    pub actual_gas_cost: U256,
    pub reason: Option<String>,
    pub logs: Vec<Log>,
}

impl From<UserOperationReceipt> for OperationReceipt {
    fn from(receipt: UserOperationReceipt) -> Self {
        Self {
            user_op_hash: receipt.user_op_hash,
            success: receipt.success,
            transaction_hash: receipt.receipt.transaction_hash,
            block_number: receipt.receipt.block_number,
            actual_gas_used: receipt.actual_gas_used,
            actual_gas_cost: receipt.actual_gas_cost,
            reason: receipt.reason.filter(|r| !r.is_empty() && r != "0x"),
            logs: receipt.logs,
        }
    }
}
