// src/error.rs
use std::fmt;

use ethers::abi::{self, ParamType};
use ethers::types::{Address, Bytes};
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while assembling the runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No ChipIn factory is configured for network {0}")]
    MissingFactory(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("The aggregator purchase strategy requires an API URL and key")]
    MissingAggregatorSettings,
}

/// Failure of a read-only call against a collaborator contract.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("{call} on {address:?} failed: {message}")]
    Call {
        address: Address,
        call: &'static str,
        message: String,
    },

    #[error("Ethereum provider error: {0}")]
    Provider(String),
}

impl ChainError {
    pub fn call(address: Address, call: &'static str, err: impl fmt::Display) -> Self {
        Self::Call {
            address,
            call,
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Call encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Failures of the EIP-2612 permit signer.
#[derive(Error, Debug)]
pub enum PermitError {
    #[error("Unable to read token contract, it might not be EIP-2612 compliant: {0}")]
    TokenRead(#[source] ChainError),

    #[error("Invalid permit typed data: {0}")]
    TypedData(String),

    #[error("Malformed permit signature: {0}")]
    MalformedSignature(String),

    #[error(transparent)]
    Signing(#[from] AccountError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("paymaster payload is {0} bytes, expected at least 53")]
    TooShort(usize),
}

/// ERC-4337 EntryPoint failure codes (`AAxx`), as reported by bundlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPointError {
    SenderAlreadyConstructed,
    InitCodeFailed,
    InitCodeWrongSender,
    InitCodeNoSender,
    SenderNotDeployed,
    PrefundNotPaid,
    AccountExpired,
    AccountValidationReverted,
    AccountSignatureError,
    InvalidAccountNonce,
    AccountVerificationGasExceeded,
    PaymasterNotDeployed,
    PaymasterDepositTooLow,
    PaymasterExpired,
    PaymasterValidationReverted,
    PaymasterSignatureError,
    PaymasterVerificationGasExceeded,
    VerificationGasExceeded,
    VerificationGasTooLow,
    PostOpReverted,
    PrefundBelowActualCost,
    InvalidBeneficiary,
    BeneficiaryTransferFailed,
    InternalCallOnly,
    InvalidPaymasterAndData,
    GasValuesOverflow,
    OutOfGas,
    Unknown(u8),
}

impl EntryPointError {
    pub fn from_code(code: u8) -> Self {
        match code {
            10 => Self::SenderAlreadyConstructed,
            13 => Self::InitCodeFailed,
            14 => Self::InitCodeWrongSender,
            15 => Self::InitCodeNoSender,
            20 => Self::SenderNotDeployed,
            21 => Self::PrefundNotPaid,
            22 => Self::AccountExpired,
            23 => Self::AccountValidationReverted,
            24 => Self::AccountSignatureError,
            25 => Self::InvalidAccountNonce,
            26 => Self::AccountVerificationGasExceeded,
            30 => Self::PaymasterNotDeployed,
            31 => Self::PaymasterDepositTooLow,
            32 => Self::PaymasterExpired,
            33 => Self::PaymasterValidationReverted,
            34 => Self::PaymasterSignatureError,
            36 => Self::PaymasterVerificationGasExceeded,
            40 => Self::VerificationGasExceeded,
            41 => Self::VerificationGasTooLow,
            50 => Self::PostOpReverted,
            51 => Self::PrefundBelowActualCost,
            90 => Self::InvalidBeneficiary,
            91 => Self::BeneficiaryTransferFailed,
            92 => Self::InternalCallOnly,
            93 => Self::InvalidPaymasterAndData,
            94 => Self::GasValuesOverflow,
            95 => Self::OutOfGas,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::SenderAlreadyConstructed => 10,
            Self::InitCodeFailed => 13,
            Self::InitCodeWrongSender => 14,
            Self::InitCodeNoSender => 15,
            Self::SenderNotDeployed => 20,
            Self::PrefundNotPaid => 21,
            Self::AccountExpired => 22,
            Self::AccountValidationReverted => 23,
            Self::AccountSignatureError => 24,
            Self::InvalidAccountNonce => 25,
            Self::AccountVerificationGasExceeded => 26,
            Self::PaymasterNotDeployed => 30,
            Self::PaymasterDepositTooLow => 31,
            Self::PaymasterExpired => 32,
            Self::PaymasterValidationReverted => 33,
            Self::PaymasterSignatureError => 34,
            Self::PaymasterVerificationGasExceeded => 36,
            Self::VerificationGasExceeded => 40,
            Self::VerificationGasTooLow => 41,
            Self::PostOpReverted => 50,
            Self::PrefundBelowActualCost => 51,
            Self::InvalidBeneficiary => 90,
            Self::BeneficiaryTransferFailed => 91,
            Self::InternalCallOnly => 92,
            Self::InvalidPaymasterAndData => 93,
            Self::GasValuesOverflow => 94,
            Self::OutOfGas => 95,
            Self::Unknown(code) => *code,
        }
    }

    /// Extracts the first standalone `AAxx` token from a bundler error message.
    pub fn find_in(message: &str) -> Option<Self> {
        let bytes = message.as_bytes();
        if bytes.len() < 4 {
            return None;
        }
        (0..=bytes.len() - 4).find_map(|i| {
            let window = &bytes[i..i + 4];
            let starts_clean = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
            let ends_clean = bytes.get(i + 4).map_or(true, |b| !b.is_ascii_digit());
            if window[0] == b'A'
                && window[1] == b'A'
                && window[2].is_ascii_digit()
                && window[3].is_ascii_digit()
                && starts_clean
                && ends_clean
            {
                Some(Self::from_code((window[2] - b'0') * 10 + (window[3] - b'0')))
            } else {
                None
            }
        })
    }

    /// Whether the failure is attributed to the paymaster.
    pub fn is_paymaster(&self) -> bool {
        matches!(self.code(), 30..=39 | 50..=51)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PaymasterValidationReverted => "Insufficient USDC allowance for paymaster",
            Self::AccountValidationReverted => "Paymaster validation failed",
            Self::PaymasterDepositTooLow => "Paymaster deposit too low to sponsor this operation",
            Self::PaymasterNotDeployed => "Paymaster contract is not deployed on this network",
            Self::PaymasterExpired => "Paymaster data expired",
            Self::PaymasterSignatureError => "Paymaster rejected the permit signature",
            Self::PostOpReverted => "Paymaster could not collect the gas fee",
            Self::AccountSignatureError => "Smart account signature is invalid",
            Self::InvalidAccountNonce => "Smart account nonce is out of date, retry the request",
            Self::SenderNotDeployed | Self::InitCodeFailed | Self::InitCodeNoSender => {
                "Smart account could not be deployed"
            }
            Self::PrefundNotPaid => "Smart account did not pay the required prefund",
            Self::AccountVerificationGasExceeded
            | Self::PaymasterVerificationGasExceeded
            | Self::VerificationGasExceeded
            | Self::VerificationGasTooLow
            | Self::OutOfGas => "Operation ran out of verification gas",
            _ => "Operation rejected by the EntryPoint",
        }
    }
}

impl fmt::Display for EntryPointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AA{:02}", self.code())
    }
}

impl Serialize for EntryPointError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors returned by the bundler JSON-RPC endpoint.
#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("{method} rejected ({code}): {message}")]
    Rejected {
        method: &'static str,
        code: i64,
        message: String,
        data: Option<Value>,
        entry_point: Option<EntryPointError>,
    },

    #[error("{method} transport error: {message}")]
    Transport { method: &'static str, message: String },

    #[error("{method} returned an invalid response: {message}")]
    InvalidResponse { method: &'static str, message: String },
}

const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

impl BundlerError {
    pub fn rejected(method: &'static str, code: i64, message: String, data: Option<Value>) -> Self {
        let entry_point = EntryPointError::find_in(&message);
        Self::Rejected {
            method,
            code,
            message,
            data,
            entry_point,
        }
    }

    pub fn entry_point_error(&self) -> Option<EntryPointError> {
        match self {
            Self::Rejected { entry_point, .. } => *entry_point,
            _ => None,
        }
    }

    /// Decodes a Solidity `Error(string)` revert reason carried in the error data.
    ///
    /// Bundlers report revert data either as a bare hex string or nested under
    /// `revertData`/`reason`.
    pub fn revert_reason(&self) -> Option<String> {
        let Self::Rejected { data: Some(data), .. } = self else {
            return None;
        };
        let raw = match data {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("revertData")
                .or_else(|| map.get("reason"))
                .and_then(Value::as_str)?,
            _ => return None,
        };
        decode_revert_reason(raw)
    }
}

/// Decodes hex `Error(string)` revert data into its message.
pub fn decode_revert_reason(raw: &str) -> Option<String> {
    let bytes: Bytes = raw.parse().ok()?;
    let payload = bytes.strip_prefix(&ERROR_STRING_SELECTOR)?;
    abi::decode(&[ParamType::String], payload)
        .ok()?
        .pop()?
        .into_string()
}

/// Failures of a purchase strategy.
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Aggregator request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Aggregator returned an unusable quote: {0}")]
    Quote(String),

    #[error("Unable to preview swap: {0}")]
    Chain(#[from] ChainError),
}

/// Read-only pre-flight rejections. None of these ever reach the bundler.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Pool has already been executed")]
    PoolExecuted,

    #[error("Pool has been cancelled")]
    PoolCancelled,

    #[error("Pool goal has already been reached")]
    GoalAlreadyReached,

    #[error("Pool goal has not been reached yet")]
    GoalNotReached,

    #[error("Pool deadline has passed")]
    DeadlinePassed,

    #[error("Contribution would exceed pool target. Remaining: {remaining}")]
    ExceedsTarget { remaining: String },

    #[error("Insufficient {symbol} balance. Have: {have}, Need: {need}{breakdown}")]
    InsufficientBalance {
        symbol: String,
        have: String,
        need: String,
        breakdown: String,
    },

    #[error("Pool {given:?} is not pool #{pool_id} (factory reports {expected:?})")]
    PoolMismatch {
        pool_id: u64,
        given: Address,
        expected: Address,
    },

    #[error("Unable to read {what}: {source}")]
    Unreadable {
        what: &'static str,
        #[source]
        source: ChainError,
    },
}

/// Coarse classification of every failure surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Preflight,
    Permit,
    Paymaster,
    Bundler,
    Chain,
    Account,
    Swap,
    Config,
}

#[derive(Error, Debug)]
pub enum ChipInError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Permit(#[from] PermitError),

    #[error("Gas price quote failed: {0}")]
    GasQuote(#[source] BundlerError),

    #[error("Gas estimation failed: {0}")]
    Estimation(#[source] BundlerError),

    #[error("Submission failed: {0}")]
    Submission(#[source] BundlerError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ChipInError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Preflight(_) => ErrorKind::Preflight,
            Self::Permit(_) => ErrorKind::Permit,
            Self::GasQuote(_) => ErrorKind::Bundler,
            Self::Estimation(err) | Self::Submission(err) => match err.entry_point_error() {
                Some(code) if code.is_paymaster() => ErrorKind::Paymaster,
                Some(EntryPointError::AccountValidationReverted) => ErrorKind::Paymaster,
                _ => ErrorKind::Bundler,
            },
            Self::Chain(_) => ErrorKind::Chain,
            Self::Account(_) => ErrorKind::Account,
            Self::Swap(_) => ErrorKind::Swap,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn bundler_error(&self) -> Option<&BundlerError> {
        match self {
            Self::GasQuote(err) | Self::Estimation(err) | Self::Submission(err) => Some(err),
            _ => None,
        }
    }

    pub fn entry_point_error(&self) -> Option<EntryPointError> {
        self.bundler_error().and_then(BundlerError::entry_point_error)
    }

    /// Message suitable for the `error` field of a response.
    pub fn user_message(&self) -> String {
        match self.entry_point_error() {
            Some(code) => code.user_message().to_string(),
            None => self.to_string(),
        }
    }
}
