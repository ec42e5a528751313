// src/account.rs
//! Smart account abstraction and its single-owner LightAccount implementation.
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{self, AbiEncode, ParamType, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::{EIP712Domain, Eip712, TypedData};
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::keccak256;
use tracing::{debug, info};

use crate::chain::ChainReader;
use crate::contracts::light_account::{ExecuteBatchCall, ExecuteCall};
use crate::contracts::light_account_factory::CreateAccountCall;
use crate::error::AccountError;
use crate::types::Call;

/// Suffix marking an ERC-6492 wrapped signature.
pub const ERC6492_MAGIC: [u8; 32] = [
    0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64,
    0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92, 0x64, 0x92,
    0x64, 0x92,
];

/// Factory call that deploys the account on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitCode {
    pub factory: Address,
    pub factory_data: Bytes,
}

/// `abi.encode(factory, factoryCalldata, signature) ++ magic`
pub fn wrap_erc6492(init_code: &InitCode, signature: &Bytes) -> Bytes {
    let mut wrapped = abi::encode(&[
        Token::Address(init_code.factory),
        Token::Bytes(init_code.factory_data.to_vec()),
        Token::Bytes(signature.to_vec()),
    ]);
    wrapped.extend_from_slice(&ERC6492_MAGIC);
    Bytes::from(wrapped)
}

/// Returns the inner signature of an ERC-6492 wrapper; other signatures pass through.
pub fn unwrap_erc6492(signature: &Bytes) -> Result<Bytes, AccountError> {
    let Some(body) = signature.strip_suffix(&ERC6492_MAGIC) else {
        return Ok(signature.clone());
    };
    let mut tokens = abi::decode(&[ParamType::Address, ParamType::Bytes, ParamType::Bytes], body)
        .map_err(|e| AccountError::Encoding(format!("invalid ERC-6492 wrapper: {e}")))?;
    tokens
        .pop()
        .and_then(Token::into_bytes)
        .map(Bytes::from)
        .ok_or_else(|| AccountError::Encoding("ERC-6492 wrapper without signature".into()))
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmartAccount: Send + Sync {
    fn address(&self) -> Address;

    async fn nonce(&self) -> Result<U256, AccountError>;

    /// Deployment data while the account has no code, `None` afterwards.
    async fn init_code(&self) -> Result<Option<InitCode>, AccountError>;

    fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, AccountError>;

    /// Well-formed signature used while estimating gas.
    fn dummy_signature(&self) -> Bytes;

    /// ERC-1271 signature of the typed data's EIP-712 digest, ERC-6492 wrapped
    /// while the account is undeployed.
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Bytes, AccountError>;

    async fn sign_user_operation(&self, user_op_hash: H256) -> Result<Bytes, AccountError>;
}

/// Signature type byte LightAccount v2 expects in front of an owner signature.
const SIGNATURE_TYPE_EOA: u8 = 0x00;

const LIGHT_ACCOUNT_NAME: &str = "LightAccount";
const LIGHT_ACCOUNT_VERSION: &str = "2";

/// `keccak256("LightAccountMessage(bytes message)")`
fn message_typehash() -> [u8; 32] {
    keccak256("LightAccountMessage(bytes message)")
}

/// LightAccount v2 owned by one ECDSA key, deployed through `LightAccountFactory`.
///
/// The address is counterfactual: it is fixed by owner, salt and factory, and
/// the factory deploys the code with the first user operation. Once deployed
/// the account answers `isValidSignature` for hashes its owner signed through
/// [`EcdsaSmartAccount::replay_safe_hash`], which is how the token verifies
/// the paymaster permit.
pub struct EcdsaSmartAccount {
    owner: LocalWallet,
    address: Address,
    salt: U256,
    chain_id: u64,
    account_factory: Address,
    entry_point: Address,
    chain: Arc<dyn ChainReader>,
}

impl EcdsaSmartAccount {
    pub async fn connect(
        owner: LocalWallet,
        account_factory: Address,
        entry_point: Address,
        salt: U256,
        chain_id: u64,
        chain: Arc<dyn ChainReader>,
    ) -> Result<Self, AccountError> {
        let address = chain
            .counterfactual_address(account_factory, owner.address(), salt)
            .await?;
        info!("Using smart account {:?} owned by {:?}", address, owner.address());

        Ok(Self {
            owner,
            address,
            salt,
            chain_id,
            account_factory,
            entry_point,
            chain,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner.address()
    }

    /// The digest the account checks in `isValidSignature(hash, ..)`:
    /// `hash` wrapped in a `LightAccountMessage` bound to this account and chain.
    pub fn replay_safe_hash(&self, hash: H256) -> H256 {
        let domain = EIP712Domain {
            name: Some(LIGHT_ACCOUNT_NAME.to_string()),
            version: Some(LIGHT_ACCOUNT_VERSION.to_string()),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(self.address),
            salt: None,
        };
        let struct_hash = keccak256(abi::encode(&[
            Token::FixedBytes(message_typehash().to_vec()),
            Token::FixedBytes(keccak256(hash.as_bytes()).to_vec()),
        ]));

        let mut preimage = Vec::with_capacity(66);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&domain.separator());
        preimage.extend_from_slice(&struct_hash);
        H256::from(keccak256(preimage))
    }

    fn deployment(&self) -> InitCode {
        InitCode {
            factory: self.account_factory,
            factory_data: CreateAccountCall {
                owner: self.owner.address(),
                salt: self.salt,
            }
            .encode()
            .into(),
        }
    }
}

fn with_signature_type(signature: Signature) -> Bytes {
    let mut typed = Vec::with_capacity(66);
    typed.push(SIGNATURE_TYPE_EOA);
    typed.extend_from_slice(&signature.to_vec());
    typed.into()
}

#[async_trait]
impl SmartAccount for EcdsaSmartAccount {
    fn address(&self) -> Address {
        self.address
    }

    async fn nonce(&self) -> Result<U256, AccountError> {
        Ok(self.chain.account_nonce(self.entry_point, self.address).await?)
    }

    async fn init_code(&self) -> Result<Option<InitCode>, AccountError> {
        if self.chain.has_code(self.address).await? {
            Ok(None)
        } else {
            Ok(Some(self.deployment()))
        }
    }

    fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, AccountError> {
        let encoded = match calls {
            [] => return Err(AccountError::Encoding("empty call batch".into())),
            [call] => ExecuteCall {
                dest: call.to,
                value: call.value,
                func: call.data.clone(),
            }
            .encode(),
            calls => ExecuteBatchCall {
                dest: calls.iter().map(|c| c.to).collect(),
                value: calls.iter().map(|c| c.value).collect(),
                func: calls.iter().map(|c| c.data.clone()).collect(),
            }
            .encode(),
        };
        Ok(encoded.into())
    }

    fn dummy_signature(&self) -> Bytes {
        let mut signature = vec![SIGNATURE_TYPE_EOA];
        signature.extend_from_slice(&[0xff; 15]);
        signature.push(0xf0);
        signature.extend_from_slice(&[0u8; 16]);
        signature.push(0x7a);
        signature.extend_from_slice(&[0xaa; 31]);
        signature.push(0x1c);
        Bytes::from(signature)
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Bytes, AccountError> {
        let digest = typed_data
            .encode_eip712()
            .map_err(|e| AccountError::Encoding(e.to_string()))?;
        let signature = self
            .owner
            .sign_hash(self.replay_safe_hash(H256::from(digest)))
            .map_err(|e| AccountError::Signing(e.to_string()))?;
        let signature = with_signature_type(signature);

        match self.init_code().await? {
            Some(init_code) => {
                debug!(account = ?self.address, "Account not deployed, wrapping signature per ERC-6492");
                Ok(wrap_erc6492(&init_code, &signature))
            }
            None => Ok(signature),
        }
    }

    async fn sign_user_operation(&self, user_op_hash: H256) -> Result<Bytes, AccountError> {
        let signature = self
            .owner
            .sign_message(user_op_hash.as_bytes())
            .await
            .map_err(|e| AccountError::Signing(e.to_string()))?;
        Ok(with_signature_type(signature))
    }
}
