// src/contracts.rs
//! Bindings for the contracts the service talks to.
#![allow(clippy::too_many_arguments)]

use ethers::contract::abigen;

abigen!(
    PermitToken,
    r#"[
        function name() external view returns (string)
        function version() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function nonces(address owner) external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function transfer(address to, uint256 amount) external returns (bool)
    ]"#
);

abigen!(
    ChipInPool,
    r#"[
        function getPoolInfo() external view returns (string title, string description, uint256 targetAmount, uint256 totalContributed, uint256 contributorCount, uint256 deadline, bool goalReached, bool executed, bool cancelled)
        function targetToken() external view returns (address)
        function totalContributed() external view returns (uint256)
        function contribute(uint256 amount) external
    ]"#
);

abigen!(
    ChipInFactory,
    r#"[
        function createPool(string title, string description, uint256 targetAmount, address targetToken, uint256 deadline, uint256 maxContributors) external returns (address)
        function poolCount() external view returns (uint256)
        function getPool(uint256 poolId) external view returns (address)
        function previewSwap(address targetToken, uint256 usdcAmount) external view returns (uint256)
        function exchangeRates(address token) external view returns (uint256)
        function executePoolSwap(uint256 poolId) external
        function executeAggregatorSwap(uint256 poolId, uint256 minAmountOut, bytes swapData) external
        event PoolCreated(uint256 indexed poolId, address indexed poolAddress, address indexed creator, string title, uint256 targetAmount, address targetToken)
    ]"#
);

abigen!(
    TokenPaymaster,
    r#"[
        function additionalGasCharge() external view returns (uint256)
    ]"#
);

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
    ]"#
);

abigen!(
    LightAccount,
    r#"[
        function execute(address dest, uint256 value, bytes func) external
        function executeBatch(address[] dest, uint256[] value, bytes[] func) external
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4)
    ]"#
);

abigen!(
    LightAccountFactory,
    r#"[
        function createAccount(address owner, uint256 salt) external returns (address)
        function getAddress(address owner, uint256 salt) external view returns (address)
    ]"#
);
