//! Shared data types for the daily GM mini app.
//!
//! These types are the vocabulary passed between the session state machine,
//! the chain/wallet collaborators and the query service. They are referenced by:
//! - `gm_session/src/lib.rs` (operations, messages and effects)
//! - `gm_session/src/rpc.rs` (JSON-RPC encoding)
//! - `gm_session/src/service.rs` (GraphQL enums)
//! - `scripts/gm_cli` (argument parsing)

use std::fmt;

use alloy_primitives::{address, U64};
use alloy_sol_types::{sol, SolCall};
use async_graphql::Enum;
use serde::{Deserialize, Serialize};

pub use alloy_primitives::ruint::ParseError;
pub use alloy_primitives::{Address, Bytes, TxHash, U256};
pub use alloy_sol_types::Error as AbiError;

/// Chain id of Base mainnet, the only chain the app talks to.
pub const BASE_CHAIN_ID: ChainId = ChainId(8453);

/// Deployed GM contract on Base.
pub const GM_CONTRACT: Address = address!("2eb1b50eebe4bbc1af30b128944e8ee90117f4ee");

/// Minimum value accepted by the payable `gm()` entry point (0.00003 ETH).
pub const GM_VALUE: U256 = U256::from_limbs([30_000_000_000_000, 0, 0, 0]);

sol! {
    /// Surface of the deployed GM contract.
    interface IGm {
        function getPoints(address owner) external view returns (uint256);
        function gm() external payable;
    }
}

/// Abbreviated EIP-55 form used on screen, e.g. `0x5aAe...eAed`.
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// EIP-155 chain id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// Hex quantity form used by `wallet_switchEthereumChain` and `eth_chainId`.
    pub fn to_quantity(self) -> String {
        format!("{:#x}", self.0)
    }

    pub fn from_quantity(s: &str) -> Result<Self, ParseError> {
        let value: U64 = s.parse()?;
        Ok(ChainId(value.to::<u64>()))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One call of a (possibly batched) submission.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    /// ABI-encoded calldata; empty for plain value transfers.
    pub data: Bytes,
}

impl Call {
    /// The daily `gm()` call carrying the minimum fee.
    pub fn gm(contract: Address, value: U256) -> Self {
        Call {
            to: contract,
            value,
            data: encode_gm(),
        }
    }

    pub fn transfer(to: Address, value: U256) -> Self {
        Call {
            to,
            value,
            data: Bytes::new(),
        }
    }
}

/// What the wallet handed back for a submission.
///
/// A single call yields a transaction hash; an EIP-5792 batch yields an
/// opaque call-bundle id that is tracked through `wallet_getCallsStatus`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SubmissionHandle {
    Transaction(TxHash),
    Batch(String),
}

impl SubmissionHandle {
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            SubmissionHandle::Transaction(hash) => Some(*hash),
            SubmissionHandle::Batch(_) => None,
        }
    }
}

impl fmt::Display for SubmissionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionHandle::Transaction(hash) => write!(f, "{hash}"),
            SubmissionHandle::Batch(id) => write!(f, "batch {id}"),
        }
    }
}

/// Final outcome of a mined submission.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ReceiptStatus {
    /// Included and executed successfully. Carries the hash when known.
    Confirmed(Option<TxHash>),
    /// Included but reverted.
    Reverted(Option<TxHash>),
}

/// Wallet connector offered to the user.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Enum, PartialEq, Eq, Hash)]
pub enum ConnectorChoice {
    /// The host social app's embedded wallet.
    MiniApp,
    /// A browser-injected EIP-1193 provider.
    Injected,
    /// WalletConnect relay with QR pairing.
    WalletConnect,
}

/// Connectors in preference order. The mini-app connector is only offered
/// when running inside the host.
pub fn available_connectors(in_host: bool) -> Vec<ConnectorChoice> {
    let mut connectors = Vec::with_capacity(3);
    if in_host {
        connectors.push(ConnectorChoice::MiniApp);
    }
    connectors.push(ConnectorChoice::Injected);
    connectors.push(ConnectorChoice::WalletConnect);
    connectors
}

/// Calldata for `getPoints(address)`.
pub fn encode_get_points(owner: Address) -> Bytes {
    IGm::getPointsCall { owner }.abi_encode().into()
}

/// Owner argument of `getPoints(address)` calldata, if `data` is one.
pub fn decode_get_points(data: &[u8]) -> Option<Address> {
    IGm::getPointsCall::abi_decode(data, true).ok().map(|call| call.owner)
}

/// Calldata for `gm()`.
pub fn encode_gm() -> Bytes {
    IGm::gmCall {}.abi_encode().into()
}

/// Return data of `getPoints(address)`.
pub fn encode_points(points: U256) -> Bytes {
    IGm::getPointsCall::abi_encode_returns(&(points,)).into()
}

pub fn decode_points(data: &[u8]) -> Result<U256, AbiError> {
    IGm::getPointsCall::abi_decode_returns(data, true).map(|ret| ret._0)
}
