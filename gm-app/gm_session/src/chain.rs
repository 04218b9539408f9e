//! Collaborator interfaces: wallet session, chain client, host platform, clock.
//!
//! Implementations live in `rpc.rs` (EIP-1193 over HTTP) and `sim.rs`
//! (in-memory). Futures are `Send` so the runtime can spawn them.

use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use shared_types::{
    decode_points, encode_get_points, Address, Bytes, Call, ChainId, ConnectorChoice,
    ReceiptStatus, SubmissionHandle, TxHash, U256,
};
use tracing::warn;

use crate::error::ClientError;

/// Outcome of a successful wallet connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub address: Address,
    pub chain_id: ChainId,
    /// Wallet advertises atomic batch calls (EIP-5792) on the target chain.
    pub batch_supported: bool,
}

/// Wallet session provider.
pub trait WalletProvider: Clone + Send + Sync + 'static {
    fn connect(
        &self,
        connector: ConnectorChoice,
    ) -> impl Future<Output = Result<Connection, ClientError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Chain reads and writes, signing delegated to the wallet behind it.
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// `eth_call` against `to`, returning raw return data.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, ClientError>> + Send;

    fn switch_chain(&self, chain: ChainId) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn write_contract(
        &self,
        from: Address,
        chain: ChainId,
        call: Call,
    ) -> impl Future<Output = Result<TxHash, ClientError>> + Send;

    /// Atomic batch; returns the wallet's call-bundle id.
    fn send_batch(
        &self,
        from: Address,
        chain: ChainId,
        calls: Vec<Call>,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;

    /// Resolves once the submission is mined. No local timeout.
    fn wait_for_receipt(
        &self,
        handle: SubmissionHandle,
    ) -> impl Future<Output = Result<ReceiptStatus, ClientError>> + Send;
}

/// Embedding host (social app) integration.
pub trait HostPlatform: Clone + Send + Sync + 'static {
    fn in_host(&self) -> bool;

    /// Tell the host the UI is loaded so it hides its splash screen.
    fn ready(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Not embedded in any host.
#[derive(Clone, Copy, Debug, Default)]
pub struct Standalone;

impl HostPlatform for Standalone {
    fn in_host(&self) -> bool {
        false
    }

    async fn ready(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Read `getPoints(owner)` from the GM contract.
pub async fn read_points<C: ChainClient>(
    client: &C,
    contract: Address,
    owner: Address,
) -> Result<u64, ClientError> {
    let data = client.call(contract, encode_get_points(owner)).await?;
    Ok(clamp_points(decode_points(&data)?))
}

/// Points beyond `u64` are shown as `u64::MAX`.
pub fn clamp_points(points: U256) -> u64 {
    u64::try_from(points).unwrap_or_else(|_| {
        warn!(%points, "points do not fit in u64");
        u64::MAX
    })
}

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock(Mutex::new(start))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
