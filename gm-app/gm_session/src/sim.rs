//! In-memory wallet, chain and host.
//!
//! `SimulatedChain` executes `gm()` against a local points table so the whole
//! session can run without a network. Failures are injected one-shot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use shared_types::{
    decode_get_points, encode_gm, encode_points, Address, Bytes, Call, ChainId, ConnectorChoice,
    ReceiptStatus, SubmissionHandle, TxHash, U256, BASE_CHAIN_ID, GM_CONTRACT, GM_VALUE,
};
use tracing::debug;

use crate::chain::{ChainClient, Connection, HostPlatform, WalletProvider};
use crate::error::ClientError;

/// One submission as seen by the simulated wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentSubmission {
    pub from: Address,
    pub chain: ChainId,
    pub handle: SubmissionHandle,
    pub calls: Vec<Call>,
}

#[derive(Debug, Default)]
struct Faults {
    connect: bool,
    switch_chain: bool,
    submit: bool,
    revert: bool,
    read: bool,
    host_ready: bool,
}

#[derive(Debug)]
struct SimState {
    account: Address,
    chain_id: ChainId,
    batch_supported: bool,
    in_host: bool,
    contract: Address,
    gm_value: U256,
    points: HashMap<Address, u64>,
    sent: Vec<SentSubmission>,
    receipts: HashMap<SubmissionHandle, ReceiptStatus>,
    receipt_delay: Duration,
    nonce: u64,
    faults: Faults,
}

#[derive(Clone, Debug)]
pub struct SimulatedChain {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedChain {
    /// A standalone wallet on Base without batch support.
    pub fn new(account: Address) -> Self {
        SimulatedChain {
            inner: Arc::new(Mutex::new(SimState {
                account,
                chain_id: BASE_CHAIN_ID,
                batch_supported: false,
                in_host: false,
                contract: GM_CONTRACT,
                gm_value: GM_VALUE,
                points: HashMap::new(),
                sent: Vec::new(),
                receipts: HashMap::new(),
                receipt_delay: Duration::from_millis(10),
                nonce: 0,
                faults: Faults::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_chain(self, chain: ChainId) -> Self {
        self.state().chain_id = chain;
        self
    }

    pub fn with_batch(self, supported: bool) -> Self {
        self.state().batch_supported = supported;
        self
    }

    pub fn in_host(self, in_host: bool) -> Self {
        self.state().in_host = in_host;
        self
    }

    pub fn with_points(self, owner: Address, points: u64) -> Self {
        self.set_points(owner, points);
        self
    }

    pub fn with_receipt_delay(self, delay: Duration) -> Self {
        self.state().receipt_delay = delay;
        self
    }

    /// Account handed out by the next `connect`.
    pub fn set_account(&self, account: Address) {
        self.state().account = account;
    }

    pub fn set_points(&self, owner: Address, points: u64) {
        self.state().points.insert(owner, points);
    }

    pub fn points_of(&self, owner: Address) -> u64 {
        self.state().points.get(&owner).copied().unwrap_or(0)
    }

    pub fn chain_id(&self) -> ChainId {
        self.state().chain_id
    }

    pub fn sent(&self) -> Vec<SentSubmission> {
        self.state().sent.clone()
    }

    pub fn reject_next_connect(&self) {
        self.state().faults.connect = true;
    }

    pub fn reject_next_switch(&self) {
        self.state().faults.switch_chain = true;
    }

    pub fn reject_next_submission(&self) {
        self.state().faults.submit = true;
    }

    /// The next submission is mined but reverts.
    pub fn revert_next(&self) {
        self.state().faults.revert = true;
    }

    pub fn fail_next_read(&self) {
        self.state().faults.read = true;
    }

    pub fn fail_host_ready(&self) {
        self.state().faults.host_ready = true;
    }
}

impl SimState {
    fn connection(&self) -> Connection {
        Connection {
            address: self.account,
            chain_id: self.chain_id,
            batch_supported: self.batch_supported,
        }
    }

    fn next_hash(&mut self) -> TxHash {
        self.nonce += 1;
        TxHash::from(U256::from(self.nonce))
    }

    fn check_chain(&self, chain: ChainId) -> Result<(), ClientError> {
        if chain == self.chain_id {
            Ok(())
        } else {
            Err(ClientError::Rpc {
                code: 4901,
                message: format!("wallet is on chain {}, not {chain}", self.chain_id),
            })
        }
    }

    /// Mine `calls` from `from`, crediting a point for every valid `gm()`.
    fn mine(
        &mut self,
        from: Address,
        chain: ChainId,
        calls: Vec<Call>,
        handle: SubmissionHandle,
        hash: TxHash,
    ) {
        let reverted = std::mem::take(&mut self.faults.revert);
        if !reverted {
            let gm = encode_gm();
            let credited = calls
                .iter()
                .filter(|c| c.to == self.contract && c.data == gm && c.value >= self.gm_value)
                .count() as u64;
            *self.points.entry(from).or_default() += credited;
        }
        let status = if reverted {
            ReceiptStatus::Reverted(Some(hash))
        } else {
            ReceiptStatus::Confirmed(Some(hash))
        };
        debug!(%from, %handle, reverted, "simulated submission mined");
        self.receipts.insert(handle.clone(), status);
        self.sent.push(SentSubmission {
            from,
            chain,
            handle,
            calls,
        });
    }
}

impl WalletProvider for SimulatedChain {
    async fn connect(&self, connector: ConnectorChoice) -> Result<Connection, ClientError> {
        let mut state = self.state();
        if std::mem::take(&mut state.faults.connect) {
            return Err(ClientError::Rejected(format!("{connector:?} connection declined")));
        }
        Ok(state.connection())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

impl ChainClient for SimulatedChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let mut state = self.state();
        if std::mem::take(&mut state.faults.read) {
            return Err(ClientError::Rpc {
                code: -32603,
                message: "simulated read failure".into(),
            });
        }
        let owner = decode_get_points(&data)
            .filter(|_| to == state.contract)
            .ok_or_else(|| ClientError::Rpc {
                code: 3,
                message: "execution reverted".into(),
            })?;
        let points = state.points.get(&owner).copied().unwrap_or(0);
        Ok(encode_points(U256::from(points)))
    }

    async fn switch_chain(&self, chain: ChainId) -> Result<(), ClientError> {
        let mut state = self.state();
        if std::mem::take(&mut state.faults.switch_chain) {
            return Err(ClientError::Rejected("chain switch declined".into()));
        }
        state.chain_id = chain;
        Ok(())
    }

    async fn write_contract(
        &self,
        from: Address,
        chain: ChainId,
        call: Call,
    ) -> Result<TxHash, ClientError> {
        let mut state = self.state();
        if std::mem::take(&mut state.faults.submit) {
            return Err(ClientError::Rejected("transaction declined".into()));
        }
        state.check_chain(chain)?;
        let hash = state.next_hash();
        state.mine(from, chain, vec![call], SubmissionHandle::Transaction(hash), hash);
        Ok(hash)
    }

    async fn send_batch(
        &self,
        from: Address,
        chain: ChainId,
        calls: Vec<Call>,
    ) -> Result<String, ClientError> {
        let mut state = self.state();
        if !state.batch_supported {
            return Err(ClientError::Unsupported("wallet_sendCalls"));
        }
        if std::mem::take(&mut state.faults.submit) {
            return Err(ClientError::Rejected("batch declined".into()));
        }
        state.check_chain(chain)?;
        let hash = state.next_hash();
        let id = format!("bundle-{}", state.nonce);
        state.mine(from, chain, calls, SubmissionHandle::Batch(id.clone()), hash);
        Ok(id)
    }

    async fn wait_for_receipt(&self, handle: SubmissionHandle) -> Result<ReceiptStatus, ClientError> {
        let (delay, status) = {
            let state = self.state();
            (state.receipt_delay, state.receipts.get(&handle).cloned())
        };
        tokio::time::sleep(delay).await;
        status.ok_or_else(|| ClientError::Rpc {
            code: -32000,
            message: format!("unknown submission {handle}"),
        })
    }
}

impl HostPlatform for SimulatedChain {
    fn in_host(&self) -> bool {
        self.state().in_host
    }

    async fn ready(&self) -> Result<(), ClientError> {
        if std::mem::take(&mut self.state().faults.host_ready) {
            return Err(ClientError::Unavailable("host sdk did not answer".into()));
        }
        Ok(())
    }
}
