//! Daily GM session crate root.
//!
//! The session is a sans-IO state machine (`contract::GmSession`) that consumes
//! user `Operation`s and collaborator `Message`s and answers with `Effect`s.
//! `runtime::SessionRuntime` owns the event queue, executes effects against
//! the wallet, chain and host collaborators and feeds results back.

pub mod celebration;
pub mod chain;
pub mod config;
pub mod contract;
pub mod error;
pub mod rpc;
pub mod runtime;
pub mod service;
pub mod sim;
pub mod state;
pub mod store;
pub mod submit;
pub mod sync;
pub mod view;

use std::time::Duration;

use serde::Serialize;
use shared_types::{Address, Call, ChainId, ConnectorChoice, ReceiptStatus, SubmissionHandle};

pub use chain::{ChainClient, Clock, Connection, HostPlatform, SystemClock, WalletProvider};
pub use config::AppConfig;
pub use contract::GmSession;
pub use error::{ClientError, RuntimeClosed, SessionError, StoreError};
pub use runtime::{NoticeEvent, SessionHandle, SessionRuntime};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use submit::SubmissionStrategy;
pub use view::SessionView;

/// User actions accepted by the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// App loaded. Signals the host when embedded.
    Init,
    /// Connect a wallet; `None` picks the first available connector.
    Connect { connector: Option<ConnectorChoice> },
    Disconnect,
    /// Send today's GM.
    SubmitGm,
    /// Send two plain value transfers as one atomic batch.
    BatchDemo,
    /// Re-read points for the active wallet.
    RefreshPoints,
    /// Forget everything cached for the active wallet.
    ResetCache,
}

/// Results of external work, delivered back through the event queue.
#[derive(Debug)]
pub enum Message {
    HostReady(Result<(), ClientError>),
    Connected(Result<Connection, ClientError>),
    /// Wallet reported a different account (or none) without a user action.
    AccountChanged(Option<Connection>),
    PointsRead {
        /// Account the read was issued for.
        account: Address,
        result: Result<u64, ClientError>,
    },
    ChainSwitched {
        submission: u64,
        result: Result<(), ClientError>,
    },
    Submitted {
        submission: u64,
        result: Result<SubmissionHandle, ClientError>,
    },
    Receipt {
        submission: u64,
        result: Result<ReceiptStatus, ClientError>,
    },
    TimerElapsed(Timer),
}

/// Self-clearing UI timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timer {
    Celebration(u64),
    Highlight(u64),
}

/// Work requested by the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    HostReady,
    Connect(ConnectorChoice),
    Disconnect,
    ReadPoints {
        contract: Address,
        account: Address,
    },
    SwitchChain {
        submission: u64,
        chain: ChainId,
    },
    Submit {
        submission: u64,
        account: Address,
        chain: ChainId,
        strategy: SubmissionStrategy,
        calls: Vec<Call>,
    },
    WaitForReceipt {
        submission: u64,
        handle: SubmissionHandle,
    },
    Schedule {
        after: Duration,
        timer: Timer,
    },
    Notify(Notice),
    DismissNotices,
}

/// Severity of a transient notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NoticeLevel {
    Info,
    Loading,
    Success,
    Error,
}

/// Transient user-visible notification (a toast).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>) -> Self {
        Notice {
            level,
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
