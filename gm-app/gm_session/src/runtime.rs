//! Async driver for `GmSession`.
//!
//! Operations, account-change events and collaborator results are funnelled
//! through one loop, so the state machine only ever sees one event at a
//! time. Effects that need I/O are spawned into a `JoinSet`; each task
//! reports back with exactly one `Message` when it completes.

use std::future::Future;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::chain::{read_points, ChainClient, Clock, Connection, HostPlatform, WalletProvider};
use crate::config::AppConfig;
use crate::contract::GmSession;
use crate::error::RuntimeClosed;
use crate::store::KeyValueStore;
use crate::view::SessionView;
use crate::{Effect, Message, Notice, Operation};

const NOTICE_CAPACITY: usize = 32;

/// Toast stream consumed by the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoticeEvent {
    Show(Notice),
    /// Drop every notice currently shown.
    Dismiss,
}

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    operations: mpsc::UnboundedSender<Operation>,
    accounts: mpsc::UnboundedSender<Option<Connection>>,
    view: watch::Receiver<SessionView>,
    notices: broadcast::Sender<NoticeEvent>,
}

impl SessionHandle {
    pub fn send(&self, operation: Operation) -> Result<(), RuntimeClosed> {
        self.operations.send(operation).map_err(|_| RuntimeClosed)
    }

    /// Forward an account change pushed by the wallet.
    pub fn account_changed(&self, connection: Option<Connection>) -> Result<(), RuntimeClosed> {
        self.accounts.send(connection).map_err(|_| RuntimeClosed)
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<NoticeEvent> {
        self.notices.subscribe()
    }

    /// Wait until the published view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionView) -> bool,
    ) -> Result<SessionView, RuntimeClosed> {
        let mut view = self.view.clone();
        let matched = view.wait_for(|v| predicate(v)).await.map_err(|_| RuntimeClosed)?;
        Ok(matched.clone())
    }
}

pub struct SessionRuntime<W, C, H, S, K> {
    session: GmSession<S, K>,
    wallet: W,
    chain: C,
    host: H,
    operations: mpsc::UnboundedReceiver<Operation>,
    accounts: mpsc::UnboundedReceiver<Option<Connection>>,
    view: watch::Sender<SessionView>,
    notices: broadcast::Sender<NoticeEvent>,
    /// Spawned tasks that still owe a message.
    pending: JoinSet<Message>,
    detached: JoinSet<()>,
}

impl<W, C, H, S, K> SessionRuntime<W, C, H, S, K>
where
    W: WalletProvider,
    C: ChainClient,
    H: HostPlatform,
    S: KeyValueStore,
    K: Clock,
{
    pub fn new(
        config: AppConfig,
        store: S,
        clock: K,
        wallet: W,
        chain: C,
        host: H,
    ) -> (Self, SessionHandle) {
        let session = GmSession::new(config, store, clock, host.in_host());
        let (operations_tx, operations) = mpsc::unbounded_channel();
        let (accounts_tx, accounts) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(session.view());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let handle = SessionHandle {
            operations: operations_tx,
            accounts: accounts_tx,
            view: view_rx,
            notices: notices.clone(),
        };
        let runtime = SessionRuntime {
            session,
            wallet,
            chain,
            host,
            operations,
            accounts,
            view,
            notices,
            pending: JoinSet::new(),
            detached: JoinSet::new(),
        };
        (runtime, handle)
    }

    /// Process events until every handle is dropped and no work is pending.
    /// Returns the session so callers can inspect its final state.
    pub async fn run(mut self) -> GmSession<S, K> {
        let mut operations_open = true;
        let mut accounts_open = true;
        loop {
            if !operations_open && self.pending.is_empty() {
                break;
            }
            let effects = tokio::select! {
                operation = self.operations.recv(), if operations_open => match operation {
                    Some(operation) => {
                        debug!(?operation, "operation");
                        self.session.execute_operation(operation)
                    }
                    None => {
                        operations_open = false;
                        Vec::new()
                    }
                },
                change = self.accounts.recv(), if accounts_open => match change {
                    Some(connection) => self.session.execute_message(Message::AccountChanged(connection)),
                    None => {
                        accounts_open = false;
                        Vec::new()
                    }
                },
                Some(joined) = self.pending.join_next(), if !self.pending.is_empty() => match joined {
                    Ok(message) => {
                        debug!(?message, "result");
                        self.session.execute_message(message)
                    }
                    Err(err) => {
                        error!(error = %err, "effect task failed without reporting");
                        Vec::new()
                    }
                },
            };
            self.apply(effects);
            self.publish();
        }
        while let Some(joined) = self.detached.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "background task failed");
            }
        }
        info!("session runtime stopped");
        self.session
    }

    fn publish(&self) {
        let next = self.session.view();
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn spawn<F>(&mut self, work: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        self.pending.spawn(work);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::HostReady => {
                let host = self.host.clone();
                self.spawn(async move { Message::HostReady(host.ready().await) });
            }
            Effect::Connect(connector) => {
                info!(?connector, "connecting wallet");
                let wallet = self.wallet.clone();
                self.spawn(async move { Message::Connected(wallet.connect(connector).await) });
            }
            Effect::Disconnect => {
                let wallet = self.wallet.clone();
                self.detached.spawn(async move {
                    if let Err(err) = wallet.disconnect().await {
                        warn!(error = %err, "wallet disconnect failed");
                    }
                });
            }
            Effect::ReadPoints { contract, account } => {
                let chain = self.chain.clone();
                self.spawn(async move {
                    let result = read_points(&chain, contract, account).await;
                    Message::PointsRead { account, result }
                });
            }
            Effect::SwitchChain { submission, chain: target } => {
                info!(submission, chain = %target, "switching chain");
                let chain = self.chain.clone();
                self.spawn(async move {
                    let result = chain.switch_chain(target).await;
                    Message::ChainSwitched { submission, result }
                });
            }
            Effect::Submit {
                submission,
                account,
                chain: target,
                strategy,
                calls,
            } => {
                let chain = self.chain.clone();
                self.spawn(async move {
                    let result = strategy.submit(&chain, account, target, calls).await;
                    Message::Submitted { submission, result }
                });
            }
            Effect::WaitForReceipt { submission, handle } => {
                let chain = self.chain.clone();
                self.spawn(async move {
                    let result = chain.wait_for_receipt(handle).await;
                    Message::Receipt { submission, result }
                });
            }
            Effect::Schedule { after, timer } => {
                self.spawn(async move {
                    tokio::time::sleep(after).await;
                    Message::TimerElapsed(timer)
                });
            }
            Effect::Notify(notice) => {
                // No subscribers is fine.
                let _ = self.notices.send(NoticeEvent::Show(notice));
            }
            Effect::DismissNotices => {
                let _ = self.notices.send(NoticeEvent::Dismiss);
            }
        }
    }
}
