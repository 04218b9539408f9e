//! Session state machine.
//!
//! `GmSession` never performs I/O. It executes user operations and
//! collaborator messages on one logical thread and returns the effects the
//! runtime must carry out. All cache mutations happen here.

use chrono::{DateTime, Utc};
use shared_types::{
    available_connectors, Address, Call, ChainId, ConnectorChoice, ReceiptStatus, SubmissionHandle,
    TxHash, U256,
};
use tracing::{debug, error, info, warn};

use crate::celebration::Celebration;
use crate::chain::{Clock, Connection};
use crate::config::AppConfig;
use crate::error::{ClientError, SessionError, StoreError};
use crate::state::WalletCache;
use crate::store::KeyValueStore;
use crate::submit::{InFlight, Phase, SubmissionKind, SubmissionMachine, SubmissionStrategy};
use crate::sync;
use crate::view::{SessionView, SubmissionPhaseView};
use crate::{Effect, Message, Notice, NoticeLevel, Operation, Timer};

const BATCH_DEMO_VALUES: [U256; 2] = [
    U256::from_limbs([10_000_000_000_000, 0, 0, 0]),
    U256::from_limbs([20_000_000_000_000, 0, 0, 0]),
];

pub struct GmSession<S, K> {
    config: AppConfig,
    in_host: bool,
    store: S,
    clock: K,
    ready: bool,
    connecting: bool,
    connection: Option<Connection>,
    /// Displayed points.
    points: Option<u64>,
    points_synced: bool,
    last_gm: Option<DateTime<Utc>>,
    submission: SubmissionMachine,
    celebration: Option<(u64, Celebration)>,
    highlight: Option<u64>,
    next_timer: u64,
}

impl<S: KeyValueStore, K: Clock> GmSession<S, K> {
    pub fn new(config: AppConfig, store: S, clock: K, in_host: bool) -> Self {
        GmSession {
            config,
            in_host,
            store,
            clock,
            ready: false,
            connecting: false,
            connection: None,
            points: None,
            points_synced: false,
            last_gm: None,
            submission: SubmissionMachine::default(),
            celebration: None,
            highlight: None,
            next_timer: 0,
        }
    }

    pub fn execute_operation(&mut self, operation: Operation) -> Vec<Effect> {
        match operation {
            Operation::Init => self.init(),
            Operation::Connect { connector } => self.connect(connector),
            Operation::Disconnect => self.disconnect(),
            Operation::SubmitGm => self.submit_gm(),
            Operation::BatchDemo => self.batch_demo(),
            Operation::RefreshPoints => self.refresh_points(),
            Operation::ResetCache => self.reset_cache(),
        }
    }

    pub fn execute_message(&mut self, message: Message) -> Vec<Effect> {
        match message {
            Message::HostReady(result) => self.host_ready(result),
            Message::Connected(_) if !self.connecting => {
                debug!("connect result arrived after disconnect; ignored");
                Vec::new()
            }
            Message::Connected(Ok(connection)) => self.activate(connection),
            Message::Connected(Err(err)) => {
                self.connecting = false;
                report(SessionError::Connection(err))
            }
            Message::AccountChanged(connection) => self.account_changed(connection),
            Message::PointsRead { account, result } => self.points_read(account, result),
            Message::ChainSwitched { submission, result } => self.chain_switched(submission, result),
            Message::Submitted { submission, result } => self.submitted(submission, result),
            Message::Receipt { submission, result } => self.receipt(submission, result),
            Message::TimerElapsed(timer) => self.timer_elapsed(timer),
        }
    }

    pub fn view(&self) -> SessionView {
        let now = self.clock.now();
        SessionView {
            ready: self.ready,
            connecting: self.connecting,
            address: self.connection.as_ref().map(|c| c.address),
            chain_id: self.connection.as_ref().map(|c| c.chain_id),
            batch_supported: self.connection.as_ref().is_some_and(|c| c.batch_supported),
            points: self.points,
            points_synced: self.points_synced,
            last_gm: self.last_gm,
            can_gm: self.connection.is_some() && daily_gate::can_submit(now, self.last_gm),
            submission: SubmissionPhaseView::from(self.submission.state()),
            last_outcome: self.submission.last_outcome().cloned(),
            celebration: self.celebration.as_ref().map(|(_, c)| c.clone()),
            highlight: self.highlight.is_some(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn submission(&self) -> &SubmissionMachine {
        &self.submission
    }

    fn active_account(&self) -> Option<Address> {
        self.connection.as_ref().map(|c| c.address)
    }

    fn init(&mut self) -> Vec<Effect> {
        if self.in_host {
            vec![Effect::HostReady]
        } else {
            self.ready = true;
            Vec::new()
        }
    }

    fn host_ready(&mut self, result: Result<(), ClientError>) -> Vec<Effect> {
        // A failed handshake must not lock the UI.
        self.ready = true;
        match result {
            Ok(()) => {
                info!("host signalled ready");
                Vec::new()
            }
            Err(err) => report(SessionError::Host(err)),
        }
    }

    fn connect(&mut self, connector: Option<ConnectorChoice>) -> Vec<Effect> {
        if self.connecting {
            debug!("connection already pending");
            return Vec::new();
        }
        let choice = connector.unwrap_or_else(|| {
            available_connectors(self.in_host)
                .first()
                .copied()
                .unwrap_or(ConnectorChoice::Injected)
        });
        self.connecting = true;
        vec![Effect::Connect(choice)]
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        if let Some(connection) = &self.connection {
            info!(address = %connection.address, "wallet disconnected");
        }
        self.deactivate();
        vec![Effect::Disconnect]
    }

    fn account_changed(&mut self, connection: Option<Connection>) -> Vec<Effect> {
        match connection {
            Some(next) if self.connection.is_none() => {
                debug!(address = %next.address, "account change without a session; ignored");
                Vec::new()
            }
            Some(next) if self.active_account() == Some(next.address) => {
                self.connection = Some(next);
                Vec::new()
            }
            Some(next) => self.activate(next),
            None => {
                self.deactivate();
                Vec::new()
            }
        }
    }

    fn activate(&mut self, connection: Connection) -> Vec<Effect> {
        let address = connection.address;
        info!(
            %address,
            chain = %connection.chain_id,
            batch = connection.batch_supported,
            "wallet connected"
        );
        self.deactivate();
        self.connection = Some(connection);

        let mut effects = Vec::new();
        match load_partition(&mut self.store, address, self.clock.now()) {
            Ok((last_gm, points)) => {
                self.last_gm = last_gm;
                self.points = points;
            }
            Err(err) => effects.extend(report(SessionError::Store(err))),
        }
        effects.push(self.read_points(address));
        effects
    }

    fn deactivate(&mut self) {
        self.connecting = false;
        self.connection = None;
        self.points = None;
        self.points_synced = false;
        self.last_gm = None;
        self.celebration = None;
        self.highlight = None;
    }

    fn read_points(&self, account: Address) -> Effect {
        Effect::ReadPoints {
            contract: self.config.contract,
            account,
        }
    }

    fn refresh_points(&mut self) -> Vec<Effect> {
        match self.active_account() {
            Some(account) => vec![self.read_points(account)],
            None => Vec::new(),
        }
    }

    fn reset_cache(&mut self) -> Vec<Effect> {
        let Some(account) = self.active_account() else {
            return Vec::new();
        };
        if let Err(err) = WalletCache::new(&mut self.store, account).clear() {
            return report(SessionError::Store(err));
        }
        info!(%account, "cache cleared");
        self.points = None;
        self.points_synced = false;
        self.last_gm = None;
        vec![self.read_points(account)]
    }

    fn points_read(
        &mut self,
        account: Address,
        result: Result<u64, ClientError>,
    ) -> Vec<Effect> {
        if self.active_account() != Some(account) {
            debug!(%account, "discarding points read for inactive account");
            return Vec::new();
        }
        self.points_synced = true;
        let fresh = match result {
            Ok(fresh) => fresh,
            Err(err) => return report(SessionError::Read(err)),
        };

        let now = self.clock.now();
        let outcome = match sync::sync_points(&mut WalletCache::new(&mut self.store, account), fresh, now) {
            Ok(outcome) => outcome,
            Err(err) => return report(SessionError::Store(err)),
        };
        if let Some(at) = outcome.implicit_confirmation {
            info!(%account, points = fresh, "points increased; recording GM");
            self.last_gm = Some(at);
        }

        match self.points {
            Some(shown) if fresh > shown => {
                self.points = Some(fresh);
                self.flash_highlight()
            }
            Some(shown) if fresh < shown => {
                warn!(%account, shown, fresh, "on-chain points below displayed value");
                Vec::new()
            }
            _ => {
                self.points = Some(fresh);
                Vec::new()
            }
        }
    }

    fn submit_gm(&mut self) -> Vec<Effect> {
        let Some(connection) = self.connection.clone() else {
            return vec![Effect::Notify(Notice::new(NoticeLevel::Info, "Connect a wallet first"))];
        };
        if self.submission.is_submitting() {
            debug!("GM already in flight; trigger ignored");
            return Vec::new();
        }

        let now = self.clock.now();
        match WalletCache::new(&mut self.store, connection.address).rollover(now) {
            Ok(last_gm) => self.last_gm = last_gm,
            Err(err) => return report(SessionError::Store(err)),
        }
        if !daily_gate::can_submit(now, self.last_gm) {
            info!(address = %connection.address, "GM already sent today");
            return vec![Effect::Notify(
                Notice::new(NoticeLevel::Info, "Already said GM today")
                    .with_description("Come back tomorrow"),
            )];
        }

        let calls = vec![Call::gm(self.config.contract, self.config.gm_value_wei)];
        let strategy = SubmissionStrategy::for_capabilities(connection.batch_supported);
        self.start(connection, SubmissionKind::Gm, strategy, calls)
    }

    fn batch_demo(&mut self) -> Vec<Effect> {
        let Some(connection) = self.connection.clone() else {
            return vec![Effect::Notify(Notice::new(NoticeLevel::Info, "Connect a wallet first"))];
        };
        if self.submission.is_submitting() {
            debug!("submission already in flight; batch demo ignored");
            return Vec::new();
        }
        if !connection.batch_supported {
            return vec![Effect::Notify(Notice::new(
                NoticeLevel::Error,
                "Batch transactions not supported by your wallet",
            ))];
        }
        let calls = BATCH_DEMO_VALUES
            .iter()
            .map(|value| Call::transfer(self.config.contract, *value))
            .collect();
        self.start(connection, SubmissionKind::BatchDemo, SubmissionStrategy::Batch, calls)
    }

    fn start(
        &mut self,
        connection: Connection,
        kind: SubmissionKind,
        strategy: SubmissionStrategy,
        calls: Vec<Call>,
    ) -> Vec<Effect> {
        let target = self.config.chain_id;
        let phase = if connection.chain_id == target {
            Phase::Broadcasting
        } else {
            Phase::SwitchingChain
        };
        let Some(in_flight) = self.submission.begin(connection.address, kind, strategy, calls, phase) else {
            return Vec::new();
        };
        info!(submission = in_flight.id, ?kind, ?strategy, "submission started");
        match in_flight.phase {
            Phase::SwitchingChain => vec![Effect::SwitchChain {
                submission: in_flight.id,
                chain: target,
            }],
            _ => vec![submit_effect(in_flight, target)],
        }
    }

    fn chain_switched(&mut self, id: u64, result: Result<(), ClientError>) -> Vec<Effect> {
        let target = self.config.chain_id;
        if let Err(err) = result {
            return self.fail(
                id,
                SessionError::ChainSwitch {
                    chain: target.0,
                    source: err,
                },
            );
        }
        let account = self.submission.current(id).map(|in_flight| in_flight.account);
        if let (Some(connection), Some(account)) = (self.connection.as_mut(), account) {
            if connection.address == account {
                connection.chain_id = target;
            }
        }
        match self.submission.advance(id, Phase::Broadcasting) {
            Some(in_flight) => vec![submit_effect(in_flight, target)],
            None => {
                debug!(submission = id, "stale chain switch result");
                Vec::new()
            }
        }
    }

    fn submitted(&mut self, id: u64, result: Result<SubmissionHandle, ClientError>) -> Vec<Effect> {
        let handle = match result {
            Ok(handle) => handle,
            Err(err) => return self.fail(id, SessionError::Submission(err)),
        };
        if self.submission.advance(id, Phase::AwaitingReceipt(handle.clone())).is_none() {
            debug!(submission = id, "stale broadcast result");
            return Vec::new();
        }
        info!(submission = id, %handle, "submission broadcast");
        vec![
            Effect::Notify(Notice::new(
                NoticeLevel::Loading,
                "Waiting for transaction confirmation...",
            )),
            Effect::WaitForReceipt {
                submission: id,
                handle,
            },
        ]
    }

    fn receipt(&mut self, id: u64, result: Result<ReceiptStatus, ClientError>) -> Vec<Effect> {
        match result {
            Ok(ReceiptStatus::Confirmed(hash)) => self.confirm(id, hash),
            Ok(ReceiptStatus::Reverted(hash)) => {
                let detail = hash.map_or_else(|| "unknown transaction".to_owned(), |h| h.to_string());
                self.fail(id, SessionError::Submission(ClientError::Reverted(detail)))
            }
            Err(err) => self.fail(id, SessionError::Submission(err)),
        }
    }

    fn confirm(&mut self, id: u64, hash: Option<TxHash>) -> Vec<Effect> {
        let Some(in_flight) = self.submission.confirm(id) else {
            debug!(submission = id, "stale receipt");
            return Vec::new();
        };
        info!(submission = id, account = %in_flight.account, "submission confirmed");

        let mut effects = Vec::new();
        let active = self.active_account() == Some(in_flight.account);
        if in_flight.kind == SubmissionKind::Gm {
            let now = self.clock.now();
            match sync::record_confirmation(&mut WalletCache::new(&mut self.store, in_flight.account), now) {
                Ok(()) if active => self.last_gm = Some(now),
                Ok(()) => {}
                Err(err) => effects.extend(report(SessionError::Store(err))),
            }
        }

        if active {
            let title = match in_flight.kind {
                SubmissionKind::Gm => "GM transaction confirmed 🎉",
                SubmissionKind::BatchDemo => "Batch transaction confirmed",
            };
            let mut notice = Notice::new(NoticeLevel::Success, title);
            if let Some(hash) = hash {
                notice = notice.with_description(format!(
                    "View on BaseScan: {}",
                    self.config.explorer_link(&hash)
                ));
            }
            effects.push(Effect::DismissNotices);
            effects.push(Effect::Notify(notice));
            if in_flight.kind == SubmissionKind::Gm {
                effects.extend(self.celebrate());
            }
            effects.push(self.read_points(in_flight.account));
        } else {
            debug!(submission = id, "confirmation for inactive account; UI effects skipped");
        }
        self.submission.finish();
        effects
    }

    fn fail(&mut self, id: u64, err: SessionError) -> Vec<Effect> {
        let Some(in_flight) = self.submission.fail(id, err.to_string()) else {
            debug!(submission = id, "stale failure");
            return Vec::new();
        };
        let effects = if self.active_account() == Some(in_flight.account) {
            report(err)
        } else {
            warn!(submission = id, error = %err, "submission failed for inactive account");
            Vec::new()
        };
        self.submission.finish();
        effects
    }

    fn celebrate(&mut self) -> Vec<Effect> {
        let id = self.next_timer();
        self.celebration = Some((id, Celebration::burst(&mut rand::thread_rng())));
        vec![Effect::Schedule {
            after: self.config.celebration(),
            timer: Timer::Celebration(id),
        }]
    }

    fn flash_highlight(&mut self) -> Vec<Effect> {
        let id = self.next_timer();
        self.highlight = Some(id);
        vec![Effect::Schedule {
            after: self.config.highlight(),
            timer: Timer::Highlight(id),
        }]
    }

    fn next_timer(&mut self) -> u64 {
        self.next_timer += 1;
        self.next_timer
    }

    fn timer_elapsed(&mut self, timer: Timer) -> Vec<Effect> {
        match timer {
            Timer::Celebration(id) => {
                if matches!(self.celebration, Some((current, _)) if current == id) {
                    self.celebration = None;
                }
            }
            Timer::Highlight(id) => {
                if self.highlight == Some(id) {
                    self.highlight = None;
                }
            }
        }
        Vec::new()
    }
}

fn load_partition<S: KeyValueStore>(
    store: &mut S,
    account: Address,
    now: DateTime<Utc>,
) -> Result<(Option<DateTime<Utc>>, Option<u64>), StoreError> {
    let mut cache = WalletCache::new(store, account);
    let last_gm = cache.rollover(now)?;
    let points = cache.points()?;
    Ok((last_gm, points))
}

fn submit_effect(in_flight: &InFlight, chain: ChainId) -> Effect {
    Effect::Submit {
        submission: in_flight.id,
        account: in_flight.account,
        chain,
        strategy: in_flight.strategy,
        calls: in_flight.calls.clone(),
    }
}

/// Log an error and turn it into a notice replacing any pending one.
fn report(err: SessionError) -> Vec<Effect> {
    error!(error = %err, "session error");
    let title = match &err {
        SessionError::Connection(_) => "Wallet connection failed",
        SessionError::ChainSwitch { .. } => "Could not switch network",
        SessionError::Submission(_) => "Transaction failed ❌",
        SessionError::Read(_) => "Could not load points",
        SessionError::Host(_) => "Failed to initialize host SDK",
        SessionError::Store(_) => "Local cache unavailable",
    };
    vec![
        Effect::DismissNotices,
        Effect::Notify(Notice::new(NoticeLevel::Error, title).with_description(err.to_string())),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::ManualClock;
    use crate::store::MemoryStore;
    use shared_types::{BASE_CHAIN_ID, GM_CONTRACT};

    const ALICE: Address = Address::new([0xa1; 20]);
    const BOB: Address = Address::new([0xb0; 20]);
    const HASH: TxHash = TxHash::new([0x11; 32]);

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn session(now: &str) -> (GmSession<MemoryStore, Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(now)));
        let session = GmSession::new(AppConfig::default(), MemoryStore::new(), clock.clone(), false);
        (session, clock)
    }

    fn connection(address: Address, chain_id: ChainId, batch: bool) -> Connection {
        Connection {
            address,
            chain_id,
            batch_supported: batch,
        }
    }

    fn connected(now: &str) -> (GmSession<MemoryStore, Arc<ManualClock>>, Arc<ManualClock>) {
        let (mut s, clock) = session(now);
        s.execute_operation(Operation::Connect { connector: None });
        s.execute_message(Message::Connected(Ok(connection(ALICE, BASE_CHAIN_ID, false))));
        (s, clock)
    }

    fn submit_id(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Submit { submission, .. } | Effect::SwitchChain { submission, .. } => {
                    Some(*submission)
                }
                _ => None,
            })
            .expect("no submission effect")
    }

    /// Drive a GM through broadcast and receipt.
    fn land_gm(s: &mut GmSession<MemoryStore, Arc<ManualClock>>) -> Vec<Effect> {
        let id = submit_id(&s.execute_operation(Operation::SubmitGm));
        s.execute_message(Message::Submitted {
            submission: id,
            result: Ok(SubmissionHandle::Transaction(HASH)),
        });
        s.execute_message(Message::Receipt {
            submission: id,
            result: Ok(ReceiptStatus::Confirmed(Some(HASH))),
        })
    }

    fn has_error_notice(effects: &[Effect]) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::Notify(n) if n.level == NoticeLevel::Error))
    }

    #[test]
    fn init_outside_host_is_ready_immediately() {
        let (mut s, _) = session("2024-01-01T00:00:00Z");
        assert!(s.execute_operation(Operation::Init).is_empty());
        assert!(s.view().ready);
    }

    #[test]
    fn host_failure_still_leaves_ui_ready() {
        let clock = Arc::new(ManualClock::new(at("2024-01-01T00:00:00Z")));
        let mut s = GmSession::new(AppConfig::default(), MemoryStore::new(), clock, true);
        assert_eq!(s.execute_operation(Operation::Init), vec![Effect::HostReady]);
        assert!(!s.view().ready);
        let effects = s.execute_message(Message::HostReady(Err(ClientError::Unavailable("no sdk".into()))));
        assert!(has_error_notice(&effects));
        assert!(s.view().ready);
    }

    #[test]
    fn default_connector_prefers_host_wallet() {
        let clock = Arc::new(ManualClock::new(at("2024-01-01T00:00:00Z")));
        let mut s = GmSession::new(AppConfig::default(), MemoryStore::new(), clock, true);
        assert_eq!(
            s.execute_operation(Operation::Connect { connector: None }),
            vec![Effect::Connect(ConnectorChoice::MiniApp)]
        );
        assert!(s.execute_operation(Operation::Connect { connector: None }).is_empty());
    }

    #[test]
    fn connect_reads_points_and_shows_cached_value() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        WalletCache::new(&mut s.store, ALICE).set_points(4).unwrap();
        s.execute_operation(Operation::Connect { connector: None });
        let effects = s.execute_message(Message::Connected(Ok(connection(ALICE, BASE_CHAIN_ID, false))));
        assert_eq!(
            effects,
            vec![Effect::ReadPoints {
                contract: GM_CONTRACT,
                account: ALICE
            }]
        );
        let view = s.view();
        assert_eq!(view.address, Some(ALICE));
        assert_eq!(view.points, Some(4));
        assert!(!view.points_synced);
        assert!(view.can_gm);
    }

    #[test]
    fn connect_failure_notifies() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Connect { connector: None });
        let effects = s.execute_message(Message::Connected(Err(ClientError::Rejected("no".into()))));
        assert!(has_error_notice(&effects));
        assert!(!s.view().connecting);
        assert_eq!(s.view().address, None);
    }

    #[test]
    fn stale_gm_time_is_rolled_over_on_connect() {
        let (mut s, _) = session("2024-01-02T00:00:01Z");
        WalletCache::new(&mut s.store, ALICE)
            .set_last_gm(at("2024-01-01T23:59:00Z"))
            .unwrap();
        s.execute_operation(Operation::Connect { connector: None });
        s.execute_message(Message::Connected(Ok(connection(ALICE, BASE_CHAIN_ID, false))));
        assert_eq!(s.view().last_gm, None);
        assert!(s.view().can_gm);
        assert_eq!(WalletCache::new(&mut s.store, ALICE).last_gm().unwrap(), None);
    }

    #[test]
    fn double_trigger_sends_one_transaction() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let first = s.execute_operation(Operation::SubmitGm);
        assert!(matches!(first.as_slice(), [Effect::Submit { .. }]));
        assert!(s.execute_operation(Operation::SubmitGm).is_empty());
        assert!(s.execute_operation(Operation::BatchDemo).is_empty());
        assert_eq!(s.view().button_label(), "Waiting...");
    }

    #[test]
    fn wrong_chain_switches_first() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Connect { connector: None });
        s.execute_message(Message::Connected(Ok(connection(ALICE, ChainId(1), false))));
        let effects = s.execute_operation(Operation::SubmitGm);
        let id = submit_id(&effects);
        assert_eq!(
            effects,
            vec![Effect::SwitchChain {
                submission: id,
                chain: BASE_CHAIN_ID
            }]
        );
        let effects = s.execute_message(Message::ChainSwitched {
            submission: id,
            result: Ok(()),
        });
        assert!(matches!(effects.as_slice(), [Effect::Submit { chain, .. }] if *chain == BASE_CHAIN_ID));
        assert_eq!(s.view().chain_id, Some(BASE_CHAIN_ID));
    }

    #[test]
    fn chain_switch_failure_returns_to_idle_without_consuming_day() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Connect { connector: None });
        s.execute_message(Message::Connected(Ok(connection(ALICE, ChainId(1), false))));
        let id = submit_id(&s.execute_operation(Operation::SubmitGm));
        let effects = s.execute_message(Message::ChainSwitched {
            submission: id,
            result: Err(ClientError::Rejected("user said no".into())),
        });
        assert!(has_error_notice(&effects));
        let view = s.view();
        assert!(!view.submitting());
        assert!(view.can_gm);
        assert!(!view.last_outcome.unwrap().confirmed);
    }

    #[test]
    fn confirmation_records_gm_and_celebrates() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let effects = land_gm(&mut s);
        assert!(effects.iter().any(|e| matches!(e, Effect::Notify(n) if n.level == NoticeLevel::Success
            && n.description.as_deref().is_some_and(|d| d.contains("https://basescan.org/tx/0x1111")))));
        assert!(effects.iter().any(|e| matches!(e, Effect::Schedule { timer: Timer::Celebration(_), .. })));
        assert!(effects.contains(&Effect::ReadPoints {
            contract: GM_CONTRACT,
            account: ALICE
        }));

        let view = s.view();
        assert_eq!(view.last_gm, Some(at("2024-01-01T10:00:00Z")));
        assert!(!view.can_gm);
        assert!(view.celebration.is_some());
        assert_eq!(view.button_label(), "Come back tomorrow");
        assert_eq!(
            WalletCache::new(&mut s.store, ALICE).last_gm().unwrap(),
            Some(at("2024-01-01T10:00:00Z"))
        );
    }

    #[test]
    fn celebration_clears_itself() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let effects = land_gm(&mut s);
        let timer = effects
            .iter()
            .find_map(|e| match e {
                Effect::Schedule { timer, after } => {
                    assert_eq!(*after, s.config().celebration());
                    Some(*timer)
                }
                _ => None,
            })
            .unwrap();
        s.execute_message(Message::TimerElapsed(timer));
        assert!(s.view().celebration.is_none());
    }

    #[test]
    fn gate_blocks_rest_of_day_then_reopens() {
        let (mut s, clock) = connected("2024-01-01T10:00:00Z");
        land_gm(&mut s);
        clock.set(at("2024-01-01T23:59:59Z"));
        let effects = s.execute_operation(Operation::SubmitGm);
        assert!(matches!(effects.as_slice(), [Effect::Notify(n)] if n.level == NoticeLevel::Info));

        clock.set(at("2024-01-02T00:00:01Z"));
        assert!(s.view().can_gm);
        assert!(matches!(s.execute_operation(Operation::SubmitGm).as_slice(), [Effect::Submit { .. }]));
        assert_eq!(s.view().last_gm, None);
    }

    #[test]
    fn reverted_receipt_does_not_consume_day() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let id = submit_id(&s.execute_operation(Operation::SubmitGm));
        s.execute_message(Message::Submitted {
            submission: id,
            result: Ok(SubmissionHandle::Transaction(HASH)),
        });
        let effects = s.execute_message(Message::Receipt {
            submission: id,
            result: Ok(ReceiptStatus::Reverted(Some(HASH))),
        });
        assert!(has_error_notice(&effects));
        assert!(s.view().can_gm);
        assert_eq!(WalletCache::new(&mut s.store, ALICE).last_gm().unwrap(), None);
    }

    #[test]
    fn broadcast_rejection_returns_to_idle() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let id = submit_id(&s.execute_operation(Operation::SubmitGm));
        let effects = s.execute_message(Message::Submitted {
            submission: id,
            result: Err(ClientError::Rejected("denied".into())),
        });
        assert!(has_error_notice(&effects));
        assert!(!s.view().submitting());
        assert!(matches!(s.execute_operation(Operation::SubmitGm).as_slice(), [Effect::Submit { .. }]));
    }

    #[test]
    fn broadcast_waits_for_receipt_with_loading_notice() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let id = submit_id(&s.execute_operation(Operation::SubmitGm));
        let effects = s.execute_message(Message::Submitted {
            submission: id,
            result: Ok(SubmissionHandle::Transaction(HASH)),
        });
        assert_eq!(
            effects,
            vec![
                Effect::Notify(Notice::new(NoticeLevel::Loading, "Waiting for transaction confirmation...")),
                Effect::WaitForReceipt {
                    submission: id,
                    handle: SubmissionHandle::Transaction(HASH)
                },
            ]
        );
        assert_eq!(s.view().submission, SubmissionPhaseView::AwaitingReceipt);
    }

    #[test]
    fn first_read_is_baseline_then_increase_counts_as_gm() {
        let (mut s, clock) = connected("2024-01-01T10:00:00Z");
        s.execute_message(Message::PointsRead {
            account: ALICE,
            result: Ok(5),
        });
        let view = s.view();
        assert_eq!(view.points, Some(5));
        assert_eq!(view.last_gm, None);
        assert!(view.can_gm);

        clock.set(at("2024-01-01T11:00:00Z"));
        let effects = s.execute_message(Message::PointsRead {
            account: ALICE,
            result: Ok(6),
        });
        assert!(matches!(effects.as_slice(), [Effect::Schedule { timer: Timer::Highlight(_), .. }]));
        let view = s.view();
        assert_eq!(view.points, Some(6));
        assert!(view.highlight);
        assert_eq!(view.last_gm, Some(at("2024-01-01T11:00:00Z")));
        assert!(!view.can_gm);
    }

    #[test]
    fn lower_read_keeps_display_but_updates_cache() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        s.execute_message(Message::PointsRead { account: ALICE, result: Ok(5) });
        s.execute_message(Message::PointsRead { account: ALICE, result: Ok(3) });
        assert_eq!(s.view().points, Some(5));
        assert_eq!(WalletCache::new(&mut s.store, ALICE).points().unwrap(), Some(3));

        s.execute_operation(Operation::ResetCache);
        assert_eq!(s.view().points, None);
        s.execute_message(Message::PointsRead { account: ALICE, result: Ok(3) });
        assert_eq!(s.view().points, Some(3));
    }

    #[test]
    fn stale_read_after_account_switch_is_discarded() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        s.execute_message(Message::AccountChanged(Some(connection(BOB, BASE_CHAIN_ID, false))));
        let effects = s.execute_message(Message::PointsRead {
            account: ALICE,
            result: Ok(42),
        });
        assert!(effects.is_empty());
        assert_eq!(s.view().address, Some(BOB));
        assert_eq!(s.view().points, None);
        assert_eq!(WalletCache::new(&mut s.store, ALICE).points().unwrap(), None);
    }

    #[test]
    fn read_failure_is_reported_and_marks_sync_done() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let effects = s.execute_message(Message::PointsRead {
            account: ALICE,
            result: Err(ClientError::Rpc {
                code: -32000,
                message: "boom".into(),
            }),
        });
        assert!(has_error_notice(&effects));
        assert!(s.view().points_synced);
    }

    #[test]
    fn receipt_after_disconnect_records_but_skips_ui() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let id = submit_id(&s.execute_operation(Operation::SubmitGm));
        s.execute_message(Message::Submitted {
            submission: id,
            result: Ok(SubmissionHandle::Transaction(HASH)),
        });
        assert_eq!(s.execute_operation(Operation::Disconnect), vec![Effect::Disconnect]);
        let effects = s.execute_message(Message::Receipt {
            submission: id,
            result: Ok(ReceiptStatus::Confirmed(Some(HASH))),
        });
        assert!(effects.is_empty());
        assert!(s.view().celebration.is_none());
        assert!(WalletCache::new(&mut s.store, ALICE).last_gm().unwrap().is_some());
    }

    #[test]
    fn batch_demo_requires_capability() {
        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        let effects = s.execute_operation(Operation::BatchDemo);
        assert!(has_error_notice(&effects));
        assert!(!s.view().submitting());
    }

    #[test]
    fn batch_demo_sends_two_transfers_and_leaves_gate_open() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Connect { connector: None });
        s.execute_message(Message::Connected(Ok(connection(ALICE, BASE_CHAIN_ID, true))));
        let effects = s.execute_operation(Operation::BatchDemo);
        let id = match effects.as_slice() {
            [Effect::Submit {
                submission,
                strategy: SubmissionStrategy::Batch,
                calls,
                ..
            }] => {
                assert_eq!(calls.len(), 2);
                assert!(calls.iter().all(|c| c.data.is_empty()));
                *submission
            }
            other => panic!("unexpected effects {other:?}"),
        };
        s.execute_message(Message::Submitted {
            submission: id,
            result: Ok(SubmissionHandle::Batch("bundle-1".into())),
        });
        let effects = s.execute_message(Message::Receipt {
            submission: id,
            result: Ok(ReceiptStatus::Confirmed(None)),
        });
        assert!(!effects.iter().any(|e| matches!(e, Effect::Schedule { .. })));
        assert!(s.view().can_gm);
    }

    #[test]
    fn gm_uses_batch_when_wallet_supports_it() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Connect { connector: None });
        s.execute_message(Message::Connected(Ok(connection(ALICE, BASE_CHAIN_ID, true))));
        let effects = s.execute_operation(Operation::SubmitGm);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Submit { strategy: SubmissionStrategy::Batch, calls, .. }] if calls.len() == 1
        ));
    }

    #[test]
    fn submit_without_wallet_only_informs() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        let effects = s.execute_operation(Operation::SubmitGm);
        assert!(matches!(effects.as_slice(), [Effect::Notify(n)] if n.level == NoticeLevel::Info));
        assert!(!s.submission().is_submitting());
    }

    #[test]
    fn connect_result_after_disconnect_is_ignored() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Connect { connector: None });
        assert_eq!(s.execute_operation(Operation::Disconnect), vec![Effect::Disconnect]);
        let effects = s.execute_message(Message::Connected(Ok(connection(ALICE, BASE_CHAIN_ID, false))));
        assert!(effects.is_empty());
        assert_eq!(s.view().address, None);
        assert!(!s.view().connecting);

        let effects = s.execute_message(Message::Connected(Err(ClientError::Rejected("late".into()))));
        assert!(effects.is_empty());
    }

    #[test]
    fn account_change_without_session_is_ignored() {
        let (mut s, _) = session("2024-01-01T10:00:00Z");
        let effects = s.execute_message(Message::AccountChanged(Some(connection(ALICE, BASE_CHAIN_ID, false))));
        assert!(effects.is_empty());
        assert_eq!(s.view().address, None);

        let (mut s, _) = connected("2024-01-01T10:00:00Z");
        s.execute_operation(Operation::Disconnect);
        let effects = s.execute_message(Message::AccountChanged(Some(connection(BOB, BASE_CHAIN_ID, false))));
        assert!(effects.is_empty());
        assert_eq!(s.view().address, None);
    }
}
