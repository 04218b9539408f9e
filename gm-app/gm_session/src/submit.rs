//! Submission strategy and the `Idle -> Submitting -> Confirmed | Failed -> Idle`
//! machine guarding it.

use serde::Serialize;
use shared_types::{Address, Call, ChainId, SubmissionHandle};
use tracing::debug;

use crate::chain::ChainClient;
use crate::error::ClientError;

/// How calls reach the wallet, picked from its advertised capabilities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SubmissionStrategy {
    /// One `eth_sendTransaction` per submission.
    Single,
    /// One atomic `wallet_sendCalls` bundle.
    Batch,
}

impl SubmissionStrategy {
    pub fn for_capabilities(batch_supported: bool) -> Self {
        if batch_supported {
            SubmissionStrategy::Batch
        } else {
            SubmissionStrategy::Single
        }
    }

    pub async fn submit<C: ChainClient>(
        self,
        client: &C,
        from: Address,
        chain: ChainId,
        mut calls: Vec<Call>,
    ) -> Result<SubmissionHandle, ClientError> {
        match self {
            SubmissionStrategy::Single => {
                if calls.len() != 1 {
                    return Err(ClientError::Unsupported("multiple calls without batch support"));
                }
                let call = calls.remove(0);
                let hash = client.write_contract(from, chain, call).await?;
                Ok(SubmissionHandle::Transaction(hash))
            }
            SubmissionStrategy::Batch => {
                let id = client.send_batch(from, chain, calls).await?;
                Ok(SubmissionHandle::Batch(id))
            }
        }
    }
}

/// What is being submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SubmissionKind {
    /// The daily `gm()` call. Confirmation consumes the day's allowance.
    Gm,
    /// Value-transfer batch demo. Never touches the gate.
    BatchDemo,
}

/// Progress of an in-flight submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    SwitchingChain,
    Broadcasting,
    AwaitingReceipt(SubmissionHandle),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InFlight {
    pub id: u64,
    pub account: Address,
    pub kind: SubmissionKind,
    pub strategy: SubmissionStrategy,
    pub calls: Vec<Call>,
    pub phase: Phase,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting(InFlight),
    Confirmed(InFlight),
    Failed(InFlight),
}

/// Terminal result of the most recent submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub id: u64,
    pub kind: SubmissionKind,
    pub confirmed: bool,
    pub detail: Option<String>,
}

/// Re-entrancy guarded submission machine. At most one submission is in
/// flight; a trigger while `Submitting` is a no-op.
#[derive(Debug)]
pub struct SubmissionMachine {
    state: SubmissionState,
    next_id: u64,
    last_outcome: Option<Outcome>,
}

impl Default for SubmissionMachine {
    fn default() -> Self {
        SubmissionMachine {
            state: SubmissionState::Idle,
            next_id: 1,
            last_outcome: None,
        }
    }
}

impl SubmissionMachine {
    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        match &self.state {
            SubmissionState::Submitting(in_flight) => Some(in_flight),
            _ => None,
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight().is_some()
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    /// `Idle -> Submitting`. Returns `None` when a submission is already in flight.
    pub fn begin(
        &mut self,
        account: Address,
        kind: SubmissionKind,
        strategy: SubmissionStrategy,
        calls: Vec<Call>,
        phase: Phase,
    ) -> Option<&InFlight> {
        if self.is_submitting() {
            debug!("submission already in flight; trigger ignored");
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.state = SubmissionState::Submitting(InFlight {
            id,
            account,
            kind,
            strategy,
            calls,
            phase,
        });
        self.in_flight()
    }

    /// Move the current submission to `phase` if `id` is still current.
    pub fn advance(&mut self, id: u64, phase: Phase) -> Option<&InFlight> {
        match &mut self.state {
            SubmissionState::Submitting(in_flight) if in_flight.id == id => {
                in_flight.phase = phase;
                Some(&*in_flight)
            }
            _ => None,
        }
    }

    /// The in-flight submission, if it is `id`.
    pub fn current(&self, id: u64) -> Option<&InFlight> {
        self.in_flight().filter(|in_flight| in_flight.id == id)
    }

    /// `Submitting -> Confirmed`.
    pub fn confirm(&mut self, id: u64) -> Option<InFlight> {
        self.settle(id, true, None)
    }

    /// `Submitting -> Failed`.
    pub fn fail(&mut self, id: u64, reason: String) -> Option<InFlight> {
        self.settle(id, false, Some(reason))
    }

    /// `Confirmed | Failed -> Idle`, once the outcome's side effects are issued.
    pub fn finish(&mut self) {
        if !self.is_submitting() {
            self.state = SubmissionState::Idle;
        }
    }

    fn settle(&mut self, id: u64, confirmed: bool, detail: Option<String>) -> Option<InFlight> {
        let in_flight = self.current(id)?.clone();
        self.state = if confirmed {
            SubmissionState::Confirmed(in_flight.clone())
        } else {
            SubmissionState::Failed(in_flight.clone())
        };
        self.last_outcome = Some(Outcome {
            id,
            kind: in_flight.kind,
            confirmed,
            detail,
        });
        Some(in_flight)
    }
}
