//! Presentation model published after every transition.

use async_graphql::Enum;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_types::{short_address, Address, ChainId};

use crate::celebration::Celebration;
use crate::submit::{Outcome, Phase, SubmissionState};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Enum)]
pub enum SubmissionPhaseView {
    #[default]
    Idle,
    SwitchingChain,
    Broadcasting,
    AwaitingReceipt,
}

impl From<&SubmissionState> for SubmissionPhaseView {
    fn from(state: &SubmissionState) -> Self {
        match state {
            SubmissionState::Submitting(in_flight) => match in_flight.phase {
                Phase::SwitchingChain => SubmissionPhaseView::SwitchingChain,
                Phase::Broadcasting => SubmissionPhaseView::Broadcasting,
                Phase::AwaitingReceipt(_) => SubmissionPhaseView::AwaitingReceipt,
            },
            _ => SubmissionPhaseView::Idle,
        }
    }
}

/// Snapshot of everything the UI renders.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionView {
    pub ready: bool,
    pub connecting: bool,
    pub address: Option<Address>,
    pub chain_id: Option<ChainId>,
    pub batch_supported: bool,
    /// Displayed points; optimistic from cache until the first fresh read.
    pub points: Option<u64>,
    /// A fresh read has resolved for the active wallet.
    pub points_synced: bool,
    pub last_gm: Option<DateTime<Utc>>,
    pub can_gm: bool,
    pub submission: SubmissionPhaseView,
    pub last_outcome: Option<Outcome>,
    pub celebration: Option<Celebration>,
    /// Points just went up.
    pub highlight: bool,
}

impl SessionView {
    pub fn submitting(&self) -> bool {
        self.submission != SubmissionPhaseView::Idle
    }

    pub fn button_label(&self) -> &'static str {
        if self.submitting() {
            "Waiting..."
        } else if !self.can_gm {
            "Come back tomorrow"
        } else {
            "GM"
        }
    }

    pub fn short_address(&self) -> Option<String> {
        self.address.as_ref().map(short_address)
    }

    pub fn last_gm_label(&self) -> String {
        last_gm_label(self.last_gm)
    }
}

/// "Never" or a short month-day date such as "Jan 2".
pub fn last_gm_label(last_gm: Option<DateTime<Utc>>) -> String {
    match last_gm {
        None => "Never".to_owned(),
        Some(at) => at.format("%b %-d").to_string(),
    }
}
