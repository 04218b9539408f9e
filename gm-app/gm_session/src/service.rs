//! GraphQL surface over a running session.

use async_graphql::{EmptySubscription, Error, Object, Request, Response, Schema};
use shared_types::ConnectorChoice;
use tokio::sync::watch;

use crate::runtime::SessionHandle;
use crate::view::{SessionView, SubmissionPhaseView};
use crate::Operation;

#[derive(Clone)]
pub struct GmService {
    view: watch::Receiver<SessionView>,
    handle: Option<SessionHandle>,
}

impl GmService {
    pub fn new(handle: SessionHandle) -> Self {
        GmService {
            view: handle.subscribe(),
            handle: Some(handle),
        }
    }

    /// Read-only service over a fixed snapshot. Mutations fail.
    pub fn from_view(view: SessionView) -> Self {
        let (_, view) = watch::channel(view);
        GmService { view, handle: None }
    }

    pub async fn handle_query(&self, request: Request) -> Response {
        let schema = Schema::build(
            self.clone(),
            MutationRoot {
                handle: self.handle.clone(),
            },
            EmptySubscription,
        )
        .finish();
        schema.execute(request).await
    }

    fn current(&self) -> SessionView {
        self.view.borrow().clone()
    }
}

#[Object]
impl GmService {
    async fn ready(&self) -> bool {
        self.current().ready
    }

    /// EIP-55 checksummed address of the connected wallet.
    async fn address(&self) -> Option<String> {
        self.current().address.map(|address| address.to_checksum(None))
    }

    async fn short_address(&self) -> Option<String> {
        self.current().short_address()
    }

    async fn chain_id(&self) -> Option<u64> {
        self.current().chain_id.map(|chain| chain.0)
    }

    async fn batch_supported(&self) -> bool {
        self.current().batch_supported
    }

    /// Displayed points; `null` until known.
    async fn points(&self) -> Option<u64> {
        self.current().points
    }

    async fn points_synced(&self) -> bool {
        self.current().points_synced
    }

    /// RFC 3339 time of the last confirmed GM.
    async fn last_gm(&self) -> Option<String> {
        self.current().last_gm.map(|at| at.to_rfc3339())
    }

    async fn last_gm_label(&self) -> String {
        self.current().last_gm_label()
    }

    async fn can_gm(&self) -> bool {
        self.current().can_gm
    }

    async fn button_label(&self) -> String {
        self.current().button_label().to_owned()
    }

    async fn submission(&self) -> SubmissionPhaseView {
        self.current().submission
    }

    /// Failure detail of the most recent submission, if it failed.
    async fn last_error(&self) -> Option<String> {
        self.current()
            .last_outcome
            .filter(|outcome| !outcome.confirmed)
            .and_then(|outcome| outcome.detail)
    }

    async fn celebrating(&self) -> bool {
        self.current().celebration.is_some()
    }

    async fn highlight(&self) -> bool {
        self.current().highlight
    }
}

pub struct MutationRoot {
    handle: Option<SessionHandle>,
}

impl MutationRoot {
    fn send(&self, operation: Operation) -> Result<bool, Error> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::new("session is read-only"))?;
        handle.send(operation)?;
        Ok(true)
    }
}

#[Object]
impl MutationRoot {
    async fn connect(&self, connector: Option<ConnectorChoice>) -> Result<bool, Error> {
        self.send(Operation::Connect { connector })
    }

    async fn disconnect(&self) -> Result<bool, Error> {
        self.send(Operation::Disconnect)
    }

    async fn gm(&self) -> Result<bool, Error> {
        self.send(Operation::SubmitGm)
    }

    async fn batch_demo(&self) -> Result<bool, Error> {
        self.send(Operation::BatchDemo)
    }

    async fn refresh_points(&self) -> Result<bool, Error> {
        self.send(Operation::RefreshPoints)
    }

    async fn reset_cache(&self) -> Result<bool, Error> {
        self.send(Operation::ResetCache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::{Address, BASE_CHAIN_ID};

    fn snapshot() -> SessionView {
        SessionView {
            ready: true,
            address: Some(Address::new([0x12; 20])),
            chain_id: Some(BASE_CHAIN_ID),
            points: Some(7),
            points_synced: true,
            can_gm: true,
            ..SessionView::default()
        }
    }

    #[tokio::test]
    async fn queries_read_the_view() {
        let service = GmService::from_view(snapshot());
        let response = service
            .handle_query(Request::new(
                "{ shortAddress chainId points lastGmLabel canGm buttonLabel submission celebrating }",
            ))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({
                "shortAddress": "0x1212...1212",
                "chainId": 8453,
                "points": 7,
                "lastGmLabel": "Never",
                "canGm": true,
                "buttonLabel": "GM",
                "submission": "IDLE",
                "celebrating": false,
            })
        );
    }

    #[tokio::test]
    async fn mutations_need_a_live_session() {
        let service = GmService::from_view(snapshot());
        let response = service.handle_query(Request::new("mutation { gm }")).await;
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].message.contains("read-only"));
    }
}
