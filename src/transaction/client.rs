use std::future::Future;
use tokio::sync::{mpsc, Mutex};
use crate::transaction::response::Response;

/// The caller side of a transaction
pub trait TransactionClient: Send + Sync {
    fn send_response(&self, response: Response);

    /// Yes, no, or `None` when the client gave no answer
    fn should_continue(&self) -> impl Future<Output = Option<bool>> + Send;
}

/// Client reached through tokio channels
pub struct ChannelClient {
    responses: mpsc::UnboundedSender<Response>,
    decisions: Mutex<mpsc::Receiver<bool>>,
}

/// The other end of a `ChannelClient`, held by whoever drives the transaction
pub struct ClientHandle {
    responses: mpsc::UnboundedReceiver<Response>,
    decisions: mpsc::Sender<bool>,
}

pub fn channel() -> (ChannelClient, ClientHandle) {
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let (decision_tx, decision_rx) = mpsc::channel(4);
    (
        ChannelClient { responses: response_tx, decisions: Mutex::new(decision_rx) },
        ClientHandle { responses: response_rx, decisions: decision_tx },
    )
}

impl TransactionClient for ChannelClient {
    fn send_response(&self, response: Response) {
        if self.responses.send(response).is_err() {
            tracing::debug!("transaction client is gone, response dropped");
        }
    }

    fn should_continue(&self) -> impl Future<Output = Option<bool>> + Send {
        async move { self.decisions.lock().await.recv().await }
    }
}

impl ClientHandle {
    /// Next response, `None` once the transaction side is dropped
    pub async fn next_response(&mut self) -> Option<Response> {
        self.responses.recv().await
    }

    /// Answer the next `should_continue`
    pub async fn decide(&self, proceed: bool) -> bool {
        self.decisions.send(proceed).await.is_ok()
    }

    /// Every response received so far
    pub fn drain(&mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Ok(response) = self.responses.try_recv() {
            responses.push(response);
        }
        responses
    }
}
