//! Read side of a connection.
//!
//! The receiver is the only task that reads from the socket. It decodes every
//! response, feeds it into the matching inflight request, and on exit fails
//! whatever is still pending so no caller waits forever.

use crate::error::ClientError;
use crate::inflight::{InflightTable, Step};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use gremlin_protocol::{Credentials, Decoder, Encoder, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Routes decoded responses to their requests.
pub(crate) struct Dispatcher {
    pub inflight: Arc<InflightTable>,
    pub outbound: mpsc::Sender<Bytes>,
    pub encoder: Encoder,
    pub credentials: Credentials,
    pub shutdown: CancellationToken,
    pub tasks: TaskTracker,
}

impl Dispatcher {
    pub(crate) fn dispatch(&self, response: Response) {
        let id = response.request_id.clone();
        let status = response.status.code;

        let Some((generation, step)) = self.inflight.advance(&id, |entry| entry.advance(response))
        else {
            // Abandoned by its caller.
            tracing::trace!("receiver: dropping response for unknown request id={}", id);
            return;
        };

        match step {
            Step::Pending => {
                tracing::trace!("receiver: request id={} awaiting more fragments", id);
            }
            Step::Authenticate => self.authenticate(id, generation),
            Step::Deliver(outcome) => {
                tracing::trace!("receiver: resolving request id={} status={}", id, status);
                self.inflight.complete(&id, generation, outcome);
            }
        }
    }

    /// Answers an authentication challenge without blocking the read loop.
    fn authenticate(&self, id: String, generation: u64) {
        tracing::debug!("receiver: authentication requested for id={}", id);

        let frame = match self
            .encoder
            .encode_request(&Request::auth(id.as_str(), &self.credentials))
        {
            Ok(frame) => frame,
            Err(e) => {
                self.inflight.complete(&id, generation, Err(e.into()));
                return;
            }
        };

        let outbound = self.outbound.clone();
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = outbound.send(frame) => {}
                _ = shutdown.cancelled() => {
                    tracing::trace!("auth response for id={} abandoned on shutdown", id);
                }
            }
        });
    }
}

/// Runs the receiver until shutdown, a read failure, or a liveness timeout.
///
/// Cancels `shutdown` on return and fails every request still inflight.
pub(crate) async fn run<St>(
    mut stream: St,
    dispatcher: Dispatcher,
    pong_wait: Duration,
) -> Result<(), ClientError>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    tracing::debug!("receiver started");
    let shutdown = dispatcher.shutdown.clone();
    let mut deadline = Instant::now() + pong_wait;

    let result = loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            next = tokio::time::timeout_at(deadline, stream.next()) => match next {
                Err(_) => {
                    tracing::debug!("receiver: no pong within {:?}", pong_wait);
                    break Err(ClientError::Timeout);
                }
                Ok(None) => break Err(ClientError::ConnectionClosed),
                Ok(Some(Err(e))) => break Err(e.into()),
                Ok(Some(Ok(message))) => message,
            }
        };

        let payload = match message {
            Message::Binary(data) => data,
            Message::Text(text) => text.into_bytes(),
            Message::Pong(_) => {
                deadline = Instant::now() + pong_wait;
                continue;
            }
            Message::Ping(_) | Message::Frame(_) => continue,
            Message::Close(frame) => {
                tracing::debug!("receiver: server closed connection: {:?}", frame);
                break Err(ClientError::ConnectionClosed);
            }
        };

        match Decoder::decode_response(&payload) {
            Ok(response) => dispatcher.dispatch(response),
            Err(e) => break Err(e.into()),
        }
    };

    shutdown.cancel();
    let closed = dispatcher.inflight.close_all();
    if closed > 0 {
        tracing::debug!("receiver: failed {} inflight requests", closed);
    }

    tracing::debug!("receiver stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as futures_mpsc;
    use gremlin_protocol::StatusCode;
    use serde_json::json;

    fn dispatcher(inflight: Arc<InflightTable>) -> (Dispatcher, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(1);
        let dispatcher = Dispatcher {
            inflight,
            outbound: tx,
            encoder: Encoder::default(),
            credentials: Credentials::new("user", "pass"),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        };
        (dispatcher, rx)
    }

    fn message(rsp: &Response) -> Result<Message, WsError> {
        Ok(Message::Binary(
            gremlin_protocol::Encoder::encode_response(rsp).unwrap().to_vec(),
        ))
    }

    #[tokio::test]
    async fn test_dispatch_resolves_request() {
        let inflight = Arc::new(InflightTable::new());
        let mut reg = inflight.register("a").unwrap();
        let (dispatcher, _rx) = dispatcher(inflight.clone());

        dispatcher.dispatch(Response::new("a", StatusCode::NoContent));
        let rsp = (&mut reg.result).await.unwrap().unwrap();
        assert_eq!(rsp.status.code, StatusCode::NoContent);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_authenticate_sends_credentials() {
        let inflight = Arc::new(InflightTable::new());
        let _reg = inflight.register("a").unwrap();
        let (dispatcher, mut rx) = dispatcher(inflight.clone());

        dispatcher.dispatch(Response::new("a", StatusCode::Authenticate));

        let frame = rx.recv().await.unwrap();
        let (_, request) = Decoder::decode_request(&frame).unwrap();
        assert_eq!(request, Request::auth("a", &Credentials::new("user", "pass")));
        assert!(inflight.contains("a"));
    }

    #[tokio::test]
    async fn test_pending_auth_send_abandoned_on_shutdown() {
        let inflight = Arc::new(InflightTable::new());
        let _reg = inflight.register("a").unwrap();
        let (dispatcher, mut rx) = dispatcher(inflight.clone());

        // Occupy the handoff slot so the credentials cannot be queued.
        dispatcher
            .outbound
            .send(Bytes::from_static(b"busy"))
            .await
            .unwrap();
        dispatcher.dispatch(Response::new("a", StatusCode::Authenticate));

        dispatcher.shutdown.cancel();
        dispatcher.tasks.close();
        tokio::time::timeout(Duration::from_secs(3), dispatcher.tasks.wait())
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"busy"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal() {
        let inflight = Arc::new(InflightTable::new());
        let mut reg = inflight.register("a").unwrap();
        let (dispatcher, _rx) = dispatcher(inflight.clone());
        let shutdown = dispatcher.shutdown.clone();

        let stream = futures::stream::iter(vec![Ok(Message::Text("garbage".into()))]);
        let result = run(stream, dispatcher, Duration::from_secs(10)).await;

        assert!(matches!(result, Err(ClientError::Protocol(_))));
        assert!(shutdown.is_cancelled());
        assert!(matches!(
            (&mut reg.result).await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_fragments_across_interleaved_ids() {
        let inflight = Arc::new(InflightTable::new());
        let mut a = inflight.register("a").unwrap();
        let mut b = inflight.register("b").unwrap();
        let (dispatcher, _rx) = dispatcher(inflight.clone());

        let data = |v: serde_json::Value| serde_json::value::to_raw_value(&v).unwrap();
        let (tx, rx) = futures_mpsc::unbounded();
        for rsp in [
            Response::new("a", StatusCode::PartialContent).with_data(data(json!([1]))),
            Response::new("b", StatusCode::PartialContent).with_data(data(json!(["x"]))),
            Response::new("a", StatusCode::PartialContent).with_data(data(json!([2]))),
            Response::new("b", StatusCode::Success).with_data(data(json!(["y"]))),
            Response::new("a", StatusCode::Success).with_data(data(json!([3]))),
        ] {
            tx.unbounded_send(message(&rsp)).unwrap();
        }

        let task = tokio::spawn(run(rx, dispatcher, Duration::from_secs(10)));

        let rsp = (&mut a.result).await.unwrap().unwrap();
        let value: serde_json::Value = rsp.decode().unwrap().unwrap();
        assert_eq!(value, json!([1, 2, 3]));

        let rsp = (&mut b.result).await.unwrap().unwrap();
        let value: serde_json::Value = rsp.decode().unwrap().unwrap();
        assert_eq!(value, json!(["x", "y"]));

        drop(tx);
        assert!(matches!(
            task.await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_timeout() {
        let inflight = Arc::new(InflightTable::new());
        let (dispatcher, _rx) = dispatcher(inflight);
        let (_tx, rx) = futures_mpsc::unbounded::<Result<Message, WsError>>();

        let result = run(rx, dispatcher, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(ClientError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_extends_deadline() {
        let inflight = Arc::new(InflightTable::new());
        let (dispatcher, _rx) = dispatcher(inflight);
        let shutdown = dispatcher.shutdown.clone();
        let (tx, rx) = futures_mpsc::unbounded::<Result<Message, WsError>>();

        let task = tokio::spawn(run(rx, dispatcher, Duration::from_secs(10)));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(8)).await;
            tx.unbounded_send(Ok(Message::Pong(Vec::new()))).unwrap();
        }
        assert!(!task.is_finished());

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
