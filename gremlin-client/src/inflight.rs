//! Table of requests waiting for their responses.

use crate::error::ClientError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gremlin_protocol::codec::fragments;
use gremlin_protocol::{Response, StatusCode};
use serde_json::value::RawValue;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Terminal outcome of one request.
pub(crate) type Outcome = Result<Response, ClientError>;

/// Bookkeeping for a sent but not yet resolved request.
pub(crate) struct InflightRequest {
    /// Elements of partial responses received so far.
    fragments: Option<Vec<Box<RawValue>>>,
    result: oneshot::Sender<Outcome>,
    generation: u64,
}

/// What the receiver does after feeding a response into its request.
pub(crate) enum Step {
    /// More responses are expected.
    Pending,
    /// The server wants credentials before going on.
    Authenticate,
    /// The request is finished.
    Deliver(Outcome),
}

impl InflightRequest {
    /// Advances the request state machine by one response.
    pub(crate) fn advance(&mut self, mut response: Response) -> Step {
        match response.status.code {
            StatusCode::Success if self.fragments.is_none() => Step::Deliver(Ok(response)),
            code @ (StatusCode::Success | StatusCode::PartialContent) => {
                let elements = match fragments::split(response.result.data.as_deref()) {
                    Ok(elements) => elements,
                    Err(e) => return Step::Deliver(Err(ClientError::Fragment(e))),
                };
                self.fragments.get_or_insert_with(Vec::new).extend(elements);

                if code == StatusCode::PartialContent {
                    return Step::Pending;
                }

                let elements = self.fragments.take().unwrap_or_default();
                match fragments::join(&elements) {
                    Ok(data) => {
                        response.result.data = Some(data);
                        Step::Deliver(Ok(response))
                    }
                    Err(e) => Step::Deliver(Err(ClientError::Fragment(e))),
                }
            }
            StatusCode::Authenticate => Step::Authenticate,
            _ => Step::Deliver(Ok(response)),
        }
    }
}

/// Concurrent map from request id to inflight state.
#[derive(Default)]
pub(crate) struct InflightTable {
    entries: DashMap<String, InflightRequest>,
    next_generation: AtomicU64,
}

impl InflightTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a request id, failing if it is already inflight.
    pub(crate) fn register(&self, id: &str) -> Result<Registration<'_>, ClientError> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => Err(ClientError::DuplicateRequest(id.to_string())),
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                slot.insert(InflightRequest {
                    fragments: None,
                    result: tx,
                    generation,
                });
                Ok(Registration {
                    table: self,
                    id: id.to_string(),
                    generation,
                    result: rx,
                })
            }
        }
    }

    /// Runs `f` against the entry for `id`, returning its generation alongside.
    pub(crate) fn advance<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut InflightRequest) -> R,
    ) -> Option<(u64, R)> {
        let mut entry = self.entries.get_mut(id)?;
        let generation = entry.generation;
        Some((generation, f(entry.value_mut())))
    }

    /// Removes the entry and delivers its outcome.
    ///
    /// Returns false if the registration is gone or was replaced.
    pub(crate) fn complete(&self, id: &str, generation: u64, outcome: Outcome) -> bool {
        match self
            .entries
            .remove_if(id, |_, entry| entry.generation == generation)
        {
            Some((_, entry)) => {
                // The waiting caller may have gone away already.
                let _ = entry.result.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Resolves every remaining entry with [`ClientError::ConnectionClosed`].
    pub(crate) fn close_all(&self) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                let _ = entry.result.send(Err(ClientError::ConnectionClosed));
                closed += 1;
            }
        }
        closed
    }

    fn abandon(&self, id: &str, generation: u64) {
        self.entries
            .remove_if(id, |_, entry| entry.generation == generation);
    }

    /// Returns whether `id` is currently registered.
    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A caller's claim on one request id.
///
/// Dropping it deregisters the request unless the receiver already did.
pub(crate) struct Registration<'a> {
    table: &'a InflightTable,
    id: String,
    generation: u64,
    pub(crate) result: oneshot::Receiver<Outcome>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.table.abandon(&self.id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(id: &str, code: StatusCode, data: Option<serde_json::Value>) -> Response {
        let mut rsp = Response::new(id, code);
        if let Some(data) = data {
            rsp = rsp.with_data(serde_json::value::to_raw_value(&data).unwrap());
        }
        rsp
    }

    fn feed(table: &InflightTable, rsp: Response) -> Option<(u64, Step)> {
        let id = rsp.request_id.clone();
        table.advance(&id, |entry| entry.advance(rsp))
    }

    #[test]
    fn test_register_duplicate() {
        let table = InflightTable::new();
        let _first = table.register("a").unwrap();
        assert!(matches!(
            table.register("a"),
            Err(ClientError::DuplicateRequest(id)) if id == "a"
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_registration_drop_deregisters() {
        let table = InflightTable::new();
        {
            let _reg = table.register("a").unwrap();
            assert!(table.contains("a"));
        }
        assert!(table.is_empty());
        assert!(table.register("a").is_ok());
    }

    #[test]
    fn test_stale_registration_keeps_newer_entry() {
        let table = InflightTable::new();
        let first = table.register("a").unwrap();
        let generation = first.generation;

        // Resolve and re-register under the same id before the first guard drops.
        assert!(table.complete("a", generation, Err(ClientError::Cancelled)));
        let _second = table.register("a").unwrap();
        drop(first);

        assert!(table.contains("a"));
        assert!(!table.complete("a", generation, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_success_delivers() {
        let table = InflightTable::new();
        let mut reg = table.register("a").unwrap();

        let (generation, step) =
            feed(&table, response("a", StatusCode::Success, Some(json!(["x"])))).unwrap();
        let Step::Deliver(outcome) = step else {
            panic!("expected delivery");
        };
        assert!(table.complete("a", generation, outcome));
        assert!(table.is_empty());

        let rsp = (&mut reg.result).await.unwrap().unwrap();
        assert_eq!(rsp.result.data.unwrap().get(), r#"["x"]"#);
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let table = InflightTable::new();
        assert!(feed(&table, response("nope", StatusCode::Success, None)).is_none());
    }

    #[test]
    fn test_fragments_accumulate_in_order() {
        let table = InflightTable::new();
        let _reg = table.register("a").unwrap();

        let chunks = [json!([{"one": 1}]), json!([{"two": 2}])];
        for chunk in chunks {
            let (_, step) =
                feed(&table, response("a", StatusCode::PartialContent, Some(chunk))).unwrap();
            assert!(matches!(step, Step::Pending));
        }

        let (_, step) = feed(
            &table,
            response("a", StatusCode::Success, Some(json!([{"three": 3}]))),
        )
        .unwrap();
        let Step::Deliver(Ok(rsp)) = step else {
            panic!("expected reassembled response");
        };
        let data: serde_json::Value = rsp.decode().unwrap().unwrap();
        assert_eq!(data, json!([{"one": 1}, {"two": 2}, {"three": 3}]));
    }

    #[test]
    fn test_malformed_fragment_fails_request() {
        let table = InflightTable::new();
        let _reg = table.register("a").unwrap();

        let (_, step) = feed(
            &table,
            response("a", StatusCode::PartialContent, Some(json!({"one": 1}))),
        )
        .unwrap();
        assert!(matches!(step, Step::Deliver(Err(ClientError::Fragment(_)))));
    }

    #[test]
    fn test_authenticate_and_errors() {
        let table = InflightTable::new();
        let _reg = table.register("a").unwrap();

        let (_, step) = feed(&table, response("a", StatusCode::Authenticate, None)).unwrap();
        assert!(matches!(step, Step::Authenticate));

        let (_, step) = feed(
            &table,
            response("a", StatusCode::ServerError, None).with_message("boom"),
        )
        .unwrap();
        let Step::Deliver(Ok(rsp)) = step else {
            panic!("error statuses pass through");
        };
        assert_eq!(rsp.status.message, "boom");

        let (_, step) = feed(&table, response("a", StatusCode::Unknown(424242), None)).unwrap();
        assert!(matches!(step, Step::Deliver(Ok(_))));
    }

    #[tokio::test]
    async fn test_close_all() {
        let table = InflightTable::new();
        let mut a = table.register("a").unwrap();
        let mut b = table.register("b").unwrap();

        assert_eq!(table.close_all(), 2);
        assert!(table.is_empty());
        assert!(matches!(
            (&mut a.result).await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
        assert!(matches!(
            (&mut b.result).await.unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
    }
}
