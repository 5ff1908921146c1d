//! Relays a native `Namespace` watch as a watch over translated objects.

use std::{
    collections::BTreeMap,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
};

use futures::{Stream, StreamExt};
use pin_project::pin_project;
use serde::Serialize;
use stackable_operator::k8s_openapi::api::core::v1::Namespace;
use strum::{Display, EnumString};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    cluster::{NamespaceEvent, NamespaceEventStream},
    crd::{Project, VirtualObject},
    selector::Selector,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// One line of a watch response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event<T> {
    #[serde(rename = "type")]
    pub type_: EventType,
    pub object: T,
}

#[derive(Debug, Default)]
struct StopSignal {
    sender: Mutex<Option<oneshot::Sender<()>>>,
}

impl StopSignal {
    /// Returns `true` for the call that actually stopped the relay.
    fn fire(&self) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                // The relay task may already have finished, that's fine
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }

    fn is_fired(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Stops the [`Relay`] it was taken from, from any task.
#[derive(Clone, Debug)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.signal.fire() {
            tracing::debug!("watch relay stopped");
        }
    }
}

/// A stream of translated watch events.
///
/// Events are produced by a background task that is only ever one event ahead of the consumer.
/// The stream ends when the upstream watch ends or when the relay is stopped; dropping the relay
/// stops it.
#[pin_project(PinnedDrop)]
pub struct Relay<T> {
    #[pin]
    events: ReceiverStream<Event<T>>,
    signal: Arc<StopSignal>,
}

impl<T> Relay<T>
where
    T: Send + 'static,
{
    /// Starts relaying `upstream`.
    ///
    /// `translate` maps each `Namespace` onto the relayed object, whose labels are then checked
    /// against `selector`. Bookmarks, status messages and stream errors are logged and skipped.
    pub fn spawn<F>(upstream: NamespaceEventStream, selector: Selector, translate: F) -> Self
    where
        F: Fn(&Namespace) -> T + Send + 'static,
        T: Labelled,
    {
        let (tx, rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(run(upstream, selector, translate, tx, stop_rx));
        Self {
            events: ReceiverStream::new(rx),
            signal: Arc::new(StopSignal {
                sender: Mutex::new(Some(stop_tx)),
            }),
        }
    }
}

impl<T> Relay<T> {
    /// Idempotent; events not yet consumed are discarded.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: self.signal.clone(),
        }
    }
}

impl<T> Stream for Relay<T> {
    type Item = Event<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if this.signal.is_fired() {
            return Poll::Ready(None);
        }
        this.events.poll_next(cx)
    }
}

#[pin_project::pinned_drop]
impl<T> PinnedDrop for Relay<T> {
    fn drop(self: Pin<&mut Self>) {
        self.signal.fire();
    }
}

/// Objects whose labels can be matched by a [`Selector`].
pub trait Labelled {
    fn labels(&self) -> Option<&BTreeMap<String, String>>;
}

impl Labelled for Project {
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }
}

impl Labelled for VirtualObject {
    fn labels(&self) -> Option<&BTreeMap<String, String>> {
        VirtualObject::labels(self)
    }
}

async fn run<T, F>(
    mut upstream: NamespaceEventStream,
    selector: Selector,
    translate: F,
    tx: mpsc::Sender<Event<T>>,
    mut stop: oneshot::Receiver<()>,
) where
    T: Labelled,
    F: Fn(&Namespace) -> T,
{
    loop {
        let next = tokio::select! {
            _ = &mut stop => break,
            next = upstream.next() => next,
        };
        let (type_, namespace) = match next {
            None => {
                tracing::debug!("upstream watch ended");
                break;
            }
            Some(Err(error)) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "skipping failed watch event"
                );
                continue;
            }
            Some(Ok(NamespaceEvent::Added(ns))) => (EventType::Added, ns),
            Some(Ok(NamespaceEvent::Modified(ns))) => (EventType::Modified, ns),
            Some(Ok(NamespaceEvent::Deleted(ns))) => (EventType::Deleted, ns),
            Some(Ok(NamespaceEvent::Bookmark { resource_version })) => {
                tracing::trace!(%resource_version, "skipping bookmark");
                continue;
            }
            Some(Ok(NamespaceEvent::Status { message })) => {
                tracing::warn!(%message, "upstream watch reported an error status");
                continue;
            }
        };
        let object = translate(&namespace);
        if !selector.matches(object.labels()) {
            continue;
        }
        let event = Event { type_, object };
        tokio::select! {
            _ = &mut stop => break,
            sent = tx.send(event) => if sent.is_err() {
                // Consumer is gone
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use stackable_operator::{
        k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
        kube::{self, core::ErrorResponse},
    };

    use super::*;
    use crate::{cluster, translate::namespace_to_project};

    fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        }
    }

    fn relay(
        selector: &str,
    ) -> (
        mpsc::UnboundedSender<Result<NamespaceEvent, cluster::Error>>,
        Relay<Project>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let upstream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx).boxed();
        let relay = Relay::spawn(upstream, selector.parse().unwrap(), namespace_to_project);
        (tx, relay)
    }

    fn name(event: &Event<Project>) -> &str {
        event.object.metadata.name.as_deref().unwrap()
    }

    #[tokio::test]
    async fn relays_events_in_order() {
        let (upstream, mut relay) = relay("");
        upstream
            .send(Ok(NamespaceEvent::Added(namespace("a", &[]))))
            .unwrap();
        upstream
            .send(Ok(NamespaceEvent::Bookmark {
                resource_version: "7".to_string(),
            }))
            .unwrap();
        upstream
            .send(Err(cluster::Error::WatchEvent {
                source: kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: "connection reset".to_string(),
                    reason: "InternalError".to_string(),
                    code: 500,
                }),
            }))
            .unwrap();
        upstream
            .send(Ok(NamespaceEvent::Modified(namespace("a", &[("x", "y")]))))
            .unwrap();
        upstream
            .send(Ok(NamespaceEvent::Status {
                message: "too old resource version".to_string(),
            }))
            .unwrap();
        upstream
            .send(Ok(NamespaceEvent::Deleted(namespace("a", &[]))))
            .unwrap();
        drop(upstream);

        let events = (&mut relay).collect::<Vec<_>>().await;
        assert_eq!(
            events.iter().map(|e| e.type_).collect::<Vec<_>>(),
            vec![EventType::Added, EventType::Modified, EventType::Deleted]
        );
        assert!(events.iter().all(|e| name(e) == "a"));
        assert_eq!(events[0].object.kind, "Project");
    }

    #[tokio::test]
    async fn filters_on_translated_labels() {
        let (upstream, relay) = relay("app=foo");
        for ns in [
            namespace("one", &[("app", "foo")]),
            namespace("two", &[("app", "bar")]),
            namespace("three", &[]),
            namespace("four", &[("app", "foo"), ("tier", "web")]),
        ] {
            upstream.send(Ok(NamespaceEvent::Added(ns))).unwrap();
        }
        drop(upstream);

        let names = relay
            .map(|event| name(&event).to_string())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(names, vec!["one", "four"]);
    }

    #[tokio::test]
    async fn stop_ends_the_stream() {
        let (upstream, mut relay) = relay("");
        upstream
            .send(Ok(NamespaceEvent::Added(namespace("a", &[]))))
            .unwrap();
        let first = relay.next().await.unwrap();
        assert_eq!(name(&first), "a");

        upstream
            .send(Ok(NamespaceEvent::Added(namespace("b", &[]))))
            .unwrap();
        relay.stop();
        relay.stop();
        assert!(relay.next().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_stops_are_safe() {
        let (_upstream, mut relay) = relay("");
        let handles = (0..8)
            .map(|_| {
                let handle = relay.stop_handle();
                tokio::spawn(async move { handle.stop() })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.await.unwrap();
        }
        let next = tokio::time::timeout(Duration::from_secs(5), relay.next()).await;
        assert!(matches!(next, Ok(None)));
    }

    #[tokio::test]
    async fn dropping_the_relay_releases_the_upstream() {
        let (upstream, relay) = relay("");
        drop(relay);
        tokio::time::timeout(Duration::from_secs(5), upstream.closed())
            .await
            .unwrap();
    }
}
