//! Access to the native `Namespace` objects that back every `Project`.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use snafu::{ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::api::core::v1::Namespace,
    kube::{
        self,
        api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams},
        runtime::reflector::ObjectRef,
    },
};

use crate::storage::ListOptions;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to get {namespace}"))]
    Get {
        source: kube::Error,
        namespace: ObjectRef<Namespace>,
    },

    #[snafu(display("failed to list Namespaces"))]
    List { source: kube::Error },

    #[snafu(display("failed to create {namespace}"))]
    Create {
        source: kube::Error,
        namespace: ObjectRef<Namespace>,
    },

    #[snafu(display("failed to delete {namespace}"))]
    Delete {
        source: kube::Error,
        namespace: ObjectRef<Namespace>,
    },

    #[snafu(display("failed to start watching Namespaces"))]
    Watch { source: kube::Error },

    #[snafu(display("Namespace watch failed"))]
    WatchEvent { source: kube::Error },
}
type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    fn kube_source(&self) -> &kube::Error {
        match self {
            Error::Get { source, .. }
            | Error::List { source }
            | Error::Create { source, .. }
            | Error::Delete { source, .. }
            | Error::Watch { source }
            | Error::WatchEvent { source } => source,
        }
    }

    /// The status code and reason reported by the API server, if the request got that far.
    pub fn api_status(&self) -> Option<(u16, &str)> {
        match self.kube_source() {
            kube::Error::Api(response) => Some((response.code, response.reason.as_str())),
            _ => None,
        }
    }
}

/// A change to a `Namespace`, or one of the control messages interleaved with them.
#[derive(Clone, Debug, PartialEq)]
pub enum NamespaceEvent {
    Added(Namespace),
    Modified(Namespace),
    Deleted(Namespace),
    Bookmark { resource_version: String },
    Status { message: String },
}

pub type NamespaceEventStream = BoxStream<'static, Result<NamespaceEvent>>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamespaceList {
    pub resource_version: Option<String>,
    pub items: Vec<Namespace>,
}

#[async_trait]
pub trait NamespaceApi: Send + Sync + 'static {
    async fn get(&self, name: &str) -> Result<Option<Namespace>>;

    async fn list(&self, options: &ListOptions) -> Result<NamespaceList>;

    async fn create(&self, namespace: &Namespace) -> Result<Namespace>;

    /// Returns `false` if there was no such `Namespace`.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Starts a watch at `options.resource_version` (or `"0"`).
    async fn watch(&self, options: &ListOptions) -> Result<NamespaceEventStream>;
}

pub struct KubeNamespaces {
    api: Api<Namespace>,
}

impl KubeNamespaces {
    pub fn new(client: kube::Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NamespaceApi for KubeNamespaces {
    async fn get(&self, name: &str) -> Result<Option<Namespace>> {
        self.api.get_opt(name).await.with_context(|_| GetSnafu {
            namespace: ObjectRef::<Namespace>::new(name),
        })
    }

    async fn list(&self, options: &ListOptions) -> Result<NamespaceList> {
        let mut params = ListParams::default();
        if let Some(labels) = &options.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &options.field_selector {
            params = params.fields(fields);
        }
        let list = self.api.list(&params).await.context(ListSnafu)?;
        Ok(NamespaceList {
            resource_version: list.metadata.resource_version,
            items: list.items,
        })
    }

    async fn create(&self, namespace: &Namespace) -> Result<Namespace> {
        self.api
            .create(&PostParams::default(), namespace)
            .await
            .with_context(|_| CreateSnafu {
                namespace: ObjectRef::from_obj(namespace),
            })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(source) => Err(Error::Delete {
                source,
                namespace: ObjectRef::<Namespace>::new(name),
            }),
        }
    }

    async fn watch(&self, options: &ListOptions) -> Result<NamespaceEventStream> {
        let mut params = WatchParams::default();
        if let Some(labels) = &options.label_selector {
            params = params.labels(labels);
        }
        if let Some(fields) = &options.field_selector {
            params = params.fields(fields);
        }
        let version = options.resource_version.as_deref().unwrap_or("0");
        let events = self
            .api
            .watch(&params, version)
            .await
            .context(WatchSnafu)?;
        Ok(events
            .map(|event| -> Result<NamespaceEvent> {
                Ok(match event.context(WatchEventSnafu)? {
                    WatchEvent::Added(ns) => NamespaceEvent::Added(ns),
                    WatchEvent::Modified(ns) => NamespaceEvent::Modified(ns),
                    WatchEvent::Deleted(ns) => NamespaceEvent::Deleted(ns),
                    WatchEvent::Bookmark(bookmark) => NamespaceEvent::Bookmark {
                        resource_version: bookmark.metadata.resource_version,
                    },
                    WatchEvent::Error(response) => NamespaceEvent::Status {
                        message: response.message,
                    },
                })
            })
            .boxed())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory stand-in for the API server.

    use std::{
        collections::BTreeMap,
        sync::{Mutex, PoisonError},
    };

    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::selector::Selector;

    #[derive(Default)]
    pub struct FakeNamespaces {
        namespaces: Mutex<BTreeMap<String, Namespace>>,
        next_version: Mutex<u64>,
        watch_feed: Mutex<Option<mpsc::UnboundedReceiver<Result<NamespaceEvent>>>>,
        pub watched_with: Mutex<Option<ListOptions>>,
    }

    impl FakeNamespaces {
        pub fn with(namespaces: impl IntoIterator<Item = Namespace>) -> Self {
            let fake = Self::default();
            for ns in namespaces {
                fake.insert(ns);
            }
            fake
        }

        pub fn insert(&self, mut namespace: Namespace) -> Namespace {
            let mut version = self
                .next_version
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *version += 1;
            namespace.metadata.resource_version = Some(version.to_string());
            let name = namespace.metadata.name.clone().unwrap_or_default();
            self.namespaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name, namespace.clone());
            namespace
        }

        pub fn contains(&self, name: &str) -> bool {
            self.namespaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(name)
        }

        /// Events sent on the returned channel are served by the next `watch` call.
        pub fn feed_watch(&self) -> mpsc::UnboundedSender<Result<NamespaceEvent>> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.watch_feed.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl NamespaceApi for FakeNamespaces {
        async fn get(&self, name: &str) -> Result<Option<Namespace>> {
            Ok(self
                .namespaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .cloned())
        }

        async fn list(&self, options: &ListOptions) -> Result<NamespaceList> {
            let selector = options
                .label_selector
                .as_deref()
                .map(|s| s.parse::<Selector>().unwrap())
                .unwrap_or_default();
            let items = self
                .namespaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .values()
                .filter(|ns| selector.matches(ns.metadata.labels.as_ref()))
                .cloned()
                .collect();
            Ok(NamespaceList {
                resource_version: Some(
                    self.next_version
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .to_string(),
                ),
                items,
            })
        }

        async fn create(&self, namespace: &Namespace) -> Result<Namespace> {
            Ok(self.insert(namespace.clone()))
        }

        async fn delete(&self, name: &str) -> Result<bool> {
            Ok(self
                .namespaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name)
                .is_some())
        }

        async fn watch(&self, options: &ListOptions) -> Result<NamespaceEventStream> {
            *self
                .watched_with
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(options.clone());
            let feed = self
                .watch_feed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .expect("feed_watch must be called before watch");
            Ok(UnboundedReceiverStream::new(feed).boxed())
        }
    }
}
