//! Storage contract shared by every virtual resource, and the registry that serves them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use snafu::Snafu;
use stackable_operator::k8s_openapi::chrono::{DateTime, Utc};
use strum::{Display, EnumString};

use crate::{
    cluster::{self, NamespaceApi},
    crd::{VirtualKind, VirtualObject},
    selector::{self, Selector},
    table::{self, Table, TableOptions},
    watch::Relay,
};

pub mod group;
pub mod project;
pub mod project_request;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
    Watch,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{resource} {name:?} not found"))]
    NotFound { resource: &'static str, name: String },

    #[snafu(display("{verb} is not supported on {resource}"))]
    Unsupported { verb: Verb, resource: &'static str },

    #[snafu(display("{resource} cannot be rendered from a {kind} object"))]
    NotAcceptable {
        resource: &'static str,
        kind: VirtualKind,
    },

    #[snafu(display("{resource} expects a {expected} object, got {actual}"))]
    UnexpectedObject {
        resource: &'static str,
        expected: VirtualKind,
        actual: VirtualKind,
    },

    #[snafu(display("{kind} object has no name"))]
    MissingName { kind: VirtualKind },

    #[snafu(display("invalid label selector"))]
    InvalidSelector { source: selector::Error },

    #[snafu(display("request to the API server failed"))]
    Cluster { source: cluster::Error },
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Unsupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Error::UnexpectedObject { .. }
            | Error::MissingName { .. }
            | Error::InvalidSelector { .. } => StatusCode::BAD_REQUEST,
            Error::Cluster { source } => source
                .api_status()
                .and_then(|(code, _)| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Machine-readable `Status.reason`.
    pub fn reason(&self) -> &str {
        match self {
            Error::NotFound { .. } => "NotFound",
            Error::Unsupported { .. } => "MethodNotAllowed",
            Error::NotAcceptable { .. } => "NotAcceptable",
            Error::UnexpectedObject { .. }
            | Error::MissingName { .. }
            | Error::InvalidSelector { .. } => "BadRequest",
            Error::Cluster { source } => match source.api_status() {
                Some((_, reason)) if !reason.is_empty() => reason,
                _ => "InternalError",
            },
        }
    }
}

/// Discovery information for one served resource.
#[derive(Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: VirtualKind,
    pub plural: &'static str,
    pub singular: &'static str,
    pub verbs: &'static [Verb],
}

impl ResourceInfo {
    pub fn group_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }
}

/// Filters accepted by list and watch requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub resource_version: Option<String>,
}

impl ListOptions {
    pub fn selector(&self) -> Result<Selector, selector::Error> {
        self.label_selector
            .as_deref()
            .map_or_else(|| Ok(Selector::everything()), |selector| selector.parse())
    }
}

/// A virtual resource.
///
/// Operations a resource does not implement fail with [`Error::Unsupported`].
#[async_trait]
pub trait ResourceStorage: Send + Sync + 'static {
    fn info(&self) -> &'static ResourceInfo;

    /// Object kinds that [`ResourceStorage::convert_to_table`] accepts.
    fn table_kinds(&self) -> &'static [VirtualKind];

    async fn get(&self, name: &str) -> Result<VirtualObject>;

    async fn list(&self, options: &ListOptions) -> Result<VirtualObject>;

    async fn create(&self, object: VirtualObject) -> Result<VirtualObject> {
        let _ = object;
        unsupported(self.info(), Verb::Create)
    }

    async fn update(&self, name: &str, object: VirtualObject) -> Result<VirtualObject> {
        let _ = (name, object);
        unsupported(self.info(), Verb::Update)
    }

    async fn delete(&self, name: &str) -> Result<VirtualObject> {
        let _ = name;
        unsupported(self.info(), Verb::Delete)
    }

    async fn watch(&self, options: &ListOptions) -> Result<Relay<VirtualObject>> {
        let _ = options;
        unsupported(self.info(), Verb::Watch)
    }

    fn convert_to_table(
        &self,
        object: &VirtualObject,
        options: TableOptions,
        now: DateTime<Utc>,
    ) -> Result<Table> {
        let kind = object.kind();
        if !self.table_kinds().contains(&kind) {
            return NotAcceptableSnafu {
                resource: self.info().plural,
                kind,
            }
            .fail();
        }
        Ok(table::convert(object, options, now))
    }
}

pub(crate) fn unsupported<T>(info: &ResourceInfo, verb: Verb) -> Result<T> {
    UnsupportedSnafu {
        verb,
        resource: info.plural,
    }
    .fail()
}

/// All served resources, looked up by group, version and plural name.
#[derive(Default)]
pub struct Registry {
    resources: Vec<Arc<dyn ResourceStorage>>,
}

impl Registry {
    /// The `projects`, `projectrequests` and `groups` resources.
    pub fn standard(namespaces: Arc<dyn NamespaceApi>) -> Self {
        let mut registry = Self::default();
        registry.register(project::ProjectStorage::new(namespaces.clone()));
        registry.register(project_request::ProjectRequestStorage::new(namespaces));
        registry.register(group::GroupStorage);
        registry
    }

    pub fn register(&mut self, storage: impl ResourceStorage) {
        let info = storage.info();
        tracing::debug!(
            group_version = %info.group_version(),
            resource = info.plural,
            "registering resource"
        );
        self.resources.push(Arc::new(storage));
    }

    pub fn lookup(
        &self,
        group: &str,
        version: &str,
        plural: &str,
    ) -> Option<Arc<dyn ResourceStorage>> {
        self.resources
            .iter()
            .find(|storage| {
                let info = storage.info();
                info.group == group && info.version == version && info.plural == plural
            })
            .cloned()
    }

    /// Every distinct group/version pair, in registration order.
    pub fn group_versions(&self) -> Vec<(&'static str, &'static str)> {
        let mut group_versions = Vec::new();
        for storage in &self.resources {
            let info = storage.info();
            if !group_versions.contains(&(info.group, info.version)) {
                group_versions.push((info.group, info.version));
            }
        }
        group_versions
    }

    pub fn resources_in(&self, group: &str, version: &str) -> Vec<&'static ResourceInfo> {
        self.resources
            .iter()
            .map(|storage| storage.info())
            .filter(|info| info.group == group && info.version == version)
            .collect()
    }
}
