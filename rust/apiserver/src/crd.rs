//! Virtual API types served by the shim.
//!
//! None of these are persisted: every instance is derived from a `Namespace` (or is static stub
//! data) at request time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::k8s_openapi::{
    api::core::v1::NamespaceCondition,
    apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta},
};
use strum::{Display, EnumString};

pub const PROJECT_GROUP: &str = "project.openshift.io";
pub const USER_GROUP: &str = "user.openshift.io";
pub const VERSION: &str = "v1";

pub const PROJECT_API_VERSION: &str = "project.openshift.io/v1";
pub const USER_API_VERSION: &str = "user.openshift.io/v1";

/// An OpenShift-style `Project`, a view of one `Namespace`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ProjectSpec,
    #[serde(default)]
    pub status: ProjectStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizers: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<NamespaceCondition>>,
}

impl Project {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: PROJECT_API_VERSION.to_string(),
            kind: VirtualKind::Project.to_string(),
            metadata,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectList {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Project>,
}

impl ProjectList {
    pub fn new(resource_version: Option<String>, items: Vec<Project>) -> Self {
        Self {
            api_version: PROJECT_API_VERSION.to_string(),
            kind: VirtualKind::ProjectList.to_string(),
            metadata: ListMeta {
                resource_version,
                ..ListMeta::default()
            },
            items,
        }
    }
}

/// A request to provision a new `Project`.
///
/// Only ever created; reads of `projectrequests` return the resulting `Project`s.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub users: Option<Vec<String>>,
}

impl Group {
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            api_version: USER_API_VERSION.to_string(),
            kind: VirtualKind::Group.to_string(),
            metadata,
            users: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupList {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ListMeta,
    #[serde(default)]
    pub items: Vec<Group>,
}

impl GroupList {
    pub fn new(items: Vec<Group>) -> Self {
        Self {
            api_version: USER_API_VERSION.to_string(),
            kind: VirtualKind::GroupList.to_string(),
            metadata: ListMeta::default(),
            items,
        }
    }
}

/// Discriminator of every object kind the shim knows how to serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum VirtualKind {
    Project,
    ProjectList,
    ProjectRequest,
    Group,
    GroupList,
}

/// Closed set of objects flowing through the storage layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VirtualObject {
    Project(Project),
    ProjectList(ProjectList),
    ProjectRequest(ProjectRequest),
    Group(Group),
    GroupList(GroupList),
}

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("object has no kind"))]
    MissingKind,

    #[snafu(display("object kind {kind:?} is not served here"))]
    UnknownKind { kind: String },

    #[snafu(display("failed to decode {kind} object"))]
    Deserialize {
        source: serde_json::Error,
        kind: VirtualKind,
    },
}

impl VirtualObject {
    pub fn kind(&self) -> VirtualKind {
        match self {
            VirtualObject::Project(_) => VirtualKind::Project,
            VirtualObject::ProjectList(_) => VirtualKind::ProjectList,
            VirtualObject::ProjectRequest(_) => VirtualKind::ProjectRequest,
            VirtualObject::Group(_) => VirtualKind::Group,
            VirtualObject::GroupList(_) => VirtualKind::GroupList,
        }
    }

    /// Decodes a client-submitted object, dispatching on its `kind` field.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DecodeError> {
        let raw_kind = value
            .get("kind")
            .and_then(|kind| kind.as_str())
            .context(MissingKindSnafu)?;
        let kind = raw_kind
            .parse::<VirtualKind>()
            .ok()
            .context(UnknownKindSnafu { kind: raw_kind })?;
        let ctx = DeserializeSnafu { kind };
        Ok(match kind {
            VirtualKind::Project => Self::Project(serde_json::from_value(value).context(ctx)?),
            VirtualKind::ProjectList => {
                Self::ProjectList(serde_json::from_value(value).context(ctx)?)
            }
            VirtualKind::ProjectRequest => {
                Self::ProjectRequest(serde_json::from_value(value).context(ctx)?)
            }
            VirtualKind::Group => Self::Group(serde_json::from_value(value).context(ctx)?),
            VirtualKind::GroupList => Self::GroupList(serde_json::from_value(value).context(ctx)?),
        })
    }

    pub fn resource_version(&self) -> Option<&str> {
        match self {
            VirtualObject::Project(project) => project.metadata.resource_version.as_deref(),
            VirtualObject::ProjectList(list) => list.metadata.resource_version.as_deref(),
            VirtualObject::ProjectRequest(request) => request.metadata.resource_version.as_deref(),
            VirtualObject::Group(group) => group.metadata.resource_version.as_deref(),
            VirtualObject::GroupList(list) => list.metadata.resource_version.as_deref(),
        }
    }

    /// Labels of single objects; lists have none.
    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            VirtualObject::Project(project) => project.metadata.labels.as_ref(),
            VirtualObject::ProjectRequest(request) => request.metadata.labels.as_ref(),
            VirtualObject::Group(group) => group.metadata.labels.as_ref(),
            VirtualObject::ProjectList(_) | VirtualObject::GroupList(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn project_serializes_with_type_information() {
        let project = Project::new(ObjectMeta {
            name: Some("team-a".to_string()),
            ..ObjectMeta::default()
        });
        let value = serde_json::to_value(VirtualObject::Project(project)).unwrap();
        assert_eq!(value["apiVersion"], "project.openshift.io/v1");
        assert_eq!(value["kind"], "Project");
        assert_eq!(value["metadata"]["name"], "team-a");
    }

    #[test]
    fn decode_dispatches_on_kind() {
        let object = VirtualObject::from_value(json!({
            "apiVersion": "project.openshift.io/v1",
            "kind": "ProjectRequest",
            "metadata": {"name": "team-b"},
            "displayName": "Team B",
        }))
        .unwrap();
        let VirtualObject::ProjectRequest(request) = object else {
            panic!("expected a ProjectRequest");
        };
        assert_eq!(request.metadata.name.as_deref(), Some("team-b"));
        assert_eq!(request.display_name.as_deref(), Some("Team B"));
    }

    #[test]
    fn decode_rejects_unknown_and_missing_kinds() {
        assert!(matches!(
            VirtualObject::from_value(json!({"kind": "Namespace"})),
            Err(DecodeError::UnknownKind { kind }) if kind == "Namespace"
        ));
        assert!(matches!(
            VirtualObject::from_value(json!({"metadata": {}})),
            Err(DecodeError::MissingKind)
        ));
    }
}
