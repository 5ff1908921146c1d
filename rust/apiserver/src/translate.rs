//! Field mappings between `Namespace` objects and their virtual counterparts.
//!
//! All mappings are pure: labels and annotations are copied verbatim, which label selector
//! filtering on translated objects relies on.

use std::collections::BTreeMap;

use stackable_operator::k8s_openapi::{
    api::core::v1::{Namespace, NamespaceSpec, NamespaceStatus},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use crate::crd::{Project, ProjectRequest, ProjectSpec, ProjectStatus};

pub const ANNOTATION_DISPLAY_NAME: &str = "openshift.io/display-name";
pub const ANNOTATION_DESCRIPTION: &str = "openshift.io/description";

pub fn namespace_to_project(namespace: &Namespace) -> Project {
    let mut project = Project::new(ObjectMeta {
        name: namespace.metadata.name.clone(),
        resource_version: namespace.metadata.resource_version.clone(),
        creation_timestamp: namespace.metadata.creation_timestamp.clone(),
        labels: namespace.metadata.labels.clone(),
        annotations: namespace.metadata.annotations.clone(),
        ..ObjectMeta::default()
    });
    project.spec = ProjectSpec {
        finalizers: namespace
            .spec
            .as_ref()
            .and_then(|spec| spec.finalizers.clone()),
    };
    if let Some(status) = &namespace.status {
        project.status = ProjectStatus {
            phase: status.phase.clone(),
            conditions: status.conditions.clone(),
        };
    }
    project
}

/// Inverse of [`namespace_to_project`] for the fields a `Project` carries.
pub fn project_to_namespace(project: &Project) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: project.metadata.name.clone(),
            resource_version: project.metadata.resource_version.clone(),
            creation_timestamp: project.metadata.creation_timestamp.clone(),
            labels: project.metadata.labels.clone(),
            annotations: project.metadata.annotations.clone(),
            ..ObjectMeta::default()
        },
        spec: project
            .spec
            .finalizers
            .clone()
            .map(|finalizers| NamespaceSpec {
                finalizers: Some(finalizers),
            }),
        status: (project.status != ProjectStatus::default()).then(|| NamespaceStatus {
            phase: project.status.phase.clone(),
            conditions: project.status.conditions.clone(),
        }),
    }
}

/// The `Namespace` to submit when creating a `Project`: only create-time fields are carried over.
pub fn project_to_new_namespace(project: &Project) -> Namespace {
    new_namespace(&project.metadata, project.metadata.annotations.clone())
}

/// The `Namespace` to submit for a `ProjectRequest`.
///
/// `displayName` and `description` are stored as annotations, since `Namespace` has no such fields.
pub fn project_request_to_new_namespace(request: &ProjectRequest) -> Namespace {
    let mut annotations = request.metadata.annotations.clone().unwrap_or_default();
    for (key, value) in [
        (ANNOTATION_DISPLAY_NAME, &request.display_name),
        (ANNOTATION_DESCRIPTION, &request.description),
    ] {
        if let Some(value) = value {
            annotations.insert(key.to_string(), value.clone());
        }
    }
    new_namespace(
        &request.metadata,
        (!annotations.is_empty()).then_some(annotations),
    )
}

fn new_namespace(
    metadata: &ObjectMeta,
    annotations: Option<BTreeMap<String, String>>,
) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: metadata.name.clone(),
            labels: metadata.labels.clone(),
            annotations,
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    }
}
