//! `projects`: a read-write view of `Namespace`s.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};
use stackable_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{
    ClusterSnafu, InvalidSelectorSnafu, ListOptions, MissingNameSnafu, NotFoundSnafu,
    ResourceInfo, ResourceStorage, Result, UnexpectedObjectSnafu, Verb,
};
use crate::{
    cluster::NamespaceApi,
    crd::{Project, ProjectList, VirtualKind, VirtualObject, PROJECT_GROUP, VERSION},
    translate::{namespace_to_project, project_to_new_namespace},
    watch::Relay,
};

const INFO: ResourceInfo = ResourceInfo {
    group: PROJECT_GROUP,
    version: VERSION,
    kind: VirtualKind::Project,
    plural: "projects",
    singular: "project",
    verbs: &[Verb::Get, Verb::List, Verb::Create, Verb::Delete, Verb::Watch],
};

pub struct ProjectStorage {
    namespaces: Arc<dyn NamespaceApi>,
}

impl ProjectStorage {
    pub fn new(namespaces: Arc<dyn NamespaceApi>) -> Self {
        Self { namespaces }
    }
}

/// Looks up the `Namespace` called `name` and presents it as a `Project`.
pub(super) async fn get_project(
    namespaces: &dyn NamespaceApi,
    resource: &'static str,
    name: &str,
) -> Result<VirtualObject> {
    let namespace = namespaces
        .get(name)
        .await
        .context(ClusterSnafu)?
        .context(NotFoundSnafu { resource, name })?;
    Ok(VirtualObject::Project(namespace_to_project(&namespace)))
}

pub(super) async fn list_projects(
    namespaces: &dyn NamespaceApi,
    options: &ListOptions,
) -> Result<VirtualObject> {
    // Reject malformed selectors before they reach the API server
    options.selector().context(InvalidSelectorSnafu)?;
    let list = namespaces.list(options).await.context(ClusterSnafu)?;
    Ok(VirtualObject::ProjectList(ProjectList::new(
        list.resource_version,
        list.items.iter().map(namespace_to_project).collect(),
    )))
}

#[async_trait]
impl ResourceStorage for ProjectStorage {
    fn info(&self) -> &'static ResourceInfo {
        &INFO
    }

    fn table_kinds(&self) -> &'static [VirtualKind] {
        &[VirtualKind::Project, VirtualKind::ProjectList]
    }

    async fn get(&self, name: &str) -> Result<VirtualObject> {
        get_project(&*self.namespaces, INFO.plural, name).await
    }

    async fn list(&self, options: &ListOptions) -> Result<VirtualObject> {
        list_projects(&*self.namespaces, options).await
    }

    async fn create(&self, object: VirtualObject) -> Result<VirtualObject> {
        let project = match object {
            VirtualObject::Project(project) => project,
            other => {
                return UnexpectedObjectSnafu {
                    resource: INFO.plural,
                    expected: VirtualKind::Project,
                    actual: other.kind(),
                }
                .fail()
            }
        };
        let name = project
            .metadata
            .name
            .as_deref()
            .context(MissingNameSnafu {
                kind: VirtualKind::Project,
            })?;
        tracing::info!(project.name = name, "creating Namespace for Project");
        let created = self
            .namespaces
            .create(&project_to_new_namespace(&project))
            .await
            .context(ClusterSnafu)?;
        Ok(VirtualObject::Project(namespace_to_project(&created)))
    }

    async fn delete(&self, name: &str) -> Result<VirtualObject> {
        tracing::info!(project.name = name, "deleting Namespace of Project");
        let deleted = self.namespaces.delete(name).await.context(ClusterSnafu)?;
        if !deleted {
            return NotFoundSnafu {
                resource: INFO.plural,
                name,
            }
            .fail();
        }
        Ok(VirtualObject::Project(Project::new(ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        })))
    }

    async fn watch(&self, options: &ListOptions) -> Result<Relay<VirtualObject>> {
        let selector = options.selector().context(InvalidSelectorSnafu)?;
        // Labels are matched on the translated objects instead
        let upstream_options = ListOptions {
            label_selector: None,
            ..options.clone()
        };
        let upstream = self
            .namespaces
            .watch(&upstream_options)
            .await
            .context(ClusterSnafu)?;
        tracing::debug!(%selector, "starting Project watch relay");
        Ok(Relay::spawn(upstream, selector, |namespace| {
            VirtualObject::Project(namespace_to_project(namespace))
        }))
    }
}
