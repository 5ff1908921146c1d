//! `projectrequests`: create-only entry point for provisioning `Project`s.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};

use super::{
    project::{get_project, list_projects},
    ClusterSnafu, ListOptions, MissingNameSnafu, ResourceInfo, ResourceStorage, Result,
    UnexpectedObjectSnafu, Verb,
};
use crate::{
    cluster::NamespaceApi,
    crd::{VirtualKind, VirtualObject, PROJECT_GROUP, VERSION},
    translate::{namespace_to_project, project_request_to_new_namespace},
};

const INFO: ResourceInfo = ResourceInfo {
    group: PROJECT_GROUP,
    version: VERSION,
    kind: VirtualKind::ProjectRequest,
    plural: "projectrequests",
    singular: "projectrequest",
    verbs: &[Verb::Get, Verb::List, Verb::Create],
};

pub struct ProjectRequestStorage {
    namespaces: Arc<dyn NamespaceApi>,
}

impl ProjectRequestStorage {
    pub fn new(namespaces: Arc<dyn NamespaceApi>) -> Self {
        Self { namespaces }
    }
}

#[async_trait]
impl ResourceStorage for ProjectRequestStorage {
    fn info(&self) -> &'static ResourceInfo {
        &INFO
    }

    // Reads answer with Projects, so those must render too
    fn table_kinds(&self) -> &'static [VirtualKind] {
        &[
            VirtualKind::ProjectRequest,
            VirtualKind::Project,
            VirtualKind::ProjectList,
        ]
    }

    async fn get(&self, name: &str) -> Result<VirtualObject> {
        get_project(&*self.namespaces, INFO.plural, name).await
    }

    async fn list(&self, options: &ListOptions) -> Result<VirtualObject> {
        list_projects(&*self.namespaces, options).await
    }

    async fn create(&self, object: VirtualObject) -> Result<VirtualObject> {
        let request = match object {
            VirtualObject::ProjectRequest(request) => request,
            other => {
                return UnexpectedObjectSnafu {
                    resource: INFO.plural,
                    expected: VirtualKind::ProjectRequest,
                    actual: other.kind(),
                }
                .fail()
            }
        };
        let name = request
            .metadata
            .name
            .as_deref()
            .context(MissingNameSnafu {
                kind: VirtualKind::ProjectRequest,
            })?;
        tracing::info!(
            project.name = name,
            project.display_name = ?request.display_name,
            "provisioning Namespace for ProjectRequest"
        );
        let created = self
            .namespaces
            .create(&project_request_to_new_namespace(&request))
            .await
            .context(ClusterSnafu)?;
        Ok(VirtualObject::Project(namespace_to_project(&created)))
    }
}
