//! `groups`: read-only stub data, enough for consoles that check group membership.

use async_trait::async_trait;
use stackable_operator::k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{ListOptions, ResourceInfo, ResourceStorage, Result, Verb};
use crate::crd::{Group, GroupList, VirtualKind, VirtualObject, USER_GROUP, VERSION};

/// Every lookup answers with this group, whatever name was asked for.
pub const STUB_GROUP_NAME: &str = "admin-user";

const INFO: ResourceInfo = ResourceInfo {
    group: USER_GROUP,
    version: VERSION,
    kind: VirtualKind::Group,
    plural: "groups",
    singular: "group",
    verbs: &[Verb::Get, Verb::List],
};

pub struct GroupStorage;

#[async_trait]
impl ResourceStorage for GroupStorage {
    fn info(&self) -> &'static ResourceInfo {
        &INFO
    }

    fn table_kinds(&self) -> &'static [VirtualKind] {
        &[VirtualKind::Group, VirtualKind::GroupList]
    }

    async fn get(&self, name: &str) -> Result<VirtualObject> {
        tracing::debug!(group.name = name, "serving stub Group");
        Ok(VirtualObject::Group(Group::new(ObjectMeta {
            name: Some(STUB_GROUP_NAME.to_string()),
            ..ObjectMeta::default()
        })))
    }

    async fn list(&self, _options: &ListOptions) -> Result<VirtualObject> {
        Ok(VirtualObject::GroupList(GroupList::new(Vec::new())))
    }
}
