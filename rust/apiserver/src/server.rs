//! HTTP surface of the aggregated API: discovery, CRUD, watch and table rendering.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use project_shim_utils::error_full_message;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{
        APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery, Status,
    },
    chrono::Utc,
};
use tower_http::trace::TraceLayer;

use crate::{
    crd::{self, VirtualObject},
    storage::{self, ListOptions, Registry, ResourceStorage, Verb},
    table::TableOptions,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the server could not find the requested resource {group}/{version}/{resource}"))]
    UnknownResource {
        group: String,
        version: String,
        resource: String,
    },

    #[snafu(display("the server could not find the requested group version {group}/{version}"))]
    UnknownGroupVersion { group: String, version: String },

    #[snafu(display("request body is not valid JSON"))]
    ParseBody { source: serde_json::Error },

    #[snafu(display("request body is not a supported object"))]
    DecodeObject { source: crd::DecodeError },

    #[snafu(display("failed to render table"))]
    RenderTable { source: storage::Error },

    #[snafu(display("storage request failed"), context(false))]
    Storage { source: storage::Error },
}
type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::UnknownResource { .. } | Error::UnknownGroupVersion { .. } => {
                StatusCode::NOT_FOUND
            }
            Error::ParseBody { .. } | Error::DecodeObject { .. } => StatusCode::BAD_REQUEST,
            Error::RenderTable { source } | Error::Storage { source } => source.status_code(),
        }
    }

    fn reason(&self) -> &str {
        match self {
            Error::UnknownResource { .. } | Error::UnknownGroupVersion { .. } => "NotFound",
            Error::ParseBody { .. } | Error::DecodeObject { .. } => "BadRequest",
            Error::RenderTable { source } | Error::Storage { source } => source.reason(),
        }
    }

    /// Client-facing message; storage errors speak for themselves.
    fn message(&self) -> String {
        match self {
            Error::Storage { source } => error_full_message(source),
            _ => error_full_message(self),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let message = self.message();
        if code.is_server_error() {
            tracing::error!(error = &self as &dyn std::error::Error, "request failed");
        } else {
            tracing::debug!(%message, %code, "request rejected");
        }
        let status = Status {
            status: Some("Failure".to_string()),
            code: Some(code.as_u16().into()),
            reason: Some(self.reason().to_string()),
            message: Some(message),
            ..Status::default()
        };
        (code, Json(status)).into_response()
    }
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(health))
        .route("/apis", get(api_groups))
        .route("/apis/:group/:version", get(api_resources))
        .route(
            "/apis/:group/:version/:resource",
            get(list_or_watch).post(create),
        )
        .route(
            "/apis/:group/:version/:resource/:name",
            get(get_object).put(update).delete(delete),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn health() -> &'static str {
    "ok"
}

async fn api_groups(State(registry): State<Arc<Registry>>) -> Json<APIGroupList> {
    let mut groups: Vec<APIGroup> = Vec::new();
    for (group, version) in registry.group_versions() {
        let discovery = GroupVersionForDiscovery {
            group_version: format!("{group}/{version}"),
            version: version.to_string(),
        };
        match groups.iter_mut().find(|known| known.name == group) {
            Some(known) => known.versions.push(discovery),
            None => groups.push(APIGroup {
                name: group.to_string(),
                preferred_version: Some(discovery.clone()),
                versions: vec![discovery],
                ..APIGroup::default()
            }),
        }
    }
    Json(APIGroupList { groups })
}

async fn api_resources(
    State(registry): State<Arc<Registry>>,
    Path((group, version)): Path<(String, String)>,
) -> Result<Json<APIResourceList>> {
    let resources = registry.resources_in(&group, &version);
    if resources.is_empty() {
        return UnknownGroupVersionSnafu { group, version }.fail();
    }
    Ok(Json(APIResourceList {
        group_version: format!("{group}/{version}"),
        resources: resources
            .into_iter()
            .map(|info| APIResource {
                name: info.plural.to_string(),
                singular_name: info.singular.to_string(),
                kind: info.kind.to_string(),
                namespaced: false,
                verbs: info.verbs.iter().map(ToString::to_string).collect(),
                ..APIResource::default()
            })
            .collect(),
    }))
}

/// Query parameters understood by reads.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadQuery {
    watch: Option<String>,
    label_selector: Option<String>,
    field_selector: Option<String>,
    resource_version: Option<String>,
    no_headers: Option<String>,
}

impl ReadQuery {
    fn is_watch(&self) -> bool {
        is_true(self.watch.as_deref())
    }

    fn list_options(&self) -> ListOptions {
        ListOptions {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            resource_version: self.resource_version.clone(),
        }
    }

    fn table_options(&self) -> TableOptions {
        TableOptions {
            no_headers: is_true(self.no_headers.as_deref()),
        }
    }
}

fn is_true(flag: Option<&str>) -> bool {
    matches!(flag, Some("true" | "1"))
}

/// Whether the client asked for a `meta.k8s.io` `Table`, as `kubectl get` does.
fn wants_table(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media_type| {
            media_type
                .split(';')
                .skip(1)
                .any(|param| param.trim() == "as=Table")
        })
}

fn lookup(
    registry: &Registry,
    (group, version, resource): (String, String, String),
) -> Result<Arc<dyn ResourceStorage>> {
    registry
        .lookup(&group, &version, &resource)
        .with_context(|| UnknownResourceSnafu {
            group: group.clone(),
            version: version.clone(),
            resource: resource.clone(),
        })
}

fn render(
    storage: &dyn ResourceStorage,
    object: VirtualObject,
    headers: &HeaderMap,
    table_options: TableOptions,
) -> Result<Response> {
    if wants_table(headers) {
        let table = storage
            .convert_to_table(&object, table_options, Utc::now())
            .context(RenderTableSnafu)?;
        return Ok(Json(table).into_response());
    }
    Ok(Json(object).into_response())
}

/// Refuses verbs the resource does not serve before the request body is looked at.
fn check_verb(storage: &dyn ResourceStorage, verb: Verb) -> Result<()> {
    let info = storage.info();
    if !info.verbs.contains(&verb) {
        return Ok(storage::unsupported(info, verb)?);
    }
    Ok(())
}

fn decode_body(body: &[u8]) -> Result<VirtualObject> {
    let value = serde_json::from_slice(body).context(ParseBodySnafu)?;
    VirtualObject::from_value(value).context(DecodeObjectSnafu)
}

async fn list_or_watch(
    State(registry): State<Arc<Registry>>,
    Path(path): Path<(String, String, String)>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let storage = lookup(&registry, path)?;
    let options = query.list_options();
    if query.is_watch() {
        let relay = storage.watch(&options).await?;
        let lines = relay.map(|event| {
            serde_json::to_vec(&event).map(|mut line| {
                line.push(b'\n');
                Bytes::from(line)
            })
        });
        return Ok((
            [(header::CONTENT_TYPE, "application/json")],
            Body::from_stream(lines),
        )
            .into_response());
    }
    let list = storage.list(&options).await?;
    render(&*storage, list, &headers, query.table_options())
}

async fn get_object(
    State(registry): State<Arc<Registry>>,
    Path((group, version, resource, name)): Path<(String, String, String, String)>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let storage = lookup(&registry, (group, version, resource))?;
    let object = storage.get(&name).await?;
    render(&*storage, object, &headers, query.table_options())
}

async fn create(
    State(registry): State<Arc<Registry>>,
    Path(path): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Response> {
    let storage = lookup(&registry, path)?;
    check_verb(&*storage, Verb::Create)?;
    let object = decode_body(&body)?;
    let created = storage.create(object).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn update(
    State(registry): State<Arc<Registry>>,
    Path((group, version, resource, name)): Path<(String, String, String, String)>,
    body: Bytes,
) -> Result<Json<VirtualObject>> {
    let storage = lookup(&registry, (group, version, resource))?;
    check_verb(&*storage, Verb::Update)?;
    let object = decode_body(&body)?;
    Ok(Json(storage.update(&name, object).await?))
}

async fn delete(
    State(registry): State<Arc<Registry>>,
    Path((group, version, resource, name)): Path<(String, String, String, String)>,
) -> Result<Json<VirtualObject>> {
    let storage = lookup(&registry, (group, version, resource))?;
    Ok(Json(storage.delete(&name).await?))
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::Request};
    use serde_json::{json, Value};
    use stackable_operator::k8s_openapi::{
        api::core::v1::Namespace, apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::cluster::{fake::FakeNamespaces, NamespaceEvent};

    #[derive(Deserialize)]
    struct WatchLine {
        #[serde(rename = "type")]
        type_: String,
        object: Value,
    }

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

    fn app(namespaces: &Arc<FakeNamespaces>) -> Router {
        router(Arc::new(Registry::standard(namespaces.clone())))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoints() {
        let namespaces = Arc::new(FakeNamespaces::default());
        for uri in ["/healthz", "/readyz"] {
            let (status, body) = send(app(&namespaces), get_request(uri)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(&body[..], b"ok");
        }
    }

    #[tokio::test]
    async fn discovery_lists_groups_and_resources() {
        let namespaces = Arc::new(FakeNamespaces::default());
        let (status, groups) = send_json(app(&namespaces), get_request("/apis")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(groups["groups"][0]["name"], "project.openshift.io");
        assert_eq!(
            groups["groups"][1]["preferredVersion"]["groupVersion"],
            "user.openshift.io/v1"
        );

        let (status, resources) = send_json(
            app(&namespaces),
            get_request("/apis/project.openshift.io/v1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resources["groupVersion"], "project.openshift.io/v1");
        assert_eq!(resources["resources"][0]["name"], "projects");
        assert_eq!(resources["resources"][0]["kind"], "Project");
        assert_eq!(resources["resources"][0]["namespaced"], false);
        assert_eq!(
            resources["resources"][0]["verbs"],
            json!(["get", "list", "create", "delete", "watch"])
        );

        let (status, _) = send_json(app(&namespaces), get_request("/apis/example.com/v1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_project_and_missing_project() {
        let namespaces = Arc::new(FakeNamespaces::with([namespace("team-a", &[])]));
        let (status, project) = send_json(
            app(&namespaces),
            get_request("/apis/project.openshift.io/v1/projects/team-a"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(project["kind"], "Project");
        assert_eq!(project["apiVersion"], "project.openshift.io/v1");
        assert_eq!(project["metadata"]["name"], "team-a");

        let (status, error) = send_json(
            app(&namespaces),
            get_request("/apis/project.openshift.io/v1/projects/nope"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["kind"], "Status");
        assert_eq!(error["status"], "Failure");
        assert_eq!(error["reason"], "NotFound");
        assert_eq!(error["code"], 404);
    }

    #[tokio::test]
    async fn list_as_table() {
        let namespaces = Arc::new(FakeNamespaces::with([
            namespace("a", &[("app", "foo")]),
            namespace("b", &[]),
        ]));
        let request = Request::get("/apis/project.openshift.io/v1/projects?labelSelector=app%3Dfoo")
            .header(
                header::ACCEPT,
                "application/json;as=Table;v=v1;g=meta.k8s.io,application/json",
            )
            .body(Body::empty())
            .unwrap();
        let (status, table) = send_json(app(&namespaces), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(table["kind"], "Table");
        assert_eq!(table["columnDefinitions"][1]["name"], "READY");
        assert_eq!(table["rows"].as_array().unwrap().len(), 1);
        assert_eq!(table["rows"][0]["cells"][0], "a");
        assert_eq!(table["rows"][0]["cells"][3], "v1");
    }

    #[tokio::test]
    async fn create_project_request_returns_project() {
        let namespaces = Arc::new(FakeNamespaces::default());
        let body = json!({
            "apiVersion": "project.openshift.io/v1",
            "kind": "ProjectRequest",
            "metadata": {"name": "team-c"},
            "displayName": "Team C",
        });
        let request = Request::post("/apis/project.openshift.io/v1/projectrequests")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, project) = send_json(app(&namespaces), request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(project["kind"], "Project");
        assert_eq!(
            project["metadata"]["annotations"]["openshift.io/display-name"],
            "Team C"
        );
        assert!(namespaces.contains("team-c"));
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let namespaces = Arc::new(FakeNamespaces::default());
        for body in ["{not json", r#"{"kind": "Pod"}"#] {
            let request = Request::post("/apis/project.openshift.io/v1/projects")
                .body(Body::from(body))
                .unwrap();
            let (status, error) = send_json(app(&namespaces), request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(error["reason"], "BadRequest");
        }
    }

    #[tokio::test]
    async fn unsupported_operations_are_method_not_allowed() {
        let namespaces = Arc::new(FakeNamespaces::default());
        let request = Request::delete("/apis/user.openshift.io/v1/groups/admins")
            .body(Body::empty())
            .unwrap();
        let (status, error) = send_json(app(&namespaces), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(error["reason"], "MethodNotAllowed");
        assert_eq!(error["message"], "delete is not supported on groups");
    }

    #[tokio::test]
    async fn unsupported_writes_ignore_the_body() {
        let namespaces = Arc::new(FakeNamespaces::default());
        for (request, message) in [
            (
                Request::post("/apis/user.openshift.io/v1/groups")
                    .body(Body::from("garbage"))
                    .unwrap(),
                "create is not supported on groups",
            ),
            (
                Request::put("/apis/project.openshift.io/v1/projects/a")
                    .body(Body::from("{not json"))
                    .unwrap(),
                "update is not supported on projects",
            ),
        ] {
            let (status, error) = send_json(app(&namespaces), request).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(error["reason"], "MethodNotAllowed");
            assert_eq!(error["message"], message);
        }
    }

    #[tokio::test]
    async fn get_group_as_table() {
        let namespaces = Arc::new(FakeNamespaces::default());
        let request = Request::get("/apis/user.openshift.io/v1/groups/anyone")
            .header(header::ACCEPT, "application/json;as=Table;v=v1;g=meta.k8s.io")
            .body(Body::empty())
            .unwrap();
        let (status, table) = send_json(app(&namespaces), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(table["rows"][0]["cells"][0], "admin-user");
    }

    #[tokio::test]
    async fn watch_streams_newline_delimited_events() {
        let namespaces = Arc::new(FakeNamespaces::default());
        let feed = namespaces.feed_watch();
        feed.send(Ok(NamespaceEvent::Added(namespace("a", &[("app", "foo")]))))
            .unwrap();
        feed.send(Ok(NamespaceEvent::Added(namespace("b", &[("app", "bar")]))))
            .unwrap();
        feed.send(Ok(NamespaceEvent::Deleted(namespace("a", &[("app", "foo")]))))
            .unwrap();
        drop(feed);

        let (status, body) = send(
            app(&namespaces),
            get_request("/apis/project.openshift.io/v1/projects?watch=true&labelSelector=app%3Dfoo"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let lines = std::str::from_utf8(&body)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<WatchLine>(line).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].type_, "ADDED");
        assert_eq!(lines[0].object["metadata"]["name"], "a");
        assert_eq!(lines[1].type_, "DELETED");
    }

    #[tokio::test]
    async fn watch_on_unsupported_resource() {
        let namespaces = Arc::new(FakeNamespaces::default());
        let (status, error) = send_json(
            app(&namespaces),
            get_request("/apis/project.openshift.io/v1/projectrequests?watch=1"),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(error["message"], "watch is not supported on projectrequests");
    }
}
