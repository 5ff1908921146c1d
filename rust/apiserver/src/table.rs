//! Server-side rendering of objects as `meta.k8s.io/v1` `Table`s, as requested by `kubectl get`.

use serde::Serialize;
use stackable_operator::k8s_openapi::{
    api::core::v1::NamespaceCondition,
    apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta, Time},
    chrono::{DateTime, Utc},
};

use crate::crd::{Group, Project, ProjectRequest, VirtualObject, VERSION};

#[derive(Clone, Copy, Debug, Default)]
pub struct TableOptions {
    pub no_headers: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ListMeta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub column_definitions: Vec<TableColumnDefinition>,
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumnDefinition {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub format: &'static str,
    pub description: &'static str,
    pub priority: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableRow {
    pub cells: Vec<serde_json::Value>,
    pub object: serde_json::Value,
}

const COLUMNS: [TableColumnDefinition; 4] = [
    TableColumnDefinition {
        name: "NAME",
        type_: "string",
        format: "name",
        description: "Name of the object",
        priority: 0,
    },
    TableColumnDefinition {
        name: "READY",
        type_: "string",
        format: "",
        description: "Status of the Ready condition",
        priority: 0,
    },
    TableColumnDefinition {
        name: "AGE",
        type_: "string",
        format: "",
        description: "Time since creation",
        priority: 0,
    },
    TableColumnDefinition {
        name: "VERSION",
        type_: "string",
        format: "",
        description: "API version",
        priority: 0,
    },
];

/// Renders one row per contained item; the full object rides along in each row.
pub fn convert(object: &VirtualObject, options: TableOptions, now: DateTime<Utc>) -> Table {
    let rows = match object {
        VirtualObject::Project(project) => vec![project_row(project, now)],
        VirtualObject::ProjectList(list) => list.items.iter().map(|p| project_row(p, now)).collect(),
        VirtualObject::ProjectRequest(request) => vec![project_request_row(request, now)],
        VirtualObject::Group(group) => vec![group_row(group, now)],
        VirtualObject::GroupList(list) => list.items.iter().map(|g| group_row(g, now)).collect(),
    };
    let metadata = ListMeta {
        resource_version: object.resource_version().map(str::to_string),
        ..ListMeta::default()
    };
    Table {
        api_version: "meta.k8s.io/v1",
        kind: "Table",
        metadata,
        column_definitions: if options.no_headers {
            Vec::new()
        } else {
            COLUMNS.to_vec()
        },
        rows,
    }
}

fn project_row(project: &Project, now: DateTime<Utc>) -> TableRow {
    row(
        &project.metadata,
        ready_status(project.status.conditions.as_deref().unwrap_or_default()),
        now,
        serde_json::to_value(project),
    )
}

fn project_request_row(request: &ProjectRequest, now: DateTime<Utc>) -> TableRow {
    row(&request.metadata, "Unknown", now, serde_json::to_value(request))
}

fn group_row(group: &Group, now: DateTime<Utc>) -> TableRow {
    row(&group.metadata, "Unknown", now, serde_json::to_value(group))
}

fn row(
    metadata: &ObjectMeta,
    ready: &str,
    now: DateTime<Utc>,
    object: serde_json::Result<serde_json::Value>,
) -> TableRow {
    TableRow {
        cells: vec![
            metadata.name.clone().unwrap_or_default().into(),
            ready.into(),
            age(metadata.creation_timestamp.as_ref(), now).into(),
            VERSION.into(),
        ],
        // Plain data structs always serialize
        object: object.unwrap_or_default(),
    }
}

/// Status of the `Ready` condition, or `Unknown` if there is none.
pub fn ready_status(conditions: &[NamespaceCondition]) -> &'static str {
    match conditions
        .iter()
        .find(|cond| cond.type_ == "Ready")
        .map(|cond| cond.status.as_str())
    {
        Some("True") => "True",
        Some("False") => "False",
        _ => "Unknown",
    }
}

pub fn age(created: Option<&Time>, now: DateTime<Utc>) -> String {
    match created {
        Some(Time(created)) => human_duration((now - *created).num_seconds()),
        None => "<unknown>".to_string(),
    }
}

/// Formats a duration the way `kubectl` prints ages: at most two units, coarser as it grows.
pub fn human_duration(seconds: i64) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const YEAR: i64 = 365 * DAY;

    if seconds < -1 {
        return "<invalid>".to_string();
    }
    let seconds = seconds.max(0);
    if seconds < 2 * MINUTE {
        return format!("{seconds}s");
    }
    let minutes = seconds / MINUTE;
    if minutes < 10 {
        let rem = seconds % MINUTE;
        return if rem == 0 {
            format!("{minutes}m")
        } else {
            format!("{minutes}m{rem}s")
        };
    }
    if seconds < 3 * HOUR {
        return format!("{minutes}m");
    }
    let hours = seconds / HOUR;
    if seconds < 8 * HOUR {
        let rem = minutes % 60;
        return if rem == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h{rem}m")
        };
    }
    if seconds < 48 * HOUR {
        return format!("{hours}h");
    }
    let days = seconds / DAY;
    if seconds < 8 * DAY {
        let rem = hours % 24;
        return if rem == 0 {
            format!("{days}d")
        } else {
            format!("{days}d{rem}h")
        };
    }
    if seconds < 2 * YEAR {
        return format!("{days}d");
    }
    let years = seconds / YEAR;
    if seconds < 8 * YEAR {
        let rem = days % 365;
        return if rem == 0 {
            format!("{years}y")
        } else {
            format!("{years}y{rem}d")
        };
    }
    format!("{years}y")
}

#[cfg(test)]
mod tests {
    use stackable_operator::k8s_openapi::chrono::{Duration, TimeZone};

    use super::*;
    use crate::crd::{GroupList, ProjectList};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn condition(type_: &str, status: &str) -> NamespaceCondition {
        NamespaceCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            ..NamespaceCondition::default()
        }
    }

    #[test]
    fn human_durations() {
        for (seconds, expected) in [
            (-5, "<invalid>"),
            (-1, "0s"),
            (0, "0s"),
            (59, "59s"),
            (119, "119s"),
            (120, "2m"),
            (125, "2m5s"),
            (600, "10m"),
            (2 * 3600 + 59 * 60, "179m"),
            (3 * 3600, "3h"),
            (5 * 3600 + 30 * 60, "5h30m"),
            (30 * 3600, "30h"),
            (3 * 86400 + 4 * 3600, "3d4h"),
            (40 * 86400, "40d"),
            (3 * 365 * 86400 + 10 * 86400, "3y10d"),
            (9 * 365 * 86400, "9y"),
        ] {
            assert_eq!(human_duration(seconds), expected, "for {seconds}s");
        }
    }

    #[test]
    fn ready_status_reads_ready_condition() {
        assert_eq!(ready_status(&[]), "Unknown");
        assert_eq!(ready_status(&[condition("Other", "True")]), "Unknown");
        assert_eq!(ready_status(&[condition("Ready", "True")]), "True");
        assert_eq!(ready_status(&[condition("Ready", "False")]), "False");
        assert_eq!(ready_status(&[condition("Ready", "Maybe")]), "Unknown");
    }

    #[test]
    fn project_list_renders_one_row_per_item() {
        let mut team_a = Project::new(ObjectMeta {
            name: Some("team-a".to_string()),
            creation_timestamp: Some(Time(now() - Duration::seconds(90))),
            ..ObjectMeta::default()
        });
        team_a.status.conditions = Some(vec![condition("Ready", "True")]);
        let team_b = Project::new(ObjectMeta {
            name: Some("team-b".to_string()),
            ..ObjectMeta::default()
        });
        let list = VirtualObject::ProjectList(ProjectList::new(
            Some("42".to_string()),
            vec![team_a, team_b],
        ));

        let table = convert(&list, TableOptions::default(), now());
        assert_eq!(table.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(table.column_definitions.len(), 4);
        assert_eq!(table.rows.len(), 2);
        let expected: Vec<serde_json::Value> =
            vec!["team-a".into(), "True".into(), "90s".into(), "v1".into()];
        assert_eq!(table.rows[0].cells, expected);
        assert_eq!(table.rows[1].cells[2], "<unknown>");
        assert_eq!(table.rows[1].object["metadata"]["name"], "team-b");
    }

    #[test]
    fn single_object_table_keeps_resource_version() {
        let project = Project::new(ObjectMeta {
            name: Some("team-a".to_string()),
            resource_version: Some("17".to_string()),
            ..ObjectMeta::default()
        });
        let table = convert(&VirtualObject::Project(project), TableOptions::default(), now());
        assert_eq!(table.metadata.resource_version.as_deref(), Some("17"));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].cells[0], "team-a");
    }

    #[test]
    fn headers_can_be_omitted() {
        let list = VirtualObject::GroupList(GroupList::new(vec![]));
        let table = convert(&list, TableOptions { no_headers: true }, now());
        assert!(table.column_definitions.is_empty());
        assert!(table.rows.is_empty());
        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value["kind"], "Table");
        assert!(value.get("columnDefinitions").is_none());
    }
}
