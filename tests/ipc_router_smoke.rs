mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("tutord-router-smoke");
    let mut sidecar = spawn_sidecar();

    let health = sidecar.ok("health", json!({}));
    assert!(health.get("workspacePath").map_or(false, |v| v.is_null()));

    assert_eq!(sidecar.err_code("records.list", json!({})), "no_workspace");
    assert_eq!(
        sidecar.err_code("stats.classSummaries", json!({})),
        "no_workspace"
    );

    sidecar.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("tutoring.sqlite3").is_file());

    sidecar.ok("records.list", json!({}));
    sidecar.ok("records.names", json!({}));
    sidecar.ok("records.roster", json!({}));
    sidecar.ok("students.list", json!({}));
    sidecar.ok("students.withoutProfile", json!({}));
    sidecar.ok("stats.classSummaries", json!({}));
    sidecar.ok("stats.studentPeriod", json!({}));
    sidecar.ok("stats.details", json!({}));
    sidecar.ok("settings.get", json!({ "key": "stats.options" }));

    let classes = sidecar.ok("calendar.classes", json!({}));
    let codes: Vec<&str> = classes["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .filter_map(|c| c["classId"].as_str())
        .collect();
    assert_eq!(codes, vec!["SatAM", "SatPM", "SunAM", "SunPM"]);
    assert_eq!(classes["classes"][2]["weekdays"], json!(["Sun"]));

    assert_eq!(
        sidecar.err_code("reports.exportWord", json!({})),
        "not_implemented"
    );
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_continues() {
    let mut sidecar = spawn_sidecar();
    let resp = sidecar.send_line("{not json");
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));

    let health = sidecar.ok("health", json!({}));
    assert!(health.get("version").is_some());
}

#[test]
fn workspace_select_requires_path() {
    let mut sidecar = spawn_sidecar();
    assert_eq!(sidecar.err_code("workspace.select", json!({})), "bad_params");
}
