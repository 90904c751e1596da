mod test_support;

use serde_json::json;
use test_support::spawn_with_workspace;

#[test]
fn stats_options_default_and_validation() {
    let mut sidecar = spawn_with_workspace("tutord-settings");
    let defaults = sidecar.ok("settings.get", json!({ "key": "stats.options" }));
    assert_eq!(
        defaults["value"],
        json!({ "headcountScope": "period", "expectedBasis": "classesInPeriod" })
    );

    assert_eq!(
        sidecar.err_code(
            "settings.set",
            json!({ "key": "stats.options", "value": { "headcountScope": "sometimes" } })
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.err_code("settings.set", json!({ "key": "stats.options" })),
        "bad_params"
    );

    sidecar.ok(
        "settings.set",
        json!({ "key": "stats.options", "value": { "expectedBasis": "profileClass" } }),
    );
    let stored = sidecar.ok("settings.get", json!({ "key": "stats.options" }));
    assert_eq!(stored["value"]["expectedBasis"], json!("profileClass"));
    assert_eq!(stored["value"]["headcountScope"], json!("period"));

    sidecar.ok("settings.set", json!({ "key": "ui.theme", "value": "dark" }));
    let theme = sidecar.ok("settings.get", json!({ "key": "ui.theme" }));
    assert_eq!(theme["value"], json!("dark"));
    let missing = sidecar.ok("settings.get", json!({ "key": "ui.unknown" }));
    assert!(missing["value"].is_null());
}

#[test]
fn profile_class_basis_ignores_other_classes() {
    let mut sidecar = spawn_with_workspace("tutord-profile-basis");
    for day in ["2024-01-06", "2024-01-13", "2024-01-20", "2024-01-27"] {
        sidecar.create_record(day, "Alice", "SatAM", "present");
    }
    sidecar.create_record("2024-01-13", "Alice", "SatPM", "present");
    sidecar.create_student("HS001", "Alice", "SatAM");
    sidecar.ok(
        "settings.set",
        json!({ "key": "stats.options", "value": { "expectedBasis": "profileClass" } }),
    );

    let result = sidecar.ok(
        "stats.studentPeriod",
        json!({ "start": "2024-01-01", "end": "2024-01-31" }),
    );
    let alice = &result["students"][0];
    assert_eq!(alice["expectedTotal"], json!(4));
    assert_eq!(alice["attended"], json!(5));
    assert_eq!(alice["absent"], json!(0));
}
