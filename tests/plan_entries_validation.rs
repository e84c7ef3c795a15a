mod test_support;

use serde_json::json;
use test_support::{open_workspace_with_owner, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn plan_round_trip_and_integer_validation() {
    let workspace = temp_dir("studylog-plan");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 9);

    // Point targets must be integers; the offending slug is named.
    let (code, message) = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "plan.update",
        json!({
            "ownerId": 9,
            "days": { "Monday": { "expected_math_points": "ten" } }
        }),
    );
    assert_eq!(code, "bad_params");
    assert!(
        message.contains("expected_math_points"),
        "message was: {}",
        message
    );

    // The rejected update left nothing behind.
    let plan = request_ok(&mut stdin, &mut reader, "2", "plan.get", json!({ "ownerId": 9 }));
    assert_eq!(plan.pointer("/days/Monday"), Some(&json!({})));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "plan.update",
        json!({
            "ownerId": 9,
            "days": {
                "Monday": { "expected_math_points": 10, "unknown_slug": "ignored" },
                "Tuesday": { "expected_math_points": "15" }
            }
        }),
    );
    let plan = request_ok(&mut stdin, &mut reader, "4", "plan.get", json!({ "ownerId": 9 }));
    assert_eq!(
        plan.pointer("/days/Monday/expected_math_points")
            .and_then(|v| v.as_str()),
        Some("10")
    );
    assert_eq!(
        plan.pointer("/days/Tuesday/expected_math_points")
            .and_then(|v| v.as_str()),
        Some("15")
    );
    // Slugs with no definition are dropped, all seven days are present.
    assert!(plan.pointer("/days/Monday/unknown_slug").is_none());
    assert_eq!(plan.pointer("/days/Sunday"), Some(&json!({})));

    // A later update fully replaces the plan.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "plan.update",
        json!({
            "ownerId": 9,
            "days": { "Friday": { "expected_math_points": 5 } }
        }),
    );
    let plan = request_ok(&mut stdin, &mut reader, "6", "plan.get", json!({ "ownerId": 9 }));
    assert_eq!(plan.pointer("/days/Monday"), Some(&json!({})));
    assert_eq!(
        plan.pointer("/days/Friday/expected_math_points")
            .and_then(|v| v.as_str()),
        Some("5")
    );
}

#[test]
fn plan_rejects_unknown_day_names() {
    let workspace = temp_dir("studylog-plan-days");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 9);

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "plan.update",
        json!({
            "ownerId": 9,
            "days": { "Funday": { "expected_math_points": 10 } }
        }),
    );
    assert_eq!(code, "bad_params");
}
