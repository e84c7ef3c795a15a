mod test_support;

use serde_json::json;
use test_support::{open_workspace_with_owner, request_ok, spawn_sidecar, temp_dir};

#[test]
fn carry_forward_inherits_reading_state_but_not_daily_events() {
    let workspace = temp_dir("studylog-carry-forward");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 7);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "report.submit",
        json!({
            "ownerId": 7,
            "date": "2026-03-02",
            "fields": {
                "book_title": "Hatchet",
                "word_count": 50000,
                "expected_weekly_reading_rate": 40000,
                "accumulated_reading_percent": 10,
                "actual_math_points": 12
            }
        }),
    );

    // Two days later, nothing recorded: the accumulating fields inherit the
    // last explicit values, the daily events do not.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "report.open",
        json!({ "ownerId": 7, "date": "2026-03-04" }),
    );
    assert_eq!(opened.get("exists").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        opened.pointer("/report/book_title").and_then(|v| v.as_str()),
        Some("Hatchet")
    );
    assert_eq!(
        opened.pointer("/report/word_count").and_then(|v| v.as_i64()),
        Some(50000)
    );
    assert_eq!(
        opened
            .pointer("/report/expected_weekly_reading_rate")
            .and_then(|v| v.as_i64()),
        Some(40000)
    );
    assert!(opened
        .pointer("/report/actual_math_points")
        .map(|v| v.is_null())
        .unwrap_or(false));
    assert!(opened
        .pointer("/report/math_time")
        .map(|v| v.is_null())
        .unwrap_or(false));
}

#[test]
fn carry_forward_never_reads_the_future() {
    let workspace = temp_dir("studylog-future-guard");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 3);

    // Only a future report exists.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "report.submit",
        json!({
            "ownerId": 3,
            "date": "2026-03-10",
            "fields": { "book_title": "Holes", "word_count": 60000 }
        }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "report.open",
        json!({ "ownerId": 3, "date": "2026-03-04" }),
    );
    assert_eq!(opened.get("exists").and_then(|v| v.as_bool()), Some(false));
    assert!(opened
        .pointer("/report/book_title")
        .map(|v| v.is_null())
        .unwrap_or(false));
    assert!(opened
        .pointer("/report/word_count")
        .map(|v| v.is_null())
        .unwrap_or(false));

    // An earlier explicit value is still served, unaffected by the later row.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "report.submit",
        json!({
            "ownerId": 3,
            "date": "2026-03-01",
            "fields": { "word_count": 48000 }
        }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "report.open",
        json!({ "ownerId": 3, "date": "2026-03-04" }),
    );
    assert_eq!(
        opened.pointer("/report/word_count").and_then(|v| v.as_i64()),
        Some(48000)
    );
}

#[test]
fn last_known_probe_matches_carry_forward() {
    let workspace = temp_dir("studylog-last-known");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 5);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "report.submit",
        json!({
            "ownerId": 5,
            "date": "2026-03-02",
            "fields": {
                "book_title": "Hatchet",
                "word_count": 50000,
                "accumulated_reading_percent": 40
            }
        }),
    );

    let known = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "report.lastKnown",
        json!({ "ownerId": 5, "date": "2026-03-06" }),
    );
    assert_eq!(known.get("book_title").and_then(|v| v.as_str()), Some("Hatchet"));
    assert_eq!(known.get("word_count").and_then(|v| v.as_i64()), Some(50000));
    assert_eq!(
        known
            .get("accumulated_reading_percent")
            .and_then(|v| v.as_f64()),
        Some(40.0)
    );

    // previousDay looks at exactly the prior calendar day, no scan.
    let prev = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "report.previousDay",
        json!({ "ownerId": 5, "date": "2026-03-06" }),
    );
    assert!(prev.get("book_title").is_none());
    let prev = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "report.previousDay",
        json!({ "ownerId": 5, "date": "2026-03-03" }),
    );
    assert_eq!(prev.get("book_title").and_then(|v| v.as_str()), Some("Hatchet"));
}
