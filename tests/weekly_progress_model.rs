mod test_support;

use serde_json::json;
use test_support::{open_workspace_with_owner, request_err, request_ok, spawn_sidecar, temp_dir};

fn submit(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    date: &str,
    fields: serde_json::Value,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "report.submit",
        json!({ "ownerId": 7, "date": date, "fields": fields }),
    );
}

#[test]
fn week_scan_folds_plan_actuals_and_reading_deltas() {
    let workspace = temp_dir("studylog-weekly-model");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 7);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "plan",
        "plan.update",
        json!({
            "ownerId": 7,
            "days": {
                "Monday": { "expected_math_points": 10 },
                "Tuesday": { "expected_math_points": 10 },
                "Wednesday": { "expected_math_points": 10 },
                "Thursday": { "expected_math_points": 10 },
                "Friday": { "expected_math_points": 10 }
            }
        }),
    );

    // 2026-03-02 is a Monday.
    submit(
        &mut stdin,
        &mut reader,
        "mon",
        "2026-03-02",
        json!({
            "actual_math_points": 8,
            "math_time": 20,
            "word_count": 50000,
            "accumulated_reading_percent": 10
        }),
    );
    submit(
        &mut stdin,
        &mut reader,
        "tue",
        "2026-03-03",
        json!({ "accumulated_reading_percent": 25 }),
    );
    // Wednesday starts a new book: the delta resets to the day's value.
    submit(
        &mut stdin,
        &mut reader,
        "wed",
        "2026-03-04",
        json!({ "book_title": "Holes", "accumulated_reading_percent": 5 }),
    );

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "week",
        "progress.weekly",
        json!({ "ownerId": 7, "date": "2026-03-05" }),
    );

    let rows = week
        .get("dailyData")
        .and_then(|v| v.as_array())
        .expect("dailyData");
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0].get("date").and_then(|v| v.as_str()), Some("2026-03-02"));
    assert_eq!(rows[0].get("day").and_then(|v| v.as_str()), Some("Mon"));
    assert_eq!(rows[0].get("expected_math_points").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(rows[0].get("actual_math_points").and_then(|v| v.as_i64()), Some(8));
    assert_eq!(rows[0].get("math_time").and_then(|v| v.as_i64()), Some(20));
    assert_eq!(rows[0].get("expected_math_time").and_then(|v| v.as_i64()), Some(20));
    assert_eq!(rows[0].get("daily_reading_percent").and_then(|v| v.as_f64()), Some(10.0));
    assert_eq!(
        rows[0]
            .get("expected_daily_reading_percent")
            .and_then(|v| v.as_i64()),
        Some(10)
    );

    assert_eq!(rows[1].get("daily_reading_percent").and_then(|v| v.as_f64()), Some(15.0));
    // New book on Wednesday: delta equals the day's accumulated value.
    assert_eq!(rows[2].get("daily_reading_percent").and_then(|v| v.as_f64()), Some(5.0));
    // Nothing recorded Thursday onward: state carries, deltas are zero.
    for row in &rows[3..] {
        assert_eq!(row.get("daily_reading_percent").and_then(|v| v.as_f64()), Some(0.0));
        assert_eq!(
            row.get("expected_daily_reading_percent").and_then(|v| v.as_i64()),
            Some(10)
        );
    }
    // The weekend has no planned math.
    assert_eq!(rows[5].get("expected_math_points").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(rows[6].get("expected_math_points").and_then(|v| v.as_i64()), Some(0));

    let summary = week.get("summary").expect("summary");
    assert_eq!(
        summary.get("total_actual_math_points").and_then(|v| v.as_i64()),
        Some(8)
    );
    assert_eq!(
        summary.get("total_expected_math_points").and_then(|v| v.as_i64()),
        Some(50)
    );
    assert_eq!(
        summary
            .get("total_expected_reading_percent")
            .and_then(|v| v.as_i64()),
        Some(70)
    );

    // The rounded sum of the seven deltas equals the reported total.
    let delta_sum: f64 = rows
        .iter()
        .map(|r| r.get("daily_reading_percent").and_then(|v| v.as_f64()).unwrap())
        .sum();
    assert_eq!(
        summary
            .get("total_actual_reading_percent")
            .and_then(|v| v.as_i64()),
        Some((delta_sum + 0.5).floor() as i64)
    );
    assert_eq!(
        summary
            .get("total_actual_reading_percent")
            .and_then(|v| v.as_i64()),
        Some(30)
    );
}

#[test]
fn week_context_carries_reading_state_across_the_monday_boundary() {
    let workspace = temp_dir("studylog-weekly-carry-in");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 7);

    // The previous Friday sets the running state for the following week.
    submit(
        &mut stdin,
        &mut reader,
        "fri",
        "2026-02-27",
        json!({ "word_count": 40000, "accumulated_reading_percent": 50 }),
    );
    submit(
        &mut stdin,
        &mut reader,
        "mon",
        "2026-03-02",
        json!({ "accumulated_reading_percent": 60 }),
    );

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "week",
        "progress.weekly",
        json!({ "ownerId": 7, "date": "2026-03-02" }),
    );
    let rows = week.get("dailyData").and_then(|v| v.as_array()).expect("dailyData");
    // Monday's delta is measured against Friday's carried 50, not zero.
    assert_eq!(rows[0].get("daily_reading_percent").and_then(|v| v.as_f64()), Some(10.0));
    // Rate (defaulted on first submit) and word count carry in from Friday.
    assert_eq!(
        rows[0]
            .get("expected_daily_reading_percent")
            .and_then(|v| v.as_i64()),
        Some(13) // 100 * 35000 / 40000 / 7 = 12.5, presented half-up
    );
}

#[test]
fn weekly_progress_rejects_malformed_dates() {
    let workspace = temp_dir("studylog-weekly-bad-date");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace_with_owner(&mut stdin, &mut reader, &workspace, 7);

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "progress.weekly",
        json!({ "ownerId": 7, "date": "next tuesday" }),
    );
    assert_eq!(code, "bad_params");
}
