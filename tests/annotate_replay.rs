use annotation_authoring::annotate::messages::AnnotateSignal;
use annotation_authoring::annotate::model::{CoordinateSpace, Shape};
use annotation_authoring::annotate::replay::load_script;
use annotation_authoring::annotate::settings::AnnotateSettings;
use annotation_authoring::annotate::state::ModeKind;
use annotation_authoring::annotate::run_script;
use tempfile::tempdir;

const POLYGON_SESSION: &str = r#"{
    "layout": {"window_width": 400, "window_height": 200},
    "files": ["cortex"],
    "steps": [
        {"step": "mode", "request": {"mode": "new_shape", "annotation_type": "polygon", "space": "window", "file": 1}},
        {"step": "press", "x": 40, "y": 20},
        {"step": "release", "x": 40, "y": 20},
        {"step": "press", "x": 200, "y": 20},
        {"step": "release", "x": 200, "y": 20},
        {"step": "press", "x": 120, "y": 100},
        {"step": "release", "x": 120, "y": 100},
        {"step": "key", "key": "enter"}
    ]
}"#;

#[test]
fn replayed_polygon_lands_in_window_percent() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("session.json");
    std::fs::write(&path, POLYGON_SESSION).expect("write script");

    let script = load_script(&path).expect("load");
    let outcome = run_script(&script, AnnotateSettings::default()).expect("run");

    assert_eq!(outcome.final_mode, ModeKind::Select);
    assert!(outcome.refused.is_empty());
    assert_eq!(outcome.annotations.len(), 1);
    let polygon = &outcome.annotations[0].annotation;
    assert_eq!(polygon.space, CoordinateSpace::Window);
    let Shape::Multi { coordinates } = &polygon.shape else {
        panic!("polygon must be multi-coordinate");
    };
    let xy: Vec<_> = coordinates.iter().map(|c| (c.x(), c.y())).collect();
    assert_eq!(xy, vec![(10.0, 10.0), (50.0, 10.0), (30.0, 50.0)]);
    assert!(outcome.signals.contains(&AnnotateSignal::ModeChanged {
        mode: ModeKind::DrawingPolyType
    }));
}

#[test]
fn refused_requests_are_listed_with_their_step() {
    let script = serde_json::from_str(
        r#"{
            "steps": [
                {"step": "mode", "request": {"mode": "paste", "file": 1}},
                {"step": "mode", "request": {"mode": "new_shape", "annotation_type": "line", "space": "tab", "file": 7}}
            ]
        }"#,
    )
    .expect("parse");
    let outcome = run_script(&script, AnnotateSettings::default()).expect("run");
    assert_eq!(outcome.refused.len(), 2);
    assert!(outcome.refused[0].starts_with("step 0:"));
    assert!(outcome.refused[1].starts_with("step 1:"));
    assert_eq!(outcome.final_mode, ModeKind::Select);
}

#[test]
fn removing_the_file_mid_drawing_returns_to_select() {
    let script = serde_json::from_str(
        r#"{
            "steps": [
                {"step": "mode", "request": {"mode": "new_shape", "annotation_type": "polyline", "space": "tab", "file": 1}},
                {"step": "press", "x": 40, "y": 20},
                {"step": "release", "x": 40, "y": 20},
                {"step": "remove_file", "file": 1}
            ]
        }"#,
    )
    .expect("parse");
    let outcome = run_script(&script, AnnotateSettings::default()).expect("run");
    assert_eq!(outcome.final_mode, ModeKind::Select);
    assert!(outcome.annotations.is_empty());
}

#[test]
fn drag_without_press_is_an_error() {
    let script = serde_json::from_str(r#"{"steps": [{"step": "drag", "x": 1, "y": 1}]}"#)
        .expect("parse");
    assert!(run_script(&script, AnnotateSettings::default()).is_err());
}

#[test]
fn unreadable_script_reports_its_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("missing.json");
    let err = load_script(&path).expect_err("missing file");
    assert!(format!("{err:#}").contains("missing.json"));
}

#[test]
fn attribute_steps_edit_the_selected_annotation() {
    let mut script: serde_json::Value = serde_json::from_str(POLYGON_SESSION).expect("parse");
    let steps = script["steps"].as_array_mut().expect("steps");
    steps.push(serde_json::json!({"step": "attribute", "edit": {"attribute": "line_width", "width": 4.5}}));
    steps.push(serde_json::json!({"step": "attribute", "edit": {"attribute": "arrow_start", "enabled": true}}));
    let script = serde_json::from_value(script).expect("script");

    let outcome = run_script(&script, AnnotateSettings::default()).expect("run");
    assert_eq!(outcome.annotations.len(), 1);
    let style = outcome.annotations[0].annotation.style;
    assert_eq!(style.line_width, 4.5);
    assert!(!style.arrow_start);
    assert_eq!(outcome.refused.len(), 1);
    assert!(outcome.refused[0].starts_with("step 9:"));
}
