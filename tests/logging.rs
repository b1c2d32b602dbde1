use std::{fs, thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

// One test per binary: the first `init` in a process wins.
#[test]
#[serial]
fn writes_log_file_and_ignores_later_init() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("annotate.log");
    let second = dir.path().join("second.log");

    annotation_authoring::logging::init(true, Some(path.clone()));
    annotation_authoring::logging::init(false, Some(second.clone()));
    tracing::info!("annotation replay started");

    sleep(Duration::from_millis(100));

    assert_eq!(
        annotation_authoring::logging::active_log_file(),
        Some(path.clone())
    );
    assert!(path.exists(), "log file was not created");
    assert!(!second.exists(), "second log file should not be created");
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("annotation replay started"));
}
