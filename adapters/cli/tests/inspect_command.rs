use std::{fs, path::PathBuf, process::Command};

fn fixture(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("patrol-view-{}-{name}", std::process::id()));
    fs::write(&path, contents).expect("fixture is writable");
    path
}

fn patrol_view(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_patrol-view"))
        .args(["--config", "does-not-exist.toml", "--log-level", "off"])
        .args(args)
        .output()
        .expect("failed to launch patrol-view")
}

#[test]
fn inspect_prints_route_stats_of_a_recording() {
    let recording = fixture(
        "recording.json",
        r#"[
            { "frames": [
                { "agent_position": [0, 0], "coverage_grid": [[1, 0], [0, 0]] },
                { "agent_position": [0, 1], "coverage_grid": [[1, 0], [1, 0]] }
            ]},
            [
                { "agent_position": [1, 1], "coverage_grid": [[1, 0], [1, 1]] }
            ]
        ]"#,
    );

    let output = patrol_view(&["inspect", recording.to_str().expect("utf-8 path")]);
    let _ = fs::remove_file(&recording);

    assert!(output.status.success(), "inspect failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("episodes:      2"), "{stdout}");
    assert!(stdout.contains("steps:         3"), "{stdout}");
    assert!(stdout.contains("path length:   3"), "{stdout}");
    assert!(stdout.contains("waypoints:     (0, 0) (0, 1) (1, 1)"), "{stdout}");
}

#[test]
fn inspect_honours_the_preview_limit_flag() {
    let frames: Vec<String> = (0..10)
        .map(|step| format!(r#"{{ "agent_position": [{step}, 0] }}"#))
        .collect();
    let recording = fixture(
        "long.json",
        &format!(r#"{{ "episodes": [{{ "frames": [{}] }}] }}"#, frames.join(",")),
    );

    let output = patrol_view(&[
        "inspect",
        recording.to_str().expect("utf-8 path"),
        "--preview-limit",
        "3",
    ]);
    let _ = fs::remove_file(&recording);

    assert!(output.status.success(), "inspect failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("waypoints:     (0, 0) (4, 0) (8, 0) (9, 0)"),
        "{stdout}"
    );
}

#[test]
fn unreadable_recording_fails_with_context() {
    let output = patrol_view(&["inspect", "/nonexistent/recording.json"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read recording"), "{stderr}");
}
