use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::Parser;
use tempfile::tempdir;

use blue::{BlueError, CancellationToken, Engine};
use blue_cli::Args;
use blue_parser::{ErrorCode, Origin, parse_node};

fn demos_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

/// Collects all demo documents
fn collect_demo_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| {
                    path.is_file()
                        && matches!(
                            path.extension().and_then(|s| s.to_str()),
                            Some("yaml" | "json")
                        )
                })
                .collect()
        })
        .unwrap_or_default();

    // Sort for consistent test output
    files.sort();
    files
}

fn run(args: &[&str]) -> Result<(), BlueError> {
    let mut argv = vec!["blue"];
    argv.extend_from_slice(args);
    blue_cli::run(&Args::try_parse_from(argv).unwrap())
}

fn codes(err: &BlueError) -> Vec<ErrorCode> {
    err.diagnostics().iter().filter_map(|d| d.code()).collect()
}

#[test]
fn e2e_smoke_test_demos() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let demos = collect_demo_files(&demos_dir());
    assert!(!demos.is_empty(), "No demo documents found");

    let mut failed = Vec::new();
    for demo in &demos {
        let input = demo.to_string_lossy().to_string();
        for format in ["json", "yaml"] {
            let output = temp_dir.path().join(format!(
                "{}.{format}",
                demo.file_stem().unwrap().to_string_lossy()
            ));
            let output = output.to_string_lossy().to_string();

            if let Err(e) = run(&["resolve", &input, "-f", format, "-o", &output]) {
                failed.push((demo.clone(), e));
                continue;
            }

            // The flattened output is itself a valid document.
            let text = fs::read_to_string(&output).unwrap();
            let engine = Engine::default();
            let flat = engine.parse(&text, Origin::Memory(output.clone())).unwrap();
            let resolution = engine.resolve(flat, &CancellationToken::new()).unwrap();
            assert!(
                resolution.is_success(),
                "{}: {:?}",
                demo.display(),
                resolution.diagnostics()
            );
        }
    }

    if !failed.is_empty() {
        for (path, err) in &failed {
            eprintln!("  {}: {err} {:?}", path.display(), err.diagnostics());
        }
        panic!("{} demo(s) failed to resolve", failed.len());
    }
}

#[test]
fn e2e_parse_round_trips_demos() {
    let temp_dir = tempdir().unwrap();
    for demo in collect_demo_files(&demos_dir()) {
        let output = temp_dir.path().join("ast.yaml");
        let output = output.to_string_lossy().to_string();
        run(&["parse", &demo.to_string_lossy(), "-f", "yaml", "-o", &output]).unwrap();

        let original = parse_node(&fs::read_to_string(&demo).unwrap()).unwrap();
        let written = parse_node(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(original, written, "{}", demo.display());
    }
}

#[test]
fn e2e_unresolved_reference_fails() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("main.yaml");
    fs::write(&input, "types:\n  A:\n    fields: {b: Missing}\n").unwrap();
    let output = dir.path().join("out.json");

    let err = run(&[
        "resolve",
        &input.to_string_lossy(),
        "-o",
        &output.to_string_lossy(),
    ])
    .unwrap_err();
    assert_eq!(codes(&err), [ErrorCode::E200]);
    assert!(!output.exists());
}

#[test]
fn e2e_closed_flag_and_config_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("main.yaml");
    fs::write(
        &input,
        "types:\n  Base:\n    fields: {id: Text}\n  User:\n    extends: Base\n    fields: {name: Text}\n",
    )
    .unwrap();
    let input = input.to_string_lossy().to_string();
    let output = dir.path().join("out.json").to_string_lossy().to_string();

    run(&["resolve", &input, "-o", &output]).unwrap();

    let err = run(&["resolve", &input, "-o", &output, "--closed"]).unwrap_err();
    assert_eq!(codes(&err), [ErrorCode::E300]);

    let config = dir.path().join("blue.toml");
    fs::write(&config, "[resolve]\nclosed_objects = true\n").unwrap();
    let err = run(&[
        "resolve",
        &input,
        "-o",
        &output,
        "--config",
        &config.to_string_lossy(),
    ])
    .unwrap_err();
    assert_eq!(codes(&err), [ErrorCode::E300]);
}

#[test]
fn e2e_missing_input() {
    let err = run(&["hash", "/nonexistent/blue/main.yaml"]).unwrap_err();
    assert!(matches!(err, BlueError::Fetch(_)), "{err:?}");

    let err = run(&["parse", "ftp://example.com/a.yaml"]).unwrap_err();
    assert!(matches!(err, BlueError::InvalidInput { .. }), "{err:?}");
}
