use std::io::Write;

use clap::Parser;
use ctr_cli::{Cli, Commands, InspectCommand, TrainCommand};

fn train(args: &[&str]) -> TrainCommand {
    let mut argv = vec!["ctr", "train"];
    argv.extend_from_slice(args);
    match Cli::parse_from(argv).command {
        Commands::Train(cmd) => cmd,
        _ => panic!("expected train"),
    }
}

fn inspect(args: &[&str]) -> InspectCommand {
    let mut argv = vec!["ctr", "inspect"];
    argv.extend_from_slice(args);
    match Cli::parse_from(argv).command {
        Commands::Inspect(cmd) => cmd,
        _ => panic!("expected inspect"),
    }
}

/// Criteo rows whose label follows the first categorical column.
fn criteo_fixture(rows: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    for r in 0..rows {
        let label = usize::from(r % 3 == 0);
        let mut fields = vec![label.to_string()];
        fields.extend((0..13).map(|i| if (r + i) % 5 == 0 { String::new() } else { ((r * i) % 17).to_string() }));
        fields.push(format!("{:08x}", label * 7 + r % 2));
        fields.extend((1..26).map(|i| format!("{:x}", (r + i) % 4)));
        writeln!(file, "{}", fields.join("\t")).expect("write");
    }
    file.flush().expect("flush");
    file
}

#[test]
fn trains_every_model_on_synthetic_data() {
    for model in ["afm", "deepfm", "ffm"] {
        let cmd = train(&[
            "--model",
            model,
            "--synthetic",
            "200",
            "--epochs",
            "1",
            "--batch-size",
            "64",
            "--k",
            "4",
        ]);
        let outcome = cmd.execute().expect("train");
        assert_eq!(outcome.history.len(), 1, "{model}");
        assert_eq!(outcome.test.num_examples, 40, "{model}");
        assert!(outcome.test.loss.is_finite(), "{model}");
        if let Some(auc) = outcome.test.auc {
            assert!((0.0..=1.0).contains(&auc), "{model}");
        }
    }
}

#[test]
fn trains_from_a_criteo_file_and_writes_history() {
    let data = criteo_fixture(120);
    let dir = tempfile::tempdir().expect("temp dir");
    let history_path = dir.path().join("history.json");
    let data_path = data.path().to_string_lossy().into_owned();
    let history_arg = history_path.to_string_lossy().into_owned();

    let cmd = train(&[
        "--model",
        "ffm",
        "--data",
        &data_path,
        "--epochs",
        "3",
        "--batch-size",
        "16",
        "--learning-rate",
        "0.01",
        "--embed-dim",
        "4",
        "--history",
        &history_arg,
    ]);
    let outcome = cmd.execute().expect("train");
    assert_eq!(outcome.test.num_examples, 24);
    assert!(outcome.test.auc.is_some());

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&history_path).expect("history file"))
            .expect("json");
    assert_eq!(written["epochs"].as_array().map(Vec::len), Some(3));
    assert!(written["epochs"][0]["validation"]["loss"].is_number());
}

#[test]
fn config_file_feeds_the_run() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config_path = dir.path().join("run.json");
    std::fs::write(
        &config_path,
        r#"{"train": {"epochs": 2, "batch_size": 32, "validation_split": 0.0},
            "model": {"afm": {"mode": "avg"}}}"#,
    )
    .expect("write config");
    let config_arg = config_path.to_string_lossy().into_owned();

    let cmd = train(&["--model", "afm", "--synthetic", "100", "--config", &config_arg]);
    let outcome = cmd.execute().expect("train");
    assert_eq!(outcome.history.len(), 2);
    assert!(outcome.history.epochs.iter().all(|e| e.validation.is_none()));
}

#[test]
fn missing_data_file_is_an_error() {
    let cmd = train(&["--model", "deepfm", "--data", "/nonexistent/criteo.txt"]);
    let err = cmd.execute().expect_err("missing file");
    assert!(format!("{err:#}").contains("/nonexistent/criteo.txt"));
}

#[test]
fn inspect_prints_parameter_summary() {
    let cmd = inspect(&["--model", "ffm", "--synthetic", "20", "--embed-dim", "4"]);
    let text = cmd.render().expect("render");
    assert!(text.contains("Total params"));

    let cmd = inspect(&["--model", "deepfm", "--synthetic", "20", "--json"]);
    let json: serde_json::Value = serde_json::from_str(&cmd.render().expect("render")).expect("json");
    assert_eq!(json["model"], "deepfm");
    assert!(json["parameters"].as_array().is_some_and(|p| !p.is_empty()));
}
