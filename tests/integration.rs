use isc_rs::data::SubjectData;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use std::{collections::BTreeMap, env, fs, path::PathBuf, process::Command};

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir_all(test_dir.join("subjects")).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "[algorithm]\n"
        + "method = \"leave_one_out\"\n"
        + "\n"
        + "[null]\n"
        + "method = \"phase_randomization\"\n"
        + "n_draws = 200\n"
        + "min_samples = 16\n"
        + "seed = 42\n"
        + "\n"
        + "[correction]\n"
        + "method = \"fdr\"\n"
        + "alpha = 0.05\n";

    fs::write(&config_path, config_contents).expect("failed to write config file");

    let n = 64;
    let mut rng = ChaCha12Rng::seed_from_u64(1);
    for i_subject in 0..4 {
        let mut series = BTreeMap::new();
        series.insert(
            "roi-visual".to_string(),
            (0..n).map(|t| (t as f64 * 0.4).sin()).collect(),
        );
        series.insert(
            "roi-control".to_string(),
            (0..n).map(|_| rng.random::<f64>() - 0.5).collect(),
        );

        let id = format!("sub-{i_subject:02}");
        let record = SubjectData::new(&id, series);
        record
            .to_file(test_dir.join("subjects").join(format!("{id}.msgpack")))
            .expect("failed to write subject file");
    }

    fn run_bin(args: &[&str]) {
        let bin = PathBuf::from(env!("CARGO_BIN_EXE_isc"));

        let output = Command::new(bin)
            .args(args)
            .output()
            .expect("failed to execute command");

        let stdout_str =
            std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
        let stderr_str =
            std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

        assert!(
            output.status.success(),
            "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
        );
    }

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--analysis-dir", test_dir_str, "run"]);

    let significance_path = test_dir.join("significance.json");
    let first = fs::read_to_string(&significance_path).expect("failed to read significance map");

    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&first).expect("failed to parse significance map");
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        let p_value = entry["p_value"].as_f64().expect("p_value must be a number");
        assert!(p_value > 0.0 && p_value <= 1.0);
        assert!(entry["unit"].is_string());
        assert!(entry["observed"].is_number());
        assert!(entry["significant"].is_boolean());
    }

    // Same seed and inputs must reproduce the map bit for bit.
    run_bin(&["--analysis-dir", test_dir_str, "run"]);
    let second = fs::read_to_string(&significance_path).expect("failed to read significance map");
    assert_eq!(first, second);

    run_bin(&["--analysis-dir", test_dir_str, "clean"]);
    assert!(!significance_path.exists());

    fs::remove_dir_all(&test_dir).ok();
}
