//! End-to-end CLI runs against shell-command collaborators.
//!
//! The command templates go through `sh -c`, so the suite is Unix-only.
#![cfg(unix)]

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Fixture {
    _tmp: TempDir,
    dataset: PathBuf,
    indexes: PathBuf,
    slice_home: PathBuf,
    index_home: PathBuf,
}

fn fixture() -> Result<Fixture, std::io::Error> {
    let tmp = TempDir::new()?;
    let dataset = tmp.path().join("data").join("points.csv");
    std::fs::create_dir_all(dataset.parent().unwrap())?;
    std::fs::write(&dataset, b"x,y,t\n")?;
    let indexes = tmp.path().join("indexes");
    let slice_home = tmp.path().join("data").join("slice").join("day");
    let index_home = indexes.join("day");
    Ok(Fixture {
        _tmp: tmp,
        dataset,
        indexes,
        slice_home,
        index_home,
    })
}

fn mk_slice(fx: &Fixture, key: &str) -> Result<(), std::io::Error> {
    let dir = fx.slice_home.join(key);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("part-0"), key.as_bytes())
}

fn stindex() -> Command {
    Command::cargo_bin("stindex").expect("binary builds")
}

fn run_args(fx: &Fixture, index_cmd: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "--dataset".to_string(),
        fx.dataset.display().to_string(),
        "--indexes".to_string(),
        fx.indexes.display().to_string(),
        "--granularity".to_string(),
        "day".to_string(),
        "--index-cmd".to_string(),
        index_cmd.to_string(),
    ]
}

fn has_index(fx: &Fixture, key: &str) -> bool {
    fx.index_home.join(key).join("part-0").exists()
}

#[test]
fn run_builds_missing_partitions() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;
    mk_slice(&fx, "2024-03-15")?;
    std::fs::create_dir_all(fx.index_home.join("2024-03-13"))?;

    stindex()
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .success()
        .stdout(contains("Partitions discovered: 2"))
        .stdout(contains("Newly built: 2"))
        .stdout(contains("Failed: 0"));

    assert!(has_index(&fx, "2024-03-14"));
    assert!(has_index(&fx, "2024-03-15"));
    // No staging leftovers after a clean run's publishes.
    assert!(!fx.index_home.join("_staging").join("2024-03-14").exists());
    Ok(())
}

#[test]
fn second_run_builds_nothing() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;

    stindex()
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .success()
        .stdout(contains("Newly built: 1"));

    stindex()
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .success()
        .stdout(contains("Already indexed: 1"))
        .stdout(contains("Newly built: 0"));
    Ok(())
}

#[test]
fn failed_partition_exits_nonzero_and_is_retried() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;

    stindex()
        .args(run_args(&fx, "echo indexer crashed >&2; false"))
        .assert()
        .code(1)
        .stdout(contains("Failed: 1"))
        .stdout(contains("2024-03-14"))
        .stdout(contains("indexer crashed"));

    assert!(!fx.index_home.join("2024-03-14").exists());

    // The key stays in the build set; a healthy indexer picks it up.
    stindex()
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .success()
        .stdout(contains("Newly built: 1"));
    assert!(has_index(&fx, "2024-03-14"));
    Ok(())
}

#[test]
fn slice_cmd_runs_when_slice_home_is_missing() -> TestResult {
    let fx = fixture()?;
    let slice_cmd = format!(
        "mkdir -p {{output}}/day/2024-03-14 {{output}}/day/2024-03-15 && test -f {}",
        fx.dataset.display()
    );

    let mut args = run_args(&fx, "cp -r {input} {output}");
    args.push("--slice-cmd".to_string());
    args.push(slice_cmd);

    stindex()
        .args(&args)
        .assert()
        .success()
        .stdout(contains("Partitions discovered: 2"))
        .stdout(contains("Newly built: 2"));
    Ok(())
}

#[test]
fn missing_slice_home_without_slice_cmd_is_fatal() -> TestResult {
    let fx = fixture()?;

    stindex()
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .code(2)
        .stderr(contains("--slice-cmd"));
    Ok(())
}

#[test]
fn rejects_non_point_shape_before_discovery() -> TestResult {
    let fx = fixture()?;
    let mut args = run_args(&fx, "cp -r {input} {output}");
    args.push("--shape".to_string());
    args.push("rectangle".to_string());

    stindex()
        .args(&args)
        .assert()
        .code(2)
        .stderr(contains("spatio-temporal"));
    Ok(())
}

#[test]
fn rejects_unknown_granularity() -> TestResult {
    let fx = fixture()?;
    stindex()
        .args([
            "plan",
            "--dataset",
            &fx.dataset.display().to_string(),
            "--indexes",
            &fx.indexes.display().to_string(),
            "--granularity",
            "fortnight",
        ])
        .assert()
        .code(2)
        .stderr(contains("fortnight"));
    Ok(())
}

#[test]
fn plan_lists_missing_keys_without_building() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;
    mk_slice(&fx, "2024-03-15")?;

    stindex()
        .args([
            "plan",
            "--dataset",
            &fx.dataset.display().to_string(),
            "--indexes",
            &fx.indexes.display().to_string(),
            "--granularity",
            "day",
        ])
        .assert()
        .success()
        .stdout(contains("Missing indexes: 2"))
        .stdout(contains("2024-03-14"))
        .stdout(contains("2024-03-15"));

    // Plan never mutates: the index home was not created.
    assert!(!fx.index_home.exists());
    Ok(())
}

#[test]
fn overwrite_rebuilds_existing_indexes() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;

    stindex()
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .success();

    // An indexer that marks its outputs lets us see the rebuild happen.
    let mut args = run_args(&fx, "cp -r {input} {output} && touch {output}/REBUILT");
    args.push("--overwrite".to_string());
    stindex()
        .args(&args)
        .assert()
        .success()
        .stdout(contains("Newly built: 1"));

    assert!(fx.index_home.join("2024-03-14").join("REBUILT").exists());
    Ok(())
}

#[test]
fn json_summary_reports_keys_and_causes() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;
    mk_slice(&fx, "2024-03-15")?;

    let mut args = run_args(
        &fx,
        "case {input} in *2024-03-15) echo bad slice >&2; false;; *) cp -r {input} {output};; esac",
    );
    args.push("--json".to_string());

    let assert = stindex().args(&args).assert().code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: serde_json::Value = serde_json::from_str(&stdout)?;

    assert_eq!(value["discovered"], 2);
    assert_eq!(value["newly_built"], serde_json::json!(["2024-03-14"]));
    assert_eq!(value["failed"][0]["key"], "2024-03-15");
    let cause = value["failed"][0]["cause"].as_str().unwrap_or_default();
    assert!(cause.contains("bad slice"), "cause was: {cause}");
    Ok(())
}

#[test]
fn parallel_jobs_build_all_partitions() -> TestResult {
    let fx = fixture()?;
    for day in 10..=17 {
        mk_slice(&fx, &format!("2024-03-{day}"))?;
    }

    let mut args = run_args(&fx, "sleep 0.05 && cp -r {input} {output}");
    args.push("--jobs".to_string());
    args.push("4".to_string());

    stindex()
        .args(&args)
        .assert()
        .success()
        .stdout(contains("Newly built: 8"));

    for day in 10..=17 {
        assert!(has_index(&fx, &format!("2024-03-{day}")));
    }
    Ok(())
}

#[test]
fn collaborator_options_reach_the_command_environment() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;

    let mut args = run_args(
        &fx,
        "mkdir -p {output} && printenv STINDEX_OPT_SINDEX > {output}/part-0",
    );
    args.push("-D".to_string());
    args.push("sindex=rtree".to_string());

    stindex().args(&args).assert().success();

    let recorded = std::fs::read_to_string(fx.index_home.join("2024-03-14").join("part-0"))?;
    assert_eq!(recorded.trim(), "rtree");
    Ok(())
}

#[test]
fn verbose_logging_announces_the_run() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;

    stindex()
        .env("RUST_LOG", "info")
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .success()
        .stdout(contains("starting reconciliation run"));
    Ok(())
}

#[test]
fn unspawnable_command_is_a_partition_failure() -> TestResult {
    let fx = fixture()?;
    mk_slice(&fx, "2024-03-14")?;

    // With an empty PATH the shell itself cannot be spawned; that is a
    // per-partition failure naming the rendered command, not an I/O path.
    stindex()
        .env("PATH", "")
        .args(run_args(&fx, "cp -r {input} {output}"))
        .assert()
        .code(1)
        .stdout(contains("Failed: 1"))
        .stdout(contains("cannot spawn"));

    assert!(!fx.index_home.join("2024-03-14").exists());
    Ok(())
}

#[test]
fn run_requires_index_cmd() -> TestResult {
    let fx = fixture()?;
    stindex()
        .args([
            "run",
            "--dataset",
            &fx.dataset.display().to_string(),
            "--indexes",
            &fx.indexes.display().to_string(),
            "--granularity",
            "day",
        ])
        .assert()
        .failure()
        .stderr(contains("--index-cmd"));
    Ok(())
}
