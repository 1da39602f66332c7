use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

fn chapterforge_cmd() -> Command {
    Command::cargo_bin("chapterforge").unwrap()
}

#[test]
fn init_creates_project_layout() {
    let temp_dir = tempdir().unwrap();

    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized chapterforge project"));

    assert!(temp_dir.path().join("jobs").is_dir());
    assert!(temp_dir.path().join("chapterforge.db").is_file());
}

#[test]
fn ingest_then_status_shows_every_stage_pending() {
    let temp_dir = tempdir().unwrap();
    chapterforge_cmd().current_dir(temp_dir.path()).arg("init").assert().success();

    let ingest_output = chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("ingest")
        .arg("--url")
        .arg("https://example/v/AAAAAAAAAAA")
        .arg("--start")
        .arg("60")
        .arg("--end")
        .arg("120")
        .output()
        .unwrap();
    assert!(ingest_output.status.success());
    let stdout = String::from_utf8_lossy(&ingest_output.stdout);
    let job_id = stdout
        .split_whitespace()
        .nth(2)
        .expect("ingest prints \"created job <id> (<ulid>)\"");

    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("status")
        .arg(job_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("download_audio"))
        .stdout(predicate::str::contains("build_chapter"))
        .stdout(predicate::str::contains("pending"));
}

#[test]
fn list_eligible_is_empty_for_a_stage_whose_predecessor_has_not_succeeded() {
    let temp_dir = tempdir().unwrap();
    chapterforge_cmd().current_dir(temp_dir.path()).arg("init").assert().success();
    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("ingest")
        .arg("--url")
        .arg("https://example/v/BBBBBBBBBBB")
        .output()
        .unwrap();

    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .arg("build_chapter")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .arg("download_audio")
        .assert()
        .success()
        .stdout(predicate::str::contains("1"));
}

#[test]
fn running_an_unknown_stage_fails_as_a_bug() {
    let temp_dir = tempdir().unwrap();
    chapterforge_cmd().current_dir(temp_dir.path()).arg("init").assert().success();
    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("ingest")
        .arg("--url")
        .arg("https://example/v/CCCCCCCCCCC")
        .output()
        .unwrap();

    chapterforge_cmd()
        .current_dir(temp_dir.path())
        .arg("run")
        .arg("not_a_real_stage")
        .arg("--job")
        .arg("1")
        .assert()
        .failure();
}
