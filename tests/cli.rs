use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn formats_chain_file_to_stdout() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let input = tmp.path().join("nightly.chain");
    fs::write(&input, "1>>[2,3]>>>>4\n")?;

    let mut cmd = Command::cargo_bin("dagedit")?;
    cmd.arg("format").arg("--input").arg(&input);

    cmd.assert()
        .success()
        .stdout(predicate::eq("1>>[2,3]>>4\n"));

    Ok(())
}

#[test]
fn reads_chain_from_stdin_by_default() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("dagedit")?;
    cmd.write_stdin("a>>b>>a");

    cmd.assert()
        .success()
        .stdout(predicate::eq("a>>b>>a\n"))
        .stderr(predicate::str::contains(
            "warning: the following objects are used two or more times: 'a'",
        ));

    Ok(())
}

#[test]
fn writes_output_file() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let output = tmp.path().join("formatted.chain");

    let mut cmd = Command::cargo_bin("dagedit")?;
    cmd.arg("format")
        .arg("-i")
        .arg("-")
        .arg("-o")
        .arg(&output)
        .write_stdin("[x,y]>>z");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Formatted chain ->"));
    assert_eq!(fs::read_to_string(&output)?, "[x,y]>>z\n");

    Ok(())
}

#[test]
fn dumps_layout_with_catalog_labels() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let catalog = tmp.path().join("objects.json");
    fs::write(
        &catalog,
        r#"[{"id": 1, "name": "Extract data"}, {"id": 2, "name": "Load"}]"#,
    )?;

    let mut cmd = Command::cargo_bin("dagedit")?;
    cmd.arg("format")
        .arg("--layout")
        .arg("--catalog")
        .arg(&catalog)
        .write_stdin("1>>[2]");

    let output = cmd.assert().success().get_output().stdout.clone();
    let layout: Value = serde_json::from_slice(&output)?;

    assert_eq!(layout["text"], "1>>[2]");
    assert_eq!(layout["usedObjectIds"], serde_json::json!(["1", "2"]));
    let nodes = layout["nodes"].as_array().expect("nodes array");
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0]["type"], "group");
    assert_eq!(nodes[1]["label"], "Extract data");
    assert_eq!(nodes[1]["size"]["width"], 141.0);
    assert_eq!(layout["edges"].as_array().map(Vec::len), Some(1));

    Ok(())
}

#[test]
fn rejects_chain_without_steps() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("dagedit")?;
    cmd.arg("format").write_stdin("[]>>[]\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("contains no steps"));

    Ok(())
}

#[test]
fn missing_input_file_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let missing = tmp.path().join("nope.chain");

    let mut cmd = Command::cargo_bin("dagedit")?;
    cmd.arg("format").arg("-i").arg(&missing);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));

    Ok(())
}
