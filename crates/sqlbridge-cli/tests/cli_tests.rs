//! CLI integration tests for sqlbridge.
//!
//! These tests cover argument parsing, output of the offline commands
//! and exit codes for configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cmd() -> Command {
    Command::cargo_bin("sqlbridge").unwrap()
}

const CONNECTIONS: &str = r#"
connections:
  - name: warehouse
    type: postgres
    host: "${DW_HOST}"
    port: "5432"
    database: dw
    username: etl
    password: secret
    extra_options:
      postgresql.application_name: loader
      mysql.useSSL: "false"
  - name: shards
    type: mysql
    username: app
    password: apppw
    cluster:
      enabled: true
      partitions:
        - id: p0
          host: shard0
          port: "3306"
          database: orders
        - id: p1
          host: shard1
          port: "3306"
          database: orders
          username: other
"#;

fn connections_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", CONNECTIONS).unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dialects"))
        .stdout(predicate::str::contains("url"))
        .stdout(predicate::str::contains("partitions"))
        .stdout(predicate::str::contains("split"))
        .stdout(predicate::str::contains("ddl"))
        .stdout(predicate::str::contains("exec"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlbridge"));
}

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: warn]"))
        .stdout(predicate::str::contains("[default: connections.yaml]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Offline Commands
// =============================================================================

#[test]
fn test_dialects_lists_builtins() {
    cmd()
        .arg("dialects")
        .assert()
        .success()
        .stdout(predicate::str::contains("postgresql"))
        .stdout(predicate::str::contains("mssql"))
        .stdout(predicate::str::contains("PostgreSQL"));
}

#[test]
fn test_dialects_json() {
    let output = cmd()
        .args(["--output-json", "dialects"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let listed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"mysql"));
    assert!(ids.contains(&"h2"));
}

#[test]
fn test_split_script_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "INSERT INTO t VALUES ('a;b');").unwrap();
    writeln!(file, "-- just a comment;").unwrap();
    writeln!(file, "SELECT 1").unwrap();

    cmd()
        .args(["split", file.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("INSERT INTO t VALUES ('a;b');\n"))
        .stdout(predicate::str::contains("SELECT 1;\n"));
}

#[test]
fn test_split_stdin_json() {
    let output = cmd()
        .args(["--output-json", "split", "-"])
        .write_stdin("DELETE FROM t; SELECT * FROM t;")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let statements: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(statements.as_array().unwrap().len(), 2);
    assert_eq!(statements[0]["query"], false);
    assert_eq!(statements[1]["query"], true);
}

#[test]
fn test_ddl_renders_create_table() {
    cmd()
        .args([
            "ddl",
            "--dialect",
            "postgresql",
            "orders",
            "--column",
            "id:integer:9:0",
            "--column",
            "name:string:50",
            "--key",
            "id",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE"))
        .stdout(predicate::str::contains("orders"))
        .stdout(predicate::str::contains("name"));
}

#[test]
fn test_ddl_unknown_dialect_exits_with_code_3() {
    cmd()
        .args(["ddl", "--dialect", "nosuchdb", "t", "--column", "id:integer"])
        .assert()
        .code(3);
}

#[test]
fn test_ddl_bad_column_exits_with_code_2() {
    cmd()
        .args(["ddl", "--dialect", "mysql", "t", "--column", "id:money"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown column type"));
}

#[test]
fn test_encrypt_prefixes_output() {
    cmd()
        .args(["encrypt", "secret"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Encrypted "));
}

// =============================================================================
// Connection Definitions
// =============================================================================

#[test]
fn test_url_substitutes_variables_and_options() {
    let file = connections_file();
    cmd()
        .env("DW_HOST", "db.internal")
        .args(["--config", file.path().to_str().unwrap(), "url", "warehouse"])
        .assert()
        .success()
        .stdout("postgresql://db.internal:5432/dw?application_name=loader\n");
}

#[test]
fn test_url_of_partition() {
    let file = connections_file();
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "url",
            "shards",
            "--partition",
            "p1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("mysql://shard1:3306/orders"));
}

#[test]
fn test_unknown_partition_exits_with_code_3() {
    let file = connections_file();
    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "url",
            "shards",
            "--partition",
            "p9",
        ])
        .assert()
        .code(3);
}

#[test]
fn test_partitions_listing() {
    let file = connections_file();
    let output = cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--output-json",
            "partitions",
            "shards",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let listed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert_eq!(listed[0]["username"], "app");
    assert_eq!(listed[1]["username"], "other");
}

#[test]
fn test_partitions_of_plain_connection() {
    let file = connections_file();
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "partitions", "warehouse"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not partitioned"));
}

#[test]
fn test_exec_without_native_driver_fails() {
    let file = connections_file();
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "exec", "shards", "-"])
        .write_stdin("DELETE FROM t;")
        .assert()
        .code(1);
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_5() {
    cmd()
        .args(["--config", "nonexistent_connections.yaml", "url", "warehouse"])
        .assert()
        .code(5);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connections: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "url", "warehouse"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_connection_exits_with_code_2() {
    let file = connections_file();
    cmd()
        .args(["--config", file.path().to_str().unwrap(), "url", "nowhere"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown connection"));
}

#[test]
fn test_invalid_port_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connections:").unwrap();
    writeln!(file, "  - name: bad").unwrap();
    writeln!(file, "    type: mysql").unwrap();
    writeln!(file, "    port: abc").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "url", "bad"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_log_format_exits_with_code_2() {
    cmd()
        .args(["--log-format", "xml", "dialects"])
        .assert()
        .code(2);
}
