use std::path::Path;
use std::process::{Command, Output};

fn calgrid(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_calgrid"))
        .args(args)
        .arg("--offline")
        .env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env_remove("CALGRID_REMOTE_URL")
        .env_remove("CALGRID_API_KEY")
        .output()
        .unwrap()
}

#[test]
fn missing_day_exits_2_in_text_and_json() {
    let home = tempfile::tempdir().unwrap();

    for args in [
        &["delete", "2024-05-01"][..],
        &["delete", "2024-05-01", "--json"],
        &["show", "2024-05-01"],
        &["show", "2024-05-01", "--json"],
    ] {
        let output = calgrid(home.path(), args);
        assert_eq!(output.status.code(), Some(2), "calgrid {}", args.join(" "));
    }

    let text = calgrid(home.path(), &["delete", "2024-05-01"]);
    assert!(String::from_utf8_lossy(&text.stderr).contains("No entry for 2024-05-01"));
    assert!(text.stdout.is_empty());
}

#[test]
fn deleting_a_logged_day_succeeds() {
    let home = tempfile::tempdir().unwrap();

    let logged = calgrid(home.path(), &["log", "1500", "--date", "2024-05-01"]);
    assert!(logged.status.success());

    let deleted = calgrid(home.path(), &["delete", "2024-05-01"]);
    assert_eq!(deleted.status.code(), Some(0));
    assert_eq!(
        calgrid(home.path(), &["delete", "2024-05-01"]).status.code(),
        Some(2)
    );
}
