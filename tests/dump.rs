use std::io::Write;

use assert_cmd::Command;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use tempfile::NamedTempFile;

const PAGE1: &str = r#"@article{ada2020,
  author = {Lovelace, Ada},
  title = {Notes on the Analytical Engine},
  journal = {Scientific Memoirs},
  year = {1843},
  pages = {1-5},
  url = {https://example.org/notes}
}
"#;

const PAGE2: &str = r#"@book{knuth1997,
  author = {Knuth, Donald},
  title = {The Art of Computer Programming},
  publisher = {Addison-Wesley},
  year = {1997},
  url = {https://example.org/taocp}
}
"#;

fn config_for(server: &Server) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tmp file");
    writeln!(
        file,
        "clientId: 4321\nusername: ada@example.org\npassword: hunter2\napiUrl: {}",
        server.url()
    )
    .unwrap();
    file
}

/// Answer the login POST the way Mendeley does, echoing back the state it was sent.
fn mock_login(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/oauth/authorize")
        .match_query(Matcher::UrlEncoded("client_id".into(), "4321".into()))
        .match_body(Matcher::UrlEncoded("password".into(), "hunter2".into()))
        .with_status(302)
        .with_header_from_request("location", |req| {
            let url = url::Url::parse(&format!("http://localhost{}", req.path_and_query()))
                .expect("request url");
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            format!(
                "http://localhost:8080/bibtexexport#access_token=tok&token_type=bearer&expires_in=3600&state={state}"
            )
        })
        .create()
}

fn command(config: &NamedTempFile) -> Command {
    let mut cmd = Command::cargo_bin("mendeley-bib").expect("binary");
    cmd.env("NO_COLOR", "1")
        .env_remove("MENDELEY_USERNAME")
        .env_remove("MENDELEY_PASSWORD")
        .arg("--config")
        .arg(config.path());
    cmd
}

#[test]
fn dumps_cleaned_bibliography() {
    let mut server = Server::new();
    let login = mock_login(&mut server);
    let first = server
        .mock("GET", "/documents")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("view".into(), "bib".into()),
            Matcher::UrlEncoded("limit".into(), "500".into()),
        ]))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("link", r#"</documents?marker=2>; rel="next""#)
        .with_body(PAGE1)
        .create();
    let second = server
        .mock("GET", "/documents")
        .match_query(Matcher::UrlEncoded("marker".into(), "2".into()))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_body(PAGE2)
        .create();

    let config = config_for(&server);
    command(&config)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ada2020")
                .and(predicate::str::contains("knuth1997"))
                .and(predicate::str::contains("1--5"))
                .and(predicate::str::contains("https://example.org/taocp"))
                .and(predicate::str::contains("https://example.org/notes").not()),
        );

    login.assert();
    first.assert();
    second.assert();
}

#[test]
fn info_level_logs_pipeline_steps() {
    let mut server = Server::new();
    let _login = mock_login(&mut server);
    let _docs = server
        .mock("GET", "/documents")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(PAGE2)
        .create();

    let config = config_for(&server);
    let output = command(&config).arg("--loglevel").arg("info").output().unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8(strip_ansi_escapes::strip(output.stderr)).unwrap();
    for line in [
        "INFO: Performing OAuth authentication",
        "INFO: Downloading bibtex",
        "INFO: Cleaning bibtex",
    ] {
        assert!(stderr.contains(line), "missing {line:?} in stderr=\n{stderr}");
    }
    assert!(!stderr.contains("hunter2"), "password leaked to stderr");
}

#[test]
fn rejected_login_fails_without_output() {
    let mut server = Server::new();
    let _login = server
        .mock("POST", "/oauth/authorize")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>Invalid credentials</html>")
        .create();
    let docs = server
        .mock("GET", "/documents")
        .match_query(Matcher::Any)
        .expect(0)
        .create();

    let config = config_for(&server);
    command(&config)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("OAuth authentication failed"));

    docs.assert();
}

#[test]
fn missing_first_page_fails() {
    let mut server = Server::new();
    let _login = mock_login(&mut server);
    let _docs = server
        .mock("GET", "/documents")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(r#"{"message": "Not found"}"#)
        .create();

    let config = config_for(&server);
    command(&config)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("could not fetch first page (HTTP 404): Not found"));
}

#[test]
fn unreadable_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("mendeley-bib")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("missing.yml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn unknown_log_level_is_a_usage_error() {
    Command::cargo_bin("mendeley-bib")
        .unwrap()
        .arg("--loglevel")
        .arg("loud")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown level"));
}
