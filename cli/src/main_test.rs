use super::*;
use clap::CommandFactory;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("tracker").chain(args.iter().copied())).unwrap()
}

#[test]
fn command_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn explicit_flags_override_defaults() {
    let cli = parse(&["--base-url", "https://tracker.example/api/v1", "--token-file", "/tmp/tok", "ping"]);
    assert_eq!(cli.base_url, "https://tracker.example/api/v1");
    assert_eq!(cli.token_file, PathBuf::from("/tmp/tok"));
    assert!(matches!(cli.command, Command::Ping));
}

#[test]
fn issue_update_parses_wire_enums_case_insensitively() {
    let cli = parse(&["issue", "update", "7", "--status", "in-progress", "--severity", "high"]);
    let Command::Issue(IssueCommand {
        command: IssueSubcommand::Update { issue_id, status, severity, title, .. },
    }) = cli.command
    else {
        panic!("expected issue update");
    };
    assert_eq!(issue_id, 7);
    assert_eq!(status, Some(IssueStatus::InProgress));
    assert_eq!(severity, Some(Severity::High));
    assert_eq!(title, None);
}

#[test]
fn unknown_role_is_rejected() {
    let result = Cli::try_parse_from(["tracker", "register", "--email", "a@b.com", "--password", "pw", "--role", "owner"]);
    assert!(result.is_err());
}

#[test]
fn watch_refetch_flag() {
    assert!(matches!(parse(&["watch", "--refetch"]).command, Command::Watch { refetch: true }));
    assert!(matches!(parse(&["watch"]).command, Command::Watch { refetch: false }));
}

#[test]
fn page_only_when_requested() {
    assert_eq!(page_from(None, None), None);
    assert_eq!(page_from(None, Some(5)), Some(Page { skip: 0, limit: 5 }));
    assert_eq!(page_from(Some(10), None), Some(Page { skip: 10, limit: 100 }));
}

#[tokio::test]
async fn failing_command_still_returns_through_run() {
    let token_file = std::env::temp_dir().join(format!("tracker-cli-no-token-{}", std::process::id()));
    let _ = std::fs::remove_file(&token_file);
    let cli = parse(&[
        "--base-url",
        "http://127.0.0.1:9/api/v1",
        "--token-file",
        token_file.to_str().unwrap(),
        "whoami",
    ]);

    assert!(matches!(run(cli).await, Err(CliError::NotLoggedIn)));
}

#[tokio::test]
async fn protected_command_without_token_fails_before_network() {
    let config = ClientConfig::new("http://127.0.0.1:9/api/v1").unwrap();
    let token_file = std::env::temp_dir().join(format!("tracker-cli-empty-{}", std::process::id()));
    let _ = std::fs::remove_file(&token_file);
    let client = TrackerClient::new(config, FileTokenStorage::new(token_file), None).unwrap();

    let command = parse(&["issue", "list"]).command;
    let err = dispatch(&client, command).await.unwrap_err();
    assert!(matches!(err, CliError::Client(ClientError::AuthRequired)));

    client.shutdown().await;
    assert!(!client.realtime().is_connected());
}
