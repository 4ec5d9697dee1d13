//! CLI Command Tests
//!
//! Tests for all CLI commands with mocked backends.
//! Covers JSON output format, exit codes, and input validation.

// =============================================================================
// CLI Argument Parsing Tests
// =============================================================================

mod cli_parsing {
    use clap::Parser;
    use anistream::cli::{Cli, Command, DeviceChoice, PlaybackChoice, SortChoice};
    use anistream::models::PlaybackType;
    use anistream::stream::catalog::{SortDirection, SortField, SortState};

    #[test]
    fn test_search_command_basic() {
        let cli = Cli::parse_from(["anistream", "search", "frieren"]);
        match cli.command {
            Command::Search(cmd) => {
                assert_eq!(cmd.query, "frieren");
                assert_eq!(cmd.limit, 20); // default
                assert!(cmd.sort.is_none());
                assert!(cmd.sort_state().is_unset());
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_search_with_filters() {
        let cli = Cli::parse_from([
            "anistream",
            "search",
            "frieren",
            "-e",
            "3",
            "-r",
            "1080p",
            "--smart",
            "-m",
            "154587",
            "--best",
            "--sort",
            "seeds",
        ]);
        match cli.command {
            Command::Search(cmd) => {
                assert_eq!(cmd.episode, Some(3));
                assert_eq!(cmd.resolution.as_deref(), Some("1080p"));
                assert!(cmd.smart && cmd.best);
                assert_eq!(cmd.media_id, Some(154587));
                assert_eq!(cmd.sort, Some(SortChoice::Seeders));
                assert_eq!(
                    cmd.sort_state(),
                    SortState::by(SortField::Seeders, SortDirection::Desc)
                );
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_asc_requires_sort() {
        let result = Cli::try_parse_from(["anistream", "search", "frieren", "--asc"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_stream_command_auto() {
        let cli = Cli::parse_from(["anistream", "stream", "-m", "154587", "-e", "3", "--auto"]);
        match cli.command {
            Command::Stream(cmd) => {
                assert_eq!(cmd.media_id, 154587);
                assert_eq!(cmd.episode, 3);
                assert!(cmd.auto);
                assert_eq!(cmd.client_id, "cli"); // default
                assert!(cmd.playback.is_none());
            }
            _ => panic!("Expected Stream command"),
        }
    }

    #[test]
    fn test_stream_magnet_conflicts_with_pick() {
        let result = Cli::try_parse_from([
            "anistream",
            "stream",
            "-m",
            "1",
            "-e",
            "1",
            "--magnet",
            "magnet:?xt=urn:btih:abc",
            "--pick",
            "2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_stream_requires_media_and_episode() {
        assert!(Cli::try_parse_from(["anistream", "stream", "-e", "1"]).is_err());
        assert!(Cli::try_parse_from(["anistream", "stream", "-m", "1"]).is_err());
    }

    #[test]
    fn test_playback_choices() {
        assert_eq!(PlaybackType::from(PlaybackChoice::Native), PlaybackType::NativePlayer);
        assert_eq!(
            PlaybackType::from(PlaybackChoice::External),
            PlaybackType::ExternalPlayerLink
        );
        assert_eq!(PlaybackType::from(PlaybackChoice::None), PlaybackType::NoneAndAwait);
    }

    #[test]
    fn test_link_command() {
        let cli = Cli::parse_from([
            "anistream",
            "link",
            "http://127.0.0.1:43211/s",
            "-t",
            "vlc://{url}",
            "--device",
            "mobile",
        ]);
        match cli.command {
            Command::Link(cmd) => {
                assert_eq!(cmd.template.as_deref(), Some("vlc://{url}"));
                assert_eq!(cmd.device, Some(DeviceChoice::Mobile));
                assert_eq!(cmd.playback, PlaybackChoice::External); // default
                assert_eq!(cmd.episode, 1);
            }
            _ => panic!("Expected Link command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["anistream", "-j", "-q", "-v", "search", "x"]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert!(cli.should_json());
        assert_eq!(cli.log_filter(), "anistream=debug");
    }

    #[test]
    fn test_command_aliases() {
        let cli = Cli::parse_from(["anistream", "s", "frieren"]);
        assert!(matches!(cli.command, Command::Search(_)));

        let cli = Cli::parse_from(["anistream", "st", "-m", "1", "-e", "1", "--auto"]);
        assert!(matches!(cli.command, Command::Stream(_)));
    }
}

// =============================================================================
// JSON Output Tests
// =============================================================================

mod json_output {
    use anistream::cli::{ExitCode, JsonOutput};
    use anistream::error::ErrorClass;

    #[test]
    fn test_json_output_success() {
        let output = JsonOutput::success("test data");
        let json = serde_json::to_string(&output).unwrap();

        assert!(json.contains("\"data\":\"test data\""));
        assert!(!json.contains("error"));
        assert!(!json.contains("exit_code")); // Should be omitted when 0
    }

    #[test]
    fn test_json_output_error_with_class() {
        let output = JsonOutput::<()>::error_msg(
            "Pick a file manually",
            Some(ErrorClass::FileSelectionRequired),
            ExitCode::SelectionRequired,
        );
        let json = serde_json::to_string(&output).unwrap();

        assert!(json.contains("\"error\":\"Pick a file manually\""));
        assert!(json.contains("\"error_class\":\"file-selection-required\""));
        assert!(json.contains("\"exit_code\":6"));
        assert!(!json.contains("\"data\""));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::NetworkError), 3);
        assert_eq!(i32::from(ExitCode::StreamFailed), 5);
        assert_eq!(i32::from(ExitCode::Cancelled), 130);
        assert_eq!(ExitCode::from(ErrorClass::EngineFailure), ExitCode::StreamFailed);
        assert_eq!(ExitCode::from(ErrorClass::ConflictingSelection), ExitCode::InvalidArgs);
        assert_eq!(ExitCode::from(ErrorClass::EpisodeNotInBatch), ExitCode::SelectionRequired);
    }
}

// =============================================================================
// Command Handler Tests (with mockito)
// =============================================================================

mod handlers {
    use clap::Parser;
    use mockito::Server;

    use anistream::cli::{Cli, Command, ExitCode, Output};
    use anistream::commands;
    use anistream::config::Config;

    fn quiet_json() -> Output {
        Output {
            json: true,
            quiet: true,
        }
    }

    fn config_for(url: String) -> Config {
        Config {
            server_url: url,
            poll_interval_ms: 10,
            ..Config::default()
        }
    }

    fn parse(args: &[&str]) -> Command {
        let mut argv = vec!["anistream"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).command
    }

    #[tokio::test]
    async fn test_search_no_results() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/torrent/search")
            .with_status(200)
            .with_body(r#"{"torrents": []}"#)
            .create_async()
            .await;

        let Command::Search(cmd) = parse(&["search", "nothing"]) else {
            unreachable!()
        };
        let code = commands::search_cmd(cmd, &config_for(server.url()), &quiet_json()).await;
        assert_eq!(code, ExitCode::NoSources);
    }

    #[tokio::test]
    async fn test_search_backend_down() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/torrent/search")
            .with_status(502)
            .create_async()
            .await;

        let Command::Search(cmd) = parse(&["search", "frieren"]) else {
            unreachable!()
        };
        let code = commands::search_cmd(cmd, &config_for(server.url()), &quiet_json()).await;
        assert_eq!(code, ExitCode::NetworkError);
    }

    #[tokio::test]
    async fn test_search_best_without_smart() {
        let Command::Search(cmd) = parse(&["search", "frieren", "--best"]) else {
            unreachable!()
        };
        let config = config_for("http://127.0.0.1:9".to_string());
        let code = commands::search_cmd(cmd, &config, &quiet_json()).await;
        assert_eq!(code, ExitCode::InvalidArgs);
    }

    #[tokio::test]
    async fn test_search_filters_resolution() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/torrent/search")
            .with_status(200)
            .with_body(
                r#"{"torrents": [
                    {"name": "a", "link": "l1", "infoHash": "a", "resolution": "720p", "seeders": 5},
                    {"name": "b", "link": "l2", "infoHash": "b", "resolution": "1080p", "seeders": 9}
                ]}"#,
            )
            .create_async()
            .await;

        let Command::Search(cmd) = parse(&["search", "x", "-r", "2160p"]) else {
            unreachable!()
        };
        let code = commands::search_cmd(cmd, &config_for(server.url()), &quiet_json()).await;
        assert_eq!(code, ExitCode::NoSources);

        let Command::Search(cmd) = parse(&["search", "x", "-r", "1080p"]) else {
            unreachable!()
        };
        let code = commands::search_cmd(cmd, &config_for(server.url()), &quiet_json()).await;
        assert_eq!(code, ExitCode::Success);
    }

    #[tokio::test]
    async fn test_stream_auto_until_ready() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/torrentstream/downloads")
            .with_status(200)
            .with_body(r#"{"handle": "h-1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/torrentstream/downloads/h-1")
            .with_status(200)
            .with_body(r#"{"status": "ready", "streamUrl": "http://127.0.0.1:43211/stream/h-1"}"#)
            .create_async()
            .await;

        let Command::Stream(cmd) = parse(&["stream", "-m", "154587", "-e", "3", "--auto"]) else {
            unreachable!()
        };
        let code = commands::stream_cmd(cmd, &config_for(server.url()), &quiet_json()).await;
        assert_eq!(code, ExitCode::Success);
    }

    #[tokio::test]
    async fn test_stream_engine_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/torrentstream/downloads")
            .with_status(200)
            .with_body(r#"{"handle": "h-2"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/torrentstream/downloads/h-2")
            .with_status(200)
            .with_body(r#"{"status": "failed", "message": "no peers"}"#)
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v1/torrentstream/downloads/h-2")
            .with_status(204)
            .create_async()
            .await;

        let Command::Stream(cmd) = parse(&["stream", "-m", "1", "-e", "1", "--auto"]) else {
            unreachable!()
        };
        let code = commands::stream_cmd(cmd, &config_for(server.url()), &quiet_json()).await;
        assert_eq!(code, ExitCode::StreamFailed);
    }

    #[tokio::test]
    async fn test_stream_without_source() {
        let Command::Stream(cmd) = parse(&["stream", "-m", "1", "-e", "1"]) else {
            unreachable!()
        };
        let config = config_for("http://127.0.0.1:9".to_string());
        let code = commands::stream_cmd(cmd, &config, &quiet_json()).await;
        assert_eq!(code, ExitCode::InvalidArgs);
    }

    #[tokio::test]
    async fn test_stream_invalid_magnet() {
        let Command::Stream(cmd) = parse(&["stream", "-m", "1", "-e", "1", "--magnet", "nope"]) else {
            unreachable!()
        };
        let config = config_for("http://127.0.0.1:9".to_string());
        let code = commands::stream_cmd(cmd, &config, &quiet_json()).await;
        assert_eq!(code, ExitCode::InvalidArgs);
    }

    #[tokio::test]
    async fn test_link_command() {
        let Command::Link(cmd) = parse(&[
            "link",
            "http://127.0.0.1:43211/s",
            "-t",
            "vlc://{url}",
            "--hostname",
            "192.168.1.5",
        ]) else {
            unreachable!()
        };
        let code = commands::link_cmd(cmd, &Config::default(), &quiet_json()).await;
        assert_eq!(code, ExitCode::Success);

        let Command::Link(cmd) = parse(&["link", "http://127.0.0.1:43211/s", "-t", "vlc://{file}"]) else {
            unreachable!()
        };
        let code = commands::link_cmd(cmd, &Config::default(), &quiet_json()).await;
        assert_eq!(code, ExitCode::InvalidArgs);
    }
}
