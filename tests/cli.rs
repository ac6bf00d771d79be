mod common;

use assert_cmd::Command;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use predicates::prelude::*;
use std::fs::write;
use std::net::SocketAddr;
use tempfile::{tempdir, NamedTempFile};

const FAKE_AUDIO: &[u8] = b"ID3\x04\x00fake-mp3";

/// Serves a seven-paragraph book at /book.docx and a fake speech endpoint at /tts.
async fn book_and_speech_server() -> SocketAddr {
    let router = Router::new()
        .route("/book.docx", get(|| async { common::docx_with_paragraphs(7) }))
        .route("/tts", post(|| async { FAKE_AUDIO.to_vec() }));
    common::serve(router).await
}

fn config_pointing_at(addr: SocketAddr, paragraphs_per_chunk: usize) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        format!(
            "speech:\n  endpoint: \"http://{addr}/tts\"\nconvert:\n  paragraphs_per_chunk: {paragraphs_per_chunk}\n"
        ),
    )
    .expect("Writing temp config failed");
    config
}

fn audible_book() -> Command {
    let mut cmd = Command::cargo_bin("audible-book").expect("Binary exists");
    cmd.env_remove("AZURE_SPEECH_KEY").env_remove("AZURE_SPEECH_REGION");
    cmd
}

#[test]
fn help_lists_the_commands() {
    audible_book()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("extract")
                .and(predicate::str::contains("convert"))
                .and(predicate::str::contains("convert-split")),
        );
}

#[test]
fn invalid_url_is_rejected() {
    audible_book()
        .args(["extract", "--url", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid document URL"));
}

#[test]
fn convert_without_api_key_fails_before_downloading() {
    let out = tempdir().unwrap();
    audible_book()
        .args(["convert", "--url", "http://127.0.0.1:9/book.docx", "--output"])
        .arg(out.path().join("book.mp3"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("speech client"));
    assert!(!out.path().join("book.mp3").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn extract_prints_normalized_text() {
    let addr = book_and_speech_server().await;
    let url = format!("http://{addr}/book.docx");

    let assert = tokio::task::spawn_blocking(move || {
        audible_book().args(["extract", "--url", &url]).assert()
    })
    .await
    .unwrap();

    let expected: String = (1..=7).map(|i| format!("Paragraph {i} \n")).collect();
    assert.success().stdout(predicate::str::diff(expected));
}

#[tokio::test(flavor = "multi_thread")]
async fn extract_honours_download_settings_from_config() {
    let router = Router::new().route(
        "/book.docx",
        get(|headers: HeaderMap| async move {
            let agent = headers.get("user-agent").and_then(|v| v.to_str().ok());
            if agent == Some("book-reader/2.0") {
                Ok(common::docx_with_paragraphs(2))
            } else {
                Err(StatusCode::FORBIDDEN)
            }
        }),
    );
    let addr = common::serve(router).await;
    let url = format!("http://{addr}/book.docx");
    let config = NamedTempFile::new().unwrap();
    write(config.path(), "download:\n  user_agent: book-reader/2.0\n").unwrap();

    let default_agent_url = url.clone();
    let refused = tokio::task::spawn_blocking(move || {
        audible_book()
            .args(["extract", "--url", &default_agent_url])
            .assert()
    })
    .await
    .unwrap();
    refused.failure().stderr(predicate::str::contains("403"));

    let assert = tokio::task::spawn_blocking(move || {
        audible_book()
            .args(["extract", "--url", &url, "--config"])
            .arg(config.path())
            .assert()
    })
    .await
    .unwrap();
    assert
        .success()
        .stdout(predicate::str::diff("Paragraph 1 \nParagraph 2 \n"))
        .stderr(predicate::str::contains("AZURE_SPEECH_KEY").not());
}

#[tokio::test(flavor = "multi_thread")]
async fn convert_split_writes_one_file_per_chunk() {
    let addr = book_and_speech_server().await;
    let url = format!("http://{addr}/book.docx");
    let config = config_pointing_at(addr, 3);
    let out = tempdir().unwrap();
    let out_path = out.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        audible_book()
            .args(["convert-split", "--url", &url, "--output-dir"])
            .arg(&out_path)
            .arg("--config")
            .arg(config.path())
            .env("AZURE_SPEECH_KEY", "test-key")
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(
            predicate::str::contains("audio_sha256")
                .and(predicate::str::contains("\"paragraphs\": 7")),
        );
    for name in ["chunk_001.mp3", "chunk_002.mp3", "chunk_003.mp3"] {
        let bytes = std::fs::read(out.path().join(name)).expect("chunk file written");
        assert_eq!(bytes, FAKE_AUDIO);
    }
    assert!(!out.path().join("chunk_004.mp3").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn convert_writes_a_single_audio_file() {
    let addr = book_and_speech_server().await;
    let url = format!("http://{addr}/book.docx");
    let config = config_pointing_at(addr, 20);
    let out = tempdir().unwrap();
    let output = out.path().join("nested").join("book.mp3");
    let output_arg = output.clone();

    let assert = tokio::task::spawn_blocking(move || {
        audible_book()
            .args(["convert", "--url", &url, "--output"])
            .arg(&output_arg)
            .arg("--config")
            .arg(config.path())
            .env("AZURE_SPEECH_KEY", "test-key")
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("\"audio_bytes\": 13"));
    assert_eq!(std::fs::read(&output).unwrap(), FAKE_AUDIO);
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use audible_book::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Extract {
            url: "not a url".to_string(),
            config: None,
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
