use super::*;

use std::path::Path;

use cmdrun_common::{CommandDefinition, EmbeddedFile, FileId};
use cmdrun_pty::scripted::ScriptedSpawner;
use cmdrun_pty::PtySpawner;
use cmdrun_runner::RunnerConfig;
use cmdrun_store::MemoryStore;
use futures_util::SinkExt;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;

const WAIT: Duration = Duration::from_secs(10);

type Client = WebSocketStream<DuplexStream>;

#[derive(Debug, Default)]
struct Transcript {
    data: Vec<String>,
    close: Option<(u16, String)>,
}

impl Transcript {
    fn output(&self) -> String {
        self.data.concat()
    }

    fn close_code(&self) -> Option<u16> {
        self.close.as_ref().map(|(code, _)| *code)
    }
}

fn fast_config() -> ProtocolConfig {
    ProtocolConfig {
        flush_interval: Duration::from_millis(50),
        handshake_timeout: Duration::from_secs(5),
    }
}

async fn store_with_command(command: &str, dir: &Path) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_command(CommandDefinition::new(CommandId(1), "test", command).with_dir(dir))
        .await;
    store
}

fn runner_for(dir: &Path, store: &Arc<MemoryStore>, spawner: impl PtySpawner + 'static) -> SessionRunner {
    let config = RunnerConfig {
        default_dir: dir.to_path_buf(),
        env: Vec::new(),
        input_queue_capacity: 8,
        output_queue_capacity: 256,
    };
    SessionRunner::new(config, store.clone(), store.clone(), Arc::new(spawner))
}

/// Connect a client to a handler running over an in-memory duplex pipe.
async fn connect(
    route: CommandRoute,
    runner: SessionRunner,
    config: ProtocolConfig,
) -> (Client, JoinHandle<()>) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let handler = tokio::spawn(handle_connection(
        server,
        route,
        runner,
        config,
        ConnectionId::new(),
    ));
    (client, handler)
}

async fn send_json(client: &mut Client, json: &str) {
    client
        .send(Message::Text(json.to_string().into()))
        .await
        .unwrap();
}

async fn send_options(client: &mut Client) {
    send_json(
        client,
        r#"{"message-type":"options","options":{"rows":30,"cols":120}}"#,
    )
    .await;
}

async fn read_transcript(client: &mut Client) -> Transcript {
    let mut transcript = Transcript::default();
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let message: OutboundMessage = serde_json::from_str(&text).unwrap();
                    assert_eq!(message.message_type, "data");
                    transcript.data.push(message.data);
                }
                Some(Ok(Message::Close(frame))) => {
                    transcript.close =
                        frame.map(|f| (u16::from(f.code), f.reason.as_str().to_string()));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            }
        }
    };
    tokio::time::timeout(WAIT, read).await.expect("no close frame");
    transcript
}

fn normalize(raw: &str) -> String {
    strip_ansi_escapes::strip_str(raw)
        .replace("\r\n", "\r")
        .replace('\n', "\r")
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn bad_command_id_closes_with_1003() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("echo hi", dir.path()).await;
    let spawner = ScriptedSpawner::new("hi");
    let runner = runner_for(dir.path(), &store, spawner.clone());

    let (mut client, handler) =
        connect(CommandRoute::BadId("abc".into()), runner, fast_config()).await;
    let transcript = read_transcript(&mut client).await;

    assert_eq!(transcript.close, Some((1003, "bad command id".into())));
    assert!(transcript.data.is_empty());
    assert_eq!(spawner.spawn_count(), 0);
    drop(client);
    handler.await.unwrap();
}

#[tokio::test]
async fn first_message_must_be_options() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("echo hi", dir.path()).await;
    let spawner = ScriptedSpawner::new("hi");
    let runner = runner_for(dir.path(), &store, spawner.clone());

    let (mut client, _handler) =
        connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_json(&mut client, r#"{"message-type":"terminal-input","data":"ls"}"#).await;
    let transcript = read_transcript(&mut client).await;

    assert_eq!(
        transcript.close,
        Some((1003, "first message must be options".into()))
    );
    assert!(transcript.data.is_empty());
    assert_eq!(spawner.spawn_count(), 0);
}

#[tokio::test]
async fn malformed_or_binary_first_frame_is_a_violation() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("echo hi", dir.path()).await;
    let spawner = ScriptedSpawner::new("hi");

    let runner = runner_for(dir.path(), &store, spawner.clone());
    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_json(&mut client, "{options").await;
    assert_eq!(read_transcript(&mut client).await.close_code(), Some(1003));

    let runner = runner_for(dir.path(), &store, spawner.clone());
    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    client
        .send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();
    assert_eq!(read_transcript(&mut client).await.close_code(), Some(1003));

    assert_eq!(spawner.spawn_count(), 0);
}

#[tokio::test]
async fn silent_client_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("echo hi", dir.path()).await;
    let spawner = ScriptedSpawner::new("hi");
    let runner = runner_for(dir.path(), &store, spawner.clone());
    let config = ProtocolConfig {
        handshake_timeout: Duration::from_millis(100),
        ..fast_config()
    };

    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, config).await;
    let transcript = read_transcript(&mut client).await;
    assert_eq!(transcript.close, Some((1003, "options timeout".into())));
    assert_eq!(spawner.spawn_count(), 0);
}

#[tokio::test]
async fn empty_command_closes_with_1002() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("", dir.path()).await;
    let spawner = ScriptedSpawner::new("hi");
    let runner = runner_for(dir.path(), &store, spawner.clone());

    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_options(&mut client).await;
    let transcript = read_transcript(&mut client).await;

    assert_eq!(transcript.close, Some((1002, "empty command".into())));
    assert!(transcript.data.is_empty());
    assert_eq!(spawner.spawn_count(), 0);
}

#[tokio::test]
async fn unknown_command_closes_with_1011() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("echo hi", dir.path()).await;
    let runner = runner_for(dir.path(), &store, ScriptedSpawner::new(""));

    let (mut client, _) = connect(CommandRoute::Command(CommandId(2)), runner, fast_config()).await;
    send_options(&mut client).await;
    assert_eq!(read_transcript(&mut client).await.close_code(), Some(1011));
}

#[tokio::test]
async fn spawn_failure_closes_with_1011() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("echo hi", dir.path()).await;
    let runner = runner_for(dir.path(), &store, ScriptedSpawner::failing());

    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_options(&mut client).await;
    let transcript = read_transcript(&mut client).await;
    assert_eq!(
        transcript.close,
        Some((1011, "unexpected error while starting command".into()))
    );
}

#[tokio::test]
async fn burst_is_delivered_as_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("burst", dir.path()).await;
    let runner = runner_for(dir.path(), &store, ScriptedSpawner::new("abcdefghij"));
    let config = ProtocolConfig {
        flush_interval: Duration::from_millis(250),
        ..fast_config()
    };

    let (mut client, handler) = connect(CommandRoute::Command(CommandId(1)), runner, config).await;
    send_options(&mut client).await;
    let transcript = read_transcript(&mut client).await;

    assert_eq!(transcript.data, vec!["abcdefghij".to_string()]);
    assert_eq!(
        transcript.close,
        Some((1000, "command run finished".into()))
    );
    drop(client);
    tokio::time::timeout(WAIT, handler).await.unwrap().unwrap();
}

#[tokio::test]
async fn output_spread_over_one_interval_is_batched() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("slow", dir.path()).await;
    let spawner = ScriptedSpawner::new("abcdefghij").paced(Duration::from_millis(5));
    let runner = runner_for(dir.path(), &store, spawner);
    let config = ProtocolConfig {
        flush_interval: Duration::from_millis(500),
        ..fast_config()
    };

    let (mut client, handler) = connect(CommandRoute::Command(CommandId(1)), runner, config).await;
    send_options(&mut client).await;
    let transcript = read_transcript(&mut client).await;

    assert_eq!(transcript.data, vec!["abcdefghij".to_string()]);
    assert_eq!(transcript.close_code(), Some(1000));
    drop(client);
    tokio::time::timeout(WAIT, handler).await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_data_write_closes_as_internal_error() {
    let (server_io, client_io) = tokio::io::duplex(1024);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    drop(client_io);
    let (sink, _stream) = server.split();
    let writer = Arc::new(FrameWriter::new(sink));
    let buffer = Arc::new(OutputBuffer::default());
    buffer.append("lost");
    let cancel = CancellationToken::new();

    tokio::time::timeout(
        WAIT,
        flush_output(
            writer.clone(),
            buffer,
            Duration::from_millis(10),
            cancel.clone(),
            ConnectionId::new(),
        ),
    )
    .await
    .unwrap();

    assert!(cancel.is_cancelled());
    assert_eq!(writer.closed_with().await, Some(CloseKind::Internal));
    assert!(!writer.close(CloseKind::Finished, "session ended").await);
}

#[tokio::test]
async fn terminal_input_is_forwarded_and_close_kills() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("sh", dir.path()).await;
    let spawner = ScriptedSpawner::new("$ ").hold_open();
    let runner = runner_for(dir.path(), &store, spawner.clone());

    let (mut client, handler) =
        connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_options(&mut client).await;
    send_json(&mut client, r#"{"message-type":"resize","data":"ignored"}"#).await;
    send_json(&mut client, r#"{"message-type":"terminal-input","data":"ls\r"}"#).await;
    wait_for(|| spawner.input_received() == b"ls\r").await;

    client.close(None).await.unwrap();
    tokio::time::timeout(WAIT, handler).await.unwrap().unwrap();
    wait_for(|| spawner.kill_count() == 1).await;
}

#[tokio::test]
async fn binary_frame_mid_session_closes_and_kills() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("sh", dir.path()).await;
    let spawner = ScriptedSpawner::new("").hold_open();
    let runner = runner_for(dir.path(), &store, spawner.clone());

    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_options(&mut client).await;
    wait_for(|| spawner.spawn_count() == 1).await;
    client
        .send(Message::Binary(vec![0u8].into()))
        .await
        .unwrap();

    let transcript = read_transcript(&mut client).await;
    assert_eq!(transcript.close, Some((1003, "expected text message".into())));
    wait_for(|| spawner.kill_count() == 1).await;
}

#[tokio::test]
async fn staged_files_are_gone_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_command("cat greeting.txt", dir.path()).await;
    store
        .attach_file(
            EmbeddedFile {
                id: FileId(1),
                command_id: CommandId(1),
                name: "greeting.txt".into(),
            },
            "hi",
        )
        .await
        .unwrap();
    let runner = runner_for(dir.path(), &store, ScriptedSpawner::new("hi"));

    let (mut client, _) = connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
    send_options(&mut client).await;
    let transcript = read_transcript(&mut client).await;

    assert_eq!(transcript.output(), "hi");
    assert_eq!(transcript.close_code(), Some(1000));
    assert!(!dir.path().join("greeting.txt").exists());
}

#[cfg(unix)]
mod native {
    use super::*;
    use cmdrun_pty::NativePtySpawner;

    #[tokio::test]
    async fn echo_hello_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_command("echo hello", dir.path()).await;
        let runner = runner_for(dir.path(), &store, NativePtySpawner::default());

        let (mut client, _) =
            connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
        send_options(&mut client).await;
        let transcript = read_transcript(&mut client).await;

        assert_eq!(normalize(&transcript.output()), "hello\r");
        assert_eq!(transcript.close_code(), Some(1000));
    }

    #[tokio::test]
    async fn greeting_file_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_command("cat greeting.txt", dir.path()).await;
        store
            .attach_file(
                EmbeddedFile {
                    id: FileId(1),
                    command_id: CommandId(1),
                    name: "greeting.txt".into(),
                },
                "hi",
            )
            .await
            .unwrap();
        let runner = runner_for(dir.path(), &store, NativePtySpawner::default());

        let (mut client, _) =
            connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
        send_options(&mut client).await;
        let transcript = read_transcript(&mut client).await;

        assert_eq!(normalize(&transcript.output()), "hi");
        assert_eq!(transcript.close_code(), Some(1000));
        assert!(!dir.path().join("greeting.txt").exists());
    }

    #[tokio::test]
    async fn interactive_session_over_the_wire() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_command("read name; echo \"hi $name\"", dir.path()).await;
        let runner = runner_for(dir.path(), &store, NativePtySpawner::default());

        let (mut client, _) =
            connect(CommandRoute::Command(CommandId(1)), runner, fast_config()).await;
        send_options(&mut client).await;
        send_json(
            &mut client,
            r#"{"message-type":"terminal-input","data":"ann\r"}"#,
        )
        .await;
        let transcript = read_transcript(&mut client).await;

        assert!(
            normalize(&transcript.output()).contains("hi ann"),
            "output was {:?}",
            transcript.output()
        );
        assert_eq!(transcript.close_code(), Some(1000));
    }
}
