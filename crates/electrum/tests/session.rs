//! Session behaviour against an in-process fake server.

use electrum::{ElectrumError, Session, SessionConfig, SessionState};
use futures::future::join_all;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::time::Instant;

struct FakeServer {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeServer {
    async fn next_request(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read request")
            .expect("client hung up");
        serde_json::from_str(&line).expect("request is json")
    }

    async fn send(&mut self, frame: Value) {
        let mut line = serde_json::to_vec(&frame).unwrap();
        line.push(b'\n');
        self.writer.write_all(&line).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn reply(&mut self, id: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }
}

fn quiet_config() -> SessionConfig {
    SessionConfig {
        request_timeout: Duration::from_secs(5),
        ping_interval: None,
        subscription_buffer: 16,
    }
}

async fn connected(config: SessionConfig) -> (Session, FakeServer) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let session = Session::new(config);
    session.connect_stream(client).await.unwrap();

    let (read_half, writer) = tokio::io::split(server);
    let fake = FakeServer {
        lines: BufReader::new(read_half).lines(),
        writer,
    };
    (session, fake)
}

#[tokio::test]
async fn test_concurrent_calls_answered_in_reverse_order() {
    let (session, mut server) = connected(quiet_config()).await;

    let calls = (0..10u64).map(|n| {
        let session = session.clone();
        tokio::spawn(async move { (n, session.call::<u64>("test.echo", vec![json!(n)]).await) })
    });
    let calls: Vec<_> = calls.collect();

    let mut requests = Vec::new();
    for _ in 0..10 {
        requests.push(server.next_request().await);
    }
    for request in requests.iter().rev() {
        let n = request["params"][0].as_u64().unwrap();
        server.reply(&request["id"], json!(n * 100)).await;
    }

    for outcome in join_all(calls).await {
        let (n, result) = outcome.unwrap();
        assert_eq!(result, Ok(n * 100));
    }
    assert_eq!(session.outstanding_calls(), 0);
}

#[tokio::test]
async fn test_request_ids_are_unique_and_increasing() {
    let (session, mut server) = connected(quiet_config()).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let caller = {
            let session = session.clone();
            tokio::spawn(async move { session.ping().await })
        };
        let request = server.next_request().await;
        assert_eq!(request["method"], "server.ping");
        seen.push(request["id"].as_u64().unwrap());
        server.reply(&request["id"], Value::Null).await;
        caller.await.unwrap().unwrap();
    }

    assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_reply_is_dropped() {
    let config = SessionConfig {
        request_timeout: Duration::from_millis(200),
        ..quiet_config()
    };
    let (session, mut server) = connected(config).await;

    let slow = {
        let session = session.clone();
        tokio::spawn(async move { session.call::<String>("server.banner", vec![]).await })
    };
    let request = server.next_request().await;

    let result = slow.await.unwrap();
    assert!(matches!(result, Err(ElectrumError::Timeout { .. })));
    assert_eq!(session.outstanding_calls(), 0);

    // late reply for the abandoned id must not disturb the next call
    server.reply(&request["id"], json!("too late")).await;

    let next = {
        let session = session.clone();
        tokio::spawn(async move { session.call::<String>("server.banner", vec![]).await })
    };
    let request = server.next_request().await;
    server.reply(&request["id"], json!("welcome")).await;

    assert_eq!(next.await.unwrap(), Ok("welcome".to_string()));
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_times_out() {
    let config = SessionConfig {
        request_timeout: Duration::from_millis(200),
        ..quiet_config()
    };
    // the server end is never read, so a large request fills the pipe
    let (client, _server) = tokio::io::duplex(64);
    let session = Session::new(config);
    session.connect_stream(client).await.unwrap();

    let started = Instant::now();
    let big = "x".repeat(4096);
    let result = tokio::time::timeout(
        Duration::from_secs(3),
        session.call_raw("server.banner", vec![json!(big)]),
    )
    .await
    .expect("call must not outlive its deadline");

    assert!(matches!(result, Err(ElectrumError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(session.outstanding_calls(), 0);

    // a half-written line breaks framing, so the session is gone
    assert_eq!(session.state(), SessionState::Closed);
    tokio::time::timeout(Duration::from_secs(1), session.close())
        .await
        .expect("close must not wait on the stalled writer");
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_pings_until_closed() {
    let config = SessionConfig {
        request_timeout: Duration::from_millis(300),
        ping_interval: Some(Duration::from_secs(1)),
        ..quiet_config()
    };
    let started = Instant::now();
    let (session, mut server) = connected(config).await;

    // record every request and never answer
    let recorder = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(Some(line)) = server.lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let method = request["method"].as_str().unwrap().to_string();
            seen.push((started.elapsed(), method));
        }
        seen
    });

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.outstanding_calls(), 0);

    session.close().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let seen = recorder.await.unwrap();
    assert_eq!(seen.len(), 3);
    for (n, (at, method)) in seen.iter().enumerate() {
        assert_eq!(method, "server.ping");
        assert_eq!(at.as_secs(), n as u64 + 1);
    }
}

#[tokio::test]
async fn test_push_fans_out_to_every_subscriber() {
    let (session, mut server) = connected(quiet_config()).await;

    let mut first = session.subscribe("blockchain.headers.subscribe").unwrap();
    let mut second = session.subscribe("blockchain.headers.subscribe").unwrap();

    for height in [100, 101] {
        server
            .send(json!({
                "jsonrpc": "2.0",
                "method": "blockchain.headers.subscribe",
                "params": [{"height": height, "hex": "00"}]
            }))
            .await;
    }

    for rx in [&mut first, &mut second] {
        for height in [100, 101] {
            let notification = rx.recv().await.unwrap();
            assert_eq!(notification.method, "blockchain.headers.subscribe");
            assert_eq!(notification.params[0]["height"], height);
        }
    }
}

#[tokio::test]
async fn test_push_without_subscribers_is_ignored() {
    let (session, mut server) = connected(quiet_config()).await;

    server
        .send(json!({
            "jsonrpc": "2.0",
            "method": "blockchain.scripthash.subscribe",
            "params": ["abcd", "status"]
        }))
        .await;

    let caller = {
        let session = session.clone();
        tokio::spawn(async move { session.call::<f64>("blockchain.relayfee", vec![]).await })
    };
    let request = server.next_request().await;
    server.reply(&request["id"], json!(0.25)).await;

    assert_eq!(caller.await.unwrap(), Ok(0.25));
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_full_subscriber_does_not_stall_reader() {
    let config = SessionConfig {
        subscription_buffer: 1,
        ..quiet_config()
    };
    let (session, mut server) = connected(config).await;
    let mut slow = session.subscribe("blockchain.headers.subscribe").unwrap();

    for height in 0..3 {
        server
            .send(json!({"method": "blockchain.headers.subscribe", "params": [{"height": height}]}))
            .await;
    }

    let caller = {
        let session = session.clone();
        tokio::spawn(async move { session.ping().await })
    };
    let request = server.next_request().await;
    server.reply(&request["id"], Value::Null).await;
    caller.await.unwrap().unwrap();

    let kept = slow.recv().await.unwrap();
    assert_eq!(kept.params[0]["height"], 0);
    assert!(slow.try_recv().is_err());
}

#[tokio::test]
async fn test_remote_error_is_scoped_to_its_call() {
    let (session, mut server) = connected(quiet_config()).await;

    let caller = {
        let session = session.clone();
        tokio::spawn(async move { session.call_raw("no.such.method", vec![]).await })
    };
    let request = server.next_request().await;
    server
        .send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": -32601, "message": "unknown method"}
        }))
        .await;

    assert_eq!(
        caller.await.unwrap(),
        Err(ElectrumError::RemoteError {
            code: -32601,
            message: "unknown method".to_string()
        })
    );
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_undecodable_result_is_scoped_to_its_call() {
    let (session, mut server) = connected(quiet_config()).await;

    let caller = {
        let session = session.clone();
        tokio::spawn(async move { session.call::<u64>("blockchain.estimatefee", vec![json!(6)]).await })
    };
    let request = server.next_request().await;
    server.reply(&request["id"], json!("not a number")).await;
    assert!(matches!(
        caller.await.unwrap(),
        Err(ElectrumError::Decode { .. })
    ));

    // garbage line is dropped, the session carries on
    server.writer.write_all(b"{oops\n").await.unwrap();

    let caller = {
        let session = session.clone();
        tokio::spawn(async move { session.call::<u64>("blockchain.estimatefee", vec![json!(6)]).await })
    };
    let request = server.next_request().await;
    server.reply(&request["id"], json!(12)).await;
    assert_eq!(caller.await.unwrap(), Ok(12));
}

#[tokio::test]
async fn test_peer_hangup_releases_everyone() {
    let (session, mut server) = connected(quiet_config()).await;
    let mut subscriber = session.subscribe("blockchain.headers.subscribe").unwrap();

    let waiting = {
        let session = session.clone();
        tokio::spawn(async move { session.call_raw("server.banner", vec![]).await })
    };
    let _ = server.next_request().await;
    drop(server);

    assert_eq!(waiting.await.unwrap(), Err(ElectrumError::Shutdown));
    assert!(subscriber.recv().await.is_none());
    assert!(matches!(
        session.closed().await,
        ElectrumError::Transport { .. }
    ));
    assert_eq!(session.state(), SessionState::Closed);

    assert_eq!(
        session.call_raw("server.ping", vec![]).await,
        Err(ElectrumError::Shutdown)
    );
    assert_eq!(session.outstanding_calls(), 0);
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let (session, _server) = connected(quiet_config()).await;
    let (another, _other_end) = tokio::io::duplex(1024);

    assert_eq!(
        session.connect_stream(another).await,
        Err(ElectrumError::AlreadyConnected)
    );
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_client_close() {
    let (session, _server) = connected(quiet_config()).await;
    session.close().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.closed().await, ElectrumError::Shutdown);
    assert!(session.subscribe("blockchain.headers.subscribe").is_err());
}

#[tokio::test]
async fn test_connect_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let request: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(request["method"], "server.version");
        let reply = json!({"id": request["id"], "result": ["ElectrumX 1.16.0", "1.4"]});
        writer
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .unwrap();
        // keep the socket open until the client is done
        let _ = lines.next_line().await;
    });

    let session = Session::new(quiet_config());
    session.connect(&addr, None).await.unwrap();
    assert_eq!(
        session.connect(&addr, None).await,
        Err(ElectrumError::AlreadyConnected)
    );

    let (software, protocol) = session
        .server_version(electrum::CLIENT_NAME, electrum::PROTOCOL_VERSION)
        .await
        .unwrap();
    assert_eq!(software, "ElectrumX 1.16.0");
    assert_eq!(protocol, "1.4");

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_failed_connect_returns_to_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let session = Session::new(quiet_config());
    assert!(matches!(
        session.connect(&addr, None).await,
        Err(ElectrumError::Connect { .. })
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
}
