//! Integration tests that spin up a respkv server and talk raw RESP to it.

use respkv::{ErrorReplyStyle, Server, ServerConfig, UnknownCommandPolicy};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_test_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener, config);
    let addr = server.local_addr().unwrap();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(server.run(async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        shutdown: Some(tx),
    }
}

/// Encodes a request as a RESP array of bulk strings.
fn request(args: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Sends `req` and reads exactly `expected.len()` bytes back.
async fn roundtrip(client: &mut TcpStream, req: &[u8], expected: &[u8]) {
    client.write_all(req).await.unwrap();
    let mut buf = vec![0u8; expected.len()];
    timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("reply timed out")
        .unwrap();
    assert_eq!(
        buf,
        expected,
        "got {:?}, want {:?}",
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

#[tokio::test]
async fn test_ping_set_get_scenario() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    roundtrip(&mut client, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;
    roundtrip(
        &mut client,
        b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
        b"+OK\r\n",
    )
    .await;
    roundtrip(
        &mut client,
        b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n",
        b"$3\r\nbar\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_get_missing_key_is_nil() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    roundtrip(&mut client, &request(&[b"GET", b"never-set"]), b"$-1\r\n").await;
}

#[tokio::test]
async fn test_store_is_shared_between_connections() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut writer = TcpStream::connect(server.addr).await.unwrap();
    let mut reader = TcpStream::connect(server.addr).await.unwrap();

    roundtrip(&mut writer, &request(&[b"SET", b"shared", b"yes"]), b"+OK\r\n").await;
    roundtrip(&mut reader, &request(&[b"GET", b"shared"]), b"$3\r\nyes\r\n").await;
}

#[tokio::test]
async fn test_set_px_expiry() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    roundtrip(
        &mut client,
        &request(&[b"SET", b"temp", b"v", b"PX", b"100"]),
        b"+OK\r\n",
    )
    .await;
    roundtrip(&mut client, &request(&[b"GET", b"temp"]), b"$1\r\nv\r\n").await;

    sleep(Duration::from_millis(150)).await;

    roundtrip(&mut client, &request(&[b"GET", b"temp"]), b"$-1\r\n").await;
}

#[tokio::test]
async fn test_echo_binary_safe() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    roundtrip(&mut client, &request(&[b"ECHO", b"hey"]), b"+hey\r\n").await;
    roundtrip(
        &mut client,
        &request(&[b"ECHO", b"a\r\nb\r\n"]),
        b"$6\r\na\r\nb\r\n\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_arity_errors_keep_session_open() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    roundtrip(
        &mut client,
        &request(&[b"SET", b"k"]),
        b"+ERR wrong number of arguments for 'set' command\r\n",
    )
    .await;
    roundtrip(
        &mut client,
        &request(&[b"GET"]),
        b"+ERR wrong number of arguments for 'get' command\r\n",
    )
    .await;
    roundtrip(
        &mut client,
        &request(&[b"ECHO"]),
        b"+ERR wrong number of arguments for 'echo' command\r\n",
    )
    .await;
    roundtrip(&mut client, &request(&[b"PING"]), b"+PONG\r\n").await;
}

#[tokio::test]
async fn test_unknown_command_policies() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();
    roundtrip(&mut client, &request(&[b"DEL", b"k"]), b"+PONG\r\n").await;

    let strict = start_test_server(ServerConfig {
        unknown_command: UnknownCommandPolicy::Error,
        error_replies: ErrorReplyStyle::Error,
        ..ServerConfig::default()
    })
    .await;
    let mut client = TcpStream::connect(strict.addr).await.unwrap();
    roundtrip(
        &mut client,
        &request(&[b"DEL", b"k"]),
        b"-ERR unknown command 'DEL'\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_pipelined_requests() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    let mut batch = request(&[b"SET", b"k1", b"v1"]);
    batch.extend(request(&[b"SET", b"k2", b"v2"]));
    batch.extend(request(&[b"GET", b"k1"]));
    batch.extend(request(&[b"GET", b"k2"]));

    roundtrip(
        &mut client,
        &batch,
        b"+OK\r\n+OK\r\n$2\r\nv1\r\n$2\r\nv2\r\n",
    )
    .await;
}

#[tokio::test]
async fn test_request_delivered_byte_by_byte() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    let req = request(&[b"ECHO", b"x\r\n"]);
    for byte in &req {
        client.write_all(std::slice::from_ref(byte)).await.unwrap();
        client.flush().await.unwrap();
    }

    let mut buf = vec![0u8; 9];
    timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(buf, b"$3\r\nx\r\n\r\n");
}

#[tokio::test]
async fn test_malformed_request_closes_only_that_connection() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut bad = TcpStream::connect(server.addr).await.unwrap();
    let mut good = TcpStream::connect(server.addr).await.unwrap();

    bad.write_all(b"*1\r\n$nope\r\n").await.unwrap();
    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), bad.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    roundtrip(&mut good, &request(&[b"PING"]), b"+PONG\r\n").await;
}

#[tokio::test]
async fn test_concurrent_clients_disjoint_keys() {
    let server = start_test_server(ServerConfig::default()).await;
    let mut tasks = Vec::new();

    for worker in 0..8 {
        let addr = server.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            for i in 0..50 {
                let key = format!("w{}:k{}", worker, i);
                let value = format!("w{}:v{}", worker, i);
                roundtrip(
                    &mut client,
                    &request(&[b"SET", key.as_bytes(), value.as_bytes()]),
                    b"+OK\r\n",
                )
                .await;
                let expected = format!("${}\r\n{}\r\n", value.len(), value);
                roundtrip(
                    &mut client,
                    &request(&[b"GET", key.as_bytes()]),
                    expected.as_bytes(),
                )
                .await;
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_racing_set_and_get_never_torn() {
    let server = start_test_server(ServerConfig::default()).await;
    let a = vec![b'a'; 256];
    let b = vec![b'b'; 256];

    let mut setup = TcpStream::connect(server.addr).await.unwrap();
    roundtrip(&mut setup, &request(&[b"SET", b"race", &a]), b"+OK\r\n").await;

    let addr = server.addr;
    let writer = tokio::spawn(async move {
        let mut client = TcpStream::connect(addr).await.unwrap();
        for i in 0..200 {
            let value = if i % 2 == 0 { &b } else { &a };
            roundtrip(&mut client, &request(&[b"SET", b"race", value]), b"+OK\r\n").await;
        }
    });

    let reader = tokio::spawn(async move {
        let mut client = TcpStream::connect(addr).await.unwrap();
        let header = b"$256\r\n";
        for _ in 0..200 {
            client.write_all(&request(&[b"GET", b"race"])).await.unwrap();
            let mut buf = vec![0u8; header.len() + 256 + 2];
            client.read_exact(&mut buf).await.unwrap();

            assert_eq!(&buf[..header.len()], header);
            let payload = &buf[header.len()..header.len() + 256];
            assert!(payload.iter().all(|&c| c == payload[0]), "torn value");
        }
    });

    writer.await.unwrap();
    reader.await.unwrap();
}
