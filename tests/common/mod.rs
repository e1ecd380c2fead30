//! A minimal fake subscription server, used by the integration tests to drive
//! [`docdb_subscribe::SubscriptionWorker`] against scripted wire traffic without a real database.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one JSON object off `stream`, tracking brace depth the same way the worker's own framed
/// reader does — the wire protocol has no length prefix or delimiter between frames.
pub async fn read_object(stream: &mut TcpStream) -> Value {
    let mut buffer = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut started = false;

    loop {
        let mut byte = [0u8; 1];
        let n = stream.read(&mut byte).await.expect("fake server read failed");
        assert_ne!(n, 0, "peer closed before a complete object arrived");
        let byte = byte[0];
        buffer.push(byte);

        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => {
                depth += 1;
                started = true;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if started && depth == 0 {
                    return serde_json::from_slice(&buffer).expect("fake server received invalid JSON");
                }
            }
            _ => {}
        }
    }
}

pub async fn write_object(stream: &mut TcpStream, value: &Value) {
    let bytes = serde_json::to_vec(value).unwrap();
    stream.write_all(&bytes).await.unwrap();
    stream.flush().await.unwrap();
}

/// Bind an ephemeral local listener and return it along with the URL a worker should connect to.
pub async fn bind_fake_server() -> (TcpListener, url::Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = url::Url::parse(&format!("tcp://{addr}")).unwrap();
    (listener, url)
}

/// Perform the handshake half of the protocol from the server's side: read the connection
/// header, answer `Ok` at the given version, then read (and discard) the subscription options
/// payload the client sends next.
pub async fn accept_and_negotiate(listener: &TcpListener, version: i32) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    let _header = read_object(&mut stream).await;
    write_object(
        &mut stream,
        &serde_json::json!({ "Status": "Ok", "Version": version }),
    )
    .await;
    let _options = read_object(&mut stream).await;
    stream
}
