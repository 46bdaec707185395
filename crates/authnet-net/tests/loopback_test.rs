//! Loopback tests over real TCP sockets.
//!
//! Each test binds a server on an ephemeral port and talks to it with a real
//! client, covering the same code paths as the `authnet` binary.

use std::time::Duration;

use authnet_core::{AuthConfig, CLIENT, SERVER};
use authnet_crypto::{HmacKey, Key, SharedKeys};
use authnet_net::{
    Client, ClientConfig, NetError, SecureConnection, Server, ServerConfig, simple_socket,
};
use authnet_proto::{Frame, FrameHeader, Opcode};
use tokio::{io::AsyncWriteExt, net::TcpStream};

fn keys() -> SharedKeys {
    SharedKeys::new(Key::from_bytes([0x31; 32]), HmacKey::from_bytes([0x32; 32]))
}

fn loopback() -> ServerConfig {
    ServerConfig { bind_address: "127.0.0.1:0".to_string(), ..ServerConfig::default() }
}

fn client_for(server: &Server, keys: SharedKeys) -> Client {
    let config = ClientConfig {
        server_address: server.local_addr().unwrap().to_string(),
        ..ClientConfig::default()
    };
    Client::new(config, keys)
}

async fn echo(mut conn: SecureConnection) {
    while let Some(message) = conn.recv().await {
        if conn.send(&message).await.is_err() {
            break;
        }
    }
}

#[tokio::test]
async fn echo_server_round_trip() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let client = client_for(&server, keys());
    tokio::spawn(server.run(echo));

    let mut conn = client.connect().await.unwrap();
    assert_eq!(conn.role(), CLIENT);
    assert_ne!(conn.session_id(), 0);

    let messages: [&[u8]; 3] = [b"first", b"", &[0xAB; 4096]];
    for message in messages {
        conn.send(message).await.unwrap();
        assert_eq!(conn.recv().await.as_deref(), Some(message));
    }

    conn.close().await;
}

#[tokio::test]
async fn pipelined_sends_do_not_wait_for_reads() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let client = client_for(&server, keys());
    tokio::spawn(server.run(echo));

    let mut conn = client.connect().await.unwrap();

    // Far more than the delivery buffers hold before anything is read
    let sends = async {
        for i in 0..200u32 {
            conn.send(&i.to_be_bytes()).await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(5), sends).await.unwrap();

    for i in 0..200u32 {
        let echoed = tokio::time::timeout(Duration::from_secs(5), conn.recv()).await.unwrap();
        assert_eq!(echoed, Some(i.to_be_bytes().to_vec()));
    }

    conn.close().await;
}

#[tokio::test]
async fn accept_reports_session_details() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let config = ClientConfig {
        server_address: server.local_addr().unwrap().to_string(),
        auth: AuthConfig { client_id: Some("sensor-7".to_string()), ..AuthConfig::default() },
        ..ClientConfig::default()
    };

    let client = Client::new(config, keys());

    let (accepted, connected) = tokio::join!(server.accept(), client.connect());
    let accepted = accepted.unwrap();
    let connected = connected.unwrap();

    assert_eq!(accepted.role(), SERVER);
    assert_eq!(accepted.session_id(), connected.session_id());
    assert_eq!(accepted.peer_id(), Some("sensor-7"));
    assert_eq!(connected.peer_addr(), server.local_addr().unwrap());
}

#[tokio::test]
async fn wrong_hmac_key_cannot_connect() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let impostor = SharedKeys::new(Key::from_bytes([0x31; 32]), HmacKey::from_bytes([0x00; 32]));
    let client = client_for(&server, impostor);

    let (accepted, connected) = tokio::join!(server.accept(), client.connect());

    assert!(matches!(connected, Err(NetError::Auth(_))));
    assert!(accepted.is_err());
}

#[tokio::test]
async fn wrong_encryption_key_closes_on_first_message() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let mismatched = SharedKeys::new(Key::from_bytes([0x99; 32]), HmacKey::from_bytes([0x32; 32]));
    let client = client_for(&server, mismatched);

    let (accepted, connected) = tokio::join!(server.accept(), client.connect());
    let mut accepted = accepted.unwrap();
    let mut connected = connected.unwrap();

    connected.send(b"unreadable").await.unwrap();

    // Server rejects the message and tears the session down
    assert_eq!(accepted.recv().await, None);
    assert_eq!(connected.recv().await, None);
}

#[tokio::test]
async fn graceful_close_ends_peer_stream() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let client = client_for(&server, keys());

    let (accepted, connected) = tokio::join!(server.accept(), client.connect());
    let mut accepted = accepted.unwrap();
    let mut connected = connected.unwrap();

    connected.send(b"last words").await.unwrap();
    connected.close().await;

    assert_eq!(accepted.recv().await, Some(b"last words".to_vec()));
    assert_eq!(accepted.recv().await, None);
    assert!(connected.send(b"after close").await.is_err());
}

#[tokio::test]
async fn garbage_peer_is_rejected() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let attacker = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\nHost: example\r\n\r\n").await.unwrap();
        stream
    });

    let result = server.accept().await;
    assert!(matches!(result, Err(NetError::Protocol(_))));
    drop(attacker.await.unwrap());
}

#[tokio::test]
async fn data_before_handshake_is_rejected() {
    let server = Server::bind(loopback(), keys()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let attacker = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = Frame::new(FrameHeader::new(Opcode::Data), vec![0u8; 16]);
        let mut wire = Vec::new();
        frame.encode(&mut wire).unwrap();
        stream.write_all(&wire).await.unwrap();
        stream
    });

    let result = server.accept().await;
    assert!(matches!(result, Err(NetError::Auth(_))));
    drop(attacker.await.unwrap());
}

#[tokio::test]
async fn silent_peer_hits_handshake_timeout() {
    let config = ServerConfig {
        auth: AuthConfig { handshake_timeout: Duration::from_millis(100), ..AuthConfig::default() },
        ..loopback()
    };
    let server = Server::bind(config, keys()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let _idle = TcpStream::connect(addr).await.unwrap();

    let result = server.accept().await;
    assert!(matches!(result, Err(NetError::HandshakeTimeout(_))));
}

#[tokio::test]
async fn simple_socket_pairs_server_and_client() {
    // Reserve a free port, then hand it to simple_socket
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let address = format!("127.0.0.1:{port}");

    let server_address = address.clone();
    let server = tokio::spawn(async move { simple_socket(SERVER, &server_address, keys()).await });

    let mut client = None;
    for _ in 0..50 {
        match simple_socket(CLIENT, &address, keys()).await {
            Ok(conn) => {
                client = Some(conn);
                break;
            },
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let client = client.unwrap();
    let mut server = server.await.unwrap().unwrap();

    client.send(b"hi").await.unwrap();
    assert_eq!(server.recv().await, Some(b"hi".to_vec()));
    assert_eq!(server.session_id(), client.session_id());
}

#[tokio::test]
async fn connection_limit_drops_excess_peers() {
    let config = ServerConfig { max_connections: 1, ..loopback() };
    let server = Server::bind(config, keys()).await.unwrap();
    let first = client_for(&server, keys());
    let second = client_for(&server, keys());
    tokio::spawn(server.run(echo));

    let mut held = first.connect().await.unwrap();
    held.send(b"occupying").await.unwrap();
    assert_eq!(held.recv().await, Some(b"occupying".to_vec()));

    assert!(second.connect().await.is_err());
}
