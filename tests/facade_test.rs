//! The top-level crate exposes everything needed for a session.

#![allow(clippy::disallowed_methods, reason = "Tests run on wall-clock time")]

use authnet::{
    AuthConfig, AuthSocket, AuthState, CLIENT, SERVER, SharedKeys, VERSION, generate_hmac_key,
    generate_key, simple_socket,
};

#[test]
fn version_matches_manifest() {
    assert_eq!(VERSION, "1.0.0");
}

#[test]
fn generated_keys_differ() {
    assert_ne!(generate_key().unwrap(), generate_key().unwrap());
    assert_ne!(generate_hmac_key().unwrap(), generate_hmac_key().unwrap());
}

#[test]
fn auth_socket_starts_in_init() {
    let keys = SharedKeys::new(generate_key().unwrap(), generate_hmac_key().unwrap());
    let socket = AuthSocket::new(SERVER, keys, AuthConfig::default(), std::time::Instant::now());

    assert_eq!(socket.state(), AuthState::Init);
    assert_eq!(socket.role(), SERVER);
}

#[tokio::test]
async fn client_without_server_fails() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let keys = SharedKeys::new(generate_key().unwrap(), generate_hmac_key().unwrap());

    let result = simple_socket(CLIENT, &format!("127.0.0.1:{port}"), keys).await;
    assert!(result.is_err());
}
