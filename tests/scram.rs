//! SCRAM-SHA-256 authentication over the wire, with the client side
//! computed from the raw primitives.

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::*;
use hmac::{Hmac, Mac};
use pgmock::{AuthMethod, PgMockOptions};
use sha2::{Digest, Sha256};

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn sasl_initial_packet(mechanism: &str, response: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(mechanism.as_bytes());
    body.push(0);
    body.extend((response.len() as i32).to_be_bytes());
    body.extend_from_slice(response.as_bytes());

    message(b'p', &body)
}

struct ServerFirst {
    combined_nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

fn parse_server_first(data: &str) -> ServerFirst {
    let mut combined_nonce = String::new();
    let mut salt = Vec::new();
    let mut iterations = 0;

    for attr in data.split(',') {
        match attr.split_once('=').unwrap() {
            ("r", v) => combined_nonce = v.to_owned(),
            ("s", v) => salt = BASE64.decode(v).unwrap(),
            ("i", v) => iterations = v.parse().unwrap(),
            other => panic!("unexpected attribute {other:?}"),
        }
    }

    ServerFirst {
        combined_nonce,
        salt,
        iterations,
    }
}

/// Drive the client side of the exchange. Returns the server-first
/// payload for inspection on success.
async fn authenticate(client: &mut TestClient, user: &str, password: &str) -> Result<String, String> {
    client.send(&startup_packet(&[("user", user)])).await;

    // AuthenticationSASL advertising SCRAM-SHA-256
    let (tag, body) = client.recv().await;
    assert_eq!(tag, b'R');
    assert_eq!(&body[..4], &10i32.to_be_bytes());
    assert_eq!(&body[4..], b"SCRAM-SHA-256\0\0");

    let client_nonce = "fixedclientnonce1234";
    let client_first_bare = format!("n={user},r={client_nonce}");

    client
        .send(&sasl_initial_packet(
            "SCRAM-SHA-256",
            &format!("n,,{client_first_bare}"),
        ))
        .await;

    // AuthenticationSASLContinue
    let (tag, body) = client.recv().await;

    if tag == b'E' {
        return Err(error_code(&body));
    }

    assert_eq!(tag, b'R');
    assert_eq!(&body[..4], &11i32.to_be_bytes());

    let server_first = String::from_utf8(body[4..].to_vec()).unwrap();
    let parsed = parse_server_first(&server_first);

    assert!(parsed.combined_nonce.starts_with(client_nonce));
    assert!(parsed.combined_nonce.len() > client_nonce.len() + 16);

    // client proof
    let mut salted_password = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        &parsed.salt,
        parsed.iterations,
        &mut salted_password,
    );

    let client_key = hmac_sha256(&salted_password, b"Client Key");
    let stored_key: [u8; 32] = Sha256::digest(client_key).into();

    let without_proof = format!("c=biws,r={}", parsed.combined_nonce);
    let auth_message = format!("{client_first_bare},{server_first},{without_proof}");

    let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
    let proof: Vec<u8> = client_key
        .iter()
        .zip(client_signature)
        .map(|(key, sig)| key ^ sig)
        .collect();

    let client_final = format!("{without_proof},p={}", BASE64.encode(&proof));
    client.send(&message(b'p', client_final.as_bytes())).await;

    // AuthenticationSASLFinal or the generic failure
    let (tag, body) = client.recv().await;

    if tag == b'E' {
        return Err(error_code(&body));
    }

    assert_eq!(tag, b'R');
    assert_eq!(&body[..4], &12i32.to_be_bytes());

    // verify the server signature: mutual authentication
    let server_key = hmac_sha256(&salted_password, b"Server Key");
    let server_signature = hmac_sha256(&server_key, auth_message.as_bytes());

    assert_eq!(
        body[4..],
        *format!("v={}", BASE64.encode(server_signature)).as_bytes()
    );

    // AuthenticationOk and the usual batch follow
    let (tag, body) = client.recv().await;
    assert_eq!(tag, b'R');
    assert_eq!(&body, b"\x00\x00\x00\x00");

    let frames = client.recv_until_ready().await;
    assert_eq!(frames.last().unwrap().1, b"I");

    Ok(server_first)
}

fn scram_options() -> PgMockOptions {
    PgMockOptions::new()
        .auth_method(AuthMethod::ScramSha256)
        .username("postgres")
        .password("pw")
}

#[tokio::test]
async fn correct_password_authenticates_and_serves_queries() {
    let server = spawn_server(scram_options()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    authenticate(&mut client, "postgres", "pw").await.unwrap();

    let frames = client.query("SELECT 1").await;
    assert_eq!(tags(&frames), "TDCZ");

    server.shutdown().await;
}

#[tokio::test]
async fn wrong_password_gets_28000_and_a_closed_socket() {
    let server = spawn_server(scram_options()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    let code = authenticate(&mut client, "postgres", "not-pw")
        .await
        .unwrap_err();

    assert_eq!(code, "28000");
    client.expect_eof().await;

    server.shutdown().await;
}

#[tokio::test]
async fn server_nonces_are_unique_across_exchanges() {
    let server = spawn_server(scram_options()).await;

    let mut first = TestClient::connect(server.local_addr()).await;
    let mut second = TestClient::connect(server.local_addr()).await;

    let a = authenticate(&mut first, "postgres", "pw").await.unwrap();
    let b = authenticate(&mut second, "postgres", "pw").await.unwrap();

    assert_ne!(
        parse_server_first(&a).combined_nonce,
        parse_server_first(&b).combined_nonce
    );

    server.shutdown().await;
}

#[tokio::test]
async fn unsupported_mechanism_is_rejected() {
    let server = spawn_server(scram_options()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.send(&startup_packet(&[("user", "postgres")])).await;

    let (tag, _) = client.recv().await;
    assert_eq!(tag, b'R');

    client
        .send(&sasl_initial_packet("SCRAM-SHA-1", "n,,n=postgres,r=abc"))
        .await;

    let (tag, body) = client.recv().await;
    assert_eq!(tag, b'E');
    assert_eq!(error_code(&body), "28000");

    client.expect_eof().await;

    server.shutdown().await;
}

#[tokio::test]
async fn queries_before_authentication_are_a_protocol_violation() {
    let server = spawn_server(scram_options()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.send(&startup_packet(&[("user", "postgres")])).await;

    let (tag, _) = client.recv().await;
    assert_eq!(tag, b'R');

    // a Query frame in the middle of authentication
    client.send(&query_packet("SELECT 1")).await;

    let (tag, body) = client.recv().await;
    assert_eq!(tag, b'E');
    assert_eq!(error_code(&body), "08P01");

    client.expect_eof().await;

    server.shutdown().await;
}
