//! End-to-end coverage of the simple query protocol: startup, SELECT,
//! transactions, savepoints, and the error paths that keep a session
//! alive.

mod common;

use common::*;
use pgmock::PgMockOptions;

#[tokio::test]
async fn startup_then_select_1() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    let frames = client.startup("postgres", "postgres").await;

    // AuthenticationOk, the parameter batch, BackendKeyData, ReadyForQuery
    assert_eq!(frames[0].0, b'R');
    assert_eq!(&frames[0].1, b"\x00\x00\x00\x00");

    let parameters = frames_with(&frames, b'S');
    assert_eq!(parameters.len(), 11);
    assert!(parameters
        .iter()
        .any(|body| body.starts_with(b"server_version\0")));

    assert_eq!(frames_with(&frames, b'K').len(), 1);

    let (tag, body) = frames.last().unwrap();
    assert_eq!(*tag, b'Z');
    assert_eq!(body, b"I");

    let frames = client.query("SELECT 1").await;

    assert_eq!(tags(&frames), "TDCZ");
    assert_eq!(data_row_values(&frames[1].1), [Some("1".to_owned())]);
    assert_eq!(frames[2].1, b"SELECT 1\0");
    assert_eq!(frames[3].1, b"I");

    client.terminate().await;
    server.shutdown().await;
}

#[tokio::test]
async fn empty_query_gets_empty_response() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    let frames = client.query("").await;
    assert_eq!(tags(&frames), "IZ");

    // whitespace-only and bare semicolons are the same
    let frames = client.query("   ").await;
    assert_eq!(tags(&frames), "IZ");

    let frames = client.query(";").await;
    assert_eq!(tags(&frames), "IZ");

    server.shutdown().await;
}

#[tokio::test]
async fn transaction_lifecycle_reflects_in_ready_status() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    let frames = client.query("BEGIN").await;
    assert_eq!(tags(&frames), "CZ");
    assert_eq!(frames[0].1, b"BEGIN\0");
    assert_eq!(frames[1].1, b"T");

    let frames = client.query("SELECT 1").await;
    assert_eq!(frames.last().unwrap().1, b"T");

    let frames = client.query("COMMIT").await;
    assert_eq!(frames[0].1, b"COMMIT\0");
    assert_eq!(frames[1].1, b"I");

    server.shutdown().await;
}

#[tokio::test]
async fn transaction_state_errors_keep_the_session() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    let frames = client.query("COMMIT").await;
    assert_eq!(tags(&frames), "EZ");
    assert_eq!(error_code(&frames[0].1), "25P01");
    assert_eq!(frames[1].1, b"I");

    client.query("BEGIN").await;

    let frames = client.query("BEGIN").await;
    assert_eq!(error_code(&frames[0].1), "25001");

    // the failed BEGIN aborted the open transaction
    assert_eq!(frames.last().unwrap().1, b"E");

    client.query("ROLLBACK").await;

    let frames = client.query("SELECT 1").await;
    assert_eq!(tags(&frames), "TDCZ");

    server.shutdown().await;
}

#[tokio::test]
async fn savepoint_with_failed_statement_recovers() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    assert_eq!(client.query("BEGIN").await.last().unwrap().1, b"T");
    assert_eq!(client.query("SAVEPOINT sp").await.last().unwrap().1, b"T");

    // a statement that errors fails the transaction
    let frames = client.query("SELECT nope").await;
    assert_eq!(error_code(&frames[0].1), "42703");
    assert_eq!(frames.last().unwrap().1, b"E");

    // everything except rollback is now refused
    let frames = client.query("SELECT 1").await;
    assert_eq!(error_code(&frames[0].1), "25P02");
    assert_eq!(frames.last().unwrap().1, b"E");

    // rolling back to the savepoint recovers
    let frames = client.query("ROLLBACK TO sp").await;
    assert_eq!(frames[0].1, b"ROLLBACK\0");
    assert_eq!(frames.last().unwrap().1, b"T");

    let frames = client.query("SELECT 2").await;
    assert_eq!(tags(&frames), "TDCZ");
    assert_eq!(frames.last().unwrap().1, b"T");

    let frames = client.query("COMMIT").await;
    assert_eq!(frames.last().unwrap().1, b"I");

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_savepoint_is_3b001() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;
    client.query("BEGIN").await;

    let frames = client.query("ROLLBACK TO SAVEPOINT missing").await;
    assert_eq!(error_code(&frames[0].1), "3B001");

    server.shutdown().await;
}

#[tokio::test]
async fn batch_stops_at_first_error_with_one_ready() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    let frames = client.query("SELECT 1; FLARGLE; SELECT 2").await;

    // the second SELECT never runs, and exactly one ReadyForQuery ends
    // the batch
    assert_eq!(tags(&frames), "TDCEZ");
    assert_eq!(error_code(&frames[3].1), "42601");

    server.shutdown().await;
}

#[tokio::test]
async fn semicolons_inside_literals_do_not_split() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    let frames = client.query("SELECT 'a;b'").await;

    assert_eq!(tags(&frames), "TDCZ");
    assert_eq!(data_row_values(&frames[1].1), [Some("a;b".to_owned())]);

    server.shutdown().await;
}

#[tokio::test]
async fn set_pushes_parameter_status_and_show_reads_it_back() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    let frames = client.query("SET application_name = 'driver-test'").await;
    assert_eq!(tags(&frames), "SCZ");
    assert_eq!(frames[0].1, b"application_name\0driver-test\0");

    let frames = client.query("SHOW application_name").await;
    assert_eq!(
        data_row_values(&frames[1].1),
        [Some("driver-test".to_owned())]
    );

    // an empty value round-trips as empty, not as absent
    client.query("SET application_name = ''").await;

    let frames = client.query("SHOW application_name").await;
    assert_eq!(data_row_values(&frames[1].1), [Some(String::new())]);

    server.shutdown().await;
}

#[tokio::test]
async fn listen_notify_delivers_on_the_same_session() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    // not listening yet: no notification frame
    let frames = client.query("NOTIFY jobs, 'zero'").await;
    assert_eq!(tags(&frames), "CZ");

    client.query("LISTEN jobs").await;

    let frames = client.query("NOTIFY jobs, 'one'").await;
    assert_eq!(tags(&frames), "ACZ");

    let body = &frames[0].1;
    assert!(body[4..].starts_with(b"jobs\0one\0"));

    client.query("UNLISTEN *").await;

    let frames = client.query("NOTIFY jobs, 'two'").await;
    assert_eq!(tags(&frames), "CZ");

    server.shutdown().await;
}

#[tokio::test]
async fn startup_parameters_override_defaults() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client
        .send(&startup_packet(&[
            ("user", "alice"),
            ("database", "appdb"),
            ("application_name", "my-tool"),
        ]))
        .await;

    let frames = client.recv_until_ready().await;

    let parameters = frames_with(&frames, b'S');
    assert!(parameters
        .iter()
        .any(|body| *body == b"application_name\0my-tool\0"));
    assert!(parameters
        .iter()
        .any(|body| *body == b"session_authorization\0alice\0"));

    let frames = client.query("SELECT current_user, current_database()").await;
    assert_eq!(
        data_row_values(&frames[1].1),
        [Some("alice".to_owned()), Some("appdb".to_owned())]
    );

    server.shutdown().await;
}

#[tokio::test]
async fn function_call_is_refused_but_session_survives() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    client.send(&message(b'F', &[0, 0, 0, 0])).await;
    let frames = client.recv_until_ready().await;

    assert_eq!(tags(&frames), "EZ");
    assert_eq!(error_code(&frames[0].1), "0A000");

    // still usable
    let frames = client.query("SELECT 1").await;
    assert_eq!(tags(&frames), "TDCZ");

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_message_type_is_a_protocol_violation() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.startup("postgres", "postgres").await;

    // '!' is not a frontend message
    client.send(&message(b'!', &[])).await;

    let (tag, body) = client.recv().await;
    assert_eq!(tag, b'E');
    assert_eq!(error_code(&body), "08P01");

    client.expect_eof().await;

    server.shutdown().await;
}

#[tokio::test]
async fn cancel_request_closes_without_a_reply() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    client.send(&cancel_request_packet(1234, 5678)).await;
    client.expect_eof().await;

    server.shutdown().await;
}

#[tokio::test]
async fn unsupported_protocol_version_is_rejected() {
    let server = spawn_server(PgMockOptions::new()).await;
    let mut client = TestClient::connect(server.local_addr()).await;

    // protocol 2.0
    let mut body = (2u32 << 16).to_be_bytes().to_vec();
    body.extend_from_slice(b"user\0postgres\0\0");
    let mut packet = ((body.len() + 4) as u32).to_be_bytes().to_vec();
    packet.extend(body);

    client.send(&packet).await;

    let (tag, body) = client.recv().await;
    assert_eq!(tag, b'E');
    assert_eq!(error_code(&body), "08P01");

    client.expect_eof().await;

    server.shutdown().await;
}
