//! End-to-end protocol tests: authentication, admission, attestation,
//! and the command loop over a real listener.

mod common;

use common::{start_server, RecordingMailer, TestClient, TestServerBuilder};
use corral_core::{ClientMessage, ServerMessage, Status};
use corral_signer::KeyPair;
use std::sync::Arc;

#[tokio::test]
async fn first_contact_then_known_user_then_forged_key() {
    let server = start_server().await;
    let keypair = KeyPair::generate();

    // First contact: the server reports a new account and binds the
    // presented certificate.
    let mut client = TestClient::connect(server.addr).await;
    let (user_status, auth) = client.authenticate("alice", &keypair).await;
    assert_eq!(user_status, Status::OkNewUser);
    assert_eq!(auth, Status::Ok);
    drop(client);

    // Same key authenticates again as a known user.
    let mut client = TestClient::connect(server.addr).await;
    let (user_status, auth) = client.authenticate("alice", &keypair).await;
    assert_eq!(user_status, Status::OkUser);
    assert_eq!(auth, Status::Ok);
    drop(client);

    // A different key is refused and the connection is closed.
    let forged = KeyPair::generate();
    let mut client = TestClient::connect(server.addr).await;
    let (user_status, auth) = client.authenticate("alice", &forged).await;
    assert_eq!(user_status, Status::OkUser);
    assert_eq!(auth, Status::WrongNonce);
    assert!(client.try_recv().await.is_none(), "connection must close");
}

#[tokio::test]
async fn nonce_echo_tampering_is_fatal() {
    let server = start_server().await;
    let keypair = KeyPair::generate();

    let mut client = TestClient::connect(server.addr).await;
    client
        .send(&ClientMessage::AuthUser {
            user_id: "alice".into(),
            password: None,
        })
        .await;
    let ServerMessage::Challenge { nonce, .. } = client.recv().await else {
        panic!("expected Challenge");
    };

    // Sign the real nonce but echo a different one.
    client
        .send(&ClientMessage::AuthResponse {
            nonce: nonce.wrapping_add(1),
            signature: corral_signer::challenge::sign_nonce(&keypair.secret, nonce),
            certificate: Some(keypair.public.to_text()),
        })
        .await;

    let ServerMessage::Auth { status, .. } = client.recv().await else {
        panic!("expected Auth outcome");
    };
    assert_eq!(status, Status::WrongNonce);
    assert!(client.try_recv().await.is_none());
}

#[tokio::test]
async fn single_active_session_across_connections() {
    let server = start_server().await;
    let keypair = KeyPair::generate();

    let mut first = TestClient::login(server.addr, "alice", "1", &keypair).await;

    // A second connection for the same user cannot admit any device
    // while the first is online, but may keep retrying.
    let mut second = TestClient::connect(server.addr).await;
    let (_, auth) = second.authenticate("alice", &keypair).await;
    assert_eq!(auth, Status::Ok);
    assert_eq!(second.admit("1").await, Status::NokDevid);
    assert_eq!(second.admit("2").await, Status::NokDevid);

    // After the first session disconnects, admission succeeds.
    assert_eq!(first.disconnect().await, Status::Ok);
    // Disconnect cleanup is asynchronous with respect to this client;
    // poll briefly.
    let mut admitted = Status::NokDevid;
    for _ in 0..50 {
        admitted = second.admit("1").await;
        if admitted == Status::OkDevid {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(admitted, Status::OkDevid);
}

#[tokio::test]
async fn commands_before_authentication_close_the_connection() {
    let server = start_server().await;

    let mut client = TestClient::connect(server.addr).await;
    client
        .send(&ClientMessage::Create {
            domain: "home".into(),
        })
        .await;
    assert!(client.try_recv().await.is_none(), "violation must close");
}

#[tokio::test]
async fn attestation_failure_is_fatal_by_default() {
    let server = start_server().await;
    let keypair = KeyPair::generate();

    let mut client = TestClient::connect(server.addr).await;
    let (_, auth) = client.authenticate("alice", &keypair).await;
    assert_eq!(auth, Status::Ok);
    assert_eq!(client.admit("1").await, Status::OkDevid);

    assert_eq!(
        client.attest_with(b"tampered-client").await,
        Status::NokTested
    );
    assert!(client.try_recv().await.is_none(), "fatal policy closes");

    // The device was marked offline by cleanup: a new session admits.
    let mut retry = TestClient::connect(server.addr).await;
    let (_, auth) = retry.authenticate("alice", &keypair).await;
    assert_eq!(auth, Status::Ok);
    let mut admitted = Status::NokDevid;
    for _ in 0..50 {
        admitted = retry.admit("1").await;
        if admitted == Status::OkDevid {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(admitted, Status::OkDevid);
}

#[tokio::test]
async fn advisory_attestation_logs_and_continues() {
    let server = TestServerBuilder::new().advisory_attestation().start().await;
    let keypair = KeyPair::generate();

    let mut client = TestClient::connect(server.addr).await;
    let (_, auth) = client.authenticate("alice", &keypair).await;
    assert_eq!(auth, Status::Ok);
    assert_eq!(client.admit("1").await, Status::OkDevid);
    assert_eq!(
        client.attest_with(b"tampered-client").await,
        Status::NokTested
    );

    // The command loop is still reachable.
    assert_eq!(client.create("home").await, Status::Ok);
}

#[tokio::test]
async fn unknown_command_is_reported_and_not_fatal() {
    let server = start_server().await;
    let keypair = KeyPair::generate();
    let mut client = TestClient::login(server.addr, "alice", "1", &keypair).await;

    // Hand-craft a frame with an unknown opcode.
    let frame = br#"{"op":"SELF_DESTRUCT"}"#;
    let stream = client.stream_mut();
    tokio::io::AsyncWriteExt::write_all(stream, &(frame.len() as u32).to_be_bytes())
        .await
        .unwrap();
    tokio::io::AsyncWriteExt::write_all(stream, frame).await.unwrap();
    assert_eq!(client.recv_status().await, Status::UnknownCommand);

    // And the loop continues.
    assert_eq!(client.create("home").await, Status::Ok);
}

#[tokio::test]
async fn fleet_scenario_alice_shares_bob_reads() {
    let server = start_server().await;
    let alice_key = KeyPair::generate();
    let bob_key = KeyPair::generate();

    // alice authenticates (new), admits device 1, creates "home",
    // registers alice:1 into it, publishes 21.5.
    let mut alice = TestClient::login(server.addr, "alice", "1", &alice_key).await;
    assert_eq!(alice.create("home").await, Status::Ok);
    assert_eq!(alice.register_device("home").await, Status::Ok);
    assert_eq!(alice.set_temperature(21.5).await, Status::Ok);

    // bob authenticates (new) so alice can add him.
    let mut bob = TestClient::login(server.addr, "bob", "1", &bob_key).await;
    assert_eq!(alice.add("bob", "home").await, Status::Ok);

    // bob reads the domain's temperatures and sees alice's reading.
    let listing = bob.read_temperatures("home").await.unwrap();
    assert!(
        listing.lines().any(|l| l == "alice:1 21.5"),
        "listing was: {listing:?}"
    );
}

#[tokio::test]
async fn command_statuses_follow_check_order() {
    let server = start_server().await;
    let alice_key = KeyPair::generate();
    let mut alice = TestClient::login(server.addr, "alice", "1", &alice_key).await;

    assert_eq!(alice.create("home").await, Status::Ok);
    assert_eq!(alice.create("home").await, Status::AlreadyExists);

    assert_eq!(alice.add("ghost", "absent").await, Status::NoSuchDomain);
    assert_eq!(alice.add("ghost", "home").await, Status::NoSuchUser);

    assert_eq!(
        alice.register_device("absent").await,
        Status::NoSuchDomain
    );
    assert_eq!(alice.register_device("home").await, Status::Ok);
    assert_eq!(
        alice.register_device("home").await,
        Status::AlreadyRegistered
    );

    assert_eq!(
        alice.read_temperatures("absent").await.unwrap_err(),
        Status::NoSuchDomain
    );
    assert_eq!(
        alice.read_temperatures("home").await.unwrap_err(),
        Status::NoData
    );
}

#[tokio::test]
async fn image_upload_and_read_are_byte_identical() {
    let server = start_server().await;
    let alice_key = KeyPair::generate();
    let mallory_key = KeyPair::generate();

    let mut alice = TestClient::login(server.addr, "alice", "1", &alice_key).await;

    // NO_DATA before any upload, even for the owner.
    assert_eq!(
        alice.read_image("alice:1").await.unwrap_err(),
        Status::NoData
    );

    let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    assert_eq!(alice.upload_image("garden.png", &bytes).await, Status::Ok);

    let received = alice.read_image("alice:1").await.unwrap();
    assert_eq!(received.len(), bytes.len());
    assert_eq!(received, bytes);

    // A stranger is refused; an unknown device reports existence
    // first.
    let mut mallory = TestClient::login(server.addr, "mallory", "1", &mallory_key).await;
    assert_eq!(
        mallory.read_image("alice:1").await.unwrap_err(),
        Status::NotPermitted
    );
    assert_eq!(
        mallory.read_image("ghost:1").await.unwrap_err(),
        Status::NoSuchDevice
    );
}

#[tokio::test]
async fn second_factor_round_trip_and_rejection() {
    let mailer = Arc::new(RecordingMailer::new());
    let server = TestServerBuilder::new()
        .with_mailer(mailer.clone())
        .start()
        .await;
    let keypair = KeyPair::generate();

    // Wrong code: fatal.
    let mut client = TestClient::connect(server.addr).await;
    client
        .send(&ClientMessage::AuthUser {
            user_id: "alice".into(),
            password: None,
        })
        .await;
    let ServerMessage::Challenge { nonce, .. } = client.recv().await else {
        panic!("expected Challenge");
    };
    client
        .send(&ClientMessage::AuthResponse {
            nonce,
            signature: corral_signer::challenge::sign_nonce(&keypair.secret, nonce),
            certificate: Some(keypair.public.to_text()),
        })
        .await;
    let ServerMessage::Auth {
        status,
        second_factor,
    } = client.recv().await
    else {
        panic!("expected Auth outcome");
    };
    assert_eq!(status, Status::Ok);
    assert!(second_factor);
    let code = mailer.last_code().expect("code was delivered");
    client
        .send(&ClientMessage::TwoFactor {
            code: code.wrapping_add(1),
        })
        .await;
    let ServerMessage::Auth { status, .. } = client.recv().await else {
        panic!("expected Auth outcome");
    };
    assert_eq!(status, Status::WrongCode);
    assert!(client.try_recv().await.is_none());

    // Right code: the session proceeds to the command loop.
    let mut client = TestClient::connect(server.addr).await;
    client
        .send(&ClientMessage::AuthUser {
            user_id: "alice".into(),
            password: None,
        })
        .await;
    let ServerMessage::Challenge { nonce, .. } = client.recv().await else {
        panic!("expected Challenge");
    };
    client
        .send(&ClientMessage::AuthResponse {
            nonce,
            signature: corral_signer::challenge::sign_nonce(&keypair.secret, nonce),
            certificate: None,
        })
        .await;
    let ServerMessage::Auth { second_factor, .. } = client.recv().await else {
        panic!("expected Auth outcome");
    };
    assert!(second_factor);
    let code = mailer.last_code().expect("code was delivered");
    client.send(&ClientMessage::TwoFactor { code }).await;
    let ServerMessage::Auth { status, .. } = client.recv().await else {
        panic!("expected Auth outcome");
    };
    assert_eq!(status, Status::Ok);

    assert_eq!(client.admit("1").await, Status::OkDevid);
    assert_eq!(client.attest().await, Status::OkTested);
    assert_eq!(client.create("home").await, Status::Ok);
}

#[tokio::test]
async fn password_mode_flow() {
    let server = TestServerBuilder::new().password_mode().start().await;

    let auth = |password: &str| {
        let password = password.to_string();
        async move {
            let mut client = TestClient::connect(server.addr).await;
            client
                .send(&ClientMessage::AuthUser {
                    user_id: "alice".into(),
                    password: Some(password),
                })
                .await;
            let ServerMessage::Auth { status, .. } = client.recv().await else {
                panic!("expected Auth outcome");
            };
            (client, status)
        }
    };

    let (_c, status) = auth("hunter2").await;
    assert_eq!(status, Status::OkNewUser);

    let (_c, status) = auth("hunter2").await;
    assert_eq!(status, Status::OkUser);

    let (mut c, status) = auth("wrong").await;
    assert_eq!(status, Status::WrongPassword);
    assert!(c.try_recv().await.is_none(), "wrong password closes");
}
