//! Protocol-speaking test client.

use super::server::REFERENCE_EXECUTABLE;
use corral_core::wire;
use corral_core::{ClientMessage, ServerMessage, Status};
use corral_signer::{attestation_digest, challenge, KeyPair};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// A thin client over the framed protocol.
/// Note: #[allow(dead_code)] because each test file compiles common/
/// separately.
pub struct TestClient {
    stream: TcpStream,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        Self { stream }
    }

    pub async fn send(&mut self, message: &ClientMessage) {
        wire::write_message(&mut self.stream, message)
            .await
            .expect("send failed");
    }

    pub async fn recv(&mut self) -> ServerMessage {
        wire::read_message(&mut self.stream)
            .await
            .expect("recv failed")
    }

    /// Receive a message, returning None when the server closed the
    /// connection.
    pub async fn try_recv(&mut self) -> Option<ServerMessage> {
        wire::read_message(&mut self.stream).await.ok()
    }

    pub async fn recv_status(&mut self) -> Status {
        match self.recv().await {
            ServerMessage::Status { code } => code,
            other => panic!("expected Status, got {other:?}"),
        }
    }

    /// Receive a `DATA` reply and its payload.
    pub async fn recv_data(&mut self) -> Vec<u8> {
        match self.recv().await {
            ServerMessage::Data { code, len } => {
                assert_eq!(code, Status::Ok);
                wire::read_payload(&mut self.stream, len, wire::DEFAULT_MAX_PAYLOAD)
                    .await
                    .expect("payload read failed")
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    /// Certificate-mode primary authentication. Returns the
    /// `user_status` from the challenge and the auth outcome.
    pub async fn authenticate(&mut self, user_id: &str, keypair: &KeyPair) -> (Status, Status) {
        self.send(&ClientMessage::AuthUser {
            user_id: user_id.to_string(),
            password: None,
        })
        .await;

        let ServerMessage::Challenge { user_status, nonce } = self.recv().await else {
            panic!("expected Challenge");
        };

        let signature = challenge::sign_nonce(&keypair.secret, nonce);
        let certificate = (user_status == Status::OkNewUser).then(|| keypair.public.to_text());
        self.send(&ClientMessage::AuthResponse {
            nonce,
            signature,
            certificate,
        })
        .await;

        let ServerMessage::Auth { status, .. } = self.recv().await else {
            panic!("expected Auth outcome");
        };
        (user_status, status)
    }

    /// Device-session admission.
    pub async fn admit(&mut self, device_id: &str) -> Status {
        self.send(&ClientMessage::AuthDevice {
            device_id: device_id.to_string(),
        })
        .await;
        self.recv_status().await
    }

    /// Attestation with the well-known test reference.
    pub async fn attest(&mut self) -> Status {
        self.attest_with(REFERENCE_EXECUTABLE).await
    }

    /// Attestation computing the digest over arbitrary bytes.
    pub async fn attest_with(&mut self, executable: &[u8]) -> Status {
        self.send(&ClientMessage::Attest).await;
        let ServerMessage::AttestChallenge { nonce } = self.recv().await else {
            panic!("expected AttestChallenge");
        };
        self.send(&ClientMessage::AttestResponse {
            digest: attestation_digest(executable, nonce),
        })
        .await;
        self.recv_status().await
    }

    /// Full happy-path login: authenticate, admit, attest.
    pub async fn login(addr: SocketAddr, user_id: &str, device_id: &str, keypair: &KeyPair) -> Self {
        let mut client = Self::connect(addr).await;
        let (_, status) = client.authenticate(user_id, keypair).await;
        assert!(status.is_success(), "auth failed: {status}");
        assert_eq!(client.admit(device_id).await, Status::OkDevid);
        assert_eq!(client.attest().await, Status::OkTested);
        client
    }

    pub async fn create(&mut self, domain: &str) -> Status {
        self.send(&ClientMessage::Create {
            domain: domain.to_string(),
        })
        .await;
        self.recv_status().await
    }

    pub async fn add(&mut self, user_id: &str, domain: &str) -> Status {
        self.send(&ClientMessage::Add {
            user_id: user_id.to_string(),
            domain: domain.to_string(),
        })
        .await;
        self.recv_status().await
    }

    pub async fn register_device(&mut self, domain: &str) -> Status {
        self.send(&ClientMessage::RegisterDevice {
            domain: domain.to_string(),
        })
        .await;
        self.recv_status().await
    }

    pub async fn set_temperature(&mut self, value: f32) -> Status {
        self.send(&ClientMessage::SetTemperature { value }).await;
        self.recv_status().await
    }

    pub async fn upload_image(&mut self, name: &str, bytes: &[u8]) -> Status {
        self.send(&ClientMessage::UploadImage {
            name: name.to_string(),
            len: bytes.len() as u64,
        })
        .await;
        wire::write_payload(&mut self.stream, bytes)
            .await
            .expect("payload write failed");
        self.recv_status().await
    }

    /// `READ_TEMPERATURES`, Ok variant; returns the listing text.
    pub async fn read_temperatures(&mut self, domain: &str) -> Result<String, Status> {
        self.send(&ClientMessage::ReadTemperatures {
            domain: domain.to_string(),
        })
        .await;
        match self.recv().await {
            ServerMessage::Data { code, len } => {
                assert_eq!(code, Status::Ok);
                let payload = wire::read_payload(&mut self.stream, len, wire::DEFAULT_MAX_PAYLOAD)
                    .await
                    .expect("payload read failed");
                Ok(String::from_utf8(payload).expect("listing is utf-8"))
            }
            ServerMessage::Status { code } => Err(code),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    /// `READ_IMAGE`; returns the image bytes or the denial status.
    pub async fn read_image(&mut self, full_id: &str) -> Result<Vec<u8>, Status> {
        self.send(&ClientMessage::ReadImage {
            full_id: full_id.to_string(),
        })
        .await;
        match self.recv().await {
            ServerMessage::Data { code, len } => {
                assert_eq!(code, Status::Ok);
                Ok(
                    wire::read_payload(&mut self.stream, len, wire::DEFAULT_MAX_PAYLOAD)
                        .await
                        .expect("payload read failed"),
                )
            }
            ServerMessage::Status { code } => Err(code),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    pub async fn disconnect(&mut self) -> Status {
        self.send(&ClientMessage::Disconnect).await;
        self.recv_status().await
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}
