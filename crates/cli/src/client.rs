//! The protocol client used by `corralctl run`.

use anyhow::{bail, Context, Result};
use corral_core::wire;
use corral_core::{ClientMessage, ServerMessage, Status};
use corral_signer::{attestation_digest, challenge, KeyPair};
use tokio::io::{AsyncRead, AsyncWrite};

/// Anything the client can speak the protocol over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// A connected fleet client.
pub struct FleetClient {
    stream: Box<dyn Transport>,
}

impl FleetClient {
    /// Wrap an established transport.
    pub fn new(stream: Box<dyn Transport>) -> Self {
        Self { stream }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        wire::write_message(&mut self.stream, message)
            .await
            .context("failed to send message")
    }

    async fn recv(&mut self) -> Result<ServerMessage> {
        wire::read_message(&mut self.stream)
            .await
            .context("failed to read server reply")
    }

    async fn recv_status(&mut self) -> Result<Status> {
        match self.recv().await? {
            ServerMessage::Status { code } => Ok(code),
            other => bail!("unexpected server reply: {other:?}"),
        }
    }

    /// Certificate-mode authentication. Returns whether a second
    /// factor is expected next.
    pub async fn authenticate_with_key(
        &mut self,
        user_id: &str,
        keypair: &KeyPair,
    ) -> Result<bool> {
        self.send(&ClientMessage::AuthUser {
            user_id: user_id.to_string(),
            password: None,
        })
        .await?;

        let ServerMessage::Challenge { user_status, nonce } = self.recv().await? else {
            bail!("expected a challenge from the server");
        };
        if user_status == Status::OkNewUser {
            tracing::info!("first contact: registering this key with the server");
        }

        let signature = challenge::sign_nonce(&keypair.secret, nonce);
        let certificate = (user_status == Status::OkNewUser).then(|| keypair.public.to_text());
        self.send(&ClientMessage::AuthResponse {
            nonce,
            signature,
            certificate,
        })
        .await?;

        self.finish_auth().await
    }

    /// Password-mode authentication. Returns whether a second factor
    /// is expected next.
    pub async fn authenticate_with_password(
        &mut self,
        user_id: &str,
        password: &str,
    ) -> Result<bool> {
        self.send(&ClientMessage::AuthUser {
            user_id: user_id.to_string(),
            password: Some(password.to_string()),
        })
        .await?;
        self.finish_auth().await
    }

    async fn finish_auth(&mut self) -> Result<bool> {
        let ServerMessage::Auth {
            status,
            second_factor,
        } = self.recv().await?
        else {
            bail!("expected an authentication outcome");
        };
        if !status.is_success() {
            bail!("authentication refused: {status}");
        }
        Ok(second_factor)
    }

    /// Send the second-factor code and confirm acceptance.
    pub async fn submit_second_factor(&mut self, code: u32) -> Result<()> {
        self.send(&ClientMessage::TwoFactor { code }).await?;
        let ServerMessage::Auth { status, .. } = self.recv().await? else {
            bail!("expected an authentication outcome");
        };
        if status != Status::Ok {
            bail!("second factor refused: {status}");
        }
        Ok(())
    }

    /// Request a device session.
    pub async fn admit_device(&mut self, device_id: &str) -> Result<Status> {
        self.send(&ClientMessage::AuthDevice {
            device_id: device_id.to_string(),
        })
        .await?;
        self.recv_status().await
    }

    /// Run attestation over this executable's bytes.
    pub async fn attest(&mut self, executable: &[u8]) -> Result<Status> {
        self.send(&ClientMessage::Attest).await?;
        let ServerMessage::AttestChallenge { nonce } = self.recv().await? else {
            bail!("expected an attestation challenge");
        };
        self.send(&ClientMessage::AttestResponse {
            digest: attestation_digest(executable, nonce),
        })
        .await?;
        self.recv_status().await
    }

    pub async fn create(&mut self, domain: &str) -> Result<Status> {
        self.send(&ClientMessage::Create {
            domain: domain.to_string(),
        })
        .await?;
        self.recv_status().await
    }

    pub async fn add(&mut self, user_id: &str, domain: &str) -> Result<Status> {
        self.send(&ClientMessage::Add {
            user_id: user_id.to_string(),
            domain: domain.to_string(),
        })
        .await?;
        self.recv_status().await
    }

    pub async fn register_device(&mut self, domain: &str) -> Result<Status> {
        self.send(&ClientMessage::RegisterDevice {
            domain: domain.to_string(),
        })
        .await?;
        self.recv_status().await
    }

    pub async fn set_temperature(&mut self, value: f32) -> Result<Status> {
        self.send(&ClientMessage::SetTemperature { value }).await?;
        self.recv_status().await
    }

    pub async fn upload_image(&mut self, name: &str, bytes: &[u8]) -> Result<Status> {
        self.send(&ClientMessage::UploadImage {
            name: name.to_string(),
            len: bytes.len() as u64,
        })
        .await?;
        wire::write_payload(&mut self.stream, bytes)
            .await
            .context("failed to send image payload")?;
        self.recv_status().await
    }

    /// Read a domain's temperature listing.
    pub async fn read_temperatures(&mut self, domain: &str) -> Result<Result<String, Status>> {
        self.send(&ClientMessage::ReadTemperatures {
            domain: domain.to_string(),
        })
        .await?;
        match self.recv().await? {
            ServerMessage::Data { len, .. } => {
                let payload =
                    wire::read_payload(&mut self.stream, len, wire::DEFAULT_MAX_PAYLOAD)
                        .await
                        .context("failed to read listing payload")?;
                Ok(Ok(String::from_utf8_lossy(&payload).into_owned()))
            }
            ServerMessage::Status { code } => Ok(Err(code)),
            other => bail!("unexpected server reply: {other:?}"),
        }
    }

    /// Read a device's latest image.
    pub async fn read_image(&mut self, full_id: &str) -> Result<Result<Vec<u8>, Status>> {
        self.send(&ClientMessage::ReadImage {
            full_id: full_id.to_string(),
        })
        .await?;
        match self.recv().await? {
            ServerMessage::Data { len, .. } => {
                let payload =
                    wire::read_payload(&mut self.stream, len, wire::DEFAULT_MAX_PAYLOAD)
                        .await
                        .context("failed to read image payload")?;
                Ok(Ok(payload))
            }
            ServerMessage::Status { code } => Ok(Err(code)),
            other => bail!("unexpected server reply: {other:?}"),
        }
    }

    /// Close the session.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.send(&ClientMessage::Disconnect).await?;
        let _ = self.recv_status().await;
        Ok(())
    }
}
