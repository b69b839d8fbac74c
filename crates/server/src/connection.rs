//! The per-connection protocol state machine.
//!
//! One worker per accepted socket, driving the fixed stage sequence
//!
//! ```text
//! Connected → Authenticating → DeviceAuth → Attesting → Commands → Closed
//! ```
//!
//! No transition skips a stage. Authentication failures (wrong
//! password, bad signature, stale nonce, wrong second-factor code) and
//! protocol violations (malformed or out-of-order messages) are fatal
//! to the connection; authorization and not-found conditions inside the
//! command loop are reported as statuses and the loop continues. Every
//! exit path — clean quit, protocol error, socket error — runs the same
//! cleanup: the session device is marked offline and its session entry
//! dropped.

use crate::state::AppState;
use corral_catalog::{CatalogError, Outcome, PasswordVerdict};
use corral_core::config::AuthMode;
use corral_core::ident;
use corral_core::wire::{self, WireError};
use corral_core::{ClientMessage, ServerMessage, Status};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why a connection terminated.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),

    #[error("authentication failed: {0}")]
    AuthFailed(Status),

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Accept loop: one spawned worker per connection.
pub async fn serve(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    state: AppState,
) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        let state = state.clone();
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            let conn_id = Uuid::new_v4();
            info!(%conn_id, %peer, "connection accepted");
            match acceptor {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => serve_connection(stream, state, conn_id).await,
                    Err(e) => warn!(%conn_id, error = %e, "TLS handshake failed"),
                },
                None => serve_connection(socket, state, conn_id).await,
            }
        });
    }
}

/// Drive one connection through the protocol state machine, then run
/// session cleanup no matter how it ended.
pub async fn serve_connection<S>(stream: S, state: AppState, conn_id: Uuid)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut connection = Connection {
        stream,
        state,
        conn_id,
        user_id: None,
        device_id: None,
    };

    match connection.run().await {
        Ok(()) => info!(%conn_id, "connection closed"),
        Err(ConnError::Wire(WireError::Io(e))) => {
            debug!(%conn_id, error = %e, "connection dropped")
        }
        Err(e) => warn!(%conn_id, error = %e, "connection terminated"),
    }

    connection.cleanup().await;
}

struct Connection<S> {
    stream: S,
    state: AppState,
    conn_id: Uuid,
    user_id: Option<String>,
    device_id: Option<String>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn run(&mut self) -> Result<(), ConnError> {
        let user_id = self.authenticate().await?;
        self.user_id = Some(user_id.clone());

        let device_id = self.admit_device(&user_id).await?;
        self.device_id = Some(device_id.clone());

        self.attest().await?;

        self.command_loop(user_id, device_id).await
    }

    async fn cleanup(&mut self) {
        if let (Some(user_id), Some(device_id)) = (&self.user_id, &self.device_id) {
            let full_id = ident::full_id(user_id, device_id);
            self.state.fleet.disconnect_device(user_id, device_id).await;
            self.state.sessions.remove(&full_id);
            info!(conn_id = %self.conn_id, device = %full_id, "device marked offline");
        }
    }

    async fn send(&mut self, message: &ServerMessage) -> Result<(), ConnError> {
        wire::write_message(&mut self.stream, message).await?;
        Ok(())
    }

    async fn send_status(&mut self, code: Status) -> Result<(), ConnError> {
        self.send(&ServerMessage::Status { code }).await
    }

    async fn recv(&mut self) -> Result<ClientMessage, ConnError> {
        Ok(wire::read_client_message(&mut self.stream).await?)
    }

    // Stage 1: primary authentication plus optional second factor.
    async fn authenticate(&mut self) -> Result<String, ConnError> {
        let message = self.recv().await?;
        let op = message.op();
        let ClientMessage::AuthUser { user_id, password } = message else {
            return Err(ConnError::Protocol(format!("expected AUTH_USER, got {op}")));
        };
        ident::validate_ident(&user_id)
            .map_err(|e| ConnError::Protocol(e.to_string()))?;

        let primary_status = match self.state.auth.mode() {
            AuthMode::Password => self.authenticate_password(&user_id, password).await?,
            AuthMode::Certificate => self.authenticate_certificate(&user_id).await?,
        };

        if self.state.auth.second_factor_required() {
            self.second_factor(&user_id, primary_status).await?;
        } else {
            self.send(&ServerMessage::Auth {
                status: primary_status,
                second_factor: false,
            })
            .await?;
        }

        info!(conn_id = %self.conn_id, user = %user_id, "user authenticated");
        Ok(user_id)
    }

    async fn authenticate_password(
        &mut self,
        user_id: &str,
        password: Option<String>,
    ) -> Result<Status, ConnError> {
        let Some(password) = password else {
            return Err(ConnError::Protocol(
                "AUTH_USER without password in password mode".to_string(),
            ));
        };

        match self
            .state
            .auth
            .authenticate_password(user_id, &password)
            .await?
        {
            PasswordVerdict::NewUser => Ok(Status::OkNewUser),
            PasswordVerdict::Ok => Ok(Status::OkUser),
            PasswordVerdict::Wrong => {
                self.send(&ServerMessage::Auth {
                    status: Status::WrongPassword,
                    second_factor: false,
                })
                .await?;
                Err(ConnError::AuthFailed(Status::WrongPassword))
            }
        }
    }

    async fn authenticate_certificate(&mut self, user_id: &str) -> Result<Status, ConnError> {
        let registered = self.state.auth.is_registered(user_id).await;
        let issued = self.state.auth.issue_challenge();
        self.send(&ServerMessage::Challenge {
            user_status: if registered {
                Status::OkUser
            } else {
                Status::OkNewUser
            },
            nonce: issued.nonce,
        })
        .await?;

        let message = self.recv().await?;
        let op = message.op();
        let ClientMessage::AuthResponse {
            nonce: echoed,
            signature,
            certificate,
        } = message
        else {
            return Err(ConnError::Protocol(format!(
                "expected AUTH_RESPONSE, got {op}"
            )));
        };

        let verified = self.state.auth.is_fresh(&issued)
            && echoed == issued.nonce
            && if registered {
                self.state
                    .auth
                    .verify_registered(user_id, issued.nonce, &signature)
                    .await
            } else {
                match certificate {
                    Some(cert) => self
                        .state
                        .auth
                        .verify_and_bind_first_contact(user_id, issued.nonce, &signature, &cert)
                        .await?,
                    None => false,
                }
            };

        if !verified {
            self.send(&ServerMessage::Auth {
                status: Status::WrongNonce,
                second_factor: false,
            })
            .await?;
            return Err(ConnError::AuthFailed(Status::WrongNonce));
        }

        Ok(Status::Ok)
    }

    async fn second_factor(
        &mut self,
        user_id: &str,
        primary_status: Status,
    ) -> Result<(), ConnError> {
        let code = match self.state.auth.deliver_second_factor(user_id).await {
            Ok(code) => code,
            Err(e) => {
                error!(conn_id = %self.conn_id, user = %user_id, error = %e, "second factor undeliverable");
                self.send(&ServerMessage::Auth {
                    status: Status::Nok,
                    second_factor: false,
                })
                .await?;
                return Err(ConnError::AuthFailed(Status::Nok));
            }
        };

        self.send(&ServerMessage::Auth {
            status: primary_status,
            second_factor: true,
        })
        .await?;

        let message = self.recv().await?;
        let op = message.op();
        let ClientMessage::TwoFactor { code: received } = message else {
            return Err(ConnError::Protocol(format!("expected TWO_FACTOR, got {op}")));
        };

        if received != code {
            self.send(&ServerMessage::Auth {
                status: Status::WrongCode,
                second_factor: false,
            })
            .await?;
            return Err(ConnError::AuthFailed(Status::WrongCode));
        }

        self.send(&ServerMessage::Auth {
            status: Status::Ok,
            second_factor: false,
        })
        .await
    }

    // Stage 2: device-session admission. NOK_DEVID is not fatal; the
    // client may retry with another device id.
    async fn admit_device(&mut self, user_id: &str) -> Result<String, ConnError> {
        loop {
            let message = self.recv().await?;
            let op = message.op();
            let ClientMessage::AuthDevice { device_id } = message else {
                return Err(ConnError::Protocol(format!(
                    "expected AUTH_DEVICE, got {op}"
                )));
            };
            ident::validate_ident(&device_id)
                .map_err(|e| ConnError::Protocol(e.to_string()))?;

            match self.state.fleet.admit_device(user_id, &device_id).await? {
                Outcome::Granted(()) => {
                    self.state
                        .sessions
                        .touch(&ident::full_id(user_id, &device_id));
                    self.send_status(Status::OkDevid).await?;
                    info!(conn_id = %self.conn_id, user = %user_id, device = %device_id, "device session admitted");
                    return Ok(device_id);
                }
                Outcome::Denied(code) => {
                    self.send_status(code).await?;
                }
            }
        }
    }

    // Stage 3: attestation. Failure is fatal unless configured
    // advisory.
    async fn attest(&mut self) -> Result<(), ConnError> {
        let message = self.recv().await?;
        let op = message.op();
        let ClientMessage::Attest = message else {
            return Err(ConnError::Protocol(format!("expected ATTEST, got {op}")));
        };

        let nonce = corral_signer::generate_nonce();
        self.send(&ServerMessage::AttestChallenge { nonce }).await?;

        let message = self.recv().await?;
        let op = message.op();
        let ClientMessage::AttestResponse { digest } = message else {
            return Err(ConnError::Protocol(format!(
                "expected ATTEST_RESPONSE, got {op}"
            )));
        };

        if self.state.attest.verify(&digest, nonce) {
            self.send_status(Status::OkTested).await?;
            return Ok(());
        }

        warn!(conn_id = %self.conn_id, "attestation failed");
        self.send_status(Status::NokTested).await?;
        if self.state.attest.fatal() {
            return Err(ConnError::AuthFailed(Status::NokTested));
        }
        Ok(())
    }

    // Stage 4: command loop.
    async fn command_loop(
        &mut self,
        user_id: String,
        device_id: String,
    ) -> Result<(), ConnError> {
        let full_id = ident::full_id(&user_id, &device_id);

        loop {
            let message = match wire::read_client_message(&mut self.stream).await {
                Ok(message) => message,
                Err(WireError::UnknownOp(op)) => {
                    warn!(conn_id = %self.conn_id, op = %op, "unknown command");
                    self.send_status(Status::UnknownCommand).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.state.sessions.touch(&full_id);
            debug!(conn_id = %self.conn_id, op = %message.op(), "command received");

            match message {
                ClientMessage::Create { domain } => {
                    let result = self.state.fleet.create_domain(&user_id, &domain).await;
                    self.respond(result).await?;
                }
                ClientMessage::Add {
                    user_id: target,
                    domain,
                } => {
                    let result = self
                        .state
                        .fleet
                        .add_user_to_domain(&user_id, &target, &domain)
                        .await;
                    self.respond(result).await?;
                }
                ClientMessage::RegisterDevice { domain } => {
                    let result = self
                        .state
                        .fleet
                        .register_device_in_domain(&user_id, &device_id, &domain)
                        .await;
                    self.respond(result).await?;
                }
                ClientMessage::SetTemperature { value } => {
                    if !value.is_finite() {
                        self.send_status(Status::Nok).await?;
                        continue;
                    }
                    let result = self
                        .state
                        .fleet
                        .set_temperature(&user_id, &device_id, value)
                        .await;
                    self.respond(result).await?;
                }
                ClientMessage::UploadImage { name, len } => {
                    self.upload_image(&user_id, &device_id, &name, len).await?;
                }
                ClientMessage::ReadTemperatures { domain } => {
                    self.read_temperatures(&user_id, &domain).await?;
                }
                ClientMessage::ReadImage { full_id: target } => {
                    self.read_image(&user_id, &target).await?;
                }
                ClientMessage::Disconnect => {
                    self.send_status(Status::Ok).await?;
                    return Ok(());
                }
                other => {
                    return Err(ConnError::Protocol(format!(
                        "{} not valid in command stage",
                        other.op()
                    )));
                }
            }
        }
    }

    /// Reply with the operation's status. Catalog persistence failures
    /// are reported as `NOK` — never `OK` for a write that did not land
    /// on disk — and the connection continues.
    async fn respond(&mut self, result: Result<Outcome, CatalogError>) -> Result<(), ConnError> {
        let code = match result {
            Ok(Outcome::Granted(())) => Status::Ok,
            Ok(Outcome::Denied(code)) => code,
            Err(e) => {
                error!(conn_id = %self.conn_id, error = %e, "catalog operation failed");
                Status::Nok
            }
        };
        self.send_status(code).await
    }

    async fn upload_image(
        &mut self,
        user_id: &str,
        device_id: &str,
        name: &str,
        len: u64,
    ) -> Result<(), ConnError> {
        if ident::validate_image_name(name).is_err() {
            // The payload is unread; the stream cannot be resynced.
            return Err(ConnError::Protocol(format!("bad image name: {name}")));
        }

        let max = self.state.config.server.max_payload_bytes;
        let bytes = wire::read_payload(&mut self.stream, len, max).await?;

        let result = self
            .state
            .fleet
            .store_image(user_id, device_id, name, &bytes)
            .await;
        self.respond(result).await
    }

    async fn read_temperatures(
        &mut self,
        user_id: &str,
        domain: &str,
    ) -> Result<(), ConnError> {
        match self.state.fleet.read_temperatures(user_id, domain).await {
            Ok(Outcome::Granted(readings)) => {
                // Materialize the listing, send it, and drop it; no
                // artifact outlives the request.
                let listing =
                    corral_catalog::FleetManager::render_temperature_listing(&readings);
                self.send(&ServerMessage::Data {
                    code: Status::Ok,
                    len: listing.len() as u64,
                })
                .await?;
                wire::write_payload(&mut self.stream, &listing).await?;
                Ok(())
            }
            Ok(Outcome::Denied(code)) => self.send_status(code).await,
            Err(e) => {
                error!(conn_id = %self.conn_id, error = %e, "temperature read failed");
                self.send_status(Status::Nok).await
            }
        }
    }

    async fn read_image(&mut self, user_id: &str, target: &str) -> Result<(), ConnError> {
        if ident::split_full_id(target).is_err() {
            self.send_status(Status::NoSuchDevice).await?;
            return Ok(());
        }

        let name = match self.state.fleet.read_image(user_id, target).await {
            Ok(Outcome::Granted(name)) => name,
            Ok(Outcome::Denied(code)) => return self.send_status(code).await,
            Err(e) => {
                error!(conn_id = %self.conn_id, error = %e, "image lookup failed");
                return self.send_status(Status::Nok).await;
            }
        };

        match self.state.fleet.load_image(&name).await {
            Ok(bytes) => {
                self.send(&ServerMessage::Data {
                    code: Status::Ok,
                    len: bytes.len() as u64,
                })
                .await?;
                wire::write_payload(&mut self.stream, &bytes).await?;
                Ok(())
            }
            Err(e) => {
                error!(conn_id = %self.conn_id, image = %name, error = %e, "image read failed");
                self.send_status(Status::Nok).await
            }
        }
    }
}
