//! Device-side CLI for Corral.

mod client;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client::{FleetClient, Transport};
use corral_signer::KeyPair;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_rustls::rustls;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "corralctl")]
#[command(about = "Device client for the Corral fleet server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a device key pair
    Keygen {
        /// Output file for the secret key
        #[arg(long, default_value = "device.key")]
        out: PathBuf,
    },
    /// Connect to a server and run the interactive session
    Run {
        /// Server address, host:port
        #[arg(long, env = "CORRAL_SERVER", default_value = "127.0.0.1:5757")]
        server: String,

        /// User id to authenticate as
        #[arg(long)]
        user: String,

        /// Device id for this session
        #[arg(long)]
        device: String,

        /// Secret key file (certificate mode)
        #[arg(long, default_value = "device.key")]
        key: PathBuf,

        /// Authenticate with a password instead of the key file
        #[arg(long)]
        password: Option<String>,

        /// CA bundle enabling TLS to the server
        #[arg(long)]
        tls_ca: Option<PathBuf>,

        /// Server name for TLS verification (defaults to the host part
        /// of --server)
        #[arg(long)]
        tls_name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    match Cli::parse().command {
        Commands::Keygen { out } => keygen(&out),
        Commands::Run {
            server,
            user,
            device,
            key,
            password,
            tls_ca,
            tls_name,
        } => run(server, user, device, key, password, tls_ca, tls_name).await,
    }
}

fn keygen(out: &Path) -> Result<()> {
    let keypair = KeyPair::generate();
    keypair
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("secret key written to {}", out.display());
    println!("public key: {}", keypair.public.to_text());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run(
    server: String,
    user: String,
    device: String,
    key: PathBuf,
    password: Option<String>,
    tls_ca: Option<PathBuf>,
    tls_name: Option<String>,
) -> Result<()> {
    let stream = connect(&server, tls_ca.as_deref(), tls_name.as_deref()).await?;
    let mut client = FleetClient::new(stream);

    let second_factor = match &password {
        Some(password) => client.authenticate_with_password(&user, password).await?,
        None => {
            let keypair = KeyPair::load(&key)
                .with_context(|| format!("failed to load key file {}", key.display()))?;
            client.authenticate_with_key(&user, &keypair).await?
        }
    };

    if second_factor {
        let code = prompt("second-factor code: ").await?;
        let code: u32 = code.trim().parse().context("code must be numeric")?;
        client.submit_second_factor(code).await?;
    }
    println!("authenticated as {user}");

    let status = client.admit_device(&device).await?;
    if !status.is_success() {
        bail!("device session refused: {status} (is {user}:{device} already online?)");
    }
    println!("device session {user}:{device} admitted");

    let executable = std::env::current_exe()
        .and_then(std::fs::read)
        .context("failed to read own executable for attestation")?;
    let status = client.attest(&executable).await?;
    println!("attestation: {status}");

    repl(&mut client).await
}

async fn repl(client: &mut FleetClient) -> Result<()> {
    println!("commands: CREATE <dm> | ADD <user> <dm> | RD <dm> | ET <temp> | EI <file> | RT <dm> | RI <user:dev> [out] | QUIT");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["CREATE" | "create", domain] => {
                println!("{}", client.create(domain).await?);
            }
            ["ADD" | "add", user, domain] => {
                println!("{}", client.add(user, domain).await?);
            }
            ["RD" | "rd", domain] => {
                println!("{}", client.register_device(domain).await?);
            }
            ["ET" | "et", value] => match value.parse::<f32>() {
                Ok(value) => println!("{}", client.set_temperature(value).await?),
                Err(_) => println!("not a temperature: {value}"),
            },
            ["EI" | "ei", file] => {
                let path = Path::new(file);
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    println!("bad file name: {file}");
                    continue;
                };
                match tokio::fs::read(path).await {
                    Ok(bytes) => println!("{}", client.upload_image(name, &bytes).await?),
                    Err(e) => println!("cannot read {file}: {e}"),
                }
            }
            ["RT" | "rt", domain] => match client.read_temperatures(domain).await? {
                Ok(listing) => print!("{listing}"),
                Err(status) => println!("{status}"),
            },
            ["RI" | "ri", full_id, rest @ ..] => match client.read_image(full_id).await? {
                Ok(bytes) => {
                    let out = rest.first().copied().unwrap_or("image.out");
                    tokio::fs::write(out, &bytes)
                        .await
                        .with_context(|| format!("failed to write {out}"))?;
                    println!("OK ({} bytes -> {out})", bytes.len());
                }
                Err(status) => println!("{status}"),
            },
            ["QUIT" | "quit" | "exit"] => {
                client.disconnect().await?;
                break;
            }
            _ => println!("unrecognized command: {line}"),
        }
    }
    Ok(())
}

async fn connect(
    server: &str,
    tls_ca: Option<&Path>,
    tls_name: Option<&str>,
) -> Result<Box<dyn Transport>> {
    let tcp = tokio::net::TcpStream::connect(server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;

    let Some(ca_path) = tls_ca else {
        tracing::warn!("connecting without TLS");
        return Ok(Box::new(tcp));
    };

    let ca_pem = std::fs::read(ca_path)
        .with_context(|| format!("failed to read CA bundle {}", ca_path.display()))?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut &ca_pem[..]) {
        roots.add(cert.context("failed to parse CA certificate")?)?;
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));

    let host = tls_name
        .map(str::to_string)
        .or_else(|| server.rsplit_once(':').map(|(h, _)| h.to_string()))
        .context("cannot derive TLS server name")?;
    let server_name =
        rustls::pki_types::ServerName::try_from(host).context("invalid TLS server name")?;

    let tls = connector
        .connect(server_name, tcp)
        .await
        .context("TLS handshake failed")?;
    Ok(Box::new(tls))
}

async fn prompt(text: &str) -> Result<String> {
    use std::io::Write;
    print!("{text}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(line)
}
