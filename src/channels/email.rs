//! IMAP (inbound) and SMTP via lettre (outbound) for the service mailbox.
//!
//! IMAP is spoken directly over a rustls stream. Every IMAP call is blocking,
//! so each session operation runs on the blocking pool.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use rustls::{ClientConnection, StreamOwned};
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{MailSender, Mailbox, MailboxSession};
use crate::error::{ConfigError, MailboxError};
use crate::pipeline::types::OutgoingMail;

/// Socket timeout for IMAP and SMTP.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Install ring as the process-wide rustls provider. Safe to call repeatedly.
pub fn ensure_crypto_provider() {
    // Err only means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

// ── Configuration ───────────────────────────────────────────────────

/// Service mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Address replies and forwards are sent from; also the fallback forward target.
    pub from_address: String,
    /// Seconds between automatic cycles; 0 disables the timer.
    pub poll_interval_secs: u64,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `EMAIL_IMAP_HOST` is not set (inbox processing disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(imap_host) = std::env::var("EMAIL_IMAP_HOST") else {
            return Ok(None);
        };

        let imap_port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let smtp_host =
            std::env::var("EMAIL_SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));

        let smtp_port: u16 = std::env::var("EMAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("EMAIL_USERNAME").map_err(|_| ConfigError::MissingRequired {
            key: "EMAIL_USERNAME".into(),
            hint: "Set it to the service mailbox login.".into(),
        })?;
        let password = std::env::var("EMAIL_PASSWORD").map_err(|_| ConfigError::MissingRequired {
            key: "EMAIL_PASSWORD".into(),
            hint: "Use an app password for the service mailbox.".into(),
        })?;
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        let poll_interval_secs: u64 = std::env::var("EMAIL_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Ok(Some(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password: SecretString::from(password),
            from_address,
            poll_interval_secs,
        }))
    }
}

// ── IMAP ────────────────────────────────────────────────────────────

/// The service inbox over IMAPS.
pub struct ImapMailbox {
    config: EmailConfig,
}

impl ImapMailbox {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    fn server(&self) -> &str {
        &self.config.imap_host
    }

    async fn connect(&self) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let config = self.config.clone();
        let server = config.imap_host.clone();
        let conn = tokio::task::spawn_blocking(move || ImapConnection::open(&config))
            .await
            .map_err(|e| MailboxError::Connection {
                server,
                reason: format!("connect task failed: {e}"),
            })??;
        Ok(Box::new(ImapSession { conn: Some(conn) }))
    }
}

/// Session handle. The connection moves onto the blocking pool for each call.
struct ImapSession {
    conn: Option<ImapConnection>,
}

impl ImapSession {
    async fn run<T, F>(&mut self, command: &str, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapConnection) -> Result<T, MailboxError> + Send + 'static,
    {
        let mut conn = self.conn.take().ok_or_else(|| MailboxError::Command {
            command: command.to_string(),
            reason: "session is closed".into(),
        })?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| MailboxError::Command {
            command: command.to_string(),
            reason: format!("IMAP task failed: {e}"),
        })?;
        self.conn = Some(conn);
        result
    }
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn list_unread(&mut self) -> Result<Vec<String>, MailboxError> {
        self.run("UID SEARCH", |conn| conn.search_unseen()).await
    }

    async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError> {
        let uid = id.to_string();
        self.run("UID FETCH", move |conn| conn.fetch_peek(&uid)).await
    }

    async fn mark_seen(&mut self, id: &str) -> Result<(), MailboxError> {
        let uid = id.to_string();
        self.run("UID STORE", move |conn| conn.store_seen(&uid)).await
    }

    async fn disconnect(&mut self) -> Result<(), MailboxError> {
        if self.conn.is_none() {
            return Ok(());
        }
        let result = self.run("LOGOUT", |conn| conn.logout()).await;
        // Dropping the stream closes the socket whether or not LOGOUT succeeded.
        self.conn = None;
        result
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        if self.conn.is_some() {
            tracing::warn!("IMAP session dropped without LOGOUT; closing socket");
        }
    }
}

/// A tagged IMAP response: untagged lines plus any literals they carried.
#[derive(Debug, Default)]
struct ImapResponse {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// Blocking IMAP connection over TLS.
struct ImapConnection {
    tls: StreamOwned<ClientConnection, TcpStream>,
    tag_counter: u32,
}

impl ImapConnection {
    /// Connect, read the greeting, log in and select INBOX.
    fn open(config: &EmailConfig) -> Result<Self, MailboxError> {
        let server = config.imap_host.clone();
        let connection_error = |reason: String| MailboxError::Connection {
            server: server.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .map_err(|e| connection_error(format!("TCP connect failed: {e}")))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))
            .and_then(|()| tcp.set_write_timeout(Some(IO_TIMEOUT)))
            .map_err(|e| connection_error(format!("socket setup failed: {e}")))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| connection_error(format!("TLS setup failed: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| connection_error(format!("invalid server name: {e}")))?;
        let conn = ClientConnection::new(Arc::new(tls_config), server_name)
            .map_err(|e| connection_error(format!("TLS handshake setup failed: {e}")))?;

        let mut imap = Self {
            tls: StreamOwned::new(conn, tcp),
            tag_counter: 0,
        };

        let greeting = imap
            .read_line()
            .map_err(|e| connection_error(format!("no greeting: {e}")))?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(connection_error(format!("unexpected greeting: {}", greeting.trim())));
        }

        imap.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))
        .map_err(|e| connection_error(format!("login failed: {e}")))?;

        imap.command("SELECT \"INBOX\"")
            .map_err(|e| connection_error(format!("SELECT INBOX failed: {e}")))?;

        tracing::debug!(server = %config.imap_host, "IMAP session opened");
        Ok(imap)
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte)? {
                0 => {
                    return Err(MailboxError::Command {
                        command: "read".into(),
                        reason: "IMAP connection closed".into(),
                    });
                }
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }

    /// Send a command and collect its response, reading literals in place.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, MailboxError> {
        let tag = self.next_tag();
        let verb = cmd.split_whitespace().next().unwrap_or("").to_string();
        self.tls.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.tls.flush()?;

        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailboxError::Command {
                    command: verb,
                    reason: status.trim().to_string(),
                });
            }
            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.tls.read_exact(&mut literal)?;
                response.literals.push(literal);
            }
            response.lines.push(line);
        }
    }

    fn search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let response = self.command("UID SEARCH UNSEEN")?;
        Ok(parse_search(&response.lines))
    }

    /// `BODY.PEEK[]` leaves the `\Seen` flag untouched.
    fn fetch_peek(&mut self, uid: &str) -> Result<Vec<u8>, MailboxError> {
        let response = self.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        response
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Command {
                command: "UID FETCH".into(),
                reason: format!("no message body returned for UID {uid}"),
            })
    }

    fn store_seen(&mut self, uid: &str) -> Result<(), MailboxError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT")?;
        Ok(())
    }
}

/// Quote a string for IMAP: wrap in quotes, escape `\` and `"`.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Byte length of a literal announced at the end of a line (`... {123}\r\n`).
fn literal_length(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

/// UIDs from `* SEARCH ...` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Outbound mail through the service account's SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    /// Build the transport. Port 465 uses implicit TLS, anything else STARTTLS.
    pub fn new(config: &EmailConfig) -> Result<Self, MailboxError> {
        ensure_crypto_provider();
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let builder = if config.smtp_port == 465 {
            SmtpTransport::relay(&config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| MailboxError::Connection {
            server: config.smtp_host.clone(),
            reason: format!("SMTP relay error: {e}"),
        })?;

        let transport = builder
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(IO_TIMEOUT))
            .build();

        Ok(Self { transport })
    }
}

/// Build the lettre message for an outgoing mail.
fn build_message(mail: &OutgoingMail) -> Result<Message, MailboxError> {
    let send_failed = |reason: String| MailboxError::SendFailed {
        to: mail.to.clone(),
        reason,
    };

    Message::builder()
        .from(
            mail.from
                .parse()
                .map_err(|e| send_failed(format!("Invalid from address: {e}")))?,
        )
        .to(mail
            .to
            .parse()
            .map_err(|e| send_failed(format!("Invalid to address: {e}")))?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| send_failed(format!("Failed to build email: {e}")))
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        let email = build_message(mail)?;
        let transport = self.transport.clone();
        let to = mail.to.clone();

        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailboxError::SendFailed {
                to: to.clone(),
                reason: format!("SMTP task failed: {e}"),
            })?
            .map_err(|e| MailboxError::SendFailed {
                to: to.clone(),
                reason: format!("SMTP send failed: {e}"),
            })?;

        tracing::info!(to = %to, subject = %mail.subject, "Email sent");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
