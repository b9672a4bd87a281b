// Mail transport check
//
// smtp/gmail: open a TCP session and run the greeting -> EHLO -> QUIT exchange.
// sendmail: make sure a sendmail-compatible binary can be resolved.

use super::{CheckFailure, MailingChecker};
use crate::models::settings::{
    MailingSettings, TRANSPORT_GMAIL, TRANSPORT_SENDMAIL, TRANSPORT_SMTP,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const GMAIL_HOST: &str = "smtp.gmail.com";
const GMAIL_PORT: u16 = 587;
const SMTP_DEFAULT_PORT: u16 = 25;
const SENDMAIL_FALLBACK_PATHS: &[&str] = &["/usr/sbin/sendmail", "/usr/lib/sendmail"];

#[derive(Debug, Clone)]
pub struct SmtpMailingChecker {
    helo_name: String,
}

impl Default for SmtpMailingChecker {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl SmtpMailingChecker {
    pub fn new(helo_name: impl Into<String>) -> Self {
        Self {
            helo_name: helo_name.into(),
        }
    }
}

const MAX_REPLY_LINE: u64 = 1024;
const MAX_REPLY_LINES: usize = 64;

/// Read one (possibly multi-line) SMTP reply; returns the status code and the last line.
async fn read_reply<R>(reader: &mut R) -> Result<(u16, String)>
where
    R: AsyncBufRead + Unpin,
{
    for _ in 0..MAX_REPLY_LINES {
        let mut line = String::new();
        let n = (&mut *reader)
            .take(MAX_REPLY_LINE)
            .read_line(&mut line)
            .await
            .context("Failed to read SMTP reply")?;
        if n == 0 {
            anyhow::bail!("Server closed the connection");
        }
        if n as u64 == MAX_REPLY_LINE && !line.ends_with('\n') {
            anyhow::bail!("SMTP reply line exceeds {} bytes", MAX_REPLY_LINE);
        }
        let line = line.trim_end().to_string();
        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("Malformed SMTP reply: {:?}", line))?;
        // "250-..." continues, "250 ..." ends the reply
        if line.as_bytes().get(3) != Some(&b'-') {
            return Ok((code, line));
        }
    }
    anyhow::bail!("SMTP reply exceeds {} lines", MAX_REPLY_LINES)
}

/// Greeting, EHLO and QUIT against `host:port`.
pub async fn smtp_handshake(host: &str, port: u16, helo_name: &str) -> Result<()> {
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("TCP connect to {}:{} failed", host, port))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let (code, line) = read_reply(&mut reader).await?;
    if code != 220 {
        anyhow::bail!("Unexpected greeting: {}", line);
    }

    write_half
        .write_all(format!("EHLO {}\r\n", helo_name).as_bytes())
        .await
        .context("Failed to send EHLO")?;
    let (code, line) = read_reply(&mut reader).await?;
    if code != 250 {
        anyhow::bail!("EHLO rejected: {}", line);
    }

    write_half.write_all(b"QUIT\r\n").await.ok();
    let _ = read_reply(&mut reader).await;
    Ok(())
}

fn resolve_sendmail() -> Option<std::path::PathBuf> {
    which::which("sendmail").ok().or_else(|| {
        SENDMAIL_FALLBACK_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.is_file())
            .map(Path::to_path_buf)
    })
}

#[async_trait]
impl MailingChecker for SmtpMailingChecker {
    async fn test_transport(&self, settings: &MailingSettings) -> Result<(), CheckFailure> {
        let transport = settings.transport();
        info!(
            "[PHASE: wizard] [STEP: mailing_check] Testing transport (transport={})",
            transport
        );

        let (host, port) = match transport {
            TRANSPORT_SMTP => {
                let port = settings
                    .option("port")
                    .trim()
                    .parse::<u16>()
                    .unwrap_or(SMTP_DEFAULT_PORT);
                (settings.option("host").trim().to_string(), port)
            }
            TRANSPORT_GMAIL => (GMAIL_HOST.to_string(), GMAIL_PORT),
            TRANSPORT_SENDMAIL => {
                return match resolve_sendmail() {
                    Some(path) => {
                        info!(
                            "[PHASE: wizard] [STEP: mailing_check] sendmail resolved (path={:?})",
                            path
                        );
                        Ok(())
                    }
                    None => Err(CheckFailure::new(
                        "No sendmail binary was found on this server.",
                        "sendmail not found on PATH or fallback locations",
                    )),
                };
            }
            other => {
                return Err(CheckFailure::new(
                    format!("Unsupported mail transport '{}'.", other),
                    format!("unsupported transport {}", other),
                ));
            }
        };

        // Implicit TLS has no plaintext greeting; reachability is all we can verify here.
        if settings.option("encryption").eq_ignore_ascii_case("ssl") {
            return match TcpStream::connect((host.as_str(), port)).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    warn!(
                        "[PHASE: wizard] [STEP: mailing_check] TLS endpoint unreachable ({}:{}): {}",
                        host, port, e
                    );
                    Err(CheckFailure::new(
                        format!("Unable to reach the mail server {}:{}.", host, port),
                        e.to_string(),
                    ))
                }
            };
        }

        match smtp_handshake(&host, port, &self.helo_name).await {
            Ok(()) => {
                info!(
                    "[PHASE: wizard] [STEP: mailing_check] Handshake succeeded ({}:{})",
                    host, port
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: mailing_check] Handshake failed ({}:{}): {:#}",
                    host, port, e
                );
                Err(CheckFailure::new(
                    format!(
                        "The mail server {}:{} did not accept the connection. Verify the host, port and encryption settings.",
                        host, port
                    ),
                    format!("{:#}", e),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::FieldMap;
    use tokio::net::TcpListener;

    /// Minimal SMTP peer: sends `greeting`, answers EHLO with `ehlo_reply`.
    async fn fake_smtp_server(greeting: &'static str, ehlo_reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let (r, mut w) = stream.into_split();
                let mut reader = BufReader::new(r);
                let _ = w.write_all(greeting.as_bytes()).await;
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                    let _ = w.write_all(ehlo_reply.as_bytes()).await;
                }
                line.clear();
                if reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                    let _ = w.write_all(b"221 bye\r\n").await;
                }
            }
        });
        port
    }

    fn smtp_settings(port: u16) -> MailingSettings {
        let mut s = MailingSettings::default();
        let mut options = FieldMap::new();
        options.insert("host".to_string(), "127.0.0.1".to_string());
        options.insert("port".to_string(), port.to_string());
        s.set_transport_options(options);
        s
    }

    #[tokio::test]
    async fn smtp_handshake_accepts_multiline_ehlo() {
        let port =
            fake_smtp_server("220 mx ESMTP\r\n", "250-mx\r\n250-PIPELINING\r\n250 OK\r\n")
                .await;
        let checker = SmtpMailingChecker::default();
        checker
            .test_transport(&smtp_settings(port))
            .await
            .expect("handshake should succeed");
    }

    #[tokio::test]
    async fn smtp_refusing_greeting_fails() {
        let port = fake_smtp_server("554 no service here\r\n", "").await;
        let checker = SmtpMailingChecker::default();
        let err = checker
            .test_transport(&smtp_settings(port))
            .await
            .expect_err("554 greeting must fail");
        assert!(err.user_message.contains("did not accept"));
        assert!(err.internal_details.contains("554"));
    }

    #[tokio::test]
    async fn unknown_transport_fails() {
        let mut s = MailingSettings::default();
        s.set_transport("pigeon");
        let err = SmtpMailingChecker::default()
            .test_transport(&s)
            .await
            .expect_err("unknown transport");
        assert!(err.user_message.contains("pigeon"));
    }

    #[tokio::test]
    async fn read_reply_rejects_short_lines() {
        let mut input: &[u8] = b"25\r\n";
        let mut reader = BufReader::new(&mut input);
        assert!(read_reply(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn read_reply_caps_line_length() {
        let mut greeting = b"220 ".to_vec();
        greeting.extend(std::iter::repeat(b'x').take(4096));
        greeting.extend_from_slice(b"\r\n");
        let mut input: &[u8] = &greeting;
        let mut reader = BufReader::new(&mut input);
        let err = read_reply(&mut reader).await.expect_err("overlong line");
        assert!(format!("{:#}", err).contains("exceeds"));
    }

    #[tokio::test]
    async fn read_reply_caps_continuation_lines() {
        let endless = "250-more\r\n".repeat(MAX_REPLY_LINES + 1);
        let mut input: &[u8] = endless.as_bytes();
        let mut reader = BufReader::new(&mut input);
        assert!(read_reply(&mut reader).await.is_err());
    }
}
