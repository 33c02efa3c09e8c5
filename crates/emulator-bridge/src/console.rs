//! Emulator Console
//!
//! Sends commands to the telnet console each emulator exposes on its port.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tracing::debug;

use droidlink_core::{Error, Result};

/// Sends one command to an emulator console and returns its answer
#[async_trait]
pub trait EmulatorConsole: Send + Sync {
    async fn send_command(&self, port: u16, command: &str) -> Result<String>;
}

/// Console client over a local TCP connection
#[derive(Debug, Clone)]
pub struct TelnetConsole {
    host: String,
    timeout: Duration,
    auth_token_path: Option<PathBuf>,
}

impl TelnetConsole {
    pub fn new(timeout: Duration) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            timeout,
            auth_token_path: dirs::home_dir().map(|h| h.join(".emulator_console_auth_token")),
        }
    }

    pub fn with_auth_token_path(mut self, path: Option<PathBuf>) -> Self {
        self.auth_token_path = path;
        self
    }

    async fn auth_token(&self) -> Result<String> {
        let path = self
            .auth_token_path
            .as_ref()
            .ok_or_else(|| Error::Console("authentication required but no token file".into()))?;
        let token = tokio::fs::read_to_string(path).await?;
        Ok(token.trim().to_string())
    }

    async fn exchange(&self, port: u16, command: &str) -> Result<String> {
        let stream = TcpStream::connect((self.host.as_str(), port)).await?;
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        let banner = read_reply(&mut lines).await?;
        if banner.iter().any(|line| line.contains("Authentication required")) {
            let token = self.auth_token().await?;
            write.write_all(format!("auth {}\r\n", token).as_bytes()).await?;
            read_reply(&mut lines).await?;
        }

        debug!("console {} <- {}", port, command);
        write.write_all(format!("{}\r\n", command).as_bytes()).await?;
        let reply = read_reply(&mut lines).await?;
        let _ = write.write_all(b"quit\r\n").await;

        Ok(reply
            .into_iter()
            .rev()
            .find(|line| !line.is_empty())
            .unwrap_or_default())
    }
}

/// Collect lines up to the terminating `OK`; `KO` is an error.
async fn read_reply(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Vec<String>> {
    let mut reply = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line == "OK" {
            return Ok(reply);
        }
        if let Some(message) = line.strip_prefix("KO") {
            return Err(Error::Console(message.trim_start_matches(':').trim().to_string()));
        }
        reply.push(line);
    }
    Err(Error::Console("console closed the connection".into()))
}

#[async_trait]
impl EmulatorConsole for TelnetConsole {
    async fn send_command(&self, port: u16, command: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.exchange(port, command)).await {
            Ok(reply) => reply,
            Err(_) => Err(Error::Console(format!(
                "'{}' on port {} timed out after {}ms",
                command,
                port,
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_console(banner: &'static str, answers: Vec<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write.write_all(banner.as_bytes()).await.unwrap();
            for answer in answers {
                if lines.next_line().await.unwrap().is_none() {
                    return;
                }
                write.write_all(answer.as_bytes()).await.unwrap();
            }
        });
        port
    }

    #[tokio::test]
    async fn test_avd_name_without_auth() {
        let port = fake_console(
            "Android Console: type 'help' for a list of commands\r\nOK\r\n",
            vec!["Pixel_6_API_33\r\nOK\r\n"],
        )
        .await;

        let console = TelnetConsole::new(Duration::from_secs(5));
        let name = console.send_command(port, "avd name").await.unwrap();
        assert_eq!(name, "Pixel_6_API_33");
    }

    #[tokio::test]
    async fn test_avd_name_with_auth() {
        let token_path = std::env::temp_dir().join(format!("droidlink-token-{}", std::process::id()));
        tokio::fs::write(&token_path, "s3cret\n").await.unwrap();

        let port = fake_console(
            "Android Console: Authentication required\r\nOK\r\n",
            vec!["Android Console: type 'help' for a list of commands\r\nOK\r\n", "Nexus_5X\r\nOK\r\n"],
        )
        .await;

        let console = TelnetConsole::new(Duration::from_secs(5)).with_auth_token_path(Some(token_path.clone()));
        let name = console.send_command(port, "avd name").await.unwrap();
        assert_eq!(name, "Nexus_5X");

        tokio::fs::remove_file(&token_path).await.unwrap();
    }

    #[tokio::test]
    async fn test_ko_reply_is_console_error() {
        let port = fake_console("OK\r\n", vec!["KO: unknown command\r\n"]).await;

        let console = TelnetConsole::new(Duration::from_secs(5));
        let err = console.send_command(port, "avd nme").await.unwrap_err();
        assert!(matches!(err, Error::Console(ref m) if m == "unknown command"));
    }
}
