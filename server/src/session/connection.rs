//! Individual robot session handling

use anyhow::{Context, Result};
use pickbot_shared::codec::{self, LineDecoder};
use pickbot_shared::profile::VelocityProfile;
use pickbot_shared::{Command, SensorReport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

/// Handle to send commands to a specific robot
#[derive(Clone)]
pub struct SessionHandle {
    /// Remote-address derived identity, e.g. `192.168.1.7:49212`
    pub session_id: String,
    pub addr: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    pub connected_at: Instant,
}

impl SessionHandle {
    /// Send one already-terminated raw line (manual-override path, bypasses
    /// the controller)
    pub async fn send_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Send a command token, preceded by the two speed-set tokens when the
    /// velocity profile changed.
    ///
    /// Each token is a separate send, so a failure names the exact token
    /// that broke. No acknowledgement is expected for the speed tokens.
    pub async fn send_command(
        &self,
        command: Command,
        profile_change: Option<VelocityProfile>,
    ) -> Result<()> {
        let mut writer = self.writer.lock().await;

        if let Some(profile) = profile_change {
            let [right, left] = codec::encode_speed_lines(profile);
            writer
                .write_all(right.as_bytes())
                .await
                .context("failed to write SET_SPEED_RIGHT token")?;
            writer
                .write_all(left.as_bytes())
                .await
                .context("failed to write SET_SPEED_LEFT token")?;
        }

        writer
            .write_all(codec::encode_command(command).as_bytes())
            .await
            .context("failed to write command token")?;
        Ok(())
    }
}

/// Active robot connection: the read half plus the line framing state
pub struct RobotSession {
    handle: SessionHandle,
    reader: OwnedReadHalf,
    decoder: LineDecoder,
    read_buf: Vec<u8>,
    /// Optional hardening: drop sessions that stay quiet for too long
    read_timeout: Option<Duration>,
}

impl RobotSession {
    pub fn new(stream: TcpStream, addr: SocketAddr, read_timeout: Option<Duration>) -> Self {
        let (reader, writer) = stream.into_split();

        let handle = SessionHandle {
            session_id: addr.to_string(),
            addr,
            writer: Arc::new(Mutex::new(writer)),
            connected_at: Instant::now(),
        };

        Self {
            handle,
            reader,
            decoder: LineDecoder::new(),
            read_buf: vec![0u8; 1024],
            read_timeout,
        }
    }

    /// Get a cloneable handle for sending commands
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn session_id(&self) -> &str {
        &self.handle.session_id
    }

    /// Read the next sensor report from this robot.
    ///
    /// Returns `None` once the session is over: clean close, read error,
    /// framing violation, or an expired read timeout. A zero-byte read is
    /// the peer closing, never a malformed report.
    pub async fn recv(&mut self) -> Option<SensorReport> {
        loop {
            match self.decoder.next_line() {
                Ok(Some(line)) => return Some(codec::decode_report(&line)),
                Ok(None) => {} // need more data
                Err(e) => {
                    warn!(session = %self.handle.session_id, error = %e, "framing violation, dropping session");
                    return None;
                }
            }

            let read = match self.read_timeout {
                Some(limit) => match timeout(limit, self.reader.read(&mut self.read_buf)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(session = %self.handle.session_id, "robot quiet past the read timeout");
                        return None;
                    }
                },
                None => self.reader.read(&mut self.read_buf).await,
            };

            match read {
                Ok(0) => {
                    info!(session = %self.handle.session_id, "robot closed the connection");
                    return None;
                }
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!(session = %self.handle.session_id, error = %e, "read error");
                    return None;
                }
            }
        }
    }
}
