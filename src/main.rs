mod scenario;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pickbot_shared::codec::{self, LineDecoder};
use pickbot_shared::Command;
use scenario::Scenario;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Simulated pick-and-place robot: plays a scripted perception scenario
/// against the control server and reports the commands it is given
#[derive(Debug, Parser)]
#[command(name = "pickbot-sim")]
struct Args {
    /// Control server address
    #[arg(long, default_value = "127.0.0.1:1234")]
    server: String,

    /// Scenario to play
    #[arg(long, default_value = "delivery")]
    scenario: String,

    /// Delay between observations, in milliseconds
    #[arg(long, default_value_t = 200)]
    interval_ms: u64,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let scenario = Scenario::by_name(&args.scenario).with_context(|| {
        format!(
            "unknown scenario '{}' (available: {})",
            args.scenario,
            Scenario::names().join(", ")
        )
    })?;

    info!(
        scenario = scenario.name,
        server = %args.server,
        "robot simulator starting: {}",
        scenario.description
    );

    let stream = connect_with_backoff(&args.server, args.max_attempts).await?;
    play_scenario(stream, &scenario, Duration::from_millis(args.interval_ms)).await
}

/// Connect to the control server, retrying with exponential backoff
async fn connect_with_backoff(addr: &str, max_attempts: u32) -> Result<TcpStream> {
    let mut delay = Duration::from_secs(1);

    for attempt in 1..=max_attempts {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!(server = %addr, attempt, "connected");
                return Ok(stream);
            }
            Err(e) if attempt < max_attempts => {
                warn!(error = %e, attempt, retry_in = ?delay, "connection failed");
                sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to connect to {addr} after {attempt} attempts"));
            }
        }
    }

    bail!("failed to connect to {addr}")
}

/// Send each observation and wait for the command it provokes; speed-set
/// lines may arrive before the command and are counted separately
async fn play_scenario(stream: TcpStream, scenario: &Scenario, interval: Duration) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = LineDecoder::new();
    let mut read_buf = vec![0u8; 1024];
    let mut received = Vec::new();
    let mut speed_updates = 0usize;

    for (index, observation) in scenario.observations.iter().enumerate() {
        writer
            .write_all(codec::encode_report(observation).as_bytes())
            .await
            .context("failed to send observation")?;
        debug!(index, label = %observation.label, size = observation.size, "observation sent");

        let command = loop {
            let line = next_line(&mut reader, &mut decoder, &mut read_buf).await?;
            if line.starts_with("SET_SPEED_") {
                speed_updates += 1;
                debug!(line = %line, "speed update");
                continue;
            }
            match Command::from_token(&line) {
                Some(command) => break command,
                None => warn!(line = %line, "unrecognized token from server"),
            }
        };

        info!(index, command = %command, "command received");
        received.push(command);

        sleep(interval).await;
    }

    let grabs = received.iter().filter(|c| **c == Command::Grab).count();
    let releases = received.iter().filter(|c| **c == Command::Release).count();
    info!(
        commands = received.len(),
        grabs, releases, speed_updates, "scenario complete"
    );

    Ok(())
}

async fn next_line(
    reader: &mut OwnedReadHalf,
    decoder: &mut LineDecoder,
    read_buf: &mut [u8],
) -> Result<String> {
    loop {
        if let Some(line) = decoder.next_line()? {
            return Ok(line);
        }
        let n = reader.read(read_buf).await.context("read failed")?;
        if n == 0 {
            bail!("server closed the connection");
        }
        decoder.extend(&read_buf[..n]);
    }
}
