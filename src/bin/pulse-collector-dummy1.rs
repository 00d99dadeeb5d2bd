//! Reference collector plugin
//!
//! Answers the handshake as `dummy1` version 1 and exits when asked to stop
//! or when the host closes stdin.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};

use pulse::plugin::{
    ControlRequest, HandshakeRequest, HandshakeResponse, MetricDescriptor, Operation, PluginMeta,
    PluginType, PROTOCOL_VERSION,
};

const NAME: &str = "dummy1";
const VERSION: i64 = 1;

fn metrics() -> Vec<MetricDescriptor> {
    vec![
        MetricDescriptor::new("/intel/dummy/foo", 1),
        MetricDescriptor {
            unit: Some("ms".to_string()),
            ..MetricDescriptor::new("/intel/dummy/bar", 1)
        },
    ]
}

fn main() -> ExitCode {
    if let Err(e) = serve() {
        eprintln!("{}: {:#}", NAME, e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn serve() -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    let request = match lines.next() {
        Some(line) => line.context("Failed to read handshake")?,
        None => bail!("stdin closed before the handshake"),
    };
    let request: HandshakeRequest =
        serde_json::from_str(&request).context("Malformed handshake request")?;
    if request.protocol != PROTOCOL_VERSION {
        bail!(
            "host speaks protocol {}, expected {}",
            request.protocol,
            PROTOCOL_VERSION
        );
    }
    if let Some(config) = &request.config {
        eprintln!("{}: received {} config key(s)", NAME, config.len());
    }

    let response = HandshakeResponse::new(
        PluginMeta::new(NAME, VERSION, PluginType::Collector),
        metrics(),
    );
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ControlRequest>(&line) {
            Ok(ControlRequest {
                operation: Operation::Stop,
            }) => {
                eprintln!("{}: stopping", NAME);
                break;
            }
            Err(e) => eprintln!("{}: ignoring message: {}", NAME, e),
        }
    }

    Ok(())
}
