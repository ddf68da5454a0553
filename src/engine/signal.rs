//! OS termination signals that end a `RunMode::UntilSignal` run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A termination signal the digester can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    Hangup,
    /// SIGQUIT.
    Quit,
}

impl StopSignal {
    /// The set used when none is configured.
    pub fn defaults() -> Vec<StopSignal> {
        vec![StopSignal::Interrupt, StopSignal::Terminate]
    }
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
            StopSignal::Hangup => "SIGHUP",
            StopSignal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for StopSignal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().trim_start_matches("sig") {
            "int" | "interrupt" => Ok(StopSignal::Interrupt),
            "term" | "terminate" => Ok(StopSignal::Terminate),
            "hup" | "hangup" => Ok(StopSignal::Hangup),
            "quit" => Ok(StopSignal::Quit),
            _ => Err(Error::InvalidConfig(format!("unknown stop signal: {s}"))),
        }
    }
}

/// Install listeners for `signals` and wait until one of them fires.
///
/// Listeners are registered before the first await, so a signal delivered
/// after this is called is never missed.
#[cfg(unix)]
pub(crate) async fn wait_for_any(signals: &[StopSignal]) -> Result<StopSignal> {
    use std::task::Poll;
    use tokio::signal::unix::{SignalKind, signal};

    if signals.is_empty() {
        return Err(Error::InvalidConfig("no stop signals to wait for".into()));
    }

    let mut streams = signals
        .iter()
        .map(|s| -> Result<_> {
            let kind = match s {
                StopSignal::Interrupt => SignalKind::interrupt(),
                StopSignal::Terminate => SignalKind::terminate(),
                StopSignal::Hangup => SignalKind::hangup(),
                StopSignal::Quit => SignalKind::quit(),
            };
            Ok((*s, signal(kind)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let received = std::future::poll_fn(|cx| {
        for (sig, stream) in streams.iter_mut() {
            if stream.poll_recv(cx).is_ready() {
                return Poll::Ready(*sig);
            }
        }
        Poll::Pending
    })
    .await;

    Ok(received)
}

#[cfg(not(unix))]
pub(crate) async fn wait_for_any(signals: &[StopSignal]) -> Result<StopSignal> {
    if let Some(other) = signals.iter().find(|s| **s != StopSignal::Interrupt) {
        return Err(Error::InvalidConfig(format!(
            "{other} is not supported on this platform"
        )));
    }
    if signals.is_empty() {
        return Err(Error::InvalidConfig("no stop signals to wait for".into()));
    }
    tokio::signal::ctrl_c().await?;
    Ok(StopSignal::Interrupt)
}
