//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the configured stop signals
//! - Translate the first delivered signal into a [`StopSignal`]
//!
//! # Design Decisions
//! - Handlers are installed up front, before any capability starts, so an
//!   installation failure never leaves tasks running
//! - An empty signal set disables OS signal handling entirely

use std::fmt;

/// A signal that stops the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    Hangup,
    /// SIGQUIT.
    Quit,
}

impl StopSignal {
    /// Interrupt and terminate.
    pub const DEFAULT: [StopSignal; 2] = [StopSignal::Interrupt, StopSignal::Terminate];
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
            StopSignal::Hangup => "SIGHUP",
            StopSignal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// Installed handlers for a set of stop signals.
pub struct SignalListener {
    #[cfg(unix)]
    streams: Vec<(StopSignal, tokio::signal::unix::Signal)>,
    #[cfg(not(unix))]
    signals: Vec<StopSignal>,
}

impl SignalListener {
    #[cfg(unix)]
    pub fn install(signals: &[StopSignal]) -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, Signal, SignalKind};

        let mut streams: Vec<(StopSignal, Signal)> = Vec::with_capacity(signals.len());
        for &stop in signals {
            if streams.iter().any(|(installed, _)| *installed == stop) {
                continue;
            }
            let kind = match stop {
                StopSignal::Interrupt => SignalKind::interrupt(),
                StopSignal::Terminate => SignalKind::terminate(),
                StopSignal::Hangup => SignalKind::hangup(),
                StopSignal::Quit => SignalKind::quit(),
            };
            streams.push((stop, signal(kind)?));
        }
        Ok(Self { streams })
    }

    #[cfg(not(unix))]
    pub fn install(signals: &[StopSignal]) -> std::io::Result<Self> {
        Ok(Self {
            signals: signals.to_vec(),
        })
    }

    /// Wait for the next stop signal. Never resolves for an empty set.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> StopSignal {
        if self.streams.is_empty() {
            return std::future::pending().await;
        }
        let pending = self.streams.iter_mut().map(|(stop, stream)| {
            Box::pin(async move {
                // `None` means the driver is gone; keep waiting on the others.
                match stream.recv().await {
                    Some(()) => *stop,
                    None => std::future::pending().await,
                }
            })
        });
        let (stop, _, _) = futures_util::future::select_all(pending).await;
        stop
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> StopSignal {
        if !self.signals.contains(&StopSignal::Interrupt) {
            return std::future::pending().await;
        }
        match tokio::signal::ctrl_c().await {
            Ok(()) => StopSignal::Interrupt,
            Err(_) => std::future::pending().await,
        }
    }

    #[cfg(unix)]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    #[cfg(not(unix))]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(unix)]
        let installed: Vec<StopSignal> = self.streams.iter().map(|(stop, _)| *stop).collect();
        #[cfg(not(unix))]
        let installed = self.signals.clone();
        f.debug_struct("SignalListener")
            .field("signals", &installed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_set_never_fires() {
        let mut listener = SignalListener::install(&[]).unwrap();
        assert!(listener.is_empty());

        let fired = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            listener.recv(),
        )
        .await;
        assert!(fired.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_duplicate_signals_installed_once() {
        let listener = SignalListener::install(&[
            StopSignal::Hangup,
            StopSignal::Hangup,
            StopSignal::Quit,
        ])
        .unwrap();
        assert_eq!(listener.streams.len(), 2);
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(StopSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(StopSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(StopSignal::DEFAULT.len(), 2);
    }
}
