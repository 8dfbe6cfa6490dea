// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals in lazytest.

use crate::errors::SignalHandlerSetupError;
use futures::stream::{BoxStream, SelectAll, StreamExt};
use std::fmt;

/// The kind of signal handling to set up for a run.
///
/// A `SignalHandlerKind` can be passed into
/// [`SessionRunnerBuilder::build`](crate::runner::SessionRunnerBuilder::build).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum SignalHandlerKind {
    /// The standard signal handler. Capture interrupt and termination signals depending on the
    /// platform.
    Standard,

    /// A no-op signal handler. Useful for tests.
    Noop,
}

impl SignalHandlerKind {
    /// Builds the signal handler. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => SignalHandler::new(),
            Self::Noop => Ok(SignalHandler::noop()),
        }
    }
}

/// Listens for shutdown signals.
///
/// Every signal kind is a stream of [`ShutdownEvent`]s; the handler merges
/// them and yields whichever arrives first.
pub struct SignalHandler {
    signals: Option<SelectAll<BoxStream<'static, ShutdownEvent>>>,
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHandler")
            .field("listening", &self.signals.as_ref().map_or(0, |s| s.len()))
            .finish()
    }
}

impl SignalHandler {
    fn new() -> Result<Self, SignalHandlerSetupError> {
        Ok(Self {
            signals: Some(shutdown_streams()?.into_iter().collect()),
        })
    }

    /// Creates a new `SignalHandler` that does nothing.
    pub fn noop() -> Self {
        Self { signals: None }
    }

    /// Waits for the next shutdown signal.
    ///
    /// Returns `None` once no more signals can arrive. For the no-op handler
    /// that is immediately, so callers in a `select!` loop should stop polling
    /// after the first `None`.
    pub async fn recv(&mut self) -> Option<ShutdownEvent> {
        self.signals.as_mut()?.next().await
    }
}

#[cfg(unix)]
fn shutdown_streams() -> std::io::Result<Vec<BoxStream<'static, ShutdownEvent>>> {
    use tokio::signal::unix::{SignalKind, signal};
    use tokio_stream::wrappers::SignalStream;

    [
        (SignalKind::interrupt(), ShutdownEvent::Interrupt),
        (SignalKind::hangup(), ShutdownEvent::Hangup),
        (SignalKind::terminate(), ShutdownEvent::Term),
    ]
    .into_iter()
    .map(|(kind, event)| {
        let stream = SignalStream::new(signal(kind)?);
        Ok(stream.map(move |()| event).boxed())
    })
    .collect()
}

#[cfg(windows)]
fn shutdown_streams() -> std::io::Result<Vec<BoxStream<'static, ShutdownEvent>>> {
    use tokio::signal::windows::ctrl_c;
    use tokio_stream::wrappers::CtrlCStream;

    let stream = CtrlCStream::new(ctrl_c()?);
    Ok(vec![stream.map(|()| ShutdownEvent::Interrupt).boxed()])
}

/// A signal event that should cause the current run to be cancelled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// SIGHUP.
    #[cfg(unix)]
    Hangup,
    /// SIGTERM.
    #[cfg(unix)]
    Term,
    /// SIGINT, or Ctrl-C on Windows.
    Interrupt,
}

impl ShutdownEvent {
    /// Returns a short description of the signal.
    pub fn as_str(self) -> &'static str {
        match self {
            #[cfg(unix)]
            Self::Hangup => "hangup",
            #[cfg(unix)]
            Self::Term => "terminate",
            Self::Interrupt => "interrupt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_handler_never_signals() {
        let mut handler = SignalHandlerKind::Noop.build().unwrap();
        assert_eq!(handler.recv().await, None);
    }

    #[tokio::test]
    async fn standard_handler_listens() {
        let handler = SignalHandlerKind::Standard.build().unwrap();
        let expected = if cfg!(unix) { 3 } else { 1 };
        assert_eq!(handler.signals.map(|s| s.len()), Some(expected));
    }
}
