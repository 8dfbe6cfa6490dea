// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::executor::TargetWorker;
use crate::{
    decoder::OutputDialect,
    events::{RunId, TargetEvent, TargetId},
};
use camino::{Utf8Path, Utf8PathBuf};
use futures::prelude::*;
use std::{
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
};
use tokio::sync::{broadcast, mpsc::unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Everything needed to run a single target: the rendered command line, the
/// dialect its stdout is in, and where to run it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetPlan {
    target: TargetId,
    argv: Vec<String>,
    dialect: OutputDialect,
    working_dir: Option<Utf8PathBuf>,
}

impl TargetPlan {
    /// Creates a new plan. The first element of `argv` is the program.
    pub fn new(
        target: TargetId,
        argv: impl IntoIterator<Item = impl Into<String>>,
        dialect: OutputDialect,
    ) -> Self {
        Self {
            target,
            argv: argv.into_iter().map(Into::into).collect(),
            dialect,
            working_dir: None,
        }
    }

    /// Sets the directory the command is run in.
    pub fn with_working_dir(mut self, working_dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Returns the target this plan runs.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Returns the argument vector, program first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Returns the output dialect.
    pub fn dialect(&self) -> OutputDialect {
        self.dialect
    }

    /// Returns the working directory, if any.
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.working_dir.as_deref()
    }

    /// Returns the command line, quoted for display.
    pub fn display_command(&self) -> String {
        shell_words::join(&self.argv)
    }
}

/// Spawns targets, one worker per target.
///
/// Every call to [`execute`](Self::execute) starts a new run with a run ID
/// strictly greater than any handed out before by this executor.
#[derive(Debug, Default)]
pub struct TargetExecutor {
    last_run_id: AtomicU64,
}

impl TargetExecutor {
    /// Creates a new executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a run of the given plans.
    ///
    /// Each plan gets its own tokio task, so this must be called from within
    /// a tokio runtime. Workers start immediately and never wait on each
    /// other or on the consumer.
    pub fn execute(&self, plans: Vec<TargetPlan>) -> RunHandle {
        let run_id = RunId(self.last_run_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (sender, receiver) = unbounded_channel();
        // The channel only needs to carry a single message.
        let (cancel_sender, _) = broadcast::channel(1);

        let targets: Vec<_> = plans.iter().map(|plan| plan.target().clone()).collect();
        debug!(%run_id, targets = targets.len(), "starting run");

        for plan in plans {
            let worker = TargetWorker::new(run_id, plan, sender.clone(), cancel_sender.subscribe());
            tokio::spawn(worker.run());
        }
        // Each worker now owns the only remaining senders, so the channel
        // closes once the last Done marker has been sent.
        drop(sender);

        RunHandle {
            run_id,
            targets,
            receiver: UnboundedReceiverStream::new(receiver),
            cancel_sender,
            cancelled: false,
        }
    }
}

/// The receiving end of a single run.
///
/// Yields the events of every target in the run, ending once every target
/// has sent its Done marker. Dropping the handle cancels the run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    targets: Vec<TargetId>,
    receiver: UnboundedReceiverStream<TargetEvent>,
    cancel_sender: broadcast::Sender<()>,
    cancelled: bool,
}

impl RunHandle {
    /// Returns the run ID.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Returns the targets in this run, in plan order.
    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    /// Receives the next event, or `None` once every target is done.
    ///
    /// This method is cancel safe.
    pub async fn recv(&mut self) -> Option<TargetEvent> {
        self.receiver.next().await
    }

    /// Asks every worker of this run to kill its subprocess.
    ///
    /// Workers still flush their decoders and send their Done markers, so the
    /// handle should keep being polled until it ends.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            debug!(run_id = %self.run_id, "cancelling run");
            self.cancelled = true;
            // An error here means every worker is already gone.
            _ = self.cancel_sender.send(());
        }
    }

    /// Returns true if [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Reads and discards the remaining events, returning how many there
    /// were.
    pub async fn drain(mut self) -> usize {
        let mut count = 0;
        while self.recv().await.is_some() {
            count += 1;
        }
        count
    }
}

impl Stream for RunHandle {
    type Item = TargetEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}
