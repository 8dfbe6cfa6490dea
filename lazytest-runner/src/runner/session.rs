// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunHandle, TargetExecutor, TargetPlan};
use crate::{
    errors::SessionBuildError,
    events::{RunId, TargetEvent},
    reporter::{AggregatedRun, ApplyOutcome, RunAggregator},
    signal::{ShutdownEvent, SignalHandler, SignalHandlerKind},
};
use futures::{prelude::*, stream::SelectAll};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

/// An event yielded by [`RunSession::next`].
#[derive(Debug)]
pub enum SessionEvent {
    /// An event from the current run, already applied to the session's
    /// aggregator.
    Event(TargetEvent),

    /// Every target of the current run is done.
    RunFinished(AggregatedRun),
}

/// Controls a sequence of runs, at most one of which is current.
///
/// Starting a new run cancels the current one. Its workers keep reporting
/// until they have killed their subprocesses, so superseded runs are kept in a
/// draining set and read to the end, with their events discarded.
#[derive(Debug)]
pub struct RunSession {
    executor: TargetExecutor,
    current: Option<CurrentRun>,
    draining: SelectAll<RunHandle>,
    discarded: usize,
}

#[derive(Debug)]
struct CurrentRun {
    handle: RunHandle,
    aggregator: RunAggregator,
}

impl RunSession {
    /// Creates a new session with no runs.
    pub fn new(executor: TargetExecutor) -> Self {
        Self {
            executor,
            current: None,
            draining: SelectAll::new(),
            discarded: 0,
        }
    }

    /// Starts a new run of `plans`, cancelling the current run if there is
    /// one. Must be called from within a tokio runtime.
    pub fn start(&mut self, plans: Vec<TargetPlan>) -> RunId {
        self.cancel();

        let handle = self.executor.execute(plans);
        let run_id = handle.run_id();
        let aggregator = RunAggregator::new(run_id, handle.targets().iter().cloned());
        self.current = Some(CurrentRun { handle, aggregator });
        run_id
    }

    /// Cancels the current run and moves it to the draining set.
    ///
    /// Returns the results the run had gathered so far, or `None` if there was
    /// no current run.
    pub fn cancel(&mut self) -> Option<AggregatedRun> {
        let CurrentRun {
            mut handle,
            aggregator,
        } = self.current.take()?;
        handle.cancel();
        self.draining.push(handle);
        Some(aggregator.finish())
    }

    /// Cancels the current run but keeps it current, so that its targets'
    /// Done markers are still applied and
    /// [`SessionEvent::RunFinished`] is still yielded.
    pub fn interrupt(&mut self) {
        if let Some(current) = &mut self.current {
            current.handle.cancel();
        }
    }

    /// Returns the ID of the current run.
    pub fn current_run_id(&self) -> Option<RunId> {
        self.current.as_ref().map(|current| current.handle.run_id())
    }

    /// Returns the aggregator of the current run.
    pub fn aggregator(&self) -> Option<&RunAggregator> {
        self.current.as_ref().map(|current| &current.aggregator)
    }

    /// Returns the number of superseded runs still being drained.
    pub fn draining_count(&self) -> usize {
        self.draining.len()
    }

    /// Returns the number of events discarded because their run had been
    /// superseded.
    pub fn discarded_events(&self) -> usize {
        self.discarded
    }

    /// Returns the next event of the current run.
    ///
    /// Draining runs are read at the same time so that none of their workers
    /// is ever blocked. Returns `None` once there is no current run and
    /// nothing left to drain.
    ///
    /// This method is cancel safe.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            if self
                .current
                .as_ref()
                .is_some_and(|current| current.aggregator.all_done())
            {
                return self.finish_current().map(SessionEvent::RunFinished);
            }

            tokio::select! {
                event = recv_current(&mut self.current), if self.current.is_some() => {
                    let Some(event) = event else {
                        // Every worker is gone without all Done markers
                        // having been seen.
                        return self.finish_current().map(SessionEvent::RunFinished);
                    };
                    let Some(current) = &mut self.current else {
                        continue;
                    };
                    match current.aggregator.apply(&event) {
                        ApplyOutcome::Applied => return Some(SessionEvent::Event(event)),
                        ApplyOutcome::Stale => self.discarded += 1,
                    }
                }
                Some(event) = self.draining.next() => {
                    trace!(run_id = %event.run_id, target = %event.target, "discarding stale event");
                    self.discarded += 1;
                }
                else => return None,
            }
        }
    }

    /// Waits until every superseded run has ended.
    pub async fn drain(&mut self) {
        while self.draining.next().await.is_some() {
            self.discarded += 1;
        }
        debug!(discarded = self.discarded, "finished draining runs");
    }

    fn finish_current(&mut self) -> Option<AggregatedRun> {
        let CurrentRun { handle, aggregator } = self.current.take()?;
        debug!(run_id = %handle.run_id(), "run finished");
        // The channel closes right after the last Done marker.
        self.draining.push(handle);
        Some(aggregator.finish())
    }
}

async fn recv_current(current: &mut Option<CurrentRun>) -> Option<TargetEvent> {
    match current {
        Some(current) => current.handle.recv().await,
        None => future::pending().await,
    }
}

/// Options for a [`SessionRunner`].
#[derive(Debug, Default)]
pub struct SessionRunnerBuilder {
    worker_threads: Option<usize>,
}

impl SessionRunnerBuilder {
    /// Sets the number of runtime worker threads. Defaults to the number of
    /// CPUs.
    pub fn set_worker_threads(&mut self, worker_threads: usize) -> &mut Self {
        self.worker_threads = Some(worker_threads);
        self
    }

    /// Creates a new session runner.
    pub fn build(self, signal_handler: SignalHandlerKind) -> Result<SessionRunner, SessionBuildError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name("lazytest-runner-worker");
        if let Some(worker_threads) = self.worker_threads {
            builder.worker_threads(worker_threads);
        }
        let runtime = builder
            .build()
            .map_err(SessionBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(SessionRunner {
            runtime,
            signal_handler,
        })
    }
}

/// Runs a single run to completion on its own runtime.
///
/// Created using [`SessionRunnerBuilder::build`].
#[derive(Debug)]
pub struct SessionRunner {
    runtime: Runtime,
    signal_handler: SignalHandler,
}

/// An event passed to the [`SessionRunner::execute`] callback.
#[derive(Debug)]
pub enum RunnerEvent<'a> {
    /// The run started.
    Started {
        /// The run ID.
        run_id: RunId,
        /// The plans being run.
        plans: &'a [TargetPlan],
    },

    /// An event was applied to the aggregator.
    Event {
        /// The event.
        event: &'a TargetEvent,
        /// The aggregator, with the event applied.
        aggregator: &'a RunAggregator,
    },

    /// A signal was received and the run is being cancelled.
    Interrupted(ShutdownEvent),
}

/// The result of [`SessionRunner::execute`].
#[derive(Debug)]
pub struct RunnerOutcome {
    /// The final results.
    pub run: AggregatedRun,
    /// The first signal received, if the run was interrupted.
    pub interrupted: Option<ShutdownEvent>,
}

impl SessionRunner {
    /// Runs `plans`, calling `callback` for every event of the run.
    ///
    /// A shutdown signal cancels the run; targets are still waited for, so
    /// the returned results include every target.
    pub fn execute<F>(mut self, plans: Vec<TargetPlan>, mut callback: F) -> RunnerOutcome
    where
        F: FnMut(RunnerEvent<'_>),
    {
        let signal_handler = &mut self.signal_handler;
        self.runtime.block_on(async move {
            let mut session = RunSession::new(TargetExecutor::new());
            let run_id = session.start(plans.clone());
            callback(RunnerEvent::Started {
                run_id,
                plans: &plans,
            });

            let mut interrupted = None;
            let mut signals_done = false;
            let run = loop {
                tokio::select! {
                    event = session.next() => match event {
                        Some(SessionEvent::Event(event)) => {
                            if let Some(aggregator) = session.aggregator() {
                                callback(RunnerEvent::Event { event: &event, aggregator });
                            }
                        }
                        Some(SessionEvent::RunFinished(run)) => break run,
                        None => {
                            break AggregatedRun {
                                run_id,
                                runs: Vec::new(),
                            };
                        }
                    },
                    signal = signal_handler.recv(), if !signals_done => match signal {
                        Some(signal) => {
                            debug!(signal = signal.as_str(), "received shutdown signal");
                            if interrupted.is_none() {
                                callback(RunnerEvent::Interrupted(signal));
                                interrupted = Some(signal);
                            }
                            session.interrupt();
                        }
                        None => signals_done = true,
                    },
                }
            };

            session.drain().await;
            RunnerOutcome { run, interrupted }
        })
    }
}
