// Copyright (c) The lazytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-target worker.
//!
//! A worker exclusively owns its subprocess, the subprocess's pipes and the
//! decoder. The only thing it shares is a sender for the run's channel.

use super::TargetPlan;
use crate::{
    decoder::{DecodedEvents, LineDecoder},
    events::{RunId, TargetDone, TargetEvent, TargetEventKind, TargetId, TargetOutcome},
};
use std::{
    io,
    process::{ExitStatus, Stdio},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader},
    process::{Child, Command},
    sync::{broadcast, mpsc::UnboundedSender},
    task::JoinHandle,
};
use tracing::{debug, instrument, trace, warn};

pub(super) struct TargetWorker {
    plan: TargetPlan,
    sender: EventSender,
    cancel_receiver: broadcast::Receiver<()>,
}

impl TargetWorker {
    pub(super) fn new(
        run_id: RunId,
        plan: TargetPlan,
        sender: UnboundedSender<TargetEvent>,
        cancel_receiver: broadcast::Receiver<()>,
    ) -> Self {
        let sender = EventSender {
            run_id,
            target: plan.target().clone(),
            sender,
        };
        Self {
            plan,
            sender,
            cancel_receiver,
        }
    }

    /// Runs the target to completion, then sends its Done marker.
    #[instrument(level = "debug", name = "target", skip_all, fields(
        run_id = %self.sender.run_id,
        target = %self.sender.target,
    ))]
    pub(super) async fn run(mut self) {
        let done = self.run_inner().await;
        debug!(
            outcome = ?done.outcome,
            structured_events = done.structured_events,
            "target done"
        );
        self.sender.send(TargetEventKind::Done(done));
    }

    async fn run_inner(&mut self) -> TargetDone {
        if self.is_cancelled() {
            debug!("run cancelled before target was spawned");
            return TargetDone {
                structured_events: 0,
                exit_status: None,
                outcome: TargetOutcome::Cancelled,
            };
        }

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(message) => {
                debug!(%message, "failed to spawn target");
                return TargetDone {
                    structured_events: 0,
                    exit_status: None,
                    outcome: TargetOutcome::SpawnFailure(message),
                };
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            _ = child.start_kill();
            _ = child.wait().await;
            return TargetDone {
                structured_events: 0,
                exit_status: None,
                outcome: TargetOutcome::SpawnFailure("failed to capture child output".to_owned()),
            };
        };
        let mut stderr_task = tokio::spawn(capture_stderr(stderr));

        let mut decoder = self.plan.dialect().decoder();
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut structured_events = 0;
        let mut cancelled = false;

        loop {
            buf.clear();
            tokio::select! {
                // Once cancellation is requested, no more lines are read.
                biased;

                _ = self.cancel_receiver.recv() => {
                    cancelled = true;
                    break;
                }
                res = reader.read_until(b'\n', &mut buf) => match res {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(trim_line_ending(&buf));
                        trace!(%line, "read line");
                        structured_events += self.sender.send_all(decoder.decode_line(&line));
                    }
                    Err(error) => {
                        warn!(%error, "error reading target output");
                        break;
                    }
                }
            }
        }
        // Closing the pipe unblocks a child that is still writing.
        drop(reader);

        let exit = if cancelled {
            kill_and_wait(&mut child).await
        } else {
            tokio::select! {
                exit = child.wait() => exit,
                _ = self.cancel_receiver.recv() => {
                    cancelled = true;
                    kill_and_wait(&mut child).await
                }
            }
        };
        structured_events += self.sender.send_all(decoder.finish());

        // Grandchildren may still hold stderr open after the child exits, so
        // cancellation is honored while waiting for it too.
        let stderr = if cancelled {
            stderr_task.abort();
            String::new()
        } else {
            tokio::select! {
                stderr = join_stderr(&mut stderr_task) => stderr,
                _ = self.cancel_receiver.recv() => {
                    cancelled = true;
                    stderr_task.abort();
                    String::new()
                }
            }
        };

        let outcome = if cancelled {
            TargetOutcome::Cancelled
        } else {
            classify_exit(&exit, structured_events, &stderr)
        };

        TargetDone {
            structured_events,
            exit_status: exit.ok(),
            outcome,
        }
    }

    fn is_cancelled(&mut self) -> bool {
        // A closed channel means the run handle was dropped.
        !matches!(
            self.cancel_receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }

    fn spawn(&self) -> Result<Child, String> {
        let Some((program, args)) = self.plan.argv().split_first() else {
            return Err("command is empty".to_owned());
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.plan.working_dir() {
            cmd.current_dir(dir);
        }

        debug!(command = %self.plan.display_command(), "spawning target");
        cmd.spawn()
            .map_err(|error| format!("failed to spawn `{program}`: {error}"))
    }
}

struct EventSender {
    run_id: RunId,
    target: TargetId,
    sender: UnboundedSender<TargetEvent>,
}

impl EventSender {
    fn send(&self, kind: TargetEventKind) {
        let event = TargetEvent {
            run_id: self.run_id,
            target: self.target.clone(),
            kind,
        };
        // The receiver is gone if the consumer stopped caring about this run.
        _ = self.sender.send(event);
    }

    /// Sends events in order, returning how many were structured.
    fn send_all(&self, events: DecodedEvents) -> usize {
        let mut structured = 0;
        for event in events {
            structured += usize::from(event.is_structured());
            self.send(TargetEventKind::Event(event));
        }
        structured
    }
}

/// Decides how a target ended once its process has exited on its own.
///
/// Test frameworks exit unsuccessfully when tests fail, so the exit status
/// only matters if no structured output was seen at all.
fn classify_exit(
    exit: &io::Result<ExitStatus>,
    structured_events: usize,
    stderr: &str,
) -> TargetOutcome {
    if structured_events > 0 {
        return TargetOutcome::Completed;
    }
    let fallback = match exit {
        Ok(status) if status.success() => return TargetOutcome::Completed,
        Ok(status) => format!("process exited with {status}"),
        Err(error) => format!("failed to wait for process: {error}"),
    };
    let stderr = stderr.trim();
    if stderr.is_empty() {
        TargetOutcome::InfrastructureFailure(fallback)
    } else {
        TargetOutcome::InfrastructureFailure(stderr.to_owned())
    }
}

async fn kill_and_wait(child: &mut Child) -> io::Result<ExitStatus> {
    debug!("killing target");
    if let Err(error) = child.start_kill() {
        // The process has most likely exited already.
        debug!(%error, "failed to kill target");
    }
    child.wait().await
}

async fn capture_stderr(stderr: impl AsyncRead + Unpin) -> String {
    let mut stderr = stderr;
    let mut buf = Vec::new();
    if let Err(error) = stderr.read_to_end(&mut buf).await {
        warn!(%error, "error reading target stderr");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn join_stderr(task: &mut JoinHandle<String>) -> String {
    match task.await {
        Ok(stderr) => stderr,
        Err(error) => {
            warn!(%error, "stderr capture task failed");
            String::new()
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
