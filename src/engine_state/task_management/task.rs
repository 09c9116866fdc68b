//! # Task System Core Types
//!
//! This module defines the fundamental building blocks of the task system.
//!
//! ## Core Components
//! - `Task`: a unit of work that can be executed on any thread
//! - `TaskRequest` / `TaskResponse`: the messages exchanged with a worker, matched
//!   up by their `TaskId`
//! - `TaskFuture`: the caller's handle on a scheduled task's result
//!
//! ## Task Lifecycle
//! 1. A `Task` is handed to `WorkScheduler::schedule_task`, which assigns it an id
//!    and returns a `TaskFuture`
//! 2. A runner executes `process()` on a worker thread (or inline)
//! 3. The worker sends back a `TaskResponse` carrying the same id
//! 4. `WorkScheduler::process_completed_tasks` resolves the matching future

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::channel::oneshot;

use crate::error::MeshTaskError;

/// Opaque identifier assigned to every scheduled task.
pub type TaskId = u64;

/// A unit of work that can be executed asynchronously.
///
/// Tasks must own everything they need; they are moved to a worker thread and
/// consumed there.
pub trait Task: Send + 'static {
    /// What the task produces on success.
    type Output: Send + 'static;

    /// Runs the task. Called on a worker thread, or on the caller's thread when
    /// the inline runner is in use.
    fn process(self) -> Result<Self::Output, MeshTaskError>;
}

/// A task on its way to a worker.
pub struct TaskRequest<T> {
    pub task_id: TaskId,
    pub task: T,
}

/// The outcome of a task on its way back from a worker.
#[derive(Debug)]
pub struct TaskResponse<O> {
    pub task_id: TaskId,
    pub result: Result<O, MeshTaskError>,
}

/// Handle on the result of a scheduled task.
///
/// Resolves once `WorkScheduler::process_completed_tasks` has seen the task's
/// response. A task whose worker died resolves to `MeshTaskError::WorkerDisconnected`.
#[must_use = "dropping a task future discards the task's result"]
pub struct TaskFuture<O> {
    task_id: TaskId,
    receiver: oneshot::Receiver<Result<O, MeshTaskError>>,
}

impl<O> TaskFuture<O> {
    pub(crate) fn new(task_id: TaskId, receiver: oneshot::Receiver<Result<O, MeshTaskError>>) -> Self {
        Self { task_id, receiver }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Non-blocking check for the result.
    ///
    /// # Returns
    /// - `Some(result)` once the task finished; the future must not be polled again
    /// - `None` while the task is still queued or running
    pub fn try_take(&mut self) -> Option<Result<O, MeshTaskError>> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(MeshTaskError::WorkerDisconnected)),
        }
    }
}

impl<O> Future for TaskFuture<O> {
    type Output = Result<O, MeshTaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(MeshTaskError::WorkerDisconnected)))
    }
}
