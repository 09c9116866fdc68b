//! # Task Management System
//!
//! This module runs tasks off the render thread and hands their results back as
//! futures. It is generic over the task type and knows nothing about what a task
//! does; callers that need "at most one task per key" enforce that themselves.
//!
//! ## Architecture Overview
//!
//! - `WorkScheduler`: assigns task ids, keeps the pending futures, and matches
//!   worker responses back to them by id
//! - `TaskRunner`: how tasks actually execute
//!   - `ThreadPoolRunner`: one FIFO queue shared by every worker thread; an idle
//!     worker takes the next request itself, without waiting for the caller
//!   - `InlineRunner`: runs each task on the calling thread when it is submitted
//!
//! ## Platform-Specific Behavior
//!
//! Native targets and wasm builds with shared memory (`target_feature = "atomics"`)
//! get the thread pool; wasm builds without it fall back to the inline runner.
//! On wasm, workers are spawned through `wasm_thread`.
//!
//! ## Failure Handling
//!
//! A task that panics is caught on its worker and answered with
//! `MeshTaskError::Rejected`; the worker keeps serving. A worker that dies while
//! holding a task answers it with `MeshTaskError::WorkerDisconnected`, and once
//! no worker is left every outstanding task fails the same way.
//!
//! ## Example Usage
//! ```rust,ignore
//! let mut scheduler = WorkScheduler::new(4, false);
//! let mut future = scheduler.schedule_task(my_task);
//!
//! // In the main loop:
//! scheduler.process_completed_tasks();
//! if let Some(result) = future.try_take() {
//!     // ...
//! }
//! ```

pub mod task;

use std::{
    any::Any,
    collections::{HashMap, HashSet},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{channel, Receiver, Sender, TryRecvError},
        Arc, Mutex, PoisonError,
    },
};

use futures::channel::oneshot;
use log::{debug, error, info, warn};
use task::{Task, TaskFuture, TaskId, TaskRequest, TaskResponse};

use crate::error::MeshTaskError;

#[cfg(target_family = "wasm")]
mod wasm_imports {
    pub use wasm_thread as thread;
    pub use wasm_thread::JoinHandle;
}

#[cfg(target_family = "wasm")]
use self::wasm_imports::*;

#[cfg(not(target_family = "wasm"))]
use std::thread::{self, JoinHandle};

cfg_if::cfg_if! {
    if #[cfg(all(target_family = "wasm", not(target_feature = "atomics")))] {
        /// Whether this build can run tasks on other threads.
        pub const THREADS_AVAILABLE: bool = false;
    } else {
        /// Whether this build can run tasks on other threads.
        pub const THREADS_AVAILABLE: bool = true;
    }
}

/// An execution strategy for tasks.
pub trait TaskRunner<T: Task> {
    /// Hands a task over for execution. Never blocks on the task itself.
    fn submit(&mut self, request: TaskRequest<T>);

    /// Collects every response that is ready without blocking.
    fn poll_responses(&mut self) -> Vec<TaskResponse<T::Output>>;

    /// Number of tasks submitted but not yet answered.
    fn outstanding(&self) -> usize;

    /// Short name for logs and statistics.
    fn name(&self) -> &'static str;
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}

/// Runs a task, turning a panic into a rejection.
fn run_task<T: Task>(request: TaskRequest<T>) -> TaskResponse<T::Output> {
    let TaskRequest { task_id, task } = request;
    let result = panic::catch_unwind(AssertUnwindSafe(move || task.process())).unwrap_or_else(|payload| {
        let reason = panic_reason(payload.as_ref());
        error!("Task {} panicked: {}", task_id, reason);
        Err(MeshTaskError::Rejected { task_id, reason })
    });
    TaskResponse { task_id, result }
}

/// Requests waiting for a worker. Every worker reads from the same receiver.
type SharedQueue<T> = Arc<Mutex<Receiver<TaskRequest<T>>>>;

/// One worker's hold on the pool. Dropped when the worker exits, however it exits.
struct WorkerGuard<O> {
    worker_index: usize,
    current: Option<TaskId>,
    response_sender: Sender<TaskResponse<O>>,
    live_workers: Arc<AtomicUsize>,
}

impl<O> Drop for WorkerGuard<O> {
    fn drop(&mut self) {
        self.live_workers.fetch_sub(1, Ordering::AcqRel);
        if let Some(task_id) = self.current.take() {
            error!("Mesh worker {} died while running task {}", self.worker_index, task_id);
            // Nobody to tell if the pool itself is gone.
            let _ = self.response_sender.send(TaskResponse {
                task_id,
                result: Err(MeshTaskError::WorkerDisconnected),
            });
        }
    }
}

fn worker_loop<T: Task>(mut guard: WorkerGuard<T::Output>, queue: SharedQueue<T>) {
    loop {
        // The lock is only held while waiting for the next request.
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(request) = next else {
            debug!("Mesh worker {} shutting down", guard.worker_index);
            break;
        };
        guard.current = Some(request.task_id);
        let response = run_task(request);
        guard.current = None;
        if guard.response_sender.send(response).is_err() {
            break;
        }
    }
}

/// A pool of worker threads pulling tasks from one shared queue.
pub struct ThreadPoolRunner<T: Task> {
    task_sender: Sender<TaskRequest<T>>,
    response_receiver: Receiver<TaskResponse<T::Output>>,
    outstanding: HashSet<TaskId>,
    undeliverable: Vec<TaskResponse<T::Output>>,
    live_workers: Arc<AtomicUsize>,
    _workers: Vec<JoinHandle<()>>,
}

impl<T: Task> ThreadPoolRunner<T> {
    /// Spawns `num_workers` worker threads.
    ///
    /// A worker that fails to spawn is logged and left out; the pool may end up
    /// smaller than requested, or empty.
    pub fn new(num_workers: usize) -> Self {
        let (task_tx, task_rx) = channel::<TaskRequest<T>>();
        let (response_tx, response_rx) = channel::<TaskResponse<T::Output>>();
        let queue: SharedQueue<T> = Arc::new(Mutex::new(task_rx));
        let live_workers = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::with_capacity(num_workers);

        for worker_index in 0..num_workers {
            live_workers.fetch_add(1, Ordering::AcqRel);
            // Moved into the worker; a failed spawn drops it and undoes the count.
            let guard = WorkerGuard {
                worker_index,
                current: None,
                response_sender: response_tx.clone(),
                live_workers: live_workers.clone(),
            };
            let queue = queue.clone();

            match thread::Builder::new()
                .name(format!("mesh-worker-{worker_index}"))
                .spawn(move || worker_loop(guard, queue))
            {
                Ok(worker) => workers.push(worker),
                Err(err) => error!("Failed to spawn mesh worker {}: {}", worker_index, err),
            }
        }

        info!("Started {} of {} mesh workers", workers.len(), num_workers);

        Self {
            task_sender: task_tx,
            response_receiver: response_rx,
            outstanding: HashSet::new(),
            undeliverable: Vec::new(),
            live_workers,
            _workers: workers,
        }
    }

    /// Number of workers still running.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    fn fail_outstanding(&mut self, responses: &mut Vec<TaskResponse<T::Output>>) {
        if self.outstanding.is_empty() {
            return;
        }
        error!("No mesh workers left; failing {} outstanding task(s)", self.outstanding.len());
        responses.extend(self.outstanding.drain().map(|task_id| TaskResponse {
            task_id,
            result: Err(MeshTaskError::WorkerDisconnected),
        }));
    }
}

impl<T: Task> TaskRunner<T> for ThreadPoolRunner<T> {
    fn submit(&mut self, request: TaskRequest<T>) {
        let task_id = request.task_id;
        match self.task_sender.send(request) {
            Ok(()) => {
                self.outstanding.insert(task_id);
            }
            Err(_) => {
                warn!("No mesh worker left to take task {}", task_id);
                self.undeliverable.push(TaskResponse {
                    task_id,
                    result: Err(MeshTaskError::WorkerDisconnected),
                });
            }
        }
    }

    fn poll_responses(&mut self) -> Vec<TaskResponse<T::Output>> {
        let mut responses = std::mem::take(&mut self.undeliverable);

        loop {
            match self.response_receiver.try_recv() {
                Ok(response) => {
                    self.outstanding.remove(&response.task_id);
                    responses.push(response);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.fail_outstanding(&mut responses);
                    break;
                }
            }
        }

        responses
    }

    fn outstanding(&self) -> usize {
        self.outstanding.len() + self.undeliverable.len()
    }

    fn name(&self) -> &'static str {
        "thread-pool"
    }
}

/// Runs every task synchronously on the thread that submits it.
pub struct InlineRunner<T: Task> {
    completed: Vec<TaskResponse<T::Output>>,
}

impl<T: Task> InlineRunner<T> {
    pub fn new() -> Self {
        Self { completed: Vec::new() }
    }
}

impl<T: Task> Default for InlineRunner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Task> TaskRunner<T> for InlineRunner<T> {
    fn submit(&mut self, request: TaskRequest<T>) {
        self.completed.push(run_task(request));
    }

    fn poll_responses(&mut self) -> Vec<TaskResponse<T::Output>> {
        std::mem::take(&mut self.completed)
    }

    fn outstanding(&self) -> usize {
        self.completed.len()
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

type PendingSender<O> = oneshot::Sender<Result<O, MeshTaskError>>;

/// Schedules tasks on a runner and resolves their futures.
pub struct WorkScheduler<T: Task> {
    runner: Box<dyn TaskRunner<T>>,
    pending: HashMap<TaskId, PendingSender<T::Output>>,
    next_task_id: TaskId,
}

impl<T: Task> WorkScheduler<T> {
    /// Creates a scheduler backed by worker threads where the target has them.
    ///
    /// # Arguments
    /// * `num_workers` - Number of worker threads to start
    /// * `force_inline` - Run tasks on the calling thread even where threads exist
    pub fn new(num_workers: usize, force_inline: bool) -> Self {
        if force_inline || !THREADS_AVAILABLE || num_workers == 0 {
            return Self::with_runner(Box::new(InlineRunner::new()));
        }
        let pool = ThreadPoolRunner::new(num_workers);
        if pool.live_workers() == 0 {
            warn!("No mesh worker could be started; meshing inline");
            return Self::with_runner(Box::new(InlineRunner::new()));
        }
        Self::with_runner(Box::new(pool))
    }

    pub fn with_runner(runner: Box<dyn TaskRunner<T>>) -> Self {
        info!("Mesh scheduler using the {} runner", runner.name());
        Self {
            runner,
            pending: HashMap::new(),
            next_task_id: 0,
        }
    }

    /// Schedules a task and returns the future of its result.
    ///
    /// The task starts immediately when a worker is free and is queued otherwise.
    pub fn schedule_task(&mut self, task: T) -> TaskFuture<T::Output> {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let (sender, receiver) = oneshot::channel();
        self.pending.insert(task_id, sender);
        self.runner.submit(TaskRequest { task_id, task });
        TaskFuture::new(task_id, receiver)
    }

    /// Delivers every finished task's result to its future.
    ///
    /// Must be called regularly, typically once per frame; futures only resolve
    /// here.
    ///
    /// # Returns
    /// The number of futures resolved
    pub fn process_completed_tasks(&mut self) -> usize {
        let mut resolved = 0;
        for response in self.runner.poll_responses() {
            match self.pending.remove(&response.task_id) {
                Some(sender) => {
                    if let Err(err) = &response.result {
                        warn!("Task {} failed: {}", response.task_id, err);
                    }
                    if sender.send(response.result).is_err() {
                        debug!("Result of task {} dropped, its future is gone", response.task_id);
                    }
                    resolved += 1;
                }
                None => warn!("Response for unknown task {}", response.task_id),
            }
        }
        resolved
    }

    /// Blocks the calling thread until the future resolves, pumping responses
    /// in the meantime.
    pub fn wait(&mut self, mut future: TaskFuture<T::Output>) -> Result<T::Output, MeshTaskError> {
        loop {
            self.process_completed_tasks();
            if let Some(result) = future.try_take() {
                return result;
            }
            thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Number of scheduled tasks whose result has not been delivered yet.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }
}
