//! Suspendable front end over a [`GenericDriver`].
//!
//! The blocking driver runs on a dedicated worker thread. Each call submits a
//! job and gets an [`OperationId`] back at once; waiting polls the job's slot
//! with exponential backoff plus jitter, sleeping on the tokio timer between
//! polls. Jobs run one at a time in submission order, so operations on one
//! session never overlap. Each sub-result lands in the handle's
//! [`Operation`] record as soon as the worker has it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use super::backoff::{Backoff, PollConfig};
use super::generic::GenericDriver;
use super::interactive::InteractiveEvent;
use super::operation::{Operation, OperationId, OperationKind};
use super::options::{PromptedInput, SendOptions};
use super::response::{MultiResponse, Response};
use crate::channel::{ChannelOutput, ReadCallback};
use crate::error::{DriverError, Result, TransportError};

/// What a finished job produced.
#[derive(Debug)]
pub enum Outcome {
    Done,
    Prompt(String),
    Response(Response),
    Responses(MultiResponse),
}

/// Advisory cancellation, checked between polls.
///
/// Cancelling stops the wait only. Input already written has reached the
/// device.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

type JobFn = Box<dyn FnOnce(&mut GenericDriver) -> Result<Outcome> + Send>;

struct Job {
    id: OperationId,
    run: JobFn,
}

struct Slot {
    operation: Operation,
    outcome: Option<Result<Outcome>>,
    /// Nobody will collect this; the worker drops it when the job ends.
    abandoned: bool,
}

type Table = Arc<Mutex<HashMap<OperationId, Slot>>>;

fn lock(table: &Table) -> MutexGuard<'_, HashMap<OperationId, Slot>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Async session handle.
///
/// # Example
///
/// ```rust,no_run
/// use ferrisprompt::DriverBuilder;
/// use ferrisprompt::driver::SendOptions;
///
/// # async fn example() -> Result<(), ferrisprompt::Error> {
/// let driver = DriverBuilder::new("192.168.1.1")
///     .username("admin")
///     .password("secret")
///     .platform("arista_eos")
///     .build_async()?;
///
/// driver.open().await?;
/// let response = driver.send_input("show version", SendOptions::default()).await?;
/// println!("{}", response.result);
/// driver.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct AsyncDriver {
    jobs: Option<mpsc::Sender<Job>>,
    table: Table,
    worker: Option<JoinHandle<()>>,
    poll: PollConfig,
    host: String,
    port: u16,
}

impl AsyncDriver {
    /// Move `driver` onto a worker thread.
    pub fn new(driver: GenericDriver, poll: PollConfig) -> Result<Self> {
        poll.validate()?;

        let host = driver.host().to_string();
        let port = driver.port();
        let table: Table = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::channel::<Job>();

        let worker_table = Arc::clone(&table);
        let worker = thread::Builder::new()
            .name(format!("ferrisprompt-{}", host))
            .spawn(move || run_worker(driver, rx, worker_table))
            .map_err(TransportError::Io)?;

        Ok(Self {
            jobs: Some(tx),
            table,
            worker: Some(worker),
            poll,
            host,
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Queue `run` against the session and return its handle immediately.
    pub fn submit<F>(&self, kind: OperationKind, run: F) -> Result<OperationId>
    where
        F: FnOnce(&mut GenericDriver) -> Result<Outcome> + Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(DriverError::WorkerGone)?;
        let operation = Operation::new(kind);
        let id = operation.id();
        lock(&self.table).insert(
            id,
            Slot {
                operation,
                outcome: None,
                abandoned: false,
            },
        );

        let job = Job {
            id,
            run: Box::new(run),
        };
        if jobs.send(job).is_err() {
            lock(&self.table).remove(&id);
            return Err(DriverError::WorkerGone.into());
        }
        debug!("submitted {} ({})", id, kind);
        Ok(id)
    }

    /// Whether the operation has finished.
    pub fn is_done(&self, id: OperationId) -> Result<bool> {
        lock(&self.table)
            .get(&id)
            .map(|slot| slot.outcome.is_some())
            .ok_or_else(|| DriverError::UnknownOperation(id).into())
    }

    /// Snapshot of the operation record.
    pub fn operation(&self, id: OperationId) -> Option<Operation> {
        lock(&self.table).get(&id).map(|slot| slot.operation.clone())
    }

    /// Forget an operation. Its job still runs if it has not yet.
    pub fn discard(&self, id: OperationId) -> bool {
        lock(&self.table).remove(&id).is_some()
    }

    /// Handles submitted but not yet collected.
    pub fn pending(&self) -> usize {
        lock(&self.table).len()
    }

    /// Stop tracking `id` once its job has ended.
    fn abandon(&self, id: OperationId) {
        let mut table = lock(&self.table);
        let finished = match table.get_mut(&id) {
            Some(slot) if slot.outcome.is_none() => {
                slot.abandoned = true;
                false
            }
            Some(_) => true,
            None => return,
        };
        if finished {
            table.remove(&id);
        }
        debug!("{} abandoned before it was collected", id);
    }

    /// Take the outcome if it is ready.
    fn try_take(&self, id: OperationId) -> Result<Option<Result<Outcome>>> {
        let mut table = lock(&self.table);
        let done = match table.get(&id) {
            Some(slot) => slot.outcome.is_some(),
            None => return Err(DriverError::UnknownOperation(id).into()),
        };
        if done {
            return Ok(table.remove(&id).and_then(|slot| slot.outcome));
        }
        if self.worker.as_ref().is_none_or(JoinHandle::is_finished) {
            table.remove(&id);
            return Err(DriverError::WorkerGone.into());
        }
        Ok(None)
    }

    /// Wait for an operation, sleeping between polls.
    ///
    /// When `cancel` fires the wait ends with `OperationCancelled`; the
    /// handle stays valid and can be waited on again.
    pub async fn wait(&self, id: OperationId, cancel: Option<&CancelFlag>) -> Result<Outcome> {
        let mut delays = Backoff::new(self.poll);
        loop {
            if let Some(outcome) = self.try_take(id)? {
                return outcome;
            }
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                debug!("wait on {} cancelled", id);
                return Err(DriverError::OperationCancelled(id).into());
            }
            let delay = delays.next().unwrap_or(self.poll.max);
            tokio::time::sleep(delay).await;
        }
    }

    /// Blocking wait for an operation, with an optional deadline.
    pub fn wait_blocking(&self, id: OperationId, timeout: Option<Duration>) -> Result<Outcome> {
        let deadline = timeout.map(|t| std::time::Instant::now() + t);
        let mut delays = Backoff::new(self.poll);
        loop {
            if let Some(outcome) = self.try_take(id)? {
                return outcome;
            }
            if let Some(deadline) = deadline {
                if std::time::Instant::now() >= deadline {
                    return Err(DriverError::OperationCancelled(id).into());
                }
            }
            thread::sleep(delays.next().unwrap_or(self.poll.max));
        }
    }

    async fn run<F>(&self, kind: OperationKind, run: F) -> Result<(OperationId, Outcome)>
    where
        F: FnOnce(&mut GenericDriver) -> Result<Outcome> + Send + 'static,
    {
        let id = self.submit(kind, run)?;
        // Dropping this future before the wait ends must not strand the slot
        let _guard = AbandonOnDrop { driver: self, id };
        let outcome = self.wait(id, None).await?;
        Ok((id, outcome))
    }

    pub async fn open(&self) -> Result<()> {
        self.run(OperationKind::Open, |d| d.open().map(|()| Outcome::Done))
            .await
            .map(drop)
    }

    pub async fn close(&self) -> Result<()> {
        self.run(OperationKind::Close, |d| d.close().map(|()| Outcome::Done))
            .await
            .map(drop)
    }

    pub async fn enter_mode(&self, mode: &str, timeout: Option<Duration>) -> Result<()> {
        let mode = mode.to_string();
        self.run(OperationKind::EnterMode, move |d| {
            d.enter_mode(&mode, timeout).map(|()| Outcome::Done)
        })
        .await
        .map(drop)
    }

    pub async fn get_prompt(&self, timeout: Option<Duration>) -> Result<String> {
        let (id, outcome) = self
            .run(OperationKind::GetPrompt, move |d| {
                let prompt = match timeout {
                    Some(t) => d.get_prompt_with_timeout(t)?,
                    None => d.get_prompt()?,
                };
                Ok(Outcome::Prompt(prompt))
            })
            .await?;
        match outcome {
            Outcome::Prompt(prompt) => Ok(prompt),
            _ => Err(DriverError::OutcomeMismatch(id).into()),
        }
    }

    pub async fn send_input(&self, input: &str, options: SendOptions) -> Result<Response> {
        let input = input.to_string();
        let (id, outcome) = self
            .run(OperationKind::SendInput, move |d| {
                d.send_input(&input, &options).map(Outcome::Response)
            })
            .await?;
        expect_response(id, outcome)
    }

    pub async fn send_inputs(&self, inputs: &[&str], options: SendOptions) -> Result<MultiResponse> {
        let inputs: Vec<String> = inputs.iter().map(|i| i.to_string()).collect();
        let (id, outcome) = self
            .run(OperationKind::SendInput, move |d| {
                let inputs: Vec<&str> = inputs.iter().map(String::as_str).collect();
                d.send_inputs(&inputs, &options).map(Outcome::Responses)
            })
            .await?;
        expect_responses(id, outcome)
    }

    pub async fn send_configs(&self, configs: &[&str], options: SendOptions) -> Result<MultiResponse> {
        let configs: Vec<String> = configs.iter().map(|c| c.to_string()).collect();
        let (id, outcome) = self
            .run(OperationKind::SendInput, move |d| {
                let configs: Vec<&str> = configs.iter().map(String::as_str).collect();
                d.send_configs(&configs, &options).map(Outcome::Responses)
            })
            .await?;
        expect_responses(id, outcome)
    }

    pub async fn send_prompted_input(
        &self,
        prompted: PromptedInput,
        options: SendOptions,
    ) -> Result<Response> {
        let (id, outcome) = self
            .run(OperationKind::SendPromptedInput, move |d| {
                d.send_prompted_input(&prompted, &options)
                    .map(Outcome::Response)
            })
            .await?;
        expect_response(id, outcome)
    }

    pub async fn send_interactive(
        &self,
        events: Vec<InteractiveEvent>,
        options: SendOptions,
    ) -> Result<MultiResponse> {
        let (id, outcome) = self
            .run(OperationKind::SendInteractive, move |d| {
                d.send_interactive(&events, &options)
                    .map(Outcome::Responses)
            })
            .await?;
        expect_responses(id, outcome)
    }

    pub async fn read_with_callbacks(
        &self,
        initial_input: Option<&str>,
        mut callbacks: Vec<ReadCallback>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let initial_input = initial_input.map(str::to_string);
        let (id, outcome) = self
            .run(OperationKind::ReadWithCallbacks, move |d| {
                d.read_with_callbacks(initial_input.as_deref(), &mut callbacks, timeout)
                    .map(Outcome::Response)
            })
            .await?;
        expect_response(id, outcome)
    }
}

struct AbandonOnDrop<'a> {
    driver: &'a AsyncDriver,
    id: OperationId,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        // No-op once the wait has collected the slot
        self.driver.abandon(self.id);
    }
}

fn expect_response(id: OperationId, outcome: Outcome) -> Result<Response> {
    match outcome {
        Outcome::Response(response) => Ok(response),
        _ => Err(DriverError::OutcomeMismatch(id).into()),
    }
}

fn expect_responses(id: OperationId, outcome: Outcome) -> Result<MultiResponse> {
    match outcome {
        Outcome::Responses(responses) => Ok(responses),
        _ => Err(DriverError::OutcomeMismatch(id).into()),
    }
}

fn run_worker(mut driver: GenericDriver, jobs: mpsc::Receiver<Job>, table: Table) {
    while let Ok(Job { id, run }) = jobs.recv() {
        let records = Arc::clone(&table);
        driver.set_observer(Some(Box::new(
            move |input: &str, output: &ChannelOutput, failure: Option<String>| {
                if let Some(slot) = lock(&records).get_mut(&id) {
                    slot.operation.record(input, output, failure);
                }
            },
        )));
        let outcome = run(&mut driver);
        driver.set_observer(None);

        let mut table = lock(&table);
        if table.get(&id).is_some_and(|slot| slot.abandoned) {
            table.remove(&id);
            debug!("{} finished with nobody waiting", id);
        } else if let Some(slot) = table.get_mut(&id) {
            match &outcome {
                Ok(_) => slot.operation.finish(),
                Err(e) => slot.operation.fail(e),
            }
            slot.outcome = Some(outcome);
        } else {
            debug!("{} finished after its handle was discarded", id);
        }
    }
    debug!("session worker for {} exiting", driver.host());
}

impl Drop for AsyncDriver {
    fn drop(&mut self) {
        let pending = lock(&self.table).len();
        if pending > 0 {
            warn!(
                "dropping session to {} with {} uncollected operation(s)",
                self.host, pending
            );
        }
        // Worker drains queued jobs, then the driver closes itself.
        self.jobs.take();
        self.worker.take();
    }
}

impl std::fmt::Debug for AsyncDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncDriver")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("poll", &self.poll)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_expect_mismatch() {
        let id = OperationId::next();
        let err = expect_response(id, Outcome::Done).unwrap_err();
        assert!(err.to_string().contains("unexpected outcome"));
        assert!(expect_responses(id, Outcome::Responses(MultiResponse::new())).is_ok());
    }
}
