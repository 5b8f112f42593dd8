//! Console host used by `tickd debug`.
//!
//! Control verbs are read line by line from the input (`stop`, `shutdown`,
//! `pause`, `continue`, `interrogate`, or a numeric control code). Every
//! reported status is printed as `status: <status>`. On the real console,
//! SIGINT and SIGTERM deliver a stop request.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{debug, info, warn};

use super::{HOST_TARGET, HostError, ServiceHost};
use crate::controller::{
    ControlCommand, ControlRequest, ServiceController, ServiceStatus, StatusReportError,
    StatusReporter,
};

const TERMINATION_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];
const SIGNAL_POLL: Duration = Duration::from_millis(100);

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;
type SharedStatus = Arc<Mutex<ServiceStatus>>;

/// Host that drives the controller from a console.
pub struct DebugHost {
    input: Mutex<Option<Box<dyn BufRead + Send>>>,
    output: SharedWriter,
    watch_signals: bool,
}

impl std::fmt::Debug for DebugHost {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DebugHost")
            .field("watch_signals", &self.watch_signals)
            .finish_non_exhaustive()
    }
}

impl DebugHost {
    /// Reads stdin, writes stdout, and stops on SIGINT or SIGTERM.
    #[must_use]
    pub fn console() -> Self {
        Self {
            input: Mutex::new(Some(Box::new(BufReader::new(io::stdin())))),
            output: Arc::new(Mutex::new(Box::new(io::stdout()))),
            watch_signals: true,
        }
    }

    /// Reads commands from `input` and writes statuses to `output` without
    /// installing signal handlers. End of input closes the request channel.
    #[must_use]
    pub fn scripted(
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
            output: Arc::new(Mutex::new(Box::new(output))),
            watch_signals: false,
        }
    }
}

impl ServiceHost for DebugHost {
    fn run(&self, mut controller: ServiceController) -> Result<(), HostError> {
        let input = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(HostError::InputConsumed)?;
        let reporter = ConsoleStatusReporter::new(Arc::clone(&self.output));
        reporter.report(ServiceStatus::StartPending)?;

        let (sender, receiver) = mpsc::channel();
        let signals = if self.watch_signals {
            Some(SignalWatcher::install(sender.clone(), reporter.shared_status())?)
        } else {
            None
        };
        spawn_input_reader(
            input,
            sender,
            reporter.shared_status(),
            Arc::clone(&self.output),
        )?;

        let args = vec![controller.identity().name().to_owned()];
        let outcome = controller.execute(&args, &receiver, &reporter);
        drop(signals);
        let stopped = reporter.report(ServiceStatus::Stopped);
        outcome?;
        stopped?;
        Ok(())
    }
}

/// Status reporter printing each status on its own line.
#[derive(Clone)]
pub struct ConsoleStatusReporter {
    current: SharedStatus,
    output: SharedWriter,
}

impl ConsoleStatusReporter {
    fn new(output: SharedWriter) -> Self {
        Self {
            current: Arc::new(Mutex::new(ServiceStatus::StartPending)),
            output,
        }
    }

    /// Last status delivered.
    #[must_use]
    pub fn current(&self) -> ServiceStatus {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shared_status(&self) -> SharedStatus {
        Arc::clone(&self.current)
    }
}

impl StatusReporter for ConsoleStatusReporter {
    fn report(&self, status: ServiceStatus) -> Result<(), StatusReportError> {
        write_line(&self.output, &format!("status: {status}"))
            .map_err(|source| StatusReportError::Rejected { status, source })?;
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = status;
        Ok(())
    }
}

fn write_line(output: &SharedWriter, line: &str) -> io::Result<()> {
    let mut writer = output.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(writer, "{line}")?;
    writer.flush()
}

fn current_status(status: &SharedStatus) -> ServiceStatus {
    *status.lock().unwrap_or_else(PoisonError::into_inner)
}

// The reader is detached: a blocking read on the real stdin cannot be
// interrupted, and the thread ends on its own once input closes or the
// controller drops the receiver.
fn spawn_input_reader(
    input: Box<dyn BufRead + Send>,
    sender: Sender<ControlRequest>,
    status: SharedStatus,
    output: SharedWriter,
) -> Result<(), HostError> {
    thread::Builder::new()
        .name(String::from("tickd-console"))
        .spawn(move || read_commands(input, &sender, &status, &output))
        .map(drop)
        .map_err(|source| HostError::Spawn {
            role: "console input",
            source,
        })
}

fn read_commands(
    input: Box<dyn BufRead + Send>,
    sender: &Sender<ControlRequest>,
    status: &SharedStatus,
    output: &SharedWriter,
) {
    for read in input.lines() {
        let text = match read {
            Ok(text) => text,
            Err(error) => {
                warn!(target: HOST_TARGET, error = %error, "console input failed");
                break;
            }
        };
        let word = text.trim();
        if word.is_empty() {
            continue;
        }
        let Some(command) = ControlCommand::from_console(word) else {
            let hint = format!(
                "unrecognised command `{word}`; use stop, shutdown, pause, continue, interrogate or a control code"
            );
            if let Err(error) = write_line(output, &hint) {
                warn!(target: HOST_TARGET, error = %error, "console output failed");
            }
            continue;
        };
        let request = ControlRequest::new(command, 0, current_status(status));
        if sender.send(request).is_err() {
            break;
        }
    }
    debug!(target: HOST_TARGET, "console input closed");
}

/// Turns SIGINT and SIGTERM into a stop request while the host runs.
struct SignalWatcher {
    ids: Vec<SigId>,
    done: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    fn install(sender: Sender<ControlRequest>, status: SharedStatus) -> Result<Self, HostError> {
        let raised = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let mut watcher = Self {
            ids: Vec::with_capacity(TERMINATION_SIGNALS.len()),
            done: Arc::clone(&done),
            thread: None,
        };
        for signal in TERMINATION_SIGNALS {
            let id = signal_hook::flag::register(signal, Arc::clone(&raised))
                .map_err(|source| HostError::Signals { source })?;
            watcher.ids.push(id);
        }
        let thread = thread::Builder::new()
            .name(String::from("tickd-signals"))
            .spawn(move || watch(&raised, &done, &sender, &status))
            .map_err(|source| HostError::Spawn {
                role: "signal watcher",
                source,
            })?;
        watcher.thread = Some(thread);
        Ok(watcher)
    }
}

fn watch(
    raised: &AtomicBool,
    done: &AtomicBool,
    sender: &Sender<ControlRequest>,
    status: &SharedStatus,
) {
    while !done.load(Ordering::SeqCst) {
        if raised.swap(false, Ordering::SeqCst) {
            info!(target: HOST_TARGET, "termination signal received");
            let request = ControlRequest::new(ControlCommand::Stop, 0, current_status(status));
            if sender.send(request).is_err() {
                debug!(target: HOST_TARGET, "controller already stopped");
            }
            return;
        }
        thread::sleep(SIGNAL_POLL);
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: HOST_TARGET, "signal watcher panicked");
        }
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
