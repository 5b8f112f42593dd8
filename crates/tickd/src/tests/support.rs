//! Recording test doubles shared by the controller and host suites.
//!
//! Every double appends to one [`Timeline`], so assertions can check the
//! relative order of status reports, worker lifecycle events, ticks, and
//! event log entries.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::controller::{
    ControlCommand, ControlRequest, ControllerError, ControllerSettings, LifecycleReporter,
    ServiceController, ServiceStatus, StatusReportError, StatusReporter,
};
use crate::eventlog::{EventLevel, EventLog, EventLogError};
use crate::identity::ServiceIdentity;
use crate::worker::{Tick, TickSink, TickSinkError};

/// Interval used by test workers.
pub const FAST_TICK: Duration = Duration::from_millis(5);

/// Pause between scripted requests, long enough for several ticks.
pub const SETTLE: Duration = Duration::from_millis(30);

/// Gap between the two echoes of an interrogate request.
pub const INTERROGATE_DELAY: Duration = Duration::from_millis(50);

/// One observable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A status was delivered to the host.
    Status(ServiceStatus),
    /// A worker was spawned.
    WorkerStarted(u64),
    /// A worker was cancelled and joined.
    WorkerStopped(u64),
    /// A worker ticked.
    Tick(u64),
    /// An event log entry was written.
    Entry {
        /// Entry severity.
        level: EventLevel,
        /// Entry identifier.
        id: u32,
        /// Entry text.
        message: String,
    },
}

/// Ordered, timestamped record shared by all doubles.
#[derive(Debug, Clone, Default)]
pub struct Timeline(Arc<Mutex<Vec<(Instant, Event)>>>);

impl Timeline {
    pub fn push(&self, event: Event) {
        self.0
            .lock()
            .expect("timeline mutex poisoned")
            .push((Instant::now(), event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.0
            .lock()
            .expect("timeline mutex poisoned")
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Delivered statuses with the instant each was recorded.
    pub fn timed_statuses(&self) -> Vec<(Instant, ServiceStatus)> {
        self.0
            .lock()
            .expect("timeline mutex poisoned")
            .iter()
            .filter_map(|(at, event)| match event {
                Event::Status(status) => Some((*at, *status)),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn entries(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Entry { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn ticks_for(&self, generation: u64) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Tick(generation))
            .count()
    }

    /// Returns the first tick recorded after its worker reported stopping.
    pub fn late_tick(&self) -> Option<u64> {
        let mut stopped = Vec::new();
        for event in self.events() {
            match event {
                Event::WorkerStopped(generation) => stopped.push(generation),
                Event::Tick(generation) if stopped.contains(&generation) => {
                    return Some(generation);
                }
                _ => {}
            }
        }
        None
    }

    /// Returns the position of `event`, if recorded.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|recorded| recorded == event)
    }
}

/// Status reporter that records every delivered status.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatusReporter {
    timeline: Timeline,
    reject: Option<ServiceStatus>,
}

impl RecordingStatusReporter {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            reject: None,
        }
    }

    /// Fails delivery of `status`.
    pub fn rejecting(mut self, status: ServiceStatus) -> Self {
        self.reject = Some(status);
        self
    }
}

impl StatusReporter for RecordingStatusReporter {
    fn report(&self, status: ServiceStatus) -> Result<(), StatusReportError> {
        if self.reject == Some(status) {
            return Err(StatusReportError::Closed { status });
        }
        self.timeline.push(Event::Status(status));
        Ok(())
    }
}

/// Lifecycle observer recording worker starts and stops.
#[derive(Debug, Clone, Default)]
pub struct RecordingLifecycle(pub Timeline);

impl LifecycleReporter for RecordingLifecycle {
    fn request_received(&self, _request: &ControlRequest) {}

    fn worker_started(&self, generation: u64) {
        self.0.push(Event::WorkerStarted(generation));
    }

    fn worker_stopped(&self, generation: u64) {
        self.0.push(Event::WorkerStopped(generation));
    }

    fn transitioned(&self, _from: ServiceStatus, _to: ServiceStatus) {}

    fn unexpected_request(&self, _code: u32) {}
}

/// Tick sink recording the generation of every tick.
#[derive(Debug, Clone, Default)]
pub struct RecordingTickSink(pub Timeline);

impl TickSink for RecordingTickSink {
    fn record(&self, tick: &Tick) -> Result<(), TickSinkError> {
        self.0.push(Event::Tick(tick.generation));
        Ok(())
    }
}

/// Event log recording every entry.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventLog(pub Timeline);

impl EventLog for RecordingEventLog {
    fn write(&self, level: EventLevel, event_id: u32, message: &str) -> Result<(), EventLogError> {
        self.0.push(Event::Entry {
            level,
            id: event_id,
            message: message.to_owned(),
        });
        Ok(())
    }
}

/// Identity used by test controllers.
pub fn test_identity() -> ServiceIdentity {
    ServiceIdentity::new("tickd-test", "Test tick service", "/opt/tickd/tickd", "1.3.0")
}

/// Settings with a fast worker and a short interrogate delay.
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        tick_interval: FAST_TICK,
        interrogate_delay: INTERROGATE_DELAY,
    }
}

/// Builds a controller wired to `timeline`.
pub fn recording_controller(timeline: &Timeline) -> ServiceController {
    ServiceController::new(
        test_identity(),
        fast_settings(),
        Arc::new(RecordingEventLog(timeline.clone())),
    )
    .with_tick_sink(Arc::new(RecordingTickSink(timeline.clone())))
    .with_lifecycle_reporter(Arc::new(RecordingLifecycle(timeline.clone())))
}

/// Outcome of a scripted controller run.
#[derive(Debug)]
pub struct ControllerRun {
    pub timeline: Timeline,
    pub outcome: Result<(), ControllerError>,
    pub workers_started: u64,
    pub final_status: ServiceStatus,
    pub live_worker: bool,
}

/// Runs a controller against `commands`, settling between each, then closes
/// the request channel.
pub fn run_script(args: &[String], commands: &[ControlCommand]) -> ControllerRun {
    run_script_with(args, commands, |timeline| {
        RecordingStatusReporter::new(timeline.clone())
    })
}

/// As [`run_script`], with a custom status reporter.
pub fn run_script_with(
    args: &[String],
    commands: &[ControlCommand],
    reporter: impl FnOnce(&Timeline) -> RecordingStatusReporter,
) -> ControllerRun {
    let timeline = Timeline::default();
    let mut controller = recording_controller(&timeline);
    let reporter = reporter(&timeline);
    let (sender, receiver) = mpsc::channel();

    let outcome = thread::scope(|scope| {
        let controller = &mut controller;
        let reporter = &reporter;
        let running = scope.spawn(move || controller.execute(args, &receiver, reporter));
        for command in commands {
            thread::sleep(SETTLE);
            if sender
                .send(ControlRequest::new(*command, 0, ServiceStatus::Running))
                .is_err()
            {
                break;
            }
        }
        drop(sender);
        running.join().expect("controller thread panicked")
    });

    ControllerRun {
        timeline,
        outcome,
        workers_started: controller.workers_started(),
        final_status: controller.status(),
        live_worker: controller.has_live_worker(),
    }
}

/// Parses a comma separated list of console commands.
pub fn parse_commands(list: &str) -> Result<Vec<ControlCommand>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .map(|word| {
            ControlCommand::from_console(word).ok_or_else(|| format!("unknown command '{word}'"))
        })
        .collect()
}

/// Parses a comma separated list of status names.
pub fn parse_statuses(list: &str) -> Result<Vec<ServiceStatus>, String> {
    list.split(',')
        .map(str::trim)
        .map(|word| match word {
            "start_pending" => Ok(ServiceStatus::StartPending),
            "running" => Ok(ServiceStatus::Running),
            "paused" => Ok(ServiceStatus::Paused),
            "stop_pending" => Ok(ServiceStatus::StopPending),
            "stopped" => Ok(ServiceStatus::Stopped),
            other => Err(format!("unknown status '{other}'")),
        })
        .collect()
}

/// Cloneable in-memory writer for console output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("buffer mutex poisoned").clone())
            .expect("console output should be utf-8")
    }

    /// Status names printed by the console reporter, in order.
    pub fn printed_statuses(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter_map(|line| line.strip_prefix("status: "))
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .expect("buffer mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writer that rejects every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenWriter;

impl std::io::Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "console closed",
        ))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Mutable state behind [`FakeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryState {
    pub installed: bool,
    pub event_source: bool,
    pub state: crate::manager::ObservedState,
    pub calls: Vec<String>,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            installed: false,
            event_source: false,
            state: crate::manager::ObservedState::Stopped,
            calls: Vec::new(),
        }
    }
}

/// In-memory service manager whose controls settle immediately.
#[derive(Debug, Clone, Default)]
pub struct FakeRegistry(pub Arc<Mutex<RegistryState>>);

impl FakeRegistry {
    pub fn installed() -> Self {
        let registry = Self::default();
        {
            let mut state = registry.lock();
            state.installed = true;
            state.event_source = true;
            state.state = crate::manager::ObservedState::Running;
        }
        registry
    }

    pub fn snapshot(&self) -> RegistryState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.0.lock().expect("registry mutex poisoned")
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

impl crate::manager::ServiceRegistry for FakeRegistry {
    fn is_installed(&self, _name: &str) -> Result<bool, crate::manager::RegistryError> {
        Ok(self.lock().installed)
    }

    fn create(&self, spec: &crate::manager::ServiceSpec) -> Result<(), crate::manager::RegistryError> {
        self.record(format!("create {} {}", spec.name, spec.launch_arguments.join(" ")));
        self.lock().installed = true;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), crate::manager::RegistryError> {
        self.record(format!("delete {name}"));
        self.lock().installed = false;
        Ok(())
    }

    fn set_restart_on_failure(
        &self,
        name: &str,
        delay: Duration,
    ) -> Result<(), crate::manager::RegistryError> {
        self.record(format!("restart {name} {}ms", delay.as_millis()));
        Ok(())
    }

    fn install_event_source(&self, name: &str) -> Result<(), crate::manager::RegistryError> {
        self.record(format!("install event source {name}"));
        self.lock().event_source = true;
        Ok(())
    }

    fn remove_event_source(&self, name: &str) -> Result<(), crate::manager::RegistryError> {
        self.record(format!("remove event source {name}"));
        self.lock().event_source = false;
        Ok(())
    }

    fn start(&self, name: &str, arguments: &[String]) -> Result<(), crate::manager::RegistryError> {
        self.record(format!("start {name} {}", arguments.join(" ")));
        self.lock().state = crate::manager::ObservedState::Running;
        Ok(())
    }

    fn send_control(
        &self,
        name: &str,
        command: crate::manager::ServiceCommand,
    ) -> Result<crate::manager::ObservedState, crate::manager::RegistryError> {
        self.record(format!("{command} {name}"));
        let target = command.target_state();
        self.lock().state = target;
        Ok(target)
    }

    fn query_state(
        &self,
        _name: &str,
    ) -> Result<crate::manager::ObservedState, crate::manager::RegistryError> {
        Ok(self.lock().state)
    }
}
