//! Behavioural tests for the debug console host.

use std::cell::RefCell;
use std::io::Cursor;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{BrokenWriter, SharedBuffer, Timeline, recording_controller};
use crate::host::{DebugHost, HostError, run_controller};

type StepResult = Result<(), String>;

#[derive(Default)]
struct HostWorld {
    input: String,
    broken_output: bool,
    output: SharedBuffer,
    timeline: Timeline,
    outcome: Option<Result<(), HostError>>,
}

impl HostWorld {
    fn outcome(&self) -> Result<&Result<(), HostError>, String> {
        self.outcome
            .as_ref()
            .ok_or_else(|| String::from("service has not run"))
    }
}

#[fixture]
fn world() -> RefCell<HostWorld> {
    RefCell::new(HostWorld::default())
}

#[given("console input \"{commands}\"")]
fn given_console_input(world: &RefCell<HostWorld>, commands: String) {
    let lines: Vec<&str> = commands
        .split(',')
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .collect();
    let mut input = lines.join("\n");
    if !input.is_empty() {
        input.push('\n');
    }
    world.borrow_mut().input = input;
}

#[given("empty console input")]
fn given_empty_input(world: &RefCell<HostWorld>) {
    world.borrow_mut().input.clear();
}

#[given("a broken console")]
fn given_broken_console(world: &RefCell<HostWorld>) {
    world.borrow_mut().broken_output = true;
}

#[when("the service runs on the debug host")]
fn when_service_runs(world: &RefCell<HostWorld>) {
    let mut world = world.borrow_mut();
    let input = Cursor::new(world.input.clone().into_bytes());
    let host = if world.broken_output {
        DebugHost::scripted(input, BrokenWriter)
    } else {
        DebugHost::scripted(input, world.output.clone())
    };
    let controller = recording_controller(&world.timeline);
    world.outcome = Some(run_controller(&host, controller));
}

#[then("the run succeeds")]
fn then_run_succeeds(world: &RefCell<HostWorld>) -> StepResult {
    let world = world.borrow();
    world
        .outcome()?
        .as_ref()
        .map_err(|error| format!("run failed: {error}"))?;
    Ok(())
}

#[then("the run fails")]
fn then_run_fails(world: &RefCell<HostWorld>) -> StepResult {
    let world = world.borrow();
    match world.outcome()? {
        Err(HostError::Report(_)) => Ok(()),
        other => Err(format!("expected a status report failure, got {other:?}")),
    }
}

#[then("the console shows statuses \"{statuses}\"")]
fn then_console_statuses(world: &RefCell<HostWorld>, statuses: String) -> StepResult {
    let expected: Vec<String> = statuses.split(',').map(|s| s.trim().to_owned()).collect();
    let actual = world.borrow().output.printed_statuses();
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected:?}, got {actual:?}"))
    }
}

#[then("the console output mentions \"{text}\"")]
fn then_console_mentions(world: &RefCell<HostWorld>, text: String) -> StepResult {
    let output = world.borrow().output.contents();
    if output.contains(&text) {
        Ok(())
    } else {
        Err(format!("'{text}' missing from console output:\n{output}"))
    }
}

#[then("the event log reads \"{entries}\"")]
fn then_event_log_reads(world: &RefCell<HostWorld>, entries: String) -> StepResult {
    let expected: Vec<String> = entries.split(',').map(|s| s.trim().to_owned()).collect();
    let actual = world.borrow().timeline.entries();
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected entries {expected:?}, got {actual:?}"))
    }
}

#[then("the event log mentions \"{text}\"")]
fn then_event_log_mentions(world: &RefCell<HostWorld>, text: String) -> StepResult {
    let entries = world.borrow().timeline.entries();
    if entries.iter().any(|entry| entry.contains(&text)) {
        Ok(())
    } else {
        Err(format!("'{text}' missing from event log {entries:?}"))
    }
}

#[scenario(
    path = "tests/features/debug_host.feature",
    name = "Console commands drive the service through pause and continue"
)]
fn console_drives_pause_and_continue(world: RefCell<HostWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/debug_host.feature",
    name = "End of input stops the service"
)]
fn end_of_input_stops_service(world: RefCell<HostWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/debug_host.feature",
    name = "Unrecognised words are reported and ignored"
)]
fn unrecognised_words_are_ignored(world: RefCell<HostWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/debug_host.feature",
    name = "A broken console fails the run"
)]
fn broken_console_fails_run(world: RefCell<HostWorld>) {
    drop(world);
}
