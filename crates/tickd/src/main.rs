//! CLI entrypoint for the tick service.
//!
//! The binary delegates to [`tickd::run`]. Output handles are not locked up
//! front because the debug host writes status lines from other threads.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    tickd::run(std::env::args_os(), &mut stdout, &mut stderr)
}
