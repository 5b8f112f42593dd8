//! Test suites for the tick service.

mod host_behaviour;
pub(crate) mod support;
