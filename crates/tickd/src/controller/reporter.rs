//! Structured reporting for controller lifecycle events.

use std::sync::Arc;

use super::CONTROLLER_TARGET;
use super::types::{ControlRequest, ServiceStatus};

/// Observer trait used to surface controller events to telemetry sinks.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked when a control request is taken off the channel.
    fn request_received(&self, request: &ControlRequest);

    /// Invoked after a worker thread has been spawned.
    fn worker_started(&self, generation: u64);

    /// Invoked after a worker thread has been cancelled and joined.
    fn worker_stopped(&self, generation: u64);

    /// Invoked when the controller changes state.
    fn transitioned(&self, from: ServiceStatus, to: ServiceStatus);

    /// Invoked when a control code is not modelled.
    fn unexpected_request(&self, code: u32);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn request_received(&self, request: &ControlRequest) {
        (**self).request_received(request);
    }

    fn worker_started(&self, generation: u64) {
        (**self).worker_started(generation);
    }

    fn worker_stopped(&self, generation: u64) {
        (**self).worker_stopped(generation);
    }

    fn transitioned(&self, from: ServiceStatus, to: ServiceStatus) {
        (**self).transitioned(from, to);
    }

    fn unexpected_request(&self, code: u32) {
        (**self).unexpected_request(code);
    }
}

/// Default reporter that records controller events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn request_received(&self, request: &ControlRequest) {
        tracing::debug!(
            target: CONTROLLER_TARGET,
            event = "request_received",
            command = %request.command,
            context = request.context,
            current_status = %request.current_status,
            "received control request"
        );
    }

    fn worker_started(&self, generation: u64) {
        tracing::debug!(
            target: CONTROLLER_TARGET,
            event = "worker_started",
            generation,
            "worker started"
        );
    }

    fn worker_stopped(&self, generation: u64) {
        tracing::debug!(
            target: CONTROLLER_TARGET,
            event = "worker_stopped",
            generation,
            "worker stopped"
        );
    }

    fn transitioned(&self, from: ServiceStatus, to: ServiceStatus) {
        tracing::info!(
            target: CONTROLLER_TARGET,
            event = "transitioned",
            %from,
            %to,
            "service status changed"
        );
    }

    fn unexpected_request(&self, code: u32) {
        tracing::warn!(
            target: CONTROLLER_TARGET,
            event = "unexpected_request",
            code,
            "unexpected control request"
        );
    }
}
