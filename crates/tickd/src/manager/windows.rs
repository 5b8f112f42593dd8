//! Service Control Manager backend.

use std::ffi::OsString;
use std::io;
use std::time::Duration;

use windows_service::service::{
    Service, ServiceAccess, ServiceAction, ServiceActionType, ServiceErrorControl,
    ServiceFailureActions, ServiceFailureResetPeriod, ServiceInfo, ServiceStartType,
    ServiceState, ServiceType,
};
use windows_service::service_manager::{ServiceManager, ServiceManagerAccess};

use super::{ObservedState, RegistryError, ServiceCommand, ServiceRegistry, ServiceSpec};
use crate::eventlog;

/// [`ServiceRegistry`] backed by the local Service Control Manager.
pub struct WindowsRegistry {
    manager: ServiceManager,
}

impl std::fmt::Debug for WindowsRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("WindowsRegistry").finish_non_exhaustive()
    }
}

impl WindowsRegistry {
    /// Connects to the local Service Control Manager.
    pub fn connect() -> Result<Self, RegistryError> {
        let manager = ServiceManager::local_computer(
            None::<&str>,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )
        .map_err(|error| backend("connect service manager", "", error))?;
        Ok(Self { manager })
    }

    fn open(&self, name: &str, access: ServiceAccess) -> Result<Service, RegistryError> {
        self.manager
            .open_service(name, access)
            .map_err(|error| backend("open service", name, error))
    }
}

impl ServiceRegistry for WindowsRegistry {
    fn is_installed(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self
            .manager
            .open_service(name, ServiceAccess::QUERY_STATUS)
            .is_ok())
    }

    fn create(&self, spec: &ServiceSpec) -> Result<(), RegistryError> {
        let info = ServiceInfo {
            name: OsString::from(&spec.name),
            display_name: OsString::from(&spec.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: spec.executable.clone(),
            launch_arguments: spec.launch_arguments.iter().map(OsString::from).collect(),
            dependencies: Vec::new(),
            account_name: None,
            account_password: None,
        };
        self.manager
            .create_service(&info, ServiceAccess::QUERY_STATUS)
            .map(drop)
            .map_err(|error| backend("create service", &spec.name, error))
    }

    fn delete(&self, name: &str) -> Result<(), RegistryError> {
        self.open(name, ServiceAccess::DELETE)?
            .delete()
            .map_err(|error| backend("delete service", name, error))
    }

    fn set_restart_on_failure(&self, name: &str, delay: Duration) -> Result<(), RegistryError> {
        let actions = ServiceFailureActions {
            reset_period: ServiceFailureResetPeriod::Never,
            reboot_msg: None,
            command: None,
            actions: Some(vec![ServiceAction {
                action_type: ServiceActionType::Restart,
                delay,
            }]),
        };
        self.open(name, ServiceAccess::START | ServiceAccess::CHANGE_CONFIG)?
            .update_failure_actions(actions)
            .map_err(|error| backend("set recovery actions", name, error))
    }

    fn install_event_source(&self, name: &str) -> Result<(), RegistryError> {
        eventlog::install_event_source(name)
            .map_err(|source| RegistryError::new("install event source", name, source))
    }

    fn remove_event_source(&self, name: &str) -> Result<(), RegistryError> {
        eventlog::remove_event_source(name)
            .map_err(|source| RegistryError::new("remove event source", name, source))
    }

    fn start(&self, name: &str, arguments: &[String]) -> Result<(), RegistryError> {
        self.open(name, ServiceAccess::START)?
            .start(arguments)
            .map_err(|error| backend("start service", name, error))
    }

    fn send_control(
        &self,
        name: &str,
        command: ServiceCommand,
    ) -> Result<ObservedState, RegistryError> {
        let service = self.open(
            name,
            ServiceAccess::STOP | ServiceAccess::PAUSE_CONTINUE | ServiceAccess::QUERY_STATUS,
        )?;
        let status = match command {
            ServiceCommand::Stop => service.stop(),
            ServiceCommand::Pause => service.pause(),
            ServiceCommand::Continue => service.resume(),
        }
        .map_err(|error| backend("send control", name, error))?;
        Ok(observed(status.current_state))
    }

    fn query_state(&self, name: &str) -> Result<ObservedState, RegistryError> {
        let status = self
            .open(name, ServiceAccess::QUERY_STATUS)?
            .query_status()
            .map_err(|error| backend("query service status", name, error))?;
        Ok(observed(status.current_state))
    }
}

const fn observed(state: ServiceState) -> ObservedState {
    match state {
        ServiceState::Stopped => ObservedState::Stopped,
        ServiceState::StartPending => ObservedState::StartPending,
        ServiceState::StopPending => ObservedState::StopPending,
        ServiceState::Running => ObservedState::Running,
        ServiceState::ContinuePending => ObservedState::ContinuePending,
        ServiceState::PausePending => ObservedState::PausePending,
        ServiceState::Paused => ObservedState::Paused,
    }
}

fn backend(operation: &'static str, name: &str, error: windows_service::Error) -> RegistryError {
    RegistryError::new(operation, name, io::Error::other(error))
}
