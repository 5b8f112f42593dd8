//! Windows Event Log sink and event source registration.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, HANDLE};
use windows_sys::Win32::System::EventLog::{
    DeregisterEventSource, EVENTLOG_ERROR_TYPE, EVENTLOG_INFORMATION_TYPE,
    EVENTLOG_WARNING_TYPE, RegisterEventSourceW, ReportEventW,
};
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_LOCAL_MACHINE, KEY_WRITE, REG_DWORD, REG_EXPAND_SZ, REG_OPENED_EXISTING_KEY,
    REG_OPTION_NON_VOLATILE, RegCloseKey, RegCreateKeyExW, RegDeleteKeyW, RegSetValueExW,
};

use super::{EventLevel, EventLog, EventLogError};

const EVENT_SOURCE_ROOT: &str = r"SYSTEM\CurrentControlSet\Services\EventLog\Application";
const EVENT_MESSAGE_FILE: &str = r"%SystemRoot%\System32\EventCreate.exe";
const SUPPORTED_TYPES: u32 =
    (EVENTLOG_ERROR_TYPE | EVENTLOG_WARNING_TYPE | EVENTLOG_INFORMATION_TYPE) as u32;

/// Sink writing to the Windows Application event log.
#[derive(Debug)]
pub struct WindowsEventLog {
    handle: EventSourceHandle,
}

#[derive(Debug)]
struct EventSourceHandle(HANDLE);

// Event source handles may be used from any thread; ReportEventW serialises
// appends internally.
unsafe impl Send for EventSourceHandle {}
unsafe impl Sync for EventSourceHandle {}

impl WindowsEventLog {
    /// Opens the event source registered under `source`.
    pub fn open(source: &str) -> Result<Self, EventLogError> {
        let name = wide(source);
        let handle = unsafe { RegisterEventSourceW(ptr::null(), name.as_ptr()) };
        if handle.is_null() {
            return Err(EventLogError::Open {
                source_name: source.to_owned(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Self {
            handle: EventSourceHandle(handle),
        })
    }
}

impl EventLog for WindowsEventLog {
    fn write(&self, level: EventLevel, event_id: u32, message: &str) -> Result<(), EventLogError> {
        let kind = match level {
            EventLevel::Info => EVENTLOG_INFORMATION_TYPE,
            EventLevel::Warning => EVENTLOG_WARNING_TYPE,
            EventLevel::Error => EVENTLOG_ERROR_TYPE,
        };
        let text = wide(message);
        let strings = [text.as_ptr()];
        let reported = unsafe {
            ReportEventW(
                self.handle.0,
                kind,
                0,
                event_id,
                ptr::null_mut(),
                1,
                0,
                strings.as_ptr(),
                ptr::null(),
            )
        };
        if reported == 0 {
            return Err(EventLogError::Write {
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl Drop for WindowsEventLog {
    fn drop(&mut self) {
        unsafe {
            DeregisterEventSource(self.handle.0);
        }
    }
}

/// Registers `source` as an event source backed by `EventCreate.exe`.
///
/// Fails when the source is already registered.
pub(crate) fn install_event_source(source: &str) -> io::Result<()> {
    let path = wide(&format!(r"{EVENT_SOURCE_ROOT}\{source}"));
    let mut raw_key: HKEY = ptr::null_mut();
    let mut disposition = 0;
    let status = unsafe {
        RegCreateKeyExW(
            HKEY_LOCAL_MACHINE,
            path.as_ptr(),
            0,
            ptr::null(),
            REG_OPTION_NON_VOLATILE,
            KEY_WRITE,
            ptr::null(),
            &mut raw_key,
            &mut disposition,
        )
    };
    if status != ERROR_SUCCESS {
        return Err(os_error(status));
    }
    let key = RegistryKey(raw_key);
    if disposition == REG_OPENED_EXISTING_KEY {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(r"{EVENT_SOURCE_ROOT}\{source} registry key already exists"),
        ));
    }
    key.set_expand_string("EventMessageFile", EVENT_MESSAGE_FILE)?;
    key.set_dword("TypesSupported", SUPPORTED_TYPES)?;
    key.set_dword("CustomSource", 1)?;
    Ok(())
}

/// Deletes the registry key describing `source`.
pub(crate) fn remove_event_source(source: &str) -> io::Result<()> {
    let path = wide(&format!(r"{EVENT_SOURCE_ROOT}\{source}"));
    let status = unsafe { RegDeleteKeyW(HKEY_LOCAL_MACHINE, path.as_ptr()) };
    match status {
        ERROR_SUCCESS => Ok(()),
        ERROR_FILE_NOT_FOUND => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("event source {source} is not registered"),
        )),
        other => Err(os_error(other)),
    }
}

struct RegistryKey(HKEY);

impl RegistryKey {
    fn set_expand_string(&self, name: &str, value: &str) -> io::Result<()> {
        let data = wide(value);
        let bytes = u32::try_from(data.len() * size_of::<u16>())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "registry value too large"))?;
        self.set_raw(name, REG_EXPAND_SZ, data.as_ptr().cast(), bytes)
    }

    fn set_dword(&self, name: &str, value: u32) -> io::Result<()> {
        let data = std::ptr::from_ref(&value).cast::<u8>();
        self.set_raw(name, REG_DWORD, data, 4)
    }

    fn set_raw(&self, name: &str, kind: u32, data: *const u8, len: u32) -> io::Result<()> {
        let wide_name = wide(name);
        let status = unsafe { RegSetValueExW(self.0, wide_name.as_ptr(), 0, kind, data, len) };
        if status != ERROR_SUCCESS {
            return Err(os_error(status));
        }
        Ok(())
    }
}

impl Drop for RegistryKey {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

fn os_error(status: u32) -> io::Error {
    io::Error::from_raw_os_error(i32::try_from(status).unwrap_or(i32::MAX))
}

fn wide(text: &str) -> Vec<u16> {
    OsStr::new(text).encode_wide().chain(Some(0)).collect()
}
