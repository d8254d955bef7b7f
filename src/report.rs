//! Diagnostic sink.
//!
//! The core does not print anything itself; every rule reports through a
//! [`DebugReport`], which fans the message out to the registered callbacks.
//! Callbacks are registered per instance and destroyed in reverse order
//! when the instance goes away.

use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;

bitflags! {
    /// Severity mask selecting which diagnostics are delivered.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ReportFlags: u32 {
        const INFO = 1 << 0;
        const WARN = 1 << 1;
        const ERROR = 1 << 2;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn flag(self) -> ReportFlags {
        match self {
            Severity::Info => ReportFlags::INFO,
            Severity::Warn => ReportFlags::WARN,
            Severity::Error => ReportFlags::ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of the object a diagnostic is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Instance,
    Device,
    Memory,
    Buffer,
    Image,
    SwapchainImage,
    CommandBuffer,
    Queue,
    Fence,
    Semaphore,
    Swapchain,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Instance => "instance",
            ObjectKind::Device => "device",
            ObjectKind::Memory => "memory",
            ObjectKind::Buffer => "buffer",
            ObjectKind::Image => "image",
            ObjectKind::SwapchainImage => "swapchain image",
            ObjectKind::CommandBuffer => "command buffer",
            ObjectKind::Queue => "queue",
            ObjectKind::Fence => "fence",
            ObjectKind::Semaphore => "semaphore",
            ObjectKind::Swapchain => "swapchain",
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed taxonomy of diagnostic codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageCode {
    /// Informational message without an error condition.
    None,
    InvalidCb,
    InvalidMemObj,
    InvalidObject,
    InvalidUsageFlag,
    InvalidMap,
    InvalidState,
    InvalidFenceState,
    MissingMemBindings,
    RebindObject,
    MemObjClearEmptyBindings,
    FreedMemRef,
    MemoryLeak,
    ResetCbWhileInFlight,
}

/// One emitted diagnostic.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub object_kind: ObjectKind,
    /// Raw handle of the object the message is about, `0` if none.
    pub handle: u64,
    pub code: MessageCode,
    pub layer_prefix: &'static str,
    pub message: String,
}

/// A registered diagnostic consumer.
pub trait ReportCallback: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

struct Registered {
    handle: CallbackHandle,
    flags: ReportFlags,
    callback: Arc<dyn ReportCallback>,
}

/// Fan-out point for diagnostics.
///
/// Shared between the instance and the devices created from it. Emission
/// never blocks on anything but the callback itself and never panics.
pub struct DebugReport {
    active_flags: ReportFlags,
    callbacks: Mutex<Vec<Registered>>,
    next_handle: Mutex<u64>,
}

impl DebugReport {
    pub fn new(active_flags: ReportFlags) -> Self {
        Self {
            active_flags,
            callbacks: Mutex::new(Vec::new()),
            next_handle: Mutex::new(1),
        }
    }

    /// Whether any diagnostic of `severity` would be delivered at all.
    ///
    /// Used to early-out of expensive info dumps.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.active_flags.contains(severity.flag())
    }

    pub fn add_callback(
        &self,
        flags: ReportFlags,
        callback: Arc<dyn ReportCallback>,
    ) -> CallbackHandle {
        let mut next = self.next_handle.lock();
        let handle = CallbackHandle(*next);
        *next += 1;

        self.callbacks.lock().push(Registered {
            handle,
            flags,
            callback,
        });
        handle
    }

    pub fn remove_callback(&self, handle: CallbackHandle) {
        self.callbacks.lock().retain(|r| r.handle != handle);
    }

    /// Drops all callbacks, newest first.
    pub fn clear_callbacks(&self) {
        let mut callbacks = self.callbacks.lock();
        while callbacks.pop().is_some() {}
    }

    pub fn emit(
        &self,
        severity: Severity,
        object_kind: ObjectKind,
        handle: u64,
        code: MessageCode,
        layer_prefix: &'static str,
        message: String,
    ) {
        if !self.enabled(severity) {
            return;
        }

        let diagnostic = Diagnostic {
            severity,
            object_kind,
            handle,
            code,
            layer_prefix,
            message,
        };

        for registered in self.callbacks.lock().iter() {
            if registered.flags.contains(severity.flag()) {
                registered.callback.report(&diagnostic);
            }
        }
    }
}

impl fmt::Debug for DebugReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugReport")
            .field("active_flags", &self.active_flags)
            .field("callbacks", &self.callbacks.lock().len())
            .finish()
    }
}

/// Callback writing formatted diagnostic lines to a log stream.
pub struct LogCallback {
    output: Mutex<Box<dyn Write + Send>>,
}

impl LogCallback {
    pub fn new(output: Box<dyn Write + Send>) -> Self {
        Self {
            output: Mutex::new(output),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }
}

impl ReportCallback for LogCallback {
    fn report(&self, diagnostic: &Diagnostic) {
        let mut output = self.output.lock();
        // A failed write must not take the application down.
        let _ = writeln!(
            output,
            "{}({}): {} {:#x}: {}",
            diagnostic.layer_prefix,
            diagnostic.severity,
            diagnostic.object_kind,
            diagnostic.handle,
            diagnostic.message,
        );
    }
}

/// Callback forwarding diagnostics as `tracing` events.
#[derive(Debug, Default)]
pub struct TraceCallback;

impl ReportCallback for TraceCallback {
    fn report(&self, diagnostic: &Diagnostic) {
        let kind = diagnostic.object_kind.as_str();
        match diagnostic.severity {
            Severity::Info => tracing::info!(
                target: "memtrack",
                code = ?diagnostic.code,
                object = kind,
                handle = diagnostic.handle,
                "{}",
                diagnostic.message,
            ),
            Severity::Warn => tracing::warn!(
                target: "memtrack",
                code = ?diagnostic.code,
                object = kind,
                handle = diagnostic.handle,
                "{}",
                diagnostic.message,
            ),
            Severity::Error => tracing::error!(
                target: "memtrack",
                code = ?diagnostic.code,
                object = kind,
                handle = diagnostic.handle,
                "{}",
                diagnostic.message,
            ),
        }
    }
}

/// Callback recording every delivered diagnostic, for tests.
#[derive(Default)]
pub struct RecordingCallback {
    records: Mutex<Vec<Diagnostic>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded diagnostics and clears the record.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.records.lock())
    }

    /// Codes of all recorded diagnostics, in emission order.
    pub fn codes(&self) -> Vec<MessageCode> {
        self.records.lock().iter().map(|d| d.code).collect()
    }

    /// Codes of recorded warnings and errors, ignoring info chatter.
    pub fn problem_codes(&self) -> Vec<MessageCode> {
        self.records
            .lock()
            .iter()
            .filter(|d| d.severity != Severity::Info)
            .map(|d| d.code)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.records
            .lock()
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

impl ReportCallback for RecordingCallback {
    fn report(&self, diagnostic: &Diagnostic) {
        self.records.lock().push(diagnostic.clone());
    }
}
