//! Memory and object lifetime validation layer core.
//!
//! `memtrack` is the state-tracking heart of a validation layer that sits
//! between an application and a low-level graphics/compute driver. The
//! interception plumbing lives outside this crate: for every intercepted
//! call the interceptor invokes the matching entry point on
//! [`MemTracker`], forwards to the driver unless the entry point asked to
//! skip, and invokes the post-call hook where one exists.
//!
//! The core keeps per-device object tables (memory, buffers, images,
//! command buffers, queues, fences, semaphores, swapchains) plus the
//! cross-reference graph between them, distinguishes in-flight from
//! retired work via per-queue fence ids, and reports misuse through an
//! injectable diagnostic sink.

mod config;
mod handle;
mod layer;
mod report;
mod track;

use bitflags::bitflags;
use thiserror::Error;

pub use config::{Config, DebugAction, DEBUG_ACTION_ENV, LOG_FILENAME_ENV, REPORT_FLAGS_ENV};
pub use handle::{
    BufferId, CommandBufferId, DeviceId, FenceId, ImageId, InstanceId, MemoryId, QueueId,
    ResourceKind, ResourceRef, SemaphoreId, SwapchainId,
};
pub use layer::MemTracker;
pub use report::{
    CallbackHandle, Diagnostic, LogCallback, MessageCode, ObjectKind, RecordingCallback,
    ReportCallback, ReportFlags, Severity, TraceCallback,
};

/// The API version the layer reports.
pub const API_VERSION: u32 = make_api_version(1, 0, 0);

/// The layer's own implementation version.
pub const IMPLEMENTATION_VERSION: u32 = make_api_version(0, 1, 0);

/// Device extension whose presence enables swapchain tracking.
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

const fn make_api_version(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 22) | (minor << 12) | patch
}

/// Status returned when validation decided the intercepted call must not
/// reach the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("validation failed")]
pub struct ValidationFailed;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM_TEXEL = 1 << 2;
        const STORAGE_TEXEL = 1 << 3;
        const UNIFORM = 1 << 4;
        const STORAGE = 1 << 5;
        const INDEX = 1 << 6;
        const VERTEX = 1 << 7;
        const INDIRECT = 1 << 8;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
        const TRANSIENT_ATTACHMENT = 1 << 6;
        const INPUT_ATTACHMENT = 1 << 7;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MemoryTypeFlags: u32 {
        /// Memory that is local to the device.
        const DEVICE_LOCAL = 1 << 0;
        /// Memory that the host may map.
        const HOST_VISIBLE = 1 << 1;
        /// If not set the host needs to flush its writes.
        const HOST_COHERENT = 1 << 2;
        const HOST_CACHED = 1 << 3;
        const LAZILY_ALLOCATED = 1 << 4;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FenceCreateFlags: u32 {
        /// The fence starts out signaled.
        const SIGNALED = 1 << 0;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemoryType {
    pub property_flags: MemoryTypeFlags,
}

/// Snapshot of the adapter's memory types, captured when the interceptor
/// observes the memory-properties query.
#[derive(Clone, Debug, Default)]
pub struct MemoryProperties {
    pub memory_types: Vec<MemoryType>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryAllocateInfo {
    pub allocation_size: u64,
    pub memory_type_index: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferCreateInfo {
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub usage: ImageUsage,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FenceCreateInfo {
    pub flags: FenceCreateFlags,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwapchainCreateInfo {
    pub min_image_count: u32,
    pub image_usage: ImageUsage,
}

/// One batch of work handed to a queue.
#[derive(Copy, Clone, Debug, Default)]
pub struct SubmitInfo<'a> {
    pub wait_semaphores: &'a [SemaphoreId],
    pub command_buffers: &'a [CommandBufferId],
    pub signal_semaphores: &'a [SemaphoreId],
}

/// One memory binding inside a sparse bind batch. `memory` of `None`
/// unbinds the range.
#[derive(Copy, Clone, Debug)]
pub struct SparseMemoryBind {
    pub memory: Option<MemoryId>,
}

#[derive(Copy, Clone, Debug)]
pub struct SparseBufferBind<'a> {
    pub buffer: BufferId,
    pub binds: &'a [SparseMemoryBind],
}

#[derive(Copy, Clone, Debug)]
pub struct SparseImageBind<'a> {
    pub image: ImageId,
    pub binds: &'a [SparseMemoryBind],
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SparseBindInfo<'a> {
    pub buffer_binds: &'a [SparseBufferBind<'a>],
    pub image_opaque_binds: &'a [SparseImageBind<'a>],
    pub image_binds: &'a [SparseImageBind<'a>],
}

/// Layer identity returned by the enumeration entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerProperties {
    pub layer_name: &'static str,
    pub spec_version: u32,
    pub implementation_version: u32,
    pub description: &'static str,
}

pub fn layer_properties() -> LayerProperties {
    LayerProperties {
        layer_name: "MemTracker",
        spec_version: API_VERSION,
        implementation_version: IMPLEMENTATION_VERSION,
        description: "Validation layer: MemTracker",
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionProperties {
    pub extension_name: String,
    pub spec_version: u32,
}

/// The layer exposes no instance extensions.
pub fn instance_extensions() -> Vec<ExtensionProperties> {
    Vec::new()
}

/// The layer exposes no device extensions.
pub fn device_extensions() -> Vec<ExtensionProperties> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_identity() {
        let props = layer_properties();
        assert_eq!(props.layer_name, "MemTracker");
        assert!(props.spec_version > props.implementation_version);
        assert!(instance_extensions().is_empty());
        assert!(device_extensions().is_empty());
    }
}
