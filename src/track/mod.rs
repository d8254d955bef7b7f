//! Per-device state tracking.
//!
//! One [`DeviceTracker`] exists per device and owns every table the layer
//! keeps: memory objects, resources (buffers, images, swapchain images),
//! command buffers, queues, fences, semaphores and swapchains, plus the
//! cross-reference graph between memory, resources and command buffers.
//!
//! All mutation happens under the layer's global lock; the tracker itself
//! is plain data.

mod binding;
mod command;
mod memory;
mod swapchain;
mod sync;
pub(crate) mod usage;

use std::sync::Arc;

use hashbrown::HashMap;

use crate::handle::{
    BufferId, CommandBufferId, FenceId, ImageId, MemoryId, QueueId, ResourceKind, ResourceRef,
    SemaphoreId, SwapchainId,
};
use crate::report::{DebugReport, MessageCode, ObjectKind, Severity};
use crate::{
    BufferCreateInfo, FenceCreateInfo, ImageCreateInfo, MemoryAllocateInfo, SwapchainCreateInfo,
};

pub(crate) const LAYER_PREFIX: &str = "MEM";
pub(crate) const SEMAPHORE_PREFIX: &str = "SEMAPHORE";
pub(crate) const SWAPCHAIN_PREFIX: &str = "SWAP_CHAIN";

/// Namespace a resource handle lives in.
///
/// Swapchain images share the image namespace; buffer and image handle
/// spaces may overlap, so table keys carry the namespace.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Namespace {
    Buffer,
    Image,
}

impl ResourceKind {
    fn namespace(self) -> Namespace {
        match self {
            ResourceKind::Buffer => Namespace::Buffer,
            ResourceKind::Image | ResourceKind::SwapchainImage => Namespace::Image,
        }
    }

    pub(crate) fn object_kind(self) -> ObjectKind {
        match self {
            ResourceKind::Buffer => ObjectKind::Buffer,
            ResourceKind::Image => ObjectKind::Image,
            ResourceKind::SwapchainImage => ObjectKind::SwapchainImage,
        }
    }
}

/// Key of the shared resource table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ResourceKey {
    ns: Namespace,
    raw: u64,
}

impl ResourceKey {
    pub(crate) fn buffer(buffer: BufferId) -> Self {
        Self {
            ns: Namespace::Buffer,
            raw: buffer.into_raw(),
        }
    }

    pub(crate) fn image(image: ImageId) -> Self {
        Self {
            ns: Namespace::Image,
            raw: image.into_raw(),
        }
    }
}

impl From<ResourceRef> for ResourceKey {
    fn from(r: ResourceRef) -> Self {
        Self {
            ns: r.kind.namespace(),
            raw: r.raw,
        }
    }
}

/// What a resource is currently bound to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MemoryBinding {
    Unbound,
    /// Reserved marker for swapchain images; their backing store belongs
    /// to the presentation engine and is never a tracked allocation.
    Sentinel,
    Memory(MemoryId),
}

#[derive(Clone, Debug)]
pub(crate) enum ResourceCreateInfo {
    Buffer(BufferCreateInfo),
    Image(ImageCreateInfo),
}

impl ResourceCreateInfo {
    pub(crate) fn usage_bits(&self) -> u32 {
        match self {
            ResourceCreateInfo::Buffer(info) => info.usage.bits(),
            ResourceCreateInfo::Image(info) => info.usage.bits(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ResourceInfo {
    pub(crate) kind: ResourceKind,
    pub(crate) create_info: ResourceCreateInfo,
    pub(crate) bound_memory: MemoryBinding,
}

#[derive(Clone, Debug)]
pub(crate) struct MemoryInfo {
    pub(crate) alloc_info: MemoryAllocateInfo,
    /// Bookkeeping count, always `resources.len() + command_buffers.len()`.
    pub(crate) ref_count: u32,
    pub(crate) resources: Vec<ResourceRef>,
    pub(crate) command_buffers: Vec<CommandBufferId>,
}

impl MemoryInfo {
    fn new(alloc_info: MemoryAllocateInfo) -> Self {
        Self {
            alloc_info,
            ref_count: 0,
            resources: Vec::new(),
            command_buffers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CommandBufferInfo {
    /// Fence id of the last submission, 0 if never submitted.
    pub(crate) fence_id: u64,
    pub(crate) last_submitted_fence: Option<FenceId>,
    pub(crate) last_submitted_queue: Option<QueueId>,
    pub(crate) memory_refs: Vec<MemoryId>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct QueueInfo {
    pub(crate) last_submitted_id: u64,
    pub(crate) last_retired_id: u64,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FenceInfo {
    /// The signaled bit is updated as the fence changes state.
    pub(crate) create_info: FenceCreateInfo,
    pub(crate) fence_id: u64,
    pub(crate) queue: Option<QueueId>,
}

impl FenceInfo {
    pub(crate) fn signaled(&self) -> bool {
        self.create_info.flags.contains(crate::FenceCreateFlags::SIGNALED)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SemaphoreState {
    Unset,
    Signaled,
    Wait,
}

#[derive(Clone, Debug)]
pub(crate) struct SwapchainInfo {
    pub(crate) create_info: SwapchainCreateInfo,
    pub(crate) images: Vec<ImageId>,
}

#[derive(Debug)]
pub(crate) struct DeviceTracker {
    pub(crate) report: Arc<DebugReport>,
    pub(crate) wsi_enabled: bool,
    next_fence_id: u64,
    pub(crate) memory: HashMap<MemoryId, MemoryInfo>,
    pub(crate) resources: HashMap<ResourceKey, ResourceInfo>,
    pub(crate) command_buffers: HashMap<CommandBufferId, CommandBufferInfo>,
    pub(crate) queues: HashMap<QueueId, QueueInfo>,
    pub(crate) fences: HashMap<FenceId, FenceInfo>,
    pub(crate) semaphores: HashMap<SemaphoreId, SemaphoreState>,
    pub(crate) swapchains: HashMap<SwapchainId, SwapchainInfo>,
}

impl DeviceTracker {
    pub(crate) fn new(report: Arc<DebugReport>, wsi_enabled: bool) -> Self {
        Self {
            report,
            wsi_enabled,
            next_fence_id: 1,
            memory: HashMap::new(),
            resources: HashMap::new(),
            command_buffers: HashMap::new(),
            queues: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            swapchains: HashMap::new(),
        }
    }

    /// Allocates the next per-device fence id. Strictly increasing,
    /// starting at 1.
    pub(crate) fn next_fence_id(&mut self) -> u64 {
        let id = self.next_fence_id;
        self.next_fence_id += 1;
        id
    }

    pub(crate) fn add_queue(&mut self, queue: QueueId) {
        self.queues.entry(queue).or_default();
    }

    pub(crate) fn add_command_buffer(&mut self, cb: CommandBufferId) {
        self.command_buffers.entry(cb).or_default();
    }

    pub(crate) fn add_buffer(&mut self, buffer: BufferId, info: &BufferCreateInfo) {
        self.resources.insert(
            ResourceKey::buffer(buffer),
            ResourceInfo {
                kind: ResourceKind::Buffer,
                create_info: ResourceCreateInfo::Buffer(*info),
                bound_memory: MemoryBinding::Unbound,
            },
        );
    }

    pub(crate) fn add_image(&mut self, image: ImageId, info: &ImageCreateInfo) {
        self.resources.insert(
            ResourceKey::image(image),
            ResourceInfo {
                kind: ResourceKind::Image,
                create_info: ResourceCreateInfo::Image(*info),
                bound_memory: MemoryBinding::Unbound,
            },
        );
    }

    /// Drops a buffer record, clearing its binding first.
    pub(crate) fn remove_buffer(&mut self, buffer: BufferId) -> bool {
        let key = ResourceKey::buffer(buffer);
        if !self.resources.contains_key(&key) {
            return false;
        }
        let skip = self.clear_binding(ResourceRef::buffer(buffer));
        self.resources.remove(&key);
        skip
    }

    /// Drops an image record, clearing its binding first.
    pub(crate) fn remove_image(&mut self, image: ImageId) -> bool {
        let key = ResourceKey::image(image);
        if !self.resources.contains_key(&key) {
            return false;
        }
        let skip = self.clear_binding(ResourceRef::image(image));
        self.resources.remove(&key);
        skip
    }

    pub(crate) fn add_semaphore(&mut self, semaphore: SemaphoreId) {
        self.semaphores.insert(semaphore, SemaphoreState::Unset);
    }

    pub(crate) fn remove_semaphore(&mut self, semaphore: SemaphoreId) {
        self.semaphores.remove(&semaphore);
    }

    pub(crate) fn add_fence(&mut self, fence: FenceId, info: &FenceCreateInfo) {
        self.fences.insert(
            fence,
            FenceInfo {
                create_info: *info,
                fence_id: 0,
                queue: None,
            },
        );
    }

    pub(crate) fn remove_fence(&mut self, fence: FenceId) {
        self.fences.remove(&fence);
    }

    pub(crate) fn error(&self, kind: ObjectKind, handle: u64, code: MessageCode, message: String) {
        self.report
            .emit(Severity::Error, kind, handle, code, LAYER_PREFIX, message);
    }

    pub(crate) fn warn(&self, kind: ObjectKind, handle: u64, code: MessageCode, message: String) {
        self.report
            .emit(Severity::Warn, kind, handle, code, LAYER_PREFIX, message);
    }

    pub(crate) fn info(&self, kind: ObjectKind, handle: u64, message: String) {
        self.report.emit(
            Severity::Info,
            kind,
            handle,
            MessageCode::None,
            LAYER_PREFIX,
            message,
        );
    }

    /// Checks the ref-count bookkeeping invariant after a mutation.
    pub(crate) fn check_memory_invariant(info: &MemoryInfo) {
        debug_assert_eq!(
            info.ref_count as usize,
            info.resources.len() + info.command_buffers.len(),
            "memory ref_count out of sync with its reference sets",
        );
    }

    /// Dumps the memory table when info reporting is on.
    pub(crate) fn print_mem_list(&self) {
        if !self.report.enabled(Severity::Info) {
            return;
        }

        self.info(
            ObjectKind::Memory,
            0,
            format!("memory object list contains {} entries", self.memory.len()),
        );
        for (mem, info) in &self.memory {
            self.info(
                ObjectKind::Memory,
                mem.into_raw(),
                format!(
                    "memory object {} size {} ref count {}",
                    mem, info.alloc_info.allocation_size, info.ref_count
                ),
            );
            for r in &info.resources {
                self.info(
                    ObjectKind::Memory,
                    mem.into_raw(),
                    format!("    bound {}", r),
                );
            }
            for cb in &info.command_buffers {
                self.info(
                    ObjectKind::Memory,
                    mem.into_raw(),
                    format!("    referenced by command buffer {}", cb),
                );
            }
        }
    }

    /// Dumps the command buffer table when info reporting is on.
    pub(crate) fn print_cb_list(&self) {
        if !self.report.enabled(Severity::Info) {
            return;
        }

        self.info(
            ObjectKind::CommandBuffer,
            0,
            format!(
                "command buffer list contains {} entries",
                self.command_buffers.len()
            ),
        );
        for (cb, info) in &self.command_buffers {
            self.info(
                ObjectKind::CommandBuffer,
                cb.into_raw(),
                format!(
                    "command buffer {} fence id {} references {} memory objects",
                    cb,
                    info.fence_id,
                    info.memory_refs.len()
                ),
            );
        }
    }
}
