//! The layer surface the interceptor drives.
//!
//! [`MemTracker`] is the process-wide registry: instances, devices and the
//! single lock guarding all mutable core state. Every entry point takes
//! the lock for its pre-checks and returns before the driver call is made;
//! the post-call hooks re-acquire it. Long-running driver work (waits,
//! idles, maps) therefore never happens under the lock.
//!
//! An entry point returning [`ValidationFailed`] is asking the interceptor
//! to skip the driver call and surface the failure status instead.

use std::fs::File;
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::config::{Config, DebugAction};
use crate::handle::{
    BufferId, CommandBufferId, DeviceId, FenceId, ImageId, InstanceId, MemoryId, QueueId,
    ResourceRef, SemaphoreId, SwapchainId,
};
use crate::report::{
    CallbackHandle, DebugReport, LogCallback, MessageCode, ObjectKind, ReportCallback,
    ReportFlags, TraceCallback,
};
use crate::track::usage::{
    BUFFER_VIEW_USAGE, BUFFER_VIEW_USAGE_STR, IMAGE_VIEW_USAGE, IMAGE_VIEW_USAGE_STR,
};
use crate::track::DeviceTracker;
use crate::{
    BufferCreateInfo, BufferUsage, FenceCreateInfo, ImageCreateInfo, ImageUsage,
    MemoryAllocateInfo, MemoryProperties, SparseBindInfo, SubmitInfo, SwapchainCreateInfo,
    ValidationFailed, SWAPCHAIN_EXTENSION,
};

struct InstanceState {
    report: Arc<DebugReport>,
}

#[derive(Default)]
struct Registry {
    instances: HashMap<InstanceId, InstanceState>,
    devices: HashMap<DeviceId, DeviceTracker>,
    /// Snapshot of the adapter's memory types, shared by every device.
    memory_properties: MemoryProperties,
}

/// Process-wide layer state.
///
/// The interceptor usually works against [`MemTracker::global`]; tests
/// construct their own instance.
pub struct MemTracker {
    state: Mutex<Registry>,
}

impl Default for MemTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Registry::default()),
        }
    }

    pub fn global() -> &'static MemTracker {
        static GLOBAL: OnceLock<MemTracker> = OnceLock::new();
        GLOBAL.get_or_init(MemTracker::new)
    }

    fn run(
        &self,
        device: DeviceId,
        f: impl FnOnce(&mut DeviceTracker) -> bool,
    ) -> Result<(), ValidationFailed> {
        let mut state = self.state.lock();
        let skip = match state.devices.get_mut(&device) {
            Some(tracker) => f(tracker),
            None => false,
        };
        if skip {
            Err(ValidationFailed)
        } else {
            Ok(())
        }
    }

    fn with_device(&self, device: DeviceId, f: impl FnOnce(&mut DeviceTracker)) {
        let mut state = self.state.lock();
        if let Some(tracker) = state.devices.get_mut(&device) {
            f(tracker);
        }
    }

    /// Registers a new instance and wires up the configured default
    /// diagnostic callbacks.
    pub fn create_instance(&self, instance: InstanceId, config: &Config) {
        let report = Arc::new(DebugReport::new(config.report_flags));

        if config.debug_action.contains(DebugAction::LOG_MSG) {
            let callback: Arc<dyn ReportCallback> = match &config.log_filename {
                Some(path) => match File::create(path) {
                    Ok(file) => Arc::new(LogCallback::new(Box::new(file))),
                    Err(_) => Arc::new(LogCallback::stderr()),
                },
                None => Arc::new(LogCallback::stderr()),
            };
            report.add_callback(config.report_flags, callback);
        }
        if config.debug_action.contains(DebugAction::DEBUG_OUTPUT) {
            report.add_callback(config.report_flags, Arc::new(TraceCallback));
        }

        self.state
            .lock()
            .instances
            .insert(instance, InstanceState { report });
    }

    /// Drops an instance, destroying its callbacks newest first. The whole
    /// registry is torn down with the last instance.
    pub fn destroy_instance(&self, instance: InstanceId) {
        let mut state = self.state.lock();
        if let Some(inst) = state.instances.remove(&instance) {
            inst.report.clear_callbacks();
        }
        if state.instances.is_empty() {
            *state = Registry::default();
        }
    }

    /// Registers a user diagnostic callback on `instance`.
    pub fn register_callback(
        &self,
        instance: InstanceId,
        flags: ReportFlags,
        callback: Arc<dyn ReportCallback>,
    ) -> Option<CallbackHandle> {
        let state = self.state.lock();
        state
            .instances
            .get(&instance)
            .map(|inst| inst.report.add_callback(flags, callback))
    }

    pub fn destroy_callback(&self, instance: InstanceId, handle: CallbackHandle) {
        let state = self.state.lock();
        if let Some(inst) = state.instances.get(&instance) {
            inst.report.remove_callback(handle);
        }
    }

    /// Stores the adapter memory-properties snapshot consulted by map
    /// validation.
    pub fn set_memory_properties(&self, properties: &MemoryProperties) {
        self.state.lock().memory_properties = properties.clone();
    }

    /// Registers a device created from `instance`. Swapchain tracking is
    /// enabled when the swapchain extension is in `enabled_extensions`.
    pub fn create_device(
        &self,
        instance: InstanceId,
        device: DeviceId,
        enabled_extensions: &[&str],
    ) {
        let mut state = self.state.lock();
        let Some(inst) = state.instances.get(&instance) else {
            return;
        };
        let wsi_enabled = enabled_extensions
            .iter()
            .any(|ext| *ext == SWAPCHAIN_EXTENSION);
        let tracker = DeviceTracker::new(inst.report.clone(), wsi_enabled);
        state.devices.insert(device, tracker);
    }

    /// Tears down `device`: dumps the object tables, clears all command
    /// buffers and reports every leaked memory object. Asks the
    /// interceptor to skip the driver call if anything was wrong.
    pub fn destroy_device(&self, device: DeviceId) -> Result<(), ValidationFailed> {
        let mut state = self.state.lock();
        let Some(mut tracker) = state.devices.remove(&device) else {
            return Ok(());
        };
        drop(state);

        tracker.info(
            ObjectKind::Device,
            device.into_raw(),
            "printing object lists prior to device destruction".into(),
        );
        tracker.print_mem_list();
        tracker.print_cb_list();

        let mut skip = tracker.clear_all_command_buffers();
        for (mem, info) in &tracker.memory {
            if info.alloc_info.allocation_size != 0 {
                tracker.warn(
                    ObjectKind::Memory,
                    mem.into_raw(),
                    MessageCode::MemoryLeak,
                    format!(
                        "memory object {mem} has not been freed; free it before \
                         destroying the device"
                    ),
                );
                skip = true;
            }
        }
        tracker.queues.clear();

        if skip {
            Err(ValidationFailed)
        } else {
            Ok(())
        }
    }

    pub fn get_device_queue(&self, device: DeviceId, queue: QueueId) {
        self.with_device(device, |t| t.add_queue(queue));
    }

    pub fn allocate_memory(&self, device: DeviceId, mem: MemoryId, info: &MemoryAllocateInfo) {
        self.with_device(device, |t| {
            t.add_memory(mem, info);
            t.print_mem_list();
        });
    }

    /// Free is always forwarded; lingering references are reported, not
    /// fatal.
    pub fn free_memory(&self, device: DeviceId, mem: MemoryId) {
        self.with_device(device, |t| {
            t.free_memory(mem, false);
            t.print_mem_list();
            t.print_cb_list();
        });
    }

    /// Pre-check for a host map of `mem`.
    pub fn map_memory(
        &self,
        device: DeviceId,
        mem: MemoryId,
        offset: u64,
        size: u64,
    ) -> Result<(), ValidationFailed> {
        let mut state = self.state.lock();
        let state = &mut *state;
        let Some(tracker) = state.devices.get_mut(&device) else {
            return Ok(());
        };
        if tracker.validate_map(mem, offset, size, &state.memory_properties) {
            Err(ValidationFailed)
        } else {
            Ok(())
        }
    }

    pub fn create_buffer(&self, device: DeviceId, buffer: BufferId, info: &BufferCreateInfo) {
        self.with_device(device, |t| t.add_buffer(buffer, info));
    }

    pub fn create_image(&self, device: DeviceId, image: ImageId, info: &ImageCreateInfo) {
        self.with_device(device, |t| t.add_image(image, info));
    }

    pub fn destroy_buffer(&self, device: DeviceId, buffer: BufferId) -> Result<(), ValidationFailed> {
        self.run(device, |t| t.remove_buffer(buffer))
    }

    pub fn destroy_image(&self, device: DeviceId, image: ImageId) -> Result<(), ValidationFailed> {
        self.run(device, |t| t.remove_image(image))
    }

    pub fn bind_buffer_memory(
        &self,
        device: DeviceId,
        buffer: BufferId,
        mem: Option<MemoryId>,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let skip = t.set_binding(ResourceRef::buffer(buffer), mem, "bind_buffer_memory");
            t.print_mem_list();
            skip
        })
    }

    pub fn bind_image_memory(
        &self,
        device: DeviceId,
        image: ImageId,
        mem: Option<MemoryId>,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let skip = t.set_binding(ResourceRef::image(image), mem, "bind_image_memory");
            t.print_mem_list();
            skip
        })
    }

    pub fn queue_bind_sparse(
        &self,
        device: DeviceId,
        _queue: QueueId,
        bind_infos: &[SparseBindInfo<'_>],
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = false;
            for info in bind_infos {
                for bind in info.buffer_binds {
                    for b in bind.binds {
                        skip |= t.set_sparse_binding(
                            ResourceRef::buffer(bind.buffer),
                            b.memory,
                            "queue_bind_sparse",
                        );
                    }
                }
                for bind in info.image_opaque_binds.iter().chain(info.image_binds) {
                    for b in bind.binds {
                        skip |= t.set_sparse_binding(
                            ResourceRef::image(bind.image),
                            b.memory,
                            "queue_bind_sparse",
                        );
                    }
                }
            }
            t.print_mem_list();
            skip
        })
    }

    /// Post-success hook for view creation: the image must carry a usage
    /// a view can be made for.
    pub fn create_image_view(&self, device: DeviceId, image: ImageId) {
        self.with_device(device, |t| {
            t.validate_image_usage(
                image,
                IMAGE_VIEW_USAGE,
                false,
                "create_image_view",
                IMAGE_VIEW_USAGE_STR,
            );
        });
    }

    /// Post-success hook for buffer view creation.
    pub fn create_buffer_view(&self, device: DeviceId, buffer: BufferId) {
        self.with_device(device, |t| {
            t.validate_buffer_usage(
                buffer,
                BUFFER_VIEW_USAGE,
                false,
                "create_buffer_view",
                BUFFER_VIEW_USAGE_STR,
            );
        });
    }

    pub fn allocate_command_buffers(&self, device: DeviceId, cbs: &[CommandBufferId]) {
        self.with_device(device, |t| {
            for cb in cbs {
                t.add_command_buffer(*cb);
            }
            t.print_cb_list();
        });
    }

    /// Beginning a command buffer implicitly resets it, which requires its
    /// last submission to have retired.
    pub fn begin_command_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let (complete, mut skip) = t.cb_complete(cb);
            if !complete {
                t.error(
                    ObjectKind::CommandBuffer,
                    cb.into_raw(),
                    MessageCode::ResetCbWhileInFlight,
                    format!(
                        "calling begin on active command buffer {cb} before it has \
                         completed; check completion before this call"
                    ),
                );
                skip = true;
            }
            skip
        })
    }

    /// Invoked after the driver call, whatever its outcome; the implicit
    /// reset drops the recorded memory references.
    pub fn begin_command_buffer_done(&self, device: DeviceId, cb: CommandBufferId) {
        self.with_device(device, |t| {
            t.clear_cb_refs(cb);
        });
    }

    pub fn reset_command_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let (complete, mut skip) = t.cb_complete(cb);
            if !complete {
                t.error(
                    ObjectKind::CommandBuffer,
                    cb.into_raw(),
                    MessageCode::ResetCbWhileInFlight,
                    format!(
                        "resetting command buffer {cb} before it has completed; check \
                         completion before this call"
                    ),
                );
                skip = true;
            }
            skip |= t.clear_cb_refs(cb);
            skip
        })
    }

    /// Presence check backing the dynamic-state recording commands.
    pub fn validate_command_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            if t.command_buffers.contains_key(&cb) {
                false
            } else {
                t.error(
                    ObjectKind::CommandBuffer,
                    cb.into_raw(),
                    MessageCode::InvalidCb,
                    format!("unable to find command buffer {cb}, was it ever allocated?"),
                );
                true
            }
        })
    }

    fn reference_buffer(
        t: &mut DeviceTracker,
        cb: CommandBufferId,
        buffer: BufferId,
        api_name: &str,
    ) -> bool {
        let (binding, mut skip) = t.get_binding(ResourceRef::buffer(buffer));
        if !skip {
            skip |= t.update_cb_mem_ref(cb, binding, api_name);
        }
        skip
    }

    fn reference_image(
        t: &mut DeviceTracker,
        cb: CommandBufferId,
        image: ImageId,
        api_name: &str,
    ) -> bool {
        let (binding, mut skip) = t.get_binding(ResourceRef::image(image));
        if !skip {
            skip |= t.update_cb_mem_ref(cb, binding, api_name);
        }
        skip
    }

    pub fn cmd_copy_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        src: BufferId,
        dst: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_buffer(t, cb, src, "cmd_copy_buffer");
            skip |= Self::reference_buffer(t, cb, dst, "cmd_copy_buffer");
            skip |= t.validate_buffer_usage(
                src,
                BufferUsage::TRANSFER_SRC,
                true,
                "cmd_copy_buffer",
                "TRANSFER_SRC",
            );
            skip |= t.validate_buffer_usage(
                dst,
                BufferUsage::TRANSFER_DST,
                true,
                "cmd_copy_buffer",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_copy_image(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        src: ImageId,
        dst: ImageId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_image(t, cb, src, "cmd_copy_image");
            skip |= Self::reference_image(t, cb, dst, "cmd_copy_image");
            skip |= t.validate_image_usage(
                src,
                ImageUsage::TRANSFER_SRC,
                true,
                "cmd_copy_image",
                "TRANSFER_SRC",
            );
            skip |= t.validate_image_usage(
                dst,
                ImageUsage::TRANSFER_DST,
                true,
                "cmd_copy_image",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_blit_image(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        src: ImageId,
        dst: ImageId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_image(t, cb, src, "cmd_blit_image");
            skip |= Self::reference_image(t, cb, dst, "cmd_blit_image");
            skip |= t.validate_image_usage(
                src,
                ImageUsage::TRANSFER_SRC,
                true,
                "cmd_blit_image",
                "TRANSFER_SRC",
            );
            skip |= t.validate_image_usage(
                dst,
                ImageUsage::TRANSFER_DST,
                true,
                "cmd_blit_image",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_copy_buffer_to_image(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        src: BufferId,
        dst: ImageId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_image(t, cb, dst, "cmd_copy_buffer_to_image");
            skip |= Self::reference_buffer(t, cb, src, "cmd_copy_buffer_to_image");
            skip |= t.validate_buffer_usage(
                src,
                BufferUsage::TRANSFER_SRC,
                true,
                "cmd_copy_buffer_to_image",
                "TRANSFER_SRC",
            );
            skip |= t.validate_image_usage(
                dst,
                ImageUsage::TRANSFER_DST,
                true,
                "cmd_copy_buffer_to_image",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_copy_image_to_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        src: ImageId,
        dst: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_image(t, cb, src, "cmd_copy_image_to_buffer");
            skip |= Self::reference_buffer(t, cb, dst, "cmd_copy_image_to_buffer");
            skip |= t.validate_image_usage(
                src,
                ImageUsage::TRANSFER_SRC,
                true,
                "cmd_copy_image_to_buffer",
                "TRANSFER_SRC",
            );
            skip |= t.validate_buffer_usage(
                dst,
                BufferUsage::TRANSFER_DST,
                true,
                "cmd_copy_image_to_buffer",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_update_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        dst: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_buffer(t, cb, dst, "cmd_update_buffer");
            skip |= t.validate_buffer_usage(
                dst,
                BufferUsage::TRANSFER_DST,
                true,
                "cmd_update_buffer",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_fill_buffer(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        dst: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_buffer(t, cb, dst, "cmd_fill_buffer");
            skip |= t.validate_buffer_usage(
                dst,
                BufferUsage::TRANSFER_DST,
                true,
                "cmd_fill_buffer",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_copy_query_pool_results(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        dst: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_buffer(t, cb, dst, "cmd_copy_query_pool_results");
            skip |= t.validate_buffer_usage(
                dst,
                BufferUsage::TRANSFER_DST,
                true,
                "cmd_copy_query_pool_results",
                "TRANSFER_DST",
            );
            skip
        })
    }

    pub fn cmd_clear_color_image(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        image: ImageId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            Self::reference_image(t, cb, image, "cmd_clear_color_image")
        })
    }

    pub fn cmd_clear_depth_stencil_image(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        image: ImageId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            Self::reference_image(t, cb, image, "cmd_clear_depth_stencil_image")
        })
    }

    pub fn cmd_resolve_image(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        src: ImageId,
        dst: ImageId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = Self::reference_image(t, cb, src, "cmd_resolve_image");
            skip |= Self::reference_image(t, cb, dst, "cmd_resolve_image");
            skip
        })
    }

    pub fn cmd_draw_indirect(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        buffer: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            Self::reference_buffer(t, cb, buffer, "cmd_draw_indirect")
        })
    }

    pub fn cmd_draw_indexed_indirect(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        buffer: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            Self::reference_buffer(t, cb, buffer, "cmd_draw_indexed_indirect")
        })
    }

    pub fn cmd_dispatch_indirect(
        &self,
        device: DeviceId,
        cb: CommandBufferId,
        buffer: BufferId,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            Self::reference_buffer(t, cb, buffer, "cmd_dispatch_indirect")
        })
    }

    /// Pre-check and tracking for a submission batch.
    pub fn queue_submit(
        &self,
        device: DeviceId,
        queue: QueueId,
        submits: &[SubmitInfo<'_>],
        fence: Option<FenceId>,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let (fence_id, mut skip) = t.track_submit_fence(fence, queue);
            t.print_mem_list();
            t.print_cb_list();

            for submit in submits {
                for cb in submit.command_buffers {
                    skip |= t.mark_cb_submitted(*cb, fence_id, fence, queue);
                }
                for sem in submit.wait_semaphores {
                    skip |= t.semaphore_wait(*sem);
                }
                for sem in submit.signal_semaphores {
                    skip |= t.semaphore_signal(*sem);
                }
            }
            skip
        })
    }

    /// Invoked after the driver call returns; wait semaphores have been
    /// consumed back to unset.
    pub fn queue_submit_done(&self, device: DeviceId, submits: &[SubmitInfo<'_>]) {
        self.with_device(device, |t| {
            for submit in submits {
                for sem in submit.wait_semaphores {
                    t.semaphore_retire_wait(*sem);
                }
            }
        });
    }

    pub fn create_fence(&self, device: DeviceId, fence: FenceId, info: &FenceCreateInfo) {
        self.with_device(device, |t| t.add_fence(fence, info));
    }

    pub fn destroy_fence(&self, device: DeviceId, fence: FenceId) {
        self.with_device(device, |t| t.remove_fence(fence));
    }

    pub fn reset_fences(&self, device: DeviceId, fences: &[FenceId]) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = false;
            for fence in fences {
                skip |= t.reset_fence(*fence);
            }
            skip
        })
    }

    /// Pre-check for a fence status query.
    pub fn get_fence_status(&self, device: DeviceId, fence: FenceId) -> Result<(), ValidationFailed> {
        self.run(device, |t| t.verify_fence_status(fence, "get_fence_status"))
    }

    /// The driver reported `fence` signaled; retirement advances.
    pub fn fence_signaled(&self, device: DeviceId, fence: FenceId) {
        self.with_device(device, |t| t.fence_signaled(fence));
    }

    /// Pre-check for a fence wait.
    pub fn wait_for_fences(&self, device: DeviceId, fences: &[FenceId]) -> Result<(), ValidationFailed> {
        self.run(device, |t| {
            let mut skip = false;
            for fence in fences {
                skip |= t.verify_fence_status(*fence, "wait_for_fences");
            }
            skip
        })
    }

    /// A successful wait returned. Only when the wait covered all fences
    /// (or a single one) do we know which ones actually signaled.
    pub fn fences_waited(&self, device: DeviceId, fences: &[FenceId], wait_all: bool) {
        if !wait_all && fences.len() != 1 {
            return;
        }
        self.with_device(device, |t| {
            for fence in fences {
                t.fence_signaled(*fence);
            }
        });
    }

    /// A successful queue idle retires everything submitted to the queue.
    pub fn queue_idle(&self, device: DeviceId, queue: QueueId) {
        self.with_device(device, |t| t.retire_queue(queue));
    }

    /// A successful device idle retires everything on every queue.
    pub fn device_idle(&self, device: DeviceId) {
        self.with_device(device, |t| t.retire_all_queues());
    }

    pub fn create_semaphore(&self, device: DeviceId, semaphore: SemaphoreId) {
        self.with_device(device, |t| t.add_semaphore(semaphore));
    }

    pub fn destroy_semaphore(&self, device: DeviceId, semaphore: SemaphoreId) {
        self.with_device(device, |t| t.remove_semaphore(semaphore));
    }

    pub fn create_swapchain(&self, device: DeviceId, swapchain: SwapchainId, info: &SwapchainCreateInfo) {
        self.with_device(device, |t| {
            if !t.wsi_enabled {
                t.warn(
                    ObjectKind::Swapchain,
                    swapchain.into_raw(),
                    MessageCode::InvalidState,
                    format!(
                        "swapchain {swapchain} created on a device without the \
                         swapchain extension enabled"
                    ),
                );
            }
            t.add_swapchain(swapchain, info);
        });
    }

    pub fn destroy_swapchain(&self, device: DeviceId, swapchain: SwapchainId) -> Result<(), ValidationFailed> {
        self.run(device, |t| t.destroy_swapchain(swapchain))
    }

    /// Post-success hook recording the image list the driver returned.
    pub fn get_swapchain_images(&self, device: DeviceId, swapchain: SwapchainId, images: &[ImageId]) {
        self.with_device(device, |t| t.register_swapchain_images(swapchain, images));
    }

    /// Pre-check for an image acquire that will signal `semaphore`.
    pub fn acquire_next_image(
        &self,
        device: DeviceId,
        _swapchain: SwapchainId,
        semaphore: Option<SemaphoreId>,
    ) -> Result<(), ValidationFailed> {
        self.run(device, |t| match semaphore {
            Some(sem) => t.semaphore_acquire(sem),
            None => false,
        })
    }
}
