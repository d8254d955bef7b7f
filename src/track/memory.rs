//! Memory object lifecycle: allocation, freeing, map-range checks.

use crate::handle::MemoryId;
use crate::report::{MessageCode, ObjectKind, Severity};
use crate::{MemoryAllocateInfo, MemoryProperties, MemoryTypeFlags};

use super::{DeviceTracker, MemoryInfo, LAYER_PREFIX};

impl DeviceTracker {
    pub(crate) fn add_memory(&mut self, mem: MemoryId, info: &MemoryAllocateInfo) {
        self.memory.insert(mem, MemoryInfo::new(*info));
    }

    /// Frees `mem`.
    ///
    /// Command buffers whose work has retired are detached first; anything
    /// still referencing the memory after that is reported, then the
    /// record is removed regardless (diagnostic, not fatal).
    ///
    /// `internal` marks frees issued by the layer itself, which are allowed
    /// to drop the zero-size records backing persistent swapchain images.
    pub(crate) fn free_memory(&mut self, mem: MemoryId, internal: bool) -> bool {
        let Some(info) = self.memory.get(&mem) else {
            self.error(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidMemObj,
                format!(
                    "couldn't find memory object {mem}, was it never allocated or \
                     previously freed?"
                ),
            );
            return true;
        };

        if info.alloc_info.allocation_size == 0 && !internal {
            self.warn(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidMemObj,
                format!(
                    "attempting to free memory {mem} backing a persistent swapchain \
                     image, it must not be freed explicitly"
                ),
            );
            return true;
        }

        let mut skip = false;

        // Detach command buffers whose submissions have retired; in-flight
        // ones stay and get reported below.
        let cbs = info.command_buffers.clone();
        for cb in cbs {
            let (complete, s) = self.cb_complete(cb);
            skip |= s;
            if complete {
                skip |= self.clear_cb_refs(cb);
            }
        }

        if self.memory.get(&mem).is_some_and(|info| info.ref_count != 0) {
            skip |= self.report_mem_references(mem);
        }

        self.memory.remove(&mem);
        skip
    }

    /// Reports every lingering reference to `mem` and clears both
    /// reference sets.
    fn report_mem_references(&mut self, mem: MemoryId) -> bool {
        let Some(info) = self.memory.get(&mem) else {
            return false;
        };

        let total = info.resources.len() + info.command_buffers.len();
        self.error(
            ObjectKind::Memory,
            mem.into_raw(),
            MessageCode::FreedMemRef,
            format!(
                "attempting to free memory object {mem} which still contains \
                 {total} references"
            ),
        );

        let resources = info.resources.clone();
        let command_buffers = info.command_buffers.clone();
        for cb in &command_buffers {
            self.report.emit(
                Severity::Info,
                ObjectKind::CommandBuffer,
                cb.into_raw(),
                MessageCode::FreedMemRef,
                LAYER_PREFIX,
                format!("command buffer {cb} still has a reference to memory object {mem}"),
            );
        }
        for r in &resources {
            self.report.emit(
                Severity::Info,
                r.kind.object_kind(),
                r.raw,
                MessageCode::FreedMemRef,
                LAYER_PREFIX,
                format!("{r} still has a reference to memory object {mem}"),
            );
        }

        if let Some(info) = self.memory.get_mut(&mem) {
            info.resources.clear();
            info.command_buffers.clear();
            info.ref_count = 0;
            Self::check_memory_invariant(info);
        }
        true
    }

    /// Validates a host map of `mem` at `offset..offset + size`.
    pub(crate) fn validate_map(
        &self,
        mem: MemoryId,
        offset: u64,
        size: u64,
        properties: &MemoryProperties,
    ) -> bool {
        let Some(info) = self.memory.get(&mem) else {
            self.error(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidMemObj,
                format!("mapping memory object {mem} which was never allocated"),
            );
            return true;
        };

        let mut skip = false;

        let host_visible = properties
            .memory_types
            .get(info.alloc_info.memory_type_index as usize)
            .is_some_and(|t| t.property_flags.contains(MemoryTypeFlags::HOST_VISIBLE));
        if !host_visible {
            self.error(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidState,
                format!("mapping memory {mem} whose memory type is not HOST_VISIBLE"),
            );
            skip = true;
        }

        let end = offset.checked_add(size);
        if end.is_none() || end.unwrap() > info.alloc_info.allocation_size {
            self.error(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidMap,
                format!(
                    "mapping memory {mem} from {offset} to {} with allocation size {}",
                    offset.saturating_add(size),
                    info.alloc_info.allocation_size
                ),
            );
            skip = true;
        }

        skip
    }
}

#[cfg(test)]
mod tests {
    use crate::handle::{BufferId, CommandBufferId, MemoryId, QueueId, ResourceRef};
    use crate::report::MessageCode;
    use crate::track::test_support::tracker;
    use crate::track::MemoryBinding;
    use crate::{
        BufferCreateInfo, BufferUsage, MemoryAllocateInfo, MemoryProperties, MemoryType,
        MemoryTypeFlags,
    };

    const MEM: MemoryId = MemoryId::from_raw(0xa);

    fn alloc_info(size: u64) -> MemoryAllocateInfo {
        MemoryAllocateInfo {
            allocation_size: size,
            memory_type_index: 0,
        }
    }

    fn host_visible_props() -> MemoryProperties {
        MemoryProperties {
            memory_types: vec![MemoryType {
                property_flags: MemoryTypeFlags::HOST_VISIBLE | MemoryTypeFlags::HOST_COHERENT,
            }],
        }
    }

    #[test]
    fn alloc_free_leaves_no_trace() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(4096));

        assert!(!t.free_memory(MEM, false));
        assert!(t.memory.is_empty());
        assert!(rec.problem_codes().is_empty());
    }

    #[test]
    fn double_free_is_reported() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(4096));
        t.free_memory(MEM, false);

        assert!(t.free_memory(MEM, false));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidMemObj]);
    }

    #[test]
    fn explicit_free_of_wsi_memory_warns() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(0));

        assert!(t.free_memory(MEM, false));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidMemObj]);
        // The record stays until an internal free.
        assert!(t.memory.contains_key(&MEM));
        assert!(!t.free_memory(MEM, true));
        assert!(t.memory.is_empty());
    }

    #[test]
    fn free_with_live_bindings_reports_each() {
        let (mut t, rec) = tracker();
        let b1 = BufferId::from_raw(0xb1);
        let b2 = BufferId::from_raw(0xb2);
        t.add_memory(MEM, &alloc_info(4096));
        t.add_buffer(
            b1,
            &BufferCreateInfo {
                size: 16,
                usage: BufferUsage::TRANSFER_SRC,
            },
        );
        t.add_buffer(
            b2,
            &BufferCreateInfo {
                size: 16,
                usage: BufferUsage::TRANSFER_SRC,
            },
        );
        t.set_binding(ResourceRef::buffer(b1), Some(MEM), "bind_buffer_memory");
        t.set_binding(ResourceRef::buffer(b2), Some(MEM), "bind_buffer_memory");

        assert!(t.free_memory(MEM, false));
        assert!(t.memory.is_empty());

        let records = rec.take();
        let freed_refs: Vec<_> = records
            .iter()
            .filter(|d| d.code == MessageCode::FreedMemRef)
            .collect();
        // One summary error plus one info entry per binding.
        assert_eq!(freed_refs.len(), 3);
    }

    #[test]
    fn free_detaches_retired_command_buffers() {
        let (mut t, rec) = tracker();
        let cb = CommandBufferId::from_raw(0xc);
        let queue = QueueId::from_raw(0x1);
        t.add_memory(MEM, &alloc_info(4096));
        t.add_command_buffer(cb);
        t.add_queue(queue);
        t.update_cb_mem_ref(cb, MemoryBinding::Memory(MEM), "cmd_fill_buffer");

        let (fence_id, _) = t.track_submit_fence(None, queue);
        t.mark_cb_submitted(cb, fence_id, None, queue);
        t.retire_queue(queue);

        assert!(!t.free_memory(MEM, false));
        assert!(t.memory.is_empty());
        assert!(t.command_buffers[&cb].memory_refs.is_empty());
        assert!(rec.problem_codes().is_empty());
    }

    #[test]
    fn free_with_in_flight_command_buffer_reports() {
        let (mut t, rec) = tracker();
        let cb = CommandBufferId::from_raw(0xc);
        let queue = QueueId::from_raw(0x1);
        t.add_memory(MEM, &alloc_info(4096));
        t.add_command_buffer(cb);
        t.add_queue(queue);
        t.update_cb_mem_ref(cb, MemoryBinding::Memory(MEM), "cmd_fill_buffer");

        let (fence_id, _) = t.track_submit_fence(None, queue);
        t.mark_cb_submitted(cb, fence_id, None, queue);

        assert!(t.free_memory(MEM, false));
        assert!(t.memory.is_empty());
        assert!(rec
            .problem_codes()
            .contains(&MessageCode::FreedMemRef));
    }

    #[test]
    fn map_within_bounds_is_clean() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(4096));

        assert!(!t.validate_map(MEM, 0, 4096, &host_visible_props()));
        assert!(!t.validate_map(MEM, 1024, 1024, &host_visible_props()));
        assert!(rec.take().is_empty());
    }

    #[test]
    fn map_out_of_bounds_is_reported() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(4096));

        assert!(t.validate_map(MEM, 0, 8192, &host_visible_props()));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidMap]);
    }

    #[test]
    fn map_offset_overflow_is_reported() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(4096));

        assert!(t.validate_map(MEM, u64::MAX, 2, &host_visible_props()));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidMap]);
    }

    #[test]
    fn map_of_non_host_visible_memory_is_reported() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &alloc_info(4096));
        let props = MemoryProperties {
            memory_types: vec![MemoryType {
                property_flags: MemoryTypeFlags::DEVICE_LOCAL,
            }],
        };

        assert!(t.validate_map(MEM, 0, 16, &props));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidState]);
    }
}
