//! Command-buffer tracking.
//!
//! While commands are recorded the layer mirrors every memory object a
//! command buffer touches in two places: the command buffer's reference
//! list and the memory object's command-buffer set. Both sides are kept
//! in lockstep so freeing memory can tell exactly which command buffers
//! still depend on it.

use crate::handle::CommandBufferId;
use crate::report::{MessageCode, ObjectKind};

use super::{DeviceTracker, MemoryBinding};

impl DeviceTracker {
    /// Records that `cb` references the memory behind `binding`.
    ///
    /// Idempotent: a reference that is already present is not added again
    /// and the ref count only moves on the first insert. Sentinel-bound
    /// WSI images are not tracked.
    pub(crate) fn update_cb_mem_ref(
        &mut self,
        cb: CommandBufferId,
        binding: MemoryBinding,
        api_name: &str,
    ) -> bool {
        let mem = match binding {
            MemoryBinding::Sentinel => return false,
            MemoryBinding::Unbound => {
                self.error(
                    ObjectKind::CommandBuffer,
                    cb.into_raw(),
                    MessageCode::InvalidMemObj,
                    format!(
                        "in {api_name}, trying to reference a null memory object from \
                         command buffer {cb}"
                    ),
                );
                return true;
            }
            MemoryBinding::Memory(mem) => mem,
        };

        if !self.memory.contains_key(&mem) {
            self.error(
                ObjectKind::CommandBuffer,
                cb.into_raw(),
                MessageCode::InvalidMemObj,
                format!(
                    "in {api_name}, trying to bind memory object {mem} to command buffer \
                     {cb} but no record of that memory object, was it correctly allocated? \
                     did it already get freed?"
                ),
            );
            return true;
        }
        if !self.command_buffers.contains_key(&cb) {
            self.error(
                ObjectKind::CommandBuffer,
                cb.into_raw(),
                MessageCode::InvalidMemObj,
                format!(
                    "in {api_name}, trying to bind memory object {mem} to command buffer \
                     {cb} but no record of that command buffer, was it destroyed?"
                ),
            );
            return true;
        }

        if let Some(info) = self.memory.get_mut(&mem) {
            if !info.command_buffers.contains(&cb) {
                info.command_buffers.push(cb);
                info.ref_count += 1;
            }
            Self::check_memory_invariant(info);
        }
        if let Some(info) = self.command_buffers.get_mut(&cb) {
            if !info.memory_refs.contains(&mem) {
                info.memory_refs.push(mem);
            }
        }

        false
    }

    /// Drops every memory reference held by `cb`, fixing up the memory
    /// side of the graph.
    pub(crate) fn clear_cb_refs(&mut self, cb: CommandBufferId) -> bool {
        let refs = match self.command_buffers.get_mut(&cb) {
            Some(info) => std::mem::take(&mut info.memory_refs),
            None => {
                self.error(
                    ObjectKind::CommandBuffer,
                    cb.into_raw(),
                    MessageCode::InvalidCb,
                    format!("unable to find command buffer {cb} to clear its memory references"),
                );
                return true;
            }
        };

        for mem in refs {
            if let Some(info) = self.memory.get_mut(&mem) {
                if let Some(pos) = info.command_buffers.iter().position(|c| *c == cb) {
                    info.command_buffers.remove(pos);
                    info.ref_count -= 1;
                }
                Self::check_memory_invariant(info);
            }
        }

        false
    }

    /// Whether the last submission of `cb` has retired.
    ///
    /// A command buffer that was never submitted counts as complete.
    /// Returns `(complete, skip)`.
    pub(crate) fn cb_complete(&self, cb: CommandBufferId) -> (bool, bool) {
        let Some(info) = self.command_buffers.get(&cb) else {
            self.error(
                ObjectKind::CommandBuffer,
                cb.into_raw(),
                MessageCode::InvalidCb,
                format!("unable to find command buffer {cb} to check for completion"),
            );
            return (false, true);
        };

        let Some(queue) = info.last_submitted_queue else {
            return (true, false);
        };

        let last_retired = self.queues.get(&queue).map_or(0, |q| q.last_retired_id);
        if info.fence_id > last_retired {
            self.info(
                ObjectKind::CommandBuffer,
                cb.into_raw(),
                format!(
                    "fence {:?} for command buffer {cb} has not been checked for completion",
                    info.last_submitted_fence
                ),
            );
            return (false, false);
        }

        (true, false)
    }

    /// Clears every command buffer, reporting the ones that still hold
    /// memory references. Used at device teardown.
    pub(crate) fn clear_all_command_buffers(&mut self) -> bool {
        let mut skip = false;
        let cbs: Vec<_> = self.command_buffers.keys().copied().collect();
        for cb in cbs {
            if let Some(info) = self.command_buffers.get(&cb) {
                if !info.memory_refs.is_empty() {
                    self.info(
                        ObjectKind::CommandBuffer,
                        cb.into_raw(),
                        format!(
                            "command buffer {cb} still references {} memory objects",
                            info.memory_refs.len()
                        ),
                    );
                }
            }
            skip |= self.clear_cb_refs(cb);
        }
        self.command_buffers.clear();
        skip
    }
}

#[cfg(test)]
mod tests {
    use crate::handle::{CommandBufferId, MemoryId, QueueId};
    use crate::report::MessageCode;
    use crate::track::test_support::tracker;
    use crate::track::MemoryBinding;
    use crate::MemoryAllocateInfo;

    const MEM: MemoryId = MemoryId::from_raw(0xa);
    const CB: CommandBufferId = CommandBufferId::from_raw(0xc);

    #[test]
    fn reference_twice_counts_once() {
        let (mut t, rec) = tracker();
        t.add_memory(MEM, &MemoryAllocateInfo::default());
        t.add_command_buffer(CB);

        assert!(!t.update_cb_mem_ref(CB, MemoryBinding::Memory(MEM), "cmd_copy_buffer"));
        assert!(!t.update_cb_mem_ref(CB, MemoryBinding::Memory(MEM), "cmd_copy_buffer"));

        assert_eq!(t.memory[&MEM].ref_count, 1);
        assert_eq!(t.memory[&MEM].command_buffers.len(), 1);
        assert_eq!(t.command_buffers[&CB].memory_refs.len(), 1);
        assert!(rec.problem_codes().is_empty());
    }

    #[test]
    fn sentinel_reference_is_ignored() {
        let (mut t, rec) = tracker();
        t.add_command_buffer(CB);

        assert!(!t.update_cb_mem_ref(CB, MemoryBinding::Sentinel, "cmd_blit_image"));
        assert!(t.command_buffers[&CB].memory_refs.is_empty());
        assert!(rec.take().is_empty());
    }

    #[test]
    fn clear_refs_restores_memory_side() {
        let (mut t, _rec) = tracker();
        t.add_memory(MEM, &MemoryAllocateInfo::default());
        t.add_command_buffer(CB);
        t.update_cb_mem_ref(CB, MemoryBinding::Memory(MEM), "cmd_fill_buffer");

        assert!(!t.clear_cb_refs(CB));
        assert_eq!(t.memory[&MEM].ref_count, 0);
        assert!(t.memory[&MEM].command_buffers.is_empty());
        assert!(t.command_buffers[&CB].memory_refs.is_empty());
    }

    #[test]
    fn unknown_memory_is_reported() {
        let (mut t, rec) = tracker();
        t.add_command_buffer(CB);

        assert!(t.update_cb_mem_ref(CB, MemoryBinding::Memory(MEM), "cmd_copy_buffer"));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidMemObj]);
    }

    #[test]
    fn never_submitted_cb_is_complete() {
        let (mut t, _rec) = tracker();
        t.add_command_buffer(CB);
        assert_eq!(t.cb_complete(CB), (true, false));
    }

    #[test]
    fn in_flight_cb_is_incomplete_until_retired() {
        let (mut t, _rec) = tracker();
        t.add_command_buffer(CB);
        t.add_queue(QueueId::from_raw(1));

        let info = t.command_buffers.get_mut(&CB).unwrap();
        info.fence_id = 1;
        info.last_submitted_queue = Some(QueueId::from_raw(1));
        assert_eq!(t.cb_complete(CB), (false, false));

        t.queues.get_mut(&QueueId::from_raw(1)).unwrap().last_retired_id = 1;
        assert_eq!(t.cb_complete(CB), (true, false));
    }
}
