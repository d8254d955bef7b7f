//! The resource↔memory binding graph.
//!
//! A resource is bound to at most one memory object at a time; the memory
//! object keeps the reverse `(kind, handle)` entry in its resource set and
//! the bookkeeping ref count covers both resources and command buffers.

use crate::handle::{MemoryId, ResourceRef};
use crate::report::{MessageCode, ObjectKind};

use super::{DeviceTracker, MemoryBinding, ResourceKey};

impl DeviceTracker {
    /// Binds `resource` to `memory`.
    ///
    /// A null `memory` is reported and skipped. Rebinding an already bound
    /// resource is an error, but the new binding replaces the old one so
    /// the graph stays consistent.
    pub(crate) fn set_binding(
        &mut self,
        resource: ResourceRef,
        memory: Option<MemoryId>,
        api_name: &str,
    ) -> bool {
        let Some(mem) = memory else {
            self.warn(
                resource.kind.object_kind(),
                resource.raw,
                MessageCode::InvalidMemObj,
                format!("in {api_name}, attempting to bind {resource} to a null memory object"),
            );
            return true;
        };

        let key = ResourceKey::from(resource);
        if !self.resources.contains_key(&key) {
            self.error(
                resource.kind.object_kind(),
                resource.raw,
                MessageCode::MissingMemBindings,
                format!(
                    "in {api_name}, attempting to update the binding of {resource}, \
                     which is not in the resource table"
                ),
            );
            return true;
        }
        if !self.memory.contains_key(&mem) {
            self.error(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidMemObj,
                format!(
                    "in {api_name}, while binding memory for {resource}, no record of \
                     memory object {mem}, was it allocated?"
                ),
            );
            return true;
        }

        let mut skip = false;
        if let MemoryBinding::Memory(prev) = self.resources[&key].bound_memory {
            if self.memory.contains_key(&prev) {
                self.error(
                    ObjectKind::Memory,
                    mem.into_raw(),
                    MessageCode::RebindObject,
                    format!(
                        "in {api_name}, attempting to bind memory {mem} to {resource} \
                         which is already bound to memory object {prev}"
                    ),
                );
                skip = true;
            }
            // The new binding replaces the old one.
            if let Some(prev_info) = self.memory.get_mut(&prev) {
                if let Some(pos) = prev_info.resources.iter().position(|r| *r == resource) {
                    prev_info.resources.remove(pos);
                    prev_info.ref_count -= 1;
                }
                Self::check_memory_invariant(prev_info);
            }
        }

        if let Some(info) = self.memory.get_mut(&mem) {
            info.resources.push(resource);
            info.ref_count += 1;
            Self::check_memory_invariant(info);
        }
        if let Some(res) = self.resources.get_mut(&key) {
            res.bound_memory = MemoryBinding::Memory(mem);
        }

        skip
    }

    /// Binds `resource` to `memory` as part of a sparse bind batch.
    ///
    /// Unlike [`set_binding`](Self::set_binding) a null `memory` clears the
    /// binding, rebinding is legal, and an already present reverse entry is
    /// not added twice.
    pub(crate) fn set_sparse_binding(
        &mut self,
        resource: ResourceRef,
        memory: Option<MemoryId>,
        api_name: &str,
    ) -> bool {
        let Some(mem) = memory else {
            return self.clear_binding(resource);
        };

        let key = ResourceKey::from(resource);
        if !self.resources.contains_key(&key) {
            self.error(
                resource.kind.object_kind(),
                resource.raw,
                MessageCode::MissingMemBindings,
                format!(
                    "in {api_name}, attempting to update the binding of {resource}, \
                     which is not in the resource table"
                ),
            );
            return true;
        }
        if !self.memory.contains_key(&mem) {
            self.error(
                ObjectKind::Memory,
                mem.into_raw(),
                MessageCode::InvalidMemObj,
                format!(
                    "in {api_name}, while binding memory for {resource}, no record of \
                     memory object {mem}, was it allocated?"
                ),
            );
            return true;
        }

        if let MemoryBinding::Memory(prev) = self.resources[&key].bound_memory {
            if prev != mem {
                if let Some(prev_info) = self.memory.get_mut(&prev) {
                    if let Some(pos) = prev_info.resources.iter().position(|r| *r == resource) {
                        prev_info.resources.remove(pos);
                        prev_info.ref_count -= 1;
                    }
                    Self::check_memory_invariant(prev_info);
                }
            }
        }

        if let Some(info) = self.memory.get_mut(&mem) {
            if !info.resources.contains(&resource) {
                info.resources.push(resource);
                info.ref_count += 1;
            }
            Self::check_memory_invariant(info);
        }
        if let Some(res) = self.resources.get_mut(&key) {
            res.bound_memory = MemoryBinding::Memory(mem);
        }

        false
    }

    /// Removes the binding of `resource` and the reverse entry on the
    /// memory side.
    pub(crate) fn clear_binding(&mut self, resource: ResourceRef) -> bool {
        let key = ResourceKey::from(resource);
        let Some(res) = self.resources.get(&key) else {
            return false;
        };

        let mem = match res.bound_memory {
            MemoryBinding::Sentinel => {
                // Swapchain images have no tracked allocation to release.
                if let Some(res) = self.resources.get_mut(&key) {
                    res.bound_memory = MemoryBinding::Unbound;
                }
                return false;
            }
            MemoryBinding::Memory(mem) if self.memory.contains_key(&mem) => mem,
            _ => {
                self.warn(
                    resource.kind.object_kind(),
                    resource.raw,
                    MessageCode::MemObjClearEmptyBindings,
                    format!(
                        "attempting to clear the memory binding of {resource} but it has none"
                    ),
                );
                return true;
            }
        };

        let info = match self.memory.get_mut(&mem) {
            Some(info) => info,
            None => return false,
        };
        match info.resources.iter().position(|r| *r == resource) {
            Some(pos) => {
                info.resources.remove(pos);
                info.ref_count -= 1;
                Self::check_memory_invariant(info);
                if let Some(res) = self.resources.get_mut(&key) {
                    res.bound_memory = MemoryBinding::Unbound;
                }
                false
            }
            None => {
                self.error(
                    resource.kind.object_kind(),
                    resource.raw,
                    MessageCode::InvalidObject,
                    format!(
                        "while clearing the memory binding of {resource}, it is not \
                         referenced by memory object {mem}"
                    ),
                );
                true
            }
        }
    }

    /// Looks up the memory a resource is bound to.
    pub(crate) fn get_binding(&self, resource: ResourceRef) -> (MemoryBinding, bool) {
        let key = ResourceKey::from(resource);
        match self.resources.get(&key) {
            None => {
                self.error(
                    resource.kind.object_kind(),
                    resource.raw,
                    MessageCode::InvalidObject,
                    format!(
                        "trying to get the memory binding of {resource} but no such \
                         object exists"
                    ),
                );
                (MemoryBinding::Unbound, true)
            }
            Some(res) => match res.bound_memory {
                MemoryBinding::Unbound => {
                    self.error(
                        resource.kind.object_kind(),
                        resource.raw,
                        MessageCode::MissingMemBindings,
                        format!(
                            "trying to get the memory binding of {resource} but it has \
                             no memory bound"
                        ),
                    );
                    (MemoryBinding::Unbound, true)
                }
                bound => (bound, false),
            },
        }
    }
}
