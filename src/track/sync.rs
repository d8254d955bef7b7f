//! Fence, queue and semaphore tracking.
//!
//! Every submission draws a fresh per-device fence id. A queue remembers
//! the highest id submitted to it and the highest id it has seen retire;
//! work is in flight while its id is above the retired mark. Fences carry
//! the id and queue of their last submission so an observed signal can
//! advance the right queue. Semaphores are a three-state machine.

use crate::handle::{CommandBufferId, FenceId, QueueId, SemaphoreId};
use crate::report::{MessageCode, ObjectKind, Severity};
use crate::FenceCreateFlags;

use super::{DeviceTracker, SemaphoreState, SEMAPHORE_PREFIX};

impl DeviceTracker {
    /// Registers a submission on `queue`, optionally tied to `fence`.
    ///
    /// Returns the fence id assigned to the submission and whether the
    /// call should be skipped (the fence was still signaled).
    pub(crate) fn track_submit_fence(
        &mut self,
        fence: Option<FenceId>,
        queue: QueueId,
    ) -> (u64, bool) {
        let fence_id = self.next_fence_id();
        let mut skip = false;

        if let Some(fence) = fence {
            let info = self.fences.entry(fence).or_default();
            info.fence_id = fence_id;
            info.queue = Some(queue);
            if info.signaled() {
                skip = true;
            }

            if skip {
                self.error(
                    ObjectKind::Fence,
                    fence.into_raw(),
                    MessageCode::InvalidFenceState,
                    format!(
                        "fence {fence} submitted in SIGNALED state, fences must be reset \
                         before being submitted"
                    ),
                );
            }
        }

        self.queues.entry(queue).or_default().last_submitted_id = fence_id;
        (fence_id, skip)
    }

    /// Stamps a command buffer with the submission it now belongs to.
    pub(crate) fn mark_cb_submitted(
        &mut self,
        cb: CommandBufferId,
        fence_id: u64,
        fence: Option<FenceId>,
        queue: QueueId,
    ) -> bool {
        match self.command_buffers.get_mut(&cb) {
            Some(info) => {
                info.fence_id = fence_id;
                info.last_submitted_fence = fence;
                info.last_submitted_queue = Some(queue);
                false
            }
            None => {
                self.error(
                    ObjectKind::CommandBuffer,
                    cb.into_raw(),
                    MessageCode::InvalidCb,
                    format!("submitting command buffer {cb} that was never allocated"),
                );
                true
            }
        }
    }

    /// Records that `fence` was observed signaled, advancing retirement on
    /// the queue it was last submitted to.
    pub(crate) fn fence_signaled(&mut self, fence: FenceId) {
        if let Some(info) = self.fences.get(&fence) {
            let fence_id = info.fence_id;
            if let Some(queue) = info.queue {
                if let Some(q) = self.queues.get_mut(&queue) {
                    if q.last_retired_id < fence_id {
                        q.last_retired_id = fence_id;
                    }
                }
            }
        }

        let info = self.fences.entry(fence).or_default();
        info.create_info.flags |= FenceCreateFlags::SIGNALED;
    }

    /// Marks everything submitted to `queue` as retired.
    pub(crate) fn retire_queue(&mut self, queue: QueueId) {
        if let Some(info) = self.queues.get_mut(&queue) {
            info.last_retired_id = info.last_submitted_id;
        }
    }

    /// Marks everything submitted to any queue as retired.
    pub(crate) fn retire_all_queues(&mut self) {
        for info in self.queues.values_mut() {
            info.last_retired_id = info.last_submitted_id;
        }
    }

    /// Pre-checks a status query or wait on `fence`.
    pub(crate) fn verify_fence_status(&self, fence: FenceId, api_name: &str) -> bool {
        let Some(info) = self.fences.get(&fence) else {
            return false;
        };

        let mut skip = false;
        if info.signaled() {
            self.warn(
                ObjectKind::Fence,
                fence.into_raw(),
                MessageCode::InvalidFenceState,
                format!("{api_name} called on fence {fence} already in SIGNALED state"),
            );
            skip = true;
        }
        if info.queue.is_none() {
            self.warn(
                ObjectKind::Fence,
                fence.into_raw(),
                MessageCode::InvalidFenceState,
                format!(
                    "{api_name} called on fence {fence} which has not been submitted \
                     on a queue"
                ),
            );
            skip = true;
        }
        skip
    }

    /// Clears the signaled flag of `fence`.
    ///
    /// Resetting a fence that is not signaled is reported and skipped. The
    /// fence keeps the identity of its last submitter.
    pub(crate) fn reset_fence(&mut self, fence: FenceId) -> bool {
        let signaled = match self.fences.get(&fence) {
            Some(info) => info.signaled(),
            None => return false,
        };

        if !signaled {
            self.warn(
                ObjectKind::Fence,
                fence.into_raw(),
                MessageCode::InvalidFenceState,
                format!("fence {fence} reset while in UNSIGNALED state"),
            );
            return true;
        }

        if let Some(info) = self.fences.get_mut(&fence) {
            info.create_info.flags -= FenceCreateFlags::SIGNALED;
        }
        false
    }

    fn semaphore_error(&self, semaphore: SemaphoreId, message: String) {
        self.report.emit(
            Severity::Error,
            ObjectKind::Semaphore,
            semaphore.into_raw(),
            MessageCode::None,
            SEMAPHORE_PREFIX,
            message,
        );
    }

    /// Submission names `semaphore` in its wait list: it must currently be
    /// signaled, and enters the wait state.
    pub(crate) fn semaphore_wait(&mut self, semaphore: SemaphoreId) -> bool {
        let Some(state) = self.semaphores.get_mut(&semaphore) else {
            return false;
        };

        let skip = *state != SemaphoreState::Signaled;
        *state = SemaphoreState::Wait;
        if skip {
            self.semaphore_error(
                semaphore,
                format!(
                    "semaphore {semaphore} must be in signaled state before being waited on"
                ),
            );
        }
        skip
    }

    /// Submission names `semaphore` in its signal list: it must currently
    /// be unset, and becomes signaled.
    pub(crate) fn semaphore_signal(&mut self, semaphore: SemaphoreId) -> bool {
        let Some(state) = self.semaphores.get_mut(&semaphore) else {
            return false;
        };

        let skip = *state != SemaphoreState::Unset;
        *state = SemaphoreState::Signaled;
        if skip {
            self.semaphore_error(
                semaphore,
                format!(
                    "semaphore {semaphore} must not be currently signaled or in a wait state"
                ),
            );
        }
        skip
    }

    /// The driver call a wait semaphore was handed to has returned; the
    /// semaphore is consumed back to unset.
    pub(crate) fn semaphore_retire_wait(&mut self, semaphore: SemaphoreId) {
        if let Some(state) = self.semaphores.get_mut(&semaphore) {
            *state = SemaphoreState::Unset;
        }
    }

    /// An acquire operation will signal `semaphore`: it must currently be
    /// unset, and becomes signaled.
    pub(crate) fn semaphore_acquire(&mut self, semaphore: SemaphoreId) -> bool {
        let Some(state) = self.semaphores.get_mut(&semaphore) else {
            return false;
        };

        let skip = *state != SemaphoreState::Unset;
        *state = SemaphoreState::Signaled;
        if skip {
            self.semaphore_error(
                semaphore,
                format!(
                    "semaphore {semaphore} must not be currently signaled or in a wait state"
                ),
            );
        }
        skip
    }
}
