//! Typed wrappers around the raw handles issued by the driver.
//!
//! Handles are opaque integers, unique within their kind for the lifetime
//! of the owning device. The layer never dereferences them; they are only
//! table keys and diagnostic payload.

use std::fmt::{self, Display, Formatter};

macro_rules! define_handles {
    ($($(#[$attr:meta])* $name:ident,)*) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            #[repr(transparent)]
            pub struct $name(u64);

            impl $name {
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                pub const fn into_raw(self) -> u64 {
                    self.0
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                    write!(f, "{:#x}", self.0)
                }
            }
        )*
    };
}

define_handles! {
    InstanceId,
    DeviceId,
    /// A device memory allocation.
    MemoryId,
    BufferId,
    ImageId,
    CommandBufferId,
    QueueId,
    FenceId,
    SemaphoreId,
    SwapchainId,
}

/// What a resource table entry is.
///
/// Buffers key one handle namespace; images and swapchain images share the
/// image namespace. Swapchain images are created by the presentation engine
/// and carry the sentinel memory binding instead of a real allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Image,
    SwapchainImage,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Image => "image",
            ResourceKind::SwapchainImage => "swapchain image",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(kind, handle)` cross-reference, as stored in a memory object's
/// resource set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub raw: u64,
}

impl ResourceRef {
    pub const fn buffer(buffer: BufferId) -> Self {
        Self {
            kind: ResourceKind::Buffer,
            raw: buffer.into_raw(),
        }
    }

    pub const fn image(image: ImageId) -> Self {
        Self {
            kind: ResourceKind::Image,
            raw: image.into_raw(),
        }
    }

    pub const fn swapchain_image(image: ImageId) -> Self {
        Self {
            kind: ResourceKind::SwapchainImage,
            raw: image.into_raw(),
        }
    }
}

impl Display for ResourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#x}", self.kind, self.raw)
    }
}
