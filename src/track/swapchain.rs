//! Swapchain tracking.
//!
//! Swapchain images bypass the usual image creation path, so the layer
//! registers them itself when the image list is first queried. They are
//! marked with the sentinel memory binding; their backing store belongs
//! to the presentation engine.

use crate::handle::{ImageId, ResourceKind, ResourceRef, SwapchainId};
use crate::report::{MessageCode, ObjectKind, Severity};
use crate::{ImageCreateInfo, SwapchainCreateInfo};

use super::{
    DeviceTracker, MemoryBinding, ResourceCreateInfo, ResourceInfo, ResourceKey, SwapchainInfo,
    SWAPCHAIN_PREFIX,
};

impl DeviceTracker {
    pub(crate) fn add_swapchain(&mut self, swapchain: SwapchainId, info: &SwapchainCreateInfo) {
        self.swapchains.insert(
            swapchain,
            SwapchainInfo {
                create_info: *info,
                images: Vec::new(),
            },
        );
    }

    /// Records the image list returned by the driver for `swapchain`.
    ///
    /// The first call registers each image as a sentinel-bound resource
    /// with the swapchain's image usage; later calls only check that the
    /// driver keeps returning the same list.
    pub(crate) fn register_swapchain_images(
        &mut self,
        swapchain: SwapchainId,
        images: &[ImageId],
    ) {
        let Some(info) = self.swapchains.get_mut(&swapchain) else {
            self.error(
                ObjectKind::Swapchain,
                swapchain.into_raw(),
                MessageCode::InvalidObject,
                format!("querying images of unknown swapchain {swapchain}"),
            );
            return;
        };

        if info.images.is_empty() {
            info.images = images.to_vec();
            let usage = info.create_info.image_usage;
            for image in images {
                self.resources.insert(
                    ResourceKey::image(*image),
                    ResourceInfo {
                        kind: ResourceKind::SwapchainImage,
                        create_info: ResourceCreateInfo::Image(ImageCreateInfo { usage }),
                        bound_memory: MemoryBinding::Sentinel,
                    },
                );
            }
        } else if info.images.len() != images.len()
            || info.images.iter().zip(images).any(|(a, b)| a != b)
        {
            self.report.emit(
                Severity::Warn,
                ObjectKind::Swapchain,
                swapchain.into_raw(),
                MessageCode::None,
                SWAPCHAIN_PREFIX,
                format!("image query for swapchain {swapchain} returned mismatching data"),
            );
        }
    }

    /// Drops `swapchain` and every image registered for it.
    pub(crate) fn destroy_swapchain(&mut self, swapchain: SwapchainId) -> bool {
        let Some(info) = self.swapchains.remove(&swapchain) else {
            return false;
        };

        let mut skip = false;
        for image in info.images {
            skip |= self.clear_binding(ResourceRef::swapchain_image(image));
            self.resources.remove(&ResourceKey::image(image));
        }
        skip
    }
}
