//! Usage-flag validation.
//!
//! One generic rule: the actual creation-time usage bits of a resource
//! must overlap the desired set, or contain all of it when the check is
//! strict. View creation uses the relaxed form, transfer commands the
//! strict one.

use crate::handle::{BufferId, ImageId};
use crate::report::MessageCode;
use crate::{BufferUsage, ImageUsage};

use super::{DeviceTracker, ResourceKey};

pub(crate) const IMAGE_VIEW_USAGE: ImageUsage = ImageUsage::SAMPLED
    .union(ImageUsage::STORAGE)
    .union(ImageUsage::COLOR_ATTACHMENT)
    .union(ImageUsage::DEPTH_STENCIL_ATTACHMENT);

pub(crate) const IMAGE_VIEW_USAGE_STR: &str =
    "SAMPLED | STORAGE | COLOR_ATTACHMENT | DEPTH_STENCIL_ATTACHMENT";

pub(crate) const BUFFER_VIEW_USAGE: BufferUsage =
    BufferUsage::UNIFORM_TEXEL.union(BufferUsage::STORAGE_TEXEL);

pub(crate) const BUFFER_VIEW_USAGE_STR: &str = "UNIFORM_TEXEL | STORAGE_TEXEL";

impl DeviceTracker {
    fn validate_usage(
        &self,
        key: ResourceKey,
        desired: u32,
        strict: bool,
        api_name: &str,
        usage_str: &str,
    ) -> bool {
        let Some(res) = self.resources.get(&key) else {
            return false;
        };

        let actual = res.create_info.usage_bits();
        let correct = if strict {
            actual & desired == desired
        } else {
            actual & desired != 0
        };
        if correct {
            return false;
        }

        let kind = res.kind;
        self.error(
            kind.object_kind(),
            key.raw,
            MessageCode::InvalidUsageFlag,
            format!(
                "invalid usage flag for {kind} {:#x} used by {api_name}; the {kind} \
                 should have {usage_str} set during creation",
                key.raw,
            ),
        );
        true
    }

    pub(crate) fn validate_buffer_usage(
        &self,
        buffer: BufferId,
        desired: BufferUsage,
        strict: bool,
        api_name: &str,
        usage_str: &str,
    ) -> bool {
        self.validate_usage(
            ResourceKey::buffer(buffer),
            desired.bits(),
            strict,
            api_name,
            usage_str,
        )
    }

    pub(crate) fn validate_image_usage(
        &self,
        image: ImageId,
        desired: ImageUsage,
        strict: bool,
        api_name: &str,
        usage_str: &str,
    ) -> bool {
        self.validate_usage(
            ResourceKey::image(image),
            desired.bits(),
            strict,
            api_name,
            usage_str,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::handle::{BufferId, ImageId};
    use crate::report::MessageCode;
    use crate::track::test_support::tracker;
    use crate::track::usage::{IMAGE_VIEW_USAGE, IMAGE_VIEW_USAGE_STR};
    use crate::{BufferCreateInfo, BufferUsage, ImageCreateInfo, ImageUsage};

    const BUF: BufferId = BufferId::from_raw(0xb1);
    const IMG: ImageId = ImageId::from_raw(0x1);

    #[test]
    fn relaxed_check_accepts_any_overlap() {
        let (mut t, rec) = tracker();
        t.add_image(
            IMG,
            &ImageCreateInfo {
                usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            },
        );

        assert!(!t.validate_image_usage(
            IMG,
            IMAGE_VIEW_USAGE,
            false,
            "create_image_view",
            IMAGE_VIEW_USAGE_STR,
        ));
        assert!(rec.take().is_empty());
    }

    #[test]
    fn relaxed_check_rejects_disjoint_usage() {
        let (mut t, rec) = tracker();
        t.add_image(
            IMG,
            &ImageCreateInfo {
                usage: ImageUsage::TRANSFER_SRC,
            },
        );

        assert!(t.validate_image_usage(
            IMG,
            IMAGE_VIEW_USAGE,
            false,
            "create_image_view",
            IMAGE_VIEW_USAGE_STR,
        ));

        let records = rec.take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code, MessageCode::InvalidUsageFlag);
        assert!(records[0].message.contains("SAMPLED | STORAGE"));
    }

    #[test]
    fn strict_check_requires_all_bits() {
        let (mut t, rec) = tracker();
        t.add_buffer(
            BUF,
            &BufferCreateInfo {
                size: 16,
                usage: BufferUsage::TRANSFER_SRC | BufferUsage::UNIFORM,
            },
        );

        assert!(!t.validate_buffer_usage(
            BUF,
            BufferUsage::TRANSFER_SRC,
            true,
            "cmd_copy_buffer",
            "TRANSFER_SRC",
        ));
        assert!(t.validate_buffer_usage(
            BUF,
            BufferUsage::TRANSFER_DST,
            true,
            "cmd_copy_buffer",
            "TRANSFER_DST",
        ));
        assert_eq!(rec.problem_codes(), vec![MessageCode::InvalidUsageFlag]);
    }

    #[test]
    fn unknown_resource_is_silent() {
        let (t, rec) = tracker();
        assert!(!t.validate_buffer_usage(
            BUF,
            BufferUsage::TRANSFER_SRC,
            true,
            "cmd_copy_buffer",
            "TRANSFER_SRC",
        ));
        assert!(rec.take().is_empty());
    }
}
