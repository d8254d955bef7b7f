//! End-to-end scenarios driven through the public layer surface, with a
//! recording sink standing in for the interceptor's diagnostic callback.

use std::sync::Arc;

use memtrack::{
    BufferCreateInfo, BufferId, BufferUsage, CommandBufferId, Config, DebugAction, DeviceId, FenceCreateInfo,
    FenceId, ImageCreateInfo, ImageId, ImageUsage, InstanceId, MemTracker, MemoryAllocateInfo,
    MemoryId, MemoryProperties, MemoryType, MemoryTypeFlags, MessageCode, QueueId,
    RecordingCallback, ReportFlags, SemaphoreId, Severity, SubmitInfo, SwapchainCreateInfo,
    SwapchainId, ValidationFailed, SWAPCHAIN_EXTENSION,
};

const INSTANCE: InstanceId = InstanceId::from_raw(1);
const DEVICE: DeviceId = DeviceId::from_raw(1);
const QUEUE: QueueId = QueueId::from_raw(1);

fn setup() -> (MemTracker, Arc<RecordingCallback>) {
    let layer = MemTracker::new();
    let config = Config {
        report_flags: ReportFlags::all(),
        debug_action: DebugAction::empty(),
        log_filename: None,
    };
    layer.create_instance(INSTANCE, &config);

    let recording = Arc::new(RecordingCallback::new());
    layer
        .register_callback(INSTANCE, ReportFlags::all(), recording.clone())
        .expect("instance was just created");

    layer.set_memory_properties(&MemoryProperties {
        memory_types: vec![
            MemoryType {
                property_flags: MemoryTypeFlags::HOST_VISIBLE | MemoryTypeFlags::HOST_COHERENT,
            },
            MemoryType {
                property_flags: MemoryTypeFlags::DEVICE_LOCAL,
            },
        ],
    });

    layer.create_device(INSTANCE, DEVICE, &[SWAPCHAIN_EXTENSION]);
    layer.get_device_queue(DEVICE, QUEUE);
    (layer, recording)
}

fn problem_codes(recording: &RecordingCallback) -> Vec<MessageCode> {
    recording
        .take()
        .into_iter()
        .filter(|d| d.severity != Severity::Info)
        .map(|d| d.code)
        .collect()
}

#[test]
fn map_range_checks() {
    let (layer, recording) = setup();
    let mem = MemoryId::from_raw(0xa);

    layer.allocate_memory(
        DEVICE,
        mem,
        &MemoryAllocateInfo {
            allocation_size: 4096,
            memory_type_index: 0,
        },
    );
    assert!(layer.map_memory(DEVICE, mem, 0, 4096).is_ok());
    assert!(problem_codes(&recording).is_empty());

    assert_eq!(layer.map_memory(DEVICE, mem, 0, 8192), Err(ValidationFailed));
    assert_eq!(problem_codes(&recording), vec![MessageCode::InvalidMap]);

    layer.free_memory(DEVICE, mem);
    assert!(problem_codes(&recording).is_empty());

    // The record is gone, so teardown has nothing to report.
    assert!(layer.destroy_device(DEVICE).is_ok());
}

#[test]
fn free_with_live_bindings_lists_them() {
    let (layer, recording) = setup();
    let mem = MemoryId::from_raw(0xa);
    let b1 = BufferId::from_raw(0xb1);
    let b2 = BufferId::from_raw(0xb2);

    layer.create_buffer(
        DEVICE,
        b1,
        &BufferCreateInfo {
            size: 64,
            usage: BufferUsage::TRANSFER_SRC,
        },
    );
    layer.create_buffer(
        DEVICE,
        b2,
        &BufferCreateInfo {
            size: 64,
            usage: BufferUsage::TRANSFER_SRC,
        },
    );
    layer.allocate_memory(
        DEVICE,
        mem,
        &MemoryAllocateInfo {
            allocation_size: 4096,
            memory_type_index: 0,
        },
    );
    assert!(layer.bind_buffer_memory(DEVICE, b1, Some(mem)).is_ok());
    assert!(layer.bind_buffer_memory(DEVICE, b2, Some(mem)).is_ok());

    layer.free_memory(DEVICE, mem);

    let records = recording.take();
    let summary: Vec<_> = records
        .iter()
        .filter(|d| d.code == MessageCode::FreedMemRef && d.severity == Severity::Error)
        .collect();
    assert_eq!(summary.len(), 1);
    assert!(summary[0].message.contains("2 references"));

    let listed: Vec<_> = records
        .iter()
        .filter(|d| d.code == MessageCode::FreedMemRef && d.severity == Severity::Info)
        .collect();
    assert_eq!(listed.len(), 2);

    // The record was removed despite the lingering references.
    assert!(layer.destroy_device(DEVICE).is_ok());
}

#[test]
fn command_buffer_in_flight_until_fence_observed() {
    let (layer, recording) = setup();
    let cb = CommandBufferId::from_raw(0xc);
    let fence = FenceId::from_raw(0xf1);

    layer.allocate_command_buffers(DEVICE, &[cb]);
    layer.create_fence(DEVICE, fence, &FenceCreateInfo::default());

    let submits = [SubmitInfo {
        command_buffers: &[cb],
        ..Default::default()
    }];
    assert!(layer.queue_submit(DEVICE, QUEUE, &submits, Some(fence)).is_ok());
    layer.queue_submit_done(DEVICE, &submits);
    assert!(problem_codes(&recording).is_empty());

    // The submission has not retired; beginning the buffer is an error.
    assert_eq!(layer.begin_command_buffer(DEVICE, cb), Err(ValidationFailed));
    assert_eq!(
        problem_codes(&recording),
        vec![MessageCode::ResetCbWhileInFlight]
    );

    // A successful status query retires the submission.
    assert!(layer.get_fence_status(DEVICE, fence).is_ok());
    layer.fence_signaled(DEVICE, fence);

    assert!(layer.begin_command_buffer(DEVICE, cb).is_ok());
    layer.begin_command_buffer_done(DEVICE, cb);
    assert!(problem_codes(&recording).is_empty());
}

#[test]
fn resubmit_is_legal_but_reset_is_not() {
    let (layer, recording) = setup();
    let cb = CommandBufferId::from_raw(0xc);
    layer.allocate_command_buffers(DEVICE, &[cb]);

    let submits = [SubmitInfo {
        command_buffers: &[cb],
        ..Default::default()
    }];
    assert!(layer.queue_submit(DEVICE, QUEUE, &submits, None).is_ok());
    // Submitting again before retirement is permitted.
    assert!(layer.queue_submit(DEVICE, QUEUE, &submits, None).is_ok());
    assert!(problem_codes(&recording).is_empty());

    assert_eq!(layer.reset_command_buffer(DEVICE, cb), Err(ValidationFailed));
    assert_eq!(
        problem_codes(&recording),
        vec![MessageCode::ResetCbWhileInFlight]
    );

    // Queue idle retires everything and reset becomes legal.
    layer.queue_idle(DEVICE, QUEUE);
    assert!(layer.reset_command_buffer(DEVICE, cb).is_ok());
}

#[test]
fn semaphore_signal_wait_cycle() {
    let (layer, recording) = setup();
    let sem = SemaphoreId::from_raw(0x5);
    layer.create_semaphore(DEVICE, sem);

    let signal = [SubmitInfo {
        signal_semaphores: &[sem],
        ..Default::default()
    }];
    assert!(layer.queue_submit(DEVICE, QUEUE, &signal, None).is_ok());
    layer.queue_submit_done(DEVICE, &signal);
    assert!(problem_codes(&recording).is_empty());

    // Signaling an already signaled semaphore is an error.
    assert_eq!(
        layer.queue_submit(DEVICE, QUEUE, &signal, None),
        Err(ValidationFailed)
    );
    layer.queue_submit_done(DEVICE, &signal);
    let records = recording.take();
    assert!(records.iter().any(|d| d.severity == Severity::Error));

    let wait = [SubmitInfo {
        wait_semaphores: &[sem],
        ..Default::default()
    }];
    assert!(layer.queue_submit(DEVICE, QUEUE, &wait, None).is_ok());
    layer.queue_submit_done(DEVICE, &wait);
    assert!(problem_codes(&recording).is_empty());

    // The wait consumed the semaphore back to unset, so signaling is
    // legal again.
    assert!(layer.queue_submit(DEVICE, QUEUE, &signal, None).is_ok());
    layer.queue_submit_done(DEVICE, &signal);
    assert!(problem_codes(&recording).is_empty());
}

#[test]
fn acquire_signals_the_semaphore() {
    let (layer, recording) = setup();
    let sem = SemaphoreId::from_raw(0x5);
    let swapchain = SwapchainId::from_raw(0x5c);
    layer.create_semaphore(DEVICE, sem);
    layer.create_swapchain(
        DEVICE,
        swapchain,
        &SwapchainCreateInfo {
            min_image_count: 3,
            image_usage: ImageUsage::COLOR_ATTACHMENT,
        },
    );

    assert!(layer.acquire_next_image(DEVICE, swapchain, Some(sem)).is_ok());
    // The acquire left it signaled, a second acquire must fail.
    assert_eq!(
        layer.acquire_next_image(DEVICE, swapchain, Some(sem)),
        Err(ValidationFailed)
    );
    assert!(recording.take().iter().any(|d| d.severity == Severity::Error));
}

#[test]
fn swapchain_images_are_tracked_and_torn_down() {
    let (layer, recording) = setup();
    let swapchain = SwapchainId::from_raw(0x5c);
    let images = [
        ImageId::from_raw(0x10),
        ImageId::from_raw(0x11),
        ImageId::from_raw(0x12),
    ];

    layer.create_swapchain(
        DEVICE,
        swapchain,
        &SwapchainCreateInfo {
            min_image_count: 3,
            image_usage: ImageUsage::COLOR_ATTACHMENT,
        },
    );
    layer.get_swapchain_images(DEVICE, swapchain, &images);

    // The registered images carry the swapchain's usage, so a view is
    // legal, and their sentinel binding keeps them out of memory
    // tracking.
    layer.create_image_view(DEVICE, images[0]);
    let cb = CommandBufferId::from_raw(0xc);
    layer.allocate_command_buffers(DEVICE, &[cb]);
    assert!(layer.cmd_clear_color_image(DEVICE, cb, images[1]).is_ok());
    assert!(problem_codes(&recording).is_empty());

    assert!(layer.destroy_swapchain(DEVICE, swapchain).is_ok());
    assert!(problem_codes(&recording).is_empty());

    // The swapchain record is gone along with its images.
    layer.get_swapchain_images(DEVICE, swapchain, &images);
    assert_eq!(problem_codes(&recording), vec![MessageCode::InvalidObject]);
}

#[test]
fn image_view_requires_view_usage() {
    let (layer, recording) = setup();
    let image = ImageId::from_raw(0x1);

    layer.create_image(
        DEVICE,
        image,
        &ImageCreateInfo {
            usage: ImageUsage::TRANSFER_SRC,
        },
    );
    layer.create_image_view(DEVICE, image);

    let records = recording.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].code, MessageCode::InvalidUsageFlag);
    for name in ["SAMPLED", "STORAGE", "COLOR_ATTACHMENT", "DEPTH_STENCIL"] {
        assert!(records[0].message.contains(name), "missing {name}");
    }
}

#[test]
fn transfer_commands_check_usage_strictly() {
    let (layer, recording) = setup();
    let cb = CommandBufferId::from_raw(0xc);
    let src = BufferId::from_raw(0xb1);
    let dst = BufferId::from_raw(0xb2);
    let mem = MemoryId::from_raw(0xa);

    layer.allocate_command_buffers(DEVICE, &[cb]);
    layer.allocate_memory(
        DEVICE,
        mem,
        &MemoryAllocateInfo {
            allocation_size: 4096,
            memory_type_index: 0,
        },
    );
    layer.create_buffer(
        DEVICE,
        src,
        &BufferCreateInfo {
            size: 64,
            usage: BufferUsage::TRANSFER_SRC,
        },
    );
    // Missing TRANSFER_DST on the destination.
    layer.create_buffer(
        DEVICE,
        dst,
        &BufferCreateInfo {
            size: 64,
            usage: BufferUsage::UNIFORM,
        },
    );
    layer.bind_buffer_memory(DEVICE, src, Some(mem)).unwrap();
    layer.bind_buffer_memory(DEVICE, dst, Some(mem)).unwrap();

    assert_eq!(
        layer.cmd_copy_buffer(DEVICE, cb, src, dst),
        Err(ValidationFailed)
    );
    assert_eq!(
        problem_codes(&recording),
        vec![MessageCode::InvalidUsageFlag]
    );
}

#[test]
fn reset_of_unsignaled_fence_is_skipped() {
    let (layer, recording) = setup();
    let fence = FenceId::from_raw(0xf1);
    layer.create_fence(DEVICE, fence, &FenceCreateInfo::default());

    assert_eq!(
        layer.reset_fences(DEVICE, &[fence]),
        Err(ValidationFailed)
    );
    assert_eq!(
        problem_codes(&recording),
        vec![MessageCode::InvalidFenceState]
    );
}

#[test]
fn partial_wait_does_not_retire() {
    let (layer, recording) = setup();
    let cb = CommandBufferId::from_raw(0xc);
    let f1 = FenceId::from_raw(0xf1);
    let f2 = FenceId::from_raw(0xf2);
    layer.allocate_command_buffers(DEVICE, &[cb]);
    layer.create_fence(DEVICE, f1, &FenceCreateInfo::default());
    layer.create_fence(DEVICE, f2, &FenceCreateInfo::default());

    let submits = [SubmitInfo {
        command_buffers: &[cb],
        ..Default::default()
    }];
    layer.queue_submit(DEVICE, QUEUE, &submits, Some(f1)).unwrap();
    layer.queue_submit(DEVICE, QUEUE, &[], Some(f2)).unwrap();

    // wait_any over several fences cannot tell which one signaled, so
    // retirement must not advance.
    layer.fences_waited(DEVICE, &[f1, f2], false);
    assert_eq!(layer.begin_command_buffer(DEVICE, cb), Err(ValidationFailed));

    // wait_all does.
    layer.fences_waited(DEVICE, &[f1, f2], true);
    assert!(layer.begin_command_buffer(DEVICE, cb).is_ok());
    layer.begin_command_buffer_done(DEVICE, cb);

    let codes = problem_codes(&recording);
    assert_eq!(codes, vec![MessageCode::ResetCbWhileInFlight]);
}

#[test]
fn device_teardown_reports_each_leak_once() {
    let (layer, recording) = setup();
    for raw in [0xa, 0xb] {
        layer.allocate_memory(
            DEVICE,
            MemoryId::from_raw(raw),
            &MemoryAllocateInfo {
                allocation_size: 4096,
                memory_type_index: 0,
            },
        );
    }

    assert_eq!(layer.destroy_device(DEVICE), Err(ValidationFailed));
    let codes = problem_codes(&recording);
    assert_eq!(
        codes
            .iter()
            .filter(|c| **c == MessageCode::MemoryLeak)
            .count(),
        2
    );
}
