//! 帧资源环集成测试
//!
//! GPU 一侧由 `ManualQueue` 模拟：测试线程或单独的 "GPU" 线程决定 Fence 何时完成。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use frame_ring::core::error::{FrameRingError, MisuseError};
use frame_ring::renderer::constants::ObjectConstants;
use frame_ring::renderer::{
    FenceValue, FrameRing, FrameRingDesc, ImmediateQueue, ManualQueue, ManualQueueHandle, SlotState,
};
use frame_ring::scene::{AssetRegistry, FrameTiming, Scene, SceneConfig};

fn desc(frame_count: usize) -> FrameRingDesc {
    FrameRingDesc {
        frame_count,
        max_objects: 4,
        max_lights: 1,
        max_particles: 16,
        ..FrameRingDesc::default()
    }
}

fn manual_ring(frame_count: usize) -> (FrameRing<ManualQueue>, ManualQueueHandle) {
    let queue = ManualQueue::new();
    let handle = queue.handle();
    (FrameRing::new(queue, desc(frame_count)).unwrap(), handle)
}

/// 写入一条可识别的对象常量
fn stamp(ring: &mut FrameRing<ManualQueue>, slot: usize, tag: f32) {
    let frame = ring.frame_mut(slot).unwrap();
    let regions = frame.regions_mut();
    let mut mapped = regions.objects.map().unwrap();
    let mut record = ObjectConstants::default();
    record.world[0][0] = tag;
    mapped.copy_record(0, &record).unwrap();
}

fn read_stamp(ring: &FrameRing<ManualQueue>, slot: usize) -> f32 {
    ring.frame(slot).unwrap().object_constants().read_as(0).unwrap().world[0][0]
}

#[test]
fn begin_frame_never_returns_a_slot_the_gpu_may_still_read() {
    for frame_count in 2..=4 {
        let (mut ring, handle) = manual_ring(frame_count);
        let stop = Arc::new(AtomicBool::new(false));

        let gpu = {
            let handle = handle.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(frame_count as u64);
                loop {
                    thread::sleep(Duration::from_micros(rng.gen_range(0..800)));
                    if handle.complete_next().is_none() && stop.load(Ordering::Acquire) {
                        break;
                    }
                }
            })
        };

        // 每个槽位最后一次提交的 (fence, tag)
        let mut last_submit: Vec<Option<(FenceValue, f32)>> = vec![None; frame_count];
        for frame in 0..40u32 {
            let slot = ring.begin_frame().unwrap();
            let completed = ring.completed_value();

            if let Some((fence, tag)) = last_submit[slot] {
                // GPU 已读完上一次提交，且读到的数据没有被提前覆盖
                assert!(completed >= fence, "slot {} reused before fence {:?}", slot, fence);
                assert_eq!(read_stamp(&ring, slot), tag);
            }
            assert!(ring.in_flight() < frame_count);

            let tag = frame as f32 + 1.0;
            stamp(&mut ring, slot, tag);
            let fence = ring.end_frame(slot).unwrap();
            last_submit[slot] = Some((fence, tag));
        }

        stop.store(true, Ordering::Release);
        ring.flush().unwrap();
        gpu.join().unwrap();
        assert_eq!(ring.completed_value(), ring.current_fence());
    }
}

#[test]
fn written_records_read_back_after_completion() {
    let (mut ring, handle) = manual_ring(2);
    let slot = ring.begin_frame().unwrap();
    {
        let frame = ring.frame_mut(slot).unwrap();
        let regions = frame.regions_mut();
        let mut mapped = regions.objects.map().unwrap();
        for i in 0..4 {
            let mut record = ObjectConstants::default();
            record.world[3] = [i as f32, 2.0 * i as f32, 0.0, 1.0];
            mapped.copy_record(i, &record).unwrap();
        }
    }
    let fence = ring.end_frame(slot).unwrap();
    handle.complete_through(fence);

    let objects = ring.frame(slot).unwrap().object_constants();
    for i in 0..4 {
        let record = objects.read_as(i).unwrap();
        assert_eq!(record.world[3], [i as f32, 2.0 * i as f32, 0.0, 1.0]);
        assert_eq!(objects.element_offset(i).unwrap(), 256 * i as u64);
    }
}

#[test]
fn completed_value_is_stable_without_gpu_progress() {
    let (mut ring, handle) = manual_ring(3);
    for _ in 0..2 {
        let slot = ring.begin_frame().unwrap();
        ring.end_frame(slot).unwrap();
    }
    handle.complete_next();

    let observed: Vec<_> = (0..10).map(|_| ring.completed_value()).collect();
    assert!(observed.iter().all(|v| *v == FenceValue::new(1)));
    assert_eq!(ring.current_fence(), FenceValue::new(2));
    handle.complete_all();
}

#[test]
fn triple_buffering_with_an_idle_gpu_never_stalls() {
    let mut ring = FrameRing::new(ImmediateQueue::new(), desc(3)).unwrap();
    for _ in 0..10 {
        let slot = ring.begin_frame().unwrap();
        ring.end_frame(slot).unwrap();
    }

    let stats = ring.stats();
    assert_eq!(stats.frames_submitted, 10);
    assert_eq!(stats.stalls, 0);
    assert_eq!(ring.sync_stats().stalls, 0);
    assert_eq!(ring.queue().executed(), 10);
    assert_eq!(ring.completed_value().value(), 10);
}

#[test]
fn begin_frame_blocks_only_when_it_wraps_onto_a_pending_slot() {
    for frame_count in 2..=4 {
        let (mut ring, handle) = manual_ring(frame_count);
        // 前 N 次 begin_frame 拿到的都是空闲槽位，不需要等待
        for expected in 0..frame_count {
            let slot = ring.begin_frame().unwrap();
            assert_eq!(slot, expected);
            ring.end_frame(slot).unwrap();
        }
        assert_eq!(ring.stats().stalls, 0);
        assert_eq!(handle.pending_count(), frame_count);
        assert_eq!(ring.in_flight(), frame_count);

        let returned = Arc::new(AtomicBool::new(false));
        let cpu = {
            let returned = Arc::clone(&returned);
            thread::spawn(move || {
                let start = Instant::now();
                let slot = ring.begin_frame();
                returned.store(true, Ordering::Release);
                (ring, slot, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(
            !returned.load(Ordering::Acquire),
            "begin_frame #{} returned before frame 1 completed (N = {})",
            frame_count + 1,
            frame_count
        );

        handle.complete_next();
        let (ring, slot, waited) = cpu.join().unwrap();

        assert_eq!(slot.unwrap(), 0);
        assert!(waited >= Duration::from_millis(40));
        assert_eq!(ring.stats().stalls, 1);
        assert_eq!(ring.slot_state(0), Some(SlotState::InUseByCpu));
        for pending in 1..frame_count {
            assert_eq!(ring.slot_state(pending), Some(SlotState::SubmittedToGpu));
        }
        handle.complete_all();
    }
}

#[test]
fn device_lost_wakes_the_blocked_cpu_and_poisons_the_ring() {
    let (mut ring, handle) = manual_ring(2);
    for _ in 0..2 {
        let slot = ring.begin_frame().unwrap();
        ring.end_frame(slot).unwrap();
    }

    let cpu = thread::spawn(move || {
        let result = ring.begin_frame();
        (ring, result)
    });

    thread::sleep(Duration::from_millis(20));
    handle.lose_device("DXGI_ERROR_DEVICE_HUNG");
    let (mut ring, result) = cpu.join().unwrap();

    let err = result.unwrap_err();
    assert!(err.is_device_lost());
    assert!(err.to_string().contains("DXGI_ERROR_DEVICE_HUNG"));

    assert!(ring.is_lost());
    assert!(ring.begin_frame().unwrap_err().is_device_lost());
    assert!(ring.end_frame(0).unwrap_err().is_device_lost());
    assert!(ring.flush().unwrap_err().is_device_lost());
}

#[test]
fn end_frame_requires_the_open_slot() {
    let (mut ring, handle) = manual_ring(3);
    assert!(matches!(
        ring.end_frame(0).unwrap_err(),
        FrameRingError::Misuse(MisuseError::NoFrameOpen)
    ));

    let slot = ring.begin_frame().unwrap();
    assert!(matches!(
        ring.end_frame(slot + 1).unwrap_err(),
        FrameRingError::Misuse(MisuseError::SlotMismatch { .. })
    ));
    assert!(ring.end_frame(slot).is_ok());
    handle.complete_all();
}

#[test]
fn scene_frames_flow_through_the_ring() {
    let registry = AssetRegistry::with_builtin_meshes();
    let mut scene = Scene::new(&SceneConfig::default(), &registry, 16, 11).unwrap();
    let (mut ring, handle) = manual_ring(3);

    let mut timing = FrameTiming::default();
    for _ in 0..6 {
        timing.advance(0.016);
        scene.update(&timing);
        // GPU 落后两帧
        if ring.in_flight() == 2 {
            handle.complete_next();
        }
        let slot = ring.begin_frame().unwrap();
        let contents = scene.write_frame(ring.frame_mut(slot).unwrap(), &timing).unwrap();
        assert_eq!(contents.objects, 3);
        assert!(contents.particles <= 16);
        ring.end_frame(slot).unwrap();

        let list = handle.last_executed().unwrap();
        assert_eq!(list.slot(), slot);
        assert!(list.draw_count() >= 3);
    }
    assert_eq!(ring.stats().stalls, 0);

    handle.complete_all();
    let stats = ring.shutdown().unwrap();
    assert_eq!(stats.frames_submitted, 6);
}
