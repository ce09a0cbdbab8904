//! Concurrent report requests are serialized and none are lost.

use nr_common::{TriggerKind, TriggerSpec};
use nr_core::render::RenderError;
use nr_core::{Coordinator, ReportConfig, ReportHandle, ReportRenderer};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct SlowRecorder {
    active: AtomicUsize,
    max_active: AtomicUsize,
    sequences: Mutex<Vec<u32>>,
}

impl ReportRenderer for SlowRecorder {
    fn generate(&self, handle: &ReportHandle) -> Result<PathBuf, RenderError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.sequences.lock().unwrap().push(handle.sequence);
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(PathBuf::from(handle.destination.to_string()))
    }
}

fn api_coordinator(renderer: Arc<SlowRecorder>) -> Coordinator {
    let config = ReportConfig {
        events: TriggerSpec::only(TriggerKind::ApiCall),
        filename: Some("stderr".to_string()),
        ..ReportConfig::default()
    };
    let coordinator = Coordinator::new(config, renderer);
    assert!(coordinator.start().is_clean());
    coordinator
}

#[test]
fn simultaneous_requests_render_one_at_a_time() {
    let renderer = Arc::new(SlowRecorder::default());
    let coordinator = api_coordinator(Arc::clone(&renderer));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                coordinator.fire_now(None).unwrap()
            })
        })
        .collect();
    let mut produced: Vec<ReportHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    produced.sort_by_key(|h| h.sequence);

    assert_eq!(renderer.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(produced.len(), 2);
    assert_eq!(produced[0].sequence, 1);
    assert_eq!(produced[1].sequence, 2);
    assert_eq!(coordinator.reports().len(), 2);
}

#[test]
fn many_requests_complete_in_sequence_order() {
    let renderer = Arc::new(SlowRecorder::default());
    let coordinator = api_coordinator(Arc::clone(&renderer));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let coordinator = coordinator.clone();
            thread::spawn(move || coordinator.fire_now(None).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Sequence numbers are drawn inside the slot, so render order is sequence order.
    let sequences = renderer.sequences.lock().unwrap().clone();
    assert_eq!(sequences, (1..=6).collect::<Vec<u32>>());
    assert_eq!(renderer.max_active.load(Ordering::SeqCst), 1);
}
