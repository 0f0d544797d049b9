//! Ordering tests: submissions from one producer are replayed in
//! submission order, under contention and backpressure.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gxm_renderer::{
    BackendKind, Executor, FeatureFlags, GxmContext, Queue, RecordingBackend, Renderer,
    ShaderCache, ShaderStore, ShaderTranslator, TranslateError, Translation,
};

struct UnusedTranslator;

impl ShaderTranslator for UnusedTranslator {
    fn translate(
        &self,
        _program: &[u8],
        _identifier: &str,
        _features: FeatureFlags,
        _debug: bool,
    ) -> Result<Translation, TranslateError> {
        Err(TranslateError("no translation in this test".to_owned()))
    }
}

#[test]
fn queue_preserves_per_producer_order_under_contention() {
    const PRODUCERS: usize = 4;
    const ITEMS: usize = 25;

    // Deliberately tiny so producers spend most of the test blocked.
    let queue = Arc::new(Queue::new(2));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for seq in 0..ITEMS {
                    queue.push((p, seq)).expect("queue open");
                }
            })
        })
        .collect();

    let mut next_expected = [0usize; PRODUCERS];
    let mut popped = 0;
    while popped < PRODUCERS * ITEMS {
        let Some((p, seq)) = queue.pop(Duration::from_millis(100)) else {
            panic!("queue ran dry with {popped} of {} items", PRODUCERS * ITEMS);
        };
        assert_eq!(seq, next_expected[p], "producer {p} items arrived out of order");
        next_expected[p] += 1;
        popped += 1;
    }

    for producer in producers {
        producer.join().expect("producer thread");
    }
    assert!(queue.is_empty());
}

#[test]
fn lists_from_one_context_dispatch_in_submission_order() {
    const PRODUCERS: u32 = 3;
    const LISTS: u32 = 5;

    let renderer = Arc::new(Renderer::new(BackendKind::OpenGl, FeatureFlags::default()));
    let backend = RecordingBackend::new();
    let log = backend.log_handle();
    let tmp = tempfile::tempdir().expect("tempdir");
    let mut executor = Executor::new(
        Box::new(backend),
        ShaderCache::new(Box::new(UnusedTranslator), ShaderStore::new(tmp.path(), "TEST00000")),
    );

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let renderer = Arc::clone(&renderer);
            std::thread::spawn(move || {
                let mut ctx = GxmContext::new(renderer);
                for seq in 0..LISTS {
                    // Encode the producer and sequence number into the width
                    // so the backend log identifies both.
                    ctx.set_point_line_width(true, p * 100 + seq);
                    ctx.flush().expect("renderer open");
                }
            })
        })
        .collect();

    let expected_total = (PRODUCERS * LISTS) as usize;
    while entries(&log).len() < expected_total {
        executor.process_batches(&renderer);
    }
    for producer in producers {
        producer.join().expect("producer thread");
    }

    let entries = entries(&log);
    assert_eq!(entries.len(), expected_total);

    let mut next_seq = [0u32; PRODUCERS as usize];
    for entry in &entries {
        let width: u32 = entry
            .strip_prefix("set_point_line_width(true, ")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|n| n.parse().ok())
            .unwrap_or_else(|| panic!("unexpected backend call: {entry}"));
        let (p, seq) = (width / 100, width % 100);
        assert_eq!(
            seq, next_seq[p as usize],
            "producer {p} lists dispatched out of submission order"
        );
        next_seq[p as usize] += 1;
    }
    for (p, seq) in next_seq.iter().enumerate() {
        assert_eq!(*seq, LISTS, "producer {p} lists went missing");
    }
}

fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().expect("log lock").clone()
}
