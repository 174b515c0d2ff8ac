//! Log tailing windows.

use proptest::prelude::*;
use snapsync_core::{LogTailer, TailWindow};
use snapsync_storage::{StorageEngine, Tick};
use snapsync_testkit::prelude::*;

#[test]
fn bounded_window_reports_more() {
    let fixture = log_of_len(10);
    let tailer = LogTailer::new(fixture.engine.as_ref(), 256);

    let batch = tailer
        .tail(&TailWindow::new(TEST_DATABASE).with_range(Tick::new(1), Tick::new(5)))
        .unwrap();
    let ticks: Vec<u64> = batch.markers.iter().map(|m| m.tick).collect();
    assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    assert_eq!(batch.last_included, Tick::new(5));
    assert!(batch.check_more);

    let batch = tailer
        .tail(&TailWindow::new(TEST_DATABASE).with_range(Tick::new(1), Tick::new(100)))
        .unwrap();
    assert_eq!(batch.markers.len(), 10);
    assert_eq!(batch.last_included, Tick::new(10));
    assert!(!batch.check_more);
}

#[test]
fn follower_catches_up_in_budgeted_steps() {
    let fixture = log_of_len(40);
    let tailer = LogTailer::new(fixture.engine.as_ref(), 7);
    let mut from = Tick::new(1);
    let mut seen = Vec::new();
    loop {
        let batch = tailer
            .tail(
                &TailWindow::new(TEST_DATABASE)
                    .with_range(from, Tick::MAX)
                    .with_byte_budget(200),
            )
            .unwrap();
        seen.extend(batch.markers.iter().map(|m| m.tick));
        if !batch.check_more {
            break;
        }
        from = batch.last_scanned.next();
    }
    assert_eq!(seen, (1..=40).collect::<Vec<u64>>());
}

#[test]
fn small_read_batches_match_large_ones() {
    let fixture = log_of_len(25);
    let window = TailWindow::new(TEST_DATABASE).with_range(Tick::new(3), Tick::new(21));
    let small = LogTailer::new(fixture.engine.as_ref(), 2).tail(&window).unwrap();
    let large = LogTailer::new(fixture.engine.as_ref(), 1000).tail(&window).unwrap();
    assert_eq!(small, large);
}

proptest! {
    #[test]
    fn last_included_tracks_emitted(len in 1u64..30, from in 0u64..40, span in 0u64..40) {
        let fixture = log_of_len(len);
        let to = from + span;
        let batch = LogTailer::new(fixture.engine.as_ref(), 4)
            .tail(&TailWindow::new(TEST_DATABASE).with_range(Tick::new(from), Tick::new(to)))
            .unwrap();
        match batch.markers.last() {
            None => prop_assert_eq!(batch.last_included, Tick::ZERO),
            Some(last) => {
                prop_assert_eq!(batch.last_included.as_u64(), last.tick);
                prop_assert!(last.tick <= to);
            }
        }
        prop_assert_eq!(batch.latest, fixture.engine.log().latest_tick());
    }
}
