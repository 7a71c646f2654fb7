//! Property tests for the record store, cursors and chunk serializer

use fieldnode_core::aggregator::{AveragingWindows, SampleAggregator};
use fieldnode_core::format::CsvFormat;
use fieldnode_core::serializer::{ChunkSerializer, PLACEHOLDER};
use fieldnode_core::{Capacity, Cursor, Record, RecordStore};
use proptest::prelude::*;

fn filled(capacity: usize, count: u32) -> RecordStore<Record> {
    let mut store = RecordStore::new(Capacity::fixed(capacity).unwrap());
    for t in 0..count {
        store.append(Record::new(t * 10, &[t as i32, -(t as i32)]).unwrap());
    }
    store
}

proptest! {
    #[test]
    fn fixed_store_keeps_newest(capacity in 1usize..20, count in 0u32..60) {
        let store = filled(capacity, count);
        let expected = (count as usize).min(capacity);
        prop_assert_eq!(store.size(), expected);

        let first = count - expected as u32;
        let timestamps: Vec<u32> = store.iter().map(Record::timestamp).collect();
        let wanted: Vec<u32> = (first..count).map(|t| t * 10).collect();
        prop_assert_eq!(timestamps, wanted);
    }

    #[test]
    fn oldest_first_traversal_visits_each_once(capacity in 1usize..20, count in 0u32..60) {
        let store = filled(capacity, count);
        let mut cursor = Cursor::oldest_first();
        store.reset_cursor(&mut cursor);

        let mut seen = Vec::new();
        while let Some(record) = store.current(&cursor) {
            seen.push(record.timestamp());
            store.advance(&mut cursor);
        }
        prop_assert_eq!(seen.len(), store.size());
        prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn cursor_survives_appends_until_evicted(capacity in 1usize..10, offset in 0usize..10, extra in 0usize..20) {
        let mut store = filled(capacity, capacity as u32);
        prop_assume!(offset < capacity);

        let cursor = store.cursor_at(offset, false);
        let target = store.current(&cursor).map(Record::timestamp);
        for t in 0..extra {
            store.append(Record::new(1_000 + t as u32, &[0, 0]).unwrap());
        }

        match store.current(&cursor) {
            Some(record) => {
                prop_assert!(extra <= offset);
                prop_assert_eq!(Some(record.timestamp()), target);
            }
            None => prop_assert!(extra > offset),
        }
    }

    #[test]
    fn serializer_makes_progress_and_keeps_lines_whole(
        count in 1u32..30,
        sizes in proptest::collection::vec(1usize..64, 1..16),
    ) {
        let store = filled(32, count);
        let mut serializer = ChunkSerializer::new(CsvFormat::new(u8::MAX));
        let mut cursor = store.cursor_at(0, false);

        let mut body = Vec::new();
        let mut calls = 0;
        // longest line is "29,-29;\n", so every padded buffer holds a line
        for size in sizes.iter().cycle().map(|s| s + 8) {
            let valid = store.current(&cursor).is_some();
            let mut buf = vec![0u8; size];
            let n = serializer.fill(&store, &mut cursor, &mut buf);
            if valid {
                prop_assert!(n > 0);
            }
            if n == 0 {
                break;
            }
            prop_assert!((n == 1 && buf[0] == PLACEHOLDER) || buf[n - 1] == b'\n');
            body.extend_from_slice(&buf[..n]);
            calls += 1;
            prop_assert!(calls <= 2 * count as usize + 2);
        }

        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        prop_assert_eq!(lines.len(), count as usize);
        for (t, line) in lines.iter().enumerate() {
            prop_assert_eq!(*line, format!("{},{};", t, -(t as i32)));
        }
    }

    #[test]
    fn constant_samples_average_to_themselves(window in 1u32..50, value in any::<i32>()) {
        let windows = AveragingWindows { normal: window, calibration: window };
        let mut aggregator = SampleAggregator::new(2, windows).unwrap();
        let mut emitted = Vec::new();
        for t in 0..window {
            if let Some(cycle) = aggregator.add_sample(t, &[value, value / 2]).unwrap() {
                emitted.push(cycle.record);
            }
        }
        prop_assert_eq!(emitted.len(), 1);
        prop_assert_eq!(emitted[0].channels(), &[value, value / 2][..]);
    }
}
