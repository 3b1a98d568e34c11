//! Offset continuity and stream delivery across the sink and the buffer.

use persisting_codec::Record;
use persisting_core::{Config, PartitionBackend, QueueBackend, StreamOptions};
use persisting_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[test]
fn get_spans_sink_then_buffer_without_gaps() {
    let partition = TestPartition::with_config(Config::default().batch_size(1000));
    let expected = id_records(25);
    partition.put_batch(expected[..10].to_vec()).unwrap();
    partition.flush().unwrap();
    partition.put_batch(expected[10..17].to_vec()).unwrap();
    partition.flush().unwrap();
    partition.put_batch(expected[17..].to_vec()).unwrap();

    assert_eq!(partition.persisted_count(), 17);
    let total = partition.total_count();
    assert_eq!(total, 25);
    assert_eq!(partition.get(0, total as usize).unwrap(), expected);

    // Windows straddling the sink/buffer boundary.
    for offset in 0..25u64 {
        let got = partition.get(offset, 5).unwrap();
        let end = (offset as usize + 5).min(25);
        assert_eq!(got, expected[offset as usize..end].to_vec(), "offset {offset}");
    }
}

#[test]
fn snapshot_stream_reads_everything_in_chunks() {
    let partition = TestPartition::with_config(Config::default().batch_size(120));
    let expected = id_records(350);
    for record in expected.iter().cloned() {
        partition.put(record).unwrap();
    }
    assert!(partition.persisted_count() > 0);
    assert!(partition.buffer_count() > 0);

    let streamed: Vec<Record> = partition
        .get_stream(0, StreamOptions::snapshot())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(streamed, expected);

    let tail: Vec<Record> = partition
        .get_stream(340, StreamOptions::snapshot())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(tail, expected[340..].to_vec());

    let limited = partition.get_stream(5, StreamOptions::snapshot().limit(3));
    assert_eq!(ids(&limited.map(Result::unwrap).collect::<Vec<_>>()), vec!["5", "6", "7"]);
}

#[test]
fn blocking_stream_yields_each_new_record_then_waits() {
    let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
    backend.put_batch(id_records(2)).unwrap();

    let start = backend.total_count();
    let stream = backend.get_stream(start, StreamOptions::blocking());
    let (tx, rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        for record in stream {
            if tx.send(record.unwrap()).is_err() {
                break;
            }
        }
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    backend.put(id_record("a")).unwrap();
    let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(got, id_record("a"));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    backend.put(id_record("b")).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), id_record("b"));

    backend.close().unwrap();
    reader.join().unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn blocking_stream_follows_flushes() {
    let partition = TestPartition::with_config(Config::default().batch_size(3));
    let stream = partition.get_stream(0, StreamOptions::blocking().limit(7));
    let writer = partition.backend().clone();

    let handle = thread::spawn(move || {
        for record in id_records(7) {
            writer.put(record).unwrap();
            thread::sleep(Duration::from_millis(2));
        }
    });

    let got: Vec<Record> = stream.map(Result::unwrap).collect();
    handle.join().unwrap();
    assert_eq!(got, id_records(7));
    assert_eq!(partition.persisted_count(), 6);
}

#[test]
fn concurrent_writers_keep_per_writer_order() {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 200;

    let backend =
        PartitionBackend::memory("b1", Config::default().batch_size(50)).unwrap();
    let stream = backend.get_stream(
        0,
        StreamOptions::blocking()
            .limit(WRITERS * PER_WRITER)
            .timeout(Duration::from_secs(10)),
    );

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let backend = backend.clone();
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    let record = Record::new().with("w", w as i64).with("i", i as i64);
                    backend.put(record).unwrap();
                }
            })
        })
        .collect();

    let got: Vec<Record> = stream.map(Result::unwrap).collect();
    for writer in writers {
        writer.join().unwrap();
    }
    assert_eq!(got.len(), WRITERS * PER_WRITER);
    assert_eq!(backend.get(0, WRITERS * PER_WRITER).unwrap(), got);

    for w in 0..WRITERS as i64 {
        let sequence: Vec<i64> = got
            .iter()
            .filter(|r| r.get("w").and_then(|v| v.as_integer()) == Some(w))
            .filter_map(|r| r.get("i").and_then(|v| v.as_integer()))
            .collect();
        assert_eq!(sequence, (0..PER_WRITER as i64).collect::<Vec<_>>());
    }
}

#[test]
fn dropping_a_stream_does_not_block_writers() {
    let backend = PartitionBackend::memory("b1", Config::default()).unwrap();
    backend.put_batch(id_records(150)).unwrap();
    {
        let mut stream = backend.get_stream(0, StreamOptions::snapshot());
        stream.next().unwrap().unwrap();
    }
    backend.put(id_record("after")).unwrap();
    assert_eq!(backend.total_count(), 151);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn offsets_are_continuous_under_any_flush_pattern(
        steps in prop::collection::vec((record_batch_strategy(8), any::<bool>()), 1..12)
    ) {
        let partition = TestPartition::with_config(Config::default().batch_size(1000));
        let mut expected = Vec::new();
        for (batch, flush) in steps {
            expected.extend(batch.iter().cloned());
            partition.put_batch(batch).unwrap();
            if flush {
                partition.flush().unwrap();
            }
        }

        prop_assert_eq!(partition.total_count(), expected.len() as u64);
        prop_assert_eq!(&partition.get(0, expected.len()).unwrap(), &expected);
    }
}
