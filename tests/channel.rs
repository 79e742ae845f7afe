//! Channel conformance: rendezvous, buffering, termination.

#[macro_use]
mod common;

use common::*;
use foldsync::{BufferingPolicy, Cancellable, Channel, Completion, Error, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn blocking_write_then_read_pairs_once() {
    test_phase!("blocking_write_then_read_pairs_once");
    let channel = Channel::new();
    let (written, value) = run_test(|| {
        let writer_side = channel.clone();
        let writer = Cancellable::spawn(async move { writer_side.write("hello", true).await });
        let reader_side = channel.clone();
        async move {
            assert!(wait_until(Duration::from_secs(5), || reader_side.len() == 1));
            let value = reader_side.read(true).await;
            (writer.value().await, value)
        }
    });
    written.expect("writer resumed by the reader");
    assert_eq!(value.expect("read"), "hello");
    assert!(channel.is_empty());
    test_complete!("blocking_write_then_read_pairs_once");
}

#[test]
fn blocking_read_then_write_pairs_once() {
    test_phase!("blocking_read_then_write_pairs_once");
    let channel = Channel::<u64>::new();
    let value = run_test(|| {
        let reader_side = channel.clone();
        let reader = Cancellable::spawn(async move { reader_side.read(true).await });
        let writer_side = channel.clone();
        async move {
            assert!(wait_until(Duration::from_secs(5), || {
                writer_side.waiting_readers() == 1
            }));
            writer_side.write(42, true).await.expect("rendezvous");
            reader.value().await
        }
    });
    assert_eq!(value.expect("read"), 42);
    assert_eq!(channel.waiting_readers(), 0);
    assert!(channel.is_empty());
    test_complete!("blocking_read_then_write_pairs_once");
}

#[test]
fn cancel_resolves_pending_reader_and_writer() {
    test_phase!("cancel_resolves_pending_reader_and_writer");
    let empty = Channel::<u8>::new();
    let full = Channel::<u8>::new();
    let (read, write, drained) = run_test(|| {
        let r = empty.clone();
        let reader = Cancellable::spawn(async move { r.read(true).await });
        let w = full.clone();
        let writer = Cancellable::spawn(async move { w.write(9, true).await });
        let (empty, full) = (empty.clone(), full.clone());
        async move {
            assert!(wait_until(Duration::from_secs(5), || {
                empty.waiting_readers() == 1 && full.len() == 1
            }));
            let none = empty.cancel(Error::cancelled());
            assert!(none.is_empty());
            let drained = full.cancel(Error::cancelled());
            (reader.value().await, writer.value().await, drained)
        }
    });
    assert_eq!(read.expect_err("reader failed").kind(), ErrorKind::Cancelled);
    assert_eq!(write.expect_err("writer failed").kind(), ErrorKind::Cancelled);
    assert_eq!(drained, vec![9]);
    test_complete!("cancel_resolves_pending_reader_and_writer");
}

#[test]
fn oldest_policy_keeps_the_first_values() {
    test_phase!("oldest_policy_keeps_the_first_values");
    let channel = Channel::with_policy(BufferingPolicy::Oldest(3));
    let mut rejected = Vec::new();
    for i in 0..6 {
        if let Err(e) = channel.try_write(i) {
            assert_eq!(e.error().kind(), ErrorKind::ChannelFull);
            rejected.push(e.into_value());
        }
    }
    assert_eq!(rejected, vec![3, 4, 5]);
    let kept: Vec<i32> = std::iter::from_fn(|| channel.try_read().ok()).collect();
    assert_eq!(kept, vec![0, 1, 2]);
    channel.try_write(6).expect("room again");
    test_complete!("oldest_policy_keeps_the_first_values");
}

#[test]
fn close_drains_then_reports_the_completion() {
    test_phase!("close_drains_then_reports_the_completion");
    let channel = Channel::new();
    channel.try_write('a').expect("write");
    channel.try_write('b').expect("write");
    assert!(channel.close(Completion::Failure(Error::user("upstream gone"))));
    assert!(!channel.finish(), "second close is ignored");

    let err = channel.try_write('c').expect_err("closed");
    assert_eq!(err.error().kind(), ErrorKind::User);
    assert_eq!(channel.try_read().expect("buffered"), 'a');
    assert_eq!(channel.try_read().expect("buffered"), 'b');
    assert_eq!(channel.try_read().expect_err("drained").kind(), ErrorKind::User);

    let drained = channel.cancel(Error::cancelled());
    assert!(drained.is_empty());
    let replaced = channel.completion().expect("closed");
    assert_eq!(replaced.failure().map(Error::kind), Some(ErrorKind::Cancelled));
    assert_eq!(channel.try_read().expect_err("cancelled").kind(), ErrorKind::Cancelled);
    test_complete!("close_drains_then_reports_the_completion");
}

#[test]
fn finished_channel_reports_the_done_signal() {
    test_phase!("finished_channel_reports_the_done_signal");
    let channel = Channel::<()>::new();
    assert!(channel.finish());
    let err = run_test(|| {
        let channel = channel.clone();
        async move { channel.read(true).await }
    })
    .expect_err("finished");
    assert!(err.is_finished());
    test_complete!("finished_channel_reports_the_done_signal");
}

#[test]
fn concurrent_blocking_traffic_conserves_values() {
    test_phase!("concurrent_blocking_traffic_conserves_values");
    const PER_WRITER: u64 = 250;
    const WRITERS: u64 = 4;
    let channel = Channel::new();
    let total = run_test(|| {
        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let channel = channel.clone();
                Cancellable::spawn(async move {
                    for i in 0..PER_WRITER {
                        channel.write(w * PER_WRITER + i, true).await?;
                    }
                    Ok(())
                })
            })
            .collect();
        let readers: Vec<_> = (0..WRITERS)
            .map(|_| {
                let channel = channel.clone();
                Cancellable::spawn(async move {
                    let mut sum = 0_u64;
                    for _ in 0..PER_WRITER {
                        sum += channel.read(true).await?;
                    }
                    Ok(sum)
                })
            })
            .collect();
        async move {
            for writer in &writers {
                writer.value().await.expect("writer");
            }
            let mut total = 0;
            for reader in &readers {
                total += reader.value().await.expect("reader");
            }
            total
        }
    });
    let n = WRITERS * PER_WRITER;
    assert_with_log!(total == n * (n - 1) / 2, "sum of values", n * (n - 1) / 2, total);
    assert!(channel.is_empty());
    test_complete!("concurrent_blocking_traffic_conserves_values");
}

#[test]
fn shared_channel_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Channel<Box<dyn FnOnce() + Send>>>();
    assert_send_sync::<Arc<Channel<String>>>();
}
