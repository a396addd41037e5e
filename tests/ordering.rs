use lfqueue::Queue;
use std::sync::Arc;
use std::thread;

const PER_PRODUCER: usize = 1000;

#[test]
fn test_sequential_fifo_large() {
    let queue = Queue::new();
    for i in 0..10_000 {
        queue.put(i);
    }
    for i in 0..10_000 {
        assert_eq!(queue.get(), Some(i));
    }
    assert_eq!(queue.get(), None);
}

#[test]
fn test_completed_put_is_dequeued_first() {
    let queue = Arc::new(Queue::new());
    queue.put(0);

    let later = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.put(1))
    };
    later.join().unwrap();

    assert_eq!(queue.get(), Some(0));
    assert_eq!(queue.get(), Some(1));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_cross_producer_ordering() {
    let queue = Arc::new(Queue::new());

    let handles: Vec<_> = [0usize, 1]
        .into_iter()
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let base = p * PER_PRODUCER;
                for i in base..base + PER_PRODUCER {
                    queue.put(i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let drained: Vec<usize> = queue.try_iter().collect();
    assert_eq!(drained.len(), 2 * PER_PRODUCER);

    let mut sorted = drained.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (0..2 * PER_PRODUCER).collect::<Vec<_>>());

    let a: Vec<_> = drained.iter().copied().filter(|v| *v < PER_PRODUCER).collect();
    let b: Vec<_> = drained.iter().copied().filter(|v| *v >= PER_PRODUCER).collect();
    assert!(a.windows(2).all(|w| w[0] < w[1]));
    assert!(b.windows(2).all(|w| w[0] < w[1]));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_consumers_see_each_producer_in_order() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const ITEMS: usize = 5_000;

    let queue = Arc::new(Queue::new());
    let mut producers = vec![];
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(thread::spawn(move || {
            for seq in 0..ITEMS {
                queue.put((p, seq));
            }
        }));
    }

    let mut consumers = vec![];
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut last = [None::<usize>; PRODUCERS];
            let mut taken = 0;
            while taken < PRODUCERS * ITEMS / CONSUMERS {
                match queue.get() {
                    Some((p, seq)) => {
                        // A single consumer never sees one producer go backwards.
                        if let Some(prev) = last[p] {
                            assert!(seq > prev, "producer {p}: {seq} after {prev}");
                        }
                        last[p] = Some(seq);
                        taken += 1;
                    }
                    None => thread::yield_now(),
                }
            }
        }));
    }

    for handle in producers.into_iter().chain(consumers) {
        handle.join().unwrap();
    }
    assert_eq!(queue.get(), None);
    assert_eq!(queue.len(), 0);
}
