use petek_list::{HashSet, OrderedList};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::thread;

#[test]
fn test_list_shuffled_inserts_stay_sorted() {
    let mut values: Vec<u32> = (0..500).collect();
    values.shuffle(&mut rand::thread_rng());

    let l = OrderedList::new();
    for v in &values {
        assert!(l.insert(*v));
    }
    // Sorted order is observable through front().
    assert_eq!(l.front(), Some(0));
    for v in 0..500 {
        assert_eq!(l.front(), Some(v));
        assert!(l.remove(&v));
    }
    assert!(l.is_empty());
}

#[test]
fn test_list_duplicate_rejection() {
    let l = OrderedList::new();
    assert!(l.insert(3));
    assert!(!l.insert(3));
    assert!(l.contains(&3));
    assert!(l.remove(&3));
    assert!(!l.contains(&3));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_list_concurrent_insert_then_remove_own() {
    // Four threads each insert 1000 distinct values, then each removes its
    // own set; every remove must succeed and the list must end empty.
    const THREADS: usize = 4;
    const PER_THREAD: usize = 1000;
    let l = Arc::new(OrderedList::new());
    let mut handles = vec![];

    for t in 0..THREADS {
        let l = l.clone();
        handles.push(thread::spawn(move || {
            let base = t * PER_THREAD;
            for i in 0..PER_THREAD {
                assert!(l.insert(base + i));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(l.len(), THREADS * PER_THREAD);

    let mut handles = vec![];
    for t in 0..THREADS {
        let l = l.clone();
        handles.push(thread::spawn(move || {
            let base = t * PER_THREAD;
            for i in 0..PER_THREAD {
                assert!(l.remove(&(base + i)), "remove of own {} failed", base + i);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(l.is_empty());
    assert_eq!(l.len(), 0);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_list_mixed_interleaving_net_result() {
    // Concurrent inserts and removes over a shared key space; afterwards a
    // single-threaded sweep must agree with a sequential replay: a key is
    // present iff its inserts outnumber its removes net of rejections.
    // Simplest checkable variant: every thread inserts the whole range,
    // then every thread removes the whole range. Net: empty, and each
    // value was inserted exactly once (first-write-wins).
    const THREADS: usize = 4;
    const RANGE: usize = 500;
    let l = Arc::new(OrderedList::new());

    let mut handles = vec![];
    let inserted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    for _ in 0..THREADS {
        let l = l.clone();
        let inserted = inserted.clone();
        handles.push(thread::spawn(move || {
            for i in 0..RANGE {
                if l.insert(i) {
                    inserted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    // Duplicates collapse: the range is present exactly once.
    assert_eq!(inserted.load(std::sync::atomic::Ordering::Relaxed), RANGE);
    assert_eq!(l.len(), RANGE);

    let removed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut handles = vec![];
    for _ in 0..THREADS {
        let l = l.clone();
        let removed = removed.clone();
        handles.push(thread::spawn(move || {
            for i in 0..RANGE {
                if l.remove(&i) {
                    removed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(removed.load(std::sync::atomic::Ordering::Relaxed), RANGE);
    assert!(l.is_empty());
}

#[test]
fn test_set_basic() {
    let s = HashSet::new();
    assert!(s.insert(1u64));
    assert!(s.insert(2));
    assert!(!s.insert(1));
    assert!(s.contains(&1));
    assert!(s.remove(&1));
    assert!(!s.contains(&1));
    assert!(s.contains(&2));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_set_concurrent_disjoint() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 2000;
    let s = Arc::new(HashSet::with_capacity_and_load_factor(256, 0.75));
    let mut handles = vec![];

    for t in 0..THREADS {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            let base = (t * PER_THREAD) as u64;
            for i in 0..PER_THREAD as u64 {
                assert!(s.insert(base + i));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(s.len(), THREADS * PER_THREAD);

    let mut handles = vec![];
    for t in 0..THREADS {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            let base = (t * PER_THREAD) as u64;
            for i in 0..PER_THREAD as u64 {
                assert!(s.contains(&(base + i)));
                assert!(s.remove(&(base + i)));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(s.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_set_contended_same_keys() {
    // All threads fight over the same small key space; the survivor count
    // per key must be 0 or 1 depending on the last winning operation, and
    // insert/remove accounting must balance.
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;
    const KEYS: u64 = 32;
    let s = Arc::new(HashSet::with_capacity_and_load_factor(64, 0.75));
    let mut handles = vec![];

    for t in 0..THREADS {
        let s = s.clone();
        handles.push(thread::spawn(move || {
            for r in 0..ROUNDS {
                let k = ((t + r) as u64) % KEYS;
                if (t + r) % 2 == 0 {
                    s.insert(k);
                } else {
                    s.remove(&k);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Whatever survived must be a subset of the key space, each present
    // exactly once.
    for k in 0..KEYS {
        if s.contains(&k) {
            assert!(!s.insert(k), "duplicate of {} survived", k);
            assert!(s.remove(&k));
            assert!(!s.contains(&k));
        }
    }
    petek::flush();
}
