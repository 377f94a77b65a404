//! Deque demo: FIFO and LIFO usage from both ends, then concurrent
//! pressure with mixed end selection.

use petek_deque::Deque;
use std::sync::Arc;
use std::thread;

fn main() {
    let deque = Deque::new();

    deque.push_right(1);
    deque.push_right(2);
    deque.push_left(0);
    assert_eq!(deque.peek_left(), Some(0));
    assert_eq!(deque.peek_right(), Some(2));
    assert_eq!(deque.pop_left(), Some(0));
    assert_eq!(deque.pop_right(), Some(2));
    assert_eq!(deque.pop_left(), Some(1));
    assert!(deque.is_empty());
    println!("single-threaded ends ok");

    let deque = Arc::new(Deque::new());
    let mut handles = vec![];
    for t in 0..4 {
        let deque = deque.clone();
        handles.push(thread::spawn(move || {
            for i in 0..25_000u64 {
                match (t + i as usize) % 4 {
                    0 => deque.push_left(i),
                    1 => deque.push_right(i),
                    2 => {
                        deque.pop_left();
                    }
                    _ => {
                        deque.pop_right();
                    }
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    println!("4 threads x 25000 mixed-end ops ok, {} left over", deque.len());
}
