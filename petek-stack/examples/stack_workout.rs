//! Stack workout: single-threaded sanity, then concurrent mixed load on
//! both stack flavors.

use petek_stack::{EliminationStack, Stack};
use std::sync::Arc;
use std::thread;

fn main() {
    println!("Treiber stack");
    println!("=============\n");

    {
        let stack = Stack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        println!("single-threaded push/pop ok");
    }

    {
        let stack = Arc::new(Stack::new());
        let mut handles = vec![];
        for thread_id in 0..4 {
            let stack = stack.clone();
            handles.push(thread::spawn(move || {
                for i in 0..10_000 {
                    if i % 2 == 0 {
                        stack.push(thread_id * 10_000 + i);
                    } else {
                        stack.pop();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        println!("4 threads x 10000 mixed ops ok");
    }

    println!("\nElimination stack");
    println!("=================\n");

    {
        let stack = Arc::new(EliminationStack::new());
        let start = std::time::Instant::now();
        let mut handles = vec![];
        for thread_id in 0..8 {
            let stack = stack.clone();
            handles.push(thread::spawn(move || {
                for i in 0..20_000 {
                    if i % 2 == 0 {
                        stack.push(thread_id * 20_000 + i);
                    } else {
                        stack.pop();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let elapsed = start.elapsed();
        let total_ops = 8 * 20_000;
        println!(
            "{} symmetric ops in {:?} ({:.0} ops/sec)",
            total_ops,
            elapsed,
            total_ops as f64 / elapsed.as_secs_f64()
        );
    }

    println!("\ndone");
}
