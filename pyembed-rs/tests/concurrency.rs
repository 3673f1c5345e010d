//! Calls from many threads are serialized by the session lock.

use std::thread;

use pyembed::{HostValue, Session};

const THREADS: i64 = 8;
const ROUNDS: i64 = 50;

#[test]
fn threads_put_and_get_their_own_names() {
    let py = Session::initialize().expect("python session");
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let py = py.clone();
            thread::spawn(move || {
                let name = format!("worker_{t}");
                for round in 0..ROUNDS {
                    py.put(&name, t * 1000 + round).unwrap();
                    assert_eq!(py.get(&name).unwrap(), HostValue::Int(t * 1000 + round));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for t in 0..THREADS {
        assert_eq!(py.get(&format!("worker_{t}")).unwrap(), HostValue::Int(t * 1000 + ROUNDS - 1));
    }
}

#[test]
fn concurrent_exec_output_is_not_interleaved() {
    let py = Session::initialize().expect("python session");
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let py = py.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let out = py.exec(&format!("print('thread-{t}')")).unwrap();
                    assert_eq!(out, format!("thread-{t}\n"));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn read_modify_write_inside_one_exec_is_atomic() {
    let py = Session::initialize().expect("python session");
    py.put("shared_counter", 0).unwrap();
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let py = py.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    py.exec("shared_counter = shared_counter + 1").unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(py.get("shared_counter").unwrap(), HostValue::Int(THREADS * ROUNDS));
}
