//! Host closures exposed to Python.
#![cfg(feature = "callable")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pyembed::{Error, HostValue, Session};

fn session() -> Session {
    Session::initialize().expect("python session")
}

#[test]
fn python_calls_host_closure() {
    let py = session();
    let add = HostValue::callable(|args| {
        let sum: i64 = args.iter().filter_map(HostValue::as_int).sum();
        Ok(HostValue::Int(sum))
    });
    py.put("host_add", add).unwrap();
    assert_eq!(py.eval("host_add(1, 2, 39)").unwrap(), HostValue::Int(42));
    assert_eq!(py.exec("print(host_add(2, 3))").unwrap(), "5\n");
}

#[test]
fn closure_is_called_once_per_python_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let py = session();
    py.put(
        "host_tick",
        HostValue::callable(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HostValue::Null)
        }),
    )
    .unwrap();
    py.exec("for _ in range(3):\n    host_tick()\n").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn closure_error_surfaces_as_python_exception() {
    let py = session();
    py.put("host_fail", HostValue::callable(|_| Err("disk on fire".into()))).unwrap();
    let err = py.exec("host_fail()").unwrap_err();
    let text = err.diagnostic().unwrap();
    assert!(matches!(err, Error::Execution { .. }));
    assert!(text.contains("RuntimeError"), "{text}");
    assert!(text.contains("disk on fire"), "{text}");
}

#[test]
fn python_can_catch_closure_error() {
    let py = session();
    py.put("host_refuse", HostValue::callable(|_| Err("refused".into()))).unwrap();
    py.exec(
        "try:\n    host_refuse()\n    caught_msg = None\nexcept RuntimeError as e:\n    caught_msg = str(e)\n",
    )
    .unwrap();
    let msg = py.get("caught_msg").unwrap();
    assert!(msg.as_str().unwrap().contains("refused"), "{msg:?}");
}

#[test]
fn keyword_arguments_are_rejected() {
    let py = session();
    py.put("host_noop", HostValue::callable(|_| Ok(HostValue::Null))).unwrap();
    let err = py.eval("host_noop(x=1)").unwrap_err();
    assert!(matches!(&err, Error::Eval { diagnostic, .. } if diagnostic.contains("TypeError")), "{err:?}");
}

#[test]
fn closure_reenters_session() {
    let py = session();
    let inner = py.clone();
    py.put("reenter_base", 40).unwrap();
    py.put(
        "host_reenter",
        HostValue::callable(move |args| {
            let base = inner.get("reenter_base")?;
            let bump = args.first().and_then(HostValue::as_int).unwrap_or(0);
            inner.put("reenter_seen", bump)?;
            Ok(HostValue::Int(base.as_int().unwrap_or(0) + bump))
        }),
    )
    .unwrap();
    assert_eq!(py.eval("host_reenter(2)").unwrap(), HostValue::Int(42));
    assert_eq!(py.get("reenter_seen").unwrap(), HostValue::Int(2));
}

#[test]
fn python_callable_read_back_is_unsupported() {
    let py = session();
    py.put("host_roundtrip", HostValue::callable(|_| Ok(HostValue::Null))).unwrap();
    let err = py.get("host_roundtrip").unwrap_err();
    assert!(err.to_string().contains("<- unsupported"), "{err}");
}

#[test]
fn nested_exec_keeps_outer_output() {
    let py = session();
    let inner = py.clone();
    py.put(
        "host_nested",
        HostValue::callable(move |_| Ok(HostValue::Str(inner.exec("print('inner')")?))),
    )
    .unwrap();
    let out = py.exec("print('before')\nnested_out = host_nested()\nprint('after')").unwrap();
    assert_eq!(out, "before\nafter\n");
    assert_eq!(py.get("nested_out").unwrap(), HostValue::from("inner\n"));
}

#[test]
fn failing_nested_exec_keeps_outer_output() {
    let py = session();
    let inner = py.clone();
    py.put(
        "host_nested_fail",
        HostValue::callable(move |_| {
            let err = inner.exec("raise ValueError('nested-failure')").unwrap_err();
            Ok(HostValue::Str(err.diagnostic().unwrap_or_default().to_owned()))
        }),
    )
    .unwrap();
    let out = py
        .exec("print('before')\nnested_diag = host_nested_fail()\nprint('after')")
        .unwrap();
    assert_eq!(out, "before\nafter\n");
    let diag = py.get("nested_diag").unwrap();
    assert!(diag.as_str().unwrap().contains("nested-failure"), "{diag:?}");
}

#[test]
fn python_thread_callback_waits_for_busy_session() {
    let py = session();
    let inner = py.clone();
    py.put("bg_base", 41).unwrap();
    py.put(
        "host_bg",
        HostValue::callable(move |_| {
            let base = inner.get("bg_base")?.as_int().unwrap_or(0);
            Ok(HostValue::Int(base + 1))
        }),
    )
    .unwrap();
    py.exec(
        "import threading, time\n\
         def bg_run():\n\
         \x20   global bg_result\n\
         \x20   time.sleep(0.2)\n\
         \x20   bg_result = host_bg()\n\
         threading.Thread(target=bg_run, daemon=True).start()\n",
    )
    .unwrap();

    // Holds the session while the Python thread calls back into it.
    let busy = py.clone();
    let holder = thread::spawn(move || busy.exec("import time\ntime.sleep(0.5)").unwrap());

    let deadline = Instant::now() + Duration::from_secs(10);
    let result = loop {
        match py.get("bg_result") {
            Ok(v) => break v,
            Err(Error::NotFound(_)) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(20))
            }
            Err(e) => panic!("callback never completed: {e}"),
        }
    };
    assert_eq!(result, HostValue::Int(42));
    assert_eq!(holder.join().unwrap(), "");
}
