//! Conversion between [`HostValue`]s and Python objects.
//!
//! # Type mappings
//!
//! | Host                  | Python             | Back to host    |
//! |-----------------------|--------------------|-----------------|
//! | `Null`                | `None`             | `Null`          |
//! | `Bool`                | `bool`             | `Bool`          |
//! | `Int` (widened)       | `int`              | `Int`           |
//! | `Float` (widened)     | `float`            | `Float`         |
//! | `Str`                 | `str`              | `Str`           |
//! | `Bytes`               | `bytes`            | `Bytes`         |
//! |                       | `bytearray`        | `Bytes`         |
//! | `Map`                 | `dict`             | `Map`           |
//! | `List`                | `list`             | `List`          |
//! |                       | any other iterable | `List`          |
//! | `Callable`            | built-in function  | (unsupported)   |
//!
//! Every Python handle created here is a [`Bound`], so intermediate objects
//! are released on every exit path, `?` included.

use pyo3::prelude::*;
use pyo3::types::{PyBool, PyByteArray, PyBytes, PyDict, PyFloat, PyList, PyLong, PyString};

use crate::error::{Direction, Error, Result};
use crate::trace::TypeTree;
use crate::value::HostValue;

/// Largest binary payload either direction accepts (32-bit signed length).
pub const MAX_BINARY_LEN: usize = i32::MAX as usize;

fn check_len(len: usize) -> Result<()> {
    if len > MAX_BINARY_LEN {
        return Err(Error::Length { len });
    }
    Ok(())
}

/// `type(obj).__name__`, or `"<unknown>"` if even that fails.
pub(crate) fn type_name(obj: &Bound<'_, PyAny>) -> String {
    obj.get_type()
        .getattr("__name__")
        .and_then(|n| n.extract::<String>())
        .unwrap_or_else(|_| "<unknown>".to_owned())
}

// ── Host → Python ─────────────────────────────────────────────────────────────

/// Convert a host value with a fresh type tree.
pub fn to_py<'py>(py: Python<'py>, value: &HostValue) -> Result<Bound<'py, PyAny>> {
    host_to_py(py, value, &mut TypeTree::new())
}

/// Convert `value` into a new Python object, recording each visited value
/// in `trace`.
pub fn host_to_py<'py>(
    py: Python<'py>,
    value: &HostValue,
    trace: &mut TypeTree,
) -> Result<Bound<'py, PyAny>> {
    match value {
        HostValue::Null => {
            trace.add("Null");
            Ok(py.None().into_bound(py))
        }
        HostValue::Bool(b) => {
            trace.add("Bool");
            Ok(PyBool::new_bound(py, *b).to_owned().into_any())
        }
        HostValue::Int(n) => {
            trace.add("Int");
            Ok((*n).into_py(py).into_bound(py))
        }
        HostValue::Float(x) => {
            trace.add("Float");
            Ok(PyFloat::new_bound(py, *x).into_any())
        }
        HostValue::Str(s) => {
            trace.add("Str");
            Ok(PyString::new_bound(py, s).into_any())
        }
        HostValue::Bytes(b) => {
            trace.add("Bytes");
            check_len(b.len())?;
            Ok(PyBytes::new_bound(py, b).into_any())
        }
        HostValue::Map(entries) => {
            trace.add("Map");
            let dict = PyDict::new_bound(py);
            trace.nested(|trace| -> Result<()> {
                for (k, v) in entries {
                    trace.add("entry");
                    trace.nested(|trace| -> Result<()> {
                        let key = host_to_py(py, k, trace)?;
                        let val = host_to_py(py, v, trace)?;
                        dict.set_item(&key, &val)
                            .map_err(|e| trace.fail(Direction::HostToPy, e.to_string()))
                    })?;
                }
                Ok(())
            })?;
            Ok(dict.into_any())
        }
        HostValue::List(items) => {
            trace.add("List");
            let list = PyList::empty_bound(py);
            trace.nested(|trace| -> Result<()> {
                for item in items {
                    let obj = host_to_py(py, item, trace)?;
                    list.append(obj)
                        .map_err(|e| trace.fail(Direction::HostToPy, e.to_string()))?;
                }
                Ok(())
            })?;
            Ok(list.into_any())
        }
        #[cfg(feature = "callable")]
        HostValue::Callable(f) => {
            trace.add("Callable");
            crate::bridge::wrap(py, f.clone())
                .map(Bound::into_any)
                .map_err(|e| trace.fail(Direction::HostToPy, e.to_string()))
        }
        #[cfg(not(feature = "callable"))]
        HostValue::Callable(_) => Err(trace.unsupported(
            Direction::HostToPy,
            "Callable",
            Some("<callable> (built without the `callable` feature)".to_owned()),
        )),
        HostValue::Opaque(o) => {
            Err(trace.unsupported(Direction::HostToPy, &o.type_name, Some(o.display.clone())))
        }
    }
}

// ── Python → Host ─────────────────────────────────────────────────────────────

/// Convert a Python object with a fresh type tree.
pub fn to_host(obj: &Bound<'_, PyAny>) -> Result<HostValue> {
    py_to_host(obj, &mut TypeTree::new())
}

/// Convert a Python object into a host value, recording each visited object
/// in `trace`.
///
/// Checks run in a fixed order; `bool` must come before `int` since it is a
/// subclass of it.
pub fn py_to_host(obj: &Bound<'_, PyAny>, trace: &mut TypeTree) -> Result<HostValue> {
    if obj.is_none() {
        trace.add("None");
        return Ok(HostValue::Null);
    }
    if let Ok(b) = obj.downcast::<PyBool>() {
        trace.add("bool");
        return Ok(HostValue::Bool(b.is_true()));
    }
    if obj.is_instance_of::<PyLong>() {
        trace.add("int");
        return obj
            .extract::<i64>()
            .map(HostValue::Int)
            .map_err(|e| trace.fail(Direction::PyToHost, format!("int out of 64-bit range: {e}")));
    }
    if let Ok(f) = obj.downcast::<PyFloat>() {
        trace.add("float");
        return Ok(HostValue::Float(f.value()));
    }
    if obj.is_instance_of::<PyString>() {
        trace.add("str");
        return obj
            .extract::<String>()
            .map(HostValue::Str)
            .map_err(|e| trace.fail(Direction::PyToHost, e.to_string()));
    }
    if let Ok(b) = obj.downcast::<PyBytes>() {
        trace.add("bytes");
        let bytes = b.as_bytes();
        check_len(bytes.len())?;
        return Ok(HostValue::Bytes(bytes.to_vec()));
    }
    if let Ok(b) = obj.downcast::<PyByteArray>() {
        trace.add("bytearray");
        check_len(b.len())?;
        return Ok(HostValue::Bytes(b.to_vec()));
    }
    if let Ok(dict) = obj.downcast::<PyDict>() {
        trace.add("dict");
        // Converting an entry can run Python code that resizes the dict, so
        // walk a snapshot of the items rather than the live dict.
        let items = dict.items();
        return trace.nested(|trace| {
            let mut entries = Vec::with_capacity(items.len());
            for item in items.iter() {
                trace.add("item");
                let entry = trace.nested(|trace| -> Result<_> {
                    let (k, v) = item
                        .extract::<(Bound<'_, PyAny>, Bound<'_, PyAny>)>()
                        .map_err(|e| trace.fail(Direction::PyToHost, e.to_string()))?;
                    Ok((py_to_host(&k, trace)?, py_to_host(&v, trace)?))
                })?;
                entries.push(entry);
            }
            Ok(HostValue::Map(entries))
        });
    }
    if let Ok(iter) = obj.iter() {
        trace.add(format!("iterable({})", type_name(obj)));
        return trace.nested(|trace| {
            let mut items = Vec::new();
            for item in iter {
                let item = item.map_err(|e| {
                    trace.fail(Direction::PyToHost, format!("iteration failed: {e}"))
                })?;
                items.push(py_to_host(&item, trace)?);
            }
            Ok(HostValue::List(items))
        });
    }

    let rendering = obj.str().ok().map(|s| s.to_string_lossy().into_owned());
    Err(trace.unsupported(Direction::PyToHost, &type_name(obj), rendering))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn py_eval<'py>(py: Python<'py>, expr: &str) -> Bound<'py, PyAny> {
        py.eval_bound(expr, None, None).unwrap()
    }

    fn roundtrip(v: &HostValue) -> HostValue {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| to_host(&to_py(py, v).unwrap()).unwrap())
    }

    #[test]
    fn primitives_roundtrip() {
        for v in [
            HostValue::Null,
            HostValue::Bool(true),
            HostValue::Bool(false),
            HostValue::Int(i64::MIN),
            HostValue::Int(i64::MAX),
            HostValue::Float(-0.25),
            HostValue::Str("héllo wörld ✓".into()),
            HostValue::Bytes(vec![0, 1, 255]),
        ] {
            assert_eq!(roundtrip(&v), v);
        }
    }

    #[test]
    fn map_key_order_survives() {
        let v = HostValue::map([("a", 1), ("b", 2), ("c", 3)]);
        let back = roundtrip(&v);
        let keys: Vec<_> = back.as_map().unwrap().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![HostValue::from("a"), "b".into(), "c".into()]);
        assert_eq!(back, v);
    }

    #[test]
    fn nested_list_roundtrips() {
        let v = HostValue::list([
            HostValue::from(1),
            HostValue::list(["x", "y"]),
            HostValue::map([(1, HostValue::Null)]),
        ]);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn python_types_map_to_host() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            assert_eq!(to_host(&py_eval(py, "bytearray(b'ab')")).unwrap(), HostValue::Bytes(b"ab".to_vec()));
            assert_eq!(to_host(&py_eval(py, "(1, 2)")).unwrap(), HostValue::list([1, 2]));
            assert_eq!(to_host(&py_eval(py, "range(3)")).unwrap(), HostValue::list([0, 1, 2]));
            assert_eq!(to_host(&py_eval(py, "True")).unwrap(), HostValue::Bool(true));
            assert_eq!(to_host(&py_eval(py, "2.0")).unwrap(), HostValue::Float(2.0));
        });
    }

    #[test]
    fn unsupported_host_value_reports_nested_trace() {
        #[derive(Debug)]
        struct Widget;
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let v = HostValue::list([HostValue::from(1), HostValue::opaque(&Widget)]);
            let err = to_py(py, &v).unwrap_err();
            let msg = err.to_string();
            assert!(matches!(err, Error::Conversion { direction: Direction::HostToPy, .. }));
            assert!(msg.contains("\n  List\n    Int\n    "), "{msg}");
            assert!(msg.contains("Widget  <- unsupported"), "{msg}");
        });
    }

    #[test]
    fn unhashable_key_is_conversion_error() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let v = HostValue::Map(vec![(HostValue::list([1]), HostValue::Null)]);
            let err = to_py(py, &v).unwrap_err();
            assert!(err.to_string().contains("unhashable"), "{err}");
        });
    }

    #[test]
    fn big_int_is_conversion_error() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let err = to_host(&py_eval(py, "2 ** 70")).unwrap_err();
            assert!(matches!(err, Error::Conversion { direction: Direction::PyToHost, .. }));
        });
    }

    #[test]
    fn non_iterable_object_is_unsupported_with_rendering() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let err = to_host(&py_eval(py, "[1, 1j]")).unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("  iterable(list)\n    int\n    complex  <- unsupported"), "{msg}");
            assert!(msg.contains("value = 1j"), "{msg}");
        });
    }

    #[test]
    fn dict_resized_during_conversion_is_converted_once() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let globals = PyDict::new_bound(py);
            py.run_bound(
                "class Grower:\n    def __iter__(self):\n        d['z'] = 1\n        return iter([])\nd = {'a': Grower()}",
                Some(&globals),
                None,
            )
            .unwrap();
            let d = globals.get_item("d").unwrap().unwrap();
            let v = to_host(&d).unwrap();
            assert_eq!(v, HostValue::map([("a", HostValue::List(vec![]))]));
            assert_eq!(d.len().unwrap(), 2);
        });
    }

    #[test]
    fn binary_length_limit() {
        assert!(check_len(MAX_BINARY_LEN).is_ok());
        assert!(matches!(
            check_len(MAX_BINARY_LEN + 1),
            Err(Error::Length { len }) if len == MAX_BINARY_LEN + 1
        ));
    }

    #[test]
    fn failing_iterator_is_conversion_error() {
        pyo3::prepare_freethreaded_python();
        Python::with_gil(|py| {
            let obj = py_eval(py, "(1 // x for x in [1, 0])");
            let err = to_host(&obj).unwrap_err();
            assert!(err.to_string().contains("ZeroDivisionError"), "{err}");
        });
    }
}
