//! Argument and result conversion across the engine boundary.
//!
//! # Inbound
//! Caller values are copied into buffers owned by this module
//! ([`StringArray`], [`DoubleArray`]) and only a borrowed C view of them is
//! handed to the engine. The copies are dropped with the call's scope.
//!
//! # Outbound
//! Every result envelope is taken apart the same way:
//!
//! ```text
//! envelope ──► wrap error ptr + payload ptr in release guards
//!          ──► error non-empty?  yes ─► Err(Engine(message))   (guards free both)
//!                                no  ─► copy payload into Rust memory
//!                                       (guards free both)
//! ```
//!
//! The guards call back into the engine's own deallocator, so native memory
//! is never handed to Rust's allocator and is released exactly once whatever
//! path the conversion takes.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use tracing::{debug, trace};

use crate::alignment::Alignment;
use crate::engine::Engine;
use crate::error::{IqTreeError, Result};
use crate::ffi;

/// One element of a caller-provided text sequence.
///
/// Implemented for Rust strings here and for Python objects in the bindings,
/// so the accept-only-text rule lives in one place.
pub trait TextElement {
    /// The element's text, or the name of its type when it is not text.
    fn as_text(&self) -> std::result::Result<Cow<'_, str>, String>;
}

impl TextElement for str {
    fn as_text(&self) -> std::result::Result<Cow<'_, str>, String> {
        Ok(Cow::Borrowed(self))
    }
}

impl TextElement for String {
    fn as_text(&self) -> std::result::Result<Cow<'_, str>, String> {
        Ok(Cow::Borrowed(self.as_str()))
    }
}

impl<T: TextElement + ?Sized> TextElement for &T {
    fn as_text(&self) -> std::result::Result<Cow<'_, str>, String> {
        (**self).as_text()
    }
}

/// Copy every element of a text sequence, failing on the first element
/// that is not text.
pub fn collect_text<I>(arg: &'static str, items: I) -> Result<Vec<String>>
where
    I: IntoIterator,
    I::Item: TextElement,
{
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_text()
                .map(Cow::into_owned)
                .map_err(|kind| IqTreeError::conversion(arg, format!("element {idx} is {kind}, expected str")))
        })
        .collect()
}

/// Copy a single text argument into a NUL-terminated buffer.
pub fn c_string(arg: &'static str, text: &str) -> Result<CString> {
    CString::new(text)
        .map_err(|e| IqTreeError::conversion(arg, format!("interior NUL byte at offset {}", e.nul_position())))
}

/// Owned copies of a text sequence plus the flat pointer array the engine reads.
///
/// Pointers target the heap buffers of the `CString`s, which do not move
/// when the outer vectors do.
#[derive(Debug)]
pub struct StringArray {
    storage: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl StringArray {
    /// Copy every element of `items`, rejecting the whole sequence on the
    /// first element that is not text.
    ///
    /// # Example
    /// ```
    /// # use rust_python_iqtree::marshal::StringArray;
    /// let names = StringArray::new("names", ["human", "chimp"]).unwrap();
    /// assert_eq!(names.len(), 2);
    /// assert_eq!(names.get(1).unwrap().to_str().unwrap(), "chimp");
    /// ```
    pub fn new<I>(arg: &'static str, items: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: TextElement,
    {
        let storage = collect_text(arg, items)?
            .into_iter()
            .enumerate()
            .map(|(idx, text)| {
                CString::new(text)
                    .map_err(|_| IqTreeError::conversion(arg, format!("element {idx} contains an interior NUL byte")))
            })
            .collect::<Result<Vec<_>>>()?;
        let pointers = storage.iter().map(|s| s.as_ptr()).collect();
        Ok(StringArray { storage, pointers })
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&CStr> {
        self.storage.get(idx).map(CString::as_c_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.storage.iter().map(CString::as_c_str)
    }

    /// Borrowed C view. Valid only while `self` is alive and unmodified.
    pub fn as_ffi(&self) -> ffi::StringArray {
        ffi::StringArray {
            strings: self.pointers.as_ptr(),
            length: self.pointers.len(),
        }
    }
}

/// Owned copy of a one-dimensional f64 vector.
///
/// The engine receives a mutable pointer into this copy, never into the
/// caller's buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleArray {
    values: Vec<f64>,
}

impl DoubleArray {
    pub fn new(values: &[f64]) -> Self {
        DoubleArray { values: values.to_vec() }
    }

    /// Copy an array that arrives with an explicit shape, accepting only
    /// one-dimensional input whose element count matches the shape.
    pub fn from_shaped<I>(arg: &'static str, shape: &[usize], values: I) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        if shape.len() != 1 {
            return Err(IqTreeError::conversion(
                arg,
                format!("expected a one-dimensional array, got {} dimensions", shape.len()),
            ));
        }
        let values: Vec<f64> = values.into_iter().collect();
        if values.len() != shape[0] {
            return Err(IqTreeError::conversion(
                arg,
                format!("shape declares {} elements but {} were supplied", shape[0], values.len()),
            ));
        }
        Ok(DoubleArray { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Mutable C view. Valid only while `self` is alive.
    pub fn as_ffi(&mut self) -> ffi::DoubleArray {
        ffi::DoubleArray {
            doubles: self.values.as_mut_ptr(),
            length: self.values.len(),
        }
    }
}

/// Names and sequences of an alignment, marshalled together.
#[derive(Debug)]
pub struct MarshalledAlignment {
    pub names: StringArray,
    pub seqs: StringArray,
}

impl MarshalledAlignment {
    pub fn new(aln: &Alignment) -> Result<Self> {
        Ok(MarshalledAlignment {
            names: StringArray::new("names", aln.names())?,
            seqs: StringArray::new("seqs", aln.seqs())?,
        })
    }
}

/// Native string released through the engine when dropped.
struct NativeString<'e, E: Engine + ?Sized> {
    ptr: *mut c_char,
    engine: &'e E,
}

impl<'e, E: Engine + ?Sized> NativeString<'e, E> {
    fn new(engine: &'e E, ptr: *mut c_char) -> Self {
        NativeString { ptr, engine }
    }

    fn c_str(&self) -> Option<&CStr> {
        if self.ptr.is_null() {
            return None;
        }
        // SAFETY: non-null pointers in an envelope are NUL-terminated strings
        // owned by the engine until this guard releases them.
        Some(unsafe { CStr::from_ptr(self.ptr) })
    }

    /// Error messages only: invalid bytes become U+FFFD.
    fn message(&self) -> Option<Cow<'_, str>> {
        self.c_str().map(CStr::to_string_lossy)
    }

    /// Payload text, which must be valid UTF-8.
    fn text(&self) -> Result<Option<&str>> {
        self.c_str()
            .map(|s| {
                s.to_str().map_err(|e| {
                    IqTreeError::parse(
                        "string result",
                        format!("invalid UTF-8 after {} valid bytes", e.valid_up_to()),
                    )
                })
            })
            .transpose()
    }
}

impl<E: Engine + ?Sized> Drop for NativeString<'_, E> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            trace!("releasing native string");
            // SAFETY: the pointer came from the engine and is released once,
            // here, by its owning guard.
            unsafe { self.engine.free_string(self.ptr) };
        }
    }
}

/// Native double buffer released through the engine when dropped.
struct NativeDoubles<'e, E: Engine + ?Sized> {
    ptr: *mut f64,
    length: usize,
    engine: &'e E,
}

impl<'e, E: Engine + ?Sized> NativeDoubles<'e, E> {
    fn new(engine: &'e E, array: ffi::DoubleArray) -> Self {
        NativeDoubles { ptr: array.doubles, length: array.length, engine }
    }

    fn to_vec(&self) -> Result<Vec<f64>> {
        if self.ptr.is_null() {
            if self.length == 0 {
                return Ok(Vec::new());
            }
            return Err(IqTreeError::parse(
                "double array result",
                format!("engine reported {} values but no buffer", self.length),
            ));
        }
        // SAFETY: a non-null payload points at `length` initialised doubles
        // owned by the engine until this guard releases them.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr, self.length) }.to_vec())
    }
}

impl<E: Engine + ?Sized> Drop for NativeDoubles<'_, E> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            trace!(length = self.length, "releasing native double array");
            // SAFETY: see NativeString::drop.
            unsafe { self.engine.free_doubles(self.ptr) };
        }
    }
}

/// The single check-and-raise point for the sideband error string.
///
/// Callers wrap the error pointer in its guard first, so the buffer is
/// released after the message has been copied out, on every path.
fn raise_on_error<E: Engine + ?Sized>(error: &NativeString<'_, E>) -> Result<()> {
    match error.message() {
        Some(message) if !message.is_empty() => {
            debug!(error = %message, "native engine reported an error");
            Err(IqTreeError::Engine(message.into_owned()))
        }
        _ => Ok(()),
    }
}

/// Convert an integer envelope.
pub fn take_integer<E: Engine + ?Sized>(engine: &E, result: ffi::IntegerResult) -> Result<i32> {
    let error = NativeString::new(engine, result.error_str);
    raise_on_error(&error)?;
    Ok(result.value)
}

/// Convert a string envelope. A null payload without error is empty text.
pub fn take_string<E: Engine + ?Sized>(engine: &E, result: ffi::StringResult) -> Result<String> {
    let error = NativeString::new(engine, result.error_str);
    let value = NativeString::new(engine, result.value);
    raise_on_error(&error)?;
    Ok(value.text()?.map(str::to_owned).unwrap_or_default())
}

/// Convert a double-array envelope.
pub fn take_doubles<E: Engine + ?Sized>(engine: &E, result: ffi::DoubleArrayResult) -> Result<Vec<f64>> {
    let error = NativeString::new(engine, result.error_str);
    let value = NativeDoubles::new(engine, result.value);
    raise_on_error(&error)?;
    value.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    /// Stand-in for a dynamically typed caller value.
    enum Value {
        Str(&'static str),
        Int(i64),
    }

    impl TextElement for Value {
        fn as_text(&self) -> std::result::Result<Cow<'_, str>, String> {
            match self {
                Value::Str(s) => Ok(Cow::Borrowed(s)),
                Value::Int(_) => Err("int".to_string()),
            }
        }
    }

    #[test]
    fn string_array_points_at_terminated_copies() {
        let mut source = vec!["(a,b,c);".to_string(), "".to_string(), "ACGT-N".to_string()];
        let array = StringArray::new("trees", &source).unwrap();

        let view = array.as_ffi();
        assert_eq!(view.length, source.len());

        for (i, expected) in source.iter().enumerate() {
            // SAFETY: the view borrows `array`, which is alive.
            let copied = unsafe { CStr::from_ptr(*view.strings.add(i)) };
            assert_eq!(copied.to_bytes(), expected.as_bytes());
            assert_eq!(copied.to_bytes_with_nul().last(), Some(&0u8));
        }

        source[0].push_str("changed");
        source.clear();
        assert_eq!(array.get(0).unwrap().to_str().unwrap(), "(a,b,c);");
        assert_eq!(array.iter().count(), 3);
    }

    #[test]
    fn string_array_rejects_non_text_element() {
        let mixed = [Value::Str("a"), Value::Int(3), Value::Str("c")];
        let err = StringArray::new("names", &mixed).unwrap_err();
        match err {
            IqTreeError::Conversion { arg, reason } => {
                assert_eq!(arg, "names");
                assert_eq!(reason, "element 1 is int, expected str");
            }
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[test]
    fn string_array_rejects_interior_nul() {
        let err = StringArray::new("seqs", ["AC\0GT"]).unwrap_err();
        assert!(matches!(err, IqTreeError::Conversion { arg: "seqs", .. }));
    }

    #[test]
    fn empty_string_array() {
        let array = StringArray::new("trees", Vec::<String>::new()).unwrap();
        assert!(array.is_empty());
        assert_eq!(array.as_ffi().length, 0);
    }

    #[test]
    fn c_string_rejects_interior_nul() {
        let err = c_string("model", "GTR\0+G").unwrap_err();
        assert_eq!(err.to_string(), "cannot convert argument `model`: interior NUL byte at offset 3");
    }

    #[test]
    fn double_array_is_a_distinct_copy() {
        let mut source = vec![0.0, 0.25, 0.5, 1.0];
        let mut copy = DoubleArray::new(&source);
        assert_eq!(copy.as_slice(), source.as_slice());

        let view = copy.as_ffi();
        assert_ne!(view.doubles as *const f64, source.as_ptr());
        assert_eq!(view.length, 4);

        // SAFETY: the view borrows `copy`, which is alive.
        unsafe { *view.doubles = 9.0 };
        source[3] = -1.0;
        assert_eq!(source, vec![0.0, 0.25, 0.5, -1.0]);
        assert_eq!(copy.as_slice(), &[9.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn double_array_rejects_two_dimensions() {
        let err = DoubleArray::from_shaped("dists", &[2, 2], [0.0, 1.0, 1.0, 0.0]).unwrap_err();
        match err {
            IqTreeError::Conversion { arg, reason } => {
                assert_eq!(arg, "dists");
                assert_eq!(reason, "expected a one-dimensional array, got 2 dimensions");
            }
            other => panic!("expected conversion error, got {other:?}"),
        }
    }

    #[test]
    fn double_array_rejects_shape_mismatch() {
        let err = DoubleArray::from_shaped("dists", &[3], [0.0, 1.0]).unwrap_err();
        assert!(matches!(err, IqTreeError::Conversion { .. }));

        let ok = DoubleArray::from_shaped("dists", &[2], [0.0, 1.0]).unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[test]
    fn string_payload_is_copied_and_released_once() {
        let engine = MockEngine::new();
        let envelope = engine.string_ok("((a,b),c);");
        assert_eq!(engine.live_allocations(), 1);

        let text = take_string(&engine, envelope).unwrap();
        assert_eq!(text, "((a,b),c);");
        engine.assert_clean(1);
    }

    #[test]
    fn error_string_wins_over_payload() {
        let engine = MockEngine::new();
        let envelope = engine.string_err("ERROR: alignment has fewer than 3 sequences", true);
        assert_eq!(engine.live_allocations(), 2);

        let err = take_string(&engine, envelope).unwrap_err();
        assert_eq!(err.to_string(), "ERROR: alignment has fewer than 3 sequences");
        assert!(matches!(err, IqTreeError::Engine(_)));
        engine.assert_clean(2);
    }

    #[test]
    fn empty_error_string_means_success() {
        let engine = MockEngine::new();
        let envelope = ffi::StringResult {
            value: engine.alloc_string("2.3.6"),
            error_str: engine.alloc_string(""),
        };
        assert_eq!(take_string(&engine, envelope).unwrap(), "2.3.6");
        engine.assert_clean(2);
    }

    #[test]
    fn invalid_utf8_payload_is_rejected_and_released() {
        let engine = MockEngine::new();
        let envelope = ffi::StringResult {
            value: engine.alloc_bytes(&[0x41, 0xFF, 0x42]),
            error_str: std::ptr::null_mut(),
        };
        let err = take_string(&engine, envelope).unwrap_err();
        assert_eq!(err.to_string(), "failed to parse string result: invalid UTF-8 after 1 valid bytes");
        engine.assert_clean(1);
    }

    #[test]
    fn invalid_utf8_error_message_is_still_raised() {
        let engine = MockEngine::new();
        let envelope = ffi::StringResult {
            value: std::ptr::null_mut(),
            error_str: engine.alloc_bytes(b"bad taxon \xFF"),
        };
        let err = take_string(&engine, envelope).unwrap_err();
        assert_eq!(err.to_string(), "bad taxon \u{FFFD}");
        engine.assert_clean(1);
    }

    #[test]
    fn null_string_payload_is_empty_text() {
        let engine = MockEngine::new();
        let envelope = ffi::StringResult {
            value: std::ptr::null_mut(),
            error_str: std::ptr::null_mut(),
        };
        assert_eq!(take_string(&engine, envelope).unwrap(), "");
        engine.assert_clean(0);
    }

    #[test]
    fn integer_error_is_raised_and_released() {
        let engine = MockEngine::new();
        assert_eq!(take_integer(&engine, engine.int_ok(4)).unwrap(), 4);

        let err = take_integer(&engine, engine.int_err("Trees have different taxa")).unwrap_err();
        assert_eq!(err.to_string(), "Trees have different taxa");
        engine.assert_clean(1);
    }

    #[test]
    fn double_payload_is_copied_and_released_once() {
        let engine = MockEngine::new();
        let values = [0.0, 0.1, 0.1, 0.0];
        let got = take_doubles(&engine, engine.doubles_ok(&values)).unwrap();
        assert_eq!(got, values);
        engine.assert_clean(1);
    }

    #[test]
    fn double_error_releases_payload_and_message() {
        let engine = MockEngine::new();
        let err = take_doubles(&engine, engine.doubles_err("sequence lengths differ", &[1.0])).unwrap_err();
        assert_eq!(err.to_string(), "sequence lengths differ");
        engine.assert_clean(2);
    }

    #[test]
    fn null_double_payload_with_length_is_rejected() {
        let engine = MockEngine::new();
        let envelope = ffi::DoubleArrayResult {
            value: ffi::DoubleArray { doubles: std::ptr::null_mut(), length: 3 },
            error_str: std::ptr::null_mut(),
        };
        assert!(matches!(take_doubles(&engine, envelope), Err(IqTreeError::Parse { .. })));
        engine.assert_clean(0);
    }
}
