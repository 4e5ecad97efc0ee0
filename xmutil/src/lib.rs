// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Thin C ABI crate over [`xmutil_core`], per §6. Unlike the teacher's
//! `xmutil` crate, which declared `extern "C"` bindings into a bundled C++
//! library and forwarded calls across that boundary, this crate *implements*
//! the same `convert_mdl_to_xmile`/`get_log`/`clear_log` surface directly
//! atop the pure-Rust translation engine — there is no C++ underneath to
//! call into. A process-wide [`Mutex`] still serializes every call the way
//! the teacher's `LOCK` did, since `get_log`/`clear_log` share one process
//! log buffer across calls.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Mutex;

use xmutil_core::diagnostics::{append_process_log, clear_process_log, read_process_log};
use xmutil_core::translate;

pub use xmutil_core::TranslateOptions;

static LOCK: Mutex<()> = Mutex::new(());

/// Translate one `.mdl` source buffer into an XMILE document, returning
/// `(xmile, log)` as owned strings. The safe-Rust counterpart to
/// `convert_mdl_to_xmile`, for callers that don't need to cross an FFI
/// boundary (tests, a future pure-Rust embedder).
pub fn convert_vensim_mdl(mdl_source: &str, options: TranslateOptions) -> (Option<String>, Option<String>) {
    let _guard = LOCK.lock().unwrap();
    clear_process_log();

    let (xmile, log) = translate(mdl_source, None, options);
    if let Some(log) = &log {
        append_process_log(log);
    }
    (xmile, read_process_log_if_nonempty())
}

fn read_process_log_if_nonempty() -> Option<String> {
    let log = read_process_log();
    if log.is_empty() {
        None
    } else {
        Some(log)
    }
}

/// Translate a Vensim `.mdl` buffer into an XMILE document, per §6. Returns
/// an owned, NUL-terminated C string the caller must free by reclaiming it
/// via [`CString::from_raw`], or a null pointer if `src` is not valid UTF-8.
///
/// # Safety
/// `src` must point to `src_len` readable bytes; `filename`, if non-null,
/// must point to a NUL-terminated C string valid for the duration of the
/// call.
#[no_mangle]
pub unsafe extern "C" fn convert_mdl_to_xmile(
    src: *const u8,
    src_len: u32,
    filename: *const c_char,
    compact: bool,
    long_name: bool,
    as_sectors: bool,
) -> *mut c_char {
    let _guard = LOCK.lock().unwrap();

    let bytes = std::slice::from_raw_parts(src, src_len as usize);
    let Ok(src) = std::str::from_utf8(bytes) else {
        return std::ptr::null_mut();
    };
    let filename = if filename.is_null() {
        None
    } else {
        CStr::from_ptr(filename).to_str().ok()
    };

    clear_process_log();
    let options = TranslateOptions {
        compact,
        long_name,
        as_sectors,
    };
    let (xmile, log) = translate(src, filename, options);
    if let Some(log) = log {
        append_process_log(&log);
    }

    match xmile {
        Some(xmile) => CString::new(xmile).map_or(std::ptr::null_mut(), CString::into_raw),
        None => std::ptr::null_mut(),
    }
}

/// Return the process-wide diagnostic log accumulated since the last
/// `clear_log` (or process start), as a borrowed C string valid until the
/// next `convert_mdl_to_xmile`/`clear_log` call.
#[no_mangle]
pub extern "C" fn get_log() -> *const c_char {
    let _guard = LOCK.lock().unwrap();
    // Leak a fresh CString per call rather than keep one alive across calls;
    // the caller treats this as read-only and the process log is small.
    let text = read_process_log();
    CString::new(text).map_or(std::ptr::null(), |s| s.into_raw() as *const c_char)
}

/// Clear the process-wide diagnostic log.
#[no_mangle]
pub extern "C" fn clear_log() {
    let _guard = LOCK.lock().unwrap();
    clear_process_log();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_through_the_safe_wrapper() {
        let (xmile, log) = convert_vensim_mdl(
            "Pop=INTEG(Births-Deaths, 100)~People~|Births=0.02*Pop~People/Year~|Deaths=0.01*Pop~People/Year~|",
            TranslateOptions::default(),
        );
        let xmile = xmile.unwrap();
        assert!(xmile.starts_with("<xmile "));
        assert!(log.is_none());
    }

    #[test]
    fn c_abi_round_trips_a_simple_model() {
        let src = "X=1~~|";
        unsafe {
            clear_log();
            let ptr = convert_mdl_to_xmile(
                src.as_ptr(),
                src.len() as u32,
                std::ptr::null(),
                false,
                false,
                false,
            );
            assert!(!ptr.is_null());
            let xmile = CString::from_raw(ptr).into_string().unwrap();
            assert!(xmile.contains("<aux name=\"X\">"));

            let log_ptr = get_log();
            assert!(!log_ptr.is_null());
            let log = CStr::from_ptr(log_ptr).to_str().unwrap();
            assert!(log.is_empty());
        }
    }

    #[test]
    fn c_abi_rejects_invalid_utf8() {
        let bytes: &[u8] = &[0xff, 0xfe, 0xfd];
        unsafe {
            let ptr = convert_mdl_to_xmile(
                bytes.as_ptr(),
                bytes.len() as u32,
                std::ptr::null(),
                false,
                false,
                false,
            );
            assert!(ptr.is_null());
        }
    }
}
