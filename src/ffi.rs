//! FFI bindings for embedding the detector
//!
//! C-compatible functions for driving a detector from firmware or other
//! languages. The embedder owns the sampling loop: it pushes each raw
//! reading (in Celsius) into the handle, then ticks with its monotonic
//! clock. Returned strings are allocated here and must be freed with
//! `respire_free_string`.

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use crate::config::MoodThresholds;
use crate::detector::BreathDetector;
use crate::sensor::SharedSample;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Opaque handle to a detector plus its sample-and-hold input cell.
pub struct RespireDetectorHandle {
    input: SharedSample,
    detector: BreathDetector<SharedSample>,
}

/// Create a new detector.
///
/// `preset_index` is clamped to the valid 0-9 range. `with_scores` other
/// than 0 attaches the mood scoring stage. `now_s` is the embedder's
/// monotonic clock at creation time.
///
/// # Safety
/// - Returns a pointer to a newly allocated detector.
/// - Must be freed with `respire_detector_free`.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_new(
    preset_index: i32,
    with_scores: i32,
    now_s: f64,
) -> *mut RespireDetectorHandle {
    clear_last_error();

    let input = SharedSample::new(0.0);
    let source = input.clone();
    let mut detector = if with_scores != 0 {
        BreathDetector::with_scoring(source, now_s)
    } else {
        BreathDetector::new(source, now_s)
    };
    detector.apply_sensitivity(preset_index.max(0) as usize);

    let handle = Box::new(RespireDetectorHandle { input, detector });
    Box::into_raw(handle)
}

/// Free a detector.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_free(handle: *mut RespireDetectorHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Push the latest raw sensor reading (Celsius) into the hold cell.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_push_raw(
    handle: *mut RespireDetectorHandle,
    raw_c: f64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    (*handle).input.set(raw_c);
    0
}

/// Advance the detector to `now_s` (monotonic seconds).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns 1 if a phase transition occurred, 0 if not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_tick(
    handle: *mut RespireDetectorHandle,
    now_s: f64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    if (*handle).detector.tick(now_s) {
        1
    } else {
        0
    }
}

/// Serialize the current state snapshot to JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns a newly allocated string that must be freed with
///   `respire_free_string`.
/// - Returns NULL on error; call `respire_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_snapshot_json(
    handle: *mut RespireDetectorHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return ptr::null_mut();
    }

    let snapshot = (*handle).detector.snapshot();
    match serde_json::to_string(&snapshot) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Apply a sensitivity preset (clamped to 0-9). Resets filter state.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_apply_sensitivity(
    handle: *mut RespireDetectorHandle,
    preset_index: i32,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    (*handle).detector.apply_sensitivity(preset_index.max(0) as usize);
    0
}

/// Replace the exhale-duration depth band boundaries (seconds).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_apply_depth_thresholds(
    handle: *mut RespireDetectorHandle,
    very_short: f64,
    short: f64,
    medium: f64,
    long: f64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    (*handle)
        .detector
        .apply_depth_thresholds(very_short, short, medium, long);
    0
}

/// Replace the mood scoring thresholds.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_set_mood_thresholds(
    handle: *mut RespireDetectorHandle,
    calm_ratio: f64,
    calm_variability_cv: f64,
    focus_consistency_cv: f64,
    calibration_breaths: i32,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    (*handle).detector.set_mood_thresholds(MoodThresholds {
        calm_ratio,
        calm_variability_cv,
        focus_consistency_cv,
        calibration_breaths: calibration_breaths.max(0) as u32,
    });
    0
}

/// Session reset: all running state back to constructed defaults.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `respire_detector_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn respire_detector_reset(
    handle: *mut RespireDetectorHandle,
    now_s: f64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    (*handle).detector.reset(now_s);
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by respire functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a respire function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn respire_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next respire call on this
///   thread. Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn respire_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn respire_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_ffi_lifecycle() {
        unsafe {
            let handle = respire_detector_new(5, 1, 0.0);
            assert!(!handle.is_null());

            assert_eq!(respire_detector_push_raw(handle, 31.0), 0);
            for i in 0..200 {
                let rc = respire_detector_tick(handle, i as f64 * 0.01);
                assert!(rc >= 0);
            }

            let json = respire_detector_snapshot_json(handle);
            assert!(!json.is_null());

            let json_str = CStr::from_ptr(json).to_str().unwrap();
            let value: serde_json::Value = serde_json::from_str(json_str).unwrap();
            assert!(value["phase"].is_string());
            assert_eq!(value["breath_count"], 0);

            respire_free_string(json);
            respire_detector_free(handle);
        }
    }

    #[test]
    fn test_ffi_setters() {
        unsafe {
            let handle = respire_detector_new(0, 0, 0.0);

            assert_eq!(respire_detector_apply_sensitivity(handle, 99), 0);
            assert_eq!(
                respire_detector_apply_depth_thresholds(handle, 1.0, 2.0, 3.0, 4.0),
                0
            );
            assert_eq!(
                respire_detector_set_mood_thresholds(handle, 1.5, 0.1, 0.15, 4),
                0
            );
            assert_eq!(respire_detector_reset(handle, 1.0), 0);

            respire_detector_free(handle);
        }
    }

    #[test]
    fn test_ffi_null_handle_sets_error() {
        unsafe {
            clear_last_error();
            assert_eq!(respire_detector_tick(ptr::null_mut(), 0.0), -1);

            let error = respire_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            let json = respire_detector_snapshot_json(ptr::null_mut());
            assert!(json.is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = respire_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
