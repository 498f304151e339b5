//! FFI bindings for Folio Pulse
//!
//! C-compatible entry points for embedding the engine in a host that records
//! events natively. All functions take null-terminated C strings and return
//! allocated memory that must be freed by the caller using
//! `pulse_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::replay::{replay_log, EventLog, Replayer};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Configuration from an optional JSON C string; NULL means defaults
unsafe fn config_from_ptr(config_json: *const c_char) -> Result<TelemetryConfig, TelemetryError> {
    if config_json.is_null() {
        return Ok(TelemetryConfig::default());
    }
    match cstr_to_string(config_json) {
        Some(json) => TelemetryConfig::from_json(&json),
        None => Err(TelemetryError::ConfigError(
            "configuration is not valid UTF-8".to_string(),
        )),
    }
}

/// Which payload a stateless call returns
#[derive(Clone, Copy)]
enum Payload {
    Backend,
    Raw,
}

unsafe fn replay_to_json(
    log_json: *const c_char,
    config_json: *const c_char,
    payload: Payload,
) -> *mut c_char {
    clear_last_error();

    let log_str = match cstr_to_string(log_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event log string pointer");
            return ptr::null_mut();
        }
    };

    let result = config_from_ptr(config_json).and_then(|config| {
        let log = EventLog::parse(&log_str)?;
        let outcome = replay_log(&config, &log);
        let json = match payload {
            Payload::Backend => serde_json::to_string(&outcome.backend)?,
            Payload::Raw => serde_json::to_string(&outcome.raw)?,
        };
        Ok(json)
    });

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay an event log (NDJSON or JSON array) and return the backend payload.
///
/// # Safety
/// - `log_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_replay_backend(
    log_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    replay_to_json(log_json, config_json, Payload::Backend)
}

/// Replay an event log and return the raw diagnostic snapshot.
///
/// # Safety
/// Same contract as `pulse_replay_backend`.
#[no_mangle]
pub unsafe extern "C" fn pulse_replay_raw(
    log_json: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    replay_to_json(log_json, config_json, Payload::Raw)
}

// ============================================================================
// Stateful Replayer API
// ============================================================================

/// Opaque handle to a Replayer
pub struct PulseReplayerHandle {
    replayer: Replayer,
}

/// Create a replayer.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string or NULL for defaults.
/// - Returns a pointer that must be freed with `pulse_replayer_free`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_replayer_new(config_json: *const c_char) -> *mut PulseReplayerHandle {
    clear_last_error();

    match config_from_ptr(config_json) {
        Ok(config) => {
            let handle = Box::new(PulseReplayerHandle {
                replayer: Replayer::new(config),
            });
            Box::into_raw(handle)
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a replayer.
///
/// # Safety
/// - `replayer` must be a valid pointer returned by `pulse_replayer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_replayer_free(replayer: *mut PulseReplayerHandle) {
    if !replayer.is_null() {
        drop(Box::from_raw(replayer));
    }
}

/// Feed a chunk of NDJSON events.
///
/// A chunk that fails to parse is rejected whole; no event of it is applied.
///
/// # Safety
/// - `replayer` must be a valid pointer returned by `pulse_replayer_new`.
/// - `ndjson` must be a valid null-terminated C string.
/// - Returns the number of events applied, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_replayer_feed(
    replayer: *mut PulseReplayerHandle,
    ndjson: *const c_char,
) -> i32 {
    clear_last_error();

    if replayer.is_null() {
        set_last_error("Null replayer pointer");
        return -1;
    }

    let handle = &mut *replayer;

    let chunk = match cstr_to_string(ndjson) {
        Some(s) => s,
        None => {
            set_last_error("Invalid NDJSON string pointer");
            return -1;
        }
    };

    match EventLog::parse_ndjson(&chunk) {
        Ok(log) => {
            handle.replayer.feed(&log);
            i32::try_from(log.len()).unwrap_or(i32::MAX)
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Backend payload for everything fed so far.
///
/// # Safety
/// - `replayer` must be a valid pointer returned by `pulse_replayer_new`.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_replayer_backend_metrics(
    replayer: *mut PulseReplayerHandle,
) -> *mut c_char {
    clear_last_error();

    if replayer.is_null() {
        set_last_error("Null replayer pointer");
        return ptr::null_mut();
    }

    let handle = &*replayer;

    match handle.replayer.collector().backend_metrics_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `pulse_*` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `pulse_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next `pulse_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
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
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_log() -> CString {
        CString::new(
            r#"{"type":"surface_resize","t":0,"width":500,"content_height":200,"viewport_height":200}
{"type":"session_start","t":0}
{"type":"pointer_move","t":5,"x":30,"y":30}
{"type":"click","t":100,"path":[{"classes":["project-code-button"],"attributes":{"data-project-id":"atlas"}}]}
{"type":"session_stop","t":1500}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_replay_backend() {
        let log = sample_log();

        unsafe {
            let result = pulse_replay_backend(log.as_ptr(), ptr::null());
            assert!(!result.is_null());

            let json: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
            assert_eq!(json["activeTimeMs"], 1500);
            assert_eq!(json["projectMetrics"][0]["id"], "atlas");
            assert_eq!(json["heatmapData"]["cols"], 25);

            pulse_free_string(result);
        }
    }

    #[test]
    fn test_ffi_replay_raw_with_config() {
        let log = sample_log();
        let config = CString::new(r#"{"heatmap":{"cols":10}}"#).unwrap();

        unsafe {
            let result = pulse_replay_raw(log.as_ptr(), config.as_ptr());
            assert!(!result.is_null());

            let json: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
            assert_eq!(json["heatmapData"]["cols"], 10);
            assert!(json["sessionId"].is_string());

            pulse_free_string(result);
        }
    }

    #[test]
    fn test_ffi_replayer_lifecycle() {
        unsafe {
            let replayer = pulse_replayer_new(ptr::null());
            assert!(!replayer.is_null());

            let first = CString::new("{\"type\":\"session_start\",\"t\":0}\n").unwrap();
            assert_eq!(pulse_replayer_feed(replayer, first.as_ptr()), 1);

            let second = CString::new(
                "{\"type\":\"tick\",\"t\":400}\n{\"type\":\"session_pause\",\"t\":800}",
            )
            .unwrap();
            assert_eq!(pulse_replayer_feed(replayer, second.as_ptr()), 2);

            let result = pulse_replayer_backend_metrics(replayer);
            assert!(!result.is_null());
            let json: serde_json::Value =
                serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
            assert_eq!(json["activeTimeMs"], 800);

            pulse_free_string(result);
            pulse_replayer_free(replayer);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid = CString::new("not json").unwrap();
            let result = pulse_replay_backend(invalid.as_ptr(), ptr::null());
            assert!(result.is_null());

            let error = pulse_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("line 1"));

            let bad_config = CString::new(r#"{"heatmap":{"cols":0}}"#).unwrap();
            assert!(pulse_replayer_new(bad_config.as_ptr()).is_null());
            assert!(!pulse_last_error().is_null());

            assert_eq!(pulse_replayer_feed(ptr::null_mut(), invalid.as_ptr()), -1);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = pulse_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::PULSE_VERSION);
        }
    }
}
