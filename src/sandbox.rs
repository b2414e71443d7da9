//! Component H: the sandboxed transport (spec §4.7). Exposes the same
//! [`crate::engine::FlagEvaluator`] through a raw `extern "C"` linear-
//! memory ABI instead of native Rust calls, so the compiled module can be
//! driven from any wasm host runtime (wasmtime, wazero, Chicory — not
//! just a JS-hosted one).
//!
//! Deliberately does not depend on `wasm-bindgen`/`js-sys`: the ABI below
//! is self-contained, and the reference Python host binding
//! (`original_source/python/flagd_evaluator_wasm/__init__.py`) drives
//! exactly this surface directly through wasmtime, with no JS bridge in
//! the loop. Built only under the `sandbox` feature or a native wasm32
//! target so the rest of the crate stays ABI-free for native embedders.

use crate::engine::{FlagEvaluator, ValidationMode};
use std::sync::OnceLock;
use std::sync::RwLock;

/// Largest flag key the module will accept, in bytes (spec §4.7).
pub const MAX_FLAG_KEY_SIZE: usize = 256;
/// Largest context payload the module will accept, in bytes.
pub const MAX_CONTEXT_SIZE: usize = 1024 * 1024;

/// Host imports, declared exactly as the reference binding expects them
/// under the `"host"` import module.
#[cfg(target_arch = "wasm32")]
#[link(wasm_import_module = "host")]
unsafe extern "C" {
    fn get_current_time_unix_seconds() -> u64;
    fn get_random_values(ptr: *mut u8, len: usize);
    fn throw(ptr: *const u8, len: usize);
}

/// Native stand-ins for the three host imports above, so `cargo test
/// --features sandbox` can exercise the whole ABI surface on the
/// developer's own machine without a wasm host loader in the loop. Never
/// compiled into the real wasm32 artifact.
#[cfg(not(target_arch = "wasm32"))]
mod native_host_stub {
    use std::time::{SystemTime, UNIX_EPOCH};

    pub unsafe fn get_current_time_unix_seconds() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }

    pub unsafe fn get_random_values(ptr: *mut u8, len: usize) {
        for i in 0..len {
            unsafe { *ptr.add(i) = 0 };
        }
    }

    pub unsafe fn throw(ptr: *const u8, len: usize) {
        let message = unsafe { std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr, len)) };
        eprintln!("sandbox abort: {message}");
    }
}

#[cfg(not(target_arch = "wasm32"))]
use native_host_stub::{get_current_time_unix_seconds, get_random_values, throw};

/// Safe wrappers over the raw host imports, used by the rest of the
/// crate so `unsafe extern "C"` stays confined to this module.
pub(crate) mod host_time {
    pub fn current_time_unix_seconds() -> u64 {
        unsafe { super::get_current_time_unix_seconds() }
    }
}

/// Fills `buf` with host-supplied random bytes. Not used by any
/// evaluation path today (`fractional` is hash-based, not random) — kept
/// for ABI parity with the reference binding, which imports it for its
/// own unrelated bookkeeping.
#[allow(dead_code)]
fn fill_random(buf: &mut [u8]) {
    unsafe { get_random_values(buf.as_mut_ptr(), buf.len()) };
}

fn abort(message: &str) -> ! {
    unsafe { throw(message.as_ptr(), message.len()) };
    loop {}
}

static EVALUATOR: OnceLock<RwLock<FlagEvaluator>> = OnceLock::new();

fn evaluator() -> &'static RwLock<FlagEvaluator> {
    EVALUATOR.get_or_init(|| RwLock::new(FlagEvaluator::new()))
}

/// Packs a pointer/length pair into the single `u64` every exported
/// function returns, per spec §4.7.
fn pack(ptr: *mut u8, len: usize) -> u64 {
    ((ptr as u64) << 32) | (len as u64 & 0xFFFF_FFFF)
}

fn write_result(mut bytes: Vec<u8>) -> u64 {
    // dealloc() reconstructs this buffer with Vec::from_raw_parts(ptr, len, len),
    // so capacity must equal len or the reconstructed Layout won't match the one
    // the allocator originally used.
    bytes.shrink_to_fit();
    let len = bytes.len();
    let ptr = bytes.as_ptr() as *mut u8;
    std::mem::forget(bytes);
    pack(ptr, len)
}

/// # Safety
/// `ptr`/`len` must describe a valid, initialized, readable region of
/// this module's linear memory, sized to the host's own accounting —
/// the caller (the host runtime) owns that invariant.
unsafe fn read_str<'a>(ptr: *const u8, len: usize) -> Result<&'a str, std::str::Utf8Error> {
    let slice = unsafe { std::slice::from_raw_parts(ptr, len) };
    std::str::from_utf8(slice)
}

/// Bump-allocates `len` bytes the host can write a flag key, context, or
/// configuration payload into before calling one of the functions below.
#[unsafe(no_mangle)]
pub extern "C" fn alloc(len: usize) -> *mut u8 {
    let mut buf: Vec<u8> = Vec::with_capacity(len);
    let ptr = buf.as_mut_ptr();
    std::mem::forget(buf);
    ptr
}

/// Reclaims a buffer previously returned by [`alloc`] or packed into a
/// return value by one of the functions below.
#[unsafe(no_mangle)]
pub extern "C" fn dealloc(ptr: *mut u8, len: usize) {
    unsafe {
        drop(Vec::from_raw_parts(ptr, len, len));
    }
}

/// Replaces the live configuration. `ptr`/`len` address a UTF-8 JSON
/// configuration document written into a buffer from [`alloc`]. Returns
/// a packed pointer/length to a JSON-encoded `StateUpdateResult`.
#[unsafe(no_mangle)]
pub extern "C" fn update_state(ptr: *const u8, len: usize) -> u64 {
    if len > MAX_CONTEXT_SIZE {
        abort("configuration payload exceeds MAX_CONTEXT_SIZE");
    }

    let json = match unsafe { read_str(ptr, len) } {
        Ok(s) => s,
        Err(_) => abort("configuration payload is not valid utf-8"),
    };

    let Ok(guard) = evaluator().read() else {
        abort("evaluator lock poisoned");
    };

    let summary = match guard.update_state(json) {
        Ok(summary) => summary,
        Err(e) => {
            let body = serde_json::json!({ "success": false, "error": e.to_string() });
            return write_result(serde_json::to_vec(&body).unwrap_or_default());
        }
    };

    write_result(serde_json::to_vec(&summary).unwrap_or_default())
}

/// Evaluates a flag looked up by key. `key_ptr`/`key_len` and
/// `ctx_ptr`/`ctx_len` each address a UTF-8 buffer from [`alloc`].
/// Returns a packed pointer/length to a JSON-encoded `EvaluationResult`.
#[unsafe(no_mangle)]
pub extern "C" fn evaluate_reusable(key_ptr: *const u8, key_len: usize, ctx_ptr: *const u8, ctx_len: usize) -> u64 {
    if key_len > MAX_FLAG_KEY_SIZE {
        abort("flag key exceeds MAX_FLAG_KEY_SIZE");
    }
    if ctx_len > MAX_CONTEXT_SIZE {
        abort("context payload exceeds MAX_CONTEXT_SIZE");
    }

    let key = match unsafe { read_str(key_ptr, key_len) } {
        Ok(s) => s,
        Err(_) => abort("flag key is not valid utf-8"),
    };
    let context = match parse_context(ctx_ptr, ctx_len) {
        Ok(c) => c,
        Err(_) => abort("context payload is not valid utf-8/json"),
    };

    let Ok(guard) = evaluator().read() else {
        abort("evaluator lock poisoned");
    };
    let result = guard.evaluate(key, &context);
    write_result(serde_json::to_vec(&result).unwrap_or_default())
}

/// Same as [`evaluate_reusable`] but looks the flag up by its dense
/// index (assigned by the most recent [`update_state`] in sorted-key
/// order), avoiding a string comparison on the hot path.
#[unsafe(no_mangle)]
pub extern "C" fn evaluate_by_index(index: u32, ctx_ptr: *const u8, ctx_len: usize) -> u64 {
    if ctx_len > MAX_CONTEXT_SIZE {
        abort("context payload exceeds MAX_CONTEXT_SIZE");
    }

    let context = match parse_context(ctx_ptr, ctx_len) {
        Ok(c) => c,
        Err(_) => abort("context payload is not valid utf-8/json"),
    };

    let Ok(guard) = evaluator().read() else {
        abort("evaluator lock poisoned");
    };
    let result = guard.evaluate_by_index(index as usize, &context);
    write_result(serde_json::to_vec(&result).unwrap_or_default())
}

/// `0` selects permissive validation, any other value selects strict
/// (spec §0).
#[unsafe(no_mangle)]
pub extern "C" fn set_validation_mode(mode: u32) {
    let mode = if mode == 0 { ValidationMode::Permissive } else { ValidationMode::Strict };
    if let Ok(guard) = evaluator().read() {
        guard.set_validation_mode(mode);
    }
}

fn parse_context(ptr: *const u8, len: usize) -> Result<serde_json::Value, ()> {
    if len == 0 {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    let s = unsafe { read_str(ptr, len) }.map_err(|_| ())?;
    serde_json::from_str(s).map_err(|_| ())
}
