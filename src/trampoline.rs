//! Fixed-signature native trampolines.
//!
//! These are the only functions whose addresses cross into the engine. At
//! call time the engine hands back the opaque context word it was given at
//! installation; the trampoline reinterprets it as a registry token,
//! resolves the closure, and dispatches to the matching variant.
//!
//! An unknown token or a variant mismatch means the optimizer lifecycle
//! invariant was broken (a run observed a handle after its owner evicted
//! it). That is a bug, not an input error, so it panics; unwinding out of
//! an `extern "C"` frame aborts the process, which is the loud failure the
//! registry contract asks for.

use core::ffi::{c_double, c_uint, c_void};

use crate::registry::{self, Callback, Token};

pub(crate) unsafe extern "C" fn scalar(
    n: c_uint,
    x: *const c_double,
    grad: *mut c_double,
    data: *mut c_void,
) -> c_double {
    let token = Token::from_context(data as usize);
    let entry = registry::resolve(token)
        .unwrap_or_else(|| panic!("stale callback handle {}", data as usize));
    // SAFETY: the engine passes `x` with `n` readable elements and `grad`
    // either null or with `n` writable elements.
    let x = unsafe { core::slice::from_raw_parts(x, n as usize) };
    let grad = if grad.is_null() {
        None
    } else {
        Some(unsafe { core::slice::from_raw_parts_mut(grad, n as usize) })
    };
    let value = match &mut *entry.lock() {
        Callback::Scalar(f) => f(x, grad),
        Callback::Vector(_) => panic!("scalar trampoline reached a vector callback handle"),
    };
    value
}

pub(crate) unsafe extern "C" fn vector(
    m: c_uint,
    result: *mut c_double,
    n: c_uint,
    x: *const c_double,
    grad: *mut c_double,
    data: *mut c_void,
) {
    let token = Token::from_context(data as usize);
    let entry = registry::resolve(token)
        .unwrap_or_else(|| panic!("stale callback handle {}", data as usize));
    // SAFETY: the engine passes `result` with `m` writable elements, `x`
    // with `n` readable elements, and `grad` either null or with `m * n`
    // writable elements (row-major).
    let result = unsafe { core::slice::from_raw_parts_mut(result, m as usize) };
    let x = unsafe { core::slice::from_raw_parts(x, n as usize) };
    let grad = if grad.is_null() {
        None
    } else {
        Some(unsafe { core::slice::from_raw_parts_mut(grad, (m as usize) * (n as usize)) })
    };
    match &mut *entry.lock() {
        Callback::Vector(f) => f(result, x, grad),
        Callback::Scalar(_) => panic!("vector trampoline reached a scalar callback handle"),
    };
}
