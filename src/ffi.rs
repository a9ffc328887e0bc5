//! C ABI for foreign callers.
//!
//! Every function returns `0` on success and `-1` on failure, with
//! `errno` set to the code of the failure. Semaphore addresses are plain
//! byte pointers into memory the caller owns; the record is assumed to be
//! [`procsem_size`] bytes long.
//!
//! ```c
//! size_t procsem_size(void);
//! int procsem_init(char *sem, int pshared, unsigned int value);
//! int procsem_destroy(char *sem);
//! int procsem_getvalue(char *sem, int *sval);
//! int procsem_post(char *sem);
//! int procsem_wait(char *sem, double timeout); /* <0 block, 0 poll, >0 seconds */
//! ```

#![allow(unsafe_code)]

use std::os::raw::{c_char, c_double, c_int, c_uint};

use crate::error::{Error, Operation, Result};
use crate::sync::{RawSemaphore, Sharing};

/// Returns the number of bytes a semaphore record occupies.
#[no_mangle]
pub extern "C" fn procsem_size() -> usize {
    RawSemaphore::size()
}

/// Initializes a semaphore at `sem`. Nonzero `pshared` makes it
/// process-shared.
///
/// # Safety
///
/// `sem` must point to [`procsem_size`] writable bytes that hold no live
/// semaphore; see [`RawSemaphore::init_at`].
#[no_mangle]
pub unsafe extern "C" fn procsem_init(sem: *mut c_char, pshared: c_int, value: c_uint) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe {
        RawSemaphore::init_at(
            sem.cast(),
            RawSemaphore::size(),
            Sharing::from_pshared(pshared),
            value,
        )
    })
}

/// Destroys the semaphore at `sem`.
///
/// # Safety
///
/// `sem` must hold an initialized semaphore nobody is blocked on; see
/// [`RawSemaphore::destroy`].
#[no_mangle]
pub unsafe extern "C" fn procsem_destroy(sem: *mut c_char) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { attach(sem) }.and_then(|s| unsafe { s.destroy() }))
}

/// Stores the current permit count of `sem` into `sval`.
///
/// # Safety
///
/// `sem` must hold an initialized semaphore and `sval` must be writable.
#[no_mangle]
pub unsafe extern "C" fn procsem_getvalue(sem: *mut c_char, sval: *mut c_int) -> c_int {
    if sval.is_null() {
        return fail(&Error::invalid_argument(
            Operation::GetValue,
            "output pointer is null",
        ));
    }
    // SAFETY: forwarded from the caller.
    match unsafe { attach(sem) }.and_then(RawSemaphore::value) {
        Ok(value) => {
            // SAFETY: checked non-null; the caller guarantees it is writable.
            unsafe { sval.write(c_int::try_from(value).unwrap_or(c_int::MAX)) };
            0
        }
        Err(err) => fail(&err),
    }
}

/// Adds one permit to `sem`.
///
/// # Safety
///
/// `sem` must hold an initialized semaphore.
#[no_mangle]
pub unsafe extern "C" fn procsem_post(sem: *mut c_char) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { attach(sem) }.and_then(RawSemaphore::post))
}

/// Takes one permit from `sem`. Negative `timeout` blocks, zero polls,
/// positive waits at most that many seconds.
///
/// # Safety
///
/// `sem` must hold an initialized semaphore.
#[no_mangle]
pub unsafe extern "C" fn procsem_wait(sem: *mut c_char, timeout: c_double) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { attach(sem) }.and_then(|s| s.wait_secs_f64(timeout)))
}

unsafe fn attach<'a>(sem: *mut c_char) -> Result<&'a RawSemaphore> {
    // SAFETY: forwarded from the caller.
    unsafe { RawSemaphore::attach(sem.cast()) }
}

fn status<T>(res: Result<T>) -> c_int {
    match res {
        Ok(_) => 0,
        Err(err) => fail(&err),
    }
}

fn fail(err: &Error) -> c_int {
    set_errno(err.errno());
    -1
}

fn set_errno(code: c_int) {
    // SAFETY: the errno location is always valid for the calling thread.
    unsafe { *errno_location() = code };
}

#[cfg(any(target_os = "linux", target_os = "emscripten", target_os = "redox"))]
unsafe fn errno_location() -> *mut c_int {
    // SAFETY: no preconditions.
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "android", target_os = "netbsd", target_os = "openbsd"))]
unsafe fn errno_location() -> *mut c_int {
    // SAFETY: no preconditions.
    unsafe { libc::__errno() }
}

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
unsafe fn errno_location() -> *mut c_int {
    // SAFETY: no preconditions.
    unsafe { libc::__error() }
}

#[cfg(any(target_os = "solaris", target_os = "illumos"))]
unsafe fn errno_location() -> *mut c_int {
    // SAFETY: no preconditions.
    unsafe { libc::___errno() }
}
