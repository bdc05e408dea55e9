#![cfg_attr(test, allow(dead_code, unused_macros))]

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint};

use cbactions_vfs::rewrite_path;

/// Run `f` with the rewritten form of the C path `path`.
///
/// Null, non-UTF-8 and unlisted paths are forwarded untouched.
unsafe fn with_rewritten<R>(path: *const c_char, f: impl FnOnce(*const c_char) -> R) -> R {
    if path.is_null() {
        return f(path);
    }
    let Ok(original) = CStr::from_ptr(path).to_str() else {
        return f(path);
    };
    match rewrite_path(original) {
        Cow::Borrowed(_) => f(path),
        Cow::Owned(rewritten) => match CString::new(rewritten) {
            Ok(c) => f(c.as_ptr()),
            Err(_) => f(path),
        },
    }
}

/// Resolve the next definition of `$name` once, as a `$ty` function pointer.
macro_rules! next_symbol {
    ($name:literal, $ty:ty) => {{
        static ADDR: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
        let addr = *ADDR.get_or_init(|| {
            libc::dlsym(libc::RTLD_NEXT, concat!($name, "\0").as_ptr().cast()) as usize
        });
        if addr == 0 {
            None
        } else {
            Some(std::mem::transmute::<usize, $ty>(addr))
        }
    }};
}

unsafe fn missing_symbol() -> c_int {
    *libc::__errno_location() = libc::ENOSYS;
    -1
}

type OpenFn = unsafe extern "C" fn(*const c_char, c_int, libc::mode_t) -> c_int;
type StatFn = unsafe extern "C" fn(*const c_char, *mut libc::stat) -> c_int;
type Stat64Fn = unsafe extern "C" fn(*const c_char, *mut libc::stat64) -> c_int;
type XStatFn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat) -> c_int;
type XStat64Fn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat64) -> c_int;
type OpenAtFn = unsafe extern "C" fn(c_int, *const c_char, c_int, libc::mode_t) -> c_int;
type FStatAtFn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat, c_int) -> c_int;
type FStatAt64Fn = unsafe extern "C" fn(c_int, *const c_char, *mut libc::stat64, c_int) -> c_int;
type FxStatAtFn = unsafe extern "C" fn(c_int, c_int, *const c_char, *mut libc::stat, c_int) -> c_int;
type FxStatAt64Fn =
    unsafe extern "C" fn(c_int, c_int, *const c_char, *mut libc::stat64, c_int) -> c_int;
#[cfg(target_env = "gnu")]
type StatxFn = unsafe extern "C" fn(c_int, *const c_char, c_int, c_uint, *mut libc::statx) -> c_int;

// `open` is variadic in C. Stable Rust cannot define variadics, so the mode is
// taken as a fixed third argument; on the x86_64 and aarch64 Linux ABIs an
// integer vararg arrives in the same register.

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    match next_symbol!("open", OpenFn) {
        Some(next) => with_rewritten(path, |p| next(p, flags, mode)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    match next_symbol!("open64", OpenFn) {
        Some(next) => with_rewritten(path, |p| next(p, flags, mode)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    match next_symbol!("stat", StatFn) {
        Some(next) => with_rewritten(path, |p| next(p, buf)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn lstat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    match next_symbol!("lstat", StatFn) {
        Some(next) => with_rewritten(path, |p| next(p, buf)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn stat64(path: *const c_char, buf: *mut libc::stat64) -> c_int {
    match next_symbol!("stat64", Stat64Fn) {
        Some(next) => with_rewritten(path, |p| next(p, buf)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn lstat64(path: *const c_char, buf: *mut libc::stat64) -> c_int {
    match next_symbol!("lstat64", Stat64Fn) {
        Some(next) => with_rewritten(path, |p| next(p, buf)),
        None => missing_symbol(),
    }
}

// glibc < 2.33 routes stat(2) wrappers through the versioned __xstat family.

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __xstat(ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int {
    match next_symbol!("__xstat", XStatFn) {
        Some(next) => with_rewritten(path, |p| next(ver, p, buf)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __lxstat(ver: c_int, path: *const c_char, buf: *mut libc::stat) -> c_int {
    match next_symbol!("__lxstat", XStatFn) {
        Some(next) => with_rewritten(path, |p| next(ver, p, buf)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __xstat64(
    ver: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
) -> c_int {
    match next_symbol!("__xstat64", XStat64Fn) {
        Some(next) => with_rewritten(path, |p| next(ver, p, buf)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __lxstat64(
    ver: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
) -> c_int {
    match next_symbol!("__lxstat64", XStat64Fn) {
        Some(next) => with_rewritten(path, |p| next(ver, p, buf)),
        None => missing_symbol(),
    }
}

// The *at variants only rewrite absolute paths, so a relative path keeps its
// meaning against `dirfd`.

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    match next_symbol!("openat", OpenAtFn) {
        Some(next) => with_rewritten(path, |p| next(dirfd, p, flags, mode)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    match next_symbol!("openat64", OpenAtFn) {
        Some(next) => with_rewritten(path, |p| next(dirfd, p, flags, mode)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn fstatat(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: c_int,
) -> c_int {
    match next_symbol!("fstatat", FStatAtFn) {
        Some(next) => with_rewritten(path, |p| next(dirfd, p, buf, flags)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn fstatat64(
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
    flags: c_int,
) -> c_int {
    match next_symbol!("fstatat64", FStatAt64Fn) {
        Some(next) => with_rewritten(path, |p| next(dirfd, p, buf, flags)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __fxstatat(
    ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: c_int,
) -> c_int {
    match next_symbol!("__fxstatat", FxStatAtFn) {
        Some(next) => with_rewritten(path, |p| next(ver, dirfd, p, buf, flags)),
        None => missing_symbol(),
    }
}

#[cfg(not(test))]
#[no_mangle]
pub unsafe extern "C" fn __fxstatat64(
    ver: c_int,
    dirfd: c_int,
    path: *const c_char,
    buf: *mut libc::stat64,
    flags: c_int,
) -> c_int {
    match next_symbol!("__fxstatat64", FxStatAt64Fn) {
        Some(next) => with_rewritten(path, |p| next(ver, dirfd, p, buf, flags)),
        None => missing_symbol(),
    }
}

// coreutils `stat` and `ls` go through statx on glibc >= 2.28.

#[cfg(all(not(test), target_env = "gnu"))]
#[no_mangle]
pub unsafe extern "C" fn statx(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mask: c_uint,
    buf: *mut libc::statx,
) -> c_int {
    match next_symbol!("statx", StatxFn) {
        Some(next) => with_rewritten(path, |p| next(dirfd, p, flags, mask, buf)),
        None => missing_symbol(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(path: &CStr) -> String {
        unsafe {
            with_rewritten(path.as_ptr(), |p| {
                CStr::from_ptr(p).to_string_lossy().into_owned()
            })
        }
    }

    #[test]
    fn test_unlisted_path_forwarded_as_is() {
        assert_eq!(seen(c"/etc/hosts"), "/etc/hosts");
    }

    #[test]
    fn test_null_path_forwarded() {
        let is_null = unsafe { with_rewritten(std::ptr::null(), |p| p.is_null()) };
        assert!(is_null);
    }

    #[test]
    fn test_non_utf8_path_forwarded() {
        let raw = CString::new(vec![b'/', 0xff, b'x']).unwrap();
        let same = unsafe { with_rewritten(raw.as_ptr(), |p| p == raw.as_ptr()) };
        assert!(same);
    }

    // The only test in this crate that touches the process environment.
    #[test]
    fn test_allowlisted_path_follows_environment() {
        std::env::set_var(cbactions_vfs::PATH_SUBSTITUTION_ENV, "/tmp/cbactions-hook");
        assert_eq!(seen(c"/runner/.runner"), "/tmp/cbactions-hook/.runner");
        assert_eq!(seen(c"/runner/.env"), "/tmp/cbactions-hook/.env");
        assert_eq!(seen(c".runner"), ".runner");

        std::env::remove_var(cbactions_vfs::PATH_SUBSTITUTION_ENV);
        assert_eq!(seen(c"/runner/.runner"), "/runner/.runner");
    }
}
