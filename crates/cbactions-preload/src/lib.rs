//! Load-time hook for unmodified agent binaries.
//!
//! Built as a `cdylib` and activated with `LD_PRELOAD`. Exports the libc
//! `open`/`openat` and `stat`/`fstatat`/`statx` families, rewrites the path
//! argument with [`cbactions_vfs::rewrite_path`] and forwards to the next
//! definition of the symbol (`dlsym(RTLD_NEXT)`). The redirect root is read
//! from `CBA_PATH_SUBSTITUTION` on every call.
//!
//! Not covered: calls glibc makes internally without going through the
//! dynamic symbol table (`fopen` reaches `__open_nocancel` directly, for
//! instance), `access`/`faccessat`, and raw `syscall(2)`.

#![allow(unsafe_code)]

#[cfg(target_os = "linux")]
pub mod hooks;
