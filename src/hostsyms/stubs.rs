//! Host implementations standing in for the Bionic runtime symbols a
//! loaded library references (spec §4.C).

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};

use rand::RngCore;

/// `__system_property_get` ignores the requested property name and always
/// reports this constant string, per spec §4.C.
const FAKE_PROPERTY_VALUE: &[u8] = b"no s/n number\0";

/// Aborts the process: the pointer bound to any relocation whose symbol
/// name isn't in the host table. Converts an unresolved link-time reference
/// into a loud runtime failure only if the guest actually calls it.
pub unsafe extern "C" fn undefined_symbol() -> ! {
    panic!("undefined symbol invoked");
}

/// Inert stub for every `pthread_*` entry in the table. The guest's calling
/// convention passes arguments in registers the callee is free to ignore;
/// returning 0 (success) in `eax`/`w0` is valid regardless of how many
/// arguments the real prototype declares.
pub unsafe extern "C" fn pthread_stub() -> c_int {
    0
}

pub unsafe extern "C" fn system_property_get(_name: *const c_char, value: *mut c_char) -> c_int {
    if value.is_null() {
        return 0;
    }
    std::ptr::copy_nonoverlapping(
        FAKE_PROPERTY_VALUE.as_ptr() as *const c_char,
        value,
        FAKE_PROPERTY_VALUE.len(),
    );
    (FAKE_PROPERTY_VALUE.len() - 1) as c_int
}

pub unsafe extern "C" fn arc4random() -> u32 {
    rand::thread_rng().next_u32()
}

pub unsafe extern "C" fn host_errno() -> *mut c_int {
    libc::__errno_location()
}

/// `dlopen`/`dlsym`/`dlclose`: re-enter this loader. Each `dlopen` call
/// constructs an independent [`crate::LoadedLibrary`] owned by the guest —
/// there is no shared global scope across loaded libraries (spec Non-goals,
/// §9).
pub unsafe extern "C" fn dlopen(name: *const c_char, _flags: c_int) -> *mut c_void {
    if name.is_null() {
        return std::ptr::null_mut();
    }
    let path = match std::ffi::CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    match crate::open_library(path) {
        Ok(lib) => Box::into_raw(Box::new(lib)) as *mut c_void,
        Err(err) => {
            log::warn!("guest dlopen({path:?}) failed: {err}");
            std::ptr::null_mut()
        }
    }
}

pub unsafe extern "C" fn dlsym(handle: *mut c_void, name: *const c_char) -> *mut c_void {
    if handle.is_null() || name.is_null() {
        return std::ptr::null_mut();
    }
    let lib = &*(handle as *const crate::LoadedLibrary);
    let name = match std::ffi::CStr::from_ptr(name).to_str() {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    match lib.load_symbol(name) {
        Ok(ptr) => ptr as *mut c_void,
        Err(_) => std::ptr::null_mut(),
    }
}

pub unsafe extern "C" fn dlclose(handle: *mut c_void) -> c_int {
    if handle.is_null() {
        return -1;
    }
    drop(Box::from_raw(handle as *mut crate::LoadedLibrary));
    0
}
