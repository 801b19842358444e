//! IOKit power-management assertions.

use anyhow::{bail, Result};
use std::ffi::{c_char, c_void, CString};

type CFStringRef = *const c_void;
type IOPMAssertionID = u32;
type IOReturn = i32;

const K_CF_STRING_ENCODING_UTF8: u32 = 0x0800_0100;
const K_IOPM_ASSERTION_LEVEL_ON: u32 = 255;
const K_IO_RETURN_SUCCESS: IOReturn = 0;
const PREVENT_USER_IDLE_SYSTEM_SLEEP: &str = "PreventUserIdleSystemSleep";

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFStringCreateWithCString(
        alloc: *const c_void,
        c_str: *const c_char,
        encoding: u32,
    ) -> CFStringRef;
    fn CFRelease(cf: *const c_void);
}

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    fn IOPMAssertionCreateWithName(
        assertion_type: CFStringRef,
        assertion_level: u32,
        assertion_name: CFStringRef,
        assertion_id: *mut IOPMAssertionID,
    ) -> IOReturn;
    fn IOPMAssertionRelease(assertion_id: IOPMAssertionID) -> IOReturn;
}

/// Owned CFString, released on drop.
struct CfString(CFStringRef);

impl CfString {
    fn new(value: &str) -> Result<Self> {
        let c_value = CString::new(value)?;
        let ptr = unsafe {
            CFStringCreateWithCString(std::ptr::null(), c_value.as_ptr(), K_CF_STRING_ENCODING_UTF8)
        };
        if ptr.is_null() {
            bail!("CFStringCreateWithCString returned null for {value:?}");
        }
        Ok(Self(ptr))
    }
}

impl Drop for CfString {
    fn drop(&mut self) {
        unsafe { CFRelease(self.0) };
    }
}

/// Creates a `PreventUserIdleSystemSleep` assertion named `reason`.
pub fn prevent_idle_sleep(reason: &str) -> Result<u32> {
    let assertion_type = CfString::new(PREVENT_USER_IDLE_SYSTEM_SLEEP)?;
    let name = CfString::new(reason)?;
    let mut assertion_id: IOPMAssertionID = 0;

    let result = unsafe {
        IOPMAssertionCreateWithName(
            assertion_type.0,
            K_IOPM_ASSERTION_LEVEL_ON,
            name.0,
            &mut assertion_id as *mut IOPMAssertionID,
        )
    };

    if result != K_IO_RETURN_SUCCESS {
        bail!("IOPMAssertionCreateWithName failed with IOReturn {result:#x}");
    }
    Ok(assertion_id)
}

pub fn release_assertion(assertion_id: u32) -> Result<()> {
    let result = unsafe { IOPMAssertionRelease(assertion_id) };
    if result != K_IO_RETURN_SUCCESS {
        bail!("IOPMAssertionRelease({assertion_id}) failed with IOReturn {result:#x}");
    }
    Ok(())
}
