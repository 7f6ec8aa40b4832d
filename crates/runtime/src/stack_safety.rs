//! Host-stack overflow detection.
//!
//! On Unix, installs a SIGSEGV handler on an alternate signal stack so
//! the process can report stack exhaustion even when the primary stack is
//! gone. The handler writes its diagnostic with raw `write` (fprintf is
//! unsafe in low-stack conditions) and exits; recovery is not attempted.
//! Installation is idempotent. On other platforms the installer is a
//! no-op.
//!
//! The VM's own recursion guard (a frame-depth limit raising a catchable
//! `StackOverflow` trap) fires long before this backstop in normal
//! operation.

use std::sync::atomic::{AtomicBool, Ordering};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the stack-overflow guard once per process.
pub fn init_stack_safety() {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    imp::install();
}

pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

#[cfg(unix)]
mod imp {
    const ALT_STACK_BYTES: usize = 64 * 1024;
    static mut ALT_STACK: [u8; ALT_STACK_BYTES] = [0; ALT_STACK_BYTES];

    extern "C" fn segv_handler(_sig: libc::c_int) {
        const MSG: &[u8] = b"viper runtime error: stack overflow\n\
Hint: reduce recursion depth or raise the interpreter frame limit.\n";
        unsafe {
            libc::write(libc::STDERR_FILENO, MSG.as_ptr() as *const libc::c_void, MSG.len());
            libc::_exit(1);
        }
    }

    pub(super) fn install() {
        unsafe {
            let stack = libc::stack_t {
                ss_sp: std::ptr::addr_of_mut!(ALT_STACK) as *mut libc::c_void,
                ss_flags: 0,
                ss_size: ALT_STACK_BYTES,
            };
            if libc::sigaltstack(&stack, std::ptr::null_mut()) != 0 {
                return;
            }

            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = segv_handler as usize;
            action.sa_flags = libc::SA_ONSTACK;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(libc::SIGSEGV, &action, std::ptr::null_mut());
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub(super) fn install() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn installation_is_idempotent() {
        init_stack_safety();
        assert!(is_installed());
        // A second call must not re-register or fail.
        init_stack_safety();
        assert!(is_installed());
    }
}
