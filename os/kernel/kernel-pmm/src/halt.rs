//! Fail-stop handling for allocator errors nobody can recover from.

use crate::error::PageAllocError;
use log::error;

/// Reports a fatal allocator error and stops the machine via `halt`.
///
/// `halt` belongs to whoever owns kernel control flow; [`halt_machine`] is
/// the default.
pub fn fail_stop(err: &PageAllocError, halt: fn() -> !) -> ! {
    error!("memory: {err}; halting");
    halt()
}

/// Stops executing on this CPU for good.
///
/// On bare-metal `x86_64` interrupts are masked and the CPU parked with `hlt`;
/// elsewhere this spins.
pub fn halt_machine() -> ! {
    loop {
        #[cfg(all(target_arch = "x86_64", target_os = "none"))]
        // SAFETY: only valid at CPL0, which is where the allocator runs.
        unsafe {
            core::arch::asm!("cli", options(nomem, nostack, preserves_flags));
            core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
        }

        #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
        core::hint::spin_loop();
    }
}
