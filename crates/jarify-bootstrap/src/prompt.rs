//! Single-use non-local control transfer.
//!
//! A [`ControlTransferPoint`] records the stack pointer, the callee-saved
//! registers and a resume address, then runs a body. Code running inside the
//! body, however deep and through whatever foreign frames, can take the armed
//! point with [`take_armed`] and resume right after the body call, abandoning
//! every frame in between.
//!
//! Abandoned frames are not unwound. Rust frames between the point and the
//! transfer must not own values with destructors at the moment of transfer;
//! the body closure itself is required to be `Copy` for that reason.

use std::cell::Cell;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;

#[cfg(not(any(
    all(target_arch = "x86_64", unix),
    all(target_arch = "aarch64", unix)
)))]
compile_error!("control transfer is implemented for x86_64 and aarch64 unix targets only");

#[repr(C)]
struct PromptBuf {
    sp: usize,
    resume: usize,
}

type Trampoline = extern "C" fn(*mut c_void);

thread_local! {
    static ARMED: Cell<*mut PromptBuf> = const { Cell::new(ptr::null_mut()) };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Landing {
    /// The body returned on its own.
    Returned,
    /// Control came back through [`ArmedPoint::transfer`].
    Transferred,
}

/// A saved execution context, consumed by [`ControlTransferPoint::run`].
pub struct ControlTransferPoint {
    buf: PromptBuf,
    _thread_bound: PhantomData<*mut ()>,
}

impl Default for ControlTransferPoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlTransferPoint {
    pub fn new() -> Self {
        ControlTransferPoint {
            buf: PromptBuf { sp: 0, resume: 0 },
            _thread_bound: PhantomData,
        }
    }

    /// Runs `body` with this point armed on the current thread.
    ///
    /// A panic escaping `body` aborts the process.
    pub fn run<F>(mut self, body: F) -> Landing
    where
        F: FnOnce() + Copy,
    {
        let mut body = Some(body);
        let buf: *mut PromptBuf = &mut self.buf;
        let previous = ARMED.with(|slot| slot.replace(buf));

        let landed = unsafe {
            arch::enter(
                buf,
                trampoline::<F>,
                (&mut body as *mut Option<F>).cast::<c_void>(),
            )
        };

        ARMED.with(|slot| slot.set(previous));
        if landed == 0 {
            Landing::Returned
        } else {
            Landing::Transferred
        }
    }
}

/// The point armed on this thread, detached so it cannot be taken twice.
#[derive(Clone, Copy, Debug)]
pub struct ArmedPoint(*mut PromptBuf);

impl ArmedPoint {
    /// Resumes at the point. The caller's frames up to the point are abandoned.
    pub unsafe fn transfer(self) -> ! {
        arch::leave(self.0)
    }
}

pub fn take_armed() -> Option<ArmedPoint> {
    let buf = ARMED.with(|slot| slot.replace(ptr::null_mut()));
    (!buf.is_null()).then_some(ArmedPoint(buf))
}

pub fn is_armed() -> bool {
    ARMED.with(|slot| !slot.get().is_null())
}

extern "C" fn trampoline<F: FnOnce() + Copy>(ctx: *mut c_void) {
    let body = unsafe { &mut *ctx.cast::<Option<F>>() };
    if let Some(f) = body.take() {
        f();
    }
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::{PromptBuf, Trampoline};
    use std::ffi::c_void;

    // rbx and rbp cannot be asm operands; they are kept on the stack above the
    // saved stack pointer. r12-r15 are declared clobbered so the compiler keeps
    // nothing in them across the block.
    pub(super) unsafe fn enter(buf: *mut PromptBuf, body: Trampoline, ctx: *mut c_void) -> usize {
        let landed: usize;
        core::arch::asm!(
            "push rbp",
            "push rbx",
            "mov qword ptr [rdi], rsp",
            "lea rax, [rip + 2f]",
            "mov qword ptr [rdi + 8], rax",
            "mov rdi, rsi",
            "call rdx",
            "xor eax, eax",
            "jmp 3f",
            "2:",
            "mov eax, 1",
            "3:",
            "pop rbx",
            "pop rbp",
            in("rdi") buf,
            in("rsi") ctx,
            in("rdx") body,
            out("rax") landed,
            out("r12") _,
            out("r13") _,
            out("r14") _,
            out("r15") _,
            clobber_abi("C"),
        );
        landed
    }

    pub(super) unsafe fn leave(buf: *const PromptBuf) -> ! {
        core::arch::asm!(
            "mov rsp, qword ptr [rdi]",
            "jmp qword ptr [rdi + 8]",
            in("rdi") buf,
            options(noreturn),
        );
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use super::{PromptBuf, Trampoline};
    use std::ffi::c_void;

    // x19 and x29 cannot be asm operands; they are kept on the stack above the
    // saved stack pointer. x20-x28 and d8-d15 are declared clobbered.
    pub(super) unsafe fn enter(buf: *mut PromptBuf, body: Trampoline, ctx: *mut c_void) -> usize {
        let landed: usize;
        core::arch::asm!(
            "stp x29, x30, [sp, #-16]!",
            "str x19, [sp, #-16]!",
            "mov x9, sp",
            "adr x10, 2f",
            "stp x9, x10, [x0]",
            "mov x0, x1",
            "blr x2",
            "mov x0, #0",
            "b 3f",
            "2:",
            "mov x0, #1",
            "3:",
            "ldr x19, [sp], #16",
            "ldp x29, x30, [sp], #16",
            inout("x0") buf => landed,
            in("x1") ctx,
            in("x2") body,
            out("x20") _,
            out("x21") _,
            out("x22") _,
            out("x23") _,
            out("x24") _,
            out("x25") _,
            out("x26") _,
            out("x27") _,
            out("x28") _,
            out("v8") _,
            out("v9") _,
            out("v10") _,
            out("v11") _,
            out("v12") _,
            out("v13") _,
            out("v14") _,
            out("v15") _,
            clobber_abi("C"),
        );
        landed
    }

    pub(super) unsafe fn leave(buf: *const PromptBuf) -> ! {
        core::arch::asm!(
            "ldp x9, x10, [x0]",
            "mov sp, x9",
            "br x10",
            in("x0") buf,
            options(noreturn),
        );
    }
}
