//! The GHC runtime system, resolved from the running process.
//!
//! Nothing here links against the RTS. Every symbol is looked up once, first
//! in the library that contains this code (and its dependencies), then in the
//! global scope. The program's entry points are optional: a library loaded
//! only for its Haskell exports has neither.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::{self, NonNull};

use crate::argv::RuntimeOptions;
use crate::error::BridgeError;
use crate::runtime::{EntryPoints, ExitHook, GuestRuntime};

#[repr(C)]
pub struct Capability {
    _private: [u8; 0],
}

#[repr(C)]
pub struct StgClosure {
    _private: [u8; 0],
}

type HaskellObj = *mut StgClosure;

type HsInitWithRtsOpts = unsafe extern "C" fn(*mut c_int, *mut *mut *mut c_char);
type HsExit = unsafe extern "C" fn();
type RtsSupportsBoundThreads = unsafe extern "C" fn() -> c_int;
type RtsLock = unsafe extern "C" fn() -> *mut Capability;
type RtsEvalLazyIo = unsafe extern "C" fn(*mut *mut Capability, HaskellObj, *mut HaskellObj);
type RtsGetSchedStatus = unsafe extern "C" fn(*mut Capability) -> c_int;
type RtsUnlock = unsafe extern "C" fn(*mut Capability);
type ErrorBelch = unsafe extern "C" fn(*const c_char, ...);
type Barf = unsafe extern "C" fn(*const c_char, ...) -> !;
type MainEntryPoint = unsafe extern "C" fn() -> c_int;

struct SymbolScope {
    own: *mut c_void,
}

impl SymbolScope {
    fn open() -> Self {
        SymbolScope {
            own: own_library_handle(),
        }
    }

    fn lookup(&self, name: &CStr) -> Option<NonNull<c_void>> {
        unsafe {
            if !self.own.is_null() {
                if let Some(sym) = NonNull::new(libc::dlsym(self.own, name.as_ptr())) {
                    return Some(sym);
                }
            }
            NonNull::new(libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()))
        }
    }

    fn require(&self, name: &CStr) -> Result<NonNull<c_void>, BridgeError> {
        self.lookup(name)
            .ok_or_else(|| BridgeError::MissingSymbol(name.to_string_lossy().into_owned()))
    }

    /// `F` must be the function pointer type of the symbol.
    unsafe fn function<F: Copy>(&self, name: &CStr) -> Result<F, BridgeError> {
        let sym = self.require(name)?.as_ptr();
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*mut c_void>());
        Ok(std::mem::transmute_copy::<*mut c_void, F>(&sym))
    }
}

fn own_library_handle() -> *mut c_void {
    unsafe {
        let mut info: libc::Dl_info = std::mem::zeroed();
        let anchor = own_library_handle as *const c_void;
        if libc::dladdr(anchor, &mut info) == 0 || info.dli_fname.is_null() {
            return ptr::null_mut();
        }
        libc::dlopen(info.dli_fname, libc::RTLD_LAZY | libc::RTLD_NOLOAD)
    }
}

pub struct GhcRts {
    hs_init_with_rtsopts: HsInitWithRtsOpts,
    hs_exit: HsExit,
    rts_supports_bound_threads: RtsSupportsBoundThreads,
    rts_lock: RtsLock,
    rts_eval_lazy_io: RtsEvalLazyIo,
    rts_get_sched_status: RtsGetSchedStatus,
    rts_unlock: RtsUnlock,
    error_belch: ErrorBelch,
    barf: Barf,
    exit_fn: *mut Option<ExitHook>,
    main_closure: Option<NonNull<StgClosure>>,
    main_entry_point: Option<MainEntryPoint>,
}

// The RTS entry points may be called from any thread; callers serialize.
unsafe impl Send for GhcRts {}

impl GhcRts {
    pub fn resolve() -> Result<Self, BridgeError> {
        let scope = SymbolScope::open();
        unsafe {
            Ok(GhcRts {
                hs_init_with_rtsopts: scope.function(c"hs_init_with_rtsopts")?,
                hs_exit: scope.function(c"hs_exit")?,
                rts_supports_bound_threads: scope.function(c"rtsSupportsBoundThreads")?,
                rts_lock: scope.function(c"rts_lock")?,
                rts_eval_lazy_io: scope.function(c"rts_evalLazyIO")?,
                rts_get_sched_status: scope.function(c"rts_getSchedStatus")?,
                rts_unlock: scope.function(c"rts_unlock")?,
                error_belch: scope.function(c"errorBelch")?,
                barf: scope.function(c"barf")?,
                exit_fn: scope.require(c"exitFn")?.as_ptr().cast(),
                main_closure: scope.lookup(c"ZCMain_main_closure").map(NonNull::cast),
                main_entry_point: scope
                    .lookup(c"mainEntryPoint")
                    .map(|sym| std::mem::transmute::<*mut c_void, MainEntryPoint>(sym.as_ptr())),
            })
        }
    }
}

impl GuestRuntime for GhcRts {
    fn init(&mut self, options: &mut RuntimeOptions<'_>) {
        unsafe { (self.hs_init_with_rtsopts)(options.argc_ptr(), options.argv_ptr()) }
    }

    fn shutdown(&mut self) {
        unsafe { (self.hs_exit)() }
    }

    // shutdownHaskellAndExit has already run hs_exit_ by the time exitFn is
    // called, so there is nothing left to reclaim.
    fn reclaim_after_exit(&mut self) {}

    fn supports_bound_threads(&self) -> bool {
        unsafe { (self.rts_supports_bound_threads)() != 0 }
    }

    fn install_exit_hook(&mut self, hook: ExitHook) {
        unsafe { ptr::write(self.exit_fn, Some(hook)) }
    }

    fn entry_points(&self) -> EntryPoints {
        EntryPoints {
            main_closure: self.main_closure.is_some(),
            entry_function: self.main_entry_point.is_some(),
        }
    }

    fn eval_main(&mut self) -> i32 {
        let Some(closure) = self.main_closure else {
            return crate::runtime::SCHED_NO_STATUS;
        };
        unsafe {
            let mut cap = (self.rts_lock)();
            (self.rts_eval_lazy_io)(&mut cap, closure.as_ptr(), ptr::null_mut());
            let status = (self.rts_get_sched_status)(cap);
            (self.rts_unlock)(cap);
            status
        }
    }

    fn call_entry_function(&mut self) -> c_int {
        match self.main_entry_point {
            Some(entry) => unsafe { entry() },
            None => -1,
        }
    }

    fn report_error(&mut self, msg: &str) {
        if let Ok(msg) = CString::new(msg) {
            unsafe { (self.error_belch)(c"%s".as_ptr(), msg.as_ptr()) }
        }
    }

    fn barf(&mut self, msg: &str) -> ! {
        let msg = CString::new(msg).unwrap_or_else(|_| c"barf".to_owned());
        unsafe { (self.barf)(c"%s".as_ptr(), msg.as_ptr()) }
    }
}
