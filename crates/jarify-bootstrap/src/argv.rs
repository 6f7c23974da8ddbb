use std::ffi::{c_char, c_int, CStr, CString};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use crate::host::{Host, HostError};

/// A native `argv` built from host strings.
///
/// `owned` records every string this value allocated (null where a conversion
/// failed); `argv` is the view handed to the guest runtime, terminated by a
/// null sentinel at `argv[argc]`. The runtime may permute or drop entries of
/// the view, so strings are always freed through `owned`.
pub struct BoundaryArgs {
    owned: Vec<*mut c_char>,
    argv: Vec<*mut c_char>,
}

impl BoundaryArgs {
    fn with_argc(argc: usize) -> Self {
        BoundaryArgs {
            owned: vec![ptr::null_mut(); argc],
            argv: vec![ptr::null_mut(); argc + 1],
        }
    }

    fn fill(&mut self, index: usize, value: CString) {
        let raw = value.into_raw();
        self.owned[index] = raw;
        self.argv[index] = raw;
    }

    /// Program name plus user arguments.
    pub fn argc(&self) -> usize {
        self.owned.len()
    }

    /// Allocated `argv` slots, sentinel included.
    pub fn slot_count(&self) -> usize {
        self.argv.len()
    }

    pub fn populated(&self) -> usize {
        self.owned.iter().filter(|p| !p.is_null()).count()
    }

    pub fn is_sentinel_terminated(&self) -> bool {
        self.argv.get(self.argc()).is_some_and(|p| p.is_null())
    }

    pub fn get(&self, index: usize) -> Option<&CStr> {
        let raw = *self.owned.get(index)?;
        if raw.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(raw) })
    }

    pub fn to_strings(&self) -> Vec<String> {
        (0..self.argc())
            .filter_map(|i| self.get(i))
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    /// Splices `+RTS <flags> -RTS` right after the program name.
    pub fn insert_runtime_flags(&mut self, flags: &[String]) {
        let flags: Vec<CString> = flags
            .iter()
            .filter_map(|f| CString::new(f.as_str()).ok())
            .collect();
        if flags.is_empty() || self.owned.is_empty() {
            return;
        }

        let mut spliced = Vec::with_capacity(flags.len() + 2);
        spliced.push(c"+RTS".to_owned().into_raw());
        spliced.extend(flags.into_iter().map(CString::into_raw));
        spliced.push(c"-RTS".to_owned().into_raw());

        self.owned.splice(1..1, spliced);
        self.argv.clear();
        self.argv.extend_from_slice(&self.owned);
        self.argv.push(ptr::null_mut());
    }

    /// Borrows the `(argc, argv)` pair for a runtime initialization call.
    pub fn runtime_options(&mut self) -> RuntimeOptions<'_> {
        RuntimeOptions {
            argc: c_int::try_from(self.argc()).unwrap_or(c_int::MAX),
            argv: self.argv.as_mut_ptr(),
            _args: PhantomData,
        }
    }

    /// Frees every populated slot and returns how many were freed.
    pub fn release(mut self) -> usize {
        self.free_slots()
    }

    fn free_slots(&mut self) -> usize {
        let mut freed = 0;
        for slot in self.owned.iter_mut() {
            let raw = std::mem::replace(slot, ptr::null_mut());
            if !raw.is_null() {
                drop(unsafe { CString::from_raw(raw) });
                freed += 1;
            }
        }
        self.argv.clear();
        freed
    }
}

impl Drop for BoundaryArgs {
    fn drop(&mut self) {
        self.free_slots();
    }
}

impl fmt::Debug for BoundaryArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryArgs")
            .field("argc", &self.argc())
            .field("populated", &self.populated())
            .finish()
    }
}

/// The mutable `(argc, argv)` pair a runtime initializer consumes.
///
/// The runtime may lower `argc` and rewrite the pointer array in place (GHC
/// strips `+RTS ... -RTS`). The strings themselves stay owned by the
/// [`BoundaryArgs`] this was borrowed from.
pub struct RuntimeOptions<'a> {
    argc: c_int,
    argv: *mut *mut c_char,
    _args: PhantomData<&'a mut BoundaryArgs>,
}

impl RuntimeOptions<'_> {
    pub fn argc(&self) -> c_int {
        self.argc
    }

    pub fn argc_ptr(&mut self) -> *mut c_int {
        &mut self.argc
    }

    pub fn argv_ptr(&mut self) -> *mut *mut *mut c_char {
        &mut self.argv
    }

    /// The arguments as the runtime currently sees them.
    pub fn to_strings(&self) -> Vec<String> {
        if self.argv.is_null() {
            return Vec::new();
        }
        let argc = usize::try_from(self.argc).unwrap_or(0);
        let mut out = Vec::with_capacity(argc);
        for i in 0..argc {
            let raw = unsafe { *self.argv.add(i) };
            if raw.is_null() {
                break;
            }
            out.push(unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned());
        }
        out
    }
}

/// Argument conversion failed for at least one slot.
///
/// `partial` holds every slot that did convert; it still has to be released.
pub struct MarshalError {
    pub partial: BoundaryArgs,
    pub failed: Vec<usize>,
    pub cause: HostError,
}

impl fmt::Debug for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshalError")
            .field("partial", &self.partial)
            .field("failed", &self.failed)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failed.first() {
            Some(first) => write!(
                f,
                "{} argument slot(s) could not be converted (first: argv[{first}]): {}",
                self.failed.len(),
                self.cause
            ),
            None => write!(f, "argument array unavailable: {}", self.cause),
        }
    }
}

impl std::error::Error for MarshalError {}

/// Builds `argv` from the host's program name and argument array.
pub fn build<H: Host + ?Sized>(host: &mut H) -> Result<BoundaryArgs, MarshalError> {
    let count = match host.arg_count() {
        Ok(n) => n,
        Err(cause) => {
            return Err(MarshalError {
                partial: BoundaryArgs::with_argc(0),
                failed: Vec::new(),
                cause,
            })
        }
    };

    let mut args = BoundaryArgs::with_argc(count + 1);
    let mut failed = Vec::new();
    let mut first_cause = None;

    for slot in 0..=count {
        let converted = if slot == 0 {
            host.program_name()
        } else {
            host.arg(slot - 1)
        }
        .and_then(to_cstring);
        match converted {
            Ok(s) => args.fill(slot, s),
            Err(err) => {
                failed.push(slot);
                first_cause.get_or_insert(err);
            }
        }
    }

    match first_cause {
        None => Ok(args),
        Some(cause) => Err(MarshalError {
            partial: args,
            failed,
            cause,
        }),
    }
}

fn to_cstring(s: String) -> Result<CString, HostError> {
    CString::new(s).map_err(|e| HostError::InteriorNul {
        position: e.nul_position(),
    })
}
