use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard};

use jni::objects::{JClass, JObjectArray, JString};
use jni::JNIEnv;
use once_cell::sync::OnceCell;

use crate::bridge::{self, Bridge};
use crate::config;
use crate::diag;
use crate::error::BridgeError;
use crate::ghc::GhcRts;
use crate::host::Host;
use crate::jni_host::JniHost;
use crate::runtime::GuestRuntime;

static BRIDGE: OnceCell<Mutex<Bridge<GhcRts>>> = OnceCell::new();

fn ghc_bridge() -> Result<&'static Mutex<Bridge<GhcRts>>, BridgeError> {
    BRIDGE.get_or_try_init(|| {
        let rts = GhcRts::resolve()?;
        Ok(Mutex::new(Bridge::new(rts, config::config().clone())))
    })
}

fn lock<R: GuestRuntime>(bridge: &Mutex<Bridge<R>>) -> MutexGuard<'_, Bridge<R>> {
    match bridge.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Common shape of both boundary calls: refuse re-entry, resolve the bridge,
/// run `op` under the bridge lock, and turn errors into exceptions.
///
/// A bridge that cannot be resolved and a panic out of `op` are both reported
/// as a host fatal error.
pub fn boundary_call<'b, R, H, B, F>(bridge: B, host: &mut H, name: &str, op: F)
where
    R: GuestRuntime + 'b,
    H: Host + ?Sized,
    B: FnOnce() -> Result<&'b Mutex<Bridge<R>>, BridgeError>,
    F: FnOnce(&mut Bridge<R>, &mut H) -> Result<(), BridgeError>,
{
    // The bridge mutex is held by the running invocation on this thread.
    if bridge::invocation_in_progress() {
        let err = BridgeError::Reentrant;
        host.throw(err.java_class(), &format!("Jarify.{name}: {err}"));
        return;
    }

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let bridge = bridge().map_err(|err| (err, true))?;
        let mut bridge = lock(bridge);
        op(&mut bridge, host).map_err(|err| (err, false))
    }));

    match result {
        Ok(Ok(())) => {}
        Ok(Err((err, true))) => host.fatal_error(&format!("Jarify.{name}: {err}")),
        Ok(Err((err, false))) => {
            diag::error(format_args!("{name}: {err}"));
            host.throw(err.java_class(), &format!("Jarify.{name}: {err}"));
        }
        Err(_) => host.fatal_error(&format!("Jarify.{name}: internal panic")),
    }
}

#[no_mangle]
pub extern "system" fn Java_io_tweag_jarify_HaskellLibraryLoader_initializeHaskell<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    app_name: JString<'local>,
    args: JObjectArray<'local>,
) {
    let mut host = JniHost::new(&mut env, &app_name, &args);
    boundary_call(ghc_bridge, &mut host, "initializeHaskell", |bridge, host| {
        bridge.initialize(host)
    });
}

#[no_mangle]
pub extern "system" fn Java_io_tweag_jarify_JarifyMain_invokeMain<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    app_name: JString<'local>,
    args: JObjectArray<'local>,
) {
    let mut host = JniHost::new(&mut env, &app_name, &args);
    boundary_call(ghc_bridge, &mut host, "invokeMain", |bridge, host| {
        let outcome = bridge.invoke_main(host)?;
        diag::trace(format_args!(
            "invokeMain: exit code {} ({} mode)",
            outcome.exit_code(),
            outcome.mode()
        ));
        Ok(())
    });
}
