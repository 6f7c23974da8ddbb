use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use jarify::exports::boundary_call;
use jarify::{current_phase, Bridge, BridgeConfig, BridgeError, Phase};
use once_cell::sync::OnceCell;

mod common;

use common::{bridge, bridge_with, FakeHost, FakeRuntime, Program};

type Shared = OnceCell<Mutex<Bridge<FakeRuntime>>>;

fn shared(
    cell: &'static Shared,
    make: fn() -> Bridge<FakeRuntime>,
) -> &'static Mutex<Bridge<FakeRuntime>> {
    cell.get_or_init(|| Mutex::new(make()))
}

fn invoke(bridge: &mut Bridge<FakeRuntime>, host: &mut FakeHost) -> Result<(), BridgeError> {
    bridge.invoke_main(host)?;
    Ok(())
}

#[test]
fn marshal_error_throws_illegal_argument_once() {
    let lock = Mutex::new(bridge(Program::ExitSuccess));
    let mut host = FakeHost {
        name: Some("hello".to_string()),
        args: Some(vec![None]),
        ..FakeHost::default()
    };

    boundary_call(|| Ok(&lock), &mut host, "invokeMain", invoke);

    assert_eq!(host.thrown.len(), 1, "thrown={:?}", host.thrown);
    let (class, msg) = &host.thrown[0];
    assert_eq!(class, "java/lang/IllegalArgumentException");
    assert!(msg.starts_with("Jarify.invokeMain: could not convert 1 argument(s)"), "msg={msg}");
    assert!(host.fatal.is_empty());
    let bridge = lock.lock().expect("bridge lock");
    assert_eq!(bridge.runtime().inits, 0);
}

#[test]
fn successful_call_throws_nothing() {
    let lock = Mutex::new(bridge(Program::ExitSuccess));
    let mut host = FakeHost::new("hello", &["a"]);

    boundary_call(|| Ok(&lock), &mut host, "invokeMain", invoke);

    assert!(host.thrown.is_empty());
    assert!(host.fatal.is_empty());
    assert_eq!(lock.lock().expect("bridge lock").runtime().reclaims, 1);
}

static REENTRY: Shared = OnceCell::new();

fn reentry_bridge() -> &'static Mutex<Bridge<FakeRuntime>> {
    shared(&REENTRY, || {
        let mut runtime = FakeRuntime::new(Program::ReturnNormally);
        runtime.on_main = Some(call_back_in);
        bridge_with(runtime, BridgeConfig::default())
    })
}

fn call_back_in(rt: &mut FakeRuntime) {
    let mut host = FakeHost::new("inner", &[]);
    boundary_call(|| Ok(reentry_bridge()), &mut host, "initializeHaskell", |bridge, host| {
        bridge.initialize(host)
    });
    rt.inner_thrown.append(&mut host.thrown);
}

#[test]
fn call_from_inside_main_is_refused_without_locking() {
    let mut host = FakeHost::new("hello", &[]);

    boundary_call(|| Ok(reentry_bridge()), &mut host, "invokeMain", invoke);

    assert!(host.thrown.is_empty(), "thrown={:?}", host.thrown);
    let bridge = reentry_bridge().lock().expect("bridge lock");
    let rt = bridge.runtime();
    assert_eq!(rt.evals, 1);
    assert_eq!(rt.inits, 1, "the refused call must not initialize");
    assert_eq!(rt.inner_thrown.len(), 1);
    let (class, msg) = &rt.inner_thrown[0];
    assert_eq!(class, "java/lang/IllegalStateException");
    assert!(msg.starts_with("Jarify.initializeHaskell: "), "msg={msg}");
    assert_eq!(current_phase(), Phase::Done);
}

#[test]
fn panic_is_one_fatal_error_and_the_bridge_stays_usable() {
    let lock = Mutex::new(bridge(Program::ExitSuccess));
    let mut host = FakeHost::new("hello", &[]);

    let result = catch_unwind(AssertUnwindSafe(|| {
        boundary_call(|| Ok(&lock), &mut host, "invokeMain", |_, _| -> Result<(), BridgeError> {
            panic!("op blew up")
        })
    }));

    assert!(result.is_err(), "host fatal error does not return");
    assert_eq!(host.fatal, vec!["Jarify.invokeMain: internal panic"]);
    assert!(host.thrown.is_empty());

    let mut again = FakeHost::new("hello", &[]);
    boundary_call(|| Ok(&lock), &mut again, "invokeMain", invoke);
    assert!(again.thrown.is_empty());
    assert!(again.fatal.is_empty());
}

#[test]
fn unresolvable_bridge_is_a_fatal_error() {
    let mut host = FakeHost::new("hello", &[]);

    let result = catch_unwind(AssertUnwindSafe(|| {
        boundary_call(
            || -> Result<&'static Mutex<Bridge<FakeRuntime>>, BridgeError> {
                Err(BridgeError::MissingSymbol("hs_init_with_rtsopts".to_string()))
            },
            &mut host,
            "initializeHaskell",
            |bridge, host| bridge.initialize(host),
        )
    }));

    assert!(result.is_err());
    assert_eq!(host.fatal.len(), 1);
    assert!(host.fatal[0].contains("hs_init_with_rtsopts"), "fatal={:?}", host.fatal);
    assert!(host.thrown.is_empty());
}

static SERIAL: Shared = OnceCell::new();
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
static MAX_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

#[test]
fn calls_from_two_threads_are_serialized() {
    let serial = || shared(&SERIAL, || bridge(Program::ExitSuccess));

    let workers: Vec<_> = (0..2)
        .map(|worker| {
            thread::spawn(move || {
                for i in 0..8 {
                    let name = format!("worker-{worker}-{i}");
                    let mut host = FakeHost::new(&name, &[]);
                    boundary_call(|| Ok(serial()), &mut host, "invokeMain", |bridge, host| {
                        let running = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
                        MAX_IN_FLIGHT.fetch_max(running, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        let result = invoke(bridge, host);
                        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
                        result
                    });
                    assert!(host.thrown.is_empty(), "thrown={:?}", host.thrown);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }

    assert_eq!(MAX_IN_FLIGHT.load(Ordering::SeqCst), 1);
    let bridge = serial().lock().expect("bridge lock");
    assert_eq!(bridge.runtime().evals, 16);
    assert_eq!(bridge.runtime().reclaims, 16);
}
