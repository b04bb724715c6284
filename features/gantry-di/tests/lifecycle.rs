use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use gantry_di::{
    on_property, option, Arg, Bean, ContainerError, DiContainer, ProcessContext, Value, Variadic,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct Memory {
    size: usize,
}
impl Bean for Memory {}

#[test]
fn configurers_run_in_hint_order() {
    init_logging();
    let log: Log = Log::default();
    let mut container = DiContainer::new();

    for (name, after) in [("metrics", None), ("database", Some("logging")), ("logging", None)] {
        let log = log.clone();
        let configurer = container
            .configure(move || record(&log, name))
            .unwrap()
            .name(name);
        if let Some(after) = after {
            configurer.after([after]);
        }
    }
    let late = log.clone();
    container
        .configure(move || record(&late, "first"))
        .unwrap()
        .name("first")
        .before(["metrics", "logging"]);
    container.refresh().unwrap();

    assert_eq!(entries(&log), ["first", "metrics", "logging", "database"]);
}

#[test]
fn configurers_run_before_wiring_and_may_use_beans() {
    let log: Log = Log::default();
    let mut container = DiContainer::new();

    let wired = log.clone();
    container
        .factory(move || {
            record(&wired, "memory wired");
            Memory { size: 64 }
        })
        .unwrap();
    let configured = log.clone();
    container
        .configure(move |memory: Arc<Memory>, region: Value<String>| {
            record(&configured, format!("{} {}", *region, memory.size));
        })
        .unwrap()
        .args([Arg::Auto, Arg::property("${region:=eu}")]);
    container.refresh().unwrap();

    assert_eq!(entries(&log), ["memory wired", "eu 64"]);
}

#[test]
fn configurers_may_be_disabled() {
    let log: Log = Log::default();
    let mut container = DiContainer::new();
    let disabled = log.clone();
    container
        .configure(move || record(&disabled, "disabled"))
        .unwrap()
        .condition(on_property("feature.enabled").having_value("true"));
    container.property("feature.enabled", "false").unwrap();
    container.refresh().unwrap();

    assert!(entries(&log).is_empty());
}

#[test]
fn configurer_cycles_fail_refresh() {
    let mut container = DiContainer::new();
    container.configure(|| {}).unwrap().name("a").before(["b"]);
    container.configure(|| {}).unwrap().name("b").before(["a"]);

    let Err(ContainerError::SortingCycle { chain }) = container.refresh() else {
        panic!("expected a sorting cycle");
    };
    assert_eq!(chain.first(), chain.last());
    assert!(chain.contains(&"a".to_string()));
    assert!(chain.contains(&"b".to_string()));
}

#[test]
fn failing_configurers_fail_refresh() {
    let mut container = DiContainer::new();
    container
        .configure(|| -> Result<(), String> { Err("bad setup".to_string()) })
        .unwrap()
        .name("setup");

    let error = container.refresh().unwrap_err();
    assert!(matches!(
        &error,
        ContainerError::UserCallbackFailed { callback, .. } if callback == "configurer 'setup'"
    ));
}

#[test]
fn init_hooks_run_after_fields_and_may_fail() {
    let log: Log = Log::default();
    let mut container = DiContainer::new();
    container.property("memory.label", "cache").unwrap();

    let init = log.clone();
    container
        .object(Memory { size: 8 })
        .unwrap()
        .init_with(
            move |memory: &Memory, label: Value<String>| record(&init, format!("{} {}", *label, memory.size)),
            ["${memory.label}"],
        );
    container.refresh().unwrap();
    assert_eq!(entries(&log), ["cache 8"]);

    let mut container = DiContainer::new();
    container
        .object(Memory { size: 8 })
        .unwrap()
        .init(|_: &Memory| -> Result<(), &'static str> { Err("refused") });
    let error = container.refresh().unwrap_err();
    assert!(matches!(
        error.root(),
        ContainerError::UserCallbackFailed { callback, .. } if callback == "init of bean 'Memory'"
    ));
    assert_eq!(error.wiring_path().unwrap(), ["Memory"]);
}

#[test]
fn registration_closes_with_refresh() {
    let mut container = DiContainer::new();
    assert!(matches!(container.get::<Memory>(), Err(ContainerError::NotRefreshed)));
    assert!(matches!(
        container.invoke(|| {}),
        Err(ContainerError::NotRefreshed)
    ));

    container.refresh().unwrap();
    assert!(container.is_refreshed());
    assert!(matches!(
        container.object(Memory { size: 1 }),
        Err(ContainerError::RegistrationFrozen)
    ));
    assert!(matches!(
        container.property("late", 1),
        Err(ContainerError::RegistrationFrozen)
    ));
    assert!(matches!(container.refresh(), Err(ContainerError::RegistrationFrozen)));
    assert!(container.is_refreshed());
}

#[test]
fn invoke_resolves_parameters_from_the_container() {
    let mut container = DiContainer::new();
    container.object(Memory { size: 32 }).unwrap();
    container.property("limits.max", 10).unwrap();
    container.refresh().unwrap();

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    container
        .invoke_with(
            move |memory: Arc<Memory>, max: Value<u32>| {
                *sink.lock().unwrap() = Some(memory.size as u32 + *max);
            },
            [Arg::Auto, Arg::property("${limits.max}")],
        )
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(42));

    let error = container
        .invoke(|| -> Result<(), String> { Err("nope".to_string()) })
        .unwrap_err();
    assert!(matches!(error, ContainerError::UserCallbackFailed { .. }));

    let error = container.invoke(|_: Arc<String>| {}).unwrap_err();
    assert!(matches!(error, ContainerError::BeanNotFound { .. }));
}

#[test]
fn variadic_options_follow_their_conditions() {
    let mut container = DiContainer::new();
    container.property("tls.enabled", true).unwrap();
    container.object(Memory { size: 2 }).unwrap();
    container.refresh().unwrap();

    let seen: Log = Log::default();
    let sink = seen.clone();
    container
        .invoke_with(
            move |layers: Variadic<Arc<String>>| {
                for layer in layers.iter() {
                    record(&sink, layer.as_str());
                }
            },
            [
                Arg::literal(Arc::new("plain".to_string())),
                option(|| Arc::new("tls".to_string()))
                    .on(on_property("tls.enabled"))
                    .into(),
                option(|memory: Arc<Memory>| Arc::new(format!("memory {}", memory.size))).into(),
                option(|| Arc::new("quic".to_string()))
                    .on(on_property("quic.enabled"))
                    .into(),
            ],
        )
        .unwrap();

    assert_eq!(entries(&seen), ["plain", "tls", "memory 2"]);
}

#[test]
fn close_cancels_tasks_before_destroying() {
    init_logging();
    let log: Log = Log::default();
    let mut container = DiContainer::new();
    let destroyed = log.clone();
    container
        .object(Memory { size: 1 })
        .unwrap()
        .destroy(move |_: &Memory| record(&destroyed, "destroy"));
    container.refresh().unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let task_log = log.clone();
    let task_started = started.clone();
    container
        .schedule(move |ctx: ProcessContext| async move {
            task_started.store(true, Ordering::SeqCst);
            ctx.cancelled().await;
            record(&task_log, "task");
        })
        .unwrap();

    let hook_log = log.clone();
    let hooks: Vec<Box<dyn FnOnce() + Send>> = vec![Box::new(move || record(&hook_log, "hook"))];
    container.close_with(hooks);

    assert!(started.load(Ordering::SeqCst));
    assert_eq!(entries(&log), ["hook", "task", "destroy"]);
    assert!(container.process().unwrap().is_cancelled());
}

#[test]
fn close_waits_for_tasks_scheduled_while_stopping() {
    init_logging();
    let log: Log = Log::default();
    let mut container = DiContainer::new();
    let destroyed = log.clone();
    container
        .object(Memory { size: 1 })
        .unwrap()
        .destroy(move |_: &Memory| record(&destroyed, "destroy"));
    container.refresh().unwrap();

    let flush_log = log.clone();
    container
        .schedule(move |ctx: ProcessContext| async move {
            ctx.cancelled().await;
            ctx.schedule(move |_| async move {
                std::thread::sleep(std::time::Duration::from_millis(100));
                record(&flush_log, "flushed");
            })
            .unwrap();
        })
        .unwrap();
    container.close();

    assert_eq!(entries(&log), ["flushed", "destroy"]);
}

#[test]
fn failing_destroyers_do_not_stop_the_others() {
    init_logging();
    let log: Log = Log::default();
    let mut container = DiContainer::new();

    let first = log.clone();
    container
        .object(Memory { size: 1 })
        .unwrap()
        .name("first")
        .destroy(move |_: &Memory| record(&first, "first"));
    container
        .object(Memory { size: 2 })
        .unwrap()
        .name("failing")
        .destroy(|_: &Memory| -> Result<(), &'static str> { Err("stuck") });
    container
        .object(Memory { size: 3 })
        .unwrap()
        .name("panicking")
        .destroy(|_: &Memory| -> () { panic!("destroy panicked") });
    container.refresh().unwrap();

    container.close();
    assert_eq!(entries(&log), ["first"]);
}
