/*!
 * Process Tests
 * Ownership, foreground/background accounting, auto-termination cascades,
 * shutdown subscriptions, and output routing
 */

mod common;

use common::{manual_kernel, Probe, TestUnit};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tick_kernel::{
    OutputBuffer, OutputSink, Priority, Process, ProcessError, ThreadOptions,
};

#[test]
fn launch_tracks_foreground_and_background_counts() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "counts");
    process.set_auto_remove(false);

    let fg = process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &Probe::new()).boxed(),
            ThreadOptions::default(),
        )
        .unwrap();
    let bg = process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &Probe::new()).boxed(),
            ThreadOptions::default().background(),
        )
        .unwrap();

    assert_eq!(process.thread_count(), 2);
    assert_eq!(process.foreground_count(), 1);
    assert_eq!(process.background_count(), 1);
    assert!(!fg.is_background());
    assert!(bg.is_background());
    assert_eq!(kernel.count(), 2);

    process.remove(&fg).unwrap();
    assert_eq!(process.thread_count(), 1);
    assert_eq!(process.foreground_count(), 0);
    assert_eq!(process.background_count(), 1);
}

#[test]
fn a_thread_cannot_be_owned_twice() {
    let (kernel, clock) = manual_kernel();
    let alpha = Process::new(Arc::clone(&kernel), "alpha");
    let beta = Process::new(Arc::clone(&kernel), "beta");
    alpha.set_auto_remove(false);

    let handle = alpha
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &Probe::new()).boxed(),
            ThreadOptions::default(),
        )
        .unwrap();

    let err = beta.add(&handle).unwrap_err();
    assert_eq!(
        err,
        ProcessError::DuplicateOwnership {
            thread: handle.id(),
            process: alpha.id(),
        }
    );
    let err = alpha.add(&handle).unwrap_err();
    assert!(matches!(err, ProcessError::DuplicateOwnership { .. }));
}

#[test]
fn remove_fails_for_a_thread_owned_elsewhere() {
    let (kernel, clock) = manual_kernel();
    let alpha = Process::new(Arc::clone(&kernel), "alpha");
    let beta = Process::new(Arc::clone(&kernel), "beta");
    alpha.set_auto_remove(false);

    let handle = alpha
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &Probe::new()).boxed(),
            ThreadOptions::default(),
        )
        .unwrap();

    let err = beta.remove(&handle).unwrap_err();
    assert_eq!(
        err,
        ProcessError::NotOwned {
            thread: handle.id(),
            process: beta.id(),
        }
    );
    // Ownership is untouched by the failed removal.
    assert_eq!(alpha.thread_count(), 1);
}

#[test]
fn terminated_process_refuses_new_threads() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "done");
    process.terminate(false);

    let err = process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &Probe::new()).boxed(),
            ThreadOptions::default(),
        )
        .unwrap_err();
    assert_eq!(err, ProcessError::Terminated(process.id()));
}

#[test]
fn background_flip_rebalances_counters() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "flip");
    process.set_auto_remove(false);

    let handle = process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &Probe::new()).boxed(),
            ThreadOptions::default(),
        )
        .unwrap();
    assert_eq!(process.foreground_count(), 1);
    assert_eq!(process.background_count(), 0);

    handle.set_background(true);
    assert_eq!(process.foreground_count(), 0);
    assert_eq!(process.background_count(), 1);

    handle.set_background(false);
    assert_eq!(process.foreground_count(), 1);
    assert_eq!(process.background_count(), 0);
}

#[test]
fn flipping_the_last_foreground_thread_terminates_the_process() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "flip-out");
    let probe = Probe::new();

    let handle = process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &probe).boxed(),
            ThreadOptions::default(),
        )
        .unwrap();

    handle.set_background(true);

    assert!(process.is_terminated());
    assert_eq!(process.thread_count(), 0);
    assert_eq!(kernel.count(), 0);
    assert_eq!(probe.terminated(), 1);
}

#[test]
fn finished_foreground_takes_background_threads_down() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "cascade");
    let worker = Probe::new();
    let daemon = Probe::new();
    let fired = Arc::new(AtomicU64::new(0));

    let _hook = {
        let fired = Arc::clone(&fired);
        process.on_shutdown(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    process
        .launch(
            Priority::Normal,
            TestUnit::work(&clock, &worker, 3).boxed(),
            ThreadOptions::default().named("worker"),
        )
        .unwrap();
    process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &daemon).boxed(),
            ThreadOptions::default().named("daemon").background(),
        )
        .unwrap();

    kernel.execute(1000);

    assert!(worker.finished());
    assert!(process.is_terminated());
    assert_eq!(process.thread_count(), 0);
    assert_eq!(kernel.count(), 0);
    assert_eq!(daemon.terminated(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn terminate_is_idempotent() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "twice");
    let fired = Arc::new(AtomicU64::new(0));

    let _hook = {
        let fired = Arc::clone(&fired);
        process.on_shutdown(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    process.terminate(false);
    process.terminate(true);

    assert!(process.is_terminated());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn disposed_shutdown_hook_never_fires() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "hooked");
    let fired = Arc::new(AtomicU64::new(0));

    let hook = {
        let fired = Arc::clone(&fired);
        process.on_shutdown(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert!(hook.is_attached());
    hook.dispose();

    process.terminate(false);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_a_shutdown_hook_detaches_it() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "dropped");
    let fired = Arc::new(AtomicU64::new(0));

    {
        let fired = Arc::clone(&fired);
        let _hook = process.on_shutdown(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    process.terminate(false);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_shutdown_subscriber_does_not_block_the_rest() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "resilient");
    let fired = Arc::new(AtomicU64::new(0));

    let _bad = process.on_shutdown(|| panic!("subscriber blew up"));
    let _good = {
        let fired = Arc::clone(&fired);
        process.on_shutdown(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    process.terminate(false);
    assert!(process.is_terminated());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn thread_faults_land_in_the_output_sink() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "scripted");
    let buffer = Arc::new(OutputBuffer::default());
    process.set_output(Some(Arc::clone(&buffer) as Arc<dyn OutputSink>));

    let probe = Probe::new();
    process
        .launch(
            Priority::Normal,
            TestUnit::fault(&clock, &probe, "bad script").boxed(),
            ThreadOptions::default().named("script"),
        )
        .unwrap();

    kernel.execute(1000);

    assert_eq!(probe.faulted(), 1);
    let errors = buffer.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("script"));
    assert!(errors[0].contains("bad script"));
    // The faulted thread was removed; an emptied process stays alive.
    assert_eq!(process.thread_count(), 0);
    assert!(!process.is_terminated());
}

#[test]
fn failing_update_handler_is_unsubscribed_and_siblings_survive() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "updates");
    let flaky_calls = Arc::new(AtomicU64::new(0));
    let steady_calls = Arc::new(AtomicU64::new(0));

    {
        let calls = Arc::clone(&flaky_calls);
        process.subscribe_physics(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("flaky handler"))
        });
    }
    {
        let calls = Arc::clone(&steady_calls);
        process.subscribe_physics(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    process.fixed_update();
    process.fixed_update();

    assert_eq!(flaky_calls.load(Ordering::SeqCst), 1);
    assert_eq!(steady_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn panicking_graphics_handler_is_unsubscribed() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "graphics");
    let steady_calls = Arc::new(AtomicU64::new(0));

    process.subscribe_graphics(|| panic!("handler blew up"));
    {
        let calls = Arc::clone(&steady_calls);
        process.subscribe_graphics(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    process.update();
    process.update();

    assert_eq!(steady_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unsubscribed_handler_stops_receiving_updates() {
    let (kernel, _clock) = manual_kernel();
    let process = Process::new(kernel, "unsub");
    let calls = Arc::new(AtomicU64::new(0));

    let id = {
        let calls = Arc::clone(&calls);
        process.subscribe_physics(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    process.fixed_update();
    process.unsubscribe_physics(id);
    process.fixed_update();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn thread_done_event_reports_the_finished_thread() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "events");
    process.set_auto_remove(false);
    let done: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let done = Arc::clone(&done);
        process.subscribe_thread_done(move |handle| {
            done.lock().unwrap().push(handle.id());
        });
    }

    let probe = Probe::new();
    let handle = process
        .launch(
            Priority::Normal,
            TestUnit::work(&clock, &probe, 2).boxed(),
            ThreadOptions::default(),
        )
        .unwrap();

    kernel.execute(1000);

    assert!(probe.finished());
    assert_eq!(*done.lock().unwrap(), vec![handle.id()]);
    // auto_remove on the handle removed it from the process.
    assert_eq!(process.thread_count(), 0);
}

#[test]
fn keep_when_done_thread_stays_registered_with_the_process() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "sticky");
    let probe = Probe::new();

    process
        .launch(
            Priority::Normal,
            TestUnit::work(&clock, &probe, 2).boxed(),
            ThreadOptions::default().keep_when_done(),
        )
        .unwrap();

    kernel.execute(1000);

    assert!(probe.finished());
    assert_eq!(kernel.count(), 0);
    assert_eq!(process.thread_count(), 1);
    assert!(!process.is_terminated());
}

#[test]
fn killed_background_thread_is_reported_done_once() {
    let (kernel, clock) = manual_kernel();
    let process = Process::new(Arc::clone(&kernel), "daemons");
    process.set_auto_remove(false);
    let probe = Probe::new();

    let handle = process
        .launch(
            Priority::Normal,
            TestUnit::spin(&clock, &probe).boxed(),
            ThreadOptions::default().background(),
        )
        .unwrap();

    kernel.kill(handle.id());
    kernel.execute(100);

    assert_eq!(probe.terminated(), 1);
    assert_eq!(process.thread_count(), 0);
    assert_eq!(kernel.count(), 0);
}

proptest! {
    /// Foreground plus background always equals the thread count, across
    /// arbitrary interleavings of launches, flips, and removals.
    #[test]
    fn counters_stay_consistent(ops in prop::collection::vec((0u8..4, 0usize..64), 1..40)) {
        let (kernel, clock) = manual_kernel();
        let process = Process::new(kernel, "fuzzed");
        process.set_auto_remove(false);
        let mut handles = Vec::new();

        for (op, pick) in ops {
            match op {
                0 | 1 => {
                    let mut options = ThreadOptions::default();
                    if op == 1 {
                        options = options.background();
                    }
                    let handle = process
                        .launch(
                            Priority::Normal,
                            TestUnit::spin(&clock, &Probe::new()).boxed(),
                            options,
                        )
                        .unwrap();
                    handles.push(handle);
                }
                2 => {
                    if !handles.is_empty() {
                        let handle = &handles[pick % handles.len()];
                        handle.set_background(!handle.is_background());
                    }
                }
                _ => {
                    if !handles.is_empty() {
                        let handle = handles.remove(pick % handles.len());
                        process.remove(&handle).unwrap();
                    }
                }
            }
            prop_assert_eq!(
                process.thread_count(),
                process.foreground_count() + process.background_count()
            );
        }
    }
}
