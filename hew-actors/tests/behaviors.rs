//! Behavior stack changes, message caching, timeouts, and priorities.

mod common;

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use common::{is, runtime, wait_until, WAIT};
use hew_actors::{
    atom, behavior, msg, on, on_if, ActorRef, Atom, Behavior, BlockingContext, Context,
    ExitReason, ScopedActor, SpawnFlags,
};

/// Request `tag` from `actor`; the atom it answers with, if any.
fn ask(me: &mut ScopedActor, actor: &ActorRef, tag: &'static str) -> Option<Atom> {
    let answer = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&answer);
    me.timed_sync_send(actor, WAIT, msg![atom(tag)])
        .unwrap()
        .receive(behavior![
            on(move |_ctx: &mut Context, (a,): (Atom,)| {
                *sink.lock().unwrap() = Some(a);
            }),
            on(|_ctx: &mut Context, (): ()| {}),
        ])
        .unwrap();
    let got = *answer.lock().unwrap();
    got
}

fn second() -> Behavior {
    behavior![
        on_if(is("which"), |_ctx: &mut Context, _: (Atom,)| msg![atom("second")]),
        on_if(is("back"), |ctx: &mut Context, _: (Atom,)| ctx.unbecome()),
    ]
}

fn base() -> Behavior {
    behavior![
        on_if(is("which"), |_ctx: &mut Context, _: (Atom,)| msg![atom("base")]),
        on_if(is("keep"), |ctx: &mut Context, _: (Atom,)| ctx.become_keep(second())),
        on_if(is("discard"), |ctx: &mut Context, _: (Atom,)| ctx.become_(second())),
    ]
}

#[test]
fn become_keep_and_discard() {
    let rt = runtime(2);
    let actor = rt.spawn(|_ctx: &mut Context| base()).unwrap();
    let mut me = rt.scoped().unwrap();

    assert_eq!(ask(&mut me, &actor, "which"), Some(atom("base")));

    assert_eq!(ask(&mut me, &actor, "keep"), None);
    assert_eq!(ask(&mut me, &actor, "which"), Some(atom("second")));
    assert_eq!(ask(&mut me, &actor, "back"), None);
    assert_eq!(ask(&mut me, &actor, "which"), Some(atom("base")));

    assert_eq!(ask(&mut me, &actor, "discard"), None);
    assert_eq!(ask(&mut me, &actor, "which"), Some(atom("second")));
    // The replaced base is gone: popping the only behavior ends the actor.
    assert_eq!(ask(&mut me, &actor, "back"), None);
    assert!(wait_until(|| actor.exit_reason() == ExitReason::NORMAL));

    drop(me);
    rt.shutdown();
}

#[test]
fn unmatched_messages_wait_for_a_behavior_change() {
    let rt = runtime(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let actor = {
        let seen = Arc::clone(&seen);
        rt.spawn(move |_ctx: &mut Context| {
            behavior![on_if(is("open"), move |ctx: &mut Context, _: (Atom,)| {
                let seen = Arc::clone(&seen);
                ctx.become_(behavior![on(move |_ctx: &mut Context, (n,): (i32,)| {
                    seen.lock().unwrap().push(n);
                })]);
            })]
        })
        .unwrap()
    };

    for n in 1..=3 {
        actor.send(msg![n]);
    }
    std::thread::sleep(Duration::from_millis(20));
    assert!(seen.lock().unwrap().is_empty());

    actor.send(msg![atom("open")]);
    actor.send(msg![4]);
    assert!(wait_until(|| seen.lock().unwrap().len() == 4));
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    rt.shutdown();
}

#[test]
fn idle_timeout_fires_once_per_quiet_period() {
    let rt = runtime(2);
    let fired = Arc::new(AtomicUsize::new(0));
    let actor = {
        let fired = Arc::clone(&fired);
        rt.spawn(move |_ctx: &mut Context| {
            Behavior::default().with_timeout(Duration::from_millis(30), move |ctx: &mut Context| {
                fired.fetch_add(1, Ordering::SeqCst);
                ctx.quit(ExitReason::NORMAL);
            })
        })
        .unwrap()
    };

    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(actor.exit_reason(), ExitReason::NORMAL);
    rt.shutdown();
}

#[test]
fn idle_timeout_rearms_after_firing() {
    let rt = runtime(2);
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        rt.spawn(move |_ctx: &mut Context| {
            Behavior::default().with_timeout(Duration::from_millis(10), move |ctx: &mut Context| {
                if fired.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    ctx.quit(ExitReason::NORMAL);
                }
            })
        })
        .unwrap();
    }

    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    assert_eq!(fired.load(Ordering::SeqCst), 3);
    rt.shutdown();
}

#[test]
fn messages_postpone_the_idle_timeout() {
    let rt = runtime(2);
    let handled = Arc::new(AtomicUsize::new(0));
    let handled_at_timeout = Arc::new(Mutex::new(None));
    let actor = {
        let handled = Arc::clone(&handled);
        let handled_at_timeout = Arc::clone(&handled_at_timeout);
        let observed = Arc::clone(&handled);
        rt.spawn(move |_ctx: &mut Context| {
            behavior![on(move |_ctx: &mut Context, (_n,): (i32,)| {
                handled.fetch_add(1, Ordering::SeqCst);
            })]
            .with_timeout(Duration::from_millis(150), move |ctx: &mut Context| {
                *handled_at_timeout.lock().unwrap() = Some(observed.load(Ordering::SeqCst));
                ctx.quit(ExitReason::NORMAL);
            })
        })
        .unwrap()
    };

    for n in 0..5 {
        actor.send(msg![n]);
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    assert_eq!(*handled_at_timeout.lock().unwrap(), Some(5));
    rt.shutdown();
}

#[test]
fn blocking_receive_timeout_runs_its_handler() {
    let rt = runtime(1);
    let mut me = rt.scoped().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        me.receive(
            behavior![on(|_ctx: &mut Context, (_n,): (i32,)| {})].with_timeout(
                Duration::from_millis(20),
                move |_ctx: &mut Context| {
                    fired.fetch_add(1, Ordering::SeqCst);
                },
            ),
        )
        .unwrap();
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    drop(me);
    rt.shutdown();
}

#[test]
fn unbounded_receive_timeout_never_fires() {
    let rt = runtime(1);
    let mut me = rt.scoped().unwrap();
    let target = me.self_ref().clone();
    me.send(&target, msg![1i32]);

    let got = Arc::new(AtomicI32::new(0));
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let got = Arc::clone(&got);
        let fired = Arc::clone(&fired);
        me.receive(
            behavior![on(move |_ctx: &mut Context, (n,): (i32,)| {
                got.store(n, Ordering::SeqCst);
            })]
            .with_timeout(Duration::MAX, move |_ctx: &mut Context| {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
    }
    assert_eq!(got.load(Ordering::SeqCst), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    drop(me);
    rt.shutdown();
}

#[test]
fn handler_can_block_on_a_nested_receive() {
    let rt = runtime(2);
    let doubler = rt
        .spawn(|_ctx: &mut Context| behavior![on(|_ctx: &mut Context, (n,): (i32,)| msg![n * 2])])
        .unwrap();
    let relay = rt
        .spawn(move |_ctx: &mut Context| {
            behavior![on(move |ctx: &mut Context, (n,): (i32,)| {
                let mut inner = ctx.runtime().scoped().unwrap();
                let answer = Arc::new(AtomicI32::new(0));
                let sink = Arc::clone(&answer);
                inner
                    .timed_sync_send(&doubler, WAIT, msg![n])
                    .unwrap()
                    .receive(behavior![on(move |_ctx: &mut Context, (m,): (i32,)| {
                        sink.store(m, Ordering::SeqCst);
                    })])
                    .unwrap();
                drop(inner);
                msg![answer.load(Ordering::SeqCst) + 1]
            })]
        })
        .unwrap();

    let mut me = rt.scoped().unwrap();
    let answer = Arc::new(AtomicI32::new(0));
    {
        let answer = Arc::clone(&answer);
        me.timed_sync_send(&relay, WAIT, msg![20i32])
            .unwrap()
            .receive(behavior![on(move |_ctx: &mut Context, (n,): (i32,)| {
                answer.store(n, Ordering::SeqCst);
            })])
            .unwrap();
    }
    assert_eq!(answer.load(Ordering::SeqCst), 41);
    drop(me);
    rt.shutdown();
}

#[test]
fn high_priority_overtakes_queued_mail() {
    let rt = runtime(2);
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let order = Arc::new(Mutex::new(Vec::new()));
    let actor = {
        let order = Arc::clone(&order);
        rt.spawn_blocking(
            SpawnFlags::PRIORITY_AWARE,
            move |bctx: &mut BlockingContext| {
                let _ = gate_rx.recv();
                bctx.receive_for(
                    4,
                    behavior![on(move |_ctx: &mut Context, (n,): (i32,)| {
                        order.lock().unwrap().push(n);
                    })],
                )
            },
        )
        .unwrap()
    };

    let me = rt.scoped().unwrap();
    for n in 1..=3 {
        me.send(&actor, msg![n]);
    }
    me.send_high_priority(&actor, msg![99]);
    gate_tx.send(()).unwrap();

    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    assert_eq!(*order.lock().unwrap(), vec![99, 1, 2, 3]);
    assert_eq!(actor.exit_reason(), ExitReason::NORMAL);
    drop(me);
    rt.shutdown();
}

#[test]
fn priority_flag_is_ignored_without_priority_awareness() {
    let rt = runtime(2);
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let order = Arc::new(Mutex::new(Vec::new()));
    let actor = {
        let order = Arc::clone(&order);
        rt.spawn_blocking(SpawnFlags::empty(), move |bctx: &mut BlockingContext| {
            let _ = gate_rx.recv();
            bctx.receive_for(
                3,
                behavior![on(move |_ctx: &mut Context, (n,): (i32,)| {
                    order.lock().unwrap().push(n);
                })],
            )
        })
        .unwrap()
    };

    let me = rt.scoped().unwrap();
    me.send(&actor, msg![1]);
    me.send(&actor, msg![2]);
    me.send_high_priority(&actor, msg![99]);
    gate_tx.send(()).unwrap();

    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 99]);
    drop(me);
    rt.shutdown();
}
