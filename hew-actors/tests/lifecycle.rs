//! Links, monitors, failures, names, groups, output, and delayed sends.

mod common;

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::{config, init_tracing, is, runtime, wait_until, Capture, WAIT};
use hew_actors::{
    atom, behavior, msg, on, on_if, ActorRef, Atom, Behavior, Context, DownMsg, Error, ExitMsg,
    ExitReason, Runtime, SpawnFlags,
};

type Slot<T> = Arc<Mutex<Option<T>>>;

fn slot<T>() -> Slot<T> {
    Arc::new(Mutex::new(None))
}

/// Quits with the user-defined reason carried by a `u32`, or normally on `stop`.
fn spawn_obedient(rt: &Runtime) -> ActorRef {
    rt.spawn(|_ctx: &mut Context| {
        behavior![
            on(|ctx: &mut Context, (code,): (u32,)| ctx.quit(ExitReason::user_defined(code))),
            on_if(is("stop"), |ctx: &mut Context, _: (Atom,)| ctx.quit(ExitReason::NORMAL)),
        ]
    })
    .unwrap()
}

#[test]
fn monitor_reports_the_exit_reason() {
    let rt = runtime(2);
    let down = slot::<DownMsg>();
    let child = slot::<ActorRef>();
    {
        let down = Arc::clone(&down);
        let child = Arc::clone(&child);
        rt.spawn(move |ctx: &mut Context| {
            let spawned = ctx
                .spawn(SpawnFlags::MONITORED, |ctx: &mut Context| {
                    ctx.quit(ExitReason::user_defined(7));
                    Behavior::default()
                })
                .unwrap();
            *child.lock().unwrap() = Some(spawned);
            behavior![on(move |ctx: &mut Context, (msg,): (DownMsg,)| {
                *down.lock().unwrap() = Some(msg);
                ctx.quit(ExitReason::NORMAL);
            })]
        })
        .unwrap();
    }

    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    let down = down.lock().unwrap().clone().unwrap();
    let child = child.lock().unwrap().clone().unwrap();
    assert_eq!(down.reason, ExitReason::user_defined(7));
    assert_eq!(down.source, child.addr());
    rt.shutdown();
}

#[test]
fn trapped_exit_arrives_as_a_message() {
    let rt = runtime(2);
    let target = spawn_obedient(&rt);
    let trapped = slot::<ExitMsg>();
    let linked = Arc::new(AtomicBool::new(false));
    let watcher = {
        let trapped = Arc::clone(&trapped);
        let linked = Arc::clone(&linked);
        let target = target.clone();
        rt.spawn(move |ctx: &mut Context| {
            ctx.trap_exit(true);
            ctx.link_to(&target).unwrap();
            linked.store(true, Ordering::SeqCst);
            behavior![on(move |_ctx: &mut Context, (exit,): (ExitMsg,)| {
                *trapped.lock().unwrap() = Some(exit);
            })]
        })
        .unwrap()
    };

    assert!(wait_until(|| linked.load(Ordering::SeqCst)));
    target.send(msg![9u32]);
    assert!(wait_until(|| trapped.lock().unwrap().is_some()));
    let exit = trapped.lock().unwrap().clone().unwrap();
    assert_eq!(exit.reason, ExitReason::user_defined(9));
    assert_eq!(exit.source, target.addr());
    assert!(watcher.is_alive());
    rt.shutdown();
}

fn spawn_parent_with_linked_child(rt: &Runtime) -> (ActorRef, ActorRef) {
    let child = slot::<ActorRef>();
    let parent = {
        let child = Arc::clone(&child);
        rt.spawn(move |ctx: &mut Context| {
            let spawned = ctx
                .spawn(SpawnFlags::LINKED, |_ctx: &mut Context| {
                    behavior![on(|_ctx: &mut Context, (_n,): (i32,)| {})]
                })
                .unwrap();
            *child.lock().unwrap() = Some(spawned);
            behavior![
                on(|ctx: &mut Context, (code,): (u32,)| ctx.quit(ExitReason::user_defined(code))),
                on_if(is("stop"), |ctx: &mut Context, _: (Atom,)| ctx.quit(ExitReason::NORMAL)),
            ]
        })
        .unwrap()
    };
    assert!(wait_until(|| child.lock().unwrap().is_some()));
    let child = child.lock().unwrap().clone().unwrap();
    (parent, child)
}

#[test]
fn linked_child_dies_with_its_parent() {
    let rt = runtime(2);
    let (parent, child) = spawn_parent_with_linked_child(&rt);

    parent.send(msg![5u32]);
    assert!(wait_until(|| child.exit_reason() == ExitReason::user_defined(5)));
    assert_eq!(parent.exit_reason(), ExitReason::user_defined(5));
    assert!(rt.await_running_count_equal_timeout(0, WAIT));
    rt.shutdown();
}

#[test]
fn linked_child_survives_a_normal_exit() {
    let rt = runtime(2);
    let (parent, child) = spawn_parent_with_linked_child(&rt);

    parent.send(msg![atom("stop")]);
    assert!(wait_until(|| parent.exit_reason() == ExitReason::NORMAL));
    thread::sleep(Duration::from_millis(20));
    assert!(child.is_alive());
    assert_eq!(rt.registry().running(), 1);
    rt.shutdown();
    assert_eq!(child.exit_reason(), ExitReason::USER_SHUTDOWN);
}

#[test]
fn panicking_handler_is_an_unhandled_exception() {
    let rt = runtime(2);
    let boom = || {
        |_ctx: &mut Context| {
            behavior![on(|_ctx: &mut Context, (n,): (i32,)| {
                assert!(n < 0, "boom on {n}");
            })]
        }
    };

    let mut me = rt.scoped().unwrap();

    let watched = rt.spawn(boom()).unwrap();
    me.monitor(&watched).unwrap();
    watched.send(msg![1i32]);
    let down = slot::<DownMsg>();
    {
        let down = Arc::clone(&down);
        me.receive(behavior![on(move |_ctx: &mut Context, (msg,): (DownMsg,)| {
            *down.lock().unwrap() = Some(msg);
        })])
        .unwrap();
    }
    let down = down.lock().unwrap().clone().unwrap();
    assert_eq!(down.reason, ExitReason::UNHANDLED_EXCEPTION);

    let requested = rt.spawn(boom()).unwrap();
    let failure = slot::<ExitReason>();
    {
        let failure = Arc::clone(&failure);
        me.timed_sync_send(&requested, WAIT, msg![2i32])
            .unwrap()
            .on_failure(move |_ctx: &mut Context, reason| {
                *failure.lock().unwrap() = Some(reason);
            })
            .receive(behavior![on(|_ctx: &mut Context, (_n,): (i32,)| {})])
            .unwrap();
    }
    assert_eq!(*failure.lock().unwrap(), Some(ExitReason::UNHANDLED_EXCEPTION));

    drop(me);
    rt.shutdown();
}

#[test]
fn names_follow_actor_lifetime() {
    let rt = runtime(2);
    let registry = rt.registry();
    let first = spawn_obedient(&rt);
    let second = spawn_obedient(&rt);

    registry.register_name("db", &first).unwrap();
    assert!(matches!(
        registry.register_name("db", &second),
        Err(Error::NameTaken(name)) if name == "db"
    ));
    assert_eq!(registry.whereis("db"), Some(first.clone()));

    first.send(msg![atom("stop")]);
    assert!(wait_until(|| registry.whereis("db").is_none()));

    registry.register_name("db", &second).unwrap();
    assert_eq!(registry.whereis("db"), Some(second.clone()));
    assert!(registry.unregister_name("db"));
    assert!(!registry.unregister_name("db"));
    assert!(registry.whereis("db").is_none());
    rt.shutdown();
}

#[test]
fn group_broadcasts_reach_every_member() {
    let rt = runtime(2);
    let group = rt.group("workers");
    let total = Arc::new(AtomicI32::new(0));
    let members: Vec<ActorRef> = (0..2)
        .map(|_| {
            let group = group.clone();
            let total = Arc::clone(&total);
            rt.spawn(move |ctx: &mut Context| {
                ctx.join(&group);
                behavior![
                    on(move |_ctx: &mut Context, (n,): (i32,)| {
                        total.fetch_add(n, Ordering::SeqCst);
                    }),
                    on_if(is("stop"), |ctx: &mut Context, _: (Atom,)| {
                        ctx.quit(ExitReason::NORMAL);
                    }),
                ]
            })
            .unwrap()
        })
        .collect();

    assert!(wait_until(|| group.len() == 2));
    assert!(rt.group("workers").same_as(&group));

    rt.send(&group, msg![5i32]);
    assert!(wait_until(|| total.load(Ordering::SeqCst) == 10));

    rt.delayed_send(&group, Duration::from_millis(20), msg![1i32]);
    assert!(wait_until(|| total.load(Ordering::SeqCst) == 12));

    for member in &members {
        member.send(msg![atom("stop")]);
    }
    assert!(wait_until(|| group.is_empty()));
    rt.shutdown();
}

#[test]
fn printed_output_is_line_buffered_per_actor() {
    init_tracing();
    let out = Capture::default();
    let rt = Runtime::with_printer_output(config(1), out.clone()).unwrap();
    rt.spawn(|ctx: &mut Context| {
        ctx.print("hello ");
        ctx.print("world\npartial");
        ctx.quit(ExitReason::NORMAL);
        Behavior::default()
    })
    .unwrap();

    assert!(wait_until(|| out.contents() == "hello world\npartial\n"));
    rt.shutdown();
}

#[test]
fn delayed_messages_arrive_in_deadline_order() {
    let rt = runtime(1);
    let mut me = rt.scoped().unwrap();
    let target = me.self_ref().clone();
    let start = Instant::now();
    me.delayed_send(&target, Duration::from_millis(60), msg![2i32]);
    me.delayed_send(&target, Duration::from_millis(20), msg![1i32]);

    let order = Arc::new(Mutex::new(Vec::new()));
    {
        let order = Arc::clone(&order);
        me.receive_for(
            2,
            behavior![on(move |_ctx: &mut Context, (n,): (i32,)| {
                order.lock().unwrap().push(n);
            })],
        )
        .unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    assert!(start.elapsed() >= Duration::from_millis(60));
    drop(me);
    rt.shutdown();
}
