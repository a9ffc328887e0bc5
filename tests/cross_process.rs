#![allow(missing_docs)]
//! Semaphores shared with forked children through an anonymous mapping.
//!
//! Children only post and wait; library logging stays below the enabled
//! level so nothing in a child touches the subscriber's locks.

#[macro_use]
mod common;

use common::*;
use procsem::{ErrorKind, RawSemaphore, Sharing, Timeout};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn init_test(test_name: &str) {
    init_test_logging_with_level(tracing::Level::INFO);
    test_phase!(test_name);
}

const CHILD_OK: i32 = 0;
const CHILD_WAIT_FAILED: i32 = 10;
const CHILD_POST_FAILED: i32 = 11;

#[test]
fn child_post_wakes_parent() {
    init_test("child_post_wakes_parent");
    let _fork = fork_lock();
    let region = SharedRegion::page();
    let sem = region.init(0, Sharing::Process, 0);

    let child = Child::spawn(|| {
        std::thread::sleep(Duration::from_millis(50));
        if region.attach(0).post().is_err() {
            return CHILD_POST_FAILED;
        }
        CHILD_OK
    });

    let (res, elapsed) = timed(|| sem.wait(Timeout::After(Duration::from_secs(10))));
    res.expect("child posted before the deadline");
    assert_eq!(child.join(), CHILD_OK);
    assert_with_log!(
        elapsed < Duration::from_secs(10),
        "woken by the child, not the deadline",
        "< 10s",
        elapsed
    );
    assert_eq!(sem.value().unwrap(), 0);

    unsafe { sem.destroy() }.expect("destroy");
    test_complete!("child_post_wakes_parent");
}

#[test]
fn ping_pong_between_processes() {
    init_test("ping_pong_between_processes");
    let _fork = fork_lock();
    let region = SharedRegion::page();
    let ping = region.init(0, Sharing::Process, 0);
    let pong = region.init(1, Sharing::Process, 0);
    let rounds = region.word(1024);
    rounds.store(0, Ordering::SeqCst);

    const ROUNDS: u32 = 50;
    let child = Child::spawn(|| {
        let ping = region.attach(0);
        let pong = region.attach(1);
        for _ in 0..ROUNDS {
            if ping.wait(Timeout::Infinite).is_err() {
                return CHILD_WAIT_FAILED;
            }
            rounds.fetch_add(1, Ordering::SeqCst);
            if pong.post().is_err() {
                return CHILD_POST_FAILED;
            }
        }
        CHILD_OK
    });

    for round in 0..ROUNDS {
        ping.post().expect("post ping");
        pong.wait(Timeout::After(Duration::from_secs(10)))
            .expect("pong from child");
        let seen = rounds.load(Ordering::SeqCst);
        assert_with_log!(seen == round + 1, "child completed round", round + 1, seen);
    }
    assert_eq!(child.join(), CHILD_OK);

    unsafe { ping.destroy() }.expect("destroy ping");
    unsafe { pong.destroy() }.expect("destroy pong");
    test_complete!("ping_pong_between_processes", rounds = ROUNDS);
}

#[test]
fn single_permit_goes_to_one_process() {
    init_test("single_permit_goes_to_one_process");
    let _fork = fork_lock();
    let region = SharedRegion::page();
    let sem = region.init(0, Sharing::Process, 1);
    let winners = region.word(1024);
    winners.store(0, Ordering::SeqCst);

    let children: Vec<_> = (0..2)
        .map(|_| {
            Child::spawn(|| match region.attach(0).wait(Timeout::Immediate) {
                Ok(()) => {
                    winners.fetch_add(1, Ordering::SeqCst);
                    CHILD_OK
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => CHILD_OK,
                Err(_) => CHILD_WAIT_FAILED,
            })
        })
        .collect();
    for child in children {
        assert_eq!(child.join(), CHILD_OK);
    }

    let won = winners.load(Ordering::SeqCst);
    assert_with_log!(won == 1, "exactly one child took the permit", 1, won);
    assert_eq!(sem.value().unwrap(), 0);
    unsafe { sem.destroy() }.expect("destroy");
    test_complete!("single_permit_goes_to_one_process");
}

#[test]
fn child_sees_parent_count() {
    init_test("child_sees_parent_count");
    let _fork = fork_lock();
    let region = SharedRegion::page();
    let sem = region.init(0, Sharing::Process, 0);
    for _ in 0..3 {
        sem.post().unwrap();
    }

    let child = Child::spawn(|| {
        let sem = region.attach(0);
        for _ in 0..3 {
            if sem.wait(Timeout::Immediate).is_err() {
                return CHILD_WAIT_FAILED;
            }
        }
        match sem.wait(Timeout::Immediate) {
            Err(err) if err.kind() == ErrorKind::WouldBlock => CHILD_OK,
            _ => CHILD_WAIT_FAILED,
        }
    });
    assert_eq!(child.join(), CHILD_OK);
    assert_eq!(sem.value().unwrap(), 0);
    unsafe { sem.destroy() }.expect("destroy");
    test_complete!("child_sees_parent_count");
}

#[test]
fn c_abi_across_fork() {
    init_test("c_abi_across_fork");
    let _fork = fork_lock();
    let region = SharedRegion::page();
    let addr = region.slot(0).cast::<std::os::raw::c_char>();

    unsafe {
        assert_eq!(procsem::ffi::procsem_init(addr, 1, 0), 0);
    }
    let child = Child::spawn(|| {
        // SAFETY: initialized above and not destroyed until after join.
        if unsafe { procsem::ffi::procsem_post(addr) } != 0 {
            return CHILD_POST_FAILED;
        }
        CHILD_OK
    });
    assert_eq!(child.join(), CHILD_OK);

    unsafe {
        let mut val = -1;
        assert_eq!(procsem::ffi::procsem_getvalue(addr, &mut val), 0);
        assert_eq!(val, 1);
        assert_eq!(procsem::ffi::procsem_wait(addr, 1.5), 0);
        assert_eq!(procsem::ffi::procsem_destroy(addr), 0);
    }
    assert!(RawSemaphore::size() <= region.len());
    test_complete!("c_abi_across_fork");
}
