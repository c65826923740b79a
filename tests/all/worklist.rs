use crate::{init_logging, test_module, FakeCompiler, Gate};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wasm_tiering::{CodeBlock, MemoryMode, Worklist};

#[test]
fn synchronous_completion_steals_a_queued_task() {
    init_logging();
    let worklist = Worklist::new(1);

    let started = Gate::new();
    let release = Gate::new();
    let busy = CodeBlock::new(
        &worklist,
        MemoryMode::BoundsChecking,
        test_module(1),
        Arc::new(FakeCompiler {
            started: Some(started.clone()),
            release: Some(release.clone()),
            ..FakeCompiler::new(0x1000)
        }),
    );
    // The only worker is now parked inside the compiler, so the next task
    // stays queued.
    started.wait_open();

    let compiler = Arc::new(FakeCompiler::new(0x2000));
    let block = CodeBlock::new(
        &worklist,
        MemoryMode::BoundsChecking,
        test_module(1),
        Arc::<FakeCompiler>::clone(&compiler),
    );
    block.wait_until_finished();

    assert!(block.runnable());
    assert_eq!(
        *compiler.compiled_on.lock().unwrap(),
        Some(thread::current().id())
    );

    release.open();
    busy.wait_until_finished();
    assert!(busy.runnable());
    worklist.shutdown();
}

#[test]
fn synchronous_completion_waits_for_a_running_task() {
    init_logging();
    let worklist = Worklist::new(1);
    let started = Gate::new();
    let release = Gate::new();
    let compiler = Arc::new(FakeCompiler {
        started: Some(started.clone()),
        release: Some(release.clone()),
        ..FakeCompiler::new(0x3000)
    });
    let block = CodeBlock::new(
        &worklist,
        MemoryMode::BoundsChecking,
        test_module(1),
        Arc::<FakeCompiler>::clone(&compiler),
    );
    started.wait_open();

    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        release.open();
    });
    block.wait_until_finished();

    assert!(block.runnable());
    assert_ne!(
        *compiler.compiled_on.lock().unwrap(),
        Some(thread::current().id())
    );
    opener.join().unwrap();
    worklist.shutdown();
}

#[test]
fn shutdown_drains_already_enqueued_tasks() {
    init_logging();
    let worklist = Worklist::new(1);
    let blocks: Vec<_> = (0..4usize)
        .map(|i| {
            CodeBlock::new(
                &worklist,
                MemoryMode::BoundsChecking,
                test_module(1),
                Arc::new(FakeCompiler::new(0x1000 * (i + 1))),
            )
        })
        .collect();
    worklist.shutdown();

    for block in &blocks {
        block.wait_until_finished();
        assert!(block.runnable());
    }
}

#[test]
#[should_panic(expected = "shutting down")]
fn enqueue_after_shutdown_panics() {
    let worklist = Worklist::new(1);
    worklist.shutdown();
    let _ = CodeBlock::new(
        &worklist,
        MemoryMode::BoundsChecking,
        test_module(1),
        Arc::new(FakeCompiler::new(0x1000)),
    );
}

#[test]
fn many_modules_compile_concurrently() {
    init_logging();
    let worklist = Worklist::new(4);
    let blocks: Vec<_> = (0..32usize)
        .map(|i| {
            CodeBlock::new(
                &worklist,
                MemoryMode::BoundsChecking,
                test_module((i % 5 + 1) as u32),
                Arc::new(FakeCompiler::new(0x1_0000 * (i + 1))),
            )
        })
        .collect();

    for (i, block) in blocks.iter().enumerate() {
        block.wait_until_finished();
        assert!(block.runnable());
        assert_eq!(block.function_count(), (i % 5 + 1) as u32);
    }
    worklist.shutdown();
}
