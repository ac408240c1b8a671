/*!
 * Resilience Tests
 * Crash containment, cooldown, permanent disablement, and revival
 */

use cycle_kernel::{
    Context, Kernel, KernelConfig, Process, ProcessSpec, ProcessState, SimHost,
};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::rc::Rc;

/// Panics or errors on demand, counting every attempt
struct Crasher {
    attempts: Rc<Cell<u64>>,
    /// Crash while attempts < this
    crash_until: u64,
    panics: bool,
}

impl Process for Crasher {
    fn run(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        let n = self.attempts.get() + 1;
        self.attempts.set(n);
        if n <= self.crash_until {
            if self.panics {
                panic!("attempt {n} went sideways");
            }
            anyhow::bail!("attempt {n} failed");
        }
        Ok(())
    }
}

struct Steady {
    runs: Rc<Cell<u64>>,
}

impl Process for Steady {
    fn run(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.runs.set(self.runs.get() + 1);
        Ok(())
    }
}

fn kernel_with(host: &SimHost, config: KernelConfig) -> Kernel<SimHost> {
    Kernel::builder(host.clone()).with_config(config).build()
}

fn drive(kernel: &mut Kernel<SimHost>, host: &SimHost, cycles: u64) {
    for _ in 0..cycles {
        kernel.run();
        host.advance();
    }
}

#[test]
fn test_panic_does_not_take_down_the_kernel() {
    let host = SimHost::new(100.0);
    let mut kernel = kernel_with(&host, KernelConfig::default());
    let attempts = Rc::new(Cell::new(0));
    let steady_runs = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("bomb", "Bomb").with_priority(90),
            Box::new(Crasher {
                attempts: attempts.clone(),
                crash_until: u64::MAX,
                panics: true,
            }),
        )
        .unwrap();
    kernel
        .register(
            ProcessSpec::new("steady", "Steady").with_priority(10),
            Box::new(Steady {
                runs: steady_runs.clone(),
            }),
        )
        .unwrap();

    let report = kernel.run();
    // The bomb crashed first, the steady worker still ran after it
    assert_eq!(report.crashed, 1);
    assert_eq!(report.ran, 2);
    assert_eq!(steady_runs.get(), 1);
    assert_eq!(
        kernel.process("bomb").unwrap().runtime.state,
        ProcessState::Error
    );
}

#[test]
fn test_cooldown_sits_out_then_retries() {
    let host = SimHost::new(100.0);
    // Short cooldown to keep the test tight
    let config = KernelConfig::default().with_crash_discipline(3, 4);
    let mut kernel = kernel_with(&host, config);
    let attempts = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("shaky", "Shaky"),
            Box::new(Crasher {
                attempts: attempts.clone(),
                crash_until: 1,
                panics: false,
            }),
        )
        .unwrap();

    // Cycle 0 crashes, cooldown until cycle 4
    drive(&mut kernel, &host, 1);
    assert_eq!(attempts.get(), 1);
    let snapshot = kernel.process("shaky").unwrap();
    assert_eq!(snapshot.crash.consecutive, 1);
    assert_eq!(snapshot.crash.cooldown_until, Some(4));

    // Cycles 1-3 sit out
    drive(&mut kernel, &host, 3);
    assert_eq!(attempts.get(), 1);

    // Cycle 4 retries and succeeds, clearing escalation
    drive(&mut kernel, &host, 1);
    assert_eq!(attempts.get(), 2);
    let snapshot = kernel.process("shaky").unwrap();
    assert_eq!(snapshot.crash.consecutive, 0);
    assert_eq!(snapshot.crash.crashes, 1);
    assert_eq!(snapshot.runtime.state, ProcessState::Idle);
}

#[test]
fn test_three_consecutive_crashes_disable_permanently() {
    let host = SimHost::new(100.0);
    let config = KernelConfig::default().with_crash_discipline(3, 2);
    let mut kernel = kernel_with(&host, config);
    let attempts = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("doomed", "Doomed"),
            Box::new(Crasher {
                attempts: attempts.clone(),
                crash_until: u64::MAX,
                panics: false,
            }),
        )
        .unwrap();

    // Crash at 0, cooldown 2, crash at 2, cooldown 2, crash at 4: disabled
    drive(&mut kernel, &host, 5);
    assert_eq!(attempts.get(), 3);
    let snapshot = kernel.process("doomed").unwrap();
    assert!(snapshot.crash.disabled);
    assert_eq!(snapshot.crash.consecutive, 3);
    assert_eq!(snapshot.runtime.state, ProcessState::Suspended);
    assert_eq!(kernel.stats().disables, 1);

    // Disabled means never planned again, no matter how long we wait
    drive(&mut kernel, &host, 20);
    assert_eq!(attempts.get(), 3);
    assert_eq!(kernel.last_report().disabled_total, 1);
}

#[test]
fn test_reregistration_revives_a_disabled_process() {
    let host = SimHost::new(100.0);
    let config = KernelConfig::default().with_crash_discipline(2, 1);
    let mut kernel = kernel_with(&host, config);
    let attempts = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("phoenix", "Phoenix"),
            Box::new(Crasher {
                attempts: attempts.clone(),
                crash_until: u64::MAX,
                panics: false,
            }),
        )
        .unwrap();

    drive(&mut kernel, &host, 3);
    assert!(kernel.process("phoenix").unwrap().crash.disabled);

    // The only path back: unregister and register fresh
    kernel.unregister("phoenix").unwrap();
    let revived_runs = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("phoenix", "Phoenix"),
            Box::new(Steady {
                runs: revived_runs.clone(),
            }),
        )
        .unwrap();

    let snapshot = kernel.process("phoenix").unwrap();
    assert!(!snapshot.crash.disabled);
    assert_eq!(snapshot.crash.crashes, 0);

    drive(&mut kernel, &host, 1);
    assert_eq!(revived_runs.get(), 1);
}

#[test]
fn test_crash_attempt_still_counts_for_interval() {
    let host = SimHost::new(100.0);
    let config = KernelConfig::default().with_crash_discipline(10, 2);
    let mut kernel = kernel_with(&host, config);
    let attempts = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("shaky", "Shaky").with_interval(1),
            Box::new(Crasher {
                attempts: attempts.clone(),
                crash_until: u64::MAX,
                panics: false,
            }),
        )
        .unwrap();

    drive(&mut kernel, &host, 1);
    // The failed attempt is still a run for bookkeeping
    let snapshot = kernel.process("shaky").unwrap();
    assert_eq!(snapshot.runtime.last_run_cycle, Some(0));
}

#[test]
fn test_crash_cancels_pending_sleep() {
    struct SleepThenCrash;
    impl Process for SleepThenCrash {
        fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            ctx.sleep(30);
            anyhow::bail!("failed after scheduling a nap");
        }
    }

    let host = SimHost::new(100.0);
    let config = KernelConfig::default().with_crash_discipline(3, 2);
    let mut kernel = kernel_with(&host, config);
    kernel
        .register(
            ProcessSpec::new("restless", "Restless"),
            Box::new(SleepThenCrash),
        )
        .unwrap();

    drive(&mut kernel, &host, 1);
    let snapshot = kernel.process("restless").unwrap();
    // Crash discipline wins over the sleep request
    assert_eq!(snapshot.runtime.state, ProcessState::Error);
    assert_eq!(snapshot.runtime.sleep_until, None);
    assert_eq!(snapshot.crash.cooldown_until, Some(2));
}
