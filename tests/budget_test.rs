/*!
 * Budget Tests
 * Tier grants, reserve scaling, starvation boost, and overrun kills
 */

use cycle_kernel::{
    Context, Kernel, KernelConfig, PriorityTier, Process, ProcessSpec, ReserveLevel, SimHost,
};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::rc::Rc;

/// Burns a fixed amount of host compute every run
struct Burner {
    host: SimHost,
    cost: f64,
    runs: Rc<Cell<u64>>,
}

impl Burner {
    fn boxed(host: &SimHost, cost: f64, runs: &Rc<Cell<u64>>) -> Box<Self> {
        Box::new(Self {
            host: host.clone(),
            cost,
            runs: runs.clone(),
        })
    }
}

impl Process for Burner {
    fn run(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.host.consume(self.cost);
        self.runs.set(self.runs.get() + 1);
        Ok(())
    }
}

fn drive(kernel: &mut Kernel<SimHost>, host: &SimHost, cycles: u64) {
    for _ in 0..cycles {
        kernel.run();
        host.advance();
    }
}

#[test]
fn test_tier_budget_exhaustion_starves_later_visits() {
    let host = SimHost::new(100.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));

    // Medium tier grant at normal reserve: 100 * 0.20 = 20. The first
    // runner blows through it; the second must be starved, not run.
    kernel
        .register(
            ProcessSpec::new("first", "First")
                .with_priority(80)
                .with_cpu_fraction(0.5),
            Burner::boxed(&host, 25.0, &first),
        )
        .unwrap();
    kernel
        .register(
            ProcessSpec::new("second", "Second").with_priority(20),
            Burner::boxed(&host, 1.0, &second),
        )
        .unwrap();

    let report = kernel.run();
    assert_eq!(report.ran, 1);
    assert_eq!(report.skipped_budget, 1);
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 0);
}

#[test]
fn test_critical_tier_has_its_own_grant() {
    let host = SimHost::new(100.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    let medium = Rc::new(Cell::new(0));
    let critical = Rc::new(Cell::new(0));

    // Exhausting the medium grant must not touch the critical grant
    kernel
        .register(
            ProcessSpec::new("busy", "Busy").with_cpu_fraction(0.5),
            Burner::boxed(&host, 25.0, &medium),
        )
        .unwrap();
    kernel
        .register(
            ProcessSpec::new("vital", "Vital").with_tier(PriorityTier::Critical),
            Burner::boxed(&host, 5.0, &critical),
        )
        .unwrap();

    let report = kernel.run();
    // Critical tier plans first, so both run; the medium burner's
    // overdraft never reaches the critical grant
    assert_eq!(report.ran, 2);
    assert_eq!(critical.get(), 1);
    assert_eq!(medium.get(), 1);
}

#[test]
fn test_starvation_boost_accumulates_and_promotes() {
    let host = SimHost::new(10.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    let glutton_runs = Rc::new(Cell::new(0));
    let patient_runs = Rc::new(Cell::new(0));

    // Medium grant is 2.0; the glutton eats it every cycle and wins the
    // first visit on declared priority
    kernel
        .register(
            ProcessSpec::new("glutton", "Glutton")
                .with_priority(60)
                .with_cpu_fraction(1.0),
            Burner::boxed(&host, 3.0, &glutton_runs),
        )
        .unwrap();
    kernel
        .register(
            ProcessSpec::new("patient", "Patient").with_priority(58),
            Burner::boxed(&host, 1.0, &patient_runs),
        )
        .unwrap();

    // Cycle 0: glutton first on priority, patient starves (boost 1)
    // Cycle 1: 60 vs 59, patient starves again (boost 2)
    // Cycle 2: 60 vs 60, rotation still favors the glutton (boost 3)
    // Cycle 3: 61 beats 60, the patient finally runs and its boost resets
    drive(&mut kernel, &host, 4);
    assert_eq!(patient_runs.get(), 1);
    assert_eq!(kernel.process("patient").unwrap().runtime.boost, 0);
}

#[test]
fn test_reserve_scaling_pauses_low_tiers() {
    let host = SimHost::new(100.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    let low_runs = Rc::new(Cell::new(0));
    let critical_runs = Rc::new(Cell::new(0));

    kernel
        .register(
            ProcessSpec::new("janitor", "Janitor").with_tier(PriorityTier::Low),
            Burner::boxed(&host, 1.0, &low_runs),
        )
        .unwrap();
    kernel
        .register(
            ProcessSpec::new("guard", "Guard").with_tier(PriorityTier::Critical),
            Burner::boxed(&host, 1.0, &critical_runs),
        )
        .unwrap();

    // At critical reserve the low tier's grant scales to zero
    host.set_reserve(ReserveLevel::Critical);
    let report = kernel.run();
    assert_eq!(critical_runs.get(), 1);
    assert_eq!(low_runs.get(), 0);
    assert_eq!(report.skipped_budget, 1);
    host.advance();

    // Back at normal reserve the janitor runs again
    host.set_reserve(ReserveLevel::Normal);
    kernel.run();
    assert_eq!(low_runs.get(), 1);
}

#[test]
fn test_min_reserve_gates_individual_processes() {
    let host = SimHost::new(100.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    let picky_runs = Rc::new(Cell::new(0));

    // Runs only when the host reserve is High or better
    kernel
        .register(
            ProcessSpec::new("picky", "Picky").with_min_reserve(ReserveLevel::High),
            Burner::boxed(&host, 1.0, &picky_runs),
        )
        .unwrap();

    let report = kernel.run();
    assert_eq!(picky_runs.get(), 0);
    assert_eq!(report.skipped_reserve, 1);
    host.advance();

    host.set_reserve(ReserveLevel::High);
    kernel.run();
    assert_eq!(picky_runs.get(), 1);
}

#[test]
fn test_overrun_kill_cascades_to_children() {
    struct Hog {
        host: SimHost,
        forked: bool,
    }
    impl Process for Hog {
        fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            if !self.forked {
                self.forked = true;
                ctx.fork(ProcessSpec::new("piglet", "Piglet"), Box::new(Idle))?;
                return Ok(());
            }
            self.host.consume(50.0);
            Ok(())
        }
    }
    struct Idle;
    impl Process for Idle {
        fn run(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let host = SimHost::new(100.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    // Hard cap 100 * 0.2 = 20; the second run burns 50
    kernel
        .register(
            ProcessSpec::new("hog", "Hog"),
            Box::new(Hog {
                host: host.clone(),
                forked: false,
            }),
        )
        .unwrap();

    drive(&mut kernel, &host, 1);
    assert!(kernel.contains("piglet"));

    let report = kernel.run();
    assert_eq!(report.killed, 1);
    assert!(!kernel.contains("hog"));
    assert!(!kernel.contains("piglet"));
}

#[test]
fn test_near_cap_warning_is_rate_limited() {
    let host = SimHost::new(100.0);
    let config = KernelConfig::default().with_budget_warn_interval(10);
    let mut kernel = Kernel::builder(host.clone()).with_config(config).build();
    let runs = Rc::new(Cell::new(0));

    // Cap 20, warn past 16; burning 18 trips the warning every run, but
    // the stamp only refreshes every 10 cycles
    kernel
        .register(
            ProcessSpec::new("warm", "Warm"),
            Burner::boxed(&host, 18.0, &runs),
        )
        .unwrap();

    drive(&mut kernel, &host, 1);
    assert_eq!(
        kernel.process("warm").unwrap().runtime.last_warn_cycle,
        Some(0)
    );

    drive(&mut kernel, &host, 5);
    // Still the cycle-0 stamp: later warnings were suppressed
    assert_eq!(
        kernel.process("warm").unwrap().runtime.last_warn_cycle,
        Some(0)
    );

    drive(&mut kernel, &host, 5);
    assert_eq!(
        kernel.process("warm").unwrap().runtime.last_warn_cycle,
        Some(10)
    );
}

#[test]
fn test_report_tracks_allocation_and_usage() {
    let host = SimHost::new(100.0);
    let mut kernel = Kernel::builder(host.clone()).build();
    let runs = Rc::new(Cell::new(0));
    kernel
        .register(
            ProcessSpec::new("worker", "Worker"),
            Burner::boxed(&host, 4.0, &runs),
        )
        .unwrap();

    let report = kernel.run();
    assert_eq!(report.compute_limit, 100.0);
    // Normal reserve: 35 + 25 + 20 + 15 + 2.5
    assert!((report.compute_allocated - 97.5).abs() < 1e-9);
    assert_eq!(report.compute_used, 4.0);
}
