/*!
 * Cycle Loop
 * One host cycle: plan, execute, persist, report
 */

use super::{resilience, unregister_inner, Context, Kernel, Services};
use crate::core::errors::CheckpointError;
use crate::core::limits;
use crate::core::types::{Cycle, FastSet, Pid};
use crate::host::Host;
use crate::process::types::{PersistedProcess, ProcessState};
use crate::scheduler::{verdict, BudgetVerdict, CycleBudget, CycleReport, Visit};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;

impl<H: Host> Kernel<H> {
    /// Advance the kernel by one host cycle.
    ///
    /// Reads the host's cycle number, compute meter, and reserve level,
    /// runs every eligible process to completion in planned order, then
    /// handles checkpointing and reporting. The kernel never advances the
    /// host clock; calling `run` twice without a host tick replans the
    /// same cycle.
    pub fn run(&mut self) -> CycleReport {
        let cycle = self.host.cycle();
        if !self.restored {
            self.restore_cold_start(cycle);
            self.restored = true;
        }

        let limit = self.host.compute_limit();
        let reserve = self.host.reserve_level();
        let mut report = CycleReport::new(cycle, limit);
        let mut budget = CycleBudget::new(&self.config.budget, limit, reserve);
        report.compute_allocated = budget.allocated_total();

        let visits = {
            let Services { registry, deps, .. } = &mut self.services;
            self.scheduler.plan(
                registry,
                deps,
                cycle,
                reserve,
                self.config.max_inherited_priority,
                &mut report,
            )
        };

        let mut ran: FastSet<Pid> = FastSet::default();
        for visit in visits {
            // A visit can go stale mid-cycle: any earlier run may have
            // killed this process
            if !self.services.registry.contains(&visit.pid) {
                continue;
            }
            if self.host.compute_used() >= limit || budget.tier_exhausted(visit.tier) {
                self.starve(&visit.pid, &mut report);
                continue;
            }
            ran.insert(visit.pid.clone());
            self.execute(visit, cycle, &mut budget, &mut report);
        }

        if self.config.deliver_to_skipped {
            self.deliver_to_skipped(&ran, &mut report);
        }

        self.maybe_checkpoint(cycle, &mut report);
        self.services.mailbox.end_cycle(limits::TOP_BUSIEST_CHANNELS);

        report.processes = self.services.registry.len();
        report.disabled_total = self
            .services
            .registry
            .iter()
            .filter(|(_, slot)| slot.crash.disabled)
            .count() as u32;
        self.stats.absorb(&report);
        self.maybe_log_stats(&report);
        self.scheduler.advance();
        self.last_report = report.clone();
        report
    }

    /// Budget starvation: skip the run and let the boost accumulate so
    /// the process sorts earlier in later cycles
    fn starve(&mut self, pid: &Pid, report: &mut CycleReport) {
        report.skipped_budget += 1;
        if let Some(slot) = self.services.registry.slot_mut(pid) {
            slot.runtime.boost =
                (slot.runtime.boost + self.config.decay_increment).min(self.config.max_priority_boost);
            debug!("process {pid} starved of budget, boost now {}", slot.runtime.boost);
        }
    }

    fn execute(
        &mut self,
        visit: Visit,
        cycle: Cycle,
        budget: &mut CycleBudget,
        report: &mut CycleReport,
    ) {
        let pid = visit.pid;
        let Some(mut process) = self.services.registry.take_process(&pid) else {
            return;
        };
        let parent = self
            .services
            .registry
            .slot(&pid)
            .and_then(|slot| slot.spec.parent.clone());
        if let Some(slot) = self.services.registry.slot_mut(&pid) {
            slot.runtime.state = ProcessState::Running;
        }

        let pending = self.services.mailbox.drain(&pid);
        report.messages_delivered += pending.len() as u32;

        let before = self.host.compute_used();
        let outcome = {
            let mut ctx = Context::new(pid.clone(), parent, cycle, &mut self.services);
            resilience::guarded_cycle(process.as_mut(), &mut ctx, pending)
        };
        let used = (self.host.compute_used() - before).max(0.0);
        budget.record(visit.tier, used);
        report.compute_used += used;
        report.ran += 1;

        if let Some(mut orphan) = self.services.registry.put_process(&pid, process) {
            // The run removed (or replaced) its own registration; its
            // bookkeeping is already gone, so close out the instance here
            if let Err(e) = outcome {
                warn!("process {pid} failed during its final run: {e:#}");
            }
            if let Some(state) = orphan.save() {
                self.services.checkpoints.record(&pid, cycle, state);
            }
            orphan.cleanup();
            return;
        }

        let mut overrun = false;
        if let Some(slot) = self.services.registry.slot_mut(&pid) {
            slot.runtime.last_run_cycle = Some(cycle);
            slot.runtime.last_compute = used;
            match outcome {
                Ok(()) => resilience::on_success(slot),
                Err(e) => {
                    report.crashed += 1;
                    let disabled = resilience::on_failure(
                        slot,
                        cycle,
                        &e,
                        self.config.crash_disable_threshold,
                        self.config.crash_cooldown,
                    );
                    if disabled {
                        self.stats.disables += 1;
                    }
                }
            }
            match verdict(budget, &slot.limits, used) {
                BudgetVerdict::Exceeded { cap } => {
                    error!("process {pid} used {used:.3} compute, past its hard cap {cap:.3}; killing");
                    overrun = true;
                }
                BudgetVerdict::Warn { cap } => {
                    let due = slot
                        .runtime
                        .last_warn_cycle
                        .map_or(true, |last| cycle.saturating_sub(last) >= self.config.budget_warn_interval);
                    if due {
                        warn!("process {pid} used {used:.3} of its {cap:.3} compute cap");
                        slot.runtime.last_warn_cycle = Some(cycle);
                    }
                }
                BudgetVerdict::Within => {}
            }
        }
        if overrun {
            report.killed += 1;
            unregister_inner(&mut self.services, &pid, cycle, true);
        }
    }

    /// Optional out-of-band delivery for processes that did not run this
    /// cycle. Disabled processes never receive mail.
    fn deliver_to_skipped(&mut self, ran: &FastSet<Pid>, report: &mut CycleReport) {
        for pid in self.services.registry.ids() {
            if ran.contains(&pid) {
                continue;
            }
            let disabled = self
                .services
                .registry
                .slot(&pid)
                .map(|slot| slot.crash.disabled)
                .unwrap_or(true);
            if disabled || self.services.mailbox.pending(&pid) == 0 {
                continue;
            }
            let Some(mut process) = self.services.registry.take_process(&pid) else {
                continue;
            };
            let pending = self.services.mailbox.drain(&pid);
            report.messages_delivered += pending.len() as u32;
            let outcome = resilience::guarded_deliver(process.as_mut(), pending);
            if self.services.registry.put_process(&pid, process).is_some() {
                continue;
            }
            if let Err(e) = outcome {
                report.crashed += 1;
                if let Some(slot) = self.services.registry.slot_mut(&pid) {
                    let disabled = resilience::on_failure(
                        slot,
                        report.cycle,
                        &e,
                        self.config.crash_disable_threshold,
                        self.config.crash_cooldown,
                    );
                    if disabled {
                        self.stats.disables += 1;
                    }
                }
            }
        }
    }

    /// One-shot restore before the first cycle: reapply persisted runtime
    /// rows, then hand each process its last checkpoint. Only processes
    /// registered before the first `run` call take part.
    fn restore_cold_start(&mut self, cycle: Cycle) {
        let Services {
            registry,
            checkpoints,
            ..
        } = &mut self.services;
        let mut rows_applied = 0usize;
        let mut restored = 0usize;

        let ids = registry.ids();
        for id in &ids {
            let Some(row) = checkpoints.image().processes.get(id) else {
                continue;
            };
            let (state, last_run, sleep_until, data) = (
                row.state,
                row.last_run_cycle,
                row.sleep_until,
                row.data.clone(),
            );
            if let Some(slot) = registry.slot_mut(id) {
                slot.runtime.last_run_cycle = last_run;
                // Only a persisted sleep survives the restart; transient
                // states collapse back to idle, and crash discipline
                // starts from a clean record
                if state == ProcessState::Sleeping {
                    slot.runtime.state = ProcessState::Sleeping;
                    slot.runtime.sleep_until = sleep_until;
                } else {
                    slot.runtime.state = ProcessState::Idle;
                    slot.runtime.sleep_until = None;
                }
                slot.memory = data;
                rows_applied += 1;
            }
        }

        for id in &ids {
            let Some(checkpoint) = checkpoints.checkpoint(id) else {
                continue;
            };
            let state = checkpoint.state.clone();
            let from_cycle = checkpoint.cycle;
            let Some(slot) = registry.slot_mut(id) else {
                continue;
            };
            let Some(process) = slot.process.as_mut() else {
                continue;
            };
            match process.restore(&state) {
                Ok(()) => {
                    restored += 1;
                    debug!("process {id} restored from cycle-{from_cycle} checkpoint");
                }
                Err(e) => warn!("process {id} could not restore its checkpoint: {e}"),
            }
        }

        if rows_applied > 0 || restored > 0 {
            info!(
                "cold start at cycle {cycle}: {rows_applied} runtime rows applied, {restored} checkpoints restored"
            );
        }
    }

    fn maybe_checkpoint(&mut self, cycle: Cycle, report: &mut CycleReport) {
        self.cycles_since_checkpoint += 1;
        if self.cycles_since_checkpoint < self.config.checkpoint_interval {
            return;
        }
        self.cycles_since_checkpoint = 0;
        match self.sweep(cycle) {
            Ok(written) => report.checkpointed = written,
            Err(e) => error!("checkpoint sweep failed at cycle {cycle}: {e}"),
        }
    }

    /// Rebuild the persisted process rows, capture changed checkpoints,
    /// and save the image when anything moved. Returns the number of
    /// checkpoints that actually changed.
    pub(crate) fn sweep(&mut self, cycle: Cycle) -> Result<u32, CheckpointError> {
        let Services {
            registry,
            checkpoints,
            ..
        } = &mut self.services;

        let mut rows = BTreeMap::new();
        for (id, slot) in registry.iter() {
            rows.insert(
                id.clone(),
                PersistedProcess {
                    id: id.clone(),
                    state: slot.runtime.state,
                    last_run_cycle: slot.runtime.last_run_cycle,
                    sleep_until: slot.runtime.sleep_until,
                    parent: slot.spec.parent.clone(),
                    children: registry.children(id),
                    data: slot.memory.clone(),
                },
            );
        }
        checkpoints.set_process_rows(rows);

        let mut written = 0;
        for (id, slot) in registry.iter() {
            let Some(process) = slot.process.as_ref() else {
                continue;
            };
            if let Some(state) = process.save() {
                if checkpoints.record(id, cycle, state) {
                    written += 1;
                }
            }
        }

        if checkpoints.dirty() {
            self.backend.save(checkpoints.image())?;
            checkpoints.mark_saved();
            debug!("persisted image saved at cycle {cycle}");
        }
        Ok(written)
    }

    fn maybe_log_stats(&mut self, report: &CycleReport) {
        self.cycles_since_stats += 1;
        if self.cycles_since_stats < self.config.stats_interval {
            return;
        }
        self.cycles_since_stats = 0;
        info!(
            "cycle {}: {} processes, {} ran, {} skipped, {:.3}/{:.3} compute; lifetime {} runs, {} crashes, {} kills, {} messages",
            report.cycle,
            report.processes,
            report.ran,
            report.skipped(),
            report.compute_used,
            report.compute_limit,
            self.stats.runs,
            self.stats.crashes,
            self.stats.kills,
            self.stats.messages
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimHost;
    use crate::kernel::KernelConfig;
    use crate::process::traits::Process;
    use crate::process::types::ProcessSpec;
    use serde_json::json;

    struct Ticker {
        host: SimHost,
        cost: f64,
    }

    impl Process for Ticker {
        fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            self.host.consume(self.cost);
            *ctx.memory_mut() = json!({ "last": ctx.cycle() });
            Ok(())
        }
    }

    struct Quitter;

    impl Process for Quitter {
        fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
            let me = ctx.pid().clone();
            ctx.kill(&me);
            Ok(())
        }
    }

    fn kernel(host: &SimHost) -> Kernel<SimHost> {
        Kernel::builder(host.clone()).build()
    }

    #[test]
    fn test_run_executes_and_reports() {
        let host = SimHost::new(100.0);
        let mut kernel = kernel(&host);
        kernel
            .register(
                ProcessSpec::new("ticker", "Ticker"),
                Box::new(Ticker {
                    host: host.clone(),
                    cost: 2.0,
                }),
            )
            .unwrap();

        let report = kernel.run();
        assert_eq!(report.ran, 1);
        assert_eq!(report.processes, 1);
        assert!(report.compute_used >= 2.0);

        let snapshot = kernel.process("ticker").unwrap();
        assert_eq!(snapshot.runtime.last_run_cycle, Some(0));
        assert_eq!(snapshot.runtime.state, ProcessState::Idle);
    }

    #[test]
    fn test_rerun_without_host_tick_replans_same_cycle() {
        let host = SimHost::new(100.0);
        let mut kernel = kernel(&host);
        kernel
            .register(
                ProcessSpec::new("ticker", "Ticker"),
                Box::new(Ticker {
                    host: host.clone(),
                    cost: 1.0,
                }),
            )
            .unwrap();

        assert_eq!(kernel.run().ran, 1);
        // Same host cycle again: the interval gate sees last_run == now
        let report = kernel.run();
        assert_eq!(report.ran, 0);
        assert_eq!(report.skipped_interval, 1);
    }

    #[test]
    fn test_self_kill_completes_teardown() {
        let host = SimHost::new(100.0);
        let mut kernel = kernel(&host);
        kernel
            .register(ProcessSpec::new("quitter", "Quitter"), Box::new(Quitter))
            .unwrap();

        let report = kernel.run();
        assert_eq!(report.ran, 1);
        assert!(!kernel.contains("quitter"));
        assert_eq!(kernel.process_count(), 0);
    }

    #[test]
    fn test_cycle_limit_guard_starves_rest() {
        let host = SimHost::new(10.0);
        let mut kernel = kernel(&host);
        // First runner burns the whole cycle limit; the second is starved
        kernel
            .register(
                ProcessSpec::new("glutton", "Glutton").with_priority(90).with_cpu_fraction(1.0),
                Box::new(Ticker {
                    host: host.clone(),
                    cost: 10.0,
                }),
            )
            .unwrap();
        kernel
            .register(
                ProcessSpec::new("starved", "Starved").with_priority(10),
                Box::new(Ticker {
                    host: host.clone(),
                    cost: 1.0,
                }),
            )
            .unwrap();

        let report = kernel.run();
        assert_eq!(report.ran, 1);
        assert_eq!(report.skipped_budget, 1);
        assert_eq!(
            kernel.process("starved").unwrap().runtime.boost,
            kernel.config().decay_increment
        );
    }

    #[test]
    fn test_stale_visit_skipped_after_kill_by_peer() {
        struct Assassin {
            target: &'static str,
        }
        impl Process for Assassin {
            fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
                ctx.kill(self.target);
                Ok(())
            }
        }

        let host = SimHost::new(100.0);
        let mut kernel = kernel(&host);
        kernel
            .register(
                ProcessSpec::new("assassin", "Assassin").with_priority(90),
                Box::new(Assassin { target: "victim" }),
            )
            .unwrap();
        kernel
            .register(
                ProcessSpec::new("victim", "Victim").with_priority(10),
                Box::new(Ticker {
                    host: host.clone(),
                    cost: 1.0,
                }),
            )
            .unwrap();

        let report = kernel.run();
        assert_eq!(report.ran, 1);
        assert!(!kernel.contains("victim"));
    }

    #[test]
    fn test_overrun_kills_process() {
        let host = SimHost::new(100.0);
        let config = KernelConfig::default();
        let mut kernel = Kernel::builder(host.clone()).with_config(config).build();
        // cap = 100 * 0.05 = 5, but the run burns 30
        kernel
            .register(
                ProcessSpec::new("hog", "Hog").with_cpu_fraction(0.05),
                Box::new(Ticker {
                    host: host.clone(),
                    cost: 30.0,
                }),
            )
            .unwrap();

        let report = kernel.run();
        assert_eq!(report.ran, 1);
        assert_eq!(report.killed, 1);
        assert!(!kernel.contains("hog"));
        assert_eq!(kernel.stats().kills, 1);
    }
}
