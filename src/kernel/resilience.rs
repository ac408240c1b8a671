/*!
 * Crash Containment
 * Panic and error isolation around process hooks
 */

use super::Context;
use crate::core::types::Cycle;
use crate::ipc::Message;
use crate::process::registry::Slot;
use crate::process::traits::Process;
use crate::process::types::ProcessState;
use anyhow::anyhow;
use log::{error, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Deliver pending mail and run one slice, catching panics.
///
/// A process that panicked goes through crash discipline; its possibly
/// torn state is never run again without a crash record against it.
pub(crate) fn guarded_cycle(
    process: &mut dyn Process,
    ctx: &mut Context<'_>,
    messages: Vec<Message>,
) -> anyhow::Result<()> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        for message in messages {
            process.on_message(message);
        }
        process.run(ctx)
    }));
    match outcome {
        Ok(run_result) => run_result,
        Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload))),
    }
}

/// Deliver mail outside a run slice, catching panics
pub(crate) fn guarded_deliver(
    process: &mut dyn Process,
    messages: Vec<Message>,
) -> anyhow::Result<()> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        for message in messages {
            process.on_message(message);
        }
    }));
    match outcome {
        Ok(()) => Ok(()),
        Err(payload) => Err(anyhow!(
            "panicked during delivery: {}",
            panic_message(payload)
        )),
    }
}

/// A clean run clears crash escalation and starvation boost
pub(crate) fn on_success(slot: &mut Slot) {
    slot.crash.consecutive = 0;
    slot.runtime.boost = 0;
    if slot.runtime.state != ProcessState::Sleeping {
        slot.runtime.state = ProcessState::Idle;
        slot.runtime.sleep_until = None;
    }
}

/// Record one crash and apply discipline. Returns true when this crash
/// crossed the disable threshold.
pub(crate) fn on_failure(
    slot: &mut Slot,
    cycle: Cycle,
    error: &anyhow::Error,
    disable_threshold: u32,
    cooldown: Cycle,
) -> bool {
    let pid = slot.spec.id.clone();
    slot.crash.crashes += 1;
    slot.crash.consecutive += 1;
    slot.crash.last_crash_cycle = Some(cycle);
    slot.runtime.sleep_until = None;
    error!("process {pid} crashed at cycle {cycle}: {error:#}");

    if slot.crash.consecutive >= disable_threshold {
        slot.crash.disabled = true;
        slot.crash.cooldown_until = None;
        slot.runtime.state = ProcessState::Suspended;
        error!(
            "process {pid} disabled after {} consecutive crashes; re-register to revive it",
            slot.crash.consecutive
        );
        true
    } else {
        let until = cycle + cooldown;
        slot.crash.cooldown_until = Some(until);
        slot.runtime.state = ProcessState::Error;
        warn!("process {pid} cooling down until cycle {until}");
        false
    }
}
