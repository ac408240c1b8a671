/*!
 * Cycle Kernel - Demo Entry Point
 *
 * Drives the kernel with a simulated host:
 * - A critical heartbeat on a 5-cycle interval
 * - A harvester/courier/ledger trio exercising IPC and shared state
 * - A flaky worker exercising crash discipline
 *
 * State persists to a JSON image, so a second launch resumes where the
 * previous one stopped.
 */

use std::error::Error;

use cycle_kernel::{
    Context, JsonFileBackend, Kernel, KernelConfig, Message, PriorityTier, Process, ProcessSpec,
    ReserveLevel, SimHost, StateError,
};
use log::info;
use serde_json::{json, Value};

struct Heartbeat;

impl Process for Heartbeat {
    fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        info!("heartbeat at cycle {}", ctx.cycle());
        *ctx.memory_mut() = json!({ "beat": ctx.cycle() });
        Ok(())
    }
}

/// Accumulates resources and posts the running total on the blackboard
struct Harvester {
    host: SimHost,
    gathered: u64,
}

impl Process for Harvester {
    fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.host.consume(2.5);
        self.gathered += 3;
        ctx.shared_set("stockpile", json!(self.gathered));
        Ok(())
    }

    fn save(&self) -> Option<Value> {
        Some(json!({ "gathered": self.gathered }))
    }

    fn restore(&mut self, state: &Value) -> Result<(), StateError> {
        self.gathered = state
            .get("gathered")
            .and_then(Value::as_u64)
            .ok_or_else(|| StateError::Deserialize("missing gathered".into()))?;
        Ok(())
    }
}

struct Courier {
    host: SimHost,
}

impl Process for Courier {
    fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.host.consume(0.5);
        ctx.send("ledger", json!({ "shipment": ctx.cycle() }));
        Ok(())
    }
}

struct Ledger {
    host: SimHost,
    received: u64,
}

impl Process for Ledger {
    fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.host.consume(0.5);
        *ctx.memory_mut() = json!({ "received": self.received });
        Ok(())
    }

    fn on_message(&mut self, _message: Message) {
        self.received += 1;
    }

    fn save(&self) -> Option<Value> {
        Some(json!({ "received": self.received }))
    }

    fn restore(&mut self, state: &Value) -> Result<(), StateError> {
        self.received = state
            .get("received")
            .and_then(Value::as_u64)
            .ok_or_else(|| StateError::Deserialize("missing received".into()))?;
        Ok(())
    }
}

/// Fails intermittently, but never often enough to get disabled
struct Flaky {
    host: SimHost,
}

impl Process for Flaky {
    fn run(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.host.consume(0.2);
        if ctx.cycle() % 40 == 7 {
            anyhow::bail!("sensor glitch at cycle {}", ctx.cycle());
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    info!("cycle kernel demo starting");

    let state_path = std::env::var("KERNEL_STATE_PATH")
        .unwrap_or_else(|_| "/tmp/cycle-kernel/state.json".to_string());
    if let Some(parent) = std::path::Path::new(&state_path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("could not create state directory: {e}");
        }
    }
    info!("persisting kernel state to {state_path}");

    let host = SimHost::new(100.0);
    let config = KernelConfig::default()
        .with_checkpoint_interval(25)
        .with_stats_interval(50)
        .with_ipc_trace(true);
    let mut kernel = Kernel::builder(host.clone())
        .with_config(config)
        .with_backend(JsonFileBackend::new(&state_path))
        .build();

    kernel.register(
        ProcessSpec::new("heartbeat", "Heartbeat")
            .with_tier(PriorityTier::Critical)
            .with_interval(5),
        Box::new(Heartbeat),
    )?;
    kernel.register(
        ProcessSpec::new("harvester", "Harvester").with_priority(60),
        Box::new(Harvester {
            host: host.clone(),
            gathered: 0,
        }),
    )?;
    kernel.register(
        ProcessSpec::new("courier", "Courier").with_priority(40),
        Box::new(Courier { host: host.clone() }),
    )?;
    kernel.register(
        ProcessSpec::new("ledger", "Ledger")
            .with_tier(PriorityTier::Low)
            .with_interval(2),
        Box::new(Ledger {
            host: host.clone(),
            received: 0,
        }),
    )?;
    kernel.register(
        ProcessSpec::new("flaky", "Flaky Sensor").with_tier(PriorityTier::Idle),
        Box::new(Flaky { host: host.clone() }),
    )?;

    // The ledger inherits urgency whenever the courier depends on it
    kernel.add_dependency("courier", "ledger");

    info!("running 250 cycles");
    for step in 0..250u64 {
        // Squeeze the reserve mid-run to show adaptive tier scaling
        match step {
            100 => host.set_reserve(ReserveLevel::Low),
            150 => host.set_reserve(ReserveLevel::Normal),
            _ => {}
        }
        kernel.run();
        host.advance();
    }

    kernel.flush()?;

    let stats = kernel.stats();
    info!(
        "demo done: {} cycles, {} runs, {} crashes, {} kills, {} messages, {} checkpoints",
        stats.cycles, stats.runs, stats.crashes, stats.kills, stats.messages, stats.checkpoints
    );
    if let Some(stockpile) = kernel.shared_get("stockpile") {
        info!("final stockpile: {stockpile}");
    }
    info!("blackboard keys at shutdown: {:?}", kernel.shared_keys());
    Ok(())
}
