//! Headless run: a rule-of-thumb operator works the standard production
//! schedule (salad, fried rice, pasta) across two lines and maintains any
//! station that faults.
//!
//! Run with: `cargo run -p foodline-core --example headless_line`

use foodline_core::action::Action;
use foodline_core::config::{FactoryConfig, SpawnPolicy, standard_orders};
use foodline_core::engine::Factory;
use foodline_core::query::Observation;

/// Maintain the first faulted station, otherwise release the next order's
/// kit every eighth tick.
fn operator(obs: &Observation) -> Action {
    if let Some(s) = obs.stations.iter().find(|s| s.status.is_faulted()) {
        return Action::command(format!("maintain_{}", s.name));
    }
    if obs.tick % 8 == 0 {
        Action::command("produce_next")
    } else {
        Action::idle()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = FactoryConfig {
        spawn: SpawnPolicy::RoundRobin,
        max_ticks: 3000,
        orders: standard_orders(),
        ..FactoryConfig::default()
    };
    let mut factory = Factory::new(config)?;
    let (mut obs, _) = factory.reset(42);

    let mut total_reward = 0;
    loop {
        let result = factory.step(&operator(&obs));
        total_reward += result.reward;
        obs = result.observation;
        if obs.tick % 100 == 0 {
            println!("{obs}\n");
        }
        if result.terminal {
            break;
        }
    }

    println!("{obs}");
    println!("total reward: {total_reward}");
    println!("state hash:   0x{:016x}", factory.state_hash());
    Ok(())
}
