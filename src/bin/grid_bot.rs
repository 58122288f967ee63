//! Grid Trading Bot Binary
//!
//! Replays closed klines through a paper session and drives one grid
//! instance from the configured strategy parameters.
//!
//! ## Setup
//!
//! 1. Optionally create a `.env` file in the project root, e.g.:
//!    ```
//!    APP_PAPER__QUOTE_BALANCE=5000
//!    RUST_LOG=debug
//!    ```
//!
//! 2. Run the bot:
//!    ```bash
//!    cargo run --bin grid_bot -- --config configs/grid.toml
//!    ```

use std::env;

use grid_maker::grid::STRATEGY_ID;
use grid_maker::runner::BotRunner;
use grid_maker::strategy::{GridStrategyFactory, StrategyRegistry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // 1. Initialize Registry
    let mut registry = StrategyRegistry::new();
    registry.register(STRATEGY_ID, GridStrategyFactory);

    // 2. Create Runner
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        args[2].clone()
    } else {
        args.get(1).cloned().unwrap_or_else(|| "configs/grid.toml".to_string())
    };
    if !std::path::Path::new(&config_path).exists() {
        eprintln!("Config file '{}' not found. Please create one.", config_path);
        std::process::exit(1);
    }

    let runner = BotRunner::new(&config_path, registry)?;

    // 3. Run
    match runner.run().await {
        Ok(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        Err(e) => {
            eprintln!("Bot execution error: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
