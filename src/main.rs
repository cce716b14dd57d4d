#[cfg(target_arch = "wasm32")]
mod browser;
#[cfg(target_arch = "wasm32")]
mod frontend;

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    let config = portfolio_engine::EngineConfig::from_env();
    let logger = portfolio_engine::Logger::new(config.log_level);
    logger.info(
        "frontend_only",
        serde_json::json!({ "hint": "run `trunk serve` or `trunk build --release`" }),
    );
}

#[cfg(target_arch = "wasm32")]
fn main() {
    frontend::run();
}
