mod api;
mod blockchain;
mod config;
mod error;
mod mining;
mod net;
mod sim;
mod transaction;
mod wallet;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use std::thread;

use api::AppState;
use config::AppConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = AppConfig::from_env();
    info!(
        "simulating {} miners for {} ticks (base eligibility {}, retry every {} ticks)",
        config.sim.miner_count,
        config.run_ticks,
        config.sim.base_eligibility_difficulty,
        config.sim.retry_interval
    );

    let state = web::Data::new(AppState::default());

    let sim_state = state.clone();
    let sim_config = config.clone();
    let runner = thread::spawn(move || {
        sim::run(
            &sim_config.sim,
            sim_config.run_ticks,
            sim_config.report_every,
            sim_config.transfer_amount,
            |report| *sim_state.report.lock().expect("mutex poisoned") = report,
        )
    });

    if !config.serve_api {
        let report = runner
            .join()
            .map_err(|_| std::io::Error::other("simulation thread panicked"))?;
        println!("{}", report.render());
        return Ok(());
    }

    println!(
        "⛓️ Serving simulation reports at http://{}:{}/api/v1/miners/",
        config.host, config.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
