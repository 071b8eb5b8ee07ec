use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, MinerSummary, MinersResponse};

/// Latest state of every miner.
#[get("/miners/")]
pub async fn list_miners(state: web::Data<AppState>) -> impl Responder {
    let report = state.report.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(MinersResponse {
        tick: report.tick,
        generated_at: report.generated_at.clone(),
        miners: report
            .miners
            .iter()
            .map(|m| MinerSummary {
                name: m.name.clone(),
                chain_length: m.chain_length,
                tip_hash: m.tip_hash.clone(),
                halted: m.halted,
            })
            .collect(),
    })
}

/// Full report for one miner, stats included.
#[get("/miners/{name}/")]
pub async fn get_miner(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let name = path.into_inner().0;
    let report = state.report.lock().expect("mutex poisoned");
    match report.miner(&name) {
        Some(miner) => HttpResponse::Ok().json(miner),
        None => HttpResponse::NotFound().body(format!("no miner named {name}")),
    }
}
