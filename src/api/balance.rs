use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};

/// Confirmed balances of every participant, as seen from `{miner}`'s chain.
#[get("/balance/{miner}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let name = path.into_inner().0;
    let report = state.report.lock().expect("mutex poisoned");
    let Some(miner) = report.miner(&name) else {
        return HttpResponse::NotFound().body(format!("no miner named {name}"));
    };

    HttpResponse::Ok().json(BalanceResponse {
        miner: &miner.name,
        tick: report.tick,
        chain_length: miner.chain_length,
        balance_local: miner.balance_local,
        balances: &miner.balances,
    })
}
