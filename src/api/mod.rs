mod balance;
mod health;
mod miners;
pub mod models;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(miners::list_miners)
            .service(miners::get_miner)
            .service(balance::get_balance),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{self, SimConfig};
    use actix_web::{App, test};

    fn state_after_short_run() -> web::Data<AppState> {
        let config = SimConfig {
            miner_count: 2,
            ..SimConfig::default()
        };
        let report = sim::run(&config, 50, 50, 0, |_| {});
        let state = AppState::default();
        *state.report.lock().unwrap() = report;
        web::Data::new(state)
    }

    #[actix_web::test]
    async fn serves_miner_reports() {
        let app = test::init_service(
            App::new()
                .app_data(state_after_short_run())
                .configure(init_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/miners/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["tick"], 50);
        assert_eq!(body["miners"].as_array().map(Vec::len), Some(2));

        let req = test::TestRequest::get()
            .uri("/api/v1/balance/Minnie/")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["miner"], "Minnie");
        assert_eq!(body["balances"].as_array().map(Vec::len), Some(2));

        let req = test::TestRequest::get().uri("/api/v1/miners/Nobody/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
