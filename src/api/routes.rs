use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/addresses", web::post().to(handlers::open_address))
            .route("/transactions", web::post().to(handlers::new_transaction))
            .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
            .route(
                "/transactions/pending/{id}",
                web::delete().to(handlers::discard_pending_transaction),
            )
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/balance/{address}/{currency}", web::get().to(handlers::get_balance))
            .route("/balances/{currency}", web::get().to(handlers::get_balances))
            .route("/fund", web::post().to(handlers::fund_wallet))
            .route("/accounts", web::get().to(handlers::get_accounts))
            .route("/keys", web::post().to(handlers::import_key)),
    );
}
