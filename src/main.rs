use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use wallet_ledger::api;
use wallet_ledger::config::Config;
use wallet_ledger::ledger::{self, Keyring, Ledger};

// Open the persistent ledger and its keyring if configured, falling back
// to memory
fn initialize_ledger(config: &Config) -> (Ledger, Arc<Keyring>) {
    let (ledger, keyring) = match &config.data_dir {
        Some(data_dir) => {
            std::fs::create_dir_all(data_dir).unwrap_or_else(|e| {
                warn!("Failed to create data directory: {}", e);
            });

            match Ledger::open(data_dir) {
                Ok(opened) => {
                    info!("Loaded ledger from storage at {}", data_dir.display());
                    opened
                }
                Err(err) => {
                    warn!("Failed to load ledger from storage: {}", err);
                    warn!("Creating in-memory ledger instead");
                    in_memory_ledger()
                }
            }
        }
        None => {
            info!("No data directory configured, using in-memory ledger");
            in_memory_ledger()
        }
    };

    (ledger.with_strategy(config.balance_strategy), keyring)
}

fn in_memory_ledger() -> (Ledger, Arc<Keyring>) {
    let keyring = Arc::new(Keyring::new());
    (Ledger::with_keyring(keyring.clone()), keyring)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::open_address,
        api::handlers::new_transaction,
        api::handlers::get_pending_transactions,
        api::handlers::discard_pending_transaction,
        api::handlers::mine_block,
        api::handlers::get_chain,
        api::handlers::get_balance,
        api::handlers::get_balances,
        api::handlers::fund_wallet,
        api::handlers::get_accounts,
        api::handlers::import_key
    ),
    components(
        schemas(
            ledger::Block,
            ledger::BlockSummary,
            ledger::Transaction,
            ledger::Account,
            ledger::AccountBalance,
            ledger::Address,
            ledger::DigitalSignature,
            api::handlers::OpenAddressRequest,
            api::handlers::AddressResponse,
            api::handlers::TransactionRequest,
            api::handlers::MineRequest,
            api::handlers::MineResponse,
            api::handlers::ChainResponse,
            api::handlers::FundRequest,
            api::handlers::ImportKeyRequest,
            api::handlers::ImportKeyResponse
        )
    ),
    tags(
        (name = "ledger", description = "Wallet ledger API endpoints")
    ),
    info(
        title = "Wallet Ledger API",
        version = "0.1.0",
        description = "A multi-currency wallet ledger API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let (ledger, keyring) = initialize_ledger(&config);
    info!(
        "Ledger ready with {} blocks and {} keys, balance strategy {}, persistent: {}",
        ledger.len(),
        keyring.len(),
        ledger.strategy(),
        ledger.is_persistent()
    );

    let state = web::Data::new(api::AppState { ledger, keyring });

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
