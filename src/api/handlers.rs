use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::sync::Arc;

use crate::ledger::{
    AccountBalance, Address, Block, BlockSummary, CryptoError, Keyring, Ledger, LedgerError,
};

/// Shared state handed to every handler
pub struct AppState {
    pub ledger: Ledger,

    /// Key store behind the ledger, used to hand out and import secret keys
    pub keyring: Arc<Keyring>,
}

pub type AppData = web::Data<AppState>;

/// Maps a ledger error to the matching HTTP response
fn error_response(context: &str, err: &LedgerError) -> HttpResponse {
    let body = serde_json::json!({
        "error": format!("{}: {}", context, err)
    });

    match err {
        LedgerError::StorageError(_) | LedgerError::InvalidChain(_) | LedgerError::CryptoError(_) => {
            HttpResponse::InternalServerError().json(body)
        }
        LedgerError::TransactionNotFound(_) => HttpResponse::NotFound().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Request for the open address endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct OpenAddressRequest {
    /// Currency the address is opened for
    pub currency: String,
}

/// Response for the open address endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    /// The new address
    pub address: String,

    /// Currency the address is registered for
    pub currency: String,

    /// The address's private key (hex encoded), to be stored by the caller
    pub private_key: Option<String>,
}

/// Open a new address
///
/// Generates a fresh key pair and registers its address for a currency
#[utoipa::path(
    post,
    path = "/api/v1/addresses",
    request_body = OpenAddressRequest,
    responses(
        (status = 201, description = "Address opened successfully", body = AddressResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn open_address(state: AppData, request: web::Json<OpenAddressRequest>) -> impl Responder {
    if request.currency.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Currency must not be empty"
        }));
    }

    match state.ledger.open_address(&request.currency) {
        Ok(address) => {
            let private_key = state.keyring.export_secret_key(&address).map(hex::encode);

            HttpResponse::Created().json(AddressResponse {
                address: address.0,
                currency: request.currency.clone(),
                private_key,
            })
        }
        Err(err) => error_response("Failed to open address", &err),
    }
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub from: String,

    /// The recipient's address
    pub to: String,

    /// Currency of the transfer
    pub currency: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Submit a transaction
///
/// Adds a new transaction to the pending pool
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction queued", body = crate::ledger::Transaction),
        (status = 400, description = "Invalid transaction data")
    )
)]
pub async fn new_transaction(state: AppData, request: web::Json<TransactionRequest>) -> impl Responder {
    let from = Address(request.from.clone());
    let to = Address(request.to.clone());

    match state
        .ledger
        .submit(&from, &to, &request.currency, request.amount)
    {
        Ok(transaction) => HttpResponse::Created().json(transaction),
        Err(err) => error_response("Failed to add transaction", &err),
    }
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<crate::ledger::Transaction>)
    )
)]
pub async fn get_pending_transactions(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.get_pending_transactions())
}

/// Discard a pending transaction
///
/// Removes a transaction from the pending pool, typically one that keeps the
/// batch from being mined
#[utoipa::path(
    delete,
    path = "/api/v1/transactions/pending/{id}",
    params(
        ("id" = String, Path, description = "Transaction id")
    ),
    responses(
        (status = 200, description = "Transaction discarded", body = crate::ledger::Transaction),
        (status = 404, description = "No pending transaction with that id")
    )
)]
pub async fn discard_pending_transaction(state: AppData, path: web::Path<String>) -> impl Responder {
    match state.ledger.discard_pending(&path.into_inner()) {
        Ok(transaction) => HttpResponse::Ok().json(transaction),
        Err(err) => error_response("Failed to discard transaction", &err),
    }
}

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// The miner's address
    pub miner_address: String,

    /// Currency label for the block
    pub currency: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly committed block
    pub block: BlockSummary,
}

/// Mine a new block
///
/// Validates the pending pool and commits it as a new block
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Pending batch rejected"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(state: AppData, request: web::Json<MineRequest>) -> impl Responder {
    let miner = Address(request.miner_address.clone());

    match state.ledger.mine(&miner, &request.currency) {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            block,
        }),
        Err(err) => error_response("Failed to mine block", &err),
    }
}

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain is valid
    pub is_valid: bool,
}

/// Get the full chain
///
/// Returns every committed block and the chain's validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(state: AppData) -> impl Responder {
    let chain = state.ledger.get_chain();
    let is_valid = crate::ledger::chain::verify_blocks(&chain);

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    })
}

/// Get a balance
///
/// Returns the balance of an address in one currency
#[utoipa::path(
    get,
    path = "/api/v1/balance/{address}/{currency}",
    params(
        ("address" = String, Path, description = "Wallet address"),
        ("currency" = String, Path, description = "Currency name")
    ),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = AccountBalance)
    )
)]
pub async fn get_balance(state: AppData, path: web::Path<(String, String)>) -> impl Responder {
    let (address, currency) = path.into_inner();
    let address = Address(address);

    HttpResponse::Ok().json(AccountBalance {
        balance: state.ledger.balance_of(&address, &currency),
        address,
        currency,
    })
}

/// Get all balances of a currency
///
/// Returns every address registered for, or seen in history under, a currency
#[utoipa::path(
    get,
    path = "/api/v1/balances/{currency}",
    params(
        ("currency" = String, Path, description = "Currency name")
    ),
    responses(
        (status = 200, description = "Balances retrieved successfully", body = Vec<AccountBalance>)
    )
)]
pub async fn get_balances(state: AppData, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.balances(&path.into_inner()))
}

/// Request for the fund endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct FundRequest {
    /// The address to fund
    pub address: String,

    /// Currency of the funding
    pub currency: String,

    /// The amount added to the opening balance
    pub amount: f64,
}

/// Fund an address
///
/// Raises the opening balance of a registered address
#[utoipa::path(
    post,
    path = "/api/v1/fund",
    request_body = FundRequest,
    responses(
        (status = 200, description = "Address funded successfully", body = crate::ledger::Account),
        (status = 400, description = "Unknown address or invalid amount"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn fund_wallet(state: AppData, request: web::Json<FundRequest>) -> impl Responder {
    let address = Address(request.address.clone());

    match state.ledger.fund(&address, &request.currency, request.amount) {
        Ok(account) => HttpResponse::Ok().json(account),
        Err(err) => error_response("Failed to fund address", &err),
    }
}

/// Get all accounts
///
/// Returns every registration with its opening balance
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    responses(
        (status = 200, description = "Accounts retrieved successfully", body = Vec<crate::ledger::Account>)
    )
)]
pub async fn get_accounts(state: AppData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.get_all_accounts())
}

/// Request for the key import endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ImportKeyRequest {
    /// Hex encoded private key, as returned when the address was opened
    pub private_key: String,
}

/// Response for the key import endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ImportKeyResponse {
    /// Address the key signs for
    pub address: String,
}

/// Import a private key
///
/// Adds an existing key to the keyring so its address can sign transfers again
#[utoipa::path(
    post,
    path = "/api/v1/keys",
    request_body = ImportKeyRequest,
    responses(
        (status = 201, description = "Key imported successfully", body = ImportKeyResponse),
        (status = 400, description = "Malformed private key"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn import_key(state: AppData, request: web::Json<ImportKeyRequest>) -> impl Responder {
    let secret = match hex::decode(request.private_key.trim()) {
        Ok(secret) => secret,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Failed to import key: {}", e)
            }))
        }
    };

    match state.keyring.import_secret_key(&secret) {
        Ok(address) => HttpResponse::Created().json(ImportKeyResponse { address: address.0 }),
        Err(err @ CryptoError::KeyStoreError(_)) => {
            error_response("Failed to import key", &LedgerError::from(err))
        }
        Err(err) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Failed to import key: {}", err)
        })),
    }
}
