use thiserror::Error;

/// Wallet errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Requested amount exceeds what the wallet can cover.
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// A UTXO references an address this wallet never generated.
    #[error("No keypair for address {0}")]
    MissingKey(String),

    /// Signing failed.
    #[error("Signing error: {0}")]
    Signing(String),
}

/// Ledger view errors (transaction acceptance and codec).
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transaction {0} rejected: {1}")]
    Rejected(String, &'static str),

    #[error("Coin-age transaction must spend exactly {expected}, inputs total {actual}")]
    CoinAgeMismatch { expected: u64, actual: u64 },

    #[error("Block codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Mining errors.
#[derive(Error, Debug)]
pub enum MiningError {
    /// The wallet has no aged stake to burn, so the miner cannot propose.
    #[error("No spendable coin-age")]
    NoSpendableCoinAge,

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Reasons a received block is dropped.
#[derive(Error, Debug)]
pub enum BlockRejection {
    #[error("Malformed block: {0}")]
    Malformed(#[from] LedgerError),

    #[error("Invalid proof for block {0}")]
    InvalidProof(String),

    #[error("Ineligible minter {miner}: matched {matched} bits, needed {required}")]
    IneligibleMinter {
        miner: String,
        matched: u32,
        required: u32,
    },
}

pub type WalletResult<T> = Result<T, WalletError>;
pub type LedgerResult<T> = Result<T, LedgerError>;
pub type MiningResult<T> = Result<T, MiningError>;
