use std::fmt::Formatter;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    CheckChainErr,
    InvalidAmount(String),
    InvalidAddress(String),
    InvalidConfig(String),
    Corrupt(String),
    Decode(String),
    TxFailed(String),
    Io(std::io::Error),
    Db(redis::RedisError),
    Json(serde_json::Error),
    Web3(web3::Error),
    Contract(web3::contract::Error),
    NotSupport(String),
    NotAllowed(String),
    Unknown(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::CheckChainErr => write!(f, "chain id check failed"),
            Error::InvalidAmount(e) => write!(f, "invalid amount: {}", e),
            Error::InvalidAddress(e) => write!(f, "invalid address: {}", e),
            Error::InvalidConfig(e) => write!(f, "invalid config: {}", e),
            Error::Corrupt(e) => write!(f, "stored data is corrupt: {}", e),
            Error::Decode(e) => write!(f, "decode error: {}", e),
            Error::TxFailed(e) => write!(f, "transaction failed: {}", e),
            Error::Io(e) => write!(f, "Io error {:?}", e),
            Error::Db(e) => write!(f, "Database error {:?}", e),
            Error::Json(e) => write!(f, "Json error {}", e),
            Error::Web3(e) => write!(f, "Web3 error {}", e),
            Error::Contract(e) => write!(f, "Contract error {}", e),
            Error::NotSupport(e) => write!(f, "Not support: {}", e),
            Error::NotAllowed(e) => write!(f, "not allowed: {}", e),
            Error::Unknown(e) => write!(f, "a unknown error happened: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Db(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Web3(e) => Some(e),
            Error::Contract(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Db(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<web3::Error> for Error {
    fn from(e: web3::Error) -> Self {
        Error::Web3(e)
    }
}

impl From<web3::contract::Error> for Error {
    fn from(e: web3::contract::Error) -> Self {
        Error::Contract(e)
    }
}

impl From<web3::ethabi::Error> for Error {
    fn from(e: web3::ethabi::Error) -> Self {
        Error::Contract(e.into())
    }
}
