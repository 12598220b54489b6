use goldrecord_kv::KvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Kv(#[from] KvError),
}
