//! Errors - エラー型と分類
//!
//! Queue の呼び出し側（Producer / Consumer / Janitor）はリトライ方針を
//! `ErrorKind` で決めます。engine 内部ではリトライしません。
//!
//! zero rows にマッチした ack / fail / release / expire / purge はエラーではなく
//! `Ok(0)` です。

use thiserror::Error;

/// ErrorKind は呼び出し側向けの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Overflow guard が enqueue を拒否した（producer に返す）
    QueueFull,
    /// 入力が不正（store は一切変更されていない）
    Validation,
    /// Store / tunables の障害（unit of work はロールバック済み）
    StoreUnavailable,
}

/// Storage or tunables backend failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt row {lead_id}: {reason}")]
    CorruptRow { lead_id: String, reason: String },

    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}

/// QueueError は queue engine の全操作が返すエラー
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue full for tenant={tenant}: pending={pending} max_pending={max_pending}")]
    QueueFull {
        tenant: String,
        pending: u64,
        max_pending: u64,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl QueueError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueueError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::QueueFull { .. } => ErrorKind::QueueFull,
            QueueError::Validation(_) => ErrorKind::Validation,
            QueueError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        let full = QueueError::QueueFull {
            tenant: "acme".into(),
            pending: 2,
            max_pending: 2,
        };
        assert_eq!(full.kind(), ErrorKind::QueueFull);
        assert!(full.to_string().contains("tenant=acme"));

        assert_eq!(QueueError::validation("bad").kind(), ErrorKind::Validation);

        let store: QueueError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(store.kind(), ErrorKind::StoreUnavailable);
        assert!(store.to_string().contains("connection reset"));
    }
}
