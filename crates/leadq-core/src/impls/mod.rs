//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryLeadStore**: 開発・テスト用の lead store（単一プロセス）
//! - **InMemoryTunables**: 開発・テスト用の設定ストア
//! - **pg**（feature `postgres`）: 本番用の PostgreSQL 実装

pub mod memory_store;
pub mod memory_tunables;

#[cfg(feature = "postgres")]
pub mod pg;

// 主要な型を再エクスポート
pub use self::memory_store::InMemoryLeadStore;
pub use self::memory_tunables::InMemoryTunables;
