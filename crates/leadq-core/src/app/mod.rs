//! App - アプリケーション層
//!
//! queue engine を組み合わせて、外部から定期的に呼ばれる処理を実装します。
//!
//! # 主要コンポーネント
//! - **Janitor**: release → expire → purge を tenant ごとに回す（dry-run 対応）
//! - **seed_defaults**: tenant_settings に既定値を入れる（冪等）

pub mod janitor;
pub mod settings;

// 主要な型を再エクスポート
pub use self::janitor::{
    Janitor, JanitorConfig, JanitorHandle, JanitorReport, TenantFailure, TenantReport,
};
pub use self::settings::{SeedReport, seed_defaults};
