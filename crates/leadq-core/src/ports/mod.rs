//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（PostgreSQL, 設定テーブル, 時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - lead table が source of truth（正本）
//! - 調整はすべて store の行ロックと条件付き更新に任せる
//! - tunables は毎回読む（キャッシュしない）

pub mod clock;
pub mod id_generator;
pub mod lead_store;
pub mod tunables;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UuidGenerator};
pub use self::lead_store::{LeadFilter, LeadStore, LeadTx};
pub use self::tunables::{TunablesProvider, TunablesWriter};
