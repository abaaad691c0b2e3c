//! leadq-core
//!
//! Multi-tenant durable lead queue: producers enqueue leads, consumers claim
//! and acknowledge them, a janitor recycles and cleans up.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, lead, status, policy, errors）
//! - **ports**: 抽象化レイヤー（LeadStore / LeadTx, TunablesProvider, Clock, IdGenerator）
//! - **queue**: queue engine（LeadQueue, overflow guard, tunables の読み取り）
//! - **app**: 定期処理（Janitor）と管理用処理（seed_defaults）
//! - **impls**: 実装（InMemoryLeadStore / InMemoryTunables、feature `postgres` で pg）
//!
//! # 例
//! ```
//! use std::sync::Arc;
//! use leadq_core::domain::TenantId;
//! use leadq_core::impls::{InMemoryLeadStore, InMemoryTunables};
//! use leadq_core::queue::{LeadQueue, QueueOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), leadq_core::domain::QueueError> {
//! let queue = LeadQueue::new(
//!     Arc::new(InMemoryLeadStore::new()),
//!     Arc::new(InMemoryTunables::new()),
//!     QueueOptions::default(),
//! );
//! let tenant = TenantId::new("default")?;
//! queue.enqueue(&tenant, &serde_json::json!({"title": "2LDK"}), None).await?;
//!
//! let claim = queue.claim(&tenant, 10).await?;
//! assert_eq!(queue.ack(&tenant, claim.token, &claim.lead_ids()).await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;
