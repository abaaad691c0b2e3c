//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UuidGenerator**: UUIDv7 ベース（本番用）

use std::sync::Arc;

use uuid::{Builder, Uuid};

use crate::domain::ids::{ClaimToken, LeadId};
use crate::ports::Clock;

/// IdGenerator は複数プロセスから同時に使える ID を生成
///
/// # UUIDv7 の特性
/// - 先頭 48bit がミリ秒 timestamp なので生成順にほぼソートされる
/// - 残りはランダム（調整不要で分散生成できる）
pub trait IdGenerator: Send + Sync {
    fn generate_lead_id(&self) -> LeadId;

    fn generate_claim_token(&self) -> ClaimToken;
}

/// UuidGenerator は Clock の時刻から UUIDv7 を作る
///
/// FixedClock を渡すと timestamp 部分が決定的になります。
pub struct UuidGenerator {
    clock: Arc<dyn Clock>,
}

impl UuidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn next_uuid(&self) -> Uuid {
        let millis = self.clock.now().timestamp_millis().max(0) as u64;
        let random: [u8; 10] = rand::random();
        Builder::from_unix_timestamp_millis(millis, &random).into_uuid()
    }
}

impl IdGenerator for UuidGenerator {
    fn generate_lead_id(&self) -> LeadId {
        LeadId::from_uuid(self.next_uuid())
    }

    fn generate_claim_token(&self) -> ClaimToken {
        ClaimToken::from_uuid(self.next_uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generates_unique_ids() {
        let id_gen = UuidGenerator::new(Arc::new(SystemClock));

        let id1 = id_gen.generate_lead_id();
        let id2 = id_gen.generate_lead_id();
        let id3 = id_gen.generate_lead_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UuidGenerator::new(Arc::new(FixedClock::new(fixed_time)));

        let id1 = id_gen.generate_lead_id();
        let id2 = id_gen.generate_claim_token();
        assert_ne!(id1.as_uuid(), id2.as_uuid());

        for uuid in [id1.as_uuid(), id2.as_uuid()] {
            assert_eq!(uuid.get_version_num(), 7);
            let (secs, _) = uuid.get_timestamp().unwrap().to_unix();
            assert_eq!(secs as i64, fixed_time.timestamp());
        }
    }
}
