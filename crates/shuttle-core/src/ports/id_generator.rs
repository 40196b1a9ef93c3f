//! IdGenerator port - correlation id 生成の抽象化
//!
//! テスト容易性のために trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::CorrelationId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は correlation id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから同時に呼ばれる）
/// - 生成される id は registry の寿命の間に衝突してはならない
pub trait IdGenerator: Send + Sync {
    fn generate_correlation_id(&self) -> CorrelationId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// timestamp は Clock から、残り 80 bit は乱数。
/// FixedClock を使っても乱数部分があるので ID は異なる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_correlation_id(&self) -> CorrelationId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        CorrelationId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_correlation_id();
        let id2 = id_gen.generate_correlation_id();
        let id3 = id_gen.generate_correlation_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn fixed_clock_fixes_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_correlation_id();
        let id2 = id_gen.generate_correlation_id();
        assert_ne!(id1, id2);

        let ts1 = Ulid::from_string(id1.as_str()).unwrap().timestamp_ms();
        let ts2 = Ulid::from_string(id2.as_str()).unwrap().timestamp_ms();
        assert_eq!(ts1, ts2);
        assert_eq!(ts1, fixed_time.timestamp_millis() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn ids_stay_distinct_under_concurrent_generation() {
        // 同一ミリ秒に大量生成しても乱数部分で衝突しない
        let fixed_time = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let id_gen = Arc::new(UlidGenerator::new(FixedClock::new(fixed_time)));

        let mut joins = Vec::new();
        for _ in 0..16 {
            let id_gen = Arc::clone(&id_gen);
            joins.push(tokio::spawn(async move {
                (0..500)
                    .map(|_| id_gen.generate_correlation_id())
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for join in joins {
            for id in join.await.unwrap() {
                assert!(seen.insert(id), "duplicate correlation id generated");
            }
        }
        assert_eq!(seen.len(), 16 * 500);
    }
}
