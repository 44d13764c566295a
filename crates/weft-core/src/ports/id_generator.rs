//! IdGenerator port - ID 生成の抽象化
//!
//! # テスト容易性
//! - FixedClock と組み合わせるとタイムスタンプ部分を固定できる

use ulid::Ulid;

use crate::domain::TaskId;
use crate::ports::Clock;

/// IdGenerator produces task ids.
///
/// The manager still checks new ids against its records, so an
/// implementation only needs to make collisions unlikely.
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// ULID-based generator. The timestamp part comes from the clock, the rest
/// is random.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::from(ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let ids = UlidGenerator::new(SystemClock);

        let id1 = ids.generate_task_id();
        let id2 = ids.generate_task_id();
        let id3 = ids.generate_task_id();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn ulid_generator_with_fixed_clock_shares_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ids = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = ids.generate_task_id();
        let id2 = ids.generate_task_id();

        // random part still differs
        assert_ne!(id1, id2);

        let timestamp1 = id1.as_ulid().timestamp_ms();
        let timestamp2 = id2.as_ulid().timestamp_ms();
        assert_eq!(timestamp1, timestamp2);
        assert_eq!(timestamp1, fixed_time.timestamp_millis() as u64);
    }
}
