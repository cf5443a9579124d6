//! # ワーカー ID の採番
//!
//! 水平スケールした複数インスタンス間でワーカー ID が衝突しないよう、
//! インスタンスごとに連続した ID 区間を割り当てる。
//!
//! インスタンス `i`（0 始まり）が `count` 個のワーカーを持つとき、
//! ID は `i × count + 1 ..= i × count + count`。
//! 全インスタンスが同じ `count` を使う限り、区間は重ならない。

use serde::{Deserialize, Serialize};

/// ワーカー ID
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("{_0}")]
pub struct WorkerId(u64);

impl WorkerId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// ワーカー ID ジェネレーター
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerGenerator {
    pub instance_index: u32,
    pub count:          u32,
}

impl WorkerGenerator {
    pub fn new(instance_index: u32, count: u32) -> Self {
        Self {
            instance_index,
            count,
        }
    }

    /// このインスタンスのワーカー ID を昇順で返す
    pub fn ids(&self) -> Vec<WorkerId> {
        let count = u64::from(self.count);
        let offset = u64::from(self.instance_index) * count;
        (1..=count).map(|n| WorkerId(offset + n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn インスタンス2で5ワーカーなら11から15() {
        let ids = WorkerGenerator::new(2, 5).ids();

        assert_eq!(
            ids.iter().map(WorkerId::as_u64).collect::<Vec<_>>(),
            vec![11, 12, 13, 14, 15]
        );
    }

    #[test]
    fn インスタンス0は1から始まる() {
        let ids = WorkerGenerator::new(0, 3).ids();

        assert_eq!(
            ids.iter().map(WorkerId::as_u64).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn count0ならワーカーなし() {
        assert!(WorkerGenerator::new(4, 0).ids().is_empty());
    }

    proptest! {
        #[test]
        fn 異なるインスタンスのワーカーidは重ならない(
            count in 1u32..50,
            a in 0u32..100,
            b in 0u32..100,
        ) {
            prop_assume!(a != b);
            let left: HashSet<_> = WorkerGenerator::new(a, count).ids().into_iter().collect();
            let right: HashSet<_> = WorkerGenerator::new(b, count).ids().into_iter().collect();

            prop_assert!(left.is_disjoint(&right));
            prop_assert_eq!(left.len(), count as usize);
        }
    }
}
