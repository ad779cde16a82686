use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// RRF 的常用平滑常数
pub const DEFAULT_K: f64 = 60.0;

/// 融合后的条目及其累计得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedItem<T> {
    pub item: T,
    pub score: f64,
}

/// 排名从0开始，第 `rank` 名贡献 `1/(k+rank+1)`
pub fn rank_contribution(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64 + 1.0)
}

pub(crate) fn effective_k(k: f64) -> f64 {
    if k.is_finite() && k >= 0.0 {
        k
    } else {
        warn!("无效的RRF常数 {}，使用默认值 {}", k, DEFAULT_K);
        DEFAULT_K
    }
}

/// Reciprocal Rank Fusion
///
/// 每个输入列表已按相关度排好序。同一条目在多个列表中的得分相加，结果按得分
/// 降序排列；得分完全相同时保持条目第一次出现的顺序。单个列表内重复出现的
/// 条目只按最靠前的位置计分。
pub fn reciprocal_rank_fusion<T, L>(lists: &[L], k: f64) -> Vec<FusedItem<T>>
where
    T: Clone + Eq + Hash,
    L: AsRef<[T]>,
{
    fuse_by_key(lists, k, |item: &T| item.clone())
}

/// 按提取出的键融合任意命中结果，同键条目保留第一次出现的那一个
pub fn fuse_by_key<H, K, L, F>(lists: &[L], k: f64, key: F) -> Vec<FusedItem<H>>
where
    H: Clone,
    K: Eq + Hash,
    L: AsRef<[H]>,
    F: Fn(&H) -> K,
{
    let k = effective_k(k);
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut fused: Vec<FusedItem<H>> = Vec::new();

    for list in lists {
        let mut seen_in_list = vec![false; fused.len()];
        for (rank, hit) in list.as_ref().iter().enumerate() {
            let position = *positions.entry(key(hit)).or_insert_with(|| {
                fused.push(FusedItem {
                    item: hit.clone(),
                    score: 0.0,
                });
                fused.len() - 1
            });
            if position >= seen_in_list.len() {
                seen_in_list.resize(position + 1, false);
            }
            if seen_in_list[position] {
                continue;
            }
            seen_in_list[position] = true;
            fused[position].score += rank_contribution(rank, k);
        }
    }

    // sort_by 是稳定排序，同分条目保持首次出现顺序
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_exact_tie_keeps_first_appearance() {
        let fused = reciprocal_rank_fusion(&[vec!["A", "B", "C"], vec!["B", "A", "D"]], 60.0);
        let order: Vec<&str> = fused.iter().map(|f| f.item).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);

        assert_eq!(fused[0].score, fused[1].score);
        assert_eq!(fused[0].score, 1.0 / 61.0 + 1.0 / 62.0);
        assert_eq!(fused[2].score, 1.0 / 63.0);
        assert_eq!(fused[3].score, 1.0 / 63.0);
    }

    #[test]
    fn test_items_in_both_lists_rank_higher() {
        let fused = reciprocal_rank_fusion(&[vec![1, 2, 3], vec![3, 4]], DEFAULT_K);
        assert_eq!(fused[0].item, 3);
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn test_empty_input() {
        let lists: Vec<Vec<u32>> = Vec::new();
        assert!(reciprocal_rank_fusion(&lists, DEFAULT_K).is_empty());
        assert!(reciprocal_rank_fusion(&[Vec::<u32>::new()], DEFAULT_K).is_empty());
    }

    #[test]
    fn test_duplicate_within_list_counts_once() {
        let fused = reciprocal_rank_fusion(&[vec!["A", "B", "A"]], 0.0);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].item, "A");
        assert_eq!(fused[0].score, 1.0);
        assert_eq!(fused[1].score, 0.5);
    }

    #[test]
    fn test_invalid_k_falls_back_to_default() {
        let fused = reciprocal_rank_fusion(&[vec!["A"]], -5.0);
        assert_eq!(fused[0].score, 1.0 / 61.0);
        let fused = reciprocal_rank_fusion(&[vec!["A"]], f64::NAN);
        assert_eq!(fused[0].score, 1.0 / 61.0);
    }

    #[test]
    fn test_fuse_by_key_keeps_first_hit() {
        #[derive(Debug, Clone, PartialEq)]
        struct Hit {
            id: u32,
            source: &'static str,
        }

        let text = vec![
            Hit { id: 7, source: "text" },
            Hit { id: 9, source: "text" },
        ];
        let vector = vec![Hit { id: 9, source: "vector" }];
        let fused = fuse_by_key(&[text, vector], DEFAULT_K, |hit| hit.id);

        assert_eq!(fused[0].item, Hit { id: 9, source: "text" });
        assert_eq!(fused[1].item.id, 7);
    }

    fn distinct_lists() -> impl Strategy<Value = Vec<Vec<u8>>> {
        prop::collection::vec(prop::collection::vec(0u8..24, 0..12), 0..5).prop_map(|lists| {
            lists
                .into_iter()
                .map(|list| {
                    let mut seen = HashSet::new();
                    list.into_iter().filter(|item| seen.insert(*item)).collect()
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn output_is_sorted_and_covers_every_item(lists in distinct_lists(), k in 0.0f64..200.0) {
            let fused = reciprocal_rank_fusion(&lists, k);

            for pair in fused.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            prop_assert!(fused.iter().all(|f| f.score > 0.0));

            let expected: HashSet<u8> = lists.iter().flatten().copied().collect();
            let actual: Vec<u8> = fused.iter().map(|f| f.item).collect();
            prop_assert_eq!(actual.len(), expected.len());
            prop_assert_eq!(actual.into_iter().collect::<HashSet<_>>(), expected);
        }

        #[test]
        fn single_list_order_is_preserved(lists in distinct_lists()) {
            if let Some(list) = lists.first() {
                let fused = reciprocal_rank_fusion(std::slice::from_ref(list), DEFAULT_K);
                let order: Vec<u8> = fused.iter().map(|f| f.item).collect();
                prop_assert_eq!(&order, list);
            }
        }

        #[test]
        fn item_first_everywhere_wins(lists in distinct_lists()) {
            let mut lists = lists;
            lists.retain(|list| !list.is_empty());
            prop_assume!(!lists.is_empty());
            let leader = 99u8;
            for list in &mut lists {
                list.insert(0, leader);
            }

            let fused = reciprocal_rank_fusion(&lists, DEFAULT_K);
            prop_assert_eq!(fused[0].item, leader);
        }

        #[test]
        fn larger_k_shrinks_rank_advantage(rank in 0usize..50, k in 0.0f64..500.0, delta in 1.0f64..500.0) {
            let gap_small_k = rank_contribution(rank, k) - rank_contribution(rank + 1, k);
            let gap_large_k = rank_contribution(rank, k + delta) - rank_contribution(rank + 1, k + delta);
            prop_assert!(gap_large_k < gap_small_k);
        }
    }
}
