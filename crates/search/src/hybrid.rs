use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::fusion::fuse_by_key;

/// 全文检索与向量检索融合后的命中结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridHit<T> {
    pub item: T,
    pub score: f64,
    /// 在全文检索结果中的排名（从0开始）
    pub text_rank: Option<usize>,
    /// 在向量检索结果中的排名（从0开始）
    pub vector_rank: Option<usize>,
}

impl<T> HybridHit<T> {
    pub fn matched_both(&self) -> bool {
        self.text_rank.is_some() && self.vector_rank.is_some()
    }
}

fn first_ranks<T, K, F>(hits: &[T], key: &F) -> HashMap<K, usize>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut ranks = HashMap::new();
    for (rank, hit) in hits.iter().enumerate() {
        ranks.entry(key(hit)).or_insert(rank);
    }
    ranks
}

/// 用 RRF 合并全文检索与向量检索的结果，并标注每个条目在两路结果中的排名
///
/// 同一条目两路都命中时保留全文检索中的那一份。
pub fn hybrid_fuse<T, K, F>(
    text_hits: &[T],
    vector_hits: &[T],
    k: f64,
    key: F,
) -> Vec<HybridHit<T>>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let text_ranks = first_ranks(text_hits, &key);
    let vector_ranks = first_ranks(vector_hits, &key);

    fuse_by_key(&[text_hits, vector_hits], k, &key)
        .into_iter()
        .map(|fused| {
            let id = key(&fused.item);
            HybridHit {
                text_rank: text_ranks.get(&id).copied(),
                vector_rank: vector_ranks.get(&id).copied(),
                item: fused.item,
                score: fused.score,
            }
        })
        .collect()
}
