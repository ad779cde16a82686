//! 混合检索结果融合
//!
//! Reciprocal Rank Fusion：多路已排序的检索结果按 `1/(k+rank+1)` 累加得分后合并。

pub mod fusion;
pub mod hybrid;

pub use fusion::{fuse_by_key, rank_contribution, reciprocal_rank_fusion, FusedItem, DEFAULT_K};
pub use hybrid::{hybrid_fuse, HybridHit};
