//! 缓存统计信息

/// 缓存统计信息
///
/// 失效（invalidate）时清零。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 读命中次数
    pub read_hits: u64,
    /// 读未命中次数
    pub read_misses: u64,
    /// 写入被缓存镜像的次数（包括被吸收的写入）
    pub writes_cached: u64,
    /// 被吸收为脏数据的写入次数
    pub writes_absorbed: u64,
    /// 未进入缓存、直接写穿的次数
    pub writes_through: u64,
    /// 驱逐时写回脏槽位的次数
    pub evict_flushes: u64,
    /// clean 写回脏槽位的次数
    pub clean_flushes: u64,
    /// 写回失败次数
    pub flush_errors: u64,
}

impl CacheStats {
    /// 计算读命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.read_hits + self.read_misses;
        if total == 0 {
            0.0
        } else {
            self.read_hits as f64 / total as f64
        }
    }
}
