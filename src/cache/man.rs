//! 管理扇区读缓存
//!
//! 与 [`CacheAll`] 机制相同，只是准入受扇区类型限制：只有管理扇区
//! 会被放入缓存。扇区类型只是写入（填充）准入条件，读路径照常按
//! 扇区索引查找，不再检查类型。

use super::{
    all::CacheAll,
    strategy::CacheStrategy,
    CacheStats,
};
use crate::{
    block::SectorDevice,
    error::Result,
    types::{CacheType, Lookup, SectorType, WriteOutcome},
};

/// 管理扇区读缓存
pub struct CacheMan<'a> {
    inner: CacheAll<'a>,
}

impl<'a> CacheMan<'a> {
    /// 在借出的内存上创建缓存，区域不足以容纳头部时返回 `None`
    pub fn new(mem: &'a mut [u8]) -> Option<Self> {
        Some(Self {
            inner: CacheAll::new(mem)?,
        })
    }
}

impl CacheStrategy for CacheMan<'_> {
    fn cache_type(&self) -> CacheType {
        CacheType::Man
    }

    fn num_slots<D: SectorDevice>(&mut self, dev: &D) -> usize {
        self.inner.num_slots(dev)
    }

    fn read<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        buf: &mut [u8],
        ty: SectorType,
    ) -> Result<Lookup> {
        self.inner.read(dev, sector, buf, ty)
    }

    fn update<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<()> {
        if ty != SectorType::Management {
            return Ok(());
        }
        self.inner.populate(dev, sector, data)
    }

    fn write<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<WriteOutcome> {
        if ty == SectorType::Management {
            return self.inner.write(dev, sector, data, ty);
        }
        // 同一扇区若以管理类型驻留，丢弃旧副本，避免之后读到过期数据
        self.inner.discard(sector);
        self.inner.stats_mut().writes_through += 1;
        Ok(WriteOutcome::PassThrough)
    }

    fn invalidate(&mut self) {
        self.inner.invalidate();
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
