//! 多路组相联读写缓存
//!
//! [`CacheRw`](super::CacheRw) 的组相联版本：扇区按 `sector mod num_sets`
//! 选组，组内任意一路都可以存放该扇区。组内替换优先选空路，否则选
//! 最近最少使用的一路，最近使用顺序由 lru crate 按组维护。
//!
//! 另外支持按扇区类型限制可占用的槽位数（配额）。

use super::{
    slot::SlotTable,
    strategy::{check_buf, check_mode, unsupported, CacheStrategy},
    CacheStats, Command, Reply,
};
use crate::{
    block::SectorDevice,
    consts::{DEFAULT_ASSOC_LEVEL, MAX_ASSOC_LEVEL, SECTOR_INDEX_INVALID, SLOT_HEADER_SIZE_RW},
    error::{Error, ErrorKind, Result},
    types::{CacheMode, CacheType, Lookup, ModeTable, SectorType, SectorTypeMask, WriteOutcome},
};
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;

/// 多路组相联读写缓存
pub struct CacheMultiWay<'a> {
    table: SlotTable<'a>,
    modes: ModeTable,
    assoc: NonZeroUsize,
    quotas: [Option<u32>; SectorType::COUNT],
    /// 各类型当前占用的槽位数
    counts: [u32; SectorType::COUNT],
    /// 每组一个 LRU，键为组内路号
    recency: Vec<LruCache<usize, ()>>,
    stats: CacheStats,
}

impl<'a> CacheMultiWay<'a> {
    /// 在借出的内存上创建缓存，区域不足以容纳头部时返回 `None`
    pub fn new(mem: &'a mut [u8]) -> Option<Self> {
        Some(Self {
            table: SlotTable::new(mem, SLOT_HEADER_SIZE_RW)?,
            modes: ModeTable::new(),
            assoc: NonZeroUsize::new(DEFAULT_ASSOC_LEVEL as usize)?,
            quotas: [None; SectorType::COUNT],
            counts: [0; SectorType::COUNT],
            recency: Vec::new(),
            stats: CacheStats::default(),
        })
    }

    /// 当前相联度
    pub fn assoc_level(&self) -> usize {
        self.assoc.get()
    }

    /// 某类型当前占用的槽位数
    pub fn occupancy(&self, ty: SectorType) -> u32 {
        self.counts[ty.index()]
    }

    /// 设置扇区类型的缓存模式
    pub fn set_mode(&mut self, types: SectorTypeMask, mode: CacheMode) -> Result<()> {
        check_mode(types, mode)?;
        self.modes.set(types, mode);
        log::debug!("[CACHE] multi-way: mode {:?} for {:?}", mode, types);
        Ok(())
    }

    /// 设置扇区类型的槽位配额
    ///
    /// 已超出配额的驻留扇区不会被驱逐，只是不再接纳该类型的新扇区。
    /// 驻留扇区以已满配额的其他类型重写时，旧副本被丢弃，写入直接写穿。
    pub fn set_quota(&mut self, types: SectorTypeMask, quota: u32) -> Result<()> {
        if types.is_empty() {
            return Err(Error::new(ErrorKind::InvalidInput, "empty sector type mask"));
        }
        for ty in types.types() {
            self.quotas[ty.index()] = Some(quota);
        }
        log::debug!("[CACHE] multi-way: quota {} for {:?}", quota, types);
        Ok(())
    }

    /// 修改相联度
    ///
    /// 组映射随之改变，因此先尽力写回全部脏槽位，再失效整个缓存。
    /// 写回失败时仍然失效，并返回第一个错误。
    pub fn set_assoc_level<D: SectorDevice>(&mut self, dev: &mut D, level: u32) -> Result<()> {
        if level == 0 || level > MAX_ASSOC_LEVEL || !level.is_power_of_two() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "associativity must be a power of two",
            ));
        }
        let assoc = NonZeroUsize::new(level as usize)
            .ok_or(Error::new(ErrorKind::InvalidInput, "associativity must be non-zero"))?;
        if assoc == self.assoc {
            return Ok(());
        }
        let cleaned = self.clean(dev);
        self.assoc = assoc;
        self.invalidate();
        log::debug!("[CACHE] multi-way: associativity set to {}", level);
        cleaned.map(|_| ())
    }

    /// 写回全部脏槽位（尽力而为，返回第一个错误）
    pub fn clean<D: SectorDevice>(&mut self, dev: &mut D) -> Result<usize> {
        self.table.clean(dev, &mut self.stats)
    }

    /// 丢弃 `[first, first + count)` 中驻留的扇区，脏数据不写回
    pub fn remove_range(&mut self, first: u32, count: u32) -> usize {
        let end = first as u64 + count as u64;
        let mut removed = 0;
        for slot in 0..self.usable_slots() {
            let tag = self.table.tag(slot);
            if tag != SECTOR_INDEX_INVALID && (first as u64..end).contains(&(tag as u64)) {
                self.release(slot);
                removed += 1;
            }
        }
        log::debug!(
            "[CACHE] multi-way: removed {} slots in [{:#x}, {:#x})",
            removed,
            first,
            end
        );
        removed
    }

    /// 计算组数，必要时重建每组的 LRU
    fn sets<D: SectorDevice>(&mut self, dev: &D) -> usize {
        let num_sets = self.table.compute_slots(dev) / self.assoc.get();
        if self.recency.len() != num_sets {
            let assoc = self.assoc;
            self.recency = (0..num_sets)
                .map(|_| {
                    let mut lru = LruCache::new(assoc);
                    for way in 0..assoc.get() {
                        lru.put(way, ());
                    }
                    lru
                })
                .collect();
        }
        num_sets
    }

    fn usable_slots(&self) -> usize {
        self.recency.len() * self.assoc.get()
    }

    fn set_of(&self, sector: u32) -> usize {
        sector as usize % self.recency.len()
    }

    /// 在组内查找扇区，返回路号
    fn find(&self, set: usize, sector: u32) -> Option<usize> {
        if sector == SECTOR_INDEX_INVALID {
            return None;
        }
        let base = set * self.assoc.get();
        (0..self.assoc.get()).find(|&way| self.table.tag(base + way) == sector)
    }

    fn touch(&mut self, set: usize, way: usize) {
        self.recency[set].promote(&way);
    }

    /// 选择组内替换的一路：空路优先，否则最近最少使用
    fn victim(&self, set: usize) -> usize {
        let base = set * self.assoc.get();
        (0..self.assoc.get())
            .find(|&way| self.table.is_empty(base + way))
            .or_else(|| self.recency[set].peek_lru().map(|(way, _)| *way))
            .unwrap_or(0)
    }

    /// 配额是否允许 `ty` 类型的新扇区占用 `slot`
    fn admits(&self, ty: SectorType, slot: usize) -> bool {
        match self.quotas[ty.index()] {
            None => true,
            Some(quota) => {
                self.counts[ty.index()] < quota
                    || (!self.table.is_empty(slot) && self.table.sector_type(slot) == Some(ty))
            }
        }
    }

    fn release(&mut self, slot: usize) {
        if !self.table.is_empty(slot) {
            if let Some(old) = self.table.sector_type(slot) {
                self.counts[old.index()] = self.counts[old.index()].saturating_sub(1);
            }
        }
        self.table.reset(slot);
    }

    /// 驱逐槽位中的旧扇区后写入新扇区，并维护类型占用计数
    fn place<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        slot: usize,
        sector: u32,
        data: &[u8],
        ty: SectorType,
        dirty: bool,
    ) -> Result<()> {
        let old = if self.table.is_empty(slot) {
            None
        } else {
            self.table.sector_type(slot)
        };
        let evicted = self.table.evict(dev, slot, sector);
        match evicted {
            Ok(true) => self.stats.evict_flushes += 1,
            Ok(false) => {}
            Err(_) => self.stats.flush_errors += 1,
        }
        if let Some(old) = old {
            self.counts[old.index()] = self.counts[old.index()].saturating_sub(1);
        }
        self.table.store(slot, sector, data, ty, dirty);
        self.counts[ty.index()] += 1;
        evicted.map(|_| ())
    }
}

impl CacheStrategy for CacheMultiWay<'_> {
    fn cache_type(&self) -> CacheType {
        CacheType::MultiWay
    }

    fn num_slots<D: SectorDevice>(&mut self, dev: &D) -> usize {
        self.sets(dev) * self.assoc.get()
    }

    fn read<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        buf: &mut [u8],
        _ty: SectorType,
    ) -> Result<Lookup> {
        if self.sets(dev) == 0 {
            self.stats.read_misses += 1;
            return Ok(Lookup::Miss);
        }
        check_buf(buf.len(), self.table.sector_size())?;
        let set = self.set_of(sector);
        match self.find(set, sector) {
            Some(way) => {
                self.table.copy_out(set * self.assoc.get() + way, buf);
                self.touch(set, way);
                self.stats.read_hits += 1;
                log::trace!("[CACHE] multi-way: read sector {:#x} HIT (set {}, way {})", sector, set, way);
                Ok(Lookup::Hit)
            }
            None => {
                self.stats.read_misses += 1;
                log::trace!("[CACHE] multi-way: read sector {:#x} MISS", sector);
                Ok(Lookup::Miss)
            }
        }
    }

    fn update<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<()> {
        if self.sets(dev) == 0 || sector == SECTOR_INDEX_INVALID {
            return Ok(());
        }
        if !self.modes.get(ty).contains(CacheMode::READ) {
            return Ok(());
        }
        check_buf(data.len(), self.table.sector_size())?;
        let set = self.set_of(sector);
        if self.find(set, sector).is_some() {
            return Ok(());
        }
        let way = self.victim(set);
        let slot = set * self.assoc.get() + way;
        if !self.admits(ty, slot) {
            return Ok(());
        }
        let placed = self.place(dev, slot, sector, data, ty, false);
        self.touch(set, way);
        placed
    }

    fn write<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<WriteOutcome> {
        if self.sets(dev) == 0 || sector == SECTOR_INDEX_INVALID {
            self.stats.writes_through += 1;
            return Ok(WriteOutcome::PassThrough);
        }
        check_buf(data.len(), self.table.sector_size())?;
        let mode = self.modes.get(ty);
        let set = self.set_of(sector);
        let way = match self.find(set, sector) {
            Some(way) => {
                let slot = set * self.assoc.get() + way;
                if !self.admits(ty, slot) {
                    // 换成已满配额的类型：旧副本作废，新数据写穿
                    self.release(slot);
                    self.stats.writes_through += 1;
                    return Ok(WriteOutcome::PassThrough);
                }
                way
            }
            None => {
                if !mode.contains(CacheMode::WRITE) {
                    self.stats.writes_through += 1;
                    return Ok(WriteOutcome::PassThrough);
                }
                let way = self.victim(set);
                if !self.admits(ty, set * self.assoc.get() + way) {
                    self.stats.writes_through += 1;
                    return Ok(WriteOutcome::PassThrough);
                }
                way
            }
        };

        let delayed = mode.contains(CacheMode::DELAYED);
        let slot = set * self.assoc.get() + way;
        let placed = self.place(dev, slot, sector, data, ty, delayed);
        self.touch(set, way);
        placed?;
        self.stats.writes_cached += 1;
        if delayed {
            self.stats.writes_absorbed += 1;
            Ok(WriteOutcome::Absorbed)
        } else {
            Ok(WriteOutcome::PassThrough)
        }
    }

    fn invalidate(&mut self) {
        self.table.invalidate();
        self.recency.clear();
        self.counts = [0; SectorType::COUNT];
        self.stats = CacheStats::default();
        log::debug!("[CACHE] multi-way: invalidated");
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn control<D: SectorDevice>(&mut self, dev: &mut D, cmd: Command) -> Result<Reply> {
        match cmd {
            Command::FreeSectors { first, count } => {
                self.remove_range(first, count);
                Ok(Reply::Done)
            }
            Command::Clean => self.clean(dev).map(|_| Reply::Done),
            Command::SetMode { types, mode } => self.set_mode(types, mode).map(|_| Reply::Done),
            Command::SetQuota { types, quota } => {
                self.set_quota(types, quota).map(|_| Reply::Done)
            }
            Command::SetAssocLevel(level) => {
                self.set_assoc_level(dev, level).map(|_| Reply::Done)
            }
            _ => Err(unsupported()),
        }
    }
}
