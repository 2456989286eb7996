//! 直接映射读写缓存
//!
//! 按扇区类型配置读缓存、写缓存和延迟写，并跟踪脏槽位。
//!
//! # 槽位状态
//!
//! ```text
//! Empty --(写入且延迟写)--> Dirty --(clean / 驱逐写回)--> Clean
//! Clean --(被另一扇区覆盖)--> Dirty | Clean（新扇区）
//! ```
//!
//! 覆盖一个存放着其他扇区的脏槽位之前必须先把它写回后端，
//! 否则未写回的数据会被悄悄丢弃。

use super::{
    slot::SlotTable,
    strategy::{check_buf, check_mode, unsupported, CacheStrategy},
    CacheStats, Command, Reply,
};
use crate::{
    block::SectorDevice,
    consts::{SECTOR_INDEX_INVALID, SLOT_HEADER_SIZE_RW},
    error::Result,
    types::{CacheMode, CacheType, Lookup, ModeTable, SectorType, SectorTypeMask, WriteOutcome},
};

/// 直接映射读写缓存
///
/// 模式表初始为空：在为某类型设置模式之前，该类型的扇区不会进入缓存。
pub struct CacheRw<'a> {
    table: SlotTable<'a>,
    modes: ModeTable,
    stats: CacheStats,
}

impl<'a> CacheRw<'a> {
    /// 在借出的内存上创建缓存，区域不足以容纳头部时返回 `None`
    pub fn new(mem: &'a mut [u8]) -> Option<Self> {
        Some(Self {
            table: SlotTable::new(mem, SLOT_HEADER_SIZE_RW)?,
            modes: ModeTable::new(),
            stats: CacheStats::default(),
        })
    }

    /// 设置扇区类型的缓存模式
    ///
    /// 不会回溯驱逐已经缓存的同类型扇区。
    pub fn set_mode(&mut self, types: SectorTypeMask, mode: CacheMode) -> Result<()> {
        check_mode(types, mode)?;
        self.modes.set(types, mode);
        log::debug!("[CACHE] rw: mode {:?} for {:?}", mode, types);
        Ok(())
    }

    /// 当前模式表
    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    /// 写回全部脏槽位
    ///
    /// 单个写回失败不会中止，返回遇到的第一个错误；失败的槽位保持为脏。
    pub fn clean<D: SectorDevice>(&mut self, dev: &mut D) -> Result<usize> {
        self.table.clean(dev, &mut self.stats)
    }

    /// 丢弃 `[first, first + count)` 中驻留的扇区，脏数据不写回
    ///
    /// 返回丢弃的槽位数。
    pub fn remove_range(&mut self, first: u32, count: u32) -> usize {
        let num_slots = self.table.num_slots();
        if num_slots == 0 || count == 0 {
            return 0;
        }
        // 哨兵索引永远不会驻留，范围截断在它之前
        let end = (first as u64 + count as u64).min(SECTOR_INDEX_INVALID as u64);
        let mut removed = 0;
        if count as usize >= num_slots {
            // 范围比缓存大时改为遍历槽位
            for slot in 0..num_slots {
                let tag = self.table.tag(slot);
                if tag != SECTOR_INDEX_INVALID && (first as u64..end).contains(&(tag as u64)) {
                    self.table.reset(slot);
                    removed += 1;
                }
            }
        } else {
            for sector in first as u64..end {
                if let Some(slot) = self.table.lookup(sector as u32) {
                    self.table.reset(slot);
                    removed += 1;
                }
            }
        }
        log::debug!("[CACHE] rw: removed {} slots in [{:#x}, {:#x})", removed, first, end);
        removed
    }

    /// 驱逐槽位中的旧扇区后写入新扇区
    ///
    /// 驱逐写回失败时新数据照样写入槽位，错误返回给调用者。
    fn place<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        slot: usize,
        sector: u32,
        data: &[u8],
        ty: SectorType,
        dirty: bool,
    ) -> Result<()> {
        let evicted = self.table.evict(dev, slot, sector);
        match evicted {
            Ok(true) => self.stats.evict_flushes += 1,
            Ok(false) => {}
            Err(_) => self.stats.flush_errors += 1,
        }
        self.table.store(slot, sector, data, ty, dirty);
        evicted.map(|_| ())
    }
}

impl CacheStrategy for CacheRw<'_> {
    fn cache_type(&self) -> CacheType {
        CacheType::Rw
    }

    fn num_slots<D: SectorDevice>(&mut self, dev: &D) -> usize {
        self.table.compute_slots(dev)
    }

    fn read<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        buf: &mut [u8],
        _ty: SectorType,
    ) -> Result<Lookup> {
        if self.table.compute_slots(dev) == 0 {
            self.stats.read_misses += 1;
            return Ok(Lookup::Miss);
        }
        check_buf(buf.len(), self.table.sector_size())?;
        match self.table.lookup(sector) {
            Some(slot) => {
                self.table.copy_out(slot, buf);
                self.stats.read_hits += 1;
                log::trace!("[CACHE] rw: read sector {:#x} HIT (slot {})", sector, slot);
                Ok(Lookup::Hit)
            }
            None => {
                self.stats.read_misses += 1;
                log::trace!("[CACHE] rw: read sector {:#x} MISS", sector);
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
        if self.table.compute_slots(dev) == 0 || sector == SECTOR_INDEX_INVALID {
            return Ok(());
        }
        if !self.modes.get(ty).contains(CacheMode::READ) {
            return Ok(());
        }
        check_buf(data.len(), self.table.sector_size())?;
        if self.table.lookup(sector).is_some() {
            // 已驻留（可能为脏），缓存中的数据不比后端旧
            return Ok(());
        }
        let slot = self.table.hash(sector);
        self.place(dev, slot, sector, data, ty, false)
    }

    fn write<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<WriteOutcome> {
        if self.table.compute_slots(dev) == 0 || sector == SECTOR_INDEX_INVALID {
            self.stats.writes_through += 1;
            return Ok(WriteOutcome::PassThrough);
        }
        check_buf(data.len(), self.table.sector_size())?;
        let mode = self.modes.get(ty);
        let resident = self.table.lookup(sector).is_some();
        // 已驻留的扇区必须同步更新，否则之后会读到旧数据
        if !mode.contains(CacheMode::WRITE) && !resident {
            self.stats.writes_through += 1;
            return Ok(WriteOutcome::PassThrough);
        }

        let delayed = mode.contains(CacheMode::DELAYED);
        let slot = self.table.hash(sector);
        self.place(dev, slot, sector, data, ty, delayed)?;
        self.stats.writes_cached += 1;
        if delayed {
            self.stats.writes_absorbed += 1;
            log::trace!("[CACHE] rw: write sector {:#x} ABSORBED (slot {})", sector, slot);
            Ok(WriteOutcome::Absorbed)
        } else {
            log::trace!("[CACHE] rw: write sector {:#x} mirrored (slot {})", sector, slot);
            Ok(WriteOutcome::PassThrough)
        }
    }

    fn invalidate(&mut self) {
        self.table.invalidate();
        self.stats = CacheStats::default();
        log::debug!("[CACHE] rw: invalidated");
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
            _ => Err(unsupported()),
        }
    }
}
