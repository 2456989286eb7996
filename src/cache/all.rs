//! 全扇区读缓存
//!
//! 直接映射，缓存所有读取过的扇区。写入只做镜像，调用者总是要写后端，
//! 因此没有脏数据，覆盖槽位永远是安全的。

use super::{
    slot::SlotTable,
    strategy::{check_buf, CacheStrategy},
    CacheStats,
};
use crate::{
    block::SectorDevice,
    consts::{SECTOR_INDEX_INVALID, SLOT_HEADER_SIZE_RO},
    error::Result,
    types::{CacheType, Lookup, SectorType, WriteOutcome},
};

/// 全扇区读缓存
pub struct CacheAll<'a> {
    table: SlotTable<'a>,
    stats: CacheStats,
}

impl<'a> CacheAll<'a> {
    /// 在借出的内存上创建缓存，区域不足以容纳头部时返回 `None`
    pub fn new(mem: &'a mut [u8]) -> Option<Self> {
        Some(Self {
            table: SlotTable::new(mem, SLOT_HEADER_SIZE_RO)?,
            stats: CacheStats::default(),
        })
    }

    /// 无条件把扇区放入其哈希槽位
    pub fn populate<D: SectorDevice>(&mut self, dev: &D, sector: u32, data: &[u8]) -> Result<()> {
        if self.table.compute_slots(dev) == 0 || sector == SECTOR_INDEX_INVALID {
            return Ok(());
        }
        check_buf(data.len(), self.table.sector_size())?;
        let slot = self.table.hash(sector);
        self.table.store(slot, sector, data, SectorType::Data, false);
        log::trace!("[CACHE] populate sector {:#x} into slot {}", sector, slot);
        Ok(())
    }

    /// 扇区驻留时将其丢弃
    pub(super) fn discard(&mut self, sector: u32) {
        if let Some(slot) = self.table.lookup(sector) {
            self.table.reset(slot);
        }
    }

    pub(super) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }
}

impl CacheStrategy for CacheAll<'_> {
    fn cache_type(&self) -> CacheType {
        CacheType::All
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
                log::trace!("[CACHE] read sector {:#x} HIT (slot {})", sector, slot);
                Ok(Lookup::Hit)
            }
            None => {
                self.stats.read_misses += 1;
                log::trace!("[CACHE] read sector {:#x} MISS", sector);
                Ok(Lookup::Miss)
            }
        }
    }

    fn update<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        _ty: SectorType,
    ) -> Result<()> {
        self.populate(dev, sector, data)
    }

    fn write<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        _ty: SectorType,
    ) -> Result<WriteOutcome> {
        self.populate(dev, sector, data)?;
        if self.table.num_slots() != 0 {
            self.stats.writes_cached += 1;
        } else {
            self.stats.writes_through += 1;
        }
        Ok(WriteOutcome::PassThrough)
    }

    fn invalidate(&mut self) {
        self.table.invalidate();
        self.stats = CacheStats::default();
        log::debug!("[CACHE] all: invalidated");
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{AlignedRegion, MockDevice};
    use crate::cache::{Command, Reply};
    use crate::error::ErrorKind;
    use crate::types::{CacheMode, SectorTypeMask};

    // (1024 - 8) / (128 + 4) = 7
    const SLOTS: u32 = 7;

    fn setup(region: &mut AlignedRegion<1024>) -> (CacheAll<'_>, MockDevice) {
        (CacheAll::new(region.as_mut()).unwrap(), MockDevice::new(128, 64))
    }

    #[test]
    fn test_hit_after_populate() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);
        let mut buf = [0u8; 128];

        assert_eq!(cache.read(&mut dev, 3, &mut buf, SectorType::Data).unwrap(), Lookup::Miss);
        cache.populate(&dev, 3, &[0x33; 128]).unwrap();
        assert_eq!(cache.read(&mut dev, 3, &mut buf, SectorType::Data).unwrap(), Lookup::Hit);
        assert_eq!(buf, [0x33; 128]);
        assert!(dev.reads().is_empty());
    }

    #[test]
    fn test_direct_mapped_eviction() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);
        let mut buf = [0u8; 128];

        cache.populate(&dev, 2, &[0x02; 128]).unwrap();
        cache.populate(&dev, 2 + SLOTS, &[0x09; 128]).unwrap();

        assert_eq!(cache.read(&mut dev, 2, &mut buf, SectorType::Data).unwrap(), Lookup::Miss);
        assert_eq!(
            cache.read(&mut dev, 2 + SLOTS, &mut buf, SectorType::Data).unwrap(),
            Lookup::Hit
        );
        assert_eq!(buf, [0x09; 128]);
    }

    #[test]
    fn test_write_mirrors_and_passes_through() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);
        let mut buf = [0u8; 128];

        let outcome = cache.write(&mut dev, 5, &[0x55; 128], SectorType::Directory).unwrap();
        assert_eq!(outcome, WriteOutcome::PassThrough);
        assert_eq!(cache.read(&mut dev, 5, &mut buf, SectorType::Data).unwrap(), Lookup::Hit);
        assert_eq!(buf, [0x55; 128]);
        assert!(dev.writes().is_empty());
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);
        let mut buf = [0u8; 128];

        cache.populate(&dev, 1, &[1; 128]).unwrap();
        cache.invalidate();
        assert_eq!(cache.table.sector_size(), 0);
        assert_eq!(cache.table.num_slots(), 0);

        assert_eq!(cache.read(&mut dev, 1, &mut buf, SectorType::Data).unwrap(), Lookup::Miss);
        assert_eq!(cache.num_slots(&dev), SLOTS as usize);
    }

    #[test]
    fn test_small_buffer_rejected() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);
        let mut buf = [0u8; 64];

        let err = cache.read(&mut dev, 1, &mut buf, SectorType::Data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_commands() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);

        assert_eq!(
            cache.command(&mut dev, Command::GetType).unwrap(),
            Reply::Type(CacheType::All)
        );
        assert_eq!(
            cache.command(&mut dev, Command::GetNumSectors).unwrap(),
            Reply::NumSectors(SLOTS as usize)
        );

        cache.populate(&dev, 4, &[4; 128]).unwrap();
        assert_eq!(
            cache.command(&mut dev, Command::FreeSectors { first: 0, count: 8 }).unwrap(),
            Reply::Done
        );
        assert!(cache.table.lookup(4).is_some());
        assert_eq!(cache.command(&mut dev, Command::Clean).unwrap(), Reply::Done);

        let err = cache
            .command(
                &mut dev,
                Command::SetMode {
                    types: SectorTypeMask::ALL,
                    mode: CacheMode::WRITE_BACK,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = cache.command(&mut dev, Command::SetAssocLevel(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_stats() {
        let mut region = AlignedRegion::new();
        let (mut cache, mut dev) = setup(&mut region);
        let mut buf = [0u8; 128];

        cache.read(&mut dev, 1, &mut buf, SectorType::Data).unwrap();
        cache.populate(&dev, 1, &[1; 128]).unwrap();
        cache.read(&mut dev, 1, &mut buf, SectorType::Data).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.read_hits, 1);
        assert_eq!(stats.read_misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
