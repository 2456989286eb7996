//! 缓存槽位表
//!
//! 槽位表直接布局在调用者借出的内存区域上，不做二次分配：
//!
//! ```text
//! [对齐填充][区域头: sector_size u32 | num_slots u32]
//! [槽位 0 头][槽位 0 数据 (sector_size 字节)]
//! [槽位 1 头][槽位 1 数据] ...
//! ```
//!
//! 槽位头的第一个字段总是 `sector_index: u32`，读写类缓存额外保存
//! 一个标志字节和一个扇区类型字节。所有整数使用本机字节序。

use crate::{
    block::SectorDevice,
    consts::{CACHE_HEADER_SIZE, CACHE_REGION_ALIGN, SECTOR_INDEX_INVALID, SLOT_HEADER_SIZE_RW},
    error::Result,
    types::SectorType,
};
use super::CacheStats;
use bitflags::bitflags;
use byteorder::{ByteOrder, NativeEndian};

bitflags! {
    /// 槽位状态标志（仅读写类缓存）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u8 {
        /// 数据尚未写回后端
        const DIRTY = 0x01;
    }
}

const SECTOR_SIZE_OFF: usize = 0;
const NUM_SLOTS_OFF: usize = 4;
const FLAGS_OFF: usize = 4;
const TYPE_OFF: usize = 5;

/// 借出区域上的槽位表
pub(crate) struct SlotTable<'a> {
    mem: &'a mut [u8],
    slot_header_size: usize,
}

impl<'a> SlotTable<'a> {
    /// 在借出的内存上建立槽位表
    ///
    /// 起始地址按机器字对齐，前导的未对齐字节被舍弃。
    /// 剩余长度不足区域头时返回 `None`，调用者应视为"无缓存"。
    pub fn new(mem: &'a mut [u8], slot_header_size: usize) -> Option<Self> {
        let pad = mem.as_ptr().align_offset(CACHE_REGION_ALIGN);
        if pad > mem.len() || mem.len() - pad < CACHE_HEADER_SIZE {
            log::debug!("[CACHE] region of {} bytes too small for header", mem.len());
            return None;
        }
        let mem = &mut mem[pad..];
        let mut table = Self {
            mem,
            slot_header_size,
        };
        table.set_header(0, 0);
        Some(table)
    }

    /// 区域可用字节数（对齐后）
    pub fn region_len(&self) -> usize {
        self.mem.len()
    }

    /// 已记录的扇区大小，0 表示尚未计算
    #[inline]
    pub fn sector_size(&self) -> usize {
        NativeEndian::read_u32(&self.mem[SECTOR_SIZE_OFF..]) as usize
    }

    /// 已计算的槽位数
    #[inline]
    pub fn num_slots(&self) -> usize {
        NativeEndian::read_u32(&self.mem[NUM_SLOTS_OFF..]) as usize
    }

    fn set_header(&mut self, sector_size: u32, num_slots: u32) {
        NativeEndian::write_u32(&mut self.mem[SECTOR_SIZE_OFF..], sector_size);
        NativeEndian::write_u32(&mut self.mem[NUM_SLOTS_OFF..], num_slots);
    }

    /// 计算槽位数（幂等）
    ///
    /// 扇区大小一旦记录就直接返回已有槽位数，不会重新失效已填充的槽位。
    /// 后端报告扇区大小为 0（尚不可知）时返回 0，下次访问再试。
    pub fn compute_slots<D: SectorDevice>(&mut self, dev: &D) -> usize {
        if self.sector_size() != 0 {
            return self.num_slots();
        }
        let sector_size = dev.sector_size() as usize;
        if sector_size == 0 {
            return 0;
        }
        let slot_size = self.slot_header_size + sector_size;
        let num_slots = (self.mem.len() - CACHE_HEADER_SIZE) / slot_size;
        self.set_header(sector_size as u32, num_slots as u32);
        for i in 0..num_slots {
            self.reset(i);
        }
        log::debug!(
            "[CACHE] computed {} slots of {} bytes (region {} bytes)",
            num_slots,
            slot_size,
            self.mem.len()
        );
        num_slots
    }

    /// 全部槽位置空并清零区域头，强制下次访问重新计算
    pub fn invalidate(&mut self) {
        for i in 0..self.num_slots() {
            self.reset(i);
        }
        self.set_header(0, 0);
    }

    #[inline]
    fn slot_offset(&self, slot: usize) -> usize {
        CACHE_HEADER_SIZE + slot * (self.slot_header_size + self.sector_size())
    }

    #[inline]
    fn has_flags(&self) -> bool {
        self.slot_header_size >= SLOT_HEADER_SIZE_RW
    }

    /// 直接映射下的候选槽位
    #[inline]
    pub fn hash(&self, sector: u32) -> usize {
        sector as usize % self.num_slots()
    }

    /// 直接映射查找：扇区驻留时返回其槽位
    pub fn lookup(&self, sector: u32) -> Option<usize> {
        if self.num_slots() == 0 || sector == SECTOR_INDEX_INVALID {
            return None;
        }
        let slot = self.hash(sector);
        (self.tag(slot) == sector).then_some(slot)
    }

    /// 槽位中的扇区索引
    #[inline]
    pub fn tag(&self, slot: usize) -> u32 {
        NativeEndian::read_u32(&self.mem[self.slot_offset(slot)..])
    }

    fn set_tag(&mut self, slot: usize, sector: u32) {
        let off = self.slot_offset(slot);
        NativeEndian::write_u32(&mut self.mem[off..], sector);
    }

    /// 槽位是否为空
    #[inline]
    pub fn is_empty(&self, slot: usize) -> bool {
        self.tag(slot) == SECTOR_INDEX_INVALID
    }

    /// 槽位标志
    pub fn flags(&self, slot: usize) -> SlotFlags {
        if !self.has_flags() {
            return SlotFlags::empty();
        }
        SlotFlags::from_bits_truncate(self.mem[self.slot_offset(slot) + FLAGS_OFF])
    }

    fn set_flags(&mut self, slot: usize, flags: SlotFlags) {
        if self.has_flags() {
            let off = self.slot_offset(slot) + FLAGS_OFF;
            self.mem[off] = flags.bits();
        }
    }

    /// 槽位是否为脏
    #[inline]
    pub fn is_dirty(&self, slot: usize) -> bool {
        self.flags(slot).contains(SlotFlags::DIRTY)
    }

    /// 设置或清除脏标志
    pub fn set_dirty(&mut self, slot: usize, dirty: bool) {
        let mut flags = self.flags(slot);
        flags.set(SlotFlags::DIRTY, dirty);
        self.set_flags(slot, flags);
    }

    /// 槽位中扇区的类型（只读类缓存不记录类型）
    pub fn sector_type(&self, slot: usize) -> Option<SectorType> {
        if !self.has_flags() {
            return None;
        }
        SectorType::from_u8(self.mem[self.slot_offset(slot) + TYPE_OFF])
    }

    fn set_sector_type(&mut self, slot: usize, ty: SectorType) {
        if self.has_flags() {
            let off = self.slot_offset(slot) + TYPE_OFF;
            self.mem[off] = ty as u8;
        }
    }

    /// 槽位数据
    pub fn data(&self, slot: usize) -> &[u8] {
        let start = self.slot_offset(slot) + self.slot_header_size;
        &self.mem[start..start + self.sector_size()]
    }

    fn data_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = self.slot_offset(slot) + self.slot_header_size;
        let end = start + self.sector_size();
        &mut self.mem[start..end]
    }

    /// 将槽位置空（不写回）
    pub fn reset(&mut self, slot: usize) {
        self.set_tag(slot, SECTOR_INDEX_INVALID);
        self.set_flags(slot, SlotFlags::empty());
    }

    /// 用新扇区覆盖槽位
    pub fn store(&mut self, slot: usize, sector: u32, data: &[u8], ty: SectorType, dirty: bool) {
        let len = self.sector_size();
        self.data_mut(slot).copy_from_slice(&data[..len]);
        self.set_tag(slot, sector);
        self.set_sector_type(slot, ty);
        self.set_dirty(slot, dirty);
    }

    /// 槽位数据复制到输出缓冲区
    pub fn copy_out(&self, slot: usize, buf: &mut [u8]) {
        let data = self.data(slot);
        buf[..data.len()].copy_from_slice(data);
    }

    /// 将脏槽位写回后端并清除脏标志
    ///
    /// 写回失败时保持脏标志，槽位仍然可以正确服务读取。
    pub fn flush<D: SectorDevice>(&mut self, dev: &mut D, slot: usize) -> Result<()> {
        let sector = self.tag(slot);
        dev.write_sector(sector, self.data(slot))?;
        self.set_dirty(slot, false);
        Ok(())
    }

    /// 写回全部脏槽位（尽力而为）
    ///
    /// 单个槽位写回失败不会中止遍历，返回遇到的第一个错误；
    /// 成功时返回写回的槽位数。
    pub fn clean<D: SectorDevice>(&mut self, dev: &mut D, stats: &mut CacheStats) -> Result<usize> {
        let mut flushed = 0;
        let mut first_err = None;
        for slot in 0..self.num_slots() {
            if self.is_empty(slot) || !self.is_dirty(slot) {
                continue;
            }
            match self.flush(dev, slot) {
                Ok(()) => {
                    flushed += 1;
                    stats.clean_flushes += 1;
                }
                Err(err) => {
                    log::warn!("[CACHE] clean: flush of sector {:#x} failed: {}", self.tag(slot), err);
                    stats.flush_errors += 1;
                    first_err.get_or_insert(err);
                }
            }
        }
        log::debug!("[CACHE] clean flushed {} dirty slots", flushed);
        match first_err {
            Some(err) => Err(err),
            None => Ok(flushed),
        }
    }

    /// 为新扇区腾出槽位
    ///
    /// 槽位中是另一个脏扇区时先写回。写回失败时槽位被置空，
    /// 错误返回给调用者，脏数据丢失。
    pub fn evict<D: SectorDevice>(&mut self, dev: &mut D, slot: usize, sector: u32) -> Result<bool> {
        let old = self.tag(slot);
        if old == sector || old == SECTOR_INDEX_INVALID || !self.is_dirty(slot) {
            return Ok(false);
        }
        log::debug!("[CACHE] evict dirty sector {:#x} from slot {} for {:#x}", old, slot, sector);
        if let Err(err) = self.flush(dev, slot) {
            log::warn!("[CACHE] evict flush of sector {:#x} failed: {}", old, err);
            self.reset(slot);
            return Err(err);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{AlignedRegion, MockDevice};
    use crate::consts::SLOT_HEADER_SIZE_RO;

    #[test]
    fn test_region_too_small() {
        let mut region = AlignedRegion::<4>::new();
        assert!(SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RO).is_none());
    }

    #[test]
    fn test_misaligned_start_is_skipped() {
        let mut region = AlignedRegion::<64>::new();
        let table = SlotTable::new(&mut region.as_mut()[1..], SLOT_HEADER_SIZE_RO).unwrap();
        assert_eq!(table.region_len(), 64 - CACHE_REGION_ALIGN);
    }

    #[test]
    fn test_region_start_aligned_to_machine_word() {
        assert_eq!(CACHE_REGION_ALIGN, core::mem::align_of::<usize>());
        let mut region = AlignedRegion::<64>::new();
        let table = SlotTable::new(&mut region.as_mut()[4..], SLOT_HEADER_SIZE_RO).unwrap();
        let pad = (CACHE_REGION_ALIGN - 4 % CACHE_REGION_ALIGN) % CACHE_REGION_ALIGN;
        assert_eq!(table.region_len(), 60 - pad);
    }

    #[test]
    fn test_compute_slots_formula() {
        let mut region = AlignedRegion::<4160>::new();
        let dev = MockDevice::new(512, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RW).unwrap();
        let expected = (4160 - CACHE_HEADER_SIZE) / (512 + SLOT_HEADER_SIZE_RW);
        assert_eq!(table.compute_slots(&dev), expected);
        assert_eq!(expected, 7);
        for i in 0..expected {
            assert!(table.is_empty(i));
        }
    }

    #[test]
    fn test_compute_slots_waits_for_sector_size() {
        let mut region = AlignedRegion::<1024>::new();
        let mut dev = MockDevice::new(0, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RO).unwrap();
        assert_eq!(table.compute_slots(&dev), 0);
        assert_eq!(table.sector_size(), 0);

        dev.set_sector_size(128);
        assert_eq!(table.compute_slots(&dev), (1024 - 8) / 132);
    }

    #[test]
    fn test_compute_slots_is_idempotent() {
        let mut region = AlignedRegion::<1024>::new();
        let dev = MockDevice::new(128, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RW).unwrap();
        let n = table.compute_slots(&dev);
        table.store(1, 1, &[0xAB; 128], SectorType::Data, true);

        assert_eq!(table.compute_slots(&dev), n);
        assert_eq!(table.tag(1), 1);
        assert!(table.is_dirty(1));
    }

    #[test]
    fn test_region_smaller_than_one_slot() {
        let mut region = AlignedRegion::<64>::new();
        let dev = MockDevice::new(512, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RO).unwrap();
        assert_eq!(table.compute_slots(&dev), 0);
    }

    #[test]
    fn test_store_and_reset() {
        let mut region = AlignedRegion::<1024>::new();
        let dev = MockDevice::new(128, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RW).unwrap();
        table.compute_slots(&dev);

        table.store(2, 9, &[0x5A; 128], SectorType::Management, true);
        assert_eq!(table.tag(2), 9);
        assert_eq!(table.sector_type(2), Some(SectorType::Management));
        assert!(table.is_dirty(2));
        assert!(table.data(2).iter().all(|&b| b == 0x5A));

        table.reset(2);
        assert!(table.is_empty(2));
        assert!(!table.is_dirty(2));
    }

    #[test]
    fn test_ro_slots_have_no_flags() {
        let mut region = AlignedRegion::<1024>::new();
        let dev = MockDevice::new(128, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RO).unwrap();
        table.compute_slots(&dev);

        table.store(0, 3, &[1; 128], SectorType::Data, true);
        assert!(!table.is_dirty(0));
        assert_eq!(table.sector_type(0), None);
    }

    #[test]
    fn test_evict_flushes_other_dirty_sector() {
        let mut region = AlignedRegion::<1024>::new();
        let mut dev = MockDevice::new(128, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RW).unwrap();
        table.compute_slots(&dev);

        table.store(0, 4, &[7; 128], SectorType::Data, true);
        assert!(!table.evict(&mut dev, 0, 4).unwrap());
        assert!(dev.writes().is_empty());

        assert!(table.evict(&mut dev, 0, 11).unwrap());
        assert_eq!(dev.writes(), [4]);
        assert_eq!(dev.sector(4), [7; 128]);
        assert!(!table.is_dirty(0));
    }

    #[test]
    fn test_evict_failure_drops_slot() {
        let mut region = AlignedRegion::<1024>::new();
        let mut dev = MockDevice::new(128, 64);
        let mut table = SlotTable::new(region.as_mut(), SLOT_HEADER_SIZE_RW).unwrap();
        table.compute_slots(&dev);

        table.store(0, 4, &[7; 128], SectorType::Data, true);
        dev.fail_writes_to(4);
        assert!(table.evict(&mut dev, 0, 11).is_err());
        assert!(table.is_empty(0));
    }
}
