//! 测试用的内存设备与对齐区域

use crate::{
    block::SectorDevice,
    error::{Error, ErrorKind, Result},
};
use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

/// 按 8 字节对齐的缓存区域，保证对齐填充为 0
#[repr(C, align(8))]
pub(crate) struct AlignedRegion<const N: usize>([u8; N]);

impl<const N: usize> AlignedRegion<N> {
    pub fn new() -> Self {
        Self([0u8; N])
    }

    pub fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// 内存扇区设备，记录每一次后端写入
pub(crate) struct MockDevice {
    sector_size: u32,
    num_sectors: u32,
    storage: Vec<u8>,
    writes: Vec<u32>,
    reads: Vec<u32>,
    failing: BTreeSet<u32>,
    read_only: bool,
}

impl MockDevice {
    /// `sector_size` 为 0 时模拟尚未就绪的介质，存储按 512 字节预留
    pub fn new(sector_size: u32, num_sectors: u32) -> Self {
        let alloc_size = if sector_size == 0 { 512 } else { sector_size };
        Self {
            sector_size,
            num_sectors,
            storage: vec![0u8; (alloc_size * num_sectors) as usize],
            writes: Vec::new(),
            reads: Vec::new(),
            failing: BTreeSet::new(),
            read_only: false,
        }
    }

    pub fn set_sector_size(&mut self, sector_size: u32) {
        self.sector_size = sector_size;
        self.storage = vec![0u8; (sector_size * self.num_sectors) as usize];
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// 之后对该扇区的写入全部失败
    pub fn fail_writes_to(&mut self, sector: u32) {
        self.failing.insert(sector);
    }

    pub fn heal(&mut self) {
        self.failing.clear();
    }

    /// 已成功写入的扇区序列
    pub fn writes(&self) -> &[u32] {
        &self.writes
    }

    pub fn reads(&self) -> &[u32] {
        &self.reads
    }

    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.reads.clear();
    }

    pub fn sector(&self, sector: u32) -> &[u8] {
        let size = self.sector_size as usize;
        let start = sector as usize * size;
        &self.storage[start..start + size]
    }

    /// 绕过记录直接写存储，用于准备初始内容
    pub fn fill(&mut self, sector: u32, byte: u8) {
        let size = self.sector_size as usize;
        let start = sector as usize * size;
        self.storage[start..start + size].fill(byte);
    }
}

impl SectorDevice for MockDevice {
    fn sector_size(&self) -> u32 {
        self.sector_size
    }

    fn num_sectors(&self) -> u32 {
        self.num_sectors
    }

    fn read_sector(&mut self, index: u32, buf: &mut [u8]) -> Result<()> {
        let size = self.sector_size as usize;
        let start = index as usize * size;
        buf[..size].copy_from_slice(&self.storage[start..start + size]);
        self.reads.push(index);
        Ok(())
    }

    fn write_sector(&mut self, index: u32, buf: &[u8]) -> Result<()> {
        if self.failing.contains(&index) {
            return Err(Error::new(ErrorKind::Io, "mock write failure"));
        }
        let size = self.sector_size as usize;
        let start = index as usize * size;
        self.storage[start..start + size].copy_from_slice(&buf[..size]);
        self.writes.push(index);
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}
