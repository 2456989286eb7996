//! 扇区 I/O 操作实现
//!
//! 文件系统一侧的缓存约定：读先查缓存，未命中读设备再填充缓存；
//! 写先交给缓存，只有缓存没有吸收时才写设备。

use super::{SectorDev, SectorDevice};
use crate::{
    cache::{CacheStrategy, Command},
    error::{Error, ErrorKind, Result},
    types::{Lookup, SectorType, WriteOutcome},
};

impl<D: SectorDevice> SectorDev<'_, D> {
    /// 读取单个扇区
    ///
    /// 缓存未命中时从设备读取，并把数据交给缓存按策略填充。
    /// 填充时驱逐写回失败会返回错误，但 `buf` 中的数据已经有效。
    pub fn read_sector(&mut self, sector: u32, buf: &mut [u8], ty: SectorType) -> Result<()> {
        self.check_sector(sector, 1)?;
        self.check_buf(buf.len(), 1)?;
        self.inc_read_count();

        if let Some(cache) = &mut self.cache {
            if cache.read(&mut self.device, sector, buf, ty)? == Lookup::Hit {
                return Ok(());
            }
        }

        self.inc_physical_read_count();
        self.device.read_sector(sector, buf)?;

        if let Some(cache) = &mut self.cache {
            cache.update(&mut self.device, sector, buf, ty)?;
        }
        Ok(())
    }

    /// 写入单个扇区
    ///
    /// 缓存吸收（延迟写）时不写设备。缓存为腾出槽位写回其他脏扇区失败时，
    /// 本扇区仍然写入设备，然后返回写回错误。
    pub fn write_sector(&mut self, sector: u32, buf: &[u8], ty: SectorType) -> Result<()> {
        if self.device.is_read_only() {
            return Err(Error::new(ErrorKind::PermissionDenied, "device is read-only"));
        }
        self.check_sector(sector, 1)?;
        self.check_buf(buf.len(), 1)?;
        self.inc_write_count();

        let outcome = match &mut self.cache {
            Some(cache) => cache.write(&mut self.device, sector, buf, ty),
            None => Ok(WriteOutcome::PassThrough),
        };

        match outcome {
            Ok(WriteOutcome::Absorbed) => Ok(()),
            Ok(WriteOutcome::PassThrough) => {
                self.inc_physical_write_count();
                self.device.write_sector(sector, buf)
            }
            Err(err) if err.kind() == ErrorKind::Io => {
                self.inc_physical_write_count();
                self.device.write_sector(sector, buf)?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// 读取连续多个扇区
    pub fn read_sectors(&mut self, first: u32, count: u32, buf: &mut [u8], ty: SectorType) -> Result<()> {
        self.check_sector(first, count)?;
        let sector_size = self.check_buf(buf.len(), count)?;
        for (i, chunk) in buf.chunks_exact_mut(sector_size).take(count as usize).enumerate() {
            self.read_sector(first + i as u32, chunk, ty)?;
        }
        Ok(())
    }

    /// 写入连续多个扇区
    pub fn write_sectors(&mut self, first: u32, count: u32, buf: &[u8], ty: SectorType) -> Result<()> {
        self.check_sector(first, count)?;
        let sector_size = self.check_buf(buf.len(), count)?;
        for (i, chunk) in buf.chunks_exact(sector_size).take(count as usize).enumerate() {
            self.write_sector(first + i as u32, chunk, ty)?;
        }
        Ok(())
    }

    /// 刷新
    ///
    /// 先写回缓存中的脏扇区，再调用设备自身的 flush。
    /// 即使写回失败也会刷新设备，返回第一个错误。
    pub fn flush(&mut self) -> Result<()> {
        let cleaned = self.clean_cache();
        let flushed = self.device.flush();
        cleaned.and(flushed)
    }

    /// 卸载
    ///
    /// 写回、失效缓存并刷新设备。失效总会执行，返回第一个错误。
    pub fn unmount(&mut self) -> Result<()> {
        let cleaned = self.clean_cache();
        let invalidated = self.cache_command(Command::Invalidate).map(|_| ());
        let flushed = self.device.flush();
        log::debug!("[CACHE] unmount: clean={:?}", cleaned.is_ok());
        cleaned.and(invalidated).and(flushed)
    }
}
