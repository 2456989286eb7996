//! 扇区设备核心类型

use crate::{
    cache::{CacheStats, CacheStrategy, Command, Reply, SectorCache},
    error::{Error, ErrorKind, Result},
    types::{CacheMode, CacheType, SectorTypeMask},
};

/// 扇区设备接口（缓存的存储后端）
///
/// 实现此 trait 以提供底层扇区访问。
///
/// # 示例
///
/// ```rust,ignore
/// use sector_cache::{SectorDevice, Result};
///
/// struct MyCard {
///     // ...
/// }
///
/// impl SectorDevice for MyCard {
///     fn sector_size(&self) -> u32 {
///         512
///     }
///
///     fn num_sectors(&self) -> u32 {
///         1 << 21
///     }
///
///     fn read_sector(&mut self, index: u32, buf: &mut [u8]) -> Result<()> {
///         // 实现扇区读取
///         Ok(())
///     }
///
///     fn write_sector(&mut self, index: u32, buf: &[u8]) -> Result<()> {
///         // 实现扇区写入
///         Ok(())
///     }
/// }
/// ```
pub trait SectorDevice {
    /// 扇区大小（字节）
    ///
    /// 介质尚未就绪、大小不可知时返回 0，缓存会在之后的访问中重新查询。
    fn sector_size(&self) -> u32;

    /// 扇区总数
    fn num_sectors(&self) -> u32;

    /// 读取一个扇区
    ///
    /// `buf` 至少为 `sector_size` 字节。
    fn read_sector(&mut self, index: u32, buf: &mut [u8]) -> Result<()>;

    /// 写入一个扇区
    ///
    /// `buf` 至少为 `sector_size` 字节。
    fn write_sector(&mut self, index: u32, buf: &[u8]) -> Result<()>;

    /// 刷新设备自身的缓冲
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 扇区设备包装器
///
/// 持有一个设备以及可选的已挂载缓存，并统计逻辑/物理访问次数。
/// 缓存区域由调用者借出，生命周期为 `'a`。
///
/// # 并发使用
///
/// `SectorDev` 不包含内部锁。缓存的每次操作都要求调用者对整个设备
/// 独占访问，`&mut self` 在编译期保证了这一点；多线程环境下应整体
/// 放进一把互斥锁：
///
/// ```rust,ignore
/// let dev = Mutex::new(SectorDev::new(card));
/// dev.lock().unwrap().read_sector(0, &mut buf, SectorType::Management)?;
/// ```
pub struct SectorDev<'a, D> {
    /// 底层设备
    pub(super) device: D,
    /// 已挂载的缓存
    pub(super) cache: Option<SectorCache<'a>>,
    /// 逻辑读取次数（包括缓存命中）
    read_count: u64,
    /// 逻辑写入次数（包括被缓存吸收的写入）
    write_count: u64,
    /// 物理读取次数
    physical_read_count: u64,
    /// 物理写入次数（不含缓存写回）
    physical_write_count: u64,
}

impl<'a, D: SectorDevice> SectorDev<'a, D> {
    /// 创建新的设备包装器（无缓存）
    pub fn new(device: D) -> Self {
        Self {
            device,
            cache: None,
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
        }
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    ///
    /// 绕过缓存直接访问设备会破坏缓存一致性，调用者需要自行失效缓存。
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 扇区大小
    pub fn sector_size(&self) -> u32 {
        self.device.sector_size()
    }

    /// 扇区总数
    pub fn num_sectors(&self) -> u32 {
        self.device.num_sectors()
    }

    /// 逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 逻辑写入次数
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 物理读取次数
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 物理写入次数
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count
    }

    /// 缓存命中率
    ///
    /// 返回 0.0 到 1.0 之间的值
    pub fn cache_hit_rate(&self) -> f64 {
        if self.read_count == 0 {
            return 0.0;
        }
        let hits = self.read_count.saturating_sub(self.physical_read_count);
        hits as f64 / self.read_count as f64
    }

    pub(super) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    pub(super) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }

    pub(super) fn inc_physical_read_count(&mut self) {
        self.physical_read_count += 1;
    }

    pub(super) fn inc_physical_write_count(&mut self) {
        self.physical_write_count += 1;
    }

    // ===== 缓存管理接口 =====

    /// 挂载缓存
    ///
    /// 已有缓存时先把它写回再替换；写回失败则保留旧缓存并返回错误。
    /// `CacheType::None` 卸下缓存。
    ///
    /// # 返回
    ///
    /// 当前可用槽位数。区域连头部都放不下时返回 0，设备不挂载缓存；
    /// 设备暂时无法报告扇区大小时缓存已挂载但返回 0，槽位数在首次访问时计算。
    pub fn assign_cache(&mut self, mem: &'a mut [u8], kind: CacheType) -> Result<usize> {
        if let Some(mut old) = self.cache.take() {
            if let Err(err) = old.command(&mut self.device, Command::Clean) {
                log::warn!("[CACHE] cannot replace {:?} cache: clean failed: {}", old.cache_type(), err);
                self.cache = Some(old);
                return Err(err);
            }
            log::info!("[CACHE] detached {:?} cache", old.cache_type());
        }

        let Some(mut cache) = SectorCache::new(kind, mem) else {
            if kind != CacheType::None {
                log::warn!("[CACHE] region too small for {:?} cache, running uncached", kind);
            }
            return Ok(0);
        };
        let num_slots = cache.num_slots(&self.device);
        log::info!("[CACHE] attached {:?} cache with {} slots", kind, num_slots);
        self.cache = Some(cache);
        Ok(num_slots)
    }

    /// 写回并卸下缓存
    pub fn remove_cache(&mut self) -> Result<()> {
        if let Some(mut cache) = self.cache.take() {
            let cleaned = cache.command(&mut self.device, Command::Clean);
            if cleaned.is_err() {
                self.cache = Some(cache);
            }
            cleaned?;
        }
        Ok(())
    }

    /// 向缓存发送命令
    ///
    /// 未挂载缓存时：失效、写回、释放扇区为空操作，类型为
    /// `CacheType::None`，槽位数为 0，配置命令不支持。
    pub fn cache_command(&mut self, cmd: Command) -> Result<Reply> {
        match &mut self.cache {
            Some(cache) => cache.command(&mut self.device, cmd),
            None => match cmd {
                Command::Invalidate | Command::Clean | Command::FreeSectors { .. } => Ok(Reply::Done),
                Command::GetType => Ok(Reply::Type(CacheType::None)),
                Command::GetNumSectors => Ok(Reply::NumSectors(0)),
                _ => Err(Error::new(ErrorKind::Unsupported, "no cache attached")),
            },
        }
    }

    /// 当前缓存类型
    pub fn cache_type(&self) -> CacheType {
        self.cache
            .as_ref()
            .map(|cache| cache.cache_type())
            .unwrap_or(CacheType::None)
    }

    /// 设置扇区类型的缓存模式（仅读写类缓存）
    pub fn set_cache_mode(&mut self, types: SectorTypeMask, mode: CacheMode) -> Result<()> {
        self.cache_command(Command::SetMode { types, mode }).map(|_| ())
    }

    /// 设置扇区类型的槽位配额（仅组相联缓存）
    pub fn set_cache_quota(&mut self, types: SectorTypeMask, quota: u32) -> Result<()> {
        self.cache_command(Command::SetQuota { types, quota }).map(|_| ())
    }

    /// 设置相联度（仅组相联缓存）
    pub fn set_cache_assoc_level(&mut self, level: u32) -> Result<()> {
        self.cache_command(Command::SetAssocLevel(level)).map(|_| ())
    }

    /// 缓存可容纳的扇区数
    pub fn num_cached_sectors(&mut self) -> Result<usize> {
        match self.cache_command(Command::GetNumSectors)? {
            Reply::NumSectors(n) => Ok(n),
            _ => Err(Error::new(ErrorKind::InvalidState, "unexpected cache reply")),
        }
    }

    /// 写回全部脏扇区
    pub fn clean_cache(&mut self) -> Result<()> {
        self.cache_command(Command::Clean).map(|_| ())
    }

    /// 丢弃全部缓存内容（不写回）
    pub fn invalidate_cache(&mut self) -> Result<()> {
        self.cache_command(Command::Invalidate).map(|_| ())
    }

    /// 通知缓存一段扇区已被释放，驻留的副本直接丢弃
    ///
    /// 范围必须位于设备之内。
    pub fn free_sectors(&mut self, first: u32, count: u32) -> Result<()> {
        self.check_sector(first, count)?;
        self.cache_command(Command::FreeSectors { first, count }).map(|_| ())
    }

    /// 缓存统计信息
    ///
    /// 如果挂载了缓存，返回 Some(CacheStats)，否则返回 None
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// 检查是否挂载了缓存
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub(super) fn check_sector(&self, sector: u32, count: u32) -> Result<()> {
        let end = sector as u64 + count as u64;
        if end > self.device.num_sectors() as u64 {
            return Err(Error::new(ErrorKind::InvalidInput, "sector index out of range"));
        }
        Ok(())
    }

    pub(super) fn check_buf(&self, len: usize, count: u32) -> Result<usize> {
        let sector_size = self.device.sector_size() as usize;
        if sector_size == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "sector size not available"));
        }
        if len < sector_size * count as usize {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer too small for sectors"));
        }
        Ok(sector_size)
    }
}

impl<D> core::fmt::Debug for SectorDev<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SectorDev")
            .field("cache", &self.cache)
            .field("read_count", &self.read_count)
            .field("write_count", &self.write_count)
            .field("physical_read_count", &self.physical_read_count)
            .field("physical_write_count", &self.physical_write_count)
            .finish()
    }
}
