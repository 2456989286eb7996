//! 扇区缓存模块
//!
//! 块设备前面的可插拔扇区缓存。缓存使用调用者借出的一块内存，
//! 挂载后不再做额外的数据分配。
//!
//! # 主要组件
//!
//! - [`CacheAll`] - 缓存所有读取的扇区（直接映射，写穿）
//! - [`CacheMan`] - 只缓存管理扇区
//! - [`CacheRw`] - 按扇区类型配置读/写/延迟写的直接映射缓存
//! - [`CacheMultiWay`] - 组相联读写缓存，支持按类型配额
//! - [`SectorCache`] - 上述类型的封闭枚举，统一分发
//! - [`Command`] / [`Reply`] - 通用命令协议
//!
//! # 读写约定
//!
//! ```rust,ignore
//! use sector_cache::cache::{CacheStrategy, SectorCache};
//! use sector_cache::{CacheType, Lookup, SectorType, WriteOutcome};
//!
//! let mut cache = SectorCache::new(CacheType::All, &mut region).unwrap();
//!
//! // 读：未命中时由调用者读后端，再把数据交给缓存
//! if cache.read(&mut dev, 10, &mut buf, SectorType::Data)? == Lookup::Miss {
//!     dev.read_sector(10, &mut buf)?;
//!     cache.update(&mut dev, 10, &buf, SectorType::Data)?;
//! }
//!
//! // 写：只有 PassThrough 时调用者才写后端
//! if cache.write(&mut dev, 10, &buf, SectorType::Data)? == WriteOutcome::PassThrough {
//!     dev.write_sector(10, &buf)?;
//! }
//! ```
//!
//! # 并发
//!
//! 缓存不做内部加锁，任何操作都不会阻塞或让出。调用者必须在整个
//! 操作期间持有该设备的外部锁；同一个缓存实例从不在设备之间共享。

mod all;
mod command;
mod man;
mod multi_way;
mod rw;
mod slot;
mod stats;
mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use all::CacheAll;
pub use command::{Command, Reply};
pub use man::CacheMan;
pub use multi_way::CacheMultiWay;
pub use rw::CacheRw;
pub use slot::SlotFlags;
pub use stats::CacheStats;
pub use strategy::CacheStrategy;

use crate::{
    block::SectorDevice,
    error::Result,
    types::{CacheType, Lookup, SectorType, WriteOutcome},
};

/// 已挂载的缓存
pub enum SectorCache<'a> {
    /// 全扇区读缓存
    All(CacheAll<'a>),
    /// 管理扇区读缓存
    Man(CacheMan<'a>),
    /// 直接映射读写缓存
    Rw(CacheRw<'a>),
    /// 组相联读写缓存
    MultiWay(CacheMultiWay<'a>),
}

macro_rules! dispatch {
    ($self:ident, $cache:ident => $body:expr) => {
        match $self {
            SectorCache::All($cache) => $body,
            SectorCache::Man($cache) => $body,
            SectorCache::Rw($cache) => $body,
            SectorCache::MultiWay($cache) => $body,
        }
    };
}

impl<'a> SectorCache<'a> {
    /// 按类型在借出的内存上创建缓存
    ///
    /// `CacheType::None` 或区域不足以容纳头部时返回 `None`。
    pub fn new(kind: CacheType, mem: &'a mut [u8]) -> Option<Self> {
        match kind {
            CacheType::None => None,
            CacheType::All => CacheAll::new(mem).map(SectorCache::All),
            CacheType::Man => CacheMan::new(mem).map(SectorCache::Man),
            CacheType::Rw => CacheRw::new(mem).map(SectorCache::Rw),
            CacheType::MultiWay => CacheMultiWay::new(mem).map(SectorCache::MultiWay),
        }
    }
}

impl CacheStrategy for SectorCache<'_> {
    fn cache_type(&self) -> CacheType {
        dispatch!(self, c => c.cache_type())
    }

    fn num_slots<D: SectorDevice>(&mut self, dev: &D) -> usize {
        dispatch!(self, c => c.num_slots(dev))
    }

    fn read<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        buf: &mut [u8],
        ty: SectorType,
    ) -> Result<Lookup> {
        dispatch!(self, c => c.read(dev, sector, buf, ty))
    }

    fn update<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<()> {
        dispatch!(self, c => c.update(dev, sector, data, ty))
    }

    fn write<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<WriteOutcome> {
        dispatch!(self, c => c.write(dev, sector, data, ty))
    }

    fn invalidate(&mut self) {
        dispatch!(self, c => c.invalidate())
    }

    fn stats(&self) -> CacheStats {
        dispatch!(self, c => c.stats())
    }

    fn command<D: SectorDevice>(&mut self, dev: &mut D, cmd: Command) -> Result<Reply> {
        dispatch!(self, c => c.command(dev, cmd))
    }
}

impl core::fmt::Debug for SectorCache<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SectorCache")
            .field("type", &self.cache_type())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{CacheMode, SectorTypeMask};
    use crate::cache::testing::{AlignedRegion, MockDevice};

    #[test]
    fn test_new_by_type() {
        for kind in [CacheType::All, CacheType::Man, CacheType::Rw, CacheType::MultiWay] {
            let mut region = AlignedRegion::<256>::new();
            let cache = SectorCache::new(kind, region.as_mut()).unwrap();
            assert_eq!(cache.cache_type(), kind);
        }
        let mut region = AlignedRegion::<256>::new();
        assert!(SectorCache::new(CacheType::None, region.as_mut()).is_none());
        let mut tiny = AlignedRegion::<4>::new();
        assert!(SectorCache::new(CacheType::Rw, tiny.as_mut()).is_none());
    }

    #[test]
    fn test_get_type_through_dispatch() {
        let mut dev = MockDevice::new(128, 16);
        for kind in [CacheType::All, CacheType::Man, CacheType::Rw, CacheType::MultiWay] {
            let mut region = AlignedRegion::<1024>::new();
            let mut cache = SectorCache::new(kind, region.as_mut()).unwrap();
            assert_eq!(cache.command(&mut dev, Command::GetType).unwrap(), Reply::Type(kind));
        }
    }

    #[test]
    fn test_set_mode_support_by_type() {
        let mut dev = MockDevice::new(128, 16);
        let cmd = Command::SetMode {
            types: SectorTypeMask::ALL,
            mode: CacheMode::WRITE_THROUGH,
        };
        for (kind, supported) in [
            (CacheType::All, false),
            (CacheType::Man, false),
            (CacheType::Rw, true),
            (CacheType::MultiWay, true),
        ] {
            let mut region = AlignedRegion::<1024>::new();
            let mut cache = SectorCache::new(kind, region.as_mut()).unwrap();
            match cache.command(&mut dev, cmd) {
                Ok(reply) => {
                    assert!(supported);
                    assert_eq!(reply, Reply::Done);
                }
                Err(err) => {
                    assert!(!supported);
                    assert_eq!(err.kind(), ErrorKind::Unsupported);
                }
            }
        }
    }

    #[test]
    fn test_hit_after_write_all_variants() {
        let mut dev = MockDevice::new(128, 16);
        for kind in [CacheType::All, CacheType::Man, CacheType::Rw, CacheType::MultiWay] {
            let mut region = AlignedRegion::<1024>::new();
            let mut cache = SectorCache::new(kind, region.as_mut()).unwrap();
            let _ = cache.command(
                &mut dev,
                Command::SetMode {
                    types: SectorTypeMask::ALL,
                    mode: CacheMode::WRITE_THROUGH,
                },
            );
            let mut buf = [0u8; 128];
            let outcome = cache.write(&mut dev, 9, &[0x77; 128], SectorType::Management).unwrap();
            assert_eq!(outcome, WriteOutcome::PassThrough);
            assert_eq!(
                cache.read(&mut dev, 9, &mut buf, SectorType::Management).unwrap(),
                Lookup::Hit
            );
            assert_eq!(buf, [0x77; 128]);
        }
    }
}
