//! 缓存策略接口
//!
//! 所有缓存类型都实现 [`CacheStrategy`]，读写路径的签名形状一致，
//! 命令协议中通用的部分（失效、类型、槽位数）在这里统一处理。

use super::{CacheStats, Command, Reply};
use crate::{
    block::SectorDevice,
    error::{Error, ErrorKind, Result},
    types::{CacheMode, CacheType, Lookup, SectorType, SectorTypeMask, WriteOutcome},
};

/// 缓存策略
///
/// 缓存是被动数据结构，内部不加锁。调用者必须在每次调用期间持有
/// 该设备（或卷）的外部互斥锁；在 Rust 中由 `&mut self` 保证。
pub trait CacheStrategy {
    /// 缓存类型标识
    fn cache_type(&self) -> CacheType;

    /// 可用槽位数（首次访问时按后端扇区大小计算）
    fn num_slots<D: SectorDevice>(&mut self, dev: &D) -> usize;

    /// 尝试从缓存读取扇区
    ///
    /// 命中时数据复制到 `buf`；未命中时调用者从后端读取，
    /// 并以读到的数据调用 [`update`](Self::update)。
    fn read<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        buf: &mut [u8],
        ty: SectorType,
    ) -> Result<Lookup>;

    /// 后端读取之后按策略填充缓存
    fn update<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<()>;

    /// 写入扇区，返回调用者是否仍需写后端
    fn write<D: SectorDevice>(
        &mut self,
        dev: &mut D,
        sector: u32,
        data: &[u8],
        ty: SectorType,
    ) -> Result<WriteOutcome>;

    /// 丢弃全部槽位（不写回）并清零槽位数
    fn invalidate(&mut self);

    /// 统计信息
    fn stats(&self) -> CacheStats;

    /// 处理类型相关的命令
    ///
    /// 默认实现适用于只读类缓存：`FreeSectors` 和 `Clean` 无事可做，
    /// 其他配置命令不支持。
    fn control<D: SectorDevice>(&mut self, _dev: &mut D, cmd: Command) -> Result<Reply> {
        match cmd {
            Command::FreeSectors { .. } | Command::Clean => Ok(Reply::Done),
            _ => Err(unsupported()),
        }
    }

    /// 执行缓存命令
    fn command<D: SectorDevice>(&mut self, dev: &mut D, cmd: Command) -> Result<Reply> {
        match cmd {
            Command::Invalidate => {
                self.invalidate();
                Ok(Reply::Done)
            }
            Command::GetType => Ok(Reply::Type(self.cache_type())),
            Command::GetNumSectors => Ok(Reply::NumSectors(self.num_slots(dev))),
            other => self.control(dev, other),
        }
    }
}

pub(super) fn unsupported() -> Error {
    Error::new(ErrorKind::Unsupported, "command not supported by this cache type")
}

/// 输入/输出缓冲区至少要容纳一个扇区
pub(super) fn check_buf(len: usize, sector_size: usize) -> Result<()> {
    if len < sector_size {
        return Err(Error::new(ErrorKind::InvalidInput, "buffer too small for sector"));
    }
    Ok(())
}

/// 检查 `SetMode` 参数
pub(super) fn check_mode(types: SectorTypeMask, mode: CacheMode) -> Result<()> {
    if types.is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput, "empty sector type mask"));
    }
    if mode.contains(CacheMode::DELAYED) && !mode.contains(CacheMode::WRITE) {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "delayed write requires write caching",
        ));
    }
    Ok(())
}
