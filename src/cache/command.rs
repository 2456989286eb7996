//! 缓存命令协议
//!
//! 上层通过这组封闭的命令操作任意已挂载的缓存，无需知道具体类型。

use crate::types::{CacheMode, CacheType, SectorTypeMask};

/// 缓存命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 丢弃全部槽位（不写回）
    Invalidate,
    /// 查询缓存类型
    GetType,
    /// 查询可用槽位数
    GetNumSectors,
    /// 丢弃一段扇区（不写回），用于释放簇/扇区
    FreeSectors {
        /// 起始扇区
        first: u32,
        /// 扇区数
        count: u32,
    },
    /// 写回全部脏槽位
    Clean,
    /// 设置扇区类型的缓存模式
    SetMode {
        /// 要修改的扇区类型
        types: SectorTypeMask,
        /// 新模式
        mode: CacheMode,
    },
    /// 设置扇区类型可占用的最大槽位数
    SetQuota {
        /// 要修改的扇区类型
        types: SectorTypeMask,
        /// 槽位配额
        quota: u32,
    },
    /// 设置相联度（必须是 2 的幂）
    SetAssocLevel(u32),
}

/// 命令执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// 命令已执行
    Done,
    /// `GetType` 的结果
    Type(CacheType),
    /// `GetNumSectors` 的结果
    NumSectors(usize),
}
