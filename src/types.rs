//! 缓存公共类型定义
//!
//! 扇区类型、缓存模式位掩码以及缓存类型标识。

use bitflags::bitflags;

/// 扇区类型
///
/// 上层文件系统在每次访问时都会给出被访问扇区的类型，
/// 缓存根据类型决定准入与写策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SectorType {
    /// 用户数据
    Data = 0,
    /// 目录项
    Directory = 1,
    /// 管理扇区（分配表等文件系统元数据）
    Management = 2,
}

impl SectorType {
    /// 扇区类型数量
    pub const COUNT: usize = 3;

    /// 全部扇区类型
    pub const ALL: [SectorType; Self::COUNT] =
        [SectorType::Data, SectorType::Directory, SectorType::Management];

    /// 模式表中的下标
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 从槽位头部中存储的字节恢复类型
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SectorType::Data),
            1 => Some(SectorType::Directory),
            2 => Some(SectorType::Management),
            _ => None,
        }
    }

    /// 对应的掩码位
    pub const fn mask(self) -> SectorTypeMask {
        SectorTypeMask::from_bits_truncate(1 << self as u8)
    }
}

bitflags! {
    /// 扇区类型掩码，用于一次配置多个类型
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectorTypeMask: u8 {
        /// 数据扇区
        const DATA       = 1 << 0;
        /// 目录扇区
        const DIRECTORY  = 1 << 1;
        /// 管理扇区
        const MANAGEMENT = 1 << 2;
        /// 全部类型
        const ALL = Self::DATA.bits() | Self::DIRECTORY.bits() | Self::MANAGEMENT.bits();
    }
}

impl SectorTypeMask {
    /// 遍历掩码中包含的扇区类型
    pub fn types(self) -> impl Iterator<Item = SectorType> {
        SectorType::ALL
            .into_iter()
            .filter(move |ty| self.contains(ty.mask()))
    }
}

bitflags! {
    /// 读写缓存的按类型缓存模式
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheMode: u8 {
        /// 读缓存：后端读取的数据进入缓存
        const READ    = 0x01;
        /// 写缓存：写入的数据同步进入缓存
        const WRITE   = 0x02;
        /// 延迟写：写入只进入缓存，由 clean 或驱逐写回
        const DELAYED = 0x04;

        /// 写穿（读 + 写）
        const WRITE_THROUGH = Self::READ.bits() | Self::WRITE.bits();
        /// 写回（读 + 写 + 延迟写）
        const WRITE_BACK = Self::READ.bits() | Self::WRITE.bits() | Self::DELAYED.bits();
    }
}

/// 已挂载的缓存类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// 未挂载缓存
    None,
    /// 缓存所有读取的扇区
    All,
    /// 只缓存管理扇区
    Man,
    /// 直接映射读写缓存
    Rw,
    /// 多路组相联读写缓存
    MultiWay,
}

/// 按扇区类型记录的缓存模式表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTable {
    modes: [CacheMode; SectorType::COUNT],
}

impl ModeTable {
    /// 创建全部为空模式（不缓存）的模式表
    pub const fn new() -> Self {
        Self {
            modes: [CacheMode::empty(); SectorType::COUNT],
        }
    }

    /// 覆盖 `types` 中每个类型的模式
    pub fn set(&mut self, types: SectorTypeMask, mode: CacheMode) {
        for ty in types.types() {
            self.modes[ty.index()] = mode;
        }
    }

    /// 查询某类型的模式
    #[inline]
    pub fn get(&self, ty: SectorType) -> CacheMode {
        self.modes[ty.index()]
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 读缓存查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// 命中，数据已复制到输出缓冲区
    Hit,
    /// 未命中，调用者需要从后端读取
    Miss,
}

/// 写缓存结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// 调用者仍需写入后端
    PassThrough,
    /// 缓存已吸收写入（脏），调用者不得写入后端
    Absorbed,
}
