//! 扇区缓存常量定义
//!
//! 包括缓存区域布局、槽位头部大小以及组相联参数。

//=============================================================================
// 扇区索引
//=============================================================================

/// 空槽位的扇区索引标记
pub const SECTOR_INDEX_INVALID: u32 = 0xFFFF_FFFF;

//=============================================================================
// 缓存区域布局
//=============================================================================

/// 缓存区域起始地址的对齐要求（机器字）
pub const CACHE_REGION_ALIGN: usize = core::mem::align_of::<usize>();

/// 区域头部大小：`sector_size: u32` + `num_slots: u32`
pub const CACHE_HEADER_SIZE: usize = 8;

/// 只读类缓存（All / Man）的槽位头部：`sector_index: u32`
pub const SLOT_HEADER_SIZE_RO: usize = 4;

/// 读写类缓存（Rw / MultiWay）的槽位头部：
/// `sector_index: u32` + `flags: u8` + `sector_type: u8` + 2 字节填充
pub const SLOT_HEADER_SIZE_RW: usize = 8;

//=============================================================================
// 多路组相联
//=============================================================================

/// 默认相联度
pub const DEFAULT_ASSOC_LEVEL: u32 = 2;

/// 最大相联度
pub const MAX_ASSOC_LEVEL: u32 = 32;
