//! sector_cache: 块存储前端的可插拔扇区缓存
//!
//! 这是一个 `no_std` 的扇区缓存库，旨在提供：
//! - **零 unsafe 代码**
//! - **调用者借出的缓存内存**，挂载后不再为扇区数据分配内存
//! - **可替换的缓存策略**：全扇区、管理扇区、按类型读写、组相联
//! - **统一的命令协议**，用于失效、写回和配置
//!
//! # 示例
//!
//! ```rust,ignore
//! use sector_cache::{CacheMode, CacheType, SectorDev, SectorDevice, SectorType, SectorTypeMask, Result};
//!
//! // 实现 SectorDevice trait
//! struct MyCard {
//!     // ...
//! }
//!
//! impl SectorDevice for MyCard {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let mut region = [0u8; 4160];
//!     let mut dev = SectorDev::new(MyCard::new());
//!
//!     // 挂载读写缓存，目录和管理扇区延迟写
//!     dev.assign_cache(&mut region, CacheType::Rw)?;
//!     dev.set_cache_mode(
//!         SectorTypeMask::DIRECTORY | SectorTypeMask::MANAGEMENT,
//!         CacheMode::WRITE_BACK,
//!     )?;
//!
//!     let mut buf = [0u8; 512];
//!     dev.read_sector(0, &mut buf, SectorType::Management)?;
//!
//!     dev.unmount()
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 扇区设备抽象和经过缓存的 I/O 操作
//! - [`consts`] - 常量定义
//! - [`types`] - 扇区类型、缓存模式等数据结构
//! - [`cache`] - 缓存策略与命令协议

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 扇区设备抽象
pub mod block;

/// 常量定义
pub mod consts;

/// 数据结构定义
pub mod types;

/// 扇区缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 扇区设备
pub use block::{SectorDev, SectorDevice};

// 类型
pub use types::{CacheMode, CacheType, Lookup, ModeTable, SectorType, SectorTypeMask, WriteOutcome};

// 缓存
pub use cache::{
    CacheAll, CacheMan, CacheMultiWay, CacheRw, CacheStats, CacheStrategy, Command, Reply, SectorCache,
};
