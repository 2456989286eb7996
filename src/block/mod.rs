//! 扇区设备抽象
//!
//! 提供扇区设备接口和经过缓存的扇区级 I/O 操作。
//! block/device.rs 定义设备接口，并提供缓存挂载、命令等管理接口

//! block/io.rs 提供经过缓存的读写：读先查缓存，未命中再读设备并填充缓存；
//! 写先交给缓存，缓存不吸收时直接写设备。没有挂载缓存时直接读写设备

mod device;
mod io;

pub use device::{SectorDev, SectorDevice};
