//! 图形后端模块
//!
//! 本模块封装了不同图形 API 的底层对象，包括：
//! - Software：用 CPU 线程模拟 GPU 队列，所有平台可用
//! - DirectX 12：Windows 平台的原生实现
//!
//! 所有后端都实现了统一的 [`GfxBackend`] trait，
//! 同步核心（[`crate::renderer`]）对后端是泛型的。

pub mod backend;
pub mod software;
#[cfg(target_os = "windows")]
pub mod dx12;

pub use backend::GfxBackend;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Backend;
pub use software::SoftwareBackend;
