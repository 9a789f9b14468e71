//! DirectX 12 后端
//!
//! 同步核心在 Windows 上的原生实现，仅在 Windows 平台编译。

mod device;

pub use device::{
    Dx12Backend, Dx12CommandAllocator, Dx12CommandList, Dx12Event, Dx12Fence, Dx12Queue,
};
