//! DirectX 12 原生对象
//!
//! 把 D3D12 的命令队列、Fence、命令分配器、命令列表以及 Win32 事件
//! 包装成 [`GfxBackend`] 要求的句柄类型。

use tracing::{debug, info, warn};
use windows::core::{Interface, HSTRING, IUnknown};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::error::{GfxError, Result};
use crate::gfx::backend::{
    GfxBackend, NativeCommandAllocator, NativeCommandList, NativeEvent, NativeFence, NativeQueue,
};
use crate::renderer::command::CommandListType;

fn native_list_type(list_type: CommandListType) -> D3D12_COMMAND_LIST_TYPE {
    D3D12_COMMAND_LIST_TYPE(list_type.index() as i32)
}

/// DirectX 12 后端
pub struct Dx12Backend {
    device: ID3D12Device,
}

// D3D12 设备是自由线程对象
unsafe impl Send for Dx12Backend {}
unsafe impl Sync for Dx12Backend {}

impl Dx12Backend {
    /// 在默认适配器上创建 D3D12 设备
    ///
    /// `debug_layer` 为 true 时先尝试启用调试层，失败只记录警告。
    pub fn new(debug_layer: bool) -> Result<Self> {
        unsafe {
            if debug_layer {
                let mut debug: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug) {
                    Ok(()) => {
                        if let Some(debug) = debug {
                            debug.EnableDebugLayer();
                            debug!("DX12 Debug Layer enabled");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to enable DX12 Debug Layer"),
                }
            }

            let mut device: Option<ID3D12Device> = None;
            D3D12CreateDevice(None::<&IUnknown>, D3D_FEATURE_LEVEL_11_0, &mut device)
                .map_err(|e| GfxError::DeviceCreation(format!("D3D12CreateDevice failed: {e}")))?;
            let device = device
                .ok_or_else(|| GfxError::DeviceCreation("D3D12CreateDevice returned no device".to_string()))?;

            info!("D3D12 Device created successfully");
            Ok(Self { device })
        }
    }

    /// 原生设备
    pub fn device(&self) -> &ID3D12Device {
        &self.device
    }
}

impl GfxBackend for Dx12Backend {
    type Queue = Dx12Queue;
    type Fence = Dx12Fence;
    type Event = Dx12Event;
    type CommandAllocator = Dx12CommandAllocator;
    type CommandList = Dx12CommandList;

    fn backend_name(&self) -> &str {
        "DirectX 12"
    }

    fn create_command_queue(&self, list_type: CommandListType) -> Result<Dx12Queue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: native_list_type(list_type),
            Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
            ..Default::default()
        };
        let queue: ID3D12CommandQueue = unsafe { self.device.CreateCommandQueue(&desc) }
            .map_err(|e| GfxError::ResourceCreation(format!("CreateCommandQueue: {e}")))?;
        Ok(Dx12Queue { queue })
    }

    fn create_fence(&self, initial_value: u64) -> Result<Dx12Fence> {
        let fence: ID3D12Fence = unsafe { self.device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .map_err(|e| GfxError::ResourceCreation(format!("CreateFence: {e}")))?;
        Ok(Dx12Fence { fence })
    }

    fn create_event(&self) -> Result<Dx12Event> {
        let handle = unsafe { CreateEventA(None, false, false, None) }
            .map_err(|e| GfxError::ResourceCreation(format!("CreateEvent: {e}")))?;
        Ok(Dx12Event { handle })
    }

    fn create_command_allocator(&self, list_type: CommandListType) -> Result<Dx12CommandAllocator> {
        let allocator: ID3D12CommandAllocator =
            unsafe { self.device.CreateCommandAllocator(native_list_type(list_type)) }
                .map_err(|e| GfxError::ResourceCreation(format!("CreateCommandAllocator: {e}")))?;
        Ok(Dx12CommandAllocator { allocator })
    }

    fn create_command_list(
        &self,
        list_type: CommandListType,
        allocator: &Dx12CommandAllocator,
    ) -> Result<Dx12CommandList> {
        let list: ID3D12GraphicsCommandList = unsafe {
            self.device
                .CreateCommandList(0, native_list_type(list_type), &allocator.allocator, None::<&ID3D12PipelineState>)
        }
        .map_err(|e| GfxError::ResourceCreation(format!("CreateCommandList: {e}")))?;
        Ok(Dx12CommandList { list })
    }
}

/// DirectX 12 命令队列
pub struct Dx12Queue {
    queue: ID3D12CommandQueue,
}

unsafe impl Send for Dx12Queue {}
unsafe impl Sync for Dx12Queue {}

impl Dx12Queue {
    pub fn native(&self) -> &ID3D12CommandQueue {
        &self.queue
    }
}

impl NativeQueue for Dx12Queue {
    type Fence = Dx12Fence;
    type CommandList = Dx12CommandList;

    fn execute_command_list(&self, list: &Dx12CommandList) -> Result<()> {
        let list: ID3D12CommandList = list
            .list
            .cast()
            .map_err(|e| GfxError::CommandExecution(format!("ExecuteCommandLists: {e}")))?;
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };
        Ok(())
    }

    fn signal(&self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Signal(&fence.fence, value) }
            .map_err(|e| GfxError::Fence(format!("Signal({value}): {e}")))
    }

    fn wait(&self, fence: &Dx12Fence, value: u64) -> Result<()> {
        unsafe { self.queue.Wait(&fence.fence, value) }
            .map_err(|e| GfxError::Fence(format!("Wait({value}): {e}")))
    }
}

/// DirectX 12 Fence
pub struct Dx12Fence {
    fence: ID3D12Fence,
}

unsafe impl Send for Dx12Fence {}
unsafe impl Sync for Dx12Fence {}

impl NativeFence for Dx12Fence {
    type Event = Dx12Event;

    fn completed_value(&self) -> u64 {
        unsafe { self.fence.GetCompletedValue() }
    }

    fn set_event_on_completion(&self, value: u64, event: &Dx12Event) -> Result<()> {
        unsafe { self.fence.SetEventOnCompletion(value, event.handle) }
            .map_err(|e| GfxError::Fence(format!("SetEventOnCompletion({value}): {e}")))
    }
}

/// 自动复位的 Win32 事件
pub struct Dx12Event {
    handle: HANDLE,
}

unsafe impl Send for Dx12Event {}

impl NativeEvent for Dx12Event {
    fn wait(&self) -> Result<()> {
        let result = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if result != WAIT_OBJECT_0 {
            return Err(GfxError::Fence(format!(
                "WaitForSingleObject returned {:#x}",
                result.0
            )));
        }
        Ok(())
    }
}

impl Drop for Dx12Event {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            warn!(error = %e, "Failed to close fence event handle");
        }
    }
}

/// DirectX 12 命令分配器
pub struct Dx12CommandAllocator {
    allocator: ID3D12CommandAllocator,
}

unsafe impl Send for Dx12CommandAllocator {}
unsafe impl Sync for Dx12CommandAllocator {}

impl Dx12CommandAllocator {
    pub fn native(&self) -> &ID3D12CommandAllocator {
        &self.allocator
    }
}

impl NativeCommandAllocator for Dx12CommandAllocator {
    fn reset(&self) -> Result<()> {
        unsafe { self.allocator.Reset() }.map_err(|e| GfxError::backend("ID3D12CommandAllocator::Reset", e))
    }

    fn set_name(&self, name: &str) {
        if let Err(e) = unsafe { self.allocator.SetName(&HSTRING::from(name)) } {
            debug!(error = %e, name, "Failed to set command allocator name");
        }
    }
}

/// DirectX 12 图形命令列表
pub struct Dx12CommandList {
    list: ID3D12GraphicsCommandList,
}

unsafe impl Send for Dx12CommandList {}

impl Dx12CommandList {
    /// 用于记录命令的原生命令列表
    pub fn native(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}

impl NativeCommandList for Dx12CommandList {
    type CommandAllocator = Dx12CommandAllocator;

    fn close(&mut self) -> Result<()> {
        unsafe { self.list.Close() }.map_err(|e| GfxError::backend("ID3D12GraphicsCommandList::Close", e))
    }

    fn reset(&mut self, allocator: &Dx12CommandAllocator) -> Result<()> {
        unsafe { self.list.Reset(&allocator.allocator, None::<&ID3D12PipelineState>) }
            .map_err(|e| GfxError::backend("ID3D12GraphicsCommandList::Reset", e))
    }
}
