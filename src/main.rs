//! GfxInterface 演示程序
//!
//! 在所选后端上创建设备，用多个线程并发地向三个队列提交命令列表，
//! 最后等待 GPU 空闲并输出各队列分配器池的统计。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 使用 DirectX 12（命令行覆盖）
//! cargo run -- --dx12
//!
//! # 8 个线程，每个线程提交 200 次
//! cargo run -- --threads 8 --submissions 200
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use gfx_interface::core::config::{GraphicsBackend, WorkloadConfig};
use gfx_interface::core::{log, Config};
use gfx_interface::gfx::software::SoftwareCommandList;
use gfx_interface::gfx::{GfxBackend, SoftwareBackend};
use gfx_interface::renderer::{CommandContext, CommandListType, Device, FenceValue};

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载配置文件（config.toml）
/// 2. 应用命令行参数覆盖
/// 3. 验证配置
/// 4. 初始化日志系统
/// 5. 创建后端与设备，运行提交负载
fn main() -> Result<()> {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("invalid configuration")?;

    let log_file = if config.logging.file_output {
        Some(config.logging.log_file.as_str())
    } else {
        None
    };
    log::init_logger(config.logging.level, config.logging.file_output, log_file)
        .context("failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "GfxInterface starting...");
    info!(
        backend = config.gpu.backend.name(),
        threads = config.workload.submit_threads,
        submissions = config.workload.submissions_per_thread,
        "Workload configuration"
    );

    match config.gpu.backend {
        GraphicsBackend::Software => {
            let backend = SoftwareBackend::new().with_execution_delay(config.software.execution_delay());
            let executed = Arc::new(AtomicUsize::new(0));
            let device = Device::new(backend);

            run(&device, &config.workload, |list: &mut SoftwareCommandList| {
                let executed = Arc::clone(&executed);
                list.record(move || {
                    executed.fetch_add(1, Ordering::Relaxed);
                });
            });

            info!(
                executed = executed.load(Ordering::Relaxed),
                allocators_created = device.backend().allocators_created(),
                "Software GPU statistics"
            );
        }
        #[cfg(target_os = "windows")]
        GraphicsBackend::Dx12 => {
            let backend = gfx_interface::gfx::Dx12Backend::new(config.gpu.debug_layer)
                .context("failed to create DirectX 12 device")?;
            let device = Device::new(backend);
            // 空命令列表：只验证提交与回收路径
            run(&device, &config.workload, |_| {});
        }
        #[cfg(not(target_os = "windows"))]
        GraphicsBackend::Dx12 => {
            anyhow::bail!("DirectX 12 backend is only available on Windows");
        }
    }

    info!("GfxInterface finished");
    Ok(())
}

/// 并发提交负载
///
/// 每个线程轮流向 Copy、Compute、Direct 队列提交；Direct 提交前在 GPU 上
/// 等待本线程最近一次 Copy 提交，模拟“上传后绘制”的依赖。
fn run<B, F>(device: &Device<B>, workload: &WorkloadConfig, record: F)
where
    B: GfxBackend,
    F: Fn(&mut B::CommandList) + Sync,
{
    let started = Instant::now();

    thread::scope(|scope| {
        for thread_index in 0..workload.submit_threads {
            let record = &record;
            scope.spawn(move || {
                let mut last_upload: Option<FenceValue> = None;

                for submission in 0..workload.submissions_per_thread {
                    let list_type = match submission % 3 {
                        0 => CommandListType::Copy,
                        1 => CommandListType::Compute,
                        _ => CommandListType::Direct,
                    };

                    if list_type == CommandListType::Direct {
                        if let Some(upload) = last_upload {
                            device.stall_for_fence(CommandListType::Direct, upload);
                        }
                    }

                    let mut context = CommandContext::begin(device.queue(list_type));
                    record(context.list_mut());
                    let fence_value = context.finish(false);

                    if list_type == CommandListType::Copy {
                        last_upload = Some(fence_value);
                    }
                }

                if let Some(upload) = last_upload {
                    device.wait_for_fence(upload);
                }
                debug!(thread_index, "Submit thread finished");
            });
        }
    });

    device.idle_gpu();

    for queue in device.queues() {
        info!(
            queue = queue.list_type().name(),
            last_completed = %queue.last_completed_fence_value(),
            allocators = queue.allocator_pool().size(),
            ready = queue.allocator_pool().ready_count(),
            "Allocator pool statistics"
        );
    }
    info!(
        backend = device.backend().backend_name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Workload complete"
    );
}
