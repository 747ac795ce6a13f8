//! Compute backend running the layout kernels as wgpu compute shaders
//!
//! Each kernel call uploads its inputs, dispatches one pass and reads the
//! output back through a staging buffer. Reductions are summed per
//! workgroup in f32 on the device and across workgroups in f64 on the host.

use std::sync::mpsc;

use thiserror::Error;
use tracing::info;
use wgpu::util::DeviceExt;

use super::shaders::LayoutShaders;
use super::types::{GpuLink, GpuParams, GpuParticle, GpuPartial, WORKGROUP_SIZE};
use crate::layout::{
    BackendError, BackendResult, ComputeBackend, ComputeParams, LinkTable, Particle, Reduction,
};

/// Smallest buffer created; wgpu rejects zero-sized bindings
const MIN_BUFFER_SIZE: u64 = 16;

/// Errors raised by the GPU backend
#[derive(Error, Debug)]
pub enum GpuError {
    /// No adapter is available on this machine
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Reading a buffer back failed
    #[error("failed to map buffer: {0}")]
    BufferMap(String),
}

/// GPU compute backend
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    evaluate_pipeline: wgpu::ComputePipeline,
    integrate_pipeline: wgpu::ComputePipeline,
    reduce_pipeline: wgpu::ComputePipeline,
    adapter_name: String,
}

/// Buffers bound for one dispatch
struct Bindings {
    state_b: wgpu::Buffer,
    partials: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuBackend {
    /// Acquire a device and build the three pipelines
    pub fn new() -> Result<Self, GpuError> {
        let (device, queue, adapter_name) = pollster::block_on(Self::create_device())?;
        let shaders = LayoutShaders::new();

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Layout Bind Group Layout"),
            entries: &[
                storage(0, false),
                storage(1, false),
                storage(2, true),
                storage(3, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Layout Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, source: &str, entry_point: &str| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let evaluate_pipeline = pipeline("Evaluate Pipeline", &shaders.evaluate, "evaluate");
        let integrate_pipeline = pipeline("Integrate Pipeline", &shaders.integrate, "integrate");
        let reduce_pipeline = pipeline("Reduce Pipeline", &shaders.reduce, "reduce");

        info!(adapter = %adapter_name, "GPU backend ready");
        Ok(Self {
            device,
            queue,
            bind_group_layout,
            evaluate_pipeline,
            integrate_pipeline,
            reduce_pipeline,
            adapter_name,
        })
    }

    async fn create_device() -> Result<(wgpu::Device, wgpu::Queue, String), GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Layout Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None, // trace path
            )
            .await?;
        Ok((device, queue, adapter_name))
    }

    /// Name of the adapter in use
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn storage_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        if contents.is_empty() {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: MIN_BUFFER_SIZE,
                usage,
                mapped_at_creation: false,
            })
        } else {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
        }
    }

    fn empty_storage_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(MIN_BUFFER_SIZE),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Upload inputs and bind them. When `b` is `None` the second particle
    /// buffer is left uninitialized for the kernel to fill.
    fn bind(
        &self,
        a: &[Particle],
        b: Option<&[Particle]>,
        links: Option<&LinkTable>,
        params: &ComputeParams,
    ) -> Bindings {
        let to_gpu = |state: &[Particle]| state.iter().map(GpuParticle::from).collect::<Vec<_>>();

        let gpu_a = to_gpu(a);
        let state_a = self.storage_buffer("State A", bytemuck::cast_slice(&gpu_a));
        let state_b = match b {
            Some(b) => self.storage_buffer("State B", bytemuck::cast_slice(&to_gpu(b))),
            None => self.empty_storage_buffer("State B", std::mem::size_of_val(gpu_a.as_slice()) as u64),
        };

        let gpu_links: Vec<GpuLink> = links
            .map(|table| table.links.iter().map(GpuLink::from).collect())
            .unwrap_or_default();
        let index: &[u32] = links.map(|table| table.index.as_slice()).unwrap_or_default();
        let link_buffer = self.storage_buffer("Links", bytemuck::cast_slice(&gpu_links));
        let index_buffer = self.storage_buffer("Link Index", bytemuck::cast_slice(index));

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Params"),
                contents: bytemuck::bytes_of(&GpuParams::from(params)),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let partial_size =
            (workgroups(a.len()) as usize * std::mem::size_of::<GpuPartial>()) as u64;
        let partials = self.empty_storage_buffer("Partials", partial_size);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Layout Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: state_a.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: state_b.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: link_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: index_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: partials.as_entire_binding(),
                },
            ],
        });

        Bindings {
            state_b,
            partials,
            bind_group,
        }
    }

    /// Dispatch `pipeline` over `count` particles and read `len` elements of
    /// `output` back.
    fn execute<T: bytemuck::Pod>(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bindings: &Bindings,
        count: usize,
        output: &wgpu::Buffer,
        len: usize,
    ) -> Result<Vec<T>, GpuError> {
        let size = (len * std::mem::size_of::<T>()) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bindings.bind_group, &[]);
            pass.dispatch_workgroups(workgroups(count), 1, 1);
        }
        encoder.copy_buffer_to_buffer(output, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| GpuError::BufferMap(e.to_string()))?
            .map_err(|e| GpuError::BufferMap(e.to_string()))?;

        let data = slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }

    /// Run a particle-to-particle kernel and copy the result into `dst`
    fn run_particles(
        &self,
        kernel: &'static str,
        pipeline: &wgpu::ComputePipeline,
        src: &[Particle],
        dst: &mut [Particle],
        links: Option<&LinkTable>,
        params: &ComputeParams,
    ) -> BackendResult<()> {
        if src.is_empty() {
            return Ok(());
        }
        let bindings = self.bind(src, None, links, params);
        let result = self
            .execute::<GpuParticle>(
                kernel,
                pipeline,
                &bindings,
                src.len(),
                &bindings.state_b,
                src.len(),
            )
            .map_err(|e| kernel_failed(kernel, e))?;
        for (d, r) in dst.iter_mut().zip(&result) {
            *d = Particle::from(r);
        }
        Ok(())
    }
}

fn kernel_failed(kernel: &'static str, error: GpuError) -> BackendError {
    BackendError::KernelFailed {
        kernel,
        reason: error.to_string(),
    }
}

fn workgroups(count: usize) -> u32 {
    (count as u32).div_ceil(WORKGROUP_SIZE).max(1)
}

impl ComputeBackend for GpuBackend {
    fn evaluate_forces_and_energy(
        &self,
        state: &mut [Particle],
        links: &LinkTable,
        params: &ComputeParams,
    ) -> BackendResult<()> {
        let params = ComputeParams {
            particle_count: state.len() as u32,
            ..*params
        };
        let src = state.to_vec();
        self.run_particles(
            "evaluate",
            &self.evaluate_pipeline,
            &src,
            state,
            Some(links),
            &params,
        )
    }

    fn integrate(
        &self,
        src: &[Particle],
        dst: &mut [Particle],
        params: &ComputeParams,
    ) -> BackendResult<()> {
        let params = ComputeParams {
            particle_count: src.len() as u32,
            ..*params
        };
        self.run_particles(
            "integrate",
            &self.integrate_pipeline,
            src,
            dst,
            None,
            &params,
        )
    }

    fn reduce_energy_and_dot(
        &self,
        a: &[Particle],
        b: &[Particle],
        partials: &mut Vec<Reduction>,
        params: &ComputeParams,
    ) -> BackendResult<Reduction> {
        partials.clear();
        if a.is_empty() {
            return Ok(Reduction::default());
        }
        let params = ComputeParams {
            particle_count: a.len() as u32,
            ..*params
        };
        let bindings = self.bind(a, Some(b), None, &params);
        let groups = workgroups(a.len()) as usize;
        let result = self
            .execute::<GpuPartial>(
                "reduce",
                &self.reduce_pipeline,
                &bindings,
                a.len(),
                &bindings.partials,
                groups,
            )
            .map_err(|e| kernel_failed("reduce", e))?;
        partials.extend(result.iter().map(|p| Reduction {
            energy: p.energy as f64,
            dot: p.dot as f64,
            checksum: p.checksum as f64,
        }));
        Ok(partials.iter().copied().sum())
    }

    fn name(&self) -> &'static str {
        "gpu"
    }
}
