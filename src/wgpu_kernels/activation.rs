//! WGPU elementwise activation kernels.
//!
//! The storage precision is a build-time property of the shader, not a
//! runtime branch: two WGSL sources exist, one over `vec4<f32>` lane groups
//! and one over packed f16 pairs, and each transform gets its own pipeline
//! per source. Dispatch picks a pipeline; the hot loop never tests a flag.

use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::ops::activation::Activation;
use crate::validation::validate_activation_shape;

const SHADER_F32: &str = include_str!("kernels/activation_f32.wgsl");
const SHADER_F16: &str = include_str!("kernels/activation_f16.wgsl");
const WORKGROUP_SIZE: u32 = 128;
const LANE_GROUP: u32 = 4;

const ENTRY_POINTS: [&str; 4] = [
    "squared_relu_main",
    "tanh_main",
    "stable_exp_main",
    "neg_exp_main",
];

#[derive(Debug)]
pub enum ActivationError {
    Wgpu(String),
    Invalid(String),
}

impl std::fmt::Display for ActivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wgpu(msg) => write!(f, "WGPU error: {msg}"),
            Self::Invalid(msg) => write!(f, "Invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ActivationError {}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ActivationShape {
    pub channels: u32,
    pub tokens: u32,
    pub batches: u32,
    pub _pad0: u32,
}

impl ActivationShape {
    pub fn new(channels: u32, tokens: u32, batches: u32) -> Self {
        Self {
            channels,
            tokens,
            batches,
            _pad0: 0,
        }
    }
}

fn pipeline_index(kind: Activation) -> usize {
    match kind {
        Activation::SquaredRelu => 0,
        Activation::Tanh => 1,
        Activation::StableExp => 2,
        Activation::NegExp => 3,
    }
}

pub struct WgpuActivation {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines_f32: [wgpu::ComputePipeline; 4],
    pipelines_f16: [wgpu::ComputePipeline; 4],
    bind_group_layout: wgpu::BindGroupLayout,
}

impl WgpuActivation {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader_f32 = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("activation_f32_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_F32.into()),
        });
        let shader_f16 = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("activation_f16_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_F16.into()),
        });

        // Both layouts are identical: a uniform shape plus one read-write
        // tensor buffer.
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("activation_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("activation_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let build = |module: &wgpu::ShaderModule, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module,
                entry_point: Some(entry),
                cache: None,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
        };
        let pipelines_f32 = ENTRY_POINTS.map(|entry| build(&shader_f32, entry));
        let pipelines_f16 = ENTRY_POINTS.map(|entry| build(&shader_f16, entry));

        log::debug!("activation pipelines ready ({} entry points x 2 precisions)", ENTRY_POINTS.len());

        Self {
            device,
            queue,
            pipelines_f32,
            pipelines_f16,
            bind_group_layout,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Apply `kind` in place to a full-precision tensor buffer.
    ///
    /// Buffer layout and the channels-divisible-by-4 invariant are the
    /// caller's contract; lane groups past channels/4 in a padded dispatch
    /// are skipped by the kernel.
    pub fn forward_inplace(&self, shape: ActivationShape, kind: Activation, data: &wgpu::Buffer) {
        self.dispatch(&self.pipelines_f32[pipeline_index(kind)], shape, data);
    }

    /// Apply `kind` in place to a packed-half tensor buffer (two f16 lanes
    /// per u32 word).
    pub fn forward_inplace_f16(
        &self,
        shape: ActivationShape,
        kind: Activation,
        data: &wgpu::Buffer,
    ) {
        self.dispatch(&self.pipelines_f16[pipeline_index(kind)], shape, data);
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        shape: ActivationShape,
        data: &wgpu::Buffer,
    ) {
        if shape.channels == 0 || shape.tokens == 0 || shape.batches == 0 {
            return;
        }

        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("activation_shape"),
                contents: bytemuck::bytes_of(&shape),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("activation_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: data.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("activation_encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("activation_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let stride = shape.channels / LANE_GROUP;
            let workgroups = (stride + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
            pass.dispatch_workgroups(workgroups, shape.tokens, shape.batches);
        }

        self.queue.submit(Some(encoder.finish()));
        let _ = self.device.poll(wgpu::PollType::Wait);
    }

    /// Slice-level convenience over [`Self::forward_inplace`].
    pub fn compute_inplace(
        &self,
        kind: Activation,
        data: &mut [f32],
        channels: usize,
        tokens: usize,
        batches: usize,
    ) -> Result<(), ActivationError> {
        validate_activation_shape(channels, tokens, batches, data.len())
            .map_err(ActivationError::Invalid)?;

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("activation_tensor"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
        let shape = ActivationShape::new(channels as u32, tokens as u32, batches as u32);
        self.forward_inplace(shape, kind, &buffer);

        let back: Vec<f32> = self.read_back(&buffer, std::mem::size_of_val(data) as u64);
        data.copy_from_slice(&back);
        Ok(())
    }

    /// Slice-level convenience over [`Self::forward_inplace_f16`].
    pub fn compute_packed_inplace(
        &self,
        kind: Activation,
        data: &mut [u32],
        channels: usize,
        tokens: usize,
        batches: usize,
    ) -> Result<(), ActivationError> {
        validate_activation_shape(channels, tokens, batches, data.len() * 2)
            .map_err(ActivationError::Invalid)?;

        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("activation_tensor_f16"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
        let shape = ActivationShape::new(channels as u32, tokens as u32, batches as u32);
        self.forward_inplace_f16(shape, kind, &buffer);

        let back: Vec<u32> = self.read_back(&buffer, std::mem::size_of_val(data) as u64);
        data.copy_from_slice(&back);
        Ok(())
    }

    fn read_back<T: bytemuck::Pod>(&self, buffer: &wgpu::Buffer, size: u64) -> Vec<T> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("activation_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("activation_readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        let _ = rx.recv();

        let data = slice.get_mapped_range();
        let result = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        result
    }
}
