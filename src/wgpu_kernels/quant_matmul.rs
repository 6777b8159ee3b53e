//! WGPU int8 dequantize-matmul kernel.

use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::validation::validate_matmul_params;

const SHADER_SOURCE: &str = include_str!("kernels/quant_matmul.wgsl");
const BLOCK_SIZE: u32 = 128;
const LANE_GROUP: u32 = 4;

#[derive(Debug)]
pub enum QuantMatmulError {
    Wgpu(String),
    Invalid(String),
}

impl std::fmt::Display for QuantMatmulError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wgpu(msg) => write!(f, "WGPU error: {msg}"),
            Self::Invalid(msg) => write!(f, "Invalid config: {msg}"),
        }
    }
}

impl std::error::Error for QuantMatmulError {}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuantMatmulParams {
    pub channels: u32,
    pub rows: u32,
    pub tokens: u32,
    pub _pad0: u32,
}

pub struct WgpuQuantMatmul {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl WgpuQuantMatmul {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quant_matmul_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for binding in 1..=6 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 7,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quant_matmul_layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quant_matmul_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("quant_matmul_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("quant_matmul_main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        log::debug!("quant_matmul pipeline ready (block size {BLOCK_SIZE})");

        Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Dispatch one matmul over caller-owned buffers.
    ///
    /// One 128-lane workgroup per (row group, token); a zero token count is
    /// a no-op. Shape invariants (channels and rows multiples of 4, buffer
    /// extents matching `params`) are the caller's contract; violating them
    /// produces incorrect results, not an error.
    #[allow(clippy::too_many_arguments)]
    pub fn forward(
        &self,
        params: QuantMatmulParams,
        matrix: &wgpu::Buffer,
        mx: &wgpu::Buffer,
        rx: &wgpu::Buffer,
        my: &wgpu::Buffer,
        ry: &wgpu::Buffer,
        input: &wgpu::Buffer,
        output: &wgpu::Buffer,
    ) {
        if params.tokens == 0 {
            return;
        }

        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quant_matmul_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let buffers = [
            matrix, mx, rx, my, ry, input, output,
        ];
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buf.as_entire_binding(),
        }];
        for (i, buffer) in buffers.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: (i + 1) as u32,
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quant_matmul_bind_group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quant_matmul_encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("quant_matmul_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(1, params.rows / LANE_GROUP, params.tokens);
        }

        self.queue.submit(Some(encoder.finish()));
        let _ = self.device.poll(wgpu::PollType::Wait);
    }

    /// Slice-level convenience: validates, uploads, dispatches, reads back.
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        &self,
        matrix: &[u32],
        mx: &[f32],
        rx: &[f32],
        my: &[f32],
        ry: &[f32],
        input: &[f32],
        channels: usize,
        rows: usize,
        tokens: usize,
    ) -> Result<Vec<f32>, QuantMatmulError> {
        validate_matmul_params(
            channels,
            rows,
            tokens,
            matrix.len(),
            mx.len(),
            rx.len(),
            my.len(),
            ry.len(),
            input.len(),
            tokens * rows,
        )
        .map_err(QuantMatmulError::Invalid)?;

        if tokens == 0 {
            return Ok(vec![]);
        }

        let storage = |label, contents: &[u8]| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage: wgpu::BufferUsages::STORAGE,
                })
        };
        let matrix_buf = storage("quant_matmul_matrix", bytemuck::cast_slice(matrix));
        let mx_buf = storage("quant_matmul_mx", bytemuck::cast_slice(mx));
        let rx_buf = storage("quant_matmul_rx", bytemuck::cast_slice(rx));
        let my_buf = storage("quant_matmul_my", bytemuck::cast_slice(my));
        let ry_buf = storage("quant_matmul_ry", bytemuck::cast_slice(ry));
        let input_buf = storage("quant_matmul_input", bytemuck::cast_slice(input));

        let output_size = (tokens * rows * std::mem::size_of::<f32>()) as u64;
        let output_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quant_matmul_output"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        self.forward(
            QuantMatmulParams {
                channels: channels as u32,
                rows: rows as u32,
                tokens: tokens as u32,
                _pad0: 0,
            },
            &matrix_buf,
            &mx_buf,
            &rx_buf,
            &my_buf,
            &ry_buf,
            &input_buf,
            &output_buf,
        );

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quant_matmul_staging"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quant_matmul_readback"),
            });
        encoder.copy_buffer_to_buffer(&output_buf, 0, &staging, 0, output_size);
        self.queue.submit(Some(encoder.finish()));

        Ok(self.read_buffer_f32(&staging, tokens * rows))
    }

    fn read_buffer_f32(&self, buffer: &wgpu::Buffer, count: usize) -> Vec<f32> {
        let (tx, rx) = mpsc::channel();
        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait);
        let _ = rx.recv();

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data)[..count].to_vec();
        drop(data);
        buffer.unmap();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::quant_matmul::{quant_matmul, quantize_matrix};

    async fn create_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok()?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .ok()?;
        Some((device, queue))
    }

    #[test]
    fn gpu_matches_cpu_reference() {
        pollster::block_on(async {
            let Some((device, queue)) = create_device().await else {
                println!("No WGPU device available, skipping quant_matmul test");
                return;
            };
            let kernel = WgpuQuantMatmul::new(device, queue);

            let channels = 256;
            let rows = 16;
            let tokens = 3;
            let weights: Vec<f32> = (0..rows * channels)
                .map(|i| ((i as f32 * 0.113).cos() * 0.8) - 0.2)
                .collect();
            let input: Vec<f32> = (0..tokens * channels)
                .map(|i| ((i as f32 * 0.37).sin()) * 0.5)
                .collect();
            let q = quantize_matrix(&weights, rows, channels).unwrap();

            let mut cpu = vec![0.0f32; tokens * rows];
            quant_matmul(
                &q.matrix, &q.mx, &q.rx, &q.my, &q.ry, &input, &mut cpu, channels, rows, tokens,
            )
            .unwrap();

            let gpu = kernel
                .compute(
                    &q.matrix, &q.mx, &q.rx, &q.my, &q.ry, &input, channels, rows, tokens,
                )
                .unwrap();

            assert_eq!(cpu.len(), gpu.len());
            for (a, b) in cpu.iter().zip(gpu.iter()) {
                assert!((a - b).abs() < 1e-3 * a.abs().max(1.0), "{a} vs {b}");
            }
        });
    }

    #[test]
    fn zero_tokens_is_a_no_op() {
        pollster::block_on(async {
            let Some((device, queue)) = create_device().await else {
                println!("No WGPU device available, skipping quant_matmul test");
                return;
            };
            let kernel = WgpuQuantMatmul::new(device, queue);
            let q = quantize_matrix(&vec![0.5f32; 8 * 8], 8, 8).unwrap();
            let out = kernel
                .compute(&q.matrix, &q.mx, &q.rx, &q.my, &q.ry, &[], 8, 8, 0)
                .unwrap();
            assert!(out.is_empty());
        });
    }
}
