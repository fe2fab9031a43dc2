//! wgpu implementation of the particle engine.
//!
//! Every vertex of the model becomes one particle. Particle state lives in two
//! storage buffers that a compute pass ping-pongs between; the render pass
//! draws the most recently written buffer as instanced quads.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::model::{EngineError, EngineFactory, ModelAsset, ModelParams, ParticleEngine, SceneNodeId};

const WORKGROUP_SIZE: u32 = 256;
/// Fixed simulation step; each `compute()` advances time by exactly this much.
pub const SIM_STEP: f32 = 1.0 / 60.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuParticle {
    pos: [f32; 4],
    vel: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SimUniform {
    time: f32,
    dt: f32,
    force: f32,
    count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MaterialUniform {
    color: [f32; 3],
    size: f32,
    min_alpha: f32,
    max_alpha: f32,
    _pad: [f32; 2],
}

impl From<&ModelParams> for MaterialUniform {
    fn from(p: &ModelParams) -> Self {
        Self {
            color: p.color.to_linear_array(),
            size: p.size,
            min_alpha: p.min_alpha,
            max_alpha: p.max_alpha,
            _pad: [0.0; 2],
        }
    }
}

/// Largest particle count one engine can hold on a device with `limits`.
///
/// Each particle buffer must fit both a single storage binding and a single
/// buffer, and the dispatch must fit in one workgroup dimension.
fn particle_limit(limits: &wgpu::Limits) -> usize {
    let bytes = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    let by_memory = bytes / std::mem::size_of::<GpuParticle>() as u64;
    let by_dispatch = limits.max_compute_workgroups_per_dimension as u64 * WORKGROUP_SIZE as u64;
    by_memory.min(by_dispatch) as usize
}

/// Out-of-memory wins over validation when both scopes caught something.
fn scope_result(validation: Option<wgpu::Error>, oom: Option<wgpu::Error>) -> Result<(), EngineError> {
    match oom.or(validation) {
        Some(e) => Err(EngineError::Gpu(e.to_string())),
        None => Ok(()),
    }
}

/// Pop the validation scope, then the out-of-memory scope, pushed around engine construction.
#[cfg(not(target_arch = "wasm32"))]
fn pop_construction_scopes(device: &wgpu::Device) -> Result<(), EngineError> {
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    scope_result(validation, oom)
}

/// WebGPU only resolves error scopes asynchronously, so a failure is logged
/// once known and the engine is kept; its draws and dispatches become no-ops
/// on the invalid resources.
#[cfg(target_arch = "wasm32")]
fn pop_construction_scopes(device: &wgpu::Device) -> Result<(), EngineError> {
    let validation = device.pop_error_scope();
    let oom = device.pop_error_scope();
    wasm_bindgen_futures::spawn_local(async move {
        if let Err(e) = scope_result(validation.await, oom.await) {
            tracing::error!("particle engine construction failed on the GPU: {e}");
        }
    });
    Ok(())
}

/// Deterministic per-particle seed in `[0, 1)`.
fn seed(i: u32) -> f32 {
    let mut h = i.wrapping_mul(0x9E37_79B9) ^ 0x85EB_CA6B;
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    (h >> 8) as f32 / (1u32 << 24) as f32
}

struct Material {
    pipeline: wgpu::RenderPipeline,
    uniform: wgpu::Buffer,
    /// One bind group per particle buffer.
    bind_groups: [wgpu::BindGroup; 2],
}

struct ComputeResources {
    pipeline: wgpu::ComputePipeline,
    particles: [wgpu::Buffer; 2],
    uniform: wgpu::Buffer,
    /// `bind_groups[i]` reads `particles[i]` and writes the other buffer.
    bind_groups: [wgpu::BindGroup; 2],
}

pub struct GpgpuEngine {
    node: SceneNodeId,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    particle_count: u32,
    time: f32,
    force: f32,
    /// Index of the particle buffer holding the latest state.
    current: usize,
    geometry: Option<wgpu::Buffer>,
    material: Option<Material>,
    compute: Option<ComputeResources>,
}

impl GpgpuEngine {
    /// Draw the particles. Does nothing once any resource group has been released.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, camera_bind_group: &wgpu::BindGroup) {
        let (Some(_), Some(material), Some(_)) = (&self.geometry, &self.material, &self.compute) else {
            return;
        };
        pass.set_pipeline(&material.pipeline);
        pass.set_bind_group(0, camera_bind_group, &[]);
        pass.set_bind_group(1, &material.bind_groups[self.current], &[]);
        pass.draw(0..6, 0..self.particle_count);
    }
}

impl ParticleEngine for GpgpuEngine {
    fn node(&self) -> SceneNodeId {
        self.node
    }

    fn compute(&mut self) {
        let Some(compute) = &self.compute else { return };
        if self.geometry.is_none() || self.particle_count == 0 {
            return;
        }

        let uniform = SimUniform {
            time: self.time,
            dt: SIM_STEP,
            force: self.force,
            count: self.particle_count,
        };
        self.queue.write_buffer(&compute.uniform, 0, bytemuck::bytes_of(&uniform));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("gpgpu.step.encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gpgpu.step.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&compute.pipeline);
            pass.set_bind_group(0, &compute.bind_groups[self.current], &[]);
            pass.dispatch_workgroups(self.particle_count.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.current = 1 - self.current;
        self.time += SIM_STEP;
    }

    fn apply_params(&mut self, params: &ModelParams) {
        self.force = params.force;
        if let Some(material) = &self.material {
            self.queue
                .write_buffer(&material.uniform, 0, bytemuck::bytes_of(&MaterialUniform::from(params)));
        }
    }

    fn release_geometry(&mut self) -> Result<(), EngineError> {
        if let Some(buffer) = self.geometry.take() {
            buffer.destroy();
        }
        Ok(())
    }

    fn release_material(&mut self) -> Result<(), EngineError> {
        if let Some(material) = self.material.take() {
            material.uniform.destroy();
        }
        Ok(())
    }

    fn release_compute(&mut self) -> Result<(), EngineError> {
        if let Some(compute) = self.compute.take() {
            for buffer in &compute.particles {
                buffer.destroy();
            }
            compute.uniform.destroy();
        }
        Ok(())
    }
}

/// Builds `GpgpuEngine`s on one device, sharing the shader modules and layouts.
pub struct GpgpuFactory {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    camera_layout: wgpu::BindGroupLayout,
    compute_layout: wgpu::BindGroupLayout,
    render_layout: wgpu::BindGroupLayout,
    simulate_shader: wgpu::ShaderModule,
    particle_shader: wgpu::ShaderModule,
    next_node: u64,
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpgpuFactory {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
        camera_layout: wgpu::BindGroupLayout,
    ) -> Self {
        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gpgpu.compute.bgl"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
                uniform_entry(3, wgpu::ShaderStages::COMPUTE),
            ],
        });
        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gpgpu.render.bgl"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::VERTEX, true),
                uniform_entry(1, wgpu::ShaderStages::VERTEX_FRAGMENT),
            ],
        });
        let simulate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gpgpu.simulate.shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/simulate.wgsl").into()),
        });
        let particle_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gpgpu.particles.shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/particles.wgsl").into()),
        });

        Self {
            device,
            queue,
            format,
            camera_layout,
            compute_layout,
            render_layout,
            simulate_shader,
            particle_shader,
            next_node: 1,
        }
    }

    fn build(&self, asset: &ModelAsset, params: &ModelParams) -> (wgpu::Buffer, ComputeResources, Material) {
        let rest: Vec<[f32; 4]> = asset
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| [p.x, p.y, p.z, seed(i as u32)])
            .collect();
        // staggered initial lives so particles do not all respawn on the same frame
        let initial: Vec<GpuParticle> = rest
            .iter()
            .map(|r| GpuParticle { pos: [r[0], r[1], r[2], r[3]], vel: [0.0; 4] })
            .collect();

        let geometry = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gpgpu.base.positions"),
            contents: bytemuck::cast_slice(&rest),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let compute = self.build_compute(&geometry, &initial, params.force);
        let material = self.build_material(&compute.particles, params);
        (geometry, compute, material)
    }

    fn build_compute(&self, base: &wgpu::Buffer, initial: &[GpuParticle], force: f32) -> ComputeResources {
        let particles = [0, 1].map(|i| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(if i == 0 { "gpgpu.particles.a" } else { "gpgpu.particles.b" }),
                contents: bytemuck::cast_slice(initial),
                usage: wgpu::BufferUsages::STORAGE,
            })
        });
        let uniform = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gpgpu.sim.uniform"),
            contents: bytemuck::bytes_of(&SimUniform {
                time: 0.0,
                dt: SIM_STEP,
                force,
                count: initial.len() as u32,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_groups = [0usize, 1].map(|src| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gpgpu.compute.bg"),
                layout: &self.compute_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: base.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: particles[src].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 2, resource: particles[1 - src].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 3, resource: uniform.as_entire_binding() },
                ],
            })
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpgpu.compute.pl"),
            bind_group_layouts: &[&self.compute_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gpgpu.compute.pipeline"),
            layout: Some(&pipeline_layout),
            module: &self.simulate_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        ComputeResources { pipeline, particles, uniform, bind_groups }
    }

    fn build_material(&self, particles: &[wgpu::Buffer; 2], params: &ModelParams) -> Material {
        let uniform = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gpgpu.material.uniform"),
            contents: bytemuck::bytes_of(&MaterialUniform::from(params)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_groups = [0usize, 1].map(|i| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("gpgpu.render.bg"),
                layout: &self.render_layout,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: particles[i].as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 1, resource: uniform.as_entire_binding() },
                ],
            })
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gpgpu.render.pl"),
            bind_group_layouts: &[&self.camera_layout, &self.render_layout],
            push_constant_ranges: &[],
        });
        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gpgpu.render.pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.particle_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.particle_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.format,
                    blend: Some(additive),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
            multiview: None,
            cache: None,
        });

        Material { pipeline, uniform, bind_groups }
    }
}

impl EngineFactory for GpgpuFactory {
    type Engine = GpgpuEngine;

    fn construct(&mut self, asset: &ModelAsset, params: &ModelParams) -> Result<GpgpuEngine, EngineError> {
        if asset.is_empty() {
            return Err(EngineError::EmptyGeometry);
        }
        let limit = particle_limit(&self.device.limits());
        if asset.vertex_count() > limit {
            return Err(EngineError::TooManyParticles { count: asset.vertex_count(), limit });
        }

        // allocation and validation failures become construction errors instead of
        // reaching the device's uncaptured-error handler
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let (geometry, compute, material) = self.build(asset, params);
        pop_construction_scopes(&self.device)?;

        let node = SceneNodeId(self.next_node);
        self.next_node += 1;
        tracing::debug!(node = node.0, particles = asset.vertex_count(), "gpgpu engine built");

        Ok(GpgpuEngine {
            node,
            device: self.device.clone(),
            queue: self.queue.clone(),
            particle_count: asset.vertex_count() as u32,
            time: 0.0,
            force: params.force,
            current: 0,
            geometry: Some(geometry),
            material: Some(material),
            compute: Some(compute),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_in_unit_interval_and_vary() {
        let seeds: Vec<f32> = (0..1000).map(seed).collect();
        assert!(seeds.iter().all(|s| (0.0..1.0).contains(s)));
        assert!(seeds.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn particle_limit_respects_buffer_size_and_dispatch() {
        let defaults = wgpu::Limits::default();
        let binding_bound = defaults.max_storage_buffer_binding_size as usize / 32;
        assert_eq!(particle_limit(&defaults), binding_bound);

        // large binding size on a device whose buffers stay at 256 MiB
        let big_binding = wgpu::Limits {
            max_storage_buffer_binding_size: 1 << 31,
            max_buffer_size: 256 << 20,
            ..wgpu::Limits::default()
        };
        assert_eq!(particle_limit(&big_binding), (256 << 20) / 32);
        assert!(particle_limit(&big_binding) < 10_000_000);

        let few_workgroups = wgpu::Limits {
            max_compute_workgroups_per_dimension: 10,
            ..wgpu::Limits::default()
        };
        assert_eq!(particle_limit(&few_workgroups), 2560);
    }

    #[test]
    fn material_color_is_linearized() {
        let params = ModelParams {
            color: crate::model::Color::from_hex("#FFFFFF").expect("valid hex"),
            size: 1.7,
            min_alpha: 0.04,
            max_alpha: 0.8,
            force: 0.7,
        };
        assert_eq!(MaterialUniform::from(&params).color, [1.0, 1.0, 1.0]);

        let pink = ModelParams { color: crate::model::Color::from_rgb8(0xF7, 0x77, 0xA8), ..params };
        let color = MaterialUniform::from(&pink).color;
        assert_eq!(color, pink.color.to_linear_array());
        assert!(color[1] < pink.color.g);
    }

    #[test]
    fn uniform_layouts_match_wgsl() {
        assert_eq!(std::mem::size_of::<GpuParticle>(), 32);
        assert_eq!(std::mem::size_of::<SimUniform>(), 16);
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
    }
}
