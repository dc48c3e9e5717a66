// shader.rs — 顶点 / 片元着色器的编译、链接检查与名字 -> 位置查询
//
// WGSL 先用 naga 在 CPU 上解析 + 校验 + 反射，再交给 wgpu 创建 ShaderModule。
// 任何一步失败都返回 CompileError，不会退回到默认着色器。

use crate::error::{CompileError, ShaderStageKind};
use crate::gpu::RenderContext;
use naga::{Binding, Handle, Module, ShaderStage, Type, TypeInner};
use std::collections::HashMap;

pub const PANORAMA_VERTEX: &str = include_str!("shaders/panorama_vertex.wgsl");
pub const DECODED_BLEND_FRAGMENT: &str = include_str!("shaders/decoded_blend.wgsl");
pub const YUV_BLEND_FRAGMENT: &str = include_str!("shaders/yuv_blend.wgsl");

/// `@group(g) @binding(b)` of a named uniform / texture / sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Clone)]
struct LocationSlot {
    name: String,
    location: u32,
    ty: TypeInner,
}

#[derive(Debug)]
struct StageReflection {
    entry_point: String,
    inputs: Vec<LocationSlot>,
    outputs: Vec<LocationSlot>,
    resources: Vec<(String, ResourceSlot)>,
}

/// 链接后的接口：顶点属性位置 + 资源绑定位置
#[derive(Debug, Clone)]
pub struct ShaderInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, ResourceSlot>,
}

impl ShaderInterface {
    /// Parses, validates and links both stages without touching the GPU.
    pub fn reflect(
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, CompileError> {
        let vertex = reflect_stage(label, vertex_source, ShaderStageKind::Vertex)?;
        let fragment = reflect_stage(label, fragment_source, ShaderStageKind::Fragment)?;

        for input in &fragment.inputs {
            let Some(output) = vertex.outputs.iter().find(|o| o.location == input.location) else {
                return Err(CompileError::new(
                    label,
                    ShaderStageKind::Link,
                    format!(
                        "fragment input `{}` @location({}) is not written by the vertex stage",
                        input.name, input.location
                    ),
                ));
            };
            if output.ty != input.ty {
                return Err(CompileError::new(
                    label,
                    ShaderStageKind::Link,
                    format!(
                        "@location({}) is {:?} in the vertex stage but {:?} in the fragment stage",
                        input.location, output.ty, input.ty
                    ),
                ));
            }
        }

        let mut uniforms: HashMap<String, ResourceSlot> = HashMap::new();
        for (name, slot) in vertex.resources.iter().chain(fragment.resources.iter()) {
            if let Some((other, _)) = vertex
                .resources
                .iter()
                .chain(fragment.resources.iter())
                .find(|(n, s)| s == slot && n != name)
            {
                return Err(CompileError::new(
                    label,
                    ShaderStageKind::Link,
                    format!(
                        "`{}` and `{}` both claim @group({}) @binding({})",
                        name, other, slot.group, slot.binding
                    ),
                ));
            }
            uniforms.insert(name.clone(), *slot);
        }

        let attributes = vertex
            .inputs
            .iter()
            .map(|slot| (slot.name.clone(), slot.location))
            .collect();

        Ok(Self {
            vertex_entry: vertex.entry_point,
            fragment_entry: fragment.entry_point,
            attributes,
            uniforms,
        })
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform_location(&self, name: &str) -> Option<ResourceSlot> {
        self.uniforms.get(name).copied()
    }
}

fn reflect_stage(
    label: &str,
    source: &str,
    stage: ShaderStageKind,
) -> Result<StageReflection, CompileError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| CompileError::new(label, stage, e.emit_to_string(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| CompileError::new(label, stage, error_chain(&e)))?;

    let wanted = match stage {
        ShaderStageKind::Vertex => ShaderStage::Vertex,
        _ => ShaderStage::Fragment,
    };
    let entries: Vec<_> = module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == wanted)
        .collect();
    let entry = match entries.as_slice() {
        [entry] => *entry,
        [] => {
            return Err(CompileError::new(
                label,
                stage,
                format!("no {stage} entry point"),
            ))
        }
        _ => {
            return Err(CompileError::new(
                label,
                stage,
                format!("{} {stage} entry points, expected one", entries.len()),
            ))
        }
    };

    let mut inputs = Vec::new();
    for arg in &entry.function.arguments {
        collect_locations(&module, arg.name.as_deref(), arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(&module, None, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let resources = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            Some((
                var.name.clone().unwrap_or_default(),
                ResourceSlot {
                    group: binding.group,
                    binding: binding.binding,
                },
            ))
        })
        .collect();

    log::debug!(
        "shader `{}` {} stage: entry `{}`, {} inputs, {} outputs",
        label,
        stage,
        entry.name,
        inputs.len(),
        outputs.len()
    );

    Ok(StageReflection {
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        resources,
    })
}

// 参数可以直接带 @location，也可以是带 @location 成员的结构体
fn collect_locations(
    module: &Module,
    name: Option<&str>,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<LocationSlot>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(LocationSlot {
            name: name.unwrap_or_default().to_string(),
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.name.as_deref(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// 编译好的着色器对：两个 module + 反射出来的接口。随所属表面一起销毁。
pub struct ShaderProgram {
    label: String,
    interface: ShaderInterface,
    pub vertex_module: wgpu::ShaderModule,
    pub fragment_module: wgpu::ShaderModule,
}

impl ShaderProgram {
    pub fn compile(
        ctx: &RenderContext,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, CompileError> {
        let interface = ShaderInterface::reflect(label, vertex_source, fragment_source)?;
        let vertex_module =
            create_module(ctx, label, vertex_source, ShaderStageKind::Vertex)?;
        let fragment_module =
            create_module(ctx, label, fragment_source, ShaderStageKind::Fragment)?;

        log::info!(
            "compiled shader program `{}` ({} attributes, {} resources)",
            label,
            interface.attributes.len(),
            interface.uniforms.len()
        );

        Ok(Self {
            label: label.to_string(),
            interface,
            vertex_module,
            fragment_module,
        })
    }

    pub fn interface(&self) -> &ShaderInterface {
        &self.interface
    }

    pub fn vertex_entry(&self) -> &str {
        &self.interface.vertex_entry
    }

    pub fn fragment_entry(&self) -> &str {
        &self.interface.fragment_entry
    }

    pub fn attribute_location(&self, name: &str) -> Result<u32, CompileError> {
        self.interface.attribute_location(name).ok_or_else(|| {
            CompileError::new(
                &self.label,
                ShaderStageKind::Link,
                format!("no vertex attribute named `{name}`"),
            )
        })
    }

    pub fn uniform_location(&self, name: &str) -> Result<ResourceSlot, CompileError> {
        self.interface.uniform_location(name).ok_or_else(|| {
            CompileError::new(
                &self.label,
                ShaderStageKind::Link,
                format!("no uniform named `{name}`"),
            )
        })
    }
}

fn create_module(
    ctx: &RenderContext,
    label: &str,
    source: &str,
    stage: ShaderStageKind,
) -> Result<wgpu::ShaderModule, CompileError> {
    ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(ctx.device.pop_error_scope()) {
        Some(err) => Err(CompileError::new(label, stage, err.to_string())),
        None => Ok(module),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_program_links_and_reflects() {
        let iface =
            ShaderInterface::reflect("decoded", PANORAMA_VERTEX, DECODED_BLEND_FRAGMENT).unwrap();
        assert_eq!(iface.vertex_entry, "vs_main");
        assert_eq!(iface.fragment_entry, "fs_main");
        assert_eq!(iface.attribute_location("position"), Some(0));
        assert_eq!(iface.attribute_location("uv_front"), Some(1));
        assert_eq!(iface.attribute_location("uv_back"), Some(2));
        assert_eq!(
            iface.uniform_location("camera"),
            Some(ResourceSlot { group: 0, binding: 0 })
        );
        assert_eq!(
            iface.uniform_location("seam"),
            Some(ResourceSlot { group: 0, binding: 1 })
        );
        assert_eq!(
            iface.uniform_location("panorama"),
            Some(ResourceSlot { group: 1, binding: 0 })
        );
        assert_eq!(
            iface.uniform_location("panorama_sampler"),
            Some(ResourceSlot { group: 1, binding: 1 })
        );
    }

    #[test]
    fn yuv_program_links_and_reflects() {
        let iface = ShaderInterface::reflect("yuv", PANORAMA_VERTEX, YUV_BLEND_FRAGMENT).unwrap();
        for (i, name) in ["tex_y", "tex_u", "tex_v", "plane_sampler"].iter().enumerate() {
            assert_eq!(
                iface.uniform_location(name),
                Some(ResourceSlot {
                    group: 1,
                    binding: i as u32
                })
            );
        }
        assert_eq!(iface.attribute_location("missing"), None);
    }

    #[test]
    fn syntax_error_reports_stage_and_log() {
        let err = ShaderInterface::reflect("broken", "fn vs_main( {", DECODED_BLEND_FRAGMENT)
            .unwrap_err();
        assert_eq!(err.stage, ShaderStageKind::Vertex);
        assert_eq!(err.label, "broken");
        assert!(!err.log.is_empty());
    }

    #[test]
    fn fragment_error_is_attributed_to_fragment() {
        let fragment = "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined_name; }";
        let err = ShaderInterface::reflect("broken", PANORAMA_VERTEX, fragment).unwrap_err();
        assert_eq!(err.stage, ShaderStageKind::Fragment);
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = ShaderInterface::reflect("no-entry", "fn helper() {}", DECODED_BLEND_FRAGMENT)
            .unwrap_err();
        assert_eq!(err.stage, ShaderStageKind::Vertex);
        assert!(err.log.contains("entry point"));
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let fragment = r#"
            @fragment
            fn fs_main(@location(5) extra: vec2<f32>) -> @location(0) vec4<f32> {
                return vec4<f32>(extra, 0.0, 1.0);
            }
        "#;
        let err = ShaderInterface::reflect("link", PANORAMA_VERTEX, fragment).unwrap_err();
        assert_eq!(err.stage, ShaderStageKind::Link);
        assert!(err.log.contains("@location(5)"));
    }

    #[test]
    fn mismatched_varying_type_fails_to_link() {
        let fragment = r#"
            @fragment
            fn fs_main(@location(0) uv: vec3<f32>) -> @location(0) vec4<f32> {
                return vec4<f32>(uv, 1.0);
            }
        "#;
        let err = ShaderInterface::reflect("link", PANORAMA_VERTEX, fragment).unwrap_err();
        assert_eq!(err.stage, ShaderStageKind::Link);
    }
}
