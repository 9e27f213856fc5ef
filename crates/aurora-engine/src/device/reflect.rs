//! WGSL front-end for the wgpu binding: parse, validate and reflect.
//!
//! The wgpu binding accepts WGSL stage sources. naga gives us the compile
//! diagnostics a shader info log needs, plus the interface information
//! (attribute names, inter-stage locations, resource bindings) that the
//! name-based attribute/uniform lookup of the binding is built on.

use std::collections::{BTreeMap, BTreeSet};

/// Front-end result for one compiled stage.
#[derive(Debug, Clone)]
pub(crate) struct StageInterface {
    pub entry_point: String,
    /// Named `@location` inputs of the entry point.
    pub inputs: BTreeMap<String, u32>,
    /// `@location` outputs of the entry point.
    pub outputs: BTreeSet<u32>,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResourceKind {
    Texture,
    Sampler,
    /// Uniform buffer holding up to four f32 components.
    Uniform,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Resource {
    pub name: String,
    pub binding: u32,
    pub kind: ResourceKind,
}

/// Parses and validates `source`, then reflects the entry point of `stage`.
///
/// The error string is the diagnostic text reported through the info log.
pub(crate) fn compile_stage(source: &str, stage: naga::ShaderStage) -> Result<StageInterface, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage)
        .ok_or_else(|| format!("no {} entry point", stage_name(stage)))?;

    let mut inputs = BTreeMap::new();
    for arg in &entry.function.arguments {
        match &arg.binding {
            Some(naga::Binding::Location { location, .. }) => {
                if let Some(name) = &arg.name {
                    inputs.insert(name.clone(), *location);
                }
            }
            Some(naga::Binding::BuiltIn(_)) => {}
            None => {
                for (name, location) in struct_locations(&module, arg.ty) {
                    inputs.insert(name, location);
                }
            }
        }
    }

    let mut outputs = BTreeSet::new();
    if let Some(result) = &entry.function.result {
        match &result.binding {
            Some(naga::Binding::Location { location, .. }) => {
                outputs.insert(*location);
            }
            Some(naga::Binding::BuiltIn(_)) => {}
            None => outputs.extend(struct_locations(&module, result.ty).map(|(_, l)| l)),
        }
    }

    let resources = resources(&module)?;

    Ok(StageInterface {
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        resources,
    })
}

/// Checks that the two stages can run as one pipeline and merges their
/// resource bindings.
pub(crate) fn link_stages(
    vertex: &StageInterface,
    fragment: &StageInterface,
) -> Result<Vec<Resource>, String> {
    if let Some(missing) = fragment.inputs.values().find(|l| !vertex.outputs.contains(l)) {
        return Err(format!(
            "fragment input at location {missing} is not written by the vertex stage"
        ));
    }

    let mut merged: Vec<Resource> = vertex.resources.clone();
    for res in &fragment.resources {
        match merged.iter().find(|r| r.binding == res.binding) {
            Some(existing) if existing.kind != res.kind || existing.name != res.name => {
                return Err(format!(
                    "binding {} is declared as '{}' in the vertex stage and '{}' in the fragment stage",
                    res.binding, existing.name, res.name
                ));
            }
            Some(_) => {}
            None => merged.push(res.clone()),
        }
    }
    merged.sort_by_key(|r| r.binding);
    Ok(merged)
}

fn stage_name(stage: naga::ShaderStage) -> &'static str {
    match stage {
        naga::ShaderStage::Vertex => "@vertex",
        naga::ShaderStage::Fragment => "@fragment",
        _ => "supported",
    }
}

fn struct_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
) -> impl Iterator<Item = (String, u32)> + '_ {
    let members = match &module.types[ty].inner {
        naga::TypeInner::Struct { members, .. } => members.as_slice(),
        _ => &[],
    };
    members.iter().filter_map(|m| match (&m.name, &m.binding) {
        (Some(name), Some(naga::Binding::Location { location, .. })) => {
            Some((name.clone(), *location))
        }
        _ => None,
    })
}

fn resources(module: &naga::Module) -> Result<Vec<Resource>, String> {
    let mut out = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else { continue };
        let name = var.name.clone().unwrap_or_default();
        if rb.group != 0 {
            return Err(format!("resource '{name}' must be in @group(0), found @group({})", rb.group));
        }

        let kind = match &module.types[var.ty].inner {
            naga::TypeInner::Image { .. } => ResourceKind::Texture,
            naga::TypeInner::Sampler { .. } => ResourceKind::Sampler,
            naga::TypeInner::Scalar(s) | naga::TypeInner::Vector { scalar: s, .. }
                if var.space == naga::AddressSpace::Uniform
                    && s.kind == naga::ScalarKind::Float
                    && s.width == 4 =>
            {
                ResourceKind::Uniform
            }
            _ => return Err(format!("unsupported resource type for '{name}'")),
        };

        out.push(Resource { name, binding: rb.binding, kind });
    }
    Ok(out)
}
