use crate::device::{Device, Program, Shader, ShaderKind};

use super::{CompileError, ShaderStage};

/// Turns vertex + fragment source pairs into linked programs.
///
/// Stateless: every call creates its own shader objects and deletes them
/// before returning, whatever the outcome. Only a successfully linked program
/// escapes to the caller.
#[derive(Debug, Default, Copy, Clone)]
pub struct ShaderCompiler;

impl ShaderCompiler {
    pub fn compile<D: Device>(
        device: &mut D,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Program, CompileError> {
        let (vs_kind, fs_kind) = (device.consts().vertex_shader, device.consts().fragment_shader);

        let vs = compile_stage(device, vs_kind, vertex_source, ShaderStage::Vertex)?;
        let fs = match compile_stage(device, fs_kind, fragment_source, ShaderStage::Fragment) {
            Ok(fs) => fs,
            Err(e) => {
                discard_shader(device, vs);
                return Err(e);
            }
        };

        let linked = link(device, &vs, &fs);
        discard_shader(device, vs);
        discard_shader(device, fs);
        linked
    }
}

fn compile_stage<D: Device>(
    device: &mut D,
    kind: ShaderKind,
    source: &str,
    stage: ShaderStage,
) -> Result<Shader, CompileError> {
    let shader = device
        .create_shader(kind)
        .map_err(|e| CompileError::device(stage, e))?;

    let compiled = device
        .shader_source(&shader, source)
        .and_then(|()| device.compile_shader(&shader))
        .and_then(|()| device.shader_compile_status(&shader));

    match compiled {
        Ok(true) => Ok(shader),
        Ok(false) => {
            let log = device
                .shader_info_log(&shader)
                .unwrap_or_else(|e| format!("<info log unavailable: {e}>"));
            discard_shader(device, shader);
            Err(CompileError { stage, log })
        }
        Err(e) => {
            discard_shader(device, shader);
            Err(CompileError::device(stage, e))
        }
    }
}

fn link<D: Device>(device: &mut D, vs: &Shader, fs: &Shader) -> Result<Program, CompileError> {
    let stage = ShaderStage::Link;
    let program = device
        .create_program()
        .map_err(|e| CompileError::device(stage, e))?;

    let linked = device
        .attach_shader(&program, vs)
        .and_then(|()| device.attach_shader(&program, fs))
        .and_then(|()| device.link_program(&program))
        .and_then(|()| device.program_link_status(&program));

    match linked {
        Ok(true) => Ok(program),
        Ok(false) => {
            let log = device
                .program_info_log(&program)
                .unwrap_or_else(|e| format!("<info log unavailable: {e}>"));
            discard_program(device, program);
            Err(CompileError { stage, log })
        }
        Err(e) => {
            discard_program(device, program);
            Err(CompileError::device(stage, e))
        }
    }
}

fn discard_shader<D: Device>(device: &mut D, shader: Shader) {
    let id = shader.raw();
    if let Err(e) = device.delete_shader(shader) {
        log::warn!("failed to delete shader #{id}: {e}");
    }
}

fn discard_program<D: Device>(device: &mut D, program: Program) {
    let id = program.raw();
    if let Err(e) = device.delete_program(program) {
        log::warn!("failed to delete program #{id}: {e}");
    }
}
