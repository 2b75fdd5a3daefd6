// Shader programs and their uniform reflection
//
// A program is described by a descriptor file declaring the vertex and
// fragment stages, the reflection type name, attribute bindings and
// typed uniforms. At load time every uniform the reflection type
// requires must have been declared, and each declared uniform gets a GL
// location plus a staging slot. "Future" setters park a value on the
// program without touching GL; `use_program` flushes everything staged.
use crate::{LumenError, Result};
use utils::log;

use cgmath::{Matrix4, Vector2, Vector3};
use gl::types::{GLenum, GLint, GLuint};

use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UniformType {
    Bool,
    Float,
    Sampler,
    Vec2,
    Vec3,
    Ignored,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Float(f32),
    Sampler(i32),
    Vec2(Vector2<f32>),
    Vec3(Vector3<f32>),
}

impl UniformValue {
    fn type_of(&self) -> UniformType {
        match self {
            UniformValue::Bool(_) => UniformType::Bool,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Sampler(_) => UniformType::Sampler,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
        }
    }
}

/// The uniform sets each reflection type name requires. A descriptor
/// naming one of these types must declare every listed uniform.
static SHADER_TYPES: &[(&str, &[&str])] = &[
    ("global", &["mvp", "tex_scr", "flip", "invert", "opacity", "dim"]),
    ("passthrough", &["mvp", "flip", "opacity", "tex_scr"]),
    (
        "downsample",
        &["mvp", "uvscale", "pixeluv", "tex_scr", "extent", "flip"],
    ),
    (
        "upsample",
        &["mvp", "uvscale", "pixeluv", "tex_scr", "extent", "flip"],
    ),
    ("shadow", &["mvp", "tex_scr", "flip"]),
    ("postshadow", &["mvp", "tex_scr", "noise_scr", "flip"]),
    ("colored", &["mvp", "viewport", "opacity", "color"]),
];

fn shader_type_members(name: &str) -> Option<&'static [&'static str]> {
    SHADER_TYPES
        .iter()
        .find(|(tname, _)| *tname == name)
        .map(|(_, members)| *members)
}

/// One uniform declaration from the descriptor.
#[derive(Clone, Debug)]
pub struct UniformDecl {
    pub name: String,
    pub utype: UniformType,
    /// Default from the descriptor; a uniform without one must be set
    /// before every use.
    pub stock: Option<UniformValue>,
}

/// The parsed form of a .shader descriptor file. Parsing is pure so it
/// can be exercised without a GL context.
#[derive(Clone, Debug, Default)]
pub struct ProgramDescriptor {
    pub vertex: String,
    pub fragment: String,
    pub type_name: String,
    pub attributes: Vec<(u32, String)>,
    pub uniforms: Vec<UniformDecl>,
}

fn parse_uniform_value(utype: UniformType, value: &str) -> Option<UniformValue> {
    match utype {
        UniformType::Bool => match value {
            "true" => Some(UniformValue::Bool(true)),
            "false" => Some(UniformValue::Bool(false)),
            _ => None,
        },
        UniformType::Float => value.parse::<f32>().ok().map(UniformValue::Float),
        UniformType::Vec2 => {
            let parts: Vec<f32> = value
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            match parts.as_slice() {
                [x, y] => Some(UniformValue::Vec2(Vector2::new(*x, *y))),
                _ => None,
            }
        }
        UniformType::Vec3 => {
            let parts: Vec<f32> = value
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            match parts.as_slice() {
                [x, y, z] => Some(UniformValue::Vec3(Vector3::new(*x, *y, *z))),
                _ => None,
            }
        }
        _ => None,
    }
}

impl ProgramDescriptor {
    /// Parse a descriptor file. The format is `#version 1` on the first
    /// line, then `vertex`, `fragment`, `type`, `attrib` and `uniform`
    /// directives. `#`-prefixed and blank lines are comments.
    pub fn parse(path: &str, contents: &str) -> Result<ProgramDescriptor> {
        let mut lines = contents.lines();
        match lines.next() {
            Some("#version 1") => (),
            _ => {
                return Err(LumenError::BadAsset(
                    path.to_string(),
                    "no version found at the start of file".to_string(),
                ))
            }
        }

        let mut desc = ProgramDescriptor::default();

        for line in lines {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (directive, value) = match line.split_once(char::is_whitespace) {
                Some(pair) => pair,
                None => {
                    log::error!("Wrongly formatted line \"{}\", ignoring", line);
                    continue;
                }
            };
            let value = value.trim();

            match directive {
                "vertex" => {
                    if !desc.vertex.is_empty() {
                        log::error!("Multiple vertex shader defs in {}, ignoring \"{}\"", path, line);
                        continue;
                    }
                    desc.vertex = value.to_string();
                }
                "fragment" => {
                    if !desc.fragment.is_empty() {
                        log::error!("Multiple fragment shader defs in {}, ignoring \"{}\"", path, line);
                        continue;
                    }
                    desc.fragment = value.to_string();
                }
                "type" => {
                    if !desc.type_name.is_empty() {
                        log::error!("Multiple type defs in {}, ignoring \"{}\"", path, line);
                        continue;
                    }
                    desc.type_name = value.to_string();
                }
                "attrib" => {
                    let mut fields = value.split_whitespace();
                    let index = fields.next().and_then(|f| f.parse::<u32>().ok());
                    let name = fields.next();
                    match (index, name) {
                        (Some(index), Some(name)) => {
                            if desc.attributes.iter().any(|(_, n)| n == name) {
                                log::error!("Attrib name {} redefine ignored", name);
                                continue;
                            }
                            desc.attributes.push((index, name.to_string()));
                        }
                        _ => {
                            log::error!("Couldn't parse the attrib definition \"{}\"", value);
                        }
                    }
                }
                "uniform" => {
                    let mut fields = value.splitn(3, char::is_whitespace);
                    let name = fields.next().unwrap_or("");
                    let type_str = fields.next().unwrap_or("");
                    let default = fields.next().map(|f| f.trim());

                    let utype = match type_str {
                        "bool" => UniformType::Bool,
                        "float" => UniformType::Float,
                        "sampler" => UniformType::Sampler,
                        "vec2" => UniformType::Vec2,
                        "vec3" => UniformType::Vec3,
                        "ignored" => UniformType::Ignored,
                        other => {
                            log::error!("Unknown uniform type \"{}\"", other);
                            continue;
                        }
                    };

                    let stock = match default {
                        Some(value) => {
                            let parsed = parse_uniform_value(utype, value);
                            if parsed.is_none() && utype != UniformType::Ignored {
                                log::error!("Wrongly formatted default \"{}\", ignoring", value);
                                continue;
                            }
                            parsed
                        }
                        None => None,
                    };

                    desc.uniforms.push(UniformDecl {
                        name: name.to_string(),
                        utype,
                        stock,
                    });
                }
                other => {
                    log::error!("Unknown directive \"{}\" in shader file {}, ignoring", other, path);
                }
            }
        }

        if desc.vertex.is_empty() {
            return Err(LumenError::BadAsset(
                path.to_string(),
                "vertex shader not set".to_string(),
            ));
        }
        if desc.fragment.is_empty() {
            return Err(LumenError::BadAsset(
                path.to_string(),
                "fragment shader not set".to_string(),
            ));
        }
        if desc.type_name.is_empty() {
            return Err(LumenError::BadAsset(
                path.to_string(),
                "type not set".to_string(),
            ));
        }

        Ok(desc)
    }
}

/// A compiled shader stage.
pub struct Shader {
    pub gl_shader: GLuint,
}

impl Shader {
    pub fn compile(path: &str, source: &str, kind: GLenum) -> Result<Shader> {
        unsafe {
            let shader = gl::CreateShader(kind);
            if shader == 0 {
                return Err(LumenError::AllocFailed);
            }

            let cstr = std::ffi::CString::new(source.as_bytes()).unwrap();
            gl::ShaderSource(shader, 1, &cstr.as_ptr(), std::ptr::null());
            gl::CompileShader(shader);

            let mut status: GLint = gl::FALSE as GLint;
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
            if status != gl::TRUE as GLint {
                let mut log_len: GLint = 0;
                gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut log_len);
                let mut buf = vec![0u8; log_len.max(1) as usize];
                gl::GetShaderInfoLog(shader, log_len, std::ptr::null_mut(), buf.as_mut_ptr() as *mut _);
                let message = String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string();
                gl::DeleteShader(shader);
                return Err(LumenError::ShaderCompile(path.to_string(), message));
            }

            Ok(Shader { gl_shader: shader })
        }
    }

    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteShader(self.gl_shader);
        }
        self.gl_shader = 0;
    }
}

struct Uniform {
    u_name: String,
    u_type: UniformType,
    u_location: GLint,
    u_stock: Option<UniformValue>,
    /// A value parked by a future setter, flushed on use_program
    u_staged: Option<UniformValue>,
}

pub struct ShaderProgram {
    pub gl_program: GLuint,
    p_type_name: String,
    p_uniforms: Vec<Uniform>,
    p_index: HashMap<String, usize>,
}

fn set_gl_uniform(location: GLint, value: &UniformValue) {
    unsafe {
        match value {
            UniformValue::Bool(v) => gl::Uniform1i(location, *v as i32),
            UniformValue::Float(v) => gl::Uniform1f(location, *v),
            UniformValue::Sampler(v) => gl::Uniform1i(location, *v),
            UniformValue::Vec2(v) => gl::Uniform2f(location, v.x, v.y),
            UniformValue::Vec3(v) => gl::Uniform3f(location, v.x, v.y, v.z),
        }
    }
}

impl ShaderProgram {
    /// Link a program from its descriptor and compiled stages, then
    /// resolve the reflection type: every uniform the type requires
    /// must be declared, and every declared uniform gets its location.
    pub fn link(desc: &ProgramDescriptor, vertex: &Shader, fragment: &Shader) -> Result<ShaderProgram> {
        let members = shader_type_members(&desc.type_name).ok_or_else(|| {
            LumenError::BadAsset(
                desc.type_name.clone(),
                "no shader type info for this type".to_string(),
            )
        })?;

        let gl_program = unsafe {
            let program = gl::CreateProgram();
            if program == 0 {
                return Err(LumenError::AllocFailed);
            }

            gl::AttachShader(program, fragment.gl_shader);
            gl::AttachShader(program, vertex.gl_shader);

            for (index, name) in desc.attributes.iter() {
                let cstr = std::ffi::CString::new(name.as_bytes()).unwrap();
                gl::BindAttribLocation(program, *index, cstr.as_ptr());
            }

            gl::LinkProgram(program);

            let mut status: GLint = gl::FALSE as GLint;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status != gl::TRUE as GLint {
                let mut log_len: GLint = 0;
                gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut log_len);
                let mut buf = vec![0u8; log_len.max(1) as usize];
                gl::GetProgramInfoLog(program, log_len, std::ptr::null_mut(), buf.as_mut_ptr() as *mut _);
                let message = String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string();
                gl::DeleteProgram(program);
                return Err(LumenError::ShaderLink(message));
            }
            program
        };

        let mut uniforms = Vec::new();
        let mut index = HashMap::new();
        for decl in desc.uniforms.iter() {
            let location = unsafe {
                let cstr = std::ffi::CString::new(decl.name.as_bytes()).unwrap();
                gl::GetUniformLocation(gl_program, cstr.as_ptr())
            };
            index.insert(decl.name.clone(), uniforms.len());
            uniforms.push(Uniform {
                u_name: decl.name.clone(),
                u_type: decl.utype,
                u_location: location,
                u_stock: decl.stock,
                u_staged: None,
            });
        }

        // Bind the reflection type: a member the descriptor never
        // declared is a fatal load error
        for member in members.iter() {
            if !index.contains_key(*member) {
                unsafe {
                    gl::DeleteProgram(gl_program);
                }
                return Err(LumenError::MissingUniform(
                    member.to_string(),
                    desc.type_name.clone(),
                ));
            }
        }

        Ok(ShaderProgram {
            gl_program,
            p_type_name: desc.type_name.clone(),
            p_uniforms: uniforms,
            p_index: index,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.p_type_name
    }

    fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.p_index.get(name).map(|i| &self.p_uniforms[*i])
    }

    fn uniform_mut(&mut self, name: &str) -> Option<&mut Uniform> {
        match self.p_index.get(name) {
            Some(i) => Some(&mut self.p_uniforms[*i]),
            None => None,
        }
    }

    /// Set a uniform immediately. The program must be active.
    fn set_uniform(&self, name: &str, value: UniformValue) {
        match self.uniform(name) {
            Some(uniform) => {
                debug_assert!(
                    uniform.u_type == value.type_of() || uniform.u_type == UniformType::Ignored,
                    "uniform {} set with the wrong type",
                    uniform.u_name
                );
                if uniform.u_type != UniformType::Ignored {
                    set_gl_uniform(uniform.u_location, &value);
                }
            }
            None => log::error!("No uniform \"{}\" in shader {}", name, self.p_type_name),
        }
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set_uniform(name, UniformValue::Bool(value));
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_sampler(&self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Sampler(value));
    }

    pub fn set_vec2(&self, name: &str, value: Vector2<f32>) {
        self.set_uniform(name, UniformValue::Vec2(value));
    }

    pub fn set_vec3(&self, name: &str, value: Vector3<f32>) {
        self.set_uniform(name, UniformValue::Vec3(value));
    }

    /// The mvp matrix is special-cased since it is not a scalar slot.
    pub fn set_mvp(&self, mvp: &Matrix4<f32>) {
        match self.uniform("mvp") {
            Some(uniform) => unsafe {
                let raw: &[f32; 16] = mvp.as_ref();
                gl::UniformMatrix4fv(uniform.u_location, 1, gl::FALSE, raw.as_ptr());
            },
            None => log::error!("No mvp uniform in shader {}", self.p_type_name),
        }
    }

    /// Stage a value without touching GL. Flushed by `use_program`.
    fn set_future_uniform(&mut self, name: &str, value: UniformValue) {
        let type_name = self.p_type_name.clone();
        match self.uniform_mut(name) {
            Some(uniform) => {
                debug_assert!(
                    uniform.u_type == value.type_of() || uniform.u_type == UniformType::Ignored,
                    "uniform {} staged with the wrong type",
                    uniform.u_name
                );
                uniform.u_staged = Some(value);
            }
            None => log::error!("No uniform \"{}\" in shader {}", name, type_name),
        }
    }

    pub fn set_future_bool(&mut self, name: &str, value: bool) {
        self.set_future_uniform(name, UniformValue::Bool(value));
    }

    pub fn set_future_float(&mut self, name: &str, value: f32) {
        self.set_future_uniform(name, UniformValue::Float(value));
    }

    pub fn set_future_sampler(&mut self, name: &str, value: i32) {
        self.set_future_uniform(name, UniformValue::Sampler(value));
    }

    pub fn set_future_vec2(&mut self, name: &str, value: Vector2<f32>) {
        self.set_future_uniform(name, UniformValue::Vec2(value));
    }

    pub fn set_future_vec3(&mut self, name: &str, value: Vector3<f32>) {
        self.set_future_uniform(name, UniformValue::Vec3(value));
    }

    /// Activate the program and flush every staged value, falling back
    /// to descriptor defaults for unset uniforms. Clears the staging
    /// slots afterwards.
    pub fn use_program(&mut self) {
        unsafe {
            gl::UseProgram(self.gl_program);
        }

        for uniform in self.p_uniforms.iter_mut() {
            if uniform.u_type == UniformType::Ignored {
                uniform.u_staged = None;
                continue;
            }
            if let Some(value) = uniform.u_staged.take() {
                set_gl_uniform(uniform.u_location, &value);
            } else if let Some(stock) = &uniform.u_stock {
                set_gl_uniform(uniform.u_location, stock);
            }
        }
    }

    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteProgram(self.gl_program);
        }
        self.gl_program = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: &str = "#version 1\n\
        vertex passthrough.vert\n\
        fragment global.frag\n\
        type global\n\
        attrib 0 vertex\n\
        attrib 1 uv\n\
        uniform mvp ignored\n\
        uniform flip bool false\n\
        uniform invert bool false\n\
        uniform opacity float 1.0\n\
        uniform dim float 0.0\n\
        uniform tex_scr sampler\n";

    #[test]
    fn descriptor_parses_directives() {
        let desc = ProgramDescriptor::parse("global.shader", DESC).unwrap();
        assert_eq!(desc.vertex, "passthrough.vert");
        assert_eq!(desc.fragment, "global.frag");
        assert_eq!(desc.type_name, "global");
        assert_eq!(desc.attributes.len(), 2);
        assert_eq!(desc.uniforms.len(), 6);

        let flip = desc.uniforms.iter().find(|u| u.name == "flip").unwrap();
        assert_eq!(flip.utype, UniformType::Bool);
        assert_eq!(flip.stock, Some(UniformValue::Bool(false)));

        let tex = desc.uniforms.iter().find(|u| u.name == "tex_scr").unwrap();
        assert_eq!(tex.utype, UniformType::Sampler);
        assert!(tex.stock.is_none());
    }

    #[test]
    fn descriptor_requires_version_line() {
        assert!(ProgramDescriptor::parse("x.shader", "vertex a.vert\n").is_err());
    }

    #[test]
    fn descriptor_requires_both_stages_and_type() {
        let missing_frag = "#version 1\nvertex a.vert\ntype global\n";
        assert!(ProgramDescriptor::parse("x.shader", missing_frag).is_err());

        let missing_type = "#version 1\nvertex a.vert\nfragment a.frag\n";
        assert!(ProgramDescriptor::parse("x.shader", missing_type).is_err());
    }

    #[test]
    fn vec_defaults_parse() {
        let desc = ProgramDescriptor::parse(
            "x.shader",
            "#version 1\nvertex a.vert\nfragment a.frag\ntype shadow\nuniform extent vec2 0.5,0.25\n",
        )
        .unwrap();
        let extent = &desc.uniforms[0];
        assert_eq!(
            extent.stock,
            Some(UniformValue::Vec2(Vector2::new(0.5, 0.25)))
        );
    }
}
