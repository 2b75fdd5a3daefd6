// Asset management
//
// Assets are looked up by bare name against an ordered list of search
// paths and cached by that name, so two systems asking for
// "window.face" share one upload.
use crate::face::Face;
use crate::shader::{ProgramDescriptor, Shader, ShaderProgram};
use crate::{LumenError, Result};
use utils::log;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct AssetCache {
    ac_paths: Vec<PathBuf>,
    ac_faces: HashMap<String, Rc<Face>>,
    ac_programs: HashMap<String, Rc<RefCell<ShaderProgram>>>,
}

impl AssetCache {
    pub fn new() -> AssetCache {
        AssetCache {
            ac_paths: Vec::new(),
            ac_faces: HashMap::new(),
            ac_programs: HashMap::new(),
        }
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) {
        self.ac_paths.push(path.as_ref().to_path_buf());
    }

    /// Find the first search path containing `name`.
    pub fn resolve_path(&self, name: &str) -> Option<PathBuf> {
        for base in self.ac_paths.iter() {
            let candidate = base.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn read_asset(&self, name: &str) -> Result<String> {
        let path = self
            .resolve_path(name)
            .ok_or_else(|| LumenError::NoSuchAsset(name.to_string()))?;
        Ok(std::fs::read_to_string(path)?)
    }

    pub fn load_face(&mut self, name: &str) -> Result<Rc<Face>> {
        if let Some(face) = self.ac_faces.get(name) {
            return Ok(face.clone());
        }

        let contents = self.read_asset(name)?;
        let face = Rc::new(Face::load_file(name, &contents)?);
        self.ac_faces.insert(name.to_string(), face.clone());
        Ok(face)
    }

    pub fn load_shader(&mut self, name: &str) -> Result<Rc<RefCell<ShaderProgram>>> {
        if let Some(program) = self.ac_programs.get(name) {
            return Ok(program.clone());
        }

        let contents = self.read_asset(name)?;
        let desc = ProgramDescriptor::parse(name, &contents)?;

        let vert_src = self.read_asset(&desc.vertex)?;
        let frag_src = self.read_asset(&desc.fragment)?;

        let mut vertex = Shader::compile(&desc.vertex, &vert_src, gl::VERTEX_SHADER)?;
        let mut fragment = match Shader::compile(&desc.fragment, &frag_src, gl::FRAGMENT_SHADER) {
            Ok(shader) => shader,
            Err(e) => {
                vertex.delete();
                return Err(e);
            }
        };

        let program = ShaderProgram::link(&desc, &vertex, &fragment);

        // The linked program owns the stages from here
        vertex.delete();
        fragment.delete();

        let program = Rc::new(RefCell::new(program?));
        self.ac_programs.insert(name.to_string(), program.clone());

        log::debug!("Loaded shader \"{}\"", name);
        Ok(program)
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the XDG asset locations: `$XDG_CONFIG_HOME/neocomp/assets/`
/// first, then every `$XDG_CONFIG_DIRS` entry with the same suffix
/// (default `/etc/xdg/`).
pub fn add_xdg_asset_paths(cache: &mut AssetCache) {
    const APP_SUFFIX: &str = "neocomp/assets/";

    match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => {
            cache.add_path(Path::new(&dir).join(APP_SUFFIX));
        }
        _ => {
            if let Ok(home) = std::env::var("HOME") {
                cache.add_path(Path::new(&home).join(".config").join(APP_SUFFIX));
            }
        }
    }

    let conf_dirs = std::env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| "/etc/xdg/".to_string());
    for part in conf_dirs.split(':') {
        if part.is_empty() {
            continue;
        }
        cache.add_path(Path::new(part).join(APP_SUFFIX));
    }
}
