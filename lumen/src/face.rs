// Face meshes: a position VBO + uv VBO pair
//
// Faces come either from a .face asset file or are built procedurally
// from a shaped window's rectangle list. Coordinates are normalized to
// the unit square, y-up, with the uv channel mirroring positions.
use crate::{LumenError, Result};
use utils::log;
use utils::region::Rect;

use gl::types::GLuint;

pub struct Face {
    pub gl_vertex: GLuint,
    pub gl_uv: GLuint,
    /// Number of vertices to draw
    pub vertex_count: usize,

    f_vertex_buffer: Vec<f32>,
    f_uv_buffer: Vec<f32>,
}

impl Face {
    fn empty() -> Face {
        Face {
            gl_vertex: 0,
            gl_uv: 0,
            vertex_count: 0,
            f_vertex_buffer: Vec::new(),
            f_uv_buffer: Vec::new(),
        }
    }

    /// Load a face from its descriptor file.
    ///
    /// The format is `#version 1`, then `vc <count>` followed by `count`
    /// `v <x> <y> <z>` lines, then `vtc <count>` followed by `count`
    /// `vt <u> <v>` lines. `#`-prefixed and blank lines are comments.
    pub fn load_file(path: &str, contents: &str) -> Result<Face> {
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

        let mut face = Face::empty();
        let mut pending: Option<(&str, usize)> = None;

        for line in lines {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let directive = fields.next().unwrap();

            if let Some((kind, mut remaining)) = pending.take() {
                // Inside a vertex block; every line must be the matching
                // element type until the count runs out
                let expected = if kind == "vc" { "v" } else { "vt" };
                if directive == expected && remaining > 0 {
                    let values: Vec<f32> =
                        fields.filter_map(|f| f.parse::<f32>().ok()).collect();
                    let needed = if kind == "vc" { 3 } else { 2 };
                    if values.len() != needed {
                        log::error!("Wrongly formatted line \"{}\", ignoring", line);
                    } else if kind == "vc" {
                        face.f_vertex_buffer.extend_from_slice(&values);
                    } else {
                        face.f_uv_buffer.extend_from_slice(&values);
                    }
                    remaining -= 1;
                    if remaining > 0 {
                        pending = Some((kind, remaining));
                    }
                    continue;
                }
                // Fall through and treat this as a new directive
            }

            match directive {
                "vc" => {
                    let count: usize = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| {
                            LumenError::BadAsset(path.to_string(), "bad vc count".to_string())
                        })?;
                    pending = Some(("vc", count));
                }
                "vtc" => {
                    let count: usize = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| {
                            LumenError::BadAsset(path.to_string(), "bad vtc count".to_string())
                        })?;
                    pending = Some(("vtc", count));
                }
                _ => {
                    log::error!("Unknown directive \"{}\" in face file {}, ignoring", line, path);
                }
            }
        }

        if face.f_vertex_buffer.len() / 3 != face.f_uv_buffer.len() / 2 {
            return Err(LumenError::BadAsset(
                path.to_string(),
                "vertex and uv counts disagree".to_string(),
            ));
        }

        face.vertex_count = face.f_vertex_buffer.len() / 3;
        face.upload();
        Ok(face)
    }

    /// Build a face covering a list of normalized sub-rectangles, two
    /// triangles per rect. This is what shaped windows render with.
    pub fn from_rects(rects: &[Rect<f32>]) -> Face {
        let mut face = Face::empty();
        let (vertices, uvs) = build_rect_buffers(rects);
        face.f_vertex_buffer = vertices;
        face.f_uv_buffer = uvs;
        face.vertex_count = face.f_vertex_buffer.len() / 3;
        face.upload();
        face
    }

    fn upload(&mut self) {
        unsafe {
            gl::GenBuffers(1, &mut self.gl_vertex);
            gl::GenBuffers(1, &mut self.gl_uv);

            gl::BindBuffer(gl::ARRAY_BUFFER, self.gl_vertex);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                (std::mem::size_of::<f32>() * self.f_vertex_buffer.len()) as isize,
                self.f_vertex_buffer.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );

            gl::BindBuffer(gl::ARRAY_BUFFER, self.gl_uv);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                (std::mem::size_of::<f32>() * self.f_uv_buffer.len()) as isize,
                self.f_uv_buffer.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );
        }
    }

    pub fn delete(&mut self) {
        unsafe {
            gl::DeleteBuffers(1, &self.gl_vertex);
            gl::DeleteBuffers(1, &self.gl_uv);
        }
        self.gl_vertex = 0;
        self.gl_uv = 0;
    }
}

/// Two triangles per rect, with uvs mirroring positions. Rect positions
/// are upper-left corners in a y-up space.
fn build_rect_buffers(rects: &[Rect<f32>]) -> (Vec<f32>, Vec<f32>) {
    let mut vertices = Vec::with_capacity(rects.len() * 6 * 3);
    let mut uvs = Vec::with_capacity(rects.len() * 6 * 2);

    for rect in rects.iter() {
        let (x, y) = rect.r_pos;
        let (w, h) = rect.r_size;

        let corners = [
            (x, y),
            (x, y - h),
            (x + w, y),
            (x + w, y),
            (x, y - h),
            (x + w, y - h),
        ];
        for (cx, cy) in corners.iter() {
            vertices.extend_from_slice(&[*cx, *cy, 0.0]);
            uvs.extend_from_slice(&[*cx, *cy]);
        }
    }

    (vertices, uvs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rects_produce_six_vertices_each() {
        let rects = [
            Rect::new(0.0, 1.0, 0.5, 0.5),
            Rect::new(0.5, 0.5, 0.5, 0.5),
        ];
        let (vertices, uvs) = build_rect_buffers(&rects);

        assert_eq!(vertices.len(), 2 * 6 * 3);
        assert_eq!(uvs.len(), 2 * 6 * 2);
        // First corner of the first rect is its upper left
        assert_eq!(&vertices[0..3], &[0.0, 1.0, 0.0]);
        // Last corner of the first rect is its lower right
        assert_eq!(&vertices[15..18], &[0.5, 0.5, 0.0]);
    }
}
