// Bounding shape tracking
//
// A shape-damaged window has its bounding region refetched, converted
// into window-normalized rectangles and rebuilt into a face. The
// conversion flips into the y-up space the render passes use and
// corrects for X treating borders as outside the window.
use crate::neocomp::windows::{Shaped, WinList, CK};
use crate::neocomp::xorg::X11Context;
use utils::log;
use utils::region::Rect;

use cgmath::Vector2;
use lumen::face::Face;
use swiss::{Query, QueryCursor};

/// Convert X rectangles into normalized window-space rects. `extents`
/// is the bordered window size and `offset` the border correction (X
/// reports bounding shapes with a negative upper left on bordered
/// windows).
pub fn convert_xrects(
    rects: &[(i16, i16, u16, u16)],
    extents: Vector2<f32>,
    offset: Vector2<f32>,
) -> Vec<Rect<f32>> {
    rects
        .iter()
        .map(|(x, y, width, height)| {
            let pos_x = (*x as f32 - offset.x) / extents.x;
            let pos_y = (extents.y - (*y as f32 - offset.y)) / extents.y;
            Rect::new(
                pos_x,
                pos_y,
                *width as f32 / extents.x,
                *height as f32 / extents.y,
            )
        })
        .collect()
}

pub fn tick(list: &mut WinList, xcontext: &X11Context) {
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Physical)
            .has(CK::TracksWindow)
            .has(CK::ShapeDamaged),
    );
    while let Some(id) = cursor.next(&list.em) {
        let xid = list.tracks_window.get(id).unwrap().xid;

        let attribs = match crate::neocomp::xorg::events::XOps::get_attributes(xcontext, xid) {
            Some(attribs) => attribs,
            None => {
                log::error!("Failed getting window attributes while shaping");
                list.em.remove_component(CK::ShapeDamaged, id);
                continue;
            }
        };

        let border = attribs.border as f32;
        let extents = Vector2::new(
            attribs.width as f32 + border * 2.0,
            attribs.height as f32 + border * 2.0,
        );
        let offset = Vector2::new(-border, -border);

        let xrects = match xcontext.fetch_shape_rects(xid) {
            Some(xrects) => xrects,
            None => {
                list.em.remove_component(CK::ShapeDamaged, id);
                continue;
            }
        };

        let rects = convert_xrects(&xrects, extents, offset);
        let face = Face::from_rects(&rects);

        if let Some(mut old) = list.shaped.take(id) {
            old.face.delete();
        }
        list.em.ensure(CK::Shaped, id);
        list.shaped.set(id, Shaped { rects, face });

        // A changed shape invalidates the shadow silhouette
        list.em.ensure(CK::ShadowDamaged, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rects_normalize_into_the_unit_square() {
        let extents = Vector2::new(200.0, 100.0);
        let offset = Vector2::new(0.0, 0.0);

        let rects = convert_xrects(&[(0, 0, 200, 100)], extents, offset);
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].r_pos, (0.0, 1.0));
        assert_eq!(rects[0].r_size, (1.0, 1.0));
    }

    #[test]
    fn border_offset_is_corrected() {
        // A 2px border makes X report the shape at (-2, -2)
        let extents = Vector2::new(104.0, 104.0);
        let offset = Vector2::new(-2.0, -2.0);

        let rects = convert_xrects(&[(-2, -2, 104, 104)], extents, offset);
        assert_eq!(rects[0].r_pos, (0.0, 1.0));
        assert_eq!(rects[0].r_size, (1.0, 1.0));
    }

    #[test]
    fn sub_rectangles_cover_their_region() {
        let extents = Vector2::new(100.0, 100.0);
        let offset = Vector2::new(0.0, 0.0);

        // Two horizontal strips
        let rects = convert_xrects(
            &[(0, 0, 100, 50), (0, 50, 100, 50)],
            extents,
            offset,
        );
        assert_eq!(rects[0].r_pos, (0.0, 1.0));
        assert_eq!(rects[0].r_size, (1.0, 0.5));
        assert_eq!(rects[1].r_pos, (0.0, 0.5));
        assert_eq!(rects[1].r_size, (1.0, 0.5));
    }
}
