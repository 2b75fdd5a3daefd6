// Opacity, background opacity and dim
//
// Focus changes resolve per-window targets from the wintype override,
// the inactive settings and the active settings, schedule keyframes on
// the fading components and raise Transitioning. Once fades have
// advanced, the results are committed back into the value components,
// with "component absent" meaning fully opaque.
use crate::neocomp::config::Options;
use crate::neocomp::windows::{Scalar, Transitioning, WinList, WindowState, CK};

use swiss::{EntityId, Query, QueryCursor};

/// Resolve the target opacity and dim for every window with a pending
/// focus change.
pub fn calculate_window_opacity(list: &mut WinList, options: &Options, active: Option<EntityId>) {
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Mud)
            .has(CK::FocusChange)
            .has(CK::Stateful),
    );
    while let Some(id) = cursor.next(&list.em) {
        let window_type = list.mud.get(id).unwrap().window_type;
        let state = list.state(id).unwrap();
        let focus = list.focus_change.get_mut(id).unwrap();

        // Try obeying window type opacity
        let override_opacity = options.wintype_opacity[window_type as usize];
        if override_opacity != -1.0 {
            focus.new_opacity = override_opacity;
            focus.new_dim = 100.0;
            continue;
        }

        focus.new_opacity = 100.0;
        focus.new_dim = 100.0;

        // Respect inactive_opacity in some cases
        if state == WindowState::Deactivating || state == WindowState::Inactive {
            focus.new_opacity = options.inactive_opacity;
            focus.new_dim = options.inactive_dim;
            continue;
        }

        // Respect active_opacity only when the window holds the focus
        if options.active_opacity > 0.0 && active == Some(id) {
            focus.new_opacity = options.active_opacity;
            focus.new_dim = 100.0;
        }
    }
}

/// Apply an opacity rule match on top of the focus resolution. The
/// rule data is the target percentage.
pub fn apply_opacity_rule(list: &mut WinList, id: EntityId, opacity: f64) {
    if let Some(focus) = list.focus_change.get_mut(id) {
        focus.new_opacity = opacity;
    }
}

/// Schedule fades toward the resolved targets.
pub fn schedule_fades(list: &mut WinList, options: &Options) {
    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::FocusChange)
            .has(CK::FadesOpacity)
            .has(CK::FadesDim),
    );
    while let Some(id) = cursor.next(&list.em) {
        let focus = *list.focus_change.get(id).unwrap();
        let fade_disabled = !list.mud.get(id).map(|m| m.fade).unwrap_or(true);

        let opacity_time = if fade_disabled { 0.0 } else { options.opacity_fade_time };
        let dim_time = if fade_disabled { 0.0 } else { options.dim_fade_time };

        list.fades_opacity
            .get_mut(id)
            .unwrap()
            .fade
            .keyframe(focus.new_opacity, opacity_time);
        list.fades_dim
            .get_mut(id)
            .unwrap()
            .fade
            .keyframe(focus.new_dim, dim_time);

        list.em.ensure(CK::Transitioning, id);
        list.transitioning.set(
            id,
            Transitioning {
                time: 0.0,
                duration: opacity_time.max(dim_time),
            },
        );
    }
}

/// Unmapping and destruction fade everything out.
pub fn commit_unmap(list: &mut WinList, options: &Options) {
    for intent in [CK::Unmap, CK::Destroy] {
        let mut cursor = QueryCursor::new(Query::new().has(intent).has(CK::FadesOpacity));
        while let Some(id) = cursor.next(&list.em) {
            list.fades_opacity
                .get_mut(id)
                .unwrap()
                .fade
                .keyframe(0.0, options.opacity_fade_time);
        }

        let mut cursor = QueryCursor::new(Query::new().has(intent).has(CK::FadesBgOpacity));
        while let Some(id) = cursor.next(&list.em) {
            list.fades_bgopacity
                .get_mut(id)
                .unwrap()
                .fade
                .keyframe(0.0, options.bg_opacity_fade_time);
        }

        let mut cursor = QueryCursor::new(Query::new().has(intent));
        while let Some(id) = cursor.next(&list.em) {
            list.em.ensure(CK::Transitioning, id);
            list.transitioning.set(
                id,
                Transitioning {
                    time: 0.0,
                    duration: options
                        .opacity_fade_time
                        .max(options.bg_opacity_fade_time),
                },
            );
        }
    }
}

/// Advance every fade and clear Transitioning on entities whose fades
/// have run out.
pub fn tick_fades(list: &mut WinList, dt: f64) {
    for (kind, table) in [
        (CK::FadesOpacity, &mut list.fades_opacity),
        (CK::FadesBgOpacity, &mut list.fades_bgopacity),
        (CK::FadesDim, &mut list.fades_dim),
    ] {
        let mut cursor = QueryCursor::new(Query::new().has(kind));
        while let Some(id) = cursor.next(&list.em) {
            table.get_mut(id).unwrap().fade.tick(dt);
        }
    }

    let mut cursor = QueryCursor::new(Query::new().has(CK::Transitioning));
    while let Some(id) = cursor.next(&list.em) {
        let transitioning = list.transitioning.get_mut(id).unwrap();
        transitioning.time += dt;
        if transitioning.time >= transitioning.duration {
            list.em.remove_component(CK::Transitioning, id);
        }
    }
}

fn commit_one(
    list: &mut WinList,
    fades_kind: CK,
    value_kind: CK,
) {
    // Fading below 100 materializes the value component
    let mut cursor = QueryCursor::new(Query::new().has(fades_kind));
    while let Some(id) = cursor.next(&list.em) {
        let value = match fades_kind {
            CK::FadesOpacity => list.fades_opacity.get(id).unwrap().fade.value,
            CK::FadesBgOpacity => list.fades_bgopacity.get(id).unwrap().fade.value,
            _ => list.fades_dim.get(id).unwrap().fade.value,
        };

        if value < 100.0 {
            list.em.ensure(value_kind, id);
        }

        if list.em.has(value_kind, id) {
            match value_kind {
                CK::Opacity => list.opacity.set(id, Scalar { value }),
                CK::BgOpacity => list.bgopacity.set(id, Scalar { value }),
                _ => list.dim.set(id, Scalar { value }),
            }
        }
    }

    // Back at 100 the component disappears again, and the renderer
    // takes the opaque fast path
    let mut cursor = QueryCursor::new(Query::new().has(value_kind));
    while let Some(id) = cursor.next(&list.em) {
        let value = match value_kind {
            CK::Opacity => list.opacity.get(id).unwrap().value,
            CK::BgOpacity => list.bgopacity.get(id).unwrap().value,
            _ => list.dim.get(id).unwrap().value,
        };
        if value >= 100.0 {
            list.em.remove_component(value_kind, id);
        }
    }
}

/// Write fade results into the value components.
pub fn commit_fades(list: &mut WinList) {
    commit_one(list, CK::FadesOpacity, CK::Opacity);
    commit_one(list, CK::FadesBgOpacity, CK::BgOpacity);
    commit_one(list, CK::FadesDim, CK::Dim);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neocomp::fade::Fade;
    use crate::neocomp::windows::{Fading, FocusChange, Mud, Stateful};
    use crate::neocomp::wintypes::WinType;

    fn window(list: &mut WinList, state: WindowState) -> EntityId {
        let id = list.em.allocate();
        list.em.add(CK::Mud, id);
        list.mud.set(id, Mud::new(0x100));
        list.em.add(CK::Stateful, id);
        list.stateful.set(id, Stateful { state });
        list.em.add(CK::FadesOpacity, id);
        list.fades_opacity.set(id, Fading { fade: Fade::new(100.0) });
        list.em.add(CK::FadesBgOpacity, id);
        list.fades_bgopacity.set(id, Fading { fade: Fade::new(100.0) });
        list.em.add(CK::FadesDim, id);
        list.fades_dim.set(id, Fading { fade: Fade::new(100.0) });
        list.em.add(CK::FocusChange, id);
        list.focus_change.set(
            id,
            FocusChange {
                new_opacity: 100.0,
                new_dim: 100.0,
            },
        );
        id
    }

    fn options() -> Options {
        let mut options = Options::default();
        options.inactive_opacity = 80.0;
        options.inactive_dim = 70.0;
        options.opacity_fade_time = 100.0;
        options.dim_fade_time = 100.0;
        options
    }

    #[test]
    fn inactive_windows_take_the_inactive_targets() {
        let mut list = WinList::new();
        let options = options();
        let id = window(&mut list, WindowState::Inactive);

        calculate_window_opacity(&mut list, &options, None);
        let focus = list.focus_change.get(id).unwrap();
        assert_eq!(focus.new_opacity, 80.0);
        assert_eq!(focus.new_dim, 70.0);
    }

    #[test]
    fn wintype_override_beats_everything() {
        let mut list = WinList::new();
        let mut options = options();
        options.wintype_opacity[WinType::Dock as usize] = 55.0;
        let id = window(&mut list, WindowState::Inactive);
        list.mud.get_mut(id).unwrap().window_type = WinType::Dock;

        calculate_window_opacity(&mut list, &options, None);
        let focus = list.focus_change.get(id).unwrap();
        assert_eq!(focus.new_opacity, 55.0);
        assert_eq!(focus.new_dim, 100.0);
    }

    #[test]
    fn active_opacity_applies_to_the_focused_window() {
        let mut list = WinList::new();
        let mut options = options();
        options.active_opacity = 95.0;
        let id = window(&mut list, WindowState::Active);

        calculate_window_opacity(&mut list, &options, Some(id));
        assert_eq!(list.focus_change.get(id).unwrap().new_opacity, 95.0);
    }

    #[test]
    fn scheduling_raises_transitioning_with_the_longest_duration() {
        let mut list = WinList::new();
        let mut options = options();
        options.opacity_fade_time = 100.0;
        options.dim_fade_time = 250.0;
        let id = window(&mut list, WindowState::Inactive);

        calculate_window_opacity(&mut list, &options, None);
        schedule_fades(&mut list, &options);

        assert!(list.em.has(CK::Transitioning, id));
        assert_eq!(list.transitioning.get(id).unwrap().duration, 250.0);
    }

    #[test]
    fn commit_materializes_and_removes_the_opacity_component() {
        let mut list = WinList::new();
        let options = options();
        let id = window(&mut list, WindowState::Inactive);

        calculate_window_opacity(&mut list, &options, None);
        schedule_fades(&mut list, &options);

        // Halfway: the component exists with the animated value
        tick_fades(&mut list, 50.0);
        commit_fades(&mut list);
        assert!(list.em.has(CK::Opacity, id));
        let halfway = list.opacity.get(id).unwrap().value;
        assert!(halfway > 80.0 && halfway < 100.0);

        // Fade back up to 100 and the component goes away
        list.fades_opacity
            .get_mut(id)
            .unwrap()
            .fade
            .keyframe(100.0, 0.0);
        tick_fades(&mut list, 50.0);
        commit_fades(&mut list);
        assert!(!list.em.has(CK::Opacity, id));
    }

    #[test]
    fn opacity_rule_overrides_the_resolved_target() {
        let mut list = WinList::new();
        let options = options();
        let id = window(&mut list, WindowState::Active);

        calculate_window_opacity(&mut list, &options, None);
        apply_opacity_rule(&mut list, id, 50.0);
        schedule_fades(&mut list, &options);

        assert_eq!(
            list.fades_opacity.get(id).unwrap().fade.target(),
            50.0
        );
    }
}
