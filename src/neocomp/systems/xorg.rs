// Composite redirection
//
// Mapping a window starts redirecting it into its offscreen pixmap;
// unmapping or bypassing stops. Redirection state is tracked with the
// Redirected component so we never issue double requests.
use crate::neocomp::windows::{WinList, CK};
use crate::neocomp::xorg::X11Context;

use swiss::{Query, QueryCursor};

fn unredirect(list: &mut WinList, xcontext: &X11Context, query: Query) {
    let mut cursor = QueryCursor::new(query.clone());
    while let Some(id) = cursor.next(&list.em) {
        let xid = list.tracks_window.get(id).unwrap().xid;
        xcontext.unredirect_window(xid);
    }
    list.em.remove_where(CK::Redirected, &query);
}

pub fn tick(list: &mut WinList, xcontext: &X11Context) {
    // Mapping a window causes us to start redirecting it
    list.em.ensure_where(
        CK::Redirected,
        &Query::new()
            .has(CK::Map)
            .has(CK::TracksWindow)
            .not(CK::Bypass),
    );

    let mut cursor = QueryCursor::new(
        Query::new()
            .has(CK::Map)
            .has(CK::TracksWindow)
            .has(CK::Redirected),
    );
    while let Some(id) = cursor.next(&list.em) {
        let xid = list.tracks_window.get(id).unwrap().xid;
        xcontext.redirect_window(xid);
    }

    // Unmapped and bypassed windows stop being composited
    unredirect(
        list,
        xcontext,
        Query::new()
            .has(CK::Unmap)
            .has(CK::TracksWindow)
            .has(CK::Redirected),
    );
    unredirect(
        list,
        xcontext,
        Query::new()
            .has(CK::Bypass)
            .has(CK::TracksWindow)
            .has(CK::Redirected),
    );
}
