// EWMH window types
//
// The order is significant: it is the numeric tag stored in the Mud
// component and the index into every per-wintype option table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum WinType {
    Unknown = 0,
    Desktop,
    Dock,
    Toolbar,
    Menu,
    Utility,
    Splash,
    Dialog,
    Normal,
    DropdownMenu,
    PopupMenu,
    Tooltip,
    Notify,
    Combo,
    Dnd,
}

pub const NUM_WINTYPES: usize = WinType::Dnd as usize + 1;

pub const WINTYPES: [&str; NUM_WINTYPES] = [
    "unknown",
    "desktop",
    "dock",
    "toolbar",
    "menu",
    "utility",
    "splash",
    "dialog",
    "normal",
    "dropdown_menu",
    "popup_menu",
    "tooltip",
    "notify",
    "combo",
    "dnd",
];

impl WinType {
    pub fn name(&self) -> &'static str {
        WINTYPES[*self as usize]
    }

    pub fn from_index(index: usize) -> Option<WinType> {
        if index >= NUM_WINTYPES {
            return None;
        }
        // repr(usize) with a dense range
        Some(unsafe { std::mem::transmute(index) })
    }

    pub fn from_name(name: &str) -> Option<WinType> {
        WINTYPES
            .iter()
            .position(|n| *n == name)
            .and_then(WinType::from_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for index in 0..NUM_WINTYPES {
            let wintype = WinType::from_index(index).unwrap();
            assert_eq!(WinType::from_name(wintype.name()), Some(wintype));
        }
    }
}
