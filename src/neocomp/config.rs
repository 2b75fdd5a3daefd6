// Program options
//
// Every knob the CLI surface exposes lives on Options, including the
// per-wintype tables and the six rule lists. Configuration files are
// discovered here following the XDG search order; their parsing is the
// config collaborator's job, so --config currently only pins the
// discovery result.
use crate::neocomp::rules::{RuleList, TrackingFlags};
use crate::neocomp::wintypes::NUM_WINTYPES;
use utils::log;

use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VsyncMode {
    None,
    OpenGlSwc,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GlxSwapMethod {
    Undefined,
    Copy,
    Exchange,
    Buffer3,
    Buffer4,
    Buffer5,
    Buffer6,
    BufferAge,
}

pub struct Options {
    /// The configuration file we used, if any was found.
    pub config_file: Option<PathBuf>,
    /// Which display to manage; None means $DISPLAY.
    pub display: Option<String>,
    /// Blur level: the number of dual-Kawase halving passes.
    pub blur_level: u32,
    /// Number of cycles to paint in benchmark mode. 0 for disabled.
    pub benchmark: u32,
    /// Window to repaint in benchmark mode; 0 repaints the screen.
    pub benchmark_wid: u32,

    /// Shadow setting for window types.
    pub wintype_shadow: [bool; NUM_WINTYPES],
    /// Fade setting for window types.
    pub wintype_fade: [bool; NUM_WINTYPES],
    /// Windows of these types count as always focused.
    pub wintype_focus: [bool; NUM_WINTYPES],
    /// Per-wintype opacity override; -1 leaves the window alone.
    pub wintype_opacity: [f64; NUM_WINTYPES],

    /// Opacity for inactive windows, 0-100.
    pub inactive_opacity: f64,
    /// Opacity for the active window; 0 disables the override.
    pub active_opacity: f64,
    pub opacity_fade_time: f64,
    pub bg_opacity_fade_time: f64,

    /// Whether to blur the background of translucent windows.
    pub blur_background: bool,
    /// Blur even when the frame is opaque.
    pub blur_background_frame: bool,
    /// Brightness of inactive windows, 0-100; 100 leaves them alone.
    pub inactive_dim: f64,
    pub dim_fade_time: f64,
    /// Use a fixed dim opacity instead of scaling by window opacity.
    pub inactive_dim_fixed: bool,

    pub vsync: VsyncMode,
    pub glx_swap_method: GlxSwapMethod,

    pub shadow_exclude: RuleList,
    pub fade_exclude: RuleList,
    pub focus_exclude: RuleList,
    pub invert_color_include: RuleList,
    pub blur_background_exclude: RuleList,
    pub opacity_rules: RuleList,

    /// Tracking the parsed rules require.
    pub tracking: TrackingFlags,

    pub show_all_xerrors: bool,
    pub fork_after_register: bool,
    pub synchronize: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            config_file: None,
            display: None,
            blur_level: 3,
            benchmark: 0,
            benchmark_wid: 0,
            wintype_shadow: [false; NUM_WINTYPES],
            wintype_fade: [false; NUM_WINTYPES],
            wintype_focus: [false; NUM_WINTYPES],
            wintype_opacity: [-1.0; NUM_WINTYPES],
            inactive_opacity: 100.0,
            active_opacity: 0.0,
            opacity_fade_time: 120.0,
            bg_opacity_fade_time: 120.0,
            blur_background: false,
            blur_background_frame: false,
            inactive_dim: 100.0,
            dim_fade_time: 120.0,
            inactive_dim_fixed: false,
            vsync: VsyncMode::OpenGlSwc,
            glx_swap_method: GlxSwapMethod::Undefined,
            shadow_exclude: RuleList::new(),
            fade_exclude: RuleList::new(),
            focus_exclude: RuleList::new(),
            invert_color_include: RuleList::new(),
            blur_background_exclude: RuleList::new(),
            opacity_rules: RuleList::new(),
            tracking: TrackingFlags::default(),
            show_all_xerrors: false,
            fork_after_register: false,
            synchronize: false,
        }
    }
}

const USAGE: &str = "neocomp
usage: neocomp [options]
Options:

-d display
  Which display should be managed.

-o opacity
  The translucency for shadows. (default .75)

-I fade-in-step
  Opacity change between steps while fading in. (default 0.028)

-O fade-out-step
  Opacity change between steps while fading out. (default 0.03)

-D fade-delta-time
  The time between steps in a fade in milliseconds. (default 10)

-c
  Enable client-side shadows on windows.

-C
  Avoid drawing shadows on dock/panel windows.

-f
  Fade windows in/out when opening/closing and when opacity changes.

-i opacity
  Opacity of inactive windows. (0.1 - 1.0)

-G
  Don't draw shadows on DND windows.

-b
  Daemonize process.

-S
  Enable synchronous operation (for debugging).

--show-all-xerrors
  Show all X errors (for debugging).

--config path
  Look for configuration file at the path.

--inactive-dim value
  Dim inactive windows. (0.0 - 1.0)

--active-opacity opacity
  Default opacity for active windows. (0.0 - 1.0)

--opacity-fade-time time
  Time a change of window opacity takes, in milliseconds.

--bg-opacity-fade-time time
  Time a change of background opacity takes, in milliseconds.

--dim-fade-time time
  Time a change of dim takes, in milliseconds.

--shadow-exclude condition
  Exclude conditions for shadows.

--fade-exclude condition
  Exclude conditions for fading.

--focus-exclude condition
  Specify a list of conditions of windows that should always be
  considered focused.

--invert-color-include condition
  Specify a list of conditions of windows that should be painted with
  inverted color.

--blur-background
  Blur background of semi-transparent / ARGB windows.

--blur-background-exclude condition
  Exclude conditions for background blur.

--blur-level level
  The strength of the blur. (default 3)

--opacity-rule opacity:condition
  Specify a list of opacity rules, in the format \"PERCENT:PATTERN\".

--vsync mode
  none or opengl-swc.

--glx-swap-method undefined/copy/exchange/3/4/5/6/buffer-age
  GLX buffer swap method we assume.

--benchmark cycles
  Benchmark mode. Repeatedly paint until reaching the specified cycles.

--benchmark-wid window-id
  Specify window ID to repaint in benchmark mode.
";

pub fn usage() {
    print!("{}", USAGE);
}

fn wintype_arr_enable(arr: &mut [bool; NUM_WINTYPES]) {
    for entry in arr.iter_mut() {
        *entry = true;
    }
}

/// Parse an opacity rule of the shape "INT:PREDICATE", INT in [0,100].
fn parse_rule_opacity(options: &mut Options, source: &str) -> Result<(), String> {
    let (number, pattern) = source
        .split_once(':')
        .ok_or_else(|| format!("(\"{}\"): Opacity terminator not found.", source))?;
    let value: i64 = number
        .trim()
        .parse()
        .map_err(|_| format!("(\"{}\"): No opacity specified?", source))?;
    if !(0..=100).contains(&value) {
        return Err(format!("(\"{}\"): Opacity {} invalid.", source, value));
    }

    options
        .opacity_rules
        .parse_add(pattern, value, &mut options.tracking)
}

fn parse_vsync(value: &str) -> Result<VsyncMode, String> {
    match value {
        "none" => Ok(VsyncMode::None),
        "opengl-swc" => Ok(VsyncMode::OpenGlSwc),
        other => Err(format!("Invalid vsync argument: {}", other)),
    }
}

fn parse_glx_swap_method(value: &str) -> Result<GlxSwapMethod, String> {
    match value {
        "undefined" | "0" => Ok(GlxSwapMethod::Undefined),
        "copy" | "1" => Ok(GlxSwapMethod::Copy),
        "exchange" | "2" => Ok(GlxSwapMethod::Exchange),
        "3" => Ok(GlxSwapMethod::Buffer3),
        "4" => Ok(GlxSwapMethod::Buffer4),
        "5" => Ok(GlxSwapMethod::Buffer5),
        "6" => Ok(GlxSwapMethod::Buffer6),
        "buffer-age" | "-1" => Ok(GlxSwapMethod::BufferAge),
        other => Err(format!("Invalid glx-swap-method argument: {}", other)),
    }
}

/// Follow the XDG search order for the configuration file: --config,
/// $XDG_CONFIG_HOME, $HOME, each $XDG_CONFIG_DIRS entry, /etc/xdg.
pub fn find_config_file(explicit: Option<&str>) -> Option<PathBuf> {
    const CONFIG_FILENAME: &str = "compton.conf";

    if let Some(path) = explicit {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
        return None;
    }

    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.is_empty() {
            let path = PathBuf::from(dir).join(CONFIG_FILENAME);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            let path = PathBuf::from(&home)
                .join(".config")
                .join(CONFIG_FILENAME);
            if path.is_file() {
                return Some(path);
            }
            let legacy = PathBuf::from(&home).join(".compton.conf");
            if legacy.is_file() {
                return Some(legacy);
            }
        }
    }

    let dirs = std::env::var("XDG_CONFIG_DIRS").unwrap_or_else(|_| "/etc/xdg".to_string());
    for part in dirs.split(':') {
        if part.is_empty() {
            continue;
        }
        let path = PathBuf::from(part).join(CONFIG_FILENAME);
        if path.is_file() {
            return Some(path);
        }
    }

    None
}

/// Parse the command line. Errors exit the process, matching the CLI
/// contract of failing loudly on malformed rules.
pub fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.peekable();
    let mut explicit_config: Option<String> = None;

    fn take_value<I: Iterator<Item = String>>(
        args: &mut std::iter::Peekable<I>,
        flag: &str,
    ) -> Result<String, String> {
        args.next()
            .ok_or_else(|| format!("{} requires an argument", flag))
    }

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-d" => options.display = Some(take_value(&mut args, "-d")?),
            "-i" => {
                let value: f64 = take_value(&mut args, "-i")?
                    .parse()
                    .map_err(|_| "-i expects a number".to_string())?;
                options.inactive_opacity = (value.clamp(0.0, 1.0)) * 100.0;
            }
            "-c" => wintype_arr_enable(&mut options.wintype_shadow),
            "-C" => {
                options.wintype_shadow[crate::neocomp::wintypes::WinType::Dock as usize] = false;
            }
            "-G" => {
                options.wintype_shadow[crate::neocomp::wintypes::WinType::Dnd as usize] = false;
            }
            "-f" | "-F" => wintype_arr_enable(&mut options.wintype_fade),
            "-b" => options.fork_after_register = true,
            "-S" => options.synchronize = true,
            "-o" | "-l" | "-t" | "-I" | "-O" | "-D" | "-m" => {
                // Legacy shadow/fade step options are accepted and
                // ignored; the keyframe animator supersedes them
                let _ = take_value(&mut args, &arg)?;
            }
            "-z" => (),
            "--show-all-xerrors" => options.show_all_xerrors = true,
            "--config" => explicit_config = Some(take_value(&mut args, "--config")?),
            "--inactive-dim" => {
                let value: f64 = take_value(&mut args, "--inactive-dim")?
                    .parse()
                    .map_err(|_| "--inactive-dim expects a number".to_string())?;
                options.inactive_dim = 100.0 - value.clamp(0.0, 1.0) * 100.0;
            }
            "--active-opacity" => {
                let value: f64 = take_value(&mut args, "--active-opacity")?
                    .parse()
                    .map_err(|_| "--active-opacity expects a number".to_string())?;
                options.active_opacity = value.clamp(0.0, 1.0) * 100.0;
            }
            "--opacity-fade-time" => {
                options.opacity_fade_time = take_value(&mut args, "--opacity-fade-time")?
                    .parse()
                    .map_err(|_| "--opacity-fade-time expects a number".to_string())?;
            }
            "--bg-opacity-fade-time" => {
                options.bg_opacity_fade_time =
                    take_value(&mut args, "--bg-opacity-fade-time")?
                        .parse()
                        .map_err(|_| "--bg-opacity-fade-time expects a number".to_string())?;
            }
            "--dim-fade-time" => {
                options.dim_fade_time = take_value(&mut args, "--dim-fade-time")?
                    .parse()
                    .map_err(|_| "--dim-fade-time expects a number".to_string())?;
            }
            "--shadow-exclude" => {
                let pattern = take_value(&mut args, "--shadow-exclude")?;
                let mut tracking = std::mem::take(&mut options.tracking);
                options
                    .shadow_exclude
                    .parse_add(&pattern, 0, &mut tracking)?;
                options.tracking = tracking;
            }
            "--fade-exclude" => {
                let pattern = take_value(&mut args, "--fade-exclude")?;
                let mut tracking = std::mem::take(&mut options.tracking);
                options.fade_exclude.parse_add(&pattern, 0, &mut tracking)?;
                options.tracking = tracking;
            }
            "--focus-exclude" => {
                let pattern = take_value(&mut args, "--focus-exclude")?;
                let mut tracking = std::mem::take(&mut options.tracking);
                options.focus_exclude.parse_add(&pattern, 0, &mut tracking)?;
                options.tracking = tracking;
            }
            "--invert-color-include" => {
                let pattern = take_value(&mut args, "--invert-color-include")?;
                let mut tracking = std::mem::take(&mut options.tracking);
                options
                    .invert_color_include
                    .parse_add(&pattern, 0, &mut tracking)?;
                options.tracking = tracking;
            }
            "--blur-background" => options.blur_background = true,
            "--blur-background-frame" => options.blur_background_frame = true,
            "--blur-background-exclude" => {
                let pattern = take_value(&mut args, "--blur-background-exclude")?;
                let mut tracking = std::mem::take(&mut options.tracking);
                options
                    .blur_background_exclude
                    .parse_add(&pattern, 0, &mut tracking)?;
                options.tracking = tracking;
            }
            "--blur-level" => {
                options.blur_level = take_value(&mut args, "--blur-level")?
                    .parse()
                    .map_err(|_| "--blur-level expects a number".to_string())?;
            }
            "--opacity-rule" => {
                let rule = take_value(&mut args, "--opacity-rule")?;
                parse_rule_opacity(&mut options, &rule)?;
            }
            "--vsync" => {
                options.vsync = parse_vsync(&take_value(&mut args, "--vsync")?)?;
            }
            "--glx-swap-method" => {
                options.glx_swap_method =
                    parse_glx_swap_method(&take_value(&mut args, "--glx-swap-method")?)?;
            }
            "--benchmark" => {
                options.benchmark = take_value(&mut args, "--benchmark")?
                    .parse()
                    .map_err(|_| "--benchmark expects a number".to_string())?;
            }
            "--benchmark-wid" => {
                options.benchmark_wid = take_value(&mut args, "--benchmark-wid")?
                    .parse()
                    .map_err(|_| "--benchmark-wid expects a number".to_string())?;
            }
            "-h" | "--help" => {
                usage();
                std::process::exit(0);
            }
            other => return Err(format!("Unknown option {}", other)),
        }
    }

    options.config_file = find_config_file(explicit_config.as_deref());
    if let Some(path) = &options.config_file {
        log::debug!("Using configuration file {}", path.display());
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neocomp::wintypes::WinType;

    fn parse(args: &[&str]) -> Options {
        parse_args(args.iter().map(|s| s.to_string())).unwrap()
    }

    #[test]
    fn defaults_are_sane() {
        let options = Options::default();
        assert_eq!(options.inactive_opacity, 100.0);
        assert_eq!(options.wintype_opacity[WinType::Normal as usize], -1.0);
        assert!(!options.blur_background);
    }

    #[test]
    fn shadow_and_fade_toggles() {
        let options = parse(&["-c", "-C", "-f"]);
        assert!(options.wintype_shadow[WinType::Normal as usize]);
        assert!(!options.wintype_shadow[WinType::Dock as usize]);
        assert!(options.wintype_fade[WinType::Normal as usize]);
    }

    #[test]
    fn fractional_opacities_scale_to_percent() {
        let options = parse(&["-i", "0.8", "--active-opacity", "0.9"]);
        assert!((options.inactive_opacity - 80.0).abs() < 1e-9);
        assert!((options.active_opacity - 90.0).abs() < 1e-9);
    }

    #[test]
    fn opacity_rules_carry_their_percentage() {
        let options = parse(&["--opacity-rule", "50:class_g = \"Term\""]);
        assert!(!options.opacity_rules.is_empty());
        assert!(options.tracking.track_wdata);
    }

    #[test]
    fn bad_opacity_rule_is_an_error() {
        assert!(parse_args(
            ["--opacity-rule", "150:class_g = \"Term\""]
                .iter()
                .map(|s| s.to_string())
        )
        .is_err());
        assert!(parse_args(
            ["--opacity-rule", "no-colon"].iter().map(|s| s.to_string())
        )
        .is_err());
    }

    #[test]
    fn unknown_options_are_errors() {
        assert!(parse_args(["--frobnicate"].iter().map(|s| s.to_string())).is_err());
    }

    #[test]
    fn rule_lists_parse_from_the_cli() {
        let options = parse(&[
            "--shadow-exclude",
            "window_type = \"dock\"",
            "--blur-background-exclude",
            "name *= \"video\"",
        ]);
        assert!(!options.shadow_exclude.is_empty());
        assert!(!options.blur_background_exclude.is_empty());
    }
}
