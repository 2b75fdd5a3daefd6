// The NeoComp compositing manager
pub mod atoms;
pub mod config;
pub mod fade;
pub mod glx;
pub mod render;
pub mod rules;
pub mod session;
pub mod systems;
pub mod windows;
pub mod wintypes;
pub mod xorg;

use config::Options;
use session::{RunOutcome, Session};
use utils::log;

use thiserror::Error;

/// The small fixed set of outcomes operations surface. A single
/// window's failure never taints another; these bubble only for
/// whole-session problems.
#[derive(Error, Debug)]
pub enum CompError {
    #[error("failed parsing: {0}")]
    ParseError(String),
    #[error("gpu failure: {0}")]
    GpuError(String),
    #[error("X failure: {0}")]
    XError(String),
    #[error("no such window {0:#010x}")]
    NoSuchWindow(u32),
}

pub struct Neocomp {
    options: Option<Options>,
}

impl Neocomp {
    /// Parse the command line into a runnable compositor. Bad options
    /// are fatal at startup.
    pub fn from_args() -> Neocomp {
        let options = match config::parse_args(std::env::args().skip(1)) {
            Ok(options) => options,
            Err(message) => {
                eprintln!("{}", message);
                config::usage();
                std::process::exit(1);
            }
        };

        Neocomp {
            options: Some(options),
        }
    }

    /// Run sessions until one exits for good. SIGUSR1 tears the
    /// current session down and builds a fresh one.
    pub fn run_forever(&mut self) -> Result<(), CompError> {
        // Daemonize before any connection exists; forking with a live
        // GL context does not survive
        if self
            .options
            .as_ref()
            .map(|options| options.fork_after_register)
            .unwrap_or(false)
        {
            if let Err(e) = nix::unistd::daemon(false, false) {
                return Err(CompError::XError(format!("failed to daemonize: {}", e)));
            }
        }

        session::install_reset_handler();

        loop {
            let options = self.options.take().unwrap_or_default();
            let mut session = Session::new(options)?;

            let outcome = session.run();
            let options = std::mem::take(&mut session.options);
            session.destroy();

            match outcome {
                RunOutcome::Exit => return Ok(()),
                RunOutcome::Reset => {
                    log::debug!("Reset requested, recreating the session");
                    self.options = Some(options);
                }
            }
        }
    }
}
