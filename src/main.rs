// An OpenGL-backed compositing manager for X11
mod neocomp;
use neocomp::Neocomp;

fn main() {
    let mut compositor = Neocomp::from_args();

    println!("Begin composite loop...");
    if let Err(e) = compositor.run_forever() {
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}
