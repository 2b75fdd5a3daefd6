// The per-frame systems, run in the order session.rs lists them
pub mod blur;
pub mod fullscreen;
pub mod opacity;
pub mod order;
pub mod physical;
pub mod shadow;
pub mod shape;
pub mod state;
pub mod texture;
pub mod xorg;
