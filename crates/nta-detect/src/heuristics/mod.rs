//! Stateless traffic classifiers.
//!
//! Each classifier scores a single record (or a small batch) from its
//! fields alone; there is no wall-clock or shared state, so the same input
//! always produces the same verdict. Scores are additive per signal and
//! capped at 1.0.

mod c2;
mod dga;
mod dns_tunnel;
mod exfil;
mod webshell;

pub use c2::detect_c2;
pub use dga::detect_dga;
pub use dns_tunnel::detect_dns_tunnel;
pub use exfil::detect_exfiltration;
pub use webshell::detect_webshell;
