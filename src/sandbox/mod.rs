//! Sandboxed execution of external tools.
//!
//! [`with_baseline_environment`] and [`with_venv`] give a closure a
//! [`SandboxScope`] whose commands run with venv variables cleared or with a
//! project venv activated. [`Venv`] creates and describes the venvs.

mod env;
mod venv;

pub use env::{
    parse_env_dump, strip_venv_path_segment, with_baseline_environment, with_venv, EnvOverlay,
    SandboxScope, CLEARED_VARS,
};
pub use venv::Venv;
