//! Chip-dispatched kernels for low-end ARM handsets.
//!
//! The library identifies the micro-architecture once per process
//! ([`chip::detect`]) and routes every operation through a dispatcher that
//! picks the blocking-tuned variant for that chip, falling back to generic
//! kernels when the identity is unknown. Kernels never spawn threads; callers
//! split rows when they want parallelism.

pub mod apple;
pub mod chip;
pub mod dispatch;
pub mod gemm;
pub mod gemv;
pub mod mediatek;
pub mod qualcomm;
pub mod unisoc;

pub use chip::{detect, ChipKind};
pub use dispatch::{gemv_quaternary, gemv_ternary, matmul_f16, matmul_f32};
