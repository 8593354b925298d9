#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]

//! The engine behind the `nonlin` crate.
//!
//! Everything public lives in [`raw`], which exposes the engine the way a
//! native optimization library would: an opaque instance pointer, entry
//! points taking and returning C types, callbacks as `extern "C"` function
//! pointers paired with a single opaque context word, and plain integer
//! result codes. Consumers are expected to treat that surface exactly like a
//! foreign library — nothing else in this crate is part of the contract.
//!
//! The bundled backends are intentionally compact:
//!
//! | Algorithm | Family |
//! |-----------|--------|
//! | Nelder-Mead | local, derivative-free |
//! | L-BFGS | local, derivative-based |
//! | CRS | global, population-based |
//! | AUGLAG | augmented Lagrangian, constraint-capable |

pub mod raw;

mod algorithms;
mod eval;
mod opt;
