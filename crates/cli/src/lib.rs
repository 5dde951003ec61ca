//! Library side of the `conduit` binary: runtime assembly from config,
//! shared by the commands and the end-to-end tests.

pub mod bootstrap;
