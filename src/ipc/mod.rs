//! Out-of-band terminate signal.
//!
//! A supervised process binds a namespaced local socket (Unix domain socket
//! on Linux/macOS, named pipe on Windows) named after its identity token and
//! exits when it receives a terminate request. The supervisor side is
//! fire-and-forget: no acknowledgement is read back.

pub mod terminate;
