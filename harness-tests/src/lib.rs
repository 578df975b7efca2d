//! Loopback orchestrator for the vsock conformance suite.
//!
//! The interesting part lives in `tests/loopback.rs`: it runs every catalog
//! entry as its own trial, with a server and a client process talking over the
//! local vsock loopback transport.
