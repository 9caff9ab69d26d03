//! Thin OTLP ingestion adapters (E4, SPEC_FULL.md §4 E4). Out of scope
//! per spec §1 beyond the minimal HTTP/JSON surface kept here to make
//! the crate runnable end to end; see `otlp_http` for the caveat on
//! gRPC.

pub mod otlp_http;
