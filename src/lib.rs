//! Workspace root for Seamap.
//!
//! Carries the pre-commit hook tooling only. The library lives in
//! `seamap-lib` and the HTTP service in `seamap-service-vector`.
