//! HTTP/1.0 protocol pieces shared by the server and the client.
//!
//! - **`connection`**: per-connection server state machine
//! - **`parser`**: line splitting and status/header line parsing
//! - **`request`**: request line and method
//! - **`response`**: status codes and the client's response type
//! - **`template`**: response rendering from a placeholder template
//!
//! # Connection State Machine
//!
//! Each accepted connection moves forward one phase at a time, driven by
//! the server's tick:
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Drain available bytes until "\r\n\r\n"
//!        └──────┬──────┘
//!               │ Header block complete
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Parse request line, render response
//!        └──────┬───────────┘
//!               │ Response rendered
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Flush until empty or would block
//!        └──────┬───────────┘
//!               │ Response sent
//!               ▼
//!        ┌──────────────────┐
//!        │     Closed       │ ← Also reached on error or expiry
//!        └──────────────────┘
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod template;
