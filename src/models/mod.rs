//! Request and Response models for the agent's outer surfaces
//!
//! This module defines the DTOs used for the control protocol and for the
//! cache-service HTTP routes.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{ControlMessage, SetRequest};
pub use responses::{
    ClearReply, ControlReply, DeleteResponse, ErrorResponse, GetResponse, HealthResponse,
    SetResponse,
};
