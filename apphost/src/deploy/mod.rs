//! Deployment module

pub mod artifact;
pub mod fsm;
pub mod pipeline;
