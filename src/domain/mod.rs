// Domain layer - Core types and policies

pub mod errors;
pub mod model;
pub mod rules;
