// Domain layer: product model, dispensary configuration and the ports the pipeline talks through.

pub mod model;
pub mod ports;
