pub mod ports;

pub mod queue;
pub mod registry;
pub mod relay;
pub mod sessions;
pub mod signaling;

#[cfg(test)]
pub(crate) mod test_support;
