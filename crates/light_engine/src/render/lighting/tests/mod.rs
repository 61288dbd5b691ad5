pub(crate) mod fakes;
mod frame_integration;
