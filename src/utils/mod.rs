pub(crate) mod digest;
pub mod net;
