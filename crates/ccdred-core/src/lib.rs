pub mod cancel;
pub mod combine;
pub mod consts;
pub mod error;
pub mod frame;
pub mod group;
pub mod header;
pub mod io;
pub mod mask;
pub mod naming;
pub mod pipeline;
pub mod template;
pub mod validate;
