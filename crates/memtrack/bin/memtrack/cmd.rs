pub mod descs;
pub mod replay;
