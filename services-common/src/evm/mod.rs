pub mod pool;
pub mod rpc;
