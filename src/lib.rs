pub mod crypto;
pub mod logging;
pub mod risk;
pub mod session;
pub mod storage;
pub mod web;
pub mod workflow;
