#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate clap;

pub mod ap_ip;
pub mod buffer;
pub mod cli;
pub mod conf;
pub mod context;
pub mod dhcp_sniff;
pub mod event_bits;
pub mod events;
pub mod forwarder;
pub mod mac_clone;
pub mod macnat;
pub mod rewriter;
pub mod router;
pub mod sim;
pub mod traits;
pub mod types;

pub type Result<T> = anyhow::Result<T, anyhow::Error>;
